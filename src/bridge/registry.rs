//! Bridge mapping registry.
//!
//! `MappingRegistry::load` yields unvalidated [`LoadedMappings`]; only
//! `validate` produces a registry that can resolve routes. The registry is
//! immutable; edits return a new, revalidated registry.

use serde_json::Value;
use tracing::{debug, info};

use crate::common::error::{AppError, ValidationError};
use crate::config::parser::{parse_mappings, read_source, MappingSource};
use crate::config::types::{BridgeMapping, MappingFile, SideAChannel, SideBChannel};
use crate::config::validate::validate_mappings;

/// A resolved destination channel and the bridge it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'a, C> {
    pub bridge: &'a str,
    pub channel: &'a C,
}

/// Parsed but not yet validated mappings.
#[derive(Debug, Clone)]
pub struct LoadedMappings {
    raw: Vec<Value>,
}

impl LoadedMappings {
    /// Check every mapping and build the registry.
    pub fn validate(self) -> Result<MappingRegistry, ValidationError> {
        let bridges = validate_mappings(&self.raw).map_err(|report| ValidationError { report })?;
        Ok(MappingRegistry { bridges })
    }
}

/// Validated set of bridges, shared read-only by the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingRegistry {
    bridges: Vec<BridgeMapping>,
}

impl MappingRegistry {
    /// Read and parse mappings from a source.
    pub fn load(source: &MappingSource) -> Result<LoadedMappings, AppError> {
        let content = read_source(source)?;
        let raw = parse_mappings(&content)?;
        info!("Loaded {} bridge mapping(s) from {}", raw.len(), source);
        Ok(LoadedMappings { raw })
    }

    /// Parse mappings from a JSON string.
    pub fn from_json(json: &str) -> Result<LoadedMappings, AppError> {
        Ok(LoadedMappings {
            raw: parse_mappings(json)?,
        })
    }

    /// Build a registry from already typed mappings, revalidating them.
    pub fn from_bridges(bridges: Vec<BridgeMapping>) -> Result<Self, ValidationError> {
        let raw = bridges
            .iter()
            .map(|b| serde_json::to_value(b).unwrap_or(Value::Null))
            .collect();
        LoadedMappings { raw }.validate()
    }

    /// Find the Telegram chat a Discord channel relays to.
    ///
    /// Matches on guild id, channel id and channel name.
    pub fn resolve_a_to_b(
        &self,
        origin_id: &str,
        channel_id: &str,
        channel_name: &str,
    ) -> Option<Route<'_, SideBChannel>> {
        self.bridges
            .iter()
            .filter(|bridge| bridge.side_a.origin_id == origin_id)
            .find_map(|bridge| {
                let source = bridge
                    .side_a
                    .channels
                    .iter()
                    .find(|c| c.id == channel_id && c.name == channel_name)?;
                let target = bridge
                    .side_b
                    .channels
                    .iter()
                    .find(|c| c.name == source.mapped_to)?;
                debug!(bridge = %bridge.name, "{} -> {}", source.name, target.name);
                Some(Route {
                    bridge: &bridge.name,
                    channel: target,
                })
            })
    }

    /// Find the Discord channel a Telegram chat relays to.
    ///
    /// The first bridge whose Telegram origin matches wins, and within it the
    /// first Discord channel.
    pub fn resolve_b_to_a(&self, origin_id: &str) -> Option<Route<'_, SideAChannel>> {
        self.bridges
            .iter()
            .filter(|bridge| bridge.side_b.origin_id == origin_id)
            .find_map(|bridge| {
                bridge.side_a.channels.first().map(|channel| Route {
                    bridge: &bridge.name,
                    channel,
                })
            })
    }

    pub fn bridges(&self) -> &[BridgeMapping] {
        &self.bridges
    }

    pub fn get(&self, name: &str) -> Option<&BridgeMapping> {
        self.bridges.iter().find(|b| b.name == name)
    }

    /// Registry with `mapping` added, replacing any bridge of the same name.
    pub fn with_bridge(&self, mapping: BridgeMapping) -> Result<Self, ValidationError> {
        let mut bridges: Vec<_> = self
            .bridges
            .iter()
            .filter(|b| b.name != mapping.name)
            .cloned()
            .collect();
        bridges.push(mapping);
        Self::from_bridges(bridges)
    }

    /// Registry without the named bridge. `None` if no such bridge exists.
    pub fn without_bridge(&self, name: &str) -> Option<Self> {
        if self.get(name).is_none() {
            return None;
        }
        let bridges = self
            .bridges
            .iter()
            .filter(|b| b.name != name)
            .cloned()
            .collect();
        Some(Self { bridges })
    }

    /// Render the registry in the `CHANNEL_MAPPINGS` form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&MappingFile {
            bridges: self.bridges.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::common::error::ConfigError;
    use crate::config::types::{SideA, SideB};

    const GENERAL: &str = r#"{"bridges":[{
        "name": "general",
        "sideA": {"originId": "g1", "channels": [{"id": "123", "name": "general", "mappedTo": "general-chat"}]},
        "sideB": {"originId": "t1", "channels": [{"id": "-100555", "name": "general-chat", "type": "group"}]}
    }]}"#;

    fn registry() -> MappingRegistry {
        MappingRegistry::from_json(GENERAL).unwrap().validate().unwrap()
    }

    fn bridge(name: &str, origin_a: &str, origin_b: &str) -> BridgeMapping {
        BridgeMapping {
            name: name.to_string(),
            side_a: SideA {
                origin_id: origin_a.to_string(),
                channels: vec![SideAChannel {
                    id: format!("{name}-a"),
                    name: name.to_string(),
                    mapped_to: format!("{name}-chat"),
                }],
            },
            side_b: SideB {
                origin_id: origin_b.to_string(),
                channels: vec![SideBChannel {
                    id: format!("{name}-b"),
                    name: format!("{name}-chat"),
                    kind: "group".to_string(),
                }],
            },
        }
    }

    #[test]
    fn test_resolve_a_to_b() {
        let registry = registry();
        let route = registry.resolve_a_to_b("g1", "123", "general").unwrap();
        assert_eq!(route.bridge, "general");
        assert_eq!(route.channel.id, "-100555");
    }

    #[test]
    fn test_resolve_a_to_b_requires_all_keys() {
        let registry = registry();
        assert!(registry.resolve_a_to_b("g1", "999", "general").is_none());
        assert!(registry.resolve_a_to_b("g2", "123", "general").is_none());
        assert!(registry.resolve_a_to_b("g1", "123", "renamed").is_none());
    }

    #[test]
    fn test_resolve_b_to_a() {
        let registry = registry();
        let route = registry.resolve_b_to_a("t1").unwrap();
        assert_eq!(route.channel.id, "123");
        assert!(registry.resolve_b_to_a("t2").is_none());
    }

    #[test]
    fn test_lookups_are_repeatable() {
        let registry = registry();
        let first = registry.resolve_a_to_b("g1", "123", "general");
        let second = registry.resolve_a_to_b("g1", "123", "general");
        assert_eq!(first, second);
        assert_eq!(registry, self::registry());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channels.json");
        std::fs::write(&path, GENERAL).unwrap();

        let loaded = MappingRegistry::load(&MappingSource::File(path)).unwrap();
        assert_eq!(loaded.raw.len(), 1);
        assert_eq!(loaded.validate().unwrap().bridges().len(), 1);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let source = MappingSource::File(PathBuf::from("/nonexistent/channels.json"));
        assert!(matches!(
            MappingRegistry::load(&source),
            Err(AppError::Config(ConfigError::IoError { .. }))
        ));
    }

    #[test]
    fn test_invalid_mapping_names_first_violation() {
        let json = GENERAL.replace("\"mappedTo\": \"general-chat\"", "\"mappedTo\": \"random\"");
        let error = MappingRegistry::from_json(&json)
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(error.to_string().contains("'random'"));
        assert_eq!(error.report.len(), 1);
    }

    #[test]
    fn test_with_bridge_adds_and_replaces() {
        let registry = registry().with_bridge(bridge("ops", "g2", "t2")).unwrap();
        assert_eq!(registry.bridges().len(), 2);
        assert!(registry.resolve_b_to_a("t2").is_some());

        let replaced = registry.with_bridge(bridge("ops", "g3", "t3")).unwrap();
        assert_eq!(replaced.bridges().len(), 2);
        assert!(replaced.resolve_b_to_a("t2").is_none());
        assert!(replaced.resolve_b_to_a("t3").is_some());
    }

    #[test]
    fn test_with_bridge_rejects_inconsistent_mapping() {
        let mut broken = bridge("ops", "g2", "t2");
        broken.side_a.channels[0].mapped_to = "elsewhere".to_string();
        assert!(registry().with_bridge(broken).is_err());
    }

    #[test]
    fn test_without_bridge() {
        let registry = registry();
        assert!(registry.without_bridge("missing").is_none());
        let emptied = registry.without_bridge("general").unwrap();
        assert!(emptied.bridges().is_empty());
    }

    #[test]
    fn test_to_json_reloads() {
        let json = registry().to_json().unwrap();
        let reloaded = MappingRegistry::from_json(&json).unwrap().validate().unwrap();
        assert_eq!(reloaded, registry());
    }
}
