//! Configuration validation.
//!
//! Mapping entries are checked as raw JSON so every structural problem is
//! reported, not just the first serde error.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::{Map, Value};

use crate::common::error::ConfigError;
use crate::config::env::Settings;
use crate::config::types::{BridgeMapping, SideA, SideAChannel, SideB, SideBChannel};

/// A single problem found in the mapping configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Bridge label, e.g. `bridges[0] (general)`.
    pub bridge: String,
    /// Field path inside the bridge, e.g. `sideA.channels[1].mappedTo`.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: {}", self.bridge, self.message)
        } else {
            write!(f, "{}: {} {}", self.bridge, self.path, self.message)
        }
    }
}

/// Every violation found, in check order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn first(&self) -> Option<&Violation> {
        self.violations.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    fn push(&mut self, bridge: &str, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation {
            bridge: bridge.to_string(),
            path: path.into(),
            message: message.into(),
        });
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

/// Validate raw bridge entries and convert them into typed mappings.
pub fn validate_mappings(raw: &[Value]) -> Result<Vec<BridgeMapping>, ValidationReport> {
    let mut report = ValidationReport::default();
    let mut bridges = Vec::with_capacity(raw.len());

    for (i, entry) in raw.iter().enumerate() {
        let before = report.len();
        if let Some(bridge) = check_bridge(i, entry, &mut report) {
            if report.len() == before {
                bridges.push(bridge);
            }
        }
    }

    let mut seen = HashSet::new();
    for bridge in &bridges {
        if !seen.insert(bridge.name.as_str()) {
            report.push(
                &format!("bridge '{}'", bridge.name),
                "name",
                "is used by more than one bridge",
            );
        }
    }

    if report.is_empty() {
        Ok(bridges)
    } else {
        Err(report)
    }
}

fn check_bridge(index: usize, entry: &Value, report: &mut ValidationReport) -> Option<BridgeMapping> {
    let mut label = format!("bridges[{}]", index);

    let Some(obj) = entry.as_object() else {
        report.push(&label, "", "must be an object");
        return None;
    };

    let name = text_field(obj, "name");
    match &name {
        Some(name) => label = format!("bridges[{}] ({})", index, name),
        None => report.push(&label, "name", "is required"),
    }

    let side_a = obj.get("sideA").and_then(Value::as_object);
    let side_b = obj.get("sideB").and_then(Value::as_object);
    let (side_a, side_b) = match (side_a, side_b) {
        (Some(a), Some(b)) => (a, b),
        (a, b) => {
            if a.is_none() {
                report.push(&label, "sideA", "is required");
            }
            if b.is_none() {
                report.push(&label, "sideB", "is required");
            }
            return None;
        }
    };

    let a_origin = text_field(side_a, "originId");
    if a_origin.is_none() {
        report.push(&label, "sideA.originId", "is required");
    }
    let a_channels = check_side_a_channels(&label, side_a, report);

    let b_origin = text_field(side_b, "originId");
    if b_origin.is_none() {
        report.push(&label, "sideB.originId", "is required");
    }
    let b_channels = check_side_b_channels(&label, side_b, report);

    let (a_channels, b_channels) = (a_channels?, b_channels?);

    let mut b_names: HashMap<&str, usize> = HashMap::new();
    for channel in &b_channels {
        *b_names.entry(channel.name.as_str()).or_default() += 1;
    }
    for (j, channel) in a_channels.iter().enumerate() {
        let path = format!("sideA.channels[{}].mappedTo", j);
        match b_names.get(channel.mapped_to.as_str()).copied().unwrap_or(0) {
            1 => {}
            0 => report.push(
                &label,
                path,
                format!("'{}' does not match any sideB channel name", channel.mapped_to),
            ),
            n => report.push(
                &label,
                path,
                format!("'{}' matches {} sideB channels", channel.mapped_to, n),
            ),
        }
    }

    Some(BridgeMapping {
        name: name?,
        side_a: SideA {
            origin_id: a_origin?,
            channels: a_channels,
        },
        side_b: SideB {
            origin_id: b_origin?,
            channels: b_channels,
        },
    })
}

fn check_side_a_channels(
    label: &str,
    side: &Map<String, Value>,
    report: &mut ValidationReport,
) -> Option<Vec<SideAChannel>> {
    let entries = channel_list(label, "sideA", side, report)?;
    let mut channels = Vec::with_capacity(entries.len());
    let mut complete = true;

    for (j, entry) in entries.iter().enumerate() {
        let prefix = format!("sideA.channels[{}]", j);
        let Some(obj) = entry.as_object() else {
            report.push(label, prefix, "must be an object");
            complete = false;
            continue;
        };
        let id = required(label, &prefix, obj, "id", report);
        let name = required(label, &prefix, obj, "name", report);
        let mapped_to = required(label, &prefix, obj, "mappedTo", report);
        match (id, name, mapped_to) {
            (Some(id), Some(name), Some(mapped_to)) => channels.push(SideAChannel {
                id,
                name,
                mapped_to,
            }),
            _ => complete = false,
        }
    }

    check_unique_ids(label, "sideA", channels.iter().map(|c| c.id.as_str()), report);
    complete.then_some(channels)
}

fn check_side_b_channels(
    label: &str,
    side: &Map<String, Value>,
    report: &mut ValidationReport,
) -> Option<Vec<SideBChannel>> {
    let entries = channel_list(label, "sideB", side, report)?;
    let mut channels = Vec::with_capacity(entries.len());
    let mut complete = true;

    for (j, entry) in entries.iter().enumerate() {
        let prefix = format!("sideB.channels[{}]", j);
        let Some(obj) = entry.as_object() else {
            report.push(label, prefix, "must be an object");
            complete = false;
            continue;
        };
        let id = required(label, &prefix, obj, "id", report);
        let name = required(label, &prefix, obj, "name", report);
        let kind = required(label, &prefix, obj, "type", report);
        match (id, name, kind) {
            (Some(id), Some(name), Some(kind)) => channels.push(SideBChannel { id, name, kind }),
            _ => complete = false,
        }
    }

    check_unique_ids(label, "sideB", channels.iter().map(|c| c.id.as_str()), report);
    complete.then_some(channels)
}

fn channel_list<'a>(
    label: &str,
    side: &str,
    obj: &'a Map<String, Value>,
    report: &mut ValidationReport,
) -> Option<&'a Vec<Value>> {
    match obj.get("channels") {
        Some(Value::Array(entries)) => Some(entries),
        Some(_) => {
            report.push(label, format!("{}.channels", side), "must be a list");
            None
        }
        None => {
            report.push(label, format!("{}.channels", side), "is required");
            None
        }
    }
}

fn check_unique_ids<'a>(
    label: &str,
    side: &str,
    ids: impl Iterator<Item = &'a str>,
    report: &mut ValidationReport,
) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            report.push(
                label,
                format!("{}.channels", side),
                format!("contains duplicate channel id '{}'", id),
            );
        }
    }
}

fn required(
    label: &str,
    prefix: &str,
    obj: &Map<String, Value>,
    key: &str,
    report: &mut ValidationReport,
) -> Option<String> {
    let value = text_field(obj, key);
    if value.is_none() {
        report.push(label, format!("{}.{}", prefix, key), "is required");
    }
    value
}

/// Read a non-empty string field. Numeric ids are accepted and stringified,
/// since snowflakes and chat ids are often written as JSON numbers.
fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Validate runtime settings and return every problem at once.
pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if settings.discord.token.is_empty() {
        errors.push("DISCORD_TOKEN is required".to_string());
    }
    if settings.discord.token == "YOUR_DISCORD_TOKEN_HERE" {
        errors.push("DISCORD_TOKEN has not been configured (still using placeholder)".to_string());
    }

    if settings.telegram.token.is_empty() {
        errors.push("TELEGRAM_TOKEN is required".to_string());
    } else if !looks_like_bot_token(&settings.telegram.token) {
        errors.push("TELEGRAM_TOKEN must look like '<bot id>:<secret>'".to_string());
    }

    if settings.reconnect.max_attempts == 0 {
        errors.push("MAX_RECONNECT_ATTEMPTS must be at least 1".to_string());
    }
    if settings.reconnect.max_auth_failures == 0 {
        errors.push("MAX_AUTH_FAILURES must be at least 1".to_string());
    }
    if settings.reconnect.base_delay > settings.reconnect.max_delay {
        errors.push(format!(
            "RECONNECT_BASE_MS ({}) must not exceed RECONNECT_MAX_MS ({})",
            settings.reconnect.base_delay.as_millis(),
            settings.reconnect.max_delay.as_millis()
        ));
    }
    if settings.http_timeout.as_secs() == 0 {
        errors.push("HTTP_TIMEOUT_SECS must be non-zero".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::InvalidSettings {
            message: errors.join("\n"),
        })
    }
}

fn looks_like_bot_token(token: &str) -> bool {
    match token.split_once(':') {
        Some((id, secret)) => {
            !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) && !secret.is_empty()
        }
        None => false,
    }
}
