//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root of the mapping file, also the shape of the `CHANNEL_MAPPINGS` value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingFile {
    pub bridges: Vec<BridgeMapping>,
}

/// A named pairing of Discord channels with Telegram chats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMapping {
    /// Unique key of the bridge.
    pub name: String,
    /// Discord side.
    pub side_a: SideA,
    /// Telegram side.
    pub side_b: SideB,
}

/// Discord side of a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideA {
    /// Guild id.
    pub origin_id: String,
    pub channels: Vec<SideAChannel>,
}

/// A Discord channel and the Telegram channel name it relays to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideAChannel {
    pub id: String,
    pub name: String,
    /// Name of a side-B channel in the same bridge.
    pub mapped_to: String,
}

/// Telegram side of a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideB {
    /// Chat id messages arrive from.
    pub origin_id: String,
    pub channels: Vec<SideBChannel>,
}

/// A Telegram chat that receives relayed messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideBChannel {
    /// Chat id messages are sent to.
    pub id: String,
    pub name: String,
    /// Chat type ("group", "supergroup", "channel").
    #[serde(rename = "type")]
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_serializes_with_wire_names() {
        let file = MappingFile {
            bridges: vec![BridgeMapping {
                name: "general".to_string(),
                side_a: SideA {
                    origin_id: "g1".to_string(),
                    channels: vec![SideAChannel {
                        id: "123".to_string(),
                        name: "general".to_string(),
                        mapped_to: "general-chat".to_string(),
                    }],
                },
                side_b: SideB {
                    origin_id: "t1".to_string(),
                    channels: vec![SideBChannel {
                        id: "-100555".to_string(),
                        name: "general-chat".to_string(),
                        kind: "group".to_string(),
                    }],
                },
            }],
        };

        let json = serde_json::to_string(&file).unwrap();
        assert!(json.contains("\"sideA\""));
        assert!(json.contains("\"originId\":\"g1\""));
        assert!(json.contains("\"mappedTo\":\"general-chat\""));
        assert!(json.contains("\"type\":\"group\""));
    }
}
