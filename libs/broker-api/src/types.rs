use std::collections::{BTreeMap, HashMap};

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{ErrorKind, GatewayError};

// ════════════════════════════════════════════════════════════════
//  Ordering Policy
// ════════════════════════════════════════════════════════════════

/// Display order of a page. Also decides where a fresh browse starts:
/// the head of every partition or its tail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderingPolicy {
    #[serde(alias = "OLD_FIRST", alias = "oldest_first")]
    OldestFirst,
    #[default]
    #[serde(alias = "NEW_FIRST", alias = "newest_first")]
    NewestFirst,
}

// ════════════════════════════════════════════════════════════════
//  Topics & partitions
// ════════════════════════════════════════════════════════════════

/// Cluster-wide view of one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub partition_count: usize,
    pub replication_factor: i16,
    /// Broker-owned topics such as `__consumer_offsets`.
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

/// Request to create a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTopic {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl NewTopic {
    pub fn new(name: impl Into<String>, partitions: i32, replication_factor: i16) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication_factor,
            config: HashMap::new(),
        }
    }

    pub fn with_config(mut self, config: HashMap<String, String>) -> Self {
        self.config = config;
        self
    }

    /// Reject requests no broker could accept.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.name.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("topic name must not be empty".into()));
        }
        if self.partitions < 1 {
            return Err(GatewayError::InvalidRequest(format!(
                "partitions must be >= 1, got {}",
                self.partitions
            )));
        }
        if self.replication_factor < 1 {
            return Err(GatewayError::InvalidRequest(format!(
                "replication factor must be >= 1, got {}",
                self.replication_factor
            )));
        }
        Ok(())
    }
}

/// Low/high watermark of a partition at observation time.
///
/// `earliest` is the first retained offset, `latest` the offset the next
/// produced record will receive. Empty partition: `earliest == latest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionWatermarks {
    pub partition: i32,
    pub earliest: i64,
    pub latest: i64,
}

impl PartitionWatermarks {
    pub fn is_empty(&self) -> bool {
        self.latest <= self.earliest
    }

    pub fn len(&self) -> i64 {
        (self.latest - self.earliest).max(0)
    }
}

// ════════════════════════════════════════════════════════════════
//  Payload
// ════════════════════════════════════════════════════════════════

/// Opaque record bytes.
///
/// Serialized for display as `{"encoding":"utf8","data":"..."}` when the
/// bytes are valid UTF-8 and as base64 otherwise. Deserialization accepts
/// either that object form or a bare string (taken as UTF-8 text).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Payload(pub Vec<u8>);

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lossy text rendering, for logs and CLI output.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl Serialize for Payload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Payload", 2)?;
        match std::str::from_utf8(&self.0) {
            Ok(text) => {
                s.serialize_field("encoding", "utf8")?;
                s.serialize_field("data", text)?;
            }
            Err(_) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&self.0);
                s.serialize_field("encoding", "base64")?;
                s.serialize_field("data", &encoded)?;
            }
        }
        s.end()
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Text(String),
            Tagged { encoding: String, data: String },
        }

        match Wire::deserialize(deserializer)? {
            Wire::Text(text) => Ok(Payload(text.into_bytes())),
            Wire::Tagged { encoding, data } => match encoding.as_str() {
                "utf8" | "text" => Ok(Payload(data.into_bytes())),
                "base64" => base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .map(Payload)
                    .map_err(serde::de::Error::custom),
                other => Err(serde::de::Error::custom(format!("unknown payload encoding '{other}'"))),
            },
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Records
// ════════════════════════════════════════════════════════════════

/// One consumed record. Identity is `(topic, partition, offset)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Payload>,
    pub value: Payload,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Unix epoch milliseconds.
    pub timestamp_ms: i64,
}

/// Single-record publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceRequest {
    pub topic: String,
    /// `None` lets the broker (or its partitioner) choose.
    pub partition: Option<i32>,
    pub key: Option<Payload>,
    pub value: Payload,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Where the broker placed a published record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceAck {
    pub partition: i32,
    pub offset: i64,
}

// ════════════════════════════════════════════════════════════════
//  Pages
// ════════════════════════════════════════════════════════════════

/// Non-fatal read failure of one partition while building a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDiagnostic {
    pub partition: i32,
    pub kind: ErrorKind,
    pub message: String,
}

impl PartitionDiagnostic {
    pub fn from_error(partition: i32, error: &GatewayError) -> Self {
        Self {
            partition,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// One page of records plus everything needed to fetch the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub records: Vec<MessageRecord>,
    /// Position per partition to pass back for the following page.
    pub resume_offsets: BTreeMap<i32, i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<PartitionDiagnostic>,
}

impl MessagePage {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

// ════════════════════════════════════════════════════════════════
//  Cluster metadata
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerNode {
    pub id: i32,
    pub host: String,
    pub port: i32,
}

impl BrokerNode {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Static cluster facts for the console header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub cluster_id: Option<String>,
    /// Backend/client version string.
    pub version: String,
    pub brokers: Vec<BrokerNode>,
    pub controller: Option<BrokerNode>,
}

impl ClusterInfo {
    pub fn node_count(&self) -> usize {
        self.brokers.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub operation: String,
    pub principal: String,
    pub permission: String,
    pub pattern: String,
}

/// Read-only ACL summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclInfo {
    pub cluster_id: Option<String>,
    pub controller: Option<BrokerNode>,
    #[serde(default)]
    pub authorized_operations: Vec<String>,
    #[serde(default)]
    pub entries: Vec<AclEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_accepts_legacy_names() {
        let p: OrderingPolicy = serde_json::from_str("\"NEW_FIRST\"").unwrap();
        assert_eq!(p, OrderingPolicy::NewestFirst);
        let p: OrderingPolicy = serde_json::from_str("\"OLD_FIRST\"").unwrap();
        assert_eq!(p, OrderingPolicy::OldestFirst);
        assert_eq!(
            serde_json::to_string(&OrderingPolicy::OldestFirst).unwrap(),
            "\"OLDEST_FIRST\""
        );
    }

    #[test]
    fn new_topic_validation() {
        assert!(NewTopic::new("orders", 1, 1).validate().is_ok());
        assert!(matches!(
            NewTopic::new("", 1, 1).validate(),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(matches!(
            NewTopic::new("orders", 0, 1).validate(),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(matches!(
            NewTopic::new("orders", 3, 0).validate(),
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn payload_renders_text_or_base64() {
        let text = serde_json::to_value(Payload::from("hello")).unwrap();
        assert_eq!(text, serde_json::json!({"encoding": "utf8", "data": "hello"}));

        let binary = serde_json::to_value(Payload(vec![0xff, 0x00, 0xfe])).unwrap();
        assert_eq!(binary["encoding"], "base64");
        assert_eq!(binary["data"], "/wD+");
    }

    #[test]
    fn payload_accepts_bare_string_and_tagged_forms() {
        let p: Payload = serde_json::from_str("\"plain\"").unwrap();
        assert_eq!(p.as_bytes(), b"plain");

        let p: Payload = serde_json::from_str(r#"{"encoding":"base64","data":"/wD+"}"#).unwrap();
        assert_eq!(p.as_bytes(), &[0xff, 0x00, 0xfe]);

        let err = serde_json::from_str::<Payload>(r#"{"encoding":"rot13","data":"x"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn watermark_length() {
        let empty = PartitionWatermarks { partition: 0, earliest: 7, latest: 7 };
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
        let full = PartitionWatermarks { partition: 1, earliest: 2, latest: 9 };
        assert!(!full.is_empty());
        assert_eq!(full.len(), 7);
    }
}
