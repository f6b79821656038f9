//! librdkafka ↔ gateway types. Everything here is pure so it can be tested
//! without a cluster.

use std::collections::{BTreeMap, HashMap};

use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Headers, Message};
use rdkafka::metadata::Metadata;

use broker_api::{BrokerNode, GatewayError, MessageRecord, NewTopic, Payload, Topic};

// ═══════════════════════════════════════════════════════════════
//  Metadata snapshot
// ═══════════════════════════════════════════════════════════════

/// Owned copy of a metadata response, safe to move out of a blocking task.
#[derive(Debug, Clone, Default)]
pub(crate) struct ClusterMeta {
    pub brokers: Vec<BrokerNode>,
    pub topics: Vec<TopicMeta>,
}

#[derive(Debug, Clone)]
pub(crate) struct TopicMeta {
    pub name: String,
    pub error: Option<RDKafkaErrorCode>,
    /// `(partition id, replica count)`.
    pub partitions: Vec<(i32, usize)>,
}

impl ClusterMeta {
    pub fn from_metadata(md: &Metadata) -> Self {
        Self {
            brokers: md
                .brokers()
                .iter()
                .map(|b| BrokerNode {
                    id: b.id(),
                    host: b.host().to_string(),
                    port: b.port(),
                })
                .collect(),
            topics: md
                .topics()
                .iter()
                .map(|t| TopicMeta {
                    name: t.name().to_string(),
                    error: t.error().map(RDKafkaErrorCode::from),
                    partitions: t
                        .partitions()
                        .iter()
                        .map(|p| (p.id(), p.replicas().len()))
                        .collect(),
                })
                .collect(),
        }
    }

    /// The named topic, or `TopicNotFound` when the broker does not know it.
    pub fn topic(&self, name: &str) -> Result<&TopicMeta, GatewayError> {
        let topic = self
            .topics
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| GatewayError::TopicNotFound(name.to_string()))?;
        match topic.error {
            Some(code) => Err(classify(code, Some(name))),
            None => Ok(topic),
        }
    }
}

impl TopicMeta {
    /// Partition ids in ascending order.
    pub fn partition_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.partitions.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn to_topic(&self, config: HashMap<String, String>) -> Topic {
        let replication = self.partitions.iter().map(|(_, r)| *r).max().unwrap_or(0);
        Topic {
            name: self.name.clone(),
            partition_count: self.partitions.len(),
            replication_factor: i16::try_from(replication).unwrap_or(i16::MAX),
            internal: self.name.starts_with("__"),
            config,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Records
// ═══════════════════════════════════════════════════════════════

pub(crate) fn record_from<M: Message>(msg: &M) -> MessageRecord {
    let mut headers = BTreeMap::new();
    if let Some(hs) = msg.headers() {
        for header in hs.iter() {
            let value = header
                .value
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .unwrap_or_default();
            headers.insert(header.key.to_string(), value);
        }
    }

    MessageRecord {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(|k| Payload::from(k.to_vec())),
        value: Payload::from(msg.payload().map(<[u8]>::to_vec).unwrap_or_default()),
        headers,
        timestamp_ms: msg.timestamp().to_millis().unwrap_or(0),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════

/// Map a broker error code onto the gateway taxonomy. `topic` names the
/// subject of topic-level conflicts.
pub(crate) fn classify(code: RDKafkaErrorCode, topic: Option<&str>) -> GatewayError {
    let subject = topic.unwrap_or_default().to_string();
    match code {
        RDKafkaErrorCode::TopicAlreadyExists => GatewayError::TopicAlreadyExists(subject),
        RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic => {
            GatewayError::TopicNotFound(subject)
        }
        RDKafkaErrorCode::TopicAuthorizationFailed
        | RDKafkaErrorCode::ClusterAuthorizationFailed
        | RDKafkaErrorCode::GroupAuthorizationFailed => {
            GatewayError::AuthorizationDenied(code.to_string())
        }
        RDKafkaErrorCode::BrokerTransportFailure
        | RDKafkaErrorCode::AllBrokersDown
        | RDKafkaErrorCode::OperationTimedOut
        | RDKafkaErrorCode::RequestTimedOut
        | RDKafkaErrorCode::NetworkException
        | RDKafkaErrorCode::LeaderNotAvailable
        | RDKafkaErrorCode::NotLeaderForPartition => GatewayError::BrokerUnavailable(code.to_string()),
        RDKafkaErrorCode::InvalidPartitions
        | RDKafkaErrorCode::InvalidReplicationFactor
        | RDKafkaErrorCode::InvalidConfig => GatewayError::InvalidRequest(code.to_string()),
        _ => GatewayError::Broker(code.to_string()),
    }
}

/// Per-topic failure of a create request. The broker answers a replication
/// factor above its live broker count with `InvalidReplicationFactor`.
pub(crate) fn creation_error(
    code: RDKafkaErrorCode,
    topic: &NewTopic,
    live_brokers: usize,
) -> GatewayError {
    match code {
        RDKafkaErrorCode::InvalidReplicationFactor => GatewayError::InsufficientBrokers {
            requested: topic.replication_factor,
            available: live_brokers,
        },
        _ => classify(code, Some(&topic.name)),
    }
}

/// The consumer caught up with everything the partition will deliver.
/// Past the last record there may still be transaction markers, or
/// uncommitted records under `read_committed`, so this can come before
/// the high watermark.
pub(crate) fn reached_partition_end(err: &KafkaError) -> bool {
    matches!(err, KafkaError::PartitionEOF(_))
}

pub(crate) fn map_kafka_error(err: KafkaError, topic: Option<&str>) -> GatewayError {
    match err.rdkafka_error_code() {
        Some(code) => classify(code, topic),
        None => GatewayError::Broker(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::message::{Header, OwnedHeaders, OwnedMessage, Timestamp};

    fn meta() -> ClusterMeta {
        ClusterMeta {
            brokers: vec![BrokerNode {
                id: 1,
                host: "kafka-1".into(),
                port: 9092,
            }],
            topics: vec![
                TopicMeta {
                    name: "orders".into(),
                    error: None,
                    partitions: vec![(1, 3), (0, 3), (2, 2)],
                },
                TopicMeta {
                    name: "gone".into(),
                    error: Some(RDKafkaErrorCode::UnknownTopicOrPartition),
                    partitions: vec![],
                },
            ],
        }
    }

    #[test]
    fn topic_view_from_metadata() {
        let md = meta();
        let orders = md.topic("orders").unwrap();
        assert_eq!(orders.partition_ids(), vec![0, 1, 2]);

        let topic = orders.to_topic(HashMap::from([("cleanup.policy".into(), "compact".into())]));
        assert_eq!(topic.partition_count, 3);
        assert_eq!(topic.replication_factor, 3);
        assert!(!topic.internal);
        assert_eq!(topic.config["cleanup.policy"], "compact");
    }

    #[test]
    fn missing_or_erroneous_topics_are_not_found() {
        let md = meta();
        assert_eq!(md.topic("nope").unwrap_err(), GatewayError::TopicNotFound("nope".into()));
        assert_eq!(md.topic("gone").unwrap_err(), GatewayError::TopicNotFound("gone".into()));
    }

    #[test]
    fn error_codes_follow_the_taxonomy() {
        assert_eq!(
            classify(RDKafkaErrorCode::TopicAlreadyExists, Some("t")),
            GatewayError::TopicAlreadyExists("t".into())
        );
        assert!(classify(RDKafkaErrorCode::AllBrokersDown, None).is_transient());
        assert!(classify(RDKafkaErrorCode::RequestTimedOut, None).is_transient());
        assert!(matches!(
            classify(RDKafkaErrorCode::TopicAuthorizationFailed, None),
            GatewayError::AuthorizationDenied(_)
        ));
        assert!(matches!(
            classify(RDKafkaErrorCode::InvalidPartitions, None),
            GatewayError::InvalidRequest(_)
        ));
        assert!(matches!(
            classify(RDKafkaErrorCode::MessageSizeTooLarge, None),
            GatewayError::Broker(_)
        ));
    }

    #[test]
    fn rejected_replication_factor_means_too_few_brokers() {
        let topic = NewTopic::new("wide", 1, 3);
        assert_eq!(
            creation_error(RDKafkaErrorCode::InvalidReplicationFactor, &topic, 2),
            GatewayError::InsufficientBrokers {
                requested: 3,
                available: 2
            }
        );
        assert_eq!(
            creation_error(RDKafkaErrorCode::TopicAlreadyExists, &topic, 2),
            GatewayError::TopicAlreadyExists("wide".into())
        );
    }

    #[test]
    fn partition_eof_ends_a_read() {
        assert!(reached_partition_end(&KafkaError::PartitionEOF(3)));
        assert!(!reached_partition_end(&KafkaError::MessageConsumption(
            RDKafkaErrorCode::OperationTimedOut
        )));
    }

    #[test]
    fn client_errors_without_code_stay_broker_errors() {
        let err = map_kafka_error(KafkaError::ClientCreation("bad config".into()), None);
        assert!(matches!(err, GatewayError::Broker(msg) if msg.contains("bad config")));
    }

    #[test]
    fn record_conversion_keeps_identity_and_headers() {
        let headers = OwnedHeaders::new().insert(Header {
            key: "trace",
            value: Some("abc"),
        });
        let msg = OwnedMessage::new(
            Some(b"{\"id\":1}".to_vec()),
            Some(b"k1".to_vec()),
            "orders".into(),
            Timestamp::CreateTime(1_700_000_000_000),
            2,
            41,
            Some(headers),
        );

        let record = record_from(&msg);
        assert_eq!((record.partition, record.offset), (2, 41));
        assert_eq!(record.key, Some(Payload::from("k1")));
        assert_eq!(record.value.to_text(), "{\"id\":1}");
        assert_eq!(record.headers["trace"], "abc");
        assert_eq!(record.timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn tombstones_have_empty_value() {
        let msg = OwnedMessage::new(None, None, "t".into(), Timestamp::NotAvailable, 0, 0, None);
        let record = record_from(&msg);
        assert!(record.value.is_empty());
        assert_eq!(record.key, None);
        assert_eq!(record.timestamp_ms, 0);
    }
}
