use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use broker_api::{
    AclEntry, AclInfo, BrokerAdmin, BrokerFuture, BrokerNode, ClusterInfo, GatewayError,
    MessageRecord, NewTopic, PartitionWatermarks, Payload, ProduceAck, ProduceRequest,
    RecordProducer, RecordReader, Topic, now_ms,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryClusterConfig
// ═══════════════════════════════════════════════════════════════

fn default_brokers() -> usize {
    1
}

fn default_max_records() -> usize {
    100_000
}

fn default_cluster_id() -> String {
    "memory-cluster".to_string()
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryClusterConfig {
    /// Number of live brokers; bounds the replication factor.
    #[serde(default = "default_brokers")]
    pub brokers: usize,
    /// Retention per partition. Older records are dropped and the
    /// earliest watermark moves forward.
    #[serde(default = "default_max_records")]
    pub max_records_per_partition: usize,
    #[serde(default = "default_cluster_id")]
    pub cluster_id: String,
    #[serde(default)]
    pub acls: Vec<AclEntry>,
    /// Simulate a credential without ACL describe rights.
    #[serde(default)]
    pub deny_acl_describe: bool,
    /// Topics created at startup.
    #[serde(default)]
    pub topics: Vec<NewTopic>,
}

impl Default for MemoryClusterConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            max_records_per_partition: default_max_records(),
            cluster_id: default_cluster_id(),
            acls: Vec::new(),
            deny_acl_describe: false,
            topics: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Partition log
// ═══════════════════════════════════════════════════════════════

struct PartitionLog {
    /// Offset of `records[0]`.
    base_offset: i64,
    records: VecDeque<MessageRecord>,
    last_ts_ms: i64,
}

impl PartitionLog {
    fn new() -> Self {
        Self {
            base_offset: 0,
            records: VecDeque::new(),
            last_ts_ms: i64::MIN,
        }
    }

    fn earliest(&self) -> i64 {
        self.base_offset
    }

    fn latest(&self) -> i64 {
        self.base_offset + self.records.len() as i64
    }

    fn append(&mut self, mut record: MessageRecord, max_records: usize) -> i64 {
        let offset = self.latest();
        record.offset = offset;
        self.last_ts_ms = self.last_ts_ms.max(record.timestamp_ms);
        self.records.push_back(record);
        while self.records.len() > max_records.max(1) {
            self.records.pop_front();
            self.base_offset += 1;
        }
        offset
    }

    fn read(&self, from_offset: i64, max_records: usize) -> Vec<MessageRecord> {
        let start = from_offset.max(self.base_offset) - self.base_offset;
        self.records
            .iter()
            .skip(start as usize)
            .take(max_records)
            .cloned()
            .collect()
    }
}

struct TopicLog {
    replication_factor: i16,
    config: HashMap<String, String>,
    partitions: Vec<PartitionLog>,
}

impl TopicLog {
    fn describe(&self, name: &str) -> Topic {
        Topic {
            name: name.to_string(),
            partition_count: self.partitions.len(),
            replication_factor: self.replication_factor,
            internal: name.starts_with("__"),
            config: self.config.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryCluster
// ═══════════════════════════════════════════════════════════════

/// In-process broker cluster.
///
/// Implements the admin, read and produce sides with the same error
/// behaviour a real cluster shows through the gateway: conflicts on
/// create/delete, replication bounded by the broker count, retention
/// moving the earliest watermark. Partition reads can be made to fail on
/// demand to exercise partial pages.
pub struct MemoryCluster {
    topics: RwLock<BTreeMap<String, TopicLog>>,
    failing_reads: RwLock<HashSet<(String, i32)>>,
    round_robin: AtomicUsize,
    config: MemoryClusterConfig,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new(MemoryClusterConfig::default())
    }
}

impl MemoryCluster {
    pub fn new(config: MemoryClusterConfig) -> Self {
        let mut topics = BTreeMap::new();
        for seed in &config.topics {
            match seed.validate() {
                Ok(()) => {
                    topics.insert(seed.name.clone(), new_topic_log(seed));
                }
                Err(e) => tracing::warn!(topic = %seed.name, error = %e, "skipping seed topic"),
            }
        }
        Self {
            topics: RwLock::new(topics),
            failing_reads: RwLock::new(HashSet::new()),
            round_robin: AtomicUsize::new(0),
            config,
        }
    }

    /// Build from a JSON config; `"{}"` yields the defaults.
    pub fn from_config_json(config_json: &str) -> Result<Self, GatewayError> {
        let config: MemoryClusterConfig = if config_json.trim() == "{}" {
            MemoryClusterConfig::default()
        } else {
            serde_json::from_str(config_json)?
        };
        Ok(Self::new(config))
    }

    /// Append a record with an explicit timestamp. Returns its offset.
    pub async fn append(
        &self,
        topic: &str,
        partition: i32,
        key: Option<Payload>,
        value: Payload,
        timestamp_ms: i64,
    ) -> Result<i64, GatewayError> {
        let mut topics = self.topics.write().await;
        let log = topics
            .get_mut(topic)
            .ok_or_else(|| GatewayError::TopicNotFound(topic.to_string()))?;
        let part = partition_mut(log, topic, partition)?;
        let record = MessageRecord {
            topic: topic.to_string(),
            partition,
            offset: 0,
            key,
            value,
            headers: BTreeMap::new(),
            timestamp_ms,
        };
        Ok(part.append(record, self.config.max_records_per_partition))
    }

    /// Make reads of one partition fail as if its leader timed out.
    pub async fn fail_reads(&self, topic: &str, partition: i32) {
        self.failing_reads
            .write()
            .await
            .insert((topic.to_string(), partition));
    }

    pub async fn restore_reads(&self, topic: &str, partition: i32) {
        self.failing_reads
            .write()
            .await
            .remove(&(topic.to_string(), partition));
    }

    fn nodes(&self) -> Vec<BrokerNode> {
        (0..self.config.brokers)
            .map(|i| BrokerNode {
                id: i as i32,
                host: "localhost".to_string(),
                port: 9092 + i as i32,
            })
            .collect()
    }

    fn choose_partition(&self, key: Option<&Payload>, partition_count: usize) -> i32 {
        let index = match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.as_bytes().hash(&mut hasher);
                hasher.finish() as usize
            }
            None => self.round_robin.fetch_add(1, Ordering::Relaxed),
        };
        (index % partition_count.max(1)) as i32
    }
}

fn new_topic_log(topic: &NewTopic) -> TopicLog {
    TopicLog {
        replication_factor: topic.replication_factor,
        config: topic.config.clone(),
        partitions: (0..topic.partitions).map(|_| PartitionLog::new()).collect(),
    }
}

fn partition_mut<'a>(
    log: &'a mut TopicLog,
    topic: &str,
    partition: i32,
) -> Result<&'a mut PartitionLog, GatewayError> {
    usize::try_from(partition)
        .ok()
        .and_then(|p| log.partitions.get_mut(p))
        .ok_or_else(|| GatewayError::Broker(format!("unknown partition {topic}-{partition}")))
}

impl BrokerAdmin for MemoryCluster {
    fn list_topics(&self) -> BrokerFuture<'_, Vec<Topic>> {
        Box::pin(async move {
            let topics = self.topics.read().await;
            Ok(topics.iter().map(|(name, log)| log.describe(name)).collect())
        })
    }

    fn create_topic(&self, topic: &NewTopic) -> BrokerFuture<'_, bool> {
        let topic = topic.clone();
        Box::pin(async move {
            topic.validate()?;
            if topic.replication_factor as usize > self.config.brokers {
                return Err(GatewayError::InsufficientBrokers {
                    requested: topic.replication_factor,
                    available: self.config.brokers,
                });
            }
            let mut topics = self.topics.write().await;
            if topics.contains_key(&topic.name) {
                return Err(GatewayError::TopicAlreadyExists(topic.name));
            }
            topics.insert(topic.name.clone(), new_topic_log(&topic));
            tracing::debug!(topic = %topic.name, partitions = topic.partitions, "memory topic created");
            Ok(true)
        })
    }

    fn delete_topic(&self, name: &str) -> BrokerFuture<'_, bool> {
        let name = name.to_string();
        Box::pin(async move {
            let mut topics = self.topics.write().await;
            match topics.remove(&name) {
                Some(_) => {
                    self.failing_reads
                        .write()
                        .await
                        .retain(|(topic, _)| topic != &name);
                    Ok(true)
                }
                None => Err(GatewayError::TopicNotFound(name)),
            }
        })
    }

    fn list_partitions(&self, topic: &str) -> BrokerFuture<'_, Vec<i32>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let topics = self.topics.read().await;
            let log = topics
                .get(&topic)
                .ok_or_else(|| GatewayError::TopicNotFound(topic.clone()))?;
            Ok((0..log.partitions.len() as i32).collect())
        })
    }

    fn watermarks(&self, topic: &str, partitions: &[i32]) -> BrokerFuture<'_, Vec<PartitionWatermarks>> {
        let topic = topic.to_string();
        let partitions = partitions.to_vec();
        Box::pin(async move {
            let topics = self.topics.read().await;
            let log = topics
                .get(&topic)
                .ok_or_else(|| GatewayError::TopicNotFound(topic.clone()))?;
            Ok(partitions
                .into_iter()
                .filter_map(|p| {
                    let part = log.partitions.get(usize::try_from(p).ok()?)?;
                    Some(PartitionWatermarks {
                        partition: p,
                        earliest: part.earliest(),
                        latest: part.latest(),
                    })
                })
                .collect())
        })
    }

    fn cluster_info(&self) -> BrokerFuture<'_, ClusterInfo> {
        Box::pin(async move {
            let brokers = self.nodes();
            Ok(ClusterInfo {
                cluster_id: Some(self.config.cluster_id.clone()),
                version: format!("memory {}", env!("CARGO_PKG_VERSION")),
                controller: brokers.first().cloned(),
                brokers,
            })
        })
    }

    fn acl_info(&self) -> BrokerFuture<'_, AclInfo> {
        Box::pin(async move {
            if self.config.deny_acl_describe {
                return Err(GatewayError::AuthorizationDenied(
                    "credential lacks DESCRIBE on CLUSTER".to_string(),
                ));
            }
            Ok(AclInfo {
                cluster_id: Some(self.config.cluster_id.clone()),
                controller: self.nodes().into_iter().next(),
                authorized_operations: vec![
                    "ALTER".to_string(),
                    "CREATE".to_string(),
                    "DESCRIBE".to_string(),
                ],
                entries: self.config.acls.clone(),
            })
        })
    }
}

impl RecordReader for MemoryCluster {
    fn read(
        &self,
        topic: &str,
        partition: i32,
        from_offset: i64,
        max_records: usize,
    ) -> BrokerFuture<'_, Vec<MessageRecord>> {
        let topic = topic.to_string();
        Box::pin(async move {
            if self
                .failing_reads
                .read()
                .await
                .contains(&(topic.clone(), partition))
            {
                return Err(GatewayError::BrokerUnavailable(format!(
                    "leader for {topic}-{partition} did not respond"
                )));
            }
            let topics = self.topics.read().await;
            let log = topics
                .get(&topic)
                .ok_or_else(|| GatewayError::TopicNotFound(topic.clone()))?;
            let part = usize::try_from(partition)
                .ok()
                .and_then(|p| log.partitions.get(p))
                .ok_or_else(|| GatewayError::Broker(format!("unknown partition {topic}-{partition}")))?;
            Ok(part.read(from_offset, max_records))
        })
    }
}

impl RecordProducer for MemoryCluster {
    fn produce(&self, request: &ProduceRequest) -> BrokerFuture<'_, ProduceAck> {
        let request = request.clone();
        Box::pin(async move {
            let mut topics = self.topics.write().await;
            let log = topics
                .get_mut(&request.topic)
                .ok_or_else(|| GatewayError::TopicNotFound(request.topic.clone()))?;
            let partition = match request.partition {
                Some(p) => p,
                None => self.choose_partition(request.key.as_ref(), log.partitions.len()),
            };
            let part = partition_mut(log, &request.topic, partition)?;
            let record = MessageRecord {
                topic: request.topic.clone(),
                partition,
                offset: 0,
                key: request.key,
                value: request.value,
                headers: request.headers,
                timestamp_ms: now_ms().max(part.last_ts_ms),
            };
            let offset = part.append(record, self.config.max_records_per_partition);
            Ok(ProduceAck { partition, offset })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_brokers(brokers: usize) -> MemoryCluster {
        MemoryCluster::new(MemoryClusterConfig {
            brokers,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn create_then_conflict() {
        let cluster = cluster_with_brokers(1);
        assert!(cluster.create_topic(&NewTopic::new("x", 2, 1)).await.unwrap());
        let err = cluster.create_topic(&NewTopic::new("x", 2, 1)).await.unwrap_err();
        assert_eq!(err, GatewayError::TopicAlreadyExists("x".into()));
    }

    #[tokio::test]
    async fn replication_bounded_by_brokers() {
        let cluster = cluster_with_brokers(2);
        let err = cluster.create_topic(&NewTopic::new("x", 1, 3)).await.unwrap_err();
        assert_eq!(err, GatewayError::InsufficientBrokers { requested: 3, available: 2 });
    }

    #[tokio::test]
    async fn delete_missing_topic_is_not_found() {
        let cluster = MemoryCluster::default();
        let err = cluster.delete_topic("ghost").await.unwrap_err();
        assert_eq!(err, GatewayError::TopicNotFound("ghost".into()));
    }

    #[tokio::test]
    async fn retention_moves_earliest_watermark() {
        let cluster = MemoryCluster::new(MemoryClusterConfig {
            max_records_per_partition: 3,
            ..Default::default()
        });
        cluster.create_topic(&NewTopic::new("t", 1, 1)).await.unwrap();
        for i in 0..5 {
            cluster.append("t", 0, None, Payload::from(format!("v{i}")), 100 + i).await.unwrap();
        }
        let marks = cluster.watermarks("t", &[0, 7]).await.unwrap();
        assert_eq!(marks, vec![PartitionWatermarks { partition: 0, earliest: 2, latest: 5 }]);

        let records = cluster.read("t", 0, 0, 10).await.unwrap();
        let offsets: Vec<i64> = records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn keyed_produce_is_sticky() {
        let cluster = MemoryCluster::default();
        cluster.create_topic(&NewTopic::new("t", 4, 1)).await.unwrap();
        let request = ProduceRequest {
            topic: "t".into(),
            partition: None,
            key: Some(Payload::from("user-1")),
            value: Payload::from("a"),
            headers: BTreeMap::new(),
        };
        let first = cluster.produce(&request).await.unwrap();
        let second = cluster.produce(&request).await.unwrap();
        assert_eq!(first.partition, second.partition);
        assert_eq!(second.offset, first.offset + 1);
    }

    #[tokio::test]
    async fn failing_reads_can_be_restored() {
        let cluster = MemoryCluster::default();
        cluster.create_topic(&NewTopic::new("t", 1, 1)).await.unwrap();
        cluster.fail_reads("t", 0).await;
        assert!(cluster.read("t", 0, 0, 1).await.unwrap_err().is_transient());
        cluster.restore_reads("t", 0).await;
        assert!(cluster.read("t", 0, 0, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn acl_describe_can_be_denied() {
        let cluster = MemoryCluster::new(MemoryClusterConfig {
            deny_acl_describe: true,
            ..Default::default()
        });
        assert!(matches!(
            cluster.acl_info().await,
            Err(GatewayError::AuthorizationDenied(_))
        ));
    }

    #[test]
    fn config_json_defaults() {
        let cluster = MemoryCluster::from_config_json("{}").unwrap();
        assert_eq!(cluster.config.brokers, 1);
        let cluster = MemoryCluster::from_config_json(r#"{"brokers": 3}"#).unwrap();
        assert_eq!(cluster.config.brokers, 3);
        assert_eq!(cluster.config.max_records_per_partition, 100_000);
    }
}
