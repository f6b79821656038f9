//! Apache Kafka backend of the gateway, on top of librdkafka.

mod convert;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic as KafkaNewTopic, ResourceSpecifier, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};

use broker_api::{
    AclInfo, BrokerAdmin, BrokerFuture, ClusterInfo, GatewayError, MessageRecord,
    NewTopic, PartitionWatermarks, ProduceAck, ProduceRequest, RecordProducer, RecordReader, Topic,
};

use convert::{
    ClusterMeta, classify, creation_error, map_kafka_error, reached_partition_end, record_from,
};

// ═══════════════════════════════════════════════════════════════
//  KafkaClusterConfig
// ═══════════════════════════════════════════════════════════════

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_client_id() -> String {
    "broker-gateway".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct KafkaClusterConfig {
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Deadline handed to librdkafka for metadata, admin and produce calls.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Extra librdkafka properties (`security.protocol`, `sasl.*`, ...).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Default for KafkaClusterConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            client_id: default_client_id(),
            request_timeout_ms: default_request_timeout_ms(),
            properties: BTreeMap::new(),
        }
    }
}

impl KafkaClusterConfig {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("client.id", &self.client_id);
        for (key, value) in &self.properties {
            config.set(key, value);
        }
        config
    }

    /// Settings of the short-lived consumers used for partition reads.
    /// They never join a group rebalance nor commit, and report the end of
    /// the partition so a read can stop short of the high watermark.
    fn reader_config(&self) -> ClientConfig {
        let mut config = self.client_config();
        config
            .set("group.id", format!("{}-browse", self.client_id))
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "true");
        config
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaCluster
// ═══════════════════════════════════════════════════════════════

/// Admin, reader and producer sides of one Kafka cluster.
///
/// Metadata and watermark lookups are blocking in librdkafka and run on
/// the blocking pool; admin operations and produce are native futures.
pub struct KafkaCluster {
    admin: Arc<AdminClient<DefaultClientContext>>,
    producer: FutureProducer,
    reader_config: ClientConfig,
    timeout: Duration,
}

impl KafkaCluster {
    pub fn new(config: KafkaClusterConfig) -> Result<Self, GatewayError> {
        let client_config = config.client_config();
        let admin: AdminClient<DefaultClientContext> = client_config
            .create()
            .map_err(|e| GatewayError::BrokerUnavailable(format!("admin client: {e}")))?;
        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| GatewayError::BrokerUnavailable(format!("producer: {e}")))?;

        tracing::info!(
            bootstrap_servers = %config.bootstrap_servers,
            client_id = %config.client_id,
            "kafka cluster client created"
        );
        Ok(Self {
            admin: Arc::new(admin),
            producer,
            reader_config: config.reader_config(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    /// Build from a JSON config; `"{}"` yields the defaults.
    pub fn from_config_json(config_json: &str) -> Result<Self, GatewayError> {
        let config: KafkaClusterConfig = serde_json::from_str(config_json)?;
        Self::new(config)
    }

    fn admin_options(&self) -> AdminOptions {
        AdminOptions::new()
            .operation_timeout(Some(self.timeout))
            .request_timeout(Some(self.timeout))
    }

    async fn metadata(&self, topic: Option<&str>) -> Result<ClusterMeta, GatewayError> {
        let admin = self.admin.clone();
        let timeout = self.timeout;
        let topic = topic.map(str::to_string);
        blocking(move || {
            admin
                .inner()
                .fetch_metadata(topic.as_deref(), timeout)
                .map(|md| ClusterMeta::from_metadata(&md))
                .map_err(|e| map_kafka_error(e, topic.as_deref()))
        })
        .await
    }

    /// Non-default, non-sensitive config entries per topic. Failure only
    /// costs the config column, so it is logged and swallowed.
    async fn topic_configs(&self, names: &[String]) -> HashMap<String, HashMap<String, String>> {
        let mut configs = HashMap::new();
        if names.is_empty() {
            return configs;
        }
        let specs: Vec<ResourceSpecifier<'_>> = names.iter().map(|n| ResourceSpecifier::Topic(n.as_str())).collect();
        let results = match self.admin.describe_configs(&specs, &self.admin_options()).await {
            Ok(results) => results,
            Err(e) => {
                tracing::debug!(error = %e, "topic config describe failed");
                return configs;
            }
        };
        for (name, result) in names.iter().zip(results) {
            if let Ok(resource) = result {
                let entries = resource
                    .entries
                    .into_iter()
                    .filter(|e| !e.is_default && !e.is_sensitive)
                    .filter_map(|e| Some((e.name, e.value?)))
                    .collect();
                configs.insert(name.clone(), entries);
            }
        }
        configs
    }
}

async fn blocking<T, F>(call: F) -> Result<T, GatewayError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, GatewayError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| GatewayError::Broker(format!("blocking task failed: {e}")))?
}

impl BrokerAdmin for KafkaCluster {
    fn list_topics(&self) -> BrokerFuture<'_, Vec<Topic>> {
        Box::pin(async move {
            let md = self.metadata(None).await?;
            let names: Vec<String> = md
                .topics
                .iter()
                .filter(|t| t.error.is_none())
                .map(|t| t.name.clone())
                .collect();
            let mut configs = self.topic_configs(&names).await;
            Ok(md
                .topics
                .iter()
                .filter(|t| t.error.is_none())
                .map(|t| t.to_topic(configs.remove(&t.name).unwrap_or_default()))
                .collect())
        })
    }

    fn create_topic(&self, topic: &NewTopic) -> BrokerFuture<'_, bool> {
        let topic = topic.clone();
        Box::pin(async move {
            topic.validate()?;
            let md = self.metadata(None).await?;
            if topic.replication_factor as usize > md.brokers.len() {
                return Err(GatewayError::InsufficientBrokers {
                    requested: topic.replication_factor,
                    available: md.brokers.len(),
                });
            }

            let mut request = KafkaNewTopic::new(
                &topic.name,
                topic.partitions,
                TopicReplication::Fixed(i32::from(topic.replication_factor)),
            );
            for (key, value) in &topic.config {
                request = request.set(key, value);
            }
            let results = self
                .admin
                .create_topics(&[request], &self.admin_options())
                .await
                .map_err(|e| map_kafka_error(e, Some(&topic.name)))?;

            match results.into_iter().next() {
                Some(Ok(_)) => Ok(true),
                Some(Err((_, code))) => Err(creation_error(code, &topic, md.brokers.len())),
                None => Ok(false),
            }
        })
    }

    fn delete_topic(&self, name: &str) -> BrokerFuture<'_, bool> {
        let name = name.to_string();
        Box::pin(async move {
            let results = self
                .admin
                .delete_topics(&[name.as_str()], &self.admin_options())
                .await
                .map_err(|e| map_kafka_error(e, Some(&name)))?;

            match results.into_iter().next() {
                Some(Ok(_)) => Ok(true),
                Some(Err((topic, code))) => Err(classify(code, Some(&topic))),
                None => Ok(false),
            }
        })
    }

    fn list_partitions(&self, topic: &str) -> BrokerFuture<'_, Vec<i32>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let md = self.metadata(Some(&topic)).await?;
            Ok(md.topic(&topic)?.partition_ids())
        })
    }

    fn watermarks(&self, topic: &str, partitions: &[i32]) -> BrokerFuture<'_, Vec<PartitionWatermarks>> {
        let topic = topic.to_string();
        let partitions = partitions.to_vec();
        Box::pin(async move {
            let md = self.metadata(Some(&topic)).await?;
            let live = md.topic(&topic)?.partition_ids();
            let wanted: Vec<i32> = partitions.into_iter().filter(|p| live.contains(p)).collect();

            let admin = self.admin.clone();
            let timeout = self.timeout;
            blocking(move || {
                wanted
                    .into_iter()
                    .map(|partition| -> Result<PartitionWatermarks, GatewayError> {
                        let (earliest, latest) = admin
                            .inner()
                            .fetch_watermarks(&topic, partition, timeout)
                            .map_err(|e| map_kafka_error(e, Some(&topic)))?;
                        Ok(PartitionWatermarks {
                            partition,
                            earliest,
                            latest,
                        })
                    })
                    .collect()
            })
            .await
        })
    }

    fn cluster_info(&self) -> BrokerFuture<'_, ClusterInfo> {
        Box::pin(async move {
            let md = self.metadata(None).await?;
            let admin = self.admin.clone();
            let timeout = self.timeout;
            let cluster_id = blocking(move || Ok(admin.inner().fetch_cluster_id(timeout))).await?;
            let (_, version) = rdkafka::util::get_rdkafka_version();
            Ok(ClusterInfo {
                cluster_id,
                version: format!("librdkafka {version}"),
                brokers: md.brokers,
                // librdkafka does not expose the controller id
                controller: None,
            })
        })
    }

    fn acl_info(&self) -> BrokerFuture<'_, AclInfo> {
        Box::pin(async { Err::<AclInfo, _>(GatewayError::Unsupported("ACL describe")) })
    }
}

impl RecordReader for KafkaCluster {
    fn read(
        &self,
        topic: &str,
        partition: i32,
        from_offset: i64,
        max_records: usize,
    ) -> BrokerFuture<'_, Vec<MessageRecord>> {
        let topic = topic.to_string();
        let config = self.reader_config.clone();
        let timeout = self.timeout;
        Box::pin(blocking(move || {
            read_partition(&config, &topic, partition, from_offset, max_records, timeout)
        }))
    }
}

/// Assign a throwaway consumer to one partition and poll until
/// `max_records` records, the high watermark or the partition end are
/// reached. A read that cannot complete before `timeout` fails as a whole:
/// a truncated prefix would let the page skip the offsets above it.
fn read_partition(
    config: &ClientConfig,
    topic: &str,
    partition: i32,
    from_offset: i64,
    max_records: usize,
    timeout: Duration,
) -> Result<Vec<MessageRecord>, GatewayError> {
    let consumer: BaseConsumer = config
        .create()
        .map_err(|e| GatewayError::BrokerUnavailable(format!("consumer: {e}")))?;

    let (_, high) = consumer
        .fetch_watermarks(topic, partition, timeout)
        .map_err(|e| map_kafka_error(e, Some(topic)))?;
    let wanted = i64::try_from(max_records).unwrap_or(i64::MAX);
    let until = high.min(from_offset.saturating_add(wanted));
    if from_offset >= until {
        return Ok(Vec::new());
    }

    let mut assignment = TopicPartitionList::new();
    assignment
        .add_partition_offset(topic, partition, Offset::Offset(from_offset))
        .map_err(|e| map_kafka_error(e, Some(topic)))?;
    consumer
        .assign(&assignment)
        .map_err(|e| map_kafka_error(e, Some(topic)))?;

    let deadline = Instant::now() + timeout;
    let mut records = Vec::new();
    let mut next = from_offset;
    while next < until && records.len() < max_records {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(GatewayError::timed_out(format!("read of {topic}-{partition}"), timeout));
        }
        match consumer.poll(remaining.min(Duration::from_millis(250))) {
            None => continue,
            Some(Ok(msg)) => {
                let record = record_from(&msg);
                next = record.offset + 1;
                records.push(record);
            }
            Some(Err(e)) if reached_partition_end(&e) => break,
            Some(Err(e)) => return Err(map_kafka_error(e, Some(topic))),
        }
    }
    Ok(records)
}

impl RecordProducer for KafkaCluster {
    fn produce(&self, request: &ProduceRequest) -> BrokerFuture<'_, ProduceAck> {
        let request = request.clone();
        Box::pin(async move {
            let mut headers = OwnedHeaders::new();
            for (key, value) in &request.headers {
                headers = headers.insert(Header {
                    key,
                    value: Some(value),
                });
            }

            let mut record = FutureRecord::<[u8], [u8]>::to(&request.topic)
                .payload(request.value.as_bytes())
                .headers(headers);
            if let Some(key) = &request.key {
                record = record.key(key.as_bytes());
            }
            if let Some(partition) = request.partition {
                record = record.partition(partition);
            }

            let (partition, offset) = self
                .producer
                .send(record, self.timeout)
                .await
                .map_err(|(e, _)| map_kafka_error(e, Some(&request.topic)))?;
            tracing::debug!(topic = %request.topic, partition, offset, "kafka record delivered");
            Ok(ProduceAck { partition, offset })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config: KafkaClusterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.bootstrap_servers, "localhost:9092");
        assert_eq!(config.client_id, "broker-gateway");
        assert_eq!(config.request_timeout_ms, 10_000);
        assert!(config.properties.is_empty());
    }

    #[test]
    fn properties_reach_the_client_config() {
        let config: KafkaClusterConfig = serde_json::from_str(
            r#"{"bootstrap_servers":"k1:9093","properties":{"security.protocol":"SSL"}}"#,
        )
        .unwrap();
        let client = config.client_config();
        assert_eq!(client.get("bootstrap.servers"), Some("k1:9093"));
        assert_eq!(client.get("security.protocol"), Some("SSL"));

        let reader = config.reader_config();
        assert_eq!(reader.get("group.id"), Some("broker-gateway-browse"));
        assert_eq!(reader.get("enable.auto.commit"), Some("false"));
        assert_eq!(reader.get("enable.partition.eof"), Some("true"));
    }
}
