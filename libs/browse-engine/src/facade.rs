use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use broker_api::{
    AclInfo, BrokerAdmin, ClusterInfo, GatewayError, MessagePage, NewTopic, OrderingPolicy,
    Payload, ProduceRequest, RecordProducer, RecordReader, Topic,
};

use crate::{BrowseSettings, OffsetResolver, PageFetcher, bounded};

// ═══════════════════════════════════════════════════════════════
//  BrowsingService
// ═══════════════════════════════════════════════════════════════

/// Entry point of the gateway: topic lifecycle plus paged browsing.
///
/// Holds no mutable state; every call recomputes its view from the
/// cluster, so one instance can be shared by any number of sessions.
pub struct BrowsingService {
    admin: Arc<dyn BrokerAdmin>,
    producer: Arc<dyn RecordProducer>,
    resolver: OffsetResolver,
    fetcher: PageFetcher,
    settings: BrowseSettings,
}

impl BrowsingService {
    pub fn new(
        admin: Arc<dyn BrokerAdmin>,
        reader: Arc<dyn RecordReader>,
        producer: Arc<dyn RecordProducer>,
        settings: BrowseSettings,
    ) -> Self {
        Self {
            resolver: OffsetResolver::new(admin.clone(), settings.admin_timeout()),
            fetcher: PageFetcher::new(admin.clone(), reader, settings.read_timeout()),
            admin,
            producer,
            settings,
        }
    }

    pub fn settings(&self) -> &BrowseSettings {
        &self.settings
    }

    // ── topic lifecycle ─────────────────────────────────────────

    /// All visible topics, sorted by name.
    pub async fn get_topics(&self) -> Result<Vec<Topic>, GatewayError> {
        let mut topics = bounded("topic listing", self.settings.admin_timeout(), self.admin.list_topics()).await?;
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(topics)
    }

    /// Create a topic and return the refreshed listing.
    pub async fn create_topic(
        &self,
        name: &str,
        partitions: i32,
        replication_factor: i16,
        config: HashMap<String, String>,
    ) -> Result<Vec<Topic>, GatewayError> {
        let topic = NewTopic::new(name, partitions, replication_factor).with_config(config);
        topic.validate()?;

        let created = bounded(
            "topic creation",
            self.settings.admin_timeout(),
            self.admin.create_topic(&topic),
        )
        .await?;
        if !created {
            tracing::warn!(topic = %name, "broker did not confirm topic creation");
            return Err(GatewayError::CreationNotConfirmed(name.to_string()));
        }

        tracing::info!(topic = %name, partitions, replication_factor, "topic created");
        self.get_topics().await
    }

    /// Delete a topic and return the refreshed listing. The broker deletes
    /// asynchronously, so the listing may still contain it for a while.
    pub async fn delete_topic(&self, name: &str) -> Result<Vec<Topic>, GatewayError> {
        let deleted = bounded(
            "topic deletion",
            self.settings.admin_timeout(),
            self.admin.delete_topic(name),
        )
        .await?;
        if !deleted {
            tracing::warn!(topic = %name, "broker did not confirm topic deletion");
            return Err(GatewayError::DeletionNotConfirmed(name.to_string()));
        }

        tracing::info!(topic = %name, "topic deleted");
        self.get_topics().await
    }

    pub async fn get_partitions(&self, topic: &str) -> Result<Vec<i32>, GatewayError> {
        bounded(
            "partition listing",
            self.settings.admin_timeout(),
            self.admin.list_partitions(topic),
        )
        .await
    }

    // ── browsing ────────────────────────────────────────────────

    /// Starting positions per partition. An empty `partitions` means all of
    /// them.
    pub async fn get_offsets(
        &self,
        topic: &str,
        partitions: &[i32],
        policy: OrderingPolicy,
        page_size_hint: Option<usize>,
    ) -> Result<BTreeMap<i32, i64>, GatewayError> {
        let partitions = if partitions.is_empty() {
            self.get_partitions(topic).await?
        } else {
            partitions.to_vec()
        };
        self.resolver
            .resolve(topic, &partitions, policy, page_size_hint)
            .await
    }

    /// One page from explicit positions, typically the `resume_offsets` of
    /// the previous page or `get_offsets` with `page_size` as hint. Without
    /// positions, browsing starts fresh from the same resolution.
    pub async fn get_messages(
        &self,
        topic: &str,
        policy: OrderingPolicy,
        page_size: usize,
        positions: Option<BTreeMap<i32, i64>>,
    ) -> Result<MessagePage, GatewayError> {
        if page_size == 0 {
            return Err(GatewayError::InvalidRequest("page size must be positive".into()));
        }
        let positions = match positions {
            Some(positions) if !positions.is_empty() => positions,
            _ => self.get_offsets(topic, &[], policy, Some(page_size)).await?,
        };
        self.fetcher.fetch(topic, &positions, policy, page_size).await
    }

    /// The latest page of a topic, newest record first.
    pub async fn get_topic_messages(&self, topic: &str) -> Result<MessagePage, GatewayError> {
        let page_size = self.settings.page_size;
        let positions = self
            .get_offsets(topic, &[], OrderingPolicy::NewestFirst, Some(page_size))
            .await?;
        self.fetcher
            .fetch(topic, &positions, OrderingPolicy::NewestFirst, page_size)
            .await
    }

    /// Publish one record, then return the latest page.
    ///
    /// A negative `partition` lets the broker choose. The page is read
    /// right after the acknowledgement; a broker with visibility latency
    /// may still serve a page without the new record.
    pub async fn publish_and_refresh(
        &self,
        topic: &str,
        partition: i32,
        key: Option<Payload>,
        value: Payload,
        headers: BTreeMap<String, String>,
    ) -> Result<MessagePage, GatewayError> {
        let request = ProduceRequest {
            topic: topic.to_string(),
            partition: (partition >= 0).then_some(partition),
            key,
            value,
            headers,
        };
        let ack = bounded(
            "produce",
            self.settings.admin_timeout(),
            self.producer.produce(&request),
        )
        .await?;
        tracing::info!(topic = %topic, partition = ack.partition, offset = ack.offset, "record published");

        self.get_topic_messages(topic).await
    }

    // ── cluster metadata ────────────────────────────────────────

    pub async fn get_info(&self) -> Result<ClusterInfo, GatewayError> {
        bounded("cluster describe", self.settings.admin_timeout(), self.admin.cluster_info()).await
    }

    pub async fn get_acl_info(&self) -> Result<AclInfo, GatewayError> {
        bounded("ACL describe", self.settings.admin_timeout(), self.admin.acl_info()).await
    }
}
