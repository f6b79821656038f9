use std::future::Future;
use std::pin::Pin;

use crate::{
    AclInfo, ClusterInfo, GatewayError, MessageRecord, NewTopic, PartitionWatermarks,
    ProduceAck, ProduceRequest, Topic,
};

/// Boxed future returned by every collaborator method.
pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

// ════════════════════════════════════════════════════════════════
//  Broker collaborator traits
// ════════════════════════════════════════════════════════════════

/// Topic lifecycle and metadata against the cluster.
///
/// Stateless request/response: no caching, no internal retries. Each call
/// may be retried independently by the caller.
pub trait BrokerAdmin: Send + Sync {
    /// All topics visible to the configured credentials.
    fn list_topics(&self) -> BrokerFuture<'_, Vec<Topic>>;

    /// `Ok(true)` only on confirmed creation. An existing topic is an
    /// error (`TopicAlreadyExists`), never a silent `false`.
    fn create_topic(&self, topic: &NewTopic) -> BrokerFuture<'_, bool>;

    /// `Ok(true)` on confirmed deletion; `TopicNotFound` if absent.
    /// Deletion completes asynchronously on the broker, so listings may
    /// still show the topic for a while.
    fn delete_topic(&self, name: &str) -> BrokerFuture<'_, bool>;

    /// Partition indices `0..N-1` in ascending order.
    fn list_partitions(&self, topic: &str) -> BrokerFuture<'_, Vec<i32>>;

    /// Watermarks for the requested partitions. Partitions the broker does
    /// not know (e.g. deleted concurrently) are left out of the result.
    fn watermarks(&self, topic: &str, partitions: &[i32]) -> BrokerFuture<'_, Vec<PartitionWatermarks>>;

    fn cluster_info(&self) -> BrokerFuture<'_, ClusterInfo>;

    fn acl_info(&self) -> BrokerFuture<'_, AclInfo>;
}

/// Bounded forward reads from a single partition.
pub trait RecordReader: Send + Sync {
    /// Up to `max_records` records starting at `from_offset`, ascending by
    /// offset. An empty result is not an error.
    fn read(
        &self,
        topic: &str,
        partition: i32,
        from_offset: i64,
        max_records: usize,
    ) -> BrokerFuture<'_, Vec<MessageRecord>>;
}

/// Single-record publish.
pub trait RecordProducer: Send + Sync {
    fn produce(&self, request: &ProduceRequest) -> BrokerFuture<'_, ProduceAck>;
}
