use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use broker_api::{BrokerAdmin, GatewayError, OrderingPolicy, PartitionWatermarks};

use crate::bounded;

/// Computes where browsing starts in each partition.
///
/// The position handed out is what [`crate::PageFetcher`] expects: the
/// first offset of the window a page is read from. For `NewestFirst` that
/// window has to end at the tail, so the caller passes the page size it is
/// about to fetch as `page_size_hint`.
pub struct OffsetResolver {
    admin: Arc<dyn BrokerAdmin>,
    timeout: Duration,
}

impl OffsetResolver {
    pub fn new(admin: Arc<dyn BrokerAdmin>, timeout: Duration) -> Self {
        Self { admin, timeout }
    }

    /// Starting offset per live partition.
    ///
    /// With a `page_size_hint`, `NewestFirst` yields
    /// `max(earliest, latest - hint)`: the first offset of roughly the last
    /// `hint` records. Without it, the tail itself, from which nothing is
    /// retained yet. Concurrent writes may move the tail while this runs,
    /// so "last N" is approximate.
    ///
    /// Partitions the broker no longer reports are dropped from the map.
    pub async fn resolve(
        &self,
        topic: &str,
        partitions: &[i32],
        policy: OrderingPolicy,
        page_size_hint: Option<usize>,
    ) -> Result<BTreeMap<i32, i64>, GatewayError> {
        let marks = bounded(
            "watermark lookup",
            self.timeout,
            self.admin.watermarks(topic, partitions),
        )
        .await?;

        let offsets: BTreeMap<i32, i64> = marks
            .iter()
            .filter(|m| partitions.contains(&m.partition))
            .map(|m| {
                let offset = match page_size_hint {
                    Some(hint) if policy == OrderingPolicy::NewestFirst => {
                        window_start(m.earliest, m.latest, hint)
                    }
                    _ => start_position(m, policy),
                };
                (m.partition, offset)
            })
            .collect();

        if offsets.len() < partitions.len() {
            tracing::debug!(
                topic = %topic,
                requested = partitions.len(),
                live = offsets.len(),
                "some partitions vanished during offset resolution"
            );
        }
        Ok(offsets)
    }
}

/// Position a fresh browse starts from. Empty partitions collapse to
/// `earliest` under both policies.
pub fn start_position(marks: &PartitionWatermarks, policy: OrderingPolicy) -> i64 {
    match policy {
        OrderingPolicy::OldestFirst => marks.earliest,
        OrderingPolicy::NewestFirst => marks.latest.max(marks.earliest),
    }
}

/// First offset of the `size` records directly below `tail`, clamped to
/// what the broker still retains.
pub fn window_start(earliest: i64, tail: i64, size: usize) -> i64 {
    let size = i64::try_from(size).unwrap_or(i64::MAX);
    tail.saturating_sub(size).max(earliest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marks(earliest: i64, latest: i64) -> PartitionWatermarks {
        PartitionWatermarks { partition: 0, earliest, latest }
    }

    #[test]
    fn fresh_positions_per_policy() {
        let m = marks(3, 10);
        assert_eq!(start_position(&m, OrderingPolicy::OldestFirst), 3);
        assert_eq!(start_position(&m, OrderingPolicy::NewestFirst), 10);
    }

    #[test]
    fn empty_partition_has_single_position() {
        let m = marks(42, 42);
        assert_eq!(start_position(&m, OrderingPolicy::OldestFirst), 42);
        assert_eq!(start_position(&m, OrderingPolicy::NewestFirst), 42);
        assert_eq!(window_start(m.earliest, m.latest, 20), 42);
    }

    #[test]
    fn window_is_clamped_to_retention() {
        assert_eq!(window_start(0, 100, 20), 80);
        assert_eq!(window_start(90, 100, 20), 90);
        assert_eq!(window_start(0, 5, usize::MAX), 0);
    }
}
