use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use broker_api::{
    BrokerAdmin, GatewayError, MessagePage, MessageRecord, OrderingPolicy, PartitionDiagnostic,
    PartitionWatermarks, RecordReader,
};

use crate::bounded;
use crate::merge::{self, Lane};

/// Cuts one display page out of several partitions.
///
/// Every partition is read concurrently inside the offset window derived
/// from its position, the lanes are merged by timestamp and the result is
/// truncated to the page size. A partition whose read fails transiently is
/// reported as a diagnostic and the rest of the page is still served; any
/// other failure fails the fetch.
pub struct PageFetcher {
    admin: Arc<dyn BrokerAdmin>,
    reader: Arc<dyn RecordReader>,
    read_timeout: Duration,
}

impl PageFetcher {
    pub fn new(admin: Arc<dyn BrokerAdmin>, reader: Arc<dyn RecordReader>, read_timeout: Duration) -> Self {
        Self {
            admin,
            reader,
            read_timeout,
        }
    }

    /// One page from `positions`. A `NewestFirst` continuation must keep
    /// the page size of the page its positions came from.
    pub async fn fetch(
        &self,
        topic: &str,
        positions: &BTreeMap<i32, i64>,
        policy: OrderingPolicy,
        page_size: usize,
    ) -> Result<MessagePage, GatewayError> {
        if page_size == 0 {
            return Err(GatewayError::InvalidRequest("page size must be positive".into()));
        }

        // Dropping the set aborts reads still in flight.
        let mut reads = JoinSet::new();
        for (&partition, &position) in positions {
            let admin = self.admin.clone();
            let reader = self.reader.clone();
            let topic = topic.to_string();
            let timeout = self.read_timeout;
            reads.spawn(async move {
                let outcome =
                    read_lane(admin, reader, &topic, partition, position, policy, page_size, timeout).await;
                (partition, outcome)
            });
        }

        let mut outcomes = BTreeMap::new();
        while let Some(joined) = reads.join_next().await {
            let (partition, outcome) =
                joined.map_err(|e| GatewayError::Broker(format!("read task failed: {e}")))?;
            outcomes.insert(partition, outcome);
        }

        let mut lanes = Vec::with_capacity(outcomes.len());
        let mut diagnostics = Vec::new();
        for (partition, outcome) in outcomes {
            match outcome {
                Ok(records) => lanes.push(Lane::new(records, policy)),
                Err(e) if e.is_transient() => {
                    tracing::warn!(topic = %topic, partition, error = %e, "partition read failed");
                    diagnostics.push(PartitionDiagnostic::from_error(partition, &e));
                }
                Err(e) => {
                    tracing::debug!(topic = %topic, partition, error = %e, "page fetch aborted");
                    return Err(e);
                }
            }
        }

        if !positions.is_empty() && lanes.is_empty() {
            tracing::error!(
                topic = %topic,
                partitions = positions.len(),
                "every partition read failed, serving an empty page"
            );
        }

        let records = merge::merge(lanes, policy, page_size);
        let resume_offsets = merge::resume_offsets(positions, &records, policy, page_size);

        tracing::debug!(
            topic = %topic,
            policy = ?policy,
            records = records.len(),
            failed = diagnostics.len(),
            "page fetched"
        );

        Ok(MessagePage {
            records,
            resume_offsets,
            diagnostics,
        })
    }
}

#[allow(clippy::too_many_arguments)]
async fn read_lane(
    admin: Arc<dyn BrokerAdmin>,
    reader: Arc<dyn RecordReader>,
    topic: &str,
    partition: i32,
    position: i64,
    policy: OrderingPolicy,
    page_size: usize,
    timeout: Duration,
) -> Result<Vec<MessageRecord>, GatewayError> {
    let marks = bounded("watermark lookup", timeout, admin.watermarks(topic, &[partition])).await?;
    let Some(marks) = marks.into_iter().find(|m| m.partition == partition) else {
        tracing::debug!(topic = %topic, partition, "partition vanished before read");
        return Ok(Vec::new());
    };

    let (from, to) = read_window(&marks, position, policy, page_size);
    if from >= to {
        return Ok(Vec::new());
    }

    let max_records = usize::try_from(to - from).unwrap_or(page_size);
    let mut records = bounded(
        "partition read",
        timeout,
        reader.read(topic, partition, from, max_records),
    )
    .await?;
    records.retain(|r| r.offset >= from && r.offset < to);
    Ok(records)
}

/// Half-open offset range `[from, to)` a page may take from one partition.
///
/// Both policies read forward from `position`. `OldestFirst` takes up to
/// `page_size` offsets from the first retained one. For `NewestFirst`
/// the window is anchored at `position + page_size`, its upper end, so a
/// position below `earliest` only shrinks it. Both ends are clamped to the
/// retained range. An empty range comes back as `from == to`.
pub fn read_window(
    marks: &PartitionWatermarks,
    position: i64,
    policy: OrderingPolicy,
    page_size: usize,
) -> (i64, i64) {
    let size = i64::try_from(page_size).unwrap_or(i64::MAX);
    let from = position.max(marks.earliest);
    let end = match policy {
        OrderingPolicy::OldestFirst => from.saturating_add(size),
        OrderingPolicy::NewestFirst => position.saturating_add(size),
    };
    let to = end.min(marks.latest);
    (from, to.max(from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marks(earliest: i64, latest: i64) -> PartitionWatermarks {
        PartitionWatermarks { partition: 0, earliest, latest }
    }

    #[test]
    fn oldest_first_reads_forward() {
        assert_eq!(read_window(&marks(0, 10), 0, OrderingPolicy::OldestFirst, 3), (0, 3));
        assert_eq!(read_window(&marks(0, 10), 8, OrderingPolicy::OldestFirst, 3), (8, 10));
        assert_eq!(read_window(&marks(0, 10), 10, OrderingPolicy::OldestFirst, 3), (10, 10));
    }

    #[test]
    fn newest_first_window_ends_a_page_above_the_position() {
        assert_eq!(read_window(&marks(0, 10), 7, OrderingPolicy::NewestFirst, 3), (7, 10));
        assert_eq!(read_window(&marks(0, 10), 2, OrderingPolicy::NewestFirst, 3), (2, 5));
        // continuation below the first retained offset
        assert_eq!(read_window(&marks(0, 10), -2, OrderingPolicy::NewestFirst, 3), (0, 1));
        assert_eq!(read_window(&marks(0, 10), -3, OrderingPolicy::NewestFirst, 3), (0, 0));
        // no hint: the tail itself
        assert_eq!(read_window(&marks(0, 10), 10, OrderingPolicy::NewestFirst, 3), (10, 10));
    }

    #[test]
    fn stale_positions_are_clamped() {
        // retention moved past the position
        assert_eq!(read_window(&marks(5, 10), 1, OrderingPolicy::OldestFirst, 3), (5, 8));
        assert_eq!(read_window(&marks(5, 10), 1, OrderingPolicy::NewestFirst, 3), (5, 5));
        assert_eq!(read_window(&marks(5, 10), 3, OrderingPolicy::NewestFirst, 3), (5, 6));
        // position beyond the log end
        assert_eq!(read_window(&marks(0, 4), 50, OrderingPolicy::NewestFirst, 3), (50, 50));
        assert_eq!(read_window(&marks(0, 4), 50, OrderingPolicy::OldestFirst, 3), (50, 50));
    }

    #[test]
    fn empty_partition_yields_empty_window() {
        for policy in [OrderingPolicy::OldestFirst, OrderingPolicy::NewestFirst] {
            let (from, to) = read_window(&marks(7, 7), 7, policy, 20);
            assert_eq!(from, to);
        }
    }
}
