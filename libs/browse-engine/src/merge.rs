use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, VecDeque};

use broker_api::{MessageRecord, OrderingPolicy};

/// Records of one partition, queued in the order the page consumes them:
/// ascending offsets for `OldestFirst`, descending for `NewestFirst`.
pub(crate) struct Lane {
    records: VecDeque<MessageRecord>,
}

impl Lane {
    pub(crate) fn new(mut records: Vec<MessageRecord>, policy: OrderingPolicy) -> Self {
        records.sort_by_key(|r| r.offset);
        if policy == OrderingPolicy::NewestFirst {
            records.reverse();
        }
        Self {
            records: records.into(),
        }
    }
}

/// Heap priority of a lane head. The max-heap pops the record that comes
/// first on the page; ties resolve to the lower partition, then the lower
/// offset.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum HeadKey {
    Oldest(Reverse<(i64, i32, i64)>),
    Newest((i64, Reverse<i32>, Reverse<i64>)),
}

fn head_key(record: &MessageRecord, policy: OrderingPolicy) -> HeadKey {
    match policy {
        OrderingPolicy::OldestFirst => {
            HeadKey::Oldest(Reverse((record.timestamp_ms, record.partition, record.offset)))
        }
        OrderingPolicy::NewestFirst => HeadKey::Newest((
            record.timestamp_ms,
            Reverse(record.partition),
            Reverse(record.offset),
        )),
    }
}

/// K-way merge of partition lanes by timestamp, cut at `limit`.
///
/// Each lane is consumed strictly in its own offset order, so what a page
/// takes from a partition is always a contiguous run next to the starting
/// position, even when producer timestamps go backwards.
pub(crate) fn merge(lanes: Vec<Lane>, policy: OrderingPolicy, limit: usize) -> Vec<MessageRecord> {
    let mut lanes = lanes;
    let mut heap = BinaryHeap::with_capacity(lanes.len());
    for (index, lane) in lanes.iter().enumerate() {
        if let Some(head) = lane.records.front() {
            heap.push((head_key(head, policy), index));
        }
    }

    let mut page = Vec::with_capacity(limit.min(1024));
    while page.len() < limit {
        let Some((_, index)) = heap.pop() else {
            break;
        };
        let lane = &mut lanes[index];
        if let Some(record) = lane.records.pop_front() {
            if let Some(next) = lane.records.front() {
                heap.push((head_key(next, policy), index));
            }
            page.push(record);
        }
    }
    page
}

/// Positions to resume from after `included` was shown.
///
/// `OldestFirst`: one past the highest included offset. `NewestFirst`: the
/// start of the window of `page_size` offsets ending just below the lowest
/// included one. That start may precede the first retained offset, or even
/// zero; the window keeps its upper end and is clamped when read.
/// Partitions with nothing included keep their position.
pub(crate) fn resume_offsets(
    positions: &BTreeMap<i32, i64>,
    included: &[MessageRecord],
    policy: OrderingPolicy,
    page_size: usize,
) -> BTreeMap<i32, i64> {
    let size = i64::try_from(page_size).unwrap_or(i64::MAX);
    let mut bounds: BTreeMap<i32, i64> = BTreeMap::new();
    for record in included {
        bounds
            .entry(record.partition)
            .and_modify(|bound| {
                *bound = match policy {
                    OrderingPolicy::OldestFirst => (*bound).max(record.offset),
                    OrderingPolicy::NewestFirst => (*bound).min(record.offset),
                }
            })
            .or_insert(record.offset);
    }

    let mut resume = positions.clone();
    for (partition, bound) in bounds {
        let next = match policy {
            OrderingPolicy::OldestFirst => bound + 1,
            OrderingPolicy::NewestFirst => bound.saturating_sub(size),
        };
        resume.insert(partition, next);
    }
    resume
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_api::Payload;

    fn rec(partition: i32, offset: i64, ts: i64) -> MessageRecord {
        MessageRecord {
            topic: "t".into(),
            partition,
            offset,
            key: None,
            value: Payload::from(format!("p{partition}-{offset}")),
            headers: Default::default(),
            timestamp_ms: ts,
        }
    }

    fn ids(page: &[MessageRecord]) -> Vec<(i32, i64)> {
        page.iter().map(|r| (r.partition, r.offset)).collect()
    }

    #[test]
    fn newest_first_orders_by_descending_timestamp() {
        let lanes = vec![
            Lane::new(vec![rec(0, 2, 104), rec(0, 3, 106), rec(0, 4, 108)], OrderingPolicy::NewestFirst),
            Lane::new(vec![rec(1, 0, 101), rec(1, 1, 103), rec(1, 2, 105)], OrderingPolicy::NewestFirst),
        ];
        let page = merge(lanes, OrderingPolicy::NewestFirst, 3);
        assert_eq!(ids(&page), vec![(0, 4), (0, 3), (1, 2)]);
    }

    #[test]
    fn equal_timestamps_prefer_lower_partition_then_offset() {
        let lanes = vec![
            Lane::new(vec![rec(1, 0, 100)], OrderingPolicy::OldestFirst),
            Lane::new(vec![rec(0, 5, 100), rec(0, 6, 100)], OrderingPolicy::OldestFirst),
        ];
        let page = merge(lanes, OrderingPolicy::OldestFirst, 10);
        assert_eq!(ids(&page), vec![(0, 5), (0, 6), (1, 0)]);

        let lanes = vec![
            Lane::new(vec![rec(1, 0, 100)], OrderingPolicy::NewestFirst),
            Lane::new(vec![rec(0, 5, 100), rec(0, 6, 100)], OrderingPolicy::NewestFirst),
        ];
        let page = merge(lanes, OrderingPolicy::NewestFirst, 10);
        assert_eq!(ids(&page), vec![(0, 6), (0, 5), (1, 0)]);
    }

    #[test]
    fn lanes_stay_in_offset_order_with_skewed_timestamps() {
        // offset 1 carries an older timestamp than offset 0
        let lanes = vec![
            Lane::new(vec![rec(0, 0, 200), rec(0, 1, 50)], OrderingPolicy::OldestFirst),
            Lane::new(vec![rec(1, 0, 100)], OrderingPolicy::OldestFirst),
        ];
        let page = merge(lanes, OrderingPolicy::OldestFirst, 2);
        assert_eq!(ids(&page), vec![(1, 0), (0, 0)]);
    }

    #[test]
    fn resume_moves_only_partitions_with_included_records() {
        let positions = BTreeMap::from([(0, 2), (1, 0), (2, 9)]);
        let included = vec![rec(0, 4, 108), rec(0, 3, 106), rec(1, 2, 105)];
        let resume = resume_offsets(&positions, &included, OrderingPolicy::NewestFirst, 3);
        assert_eq!(resume, BTreeMap::from([(0, 0), (1, -1), (2, 9)]));

        let positions = BTreeMap::from([(0, 0), (1, 0)]);
        let included = vec![rec(0, 0, 1), rec(0, 1, 2)];
        let resume = resume_offsets(&positions, &included, OrderingPolicy::OldestFirst, 3);
        assert_eq!(resume, BTreeMap::from([(0, 2), (1, 0)]));
    }
}
