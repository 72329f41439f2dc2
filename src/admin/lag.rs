//! Per-partition consumer lag: the gap between what a group has committed
//! and what is available to read.

use std::collections::HashMap;

use serde::Serialize;

use crate::admin::groups::{DescribedGroup, DescribedGroupMember};
use crate::admin::offsets::{OffsetResponse, OffsetResponses};
use crate::admin::types::{ser_err, ListedOffset, ListedOffsets, Lookup, Offset, lookup_in};
use crate::error::AdminError;

/// The lag between one member's committed offset and the partition's end
/// offset.
///
/// `lag == -1` is a sentinel meaning the lag could not be computed (see
/// `err`); it is not a negative lag value. A genuinely negative lag, e.g.
/// from a stale end-offset listing, is passed through unclamped.
#[derive(Debug, Clone, Serialize)]
pub struct GroupMemberLag<'a> {
    /// The member consuming this partition, borrowed from the described
    /// group this lag was computed for.
    pub member: &'a DescribedGroupMember,
    pub topic: String,
    pub partition: i32,
    /// The member's committed offset; `offset == -1` when nothing has been
    /// committed.
    pub commit: Offset,
    /// The partition's end offset as listed.
    pub end: ListedOffset,
    pub lag: i64,
    /// The commit error, the list error, or the missing-from-listing
    /// sentinel, if any.
    #[serde(serialize_with = "ser_err")]
    pub err: Option<AdminError>,
}

/// Per-topic, per-partition lag of the members in one group.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupLag<'a>(pub HashMap<String, HashMap<i32, GroupMemberLag<'a>>>);

impl<'a> GroupLag<'a> {
    pub fn lookup(&self, topic: &str, partition: i32) -> Lookup<&GroupMemberLag<'a>> {
        lookup_in(&self.0, topic, partition)
    }

    /// All entries sorted by topic then partition.
    pub fn sorted(&self) -> Vec<&GroupMemberLag<'a>> {
        let mut all: Vec<_> = self.0.values().flat_map(HashMap::values).collect();
        all.sort_by(|a, b| (&a.topic, a.partition).cmp(&(&b.topic, b.partition)));
        all
    }

    pub fn len(&self) -> usize {
        self.0.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Computes the per-partition lag of every member in a group from three
/// independently gathered snapshots:
///
/// ```text
/// let (described, _) = cl.describe_groups(&[group]).await?;
/// let commits = cl.fetch_offsets(group).await?;
/// let (ends, _) = cl.list_end_offsets(&described.assigned_partitions()).await?;
/// ```
///
/// Every partition assigned to some member appears exactly once in the
/// result. A partition absent from the commit snapshot, whether its topic is
/// missing or just the partition, is treated as never committed (`offset ==
/// -1`, no error) and its lag is the full end offset. A partition absent from
/// the end-offset listing gets the missing-from-listing error and a lag of
/// -1. If several members claim the same partition, the last member wins
/// silently; assignment is assumed exclusive.
///
/// Pure function over its inputs: no I/O, no hidden state.
pub fn calculate_group_lag<'a>(
    group: &'a DescribedGroup,
    commits: &OffsetResponses,
    ends: &ListedOffsets,
) -> GroupLag<'a> {
    let mut out = GroupLag::default();

    for member in &group.members {
        for (topic, partitions) in &member.assigned.0 {
            let topic_lags = out.0.entry(topic.clone()).or_default();
            for &partition in partitions {
                let commit = match commits.lookup(topic, partition) {
                    Lookup::Found(r) => r.clone(),
                    Lookup::TopicAbsent | Lookup::PartitionAbsent => OffsetResponse {
                        offset: Offset {
                            topic: topic.clone(),
                            partition,
                            offset: -1,
                            ..Default::default()
                        },
                        err: None,
                    },
                };

                let (end, mut err) = match ends.lookup(topic, partition) {
                    Lookup::Found(o) => (o.clone(), None),
                    Lookup::TopicAbsent | Lookup::PartitionAbsent => (
                        ListedOffset {
                            topic: topic.clone(),
                            partition,
                            ..Default::default()
                        },
                        Some(AdminError::ListMissing),
                    ),
                };

                // Commit error takes precedence over the list error.
                if err.is_none() {
                    err = commit.err.clone().or_else(|| end.err.clone());
                }

                let lag = match &err {
                    Some(_) => -1,
                    None if commit.offset.offset >= 0 => end.offset - commit.offset.offset,
                    // Nothing committed yet: everything available is lag.
                    None => end.offset,
                };

                topic_lags.insert(
                    partition,
                    GroupMemberLag {
                        member,
                        topic: topic.clone(),
                        partition,
                        commit: commit.offset,
                        end,
                        lag,
                        err,
                    },
                );
            }
        }
    }

    out
}
