//! Committing, fetching, and deleting per-group committed offsets, plus the
//! concurrent many-group fetch used for lag polling.
//!
//! Commit, fetch, and delete each target exactly one group's coordinator, so
//! they go through the single-target request path. The end/start offset
//! listings fan out across partition leaders like the group directory calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;

use kafka_protocol::messages::{
    GroupId, ListOffsetsRequest, OffsetCommitRequest, OffsetDeleteRequest, OffsetFetchRequest,
    RequestKind, ResponseKind, TopicName,
};
use kafka_protocol::messages::list_offsets_request::{ListOffsetsPartition, ListOffsetsTopic};
use kafka_protocol::messages::offset_commit_request::{
    OffsetCommitRequestPartition, OffsetCommitRequestTopic,
};
use kafka_protocol::messages::offset_delete_request::{
    OffsetDeleteRequestPartition, OffsetDeleteRequestTopic,
};
use kafka_protocol::protocol::StrBytes;
use log::{debug, warn};
use serde::Serialize;

use crate::admin::types::{
    lookup_in, ser_err, ListedOffset, ListedOffsets, Lookup, Offset, Offsets, TopicsSet,
};
use crate::admin::{AdminClient, ShardedResult};
use crate::error::{err_for_code, maybe_auth_err, AdminError};

/// The response for an individual offset in an offset operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OffsetResponse {
    pub offset: Offset,
    #[serde(serialize_with = "ser_err")]
    pub err: Option<AdminError>,
}

/// Per-partition responses to offset operations, keyed by topic then
/// partition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OffsetResponses(pub HashMap<String, HashMap<i32, OffsetResponse>>);

impl OffsetResponses {
    pub fn insert(&mut self, r: OffsetResponse) {
        self.0
            .entry(r.offset.topic.clone())
            .or_default()
            .insert(r.offset.partition, r);
    }

    pub fn lookup(&self, topic: &str, partition: i32) -> Lookup<&OffsetResponse> {
        lookup_in(&self.0, topic, partition)
    }

    /// Filters the responses down to only the given offsets. An empty
    /// keep-set removes everything.
    pub fn keep(&mut self, keep: &Offsets) {
        self.delete_fn(|r| {
            !matches!(
                keep.lookup(&r.offset.topic, r.offset.partition),
                Lookup::Found(_)
            )
        });
    }

    /// Deletes every response for which `fn` returns true.
    pub fn delete_fn(&mut self, mut f: impl FnMut(&OffsetResponse) -> bool) {
        for partitions in self.0.values_mut() {
            partitions.retain(|_, r| !f(r));
        }
        self.0.retain(|_, partitions| !partitions.is_empty());
    }

    pub fn each(&self, mut f: impl FnMut(&OffsetResponse)) {
        for partitions in self.0.values() {
            for r in partitions.values() {
                f(r);
            }
        }
    }

    /// Calls `fn` for every response carrying an error.
    pub fn each_error(&self, mut f: impl FnMut(&OffsetResponse)) {
        self.each(|r| {
            if r.err.is_some() {
                f(r);
            }
        });
    }

    /// The first error among all responses, if any. Offset operations can be
    /// partially successful, and the backing map has no defined iteration
    /// order; callers needing a deterministic pick should sort first.
    pub fn error(&self) -> Option<&AdminError> {
        self.0
            .values()
            .flat_map(HashMap::values)
            .find_map(|r| r.err.as_ref())
    }

    pub fn ok(&self) -> bool {
        self.error().is_none()
    }

    /// All responses sorted by topic then partition.
    pub fn sorted(&self) -> Vec<&OffsetResponse> {
        let mut all: Vec<_> = self.0.values().flat_map(HashMap::values).collect();
        all.sort_by(|a, b| {
            (&a.offset.topic, a.offset.partition).cmp(&(&b.offset.topic, b.offset.partition))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.0.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fetch offsets response for a single group.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOffsetsResponse {
    pub group: String,
    /// Offsets fetched for this group, if any.
    pub fetched: OffsetResponses,
    /// Any error that prevented offsets from being fetched.
    #[serde(serialize_with = "ser_err")]
    pub err: Option<AdminError>,
}

/// Responses to many per-group offset fetches, keyed by group.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchOffsetsResponses(pub HashMap<String, FetchOffsetsResponse>);

impl FetchOffsetsResponses {
    /// Calls `fn` for every group whose fetch failed.
    pub fn each_error(&self, mut f: impl FnMut(&FetchOffsetsResponse)) {
        for r in self.0.values() {
            if r.err.is_some() {
                f(r);
            }
        }
    }

    /// Whether every fetch failed.
    pub fn all_failed(&self) -> bool {
        let mut n = 0;
        self.each_error(|_| n += 1);
        n == self.0.len()
    }
}

/// Per-topic, per-partition deletion results; `None` means the deletion
/// succeeded.
#[derive(Debug, Clone, Default)]
pub struct DeleteOffsetsResponses(pub HashMap<String, HashMap<i32, Option<AdminError>>>);

impl DeleteOffsetsResponses {
    /// Calls `fn` for every partition whose deletion failed.
    pub fn each_error(&self, mut f: impl FnMut(&str, i32, &AdminError)) {
        for (topic, partitions) in &self.0 {
            for (partition, err) in partitions {
                if let Some(err) = err {
                    f(topic, *partition, err);
                }
            }
        }
    }
}

impl AdminClient {
    /// Commits the given offsets for the group.
    ///
    /// The response is validated positionally against the request: the
    /// response does not echo full keys in all versions, so any topic or
    /// partition out of order is a protocol-contract violation and aborts.
    pub async fn commit_offsets(&self, group: &str, os: &Offsets) -> Result<OffsetResponses, AdminError> {
        let mut topics = Vec::with_capacity(os.0.len());
        for (topic, partitions) in &os.0 {
            let mut rt = OffsetCommitRequestTopic::default()
                .with_name(TopicName(StrBytes::from_string(topic.clone())));
            for (partition, o) in partitions {
                let mut rp = OffsetCommitRequestPartition::default()
                    .with_partition_index(*partition)
                    .with_committed_offset(o.offset);
                if !o.metadata.is_empty() {
                    rp = rp.with_committed_metadata(Some(StrBytes::from_string(o.metadata.clone())));
                }
                if o.commit_leader_epoch {
                    rp = rp.with_committed_leader_epoch(o.leader_epoch);
                }
                rt.partitions.push(rp);
            }
            topics.push(rt);
        }
        let req = OffsetCommitRequest::default()
            .with_group_id(GroupId(StrBytes::from_string(group.to_string())))
            .with_topics(topics);

        let resp = match self.request(RequestKind::OffsetCommit(req.clone())).await? {
            ResponseKind::OffsetCommit(resp) => resp,
            _ => return Err(unexpected_response("OffsetCommit")),
        };

        let mut rs = OffsetResponses::default();
        for (i, t) in resp.topics.iter().enumerate() {
            let Some(reqt) = req.topics.get(i) else {
                return Err(AdminError::Correspondence(format!(
                    "topic {:?} at response index {i} was not in the offset commit request",
                    t.name
                )));
            };
            if reqt.name != t.name {
                return Err(AdminError::Correspondence(format!(
                    "topic {:?} at response index {i} does not match request topic {:?}",
                    t.name, reqt.name
                )));
            }
            let topic = t.name.0.to_string();
            for (j, p) in t.partitions.iter().enumerate() {
                let Some(reqp) = reqt.partitions.get(j) else {
                    return Err(AdminError::Correspondence(format!(
                        "topic {topic} partition {} at response index {j} was not in the offset commit request",
                        p.partition_index
                    )));
                };
                if reqp.partition_index != p.partition_index {
                    return Err(AdminError::Correspondence(format!(
                        "topic {topic} partition {} at response index {j} does not match request partition {}",
                        p.partition_index, reqp.partition_index
                    )));
                }
                let offset = os
                    .lookup(&topic, p.partition_index)
                    .found()
                    .cloned()
                    .unwrap_or_default();
                rs.insert(OffsetResponse {
                    offset,
                    err: err_for_code(p.error_code),
                });
            }
        }
        Ok(rs)
    }

    /// Fetches all committed offsets visible for the group.
    ///
    /// Brokers only return partitions the caller is authorized to see, so a
    /// partition-scoped authorization code is treated as data hiding and the
    /// partition is omitted; an authorization failure on the request as a
    /// whole aborts.
    pub async fn fetch_offsets(&self, group: &str) -> Result<OffsetResponses, AdminError> {
        let req = OffsetFetchRequest::default()
            .with_group_id(GroupId(StrBytes::from_string(group.to_string())))
            .with_topics(None);

        let resp = match self.request(RequestKind::OffsetFetch(req)).await? {
            ResponseKind::OffsetFetch(resp) => resp,
            _ => return Err(unexpected_response("OffsetFetch")),
        };
        maybe_auth_err(resp.error_code)?;
        if let Some(err) = err_for_code(resp.error_code) {
            return Err(err);
        }

        let mut rs = OffsetResponses::default();
        for t in &resp.topics {
            let topic = t.name.0.to_string();
            for p in &t.partitions {
                if maybe_auth_err(p.error_code).is_err() {
                    debug!(
                        "group {group} topic {topic} partition {} hidden by authorization",
                        p.partition_index
                    );
                    continue;
                }
                rs.insert(OffsetResponse {
                    offset: Offset {
                        topic: topic.clone(),
                        partition: p.partition_index,
                        offset: p.committed_offset,
                        leader_epoch: p.committed_leader_epoch,
                        metadata: p
                            .metadata
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_default(),
                        commit_leader_epoch: false,
                    },
                    err: err_for_code(p.error_code),
                });
            }
        }
        Ok(rs)
    }

    /// Fetches committed offsets for each group concurrently. All failures
    /// are per-group; the call always waits for every fetch to complete and
    /// returns one entry per input group. Dropping the returned future aborts
    /// every fetch still in flight; completed insertions are simply discarded
    /// with the rest of the aggregate.
    pub async fn fetch_many_offsets(&self, groups: &[&str]) -> FetchOffsetsResponses {
        let mut out = FetchOffsetsResponses::default();
        if groups.is_empty() {
            return out;
        }

        let fetched = Arc::new(Mutex::new(HashMap::new()));
        // JoinSet rather than detached spawns: the tasks must not outlive
        // this call if the caller gives up on it.
        let mut tasks = JoinSet::new();
        for group in groups {
            let cl = self.clone();
            let group = group.to_string();
            let fetched = Arc::clone(&fetched);
            tasks.spawn(async move {
                let (offsets, err) = match cl.fetch_offsets(&group).await {
                    Ok(offsets) => (offsets, None),
                    Err(err) => (OffsetResponses::default(), Some(err)),
                };
                // The lock covers only the insert, never the fetch itself.
                let mut fetched = fetched.lock().unwrap();
                fetched.insert(
                    group.clone(),
                    FetchOffsetsResponse {
                        group,
                        fetched: offsets,
                        err,
                    },
                );
            });
        }
        while let Some(task) = tasks.join_next().await {
            if let Err(err) = task {
                warn!("offset fetch task failed: {err}");
            }
        }

        out.0 = Arc::try_unwrap(fetched)
            .map(|m| m.into_inner().unwrap())
            .unwrap_or_default();
        out
    }

    /// Deletes commits for exactly the specified partitions. An empty input
    /// is a no-op. A group-level authorization failure aborts; per-partition
    /// failures are reported in the result mapping.
    pub async fn delete_offsets(
        &self,
        group: &str,
        s: &TopicsSet,
    ) -> Result<DeleteOffsetsResponses, AdminError> {
        if s.is_empty() {
            return Ok(DeleteOffsetsResponses::default());
        }

        let mut topics = Vec::with_capacity(s.0.len());
        for (topic, partitions) in s.each_sorted() {
            topics.push(
                OffsetDeleteRequestTopic::default()
                    .with_name(TopicName(StrBytes::from_string(topic)))
                    .with_partitions(
                        partitions
                            .into_iter()
                            .map(|p| OffsetDeleteRequestPartition::default().with_partition_index(p))
                            .collect(),
                    ),
            );
        }
        let req = OffsetDeleteRequest::default()
            .with_group_id(GroupId(StrBytes::from_string(group.to_string())))
            .with_topics(topics);

        let resp = match self.request(RequestKind::OffsetDelete(req)).await? {
            ResponseKind::OffsetDelete(resp) => resp,
            _ => return Err(unexpected_response("OffsetDelete")),
        };
        maybe_auth_err(resp.error_code)?;
        if let Some(err) = err_for_code(resp.error_code) {
            return Err(err);
        }

        let mut rs = DeleteOffsetsResponses::default();
        for t in &resp.topics {
            let partitions = rs.0.entry(t.name.0.to_string()).or_default();
            for p in &t.partitions {
                partitions.insert(p.partition_index, err_for_code(p.error_code));
            }
        }
        Ok(rs)
    }

    /// Lists each partition's end offset: the position after the last record
    /// currently available in the partition's log.
    pub async fn list_end_offsets(&self, s: &TopicsSet) -> ShardedResult<ListedOffsets> {
        self.list_offsets("ListEndOffsets", s, -1).await
    }

    /// Lists each partition's start offset.
    pub async fn list_start_offsets(&self, s: &TopicsSet) -> ShardedResult<ListedOffsets> {
        self.list_offsets("ListStartOffsets", s, -2).await
    }

    async fn list_offsets(
        &self,
        name: &'static str,
        s: &TopicsSet,
        timestamp: i64,
    ) -> ShardedResult<ListedOffsets> {
        let mut topics = Vec::with_capacity(s.0.len());
        for (topic, partitions) in s.each_sorted() {
            topics.push(
                ListOffsetsTopic::default()
                    .with_name(TopicName(StrBytes::from_string(topic)))
                    .with_partitions(
                        partitions
                            .into_iter()
                            .map(|p| {
                                ListOffsetsPartition::default()
                                    .with_partition_index(p)
                                    .with_timestamp(timestamp)
                            })
                            .collect(),
                    ),
            );
        }
        let req = ListOffsetsRequest::default().with_topics(topics);

        let mut listed = ListedOffsets::default();
        let shard_errs = self
            .shard_err_each(name, RequestKind::ListOffsets(req), |resp| {
                let ResponseKind::ListOffsets(resp) = resp else {
                    return Err(unexpected_response("ListOffsets"));
                };
                for t in resp.topics {
                    let topic = t.name.0.to_string();
                    for p in t.partitions {
                        maybe_auth_err(p.error_code)?;
                        listed.add(ListedOffset {
                            topic: topic.clone(),
                            partition: p.partition_index,
                            timestamp: p.timestamp,
                            leader_epoch: p.leader_epoch,
                            offset: p.offset,
                            err: err_for_code(p.error_code),
                        });
                    }
                }
                Ok(())
            })
            .await?;
        Ok((listed, shard_errs))
    }
}

fn unexpected_response(expected: &str) -> AdminError {
    AdminError::Correspondence(format!("unexpected response kind for {expected} request"))
}
