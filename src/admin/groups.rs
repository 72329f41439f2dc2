//! Listing, describing, and deleting consumer groups.
//!
//! List and describe requests fan out across all known brokers; results are
//! merged into one view keyed by group name. Collisions should not occur
//! since each group has exactly one coordinator, but merging is
//! last-write-wins regardless.

use std::cmp::Ordering;
use std::collections::HashMap;

use bytes::{Buf, Bytes};
use kafka_protocol::messages::consumer_protocol_assignment::ConsumerProtocolAssignment;
use kafka_protocol::messages::{
    DeleteGroupsRequest, DescribeGroupsRequest, GroupId, ListGroupsRequest, RequestKind,
    ResponseKind,
};
use kafka_protocol::protocol::{Decodable, StrBytes};
use log::{debug, info};
use serde::Serialize;

use crate::admin::types::{ser_err, TopicsSet};
use crate::admin::{AdminClient, ShardedResult};
use crate::client::BrokerDetail;
use crate::error::{err_for_code, maybe_auth_err, AdminError, ShardErrors};

/// One group member as returned by a describe groups response.
#[derive(Debug, Clone, Serialize)]
pub struct DescribedGroupMember {
    /// The broker-assigned member ID.
    pub member_id: String,
    /// The user-assigned static instance ID, if the member registered one.
    pub instance_id: Option<String>,
    pub client_id: String,
    pub client_host: String,
    /// Raw metadata the member sent in its join request.
    #[serde(skip)]
    pub join_metadata: Bytes,
    /// The topics and partitions the leader assigned this member.
    pub assigned: TopicsSet,
}

/// Data from a describe groups response for a single group.
#[derive(Debug, Clone, Serialize)]
pub struct DescribedGroup {
    pub group: String,
    /// The coordinator broker that answered for this group.
    pub coordinator: BrokerDetail,
    /// The state this group is in (Empty, Dead, Stable, ...).
    pub state: String,
    /// The partition assignor strategy the group is using.
    pub protocol: String,
    /// Members sorted first by instance ID when present, else by member ID.
    pub members: Vec<DescribedGroupMember>,
    /// Non-nil if this group could not be described.
    #[serde(serialize_with = "ser_err")]
    pub err: Option<AdminError>,
}

impl DescribedGroup {
    /// The set of unique topics and partitions assigned across all members.
    pub fn assigned_partitions(&self) -> TopicsSet {
        let mut s = TopicsSet::default();
        for m in &self.members {
            s.merge(&m.assigned);
        }
        s
    }
}

/// Described groups keyed by group name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DescribedGroups(pub HashMap<String, DescribedGroup>);

impl DescribedGroups {
    /// The all-group analogue of [`DescribedGroup::assigned_partitions`].
    pub fn assigned_partitions(&self) -> TopicsSet {
        let mut s = TopicsSet::default();
        for g in self.0.values() {
            s.merge(&g.assigned_partitions());
        }
        s
    }

    /// All groups sorted by name.
    pub fn sorted(&self) -> Vec<&DescribedGroup> {
        let mut all: Vec<_> = self.0.values().collect();
        all.sort_by(|a, b| a.group.cmp(&b.group));
        all
    }

    /// A sorted list of all group names.
    pub fn names(&self) -> Vec<String> {
        let mut all: Vec<String> = self.0.keys().cloned().collect();
        all.sort();
        all
    }
}

/// Data from a list groups response for a single group.
#[derive(Debug, Clone, Serialize)]
pub struct ListedGroup {
    pub group: String,
    pub state: String,
}

/// Listed groups keyed by group name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListedGroups(pub HashMap<String, ListedGroup>);

impl ListedGroups {
    pub fn sorted(&self) -> Vec<&ListedGroup> {
        let mut all: Vec<_> = self.0.values().collect();
        all.sort_by(|a, b| a.group.cmp(&b.group));
        all
    }

    pub fn groups(&self) -> Vec<String> {
        let mut all: Vec<String> = self.0.keys().cloned().collect();
        all.sort();
        all
    }
}

/// The response for one deleted group.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteGroupResponse {
    pub group: String,
    #[serde(serialize_with = "ser_err")]
    pub err: Option<AdminError>,
}

impl AdminClient {
    /// Returns all groups in the cluster, optionally filtered to the
    /// requested states.
    ///
    /// Shard failures are returned alongside whatever groups were listed
    /// successfully; callers may ignore them and consume the partial list.
    pub async fn list_groups(&self, filter_states: &[&str]) -> ShardedResult<ListedGroups> {
        let req = ListGroupsRequest::default().with_states_filter(
            filter_states
                .iter()
                .map(|s| StrBytes::from_string(s.to_string()))
                .collect(),
        );

        let mut list = ListedGroups::default();
        let shard_errs = self
            .shard_err_each("ListGroups", RequestKind::ListGroups(req), |resp| {
                let ResponseKind::ListGroups(resp) = resp else {
                    return Err(unexpected_response("ListGroups"));
                };
                maybe_auth_err(resp.error_code)?;
                if let Some(err) = err_for_code(resp.error_code) {
                    return Err(err);
                }
                for g in resp.groups {
                    let group = g.group_id.0.to_string();
                    list.0.insert(
                        group.clone(),
                        ListedGroup {
                            group,
                            state: g.group_state.to_string(),
                        },
                    );
                }
                Ok(())
            })
            .await?;

        debug!("listed {} groups", list.0.len());
        Ok((list, shard_errs))
    }

    /// Describes the given groups, or every group in the cluster when none
    /// are named.
    ///
    /// When this method first lists groups and the listing partially fails,
    /// the successfully listed groups are still described and the listing's
    /// shard errors are prepended to any describe shard errors. A group-level
    /// error is recorded on that group's `err` rather than aborting the call;
    /// an authorization failure aborts immediately.
    pub async fn describe_groups(&self, groups: &[&str]) -> ShardedResult<DescribedGroups> {
        let mut list_errs: Option<ShardErrors> = None;
        let mut groups: Vec<String> = groups.iter().map(|g| g.to_string()).collect();
        if groups.is_empty() {
            let (listed, errs) = self.list_groups(&[]).await?;
            list_errs = errs;
            groups = listed.groups();
            if groups.is_empty() {
                return Ok((DescribedGroups::default(), list_errs));
            }
        }

        let req = DescribeGroupsRequest::default().with_groups(
            groups
                .iter()
                .map(|g| GroupId(StrBytes::from_string(g.clone())))
                .collect(),
        );

        let mut described = DescribedGroups::default();
        let describe_errs = self
            .shard_err_each_broker(
                "DescribeGroups",
                RequestKind::DescribeGroups(req),
                |broker, resp| {
                    let ResponseKind::DescribeGroups(resp) = resp else {
                        return Err(unexpected_response("DescribeGroups"));
                    };
                    for rg in resp.groups {
                        maybe_auth_err(rg.error_code)?;
                        let mut members: Vec<DescribedGroupMember> = rg
                            .members
                            .iter()
                            .map(|rm| DescribedGroupMember {
                                member_id: rm.member_id.to_string(),
                                instance_id: rm.group_instance_id.as_ref().map(|i| i.to_string()),
                                client_id: rm.client_id.to_string(),
                                client_host: rm.client_host.to_string(),
                                join_metadata: rm.member_metadata.clone(),
                                assigned: decode_member_assignment(&rm.member_assignment),
                            })
                            .collect();
                        sort_members(&mut members);
                        let group = rg.group_id.0.to_string();
                        described.0.insert(
                            group.clone(),
                            DescribedGroup {
                                group,
                                coordinator: broker.clone(),
                                state: rg.group_state.to_string(),
                                protocol: rg.protocol_data.to_string(),
                                members,
                                err: err_for_code(rg.error_code),
                            },
                        );
                    }
                    Ok(())
                },
            )
            .await?;

        info!("described {} groups", described.0.len());
        Ok((described, prepend_shard_errs(list_errs, describe_errs)))
    }

    /// Deletes the given groups. Each group's result carries its own error
    /// independent of the others; an empty input is a no-op.
    pub async fn delete_groups(&self, groups: &[&str]) -> ShardedResult<Vec<DeleteGroupResponse>> {
        if groups.is_empty() {
            return Ok((Vec::new(), None));
        }
        let req = DeleteGroupsRequest::default().with_groups_names(
            groups
                .iter()
                .map(|g| GroupId(StrBytes::from_string(g.to_string())))
                .collect(),
        );

        let mut resps = Vec::new();
        let shard_errs = self
            .shard_err_each("DeleteGroups", RequestKind::DeleteGroups(req), |resp| {
                let ResponseKind::DeleteGroups(resp) = resp else {
                    return Err(unexpected_response("DeleteGroups"));
                };
                for g in resp.results {
                    resps.push(DeleteGroupResponse {
                        group: g.group_id.0.to_string(),
                        err: err_for_code(g.error_code),
                    });
                }
                Ok(())
            })
            .await?;

        Ok((resps, shard_errs))
    }
}

/// Orders members with an instance ID before members without, sorting by
/// instance ID when both have one and by member ID otherwise. The order is
/// stable across repeated describes, so views can be diffed.
fn sort_members(members: &mut [DescribedGroupMember]) {
    members.sort_by(|a, b| match (&a.instance_id, &b.instance_id) {
        (Some(l), Some(r)) => l.cmp(r),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.member_id.cmp(&b.member_id),
    });
}

/// Decodes the wire member-assignment blob: an i16 version prefix followed by
/// a consumer protocol assignment. An empty blob, an undecodable blob, or a
/// version outside the supported range yields an empty set.
fn decode_member_assignment(blob: &Bytes) -> TopicsSet {
    let mut s = TopicsSet::default();
    if blob.len() < 2 {
        return s;
    }
    let mut buf = blob.clone();
    let version = buf.get_i16();
    if !(0..=3).contains(&version) {
        debug!("unsupported member assignment version {version}");
        return s;
    }
    match ConsumerProtocolAssignment::decode(&mut buf, version) {
        Ok(assignment) => {
            for tp in assignment.assigned_partitions {
                s.add(&tp.topic.0.to_string(), tp.partitions.iter().copied());
            }
        }
        Err(err) => debug!("undecodable member assignment: {err}"),
    }
    s
}

fn prepend_shard_errs(
    first: Option<ShardErrors>,
    second: Option<ShardErrors>,
) -> Option<ShardErrors> {
    match (first, second) {
        (None, second) => second,
        (first, None) => first,
        (Some(first), Some(mut second)) => {
            let mut errs = first.errs;
            errs.append(&mut second.errs);
            second.errs = errs;
            second.all_failed = second.all_failed && first.all_failed;
            Some(second)
        }
    }
}

fn unexpected_response(expected: &str) -> AdminError {
    AdminError::Correspondence(format!("unexpected response kind for {expected} request"))
}
