//! Administrative layer for Kafka consumer groups.
//!
//! This crate lets operators enumerate consumer groups, inspect membership
//! and partition assignments, manage committed offsets, and compute
//! per-partition consumer lag. It merges per-broker partial results (and
//! partial failures) from fanned-out requests into coherent whole-cluster
//! views; the wire codec and the network client that actually talks to
//! brokers live behind the [`client::ClusterRequester`] trait.
//!
//! Every operation is a stateless snapshot computation over fresh inputs;
//! nothing persists between calls.

pub mod admin;
pub mod client;
pub mod error;

pub use admin::groups::{
    DeleteGroupResponse, DescribedGroup, DescribedGroupMember, DescribedGroups, ListedGroup,
    ListedGroups,
};
pub use admin::lag::{calculate_group_lag, GroupLag, GroupMemberLag};
pub use admin::offsets::{
    DeleteOffsetsResponses, FetchOffsetsResponse, FetchOffsetsResponses, OffsetResponse,
    OffsetResponses,
};
pub use admin::types::{ListedOffset, ListedOffsets, Lookup, Offset, Offsets, TopicsSet};
pub use admin::{AdminClient, ShardedResult};
pub use client::{BrokerDetail, ClusterRequester, ShardResponse};
pub use error::{AdminError, ShardError, ShardErrors};
