//! Contracts for the network client that actually talks to brokers.
//!
//! The admin layer never opens connections or encodes wire bytes itself; it
//! issues logical requests through [`ClusterRequester`] and merges whatever
//! comes back. Topology discovery, connection pooling, and retry policy all
//! live behind this trait.

use async_trait::async_trait;
use kafka_protocol::messages::{RequestKind, ResponseKind};
use serde::Serialize;

use crate::error::AdminError;

/// Identity of a broker that answered part of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrokerDetail {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
    pub rack: Option<String>,
}

/// One broker's slice of a fanned-out request: the broker that was asked,
/// and either its response or the failure that replaced it.
#[derive(Debug)]
pub struct ShardResponse {
    pub broker: BrokerDetail,
    pub resp: Result<ResponseKind, AdminError>,
}

/// Transport used by the admin client.
///
/// Implementations are expected to surface connection-level failures as
/// [`AdminError::Transport`]; everything above that (error codes inside
/// responses, partial shard failures) is interpreted by the admin layer.
#[async_trait]
pub trait ClusterRequester: Send + Sync {
    /// Splits a logical multi-target request into one sub-request per
    /// relevant broker and returns every shard's outcome. An `Err` here means
    /// the request could not be issued at all (e.g. topology discovery
    /// failed) and the whole admin call aborts.
    async fn request_sharded(&self, req: RequestKind) -> Result<Vec<ShardResponse>, AdminError>;

    /// Issues a request to the single broker that owns it, e.g. a group's
    /// coordinator for offset commits and fetches.
    async fn request(&self, req: RequestKind) -> Result<ResponseKind, AdminError>;
}
