use std::sync::Arc;

use kafka_protocol::error::ResponseError;
use thiserror::Error;

use crate::client::BrokerDetail;

/// Error produced by admin operations.
///
/// Errors scoped to one group or partition are attached to that unit's result
/// and never abort the call that produced them; request-scoped errors abort
/// the whole call and discard its partial data.
#[derive(Debug, Clone, Error)]
pub enum AdminError {
    /// Connection or transport failure while talking to the cluster.
    #[error("transport failure: {0}")]
    Transport(Arc<anyhow::Error>),

    /// The caller is not authorized for the request as a whole.
    #[error("authorization failure: {0:?}")]
    Auth(ResponseError),

    /// A broker-reported error scoped to one group or partition.
    #[error("{0:?}")]
    Kafka(ResponseError),

    /// Failures from individual shards of a fanned-out request.
    #[error(transparent)]
    Shards(#[from] ShardErrors),

    /// A response that does not line up positionally with the request that
    /// produced it. This indicates protocol-contract breakage, not a data
    /// condition, and always aborts.
    #[error("request/response mismatch: {0}")]
    Correspondence(String),

    /// An assigned partition was missing from a list-offsets snapshot.
    #[error("missing from list offsets")]
    ListMissing,
}

impl AdminError {
    /// Wraps a transport-level failure from the cluster client.
    pub fn transport(err: anyhow::Error) -> Self {
        AdminError::Transport(Arc::new(err))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AdminError::Auth(_))
    }
}

/// Per-shard failures of one fanned-out request, returned alongside whatever
/// partial data did succeed.
#[derive(Debug, Clone, Error)]
#[error("{name}: {} shard failures", .errs.len())]
pub struct ShardErrors {
    /// Name of the request that was sharded.
    pub name: &'static str,
    /// Whether every shard failed.
    pub all_failed: bool,
    pub errs: Vec<ShardError>,
}

/// One shard's failure, tagged with the broker that produced it.
#[derive(Debug, Clone)]
pub struct ShardError {
    pub broker: BrokerDetail,
    pub err: AdminError,
}

/// Checks an error code for the authorization failures that warrant aborting
/// a whole call rather than recording a unit-scoped error.
pub(crate) fn maybe_auth_err(code: i16) -> Result<(), AdminError> {
    if let Some(err) = ResponseError::try_from_code(code) {
        if matches!(
            err,
            ResponseError::TopicAuthorizationFailed
                | ResponseError::GroupAuthorizationFailed
                | ResponseError::ClusterAuthorizationFailed
        ) {
            return Err(AdminError::Auth(err));
        }
    }
    Ok(())
}

/// Translates a wire error code into an error value; zero is success.
pub(crate) fn err_for_code(code: i16) -> Option<AdminError> {
    ResponseError::try_from_code(code).map(AdminError::Kafka)
}
