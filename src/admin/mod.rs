//! Administrative operations over consumer groups and committed offsets.
//!
//! Every operation is a stateless snapshot computation: it issues fresh
//! requests through the [`ClusterRequester`], merges per-broker partial
//! results (and partial failures) into one whole-cluster view, and returns
//! plain values. Nothing is cached between calls.

pub mod groups;
pub mod lag;
pub mod offsets;
pub mod types;

use std::sync::Arc;

use kafka_protocol::messages::{RequestKind, ResponseKind};

use crate::client::{BrokerDetail, ClusterRequester};
use crate::error::{AdminError, ShardError, ShardErrors};

/// Outcome of a fanned-out operation: the merged data plus, when some shards
/// failed, the per-shard errors. Callers may ignore the errors and still
/// consume whatever did succeed.
pub type ShardedResult<T> = Result<(T, Option<ShardErrors>), AdminError>;

/// Admin client over a [`ClusterRequester`].
#[derive(Clone)]
pub struct AdminClient {
    cl: Arc<dyn ClusterRequester>,
}

impl AdminClient {
    pub fn new(cl: Arc<dyn ClusterRequester>) -> Self {
        Self { cl }
    }

    pub(crate) async fn request(&self, req: RequestKind) -> Result<ResponseKind, AdminError> {
        self.cl.request(req).await
    }

    /// Issues a sharded request and folds every shard through `on_resp`.
    ///
    /// Shard-level failures and non-authorization `on_resp` errors are
    /// collected into a [`ShardErrors`]; an authorization error from
    /// `on_resp` aborts the whole call immediately.
    pub(crate) async fn shard_err_each_broker(
        &self,
        name: &'static str,
        req: RequestKind,
        mut on_resp: impl FnMut(&BrokerDetail, ResponseKind) -> Result<(), AdminError>,
    ) -> Result<Option<ShardErrors>, AdminError> {
        let shards = self.cl.request_sharded(req).await?;
        let total = shards.len();
        let mut errs = Vec::new();
        for shard in shards {
            match shard.resp {
                Err(err) => errs.push(ShardError {
                    broker: shard.broker,
                    err,
                }),
                Ok(resp) => {
                    if let Err(err) = on_resp(&shard.broker, resp) {
                        if err.is_auth() {
                            return Err(err);
                        }
                        errs.push(ShardError {
                            broker: shard.broker,
                            err,
                        });
                    }
                }
            }
        }
        if errs.is_empty() {
            Ok(None)
        } else {
            Ok(Some(ShardErrors {
                name,
                all_failed: errs.len() == total,
                errs,
            }))
        }
    }

    /// [`Self::shard_err_each_broker`] for callers that do not care which
    /// broker answered each shard.
    pub(crate) async fn shard_err_each(
        &self,
        name: &'static str,
        req: RequestKind,
        mut on_resp: impl FnMut(ResponseKind) -> Result<(), AdminError>,
    ) -> Result<Option<ShardErrors>, AdminError> {
        self.shard_err_each_broker(name, req, |_, resp| on_resp(resp))
            .await
    }
}
