/**
 * Remote Peer Adapter
 *
 * DESIGN DECISION: An injected async trait instead of a concrete HTTP/
 * WebSocket client
 * WHY: Wire framing for the federation protocol is out of scope; a host
 * application already has its own transport (HTTP, QUIC, an in-process
 * test double) and just needs a place to plug it in. This mirrors how the
 * Generator capability is consumed — a trait seam, not a shipped client —
 * generalized here from a single request/response RPC shape to the small
 * set of federation operations a remote actually needs to answer.
 *
 * PATTERN: Injected async capability trait (transport-agnostic adapter)
 */

use crate::error::Result;
use crate::pattern::{Language, Pattern};
use async_trait::async_trait;

/// Constraints for [`RemotePeer::pull`], mirroring `pullCommunity`'s options
/// but sourced from a remote instead of the local community shard.
#[derive(Debug, Clone, Default)]
pub struct RemotePullFilter {
    pub language: Option<Language>,
    pub max_pull: usize,
    pub name_filter: Option<String>,
}

/// A single federation peer. One [`FederationNode`](super::FederationNode)
/// may hold several, keyed by name.
#[async_trait]
pub trait RemotePeer: Send + Sync {
    fn name(&self) -> &str;

    /// Keyword/intent search fanned out from `remoteSearch`.
    async fn search(&self, term: &str, max_results: usize) -> Result<Vec<Pattern>>;

    /// Pattern pull for `sync(direction: pull)`.
    async fn pull(&self, filter: RemotePullFilter) -> Result<Vec<Pattern>>;

    /// Pattern push for `sync(direction: push)`; returns how many the
    /// remote accepted (it runs its own acceptance rules).
    async fn push(&self, patterns: &[Pattern]) -> Result<usize>;
}
