/**
 * Federation Node
 *
 * DESIGN DECISION: One node owns a local store, an optional community
 * shard (a sibling collection with the same schema), a voter ledger, and
 * zero or more named remotes reached through the injected `RemotePeer`
 * trait — sync/share/pull/search/vote/submit are all plain methods on this
 * one struct rather than separate services
 * WHY: Every federation operation ultimately reads or writes the same
 * local store and the same voter ledger; centralizing them keeps the
 * acceptance rule (Evaluator covenant-sealed, coherency >= 0.55) and the
 * merge-on-duplicate behavior consistent across every path patterns can
 * enter the node from, the same consolidation this generalizes from the
 * discovery/query/sync split this codebase used for shared-knowledge
 * access.
 *
 * REASONING CHAIN:
 * 1. `share` copies qualifying local patterns into the community shard —
 *    both are local SQLite collections, no transport involved
 * 2. `pull_community` copies the other way, subject to the same acceptance
 *    rule as anything else entering the local store
 * 3. `sync`/`remote_search` are the only operations that cross a
 *    `RemotePeer`; remote_search fans out concurrently and tolerates
 *    partial failure, sync moves the full collection in one direction
 * 4. `vote` updates a pattern's tally immediately, weighted by the voter's
 *    reputation *at vote time*; whether the vote was accurate is resolved
 *    later, by whoever observes the pattern's reliability move
 * 5. `submit` is the one path by which fully new code enters federation,
 *    and it runs through the same Evaluator every local submission does
 *
 * PATTERN: Single node owning local/community/remote topology plus voter
 * ledger and rate/idempotency guards
 */

pub mod rate_limit;
pub mod remote;
pub mod reputation;

use crate::config::RateLimitConfig;
use crate::error::{Error, Result};
use crate::evaluator::{EvaluateOptions, Evaluator};
use crate::pattern::{GenerationMethod, Language, Pattern};
use crate::store::{Filter, PatternStore};
use chrono::{DateTime, Utc};
use rate_limit::{IdempotencyGuard, RateLimiter};
use remote::{RemotePeer, RemotePullFilter};
use reputation::Voter;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Evaluator `min_coherency` floor applied to every pattern entering the
/// node from outside (federation submit, sync pull, community pull).
const ACCEPTANCE_FLOOR: f64 = 0.55;
const DEFAULT_SHARE_MIN_COHERENCY: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Push,
    Pull,
    Both,
}

#[derive(Debug, Clone)]
pub struct ShareOptions {
    pub min_coherency: f64,
    pub patterns: Option<Vec<Uuid>>,
    pub tags: Vec<String>,
}

impl Default for ShareOptions {
    fn default() -> Self {
        Self {
            min_coherency: DEFAULT_SHARE_MIN_COHERENCY,
            patterns: None,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PullCommunityOptions {
    pub language: Option<Language>,
    pub max_pull: usize,
    pub name_filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteSearchHit {
    pub remote: String,
    pub latency_ms: u128,
    pub count: usize,
    pub patterns: Vec<Pattern>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub pushed: usize,
    pub pulled: usize,
    pub rejected: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct SubmitMeta {
    pub name: String,
    pub description: String,
    pub language: Option<Language>,
    pub tags: Vec<String>,
    pub test_code: Option<String>,
    pub author: String,
}

#[derive(Debug, Clone)]
pub struct VoteOutcome {
    pub weight: f64,
    pub upvotes: u64,
    pub downvotes: u64,
}

/// SQLite-backed voter ledger; its own connection onto the same store
/// file, same single-writer discipline as [`PatternStore`].
pub struct VoterStore {
    conn: AsyncMutex<Connection>,
}

impl VoterStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        crate::store::schema::init_schema(&conn)?;
        Ok(Self { conn: AsyncMutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        crate::store::schema::init_schema(&conn)?;
        Ok(Self { conn: AsyncMutex::new(conn) })
    }

    pub async fn get_or_create(&self, id: &str) -> Result<Voter> {
        let conn = self.conn.lock().await;
        let row: Option<(f64, u64, String, String)> = conn
            .query_row(
                "SELECT reputation, votes_cast, created_at, updated_at FROM voters WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        if let Some((reputation, votes_cast, created_at, updated_at)) = row {
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| Error::Fatal(e.to_string()))?
                .with_timezone(&Utc);
            let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .map_err(|e| Error::Fatal(e.to_string()))?
                .with_timezone(&Utc);
            return Ok(Voter::from_row(id.to_string(), reputation, votes_cast, created_at, updated_at));
        }

        let voter = Voter::new(id);
        conn.execute(
            "INSERT INTO voters (id, reputation, votes_cast, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                voter.id(),
                voter.reputation(),
                voter.votes_cast(),
                voter.created_at().to_rfc3339(),
                voter.updated_at().to_rfc3339(),
            ],
        )?;
        Ok(voter)
    }

    pub async fn save(&self, voter: &Voter) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO voters (id, reputation, votes_cast, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET reputation = excluded.reputation, votes_cast = excluded.votes_cast, updated_at = excluded.updated_at",
            params![
                voter.id(),
                voter.reputation(),
                voter.votes_cast(),
                voter.created_at().to_rfc3339(),
                voter.updated_at().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn record_vote_row(&self, pattern_id: Uuid, voter_id: &str, direction: i8, weight: f64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO votes (pattern_id, voter_id, direction, weight, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(pattern_id, voter_id) DO UPDATE SET direction = excluded.direction, weight = excluded.weight, timestamp = excluded.timestamp",
            params![pattern_id.to_string(), voter_id, direction as i64, weight, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

pub struct FederationNode<'a> {
    local: &'a PatternStore,
    community: Option<&'a PatternStore>,
    remotes: HashMap<String, Arc<dyn RemotePeer>>,
    voters: VoterStore,
    rate_limiter: RateLimiter,
    idempotency: IdempotencyGuard,
}

impl<'a> FederationNode<'a> {
    pub fn new(
        local: &'a PatternStore,
        community: Option<&'a PatternStore>,
        voters: VoterStore,
        idempotency: IdempotencyGuard,
        rate_limit: &RateLimitConfig,
    ) -> Self {
        Self {
            local,
            community,
            remotes: HashMap::new(),
            voters,
            rate_limiter: RateLimiter::new(rate_limit),
            idempotency,
        }
    }

    pub fn add_remote(&mut self, peer: Arc<dyn RemotePeer>) {
        self.remotes.insert(peer.name().to_string(), peer);
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn idempotency(&self) -> &IdempotencyGuard {
        &self.idempotency
    }

    /// Copies local patterns meeting `opts` into the community shard.
    /// Requires test code (the "tests +" half of the default gate) and
    /// `coherencyScore.total >= opts.min_coherency`.
    pub async fn share(&self, opts: ShareOptions) -> Result<usize> {
        let Some(community) = self.community else {
            return Err(Error::ValidationRejected("no community shard configured".to_string()));
        };

        let candidates: Vec<Pattern> = self
            .local
            .all()
            .into_iter()
            .filter(|p| opts.patterns.as_ref().map(|ids| ids.contains(&p.id())).unwrap_or(true))
            .filter(|p| opts.tags.is_empty() || p.tags().iter().any(|t| opts.tags.contains(t)))
            .filter(|p| p.test_code().is_some())
            .filter(|p| p.coherency_score().total() >= opts.min_coherency)
            .collect();

        let mut shared = 0;
        for pattern in candidates {
            community.insert(pattern, false).await?;
            shared += 1;
        }
        Ok(shared)
    }

    /// Copies patterns from the community shard into the local store,
    /// subject to the same acceptance rule as any other external input.
    pub async fn pull_community(&self, opts: PullCommunityOptions) -> Result<usize> {
        let Some(community) = self.community else {
            return Err(Error::ValidationRejected("no community shard configured".to_string()));
        };

        let filter = Filter {
            language: opts.language,
            ..Default::default()
        };
        let mut candidates = community.iter(&filter);
        if let Some(name_filter) = &opts.name_filter {
            candidates.retain(|p| p.name().contains(name_filter.as_str()));
        }
        candidates.retain(|p| p.coherency_score().total() >= ACCEPTANCE_FLOOR);

        let max_pull = if opts.max_pull == 0 { candidates.len() } else { opts.max_pull };
        let mut pulled = 0;
        for pattern in candidates.into_iter().take(max_pull) {
            self.local.insert(pattern, false).await?;
            pulled += 1;
        }
        Ok(pulled)
    }

    /// Fans a keyword search out across every registered remote
    /// concurrently. A failing remote contributes a hit with `error` set
    /// rather than aborting the whole search.
    pub async fn remote_search(&self, term: &str, max_results_per_remote: usize) -> Vec<RemoteSearchHit> {
        let mut set = JoinSet::new();
        for (name, peer) in self.remotes.iter() {
            let name = name.clone();
            let peer = peer.clone();
            let term = term.to_string();
            set.spawn(async move {
                let started = Instant::now();
                match peer.search(&term, max_results_per_remote).await {
                    Ok(patterns) => RemoteSearchHit {
                        remote: name,
                        latency_ms: started.elapsed().as_millis(),
                        count: patterns.len(),
                        patterns,
                        error: None,
                    },
                    Err(e) => RemoteSearchHit {
                        remote: name,
                        latency_ms: started.elapsed().as_millis(),
                        count: 0,
                        patterns: Vec::new(),
                        error: Some(e.to_string()),
                    },
                }
            });
        }

        let mut hits = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(hit) = joined {
                hits.push(hit);
            }
        }
        hits
    }

    /// Pushes the full local collection to `remote_name`, pulls its full
    /// collection back, or both. `dry_run` reports counts without calling
    /// the remote at all.
    pub async fn sync(&self, remote_name: &str, direction: SyncDirection, dry_run: bool) -> Result<SyncReport> {
        let peer = self
            .remotes
            .get(remote_name)
            .ok_or_else(|| Error::NotFound(remote_name.to_string()))?;

        let mut report = SyncReport { dry_run, ..Default::default() };

        if matches!(direction, SyncDirection::Push | SyncDirection::Both) {
            let local_patterns = self.local.all();
            report.pushed = local_patterns.len();
            if !dry_run {
                peer.push(&local_patterns).await?;
            }
        }

        if matches!(direction, SyncDirection::Pull | SyncDirection::Both) {
            let pulled = peer
                .pull(RemotePullFilter {
                    language: None,
                    max_pull: usize::MAX,
                    name_filter: None,
                })
                .await?;
            report.pulled = pulled.len();
            if !dry_run {
                for pattern in pulled {
                    if pattern.coherency_score().total() >= ACCEPTANCE_FLOOR {
                        self.local.insert(pattern, false).await?;
                    } else {
                        report.rejected += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Applies a weighted vote to a pattern and records the voter's cast.
    /// Whether the vote was *accurate* is resolved later — see
    /// [`FederationNode::resolve_vote_accuracy`].
    pub async fn vote(&self, pattern_id: Uuid, voter_id: &str, direction: i8) -> Result<VoteOutcome> {
        let mut voter = self.voters.get_or_create(voter_id).await?;
        let weight = voter.weight();

        let updated = self
            .local
            .update(pattern_id, |p| p.record_vote(voter_id, direction, weight))
            .await?;

        self.voters.record_vote_row(pattern_id, voter_id, direction, weight).await?;
        voter.record_vote_cast();
        self.voters.save(&voter).await?;

        Ok(VoteOutcome {
            weight,
            upvotes: updated.votes().upvotes,
            downvotes: updated.votes().downvotes,
        })
    }

    /// Called once a pattern's reliability has moved since a vote was
    /// cast — rewards the voter if the movement matches the direction they
    /// picked. Not invoked automatically: nothing in the vote path itself
    /// observes reliability changing, so a caller (typically the Lifecycle
    /// Evolve phase) supplies the delta when it notices one.
    pub async fn resolve_vote_accuracy(&self, voter_id: &str, direction: i8, delta_reliability: f64) -> Result<()> {
        let mut voter = self.voters.get_or_create(voter_id).await?;
        voter.record_accurate_vote(direction, delta_reliability);
        self.voters.save(&voter).await
    }

    /// Evaluates and inserts a freshly submitted pattern, tagging its
    /// lineage as `Submit` and its author from `meta`.
    pub async fn submit(&self, evaluator: &Evaluator, code: String, meta: SubmitMeta) -> Result<Pattern> {
        let evaluation = evaluator.evaluate(
            &code,
            EvaluateOptions {
                language: meta.language,
                test_code: meta.test_code.as_deref(),
                description: &meta.description,
                min_coherency: ACCEPTANCE_FLOOR,
            },
        )?;

        if !evaluation.valid {
            if let Ok(mut voter) = self.voters.get_or_create(&meta.author).await {
                voter.record_rejected_submission();
                let _ = self.voters.save(&voter).await;
            }
            return Err(Error::ValidationRejected(format!(
                "submission from {} did not clear the acceptance floor",
                meta.author
            )));
        }

        let pattern = Pattern::builder()
            .name(meta.name)
            .code(code)
            .language(evaluation.language)
            .description(meta.description)
            .tags(meta.tags)
            .pattern_type(evaluation.pattern_type)
            .complexity(evaluation.complexity)
            .coherency_score(evaluation.coherency_score)
            .generation_method(GenerationMethod::Submit)
            .author(meta.author)
            .build()?;

        self.local.insert(pattern.clone(), false).await?;
        Ok(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CovenantConfig;
    use crate::coherency::CoherencyWeights;
    use crate::pattern::PatternType;
    use async_trait::async_trait;

    fn coherency_of(total_hint: f64) -> crate::coherency::CoherencyScore {
        crate::coherency::CoherencyScore::calculate(
            crate::coherency::CoherencyBreakdown {
                correctness: total_hint,
                simplicity: total_hint,
                relevance: total_hint,
                clarity: total_hint,
                nesting: total_hint,
                security: total_hint,
            },
            &CoherencyWeights::default(),
        )
        .unwrap()
    }

    fn sample(name: &str) -> Pattern {
        Pattern::builder()
            .name(name)
            .code("function f() { return 1; }")
            .language(Language::Javascript)
            .pattern_type(PatternType::Utility)
            .test_code("assert(f() === 1)")
            .coherency_score(coherency_of(0.9))
            .build()
            .unwrap()
    }

    fn node<'a>(local: &'a PatternStore, community: &'a PatternStore) -> FederationNode<'a> {
        FederationNode::new(
            local,
            Some(community),
            VoterStore::open_in_memory().unwrap(),
            IdempotencyGuard::open_in_memory().unwrap(),
            &RateLimitConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_share_requires_tests_and_coherency() {
        let local = PatternStore::open_in_memory().unwrap();
        let community = PatternStore::open_in_memory().unwrap();
        let mut with_tests = sample("alpha");
        with_tests.set_coherency_score(
            crate::coherency::CoherencyScore::calculate(
                crate::coherency::CoherencyBreakdown {
                    correctness: 1.0,
                    simplicity: 1.0,
                    relevance: 1.0,
                    clarity: 1.0,
                    nesting: 1.0,
                    security: 1.0,
                },
                &CoherencyWeights::default(),
            )
            .unwrap(),
        );
        local.insert(with_tests, false).await.unwrap();
        let mut weak_but_stored = sample("beta");
        weak_but_stored.set_coherency_score(coherency_of(0.65)); // clears the store floor, not the share floor
        local.insert(weak_but_stored, false).await.unwrap();

        let node = node(&local, &community);
        let shared = node.share(ShareOptions::default()).await.unwrap();
        assert_eq!(shared, 1);
        assert_eq!(community.all().len(), 1);
    }

    #[tokio::test]
    async fn test_pull_community_respects_acceptance_floor() {
        let local = PatternStore::open_in_memory().unwrap();
        let community = PatternStore::open_in_memory().unwrap();
        // The community store's own floor (I1) is stricter than
        // ACCEPTANCE_FLOOR, so a weak pattern never even makes it into
        // community for pull_community to have to filter out.
        let mut weak = sample("weak");
        weak.set_coherency_score(coherency_of(0.0));
        let err = community.insert(weak, false).await.unwrap_err();
        assert!(matches!(err, Error::ConstraintViolated(_)));

        let node = node(&local, &community);
        let pulled = node.pull_community(PullCommunityOptions::default()).await.unwrap();
        assert_eq!(pulled, 0);
        assert_eq!(local.all().len(), 0);
    }

    #[tokio::test]
    async fn test_vote_applies_weight_and_persists() {
        let local = PatternStore::open_in_memory().unwrap();
        let community = PatternStore::open_in_memory().unwrap();
        let pattern = sample("gamma");
        let id = pattern.id();
        local.insert(pattern, false).await.unwrap();

        let node = node(&local, &community);
        let outcome = node.vote(id, "voter-1", 1).await.unwrap();
        assert!((outcome.weight - 1.0).abs() < 1e-9);
        assert_eq!(outcome.upvotes, 1);
    }

    #[tokio::test]
    async fn test_submit_rejects_below_acceptance_floor() {
        let local = PatternStore::open_in_memory().unwrap();
        let community = PatternStore::open_in_memory().unwrap();
        let node = node(&local, &community);
        let evaluator = Evaluator::new(CoherencyWeights::default(), CovenantConfig::default());

        let err = node
            .submit(
                &evaluator,
                "let q = \"SELECT * FROM users WHERE id=\" + id;".to_string(),
                SubmitMeta {
                    name: "unsafe-query".to_string(),
                    description: "build a query".to_string(),
                    language: Some(Language::Javascript),
                    tags: vec![],
                    test_code: None,
                    author: "voter-2".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationRejected(_)));
    }

    struct NeverRespondsPeer;

    #[async_trait]
    impl RemotePeer for NeverRespondsPeer {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn search(&self, _term: &str, _max_results: usize) -> Result<Vec<Pattern>> {
            Err(Error::Transient("peer unreachable".to_string()))
        }
        async fn pull(&self, _filter: RemotePullFilter) -> Result<Vec<Pattern>> {
            Ok(vec![])
        }
        async fn push(&self, _patterns: &[Pattern]) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_remote_search_tolerates_partial_failure() {
        let local = PatternStore::open_in_memory().unwrap();
        let community = PatternStore::open_in_memory().unwrap();
        let mut node = node(&local, &community);
        node.add_remote(Arc::new(NeverRespondsPeer));

        let hits = node.remote_search("anything", 5).await;
        assert_eq!(hits.len(), 1);
        assert!(hits[0].error.is_some());
    }
}
