//! Async driver for the facet-count engines.
//!
//! One spawned task owns every per-mode [`FacetCountsEngine`]. Callers talk
//! to it through a cloneable [`FacetCountsHandle`]; the task `select!`s over
//! commands, the active engine's debounce deadline, and completed fetches.
//! Engine state never leaves the task, so nothing guards it with a lock.
//!
//! ```text
//! FacetCountsHandle ──mpsc──► service task ──JoinSet──► FacetTransport
//!        ▲                         │
//!        └──── FacetSubscriber ◄───┘ (watch, via FacetDistributionContext)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, debug_span, error, field, info};

use tally_cache::{CacheStats, FacetCache};
use tally_core::{
    logging, Error, FacetCategory, FacetResponse, FacetTransport, FilterSpec, Fingerprint, Result,
    ResultMode,
};
use tally_scheduler::{BatchConfig, BatchScheduler, BatchStats};

use crate::config::EngineConfig;
use crate::distribution::{FacetDistribution, FacetDistributionContext, FacetSubscriber};
use crate::engine::{EntityCountPlan, FacetCountsEngine, FetchOutcome, FetchTicket};

enum Command {
    FilterChanged(FilterSpec),
    SetMode(ResultMode),
    Expand(FacetCategory),
    Collapse(FacetCategory),
    Refetch,
    ClearCache,
    Invalidate,
    PlanEntityCounts {
        category: FacetCategory,
        ids: Vec<String>,
        reply: oneshot::Sender<Option<EntityCountPlan>>,
    },
    MergeEntityCounts {
        mode: ResultMode,
        fingerprint: Fingerprint,
        category: FacetCategory,
        counts: Vec<(String, u64)>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Builder for the facet-count service.
pub struct FacetCountsService {
    transport: Arc<dyn FacetTransport>,
    config: EngineConfig,
    batch_config: BatchConfig,
    cache: Option<FacetCache>,
}

impl FacetCountsService {
    pub fn new(transport: Arc<dyn FacetTransport>) -> Self {
        Self {
            transport,
            config: EngineConfig::default(),
            batch_config: BatchConfig::default(),
            cache: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_batch_config(mut self, config: BatchConfig) -> Self {
        self.batch_config = config;
        self
    }

    /// Share an existing cache instead of creating one from the config TTL.
    pub fn with_cache(mut self, cache: FacetCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Spawn the service task with `initial` as the active mode's filter.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self, initial: FilterSpec) -> FacetCountsHandle {
        let cache = self
            .cache
            .unwrap_or_else(|| FacetCache::with_ttl(self.config.cache_ttl));
        let context = FacetDistributionContext::new(initial.mode);
        let batch = BatchScheduler::new(self.transport.clone(), self.batch_config);
        let (commands_tx, commands_rx) = mpsc::channel(self.config.command_capacity.max(1));

        let service = ServiceLoop {
            transport: self.transport,
            config: self.config,
            cache: cache.clone(),
            context: context.clone(),
            engines: HashMap::new(),
            active: initial.mode,
            fetches: JoinSet::new(),
            running: HashMap::new(),
        };
        tokio::spawn(service.run(commands_rx, initial));

        FacetCountsHandle {
            commands: commands_tx,
            context,
            batch,
            cache,
        }
    }
}

/// Cloneable control handle for a running facet-count service.
#[derive(Clone)]
pub struct FacetCountsHandle {
    commands: mpsc::Sender<Command>,
    context: FacetDistributionContext,
    batch: BatchScheduler,
    cache: FacetCache,
}

impl FacetCountsHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| Error::Closed)
    }

    /// Report a new filter for its mode. Only the active mode fetches.
    pub async fn filter_changed(&self, spec: FilterSpec) -> Result<()> {
        self.send(Command::FilterChanged(spec)).await
    }

    /// Switch the active mode; the previous one goes dormant.
    pub async fn set_mode(&self, mode: ResultMode) -> Result<()> {
        self.send(Command::SetMode(mode)).await
    }

    pub async fn expand_section(&self, category: FacetCategory) -> Result<()> {
        self.send(Command::Expand(category)).await
    }

    pub async fn collapse_section(&self, category: FacetCategory) -> Result<()> {
        self.send(Command::Collapse(category)).await
    }

    /// Fetch the active filter now, bypassing the debounce and cache.
    pub async fn refetch(&self) -> Result<()> {
        self.send(Command::Refetch).await
    }

    /// Drop every cached count. Published counts stay until the next fetch.
    pub async fn clear_cache(&self) -> Result<()> {
        self.send(Command::ClearCache).await
    }

    /// Clear the cache and refetch, for after the dataset changed.
    pub async fn invalidate(&self) -> Result<()> {
        self.send(Command::Invalidate).await
    }

    /// Resolve counts for individual ids of the active mode's filter.
    ///
    /// Cached counts are returned directly; the rest go through the batch
    /// scheduler. Ids the category is currently filtered to are omitted, as
    /// are ids whose fetch failed; a failure is never cached or published.
    pub async fn entity_counts(
        &self,
        category: FacetCategory,
        ids: &[String],
    ) -> Result<BTreeMap<String, u64>> {
        let (reply, plan) = oneshot::channel();
        self.send(Command::PlanEntityCounts {
            category,
            ids: ids.to_vec(),
            reply,
        })
        .await?;
        let Some(plan) = plan.await.map_err(|_| Error::Closed)? else {
            return Ok(BTreeMap::new());
        };

        let mut counts: BTreeMap<String, u64> = plan.cached.into_iter().collect();
        let requests = plan.pending.into_iter().map(|(key, query)| {
            let batch = self.batch.clone();
            async move {
                let id = key.key.clone();
                (id, batch.request(key, query).await)
            }
        });
        let fetched: Vec<(String, u64)> = futures::future::join_all(requests)
            .await
            .into_iter()
            .filter_map(|(id, count)| count.map(|count| (id, count)))
            .collect();

        if !fetched.is_empty() {
            self.send(Command::MergeEntityCounts {
                mode: plan.mode,
                fingerprint: plan.fingerprint,
                category,
                counts: fetched.clone(),
            })
            .await?;
        }
        counts.extend(fetched);
        Ok(counts)
    }

    pub fn subscribe(&self) -> FacetSubscriber {
        self.context.subscribe()
    }

    pub fn context(&self) -> &FacetDistributionContext {
        &self.context
    }

    pub fn current(&self) -> FacetDistribution {
        self.context.current()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn batch_stats(&self) -> BatchStats {
        self.batch.stats()
    }

    /// Stop the service task. Later calls return [`Error::Closed`].
    pub async fn shutdown(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Shutdown(ack)).await?;
        done.await.map_err(|_| Error::Closed)
    }
}

struct FetchDone {
    mode: ResultMode,
    fetch_id: u64,
    result: Result<FacetResponse>,
    elapsed: Duration,
}

struct ServiceLoop {
    transport: Arc<dyn FacetTransport>,
    config: EngineConfig,
    cache: FacetCache,
    context: FacetDistributionContext,
    engines: HashMap<ResultMode, FacetCountsEngine>,
    active: ResultMode,
    fetches: JoinSet<FetchDone>,
    /// Mode and fetch id of each spawned fetch task.
    running: HashMap<task::Id, (ResultMode, u64)>,
}

impl ServiceLoop {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, initial: FilterSpec) {
        info!(
            subsystem = "engine",
            component = "service",
            mode = %self.active,
            "Facet service started"
        );

        let now = Instant::now();
        let mode = self.active;
        self.engine(mode).on_filter_changed(initial, now);
        let ticket = self.engine(mode).set_active(true, now);
        self.dispatch(mode, ticket);
        self.publish();

        let ack = loop {
            let deadline = self.engine(self.active).next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown(ack)) => break Some(ack),
                    Some(command) => self.handle(command),
                    None => break None,
                },
                Some(joined) = self.fetches.join_next_with_id(), if !self.fetches.is_empty() => {
                    match joined {
                        Ok((id, done)) => {
                            self.running.remove(&id);
                            self.complete(done);
                        }
                        Err(e) => self.abandon(e),
                    }
                }
                _ = sleep_until_deadline(deadline) => {
                    let mode = self.active;
                    let ticket = self.engine(mode).tick(Instant::now());
                    self.dispatch(mode, ticket);
                }
            }
            self.publish();
        };

        drop(commands);
        self.fetches.abort_all();
        info!(subsystem = "engine", component = "service", "Facet service stopped");
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    fn engine(&mut self, mode: ResultMode) -> &mut FacetCountsEngine {
        let transport = &self.transport;
        let cache = &self.cache;
        let config = &self.config;
        self.engines.entry(mode).or_insert_with(|| {
            let per_entity: Vec<FacetCategory> = mode
                .profile()
                .categories
                .iter()
                .copied()
                .filter(|c| !transport.supports_bulk(mode, *c))
                .collect();
            FacetCountsEngine::new(mode, cache.clone(), config).with_per_entity(per_entity)
        })
    }

    fn handle(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::FilterChanged(spec) => {
                let mode = spec.mode;
                let ticket = self.engine(mode).on_filter_changed(spec, now);
                self.dispatch(mode, ticket);
            }
            Command::SetMode(mode) => {
                if mode == self.active {
                    return;
                }
                let previous = self.active;
                self.engine(previous).set_active(false, now);
                self.active = mode;
                info!(subsystem = "engine", from = %previous, to = %mode, "Result mode switched");
                let ticket = self.engine(mode).set_active(true, now);
                self.dispatch(mode, ticket);
            }
            Command::Expand(category) => {
                let mode = self.active;
                let ticket = self.engine(mode).expand_section(category, now);
                self.dispatch(mode, ticket);
            }
            Command::Collapse(category) => {
                let mode = self.active;
                self.engine(mode).collapse_section(category);
            }
            Command::Refetch => {
                let mode = self.active;
                let ticket = self.engine(mode).refetch(now);
                self.dispatch(mode, ticket);
            }
            Command::ClearCache => self.cache.clear(),
            Command::Invalidate => {
                self.cache.clear();
                let mode = self.active;
                let ticket = self.engine(mode).refetch(now);
                self.dispatch(mode, ticket);
            }
            Command::PlanEntityCounts {
                category,
                ids,
                reply,
            } => {
                let mode = self.active;
                let plan = self.engine(mode).prepare_entity_counts(category, &ids);
                let _ = reply.send(plan);
            }
            Command::MergeEntityCounts {
                mode,
                fingerprint,
                category,
                counts,
            } => {
                if self.engine(mode).merge_entity_counts(&fingerprint, category, &counts) {
                    debug!(%mode, %category, merged = counts.len(), "Entity counts merged");
                }
            }
            Command::Shutdown(_) => {}
        }
    }

    fn dispatch(&mut self, mode: ResultMode, ticket: Option<FetchTicket>) {
        let Some(ticket) = ticket else {
            return;
        };
        let transport = self.transport.clone();
        let fetch_id = ticket.id;
        let handle = self.fetches.spawn(async move {
            let started = Instant::now();
            let result = transport.fetch_facets(&ticket.query).await;
            FetchDone {
                mode,
                fetch_id: ticket.id,
                result,
                elapsed: started.elapsed(),
            }
        });
        self.running.insert(handle.id(), (mode, fetch_id));
    }

    /// Settle a fetch whose task panicked so its mode stops loading.
    fn abandon(&mut self, e: task::JoinError) {
        error!(error = ?e, "Facet fetch task panicked");
        let Some((mode, fetch_id)) = self.running.remove(&e.id()) else {
            return;
        };
        let failure = Err(Error::Internal(format!("fetch task failed: {e}")));
        let outcome = self.engine(mode).on_fetch_complete(fetch_id, failure);
        debug!(%mode, fetch_id, ?outcome, "Abandoned fetch settled");
    }

    fn complete(&mut self, done: FetchDone) {
        let span = debug_span!(
            "facet_fetch",
            subsystem = "engine",
            mode = %done.mode,
            fetch_id = field::Empty,
            duration_ms = field::Empty,
            success = field::Empty,
        );
        span.record(logging::FETCH_ID, done.fetch_id);
        span.record(logging::DURATION_MS, done.elapsed.as_millis() as u64);
        span.record(logging::SUCCESS, done.result.is_ok());
        let _entered = span.enter();

        let outcome = self.engine(done.mode).on_fetch_complete(done.fetch_id, done.result);
        debug!(?outcome, "Fetch completed");
        if outcome == FetchOutcome::Merged && done.mode != self.active {
            debug!("Merged counts for a dormant mode");
        }
    }

    fn publish(&mut self) {
        let mode = self.active;
        let distribution = self.engine(mode).distribution();
        self.context.publish(distribution);
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
