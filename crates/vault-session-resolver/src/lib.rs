#![warn(missing_docs)]
//! # vault-session-resolver
//!
//! ## Purpose
//! Computes placeholder-expanded display text for list cells on background
//! workers without blocking the owner thread or applying stale results.
//!
//! ## Responsibilities
//! - Hold the displayed [`RowSet`] and its generation counter.
//! - Queue [`PendingFieldJob`]s onto a fixed pool of named worker threads.
//! - Apply finished results on the owner thread, only for the current
//!   generation.
//! - Cancel and drain outstanding work before lock, close and shutdown.
//!
//! ## Data flow
//! Owner rebuilds rows -> [`FieldResolver::enqueue`] sends a job to a worker ->
//! worker calls [`PlaceholderCompiler::expand`] on an `Arc<Store>` snapshot ->
//! worker sends a [`FieldResult`] back -> owner calls
//! [`FieldResolver::apply_ready`] which writes the cell under the row lock if
//! the generation still matches.
//!
//! ## Ownership and lifetimes
//! Workers own only the job, a store snapshot and the compiler handle. They
//! never hold the row lock; the apply step runs on the owner thread.
//!
//! ## Error model
//! Expansion failures are swallowed per cell: the raw template stays visible.
//! Pool setup and use-after-shutdown return [`ResolverError`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use vault_session_core::{Entry, Locator, Store, standard_fields};
//! use vault_session_engine::SprCompiler;
//! use vault_session_resolver::{FieldResolver, RowSource};
//!
//! let mut store = Store::with_root("Vault", "root");
//! store.add_entry(Entry::new("e1", "root").with_field(standard_fields::TITLE, "Mail")
//!     .with_field(standard_fields::NOTES, "{TITLE}"));
//! let resolver = FieldResolver::new(Arc::new(SprCompiler::new()), 1).expect("pool starts");
//! let source = RowSource::new(Arc::new(store), Locator::empty());
//! resolver.populate(&source, "root", &[standard_fields::NOTES]).expect("jobs queue");
//! resolver.drain();
//! assert_eq!(resolver.rows().cell("e1", 0).as_deref(), Some("Mail"));
//! ```

mod rows;

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, warn};
use vault_session_core::{Locator, Store};
use vault_session_engine::{ExpandContext, PlaceholderCompiler};

pub use rows::{Row, RowSet, needs_expansion, populate_rows};

/// One queued cell expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFieldJob {
    /// Entry id of the target row.
    pub row: String,
    /// Target column.
    pub column: usize,
    /// Unexpanded cell text.
    pub raw_template: String,
    /// Row-set generation when the job was queued.
    pub generation: u64,
}

/// Finished expansion waiting to be applied by the owner thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldResult {
    /// Originating job.
    pub job: PendingFieldJob,
    /// Expanded text, or `None` when expansion failed.
    pub text: Option<String>,
}

/// Store snapshot and locator the current rows were built from.
#[derive(Debug, Clone)]
pub struct RowSource {
    store: Arc<Store>,
    locator: Locator,
}

impl RowSource {
    /// Wraps a snapshot.
    pub fn new(store: Arc<Store>, locator: Locator) -> Self {
        Self { store, locator }
    }

    /// Snapshot the rows read from.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn context_for(&self, entry_id: &str) -> ExpandContext {
        ExpandContext {
            store: Arc::clone(&self.store),
            entry_id: entry_id.to_string(),
            locator: self.locator.clone(),
        }
    }
}

enum WorkerCommand {
    Resolve {
        job: PendingFieldJob,
        ctx: ExpandContext,
    },
    Shutdown,
}

#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn begin(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn current(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Background placeholder expansion for list cells.
///
/// # Invariants
/// - A result for generation `g` is never written once the row set has moved
///   past `g`; the check and the write share the row lock.
/// - After [`FieldResolver::drain`] returns, no worker holds a job accepted
///   before the call.
pub struct FieldResolver {
    rows: RowSet,
    command_tx: Option<Sender<WorkerCommand>>,
    result_rx: Receiver<FieldResult>,
    in_flight: Arc<InFlight>,
    workers: Vec<JoinHandle<()>>,
}

impl FieldResolver {
    /// Starts `workers` named worker threads around `compiler`.
    ///
    /// # Errors
    /// - [`ResolverError::NoWorkers`] when `workers == 0`.
    /// - [`ResolverError::Spawn`] when a thread cannot be started.
    pub fn new(
        compiler: Arc<dyn PlaceholderCompiler>,
        workers: usize,
    ) -> Result<Self, ResolverError> {
        Self::with_rows(compiler, workers, RowSet::new())
    }

    /// Same as [`FieldResolver::new`] but applies into an existing row set.
    ///
    /// # Errors
    /// See [`FieldResolver::new`].
    pub fn with_rows(
        compiler: Arc<dyn PlaceholderCompiler>,
        workers: usize,
        rows: RowSet,
    ) -> Result<Self, ResolverError> {
        if workers == 0 {
            return Err(ResolverError::NoWorkers);
        }

        let (command_tx, command_rx) = mpsc::channel::<WorkerCommand>();
        let (result_tx, result_rx) = mpsc::channel::<FieldResult>();
        let command_rx = Arc::new(Mutex::new(command_rx));
        let in_flight = Arc::new(InFlight::default());

        let mut resolver = Self {
            rows,
            command_tx: Some(command_tx),
            result_rx,
            in_flight: Arc::clone(&in_flight),
            workers: Vec::with_capacity(workers),
        };

        for index in 0..workers {
            let worker = WorkerLoop {
                compiler: Arc::clone(&compiler),
                commands: Arc::clone(&command_rx),
                results: result_tx.clone(),
                rows: resolver.rows.clone(),
                in_flight: Arc::clone(&in_flight),
            };
            let handle = thread::Builder::new()
                .name(format!("vault-session-resolver-{index}"))
                .spawn(move || worker.run())
                .map_err(|error| ResolverError::Spawn(error.to_string()))?;
            resolver.workers.push(handle);
        }

        debug!(workers, "Field resolver started");
        Ok(resolver)
    }

    /// Row set results are applied to.
    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    /// Queues one cell expansion.
    ///
    /// A job whose generation is already stale is dropped immediately.
    ///
    /// # Errors
    /// Returns [`ResolverError::Stopped`] after shutdown.
    pub fn enqueue(&self, job: PendingFieldJob, source: &RowSource) -> Result<(), ResolverError> {
        let command_tx = self.command_tx.as_ref().ok_or(ResolverError::Stopped)?;
        if job.generation != self.rows.generation() {
            return Ok(());
        }

        let ctx = source.context_for(&job.row);
        self.in_flight.begin();
        if command_tx.send(WorkerCommand::Resolve { job, ctx }).is_err() {
            self.in_flight.finish();
            return Err(ResolverError::Stopped);
        }
        Ok(())
    }

    /// Rebuilds rows for `group_id` and queues jobs for cells that need
    /// expansion.
    ///
    /// # Returns
    /// The new generation.
    ///
    /// # Errors
    /// Returns [`ResolverError::Stopped`] after shutdown.
    pub fn populate(
        &self,
        source: &RowSource,
        group_id: &str,
        columns: &[&str],
    ) -> Result<u64, ResolverError> {
        let rows = populate_rows(source.store(), group_id, columns);
        let jobs: Vec<(String, usize, String)> = rows
            .iter()
            .flat_map(|row| {
                row.cells
                    .iter()
                    .enumerate()
                    .filter(|(_, cell)| needs_expansion(cell))
                    .map(|(column, cell)| (row.entry_id.clone(), column, cell.clone()))
            })
            .collect();

        let generation = self.rows.rebuild(rows);
        for (row, column, raw_template) in jobs {
            self.enqueue(
                PendingFieldJob {
                    row,
                    column,
                    raw_template,
                    generation,
                },
                source,
            )?;
        }
        Ok(generation)
    }

    /// Applies every finished result for the current generation.
    ///
    /// # Returns
    /// Number of cells written.
    pub fn apply_ready(&self) -> usize {
        let mut applied = 0;
        loop {
            match self.result_rx.try_recv() {
                Ok(result) => {
                    let Some(text) = result.text else {
                        continue;
                    };
                    let job = result.job;
                    if self
                        .rows
                        .apply_if_current(job.generation, &job.row, job.column, text)
                    {
                        applied += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        applied
    }

    /// Invalidates every queued and in-flight job.
    ///
    /// # Returns
    /// The new generation.
    pub fn cancel_pending(&self) -> u64 {
        self.rows.invalidate()
    }

    /// Blocks until every accepted job has finished, then applies results.
    ///
    /// # Returns
    /// Number of cells written by the final apply.
    pub fn drain(&self) -> usize {
        self.in_flight.wait_idle();
        self.apply_ready()
    }

    /// Jobs accepted but not yet finished by a worker.
    pub fn pending(&self) -> usize {
        self.in_flight.current()
    }

    /// Stops and joins all workers. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(command_tx) = self.command_tx.take() else {
            return;
        };
        for _ in 0..self.workers.len() {
            let _ = command_tx.send(WorkerCommand::Shutdown);
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Field resolver worker panicked");
            }
        }
        debug!("Field resolver stopped");
    }
}

impl Drop for FieldResolver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for FieldResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldResolver")
            .field("generation", &self.rows.generation())
            .field("workers", &self.workers.len())
            .field("pending", &self.pending())
            .finish()
    }
}

struct WorkerLoop {
    compiler: Arc<dyn PlaceholderCompiler>,
    commands: Arc<Mutex<Receiver<WorkerCommand>>>,
    results: Sender<FieldResult>,
    rows: RowSet,
    in_flight: Arc<InFlight>,
}

impl WorkerLoop {
    fn run(self) {
        loop {
            let command = {
                let commands = self
                    .commands
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                commands.recv()
            };

            match command {
                Ok(WorkerCommand::Resolve { job, ctx }) => {
                    self.resolve(job, ctx);
                    self.in_flight.finish();
                }
                Ok(WorkerCommand::Shutdown) | Err(_) => break,
            }
        }
    }

    /// Consumes `ctx` so the store snapshot is released before the job is
    /// counted as finished.
    fn resolve(&self, job: PendingFieldJob, ctx: ExpandContext) {
        // Only reads the generation mirror; the row table is never locked here.
        if job.generation != self.rows.generation() {
            return;
        }

        let text = match self.compiler.expand(&job.raw_template, &ctx) {
            Ok(text) => Some(text),
            Err(error) => {
                debug!(row = %job.row, column = job.column, error = %error, "Cell expansion failed");
                None
            }
        };
        drop(ctx);
        let _ = self.results.send(FieldResult { job, text });
    }
}

/// Resolver pool error type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolverError {
    /// Pool size must be positive.
    #[error("resolver needs at least one worker")]
    NoWorkers,
    /// Worker thread could not be started.
    #[error("failed to spawn resolver worker: {0}")]
    Spawn(String),
    /// Pool has been shut down.
    #[error("resolver has been shut down")]
    Stopped,
}
