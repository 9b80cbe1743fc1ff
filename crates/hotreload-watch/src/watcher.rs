//! Background file watcher.
//!
//! Observes one or more directory trees, aggregates bursts of filesystem
//! events into a [`ChangeSet`] and hands each one to a [`ChangeHandler`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::change::{ChangeKind, ChangeSet};
use crate::debouncer::EventDebouncer;
use crate::error::{HandlerError, WatchError};
use crate::filter::{DEFAULT_IGNORE_PATTERNS, PathFilter};

/// Default quiet period before a batch is released.
const DEFAULT_DEBOUNCE_MS: u64 = 50;

/// Default upper bound on how long a batch may be held back.
const DEFAULT_MAX_WAIT_MS: u64 = 1600;

/// Receives aggregated change sets.
///
/// Invoked serially, once per aggregation window. Implemented for any
/// `Fn(ChangeSet) -> impl Future<Output = Result<(), HandlerError>>` closure.
pub trait ChangeHandler: Send + Sync + 'static {
    /// Handle one aggregated change set.
    fn on_change(
        &self,
        changes: ChangeSet,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send;
}

impl<F, Fut> ChangeHandler for F
where
    F: Fn(ChangeSet) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    fn on_change(
        &self,
        changes: ChangeSet,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        self(changes)
    }
}

/// Tuning for aggregation and path filtering.
#[derive(Clone, Debug)]
pub struct WatchOptions {
    /// Quiet period after the last event before a batch is released.
    pub debounce: Duration,
    /// Maximum time the first event of a batch may wait.
    pub max_wait: Duration,
    /// Glob patterns for paths to ignore.
    pub ignore_patterns: Vec<String>,
    /// Glob patterns for paths to watch (empty watches everything).
    pub watch_patterns: Vec<String>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
            watch_patterns: Vec::new(),
        }
    }
}

/// Lifecycle state reported by [`Watcher::state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherState {
    /// No watch task; `startup` may be called.
    Idle,
    /// The watch task is running.
    Running,
    /// The watch task exited on its own. Its outcome is returned by `shutdown`.
    Finished,
}

/// The single background execution of a running watcher.
struct WatchTask {
    /// Stop signal scoped to this run.
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), WatchError>>,
}

/// Watches directory trees and reports aggregated changes.
///
/// At most one watch task runs at a time. Dropping a running watcher stops
/// its task without waiting for it.
pub struct Watcher<H> {
    paths: Vec<PathBuf>,
    handler: Arc<H>,
    options: WatchOptions,
    task: Option<WatchTask>,
}

impl<H: ChangeHandler> Watcher<H> {
    /// Create a watcher with default options.
    pub fn new(paths: Vec<PathBuf>, handler: H) -> Self {
        Self::with_options(paths, handler, WatchOptions::default())
    }

    /// Create a watcher with custom options.
    pub fn with_options(paths: Vec<PathBuf>, handler: H, options: WatchOptions) -> Self {
        Self {
            paths,
            handler: Arc::new(handler),
            options,
            task: None,
        }
    }

    /// Watched paths.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatcherState {
        match &self.task {
            None => WatcherState::Idle,
            Some(task) if task.handle.is_finished() => WatcherState::Finished,
            Some(_) => WatcherState::Running,
        }
    }

    /// Start watching in the background.
    ///
    /// Must be called from within a tokio runtime. Returns as soon as the
    /// event source is attached.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::AlreadyStarted`] if a watch task is running,
    /// [`WatchError::NoPaths`] if there is nothing to watch, or an error if a
    /// path cannot be watched or a pattern is invalid.
    pub fn startup(&mut self) -> Result<(), WatchError> {
        if self.task.is_some() {
            return Err(WatchError::AlreadyStarted);
        }
        if self.paths.is_empty() {
            return Err(WatchError::NoPaths);
        }

        let filter = PathFilter::new(
            &self.paths,
            &self.options.ignore_patterns,
            &self.options.watch_patterns,
        )?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        // The notify callback runs on its own thread and must never block
        let mut source = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        })?;
        for path in &self.paths {
            source.watch(path, RecursiveMode::Recursive)?;
        }

        let debouncer = EventDebouncer::new(self.options.debounce, self.options.max_wait);
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run(
            source,
            event_rx,
            stop_rx,
            filter,
            debouncer,
            Arc::clone(&self.handler),
        ));

        self.task = Some(WatchTask {
            stop: stop_tx,
            handle,
        });
        tracing::info!(paths = ?self.paths, "Started watching file changes");
        Ok(())
    }

    /// Stop watching and wait for the background task to finish.
    ///
    /// After this returns, the handler is not invoked again and `startup`
    /// may be called anew.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotStarted`] if no watch task is running, or the
    /// error that ended the background task (e.g. a handler failure).
    pub async fn shutdown(&mut self) -> Result<(), WatchError> {
        let Some(task) = self.task.take() else {
            return Err(WatchError::NotStarted);
        };

        tracing::info!("Stopping file watching...");
        // Fails only if the task already exited; its result is still joined below
        let _ = task.stop.send(());

        match task.handle.await {
            Ok(result) => result,
            Err(e) => Err(WatchError::Panicked(e.to_string())),
        }
    }
}

/// Body of the watch task: race the watch loop against the stop signal.
async fn run<H: ChangeHandler>(
    source: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    stop: oneshot::Receiver<()>,
    filter: PathFilter,
    debouncer: EventDebouncer,
    handler: Arc<H>,
) -> Result<(), WatchError> {
    // Keep the event source alive for as long as the loop runs
    let _source = source;

    // A dropped sender also stops the loop
    let result = tokio::select! {
        biased;
        _ = stop => Ok(()),
        result = watch_loop(events, filter, debouncer, handler) => result,
    };

    if let Err(ref err) = result {
        tracing::error!(error = %err, "File watching stopped unexpectedly");
    }
    result
}

async fn watch_loop<H: ChangeHandler>(
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    filter: PathFilter,
    mut debouncer: EventDebouncer,
    handler: Arc<H>,
) -> Result<(), WatchError> {
    loop {
        let deadline = debouncer.next_deadline();

        tokio::select! {
            received = events.recv() => match received {
                Some(Ok(event)) => record_event(&event, &filter, &mut debouncer),
                Some(Err(err)) => tracing::warn!(error = %err, "File watcher error"),
                None => return Err(WatchError::SourceClosed),
            },
            () = sleep_until(deadline) => {
                let batch = debouncer.drain_settled();
                if batch.is_empty() {
                    continue;
                }

                let changes = ChangeSet::from_events(batch);
                tracing::debug!(count = changes.len(), "Dispatching file changes");
                handler
                    .on_change(changes)
                    .await
                    .map_err(WatchError::Handler)?;
            }
        }
    }
}

/// Record a raw notify event into the debouncer.
fn record_event(event: &Event, filter: &PathFilter, debouncer: &mut EventDebouncer) {
    for (kind, path) in ChangeKind::from_notify(event) {
        if !filter.allows(path) {
            continue;
        }
        tracing::debug!(path = %path.display(), %kind, "Recorded filesystem event");
        debouncer.record(path.to_path_buf(), kind);
    }
}

/// Sleep until `deadline`, or forever when there is nothing pending.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
