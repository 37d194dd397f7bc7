//! Thread-driven outbox poller.
//!
//! A `DirectoryPoller` watches one partnership outbox. Files are reported once
//! their size is unchanged across two consecutive scans, so a file still being
//! written is never handed off half-finished. Scans run every `interval`
//! seconds; filesystem notifications only pull the next scan forward.

use super::factory::{ModuleContext, OutboundFile, OutboundSender};
use crate::component::{Component, ComponentError, ProcessorModule};
use as2_core::ModuleSpec;
use as2_core::paths::{normalize, resolve_against};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Type name used in module specs
pub const MODULE_TYPE: &str = "directory_poller";
/// Required parameter: directory to watch
pub const PARAM_OUTBOX_DIRECTORY: &str = "outboxdir";
/// Optional parameter: seconds between scans
pub const PARAM_INTERVAL: &str = "interval";
/// Set by the factory from the module context
pub const PARAM_PARTNERSHIP: &str = "partnership";

pub const DEFAULT_INTERVAL_SECS: u64 = 5;

/// Minimum gap between a notification-triggered scan and the previous one
const MIN_RESCAN: Duration = Duration::from_millis(250);
/// How often the worker checks for cancellation
const TICK: Duration = Duration::from_millis(100);

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Watches one outbox directory for a single partnership
pub struct DirectoryPoller {
    name: String,
    partnership: String,
    outbox: PathBuf,
    interval: Duration,
    parameters: BTreeMap<String, String>,
    outbound: Option<OutboundSender>,
    worker: Mutex<Option<Worker>>,
}

impl DirectoryPoller {
    /// Build a poller from a module spec.
    ///
    /// `outboxdir` is resolved against the base directory and written back
    /// into the parameters in normalized absolute form.
    pub fn from_spec(spec: &ModuleSpec, ctx: &ModuleContext) -> Result<Self, ComponentError> {
        let mut parameters = spec.string_parameters();

        let raw_outbox = parameters
            .get(PARAM_OUTBOX_DIRECTORY)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ComponentError::MissingParameter(PARAM_OUTBOX_DIRECTORY.to_string()))?;
        let outbox = normalize(resolve_against(&ctx.base_dir, raw_outbox.trim()));

        let interval = match parameters.get(PARAM_INTERVAL) {
            None => Duration::from_secs(DEFAULT_INTERVAL_SECS),
            Some(raw) => parse_interval(raw)?,
        };

        parameters.insert(
            PARAM_OUTBOX_DIRECTORY.to_string(),
            outbox.display().to_string(),
        );
        parameters.insert(PARAM_PARTNERSHIP.to_string(), ctx.partnership.clone());

        Ok(Self {
            name: format!("{MODULE_TYPE}[{}]", ctx.partnership),
            partnership: ctx.partnership.clone(),
            outbox,
            interval,
            parameters,
            outbound: ctx.outbound.clone(),
            worker: Mutex::new(None),
        })
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the background thread is currently running
    pub fn is_running(&self) -> bool {
        self.lock_worker().is_some()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_interval(raw: &str) -> Result<Duration, ComponentError> {
    let invalid = |reason: &str| ComponentError::InvalidParameter {
        name: PARAM_INTERVAL.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid("expected a whole number of seconds"))?;
    if secs == 0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

impl Component for DirectoryPoller {
    fn name(&self) -> &str {
        &self.name
    }

    /// Cancels the worker and joins it. Idempotent; a poller that was never
    /// started has nothing to release.
    fn destroy(&self) -> Result<(), ComponentError> {
        let Some(worker) = self.lock_worker().take() else {
            debug!("Poller {} not running, nothing to stop", self.name);
            return Ok(());
        };

        worker.cancel.cancel();
        worker
            .handle
            .join()
            .map_err(|_| ComponentError::Panicked(format!("{} worker thread", self.name)))?;

        info!("Poller {} stopped", self.name);
        Ok(())
    }
}

impl ProcessorModule for DirectoryPoller {
    fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    fn is_active(&self) -> bool {
        true
    }

    fn start(&self) -> Result<(), ComponentError> {
        let mut slot = self.lock_worker();
        if slot.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.outbox).map_err(|source| ComponentError::Io {
            path: self.outbox.clone(),
            source,
        })?;

        let (tx, rx) = channel();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                // Receiver gone means the worker has exited
                let _ = tx.send(res);
            })
            .map_err(|e| start_error(&self.name, "failed to create watcher", e))?;
        watcher
            .watch(&self.outbox, RecursiveMode::NonRecursive)
            .map_err(|e| start_error(&self.name, "failed to watch outbox", e))?;

        let cancel = CancellationToken::new();
        let ctx = WorkerContext {
            name: self.name.clone(),
            partnership: self.partnership.clone(),
            outbox: self.outbox.clone(),
            interval: self.interval,
            outbound: self.outbound.clone(),
            cancel: cancel.clone(),
        };

        let handle = std::thread::Builder::new()
            .name(format!("poller-{}", self.partnership))
            .spawn(move || run_worker(ctx, watcher, rx))
            .map_err(|source| ComponentError::Io {
                path: self.outbox.clone(),
                source,
            })?;

        info!(
            "Poller {} watching {} every {:?}",
            self.name,
            self.outbox.display(),
            self.interval
        );
        *slot = Some(Worker { cancel, handle });
        Ok(())
    }
}

fn start_error(name: &str, message: &str, e: notify::Error) -> ComponentError {
    ComponentError::Start {
        component: name.to_string(),
        message: message.to_string(),
        source: Some(Box::new(e)),
    }
}

struct WorkerContext {
    name: String,
    partnership: String,
    outbox: PathBuf,
    interval: Duration,
    outbound: Option<OutboundSender>,
    cancel: CancellationToken,
}

fn run_worker(
    ctx: WorkerContext,
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
) {
    let mut tracker = StabilityTracker::default();
    let mut last_scan: Option<Instant> = None;
    let mut dirty = true;

    loop {
        if ctx.cancel.is_cancelled() {
            debug!("Poller {} cancelled", ctx.name);
            break;
        }

        match rx.recv_timeout(TICK) {
            Ok(Ok(event)) => {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    dirty = true;
                }
            }
            Ok(Err(e)) => warn!("Poller {} watcher error: {}", ctx.name, e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => std::thread::sleep(TICK),
        }

        let since = last_scan.map(|t| t.elapsed());
        let due = match since {
            None => true,
            Some(elapsed) => elapsed >= ctx.interval || (dirty && elapsed >= MIN_RESCAN),
        };
        if !due {
            continue;
        }
        last_scan = Some(Instant::now());
        dirty = false;

        let listing = match list_outbox(&ctx.outbox) {
            Ok(listing) => listing,
            Err(e) => {
                error!(
                    "Poller {} failed to scan {}: {}",
                    ctx.name,
                    ctx.outbox.display(),
                    e
                );
                continue;
            }
        };

        for (path, size) in tracker.poll(listing) {
            let file = OutboundFile {
                partnership: ctx.partnership.clone(),
                path,
                size,
                detected_at: chrono::Utc::now(),
            };
            dispatch(&ctx, file);
        }
    }
}

fn dispatch(ctx: &WorkerContext, file: OutboundFile) {
    match &ctx.outbound {
        Some(tx) => {
            debug!("Poller {} handing off {}", ctx.name, file.path.display());
            if let Err(e) = tx.send(file) {
                warn!(
                    "Poller {} has no outbound consumer, dropping {}",
                    ctx.name,
                    e.0.path.display()
                );
            }
        }
        None => info!(
            "Poller {} found outbound file {} ({} bytes)",
            ctx.name,
            file.path.display(),
            file.size
        ),
    }
}

/// Regular, non-hidden files directly inside `dir`
fn list_outbox(dir: &Path) -> std::io::Result<Vec<(PathBuf, u64)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            // Removed between read_dir and stat
            Err(_) => continue,
        };
        if metadata.is_file() {
            files.push((entry.path(), metadata.len()));
        }
    }
    Ok(files)
}

/// Decides when a file has stopped changing.
///
/// A file is ready the second time it is seen with the same size. Once
/// reported it is not reported again until it leaves the directory.
#[derive(Debug, Default)]
struct StabilityTracker {
    pending: HashMap<PathBuf, u64>,
    reported: HashSet<PathBuf>,
}

impl StabilityTracker {
    fn poll(&mut self, listing: Vec<(PathBuf, u64)>) -> Vec<(PathBuf, u64)> {
        let present: HashSet<&PathBuf> = listing.iter().map(|(p, _)| p).collect();
        self.pending.retain(|p, _| present.contains(p));
        self.reported.retain(|p| present.contains(p));

        let mut ready = Vec::new();
        for (path, size) in listing {
            if self.reported.contains(&path) {
                continue;
            }
            if self.pending.insert(path.clone(), size) == Some(size) {
                self.pending.remove(&path);
                self.reported.insert(path.clone());
                ready.push((path, size));
            }
        }
        ready.sort();
        ready
    }
}
