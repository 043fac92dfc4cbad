//! Final write of an output PDF.
//!
//! Object pruning and compression can take pathological time on some inputs,
//! so both run on a worker thread with a deadline. A step that fails or runs
//! out of time falls back to the cheaper path and the file is still written.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use lopdf::Document as LopdfDocument;

use crate::config::TranslationConfig;
use crate::error::{Error, Result};
use crate::progress::{ProgressMonitor, STAGE_SAVE_PDF, STAGE_SUBSET_FONT};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How a deadline-bound job ended.
#[derive(Debug)]
pub enum WorkerOutcome<T> {
    Finished(T),
    Failed(Error),
    TimedOut,
}

const RUNNING: u8 = 0;
const DONE: u8 = 1;
const ABANDONED: u8 = 2;

static DETACHED_WORKERS: AtomicUsize = AtomicUsize::new(0);

/// Workers that outlived their deadline and are still running.
pub fn detached_workers() -> usize {
    DETACHED_WORKERS.load(Ordering::SeqCst)
}

/// Run `job` on its own thread and wait at most `timeout` for it.
///
/// Cancellation is checked while waiting. A thread cannot be killed, so a
/// job that outlives its deadline (or a cancelled wait) keeps running
/// detached: it holds on to whatever it captured, typically a full document
/// copy, and burns CPU until it returns. Its result is then discarded.
/// [`detached_workers`] counts such jobs.
pub fn run_with_deadline<T, F>(
    name: &str,
    timeout: Duration,
    progress: &ProgressMonitor,
    job: F,
) -> Result<WorkerOutcome<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    let state = Arc::new(AtomicU8::new(RUNNING));
    let worker_state = Arc::clone(&state);
    let worker_name = name.to_string();
    let started = Instant::now();
    thread::Builder::new()
        .name(format!("pdftranslate-{}", name))
        .spawn(move || {
            let result = job();
            if worker_state
                .compare_exchange(RUNNING, DONE, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let _ = tx.send(result);
            } else {
                DETACHED_WORKERS.fetch_sub(1, Ordering::SeqCst);
                log::info!(
                    "detached {} worker finished after {:?}, result discarded",
                    worker_name,
                    started.elapsed()
                );
            }
        })?;

    let deadline = Instant::now() + timeout;
    loop {
        if progress.is_cancelled() {
            if abandon(&state) {
                log::info!("{} worker keeps running in the background after cancellation", name);
            }
            return Err(Error::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            if !abandon(&state) {
                // finished right at the deadline
                return Ok(receive(name, &rx));
            }
            log::warn!(
                "{} did not finish within {:?}; it keeps running in the background \
                 and holds its memory until it returns ({} detached)",
                name,
                timeout,
                detached_workers()
            );
            return Ok(WorkerOutcome::TimedOut);
        }
        match rx.recv_timeout(POLL_INTERVAL.min(deadline - now)) {
            Ok(Ok(value)) => return Ok(WorkerOutcome::Finished(value)),
            Ok(Err(e)) => return Ok(WorkerOutcome::Failed(e)),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(exited_without_result(name)),
        }
    }
}

/// Mark a running worker as detached; false if it already finished.
fn abandon(state: &AtomicU8) -> bool {
    DETACHED_WORKERS.fetch_add(1, Ordering::SeqCst);
    let abandoned = state
        .compare_exchange(RUNNING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok();
    if !abandoned {
        DETACHED_WORKERS.fetch_sub(1, Ordering::SeqCst);
    }
    abandoned
}

fn receive<T>(name: &str, rx: &Receiver<Result<T>>) -> WorkerOutcome<T> {
    match rx.recv() {
        Ok(Ok(value)) => WorkerOutcome::Finished(value),
        Ok(Err(e)) => WorkerOutcome::Failed(e),
        Err(_) => exited_without_result(name),
    }
}

fn exited_without_result<T>(name: &str) -> WorkerOutcome<T> {
    WorkerOutcome::Failed(Error::Render(format!("{} worker exited without a result", name)))
}

fn subset(mut doc: LopdfDocument) -> Result<LopdfDocument> {
    let removed = doc.prune_objects();
    doc.delete_zero_length_streams();
    doc.renumber_objects();
    log::debug!("pruned {} unreferenced objects", removed.len());
    Ok(doc)
}

fn serialize(mut doc: LopdfDocument, compress: bool) -> Result<Vec<u8>> {
    if compress {
        doc.compress();
    }
    let mut buf = Vec::new();
    doc.save_to(&mut buf)?;
    Ok(buf)
}

/// Prune, serialize and write `doc` to `path`.
pub fn save_pdf(doc: LopdfDocument, path: &Path, config: &TranslationConfig) -> Result<()> {
    let progress = config.progress.as_ref();

    let doc = {
        let _stage = progress.stage_start(STAGE_SUBSET_FONT, 1);
        let fallback = doc.clone();
        match run_with_deadline("subset", config.subset_timeout, progress, move || subset(doc))? {
            WorkerOutcome::Finished(pruned) => pruned,
            WorkerOutcome::Failed(e) => {
                log::warn!("pruning failed, keeping all objects: {}", e);
                fallback
            }
            WorkerOutcome::TimedOut => fallback,
        }
    };

    let bytes = {
        let _stage = progress.stage_start(STAGE_SAVE_PDF, 1);
        if config.skip_clean {
            serialize(doc, false)?
        } else {
            let fallback = doc.clone();
            match run_with_deadline("save", config.save_timeout, progress, move || serialize(doc, true))? {
                WorkerOutcome::Finished(bytes) => bytes,
                WorkerOutcome::Failed(e) => {
                    log::warn!("compressed save failed, writing uncompressed: {}", e);
                    serialize(fallback, false)?
                }
                WorkerOutcome::TimedOut => serialize(fallback, false)?,
            }
        }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    log::info!("wrote {}", path.display());
    Ok(())
}
