//! Stage-weighted progress reporting and cooperative cancellation.
//!
//! Every pipeline stage has a fixed relative weight. Overall progress is the
//! sum of the weights of completed stages plus the fraction of the running
//! stage. Subscribers receive [`ProgressEvent`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{Error, Result};

pub const STAGE_PARSE_PDF: &str = "Parse PDF and Create Intermediate Representation";
pub const STAGE_DETECT_SCANNED: &str = "DetectScannedFile";
pub const STAGE_LAYOUT: &str = "Parse Page Layout";
pub const STAGE_PARAGRAPHS: &str = "Parse Paragraphs";
pub const STAGE_FORMULAS: &str = "Parse Formulas and Styles";
pub const STAGE_REMOVE_DESCENT: &str = "Remove Char Descent";
pub const STAGE_TRANSLATE: &str = "Translate Paragraphs";
pub const STAGE_TYPESETTING: &str = "Typesetting";
pub const STAGE_ADD_FONTS: &str = "Add Fonts";
pub const STAGE_DRAWING: &str = "Generate drawing instructions";
pub const STAGE_SUBSET_FONT: &str = "Subset font";
pub const STAGE_SAVE_PDF: &str = "Save PDF";

/// Pipeline stages with their relative weights.
pub const TRANSLATE_STAGES: &[(&str, f32)] = &[
    (STAGE_PARSE_PDF, 5.35),
    (STAGE_DETECT_SCANNED, 0.5),
    (STAGE_LAYOUT, 6.42),
    (STAGE_PARAGRAPHS, 2.14),
    (STAGE_FORMULAS, 1.12),
    (STAGE_REMOVE_DESCENT, 0.15),
    (STAGE_TRANSLATE, 75.16),
    (STAGE_TYPESETTING, 3.84),
    (STAGE_ADD_FONTS, 0.65),
    (STAGE_DRAWING, 1.41),
    (STAGE_SUBSET_FONT, 1.29),
    (STAGE_SAVE_PDF, 2.45),
];

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Name and normalized weight (0..1) of a stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageWeight {
    pub name: String,
    pub percent: f32,
}

/// Snapshot of a running stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageStatus {
    pub stage: String,
    pub stage_progress: f32,
    pub stage_current: usize,
    pub stage_total: usize,
    pub overall_progress: f32,
}

/// Event delivered to progress subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageSummary { stages: Vec<StageWeight> },
    ProgressStart(StageStatus),
    ProgressUpdate(StageStatus),
    ProgressEnd(StageStatus),
    Finish { translate_result: String },
    Error { error: String },
}

pub type ProgressCallback = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct StageState {
    weight: f32,
    display_name: String,
    run_time: u32,
    current: usize,
    total: usize,
}

impl StageState {
    fn is_complete(&self) -> bool {
        self.run_time > 0 && self.current == self.total
    }

    fn status(&self, overall_progress: f32) -> StageStatus {
        StageStatus {
            stage: self.display_name.clone(),
            stage_progress: if self.total == 0 {
                100.0
            } else {
                self.current as f32 * 100.0 / self.total as f32
            },
            stage_current: self.current,
            stage_total: self.total,
            overall_progress,
        }
    }
}

#[derive(Default)]
struct MonitorState {
    order: Vec<String>,
    stages: HashMap<String, StageState>,
    last_report: Option<Instant>,
}

impl MonitorState {
    fn overall(&self, running: Option<&str>) -> f32 {
        if !self.stages.is_empty() && self.stages.values().all(StageState::is_complete) {
            return 100.0;
        }
        let mut progress: f32 = self
            .stages
            .values()
            .filter(|s| s.is_complete())
            .map(|s| s.weight * 100.0)
            .sum();
        if let Some(stage) = running.and_then(|name| self.stages.get(name)) {
            if stage.total > 0 && !stage.is_complete() {
                progress += stage.weight * stage.current as f32 * 100.0 / stage.total as f32;
            }
        }
        progress
    }
}

/// Tracks stage progress and owns the cancellation token of a run.
pub struct ProgressMonitor {
    state: Mutex<MonitorState>,
    callbacks: Mutex<Vec<ProgressCallback>>,
    report_interval: Duration,
    cancel: CancellationToken,
}

impl ProgressMonitor {
    /// Create a monitor for the given `(name, weight)` stages.
    pub fn new(stages: &[(&str, f32)]) -> Self {
        let total: f32 = stages.iter().map(|(_, w)| w).sum();
        let mut state = MonitorState::default();
        for (name, weight) in stages {
            state.order.push(name.to_string());
            state.stages.insert(
                name.to_string(),
                StageState {
                    weight: if total > 0.0 { weight / total } else { 0.0 },
                    display_name: name.to_string(),
                    ..Default::default()
                },
            );
        }
        Self {
            state: Mutex::new(state),
            callbacks: Mutex::new(Vec::new()),
            report_interval: Duration::from_millis(100),
            cancel: CancellationToken::new(),
        }
    }

    /// Monitor over [`TRANSLATE_STAGES`].
    pub fn for_translation() -> Self {
        Self::new(TRANSLATE_STAGES)
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Register a subscriber; it immediately receives the stage summary.
    pub fn subscribe(&self, callback: impl Fn(&ProgressEvent) + Send + Sync + 'static) {
        callback(&ProgressEvent::StageSummary {
            stages: self.stage_weights(),
        });
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.push(Box::new(callback));
        }
    }

    pub fn stage_weights(&self) -> Vec<StageWeight> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        state
            .order
            .iter()
            .filter_map(|name| {
                state.stages.get(name).map(|s| StageWeight {
                    name: name.clone(),
                    percent: s.weight,
                })
            })
            .collect()
    }

    fn emit(&self, event: ProgressEvent) {
        if let Ok(callbacks) = self.callbacks.lock() {
            for callback in callbacks.iter() {
                callback(&event);
            }
        }
    }

    /// Start (or restart) a stage with `total` work items.
    pub fn stage_start(&self, name: &str, total: usize) -> StageProgress<'_> {
        let event = {
            let Ok(mut state) = self.state.lock() else {
                return StageProgress {
                    monitor: self,
                    name: name.to_string(),
                };
            };
            if !state.stages.contains_key(name) {
                log::warn!("Unknown progress stage: {}", name);
                state.order.push(name.to_string());
            }
            let stage = state.stages.entry(name.to_string()).or_default();
            stage.run_time += 1;
            stage.display_name = if stage.run_time > 1 {
                format!("{} ({})", name, stage.run_time)
            } else {
                name.to_string()
            };
            stage.current = 0;
            stage.total = total;
            let mut status = stage.status(0.0);
            status.stage_progress = 0.0;
            state.last_report = None;
            status.overall_progress = state.overall(None);
            ProgressEvent::ProgressStart(status)
        };
        log::info!("{}", name);
        self.emit(event);
        StageProgress {
            monitor: self,
            name: name.to_string(),
        }
    }

    fn stage_update(&self, name: &str, n: usize) {
        let event = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            let Some(stage) = state.stages.get_mut(name) else {
                return;
            };
            stage.current += n;
            let total = stage.total;
            let throttled = state
                .last_report
                .is_some_and(|t| t.elapsed() < self.report_interval);
            if throttled && total > 3 {
                return;
            }
            state.last_report = Some(Instant::now());
            let overall = state.overall(Some(name));
            match state.stages.get(name) {
                Some(stage) => ProgressEvent::ProgressUpdate(stage.status(overall)),
                None => return,
            }
        };
        self.emit(event);
    }

    fn stage_done(&self, name: &str) {
        let event = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.last_report = None;
            let Some(stage) = state.stages.get(name) else {
                return;
            };
            if stage.current != stage.total && !self.cancel.is_cancelled() {
                log::warn!(
                    "Stage {} completed with {}/{} items",
                    name,
                    stage.current,
                    stage.total
                );
                return;
            }
            let mut status = stage.status(0.0);
            status.stage_progress = 100.0;
            status.overall_progress = state.overall(None);
            ProgressEvent::ProgressEnd(status)
        };
        self.emit(event);
    }

    /// Overall progress in percent.
    pub fn overall_progress(&self) -> f32 {
        self.state.lock().map(|s| s.overall(None)).unwrap_or(0.0)
    }

    pub fn translate_done(&self, summary: String) {
        self.emit(ProgressEvent::Finish {
            translate_result: summary,
        });
    }

    pub fn translate_error(&self, error: &Error) {
        self.emit(ProgressEvent::Error {
            error: error.to_string(),
        });
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        log::info!("Translation canceled");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `Err(Error::Cancelled)` once the run was cancelled.
    pub fn raise_if_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::for_translation()
    }
}

impl std::fmt::Debug for ProgressMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressMonitor")
            .field("report_interval", &self.report_interval)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Handle of a running stage; ends the stage when dropped.
pub struct StageProgress<'a> {
    monitor: &'a ProgressMonitor,
    name: String,
}

impl StageProgress<'_> {
    pub fn advance(&self, n: usize) {
        self.monitor.stage_update(&self.name, n);
    }
}

impl Drop for StageProgress<'_> {
    fn drop(&mut self) {
        self.monitor.stage_done(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(monitor: &ProgressMonitor) -> Arc<Mutex<Vec<ProgressEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        monitor.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        events
    }

    #[test]
    fn test_weights_normalized() {
        let monitor = ProgressMonitor::for_translation();
        let sum: f32 = monitor.stage_weights().iter().map(|s| s.percent).sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_overall_progress() {
        let monitor = ProgressMonitor::new(&[("a", 1.0), ("b", 3.0)]);
        {
            let stage = monitor.stage_start("a", 2);
            stage.advance(2);
        }
        assert!((monitor.overall_progress() - 25.0).abs() < 1e-3);
        {
            let stage = monitor.stage_start("b", 1);
            stage.advance(1);
        }
        assert_eq!(monitor.overall_progress(), 100.0);
    }

    #[test]
    fn test_repeated_stage_display_name() {
        let monitor = ProgressMonitor::new(&[("a", 1.0)]);
        let events = collect(&monitor);
        drop(monitor.stage_start("a", 0));
        drop(monitor.stage_start("a", 0));
        let events = events.lock().unwrap();
        let starts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::ProgressStart(s) => Some(s.stage.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec!["a".to_string(), "a (2)".to_string()]);
        assert!(matches!(events[0], ProgressEvent::StageSummary { .. }));
    }

    #[test]
    fn test_small_stages_not_throttled() {
        let monitor = ProgressMonitor::new(&[("a", 1.0)]).with_report_interval(Duration::from_secs(60));
        let events = collect(&monitor);
        {
            let stage = monitor.stage_start("a", 3);
            stage.advance(1);
            stage.advance(1);
            stage.advance(1);
        }
        let updates = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::ProgressUpdate(_)))
            .count();
        assert_eq!(updates, 3);
    }

    #[test]
    fn test_cancellation() {
        let monitor = ProgressMonitor::for_translation();
        assert!(monitor.raise_if_cancelled().is_ok());
        monitor.cancellation().clone().cancel();
        assert!(matches!(monitor.raise_if_cancelled(), Err(Error::Cancelled)));
    }
}
