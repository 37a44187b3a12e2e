//! Timed calibration sequence over a fixed target grid.
//!
//! The session walks `grid * grid` fixation targets. For each target it
//! collects filter-accepted raw samples for one dwell window, then averages
//! them into a single regression row. Dwell deadlines are expressed in
//! clock milliseconds supplied by the caller, so the sequence is testable
//! without real waits; the event loop arms one timer per dwell and tags it
//! with the session generation, which doubles as the cancel token.

use tracing::{info, warn};

use super::solver::{self, AffineModel, CalibrationError, CalibrationSample};

/// Tunables for one calibration run.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationConfig {
    /// Targets per grid axis.
    pub grid: usize,
    /// Fixation time per target, milliseconds.
    pub dwell_ms: i64,
    /// A dwell window must collect strictly more than this many samples
    /// to produce a regression row.
    pub min_window_samples: usize,
    /// Distance from the screen edge to the outermost targets, as a
    /// fraction of the axis. Targets span `margin ..= 1 - margin`.
    pub edge_margin: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            grid: 3,
            dwell_ms: 1500,
            min_window_samples: 10,
            edge_margin: 0.05,
        }
    }
}

impl CalibrationConfig {
    /// Total number of targets in the sequence.
    pub fn point_count(&self) -> usize {
        self.grid * self.grid
    }
}

/// One fixation target at a normalized screen position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationTarget {
    pub index: usize,
    pub x: f64,
    pub y: f64,
}

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    Idle,
    /// Collecting samples for the given target index.
    Running { point: usize },
    /// Fitting the model over the completed dataset.
    Finishing,
}

/// Outcome of a dwell deadline.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The sequence advanced; show the next target.
    NextTarget(CalibrationTarget),
    /// All targets done and the fit succeeded.
    Completed(AffineModel),
    /// All targets done but no model could be fitted.
    Failed(CalibrationError),
}

/// State machine for one calibration run.
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    pub config: CalibrationConfig,
    phase: CalibrationPhase,
    dataset: Vec<CalibrationSample>,
    /// Raw samples observed during the current dwell window.
    window: Vec<(f64, f64)>,
    deadline_ms: i64,
    generation: u64,
}

impl CalibrationSession {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            phase: CalibrationPhase::Idle,
            dataset: Vec::new(),
            window: Vec::new(),
            deadline_ms: 0,
            generation: 0,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, CalibrationPhase::Running { .. })
    }

    /// Current session generation. Dwell timers armed for an older
    /// generation must drop themselves instead of polling.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Rows collected so far.
    pub fn dataset_len(&self) -> usize {
        self.dataset.len()
    }

    /// Screen position of the target at `index`.
    ///
    /// Edge-inclusive layout: targets span `margin ..= 1 - margin` on both
    /// axes, so the outer ring sits near the screen edges.
    pub fn target(&self, index: usize) -> CalibrationTarget {
        let grid = self.config.grid;
        let margin = self.config.edge_margin;
        let row = index / grid;
        let col = index % grid;
        let span = 1.0 - 2.0 * margin;
        let place = |i: usize| {
            if grid == 1 {
                0.5
            } else {
                margin + (i as f64 / (grid - 1) as f64) * span
            }
        };
        CalibrationTarget {
            index,
            x: place(col),
            y: place(row),
        }
    }

    /// Begin a new run, discarding any prior dataset. A run already in
    /// progress is cancelled: the generation bump orphans its pending
    /// dwell timers. Returns the first target.
    pub fn start(&mut self, now_ms: i64) -> CalibrationTarget {
        if self.is_active() {
            info!("calibration restarted, cancelling active session");
        }
        self.generation += 1;
        self.dataset.clear();
        self.window.clear();
        self.phase = CalibrationPhase::Running { point: 0 };
        self.deadline_ms = now_ms + self.config.dwell_ms;
        info!(
            points = self.config.point_count(),
            dwell_ms = self.config.dwell_ms,
            "calibration started"
        );
        self.target(0)
    }

    /// Abort the run without fitting.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.phase = CalibrationPhase::Idle;
        self.dataset.clear();
        self.window.clear();
    }

    /// Record one filter-accepted raw sample into the current dwell
    /// window. No-op outside a running session.
    pub fn observe(&mut self, nx: f64, ny: f64) {
        if self.is_active() {
            self.window.push((nx, ny));
        }
    }

    /// Check the dwell deadline. Before the deadline (or when idle) this
    /// returns `None`; at the deadline it closes the current window,
    /// advances the sequence, and reports what happened.
    pub fn poll(&mut self, now_ms: i64) -> Option<SessionEvent> {
        let point = match self.phase {
            CalibrationPhase::Running { point } => point,
            _ => return None,
        };
        if now_ms < self.deadline_ms {
            return None;
        }

        self.close_window(point);

        let next = point + 1;
        if next < self.config.point_count() {
            self.phase = CalibrationPhase::Running { point: next };
            self.deadline_ms = now_ms + self.config.dwell_ms;
            return Some(SessionEvent::NextTarget(self.target(next)));
        }

        self.phase = CalibrationPhase::Finishing;
        let outcome = solver::solve(&self.dataset);
        self.phase = CalibrationPhase::Idle;
        match outcome {
            Ok(model) => {
                info!(points = self.dataset.len(), "calibration complete");
                Some(SessionEvent::Completed(model))
            }
            Err(err) => {
                warn!(points = self.dataset.len(), %err, "calibration failed");
                Some(SessionEvent::Failed(err))
            }
        }
    }

    /// Average the dwell window into one regression row, or skip the
    /// target when the window is too sparse.
    fn close_window(&mut self, point: usize) {
        let n = self.window.len();
        if n > self.config.min_window_samples {
            let (sum_x, sum_y) = self
                .window
                .iter()
                .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            let target = self.target(point);
            self.dataset.push(CalibrationSample {
                nx: sum_x / n as f64,
                ny: sum_y / n as f64,
                screen_x: target.x,
                screen_y: target.y,
            });
        } else {
            warn!(point, samples = n, "dwell window too sparse, skipping target");
        }
        self.window.clear();
    }
}
