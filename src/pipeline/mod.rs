//! Streaming gaze pipeline: filter → smooth → map, plus the calibration
//! and distance side channels.
//!
//! `GazePipeline` owns one instance of every stage and routes each
//! incoming sample to completion before the next is handled. It emits
//! `Event`s for the UI layer; transport is the IPC server's concern.

pub mod calibration;
pub mod distance;
pub mod filter;
pub mod mapper;
pub mod smoother;
pub mod solver;

use serde::Serialize;
use tracing::info;

use calibration::{CalibrationConfig, CalibrationSession, CalibrationTarget, SessionEvent};
use distance::{DistanceAdapter, DistanceConfig, DistanceSignal};
use filter::{GazeSample, SampleFilter};
use mapper::GazeMapper;
use smoother::Smoother;

/// Pipeline-wide tunables, assembled from per-stage configs.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub confidence_min: f64,
    pub smoothing_alpha: f64,
    pub calibration: CalibrationConfig,
    pub distance: DistanceConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_min: filter::DEFAULT_CONFIDENCE_MIN,
            smoothing_alpha: smoother::DEFAULT_ALPHA,
            calibration: CalibrationConfig::default(),
            distance: DistanceConfig::default(),
        }
    }
}

/// Event pushed to connected UI clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    /// Mapped cursor position, both axes in [0, 1].
    Cursor { x: f64, y: f64 },
    /// Show the calibration target at a normalized screen position.
    CalibrationTarget { index: usize, x: f64, y: f64 },
    /// Calibration finished; the fitted model is now live.
    CalibrationDone { ax: [f64; 3], ay: [f64; 3] },
    /// Calibration aborted; the mapper keeps its previous behavior.
    CalibrationFailed { reason: String },
    /// Enlarge or restore UI content.
    FontScale { enabled: bool },
    /// Show or clear the face-lost alert.
    FaceAlert { visible: bool },
}

/// Snapshot of pipeline state for the `status` query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineStatus {
    pub tracking: bool,
    pub calibrating: bool,
    /// Target index currently being collected, if calibrating.
    pub calibration_point: Option<usize>,
    pub calibrated: bool,
    pub distance_cm: f64,
    pub font_scaled: bool,
    pub alert_shown: bool,
}

/// The full per-cursor processing pipeline.
pub struct GazePipeline {
    pub filter: SampleFilter,
    pub smoother: Smoother,
    pub mapper: GazeMapper,
    pub session: CalibrationSession,
    pub distance: DistanceAdapter,
    tracking: bool,
}

impl GazePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            filter: SampleFilter::new(config.confidence_min),
            smoother: Smoother::new(config.smoothing_alpha),
            mapper: GazeMapper::new(),
            session: CalibrationSession::new(config.calibration),
            distance: DistanceAdapter::new(config.distance),
            tracking: true,
        }
    }

    pub fn tracking(&self) -> bool {
        self.tracking
    }

    /// Process one raw gaze sample to completion.
    ///
    /// During an active calibration session the accepted raw pair feeds
    /// the session's dwell window and no cursor is emitted; otherwise the
    /// sample flows filter → smoother → mapper.
    pub fn process_gaze(&mut self, sample: GazeSample) -> Option<Event> {
        let (nx, ny) = self.filter.accept(&sample)?;

        if self.session.is_active() {
            self.session.observe(nx, ny);
            return None;
        }
        if !self.tracking {
            return None;
        }

        let (sx, sy) = self.smoother.update(nx, ny);
        let (x, y) = self.mapper.map(sx, sy);
        Some(Event::Cursor { x, y })
    }

    /// Process one face-distance reading.
    pub fn process_distance(&mut self, cm: f64) -> Vec<Event> {
        self.distance
            .update(cm)
            .into_iter()
            .map(signal_event)
            .collect()
    }

    /// Start (or restart) a calibration run.
    pub fn start_calibration(&mut self, now_ms: i64) -> Event {
        let target = self.session.start(now_ms);
        target_event(target)
    }

    /// Advance the calibration sequence once its dwell deadline passes.
    /// Installs the fitted model on success.
    pub fn poll_calibration(&mut self, now_ms: i64) -> Option<Event> {
        match self.session.poll(now_ms)? {
            SessionEvent::NextTarget(target) => Some(target_event(target)),
            SessionEvent::Completed(model) => {
                let event = Event::CalibrationDone {
                    ax: model.ax,
                    ay: model.ay,
                };
                self.mapper.install(model);
                Some(event)
            }
            SessionEvent::Failed(err) => Some(Event::CalibrationFailed {
                reason: err.to_string(),
            }),
        }
    }

    /// Enable cursor output. Resets the smoother so no stale state leaks
    /// across sessions.
    pub fn enable_tracking(&mut self) {
        self.tracking = true;
        self.smoother.reset();
        info!("tracking enabled");
    }

    /// Disable cursor output and clear any active distance adaptation.
    /// Returns the UI reset events.
    pub fn disable_tracking(&mut self) -> Vec<Event> {
        self.tracking = false;
        info!("tracking disabled");
        self.distance
            .reset()
            .into_iter()
            .map(signal_event)
            .collect()
    }

    pub fn status(&self) -> PipelineStatus {
        let calibration_point = match self.session.phase() {
            calibration::CalibrationPhase::Running { point } => Some(point),
            _ => None,
        };
        PipelineStatus {
            tracking: self.tracking,
            calibrating: self.session.is_active(),
            calibration_point,
            calibrated: self.mapper.is_calibrated(),
            distance_cm: self.distance.current_cm,
            font_scaled: self.distance.font_scaled(),
            alert_shown: self.distance.alert_shown(),
        }
    }
}

fn target_event(target: CalibrationTarget) -> Event {
    Event::CalibrationTarget {
        index: target.index,
        x: target.x,
        y: target.y,
    }
}

fn signal_event(signal: DistanceSignal) -> Event {
    match signal {
        DistanceSignal::ScaleUp => Event::FontScale { enabled: true },
        DistanceSignal::ScaleReset => Event::FontScale { enabled: false },
        DistanceSignal::FaceLost => Event::FaceAlert { visible: true },
        DistanceSignal::FaceRecovered => Event::FaceAlert { visible: false },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> GazePipeline {
        GazePipeline::new(PipelineConfig::default())
    }

    fn gaze(nx: f64, ny: f64, confidence: f64) -> GazeSample {
        GazeSample { nx, ny, confidence }
    }

    #[test]
    fn test_low_confidence_never_reaches_smoother() {
        let mut p = pipeline();
        assert_eq!(p.process_gaze(gaze(0.9, 0.9, 0.2)), None);
        // The next accepted sample seeds the smoother fresh, so the output
        // reflects only that sample.
        let event = p.process_gaze(gaze(0.5, 0.5, 1.0)).unwrap();
        let expected = p.mapper.map(0.5, 0.5);
        assert_eq!(
            event,
            Event::Cursor {
                x: expected.0,
                y: expected.1
            }
        );
    }

    #[test]
    fn test_fallback_mapping_before_calibration() {
        let mut p = pipeline();
        let event = p.process_gaze(gaze(0.0, 1.0, 1.0)).unwrap();
        match event {
            Event::Cursor { x, y } => {
                assert!((x - 0.5).abs() < 1e-12);
                assert!((y - 0.9).abs() < 1e-12);
            }
            other => panic!("expected cursor, got {other:?}"),
        }
    }

    #[test]
    fn test_disabled_tracking_emits_nothing() {
        let mut p = pipeline();
        p.disable_tracking();
        assert_eq!(p.process_gaze(gaze(0.5, 0.5, 1.0)), None);
    }

    #[test]
    fn test_enable_resets_smoother() {
        let mut p = pipeline();
        p.process_gaze(gaze(0.1, 0.1, 1.0));
        p.disable_tracking();
        p.enable_tracking();
        // Seeded fresh: one sample at (0.8, 0.8) maps without blending
        // toward the pre-disable position.
        let event = p.process_gaze(gaze(0.8, 0.8, 1.0)).unwrap();
        let expected = p.mapper.map(0.8, 0.8);
        assert_eq!(
            event,
            Event::Cursor {
                x: expected.0,
                y: expected.1
            }
        );
    }

    #[test]
    fn test_calibration_swallows_cursor_output() {
        let mut p = pipeline();
        p.start_calibration(0);
        assert_eq!(p.process_gaze(gaze(0.5, 0.5, 1.0)), None);
    }

    #[test]
    fn test_disable_tracking_resets_distance_adaptation() {
        let mut p = pipeline();
        let events = p.process_distance(120.0);
        assert_eq!(
            events,
            vec![
                Event::FontScale { enabled: true },
                Event::FaceAlert { visible: true }
            ]
        );
        let resets = p.disable_tracking();
        assert_eq!(
            resets,
            vec![
                Event::FontScale { enabled: false },
                Event::FaceAlert { visible: false }
            ]
        );
    }

    #[test]
    fn test_status_snapshot() {
        let mut p = pipeline();
        let status = p.status();
        assert!(status.tracking);
        assert!(!status.calibrating);
        assert!(!status.calibrated);

        p.start_calibration(0);
        let status = p.status();
        assert!(status.calibrating);
        assert_eq!(status.calibration_point, Some(0));
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event::Cursor { x: 0.25, y: 0.75 };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"cursor","x":0.25,"y":0.75}"#
        );
        let event = Event::FontScale { enabled: true };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"font-scale","enabled":true}"#
        );
        let event = Event::CalibrationTarget {
            index: 0,
            x: 0.05,
            y: 0.05,
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"calibration-target","index":0,"x":0.05,"y":0.05}"#
        );
    }
}
