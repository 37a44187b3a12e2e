//! Face-distance UI adaptation.
//!
//! Reacts to the parallel face-distance stream with two independent
//! hysteresis latches over the same reading: content scaling when the
//! viewer sits too far away, and a face-lost alert when they leave the
//! tracking range entirely. Each latch fires once on entering its regime
//! and once on leaving it.

use tracing::debug;

/// Thresholds for the two latches, in centimeters.
#[derive(Debug, Clone, Copy)]
pub struct DistanceConfig {
    /// Above this distance, content is scaled up.
    pub scale_up_cm: f64,
    /// At or above this distance, the face-lost alert is raised.
    pub face_lost_cm: f64,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            scale_up_cm: 70.0,
            face_lost_cm: 100.0,
        }
    }
}

/// Signal emitted by a latch transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceSignal {
    /// Viewer moved beyond the scaling threshold: enlarge content.
    ScaleUp,
    /// Viewer came back: restore content size.
    ScaleReset,
    /// Viewer left tracking range: show the alert.
    FaceLost,
    /// Viewer returned to tracking range: clear the alert.
    FaceRecovered,
}

/// State machine over the distance-metric stream.
#[derive(Debug, Clone)]
pub struct DistanceAdapter {
    pub config: DistanceConfig,
    /// Most recent reading (cm).
    pub current_cm: f64,
    font_scaled: bool,
    alert_shown: bool,
}

impl DistanceAdapter {
    pub fn new(config: DistanceConfig) -> Self {
        Self {
            config,
            current_cm: 0.0,
            font_scaled: false,
            alert_shown: false,
        }
    }

    pub fn font_scaled(&self) -> bool {
        self.font_scaled
    }

    pub fn alert_shown(&self) -> bool {
        self.alert_shown
    }

    /// Feed one distance reading, returning any latch transitions.
    pub fn update(&mut self, cm: f64) -> Vec<DistanceSignal> {
        let mut signals = Vec::new();
        if !cm.is_finite() {
            return signals;
        }
        self.current_cm = cm;

        if cm > self.config.scale_up_cm && !self.font_scaled {
            self.font_scaled = true;
            debug!(cm, "distance: scale-up");
            signals.push(DistanceSignal::ScaleUp);
        } else if cm <= self.config.scale_up_cm && self.font_scaled {
            self.font_scaled = false;
            debug!(cm, "distance: scale-reset");
            signals.push(DistanceSignal::ScaleReset);
        }

        if cm >= self.config.face_lost_cm && !self.alert_shown {
            self.alert_shown = true;
            debug!(cm, "distance: face lost");
            signals.push(DistanceSignal::FaceLost);
        } else if cm < self.config.face_lost_cm && self.alert_shown {
            self.alert_shown = false;
            debug!(cm, "distance: face recovered");
            signals.push(DistanceSignal::FaceRecovered);
        }

        signals
    }

    /// Force both latches back to their idle state, emitting the reset
    /// signals for whichever adaptations were active. Used when tracking
    /// is disabled so the UI is left unmodified.
    pub fn reset(&mut self) -> Vec<DistanceSignal> {
        let mut signals = Vec::new();
        if self.font_scaled {
            self.font_scaled = false;
            signals.push(DistanceSignal::ScaleReset);
        }
        if self.alert_shown {
            self.alert_shown = false;
            signals.push(DistanceSignal::FaceRecovered);
        }
        signals
    }
}

impl Default for DistanceAdapter {
    fn default() -> Self {
        Self::new(DistanceConfig::default())
    }
}
