//! Mapping of smoothed gaze positions onto the visible screen range.

use tracing::info;

use super::solver::AffineModel;

/// Heuristic transform used before any calibration has succeeded:
/// `screen = offset + gaze * gain` per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackMap {
    pub offset: f64,
    pub gain: f64,
}

impl Default for FallbackMap {
    fn default() -> Self {
        Self {
            offset: 0.5,
            gain: 0.4,
        }
    }
}

impl FallbackMap {
    fn apply(&self, nx: f64, ny: f64) -> (f64, f64) {
        (self.offset + nx * self.gain, self.offset + ny * self.gain)
    }
}

/// Maps smoothed gaze coordinates to clamped screen coordinates.
///
/// Uses the installed `AffineModel` exclusively once one exists; until
/// then, the explicit fallback transform.
#[derive(Debug, Clone, Default)]
pub struct GazeMapper {
    model: Option<AffineModel>,
    pub fallback: FallbackMap,
}

impl GazeMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly fitted model, replacing any previous one.
    pub fn install(&mut self, model: AffineModel) {
        info!(ax = ?model.ax, ay = ?model.ay, "affine model installed");
        self.model = Some(model);
    }

    pub fn model(&self) -> Option<&AffineModel> {
        self.model.as_ref()
    }

    pub fn is_calibrated(&self) -> bool {
        self.model.is_some()
    }

    /// Map one smoothed position. Both axes are clamped to [0, 1].
    pub fn map(&self, x: f64, y: f64) -> (f64, f64) {
        let (sx, sy) = match &self.model {
            Some(model) => model.apply(x, y),
            None => self.fallback.apply(x, y),
        };
        (sx.clamp(0.0, 1.0), sy.clamp(0.0, 1.0))
    }
}
