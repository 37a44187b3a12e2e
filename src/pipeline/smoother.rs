//! Exponential moving-average smoothing for the cursor position.

/// EMA filter over consecutive accepted samples.
///
/// The first sample after construction or `reset` seeds the state verbatim;
/// later samples move the state by `alpha * (new - old)` per axis.
#[derive(Debug, Clone)]
pub struct Smoother {
    /// Alpha parameter: 1 = no smoothing, small values = heavy smoothing.
    pub alpha: f64,
    state: Option<(f64, f64)>,
}

/// Default smoothing coefficient.
pub const DEFAULT_ALPHA: f64 = 0.3;

impl Smoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            state: None,
        }
    }

    /// Feed one accepted sample, returning the smoothed position.
    pub fn update(&mut self, x: f64, y: f64) -> (f64, f64) {
        match self.state {
            Some((sx, sy)) => {
                let nx = sx + self.alpha * (x - sx);
                let ny = sy + self.alpha * (y - sy);
                self.state = Some((nx, ny));
                (nx, ny)
            }
            None => {
                self.state = Some((x, y));
                (x, y)
            }
        }
    }

    /// Drop the seeded state so the next sample starts fresh.
    ///
    /// Called on tracking re-enable to avoid carrying stale state across
    /// sessions.
    pub fn reset(&mut self) {
        self.state = None;
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}
