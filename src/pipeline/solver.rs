//! Least-squares fit of the gaze-to-screen affine mapping.
//!
//! The regression has exactly three parameters per screen axis, so the
//! normal matrix is 3×3 and a direct Gaussian-elimination solve is enough.
//! No general-purpose matrix library is pulled in.

use serde::Serialize;
use thiserror::Error;

/// Minimum usable calibration points for a determined fit.
pub const MIN_POINTS: usize = 3;

/// Pivot magnitude below which the normal matrix is treated as singular.
const SINGULAR_EPS: f64 = 1e-12;

/// One row of the regression training set: averaged gaze for one target,
/// paired with that target's screen position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    pub nx: f64,
    pub ny: f64,
    pub screen_x: f64,
    pub screen_y: f64,
}

/// Fitted affine mapping from gaze space to screen space:
/// `screen_x = ax[0]*nx + ax[1]*ny + ax[2]`, likewise for `ay`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffineModel {
    pub ax: [f64; 3],
    pub ay: [f64; 3],
}

impl AffineModel {
    /// Apply the mapping to a gaze position. Unclamped.
    pub fn apply(&self, nx: f64, ny: f64) -> (f64, f64) {
        (
            self.ax[0] * nx + self.ax[1] * ny + self.ax[2],
            self.ay[0] * nx + self.ay[1] * ny + self.ay[2],
        )
    }
}

/// Why a calibration run produced no model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalibrationError {
    /// Too few dwell windows yielded enough samples to form a row.
    #[error("only {0} usable calibration points, need at least {MIN_POINTS}")]
    TooFewPoints(usize),
    /// Calibration geometry is degenerate (e.g. all gaze readings share
    /// one coordinate), so the normal matrix cannot be inverted.
    #[error("calibration points are degenerate, normal matrix is singular")]
    SingularMatrix,
}

/// Fit the affine model over the collected dataset.
pub fn solve(samples: &[CalibrationSample]) -> Result<AffineModel, CalibrationError> {
    if samples.len() < MIN_POINTS {
        return Err(CalibrationError::TooFewPoints(samples.len()));
    }

    // Accumulate XᵀX and the two right-hand sides in one pass over rows
    // [nx, ny, 1].
    let mut xtx = [[0.0f64; 3]; 3];
    let mut xty_x = [0.0f64; 3];
    let mut xty_y = [0.0f64; 3];

    for s in samples {
        let row = [s.nx, s.ny, 1.0];
        for j in 0..3 {
            for k in 0..3 {
                xtx[j][k] += row[j] * row[k];
            }
            xty_x[j] += row[j] * s.screen_x;
            xty_y[j] += row[j] * s.screen_y;
        }
    }

    let ax = solve_3x3(&xtx, &xty_x).ok_or(CalibrationError::SingularMatrix)?;
    let ay = solve_3x3(&xtx, &xty_y).ok_or(CalibrationError::SingularMatrix)?;

    Ok(AffineModel { ax, ay })
}

/// Solve the 3×3 system `A x = b` by Gaussian elimination with partial
/// pivoting. Returns `None` when a pivot falls below `SINGULAR_EPS`.
fn solve_3x3(a: &[[f64; 3]; 3], b: &[f64; 3]) -> Option<[f64; 3]> {
    let mut aug = [[0.0f64; 4]; 3];
    for i in 0..3 {
        aug[i][..3].copy_from_slice(&a[i]);
        aug[i][3] = b[i];
    }

    for col in 0..3 {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in col + 1..3 {
            if aug[row][col].abs() > max_val {
                max_val = aug[row][col].abs();
                max_row = row;
            }
        }
        if max_val < SINGULAR_EPS {
            return None;
        }
        aug.swap(col, max_row);

        let pivot = aug[col][col];
        for row in col + 1..3 {
            let factor = aug[row][col] / pivot;
            for k in col..4 {
                let v = aug[col][k];
                aug[row][k] -= factor * v;
            }
        }
    }

    let mut x = [0.0f64; 3];
    for i in (0..3).rev() {
        x[i] = aug[i][3];
        for j in i + 1..3 {
            let v = aug[i][j];
            x[i] -= v * x[j];
        }
        x[i] /= aug[i][i];
    }
    Some(x)
}
