//! Kalman filter implementation for trajectory fitting
//!
//! Transition and measurement models change from surface to surface, so
//! they are supplied with each `predict`/`update` call.

use anyhow::Result;
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    pub dim_x: usize,
    pub x: DVector<f64>, // State vector
    pub p: DMatrix<f64>, // State covariance matrix
    pub y: DVector<f64>, // Residual of the last update
    pub s: DMatrix<f64>, // Innovation covariance of the last update
}

impl KalmanFilter {
    pub fn new(x: DVector<f64>, p: DMatrix<f64>) -> Self {
        let dim_x = x.len();
        Self {
            dim_x,
            x,
            p,
            y: DVector::zeros(0),
            s: DMatrix::zeros(0, 0),
        }
    }

    /// Predict the next state
    pub fn predict(&mut self, f: &DMatrix<f64>, q: &DMatrix<f64>) {
        // x = F * x
        self.x = f * &self.x;

        // P = F * P * F^T + Q
        self.p = f * &self.p * f.transpose() + q;
    }

    /// Update with observation, returning the predicted-residual chi-square
    pub fn update(&mut self, z: &DVector<f64>, h: &DMatrix<f64>, r: &DMatrix<f64>) -> Result<f64> {
        // Residual: y = z - H * x
        self.y = z - h * &self.x;

        // Innovation covariance: S = H * P * H^T + R
        self.s = h * &self.p * h.transpose() + r;

        // Kalman gain: K = P * H^T * S^-1
        let s_inv = self
            .s
            .clone()
            .try_inverse()
            .ok_or_else(|| anyhow::anyhow!("Failed to invert innovation covariance matrix"))?;
        let chi2 = (self.y.transpose() * &s_inv * &self.y)[(0, 0)];
        let k = &self.p * h.transpose() * s_inv;

        // Update state: x = x + K * y
        self.x = &self.x + &k * &self.y;

        // Joseph form keeps P symmetric positive semi-definite
        let i = DMatrix::identity(self.dim_x, self.dim_x);
        let i_kh = i - &k * h;
        self.p = &i_kh * &self.p * i_kh.transpose() + &k * r * k.transpose();

        if !chi2.is_finite() || self.x.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("Kalman update produced a non-finite state");
        }
        Ok(chi2)
    }

    /// Get current state
    pub fn get_state(&self) -> &DVector<f64> {
        &self.x
    }

    /// Get current covariance
    pub fn get_covariance(&self) -> &DMatrix<f64> {
        &self.p
    }
}
