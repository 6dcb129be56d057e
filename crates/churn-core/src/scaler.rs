//! 逐特征标准化：`z = (x - mean) / scale`。

use serde::{Deserialize, Serialize};

use crate::error::{ChurnError, ChurnResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> ChurnResult<Self> {
        let s = Self { mean, scale };
        s.validate()?;
        Ok(s)
    }

    /// 在行优先的训练数据上拟合（总体标准差）。
    /// 常数列 scale 取 1：只中心化，不缩放。
    pub fn fit(rows: &[Vec<f64>]) -> ChurnResult<Self> {
        let first = rows
            .first()
            .ok_or_else(|| ChurnError::Training("cannot fit scaler on empty data".into()))?;
        let cols = first.len();
        let n = rows.len() as f64;

        let mut mean = vec![0.0; cols];
        for (r, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(ChurnError::Training(format!(
                    "row {r} has {} values, expected {cols}",
                    row.len()
                )));
            }
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; cols];
        for row in rows {
            for ((v, x), m) in var.iter_mut().zip(row).zip(&mean) {
                *v += (x - m).powi(2);
            }
        }
        let scale = var
            .into_iter()
            .map(|v| {
                let sd = (v / n).sqrt();
                if sd > f64::EPSILON { sd } else { 1.0 }
            })
            .collect();

        Self::new(mean, scale)
    }

    pub fn validate(&self) -> ChurnResult<()> {
        if self.mean.len() != self.scale.len() {
            return Err(ChurnError::Schema(format!(
                "scaler has {} means but {} scales",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if let Some(i) = self.mean.iter().position(|m| !m.is_finite()) {
            return Err(ChurnError::Schema(format!("scaler mean[{i}] is not finite")));
        }
        if let Some(i) = self
            .scale
            .iter()
            .position(|s| !s.is_finite() || *s == 0.0)
        {
            return Err(ChurnError::Schema(format!(
                "scaler scale[{i}] must be finite and non-zero"
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn transform_in_place(&self, row: &mut [f64]) -> ChurnResult<()> {
        if row.len() != self.len() {
            return Err(ChurnError::Schema(format!(
                "scaler expects {} features, got {}",
                self.len(),
                row.len()
            )));
        }
        for ((x, m), s) in row.iter_mut().zip(&self.mean).zip(&self.scale) {
            *x = (*x - m) / s;
        }
        Ok(())
    }

    pub fn transform_rows(&self, rows: &mut [Vec<f64>]) -> ChurnResult<()> {
        rows.iter_mut()
            .try_for_each(|row| self.transform_in_place(row))
    }
}
