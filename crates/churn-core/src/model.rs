use serde::{Deserialize, Serialize};

use crate::error::{ChurnError, ChurnResult};
use crate::schema::PredictionResult;
use crate::util::{clamp01, sigmoid};

/// artifact 里携带的分类器。
///
/// 用 `kind` 打 tag：以后加别的模型族，旧 artifact 的解码方式不变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    LogisticRegression(LogisticModel),
}

impl Classifier {
    pub fn model_type(&self) -> &'static str {
        match self {
            Classifier::LogisticRegression(_) => "LogisticRegression",
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Classifier::LogisticRegression(m) => m.weights.len(),
        }
    }

    /// 单行（已缩放）属于正类（churn）的概率
    pub fn predict_proba(&self, row: &[f64]) -> ChurnResult<f64> {
        match self {
            Classifier::LogisticRegression(m) => m.predict_proba(row),
        }
    }

    pub fn predict(&self, row: &[f64]) -> ChurnResult<PredictionResult> {
        self.predict_proba(row)
            .map(PredictionResult::from_churn_probability)
    }
}

/// 二分类 LR：`p = sigmoid(bias + w·x)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub bias: f64,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientDescent {
    pub learning_rate: f64,
    pub epochs: usize,
    /// L2 正则（只作用于 weights，不含 bias）
    pub l2: f64,
}

impl Default for GradientDescent {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 1000,
            l2: 1e-4,
        }
    }
}

impl LogisticModel {
    pub fn decision_function(&self, row: &[f64]) -> ChurnResult<f64> {
        if row.len() != self.weights.len() {
            return Err(ChurnError::Prediction(format!(
                "model expects {} features, got {}",
                self.weights.len(),
                row.len()
            )));
        }
        let z = self.bias
            + self
                .weights
                .iter()
                .zip(row)
                .map(|(w, x)| w * x)
                .sum::<f64>();
        if !z.is_finite() {
            return Err(ChurnError::Prediction(format!(
                "non-finite decision value {z}"
            )));
        }
        Ok(z)
    }

    pub fn predict_proba(&self, row: &[f64]) -> ChurnResult<f64> {
        self.decision_function(row).map(|z| clamp01(sigmoid(z)))
    }

    /// 全量梯度下降，目标为平均 log-loss。
    pub fn fit(x: &[Vec<f64>], y: &[u8], gd: &GradientDescent) -> ChurnResult<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(ChurnError::Training(format!(
                "need matching non-empty x/y, got {} rows and {} labels",
                x.len(),
                y.len()
            )));
        }
        let cols = x[0].len();
        if let Some(r) = x.iter().position(|row| row.len() != cols) {
            return Err(ChurnError::Training(format!(
                "row {r} has {} values, expected {cols}",
                x[r].len()
            )));
        }

        let n = x.len() as f64;
        let mut model = LogisticModel {
            bias: 0.0,
            weights: vec![0.0; cols],
        };
        let mut grad_w = vec![0.0; cols];

        for epoch in 0..gd.epochs {
            grad_w.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_b = 0.0;

            for (row, &label) in x.iter().zip(y) {
                let err = model.predict_proba(row)? - f64::from(label);
                grad_b += err;
                for (g, xi) in grad_w.iter_mut().zip(row) {
                    *g += err * xi;
                }
            }

            model.bias -= gd.learning_rate * grad_b / n;
            for (w, g) in model.weights.iter_mut().zip(&grad_w) {
                *w -= gd.learning_rate * (g / n + gd.l2 * *w);
            }

            if epoch % 200 == 0 {
                tracing::debug!(epoch, bias = model.bias, "logistic regression step");
            }
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_model_is_even_odds() {
        let m = LogisticModel {
            bias: 0.0,
            weights: vec![0.0; 3],
        };
        assert_eq!(m.predict_proba(&[1.0, -2.0, 3.0]).unwrap(), 0.5);
    }

    #[test]
    fn classifier_prediction_matches_probability() {
        let c = Classifier::LogisticRegression(LogisticModel {
            bias: -1.0,
            weights: vec![2.0],
        });
        let high = c.predict(&[3.0]).unwrap();
        assert_eq!(high.prediction, 1);
        assert!(high.churn_probability > 0.9);

        let low = c.predict(&[-3.0]).unwrap();
        assert_eq!(low.prediction, 0);
        assert!((low.churn_probability + low.no_churn_probability - 1.0).abs() < 1e-6);
    }

    #[test]
    fn width_mismatch_is_a_prediction_error() {
        let c = Classifier::LogisticRegression(LogisticModel {
            bias: 0.0,
            weights: vec![1.0, 1.0],
        });
        assert!(matches!(c.predict(&[1.0]), Err(ChurnError::Prediction(_))));
    }

    #[test]
    fn nan_input_is_a_prediction_error() {
        let c = Classifier::LogisticRegression(LogisticModel {
            bias: 0.0,
            weights: vec![1.0],
        });
        assert!(c.predict(&[f64::NAN]).is_err());
    }

    #[test]
    fn fit_learns_separable_direction() {
        let x: Vec<Vec<f64>> = (-10..10).map(|i| vec![i as f64 / 5.0]).collect();
        let y: Vec<u8> = (-10..10).map(|i| u8::from(i >= 0)).collect();
        let m = LogisticModel::fit(&x, &y, &GradientDescent::default()).unwrap();
        assert!(m.weights[0] > 0.0);
        assert!(m.predict_proba(&[1.5]).unwrap() > 0.5);
        assert!(m.predict_proba(&[-1.5]).unwrap() < 0.5);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let c = Classifier::LogisticRegression(LogisticModel {
            bias: 0.5,
            weights: vec![1.0],
        });
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["kind"], "logistic_regression");
        assert_eq!(serde_json::from_value::<Classifier>(v).unwrap(), c);
    }
}
