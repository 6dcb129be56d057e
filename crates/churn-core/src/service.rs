use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::artifact::ModelArtifactBundle;
use crate::error::{ChurnError, ChurnResult};
use crate::pipeline::preprocess;
use crate::schema::{validate_record, ModelInfo, PredictionResult, ResponseStatus};
use crate::util::now_us;

/// 进程是否有可用的 artifact。
///
/// 启动时确定一次；`Unloaded` 只能靠修好 artifact 后重启离开。
#[derive(Debug, Clone)]
pub enum ModelState {
    Unloaded { reason: String },
    Loaded(Arc<ModelArtifactBundle>),
}

/// 请求级推理：bundle 注入进来，之后只读。
#[derive(Debug, Clone)]
pub struct InferenceService {
    state: ModelState,
}

impl InferenceService {
    pub fn new(state: ModelState) -> Self {
        Self { state }
    }

    pub fn loaded(bundle: ModelArtifactBundle) -> Self {
        Self::new(ModelState::Loaded(Arc::new(bundle)))
    }

    pub fn unloaded(reason: impl Into<String>) -> Self {
        Self::new(ModelState::Unloaded {
            reason: reason.into(),
        })
    }

    /// 加载 `path` 处的 artifact。加载失败不致命：服务以 Unloaded 状态启动，
    /// /health 会如实报告。
    pub fn from_artifact(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match ModelArtifactBundle::load(path) {
            Ok(bundle) => Self::loaded(bundle),
            Err(e) => {
                tracing::error!(path = %path.display(), err = %e, "model artifact not loaded");
                Self::unloaded(e.to_string())
            }
        }
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ModelState::Loaded(_))
    }

    pub fn bundle(&self) -> ChurnResult<&ModelArtifactBundle> {
        match &self.state {
            ModelState::Loaded(b) => Ok(b),
            ModelState::Unloaded { .. } => Err(ChurnError::NotLoaded),
        }
    }

    /// 校验 → 预处理 → 打分（单个请求 body）
    pub fn predict(&self, body: &Value) -> ChurnResult<PredictionResult> {
        let t0 = Instant::now();
        let out = self.predict_inner(body);
        metrics::histogram!("e2e_us").record(now_us(t0) as f64);

        let outcome = match &out {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::counter!("predict_requests_total", "outcome" => outcome).increment(1);
        out
    }

    fn predict_inner(&self, body: &Value) -> ChurnResult<PredictionResult> {
        let bundle = self.bundle()?;

        let t_val = Instant::now();
        let record = validate_record(body)?;
        metrics::histogram!("stage_validate_us").record(now_us(t_val) as f64);

        let t_pre = Instant::now();
        let row = preprocess(record, bundle)?;
        metrics::histogram!("stage_preprocess_us").record(now_us(t_pre) as f64);

        let t_pred = Instant::now();
        let result = bundle.classifier().predict(&row)?;
        metrics::histogram!("stage_predict_us").record(now_us(t_pred) as f64);

        Ok(result)
    }

    pub fn model_info(&self) -> ChurnResult<ModelInfo> {
        let b = self.bundle()?;
        Ok(ModelInfo {
            model_type: b.classifier().model_type().to_string(),
            selected_features: b.feature_order().to_vec(),
            feature_count: b.n_features(),
            categorical_columns: b.encoding().columns().map(str::to_string).collect(),
            unseen_category_policy: b.encoding().unseen_policy().as_str().to_string(),
            status: ResponseStatus::Success,
        })
    }
}
