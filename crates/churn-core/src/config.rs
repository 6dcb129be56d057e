use anyhow::Context;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::DEFAULT_ARTIFACT_FILE;
use crate::encoding::UnseenCategoryPolicy;
use crate::model::GradientDescent;

/// 服务端配置：每个字段都有默认值，JSON 文件可以只覆盖其中一部分。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub bind: String,
    pub model_path: PathBuf,
    /// 前端静态目录（可选）；未知路径交给它处理
    pub static_dir: Option<PathBuf>,
    pub max_body_bytes: usize,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".into(),
            model_path: PathBuf::from(DEFAULT_ARTIFACT_FILE),
            static_dir: None,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// 离线训练参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub target_column: String,
    /// 编码/选特征之前丢弃的列（如 customer_id）
    pub id_columns: Vec<String>,
    /// 清洗时这些列的负值截到 0
    pub non_negative_columns: Vec<String>,
    pub k_features: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub optimizer: GradientDescent,
    pub unseen_policy: UnseenCategoryPolicy,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            target_column: "churn".into(),
            id_columns: vec!["customer_id".into()],
            non_negative_columns: vec!["data_used".into(), "calls_made".into(), "sms_sent".into()],
            k_features: 10,
            test_fraction: 0.2,
            seed: 42,
            optimizer: GradientDescent::default(),
            unseen_policy: UnseenCategoryPolicy::default(),
        }
    }
}

/// 读 JSON 配置；没给路径就用默认值。
pub fn load_json_or_default<T>(path: Option<&Path>) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(p) = path else {
        return Ok(T::default());
    };
    let s = fs::read_to_string(p).with_context(|| format!("read config: {}", p.display()))?;
    let v: T = serde_json::from_str(&s).with_context(|| format!("parse config: {}", p.display()))?;
    Ok(v)
}
