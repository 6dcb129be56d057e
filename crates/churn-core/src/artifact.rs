//! 模型 artifact：分类器、编码表、特征顺序、scaler 作为一个整体，
//! 存成单个 gzip 压缩的 JSON 文件。
//!
//! 落盘时外面包一层 envelope（format + version），不兼容的文件在加载时就失败，
//! 而不是等到第一次预测。

use anyhow::{anyhow, Context};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::encoding::EncodingTable;
use crate::error::{ChurnError, ChurnResult};
use crate::model::Classifier;
use crate::scaler::StandardScaler;

pub const ARTIFACT_FORMAT: &str = "churn-artifact";
pub const ARTIFACT_VERSION: u32 = 1;
pub const DEFAULT_ARTIFACT_FILE: &str = "churn_model.json.gz";

/// 分类器 + 训练时用到的全部预处理参数。
///
/// 只能通过 [`ModelArtifactBundle::new`] 构造，构造时校验四部分互相一致。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelArtifactBundle {
    classifier: Classifier,
    encoding: EncodingTable,
    feature_order: Vec<String>,
    scaler: StandardScaler,
}

#[derive(Deserialize)]
struct BundleParts {
    classifier: Classifier,
    encoding: EncodingTable,
    feature_order: Vec<String>,
    scaler: StandardScaler,
}

#[derive(Serialize, Deserialize)]
struct Envelope<B> {
    format: String,
    version: u32,
    bundle: B,
}

impl ModelArtifactBundle {
    pub fn new(
        classifier: Classifier,
        encoding: EncodingTable,
        feature_order: Vec<String>,
        scaler: StandardScaler,
    ) -> ChurnResult<Self> {
        if feature_order.is_empty() {
            return Err(ChurnError::Schema("feature order is empty".into()));
        }
        let mut seen = HashSet::with_capacity(feature_order.len());
        if let Some(dup) = feature_order.iter().find(|f| !seen.insert(f.as_str())) {
            return Err(ChurnError::Schema(format!(
                "feature '{dup}' appears twice in feature order"
            )));
        }
        scaler.validate()?;
        if scaler.len() != feature_order.len() {
            return Err(ChurnError::Schema(format!(
                "scaler covers {} features but feature order has {}",
                scaler.len(),
                feature_order.len()
            )));
        }
        if classifier.n_features() != feature_order.len() {
            return Err(ChurnError::Schema(format!(
                "classifier expects {} features but feature order has {}",
                classifier.n_features(),
                feature_order.len()
            )));
        }
        Ok(Self {
            classifier,
            encoding,
            feature_order,
            scaler,
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn encoding(&self) -> &EncodingTable {
        &self.encoding
    }

    pub fn feature_order(&self) -> &[String] {
        &self.feature_order
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn n_features(&self) -> usize {
        self.feature_order.len()
    }

    /// 序列化为落盘格式
    pub fn to_bytes(&self) -> ChurnResult<Vec<u8>> {
        encode(self).map_err(|e| ChurnError::Save(format!("{e:#}")))
    }

    /// 从落盘格式解码并校验
    pub fn from_bytes(bytes: &[u8]) -> ChurnResult<Self> {
        decode(bytes)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ChurnResult<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        fs::write(path, bytes)
            .with_context(|| format!("write artifact: {}", path.display()))
            .map_err(|e| ChurnError::Save(format!("{e:#}")))?;
        tracing::info!(
            path = %path.display(),
            features = self.n_features(),
            categorical = self.encoding.len(),
            "model artifact saved"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> ChurnResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("read artifact: {}", path.display()))
            .map_err(|e| ChurnError::Load(format!("{e:#}")))?;
        let bundle = decode(&bytes).map_err(|e| match e {
            ChurnError::Load(msg) => ChurnError::Load(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        tracing::info!(
            path = %path.display(),
            model_type = bundle.classifier.model_type(),
            features = bundle.n_features(),
            "model artifact loaded"
        );
        Ok(bundle)
    }
}

fn encode(bundle: &ModelArtifactBundle) -> anyhow::Result<Vec<u8>> {
    let envelope = Envelope {
        format: ARTIFACT_FORMAT.to_string(),
        version: ARTIFACT_VERSION,
        bundle,
    };
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    serde_json::to_writer(&mut gz, &envelope).context("serialize artifact")?;
    gz.flush().context("flush artifact")?;
    gz.finish().context("finish gzip stream")
}

fn decode(bytes: &[u8]) -> ChurnResult<ModelArtifactBundle> {
    read_envelope(bytes).map_err(|e| ChurnError::Load(format!("{e:#}")))
}

fn read_envelope(bytes: &[u8]) -> anyhow::Result<ModelArtifactBundle> {
    let mut json = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut json)
        .context("decompress artifact (expected gzip)")?;

    // 先校验 format/version，再解析 bundle 本体
    let envelope: Envelope<Value> =
        serde_json::from_slice(&json).context("parse artifact envelope")?;
    if envelope.format != ARTIFACT_FORMAT {
        return Err(anyhow!(
            "unexpected artifact format '{}', expected '{ARTIFACT_FORMAT}'",
            envelope.format
        ));
    }
    if envelope.version != ARTIFACT_VERSION {
        return Err(anyhow!(
            "unsupported artifact version {}, this build reads version {ARTIFACT_VERSION}",
            envelope.version
        ));
    }

    let parts: BundleParts =
        serde_json::from_value(envelope.bundle).context("parse artifact bundle")?;
    ModelArtifactBundle::new(
        parts.classifier,
        parts.encoding,
        parts.feature_order,
        parts.scaler,
    )
    .map_err(|e| anyhow!("inconsistent bundle: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::demo_bundle;
    use crate::model::LogisticModel;

    fn gz_json(v: &Value) -> Vec<u8> {
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        serde_json::to_writer(&mut gz, v).unwrap();
        gz.finish().unwrap()
    }

    #[test]
    fn survives_a_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_ARTIFACT_FILE);
        let bundle = demo_bundle();
        bundle.save(&path).unwrap();

        let loaded = ModelArtifactBundle::load(&path).unwrap();
        assert_eq!(loaded, bundle);
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelArtifactBundle::load(dir.path().join("nope.json.gz")).unwrap_err();
        assert!(matches!(err, ChurnError::Load(_)));
        assert!(err.to_string().contains("nope.json.gz"), "{err}");
    }

    #[test]
    fn corrupt_bytes_are_a_load_error() {
        let err = ModelArtifactBundle::from_bytes(b"definitely not gzip").unwrap_err();
        assert!(matches!(err, ChurnError::Load(_)));

        let err = ModelArtifactBundle::from_bytes(&gz_json(&serde_json::json!([1, 2, 3])))
            .unwrap_err();
        assert!(matches!(err, ChurnError::Load(_)));
    }

    #[test]
    fn rejects_other_versions() {
        let bytes = demo_bundle().to_bytes().unwrap();
        let mut json = Vec::new();
        GzDecoder::new(&bytes[..]).read_to_end(&mut json).unwrap();
        let mut v: Value = serde_json::from_slice(&json).unwrap();
        v["version"] = serde_json::json!(ARTIFACT_VERSION + 1);

        let err = ModelArtifactBundle::from_bytes(&gz_json(&v)).unwrap_err();
        assert!(err.to_string().contains("unsupported artifact version"), "{err}");
    }

    #[test]
    fn rejects_foreign_format_tag() {
        let v = serde_json::json!({ "format": "something-else", "version": 1, "bundle": {} });
        let err = ModelArtifactBundle::from_bytes(&gz_json(&v)).unwrap_err();
        assert!(err.to_string().contains("unexpected artifact format"), "{err}");
    }

    #[test]
    fn rejects_mismatched_parts_on_load() {
        let bytes = demo_bundle().to_bytes().unwrap();
        let mut json = Vec::new();
        GzDecoder::new(&bytes[..]).read_to_end(&mut json).unwrap();
        let mut v: Value = serde_json::from_slice(&json).unwrap();
        v["bundle"]["feature_order"]
            .as_array_mut()
            .unwrap()
            .pop();

        let err = ModelArtifactBundle::from_bytes(&gz_json(&v)).unwrap_err();
        assert!(matches!(err, ChurnError::Load(_)));
        assert!(err.to_string().contains("inconsistent bundle"), "{err}");
    }

    #[test]
    fn new_rejects_mismatched_parts() {
        let b = demo_bundle();
        let narrow = Classifier::LogisticRegression(LogisticModel {
            bias: 0.0,
            weights: vec![0.0; b.n_features() - 1],
        });
        let err = ModelArtifactBundle::new(
            narrow,
            b.encoding().clone(),
            b.feature_order().to_vec(),
            b.scaler().clone(),
        )
        .unwrap_err();
        assert!(matches!(err, ChurnError::Schema(_)));

        let mut dup = b.feature_order().to_vec();
        dup[1] = dup[0].clone();
        assert!(ModelArtifactBundle::new(
            b.classifier().clone(),
            b.encoding().clone(),
            dup,
            b.scaler().clone(),
        )
        .is_err());
    }
}
