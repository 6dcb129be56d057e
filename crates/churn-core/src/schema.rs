use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ChurnError, ChurnResult};

/// 请求里的原始客户记录；多余字段忽略。
pub type CustomerRecord = Map<String, Value>;

/// 预测请求必须携带的字段；缺失时按此顺序报告。
pub const REQUIRED_FIELDS: [&str; 12] = [
    "telecom_partner",
    "gender",
    "age",
    "state",
    "city",
    "pincode",
    "date_of_registration",
    "num_dependents",
    "estimated_salary",
    "calls_made",
    "sms_sent",
    "data_used",
];

pub const CHURN_TEXT: &str = "Customer will churn";
pub const RETAIN_TEXT: &str = "Customer will not churn";

/// 返回 `record` 中缺失的全部必填字段
pub fn missing_fields(record: &CustomerRecord) -> Vec<String> {
    REQUIRED_FIELDS
        .iter()
        .filter(|f| !record.contains_key(**f))
        .map(|f| f.to_string())
        .collect()
}

/// 校验未类型化的 JSON body：必须是非空对象，且必填字段齐全。
pub fn validate_record(body: &Value) -> ChurnResult<&CustomerRecord> {
    let record = match body {
        Value::Object(m) if !m.is_empty() => m,
        _ => return Err(ChurnError::InvalidInput("No input data provided".into())),
    };
    let missing = missing_fields(record);
    if !missing.is_empty() {
        return Err(ChurnError::MissingFields(missing));
    }
    Ok(record)
}

/// 示例请求（给客户端参考字段格式）
pub fn sample_input() -> Value {
    json!({
        "telecom_partner": "Reliance Jio",
        "gender": "F",
        "age": 35,
        "state": "Karnataka",
        "city": "Bangalore",
        "pincode": 560001,
        "date_of_registration": "1/1/2020",
        "num_dependents": 2,
        "estimated_salary": 75000,
        "calls_made": 50,
        "sms_sent": 30,
        "data_used": 5000
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// 一次分类器调用的结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// 1 = churn，0 = retain
    pub prediction: u8,
    pub churn_probability: f64,
    pub no_churn_probability: f64,
    pub confidence: f64,
}

impl PredictionResult {
    /// 由 churn 概率推出 label / 补概率 / confidence。
    /// 只有 churn 严格大于 retain 时 label 才为 1（0.5 判为不流失）。
    pub fn from_churn_probability(p: f64) -> Self {
        let churn = crate::util::clamp01(p);
        let retain = 1.0 - churn;
        Self {
            prediction: u8::from(churn > retain),
            churn_probability: churn,
            no_churn_probability: retain,
            confidence: churn.max(retain),
        }
    }

    pub fn will_churn(&self) -> bool {
        self.prediction == 1
    }

    pub fn prediction_text(&self) -> &'static str {
        if self.will_churn() {
            CHURN_TEXT
        } else {
            RETAIN_TEXT
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub result: PredictionResult,
    pub prediction_text: String,
    pub timestamp: String,
    pub status: ResponseStatus,
}

impl PredictResponse {
    pub fn new(result: PredictionResult, timestamp: String) -> Self {
        Self {
            prediction_text: result.prediction_text().to_string(),
            result,
            timestamp,
            status: ResponseStatus::Success,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_fields: Option<Vec<String>>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: ResponseStatus::Error,
            missing_fields: None,
        }
    }
}

impl From<&ChurnError> for ErrorBody {
    fn from(err: &ChurnError) -> Self {
        let mut body = ErrorBody::new(err.to_string());
        if let ChurnError::MissingFields(fields) = err {
            body.missing_fields = Some(fields.clone());
        }
        body
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub model_loaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub selected_features: Vec<String>,
    pub feature_count: usize,
    pub categorical_columns: Vec<String>,
    pub unseen_category_policy: String,
    pub status: ResponseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleInputResponse {
    pub sample_input: Value,
    pub description: String,
    pub status: ResponseStatus,
}

impl Default for SampleInputResponse {
    fn default() -> Self {
        Self {
            sample_input: sample_input(),
            description: "Use this format for POST requests to /api/predict".into(),
            status: ResponseStatus::Success,
        }
    }
}
