use thiserror::Error;

pub type ChurnResult<T> = Result<T, ChurnError>;

/// churn 推理链路的所有错误。
///
/// 客户端输入问题 → 400，其余都算服务端问题 → 500（见 [`ChurnError::http_status`]）。
#[derive(Debug, Error)]
pub enum ChurnError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("{0}")]
    InvalidInput(String),

    #[error("schema mismatch: {0}")]
    Schema(String),

    #[error("failed to load model artifact: {0}")]
    Load(String),

    #[error("failed to save model artifact: {0}")]
    Save(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Model not loaded")]
    NotLoaded,

    #[error("training failed: {0}")]
    Training(String),
}

impl ChurnError {
    pub fn http_status(&self) -> u16 {
        match self {
            ChurnError::MissingFields(_) | ChurnError::InvalidInput(_) => 400,
            ChurnError::Schema(_)
            | ChurnError::Load(_)
            | ChurnError::Save(_)
            | ChurnError::Prediction(_)
            | ChurnError::NotLoaded
            | ChurnError::Training(_) => 500,
        }
    }

    /// 稳定的短标签，用于 metrics label 和日志
    pub fn kind(&self) -> &'static str {
        match self {
            ChurnError::MissingFields(_) => "missing_fields",
            ChurnError::InvalidInput(_) => "invalid_input",
            ChurnError::Schema(_) => "schema",
            ChurnError::Load(_) => "load",
            ChurnError::Save(_) => "save",
            ChurnError::Prediction(_) => "prediction",
            ChurnError::NotLoaded => "not_loaded",
            ChurnError::Training(_) => "training",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_lists_every_field() {
        let err = ChurnError::MissingFields(vec!["age".into(), "city".into()]);
        assert_eq!(err.to_string(), "Missing required fields: age, city");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn server_side_errors_are_500() {
        assert_eq!(ChurnError::NotLoaded.http_status(), 500);
        assert_eq!(ChurnError::Schema("x".into()).http_status(), 500);
        assert_eq!(ChurnError::Prediction("x".into()).http_status(), 500);
        assert_eq!(ChurnError::NotLoaded.to_string(), "Model not loaded");
    }
}
