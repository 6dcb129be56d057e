use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use churn_core::{
    config::ServeConfig,
    schema::{
        ErrorBody, HealthResponse, ModelInfo, PredictResponse, ResponseStatus,
        SampleInputResponse,
    },
    util::now_iso,
    ChurnError, InferenceService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<InferenceService>,
    pub prom: PrometheusHandle,
}

/// handler 返回的错误：状态码 + 客户端看到的 JSON body
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody::new("Endpoint not found"),
        }
    }

    fn method_not_allowed() -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            body: ErrorBody::new("Method not allowed"),
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rej: BytesRejection) -> Self {
        // 超过 body 上限时为 413，其余读 body 失败按 axum 给的状态码
        Self {
            status: rej.status(),
            body: ErrorBody::new(rej.body_text()),
        }
    }
}

impl From<ChurnError> for ApiError {
    fn from(err: ChurnError) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            body: ErrorBody::from(&err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn router(state: AppState, cfg: &ServeConfig) -> Router {
    let api = Router::new()
        .route("/", get(welcome).fallback(method_not_allowed))
        .route("/health", get(health).fallback(method_not_allowed))
        .route("/api/predict", post(predict).fallback(method_not_allowed))
        .route("/api/model_info", get(model_info).fallback(method_not_allowed))
        .route("/api/sample_input", get(sample_input).fallback(method_not_allowed))
        .route("/metrics", get(metrics).fallback(method_not_allowed));

    let api = match &cfg.static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api.fallback(not_found),
    };

    api.layer(DefaultBodyLimit::max(cfg.max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct Welcome {
    message: &'static str,
    status: ResponseStatus,
}

async fn welcome() -> Json<impl Serialize> {
    Json(Welcome {
        message: "Welcome to the Telecom Churn Prediction API",
        status: ResponseStatus::Success,
    })
}

async fn health(State(st): State<AppState>) -> Json<HealthResponse> {
    Json(health_impl(&st))
}

pub fn health_impl(st: &AppState) -> HealthResponse {
    HealthResponse {
        status: "healthy".into(),
        timestamp: now_iso(),
        model_loaded: st.core.is_loaded(),
    }
}

/// body 按原始字节读取：非法 JSON 也能返回结构化错误
async fn predict(
    State(st): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(b) => b,
        Err(rej) => {
            tracing::warn!(
                status = %rej.status(),
                err = %rej.body_text(),
                "request body rejected"
            );
            return ApiError::from(rej).into_response();
        }
    };
    match predict_impl(&st, &body) {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn predict_impl(st: &AppState, body: &[u8]) -> Result<PredictResponse, ApiError> {
    // 先看模型状态：Unloaded 一律 500
    if !st.core.is_loaded() {
        tracing::warn!("prediction rejected: model not loaded");
        return Err(ChurnError::NotLoaded.into());
    }

    let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(body).map_err(|e| {
            ApiError::from(ChurnError::InvalidInput(format!("Invalid JSON body: {e}")))
        })?
    };

    match st.core.predict(&value) {
        Ok(result) => {
            let resp = PredictResponse::new(result, now_iso());
            tracing::info!(
                prediction = resp.result.prediction,
                confidence = resp.result.confidence,
                "Prediction made: {}",
                resp.prediction_text
            );
            Ok(resp)
        }
        Err(e) => {
            if e.http_status() >= 500 {
                tracing::error!(kind = e.kind(), err = %e, "prediction failed");
            } else {
                tracing::warn!(kind = e.kind(), err = %e, "prediction request rejected");
            }
            Err(e.into())
        }
    }
}

async fn model_info(State(st): State<AppState>) -> Result<Json<ModelInfo>, ApiError> {
    Ok(Json(st.core.model_info()?))
}

async fn sample_input() -> Json<SampleInputResponse> {
    Json(SampleInputResponse::default())
}

async fn metrics(State(st): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, st.prom.render())
}

async fn not_found() -> ApiError {
    ApiError::not_found()
}

async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}
