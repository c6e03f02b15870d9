//! HTTP API поверх операторов преобразования
//!
//! Сервер не хранит состояние: каждая операция получает таблицу в теле запроса
//! и возвращает новую таблицу.

use std::collections::BTreeMap;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::error::{ErrorCategory, FeatureError};
use crate::features::{
    AggFunc, AggregationTransformer, BinningStrategy, BinningTransformer, PolynomialFeatures,
};
use crate::io;
use crate::models::{DecisionTreeClassifier, RandomForestClassifier};
use crate::preprocessing::{
    ColumnStrategyResolver, DateTimeExtractor, DateTimeField, Encoder, Encoding, ImputeStrategy,
    Imputer, Scaler,
};
use crate::selection::{FeatureSelector, ScoreFunction};
use crate::types::Table;

#[derive(Debug)]
pub enum ApiError {
    Feature(FeatureError),
    Internal(String),
}

impl From<FeatureError> for ApiError {
    fn from(err: FeatureError) -> Self {
        ApiError::Feature(err)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub category: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Feature(err) => {
                let status = match err.category() {
                    ErrorCategory::Config | ErrorCategory::Io => StatusCode::BAD_REQUEST,
                    ErrorCategory::Schema | ErrorCategory::Type | ErrorCategory::Degenerate => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                };
                (
                    status,
                    ErrorBody {
                        error: err.to_string(),
                        category: err.category().as_str().to_string(),
                    },
                )
            }
            ApiError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: message,
                        category: "internal".to_string(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct TableRequest {
    pub table: Table,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub table: Table,
    /// Стратегия по умолчанию для каждой колонки с пропусками
    pub suggested_imputation: BTreeMap<String, ImputeStrategy>,
}

#[derive(Debug, Deserialize)]
pub struct DropColumnsRequest {
    pub table: Table,
    pub columns: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImputeRequest {
    pub table: Table,
    pub strategies: BTreeMap<String, ImputeStrategy>,
}

#[derive(Debug, Deserialize)]
pub struct EncodeRequest {
    pub table: Table,
    pub encoding: Encoding,
    pub columns: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub table: Table,
    pub method: String,
    /// Без списка масштабируются все числовые колонки
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct DateTimeRequest {
    pub table: Table,
    pub column: String,
    #[serde(default)]
    pub fields: Option<Vec<DateTimeField>>,
}

fn default_degree() -> usize {
    2
}

#[derive(Debug, Deserialize)]
pub struct PolynomialRequest {
    pub table: Table,
    pub columns: Vec<String>,
    #[serde(default = "default_degree")]
    pub degree: usize,
}

fn default_bins() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct BinningRequest {
    pub table: Table,
    pub columns: Vec<String>,
    pub strategy: BinningStrategy,
    #[serde(default = "default_bins")]
    pub bins: usize,
    #[serde(default)]
    pub custom_bins: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct AggregationSpec {
    pub column: String,
    pub func: AggFunc,
}

#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    pub table: Table,
    pub group_by: Vec<String>,
    pub aggregations: Vec<AggregationSpec>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    KBest,
    Rfe,
    Importance,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    DecisionTree,
    #[default]
    RandomForest,
}

fn default_score_func() -> ScoreFunction {
    ScoreFunction::FClassif
}

fn default_k() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub table: Table,
    pub target: String,
    pub method: SelectionMethod,
    #[serde(default = "default_score_func")]
    pub score_func: ScoreFunction,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub estimator: EstimatorKind,
}

pub fn router(config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/scalers", get(scalers))
        .route("/api/upload", post(upload))
        .route("/api/export", post(export))
        .route("/api/drop-columns", post(drop_columns))
        .route("/api/impute", post(impute))
        .route("/api/encode", post(encode))
        .route("/api/scale", post(scale))
        .route("/api/datetime", post(datetime))
        .route("/api/polynomial", post(polynomial))
        .route("/api/binning", post(binning))
        .route("/api/aggregate", post(aggregate))
        .route("/api/select", post(select))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Featurewise API",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn scalers() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "methods": Scaler::new().methods() }))
}

async fn upload(body: String) -> ApiResult<Json<UploadResponse>> {
    let table = io::read_csv(body.as_bytes())?;
    tracing::info!(
        "Upload request: {} rows, {} columns",
        table.n_rows(),
        table.n_cols()
    );
    let suggested_imputation = ColumnStrategyResolver::new(&table).suggest_imputation();
    Ok(Json(UploadResponse {
        table,
        suggested_imputation,
    }))
}

async fn export(Json(req): Json<TableRequest>) -> ApiResult<Response> {
    let csv = io::to_csv_string(&req.table)?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response())
}

async fn drop_columns(Json(req): Json<DropColumnsRequest>) -> ApiResult<Json<Table>> {
    let mut table = req.table;
    table.drop_columns(&req.columns)?;
    tracing::info!("Dropped columns: {}", req.columns.join(", "));
    Ok(Json(table))
}

async fn impute(Json(req): Json<ImputeRequest>) -> ApiResult<Json<Table>> {
    let mut imputer = Imputer::new(req.strategies);
    Ok(Json(imputer.fit_transform(&req.table)?))
}

async fn encode(Json(req): Json<EncodeRequest>) -> ApiResult<Json<Table>> {
    let encoder = Encoder::new();
    Ok(Json(encoder.encode(&req.table, req.encoding, &req.columns)?))
}

async fn scale(Json(req): Json<ScaleRequest>) -> ApiResult<Json<Table>> {
    let scaler = Scaler::new();
    let method = scaler.method(&req.method)?;
    let table = match &req.columns {
        Some(columns) => scaler.scale_columns(&req.table, columns, method)?,
        None => scaler.scale(&req.table, method)?,
    };
    Ok(Json(table))
}

async fn datetime(Json(req): Json<DateTimeRequest>) -> ApiResult<Json<Table>> {
    let mut extractor = DateTimeExtractor::new(req.table, &req.column)?;
    match &req.fields {
        Some(fields) => extractor.extract_features(fields),
        None => extractor.extract_all(),
    };
    Ok(Json(extractor.into_table()))
}

async fn polynomial(Json(req): Json<PolynomialRequest>) -> ApiResult<Json<Table>> {
    let mut poly = PolynomialFeatures::new(req.degree)?;
    Ok(Json(poly.apply(&req.table, &req.columns)?))
}

async fn binning(Json(req): Json<BinningRequest>) -> ApiResult<Json<Table>> {
    let mut binner = BinningTransformer::new(req.columns, req.strategy, req.bins, req.custom_bins)?;
    let mut table = req.table;
    binner.fit_transform(&mut table)?;
    Ok(Json(table))
}

async fn aggregate(Json(req): Json<AggregateRequest>) -> ApiResult<Json<Table>> {
    let aggregations = req
        .aggregations
        .into_iter()
        .map(|spec| (spec.column, spec.func))
        .collect();
    let transformer = AggregationTransformer::new(req.group_by, aggregations)?;
    Ok(Json(transformer.fit_transform(&req.table)?))
}

fn run_selection(req: SelectRequest) -> Result<Table, FeatureError> {
    let selector = FeatureSelector::new(&req.table, &req.target)?;
    match (req.method, req.estimator) {
        (SelectionMethod::KBest, _) => selector.select_k_best(req.score_func, req.k),
        (SelectionMethod::Rfe, EstimatorKind::DecisionTree) => {
            selector.recursive_feature_elimination(DecisionTreeClassifier::new(), req.k)
        }
        (SelectionMethod::Rfe, EstimatorKind::RandomForest) => {
            selector.recursive_feature_elimination(RandomForestClassifier::default(), req.k)
        }
        (SelectionMethod::Importance, EstimatorKind::DecisionTree) => {
            selector.feature_importance(DecisionTreeClassifier::new())
        }
        (SelectionMethod::Importance, EstimatorKind::RandomForest) => {
            selector.feature_importance(RandomForestClassifier::default())
        }
    }
}

async fn select(Json(req): Json<SelectRequest>) -> ApiResult<Json<Table>> {
    // обучение моделей не должно занимать поток рантайма
    let table = tokio::task::spawn_blocking(move || run_selection(req))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(table))
}
