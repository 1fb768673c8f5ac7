use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json,
};
use serde_json::json;
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing_subscriber::EnvFilter;

use paddy_stress::{
    config::ServiceConfig,
    model::ModelArtifacts,
    types::{BatchOut, HealthOut, ManualEntry, PredictionOut},
    FertilizerAdvisor, PipelineError, Predictor, StressClassifier,
};

// ---------- Server state ----------

#[derive(Clone)]
struct AppState {
    predictor: Arc<Predictor>,
    log_pred: bool,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(code: StatusCode, msg: impl ToString) -> ApiError {
    (code, Json(json!({ "error": msg.to_string() })))
}

fn pipeline_error(e: PipelineError) -> ApiError {
    match e {
        PipelineError::Csv(e) => api_error(StatusCode::BAD_REQUEST, e),
        PipelineError::ModelInput(e) => {
            tracing::error!("classification failed: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Run blocking pipeline work (model + advisory HTTP) off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?
        .map_err(pipeline_error)
}

// ---------- Handlers ----------

async fn predict(
    State(state): State<AppState>,
    Json(payload): Json<ManualEntry>,
) -> Result<Json<PredictionOut>, ApiError> {
    let row = payload
        .validate()
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    // LOG_PRED: dump the aligned vector; a form that aligns to all zeros shows up as nonzero=0
    if state.log_pred {
        let vec = state.predictor.classifier().aligner().align_features(&row);
        let nz = vec.iter().filter(|x| **x != 0.0).count();
        let mean = if vec.is_empty() { 0.0 } else { vec.iter().sum::<f64>() / (vec.len() as f64) };
        let sample: Vec<String> = state
            .predictor
            .classifier()
            .aligner()
            .feat_list()
            .iter()
            .zip(&vec)
            .map(|(name, v)| format!("{}={:.1}", name, v))
            .collect();
        tracing::info!(
            "recv in_dim={} nonzero={} mean={:.3} features=[{}]",
            vec.len(),
            nz,
            mean,
            sample.join(", ")
        );
    }

    let predictor = state.predictor.clone();
    let record = blocking(move || predictor.predict_one(row)).await?;
    let severity = record.stress.severity();
    Ok(Json(PredictionOut {
        t: now_ms(),
        record,
        severity,
    }))
}

async fn predict_batch(State(state): State<AppState>, body: Bytes) -> Result<Json<BatchOut>, ApiError> {
    let predictor = state.predictor.clone();
    let report = blocking(move || predictor.predict_csv(body.as_ref())).await?;
    Ok(Json(BatchOut {
        t: now_ms(),
        records: report.records,
        summary: report.summary,
    }))
}

async fn predict_batch_csv(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let predictor = state.predictor.clone();
    let csv = blocking(move || {
        let mut out = Vec::new();
        predictor.export_csv(body.as_ref(), &mut out)?;
        Ok(out)
    })
    .await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"predictions.csv\""),
        ],
        csv,
    )
        .into_response())
}

async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    Json(HealthOut {
        status: "ok",
        features: state.predictor.classifier().aligner().feat_list().to_vec(),
        advisory_configured: state.predictor.advisor().is_configured(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = ServiceConfig::from_env()?;

    let artifacts = ModelArtifacts::load(&cfg.model_path, &cfg.meta_path)?;
    tracing::info!(
        "loaded model; feat_list[{}]: {:?}; classes: {:?}",
        artifacts.feat_list.len(),
        &artifacts.feat_list,
        artifacts.decoder.classes()
    );
    let classifier = StressClassifier::from_artifacts(artifacts);

    // One all-zero row through the classifier before the listener opens
    let label = classifier.warmup()?;
    tracing::info!("warmup forward ok ({})", label);

    // blocking reqwest client must be built outside the async workers
    let (token, settings) = (cfg.hf_token.clone(), cfg.advisory.clone());
    let advisor = tokio::task::spawn_blocking(move || FertilizerAdvisor::from_token(token, settings)).await??;
    if !advisor.is_configured() {
        tracing::warn!("HF_TOKEN not set; generated advice disabled");
    }

    let state = AppState {
        predictor: Arc::new(Predictor::new(classifier, advisor)),
        log_pred: cfg.log_pred,
    };

    let app = axum::Router::new()
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/predict/batch.csv", post(predict_batch_csv))
        .route("/health", get(health))
        .with_state(state);

    let addr = format!("{}:{}", cfg.bind_addr, cfg.port);
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
