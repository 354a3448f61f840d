use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::{
    error::PipelineError,
    models::{AdImageForm, AdImageResponse, CampaignForm, CampaignRequest, CampaignResponse, CampaignResult, ErrorBody, RunStatus},
    pipeline::{Orchestrator, StageTimeline, TracingObserver},
    prompts::QuickStyle,
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Flips to `true` when the server starts shutting down.
    pub shutdown: watch::Receiver<bool>,
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/campaign", post(generate_campaign))
        .route("/api/ad-image", post(generate_ad_image))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// Resolves once shutdown has been signalled. Never resolves if the sender is gone without signalling.
pub async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn failure(error: PipelineError, run_id: Option<Uuid>) -> Response {
    let status = error.kind.status_code();
    (status, Json(ErrorBody { error: error.message, kind: error.kind, run_id })).into_response()
}

/// Malformed bodies are validation failures; oversized ones keep their 413.
fn rejected(rejection: JsonRejection, run_id: Option<Uuid>) -> Response {
    let status = match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    let error = PipelineError::validation(rejection.body_text());
    (status, Json(ErrorBody { error: error.message, kind: error.kind, run_id })).into_response()
}

fn shutting_down() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "Server is shutting down. Please retry." }))).into_response()
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn generate_campaign(
    State(state): State<AppState>,
    body: Result<Json<CampaignForm>, JsonRejection>,
) -> Response {
    let run_id = Uuid::new_v4();
    async move {
        let form = match body {
            Ok(Json(form)) => form,
            Err(rejection) => return rejected(rejection, Some(run_id)),
        };
        let request = match CampaignRequest::try_from(form) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting campaign form");
                return failure(e, Some(run_id));
            }
        };

        let observers = (TracingObserver, StageTimeline::default());
        let cancel = shutdown_signal(state.shutdown.clone());
        let Some(result) = state.orchestrator.run_until(&request, &observers, cancel).await else {
            return shutting_down();
        };
        let stages = observers.1.into_reports();
        if let Some(e) = result.error() {
            tracing::warn!(kind = ?e.kind, error = %e, "Campaign run failed");
        }

        match result {
            CampaignResult { status: RunStatus::Completed, image_url: Some(image_url), prompt: Some(prompt), caption } => {
                Json(CampaignResponse {
                    run_id,
                    image_url,
                    caption,
                    prompt,
                    status: "completed".into(),
                    generated_at: Utc::now(),
                    stages,
                })
                .into_response()
            }
            CampaignResult { status: RunStatus::Failed(e), .. } => failure(e, Some(run_id)),
            CampaignResult { .. } => failure(PipelineError::empty("No image was generated"), Some(run_id)),
        }
    }
    .instrument(info_span!("campaign", %run_id))
    .await
}

pub async fn generate_ad_image(
    State(state): State<AppState>,
    body: Result<Json<AdImageForm>, JsonRejection>,
) -> Response {
    let form = match body {
        Ok(Json(form)) => form,
        Err(rejection) => return rejected(rejection, None),
    };
    let style = QuickStyle::from_key(&form.style);
    let description = form.description.as_deref().unwrap_or_default();

    let generate = state.orchestrator.quick_image(style, &form.headline, &form.brand_name, description, &TracingObserver);
    tokio::select! {
        result = generate => match result {
            Ok(image_url) => Json(AdImageResponse { image_url }).into_response(),
            Err(e) => e.into_response(),
        },
        _ = shutdown_signal(state.shutdown.clone()) => shutting_down(),
    }
}
