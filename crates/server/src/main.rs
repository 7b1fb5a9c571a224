use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use server_api::{feature_catalogue, predict, submit_form, ApiContext, FormInputs, FormOutcome};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{FeatureDescriptor, PredictRequest, PredictResponse},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod page;

use app_state::AppState;
use config::{load_settings, Settings};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .init();

    let app = build_app(&settings)?;

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Loads the model artifact and wires the router. Fails before anything is
/// served when the artifact cannot be loaded.
fn build_app(settings: &Settings) -> anyhow::Result<Router> {
    let classifier = model::load_classifier(&settings.model_path)
        .map_err(|error| {
            error!(
                model_path = %settings.model_path.display(),
                %error,
                "failed to load model artifact; the form will not be served"
            );
            error
        })
        .context("startup aborted")?;

    let state = AppState::new(ApiContext::new(classifier));
    info!(
        model_type = %state.model.model_type,
        trees = ?state.model.tree_count,
        "model loaded successfully"
    );
    Ok(build_router(Arc::new(state)))
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .route("/api/predict", post(api_predict))
        .route("/api/features", get(api_features))
        .route("/healthz", get(healthz))
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(page::render(
        &FormInputs::blank(),
        &FormOutcome::Unsubmitted,
        &state.model,
    ))
}

async fn submit(
    State(state): State<Arc<AppState>>,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Response {
    let Form(fields) = match form {
        Ok(form) => form,
        Err(rejection) => {
            warn!(%rejection, "form body rejected");
            let outcome = FormOutcome::Rejected(rejection.body_text());
            let page = page::render(&FormInputs::blank(), &outcome, &state.model);
            return (rejection.status(), Html(page)).into_response();
        }
    };
    let inputs = FormInputs::from_fields(fields);
    let outcome = submit_form(&state.api, &inputs);
    let status = match outcome {
        FormOutcome::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };
    (status, Html(page::render(&inputs, &outcome, &state.model))).into_response()
}

async fn api_predict(
    State(state): State<Arc<AppState>>,
    req: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, (StatusCode, Json<ApiError>)> {
    let Json(req) = req.map_err(|rejection| {
        warn!(%rejection, "prediction body rejected");
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiError::new(ErrorCode::Validation, rejection.body_text())),
        )
    })?;
    predict(&state.api, &req).map(Json).map_err(|e| {
        let status = match e.code {
            ErrorCode::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(e))
    })
}

async fn api_features() -> Json<Vec<FeatureDescriptor>> {
    Json(feature_catalogue())
}

async fn not_found() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new(ErrorCode::NotFound, "route not found")),
    )
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
