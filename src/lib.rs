pub mod api;
pub mod artifact_store;
pub mod captions;
pub mod config;
pub mod error;
pub mod job_store;
pub mod media;
pub mod models;
pub mod pipeline;
pub mod reaper;
pub mod render;
pub mod tts;

use axum::{
    routing::{get, post},
    Router,
};
use config::Config;
use pipeline::Pipeline;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: Pipeline,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(api::healthz))
        .route("/jobs", post(api::create_job))
        .route("/jobs/{job_id}", get(api::get_job))
        .route("/videos/{file_name}", get(api::download_video))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
