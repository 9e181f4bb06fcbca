use axum::Router;
use axum::routing::{get, post};
use crate::state::AppState;

pub mod classifier;
pub mod dto;
pub mod handler;
pub mod model;
pub mod resolver;
pub mod selector;
pub mod service;
pub mod stream_handler;
pub mod token;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(handler::health))
        .route("/convert", post(handler::convert))
        .route("/download", get(stream_handler::download))
}
