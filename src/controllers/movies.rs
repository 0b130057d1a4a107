use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{booking::FlowView, ApiError};
use crate::middleware::CurrentSession;
use crate::models::Movie;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movies", get(list_movies))
        .route("/movies/{movie_id}/booking", get(start_booking))
}

// GET /api/movies
async fn list_movies(State(state): State<Arc<AppState>>) -> Json<Vec<Movie>> {
    Json(state.catalog.current().movies_now_showing().into_iter().cloned().collect())
}

#[derive(Debug, Deserialize)]
struct StartQuery {
    theater: Option<String>,
}

// GET /api/movies/{movie_id}/booking?theater=tht_001
async fn start_booking(
    session: CurrentSession,
    Path(movie_id): Path<String>,
    Query(query): Query<StartQuery>,
) -> Result<Json<FlowView>, ApiError> {
    let theater = query.theater.as_deref().filter(|t| !t.is_empty());
    session.start_booking(&movie_id, theater).await?;
    FlowView::current(&session).await.map(Json)
}
