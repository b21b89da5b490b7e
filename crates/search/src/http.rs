//! JSON over HTTP for the read surface.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
	body::Bytes,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{ImageSearcher, SearchError};

#[derive(Deserialize)]
struct SearchRequest {
	#[serde(default)]
	search: String,
	#[serde(default)]
	page: u32,
	#[serde(default)]
	per_page: u32,
}

#[derive(Deserialize)]
struct DeleteRequest {
	#[serde(default)]
	file_id: String,
}

/// What a search hit looks like on the wire. Embeddings stay server-side.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageView {
	pub file_id: String,
	pub description: String,
	pub last_modified: DateTime<Utc>,
}

#[derive(Debug)]
enum HttpError {
	MalformedJson,
	Search(SearchError),
}

impl From<SearchError> for HttpError {
	fn from(e: SearchError) -> Self {
		HttpError::Search(e)
	}
}

impl IntoResponse for HttpError {
	fn into_response(self) -> Response {
		match self {
			HttpError::MalformedJson => (
				StatusCode::BAD_REQUEST,
				Json(json!({"error": "malformed json"})),
			),
			HttpError::Search(SearchError::Invalid(msg)) => (
				StatusCode::BAD_REQUEST,
				Json(json!({"error": msg})),
			),
			HttpError::Search(SearchError::Internal(e)) => {
				log::error!("request failed: {:#}", e);
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					Json(json!({"error": "Internal Server Error"})),
				)
			}
		}
		.into_response()
	}
}

// Decoded by hand so that every body error maps to the same 400.
fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, HttpError> {
	serde_json::from_slice(body).map_err(|e| {
		log::debug!("decoding request, {}", e);
		HttpError::MalformedJson
	})
}

/// Build the router: `/search`, `/delete`, `/healthcheck` and `/debug/vars`.
pub fn router(searcher: Arc<ImageSearcher>) -> Router {
	Router::new()
		.route("/search", post(search))
		.route("/delete", post(delete))
		.route("/healthcheck", get(healthcheck))
		.route("/debug/vars", get(debug_vars))
		.fallback(not_found)
		.with_state(searcher)
}

async fn search(State(searcher): State<Arc<ImageSearcher>>, body: Bytes) -> Result<Json<Vec<ImageView>>, HttpError> {
	let req: SearchRequest = parse_json(&body)?;
	let images = searcher.search(&req.search, req.page, req.per_page).await?;
	let views = images
		.into_iter()
		.map(|i| ImageView { file_id: i.file_id, description: i.description, last_modified: i.last_modified })
		.collect();
	Ok(Json(views))
}

async fn delete(State(searcher): State<Arc<ImageSearcher>>, body: Bytes) -> Result<StatusCode, HttpError> {
	let req: DeleteRequest = parse_json(&body)?;
	searcher.delete(&req.file_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn healthcheck() -> impl IntoResponse {
	Json(json!({"status": "available", "version": env!("CARGO_PKG_VERSION")}))
}

async fn debug_vars(State(searcher): State<Arc<ImageSearcher>>) -> impl IntoResponse {
	Json(searcher.tracker().snapshot())
}

async fn not_found() -> impl IntoResponse {
	(StatusCode::NOT_FOUND, Json(json!({"error": "404 Not Found"})))
}

/// Serve on `0.0.0.0:port` until `cancel` fires.
pub async fn serve(router: Router, port: u16, cancel: CancellationToken) -> Result<()> {
	let addr = SocketAddr::from(([0, 0, 0, 0], port));
	let listener = TcpListener::bind(addr).await
		.with_context(|| format!("binding {}", addr))?;
	serve_listener(listener, router, cancel).await
}

/// Serve on an already bound listener until `cancel` fires.
pub async fn serve_listener(listener: TcpListener, router: Router, cancel: CancellationToken) -> Result<()> {
	log::info!("starting server on {}", listener.local_addr()?);
	axum::serve(listener, router)
		.with_graceful_shutdown(async move { cancel.cancelled().await })
		.await
		.context("server listen&serve")?;
	log::info!("server stopped");
	Ok(())
}
