//! HTTP API.
//!
//! Every JSON response is an envelope: `{"data": ...}` on success,
//! `{"error": {"kind": ..., "message": ...}}` otherwise.

use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use music_index::{IndexError, Library, ART_DIR, MAX_SEARCH_RESULTS};
use serde::{Deserialize, Serialize};
use subscriptions::{Registry, SubscriptionError};
use thiserror::Error;
use tracing::{debug, warn};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::events::{event_name, room_events};
use crate::zones::Zones;

/// Everything the handlers read.
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<Library>,
    pub registry: Arc<Registry>,
    pub zones: Arc<Zones>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("room not found: {0}")]
    UnknownRoom(String),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Index(IndexError::NotFound { .. }) | ApiError::UnknownRoom(_) => StatusCode::NOT_FOUND,
            ApiError::Index(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Subscription(SubscriptionError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Subscription(_) => StatusCode::BAD_GATEWAY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Index(e) => e.kind(),
            ApiError::UnknownRoom(_) => "not_found",
            ApiError::Subscription(_) => "subscription",
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

#[derive(Serialize)]
struct DataEnvelope<'a, T> {
    data: &'a T,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: &'a str,
    message: String,
}

fn data_reply<T: Serialize>(data: &T) -> Response {
    warp::reply::json(&DataEnvelope { data }).into_response()
}

fn error_reply(status: StatusCode, kind: &str, message: String) -> Response {
    let body = ErrorEnvelope {
        error: ErrorBody { kind, message },
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

impl Reply for ApiError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            warn!(error = %self, "request failed");
        }
        error_reply(self.status(), self.kind(), self.to_string())
    }
}

fn respond<T: Serialize>(result: Result<T, ApiError>) -> Response {
    match result {
        Ok(data) => data_reply(&data),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct MusicQuery {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

/// All routes, with rejections turned into error envelopes.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let root = state.library.root().to_path_buf();

    music(state.clone())
        .or(search(state.clone()))
        .or(rooms(state.clone()))
        .or(room_event_stream(state))
        .or(files(&root))
        .recover(handle_rejection)
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// `GET /api/music?kind=<kind>&path=<path>`
fn music(state: AppState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "music")
        .and(warp::get())
        .and(warp::query::<MusicQuery>())
        .and(with_state(state))
        .map(|query: MusicQuery, state: AppState| {
            let index = state.library.snapshot();
            respond(index.query(&query.kind, &query.path).map_err(ApiError::from))
        })
}

/// `GET /api/search?q=<term>[&limit=<n>]`
fn search(state: AppState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "search")
        .and(warp::get())
        .and(warp::query::<SearchQuery>())
        .and(with_state(state))
        .map(|query: SearchQuery, state: AppState| {
            let limit = query.limit.unwrap_or(MAX_SEARCH_RESULTS).min(MAX_SEARCH_RESULTS);
            let index = state.library.snapshot();
            data_reply(&index.search(&query.q, limit))
        })
}

/// `GET /api/sonos`
fn rooms(state: AppState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "sonos")
        .and(warp::get())
        .and(with_state(state))
        .map(|state: AppState| data_reply(&state.zones.room_names()))
}

/// `GET /api/sonos/<room>/events`, a Server-Sent Events stream.
fn room_event_stream(state: AppState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "sonos" / String / "events")
        .and(warp::get())
        .and(with_state(state))
        .map(|room: String, state: AppState| match open_room_stream(&room, &state) {
            Ok(response) => response,
            Err(e) => e.into_response(),
        })
}

fn open_room_stream(room: &str, state: &AppState) -> Result<Response, ApiError> {
    let room = urlencoding::decode(room)
        .map_err(|_| ApiError::BadRequest(format!("room name is not UTF-8: {room}")))?;
    let player = state
        .zones
        .get(&room)
        .ok_or_else(|| ApiError::UnknownRoom(room.to_string()))?;

    let events = room_events(&state.registry, &player)?.map(|event| {
        warp::sse::Event::default()
            .event(event_name(&event))
            .json_data(&event)
    });
    debug!(room = %player.room_name, "client attached to room events");
    Ok(warp::sse::reply(warp::sse::keep_alive().stream(events)).into_response())
}

/// `GET /art/<file>` and `GET /content/<path>`.
fn files(root: &Path) -> impl Filter<Extract = (warp::fs::File,), Error = Rejection> + Clone {
    let art = warp::path("art").and(warp::fs::dir(root.join(ART_DIR)));
    let content = warp::path("content").and(warp::fs::dir(root.to_path_buf()));
    art.or(content).unify()
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let response = if rejection.is_not_found() {
        error_reply(StatusCode::NOT_FOUND, "not_found", "no such route".to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        error_reply(StatusCode::BAD_REQUEST, "bad_request", e.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_reply(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "method not allowed".to_string(),
        )
    } else {
        warn!(?rejection, "unhandled rejection");
        error_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal server error".to_string(),
        )
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        let missing = ApiError::from(IndexError::NotFound {
            what: "album",
            name: "Nope".into(),
        });
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.kind(), "not_found");

        let room = ApiError::UnknownRoom("Attic".into());
        assert_eq!(room.status(), StatusCode::NOT_FOUND);
        assert_eq!(room.to_string(), "room not found: Attic");

        let closing = ApiError::from(SubscriptionError::ShuttingDown);
        assert_eq!(closing.status(), StatusCode::SERVICE_UNAVAILABLE);

        let device = ApiError::from(SubscriptionError::Network("refused".into()));
        assert_eq!(device.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(device.kind(), "subscription");
    }
}
