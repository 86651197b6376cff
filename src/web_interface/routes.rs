use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, warn};
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::{Filter, Rejection, Reply};

use crate::catalog::types::SourceId;
use crate::catalog::Catalog;
use crate::error_handling::types::{CatalogError, RelayError};
use crate::relay_management::RelayManager;
use crate::web_interface::types::{ApiError, ChannelQuery};

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    reply::with_status(reply::json(&ApiError::new(message)), status).into_response()
}

/// HTTP status a relay failure is reported with.
pub fn relay_error_status(err: &RelayError) -> StatusCode {
    match err {
        RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        RelayError::NotFound(_) => StatusCode::NOT_FOUND,
        RelayError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        RelayError::Catalog(_)
        | RelayError::ProcessStartFailure(_)
        | RelayError::ProcessRuntimeError(_)
        | RelayError::ReadinessTimeout { .. }
        | RelayError::ManagerUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn catalog_error_response(err: CatalogError, what: &str) -> Response {
    match err {
        CatalogError::InvalidFilter(message) => json_error(StatusCode::BAD_REQUEST, message),
        other => {
            error!("Failed to load {}: {}", what, other);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to load {}", what),
            )
        }
    }
}

/// Resolves a playback request to a redirect.
pub async fn playlist_redirect(
    raw_id: String,
    relay: RelayManager,
) -> Result<Response, Infallible> {
    let outcome = match raw_id.parse::<SourceId>() {
        Ok(source_id) => relay.request_playback(source_id).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(outcome) => {
            debug!("Redirecting playlist request to {}", outcome.redirect_target());
            Ok(reply::with_header(
                reply::with_status(reply::reply(), StatusCode::FOUND),
                "location",
                outcome.redirect_target(),
            )
            .into_response())
        }
        Err(err) => {
            let status = relay_error_status(&err);
            if status.is_server_error() {
                warn!("Playlist request for '{}' failed: {}", raw_id, err);
            }
            Ok(json_error(status, err.to_string()))
        }
    }
}

pub async fn relay_status(relay: RelayManager) -> Result<Response, Infallible> {
    Ok(reply::json(&relay.status()).into_response())
}

pub async fn list_channels(
    query: ChannelQuery,
    catalog: Arc<dyn Catalog>,
) -> Result<Response, Infallible> {
    let filter = match query.into_filter() {
        Ok(filter) => filter,
        Err(err) => return Ok(catalog_error_response(err, "channels")),
    };
    match catalog.list_channels(&filter).await {
        Ok(page) => Ok(reply::json(&page).into_response()),
        Err(err) => Ok(catalog_error_response(err, "channels")),
    }
}

pub async fn list_groups(catalog: Arc<dyn Catalog>) -> Result<Response, Infallible> {
    match catalog.list_groups().await {
        Ok(groups) => Ok(reply::json(&groups).into_response()),
        Err(err) => Ok(catalog_error_response(err, "groups")),
    }
}

pub async fn get_channel(
    raw_id: String,
    catalog: Arc<dyn Catalog>,
) -> Result<Response, Infallible> {
    let Ok(id) = raw_id.parse::<SourceId>() else {
        return Ok(json_error(
            StatusCode::BAD_REQUEST,
            "Invalid Channel ID format.",
        ));
    };
    match catalog.get_channel(id).await {
        Ok(Some(channel)) => Ok(reply::json(&channel).into_response()),
        Ok(None) => Ok(json_error(StatusCode::NOT_FOUND, "Channel not found.")),
        Err(err) => Ok(catalog_error_response(err, "channel")),
    }
}

fn with_relay(
    relay: RelayManager,
) -> impl Filter<Extract = (RelayManager,), Error = Infallible> + Clone {
    warp::any().map(move || relay.clone())
}

fn with_catalog(
    catalog: Arc<dyn Catalog>,
) -> impl Filter<Extract = (Arc<dyn Catalog>,), Error = Infallible> + Clone {
    warp::any().map(move || catalog.clone())
}

/// GET /
pub fn liveness_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path::end()
        .and(warp::get())
        .map(|| "Restreaming Server is Running")
}

/// GET /stream/:id/playlist and GET /stream/:id/playlist.m3u8
pub fn playlist_route(
    relay: RelayManager,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let plain = warp::path!("stream" / String / "playlist");
    let with_extension = warp::path!("stream" / String / "playlist.m3u8");
    plain
        .or(with_extension)
        .unify()
        .and(warp::get())
        .and(with_relay(relay))
        .and_then(playlist_redirect)
}

/// GET /stream/status
pub fn status_route(
    relay: RelayManager,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("stream" / "status")
        .and(warp::get())
        .and(with_relay(relay))
        .and_then(relay_status)
}

/// GET /channels, GET /channels/groups and GET /channels/:id
pub fn channel_routes(
    catalog: Arc<dyn Catalog>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let list = warp::path!("channels")
        .and(warp::get())
        .and(warp::query::<ChannelQuery>())
        .and(with_catalog(catalog.clone()))
        .and_then(list_channels);

    // registered before the id route, which would capture "groups"
    let groups = warp::path!("channels" / "groups")
        .and(warp::get())
        .and(with_catalog(catalog.clone()))
        .and_then(list_groups);

    let single = warp::path!("channels" / String)
        .and(warp::get())
        .and(with_catalog(catalog))
        .and_then(get_channel);

    list.or(groups).or(single)
}

/// GET /<hls_route>/... served from the output root, never cached.
pub fn hls_route(
    route: String,
    output_root: PathBuf,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path(route)
        .and(warp::get())
        .and(warp::fs::dir(output_root))
        .map(|file| reply::with_header(file, "cache-control", "no-cache"))
}
