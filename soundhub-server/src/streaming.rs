use axum::{
    body::Body,
    extract::Path,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    routing::get,
};
use soundhub_catalog::{DeliveryMode, PrimaryKey, TrackDelivery};
use soundhub_core::{file_extension, AssetKind, ByteRange, StoredBytes};

use crate::{
    auth::MaybeSession,
    context::ServerContext,
    errors::{ServerError, ServerResult},
    Router,
};

/// Images are served from these storage directories. Audio is not, it goes through the counters.
const MEDIA_KINDS: [AssetKind; 4] = [
    AssetKind::Avatar,
    AssetKind::AlbumCover,
    AssetKind::PlaylistCover,
    AssetKind::TrackCover,
];

#[utoipa::path(
    get,
    path = "/v1/streams/{id}",
    tag = "streaming",
    params(
        ("id" = i32, Path, description = "Id of the track"),
        ("Range" = Option<String>, Header, description = "A single byte range, like bytes=0-1023")
    ),
    responses(
        (
            status = 206,
            content_type = "audio/mpeg",
            description = "The requested part of the audio, counted as a play"
        ),
        (status = 404, description = "The track does not exist, is private, or its audio is gone"),
        (status = 416, description = "The range is outside the file")
    )
)]
async fn stream_track(
    session: MaybeSession,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
    headers: HeaderMap,
) -> ServerResult<Response<Body>> {
    deliver(&context, &session, id, DeliveryMode::Stream, &headers).await
}

#[utoipa::path(
    get,
    path = "/v1/downloads/{id}",
    tag = "streaming",
    params(
        ("id" = i32, Path, description = "Id of the track"),
        ("Range" = Option<String>, Header, description = "A single byte range, like bytes=0-1023")
    ),
    responses(
        (
            status = 200,
            content_type = "audio/mpeg",
            description = "The audio as an attachment, counted as a download"
        ),
        (status = 206, content_type = "audio/mpeg", description = "Part of the audio"),
        (status = 404, description = "The track does not exist, is private, or its audio is gone"),
        (status = 416, description = "The range is outside the file")
    )
)]
async fn download_track(
    session: MaybeSession,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
    headers: HeaderMap,
) -> ServerResult<Response<Body>> {
    deliver(&context, &session, id, DeliveryMode::Download, &headers).await
}

#[utoipa::path(
    get,
    path = "/v1/media/{path}",
    tag = "streaming",
    params(("path" = String, Path, description = "Storage path of an avatar or cover")),
    responses(
        (status = 200, content_type = "image/*", description = "The image"),
        (status = 404)
    )
)]
async fn media(context: ServerContext, Path(path): Path<String>) -> ServerResult<Response<Body>> {
    let directory = path.split('/').next().unwrap_or_default();
    let not_found = || ServerError::NotFound {
        resource: "file",
        identifier: "path",
    };

    if !MEDIA_KINDS.iter().any(|k| k.directory() == directory) {
        return Err(not_found());
    }

    let content = context
        .catalog
        .context()
        .files
        .storage()
        .read(&path, None)
        .await?;

    build(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, image_content_type(&path))
            .header(header::CONTENT_LENGTH, content.length)
            .header(header::CACHE_CONTROL, "public, max-age=3600"),
        Body::from_stream(content.stream),
    )
}

async fn deliver(
    context: &ServerContext,
    session: &MaybeSession,
    id: PrimaryKey,
    mode: DeliveryMode,
    headers: &HeaderMap,
) -> ServerResult<Response<Body>> {
    let responder = &context.catalog.responder;

    if let Some(prefix) = &context.accel_redirect {
        let delivery = responder.locate(id, session.user(), mode).await?;
        return accel_response(prefix, &delivery);
    }

    let range = headers
        .get(header::RANGE)
        .and_then(|x| x.to_str().ok())
        .and_then(ByteRange::parse);

    let mut delivery = responder.serve(id, session.user(), mode, range).await?;
    let content = delivery
        .content
        .take()
        .ok_or_else(|| ServerError::Unknown("Track was located but not read".to_string()))?;

    audio_response(&delivery, content)
}

fn audio_response(delivery: &TrackDelivery, content: StoredBytes) -> ServerResult<Response<Body>> {
    let length = content.length;
    let content_length = content.content_length();

    let content_range = match (content.range, delivery.mode) {
        (Some(range), _) => Some(range.content_range(length)),
        // Streams are always partial, even when the whole file is sent
        (None, DeliveryMode::Stream) if length > 0 => {
            Some(format!("bytes 0-{}/{}", length - 1, length))
        }
        (None, _) => None,
    };

    let status = match content_range {
        Some(_) => StatusCode::PARTIAL_CONTENT,
        None => StatusCode::OK,
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, content_length);

    if let Some(content_range) = content_range {
        builder = builder.header(header::CONTENT_RANGE, content_range);
    }

    if delivery.mode == DeliveryMode::Download {
        builder = builder.header(header::CONTENT_DISPOSITION, attachment(delivery.file_name()));
    }

    build(builder, Body::from_stream(content.stream))
}

/// Lets the proxy in front of us send the file
fn accel_response(prefix: &str, delivery: &TrackDelivery) -> ServerResult<Response<Body>> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header(header::ACCEPT_RANGES, "bytes")
        .header("X-Accel-Redirect", format!("{}/{}", prefix, delivery.path));

    if delivery.mode == DeliveryMode::Download {
        builder = builder.header(header::CONTENT_DISPOSITION, attachment(delivery.file_name()));
    }

    build(builder, Body::empty())
}

fn attachment(file_name: &str) -> HeaderValue {
    let escaped = file_name.replace(['"', '\\'], "_");

    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", escaped))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn build(builder: axum::http::response::Builder, body: Body) -> ServerResult<Response<Body>> {
    builder
        .body(body)
        .map_err(|e| ServerError::Unknown(e.to_string()))
}

fn image_content_type(path: &str) -> &'static str {
    let extension = file_extension(path)
        .map(|x| x.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

pub fn streams_router() -> Router {
    Router::new().route("/:id", get(stream_track))
}

pub fn downloads_router() -> Router {
    Router::new().route("/:id", get(download_track))
}

pub fn media_router() -> Router {
    Router::new().route("/*path", get(media))
}
