use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json,
};
use soundhub_catalog::PrimaryKey;

use crate::{
    auth::{MaybeSession, Session},
    context::ServerContext,
    errors::ServerResult,
    schemas::{MultipartFields, TrackQuery, TrackUpload},
    serialized::{Paginated, ToSerialized, Track, TrackPage},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/tracks",
    tag = "tracks",
    params(TrackQuery),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (
            status = 200,
            body = TrackPage,
            description = "The requester's tracks, private ones included"
        )
    )
)]
async fn list_tracks(
    session: Session,
    context: ServerContext,
    Query(query): Query<TrackQuery>,
) -> ServerResult<Json<TrackPage>> {
    let page = context
        .catalog
        .tracks
        .list_own(session.user(), query.filter(), query.page_request())
        .await?;

    Ok(Json(Paginated::from_page(
        &page,
        query.page(),
        query.page_size(),
    )))
}

#[utoipa::path(
    get,
    path = "/v1/tracks/public",
    tag = "tracks",
    params(TrackQuery),
    responses(
        (status = 200, body = TrackPage, description = "Every track anyone may listen to")
    )
)]
async fn list_public_tracks(
    context: ServerContext,
    Query(query): Query<TrackQuery>,
) -> ServerResult<Json<TrackPage>> {
    let page = context
        .catalog
        .tracks
        .list_public(query.filter(), query.page_request())
        .await?;

    Ok(Json(Paginated::from_page(
        &page,
        query.page(),
        query.page_size(),
    )))
}

#[utoipa::path(
    get,
    path = "/v1/tracks/{id}",
    tag = "tracks",
    params(("id" = i32, Path, description = "Id of the track")),
    responses(
        (status = 200, body = Track),
        (status = 404, description = "The track does not exist or is private")
    )
)]
async fn track(
    session: MaybeSession,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<Json<Track>> {
    let track = context.catalog.tracks.get(id, session.user()).await?;

    Ok(Json(track.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/tracks",
    tag = "tracks",
    request_body(content = TrackUpload, content_type = "multipart/form-data"),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Track),
        (status = 413, description = "The audio or cover is too large"),
        (status = 415, description = "The audio is not an mp3 file, or the cover not an image")
    )
)]
async fn create_track(
    session: Session,
    context: ServerContext,
    fields: MultipartFields,
) -> ServerResult<(StatusCode, Json<Track>)> {
    let form = TrackUpload::parse(fields)?.into_form()?;
    let track = context.catalog.tracks.create(session.user(), form).await?;

    Ok((StatusCode::CREATED, Json(track.to_serialized())))
}

#[utoipa::path(
    patch,
    path = "/v1/tracks/{id}",
    tag = "tracks",
    params(("id" = i32, Path, description = "Id of the track")),
    request_body(content = TrackUpload, content_type = "multipart/form-data"),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Track),
        (status = 403, description = "The track belongs to someone else")
    )
)]
async fn update_track(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
    fields: MultipartFields,
) -> ServerResult<Json<Track>> {
    let changes = TrackUpload::parse(fields)?.into_changes();
    let track = context
        .catalog
        .tracks
        .update(session.user(), id, changes)
        .await?;

    Ok(Json(track.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/tracks/{id}",
    tag = "tracks",
    params(("id" = i32, Path, description = "Id of the track")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The track and its files are gone")
    )
)]
async fn delete_track(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<StatusCode> {
    context.catalog.tracks.delete(session.user(), id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/tracks/{id}/like",
    tag = "tracks",
    params(("id" = i32, Path, description = "Id of the track")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Track),
        (status = 409, description = "The track is already liked")
    )
)]
async fn like_track(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<Json<Track>> {
    let track = context.catalog.tracks.like(session.user(), id).await?;

    Ok(Json(track.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/tracks/{id}/like",
    tag = "tracks",
    params(("id" = i32, Path, description = "Id of the track")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Track),
        (status = 404, description = "The track is not liked")
    )
)]
async fn unlike_track(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<Json<Track>> {
    let track = context.catalog.tracks.unlike(session.user(), id).await?;

    Ok(Json(track.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_tracks).post(create_track))
        .route("/public", get(list_public_tracks))
        .route(
            "/:id",
            get(track).patch(update_track).delete(delete_track),
        )
        .route("/:id/like", post(like_track).delete(unlike_track))
        .merge(crate::comments::track_router())
}
