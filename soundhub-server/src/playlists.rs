use axum::{extract::Path, http::StatusCode, routing::get, Json};
use soundhub_catalog::PrimaryKey;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{MultipartFields, PlaylistUpload},
    serialized::{Playlist, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/playlists",
    tag = "playlists",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Playlist>)
    )
)]
async fn list_playlists(
    session: Session,
    context: ServerContext,
) -> ServerResult<Json<Vec<Playlist>>> {
    let playlists = context.catalog.playlists.list_own(session.user()).await?;

    Ok(Json(playlists.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/playlists/{id}",
    tag = "playlists",
    params(("id" = i32, Path, description = "Id of the playlist")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Playlist),
        (status = 404)
    )
)]
async fn playlist(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<Json<Playlist>> {
    let playlist = context
        .catalog
        .playlists
        .get(id, Some(session.user()))
        .await?;

    Ok(Json(playlist.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/playlists",
    tag = "playlists",
    request_body(content = PlaylistUpload, content_type = "multipart/form-data"),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Playlist),
        (status = 404, description = "A track does not exist or is private")
    )
)]
async fn create_playlist(
    session: Session,
    context: ServerContext,
    fields: MultipartFields,
) -> ServerResult<(StatusCode, Json<Playlist>)> {
    let form = PlaylistUpload::parse(fields)?.into_form()?;
    let playlist = context
        .catalog
        .playlists
        .create(session.user(), form)
        .await?;

    Ok((StatusCode::CREATED, Json(playlist.to_serialized())))
}

#[utoipa::path(
    patch,
    path = "/v1/playlists/{id}",
    tag = "playlists",
    params(("id" = i32, Path, description = "Id of the playlist")),
    request_body(content = PlaylistUpload, content_type = "multipart/form-data"),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Playlist),
        (status = 403, description = "The playlist belongs to someone else")
    )
)]
async fn update_playlist(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
    fields: MultipartFields,
) -> ServerResult<Json<Playlist>> {
    let changes = PlaylistUpload::parse(fields)?.into_changes();
    let playlist = context
        .catalog
        .playlists
        .update(session.user(), id, changes)
        .await?;

    Ok(Json(playlist.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/playlists/{id}",
    tag = "playlists",
    params(("id" = i32, Path, description = "Id of the playlist")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204)
    )
)]
async fn delete_playlist(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<StatusCode> {
    context.catalog.playlists.delete(session.user(), id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_playlists).post(create_playlist))
        .route(
            "/:id",
            get(playlist).patch(update_playlist).delete(delete_playlist),
        )
}
