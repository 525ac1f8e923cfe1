use axum::{extract::Path, http::StatusCode, routing::get, Json};
use soundhub_catalog::PrimaryKey;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{AlbumUpload, MultipartFields},
    serialized::{Album, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/albums",
    tag = "albums",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Album>, description = "Every album of the requester")
    )
)]
async fn list_albums(session: Session, context: ServerContext) -> ServerResult<Json<Vec<Album>>> {
    let albums = context.catalog.albums.list_own(session.user()).await?;

    Ok(Json(albums.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/albums/{id}",
    tag = "albums",
    params(("id" = i32, Path, description = "Id of the album")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Album),
        (status = 404)
    )
)]
async fn album(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<Json<Album>> {
    let album = context.catalog.albums.get(id, Some(session.user())).await?;

    Ok(Json(album.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/albums",
    tag = "albums",
    request_body(content = AlbumUpload, content_type = "multipart/form-data"),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Album),
        (status = 413, description = "The cover is too large"),
        (status = 415, description = "The cover is not an image")
    )
)]
async fn create_album(
    session: Session,
    context: ServerContext,
    fields: MultipartFields,
) -> ServerResult<(StatusCode, Json<Album>)> {
    let form = AlbumUpload::parse(fields)?.into_form()?;
    let album = context.catalog.albums.create(session.user(), form).await?;

    Ok((StatusCode::CREATED, Json(album.to_serialized())))
}

#[utoipa::path(
    patch,
    path = "/v1/albums/{id}",
    tag = "albums",
    params(("id" = i32, Path, description = "Id of the album")),
    request_body(content = AlbumUpload, content_type = "multipart/form-data"),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Album),
        (status = 403, description = "The album belongs to someone else")
    )
)]
async fn update_album(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
    fields: MultipartFields,
) -> ServerResult<Json<Album>> {
    let changes = AlbumUpload::parse(fields)?.into_changes();
    let album = context
        .catalog
        .albums
        .update(session.user(), id, changes)
        .await?;

    Ok(Json(album.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/albums/{id}",
    tag = "albums",
    params(("id" = i32, Path, description = "Id of the album")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The album is gone, its tracks are kept")
    )
)]
async fn delete_album(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<StatusCode> {
    context.catalog.albums.delete(session.user(), id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_albums).post(create_album))
        .route(
            "/:id",
            get(album).patch(update_album).delete(delete_album),
        )
}
