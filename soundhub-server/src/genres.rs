use axum::{
    extract::Path,
    http::StatusCode,
    routing::{delete, get},
    Json,
};
use soundhub_catalog::PrimaryKey;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{GenreSchema, ValidatedJson},
    serialized::{Genre, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/genres",
    tag = "genres",
    responses(
        (status = 200, body = Vec<Genre>)
    )
)]
async fn list_genres(context: ServerContext) -> ServerResult<Json<Vec<Genre>>> {
    let genres = context.catalog.genres.list().await?;

    Ok(Json(genres.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/genres",
    tag = "genres",
    request_body = GenreSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Genre),
        (status = 403, description = "Only superusers manage genres"),
        (status = 409, description = "The genre exists")
    )
)]
async fn create_genre(
    session: Session,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<GenreSchema>,
) -> ServerResult<(StatusCode, Json<Genre>)> {
    let genre = context
        .catalog
        .genres
        .create(session.user(), &body.name)
        .await?;

    Ok((StatusCode::CREATED, Json(genre.to_serialized())))
}

#[utoipa::path(
    delete,
    path = "/v1/genres/{id}",
    tag = "genres",
    params(("id" = i32, Path, description = "Id of the genre")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204),
        (status = 403, description = "Only superusers manage genres")
    )
)]
async fn delete_genre(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<StatusCode> {
    context.catalog.genres.delete(session.user(), id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_genres).post(create_genre))
        .route("/:id", delete(delete_genre))
}
