use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, patch},
    Json,
};
use soundhub_catalog::PrimaryKey;

use crate::{
    auth::{MaybeSession, Session},
    context::ServerContext,
    errors::ServerResult,
    schemas::{CommentSchema, ValidatedJson},
    serialized::{Comment, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/tracks/{id}/comments",
    tag = "comments",
    params(("id" = i32, Path, description = "Id of the track")),
    responses(
        (status = 200, body = Vec<Comment>, description = "Oldest first")
    )
)]
async fn track_comments(
    session: MaybeSession,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<Json<Vec<Comment>>> {
    let comments = context
        .catalog
        .comments
        .list_for_track(id, session.user())
        .await?;

    Ok(Json(comments.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/tracks/{id}/comments",
    tag = "comments",
    params(("id" = i32, Path, description = "Id of the track")),
    request_body = CommentSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Comment)
    )
)]
async fn create_comment(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<CommentSchema>,
) -> ServerResult<(StatusCode, Json<Comment>)> {
    let comment = context
        .catalog
        .comments
        .create(session.user(), id, body.text)
        .await?;

    Ok((StatusCode::CREATED, Json(comment.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/v1/comments",
    tag = "comments",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Comment>, description = "Comments written by the requester")
    )
)]
async fn list_comments(
    session: Session,
    context: ServerContext,
) -> ServerResult<Json<Vec<Comment>>> {
    let comments = context.catalog.comments.list_own(session.user()).await?;

    Ok(Json(comments.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/v1/comments/{id}",
    tag = "comments",
    params(("id" = i32, Path, description = "Id of the comment")),
    request_body = CommentSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Comment),
        (status = 403, description = "Written by someone else")
    )
)]
async fn update_comment(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<CommentSchema>,
) -> ServerResult<Json<Comment>> {
    let comment = context
        .catalog
        .comments
        .update(session.user(), id, body.text)
        .await?;

    Ok(Json(comment.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/comments/{id}",
    tag = "comments",
    params(("id" = i32, Path, description = "Id of the comment")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204),
        (status = 403, description = "Written by someone else")
    )
)]
async fn delete_comment(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<StatusCode> {
    context.catalog.comments.delete(session.user(), id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Comments under `/tracks`
pub fn track_router() -> Router {
    Router::new().route("/:id/comments", get(track_comments).post(create_comment))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_comments))
        .route("/:id", patch(update_comment).delete(delete_comment))
}
