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
    schemas::{MultipartFields, ProfileUpload, TrackQuery},
    serialized::{Album, Author, Follow, Subscription, ToSerialized, TrackPage, Paginated, User},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/me",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User)
    )
)]
async fn me(session: Session) -> Json<User> {
    Json(session.user().to_serialized())
}

#[utoipa::path(
    patch,
    path = "/v1/me",
    tag = "users",
    request_body(content = ProfileUpload, content_type = "multipart/form-data"),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User),
        (status = 413, description = "The avatar is too large"),
        (status = 415, description = "The avatar is not an image")
    )
)]
async fn update_me(
    session: Session,
    context: ServerContext,
    fields: MultipartFields,
) -> ServerResult<Json<User>> {
    let upload = ProfileUpload::parse(fields)?;

    let user = context
        .catalog
        .users
        .update_profile(session.user(), upload.into_changes())
        .await?;

    Ok(Json(user.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/me",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The account and everything it owns are gone")
    )
)]
async fn delete_me(session: Session, context: ServerContext) -> ServerResult<StatusCode> {
    context.catalog.users.delete_account(session.user()).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/authors/{id}",
    tag = "authors",
    params(("id" = i32, Path, description = "Id of the author")),
    responses(
        (status = 200, body = Author),
        (status = 404)
    )
)]
async fn author(
    session: MaybeSession,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<Json<Author>> {
    let profile = context.catalog.users.profile(id, session.user()).await?;

    Ok(Json(profile.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/authors/{id}/albums",
    tag = "authors",
    params(("id" = i32, Path, description = "Id of the author")),
    responses(
        (status = 200, body = Vec<Album>)
    )
)]
async fn author_albums(
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<Json<Vec<Album>>> {
    let albums = context.catalog.albums.list_public(id).await?;

    Ok(Json(albums.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/authors/{id}/tracks",
    tag = "authors",
    params(("id" = i32, Path, description = "Id of the author"), TrackQuery),
    responses(
        (status = 200, body = TrackPage)
    )
)]
async fn author_tracks(
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
    Query(query): Query<TrackQuery>,
) -> ServerResult<Json<TrackPage>> {
    let page = context
        .catalog
        .tracks
        .list_by_author(id, query.filter(), query.page_request())
        .await?;

    Ok(Json(Paginated::from_page(
        &page,
        query.page(),
        query.page_size(),
    )))
}

#[utoipa::path(
    get,
    path = "/v1/authors/{id}/subscriptions",
    tag = "authors",
    params(("id" = i32, Path, description = "Id of the author")),
    responses(
        (status = 200, body = Vec<Subscription>, description = "The users this author follows")
    )
)]
async fn subscriptions(
    session: MaybeSession,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<Json<Vec<Subscription>>> {
    let subscriptions = context
        .catalog
        .ledger
        .list_subscriptions(id, session.user())
        .await?;

    Ok(Json(subscriptions.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/authors/{id}/followers",
    tag = "authors",
    params(("id" = i32, Path, description = "Id of the author")),
    responses(
        (status = 200, body = Vec<Subscription>, description = "The users following this author")
    )
)]
async fn followers(
    session: MaybeSession,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<Json<Vec<Subscription>>> {
    let followers = context
        .catalog
        .ledger
        .list_followers(id, session.user())
        .await?;

    Ok(Json(followers.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/authors/{id}/follow",
    tag = "authors",
    params(("id" = i32, Path, description = "Id of the author to follow")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Follow),
        (status = 400, description = "Already following, or following yourself")
    )
)]
async fn follow(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<(StatusCode, Json<Follow>)> {
    let follow = context.catalog.ledger.follow(session.user(), id).await?;

    Ok((StatusCode::CREATED, Json(follow.to_serialized())))
}

#[utoipa::path(
    delete,
    path = "/v1/authors/{id}/follow",
    tag = "authors",
    params(("id" = i32, Path, description = "Id of the author to unfollow")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204),
        (status = 404, description = "Not following this author")
    )
)]
async fn unfollow(
    session: Session,
    context: ServerContext,
    Path(id): Path<PrimaryKey>,
) -> ServerResult<StatusCode> {
    context.catalog.ledger.unfollow(session.user(), id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn me_router() -> Router {
    Router::new().route("/", get(me).patch(update_me).delete(delete_me))
}

pub fn authors_router() -> Router {
    Router::new()
        .route("/:id", get(author))
        .route("/:id/albums", get(author_albums))
        .route("/:id/tracks", get(author_tracks))
        .route("/:id/subscriptions", get(subscriptions))
        .route("/:id/followers", get(followers))
        .route("/:id/follow", post(follow).delete(unfollow))
}
