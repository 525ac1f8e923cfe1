use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{schemas, serialized};

#[derive(OpenApi)]
#[openapi(
    modifiers(&Security),
    paths(
        crate::auth::register,
        crate::auth::login,
        crate::auth::google_login,
        crate::auth::logout,
        crate::users::me,
        crate::users::update_me,
        crate::users::delete_me,
        crate::users::author,
        crate::users::author_albums,
        crate::users::author_tracks,
        crate::users::subscriptions,
        crate::users::followers,
        crate::users::follow,
        crate::users::unfollow,
        crate::genres::list_genres,
        crate::genres::create_genre,
        crate::genres::delete_genre,
        crate::albums::list_albums,
        crate::albums::album,
        crate::albums::create_album,
        crate::albums::update_album,
        crate::albums::delete_album,
        crate::tracks::list_tracks,
        crate::tracks::list_public_tracks,
        crate::tracks::track,
        crate::tracks::create_track,
        crate::tracks::update_track,
        crate::tracks::delete_track,
        crate::tracks::like_track,
        crate::tracks::unlike_track,
        crate::comments::track_comments,
        crate::comments::create_comment,
        crate::comments::list_comments,
        crate::comments::update_comment,
        crate::comments::delete_comment,
        crate::playlists::list_playlists,
        crate::playlists::playlist,
        crate::playlists::create_playlist,
        crate::playlists::update_playlist,
        crate::playlists::delete_playlist,
        crate::streaming::stream_track,
        crate::streaming::download_track,
        crate::streaming::media,
    ),
    components(schemas(
        schemas::RegisterSchema,
        schemas::LoginSchema,
        schemas::GoogleLoginSchema,
        schemas::GenreSchema,
        schemas::CommentSchema,
        schemas::ProfileUpload,
        schemas::AlbumUpload,
        schemas::TrackUpload,
        schemas::PlaylistUpload,
        serialized::User,
        serialized::Author,
        serialized::Subscription,
        serialized::Follow,
        serialized::LoginResult,
        serialized::Genre,
        serialized::Album,
        serialized::Track,
        serialized::TrackSummary,
        serialized::TrackPage,
        serialized::Playlist,
        serialized::Comment,
    )),
    info(
        description = "soundhub-server exposes endpoints to upload, share and listen to music"
    )
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
