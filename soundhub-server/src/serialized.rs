//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use soundhub_catalog::{
    AlbumData, CommentData, FollowData, GenreData, Page, PlaylistData, Profile, SessionData,
    Subscription as LedgerSubscription, TrackData, UserData,
};
use utoipa::ToSchema;

/// Where stored images are served from
pub const MEDIA_PREFIX: &str = "/v1/media";

/// The requester's own account
#[derive(Debug, Serialize, ToSchema)]
pub struct User {
    id: i32,
    email: String,
    username: String,
    country: String,
    city: String,
    bio: String,
    avatar: Option<String>,
    join_date: DateTime<Utc>,
    superuser: bool,
}

/// A user as seen by someone else
#[derive(Debug, Serialize, ToSchema)]
pub struct Author {
    id: i32,
    username: String,
    country: String,
    city: String,
    bio: String,
    avatar: Option<String>,
    join_date: DateTime<Utc>,
    is_subscribed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Subscription {
    id: i32,
    username: String,
    avatar: Option<String>,
    /// Whether the requester follows this user
    is_subscribed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Follow {
    follower_id: i32,
    followee_id: i32,
    created_at: NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResult {
    user_id: i32,
    access_token: String,
    token_type: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Genre {
    id: i32,
    name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Album {
    id: i32,
    user_id: i32,
    name: String,
    description: String,
    private: bool,
    cover: Option<String>,
}

/// A track with everything known about it
#[derive(Debug, Serialize, ToSchema)]
pub struct Track {
    id: i32,
    user_id: i32,
    album_id: Option<i32>,
    name: String,
    cover: Option<String>,
    private: bool,
    created_at: DateTime<Utc>,
    plays_count: i64,
    downloads_count: i64,
    likes_count: i64,
    genres: Vec<Genre>,
    stream_url: String,
    download_url: String,
}

/// A track in a listing
#[derive(Debug, Serialize, ToSchema)]
pub struct TrackSummary {
    id: i32,
    user_id: i32,
    name: String,
    cover: Option<String>,
    private: bool,
    plays_count: i64,
    likes_count: i64,
    stream_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Playlist {
    id: i32,
    user_id: i32,
    name: String,
    private: bool,
    cover: Option<String>,
    tracks: Vec<TrackSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Comment {
    id: i32,
    user_id: i32,
    track_id: i32,
    text: String,
    created_at: DateTime<Utc>,
}

/// One page of a larger listing
#[derive(Debug, Serialize, ToSchema)]
#[aliases(TrackPage = Paginated<TrackSummary>)]
pub struct Paginated<T> {
    /// How many items exist across all pages
    count: i64,
    page: u32,
    page_size: u32,
    results: Vec<T>,
}

impl<T: Serialize> Paginated<T> {
    pub fn from_page<I>(page: &Page<I>, number: u32, size: u32) -> Self
    where
        I: ToSerialized<T>,
    {
        Self {
            count: page.total,
            page: number,
            page_size: size,
            results: page.items.iter().map(|x| x.to_serialized()).collect(),
        }
    }
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

fn media_url(path: &Option<String>) -> Option<String> {
    path.as_ref().map(|p| format!("{}/{}", MEDIA_PREFIX, p))
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            country: self.country.clone(),
            city: self.city.clone(),
            bio: self.bio.clone(),
            avatar: media_url(&self.avatar),
            join_date: self.join_date,
            superuser: self.superuser,
        }
    }
}

impl ToSerialized<Author> for Profile {
    fn to_serialized(&self) -> Author {
        let user = &self.user;

        Author {
            id: user.id,
            username: user.username.clone(),
            country: user.country.clone(),
            city: user.city.clone(),
            bio: user.bio.clone(),
            avatar: media_url(&user.avatar),
            join_date: user.join_date,
            is_subscribed: self.is_subscribed,
        }
    }
}

impl ToSerialized<Subscription> for LedgerSubscription {
    fn to_serialized(&self) -> Subscription {
        Subscription {
            id: self.user.id,
            username: self.user.username.clone(),
            avatar: media_url(&self.user.avatar),
            is_subscribed: self.is_subscribed,
        }
    }
}

impl ToSerialized<Follow> for FollowData {
    fn to_serialized(&self) -> Follow {
        Follow {
            follower_id: self.follower_id,
            followee_id: self.followee_id,
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<LoginResult> for SessionData {
    fn to_serialized(&self) -> LoginResult {
        LoginResult {
            user_id: self.user.id,
            access_token: self.token.clone(),
            token_type: "Token".to_string(),
            expires_at: self.expires_at,
        }
    }
}

impl ToSerialized<Genre> for GenreData {
    fn to_serialized(&self) -> Genre {
        Genre {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

impl ToSerialized<Album> for AlbumData {
    fn to_serialized(&self) -> Album {
        Album {
            id: self.id,
            user_id: self.user_id,
            name: self.name.clone(),
            description: self.description.clone(),
            private: self.private,
            cover: media_url(&self.cover),
        }
    }
}

impl ToSerialized<Track> for TrackData {
    fn to_serialized(&self) -> Track {
        Track {
            id: self.id,
            user_id: self.user_id,
            album_id: self.album_id,
            name: self.name.clone(),
            cover: media_url(&self.cover),
            private: self.private,
            created_at: self.created_at,
            plays_count: self.plays_count,
            downloads_count: self.downloads_count,
            likes_count: self.likes_count,
            genres: self.genres.to_serialized(),
            stream_url: format!("/v1/streams/{}", self.id),
            download_url: format!("/v1/downloads/{}", self.id),
        }
    }
}

impl ToSerialized<TrackSummary> for TrackData {
    fn to_serialized(&self) -> TrackSummary {
        TrackSummary {
            id: self.id,
            user_id: self.user_id,
            name: self.name.clone(),
            cover: media_url(&self.cover),
            private: self.private,
            plays_count: self.plays_count,
            likes_count: self.likes_count,
            stream_url: format!("/v1/streams/{}", self.id),
        }
    }
}

impl ToSerialized<Playlist> for PlaylistData {
    fn to_serialized(&self) -> Playlist {
        Playlist {
            id: self.id,
            user_id: self.user_id,
            name: self.name.clone(),
            private: self.private,
            cover: media_url(&self.cover),
            tracks: self.tracks.to_serialized(),
        }
    }
}

impl ToSerialized<Comment> for CommentData {
    fn to_serialized(&self) -> Comment {
        Comment {
            id: self.id,
            user_id: self.user_id,
            track_id: self.track_id,
            text: self.text.clone(),
            created_at: self.created_at,
        }
    }
}
