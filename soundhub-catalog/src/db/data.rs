use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A soundhub account
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UserData {
    pub id: PrimaryKey,
    pub email: String,
    pub username: String,
    /// The password hash. Accounts created through Google have none.
    pub password: Option<String>,
    pub country: String,
    pub city: String,
    pub bio: String,
    /// Storage path of the avatar
    pub avatar: Option<String>,
    pub join_date: DateTime<Utc>,
    pub is_active: bool,
    pub superuser: bool,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct GenreData {
    pub id: PrimaryKey,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct AlbumData {
    pub id: PrimaryKey,
    /// The owner of the album
    pub user_id: PrimaryKey,
    pub name: String,
    pub description: String,
    pub private: bool,
    /// Storage path of the cover image
    pub cover: Option<String>,
}

/// An uploaded audio track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackData {
    pub id: PrimaryKey,
    /// The owner of the track
    pub user_id: PrimaryKey,
    pub album_id: Option<PrimaryKey>,
    pub name: String,
    /// Storage path of the audio
    pub file: String,
    /// Storage path of the cover image
    pub cover: Option<String>,
    pub private: bool,
    pub created_at: DateTime<Utc>,
    pub plays_count: i64,
    pub downloads_count: i64,
    pub likes_count: i64,
    pub genres: Vec<GenreData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistData {
    pub id: PrimaryKey,
    /// The owner of the playlist
    pub user_id: PrimaryKey,
    pub name: String,
    pub private: bool,
    pub cover: Option<String>,
    /// The tracks, in playlist order
    pub tracks: Vec<TrackData>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct CommentData {
    pub id: PrimaryKey,
    /// The author of the comment
    pub user_id: PrimaryKey,
    pub track_id: PrimaryKey,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A directed edge, meaning `follower_id` follows `followee_id`.
/// Note: `follower_id` and `followee_id` are unique together.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FollowData {
    pub id: PrimaryKey,
    pub follower_id: PrimaryKey,
    pub followee_id: PrimaryKey,
    pub created_at: NaiveDate,
}

/// A slice of a larger result set
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// How many items exist in total
    pub total: i64,
}
