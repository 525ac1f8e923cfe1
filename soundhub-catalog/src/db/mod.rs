use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type ArcedDatabase = Arc<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn conflict_or(self, resource: &'static str, field: &'static str, value: &str)
        -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) => match e {
                DatabaseError::NotFound {
                    resource: _,
                    identifier: _,
                } => Ok(()),
                e => Err(e),
            },
        }
    }
}

/// Which popularity counter of a track to increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackCounter {
    Plays,
    Downloads,
}

/// Represents a type that can fetch soundhub data from a database
#[async_trait]
pub trait Database: Send + Sync {
    async fn check_for_superuser(&self) -> Result<bool>;
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_email(&self, email: &str) -> Result<UserData>;
    async fn user_by_username(&self, username: &str) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData>;
    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    async fn clear_expired_sessions(&self) -> Result<()>;

    async fn list_genres(&self) -> Result<Vec<GenreData>>;
    async fn genre_by_id(&self, genre_id: PrimaryKey) -> Result<GenreData>;
    async fn create_genre(&self, name: &str) -> Result<GenreData>;
    async fn delete_genre(&self, genre_id: PrimaryKey) -> Result<()>;

    async fn album_by_id(&self, album_id: PrimaryKey) -> Result<AlbumData>;
    async fn list_albums(&self, user_id: PrimaryKey, include_private: bool)
        -> Result<Vec<AlbumData>>;
    async fn create_album(&self, new_album: NewAlbum) -> Result<AlbumData>;
    async fn update_album(&self, updated_album: UpdatedAlbum) -> Result<AlbumData>;
    async fn delete_album(&self, album_id: PrimaryKey) -> Result<()>;

    async fn track_by_id(&self, track_id: PrimaryKey) -> Result<TrackData>;
    async fn list_tracks(&self, filter: &TrackFilter, page: PageRequest)
        -> Result<Page<TrackData>>;
    async fn create_track(&self, new_track: NewTrack) -> Result<TrackData>;
    async fn update_track(&self, updated_track: UpdatedTrack) -> Result<TrackData>;
    async fn delete_track(&self, track_id: PrimaryKey) -> Result<()>;
    async fn increment_track_counter(
        &self,
        track_id: PrimaryKey,
        counter: TrackCounter,
    ) -> Result<TrackData>;
    async fn like_track(&self, track_id: PrimaryKey, user_id: PrimaryKey) -> Result<TrackData>;
    async fn unlike_track(&self, track_id: PrimaryKey, user_id: PrimaryKey)
        -> Result<TrackData>;

    async fn playlist_by_id(&self, playlist_id: PrimaryKey) -> Result<PlaylistData>;
    async fn list_playlists(
        &self,
        user_id: PrimaryKey,
        include_private: bool,
    ) -> Result<Vec<PlaylistData>>;
    async fn create_playlist(&self, new_playlist: NewPlaylist) -> Result<PlaylistData>;
    async fn update_playlist(&self, updated_playlist: UpdatedPlaylist) -> Result<PlaylistData>;
    async fn delete_playlist(&self, playlist_id: PrimaryKey) -> Result<()>;

    async fn comment_by_id(&self, comment_id: PrimaryKey) -> Result<CommentData>;
    async fn list_comments_by_track(&self, track_id: PrimaryKey) -> Result<Vec<CommentData>>;
    async fn list_comments_by_user(&self, user_id: PrimaryKey) -> Result<Vec<CommentData>>;
    async fn create_comment(&self, new_comment: NewComment) -> Result<CommentData>;
    async fn update_comment(&self, comment_id: PrimaryKey, text: String) -> Result<CommentData>;
    async fn delete_comment(&self, comment_id: PrimaryKey) -> Result<()>;

    async fn follow_by_pair(
        &self,
        follower_id: PrimaryKey,
        followee_id: PrimaryKey,
    ) -> Result<FollowData>;
    async fn create_follow(&self, new_follow: NewFollow) -> Result<FollowData>;
    async fn delete_follow(&self, follower_id: PrimaryKey, followee_id: PrimaryKey)
        -> Result<()>;
    /// Users followed by `user_id`, oldest follow first
    async fn list_following(&self, user_id: PrimaryKey) -> Result<Vec<UserData>>;
    /// Users following `user_id`, oldest follow first
    async fn list_followers(&self, user_id: PrimaryKey) -> Result<Vec<UserData>>;
}

#[derive(Debug)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    /// An already hashed password
    pub password: Option<String>,
    pub superuser: bool,
}

/// Fields left as [None] are kept as they are
#[derive(Debug, Default)]
pub struct UpdatedUser {
    pub id: PrimaryKey,
    pub country: Option<String>,
    pub city: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewAlbum {
    /// The owner of the new album
    pub user_id: PrimaryKey,
    pub name: String,
    pub description: String,
    pub private: bool,
    pub cover: Option<String>,
}

#[derive(Debug, Default)]
pub struct UpdatedAlbum {
    pub id: PrimaryKey,
    pub name: Option<String>,
    pub description: Option<String>,
    pub private: Option<bool>,
    pub cover: Option<String>,
}

#[derive(Debug)]
pub struct NewTrack {
    /// The owner of the new track
    pub user_id: PrimaryKey,
    pub album_id: Option<PrimaryKey>,
    pub name: String,
    pub file: String,
    pub cover: Option<String>,
    pub private: bool,
    pub genre_ids: Vec<PrimaryKey>,
}

#[derive(Debug, Default)]
pub struct UpdatedTrack {
    pub id: PrimaryKey,
    pub name: Option<String>,
    /// `Some(None)` removes the track from its album
    pub album_id: Option<Option<PrimaryKey>>,
    pub file: Option<String>,
    pub cover: Option<String>,
    pub private: Option<bool>,
    pub genre_ids: Option<Vec<PrimaryKey>>,
}

/// Narrows down a track listing. All filters are exact matches.
#[derive(Debug, Default, Clone)]
pub struct TrackFilter {
    /// Only tracks owned by this user
    pub user_id: Option<PrimaryKey>,
    /// Leave out private tracks and tracks in private albums
    pub public_only: bool,
    pub name: Option<String>,
    pub username: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
}

/// Which part of a listing to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: i64,
    /// [None] means no limit
    pub limit: Option<i64>,
}

impl PageRequest {
    /// A 1-based page of the given size
    pub fn page(page: u32, page_size: u32) -> Self {
        Self {
            offset: i64::from(page.max(1) - 1) * i64::from(page_size),
            limit: Some(i64::from(page_size)),
        }
    }

    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: None,
        }
    }

    /// Applies the request to an in-memory list
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = (self.offset.max(0) as usize).min(items.len());
        let end = match self.limit {
            Some(limit) => start.saturating_add(limit.max(0) as usize).min(items.len()),
            None => items.len(),
        };

        items[start..end].to_vec()
    }
}

#[derive(Debug)]
pub struct NewPlaylist {
    /// The owner of the new playlist
    pub user_id: PrimaryKey,
    pub name: String,
    pub private: bool,
    pub cover: Option<String>,
    pub track_ids: Vec<PrimaryKey>,
}

#[derive(Debug, Default)]
pub struct UpdatedPlaylist {
    pub id: PrimaryKey,
    pub name: Option<String>,
    pub private: Option<bool>,
    pub cover: Option<String>,
    pub track_ids: Option<Vec<PrimaryKey>>,
}

#[derive(Debug)]
pub struct NewComment {
    /// The author of the new comment
    pub user_id: PrimaryKey,
    pub track_id: PrimaryKey,
    pub text: String,
}

#[derive(Debug)]
pub struct NewFollow {
    pub follower_id: PrimaryKey,
    pub followee_id: PrimaryKey,
}

#[cfg(test)]
mod test {
    use super::PageRequest;

    #[test]
    fn pages_are_one_based() {
        assert_eq!(
            PageRequest::page(1, 20),
            PageRequest {
                offset: 0,
                limit: Some(20)
            }
        );
        assert_eq!(PageRequest::page(3, 10).offset, 20);
        assert_eq!(PageRequest::page(0, 10).offset, 0);
    }

    #[test]
    fn slicing_stays_in_bounds() {
        let items: Vec<_> = (1..=5).collect();

        assert_eq!(PageRequest::page(2, 2).slice(&items), vec![3, 4]);
        assert_eq!(PageRequest::page(3, 2).slice(&items), vec![5]);
        assert!(PageRequest::page(9, 2).slice(&items).is_empty());
        assert_eq!(PageRequest::all().slice(&items), items);
    }
}
