use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::{
    AlbumData, CommentData, Database, DatabaseError, FollowData, GenreData, NewAlbum, NewComment,
    NewFollow, NewPlaylist, NewSession, NewTrack, NewUser, Page, PageRequest, PlaylistData,
    PrimaryKey, Result, SessionData, TrackCounter, TrackData, TrackFilter, UpdatedAlbum,
    UpdatedPlaylist, UpdatedTrack, UpdatedUser, UserData,
};

/// A database that lives in memory, honoring the same constraints as the postgres schema.
/// Used in tests and for trying things out without a database server.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    last_id: PrimaryKey,
    users: BTreeMap<PrimaryKey, UserData>,
    sessions: BTreeMap<PrimaryKey, StoredSession>,
    genres: BTreeMap<PrimaryKey, GenreData>,
    albums: BTreeMap<PrimaryKey, AlbumData>,
    tracks: BTreeMap<PrimaryKey, StoredTrack>,
    playlists: BTreeMap<PrimaryKey, StoredPlaylist>,
    comments: BTreeMap<PrimaryKey, CommentData>,
    follows: BTreeMap<PrimaryKey, FollowData>,
    /// Tables that fail every read, as if the connection was lost
    unreachable: BTreeSet<&'static str>,
}

struct StoredSession {
    id: PrimaryKey,
    token: String,
    user_id: PrimaryKey,
    expires_at: chrono::DateTime<Utc>,
}

struct StoredTrack {
    /// Genres are resolved when the track is read
    data: TrackData,
    genre_ids: Vec<PrimaryKey>,
    liked_by: BTreeSet<PrimaryKey>,
}

struct StoredPlaylist {
    id: PrimaryKey,
    user_id: PrimaryKey,
    name: String,
    private: bool,
    cover: Option<String>,
    track_ids: Vec<PrimaryKey>,
}

fn not_found(resource: &'static str, identifier: &'static str) -> DatabaseError {
    DatabaseError::NotFound {
        resource,
        identifier,
    }
}

fn conflict(resource: &'static str, field: &'static str, value: &str) -> DatabaseError {
    DatabaseError::Conflict {
        resource,
        field,
        value: value.to_string(),
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn disconnect(&self, table: &'static str) {
        self.state.lock().unreachable.insert(table);
    }
}

impl State {
    fn reachable(&self, table: &'static str) -> Result<()> {
        match self.unreachable.contains(table) {
            true => Err(DatabaseError::Internal(
                format!("{} is unreachable", table).into(),
            )),
            false => Ok(()),
        }
    }

    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }

    fn user(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.users
            .get(&user_id)
            .cloned()
            .ok_or(not_found("user", "id"))
    }

    fn ensure_genres(&self, genre_ids: &[PrimaryKey]) -> Result<()> {
        match genre_ids.iter().all(|id| self.genres.contains_key(id)) {
            true => Ok(()),
            false => Err(not_found("genre", "id")),
        }
    }

    fn ensure_tracks(&self, track_ids: &[PrimaryKey]) -> Result<()> {
        match track_ids.iter().all(|id| self.tracks.contains_key(id)) {
            true => Ok(()),
            false => Err(not_found("track", "id")),
        }
    }

    fn track(&self, track_id: PrimaryKey) -> Result<TrackData> {
        let stored = self.tracks.get(&track_id).ok_or(not_found("track", "id"))?;

        let mut genres: Vec<_> = stored
            .genre_ids
            .iter()
            .filter_map(|id| self.genres.get(id).cloned())
            .collect();
        genres.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(TrackData {
            genres,
            likes_count: stored.liked_by.len() as i64,
            ..stored.data.clone()
        })
    }

    fn playlist(&self, playlist_id: PrimaryKey) -> Result<PlaylistData> {
        let stored = self
            .playlists
            .get(&playlist_id)
            .ok_or(not_found("playlist", "id"))?;

        let tracks = stored
            .track_ids
            .iter()
            .filter_map(|id| self.track(*id).ok())
            .collect();

        Ok(PlaylistData {
            id: stored.id,
            user_id: stored.user_id,
            name: stored.name.clone(),
            private: stored.private,
            cover: stored.cover.clone(),
            tracks,
        })
    }

    fn session(&self, stored: &StoredSession) -> Result<SessionData> {
        Ok(SessionData {
            id: stored.id,
            token: stored.token.clone(),
            expires_at: stored.expires_at,
            user: self.user(stored.user_id)?,
        })
    }

    fn remove_track(&mut self, track_id: PrimaryKey) {
        self.tracks.remove(&track_id);
        self.comments.retain(|_, c| c.track_id != track_id);

        for playlist in self.playlists.values_mut() {
            playlist.track_ids.retain(|id| *id != track_id);
        }
    }

    fn remove_album(&mut self, album_id: PrimaryKey) {
        self.albums.remove(&album_id);

        for track in self.tracks.values_mut() {
            if track.data.album_id == Some(album_id) {
                track.data.album_id = None;
            }
        }
    }

    fn is_public(&self, track: &TrackData) -> bool {
        let album_is_private = track
            .album_id
            .and_then(|id| self.albums.get(&id))
            .is_some_and(|album| album.private);

        !track.private && !album_is_private
    }

    fn matches(&self, track: &TrackData, filter: &TrackFilter) -> bool {
        let owner = self.users.get(&track.user_id);
        let album = track.album_id.and_then(|id| self.albums.get(&id));

        filter.user_id.map_or(true, |id| track.user_id == id)
            && (!filter.public_only || self.is_public(track))
            && filter.name.as_ref().map_or(true, |name| &track.name == name)
            && filter
                .username
                .as_ref()
                .map_or(true, |name| owner.is_some_and(|u| &u.username == name))
            && filter
                .album
                .as_ref()
                .map_or(true, |name| album.is_some_and(|a| &a.name == name))
            && filter
                .genre
                .as_ref()
                .map_or(true, |name| track.genres.iter().any(|g| &g.name == name))
    }

    fn users_by_ids(&self, ids: impl Iterator<Item = PrimaryKey>) -> Vec<UserData> {
        ids.filter_map(|id| self.users.get(&id).cloned()).collect()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn check_for_superuser(&self) -> Result<bool> {
        Ok(self.state.lock().users.values().any(|u| u.superuser))
    }

    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.state.lock().user(user_id)
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        self.state
            .lock()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(not_found("user", "email"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        self.state
            .lock()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(not_found("user", "username"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut state = self.state.lock();

        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(conflict("user", "email", &new_user.email));
        }

        if state.users.values().any(|u| u.username == new_user.username) {
            return Err(conflict("user", "username", &new_user.username));
        }

        let user = UserData {
            id: state.next_id(),
            email: new_user.email,
            username: new_user.username,
            password: new_user.password,
            country: String::new(),
            city: String::new(),
            bio: String::new(),
            avatar: None,
            join_date: Utc::now(),
            is_active: true,
            superuser: new_user.superuser,
        };

        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let mut state = self.state.lock();
        let user = state
            .users
            .get_mut(&updated_user.id)
            .ok_or(not_found("user", "id"))?;

        if let Some(country) = updated_user.country {
            user.country = country;
        }
        if let Some(city) = updated_user.city {
            user.city = city;
        }
        if let Some(bio) = updated_user.bio {
            user.bio = bio;
        }
        if let Some(avatar) = updated_user.avatar {
            user.avatar = Some(avatar);
        }

        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        state.users.remove(&user_id).ok_or(not_found("user", "id"))?;

        state.sessions.retain(|_, s| s.user_id != user_id);
        state.follows.retain(|_, f| f.follower_id != user_id && f.followee_id != user_id);
        state.comments.retain(|_, c| c.user_id != user_id);
        state.playlists.retain(|_, p| p.user_id != user_id);

        let owned_tracks: Vec<_> = state
            .tracks
            .values()
            .filter(|t| t.data.user_id == user_id)
            .map(|t| t.data.id)
            .collect();
        for track_id in owned_tracks {
            state.remove_track(track_id);
        }

        let owned_albums: Vec<_> = state
            .albums
            .values()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.id)
            .collect();
        for album_id in owned_albums {
            state.remove_album(album_id);
        }

        for track in state.tracks.values_mut() {
            track.liked_by.remove(&user_id);
        }

        Ok(())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let state = self.state.lock();
        let stored = state
            .sessions
            .values()
            .find(|s| s.token == token)
            .ok_or(not_found("session", "token"))?;

        state.session(stored)
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut state = self.state.lock();

        if state.sessions.values().any(|s| s.token == new_session.token) {
            return Err(conflict("session", "token", &new_session.token));
        }

        state.user(new_session.user_id)?;

        let stored = StoredSession {
            id: state.next_id(),
            token: new_session.token,
            user_id: new_session.user_id,
            expires_at: new_session.expires_at,
        };

        let session = state.session(&stored)?;
        state.sessions.insert(stored.id, stored);

        Ok(session)
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock();
        let id = state
            .sessions
            .values()
            .find(|s| s.token == token)
            .map(|s| s.id)
            .ok_or(not_found("session", "token"))?;

        state.sessions.remove(&id);
        Ok(())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();
        self.state.lock().sessions.retain(|_, s| s.expires_at > now);
        Ok(())
    }

    async fn list_genres(&self) -> Result<Vec<GenreData>> {
        let mut genres: Vec<_> = self.state.lock().genres.values().cloned().collect();
        genres.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(genres)
    }

    async fn genre_by_id(&self, genre_id: PrimaryKey) -> Result<GenreData> {
        self.state
            .lock()
            .genres
            .get(&genre_id)
            .cloned()
            .ok_or(not_found("genre", "id"))
    }

    async fn create_genre(&self, name: &str) -> Result<GenreData> {
        let mut state = self.state.lock();

        if state.genres.values().any(|g| g.name == name) {
            return Err(conflict("genre", "name", name));
        }

        let genre = GenreData {
            id: state.next_id(),
            name: name.to_string(),
        };

        state.genres.insert(genre.id, genre.clone());
        Ok(genre)
    }

    async fn delete_genre(&self, genre_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        state
            .genres
            .remove(&genre_id)
            .ok_or(not_found("genre", "id"))?;

        for track in state.tracks.values_mut() {
            track.genre_ids.retain(|id| *id != genre_id);
        }

        Ok(())
    }

    async fn album_by_id(&self, album_id: PrimaryKey) -> Result<AlbumData> {
        let state = self.state.lock();
        state.reachable("albums")?;

        state
            .albums
            .get(&album_id)
            .cloned()
            .ok_or(not_found("album", "id"))
    }

    async fn list_albums(
        &self,
        user_id: PrimaryKey,
        include_private: bool,
    ) -> Result<Vec<AlbumData>> {
        Ok(self
            .state
            .lock()
            .albums
            .values()
            .filter(|a| a.user_id == user_id && (include_private || !a.private))
            .cloned()
            .collect())
    }

    async fn create_album(&self, new_album: NewAlbum) -> Result<AlbumData> {
        let mut state = self.state.lock();
        state.user(new_album.user_id)?;

        let album = AlbumData {
            id: state.next_id(),
            user_id: new_album.user_id,
            name: new_album.name,
            description: new_album.description,
            private: new_album.private,
            cover: new_album.cover,
        };

        state.albums.insert(album.id, album.clone());
        Ok(album)
    }

    async fn update_album(&self, updated_album: UpdatedAlbum) -> Result<AlbumData> {
        let mut state = self.state.lock();
        let album = state
            .albums
            .get_mut(&updated_album.id)
            .ok_or(not_found("album", "id"))?;

        if let Some(name) = updated_album.name {
            album.name = name;
        }
        if let Some(description) = updated_album.description {
            album.description = description;
        }
        if let Some(private) = updated_album.private {
            album.private = private;
        }
        if let Some(cover) = updated_album.cover {
            album.cover = Some(cover);
        }

        Ok(album.clone())
    }

    async fn delete_album(&self, album_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        if !state.albums.contains_key(&album_id) {
            return Err(not_found("album", "id"));
        }

        state.remove_album(album_id);
        Ok(())
    }

    async fn track_by_id(&self, track_id: PrimaryKey) -> Result<TrackData> {
        self.state.lock().track(track_id)
    }

    async fn list_tracks(
        &self,
        filter: &TrackFilter,
        page: PageRequest,
    ) -> Result<Page<TrackData>> {
        let state = self.state.lock();

        let matching: Vec<_> = state
            .tracks
            .keys()
            .rev()
            .filter_map(|id| state.track(*id).ok())
            .filter(|track| state.matches(track, filter))
            .collect();

        Ok(Page {
            total: matching.len() as i64,
            items: page.slice(&matching),
        })
    }

    async fn create_track(&self, new_track: NewTrack) -> Result<TrackData> {
        let mut state = self.state.lock();
        state.user(new_track.user_id)?;
        state.ensure_genres(&new_track.genre_ids)?;

        if let Some(album_id) = new_track.album_id {
            if !state.albums.contains_key(&album_id) {
                return Err(not_found("album", "id"));
            }
        }

        let id = state.next_id();
        let stored = StoredTrack {
            data: TrackData {
                id,
                user_id: new_track.user_id,
                album_id: new_track.album_id,
                name: new_track.name,
                file: new_track.file,
                cover: new_track.cover,
                private: new_track.private,
                created_at: Utc::now(),
                plays_count: 0,
                downloads_count: 0,
                likes_count: 0,
                genres: vec![],
            },
            genre_ids: new_track.genre_ids,
            liked_by: BTreeSet::new(),
        };

        state.tracks.insert(id, stored);
        state.track(id)
    }

    async fn update_track(&self, updated_track: UpdatedTrack) -> Result<TrackData> {
        let mut state = self.state.lock();

        if let Some(genre_ids) = &updated_track.genre_ids {
            state.ensure_genres(genre_ids)?;
        }

        if let Some(Some(album_id)) = updated_track.album_id {
            if !state.albums.contains_key(&album_id) {
                return Err(not_found("album", "id"));
            }
        }

        let stored = state
            .tracks
            .get_mut(&updated_track.id)
            .ok_or(not_found("track", "id"))?;

        if let Some(name) = updated_track.name {
            stored.data.name = name;
        }
        if let Some(album_id) = updated_track.album_id {
            stored.data.album_id = album_id;
        }
        if let Some(file) = updated_track.file {
            stored.data.file = file;
        }
        if let Some(cover) = updated_track.cover {
            stored.data.cover = Some(cover);
        }
        if let Some(private) = updated_track.private {
            stored.data.private = private;
        }
        if let Some(genre_ids) = updated_track.genre_ids {
            stored.genre_ids = genre_ids;
        }

        state.track(updated_track.id)
    }

    async fn delete_track(&self, track_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        if !state.tracks.contains_key(&track_id) {
            return Err(not_found("track", "id"));
        }

        state.remove_track(track_id);
        Ok(())
    }

    async fn increment_track_counter(
        &self,
        track_id: PrimaryKey,
        counter: TrackCounter,
    ) -> Result<TrackData> {
        let mut state = self.state.lock();
        let stored = state
            .tracks
            .get_mut(&track_id)
            .ok_or(not_found("track", "id"))?;

        match counter {
            TrackCounter::Plays => stored.data.plays_count += 1,
            TrackCounter::Downloads => stored.data.downloads_count += 1,
        }

        state.track(track_id)
    }

    async fn like_track(&self, track_id: PrimaryKey, user_id: PrimaryKey) -> Result<TrackData> {
        let mut state = self.state.lock();
        state.user(user_id)?;

        let stored = state
            .tracks
            .get_mut(&track_id)
            .ok_or(not_found("track", "id"))?;

        if !stored.liked_by.insert(user_id) {
            return Err(conflict(
                "track like",
                "track:user",
                &format!("{}:{}", track_id, user_id),
            ));
        }

        state.track(track_id)
    }

    async fn unlike_track(
        &self,
        track_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<TrackData> {
        let mut state = self.state.lock();
        let stored = state
            .tracks
            .get_mut(&track_id)
            .ok_or(not_found("track", "id"))?;

        if !stored.liked_by.remove(&user_id) {
            return Err(not_found("track like", "track:user"));
        }

        state.track(track_id)
    }

    async fn playlist_by_id(&self, playlist_id: PrimaryKey) -> Result<PlaylistData> {
        self.state.lock().playlist(playlist_id)
    }

    async fn list_playlists(
        &self,
        user_id: PrimaryKey,
        include_private: bool,
    ) -> Result<Vec<PlaylistData>> {
        let state = self.state.lock();

        Ok(state
            .playlists
            .values()
            .filter(|p| p.user_id == user_id && (include_private || !p.private))
            .filter_map(|p| state.playlist(p.id).ok())
            .collect())
    }

    async fn create_playlist(&self, new_playlist: NewPlaylist) -> Result<PlaylistData> {
        let mut state = self.state.lock();
        state.user(new_playlist.user_id)?;
        state.ensure_tracks(&new_playlist.track_ids)?;

        let stored = StoredPlaylist {
            id: state.next_id(),
            user_id: new_playlist.user_id,
            name: new_playlist.name,
            private: new_playlist.private,
            cover: new_playlist.cover,
            track_ids: new_playlist.track_ids,
        };

        let id = stored.id;
        state.playlists.insert(id, stored);
        state.playlist(id)
    }

    async fn update_playlist(&self, updated_playlist: UpdatedPlaylist) -> Result<PlaylistData> {
        let mut state = self.state.lock();

        if let Some(track_ids) = &updated_playlist.track_ids {
            state.ensure_tracks(track_ids)?;
        }

        let stored = state
            .playlists
            .get_mut(&updated_playlist.id)
            .ok_or(not_found("playlist", "id"))?;

        if let Some(name) = updated_playlist.name {
            stored.name = name;
        }
        if let Some(private) = updated_playlist.private {
            stored.private = private;
        }
        if let Some(cover) = updated_playlist.cover {
            stored.cover = Some(cover);
        }
        if let Some(track_ids) = updated_playlist.track_ids {
            stored.track_ids = track_ids;
        }

        state.playlist(updated_playlist.id)
    }

    async fn delete_playlist(&self, playlist_id: PrimaryKey) -> Result<()> {
        self.state
            .lock()
            .playlists
            .remove(&playlist_id)
            .map(|_| ())
            .ok_or(not_found("playlist", "id"))
    }

    async fn comment_by_id(&self, comment_id: PrimaryKey) -> Result<CommentData> {
        self.state
            .lock()
            .comments
            .get(&comment_id)
            .cloned()
            .ok_or(not_found("comment", "id"))
    }

    async fn list_comments_by_track(&self, track_id: PrimaryKey) -> Result<Vec<CommentData>> {
        Ok(self
            .state
            .lock()
            .comments
            .values()
            .filter(|c| c.track_id == track_id)
            .cloned()
            .collect())
    }

    async fn list_comments_by_user(&self, user_id: PrimaryKey) -> Result<Vec<CommentData>> {
        Ok(self
            .state
            .lock()
            .comments
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_comment(&self, new_comment: NewComment) -> Result<CommentData> {
        let mut state = self.state.lock();
        state.user(new_comment.user_id)?;
        state.ensure_tracks(&[new_comment.track_id])?;

        let comment = CommentData {
            id: state.next_id(),
            user_id: new_comment.user_id,
            track_id: new_comment.track_id,
            text: new_comment.text,
            created_at: Utc::now(),
        };

        state.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn update_comment(&self, comment_id: PrimaryKey, text: String) -> Result<CommentData> {
        let mut state = self.state.lock();
        let comment = state
            .comments
            .get_mut(&comment_id)
            .ok_or(not_found("comment", "id"))?;

        comment.text = text;
        Ok(comment.clone())
    }

    async fn delete_comment(&self, comment_id: PrimaryKey) -> Result<()> {
        self.state
            .lock()
            .comments
            .remove(&comment_id)
            .map(|_| ())
            .ok_or(not_found("comment", "id"))
    }

    async fn follow_by_pair(
        &self,
        follower_id: PrimaryKey,
        followee_id: PrimaryKey,
    ) -> Result<FollowData> {
        let state = self.state.lock();
        state.reachable("follows")?;

        state
            .follows
            .values()
            .find(|f| f.follower_id == follower_id && f.followee_id == followee_id)
            .cloned()
            .ok_or(not_found("follow", "follower:followee"))
    }

    async fn create_follow(&self, new_follow: NewFollow) -> Result<FollowData> {
        let mut state = self.state.lock();
        state.user(new_follow.follower_id)?;
        state.user(new_follow.followee_id)?;

        if new_follow.follower_id == new_follow.followee_id {
            return Err(DatabaseError::Internal(
                "follow_not_self constraint violated".into(),
            ));
        }

        let exists = state.follows.values().any(|f| {
            f.follower_id == new_follow.follower_id && f.followee_id == new_follow.followee_id
        });

        if exists {
            return Err(conflict(
                "follow",
                "follower:followee",
                &format!("{}:{}", new_follow.follower_id, new_follow.followee_id),
            ));
        }

        let follow = FollowData {
            id: state.next_id(),
            follower_id: new_follow.follower_id,
            followee_id: new_follow.followee_id,
            created_at: Utc::now().date_naive(),
        };

        state.follows.insert(follow.id, follow.clone());
        Ok(follow)
    }

    async fn delete_follow(&self, follower_id: PrimaryKey, followee_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        let id = state
            .follows
            .values()
            .find(|f| f.follower_id == follower_id && f.followee_id == followee_id)
            .map(|f| f.id)
            .ok_or(not_found("follow", "follower:followee"))?;

        state.follows.remove(&id);
        Ok(())
    }

    async fn list_following(&self, user_id: PrimaryKey) -> Result<Vec<UserData>> {
        let state = self.state.lock();
        let ids = state
            .follows
            .values()
            .filter(|f| f.follower_id == user_id)
            .map(|f| f.followee_id);

        Ok(state.users_by_ids(ids))
    }

    async fn list_followers(&self, user_id: PrimaryKey) -> Result<Vec<UserData>> {
        let state = self.state.lock();
        let ids = state
            .follows
            .values()
            .filter(|f| f.followee_id == user_id)
            .map(|f| f.follower_id);

        Ok(state.users_by_ids(ids))
    }
}
