use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    migrate::Migrator, postgres::PgPoolOptions, query, query_as, query_scalar, Error as SqlxError,
    FromRow, PgPool, Postgres, QueryBuilder,
};

use crate::{
    AlbumData, CommentData, Database, DatabaseError, DatabaseResult, FollowData, GenreData,
    IntoDatabaseError, NewAlbum, NewComment, NewFollow, NewPlaylist, NewSession, NewTrack,
    NewUser, Page, PageRequest, PlaylistData, PrimaryKey, Result, SessionData, TrackCounter,
    TrackData, TrackFilter, UpdatedAlbum, UpdatedPlaylist, UpdatedTrack, UpdatedUser, UserData,
};

const INSERT_PLAYLIST_TRACK: &str =
    "INSERT INTO playlist_tracks (playlist_id, track_id, position) VALUES ($1, $2, $3)";

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// A postgres database implementation for soundhub
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct SessionRow {
    id: PrimaryKey,
    token: String,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct TrackRow {
    id: PrimaryKey,
    user_id: PrimaryKey,
    album_id: Option<PrimaryKey>,
    name: String,
    file: String,
    cover: Option<String>,
    private: bool,
    created_at: DateTime<Utc>,
    plays_count: i64,
    downloads_count: i64,
    likes_count: i64,
}

#[derive(FromRow)]
struct PlaylistRow {
    id: PrimaryKey,
    user_id: PrimaryKey,
    name: String,
    private: bool,
    cover: Option<String>,
}

impl TrackRow {
    fn with_genres(self, genres: Vec<GenreData>) -> TrackData {
        TrackData {
            id: self.id,
            user_id: self.user_id,
            album_id: self.album_id,
            name: self.name,
            file: self.file,
            cover: self.cover,
            private: self.private,
            created_at: self.created_at,
            plays_count: self.plays_count,
            downloads_count: self.downloads_count,
            likes_count: self.likes_count,
            genres,
        }
    }
}

const TRACK_LISTING_FROM: &str = "
    FROM tracks
        INNER JOIN users ON users.id = tracks.user_id
        LEFT JOIN albums ON albums.id = tracks.album_id
    WHERE TRUE";

fn push_track_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &TrackFilter) {
    if let Some(user_id) = filter.user_id {
        builder.push(" AND tracks.user_id = ").push_bind(user_id);
    }

    if filter.public_only {
        builder.push(
            " AND tracks.private = FALSE AND (albums.id IS NULL OR albums.private = FALSE)",
        );
    }

    if let Some(name) = &filter.name {
        builder.push(" AND tracks.name = ").push_bind(name.clone());
    }

    if let Some(username) = &filter.username {
        builder.push(" AND users.username = ").push_bind(username.clone());
    }

    if let Some(album) = &filter.album {
        builder.push(" AND albums.name = ").push_bind(album.clone());
    }

    if let Some(genre) = &filter.genre {
        builder
            .push(
                " AND EXISTS (
                    SELECT 1 FROM track_genres
                        INNER JOIN genres ON genres.id = track_genres.genre_id
                    WHERE track_genres.track_id = tracks.id AND genres.name = ",
            )
            .push_bind(genre.clone())
            .push(")");
    }
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        Ok(Self { pool })
    }

    /// Brings the schema up to date
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))
    }

    async fn track_genres(&self, track_id: PrimaryKey) -> Result<Vec<GenreData>> {
        query_as::<_, GenreData>(
            "SELECT genres.*
            FROM genres
                INNER JOIN track_genres ON track_genres.genre_id = genres.id
            WHERE track_genres.track_id = $1
            ORDER BY genres.name",
        )
        .bind(track_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn complete_tracks(&self, rows: Vec<TrackRow>) -> Result<Vec<TrackData>> {
        let mut tracks = Vec::with_capacity(rows.len());

        for row in rows {
            let genres = self.track_genres(row.id).await?;
            tracks.push(row.with_genres(genres));
        }

        Ok(tracks)
    }

    async fn complete_playlist(&self, row: PlaylistRow) -> Result<PlaylistData> {
        let rows = query_as::<_, TrackRow>(
            "SELECT tracks.*
            FROM tracks
                INNER JOIN playlist_tracks ON playlist_tracks.track_id = tracks.id
            WHERE playlist_tracks.playlist_id = $1
            ORDER BY playlist_tracks.position",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(PlaylistData {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            private: row.private,
            cover: row.cover,
            tracks: self.complete_tracks(rows).await?,
        })
    }

    async fn ensure_genres(&self, genre_ids: &[PrimaryKey]) -> Result<()> {
        let unique: BTreeSet<_> = genre_ids.iter().copied().collect();

        let found: i64 = query_scalar("SELECT COUNT(*) FROM genres WHERE id = ANY($1)")
            .bind(unique.iter().copied().collect::<Vec<_>>())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())?;

        match found == unique.len() as i64 {
            true => Ok(()),
            false => Err(DatabaseError::NotFound {
                resource: "genre",
                identifier: "id",
            }),
        }
    }

    async fn ensure_tracks(&self, track_ids: &[PrimaryKey]) -> Result<()> {
        let unique: BTreeSet<_> = track_ids.iter().copied().collect();

        let found: i64 = query_scalar("SELECT COUNT(*) FROM tracks WHERE id = ANY($1)")
            .bind(unique.iter().copied().collect::<Vec<_>>())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())?;

        match found == unique.len() as i64 {
            true => Ok(()),
            false => Err(DatabaseError::NotFound {
                resource: "track",
                identifier: "id",
            }),
        }
    }

    async fn users_through_follows(
        &self,
        sql: &'static str,
        user_id: PrimaryKey,
    ) -> Result<Vec<UserData>> {
        query_as::<_, UserData>(sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn check_for_superuser(&self) -> Result<bool> {
        query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE superuser = TRUE)")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserData>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        query_as::<_, UserData>("SELECT * FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "email"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        query_as::<_, UserData>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "username"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_email(&new_user.email)
            .await
            .conflict_or_ok("user", "email", &new_user.email)?;

        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;

        query_as::<_, UserData>(
            "INSERT INTO users (email, username, password, superuser)
            VALUES ($1, $2, $3, $4)
            RETURNING *",
        )
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.password)
        .bind(new_user.superuser)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.conflict_or("user", "username", &new_user.username))
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        query_as::<_, UserData>(
            "UPDATE users SET
                country = COALESCE($1, country),
                city = COALESCE($2, city),
                bio = COALESCE($3, bio),
                avatar = COALESCE($4, avatar)
            WHERE id = $5
            RETURNING *",
        )
        .bind(updated_user.country)
        .bind(updated_user.city)
        .bind(updated_user.bio)
        .bind(updated_user.avatar)
        .bind(updated_user.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()> {
        // Ensure user exists
        let _ = self.user_by_id(user_id).await?;

        // Likes on other users' tracks disappear with the user
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query(
            "UPDATE tracks SET likes_count = likes_count - 1
            WHERE id IN (SELECT track_id FROM track_likes WHERE user_id = $1)",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row = query_as::<_, SessionRow>("SELECT * FROM sessions WHERE token = $1")
            .bind(token)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("session", "token"))?;

        Ok(SessionData {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: self.user_by_id(row.user_id).await?,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let user = self.user_by_id(new_session.user_id).await?;

        let row = query_as::<_, SessionRow>(
            "INSERT INTO sessions (token, user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING *",
        )
        .bind(&new_session.token)
        .bind(new_session.user_id)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.conflict_or("session", "token", &new_session.token))?;

        Ok(SessionData {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user,
        })
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let result = query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        match result.rows_affected() {
            0 => Err(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            }),
            _ => Ok(()),
        }
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        query("DELETE FROM sessions WHERE expires_at <= now()")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn list_genres(&self) -> Result<Vec<GenreData>> {
        query_as::<_, GenreData>("SELECT * FROM genres ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn genre_by_id(&self, genre_id: PrimaryKey) -> Result<GenreData> {
        query_as::<_, GenreData>("SELECT * FROM genres WHERE id = $1")
            .bind(genre_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("genre", "id"))
    }

    async fn create_genre(&self, name: &str) -> Result<GenreData> {
        query_as::<_, GenreData>("INSERT INTO genres (name) VALUES ($1) RETURNING *")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.conflict_or("genre", "name", name))
    }

    async fn delete_genre(&self, genre_id: PrimaryKey) -> Result<()> {
        let _ = self.genre_by_id(genre_id).await?;

        query("DELETE FROM genres WHERE id = $1")
            .bind(genre_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn album_by_id(&self, album_id: PrimaryKey) -> Result<AlbumData> {
        query_as::<_, AlbumData>("SELECT * FROM albums WHERE id = $1")
            .bind(album_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("album", "id"))
    }

    async fn list_albums(
        &self,
        user_id: PrimaryKey,
        include_private: bool,
    ) -> Result<Vec<AlbumData>> {
        query_as::<_, AlbumData>(
            "SELECT * FROM albums
            WHERE user_id = $1 AND ($2 OR private = FALSE)
            ORDER BY id",
        )
        .bind(user_id)
        .bind(include_private)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn create_album(&self, new_album: NewAlbum) -> Result<AlbumData> {
        let _ = self.user_by_id(new_album.user_id).await?;

        query_as::<_, AlbumData>(
            "INSERT INTO albums (user_id, name, description, private, cover)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *",
        )
        .bind(new_album.user_id)
        .bind(new_album.name)
        .bind(new_album.description)
        .bind(new_album.private)
        .bind(new_album.cover)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn update_album(&self, updated_album: UpdatedAlbum) -> Result<AlbumData> {
        query_as::<_, AlbumData>(
            "UPDATE albums SET
                name = COALESCE($1, name),
                description = COALESCE($2, description),
                private = COALESCE($3, private),
                cover = COALESCE($4, cover)
            WHERE id = $5
            RETURNING *",
        )
        .bind(updated_album.name)
        .bind(updated_album.description)
        .bind(updated_album.private)
        .bind(updated_album.cover)
        .bind(updated_album.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("album", "id"))
    }

    async fn delete_album(&self, album_id: PrimaryKey) -> Result<()> {
        let _ = self.album_by_id(album_id).await?;

        query("DELETE FROM albums WHERE id = $1")
            .bind(album_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn track_by_id(&self, track_id: PrimaryKey) -> Result<TrackData> {
        let row = query_as::<_, TrackRow>("SELECT * FROM tracks WHERE id = $1")
            .bind(track_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("track", "id"))?;

        let genres = self.track_genres(row.id).await?;
        Ok(row.with_genres(genres))
    }

    async fn list_tracks(
        &self,
        filter: &TrackFilter,
        page: PageRequest,
    ) -> Result<Page<TrackData>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*)");
        count.push(TRACK_LISTING_FROM);
        push_track_filter(&mut count, filter);

        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())?;

        let mut select = QueryBuilder::new("SELECT tracks.*");
        select.push(TRACK_LISTING_FROM);
        push_track_filter(&mut select, filter);
        select
            .push(" ORDER BY tracks.id DESC OFFSET ")
            .push_bind(page.offset)
            .push(" LIMIT ")
            .push_bind(page.limit);

        let rows = select
            .build_query_as::<TrackRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(Page {
            items: self.complete_tracks(rows).await?,
            total,
        })
    }

    async fn create_track(&self, new_track: NewTrack) -> Result<TrackData> {
        let _ = self.user_by_id(new_track.user_id).await?;
        self.ensure_genres(&new_track.genre_ids).await?;

        if let Some(album_id) = new_track.album_id {
            let _ = self.album_by_id(album_id).await?;
        }

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let track_id: PrimaryKey = query_scalar(
            "INSERT INTO tracks (user_id, album_id, name, file, cover, private)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id",
        )
        .bind(new_track.user_id)
        .bind(new_track.album_id)
        .bind(new_track.name)
        .bind(new_track.file)
        .bind(new_track.cover)
        .bind(new_track.private)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        query(
            "INSERT INTO track_genres (track_id, genre_id)
            SELECT $1, genre_id FROM UNNEST($2::INTEGER[]) AS genre_id
            ON CONFLICT DO NOTHING",
        )
        .bind(track_id)
        .bind(new_track.genre_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;
        self.track_by_id(track_id).await
    }

    async fn update_track(&self, updated_track: UpdatedTrack) -> Result<TrackData> {
        let _ = self.track_by_id(updated_track.id).await?;

        if let Some(genre_ids) = &updated_track.genre_ids {
            self.ensure_genres(genre_ids).await?;
        }

        if let Some(Some(album_id)) = updated_track.album_id {
            let _ = self.album_by_id(album_id).await?;
        }

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query(
            "UPDATE tracks SET
                name = COALESCE($1, name),
                album_id = CASE WHEN $2 THEN $3 ELSE album_id END,
                file = COALESCE($4, file),
                cover = COALESCE($5, cover),
                private = COALESCE($6, private)
            WHERE id = $7",
        )
        .bind(updated_track.name)
        .bind(updated_track.album_id.is_some())
        .bind(updated_track.album_id.flatten())
        .bind(updated_track.file)
        .bind(updated_track.cover)
        .bind(updated_track.private)
        .bind(updated_track.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        if let Some(genre_ids) = updated_track.genre_ids {
            query("DELETE FROM track_genres WHERE track_id = $1")
                .bind(updated_track.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;

            query(
                "INSERT INTO track_genres (track_id, genre_id)
                SELECT $1, genre_id FROM UNNEST($2::INTEGER[]) AS genre_id
                ON CONFLICT DO NOTHING",
            )
            .bind(updated_track.id)
            .bind(genre_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;
        }

        tx.commit().await.map_err(|e| e.any())?;
        self.track_by_id(updated_track.id).await
    }

    async fn delete_track(&self, track_id: PrimaryKey) -> Result<()> {
        let result = query("DELETE FROM tracks WHERE id = $1")
            .bind(track_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        match result.rows_affected() {
            0 => Err(DatabaseError::NotFound {
                resource: "track",
                identifier: "id",
            }),
            _ => Ok(()),
        }
    }

    async fn increment_track_counter(
        &self,
        track_id: PrimaryKey,
        counter: TrackCounter,
    ) -> Result<TrackData> {
        let sql = match counter {
            TrackCounter::Plays => "UPDATE tracks SET plays_count = plays_count + 1 WHERE id = $1",
            TrackCounter::Downloads => {
                "UPDATE tracks SET downloads_count = downloads_count + 1 WHERE id = $1"
            }
        };

        let result = query(sql)
            .bind(track_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "track",
                identifier: "id",
            });
        }

        self.track_by_id(track_id).await
    }

    async fn like_track(&self, track_id: PrimaryKey, user_id: PrimaryKey) -> Result<TrackData> {
        let _ = self.track_by_id(track_id).await?;
        let _ = self.user_by_id(user_id).await?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query("INSERT INTO track_likes (track_id, user_id) VALUES ($1, $2)")
            .bind(track_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                e.conflict_or("track like", "track:user", &format!("{}:{}", track_id, user_id))
            })?;

        query("UPDATE tracks SET likes_count = likes_count + 1 WHERE id = $1")
            .bind(track_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;
        self.track_by_id(track_id).await
    }

    async fn unlike_track(
        &self,
        track_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<TrackData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let result = query("DELETE FROM track_likes WHERE track_id = $1 AND user_id = $2")
            .bind(track_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "track like",
                identifier: "track:user",
            });
        }

        query("UPDATE tracks SET likes_count = likes_count - 1 WHERE id = $1")
            .bind(track_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;
        self.track_by_id(track_id).await
    }

    async fn playlist_by_id(&self, playlist_id: PrimaryKey) -> Result<PlaylistData> {
        let row = query_as::<_, PlaylistRow>("SELECT * FROM playlists WHERE id = $1")
            .bind(playlist_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("playlist", "id"))?;

        self.complete_playlist(row).await
    }

    async fn list_playlists(
        &self,
        user_id: PrimaryKey,
        include_private: bool,
    ) -> Result<Vec<PlaylistData>> {
        let rows = query_as::<_, PlaylistRow>(
            "SELECT * FROM playlists
            WHERE user_id = $1 AND ($2 OR private = FALSE)
            ORDER BY id",
        )
        .bind(user_id)
        .bind(include_private)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let mut playlists = Vec::with_capacity(rows.len());
        for row in rows {
            playlists.push(self.complete_playlist(row).await?);
        }

        Ok(playlists)
    }

    async fn create_playlist(&self, new_playlist: NewPlaylist) -> Result<PlaylistData> {
        let _ = self.user_by_id(new_playlist.user_id).await?;
        self.ensure_tracks(&new_playlist.track_ids).await?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let playlist_id: PrimaryKey = query_scalar(
            "INSERT INTO playlists (user_id, name, private, cover)
            VALUES ($1, $2, $3, $4)
            RETURNING id",
        )
        .bind(new_playlist.user_id)
        .bind(new_playlist.name)
        .bind(new_playlist.private)
        .bind(new_playlist.cover)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        for (position, track_id) in new_playlist.track_ids.into_iter().enumerate() {
            query(INSERT_PLAYLIST_TRACK)
                .bind(playlist_id)
                .bind(track_id)
                .bind(position as i32)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;
        }

        tx.commit().await.map_err(|e| e.any())?;
        self.playlist_by_id(playlist_id).await
    }

    async fn update_playlist(&self, updated_playlist: UpdatedPlaylist) -> Result<PlaylistData> {
        let _ = self.playlist_by_id(updated_playlist.id).await?;

        if let Some(track_ids) = &updated_playlist.track_ids {
            self.ensure_tracks(track_ids).await?;
        }

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query(
            "UPDATE playlists SET
                name = COALESCE($1, name),
                private = COALESCE($2, private),
                cover = COALESCE($3, cover)
            WHERE id = $4",
        )
        .bind(updated_playlist.name)
        .bind(updated_playlist.private)
        .bind(updated_playlist.cover)
        .bind(updated_playlist.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        if let Some(track_ids) = updated_playlist.track_ids {
            query("DELETE FROM playlist_tracks WHERE playlist_id = $1")
                .bind(updated_playlist.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;

            for (position, track_id) in track_ids.into_iter().enumerate() {
                query(INSERT_PLAYLIST_TRACK)
                    .bind(updated_playlist.id)
                    .bind(track_id)
                    .bind(position as i32)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| e.any())?;
            }
        }

        tx.commit().await.map_err(|e| e.any())?;
        self.playlist_by_id(updated_playlist.id).await
    }

    async fn delete_playlist(&self, playlist_id: PrimaryKey) -> Result<()> {
        let result = query("DELETE FROM playlists WHERE id = $1")
            .bind(playlist_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        match result.rows_affected() {
            0 => Err(DatabaseError::NotFound {
                resource: "playlist",
                identifier: "id",
            }),
            _ => Ok(()),
        }
    }

    async fn comment_by_id(&self, comment_id: PrimaryKey) -> Result<CommentData> {
        query_as::<_, CommentData>("SELECT * FROM comments WHERE id = $1")
            .bind(comment_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("comment", "id"))
    }

    async fn list_comments_by_track(&self, track_id: PrimaryKey) -> Result<Vec<CommentData>> {
        query_as::<_, CommentData>("SELECT * FROM comments WHERE track_id = $1 ORDER BY id")
            .bind(track_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn list_comments_by_user(&self, user_id: PrimaryKey) -> Result<Vec<CommentData>> {
        query_as::<_, CommentData>("SELECT * FROM comments WHERE user_id = $1 ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn create_comment(&self, new_comment: NewComment) -> Result<CommentData> {
        let _ = self.user_by_id(new_comment.user_id).await?;
        let _ = self.track_by_id(new_comment.track_id).await?;

        query_as::<_, CommentData>(
            "INSERT INTO comments (user_id, track_id, text)
            VALUES ($1, $2, $3)
            RETURNING *",
        )
        .bind(new_comment.user_id)
        .bind(new_comment.track_id)
        .bind(new_comment.text)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn update_comment(&self, comment_id: PrimaryKey, text: String) -> Result<CommentData> {
        query_as::<_, CommentData>("UPDATE comments SET text = $1 WHERE id = $2 RETURNING *")
            .bind(text)
            .bind(comment_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("comment", "id"))
    }

    async fn delete_comment(&self, comment_id: PrimaryKey) -> Result<()> {
        let result = query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        match result.rows_affected() {
            0 => Err(DatabaseError::NotFound {
                resource: "comment",
                identifier: "id",
            }),
            _ => Ok(()),
        }
    }

    async fn follow_by_pair(
        &self,
        follower_id: PrimaryKey,
        followee_id: PrimaryKey,
    ) -> Result<FollowData> {
        query_as::<_, FollowData>(
            "SELECT * FROM follows WHERE follower_id = $1 AND followee_id = $2",
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("follow", "follower:followee"))
    }

    async fn create_follow(&self, new_follow: NewFollow) -> Result<FollowData> {
        let _ = self.user_by_id(new_follow.follower_id).await?;
        let _ = self.user_by_id(new_follow.followee_id).await?;

        let pair = format!("{}:{}", new_follow.follower_id, new_follow.followee_id);

        self.follow_by_pair(new_follow.follower_id, new_follow.followee_id)
            .await
            .conflict_or_ok("follow", "follower:followee", &pair)?;

        query_as::<_, FollowData>(
            "INSERT INTO follows (follower_id, followee_id)
            VALUES ($1, $2)
            RETURNING *",
        )
        .bind(new_follow.follower_id)
        .bind(new_follow.followee_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.conflict_or("follow", "follower:followee", &pair))
    }

    async fn delete_follow(&self, follower_id: PrimaryKey, followee_id: PrimaryKey) -> Result<()> {
        let result = query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(follower_id)
            .bind(followee_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        match result.rows_affected() {
            0 => Err(DatabaseError::NotFound {
                resource: "follow",
                identifier: "follower:followee",
            }),
            _ => Ok(()),
        }
    }

    async fn list_following(&self, user_id: PrimaryKey) -> Result<Vec<UserData>> {
        self.users_through_follows(
            "SELECT users.*
            FROM users
                INNER JOIN follows ON follows.followee_id = users.id
            WHERE follows.follower_id = $1
            ORDER BY follows.id",
            user_id,
        )
        .await
    }

    async fn list_followers(&self, user_id: PrimaryKey) -> Result<Vec<UserData>> {
        self.users_through_follows(
            "SELECT users.*
            FROM users
                INNER JOIN follows ON follows.follower_id = users.id
            WHERE follows.followee_id = $1
            ORDER BY follows.id",
            user_id,
        )
        .await
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }

    fn conflict_or(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> DatabaseError {
        match self {
            SqlxError::Database(ref e) if e.is_unique_violation() => DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            },
            e => Self::any(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn emails_are_unique_regardless_of_case() {
        assert!(MIGRATOR
            .iter()
            .any(|m| m.sql.contains("UNIQUE INDEX users_email_lower ON users (lower(email))")));
    }
}
