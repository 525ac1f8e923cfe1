use log::info;
use soundhub_core::{AssetKind, UploadedFile};

use crate::{
    ensure_owner, is_visible, util::dedup_ids, CatalogContext, CatalogError, CatalogResult,
    NewTrack, Page, PageRequest, PrimaryKey, TrackData, TrackFilter, UpdatedTrack, UserData,
};

#[derive(Debug)]
pub struct TrackForm {
    pub name: String,
    pub album_id: Option<PrimaryKey>,
    pub genre_ids: Vec<PrimaryKey>,
    pub private: bool,
    /// The audio itself
    pub file: UploadedFile,
    pub cover: Option<UploadedFile>,
}

/// Changes to a track. Fields left as [None] are kept.
#[derive(Debug, Default)]
pub struct TrackChanges {
    pub name: Option<String>,
    /// `Some(None)` takes the track out of its album
    pub album_id: Option<Option<PrimaryKey>>,
    pub genre_ids: Option<Vec<PrimaryKey>>,
    pub private: Option<bool>,
    pub file: Option<UploadedFile>,
    pub cover: Option<UploadedFile>,
}

pub struct Tracks {
    context: CatalogContext,
}

/// Fails with not found unless the requester may see the track.
/// A track is hidden when it, or the album it is in, is private.
pub(crate) async fn ensure_track_visible(
    context: &CatalogContext,
    track: &TrackData,
    requester: Option<&UserData>,
) -> CatalogResult<()> {
    if !is_visible(track.user_id, track.private, requester) {
        return Err(CatalogError::not_found("track", "id"));
    }

    if let Some(album_id) = track.album_id {
        let album = context.database.album_by_id(album_id).await?;

        if !is_visible(album.user_id, album.private, requester) {
            return Err(CatalogError::not_found("track", "id"));
        }
    }

    Ok(())
}

impl Tracks {
    pub fn new(context: &CatalogContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// The requester's own tracks, private ones included
    pub async fn list_own(
        &self,
        requester: &UserData,
        filter: TrackFilter,
        page: PageRequest,
    ) -> CatalogResult<Page<TrackData>> {
        let filter = TrackFilter {
            user_id: Some(requester.id),
            public_only: false,
            ..filter
        };

        Ok(self.context.database.list_tracks(&filter, page).await?)
    }

    /// Every public track
    pub async fn list_public(
        &self,
        filter: TrackFilter,
        page: PageRequest,
    ) -> CatalogResult<Page<TrackData>> {
        let filter = TrackFilter {
            user_id: None,
            public_only: true,
            ..filter
        };

        Ok(self.context.database.list_tracks(&filter, page).await?)
    }

    /// The public tracks of an author
    pub async fn list_by_author(
        &self,
        user_id: PrimaryKey,
        filter: TrackFilter,
        page: PageRequest,
    ) -> CatalogResult<Page<TrackData>> {
        let db = &self.context.database;
        let author = db.user_by_id(user_id).await?;

        let filter = TrackFilter {
            user_id: Some(author.id),
            public_only: true,
            ..filter
        };

        Ok(db.list_tracks(&filter, page).await?)
    }

    pub async fn get(
        &self,
        track_id: PrimaryKey,
        requester: Option<&UserData>,
    ) -> CatalogResult<TrackData> {
        let track = self.context.database.track_by_id(track_id).await?;
        ensure_track_visible(&self.context, &track, requester).await?;

        Ok(track)
    }

    pub async fn create(&self, requester: &UserData, form: TrackForm) -> CatalogResult<TrackData> {
        let files = &self.context.files;

        files.validate(AssetKind::TrackAudio, &form.file)?;
        if let Some(cover) = &form.cover {
            files.validate(AssetKind::TrackCover, cover)?;
        }

        if let Some(album_id) = form.album_id {
            self.ensure_own_album(requester, album_id).await?;
        }

        let file = files
            .store(
                AssetKind::TrackAudio,
                &requester.username,
                Some(form.name.as_str()),
                &form.file,
            )
            .await?;

        let cover = match &form.cover {
            Some(cover) => {
                let stored = files
                    .store(
                        AssetKind::TrackCover,
                        &requester.username,
                        Some(form.name.as_str()),
                        cover,
                    )
                    .await;

                match stored {
                    Ok(path) => Some(path),
                    Err(e) => {
                        files.discard(Some(file.as_str()), None).await;
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        let result = self
            .context
            .database
            .create_track(NewTrack {
                user_id: requester.id,
                album_id: form.album_id,
                name: form.name,
                file: file.clone(),
                cover: cover.clone(),
                private: form.private,
                genre_ids: dedup_ids(form.genre_ids),
            })
            .await;

        match result {
            Ok(track) => {
                info!("Track {} uploaded by {}", track.id, requester.username);
                Ok(track)
            }
            Err(e) => {
                files.discard(Some(file.as_str()), None).await;
                files.discard(cover.as_deref(), None).await;
                Err(e.into())
            }
        }
    }

    pub async fn update(
        &self,
        requester: &UserData,
        track_id: PrimaryKey,
        changes: TrackChanges,
    ) -> CatalogResult<TrackData> {
        let files = &self.context.files;
        let track = self.get(track_id, Some(requester)).await?;
        ensure_owner(track.user_id, requester, "Only the owner can change this track")?;

        if let Some(file) = &changes.file {
            files.validate(AssetKind::TrackAudio, file)?;
        }
        if let Some(cover) = &changes.cover {
            files.validate(AssetKind::TrackCover, cover)?;
        }

        if let Some(Some(album_id)) = changes.album_id {
            self.ensure_own_album(requester, album_id).await?;
        }

        let name = changes.name.clone().unwrap_or_else(|| track.name.clone());

        let new_file = match &changes.file {
            Some(file) => Some(
                files
                    .store(AssetKind::TrackAudio, &requester.username, Some(name.as_str()), file)
                    .await?,
            ),
            None => None,
        };

        let new_cover = match &changes.cover {
            Some(cover) => {
                let stored = files
                    .store(AssetKind::TrackCover, &requester.username, Some(name.as_str()), cover)
                    .await;

                match stored {
                    Ok(path) => Some(path),
                    Err(e) => {
                        files.discard(new_file.as_deref(), Some(track.file.as_str())).await;
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        let result = self
            .context
            .database
            .update_track(UpdatedTrack {
                id: track.id,
                name: changes.name,
                album_id: changes.album_id,
                file: new_file.clone(),
                cover: new_cover.clone(),
                private: changes.private,
                genre_ids: changes.genre_ids.map(dedup_ids),
            })
            .await;

        match result {
            Ok(updated) => {
                files
                    .reclaim_replaced(Some(track.file.as_str()), new_file.as_deref())
                    .await;
                files
                    .reclaim_replaced(track.cover.as_deref(), new_cover.as_deref())
                    .await;
                Ok(updated)
            }
            Err(e) => {
                files.discard(new_file.as_deref(), Some(track.file.as_str())).await;
                files
                    .discard(new_cover.as_deref(), track.cover.as_deref())
                    .await;
                Err(e.into())
            }
        }
    }

    /// Deletes a track along with its audio and cover
    pub async fn delete(&self, requester: &UserData, track_id: PrimaryKey) -> CatalogResult<()> {
        let track = self.get(track_id, Some(requester)).await?;
        ensure_owner(track.user_id, requester, "Only the owner can delete this track")?;

        self.context.database.delete_track(track.id).await?;

        let files = &self.context.files;
        files.reclaim(&track.file).await;
        if let Some(cover) = &track.cover {
            files.reclaim(cover).await;
        }

        Ok(())
    }

    pub async fn like(
        &self,
        requester: &UserData,
        track_id: PrimaryKey,
    ) -> CatalogResult<TrackData> {
        let track = self.get(track_id, Some(requester)).await?;
        Ok(self.context.database.like_track(track.id, requester.id).await?)
    }

    pub async fn unlike(
        &self,
        requester: &UserData,
        track_id: PrimaryKey,
    ) -> CatalogResult<TrackData> {
        let track = self.get(track_id, Some(requester)).await?;
        Ok(self.context.database.unlike_track(track.id, requester.id).await?)
    }

    async fn ensure_own_album(
        &self,
        requester: &UserData,
        album_id: PrimaryKey,
    ) -> CatalogResult<()> {
        let album = self.context.database.album_by_id(album_id).await?;
        ensure_owner(album.user_id, requester, "Tracks can only be added to your own albums")
    }
}
