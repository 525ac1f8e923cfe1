use log::info;
use soundhub_core::{AssetKind, UploadedFile};

use crate::{
    ensure_owner, is_visible, tracks::ensure_track_visible, util::dedup_ids, CatalogContext,
    CatalogError, CatalogResult, NewPlaylist, PlaylistData, PrimaryKey, UpdatedPlaylist,
    UserData,
};

#[derive(Debug)]
pub struct PlaylistForm {
    pub name: String,
    pub private: bool,
    pub cover: Option<UploadedFile>,
    /// Tracks in playlist order
    pub track_ids: Vec<PrimaryKey>,
}

/// Changes to a playlist. Fields left as [None] are kept.
#[derive(Debug, Default)]
pub struct PlaylistChanges {
    pub name: Option<String>,
    pub private: Option<bool>,
    pub cover: Option<UploadedFile>,
    pub track_ids: Option<Vec<PrimaryKey>>,
}

pub struct Playlists {
    context: CatalogContext,
}

impl Playlists {
    pub fn new(context: &CatalogContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn list_own(&self, requester: &UserData) -> CatalogResult<Vec<PlaylistData>> {
        Ok(self
            .context
            .database
            .list_playlists(requester.id, true)
            .await?)
    }

    pub async fn get(
        &self,
        playlist_id: PrimaryKey,
        requester: Option<&UserData>,
    ) -> CatalogResult<PlaylistData> {
        let mut playlist = self.context.database.playlist_by_id(playlist_id).await?;

        if !is_visible(playlist.user_id, playlist.private, requester) {
            return Err(CatalogError::not_found("playlist", "id"));
        }

        // Tracks that turned private since they were added are left out
        let mut visible = Vec::with_capacity(playlist.tracks.len());
        for track in playlist.tracks {
            match ensure_track_visible(&self.context, &track, requester).await {
                Ok(()) => visible.push(track),
                Err(CatalogError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        playlist.tracks = visible;

        Ok(playlist)
    }

    pub async fn create(
        &self,
        requester: &UserData,
        form: PlaylistForm,
    ) -> CatalogResult<PlaylistData> {
        let files = &self.context.files;

        if let Some(cover) = &form.cover {
            files.validate(AssetKind::PlaylistCover, cover)?;
        }

        let track_ids = dedup_ids(form.track_ids);
        self.ensure_tracks_visible(requester, &track_ids).await?;

        let cover = match &form.cover {
            Some(cover) => Some(
                files
                    .store(
                        AssetKind::PlaylistCover,
                        &requester.username,
                        Some(form.name.as_str()),
                        cover,
                    )
                    .await?,
            ),
            None => None,
        };

        let result = self
            .context
            .database
            .create_playlist(NewPlaylist {
                user_id: requester.id,
                name: form.name,
                private: form.private,
                cover: cover.clone(),
                track_ids,
            })
            .await;

        match result {
            Ok(playlist) => {
                info!("Playlist {} created by {}", playlist.id, requester.username);
                Ok(playlist)
            }
            Err(e) => {
                files.discard(cover.as_deref(), None).await;
                Err(e.into())
            }
        }
    }

    pub async fn update(
        &self,
        requester: &UserData,
        playlist_id: PrimaryKey,
        changes: PlaylistChanges,
    ) -> CatalogResult<PlaylistData> {
        let files = &self.context.files;
        let playlist = self.get(playlist_id, Some(requester)).await?;
        ensure_owner(playlist.user_id, requester, "Only the owner can change this playlist")?;

        if let Some(cover) = &changes.cover {
            files.validate(AssetKind::PlaylistCover, cover)?;
        }

        let track_ids = changes.track_ids.map(dedup_ids);
        if let Some(track_ids) = &track_ids {
            self.ensure_tracks_visible(requester, track_ids).await?;
        }

        let name = changes.name.as_deref().unwrap_or(&playlist.name);
        let new_cover = match &changes.cover {
            Some(cover) => Some(
                files
                    .store(AssetKind::PlaylistCover, &requester.username, Some(name), cover)
                    .await?,
            ),
            None => None,
        };

        let result = self
            .context
            .database
            .update_playlist(UpdatedPlaylist {
                id: playlist.id,
                name: changes.name,
                private: changes.private,
                cover: new_cover.clone(),
                track_ids,
            })
            .await;

        match result {
            Ok(updated) => {
                files
                    .reclaim_replaced(playlist.cover.as_deref(), new_cover.as_deref())
                    .await;
                Ok(updated)
            }
            Err(e) => {
                files
                    .discard(new_cover.as_deref(), playlist.cover.as_deref())
                    .await;
                Err(e.into())
            }
        }
    }

    pub async fn delete(&self, requester: &UserData, playlist_id: PrimaryKey) -> CatalogResult<()> {
        let playlist = self.get(playlist_id, Some(requester)).await?;
        ensure_owner(playlist.user_id, requester, "Only the owner can delete this playlist")?;

        self.context.database.delete_playlist(playlist.id).await?;

        if let Some(cover) = &playlist.cover {
            self.context.files.reclaim(cover).await;
        }

        Ok(())
    }

    async fn ensure_tracks_visible(
        &self,
        requester: &UserData,
        track_ids: &[PrimaryKey],
    ) -> CatalogResult<()> {
        for track_id in track_ids {
            let track = self.context.database.track_by_id(*track_id).await?;
            ensure_track_visible(&self.context, &track, Some(requester)).await?;
        }

        Ok(())
    }
}
