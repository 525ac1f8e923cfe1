use log::{info, warn};
use soundhub_core::{file_name, ByteRange, StoredBytes};

use crate::{
    tracks::ensure_track_visible, CatalogContext, CatalogError, CatalogResult, PrimaryKey,
    TrackCounter, TrackData, UserData,
};

/// How a track is handed to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Played inline
    Stream,
    /// Saved as a file
    Download,
}

impl DeliveryMode {
    fn counter(&self) -> TrackCounter {
        match self {
            Self::Stream => TrackCounter::Plays,
            Self::Download => TrackCounter::Downloads,
        }
    }
}

/// A track that is ready to be sent
pub struct TrackDelivery {
    /// The track, with its counters already incremented
    pub track: TrackData,
    pub mode: DeliveryMode,
    /// The storage path of the audio
    pub path: String,
    /// The bytes to send, absent when a proxy sends the file instead
    pub content: Option<StoredBytes>,
}

impl TrackDelivery {
    /// The name the client should save the file under
    pub fn file_name(&self) -> &str {
        file_name(&self.path)
    }
}

/// Serves the audio of tracks, counting plays and downloads
pub struct TrackResponder {
    context: CatalogContext,
}

impl TrackResponder {
    pub fn new(context: &CatalogContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Opens a track for reading and counts the play or download.
    ///
    /// Tracks the requester may not see are reported as not found,
    /// the same as tracks whose audio is missing from storage.
    pub async fn serve(
        &self,
        track_id: PrimaryKey,
        requester: Option<&UserData>,
        mode: DeliveryMode,
        range: Option<ByteRange>,
    ) -> CatalogResult<TrackDelivery> {
        let track = self.lookup(track_id, requester).await?;
        let content = self.context.files.storage().read(&track.file, range).await?;

        self.deliver(track, mode, Some(content)).await
    }

    /// Like [TrackResponder::serve], but leaves reading the file to someone else
    pub async fn locate(
        &self,
        track_id: PrimaryKey,
        requester: Option<&UserData>,
        mode: DeliveryMode,
    ) -> CatalogResult<TrackDelivery> {
        let track = self.lookup(track_id, requester).await?;
        self.deliver(track, mode, None).await
    }

    async fn lookup(
        &self,
        track_id: PrimaryKey,
        requester: Option<&UserData>,
    ) -> CatalogResult<TrackData> {
        let track = self.context.database.track_by_id(track_id).await?;
        ensure_track_visible(&self.context, &track, requester).await?;

        let exists = self.context.files.storage().exists(&track.file).await?;
        if !exists {
            warn!("Audio of track {} is missing at {}", track.id, track.file);
            return Err(CatalogError::not_found("file", "path"));
        }

        Ok(track)
    }

    async fn deliver(
        &self,
        track: TrackData,
        mode: DeliveryMode,
        content: Option<StoredBytes>,
    ) -> CatalogResult<TrackDelivery> {
        let track = self
            .context
            .database
            .increment_track_counter(track.id, mode.counter())
            .await?;

        info!("Serving track {} ({:?})", track.id, mode);

        Ok(TrackDelivery {
            path: track.file.clone(),
            track,
            mode,
            content,
        })
    }
}
