use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::UploadKind;

/// Every kind of file an entity can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Avatar,
    AlbumCover,
    PlaylistCover,
    TrackAudio,
    TrackCover,
}

impl AssetKind {
    /// The top level directory files of this kind are stored in
    pub fn directory(&self) -> &'static str {
        match self {
            Self::Avatar => "avatar",
            Self::AlbumCover => "album",
            Self::PlaylistCover => "playlist",
            Self::TrackAudio => "track",
            Self::TrackCover => "track-cover",
        }
    }

    /// What the file content is validated as
    pub fn upload_kind(&self) -> UploadKind {
        match self {
            Self::TrackAudio => UploadKind::Audio,
            _ => UploadKind::Image,
        }
    }
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Avatar => "avatar",
            Self::AlbumCover => "album cover",
            Self::PlaylistCover => "playlist cover",
            Self::TrackAudio => "track audio",
            Self::TrackCover => "track cover",
        };

        write!(f, "{}", name)
    }
}

/// Builds the storage-relative path of an uploaded file.
///
/// The result looks like `<kind>/<owner>/<derived>.<extension>`, where the derived name is:
/// - the owner's username for avatars
/// - `<owner>-<entity>` for track audio and covers
/// - the entity name for album and playlist covers
///
/// The extension is whatever follows the last `.` of the original filename.
/// Nothing here touches the storage, so this can run before the file is written.
pub fn build_path(
    kind: AssetKind,
    owner_username: &str,
    entity_name: Option<&str>,
    original_filename: &str,
) -> String {
    let owner = sanitize_segment(owner_username);
    let entity = entity_name.map(sanitize_segment);

    let derived = match (kind, entity) {
        (AssetKind::Avatar, _) | (_, None) => owner.clone(),
        (AssetKind::TrackAudio | AssetKind::TrackCover, Some(entity)) => {
            format!("{}-{}", owner, entity)
        }
        (AssetKind::AlbumCover | AssetKind::PlaylistCover, Some(entity)) => entity,
    };

    match file_extension(original_filename) {
        Some(extension) => format!(
            "{}/{}/{}.{}",
            kind.directory(),
            owner,
            derived,
            sanitize_segment(extension)
        ),
        None => format!("{}/{}/{}", kind.directory(), owner, derived),
    }
}

/// Returns the text after the last `.` of a filename, if there is any.
pub fn file_extension(filename: &str) -> Option<&str> {
    filename
        .rsplit_once('.')
        .map(|(_, extension)| extension)
        .filter(|extension| !extension.is_empty())
}

/// Returns the last component of a storage path
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Makes sure user supplied text stays a single path segment.
fn sanitize_segment(segment: &str) -> String {
    let replaced: String = segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    let leading_dots = replaced.chars().take_while(|c| *c == '.').count();
    let sanitized = format!("{}{}", "_".repeat(leading_dots), &replaced[leading_dots..]);

    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn avatar_is_named_after_owner() {
        let path = build_path(AssetKind::Avatar, "alice", None, "me at the beach.JPG");
        assert_eq!(path, "avatar/alice/alice.JPG");
    }

    #[test]
    fn avatar_ignores_entity_name() {
        let path = build_path(AssetKind::Avatar, "alice", Some("whatever"), "a.png");
        assert_eq!(path, "avatar/alice/alice.png");
    }

    #[test]
    fn track_assets_include_owner_and_entity() {
        assert_eq!(
            build_path(AssetKind::TrackAudio, "bob", Some("Intro"), "demo.final.mp3"),
            "track/bob/bob-Intro.mp3"
        );
        assert_eq!(
            build_path(AssetKind::TrackCover, "bob", Some("Intro"), "cover.webp"),
            "track-cover/bob/bob-Intro.webp"
        );
    }

    #[test]
    fn collection_covers_use_entity_name() {
        assert_eq!(
            build_path(AssetKind::AlbumCover, "carol", Some("Winter"), "x.png"),
            "album/carol/Winter.png"
        );
        assert_eq!(
            build_path(AssetKind::PlaylistCover, "carol", Some("Road trip"), "y.gif"),
            "playlist/carol/Road trip.gif"
        );
    }

    #[test]
    fn is_deterministic() {
        let first = build_path(AssetKind::TrackAudio, "dave", Some("Song"), "take2.mp3");
        let second = build_path(AssetKind::TrackAudio, "dave", Some("Song"), "take2.mp3");
        assert_eq!(first, second);
    }

    #[test]
    fn missing_extension_leaves_no_dot() {
        assert_eq!(
            build_path(AssetKind::AlbumCover, "erin", Some("Noext"), "cover"),
            "album/erin/Noext"
        );
        assert_eq!(file_extension("trailing."), None);
    }

    #[test]
    fn segments_cannot_escape_their_directory() {
        let path = build_path(AssetKind::AlbumCover, "../root", Some("a/../../b"), "c.png");
        assert_eq!(path, "album/___root/a_.._.._b.png");
        assert!(!path.split('/').any(|segment| segment == ".."));
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(file_name("track/bob/bob-Intro.mp3"), "bob-Intro.mp3");
        assert_eq!(file_name("plain.mp3"), "plain.mp3");
    }
}
