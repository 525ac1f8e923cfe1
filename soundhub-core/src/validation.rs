use std::fmt::Display;

use bytes::Bytes;
use thiserror::Error;

use crate::{file_extension, UploadLimits};

/// What an uploaded file is expected to contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadKind {
    Image,
    Audio,
}

impl Display for UploadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// A file received from a client that has not been stored yet
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// The name the client gave the file
    pub filename: String,
    pub content: Bytes,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn extension(&self) -> Option<&str> {
        file_extension(&self.filename)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File is too large, the maximum size is {limit_in_megabytes}MB")]
    PayloadTooLarge { limit_in_megabytes: u64 },
    #[error("{filename} is not a supported {expected} file")]
    UnsupportedMediaType {
        expected: UploadKind,
        filename: String,
    },
}

/// Extensions accepted for images
pub const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff", "ico",
];

/// Extensions accepted for audio
pub const AUDIO_EXTENSIONS: [&str; 1] = ["mp3"];

/// Checks an upload against the size limit and the expected kind of content.
pub fn validate_upload(
    file: &UploadedFile,
    kind: UploadKind,
    limits: &UploadLimits,
) -> Result<(), ValidationError> {
    if file.size() > limits.max_size_in_bytes {
        return Err(ValidationError::PayloadTooLarge {
            limit_in_megabytes: limits.max_size_in_megabytes(),
        });
    }

    let is_supported = match kind {
        UploadKind::Image => has_extension(file, &IMAGE_EXTENSIONS) && is_image(&file.content),
        UploadKind::Audio => has_extension(file, &AUDIO_EXTENSIONS) && is_mp3(&file.content),
    };

    if !is_supported {
        return Err(ValidationError::UnsupportedMediaType {
            expected: kind,
            filename: file.filename.clone(),
        });
    }

    Ok(())
}

fn has_extension(file: &UploadedFile, allowed: &[&str]) -> bool {
    file.extension()
        .map(|extension| extension.to_ascii_lowercase())
        .is_some_and(|extension| allowed.contains(&extension.as_str()))
}

fn is_image(content: &[u8]) -> bool {
    const SIGNATURES: [&[u8]; 9] = [
        // JPEG
        &[0xFF, 0xD8, 0xFF],
        // PNG
        &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
        b"GIF87a",
        b"GIF89a",
        b"BM",
        // TIFF, little and big endian
        &[b'I', b'I', 0x2A, 0x00],
        &[b'M', b'M', 0x00, 0x2A],
        // ICO
        &[0x00, 0x00, 0x01, 0x00],
        // CUR shares the ICO container
        &[0x00, 0x00, 0x02, 0x00],
    ];

    let is_webp = content.len() >= 12 && &content[..4] == b"RIFF" && &content[8..12] == b"WEBP";

    is_webp || SIGNATURES.iter().any(|s| content.starts_with(s))
}

fn is_mp3(content: &[u8]) -> bool {
    let has_id3_tag = content.starts_with(b"ID3");
    let has_frame_sync = content.len() >= 2 && content[0] == 0xFF && content[1] & 0xE0 == 0xE0;

    has_id3_tag || has_frame_sync
}
