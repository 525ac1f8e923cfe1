/// How many bytes are in a mebibyte
pub const MEBIBYTE: u64 = 1024 * 1024;

/// The configuration of a soundhub instance
#[derive(Debug, Clone)]
pub struct Config {
    /// Limits applied to every uploaded file
    pub upload_limits: UploadLimits,
    /// How many days a login session stays valid
    pub session_duration_in_days: i64,
}

/// Limits that an upload must respect before it is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    /// The largest accepted file, in bytes
    pub max_size_in_bytes: u64,
}

impl UploadLimits {
    pub const DEFAULT_MAX_SIZE_IN_MEGABYTES: u64 = 4;

    pub fn from_megabytes(megabytes: u64) -> Self {
        Self {
            max_size_in_bytes: megabytes * MEBIBYTE,
        }
    }

    /// The limit in whole megabytes, as shown to users
    pub fn max_size_in_megabytes(&self) -> u64 {
        self.max_size_in_bytes / MEBIBYTE
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::from_megabytes(Self::DEFAULT_MAX_SIZE_IN_MEGABYTES)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_limits: UploadLimits::default(),
            session_duration_in_days: 7,
        }
    }
}
