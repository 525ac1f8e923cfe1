use std::{ops::RangeInclusive, path::PathBuf};

use soundhub_core::{Config, UploadLimits};
use soundhub_server::DEFAULT_PORT;

use crate::StartupError;

/// Everything read from the environment at startup
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub port: u16,
    /// Where uploaded files are stored
    pub media_root: PathBuf,
    pub max_upload_in_megabytes: u64,
    pub session_duration_in_days: i64,
    /// Google login is disabled without it
    pub google_client_id: Option<String>,
    pub accel_redirect: Option<String>,
    /// Created on startup unless a superuser exists
    pub superuser: Option<SuperuserSettings>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuperuserSettings {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            port: DEFAULT_PORT,
            media_root: PathBuf::from("./media"),
            max_upload_in_megabytes: UploadLimits::DEFAULT_MAX_SIZE_IN_MEGABYTES,
            session_duration_in_days: 7,
            google_client_id: None,
            accel_redirect: None,
            superuser: None,
        }
    }
}

impl Settings {
    /// Accepted values of `SOUNDHUB_SESSION_DAYS`
    pub const SESSION_DAYS: RangeInclusive<i64> = 1..=3650;

    pub fn from_env() -> Result<Self, StartupError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which returns the value of a variable if it is set
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StartupError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url =
            var("DATABASE_URL").ok_or(StartupError::MissingVariable("DATABASE_URL"))?;

        let superuser = match (
            var("SOUNDHUB_SUPERUSER_EMAIL"),
            var("SOUNDHUB_SUPERUSER_USERNAME"),
            var("SOUNDHUB_SUPERUSER_PASSWORD"),
        ) {
            (Some(email), Some(username), Some(password)) => Some(SuperuserSettings {
                email,
                username,
                password,
            }),
            _ => None,
        };

        let session_duration_in_days = parse(&var, "SOUNDHUB_SESSION_DAYS")?
            .unwrap_or(defaults.session_duration_in_days);

        if !Self::SESSION_DAYS.contains(&session_duration_in_days) {
            return Err(StartupError::InvalidVariable(
                "SOUNDHUB_SESSION_DAYS",
                session_duration_in_days.to_string(),
            ));
        }

        Ok(Self {
            database_url,
            port: parse(&var, "SOUNDHUB_SERVER_PORT")?.unwrap_or(defaults.port),
            media_root: var("SOUNDHUB_MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            max_upload_in_megabytes: parse(&var, "SOUNDHUB_MAX_UPLOAD_MB")?
                .unwrap_or(defaults.max_upload_in_megabytes),
            session_duration_in_days,
            google_client_id: var("SOUNDHUB_GOOGLE_CLIENT_ID"),
            accel_redirect: var("SOUNDHUB_ACCEL_REDIRECT"),
            superuser,
        })
    }

    /// The configuration handed to the catalog
    pub fn core_config(&self) -> Config {
        Config {
            upload_limits: UploadLimits::from_megabytes(self.max_upload_in_megabytes),
            session_duration_in_days: self.session_duration_in_days,
        }
    }
}

fn parse<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, StartupError> {
    var(key)
        .map(|v| v.trim().parse().map_err(|_| StartupError::InvalidVariable(key, v)))
        .transpose()
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, StartupError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let settings = settings(&[("DATABASE_URL", "postgres://localhost/soundhub")]).unwrap();

        assert_eq!(settings.port, 9050);
        assert_eq!(settings.max_upload_in_megabytes, 4);
        assert_eq!(settings.session_duration_in_days, 7);
        assert_eq!(settings.google_client_id, None);
        assert_eq!(settings.superuser, None);
        assert_eq!(settings.core_config().upload_limits.max_size_in_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(
            settings(&[]),
            Err(StartupError::MissingVariable("DATABASE_URL"))
        ));
    }

    #[test]
    fn numbers_are_checked() {
        let result = settings(&[
            ("DATABASE_URL", "postgres://localhost/soundhub"),
            ("SOUNDHUB_SERVER_PORT", "eighty"),
        ]);

        assert!(matches!(
            result,
            Err(StartupError::InvalidVariable("SOUNDHUB_SERVER_PORT", _))
        ));

        for days in ["0", "-1", "3651", "200000000000"] {
            let result = settings(&[
                ("DATABASE_URL", "postgres://localhost/soundhub"),
                ("SOUNDHUB_SESSION_DAYS", days),
            ]);

            assert!(matches!(
                result,
                Err(StartupError::InvalidVariable("SOUNDHUB_SESSION_DAYS", _))
            ));
        }

        for days in ["1", "3650"] {
            let result = settings(&[
                ("DATABASE_URL", "postgres://localhost/soundhub"),
                ("SOUNDHUB_SESSION_DAYS", days),
            ]);

            assert_eq!(
                result.unwrap().session_duration_in_days.to_string(),
                days
            );
        }
    }

    #[test]
    fn superuser_needs_every_field() {
        let partial = settings(&[
            ("DATABASE_URL", "postgres://localhost/soundhub"),
            ("SOUNDHUB_SUPERUSER_EMAIL", "admin@example.com"),
        ])
        .unwrap();
        assert_eq!(partial.superuser, None);

        let complete = settings(&[
            ("DATABASE_URL", "postgres://localhost/soundhub"),
            ("SOUNDHUB_SUPERUSER_EMAIL", "admin@example.com"),
            ("SOUNDHUB_SUPERUSER_USERNAME", "admin"),
            ("SOUNDHUB_SUPERUSER_PASSWORD", "correct horse"),
        ])
        .unwrap();
        assert_eq!(complete.superuser.unwrap().username, "admin");
    }
}
