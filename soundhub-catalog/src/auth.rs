use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::{TimeDelta, Utc};
use log::{info, warn};
use rand::rngs::OsRng;
use std::sync::Arc;
use thiserror::Error;

use crate::{
    util::random_string, ArcedDatabase, DatabaseError, IdentityError, IdentityProvider,
    NewSession, NewUser, PrimaryKey, SessionData, UserData,
};

pub struct Auth {
    db: ArcedDatabase,
    argon: Argon2<'static>,
    session_duration_in_days: i64,
    identity: Option<Arc<dyn IdentityProvider>>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Email or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("A superuser already exists")]
    SuperuserExists,
    #[error("This account is disabled")]
    InactiveUser,
    /// The session does not exist or has expired
    #[error("Invalid or expired session")]
    InvalidSession,
    #[error("Google login is not enabled")]
    GoogleLoginDisabled,
    #[error(transparent)]
    Identity(IdentityError),
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
    #[error("Sessions of {0} days cannot be issued")]
    SessionDuration(i64),
}

#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct GoogleCredentials {
    pub email: String,
    /// The ID token handed out by Google
    pub token: String,
}

#[derive(Debug)]
pub struct NewPlainUser {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl Auth {
    const TOKEN_LENGTH: usize = 32;

    pub fn new(db: &ArcedDatabase, session_duration_in_days: i64) -> Self {
        Self {
            db: db.clone(),
            argon: Argon2::default(),
            session_duration_in_days,
            identity: None,
        }
    }

    /// Enables logging in with tokens verified by the given provider
    pub fn set_identity_provider(&mut self, provider: Arc<dyn IdentityProvider>) {
        self.identity = Some(provider);
    }

    /// Logs in a user, returning a new session
    pub async fn login(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        self.clear_expired().await;

        let user = self
            .db
            .user_by_email(&credentials.email)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        // Accounts created through Google have no password to log in with
        let password = user.password.as_deref().ok_or(AuthError::InvalidCredentials)?;

        let stored_password = PasswordHash::parse(password, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        self.argon
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }

        self.start_session(user.id).await
    }

    /// Logs in with a Google ID token, creating the account on first use
    pub async fn google_login(
        &self,
        credentials: GoogleCredentials,
    ) -> Result<SessionData, AuthError> {
        let identity = self.identity.as_ref().ok_or(AuthError::GoogleLoginDisabled)?;

        let email = identity
            .verify(&credentials.token)
            .await
            .map_err(AuthError::Identity)?;

        if !email.eq_ignore_ascii_case(&credentials.email) {
            return Err(AuthError::Identity(IdentityError::InvalidToken));
        }

        self.clear_expired().await;

        let user = match self.db.user_by_email(&email).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound { .. }) => {
                let username = self.free_username(&email).await?;
                info!("Creating account {} through Google login", username);

                self.db
                    .create_user(NewUser {
                        email,
                        username,
                        password: None,
                        superuser: false,
                    })
                    .await
                    .map_err(AuthError::Db)?
            }
            Err(e) => return Err(AuthError::Db(e)),
        };

        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }

        self.start_session(user.id).await
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        self.db.delete_session_by_token(token).await
    }

    /// Creates a basic user
    pub async fn register_basic(&self, new_user: NewPlainUser) -> Result<UserData, AuthError> {
        self.create_user(new_user, false).await
    }

    /// Creates a superuser, if it doesn't already exist
    pub async fn register_superuser(&self, new_user: NewPlainUser) -> Result<UserData, AuthError> {
        let has_superuser = self.db.check_for_superuser().await.map_err(AuthError::Db)?;

        if has_superuser {
            return Err(AuthError::SuperuserExists);
        }

        self.create_user(new_user, true).await
    }

    /// Returns a session if it exists, has not expired, and belongs to an active user
    pub async fn session(&self, token: &str) -> Result<SessionData, AuthError> {
        let session = self
            .db
            .session_by_token(token)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidSession,
                err => AuthError::Db(err),
            })?;

        if session.expires_at <= Utc::now() {
            return Err(AuthError::InvalidSession);
        }

        if !session.user.is_active {
            return Err(AuthError::InactiveUser);
        }

        Ok(session)
    }

    /// Issues a new session for a user
    pub async fn start_session(&self, user_id: PrimaryKey) -> Result<SessionData, AuthError> {
        let days = self.session_duration_in_days;
        let expires_at = TimeDelta::try_days(days)
            .filter(|duration| *duration > TimeDelta::zero())
            .and_then(|duration| Utc::now().checked_add_signed(duration))
            .ok_or(AuthError::SessionDuration(days))?;

        let new_session = NewSession {
            token: random_string(Self::TOKEN_LENGTH),
            user_id,
            expires_at,
        };

        self.db
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)
    }

    async fn create_user(
        &self,
        new_user: NewPlainUser,
        superuser: bool,
    ) -> Result<UserData, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = self
            .argon
            .hash_password(new_user.password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string();

        self.db
            .create_user(NewUser {
                email: new_user.email,
                username: new_user.username,
                password: Some(hashed_password),
                superuser,
            })
            .await
            .map_err(AuthError::Db)
    }

    /// Derives an unused username from the local part of an email
    async fn free_username(&self, email: &str) -> Result<String, AuthError> {
        let local_part = email.split('@').next().unwrap_or_default();
        let base: String = local_part
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            .collect();
        let base = if base.is_empty() { "user".to_string() } else { base };

        let mut candidate = base.clone();
        let mut suffix = 1;

        loop {
            match self.db.user_by_username(&candidate).await {
                Ok(_) => {
                    suffix += 1;
                    candidate = format!("{}{}", base, suffix);
                }
                Err(DatabaseError::NotFound { .. }) => return Ok(candidate),
                Err(e) => return Err(AuthError::Db(e)),
            }
        }
    }

    async fn clear_expired(&self) {
        if let Err(e) = self.db.clear_expired_sessions().await {
            warn!("Could not clear expired sessions: {}", e);
        }
    }
}

#[cfg(test)]
mod test {
    use async_trait::async_trait;

    use super::*;
    use crate::{Database, MemoryDatabase};

    struct FakeGoogle;

    #[async_trait]
    impl IdentityProvider for FakeGoogle {
        async fn verify(&self, token: &str) -> Result<String, IdentityError> {
            match token.strip_prefix("valid:") {
                Some(email) => Ok(email.to_string()),
                None => Err(IdentityError::InvalidToken),
            }
        }
    }

    fn auth() -> (ArcedDatabase, Auth) {
        let db: ArcedDatabase = Arc::new(MemoryDatabase::new());
        let mut auth = Auth::new(&db, 7);
        auth.set_identity_provider(Arc::new(FakeGoogle));

        (db, auth)
    }

    fn alice() -> NewPlainUser {
        NewPlainUser {
            email: "alice@example.com".to_string(),
            username: "alice".to_string(),
            password: "correct horse".to_string(),
        }
    }

    #[tokio::test]
    async fn registered_users_can_log_in() {
        let (_, auth) = auth();
        let user = auth.register_basic(alice()).await.unwrap();

        assert_ne!(user.password.as_deref(), Some("correct horse"));

        let session = auth
            .login(Credentials {
                email: "alice@example.com".to_string(),
                password: "correct horse".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(session.user.id, user.id);
        assert_eq!(session.token.len(), 32);
        assert_eq!(auth.session(&session.token).await.unwrap().user.id, user.id);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let (_, auth) = auth();
        auth.register_basic(alice()).await.unwrap();

        let result = auth
            .login(Credentials {
                email: "alice@example.com".to_string(),
                password: "battery staple".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn only_one_superuser_can_be_registered() {
        let (_, auth) = auth();
        let root = auth.register_superuser(alice()).await.unwrap();
        assert!(root.superuser);

        let result = auth
            .register_superuser(NewPlainUser {
                email: "bob@example.com".to_string(),
                username: "bob".to_string(),
                password: "hunter22".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AuthError::SuperuserExists)));
    }

    #[tokio::test]
    async fn logged_out_sessions_are_gone() {
        let (_, auth) = auth();
        let user = auth.register_basic(alice()).await.unwrap();
        let session = auth.start_session(user.id).await.unwrap();

        auth.logout(&session.token).await.unwrap();

        assert!(matches!(
            auth.session(&session.token).await,
            Err(AuthError::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn unusable_session_durations_are_errors() {
        for days in [0, -3, 200_000_000_000] {
            let db: ArcedDatabase = Arc::new(MemoryDatabase::new());
            let auth = Auth::new(&db, days);
            let user = auth.register_basic(alice()).await.unwrap();

            assert!(matches!(
                auth.start_session(user.id).await,
                Err(AuthError::SessionDuration(d)) if d == days
            ));
        }
    }

    #[tokio::test]
    async fn expired_sessions_are_rejected() {
        let (db, auth) = auth();
        let user = auth.register_basic(alice()).await.unwrap();

        db.create_session(NewSession {
            token: "stale".to_string(),
            user_id: user.id,
            expires_at: Utc::now() - TimeDelta::minutes(1),
        })
        .await
        .unwrap();

        assert!(matches!(
            auth.session("stale").await,
            Err(AuthError::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn google_login_creates_the_account_once() {
        let (db, auth) = auth();

        let credentials = || GoogleCredentials {
            email: "carol@example.com".to_string(),
            token: "valid:carol@example.com".to_string(),
        };

        let first = auth.google_login(credentials()).await.unwrap();
        let second = auth.google_login(credentials()).await.unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert_eq!(first.user.username, "carol");
        assert!(first.user.password.is_none());
        assert_ne!(first.token, second.token);

        let user = db.user_by_email("carol@example.com").await.unwrap();
        assert_eq!(user.id, first.user.id);
    }

    #[tokio::test]
    async fn google_usernames_do_not_collide() {
        let (_, auth) = auth();
        auth.register_basic(NewPlainUser {
            email: "carol@elsewhere.com".to_string(),
            username: "carol".to_string(),
            password: "whatever1".to_string(),
        })
        .await
        .unwrap();

        let session = auth
            .google_login(GoogleCredentials {
                email: "carol@example.com".to_string(),
                token: "valid:carol@example.com".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(session.user.username, "carol2");
    }

    #[tokio::test]
    async fn google_tokens_must_match_the_email() {
        let (_, auth) = auth();

        let mismatched = auth
            .google_login(GoogleCredentials {
                email: "mallory@example.com".to_string(),
                token: "valid:carol@example.com".to_string(),
            })
            .await;
        assert!(matches!(mismatched, Err(AuthError::Identity(_))));

        let invalid = auth
            .google_login(GoogleCredentials {
                email: "carol@example.com".to_string(),
                token: "forged".to_string(),
            })
            .await;
        assert!(matches!(invalid, Err(AuthError::Identity(_))));
    }

    #[tokio::test]
    async fn google_login_can_be_disabled() {
        let db: ArcedDatabase = Arc::new(MemoryDatabase::new());
        let auth = Auth::new(&db, 7);

        let result = auth
            .google_login(GoogleCredentials {
                email: "carol@example.com".to_string(),
                token: "valid:carol@example.com".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AuthError::GoogleLoginDisabled)));
    }

    #[tokio::test]
    async fn google_accounts_cannot_use_password_login() {
        let (_, auth) = auth();
        auth.google_login(GoogleCredentials {
            email: "carol@example.com".to_string(),
            token: "valid:carol@example.com".to_string(),
        })
        .await
        .unwrap();

        let result = auth
            .login(Credentials {
                email: "carol@example.com".to_string(),
                password: "".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }
}
