mod albums;
mod auth;
mod comments;
mod db;
mod error;
mod files;
mod genres;
mod google;
mod ledger;
mod playlists;
mod responder;
mod tracks;
mod users;
mod util;

use std::sync::Arc;

pub use albums::*;
pub use auth::*;
pub use comments::*;
pub use db::*;
pub use error::*;
pub use files::*;
pub use genres::*;
pub use google::*;
pub use ledger::*;
pub use playlists::*;
pub use responder::*;
pub use tracks::*;
pub use users::*;

use soundhub_core::{ArcedStorage, Config};

/// The soundhub catalog, owning accounts, the music they upload, and who follows whom.
pub struct Catalog {
    context: CatalogContext,

    pub auth: Auth,
    pub users: Users,
    pub genres: Genres,
    pub albums: Albums,
    pub tracks: Tracks,
    pub playlists: Playlists,
    pub comments: Comments,
    pub ledger: SubscriptionLedger,
    pub responder: TrackResponder,
}

/// A type passed to the catalog services, to reach the database and stored files.
#[derive(Clone)]
pub struct CatalogContext {
    pub config: Config,
    pub database: ArcedDatabase,
    pub files: Files,
}

impl Catalog {
    pub fn new(config: Config, database: ArcedDatabase, storage: ArcedStorage) -> Self {
        let files = Files::new(storage, config.upload_limits.clone());

        let context = CatalogContext {
            config,
            database,
            files,
        };

        Self::from_context(context)
    }

    fn from_context(context: CatalogContext) -> Self {
        Self {
            auth: Auth::new(&context.database, context.config.session_duration_in_days),
            users: Users::new(&context),
            genres: Genres::new(&context),
            albums: Albums::new(&context),
            tracks: Tracks::new(&context),
            playlists: Playlists::new(&context),
            comments: Comments::new(&context),
            ledger: SubscriptionLedger::new(&context),
            responder: TrackResponder::new(&context),
            context,
        }
    }

    /// Enables Google login through the given provider
    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.auth.set_identity_provider(provider);
        self
    }

    pub fn context(&self) -> &CatalogContext {
        &self.context
    }
}

/// Fails unless the requester owns the resource
pub(crate) fn ensure_owner(
    owner_id: PrimaryKey,
    requester: &UserData,
    message: &'static str,
) -> CatalogResult<()> {
    match owner_id == requester.id {
        true => Ok(()),
        false => Err(CatalogError::Forbidden(message)),
    }
}

/// Private resources are only visible to their owner
pub(crate) fn is_visible(
    owner_id: PrimaryKey,
    private: bool,
    requester: Option<&UserData>,
) -> bool {
    !private || requester.is_some_and(|r| r.id == owner_id)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use soundhub_core::{Config, MemoryStorage, UploadedFile};

    use crate::{ArcedDatabase, Catalog, Database, MemoryDatabase, NewUser, UserData};

    pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n....";
    pub const JPEG: &[u8] = b"\xff\xd8\xff\xe0....";
    pub const MP3: &[u8] = b"ID3\x04\x00audio frames";

    pub struct Fixture {
        pub catalog: Catalog,
        pub database: ArcedDatabase,
        pub memory: Arc<MemoryDatabase>,
        pub storage: Arc<MemoryStorage>,
    }

    pub fn catalog() -> Fixture {
        let memory = Arc::new(MemoryDatabase::new());
        let database: ArcedDatabase = memory.clone();
        let storage = Arc::new(MemoryStorage::new());
        let catalog = Catalog::new(Config::default(), database.clone(), storage.clone());

        Fixture {
            catalog,
            database,
            memory,
            storage,
        }
    }

    pub async fn user(fixture: &Fixture, username: &str) -> UserData {
        fixture
            .database
            .create_user(NewUser {
                email: format!("{}@example.com", username),
                username: username.to_string(),
                password: None,
                superuser: false,
            })
            .await
            .unwrap()
    }

    pub fn png(filename: &str) -> UploadedFile {
        UploadedFile::new(filename, PNG)
    }

    pub fn jpeg(filename: &str) -> UploadedFile {
        UploadedFile::new(filename, JPEG)
    }

    pub fn mp3(filename: &str) -> UploadedFile {
        UploadedFile::new(filename, MP3)
    }
}
