use std::sync::Arc;

use colored::Colorize;
use config::Settings;
use log::{error, info, warn};
use soundhub_catalog::{AuthError, Catalog, DatabaseError, GoogleIdentity, NewPlainUser, PgDatabase};
use soundhub_impls::LocalStorage;
use soundhub_server::{run_server, ServerContext};
use thiserror::Error;

mod config;
mod logging;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{0} is not set")]
    MissingVariable(&'static str),

    #[error("{0} has an invalid value: {1}")]
    InvalidVariable(&'static str, String),

    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Could not create the superuser: {0}")]
    Superuser(AuthError),

    #[error("Server stopped: {0}")]
    Server(#[from] std::io::Error),
}

impl StartupError {
    fn hint(&self) -> String {
        match self {
            StartupError::MissingVariable(_) | StartupError::InvalidVariable(_, _) => {
                "Check the environment variables soundhub is started with.".to_string()
            }
            StartupError::Database(_) => {
                "This is a database error. Make sure PostgreSQL is running and DATABASE_URL \
                points to it, then try again."
                    .to_string()
            }
            StartupError::Superuser(_) => {
                "The SOUNDHUB_SUPERUSER_* variables describe an account that cannot be created. \
                Is the email or username taken?"
                    .to_string()
            }
            StartupError::Server(_) => "Make sure SOUNDHUB_SERVER_PORT is free.".to_string(),
        }
    }
}

async fn start(settings: Settings) -> Result<(), StartupError> {
    info!("Connecting to database...");
    let database = PgDatabase::new(&settings.database_url).await?;
    database.migrate().await?;

    info!("Storing media in {}", settings.media_root.display());
    let storage = LocalStorage::new(&settings.media_root);

    let mut catalog = Catalog::new(settings.core_config(), Arc::new(database), Arc::new(storage));

    match &settings.google_client_id {
        Some(client_id) => {
            catalog = catalog.with_identity_provider(Arc::new(GoogleIdentity::new(client_id)))
        }
        None => warn!("SOUNDHUB_GOOGLE_CLIENT_ID is not set, Google login is disabled"),
    }

    if let Some(superuser) = &settings.superuser {
        let result = catalog
            .auth
            .register_superuser(NewPlainUser {
                email: superuser.email.clone(),
                username: superuser.username.clone(),
                password: superuser.password.clone(),
            })
            .await;

        match result {
            Ok(user) => info!("Created superuser {}", user.username),
            Err(AuthError::SuperuserExists) => info!("A superuser exists already"),
            Err(e) => return Err(StartupError::Superuser(e)),
        }
    }

    let mut context = ServerContext::new(Arc::new(catalog));
    if let Some(prefix) = &settings.accel_redirect {
        info!("Audio is sent by the proxy through {}", prefix);
        context = context.with_accel_redirect(prefix);
    }

    info!("Initialized successfully.");
    run_server(context, settings.port).await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init_logger() {
        eprintln!("Could not initialize logging: {}", e);
    }

    let result = match Settings::from_env() {
        Ok(settings) => start(settings).await,
        Err(e) => Err(e),
    };

    if let Err(error) = result {
        error!(
            "{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.",
            "soundhub failed to start!".bold().red()
        );
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());

        std::process::exit(1);
    }
}
