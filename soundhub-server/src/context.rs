use std::{convert::Infallible, sync::Arc};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use soundhub_catalog::Catalog;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub catalog: Arc<Catalog>,
    /// Prefix for `X-Accel-Redirect`, set when a proxy in front of us sends audio files
    pub accel_redirect: Option<Arc<str>>,
}

impl ServerContext {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            accel_redirect: None,
        }
    }

    pub fn with_accel_redirect(mut self, prefix: impl AsRef<str>) -> Self {
        let prefix = prefix.as_ref().trim_end_matches('/');
        self.accel_redirect = Some(prefix.into());
        self
    }
}

#[async_trait]
impl FromRequestParts<ServerContext> for ServerContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        Ok(state.clone())
    }
}
