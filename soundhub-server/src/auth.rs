use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, StatusCode},
    routing::post,
    Json,
};
use soundhub_catalog::{Credentials, GoogleCredentials, NewPlainUser, SessionData, UserData};

use crate::{
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::{GoogleLoginSchema, LoginSchema, RegisterSchema, ValidatedJson},
    serialized::{LoginResult, ToSerialized},
    Router,
};

/// Wraps [SessionData] so [FromRequestParts] can be implemented for it
pub struct Session(SessionData);

impl Session {
    /// Returns the user of the session
    pub fn user(&self) -> &UserData {
        &self.0.user
    }

    pub fn token(&self) -> &str {
        &self.0.token
    }
}

/// Like [Session], but lets anonymous requests through
pub struct MaybeSession(Option<Session>);

impl MaybeSession {
    pub fn user(&self) -> Option<&UserData> {
        self.0.as_ref().map(|s| s.user())
    }
}

/// Reads the token of an `Authorization: Bearer <token>` or `Token <token>` header
fn token_from_parts(parts: &Parts) -> Option<Result<&str, ServerError>> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .map(|x| x.to_str().unwrap_or_default())?;

    let mut split = value.split_ascii_whitespace();
    let scheme = split.next();
    let token = split.next();

    let result = match (scheme, token) {
        (Some("Bearer" | "Token"), Some(token)) => Ok(token),
        _ => Err(ServerError::BadRequest(
            "Authorization must be Bearer or Token".to_string(),
        )),
    };

    Some(result)
}

async fn resolve(context: &ServerContext, token: &str) -> ServerResult<Session> {
    let session = context.catalog.auth.session(token).await?;

    Ok(Session(session))
}

#[async_trait]
impl FromRequestParts<ServerContext> for Session {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);

        let token = token_from_parts(parts)
            .ok_or(ServerError::Unauthorized("Missing authorization"))??;

        resolve(&context, token).await
    }
}

#[async_trait]
impl FromRequestParts<ServerContext> for MaybeSession {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);

        match token_from_parts(parts) {
            None => Ok(Self(None)),
            Some(token) => resolve(&context, token?).await.map(|s| Self(Some(s))),
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = "auth",
    request_body = RegisterSchema,
    responses(
        (status = 200, body = LoginResult),
        (status = 409, description = "Email or username is taken")
    )
)]
async fn register(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<RegisterSchema>,
) -> ServerResult<Json<LoginResult>> {
    let auth = &context.catalog.auth;

    let user = auth
        .register_basic(NewPlainUser {
            email: body.email,
            username: body.username,
            password: body.password,
        })
        .await?;

    let session = auth.start_session(user.id).await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "auth",
    request_body = LoginSchema,
    responses(
        (status = 200, body = LoginResult),
        (status = 400, description = "Invalid credentials")
    )
)]
async fn login(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<LoginSchema>,
) -> ServerResult<Json<LoginResult>> {
    let session = context
        .catalog
        .auth
        .login(Credentials {
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/auth/google",
    tag = "auth",
    request_body = GoogleLoginSchema,
    responses(
        (status = 200, body = LoginResult),
        (status = 403, description = "The Google token is invalid")
    )
)]
async fn google_login(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<GoogleLoginSchema>,
) -> ServerResult<Json<LoginResult>> {
    let session = context
        .catalog
        .auth
        .google_login(GoogleCredentials {
            email: body.email,
            token: body.token,
        })
        .await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "auth",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204)
    )
)]
async fn logout(session: Session, context: ServerContext) -> ServerResult<StatusCode> {
    context.catalog.auth.logout(session.token()).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/google", post(google_login))
        .route("/logout", post(logout))
}
