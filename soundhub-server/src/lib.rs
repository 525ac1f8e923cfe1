use std::{
    net::{Ipv6Addr, SocketAddr},
    time::Instant,
};

use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use log::info;
use soundhub_core::MEBIBYTE;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

mod albums;
mod auth;
mod comments;
mod context;
mod docs;
mod errors;
mod genres;
mod playlists;
mod schemas;
mod serialized;
mod streaming;
mod tracks;
mod users;

pub use context::ServerContext;
pub use errors::{ServerError, ServerResult};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Builds the soundhub HTTP application
pub fn app(context: ServerContext) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // A track upload carries both the audio and a cover
    let upload_limit = context.catalog.context().config.upload_limits.max_size_in_bytes;
    let body_limit = usize::try_from(upload_limit * 2 + MEBIBYTE).unwrap_or(usize::MAX);

    let version_one_router = Router::new()
        .nest("/auth", auth::router())
        .nest("/me", users::me_router())
        .nest("/authors", users::authors_router())
        .nest("/genres", genres::router())
        .nest("/albums", albums::router())
        .nest("/tracks", tracks::router())
        .nest("/comments", comments::router())
        .nest("/playlists", playlists::router())
        .nest("/streams", streaming::streams_router())
        .nest("/downloads", streaming::downloads_router())
        .nest("/media", streaming::media_router());

    Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(log_request))
        .layer(cors)
        .with_state(context)
}

/// Starts the soundhub server
pub async fn run_server(context: ServerContext, port: u16) -> std::io::Result<()> {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();
    let listener = TcpListener::bind(&addr).await?;

    info!("Listening on port {}", port);

    axum::serve(listener, app(context).into_make_service()).await
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started_at = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} {} {} {}ms",
        method,
        path,
        response.status().as_u16(),
        started_at.elapsed().as_millis()
    );

    response
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use soundhub_catalog::{Catalog, MemoryDatabase, NewPlainUser};
    use soundhub_core::{Config, MemoryStorage};
    use tower::ServiceExt;

    use super::*;

    const MP3: &[u8] = b"ID3\x04\x00audio frames";
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n....";
    const BOUNDARY: &str = "soundhub-test-boundary";

    struct TestServer {
        app: axum::Router,
        catalog: Arc<Catalog>,
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn server() -> TestServer {
        server_with(|context| context)
    }

    fn server_with(configure: impl FnOnce(ServerContext) -> ServerContext) -> TestServer {
        let catalog = Arc::new(Catalog::new(
            Config::default(),
            Arc::new(MemoryDatabase::new()),
            Arc::new(MemoryStorage::new()),
        ));

        let context = configure(ServerContext::new(catalog.clone()));

        TestServer {
            app: app(context),
            catalog,
        }
    }

    impl TestServer {
        async fn send(&self, request: Request<Body>) -> Response {
            self.app.clone().oneshot(request).await.unwrap()
        }

        async fn register(&self, username: &str) -> String {
            let response = self
                .send(json_request(
                    Method::POST,
                    "/v1/auth/register",
                    None,
                    json!({
                        "email": format!("{}@example.com", username),
                        "username": username,
                        "password": "correct horse",
                    }),
                ))
                .await;

            assert_eq!(response.status(), StatusCode::OK);
            read_json(response).await["access_token"]
                .as_str()
                .unwrap()
                .to_string()
        }

        async fn upload_track(&self, token: &str, name: &str, private: bool) -> Value {
            let private = private.to_string();
            let response = self
                .send(multipart(
                    Method::POST,
                    "/v1/tracks",
                    token,
                    &[
                        Part::Text("name", name),
                        Part::Text("private", &private),
                        Part::File("file", "take.mp3", MP3),
                    ],
                ))
                .await;

            assert_eq!(response.status(), StatusCode::CREATED);
            read_json(response).await
        }
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        builder.body(Body::empty()).unwrap()
    }

    fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {}", token));
        }

        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn empty_request(method: Method, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    fn multipart(method: Method, uri: &str, token: &str, parts: &[Part]) -> Request<Body> {
        let mut body = Vec::new();

        for part in parts {
            match part {
                Part::Text(name, value) => body.extend_from_slice(
                    format!(
                        "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                        BOUNDARY, name, value
                    )
                    .as_bytes(),
                ),
                Part::File(name, filename, content) => {
                    body.extend_from_slice(
                        format!(
                            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                            BOUNDARY, name, filename
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(content);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap()
    }

    async fn read_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn read_json(response: Response) -> Value {
        serde_json::from_slice(&read_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn sessions_authenticate_requests() {
        let server = server();
        let token = server.register("alice").await;

        let response = server.send(get("/v1/me", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["username"], "alice");

        let anonymous = server.send(get("/v1/me", None)).await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let login = server
            .send(json_request(
                Method::POST,
                "/v1/auth/login",
                None,
                json!({ "email": "alice@example.com", "password": "wrong password" }),
            ))
            .await;
        assert_eq!(login.status(), StatusCode::BAD_REQUEST);

        let logout = server
            .send(empty_request(Method::POST, "/v1/auth/logout", &token))
            .await;
        assert_eq!(logout.status(), StatusCode::NO_CONTENT);

        let expired = server.send(get("/v1/me", Some(&token))).await;
        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bad_authorization_is_explained() {
        let server = server();

        let unknown = server.send(get("/v1/me", Some("not-a-session"))).await;
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read_bytes(unknown).await, b"Invalid or expired session");

        let malformed = server
            .send(
                Request::builder()
                    .uri("/v1/me")
                    .header(header::AUTHORIZATION, "Basic YWxpY2U6aHVudGVy")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

        let anonymous_with_bad_token = server
            .send(get("/v1/authors/1", Some("not-a-session")))
            .await;
        assert_eq!(anonymous_with_bad_token.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn taken_usernames_conflict() {
        let server = server();
        server.register("alice").await;

        let response = server
            .send(json_request(
                Method::POST,
                "/v1/auth/register",
                None,
                json!({
                    "email": "other@example.com",
                    "username": "alice",
                    "password": "correct horse",
                }),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn streams_are_partial_and_counted() {
        let server = server();
        let token = server.register("bob").await;
        let track = server.upload_track(&token, "Intro", false).await;
        let uri = format!("/v1/streams/{}", track["id"]);

        let response = server.send(get(&uri, None)).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
        assert_eq!(
            headers[header::CONTENT_RANGE],
            format!("bytes 0-{}/{}", MP3.len() - 1, MP3.len()).as_str()
        );
        assert_eq!(read_bytes(response).await, MP3);

        let ranged = server
            .send(
                Request::builder()
                    .uri(&uri)
                    .header(header::RANGE, "bytes=3-")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(ranged.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(read_bytes(ranged).await, &MP3[3..]);

        let details = server
            .send(get(&format!("/v1/tracks/{}", track["id"]), None))
            .await;
        assert_eq!(read_json(details).await["plays_count"], 2);
    }

    #[tokio::test]
    async fn unsatisfiable_ranges_are_rejected() {
        let server = server();
        let token = server.register("bob").await;
        let track = server.upload_track(&token, "Intro", false).await;

        let response = server
            .send(
                Request::builder()
                    .uri(format!("/v1/streams/{}", track["id"]))
                    .header(header::RANGE, "bytes=5000-")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[tokio::test]
    async fn private_tracks_are_hidden() {
        let server = server();
        let owner = server.register("owner").await;
        let viewer = server.register("viewer").await;
        let track = server.upload_track(&owner, "Secret", true).await;
        let uri = format!("/v1/streams/{}", track["id"]);

        let as_viewer = server.send(get(&uri, Some(&viewer))).await;
        assert_eq!(as_viewer.status(), StatusCode::NOT_FOUND);

        let as_owner = server.send(get(&uri, Some(&owner))).await;
        assert_eq!(as_owner.status(), StatusCode::PARTIAL_CONTENT);

        let listing = server.send(get("/v1/tracks/public", None)).await;
        assert_eq!(read_json(listing).await["count"], 0);
    }

    #[tokio::test]
    async fn downloads_are_attachments() {
        let server = server();
        let token = server.register("bob").await;
        let track = server.upload_track(&token, "Intro", false).await;

        let response = server
            .send(get(&format!("/v1/downloads/{}", track["id"]), None))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"bob-Intro.mp3\""
        );

        let details = server
            .send(get(&format!("/v1/tracks/{}", track["id"]), None))
            .await;
        let details = read_json(details).await;
        assert_eq!(details["downloads_count"], 1);
        assert_eq!(details["plays_count"], 0);
    }

    #[tokio::test]
    async fn proxies_send_the_audio_when_configured() {
        let server = server_with(|context| context.with_accel_redirect("/protected/"));
        let token = server.register("bob").await;
        let track = server.upload_track(&token, "Intro", false).await;

        let response = server
            .send(get(&format!("/v1/streams/{}", track["id"]), None))
            .await;

        assert_eq!(
            response.headers()["X-Accel-Redirect"],
            "/protected/track/bob/bob-Intro.mp3"
        );
        assert!(read_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn uploads_are_validated() {
        let server = server();
        let token = server.register("bob").await;

        let mut oversized = b"ID3".to_vec();
        oversized.resize(5 * MEBIBYTE as usize, 0);

        let too_large = server
            .send(multipart(
                Method::POST,
                "/v1/tracks",
                &token,
                &[Part::Text("name", "Long"), Part::File("file", "long.mp3", &oversized)],
            ))
            .await;
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let wrong_type = server
            .send(multipart(
                Method::POST,
                "/v1/tracks",
                &token,
                &[Part::Text("name", "Notes"), Part::File("file", "notes.txt", b"hello")],
            ))
            .await;
        assert_eq!(wrong_type.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn follows_are_unique_and_never_to_yourself() {
        let server = server();
        let alice = server.register("alice").await;
        let bob = server.register("bob").await;
        let alice_id = server.catalog.auth.session(&alice).await.unwrap().user.id;
        let bob_id = server.catalog.auth.session(&bob).await.unwrap().user.id;
        let follow = format!("/v1/authors/{}/follow", bob_id);

        let first = server.send(empty_request(Method::POST, &follow, &alice)).await;
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = server.send(empty_request(Method::POST, &follow, &alice)).await;
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);

        let yourself = server
            .send(empty_request(
                Method::POST,
                &format!("/v1/authors/{}/follow", alice_id),
                &alice,
            ))
            .await;
        assert_eq!(yourself.status(), StatusCode::BAD_REQUEST);

        let followers = server
            .send(get(&format!("/v1/authors/{}/followers", bob_id), None))
            .await;
        let followers = read_json(followers).await;
        assert_eq!(followers[0]["username"], "alice");
        assert_eq!(followers[0]["is_subscribed"], false);

        let unfollow = server.send(empty_request(Method::DELETE, &follow, &alice)).await;
        assert_eq!(unfollow.status(), StatusCode::NO_CONTENT);

        let again = server.send(empty_request(Method::DELETE, &follow, &alice)).await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn public_tracks_are_paginated() {
        let server = server();
        let token = server.register("bob").await;
        for name in ["One", "Two", "Three"] {
            server.upload_track(&token, name, false).await;
        }

        let response = server
            .send(get("/v1/tracks/public?page=2&page_size=2", None))
            .await;
        let page = read_json(response).await;

        assert_eq!(page["count"], 3);
        assert_eq!(page["page"], 2);
        assert_eq!(page["page_size"], 2);
        assert_eq!(page["results"].as_array().unwrap().len(), 1);
        assert_eq!(page["results"][0]["name"], "One");

        let filtered = server
            .send(get("/v1/tracks/public?name=Two", None))
            .await;
        assert_eq!(read_json(filtered).await["count"], 1);
    }

    #[tokio::test]
    async fn only_superusers_manage_genres() {
        let server = server();
        let token = server.register("bob").await;

        let refused = server
            .send(json_request(
                Method::POST,
                "/v1/genres",
                Some(&token),
                json!({ "name": "Jazz" }),
            ))
            .await;
        assert_eq!(refused.status(), StatusCode::FORBIDDEN);

        let admin = server
            .catalog
            .auth
            .register_superuser(NewPlainUser {
                email: "admin@example.com".to_string(),
                username: "admin".to_string(),
                password: "correct horse".to_string(),
            })
            .await
            .unwrap();
        let session = server.catalog.auth.start_session(admin.id).await.unwrap();

        let created = server
            .send(json_request(
                Method::POST,
                "/v1/genres",
                Some(&session.token),
                json!({ "name": "Jazz" }),
            ))
            .await;
        assert_eq!(created.status(), StatusCode::CREATED);

        let genres = server.send(get("/v1/genres", None)).await;
        assert_eq!(read_json(genres).await[0]["name"], "Jazz");
    }

    #[tokio::test]
    async fn covers_are_served_as_media() {
        let server = server();
        let token = server.register("bob").await;

        let response = server
            .send(multipart(
                Method::POST,
                "/v1/albums",
                &token,
                &[Part::Text("name", "Summer"), Part::File("cover", "c.png", PNG)],
            ))
            .await;
        let album = read_json(response).await;
        assert_eq!(album["cover"], "/v1/media/album/bob/Summer.png");

        let cover = server.send(get("/v1/media/album/bob/Summer.png", None)).await;
        assert_eq!(cover.status(), StatusCode::OK);
        assert_eq!(cover.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(read_bytes(cover).await, PNG);

        let audio = server.send(get("/v1/media/track/bob/bob-Intro.mp3", None)).await;
        assert_eq!(audio.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn comments_round_trip() {
        let server = server();
        let bob = server.register("bob").await;
        let eve = server.register("eve").await;
        let track = server.upload_track(&bob, "Intro", false).await;
        let uri = format!("/v1/tracks/{}/comments", track["id"]);

        let created = server
            .send(json_request(
                Method::POST,
                &uri,
                Some(&eve),
                json!({ "text": "nice" }),
            ))
            .await;
        assert_eq!(created.status(), StatusCode::CREATED);
        let comment = read_json(created).await;

        let edit = server
            .send(json_request(
                Method::PATCH,
                &format!("/v1/comments/{}", comment["id"]),
                Some(&bob),
                json!({ "text": "mean" }),
            ))
            .await;
        assert_eq!(edit.status(), StatusCode::FORBIDDEN);

        let listing = server.send(get(&uri, None)).await;
        assert_eq!(read_json(listing).await[0]["text"], "nice");
    }

    #[tokio::test]
    async fn the_api_is_documented() {
        let server = server();
        let response = server.send(get("/api.json", None)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let document = read_json(response).await;
        assert!(document["paths"]["/v1/streams/{id}"].is_object());
    }
}
