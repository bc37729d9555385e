use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response, StatusCode},
    Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower::ServiceExt;

use spotify_sync::server::{
    self,
    cookies::CookieSettings,
    services::{Registry, RegistryData},
    AppState,
};
use spotify_sync::testing::{
    playing, test_user, FakeProvider, FakeSpotify, MemoryRegistryStore, UpstreamReply, VALID_CODE,
};

struct TestServer {
    app: Router,
    spotify: Arc<FakeSpotify>,
    provider: Arc<FakeProvider>,
    store: Arc<MemoryRegistryStore>,
}

impl TestServer {
    fn new(data: RegistryData) -> Self {
        let store = Arc::new(MemoryRegistryStore::new(data));
        let registry = Arc::new(Registry::load(store.clone()).unwrap());
        let provider = Arc::new(FakeProvider::new());
        let spotify = Arc::new(FakeSpotify::new());
        let state = AppState::new(
            registry,
            provider.clone(),
            spotify.clone(),
            CookieSettings::default(),
        );

        Self {
            app: server::router(state),
            spotify,
            provider,
            store,
        }
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.app
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

fn with_sharer(id: &str) -> RegistryData {
    let mut data = RegistryData::default();
    data.permitted_sharers.push(id.to_string());
    data.registered_users.insert(id.to_string(), test_user(id));
    data
}

fn with_admin(id: &str) -> RegistryData {
    RegistryData {
        admins: vec![id.to_string()],
        ..RegistryData::default()
    }
}

fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

fn token_cookie_header(access_token: &str) -> String {
    let expiry = Utc::now().timestamp() + 3600;
    format!(
        "access_token={}; refresh_token=admin-refresh; expiry={}",
        access_token, expiry
    )
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn home_says_hello() {
    let server = TestServer::new(RegistryData::default());

    let response = server.get("/", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "hello world");
}

#[tokio::test]
async fn current_track_requires_user_param() {
    let server = TestServer::new(RegistryData::default());

    let missing = server.get("/currentTrack", None).await;
    let empty = server.get("/currentTrack?user=", None).await;

    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(missing).await["error"],
        "missing query param 'user'"
    );
}

#[tokio::test]
async fn current_track_for_unregistered_user_is_not_found() {
    let server = TestServer::new(with_sharer("bob"));

    let response = server.get("/currentTrack?user=alice", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.spotify.currently_playing_count(), 0);
}

#[tokio::test]
async fn current_track_serves_the_playing_item() {
    let server = TestServer::new(with_sharer("bob"));
    server
        .spotify
        .reply_with(UpstreamReply::Playing(playing("spotify:track:abc")));

    let response = server.get("/currentTrack?user=bob", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );

    let json = body_json(response).await;
    assert_eq!(json["item"]["uri"], "spotify:track:abc");
    assert_eq!(json["is_playing"], true);
    assert_eq!(json["currently_playing_type"], "track");
    assert!(json["fetched"].as_i64().unwrap() > 0);

    // Served from cache the second time
    let again = server.get("/currentTrack?user=bob", None).await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(server.spotify.currently_playing_count(), 1);
}

#[tokio::test]
async fn upstream_failure_is_a_generic_500() {
    let server = TestServer::new(with_sharer("bob"));
    server.spotify.reply_with(UpstreamReply::Status(502));

    let response = server.get("/currentTrack?user=bob", None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "internal server error");
}

#[tokio::test]
async fn login_redirects_with_state_cookie() {
    let server = TestServer::new(RegistryData::default());

    let response = server.get("/login", None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    let state = cookies[0]
        .strip_prefix("state=")
        .and_then(|rest| rest.split(';').next())
        .unwrap()
        .to_string();
    assert_eq!(state.len(), 16);
    assert!(cookies[0].contains("HttpOnly"));

    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.contains(&format!("state={}", state)));
}

#[tokio::test]
async fn callback_with_mismatched_state_is_rejected() {
    let server = TestServer::new(RegistryData::default());

    let response = server
        .get(
            &format!("/spotifyCallback?code={}&state=xyz999", VALID_CODE),
            Some("state=abc123"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(server.provider.exchange_count(), 0);
}

#[tokio::test]
async fn callback_without_state_cookie_is_a_bad_request() {
    let server = TestServer::new(RegistryData::default());

    let response = server
        .get(
            &format!("/spotifyCallback?code={}&state=abc123", VALID_CODE),
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.provider.exchange_count(), 0);
}

#[tokio::test]
async fn callback_sets_token_cookies_and_registers_permitted_sharer() {
    let data = RegistryData {
        permitted_sharers: vec!["carol".to_string()],
        ..RegistryData::default()
    };
    let server = TestServer::new(data);
    server
        .spotify
        .add_profile(&FakeProvider::issued_access_token(), "carol", Some("Carol"));

    let response = server
        .get(
            &format!("/spotifyCallback?code={}&state=abc123", VALID_CODE),
            Some("state=abc123; nextSyncUser=bob"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/sync?user=bob");

    let cookies = set_cookies(&response);
    let access = format!("access_token={};", FakeProvider::issued_access_token());
    assert!(cookies.iter().any(|c| c.starts_with(&access)));
    assert!(cookies.iter().any(|c| c.starts_with("refresh_token=issued-refresh;")));
    assert!(cookies.iter().any(|c| c.starts_with("expiry=")));
    // State and next-user cookies are cleared
    assert!(cookies.iter().any(|c| c.starts_with("state=;")));
    assert!(cookies.iter().any(|c| c.starts_with("nextSyncUser=;")));

    let stored = server.store.stored();
    assert_eq!(stored.registered_users["carol"].display_name.as_deref(), Some("Carol"));
}

#[tokio::test]
async fn callback_with_provider_error_is_a_bad_request() {
    let server = TestServer::new(RegistryData::default());

    let response = server
        .get(
            "/spotifyCallback?error=access_denied&state=abc123",
            Some("state=abc123"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.provider.exchange_count(), 0);
}

#[tokio::test]
async fn permit_sharer_requires_login() {
    let server = TestServer::new(with_admin("admin"));

    let response = server.get("/permitSharer?sharer=bob", None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(server.store.stored().permitted_sharers.is_empty());
}

#[tokio::test]
async fn permit_sharer_rejects_non_admin() {
    let server = TestServer::new(with_admin("admin"));
    server.spotify.add_profile("mallory-access", "mallory", None);

    let cookie = token_cookie_header("mallory-access");
    let response = server
        .get("/permitSharer?sharer=bob", Some(&cookie))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(server.store.stored().permitted_sharers.is_empty());
}

#[tokio::test]
async fn permit_sharer_by_admin_is_idempotent() {
    let server = TestServer::new(with_admin("admin"));
    server.spotify.add_profile("admin-access", "admin", None);
    let cookie = token_cookie_header("admin-access");

    let first = server
        .get("/permitSharer?sharer=bob", Some(&cookie))
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        body_text(first).await,
        "permitted bob to register as a sharer"
    );

    let second = server
        .get("/permitSharer?sharer=bob", Some(&cookie))
        .await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_text(second).await, "bob already permitted");

    assert_eq!(server.store.stored().permitted_sharers, vec!["bob".to_string()]);
}

#[tokio::test]
async fn permit_sharer_requires_sharer_param() {
    let server = TestServer::new(with_admin("admin"));
    let cookie = token_cookie_header("admin-access");

    let response = server.get("/permitSharer", Some(&cookie)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
