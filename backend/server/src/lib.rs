//! Backend of a small private gift exchange.
//!
//! Everyone is assigned exactly one other person to buy a gift for, gets a private credential to discover
//! who, and keeps a wish list their giver can read.
//!
//!
//!
//! # General Infrastructure
//! - Admin posts the participant list to `/init`, receives one credential per person
//! - Admin hands out credentials privately
//! - Participant posts their credential to `/verify-credential`, learns their giftee, gets a session cookie
//! - With the cookie, participants read and write wish lists
//! - State is kept in memory and mirrored to disk or Redis after every change
//!
//!
//!
//! # Endpoints
//!
//! All `POST`, all JSON, every response carries `success`.
//!
//! | Route                   | Body                   | Session |
//! |-------------------------|------------------------|---------|
//! | `/init`                 | `{ participants }`     | no      |
//! | `/clear`                | none                   | no      |
//! | `/verify-credential`    | `{ credential }`       | sets it |
//! | `/get-wishlist`         | none                   | yes     |
//! | `/get-wishlist-by-name` | `{ personName }`       | yes     |
//! | `/submit-wishlist`      | `{ wishList }`         | yes     |
//!
//! `/init` and `/clear` have no access control. Keep them off the public reverse proxy.
//!
//!
//!
//! # Preventing Credential Guessing
//!
//! **Goal**: Nudge people who forgot their credential towards the admin instead of guessing.
//!
//! - Failed checks are counted per client IP, taken from the reverse proxy headers
//! - Every failure returns the running count
//! - From the 5th failure the message asks to contact an administrator
//! - Nothing is ever blocked, 62^8 credentials are not guessable by hand anyway
//!
//!
//!
//! # Notes
//!
//! ## Sessions
//! The session cookie holds the plain person name. There is no signature and no server side session table,
//! trust relies on HttpOnly + SameSite=Lax only. Good enough for a family exchange, not for anything else.
//!
//! ## Concurrency
//! Wish list writes for different people never interfere. Two writes for the same person race and the later
//! save wins. A redraw racing with requests is not guarded against, redraws are rare and admin only.
//!
//!
//!
//! # Setup
//!
//! | Variable              | Default | Meaning                               |
//! |-----------------------|---------|---------------------------------------|
//! | `RUST_PORT`           | `1111`  | listen port                           |
//! | `KV_URL`              | unset   | Redis URL, switches storage to Redis  |
//! | `SANTA_DATA_DIR`      | `data`  | directory of the JSON snapshot        |
//! | `SANTA_PARTICIPANTS`  | empty   | comma separated list drawn on 1st run |
//! | `SANTA_DRAW_STRATEGY` | `queue` | `queue` or `cycles`                   |
//!
//! `KV_URL` may also come from `/run/secrets/KV_URL`.
//!
//! Run locally.
//! ```sh
//! RUST_LOG=info SANTA_PARTICIPANTS="Alex,Sam,Jordan" cargo run -p santa
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::post,
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod persistence;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

use routes::{
    clear_handler, init_handler, submit_wishlist_handler, verify_handler,
    wishlist_by_name_handler, wishlist_handler,
};
use state::AppState;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;
    state.ready().await;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = app(state);

    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    Ok(())
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/init", post(init_handler))
        .route("/clear", post(clear_handler))
        .route("/verify-credential", post(verify_handler))
        .route("/get-wishlist", post(wishlist_handler))
        .route("/get-wishlist-by-name", post(wishlist_by_name_handler))
        .route("/submit-wishlist", post(submit_wishlist_handler))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use axum::{
        body::Body,
        http::{Request, Response, StatusCode, header::SET_COOKIE},
    };
    use cookie::{Cookie, SameSite};
    use draw::Strategy;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use super::*;
    use crate::{config::Config, persistence::FileStore};

    fn test_state(dir: &Path, participants: &[&str]) -> Arc<AppState> {
        test_state_with(dir, participants, Strategy::Cycles)
    }

    fn test_state_with(dir: &Path, participants: &[&str], strategy: Strategy) -> Arc<AppState> {
        let config = Config {
            port: 0,
            kv_url: None,
            data_dir: dir.to_path_buf(),
            participants: participants.iter().map(|s| s.to_string()).collect(),
            strategy,
        };

        AppState::with_backend(config, Arc::new(FileStore::new(dir)))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn with_header(mut request: Request<Body>, name: &'static str, value: &str) -> Request<Body> {
        request
            .headers_mut()
            .insert(name, value.parse().unwrap());
        request
    }

    fn with_session(request: Request<Body>, cookie: &str) -> Request<Body> {
        with_header(request, "cookie", cookie)
    }

    async fn json_body(res: Response<Body>) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn issued_cookie(res: &Response<Body>) -> Cookie<'static> {
        let header = res.headers()[SET_COOKIE].to_str().unwrap();
        Cookie::parse(header.to_string()).unwrap()
    }

    fn cookie_pair(res: &Response<Body>) -> String {
        issued_cookie(res).stripped().to_string()
    }

    async fn init(app: &Router, participants: &[&str]) -> Vec<(String, String)> {
        let res = app
            .clone()
            .oneshot(post_json("/init", json!({ "participants": participants })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        credential_list(json_body(res).await)
    }

    fn credential_list(body: Value) -> Vec<(String, String)> {
        body["credentials"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| {
                (
                    entry["person"].as_str().unwrap().to_string(),
                    entry["credential"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }

    async fn login(app: &Router, credential: &str) -> (String, Value) {
        let res = app
            .clone()
            .oneshot(post_json(
                "/verify-credential",
                json!({ "credential": credential }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let cookie = cookie_pair(&res);
        (cookie, json_body(res).await)
    }

    #[tokio::test]
    async fn init_returns_one_credential_per_person() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &[]));

        let credentials = init(&app, &["A", " B ", "C", "A", ""]).await;

        let people: Vec<&str> = credentials.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(people, vec!["A", "B", "C"]);
        for (_, credential) in &credentials {
            assert_eq!(credential.len(), 8);
        }
    }

    #[tokio::test]
    async fn init_rejects_too_few_unique_names() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &[]));

        let res = app
            .clone()
            .oneshot(post_json("/init", json!({ "participants": ["Solo"] })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .clone()
            .oneshot(post_json("/init", json!({ "familyMembers": ["Solo", " Solo", ""] })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = json_body(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Please provide at least 2 unique participants");
    }

    #[tokio::test]
    async fn three_people_form_a_cycle() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &[]));

        let credentials = init(&app, &["A", "B", "C"]).await;

        let mut giftees = Vec::new();
        for (person, credential) in &credentials {
            let (_, body) = login(&app, credential).await;
            assert_eq!(body["personName"], person.as_str());
            assert_ne!(body["assignedGiftee"], person.as_str());
            giftees.push(body["assignedGiftee"].as_str().unwrap().to_string());
        }

        giftees.sort();
        assert_eq!(giftees, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn failed_queue_draw_keeps_previous_exchange() {
        let dir = tempdir().unwrap();
        let app = app(test_state_with(dir.path(), &[], Strategy::Queue));
        let data_file = dir.path().join(persistence::DATA_FILE);

        let mut previous: Option<(Vec<(String, String)>, Vec<u8>)> = None;
        let mut exhausted = false;

        // roughly 1 in 6 queue draws for 3 people dead-ends on the last giver
        for _ in 0..500 {
            let res = app
                .clone()
                .oneshot(post_json("/init", json!({ "participants": ["A", "B", "C"] })))
                .await
                .unwrap();

            if res.status() == StatusCode::INTERNAL_SERVER_ERROR {
                if previous.is_none() {
                    continue;
                }
                assert_eq!(json_body(res).await["success"], false);
                exhausted = true;
                break;
            }

            assert_eq!(res.status(), StatusCode::OK);
            let credentials = credential_list(json_body(res).await);
            previous = Some((credentials, std::fs::read(&data_file).unwrap()));
        }

        assert!(exhausted, "no queue draw dead-ended after a successful one");
        let (credentials, on_disk) = previous.unwrap();

        assert_eq!(std::fs::read(&data_file).unwrap(), on_disk);
        for (person, credential) in &credentials {
            let (_, body) = login(&app, credential).await;
            assert_eq!(body["personName"], person.as_str());
        }
    }

    #[tokio::test]
    async fn verify_sets_session_cookie() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &[]));
        let credentials = init(&app, &["Mary Jane", "Sam"]).await;

        let res = app
            .clone()
            .oneshot(post_json(
                "/verify-credential",
                json!({ "password": credentials[0].1 }),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let cookie = issued_cookie(&res);
        assert_eq!(cookie.name(), "secretSantaUser");
        assert_eq!(cookie.value(), "Mary%20Jane");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age().map(|age| age.whole_seconds()), Some(604800));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        let body = json_body(res).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["assignedGiftee"], "Sam");
    }

    #[tokio::test]
    async fn verify_requires_credential() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &["A", "B"]));

        let res = app
            .clone()
            .oneshot(post_json("/verify-credential", json!({ "credential": "" })))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["message"], "Credential is required");
    }

    #[tokio::test]
    async fn five_wrong_credentials_suggest_admin() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &["A", "B"]));

        for expected in 1..=5 {
            let request = with_header(
                post_json("/verify-credential", json!({ "credential": "nope1234" })),
                "x-forwarded-for",
                "203.0.113.9",
            );
            let res = app.clone().oneshot(request).await.unwrap();

            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
            assert!(res.headers().get(SET_COOKIE).is_none());

            let body = json_body(res).await;
            assert_eq!(body["attempts"], expected);

            let message = body["message"].as_str().unwrap();
            assert_eq!(message.contains("administrator"), expected == 5);
        }
    }

    #[tokio::test]
    async fn valid_credential_resets_attempts() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &[]));
        let credentials = init(&app, &["A", "B"]).await;

        for _ in 0..3 {
            app.clone()
                .oneshot(post_json("/verify-credential", json!({ "credential": "wrong" })))
                .await
                .unwrap();
        }
        login(&app, &credentials[0].1).await;

        let res = app
            .clone()
            .oneshot(post_json("/verify-credential", json!({ "credential": "wrong" })))
            .await
            .unwrap();
        assert_eq!(json_body(res).await["attempts"], 1);
    }

    #[tokio::test]
    async fn wishlist_requires_session() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &["A", "B"]));

        let res = app
            .clone()
            .oneshot(post_json("/get-wishlist", json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .clone()
            .oneshot(post_json("/submit-wishlist", json!({ "wishList": ["Socks"] })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(res).await["message"],
            "Not authenticated. Please log in again."
        );
    }

    #[tokio::test]
    async fn submit_overwrites_wishlist() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &[]));
        let credentials = init(&app, &["A", "B", "C"]).await;
        let (cookie, _) = login(&app, &credentials[0].1).await;

        for wishes in [json!(["Socks", "Socks"]), json!(["Gloves"])] {
            let request = with_session(
                post_json("/submit-wishlist", json!({ "wishList": wishes })),
                &cookie,
            );
            let res = app.clone().oneshot(request).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(json_body(res).await["success"], true);
        }

        let res = app
            .clone()
            .oneshot(with_session(post_json("/get-wishlist", json!({})), &cookie))
            .await
            .unwrap();
        assert_eq!(json_body(res).await["wishList"], json!(["Gloves"]));

        let stored = FileStore::new(dir.path());
        let snapshot = persistence::SnapshotStore::load(&stored)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.secret_santa["A"].1, vec!["Gloves".to_string()]);
    }

    #[tokio::test]
    async fn submit_rejects_more_than_five_wishes() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &[]));
        let credentials = init(&app, &["A", "B"]).await;
        let (cookie, _) = login(&app, &credentials[0].1).await;

        let request = with_session(
            post_json(
                "/submit-wishlist",
                json!({ "wishList": ["1", "2", "3", "4", "5", "6"] }),
            ),
            &cookie,
        );
        let res = app.clone().oneshot(request).await.unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn submit_for_unknown_person_reports_failure() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &["A", "B"]));

        let request = with_session(
            post_json("/submit-wishlist", json!({ "wishList": ["Socks"] })),
            "secretSantaUser=Mallory",
        );
        let res = app.clone().oneshot(request).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["success"], false);
    }

    #[tokio::test]
    async fn giver_reads_giftee_wishlist_by_name() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &[]));
        let credentials = init(&app, &["A", "B"]).await;
        let (a_cookie, _) = login(&app, &credentials[0].1).await;
        let (b_cookie, _) = login(&app, &credentials[1].1).await;

        let request = with_session(
            post_json("/submit-wishlist", json!({ "wishList": ["Book", ""] })),
            &b_cookie,
        );
        app.clone().oneshot(request).await.unwrap();

        let request = with_session(
            post_json("/get-wishlist-by-name", json!({ "personName": "B" })),
            &a_cookie,
        );
        let res = app.clone().oneshot(request).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["wishList"], json!(["Book", ""]));
    }

    #[tokio::test]
    async fn wishlist_by_name_requires_name_first() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &["A", "B"]));

        let res = app
            .clone()
            .oneshot(post_json("/get-wishlist-by-name", json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .clone()
            .oneshot(post_json("/get-wishlist-by-name", json!({ "personName": "A" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &[]));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/init")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{ participants: "))
            .unwrap();
        let res = app.oneshot(request).await.unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["message"], "Malformed payload");
    }

    #[tokio::test]
    async fn clear_forgets_everyone() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), &[]));
        let credentials = init(&app, &["A", "B"]).await;

        let res = app
            .clone()
            .oneshot(post_json("/clear", json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(post_json(
                "/verify-credential",
                json!({ "credential": credentials[0].1 }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(!dir.path().join(persistence::DATA_FILE).exists());
    }

    #[tokio::test]
    async fn restart_keeps_assignments_and_wishes() {
        let dir = tempdir().unwrap();
        let first = app(test_state(dir.path(), &[]));
        let credentials = init(&first, &["A", "B"]).await;
        let (cookie, before) = login(&first, &credentials[0].1).await;

        let request = with_session(
            post_json("/submit-wishlist", json!({ "wishList": ["Tea"] })),
            &cookie,
        );
        first.oneshot(request).await.unwrap();

        let second = app(test_state(dir.path(), &["X", "Y", "Z"]));
        let (_, after) = login(&second, &credentials[0].1).await;
        assert_eq!(after, before);

        let res = second
            .clone()
            .oneshot(with_session(post_json("/get-wishlist", json!({})), &cookie))
            .await
            .unwrap();
        assert_eq!(json_body(res).await["wishList"], json!(["Tea"]));
    }

    #[tokio::test]
    async fn first_start_draws_default_participants() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path(), &["X", "Y", "Z"]);
        let app = app(state.clone());

        let res = app
            .clone()
            .oneshot(post_json("/verify-credential", json!({ "credential": "whatever" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let credentials = state.store.credentials().await;
        assert_eq!(credentials.len(), 3);

        let (_, body) = login(&app, &credentials[2].1).await;
        assert_eq!(body["personName"], "Z");
    }
}
