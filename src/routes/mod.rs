pub mod auth;
pub mod events;
pub mod health;
pub mod me;
pub mod nav;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        .route("/nav", get(nav::get_nav))
        // Sign-in
        .route("/auth/microsoft/start", get(auth::start_sign_in))
        .route("/auth/microsoft/callback", post(auth::sign_in_callback))
        .route("/auth/sign-out", post(auth::sign_out))
        // Protected routes
        .route("/me", get(me::get_me))
        // Event manager
        .route("/events", get(events::list_events))
        .route("/events/grid", get(events::events_grid))
        .route("/events/:event_id", patch(events::update_event))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::app::{create_app, AppState};
    use crate::auth::Session;
    use crate::config::testing::settings;
    use crate::services::FirebaseUser;

    fn app() -> Router {
        create_app(AppState::from_settings(settings()).unwrap())
    }

    /// A signed-in user without committee claims
    async fn volunteer_session(state: &AppState) -> Arc<Session> {
        let user = FirebaseUser {
            uid: "volunteer".into(),
            email: Some("volunteer@uky.edu".into()),
            display_name: None,
            provider_id: Some("microsoft.com".into()),
            id_token: "not-a-jwt".into(),
            refresh_token: "refresh".into(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        let session = Session::start(user, state.identity.clone(), state.jwks.clone());
        session.subscribe_claims().changed().await.unwrap();
        state.sessions.insert(session.clone());
        session
    }

    fn with_session(uri: &str, session: &Session) -> Request<Body> {
        Request::get(uri)
            .header(header::COOKIE, format!("dbportal_session={}", session.id()))
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let body = json_body(response).await;
        assert_eq!(body["services"]["token_keys"], "cold");
        assert_eq!(body["services"]["active_sessions"], 0);
    }

    #[tokio::test]
    async fn anonymous_nav_shows_home_only() {
        let response = app()
            .oneshot(Request::get("/nav").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let titles: Vec<_> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|link| link["title"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["Home"]);
    }

    #[tokio::test]
    async fn protected_routes_require_a_session() {
        for uri in ["/me", "/events", "/events/grid"] {
            let response = app()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn unknown_session_cookie_is_rejected() {
        let request = Request::get("/me")
            .header(
                header::COOKIE,
                "dbportal_session=6f1c1c4e-7f55-4d7e-9a0e-3c0d3b0f6a11",
            )
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json_body(response).await;
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn start_redirects_to_microsoft_with_state_cookie() {
        let response = app()
            .oneshot(
                Request::get("/auth/microsoft/start")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://login.microsoftonline.com/"));
        assert!(location.contains("domain_hint=uky.edu"));

        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("dbportal_signin_state="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=None"));
        assert!(cookie.contains("Secure"));
    }

    #[tokio::test]
    async fn callback_rejects_mismatched_state() {
        let request = Request::post("/auth/microsoft/callback")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, "dbportal_signin_state=expected")
            .body(Body::from("id_token=abc&state=forged"))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn callback_rejects_token_for_another_nonce() {
        let id_token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &json!({ "nonce": "other", "sub": "ms-user" }),
            &jsonwebtoken::EncodingKey::from_secret(b"test"),
        )
        .unwrap();

        let request = Request::post("/auth/microsoft/callback")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, "dbportal_signin_state=s1.n1")
            .body(Body::from(format!("state=s1&id_token={id_token}")))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json_body(response).await;
        assert_eq!(
            body["message"],
            "Microsoft ID token was not issued for this sign-in"
        );
    }

    #[tokio::test]
    async fn callback_surfaces_provider_errors() {
        let request = Request::post("/auth/microsoft/callback")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "error=access_denied&error_description=User+cancelled",
            ))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json_body(response).await;
        assert_eq!(body["message"], "User cancelled");
    }

    #[tokio::test]
    async fn sign_out_with_stale_session_clears_cookie() {
        let request = Request::post("/auth/sign-out")
            .header(header::COOKIE, "dbportal_session=not-a-session")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("dbportal_session="));
    }

    #[tokio::test]
    async fn event_routes_need_committee_claims() {
        let state = AppState::from_settings(settings()).unwrap();
        let session = volunteer_session(&state).await;

        let me = create_app(state.clone())
            .oneshot(with_session("/me", &session))
            .await
            .unwrap();
        assert_eq!(me.status(), StatusCode::OK);
        assert_eq!(json_body(me).await["provider_id"], "microsoft.com");

        for uri in ["/events", "/events/grid"] {
            let response = create_app(state.clone())
                .oneshot(with_session(uri, &session))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
            assert_eq!(json_body(response).await["code"], "FORBIDDEN");
        }
    }

    #[tokio::test]
    async fn revoked_session_is_dropped_on_next_request() {
        let state = AppState::from_settings(settings()).unwrap();
        let session = volunteer_session(&state).await;

        let before = create_app(state.clone())
            .oneshot(with_session("/me", &session))
            .await
            .unwrap();
        assert_eq!(before.status(), StatusCode::OK);

        session.revoke();

        let after = create_app(state.clone())
            .oneshot(with_session("/me", &session))
            .await
            .unwrap();
        assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.sessions.len(), 0);
    }
}
