// Service facade flows: cached lookup with transparent refresh, and OAuth
// code exchange persisting the validated record.

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::tempdir;

    use crate::auth::service::TokenAccess;
    use crate::store::record::{TokenKind, TokenRecord};
    use crate::tests::common::build_stack;

    #[tokio::test]
    async fn valid_cached_token_is_served_without_provider_calls() {
        let server = MockServer::start_async().await;
        let dir = tempdir().unwrap();
        let stack = build_stack(&server.base_url(), &dir.path().join("tokens.json")).await;

        let debug = server
            .mock_async(|when, then| {
                when.method(GET).path("/v22.0/debug_token");
                then.status(200).json_body(json!({ "data": { "is_valid": true } }));
            })
            .await;

        let record = TokenRecord::new(TokenKind::User, "u1", "cached-token")
            .with_expiry(Some(Utc::now() + Duration::hours(2)));
        stack.store.put(TokenKind::User, "u1", &record).await.unwrap();

        match stack.service.get_token(TokenKind::User, "u1").await {
            TokenAccess::Granted(found) => assert_eq!(found.access_token, "cached-token"),
            TokenAccess::AuthRequired { message, .. } => panic!("unexpected auth required: {message}"),
        }
        assert_eq!(debug.hits_async().await, 0, "cache hit needs no introspection");
    }

    #[tokio::test]
    async fn expired_cached_token_is_refreshed_in_place() {
        let server = MockServer::start_async().await;
        let dir = tempdir().unwrap();
        let stack = build_stack(&server.base_url(), &dir.path().join("tokens.json")).await;

        let record = TokenRecord::new(TokenKind::User, "u1", "expired-token")
            .with_expiry(Some(Utc::now() - Duration::hours(1)));
        stack.store.put(TokenKind::User, "u1", &record).await.unwrap();

        // expired per the store, but the provider still honors the exchange
        let soon = Utc::now().timestamp() + 60;
        let far = Utc::now().timestamp() + 60 * 86400;
        server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path("/v22.0/debug_token")
                    .query_param("input_token", "expired-token");
                then.status(200).json_body(json!({
                    "data": { "is_valid": true, "user_id": "u1", "data_access_expires_at": soon }
                }));
            })
            .await;
        server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path("/v22.0/debug_token")
                    .query_param("input_token", "renewed-token");
                then.status(200).json_body(json!({
                    "data": { "is_valid": true, "user_id": "u1", "data_access_expires_at": far }
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v22.0/oauth/access_token")
                    .query_param("fb_exchange_token", "expired-token");
                then.status(200).json_body(json!({ "access_token": "renewed-token" }));
            })
            .await;

        match stack.service.get_token(TokenKind::User, "u1").await {
            TokenAccess::Granted(found) => {
                assert_eq!(found.access_token, "renewed-token");
                assert!(!found.is_expired());
            }
            TokenAccess::AuthRequired { message, .. } => panic!("unexpected auth required: {message}"),
        }
    }

    #[tokio::test]
    async fn dead_token_degrades_to_auth_required() {
        let server = MockServer::start_async().await;
        let dir = tempdir().unwrap();
        let stack = build_stack(&server.base_url(), &dir.path().join("tokens.json")).await;

        let record = TokenRecord::new(TokenKind::User, "u1", "dead-token")
            .with_expiry(Some(Utc::now() - Duration::days(2)));
        stack.store.put(TokenKind::User, "u1", &record).await.unwrap();

        server
            .mock_async(|when, then| {
                when.method(GET).path("/v22.0/debug_token");
                then.status(200).json_body(json!({ "data": { "is_valid": false } }));
            })
            .await;

        match stack.service.get_token(TokenKind::User, "u1").await {
            TokenAccess::AuthRequired { authorization_url, .. } => {
                assert!(authorization_url.starts_with("https://consent.example/"));
            }
            TokenAccess::Granted(_) => panic!("dead token must not be granted"),
        }
    }

    #[tokio::test]
    async fn code_exchange_persists_the_validated_record() {
        let server = MockServer::start_async().await;
        let dir = tempdir().unwrap();
        let stack = build_stack(&server.base_url(), &dir.path().join("tokens.json")).await;

        let far = Utc::now().timestamp() + 60 * 86400;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v22.0/oauth/access_token")
                    .query_param("code", "auth-code-123")
                    .query_param("redirect_uri", "http://localhost:8080/auth/callback");
                then.status(200).json_body(json!({ "access_token": "granted-token" }));
            })
            .await;
        server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path("/v22.0/debug_token")
                    .query_param("input_token", "granted-token");
                then.status(200).json_body(json!({
                    "data": {
                        "is_valid": true,
                        "user_id": "new-user",
                        "scopes": ["ads_read", "public_profile"],
                        "data_access_expires_at": far,
                    }
                }));
            })
            .await;

        let record = stack.service.exchange_code("auth-code-123").await.unwrap();
        assert_eq!(record.identity, "new-user");
        assert_eq!(record.access_token, "granted-token");
        assert_eq!(record.scopes, vec!["ads_read".to_string(), "public_profile".to_string()]);

        let stored = stack.store.get(TokenKind::User, "new-user").await.unwrap().unwrap();
        assert_eq!(stored.access_token, "granted-token");
    }

    #[tokio::test]
    async fn code_exchange_rejects_invalid_grants() {
        let server = MockServer::start_async().await;
        let dir = tempdir().unwrap();
        let stack = build_stack(&server.base_url(), &dir.path().join("tokens.json")).await;

        server
            .mock_async(|when, then| {
                when.method(GET).path("/v22.0/oauth/access_token");
                then.status(400).json_body(json!({
                    "error": { "message": "Invalid verification code format.", "code": 100 }
                }));
            })
            .await;

        assert!(stack.service.exchange_code("bogus").await.is_err());
    }
}
