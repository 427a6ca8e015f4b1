#[cfg(test)]
mod test {
    use chrono::Utc;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::tempdir;

    use crate::auth::validator::TokenStatus;
    use crate::tests::common::build_stack;

    #[tokio::test]
    async fn missing_scope_yields_consent_url() {
        let server = MockServer::start_async().await;
        let dir = tempdir().unwrap();
        let stack = build_stack(&server.base_url(), &dir.path().join("tokens.json")).await;

        let far = Utc::now().timestamp() + 30 * 86400;
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/v22.0/debug_token");
                then.status(200).json_body(json!({
                    "data": {
                        "is_valid": true,
                        "app_id": "test-app",
                        "user_id": "u1",
                        "scopes": ["ads_read"],
                        "data_access_expires_at": far,
                    }
                }));
            })
            .await;

        let result = stack
            .validator
            .check_permissions(
                "tok",
                &["ads_read".to_string(), "business_management".to_string()],
            )
            .await;

        assert!(!result.has_permission);
        assert_eq!(result.missing_permissions, vec!["business_management".to_string()]);
        assert_eq!(result.token_status, TokenStatus::Valid);

        let url = result.authorization_url.expect("consent url for missing scopes");
        assert!(url.starts_with("https://consent.example/v22.0/dialog/oauth?"));
        // union of held and required scopes so existing grants survive
        assert!(url.contains("business_management"));
        assert!(url.contains("ads_read"));
    }

    #[tokio::test]
    async fn all_scopes_present_is_a_success() {
        let server = MockServer::start_async().await;
        let dir = tempdir().unwrap();
        let stack = build_stack(&server.base_url(), &dir.path().join("tokens.json")).await;

        server
            .mock_async(|when, then| {
                when.method(GET).path("/v22.0/debug_token");
                then.status(200).json_body(json!({
                    "data": { "is_valid": true, "scopes": ["ads_read", "pages_show_list"] }
                }));
            })
            .await;

        let result = stack
            .validator
            .check_permissions("tok", &["ads_read".to_string()])
            .await;
        assert!(result.has_permission);
        assert!(result.missing_permissions.is_empty());
        assert!(result.authorization_url.is_none());
    }

    #[tokio::test]
    async fn invalid_token_reports_invalid_status() {
        let server = MockServer::start_async().await;
        let dir = tempdir().unwrap();
        let stack = build_stack(&server.base_url(), &dir.path().join("tokens.json")).await;

        server
            .mock_async(|when, then| {
                when.method(GET).path("/v22.0/debug_token");
                then.status(400).json_body(json!({
                    "error": { "message": "Invalid OAuth access token.", "code": 190 }
                }));
            })
            .await;

        let result = stack
            .validator
            .check_permissions("bad-token", &["ads_read".to_string()])
            .await;
        assert!(!result.has_permission);
        assert_eq!(result.token_status, TokenStatus::Invalid);
    }

    #[tokio::test]
    async fn expired_token_reports_expired_with_consent_url() {
        let server = MockServer::start_async().await;
        let dir = tempdir().unwrap();
        let stack = build_stack(&server.base_url(), &dir.path().join("tokens.json")).await;

        let past = Utc::now().timestamp() - 3600;
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/v22.0/debug_token");
                then.status(200).json_body(json!({
                    "data": { "is_valid": true, "scopes": ["ads_read"], "data_access_expires_at": past }
                }));
            })
            .await;

        let result = stack
            .validator
            .check_permissions("old", &["ads_read".to_string()])
            .await;
        assert!(!result.has_permission);
        assert_eq!(result.token_status, TokenStatus::Expired);
        assert!(result.authorization_url.is_some());
    }

    #[tokio::test]
    async fn extend_permissions_unions_held_and_requested_scopes() {
        let server = MockServer::start_async().await;
        let dir = tempdir().unwrap();
        let stack = build_stack(&server.base_url(), &dir.path().join("tokens.json")).await;

        server
            .mock_async(|when, then| {
                when.method(GET).path("/v22.0/debug_token");
                then.status(200).json_body(json!({
                    "data": { "is_valid": true, "scopes": ["public_profile"] }
                }));
            })
            .await;

        let auth = stack
            .validator
            .extend_permissions("tok", &["business_management".to_string()])
            .await;
        assert!(auth.url.contains("public_profile"));
        assert!(auth.url.contains("business_management"));
        assert!(auth.url.contains("response_type=code"));
        assert!(!auth.state.is_empty());
    }
}
