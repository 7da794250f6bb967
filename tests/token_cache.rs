mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use github_app_client::github::{CachedToken, GitHubError, TokenCache};
use github_app_client::InstallationId;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{client, client_with_cache, mount_token_exchange, request_log, TEST_APP_ID};

const TEST_PUBLIC_KEY: &str = include_str!("fixtures/test_app_key.pub.pem");

#[tokio::test]
async fn test_empty_cache_exchanges_once_then_reuses_token() {
    let server = MockServer::start().await;
    mount_token_exchange(&server, 42, "ghs_token_42", 1).await;

    let client = client(&server);
    let id = InstallationId::new(42);

    let first = client.installation_token(id).await.unwrap();
    assert_eq!(first, "ghs_token_42");

    let second = client.installation_token(id).await.unwrap();
    assert_eq!(second, "ghs_token_42");

    assert_eq!(
        request_log(&server).await,
        vec![(
            "POST".to_string(),
            "/app/installations/42/access_tokens".to_string()
        )]
    );
}

#[tokio::test]
async fn test_exchange_is_authenticated_with_app_jwt() {
    let server = MockServer::start().await;
    mount_token_exchange(&server, 42, "ghs_token_42", 1).await;

    let client = client(&server);
    client
        .installation_token(InstallationId::new(42))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let auth = requests[0]
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let jwt = auth.strip_prefix("Bearer ").unwrap();

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[TEST_APP_ID.to_string()]);
    let claims = decode::<serde_json::Value>(
        jwt,
        &DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap(),
        &validation,
    )
    .unwrap()
    .claims;

    assert_eq!(claims["iss"], TEST_APP_ID.to_string());
    assert_eq!(
        requests[0].headers.get("accept").unwrap(),
        "application/vnd.github+json"
    );
}

#[tokio::test]
async fn test_exchange_stores_server_expiry() {
    let server = MockServer::start().await;
    mount_token_exchange(&server, 5, "ghs_token_5", 1).await;

    let cache = Arc::new(TokenCache::new());
    let client = client_with_cache(&server, cache.clone());
    client
        .installation_token(InstallationId::new(5))
        .await
        .unwrap();

    let cached = cache.get(InstallationId::new(5)).unwrap();
    assert_eq!(cached.token, "ghs_token_5");
    assert_eq!(cached.expires_at.to_rfc3339(), "2099-01-01T00:00:00+00:00");
}

#[tokio::test]
async fn test_exchange_without_expiry_uses_fallback_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/app/installations/9/access_tokens"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"token": "ghs_9"})))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(TokenCache::new());
    let client = client_with_cache(&server, cache.clone());

    let before = Utc::now();
    client
        .installation_token(InstallationId::new(9))
        .await
        .unwrap();
    let after = Utc::now();

    let expires_at = cache.get(InstallationId::new(9)).unwrap().expires_at;
    assert!(expires_at >= before + Duration::seconds(3500));
    assert!(expires_at <= after + Duration::seconds(3500));
}

#[tokio::test]
async fn test_fresh_cached_token_makes_no_network_call() {
    let server = MockServer::start().await;

    let cache = Arc::new(TokenCache::new());
    cache.insert(
        InstallationId::new(3),
        CachedToken {
            token: "ghs_cached".to_string(),
            expires_at: Utc::now() + Duration::minutes(30),
        },
    );

    let client = client_with_cache(&server, cache);
    let token = client
        .installation_token(InstallationId::new(3))
        .await
        .unwrap();

    assert_eq!(token, "ghs_cached");
    assert!(request_log(&server).await.is_empty());
}

#[tokio::test]
async fn test_token_inside_margin_is_refreshed() {
    let server = MockServer::start().await;
    mount_token_exchange(&server, 3, "ghs_refreshed", 1).await;

    let cache = Arc::new(TokenCache::new());
    cache.insert(
        InstallationId::new(3),
        CachedToken {
            token: "ghs_stale".to_string(),
            expires_at: Utc::now() + Duration::seconds(30),
        },
    );

    let client = client_with_cache(&server, cache.clone());
    let token = client
        .installation_token(InstallationId::new(3))
        .await
        .unwrap();

    assert_eq!(token, "ghs_refreshed");
    assert_eq!(cache.len(), 1);
    assert_eq!(
        cache.get(InstallationId::new(3)).unwrap().token,
        "ghs_refreshed"
    );
}

#[tokio::test]
async fn test_installations_are_cached_independently() {
    let server = MockServer::start().await;
    mount_token_exchange(&server, 1, "ghs_one", 1).await;
    mount_token_exchange(&server, 2, "ghs_two", 1).await;

    let cache = Arc::new(TokenCache::new());
    let client = client_with_cache(&server, cache.clone());

    assert_eq!(
        client.installation_token(InstallationId::new(1)).await.unwrap(),
        "ghs_one"
    );
    assert_eq!(
        client.installation_token(InstallationId::new(2)).await.unwrap(),
        "ghs_two"
    );
    assert_eq!(
        client.installation_token(InstallationId::new(1)).await.unwrap(),
        "ghs_one"
    );
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_clients_sharing_a_cache_share_tokens() {
    let server = MockServer::start().await;
    mount_token_exchange(&server, 11, "ghs_shared", 1).await;

    let cache = Arc::new(TokenCache::new());
    let first = client_with_cache(&server, cache.clone());
    let second = client_with_cache(&server, cache);

    first
        .installation_token(InstallationId::new(11))
        .await
        .unwrap();
    assert_eq!(
        second
            .installation_token(InstallationId::new(11))
            .await
            .unwrap(),
        "ghs_shared"
    );
}

#[tokio::test]
async fn test_failed_exchange_is_upstream_error_and_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/app/installations/13/access_tokens"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})),
        )
        .mount(&server)
        .await;

    let cache = Arc::new(TokenCache::new());
    let client = client_with_cache(&server, cache.clone());
    let err = client
        .installation_token(InstallationId::new(13))
        .await
        .unwrap_err();

    match err {
        GitHubError::Upstream { status, body } => {
            assert_eq!(status.as_u16(), 401);
            assert!(body.contains("Bad credentials"));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_exchange_response_without_token_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/app/installations/14/access_tokens"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"expires_at": "2099-01-01T00:00:00Z"})))
        .mount(&server)
        .await;

    let err = client(&server)
        .installation_token(InstallationId::new(14))
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::Decode(_)));
}

#[tokio::test]
async fn test_invalid_signing_key_fails_before_any_request() {
    let server = MockServer::start().await;

    let client = github_app_client::GitHubClient::new(
        github_app_client::github::AppCredentials::new(TEST_APP_ID, "not a key"),
        github_app_client::github::ApiEndpoint::new(server.uri()),
        Arc::new(github_app_client::github::ReqwestTransport::new(None).unwrap()),
        Arc::new(TokenCache::new()),
    );

    let err = client
        .installation_token(InstallationId::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::Configuration(_)));
    assert!(request_log(&server).await.is_empty());
}

#[tokio::test]
async fn test_api_requests_use_installation_token() {
    let server = MockServer::start().await;
    mount_token_exchange(&server, 21, "ghs_api", 1).await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/git/ref/heads/main"))
        .and(header("authorization", "Bearer ghs_api"))
        .and(header("x-github-api-version", "2022-11-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ref": "refs/heads/main",
            "object": {"sha": "abc123", "type": "commit"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    let repo = github_app_client::RepoName::new("o/r").unwrap();
    for _ in 0..2 {
        let git_ref = client
            .get_ref(InstallationId::new(21), &repo, "main")
            .await
            .unwrap();
        assert_eq!(git_ref.object.sha, "abc123");
    }
}
