#![allow(dead_code)]

use std::sync::Arc;

use github_app_client::github::{
    ApiEndpoint, AppCredentials, GitHubClient, ReqwestTransport, TokenCache,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_APP_ID: u64 = 12345;
pub const TEST_KEY: &str = include_str!("../fixtures/test_app_key.pem");

pub fn client(server: &MockServer) -> GitHubClient {
    client_with_cache(server, Arc::new(TokenCache::new()))
}

pub fn client_with_cache(server: &MockServer, cache: Arc<TokenCache>) -> GitHubClient {
    GitHubClient::new(
        AppCredentials::new(TEST_APP_ID, TEST_KEY),
        ApiEndpoint::new(server.uri()),
        Arc::new(ReqwestTransport::new(None).unwrap()),
        cache,
    )
}

/// Mount the token exchange for `installation_id`, expecting exactly `times` calls.
pub async fn mount_token_exchange(server: &MockServer, installation_id: u64, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path(format!(
            "/app/installations/{}/access_tokens",
            installation_id
        )))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "token": token,
            "expires_at": "2099-01-01T00:00:00Z",
            "permissions": {"contents": "write"},
            "repository_selection": "selected"
        })))
        .expect(times)
        .mount(server)
        .await;
}

/// `(METHOD, path)` of every request the server has seen, in arrival order.
pub async fn request_log(server: &MockServer) -> Vec<(String, String)> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| (r.method.to_string(), r.url.path().to_string()))
        .collect()
}
