use calbridge_providers::{
    HttpSettings, OAuthClientConfig, OAuthFlavor, OAuthTokenProvider, ProviderErrorCode,
    TokenProvider,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> OAuthTokenProvider {
    let config = OAuthClientConfig::new(OAuthFlavor::Google, "client-1")
        .with_client_secret("secret")
        .with_redirect_uri("http://localhost:8080/callback")
        .with_token_url(format!("{}/token", server.uri()));
    OAuthTokenProvider::new(config, &HttpSettings::default()).unwrap()
}

#[tokio::test]
async fn exchanges_authorization_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .and(body_string_contains("client_id=client-1"))
        .and(body_string_contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pair = provider(&server).exchange_code("abc").await.unwrap();
    assert_eq!(pair.access_token, "at-1");
    assert_eq!(pair.refresh_token.as_deref(), Some("rt-1"));
    assert_eq!(pair.expires_in, Some(3599));
}

#[tokio::test]
async fn refresh_without_rotation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-2",
            "expires_in": 3599
        })))
        .mount(&server)
        .await;

    let pair = provider(&server).refresh("rt-1").await.unwrap();
    assert_eq!(pair.access_token, "at-2");
    assert!(pair.refresh_token.is_none());
}

#[tokio::test]
async fn invalid_grant_is_authentication_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let err = provider(&server).refresh("revoked").await.unwrap_err();
    assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
    assert!(err.message().contains("invalid_grant"));
}

#[tokio::test]
async fn token_endpoint_outage_is_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = provider(&server).refresh("rt").await.unwrap_err();
    assert_eq!(err.code(), ProviderErrorCode::ServerError);
    assert!(err.is_retryable());
}
