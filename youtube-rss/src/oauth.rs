//! OAuth 2.0 for the YouTube Data API.
//!
//! A sync run only ever refreshes an access token from the stored refresh
//! token. The interactive installed-app flow (browser consent plus a loopback
//! redirect server) only runs from `youtube-rss authorize`.

use bytes::Bytes;
use eyre::Context;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use oauth2::basic::{BasicClient, BasicErrorResponseType, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, RedirectUrl,
    Scope, TokenResponse, TokenUrl, reqwest,
};
use std::future::Future;

/// Google's OAuth2 token endpoint, used for both code exchange and refresh.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Listing subscriptions needs nothing beyond read access.
pub const YOUTUBE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/youtube.readonly";

const OAUTH_DONE_HTML: &str = "<!DOCTYPE html><html><head><title>youtube-rss</title></head>\
    <body><p>youtube-rss is now authorized. You can close this tab.</p></body></html>";

/// The OAuth client that talks to Google on behalf of this installation.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    client_id: String,
    client_secret: Option<String>,
    token_url: String,
}

impl OAuthManager {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            token_url: token_url.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn http_client() -> eyre::Result<reqwest::Client> {
        reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build OAuth HTTP client")
    }

    /// Runs the interactive authorization flow and returns a token that
    /// carries a refresh token.
    ///
    /// Opens the user's browser on Google's consent page and waits for the
    /// redirect to land on a one-shot HTTP server bound to `127.0.0.1`.
    pub async fn authenticate(&self) -> eyre::Result<BasicTokenResponse> {
        let csrf = CsrfToken::new_random();
        let (redirect_url, eventually_authorization_code) = setup_redirect(csrf.clone())
            .await
            .context("set up redirect endpoint")?;

        let auth_uri = AuthUrl::new(GOOGLE_AUTH_URL.to_string()).context("parse auth URL")?;
        let token_uri = TokenUrl::new(self.token_url.clone()).context("parse token URL")?;
        let mut client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_auth_uri(auth_uri)
            .set_token_uri(token_uri)
            .set_redirect_uri(redirect_url);
        if let Some(secret) = &self.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _) = client
            .authorize_url(move || csrf.clone())
            .add_scope(Scope::new(YOUTUBE_READONLY_SCOPE.to_string()))
            // without these Google only hands out a refresh token on first consent
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        if let Err(e) = webbrowser::open(auth_url.as_ref()) {
            tracing::warn!(error = %e, "could not open browser");
            eprintln!("Open this URL in your browser to continue:\n\n  {auth_url}\n");
        }

        let authorization_code = eventually_authorization_code
            .await
            .context("await user authorization code")?;

        let token = client
            .exchange_code(authorization_code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&Self::http_client()?)
            .await
            .context("exchange authorization code for access token")?;

        if token.refresh_token().is_none() {
            eyre::bail!("Google did not return a refresh token; revoke the app's access and retry");
        }
        Ok(token)
    }

    /// Exchanges the refresh token in `token` for a new access token.
    ///
    /// Returns `Ok(None)` when there is no refresh token or Google reports the
    /// grant as invalid (revoked, expired), i.e. when the user has to run the
    /// interactive flow again.
    pub async fn refresh_token(
        &self,
        token: &BasicTokenResponse,
    ) -> eyre::Result<Option<BasicTokenResponse>> {
        let Some(refresh_token) = token.refresh_token() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        let token_uri = TokenUrl::new(self.token_url.clone()).context("parse token URL")?;
        let mut client =
            BasicClient::new(ClientId::new(self.client_id.clone())).set_token_uri(token_uri);
        if let Some(secret) = &self.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        match client
            .exchange_refresh_token(refresh_token)
            .request_async(&Self::http_client()?)
            .await
        {
            Ok(new_token) => {
                tracing::debug!("refreshed OAuth token");
                Ok(Some(new_token))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(sr.error(), BasicErrorResponseType::InvalidGrant) =>
            {
                tracing::warn!("OAuth refresh token rejected as invalid grant: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }
}

/// Pulls the authorization code out of the redirect's query string.
fn parse_callback(query: &str, csrf: &CsrfToken) -> Result<AuthorizationCode, &'static str> {
    let mut state = None;
    let mut code = None;
    let mut error = None;
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        match &*k {
            "state" => state = Some(v),
            "code" => code = Some(v),
            "error" => error = Some(v),
            _ => {}
        }
    }

    if state.as_deref() != Some(csrf.secret().as_str()) {
        return Err("invalid csrf token");
    }
    if error.is_some() {
        return Err("authorization was denied");
    }
    code.map(|c| AuthorizationCode::new(c.into_owned()))
        .ok_or("no authorization code found")
}

/// Binds a loopback listener and serves exactly one redirect on it.
///
/// Returns the redirect URL to hand to Google and a future resolving to the
/// authorization code once the browser comes back.
async fn setup_redirect(
    csrf: CsrfToken,
) -> eyre::Result<(
    RedirectUrl,
    impl Future<Output = eyre::Result<AuthorizationCode>>,
)> {
    let socket = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind to localhost")?;
    let addr = socket.local_addr().context("get local address")?;
    let url = RedirectUrl::new(format!("http://{addr}")).context("construct redirect url")?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let serve_one = async move {
            let (conn, _) = socket.accept().await.context("accept redirect")?;
            let conn = hyper_util::rt::TokioIo::new(conn);
            let (got, mut gotten) = tokio::sync::mpsc::channel(1);
            let service = service_fn(move |req: Request<body::Incoming>| {
                let got = got.clone();
                let result = parse_callback(req.uri().query().unwrap_or(""), &csrf);
                async move {
                    let code = result?;
                    // the receiver lives until the connection is done
                    let _ = got.send(code).await;
                    Ok::<_, &'static str>(Response::new(Full::new(Bytes::from_static(
                        OAUTH_DONE_HTML.as_bytes(),
                    ))))
                }
            });
            let mut serve = std::pin::pin!(
                hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
            );

            tokio::select! {
                exit = &mut serve => {
                    match exit {
                        Err(e) => Err(e).context("redirect server got bad request"),
                        Ok(()) => eyre::bail!("redirect server exited before receiving a code"),
                    }
                }
                code = gotten.recv() => {
                    serve.as_mut().graceful_shutdown();
                    let _ = serve.await;
                    match code {
                        Some(code) => Ok(code),
                        None => eyre::bail!("redirect server dropped the authorization code"),
                    }
                }
            }
        };
        let _ = tx.send(serve_one.await);
    });

    Ok((url, async move {
        rx.await.context("redirect future dropped prematurely")?
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oauth2::basic::BasicTokenType;
    use oauth2::{AccessToken, EmptyExtraTokenFields, RefreshToken};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_with_refresh(refresh: Option<&str>) -> BasicTokenResponse {
        let mut token = BasicTokenResponse::new(
            AccessToken::new("old-access".into()),
            BasicTokenType::Bearer,
            EmptyExtraTokenFields {},
        );
        token.set_refresh_token(refresh.map(|r| RefreshToken::new(r.into())));
        token
    }

    #[test]
    fn callback_yields_code_when_state_matches() {
        let csrf = CsrfToken::new("state-123".into());
        let query = "state=state-123&code=4%2Fabc&scope=x";
        let code = parse_callback(query, &csrf).unwrap();
        assert_eq!(code.secret(), "4/abc");
    }

    #[test]
    fn callback_rejects_wrong_state() {
        let csrf = CsrfToken::new("state-123".into());
        assert_eq!(
            parse_callback("state=other&code=abc", &csrf).unwrap_err(),
            "invalid csrf token"
        );
    }

    #[test]
    fn callback_reports_denied_consent() {
        let csrf = CsrfToken::new("s".into());
        assert_eq!(
            parse_callback("state=s&error=access_denied", &csrf).unwrap_err(),
            "authorization was denied"
        );
        assert_eq!(
            parse_callback("state=s", &csrf).unwrap_err(),
            "no authorization code found"
        );
    }

    #[tokio::test]
    async fn refresh_exchanges_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "token_type": "Bearer",
                "expires_in": 3599,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let manager = OAuthManager::new(
            "client",
            Some("secret".into()),
            format!("{}/token", server.uri()),
        );
        let refreshed = manager
            .refresh_token(&token_with_refresh(Some("refresh-1")))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(refreshed.access_token().secret(), "new-access");
    }

    #[tokio::test]
    async fn refresh_treats_invalid_grant_as_expired_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked.",
            })))
            .mount(&server)
            .await;

        let manager = OAuthManager::new("client", None, format!("{}/token", server.uri()));
        let refreshed = manager
            .refresh_token(&token_with_refresh(Some("revoked")))
            .await
            .unwrap();

        assert!(refreshed.is_none());
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_is_none() {
        let manager = OAuthManager::new("client", None, GOOGLE_TOKEN_URL);
        assert!(
            manager
                .refresh_token(&token_with_refresh(None))
                .await
                .unwrap()
                .is_none()
        );
    }
}
