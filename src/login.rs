//! Installed-application OAuth2 flow for Google accounts
//!
//! The interactive login opens a one-shot HTTP listener on the loopback
//! interface, sends the user to Google's consent page and waits for the
//! redirect carrying the authorization code. Refreshing exchanges the stored
//! refresh token at the credential's token endpoint.

use async_trait::async_trait;
use chrono::Utc;
use google_gmail1::yup_oauth2::{self, ApplicationSecret};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};
use url::Url;

use crate::auth::{AuthFlow, Credential};
use crate::error::{Result, SorterError};

/// Used when a client needs an authorization endpoint but never visits it
const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

const SUCCESS_PAGE: &str =
    "The authentication flow has completed. You may close this window.";
const DENIED_PAGE: &str = "Authorization was not granted. You may close this window.";

/// Production [`AuthFlow`] for a desktop OAuth2 client
pub struct InstalledAppFlow {
    client_secrets_path: PathBuf,
    scopes: Vec<String>,
}

impl InstalledAppFlow {
    /// The secrets file is only read when an interactive login is needed
    pub fn new(client_secrets_path: impl Into<PathBuf>, scopes: &[&str]) -> Self {
        Self {
            client_secrets_path: client_secrets_path.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn read_secret(&self) -> Result<ApplicationSecret> {
        yup_oauth2::read_application_secret(&self.client_secrets_path)
            .await
            .map_err(|e| {
                SorterError::AuthError(format!(
                    "Failed to read client secrets from {:?}: {}",
                    self.client_secrets_path, e
                ))
            })
    }

    fn credential_from_response(
        &self,
        response: &BasicTokenResponse,
        client_id: &str,
        client_secret: &str,
        token_uri: &str,
        previous_refresh_token: Option<&str>,
    ) -> Credential {
        let expiry = response
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| Utc::now() + d);

        let scopes = response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
            .unwrap_or_else(|| self.scopes.clone());

        Credential {
            token: response.access_token().secret().clone(),
            // Google omits the refresh token on refresh responses
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| previous_refresh_token.map(str::to_string)),
            token_uri: token_uri.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scopes,
            expiry,
        }
    }
}

fn oauth_client(
    client_id: &str,
    client_secret: &str,
    auth_uri: &str,
    token_uri: &str,
) -> Result<BasicClient> {
    let auth_url = AuthUrl::new(auth_uri.to_string())
        .map_err(|e| SorterError::AuthError(format!("Invalid auth URI '{}': {}", auth_uri, e)))?;
    let token_url = TokenUrl::new(token_uri.to_string())
        .map_err(|e| SorterError::AuthError(format!("Invalid token URI '{}': {}", token_uri, e)))?;

    Ok(BasicClient::new(
        ClientId::new(client_id.to_string()),
        Some(ClientSecret::new(client_secret.to_string())),
        auth_url,
        Some(token_url),
    )
    .set_auth_type(AuthType::RequestBody))
}

#[async_trait]
impl AuthFlow for InstalledAppFlow {
    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| SorterError::AuthError("Credential has no refresh token".to_string()))?;

        let client = oauth_client(
            &credential.client_id,
            &credential.client_secret,
            GOOGLE_AUTH_URI,
            &credential.token_uri,
        )?;

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| SorterError::AuthError(format!("Failed to refresh token: {}", e)))?;

        debug!("Refreshed access token");
        Ok(self.credential_from_response(
            &response,
            &credential.client_id,
            &credential.client_secret,
            &credential.token_uri,
            Some(refresh_token),
        ))
    }

    async fn interactive_login(&self) -> Result<Credential> {
        let secret = self.read_secret().await?;

        let listener = CallbackListener::bind().await?;
        let redirect_uri = listener.redirect_uri();

        let client = oauth_client(
            &secret.client_id,
            &secret.client_secret,
            &secret.auth_uri,
            &secret.token_uri,
        )?
        .set_redirect_uri(RedirectUrl::new(redirect_uri.clone()).map_err(|e| {
            SorterError::AuthError(format!("Invalid redirect URI '{}': {}", redirect_uri, e))
        })?);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf_state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        println!(
            "Please visit this URL to authorize this application: {}",
            auth_url
        );
        if let Err(e) = open::that(auth_url.as_str()) {
            warn!("Could not open a browser: {}", e);
        }

        // Consumes the listener; the port is released once the redirect arrives or the wait fails
        let code = listener.wait_for_code(csrf_state.secret()).await?;

        let response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| SorterError::AuthError(format!("Failed to exchange code: {}", e)))?;

        Ok(self.credential_from_response(
            &response,
            &secret.client_id,
            &secret.client_secret,
            &secret.token_uri,
            None,
        ))
    }
}

/// What a request to the callback listener carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code { code: String, state: String },
    Denied(String),
    /// Anything else the browser asks for, e.g. `/favicon.ico`
    Ignored,
}

/// Interpret the request line of an HTTP request to the callback listener
pub fn parse_callback(request_line: &str) -> CallbackOutcome {
    let mut parts = request_line.split_whitespace();
    let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
        return CallbackOutcome::Ignored;
    };

    let Ok(url) = Url::parse(&format!("http://127.0.0.1{}", target)) else {
        return CallbackOutcome::Ignored;
    };
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

    if let Some(error) = params.get("error") {
        return CallbackOutcome::Denied(error.clone());
    }

    match params.get("code") {
        Some(code) => CallbackOutcome::Code {
            code: code.clone(),
            state: params.get("state").cloned().unwrap_or_default(),
        },
        None => CallbackOutcome::Ignored,
    }
}

/// One-shot loopback listener for the OAuth2 redirect
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

impl CallbackListener {
    /// Bind to an ephemeral port on 127.0.0.1
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        debug!("OAuth callback listener bound to port {}", port);
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    /// Wait for the redirect and return its authorization code
    ///
    /// Takes `self` so the socket is closed when this returns, whatever the
    /// outcome. A connection that fails or sends something unreadable is
    /// dropped and the wait goes on.
    pub async fn wait_for_code(self, expected_state: &str) -> Result<String> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept OAuth callback connection: {}", e);
                    continue;
                }
            };

            let (request_line, mut stream) = match read_request(stream).await {
                Ok(request) => request,
                Err(e) => {
                    warn!("Dropping unreadable callback request from {}: {}", peer, e);
                    continue;
                }
            };

            let (status, page, result) = match parse_callback(&request_line) {
                CallbackOutcome::Ignored => {
                    debug!("Ignoring callback request: {}", request_line.trim());
                    if let Err(e) = respond(&mut stream, "404 Not Found", "Not found").await {
                        debug!("Could not answer ignored request from {}: {}", peer, e);
                    }
                    continue;
                }
                CallbackOutcome::Denied(error) => (
                    "200 OK",
                    DENIED_PAGE,
                    Err(SorterError::AuthError(format!(
                        "Authorization denied: {}",
                        error
                    ))),
                ),
                CallbackOutcome::Code { state, .. } if state != expected_state => (
                    "400 Bad Request",
                    "State mismatch",
                    Err(SorterError::AuthError(
                        "OAuth state mismatch in callback".to_string(),
                    )),
                ),
                CallbackOutcome::Code { code, .. } => ("200 OK", SUCCESS_PAGE, Ok(code)),
            };

            // The outcome stands even if the browser went away before the reply
            if let Err(e) = respond(&mut stream, status, page).await {
                warn!("Could not answer OAuth callback: {}", e);
            }
            return result;
        }
    }
}

/// Read the request line and drain the headers
///
/// Bytes that are not UTF-8 are replaced, so a malformed request parses as
/// an ignored one.
async fn read_request(stream: TcpStream) -> std::io::Result<(String, TcpStream)> {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).await?;

    // Drain the headers so closing the socket does not reset the connection
    let mut header = Vec::new();
    while reader.read_until(b'\n', &mut header).await? > 2 {
        header.clear();
    }

    Ok((String::from_utf8_lossy(&line).into_owned(), reader.into_inner()))
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) -> Result<()> {
    let page = format!("<html><body><p>{}</p></body></html>", body);
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        page.len(),
        page
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
