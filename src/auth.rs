//! Credential lifecycle and Gmail hub construction
//!
//! A stored credential is reused while valid, refreshed once it expires if
//! it carries a refresh token, and otherwise replaced through the
//! interactive login in [`crate::login`]. Any new or refreshed credential
//! is written back to the store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use google_gmail1::{hyper_rustls, hyper_util, Gmail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::client::{GmailHub, GMAIL_MODIFY_SCOPE};
use crate::error::{Result, SorterError};

/// Scopes requested during interactive login
pub const REQUIRED_SCOPES: &[&str] = &[GMAIL_MODIFY_SCOPE];

/// Fixed location of the OAuth2 client secret file
pub const CLIENT_SECRETS_PATH: &str = "credentials.json";

/// Fixed location of the credential cache
pub const TOKEN_CACHE_PATH: &str = "token.json";

/// Default Google token endpoint
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// A token this close to its expiry is treated as expired
const EXPIRY_SKEW_SECS: i64 = 60;

/// OAuth2 token bundle in Google's authorized-user JSON format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl Credential {
    /// Credentials without an expiry never expire
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now,
            None => false,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && !self.is_expired(now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }
}

/// Where a stored credential stands at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    Absent,
    Valid(Credential),
    ExpiredRefreshable(Credential),
    ExpiredUnrefreshable(Credential),
}

impl CredentialState {
    pub fn classify(stored: Option<Credential>, now: DateTime<Utc>) -> Self {
        match stored {
            None => CredentialState::Absent,
            Some(credential) if credential.is_valid(now) => CredentialState::Valid(credential),
            Some(credential) if credential.can_refresh() => {
                CredentialState::ExpiredRefreshable(credential)
            }
            Some(credential) => CredentialState::ExpiredUnrefreshable(credential),
        }
    }
}

/// Persistence for the credential between runs
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `None` when nothing has been stored yet
    async fn load(&self) -> Result<Option<Credential>>;

    async fn save(&self, credential: &Credential) -> Result<()>;
}

/// Ways to obtain a fresh credential
#[async_trait]
pub trait AuthFlow: Send + Sync {
    /// Exchange the credential's refresh token for a new access token
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;

    /// Run the browser consent flow from scratch
    async fn interactive_login(&self) -> Result<Credential>;
}

/// Obtain a usable credential, refreshing or logging in as needed
pub async fn authenticate<S, F>(store: &S, flow: &F) -> Result<Credential>
where
    S: CredentialStore + ?Sized,
    F: AuthFlow + ?Sized,
{
    let stored = store.load().await?;

    let credential = match CredentialState::classify(stored, Utc::now()) {
        CredentialState::Valid(credential) => {
            debug!("Reusing stored credential");
            return Ok(credential);
        }
        CredentialState::ExpiredRefreshable(credential) => {
            info!("Stored credential expired, refreshing");
            flow.refresh(&credential).await?
        }
        CredentialState::ExpiredUnrefreshable(_) => {
            info!("Stored credential expired and cannot be refreshed, starting login");
            flow.interactive_login().await?
        }
        CredentialState::Absent => {
            info!("No stored credential, starting login");
            flow.interactive_login().await?
        }
    };

    store.save(&credential).await?;
    Ok(credential)
}

/// Credential cache kept as a JSON file
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let credential = serde_json::from_str(&content)?;
        Ok(Some(credential))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(credential)?;
        tokio::fs::write(&self.path, content).await?;
        secure_token_file(&self.path).await?;

        debug!("Saved credential to {:?}", self.path);
        Ok(())
    }
}

/// Restrict the credential file to its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows relies on the ACLs of the containing directory
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}

/// Build the Gmail API hub authorized with the credential's access token
pub fn build_hub(credential: &Credential) -> Result<GmailHub> {
    // HTTP/1 only; google-gmail1 behaves better with it than with HTTP/2
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| SorterError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, credential.token.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use tempfile::NamedTempFile;

    mockall::mock! {
        pub TestStore {}

        #[async_trait]
        impl CredentialStore for TestStore {
            async fn load(&self) -> Result<Option<Credential>>;
            async fn save(&self, credential: &Credential) -> Result<()>;
        }
    }

    mockall::mock! {
        pub TestFlow {}

        #[async_trait]
        impl AuthFlow for TestFlow {
            async fn refresh(&self, credential: &Credential) -> Result<Credential>;
            async fn interactive_login(&self) -> Result<Credential>;
        }
    }

    fn credential(token: &str, refresh: Option<&str>, expires_in_secs: i64) -> Credential {
        Credential {
            token: token.to_string(),
            refresh_token: refresh.map(str::to_string),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            scopes: vec![GMAIL_MODIFY_SCOPE.to_string()],
            expiry: Some(Utc::now() + Duration::seconds(expires_in_secs)),
        }
    }

    #[test]
    fn test_classify_states() {
        let now = Utc::now();

        assert_eq!(CredentialState::classify(None, now), CredentialState::Absent);

        let valid = credential("tok", Some("ref"), 3600);
        assert!(matches!(
            CredentialState::classify(Some(valid), now),
            CredentialState::Valid(_)
        ));

        let refreshable = credential("tok", Some("ref"), -10);
        assert!(matches!(
            CredentialState::classify(Some(refreshable), now),
            CredentialState::ExpiredRefreshable(_)
        ));

        let unrefreshable = credential("tok", None, -10);
        assert!(matches!(
            CredentialState::classify(Some(unrefreshable), now),
            CredentialState::ExpiredUnrefreshable(_)
        ));
    }

    #[test]
    fn test_expiry_skew() {
        let now = Utc::now();
        let almost_expired = credential("tok", Some("ref"), 30);
        assert!(almost_expired.is_expired(now));

        let mut no_expiry = credential("tok", None, 0);
        no_expiry.expiry = None;
        assert!(no_expiry.is_valid(now));
    }

    #[tokio::test]
    async fn test_valid_credential_skips_flow() {
        let stored = credential("tok", Some("ref"), 3600);
        let returned = stored.clone();

        let mut store = MockTestStore::new();
        store.expect_load().times(1).returning(move || Ok(Some(returned.clone())));
        store.expect_save().never();

        let mut flow = MockTestFlow::new();
        flow.expect_interactive_login().never();
        flow.expect_refresh().never();

        let result = authenticate(&store, &flow).await.unwrap();
        assert_eq!(result, stored);
    }

    #[tokio::test]
    async fn test_expired_credential_refreshed_once_and_saved() {
        let expired = credential("old", Some("ref"), -60);
        let refreshed = credential("new", Some("ref"), 3600);

        let mut store = MockTestStore::new();
        let loaded = expired.clone();
        store.expect_load().times(1).returning(move || Ok(Some(loaded.clone())));
        store
            .expect_save()
            .with(eq(refreshed.clone()))
            .times(1)
            .returning(|_| Ok(()));

        let mut flow = MockTestFlow::new();
        let fresh = refreshed.clone();
        flow.expect_refresh()
            .with(eq(expired.clone()))
            .times(1)
            .returning(move |_| Ok(fresh.clone()));
        flow.expect_interactive_login().never();

        let result = authenticate(&store, &flow).await.unwrap();
        assert_eq!(result.token, "new");
    }

    #[tokio::test]
    async fn test_missing_credential_runs_login() {
        let mut store = MockTestStore::new();
        store.expect_load().times(1).returning(|| Ok(None));
        store.expect_save().times(1).returning(|_| Ok(()));

        let mut flow = MockTestFlow::new();
        flow.expect_refresh().never();
        flow.expect_interactive_login()
            .times(1)
            .returning(|| Ok(credential("fresh", Some("ref"), 3600)));

        let result = authenticate(&store, &flow).await.unwrap();
        assert_eq!(result.token, "fresh");
    }

    #[tokio::test]
    async fn test_unrefreshable_credential_runs_login() {
        let mut store = MockTestStore::new();
        store
            .expect_load()
            .times(1)
            .returning(|| Ok(Some(credential("old", None, -60))));
        store.expect_save().times(1).returning(|_| Ok(()));

        let mut flow = MockTestFlow::new();
        flow.expect_refresh().never();
        flow.expect_interactive_login()
            .times(1)
            .returning(|| Ok(credential("fresh", Some("ref"), 3600)));

        let result = authenticate(&store, &flow).await.unwrap();
        assert_eq!(result.token, "fresh");
    }

    #[tokio::test]
    async fn test_refresh_failure_propagates_without_save() {
        let mut store = MockTestStore::new();
        store
            .expect_load()
            .returning(|| Ok(Some(credential("old", Some("revoked"), -60))));
        store.expect_save().never();

        let mut flow = MockTestFlow::new();
        flow.expect_refresh()
            .times(1)
            .returning(|_| Err(SorterError::AuthError("invalid_grant".to_string())));

        let result = authenticate(&store, &flow).await;
        assert!(matches!(result, Err(SorterError::AuthError(_))));
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested").join("token.json"));

        assert_eq!(store.load().await.unwrap(), None);

        let saved = credential("tok", Some("ref"), 3600);
        store.save(&saved).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(saved));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = tokio::fs::metadata(store.path()).await.unwrap();
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_file_store_reads_google_token_file() {
        let token_json = r#"{
            "token": "ya29.a0Af",
            "refresh_token": "1//0g",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "test-client-id.apps.googleusercontent.com",
            "client_secret": "test-secret",
            "scopes": ["https://www.googleapis.com/auth/gmail.modify"],
            "universe_domain": "googleapis.com",
            "account": "",
            "expiry": "2024-05-01T12:00:00.123456Z"
        }"#;

        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), token_json).await.unwrap();

        let store = FileCredentialStore::new(temp_file.path());
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded.token, "ya29.a0Af");
        assert_eq!(loaded.refresh_token.as_deref(), Some("1//0g"));
        assert_eq!(loaded.scopes, vec![GMAIL_MODIFY_SCOPE.to_string()]);
        assert!(loaded.is_expired(Utc::now()));
        assert!(matches!(
            CredentialState::classify(Some(loaded), Utc::now()),
            CredentialState::ExpiredRefreshable(_)
        ));
    }

    #[tokio::test]
    async fn test_file_store_rejects_malformed_file() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "not json").await.unwrap();

        let store = FileCredentialStore::new(temp_file.path());
        let result = store.load().await;
        assert!(matches!(result, Err(SorterError::SerializationError(_))));
    }

    #[test]
    fn test_scopes_constants() {
        assert_eq!(REQUIRED_SCOPES, &["https://www.googleapis.com/auth/gmail.modify"]);
    }
}
