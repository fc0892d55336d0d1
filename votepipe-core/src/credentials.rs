//! Connection credentials and their lifecycle.
//!
//! A credential is either a static secret or a short-lived token. Tokens are
//! minted by a [`CredentialSource`] and carry a validity window; the owning
//! [`CredentialManager`] reports when a token must be replaced, leaving a
//! safety margin so a connection is never used with a token that is about to
//! expire mid-operation.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::{process::Command, time::Instant};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::CredentialError;

/// Default lifetime of generated tokens (e.g. cloud database auth tokens).
pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::from_secs(10 * 60);

/// Default margin before expiry at which a token is replaced.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Secret material for one endpoint plus the instant it was minted.
#[derive(Clone)]
pub struct Credential {
    username: Option<String>,
    secret: Option<Zeroizing<String>>,
    minted_at: Instant,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("minted_at", &self.minted_at)
            .finish()
    }
}

impl Credential {
    pub fn new(username: Option<String>, secret: impl Into<String>) -> Self {
        Self {
            username,
            secret: Some(Zeroizing::new(secret.into())),
            minted_at: Instant::now(),
        }
    }

    /// A credential with no secret, for endpoints running without auth.
    pub fn anonymous(username: Option<String>) -> Self {
        Self {
            username,
            secret: None,
            minted_at: Instant::now(),
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_ref().map(|s| s.as_str())
    }

    pub fn minted_at(&self) -> Instant {
        self.minted_at
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.minted_at)
    }
}

/// Produces credentials for one endpoint.
#[async_trait]
pub trait CredentialSource: Send + Sync + fmt::Debug {
    /// Short description for logs; never includes secret material.
    fn describe(&self) -> String;

    async fn mint(&self) -> Result<Credential, CredentialError>;
}

/// Fixed username/password, optionally read from a file.
#[derive(Clone)]
pub struct StaticCredentials {
    username: Option<String>,
    password: StaticSecret,
}

#[derive(Clone)]
enum StaticSecret {
    None,
    Inline(Zeroizing<String>),
    File(PathBuf),
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = match &self.password {
            StaticSecret::None => "none".to_string(),
            StaticSecret::Inline(_) => "<redacted>".to_string(),
            StaticSecret::File(path) => format!("file:{}", path.display()),
        };
        f.debug_struct("StaticCredentials")
            .field("username", &self.username)
            .field("password", &password)
            .finish()
    }
}

impl StaticCredentials {
    pub fn new(username: Option<String>, password: impl Into<String>) -> Self {
        Self {
            username,
            password: StaticSecret::Inline(Zeroizing::new(password.into())),
        }
    }

    pub fn from_file(username: Option<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            username,
            password: StaticSecret::File(path.into()),
        }
    }

    pub fn anonymous(username: Option<String>) -> Self {
        Self {
            username,
            password: StaticSecret::None,
        }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    fn describe(&self) -> String {
        match &self.password {
            StaticSecret::None => "no credentials".to_string(),
            StaticSecret::Inline(_) => "static password".to_string(),
            StaticSecret::File(path) => {
                format!("password file {}", path.display())
            }
        }
    }

    async fn mint(&self) -> Result<Credential, CredentialError> {
        match &self.password {
            StaticSecret::None => Ok(Credential::anonymous(self.username.clone())),
            StaticSecret::Inline(secret) => Ok(Credential::new(
                self.username.clone(),
                secret.as_str(),
            )),
            StaticSecret::File(path) => {
                let secret = read_secret_file(path).await?;
                Ok(Credential::new(self.username.clone(), secret.as_str()))
            }
        }
    }
}

/// Token printed on stdout by an external command, such as a cloud CLI that
/// generates database auth tokens.
#[derive(Debug, Clone)]
pub struct CommandToken {
    username: Option<String>,
    program: String,
    args: Vec<String>,
}

impl CommandToken {
    pub fn new(
        username: Option<String>,
        program: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            username,
            program: program.into(),
            args,
        }
    }

    /// Split a command line on whitespace. Quoting is not interpreted.
    pub fn from_command_line(
        username: Option<String>,
        command_line: &str,
    ) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(username, program, parts.collect()))
    }
}

#[async_trait]
impl CredentialSource for CommandToken {
    fn describe(&self) -> String {
        format!("token command `{}`", self.program)
    }

    async fn mint(&self) -> Result<Credential, CredentialError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| CredentialError::Command {
                command: self.program.clone(),
                reason: err.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CredentialError::Command {
                command: self.program.clone(),
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        let token = Zeroizing::new(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        );
        if token.is_empty() {
            return Err(CredentialError::Empty(self.describe()));
        }
        Ok(Credential::new(self.username.clone(), token.as_str()))
    }
}

/// Token re-read from a file on every mint (e.g. a projected service account
/// token that a sidecar keeps fresh).
#[derive(Debug, Clone)]
pub struct FileToken {
    username: Option<String>,
    path: PathBuf,
}

impl FileToken {
    pub fn new(username: Option<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            username,
            path: path.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for FileToken {
    fn describe(&self) -> String {
        format!("token file {}", self.path.display())
    }

    async fn mint(&self) -> Result<Credential, CredentialError> {
        let token = read_secret_file(&self.path).await?;
        Ok(Credential::new(self.username.clone(), token.as_str()))
    }
}

async fn read_secret_file(
    path: &Path,
) -> Result<Zeroizing<String>, CredentialError> {
    let raw = Zeroizing::new(tokio::fs::read_to_string(path).await.map_err(
        |source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        },
    )?);
    let trimmed = Zeroizing::new(raw.trim().to_string());
    if trimmed.is_empty() {
        return Err(CredentialError::Empty(format!("file {}", path.display())));
    }
    Ok(trimmed)
}

/// Owns the current credential for one endpoint and decides when it must be
/// replaced.
#[derive(Debug, Clone)]
pub struct CredentialManager {
    source: Arc<dyn CredentialSource>,
    /// `None` for static credentials, which never expire.
    validity: Option<Duration>,
    margin: Duration,
    current: Option<Credential>,
    mints: u64,
}

impl CredentialManager {
    /// Credentials that stay valid for the lifetime of the process.
    pub fn fixed(source: impl CredentialSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
            validity: None,
            margin: Duration::ZERO,
            current: None,
            mints: 0,
        }
    }

    /// Tokens valid for `validity` after minting, replaced `margin` early.
    /// The margin is clamped to half the window.
    pub fn expiring(
        source: impl CredentialSource + 'static,
        validity: Duration,
        margin: Duration,
    ) -> Self {
        Self {
            source: Arc::new(source),
            validity: Some(validity),
            margin: margin.min(validity / 2),
            current: None,
            mints: 0,
        }
    }

    pub fn is_expiring(&self) -> bool {
        self.validity.is_some()
    }

    pub fn validity(&self) -> Option<Duration> {
        self.validity
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    pub fn current(&self) -> Option<&Credential> {
        self.current.as_ref()
    }

    /// Number of credentials minted so far.
    pub fn mints(&self) -> u64 {
        self.mints
    }

    /// Whether the current credential is missing or has entered the refresh
    /// margin of its validity window.
    pub fn needs_refresh(&self, now: Instant) -> bool {
        match (&self.current, self.validity) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(credential), Some(validity)) => {
                credential.age(now) >= validity.saturating_sub(self.margin)
            }
        }
    }

    /// Time left before the current credential enters its refresh margin.
    pub fn refresh_due_in(&self, now: Instant) -> Option<Duration> {
        let validity = self.validity?;
        let credential = self.current.as_ref()?;
        Some(
            validity
                .saturating_sub(self.margin)
                .saturating_sub(credential.age(now)),
        )
    }

    /// Mint a new credential, replacing the current one.
    pub async fn refresh(&mut self) -> Result<&Credential, CredentialError> {
        let credential = self.source.mint().await?;
        self.mints += 1;
        if self.is_expiring() {
            info!(
                source = %self.source.describe(),
                mint = self.mints,
                "minted new credential"
            );
        } else {
            debug!(source = %self.source.describe(), "loaded credential");
        }
        Ok(self.current.insert(credential))
    }

    /// Current credential, minting one first if none is held or the held
    /// one is due for replacement.
    pub async fn ensure_fresh(&mut self) -> Result<&Credential, CredentialError> {
        if self.needs_refresh(Instant::now()) {
            self.refresh().await?;
        }
        self.current
            .as_ref()
            .ok_or_else(|| CredentialError::Empty(self.source.describe()))
    }

    /// Drop the current credential so the next use mints a new one. Used
    /// when an endpoint rejects a credential before its window elapsed.
    pub fn invalidate(&mut self) {
        self.current = None;
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct CountingSource {
        minted: AtomicU32,
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        fn describe(&self) -> String {
            "counting".to_string()
        }

        async fn mint(&self) -> Result<Credential, CredentialError> {
            let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Credential::new(Some("app".into()), format!("token-{n}")))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expiring_credentials_refresh_inside_margin() {
        let mut manager = CredentialManager::expiring(
            CountingSource::default(),
            Duration::from_secs(600),
            Duration::from_secs(60),
        );
        assert!(manager.needs_refresh(Instant::now()));
        manager.refresh().await.unwrap();
        assert!(!manager.needs_refresh(Instant::now()));

        tokio::time::advance(Duration::from_secs(539)).await;
        assert!(!manager.needs_refresh(Instant::now()));
        assert_eq!(
            manager.refresh_due_in(Instant::now()),
            Some(Duration::from_secs(1))
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(manager.needs_refresh(Instant::now()));

        let fresh = manager.ensure_fresh().await.unwrap();
        assert_eq!(fresh.secret(), Some("token-2"));
        assert_eq!(manager.mints(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn static_credentials_never_expire() {
        let mut manager =
            CredentialManager::fixed(StaticCredentials::new(None, "postgres"));
        manager.ensure_fresh().await.unwrap();
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert!(!manager.needs_refresh(Instant::now()));
        assert_eq!(manager.refresh_due_in(Instant::now()), None);
        assert_eq!(manager.mints(), 1);
    }

    #[test]
    fn margin_is_clamped_below_window() {
        let manager = CredentialManager::expiring(
            CountingSource::default(),
            Duration::from_secs(60),
            Duration::from_secs(600),
        );
        assert_eq!(manager.margin(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn invalidate_forces_new_mint() {
        let mut manager =
            CredentialManager::fixed(StaticCredentials::anonymous(None));
        manager.ensure_fresh().await.unwrap();
        manager.invalidate();
        assert!(manager.current().is_none());
        manager.ensure_fresh().await.unwrap();
        assert_eq!(manager.mints(), 2);
    }

    #[tokio::test]
    async fn file_sources_trim_and_reject_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        tokio::fs::write(&path, "s3cret\n").await.unwrap();

        let credential = FileToken::new(Some("app".into()), &path)
            .mint()
            .await
            .unwrap();
        assert_eq!(credential.secret(), Some("s3cret"));
        assert_eq!(credential.username(), Some("app"));

        tokio::fs::write(&path, "  \n").await.unwrap();
        let err = StaticCredentials::from_file(None, &path)
            .mint()
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Empty(_)));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let credential = Credential::new(Some("app".into()), "hunter2");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn command_lines_split_on_whitespace() {
        let token = CommandToken::from_command_line(
            None,
            "aws rds generate-db-auth-token --port 5432",
        )
        .unwrap();
        assert_eq!(token.program, "aws");
        assert_eq!(token.args.len(), 4);
        assert!(CommandToken::from_command_line(None, "   ").is_none());
    }
}
