use common::error::TransferError;

use crate::remote::Endpoint;

/// Secret material for one endpoint. Lives in memory only; nothing in this
/// workspace persists it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the secret must never reach logs
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"***")
            .finish()
    }
}

/// Collaborator seam answering credentials for an endpoint. `Ok(None)`
/// means anonymous access.
#[async_trait::async_trait]
pub trait CredentialSource: Send + Sync {
    async fn lookup(&self, endpoint: &Endpoint) -> Result<Option<Credentials>, TransferError>;
}

/// Source that knows no credentials; every endpoint is anonymous.
#[derive(Debug, Default)]
pub struct NoCredentials;

#[async_trait::async_trait]
impl CredentialSource for NoCredentials {
    async fn lookup(&self, _endpoint: &Endpoint) -> Result<Option<Credentials>, TransferError> {
        Ok(None)
    }
}

/// Fixed credential table keyed by `host:port`, for wiring and tests.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    entries: dashmap::DashMap<String, Credentials>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, host: &str, port: u16, credentials: Credentials) {
        self.entries.insert(format!("{host}:{port}"), credentials);
    }
}

#[async_trait::async_trait]
impl CredentialSource for StaticCredentials {
    async fn lookup(&self, endpoint: &Endpoint) -> Result<Option<Credentials>, TransferError> {
        let entry = self
            .entries
            .get(&format!("{}:{}", endpoint.host, endpoint.port));
        Ok(entry.map(|credentials| credentials.clone()))
    }
}
