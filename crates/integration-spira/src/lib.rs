//! REST client for the SpiraTeam v5.0 API: one GET per artifact category,
//! decoded through a strict per-category schema.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use spira_domain::{Artifact, ArtifactSource, ArtifactType, CoreError, CredentialProvider};
use tracing::debug;

pub mod schema;
pub mod transport;

pub use schema::parse_artifacts;
pub use transport::{ReqwestRestTransport, RestRequest, RestTransport};

pub const REST_SERVICE_PATH: &str = "/services/v5_0/RestService.svc/";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Fixed credentials, for embedding and tests.
#[derive(Clone, Default)]
pub struct StaticCredentials {
    pub url: Option<String>,
    pub username: Option<String>,
    pub token: Option<String>,
}

impl StaticCredentials {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            url: Some(url.into()),
            username: Some(username.into()),
            token: Some(token.into()),
        }
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StaticCredentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CredentialProvider for StaticCredentials {
    fn url(&self) -> Option<String> {
        self.url.clone()
    }

    fn username(&self) -> Option<String> {
        self.username.clone()
    }

    fn token(&self) -> Option<String> {
        self.token.clone()
    }
}

pub struct SpiraArtifactClient {
    credentials: Arc<dyn CredentialProvider>,
    transport: Arc<dyn RestTransport>,
}

impl fmt::Debug for SpiraArtifactClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SpiraArtifactClient")
            .field("url", &self.credentials.url())
            .field("username", &self.credentials.username())
            .finish_non_exhaustive()
    }
}

impl SpiraArtifactClient {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Result<Self, CoreError> {
        let transport = ReqwestRestTransport::new(DEFAULT_REQUEST_TIMEOUT)?;
        Ok(Self::with_transport(credentials, Arc::new(transport)))
    }

    pub fn with_transport(
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn RestTransport>,
    ) -> Self {
        Self {
            credentials,
            transport,
        }
    }

    /// Builds the collection request from the credentials current at call time.
    pub fn request_for(&self, category: ArtifactType) -> Result<RestRequest, CoreError> {
        let base = required_credential("url", self.credentials.url())?;
        let username = required_credential("username", self.credentials.username())?;
        let token = required_credential("token", self.credentials.token())?;

        let base = base.trim_end_matches('/');
        let path = REST_SERVICE_PATH.trim_start_matches('/');
        Ok(
            RestRequest::new(format!("{base}/{path}{}", category.collection()))
                .with_query("username", username)
                .with_query("api-key", token),
        )
    }
}

fn required_credential(name: &str, value: Option<String>) -> Result<String, CoreError> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            CoreError::MissingCredentials(format!("Spira {name} has not been configured."))
        })
}

#[async_trait]
impl ArtifactSource for SpiraArtifactClient {
    async fn fetch_assigned(&self, category: ArtifactType) -> Result<Vec<Artifact>, CoreError> {
        let request = self.request_for(category)?;
        debug!(category = category.as_key(), url = %request.url, "fetching assigned artifacts");
        let payload = self.transport.get_json(request).await?;
        parse_artifacts(category, payload)
    }
}
