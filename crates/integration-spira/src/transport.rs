use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use spira_domain::CoreError;

const USER_AGENT: &str = "spira-artifact-radar/integration-spira";
const REDACTED: &str = "<redacted>";
const API_KEY_PARAM: &str = "api-key";

/// A GET against one REST collection.
#[derive(Clone, PartialEq, Eq)]
pub struct RestRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
}

impl RestRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for RestRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let query = self
            .query
            .iter()
            .map(|(key, value)| {
                if key == API_KEY_PARAM {
                    (key.as_str(), REDACTED)
                } else {
                    (key.as_str(), value.as_str())
                }
            })
            .collect::<Vec<_>>();
        formatter
            .debug_struct("RestRequest")
            .field("url", &self.url)
            .field("query", &query)
            .finish()
    }
}

#[async_trait]
pub trait RestTransport: Send + Sync {
    async fn get_json(&self, request: RestRequest) -> Result<serde_json::Value, CoreError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestRestTransport {
    client: reqwest::Client,
}

impl ReqwestRestTransport {
    pub fn new(timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| {
                CoreError::DependencyUnavailable(format!(
                    "failed to initialize Spira HTTP client: {err}"
                ))
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl RestTransport for ReqwestRestTransport {
    async fn get_json(&self, request: RestRequest) -> Result<serde_json::Value, CoreError> {
        let response = self
            .client
            .get(&request.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&request.query)
            .send()
            .await
            .map_err(|err| {
                CoreError::DependencyUnavailable(format!("failed to call Spira REST API: {err}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            CoreError::DependencyUnavailable(format!(
                "failed to read response from Spira REST API: {err}"
            ))
        })?;

        if !status.is_success() {
            return Err(CoreError::RemoteStatus {
                status: status.as_u16(),
                body: truncate_for_error(&body),
            });
        }

        if body.trim().is_empty() {
            return Err(CoreError::MalformedPayload(
                "Spira REST API returned an empty body.".to_owned(),
            ));
        }

        serde_json::from_str(&body).map_err(|err| {
            CoreError::MalformedPayload(format!("failed to parse Spira response JSON: {err}"))
        })
    }
}

fn truncate_for_error(body: &str) -> String {
    const MAX_LEN: usize = 200;
    if body.chars().count() <= MAX_LEN {
        body.to_owned()
    } else {
        format!("{}...", body.chars().take(MAX_LEN).collect::<String>())
    }
}
