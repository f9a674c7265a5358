//! HTTP implementation of [`CloudApi`] on top of `reqwest`.
//!
//! One request is made per call. Retries are left to the host; failures are
//! surfaced as [`ApiError`] with the HTTP status preserved so callers can
//! tell "gone" (404/403) apart from real failures.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::models::*;
use super::{ApiError, CloudApi};
use crate::config::{Credentials, ProviderConfig};

/// Path prefix of every control-plane endpoint.
const API_PREFIX: &str = "/api/v1";

const USER_AGENT: &str = concat!("ec-provider/", env!("CARGO_PKG_VERSION"));

/// Control-plane client speaking HTTP.
///
/// The `Debug` implementation never exposes credentials.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    verbose: Option<VerboseLog>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .field("verbose", &self.verbose.is_some())
            .finish()
    }
}

impl HttpClient {
    /// Build a client from a resolved provider configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::Http(format!("Failed to build HTTP client: {}", e)))?;

        let verbose = match &config.verbose {
            Some(settings) => Some(VerboseLog::open(&settings.file, settings.credentials)?),
            None => None,
        };

        Ok(Self {
            client,
            base_url: format!("{}{}", config.endpoint.trim_end_matches('/'), API_PREFIX),
            credentials: config.credentials.clone(),
            verbose,
        })
    }

    /// The resolved API base URL, including the `/api/v1` prefix.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.credentials {
            Credentials::ApiKey(key) => builder.header(AUTHORIZATION, format!("ApiKey {}", key)),
            Credentials::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            },
        }
    }

    /// Send a request and return the raw body of a successful response.
    async fn send(&self, builder: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let request = builder.build().map_err(|e| ApiError::Http(e.to_string()))?;
        let method = request.method().clone();
        let url = request.url().clone();

        if let Some(log) = &self.verbose {
            log.request(&request).await;
        }

        debug!(%method, path = url.path(), "Sending API request");
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Http(format!("Failed to read response body: {}", e)))?;

        if let Some(log) = &self.verbose {
            log.response(status, &body).await;
        }

        if !status.is_success() {
            debug!(%method, path = url.path(), status = status.as_u16(), "API request failed");
            return Err(ApiError::status(status.as_u16(), error_message(status, &body)));
        }

        debug!(%method, path = url.path(), status = status.as_u16(), "API request completed");
        Ok(body.to_vec())
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(builder).await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Extract a readable message from an error response body.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(reply) = serde_json::from_slice::<BasicFailedReply>(body) {
        let messages: Vec<String> = reply
            .errors
            .iter()
            .map(|e| {
                if e.code.is_empty() {
                    e.message.clone()
                } else {
                    format!("{}: {}", e.code, e.message)
                }
            })
            .collect();
        if !messages.is_empty() {
            return messages.join("; ");
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        text.to_string()
    }
}

#[async_trait]
impl CloudApi for HttpClient {
    async fn list_stacks(&self, region: &str) -> Result<Vec<StackVersion>, ApiError> {
        let configs: StackVersionConfigs = self
            .send_json(
                self.request(Method::GET, &format!("/regions/{}/stack/versions", region))
                    .query(&[("show_deleted", "false"), ("show_unusable", "false")]),
            )
            .await?;
        Ok(configs.stacks)
    }

    async fn create_deployment(
        &self,
        request: &DeploymentCreateRequest,
    ) -> Result<DeploymentCreateResponse, ApiError> {
        self.send_json(self.request(Method::POST, "/deployments").json(request))
            .await
    }

    async fn get_deployment(&self, id: &str) -> Result<DeploymentGetResponse, ApiError> {
        self.send_json(
            self.request(Method::GET, &format!("/deployments/{}", id))
                .query(&[
                    ("show_metadata", "true"),
                    ("show_plans", "true"),
                    ("show_settings", "true"),
                ]),
        )
        .await
    }

    async fn update_deployment(
        &self,
        id: &str,
        request: &DeploymentUpdateRequest,
    ) -> Result<(), ApiError> {
        self.send(
            self.request(Method::PUT, &format!("/deployments/{}", id))
                .json(request),
        )
        .await
        .map(|_| ())
    }

    async fn shutdown_deployment(&self, id: &str) -> Result<(), ApiError> {
        self.send(
            self.request(Method::POST, &format!("/deployments/{}/_shutdown", id))
                .query(&[("skip_snapshot", "false")]),
        )
        .await
        .map(|_| ())
    }

    async fn create_extension(&self, request: &ExtensionRequest) -> Result<Extension, ApiError> {
        self.send_json(
            self.request(Method::POST, "/deployments/extensions")
                .json(request),
        )
        .await
    }

    async fn get_extension(&self, id: &str) -> Result<Extension, ApiError> {
        self.send_json(self.request(Method::GET, &format!("/deployments/extensions/{}", id)))
            .await
    }

    async fn update_extension(
        &self,
        id: &str,
        request: &ExtensionRequest,
    ) -> Result<Extension, ApiError> {
        self.send_json(
            self.request(Method::POST, &format!("/deployments/extensions/{}", id))
                .json(request),
        )
        .await
    }

    async fn upload_extension(
        &self,
        id: &str,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<Extension, ApiError> {
        let part = reqwest::multipart::Part::bytes(contents).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        self.send_json(
            self.request(Method::PUT, &format!("/deployments/extensions/{}", id))
                .multipart(form),
        )
        .await
    }

    async fn delete_extension(&self, id: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, &format!("/deployments/extensions/{}", id)))
            .await
            .map(|_| ())
    }

    async fn create_traffic_filter(
        &self,
        request: &TrafficFilterRulesetRequest,
    ) -> Result<String, ApiError> {
        let response: TrafficFilterRulesetResponse = self
            .send_json(
                self.request(Method::POST, "/deployments/traffic-filter/rulesets")
                    .json(request),
            )
            .await?;
        Ok(response.id)
    }

    async fn get_traffic_filter(
        &self,
        id: &str,
        include_associations: bool,
    ) -> Result<TrafficFilterRulesetInfo, ApiError> {
        self.send_json(
            self.request(
                Method::GET,
                &format!("/deployments/traffic-filter/rulesets/{}", id),
            )
            .query(&[("include_associations", include_associations)]),
        )
        .await
    }

    async fn update_traffic_filter(
        &self,
        id: &str,
        request: &TrafficFilterRulesetRequest,
    ) -> Result<(), ApiError> {
        self.send(
            self.request(
                Method::PUT,
                &format!("/deployments/traffic-filter/rulesets/{}", id),
            )
            .json(request),
        )
        .await
        .map(|_| ())
    }

    async fn delete_traffic_filter(&self, id: &str) -> Result<(), ApiError> {
        self.send(
            self.request(
                Method::DELETE,
                &format!("/deployments/traffic-filter/rulesets/{}", id),
            )
            .query(&[("ignore_associations", "false")]),
        )
        .await
        .map(|_| ())
    }

    async fn associate_traffic_filter(
        &self,
        ruleset_id: &str,
        deployment_id: &str,
    ) -> Result<(), ApiError> {
        let body = FilterAssociation {
            entity_type: ASSOCIATION_DEPLOYMENT.to_string(),
            id: deployment_id.to_string(),
        };
        self.send(
            self.request(
                Method::POST,
                &format!(
                    "/deployments/traffic-filter/rulesets/{}/associations",
                    ruleset_id
                ),
            )
            .json(&body),
        )
        .await
        .map(|_| ())
    }

    async fn disassociate_traffic_filter(
        &self,
        ruleset_id: &str,
        deployment_id: &str,
    ) -> Result<(), ApiError> {
        self.send(self.request(
            Method::DELETE,
            &format!(
                "/deployments/traffic-filter/rulesets/{}/associations/{}/{}",
                ruleset_id, ASSOCIATION_DEPLOYMENT, deployment_id
            ),
        ))
        .await
        .map(|_| ())
    }
}

/// Append-only dump of every request and response, enabled by the
/// provider's `verbose` setting.
#[derive(Clone)]
struct VerboseLog {
    file: Arc<Mutex<tokio::fs::File>>,
    include_credentials: bool,
}

impl VerboseLog {
    fn open(path: &Path, include_credentials: bool) -> Result<Self, ApiError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ApiError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self {
            file: Arc::new(Mutex::new(tokio::fs::File::from_std(file))),
            include_credentials,
        })
    }

    async fn request(&self, request: &reqwest::Request) {
        let mut entry = format!("==> {} {}\n", request.method(), request.url());
        for (name, value) in request.headers() {
            let value = if name == AUTHORIZATION && !self.include_credentials {
                "[REDACTED]".to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            entry.push_str(&format!("{}: {}\n", name, value));
        }
        if let Some(body) = request.body().and_then(|b| b.as_bytes()) {
            entry.push_str(&String::from_utf8_lossy(body));
            entry.push('\n');
        }
        self.write(entry).await;
    }

    async fn response(&self, status: StatusCode, body: &[u8]) {
        let entry = format!("<== {}\n{}\n", status, String::from_utf8_lossy(body));
        self.write(entry).await;
    }

    async fn write(&self, entry: String) {
        let mut file = self.file.lock().await;
        if let Err(e) = file.write_all(entry.as_bytes()).await {
            warn!(error = %e, "Failed to write verbose request log");
            return;
        }
        if let Err(e) = file.flush().await {
            warn!(error = %e, "Failed to flush verbose request log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerboseSettings;
    use std::time::Duration;

    fn config(credentials: Credentials) -> ProviderConfig {
        ProviderConfig {
            endpoint: "https://cloud.example.com/".to_string(),
            credentials,
            insecure: false,
            timeout: Duration::from_secs(5),
            verbose: None,
        }
    }

    #[test]
    fn test_base_url_has_api_prefix() {
        let client = HttpClient::new(&config(Credentials::ApiKey("key".to_string()))).unwrap();
        assert_eq!(client.base_url(), "https://cloud.example.com/api/v1");
    }

    #[test]
    fn test_debug_hides_credentials() {
        let client =
            HttpClient::new(&config(Credentials::ApiKey("secret-key-123".to_string()))).unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("HttpClient"));
        assert!(!debug.contains("secret-key-123"));
    }

    #[test]
    fn test_error_message_from_reply() {
        let body = br#"{"errors":[{"code":"deployments.deployment_not_found","message":"Deployment not found"}]}"#;
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, body),
            "deployments.deployment_not_found: Deployment not found"
        );
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, b"upstream down"), "upstream down");
        assert_eq!(error_message(StatusCode::NOT_FOUND, b""), "Not Found");
    }

    #[test]
    fn test_verbose_log_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.log");
        let mut cfg = config(Credentials::Basic {
            username: "admin".to_string(),
            password: "pw".to_string(),
        });
        cfg.verbose = Some(VerboseSettings {
            file: path.clone(),
            credentials: false,
        });

        HttpClient::new(&cfg).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_verbose_log_unwritable_path() {
        let mut cfg = config(Credentials::ApiKey("key".to_string()));
        cfg.verbose = Some(VerboseSettings {
            file: "/nonexistent-dir/request.log".into(),
            credentials: false,
        });

        let err = HttpClient::new(&cfg).unwrap_err();
        assert!(matches!(err, ApiError::Io { .. }));
    }
}
