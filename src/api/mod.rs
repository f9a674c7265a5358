//! Elastic Cloud control-plane client.
//!
//! Resources and data sources talk to the control plane exclusively through
//! the [`CloudApi`] trait. [`HttpClient`] is the production implementation;
//! [`InMemoryApi`] is a deterministic stand-in used by tests.

pub mod http;
pub mod memory;
pub mod models;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpClient;
pub use memory::InMemoryApi;
pub use models::*;

/// Errors returned by control-plane calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The API answered with a non-success status.
    #[error("API returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error messages from the response body.
        message: String,
    },

    /// A local file referenced by the configuration could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// Build a status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Build a 404 error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(404, message)
    }

    /// The HTTP status code, if the API answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The object does not exist (404).
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// The object does not exist or is no longer visible to the caller
    /// (404 or 403). Reads treat both as "remove from state".
    pub fn is_gone(&self) -> bool {
        matches!(self.status_code(), Some(404) | Some(403))
    }
}

/// Control-plane operations used by the provider.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// List stack versions available in a region, newest first.
    async fn list_stacks(&self, region: &str) -> Result<Vec<StackVersion>, ApiError>;

    /// Create a deployment.
    async fn create_deployment(
        &self,
        request: &DeploymentCreateRequest,
    ) -> Result<DeploymentCreateResponse, ApiError>;

    /// Fetch a deployment.
    async fn get_deployment(&self, id: &str) -> Result<DeploymentGetResponse, ApiError>;

    /// Apply a new plan to a deployment.
    async fn update_deployment(
        &self,
        id: &str,
        request: &DeploymentUpdateRequest,
    ) -> Result<(), ApiError>;

    /// Shut down all resources of a deployment.
    async fn shutdown_deployment(&self, id: &str) -> Result<(), ApiError>;

    /// Create an extension.
    async fn create_extension(&self, request: &ExtensionRequest) -> Result<Extension, ApiError>;

    /// Fetch an extension.
    async fn get_extension(&self, id: &str) -> Result<Extension, ApiError>;

    /// Update an extension's metadata.
    async fn update_extension(
        &self,
        id: &str,
        request: &ExtensionRequest,
    ) -> Result<Extension, ApiError>;

    /// Upload the archive of an extension.
    async fn upload_extension(
        &self,
        id: &str,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<Extension, ApiError>;

    /// Delete an extension.
    async fn delete_extension(&self, id: &str) -> Result<(), ApiError>;

    /// Create a traffic filter ruleset, returning its ID.
    async fn create_traffic_filter(
        &self,
        request: &TrafficFilterRulesetRequest,
    ) -> Result<String, ApiError>;

    /// Fetch a traffic filter ruleset.
    async fn get_traffic_filter(
        &self,
        id: &str,
        include_associations: bool,
    ) -> Result<TrafficFilterRulesetInfo, ApiError>;

    /// Replace a traffic filter ruleset.
    async fn update_traffic_filter(
        &self,
        id: &str,
        request: &TrafficFilterRulesetRequest,
    ) -> Result<(), ApiError>;

    /// Delete a traffic filter ruleset.
    async fn delete_traffic_filter(&self, id: &str) -> Result<(), ApiError>;

    /// Attach a ruleset to a deployment.
    async fn associate_traffic_filter(
        &self,
        ruleset_id: &str,
        deployment_id: &str,
    ) -> Result<(), ApiError>;

    /// Detach a ruleset from a deployment.
    async fn disassociate_traffic_filter(
        &self,
        ruleset_id: &str,
        deployment_id: &str,
    ) -> Result<(), ApiError>;
}
