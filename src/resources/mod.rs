//! Resources and data sources exposed by the provider.
//!
//! Each implementation decodes the JSON document it receives into a typed
//! record, talks to the control plane through [`CloudApi`], and encodes a
//! typed record back. The provider dispatches to them by type name.

pub mod association;
pub mod deployment;
pub mod extension;
pub mod traffic_filter;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::api::CloudApi;
use crate::error::ProviderError;
use crate::schema::{Diagnostic, Schema};

pub use association::TrafficFilterAssociationResource;
pub use deployment::DeploymentResource;
pub use extension::ExtensionResource;
pub use traffic_filter::TrafficFilterResource;

/// A managed remote object.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name as used in configuration, e.g. `ec_deployment`.
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Checks the schema cannot express. Runs after schema validation.
    fn validate(&self, _config: &Value) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Create the object and return its full state.
    async fn create(&self, api: &dyn CloudApi, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh state. `None` means the object is gone.
    async fn read(&self, api: &dyn CloudApi, state: Value) -> Result<Option<Value>, ProviderError>;

    async fn update(
        &self,
        api: &dyn CloudApi,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the object. Deleting something already gone succeeds.
    async fn delete(&self, api: &dyn CloudApi, state: Value) -> Result<(), ProviderError>;

    /// Build state for an existing object from its import ID.
    async fn import(&self, api: &dyn CloudApi, id: &str) -> Result<Value, ProviderError>;
}

/// A read-only lookup.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    fn validate(&self, _config: &Value) -> Vec<Diagnostic> {
        Vec::new()
    }

    async fn read(&self, api: &dyn CloudApi, config: Value) -> Result<Value, ProviderError>;
}

/// Decode a state or config document into its typed record.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ProviderError> {
    serde_json::from_value(value).map_err(|e| ProviderError::Validation(e.to_string()))
}

/// Encode a typed record as a state document.
pub fn encode<T: Serialize>(record: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(record)?)
}

/// Treat 404/403 as "gone" and everything else as a failure of `context`.
pub(crate) fn gone_or<T>(
    result: Result<T, crate::api::ApiError>,
    context: &str,
) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_gone() => Ok(None),
        Err(e) => Err(ProviderError::api(context, e)),
    }
}
