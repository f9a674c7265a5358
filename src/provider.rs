//! The Elastic Cloud provider.
//!
//! [`EcProvider`] owns the registry of resources and data sources and the
//! control-plane client created by `Configure`. Every resource operation
//! goes through the registry by type name; nothing but `GetSchema`,
//! validation and planning works before the provider is configured.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::api::{ApiError, CloudApi, HttpClient};
use crate::config::{provider_schema, EnvDefaults, ProviderConfig};
use crate::datasources::{
    AwsPrivatelinkEndpoint, AzurePrivatelinkEndpoint, DeploymentDataSource,
    GcpPrivateServiceConnectEndpoint, StackDataSource,
};
use crate::error::ProviderError;
use crate::plan::plan;
use crate::resources::{
    DataSource, DeploymentResource, ExtensionResource, Resource, TrafficFilterAssociationResource,
    TrafficFilterResource,
};
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
use crate::validation::validate;

/// Builds the control-plane client from a resolved configuration.
pub type ClientFactory =
    Arc<dyn Fn(&ProviderConfig) -> Result<Arc<dyn CloudApi>, ApiError> + Send + Sync>;

fn http_client_factory() -> ClientFactory {
    Arc::new(|config: &ProviderConfig| {
        let client: Arc<dyn CloudApi> = Arc::new(HttpClient::new(config)?);
        Ok(client)
    })
}

/// Elastic Cloud implementation of [`ProviderService`].
pub struct EcProvider {
    env: EnvDefaults,
    factory: ClientFactory,
    client: RwLock<Option<Arc<dyn CloudApi>>>,
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Box<dyn DataSource>>,
}

impl std::fmt::Debug for EcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcProvider")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl EcProvider {
    /// A provider that talks to the real API, with `env` filling in unset
    /// provider block attributes.
    pub fn new(env: EnvDefaults) -> Self {
        let resources: Vec<Box<dyn Resource>> = vec![
            Box::new(DeploymentResource),
            Box::new(ExtensionResource),
            Box::new(TrafficFilterResource),
            Box::new(TrafficFilterAssociationResource),
        ];
        let data_sources: Vec<Box<dyn DataSource>> = vec![
            Box::new(StackDataSource),
            Box::new(DeploymentDataSource),
            Box::new(AwsPrivatelinkEndpoint),
            Box::new(AzurePrivatelinkEndpoint),
            Box::new(GcpPrivateServiceConnectEndpoint),
        ];

        Self {
            env,
            factory: http_client_factory(),
            client: RwLock::new(None),
            resources: resources.into_iter().map(|r| (r.type_name(), r)).collect(),
            data_sources: data_sources.into_iter().map(|d| (d.type_name(), d)).collect(),
        }
    }

    /// Replace how `Configure` builds the client.
    pub fn with_client_factory(mut self, factory: ClientFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Make `Configure` hand out `client` regardless of the configuration.
    pub fn with_client(self, client: Arc<dyn CloudApi>) -> Self {
        self.with_client_factory(Arc::new(move |_: &ProviderConfig| Ok(Arc::clone(&client))))
    }

    async fn client(&self) -> Result<Arc<dyn CloudApi>, ProviderError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or(ProviderError::NotConfigured)
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn data_source(&self, data_source_type: &str) -> Result<&dyn DataSource, ProviderError> {
        self.data_sources
            .get(data_source_type)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }
}

impl Default for EcProvider {
    fn default() -> Self {
        Self::new(EnvDefaults::default())
    }
}

#[async_trait::async_trait]
impl ProviderService for EcProvider {
    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::new().with_provider_config(provider_schema());
        for (name, resource) in &self.resources {
            schema = schema.with_resource(*name, resource.schema());
        }
        for (name, data_source) in &self.data_sources {
            schema = schema.with_data_source(*name, data_source.schema());
        }
        schema
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.resources.keys().map(|k| k.to_string()).collect(),
            data_sources: self.data_sources.keys().map(|k| k.to_string()).collect(),
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&provider_schema(), &config);
        if let Err(errors) = ProviderConfig::resolve(&config, &self.env) {
            diagnostics.extend(errors);
        }
        Ok(diagnostics)
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let resolved = match ProviderConfig::resolve(&config, &self.env) {
            Ok(resolved) => resolved,
            Err(diagnostics) => return Ok(diagnostics),
        };

        let client = (self.factory)(&resolved)
            .map_err(|e| ProviderError::Configuration(format!("failed to create API client: {}", e)))?;
        *self.client.write().await = Some(client);

        info!(endpoint = %resolved.endpoint, timeout = ?resolved.timeout, "Provider configured");
        Ok(validate(&provider_schema(), &config)
            .into_iter()
            .filter(|d| !d.is_error())
            .collect())
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.client.write().await.take();
        debug!("Released API client");
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let mut diagnostics = validate(&resource.schema(), &config);
        diagnostics.extend(resource.validate(&config));
        Ok(diagnostics)
    }

    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let current = self.resource(resource_type)?.schema().version;
        if version < 0 || version as u64 > current {
            return Err(ProviderError::InvalidRequest(format!(
                "state of {} has schema version {}, newer than supported version {}",
                resource_type, version, current
            )));
        }
        Ok(state)
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.resource(resource_type)?.schema();
        Ok(plan(&schema, prior_state.as_ref(), &proposed_state))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.create(client.as_ref(), planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        Ok(resource
            .read(client.as_ref(), current_state)
            .await?
            .unwrap_or(Value::Null))
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource
            .update(client.as_ref(), prior_state, planned_state)
            .await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.delete(client.as_ref(), current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        let state = resource.import(client.as_ref(), id).await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let mut diagnostics = validate(&data_source.schema(), &config);
        diagnostics.extend(data_source.validate(&config));
        Ok(diagnostics)
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let client = self.client().await?;
        data_source.read(client.as_ref(), config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryApi;
    use crate::schema::has_errors;
    use serde_json::json;

    fn provider(api: &InMemoryApi) -> EcProvider {
        EcProvider::default().with_client(Arc::new(api.clone()))
    }

    #[test]
    fn test_registry() {
        let metadata = EcProvider::default().metadata();
        assert_eq!(
            metadata.resources,
            vec![
                "ec_deployment",
                "ec_deployment_extension",
                "ec_deployment_traffic_filter",
                "ec_deployment_traffic_filter_association",
            ]
        );
        assert!(metadata.data_sources.contains(&"ec_stack".to_string()));
        assert!(metadata.data_sources.contains(&"ec_deployment".to_string()));
        assert!(metadata.capabilities.plan_destroy);
    }

    #[tokio::test]
    async fn test_not_configured() {
        let provider = EcProvider::default();
        let err = provider
            .read_data_source("ec_stack", json!({"version_regex": "latest", "region": "us-east-1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let provider = provider(&InMemoryApi::new());
        let err = provider.create("ec_nope", json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(ref t) if t == "ec_nope"));
    }

    #[tokio::test]
    async fn test_configure_reports_diagnostics() {
        let provider = provider(&InMemoryApi::new());
        let diagnostics = provider
            .configure(json!({"apikey": "k", "username": "u", "password": "p"}))
            .await
            .unwrap();
        assert!(has_errors(&diagnostics));

        let err = provider.delete("ec_deployment", json!({"id": "x"})).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
    }

    #[tokio::test]
    async fn test_configure_uses_env_defaults() {
        let env = EnvDefaults {
            apikey: Some("from-env".to_string()),
            ..Default::default()
        };
        let api = InMemoryApi::new();
        let provider = EcProvider::new(env).with_client(Arc::new(api));
        let diagnostics = provider.configure(Value::Null).await.unwrap();
        assert!(diagnostics.is_empty());
        assert!(provider.client().await.is_ok());

        provider.stop().await.unwrap();
        assert!(matches!(provider.client().await, Err(ProviderError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_factory_error_is_configuration_error() {
        let provider = EcProvider::default().with_client_factory(Arc::new(|_: &ProviderConfig| {
            Err(ApiError::Http("no TLS backend".to_string()))
        }));
        let err = provider.configure(json!({"apikey": "k"})).await.unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_read_gone_is_null() {
        let api = InMemoryApi::new();
        let provider = provider(&api);
        provider.configure(json!({"apikey": "k"})).await.unwrap();

        let state = provider
            .read("ec_deployment_extension", json!({"id": "missing", "name": "x", "extension_type": "bundle", "version": "7.*"}))
            .await
            .unwrap();
        assert_eq!(state, Value::Null);
    }

    #[tokio::test]
    async fn test_validate_resource_config_runs_both_layers() {
        let provider = provider(&InMemoryApi::new());
        let diagnostics = provider
            .validate_resource_config(
                "ec_deployment_extension",
                json!({"name": "x", "extension_type": "theme", "version": "1", "colour": "red"}),
            )
            .await
            .unwrap();
        let summaries: Vec<_> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().any(|s| s.contains("Unsupported argument")));
        assert!(summaries.iter().any(|s| s.contains("extension_type")));
    }

    #[tokio::test]
    async fn test_upgrade_rejects_newer_state() {
        let provider = provider(&InMemoryApi::new());
        let state = json!({"id": "abc"});
        assert_eq!(
            provider
                .upgrade_resource_state("ec_deployment", 0, state.clone())
                .await
                .unwrap(),
            state
        );
        assert!(provider
            .upgrade_resource_state("ec_deployment", 3, state)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_import_wraps_state() {
        let api = InMemoryApi::new();
        let provider = provider(&api);
        provider.configure(json!({"apikey": "k"})).await.unwrap();

        let state = provider
            .create(
                "ec_deployment_traffic_filter",
                json!({"name": "office", "region": "us-east-1", "type": "ip",
                       "rule": [{"source": "1.1.1.1"}]}),
            )
            .await
            .unwrap();
        let imported = provider
            .import_resource("ec_deployment_traffic_filter", state["id"].as_str().unwrap())
            .await
            .unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, "ec_deployment_traffic_filter");
        assert_eq!(imported[0].state["name"], "office");
    }
}
