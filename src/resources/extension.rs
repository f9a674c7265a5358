//! The `ec_deployment_extension` resource: custom bundles and plugins.
//!
//! An extension either points at a `download_url` or is uploaded from a
//! local `file_path`. The archive is uploaded on create and whenever
//! `file_hash` changes.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::{decode, encode, gone_or, Resource};
use crate::api::{CloudApi, Extension, ExtensionRequest};
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};

pub const TYPE_NAME: &str = "ec_deployment_extension";

const EXTENSION_TYPES: &[&str] = &["bundle", "plugin"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ExtensionModel {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    description: Option<String>,
    extension_type: String,
    version: String,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    file_hash: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    size: Option<i64>,
}

impl ExtensionModel {
    fn to_request(&self) -> ExtensionRequest {
        ExtensionRequest {
            name: self.name.clone(),
            description: self.description.clone(),
            extension_type: self.extension_type.clone(),
            version: self.version.clone(),
            download_url: self.download_url.clone(),
        }
    }

    /// Remote fields from `extension`, local-only fields from `self`.
    fn refreshed(&self, extension: Extension) -> Self {
        let file = extension.file_metadata.unwrap_or_default();
        Self {
            id: Some(extension.id),
            name: extension.name,
            description: extension.description.filter(|d| !d.is_empty()),
            extension_type: extension.extension_type,
            version: extension.version,
            download_url: extension.download_url.filter(|u| !u.is_empty()),
            file_path: self.file_path.clone(),
            file_hash: self.file_hash.clone(),
            url: extension.url,
            last_modified: file.last_modified_date,
            size: file.size,
        }
    }
}

async fn upload(api: &dyn CloudApi, id: &str, path: &str) -> Result<(), ProviderError> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|e| ProviderError::InvalidRequest(format!("failed to read {}: {}", path, e)))?;
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());

    debug!(%id, %file_name, bytes = contents.len(), "Uploading extension archive");
    api.upload_extension(id, &file_name, contents)
        .await
        .map_err(|e| ProviderError::api("failed to upload extension", e))?;
    Ok(())
}

fn state_id(model: &ExtensionModel) -> Result<&str, ProviderError> {
    model
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::InvalidRequest("state has no id".to_string()))
}

/// Manages a deployment extension.
#[derive(Debug, Default)]
pub struct ExtensionResource;

#[async_trait]
impl Resource for ExtensionResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Custom bundle or plugin that deployments can use")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute(
                "extension_type",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("bundle or plugin"),
            )
            .with_attribute(
                "version",
                Attribute::required_string()
                    .with_description("Elasticsearch version the extension is built for; may use * wildcards"),
            )
            .with_attribute("download_url", Attribute::optional_string())
            .with_attribute(
                "file_path",
                Attribute::optional_string().with_description("Local archive to upload"),
            )
            .with_attribute(
                "file_hash",
                Attribute::optional_string()
                    .with_description("Hash of file_path; a change triggers a new upload"),
            )
            .with_attribute("url", Attribute::computed_string())
            .with_attribute("last_modified", Attribute::computed_string())
            .with_attribute("size", Attribute::computed_int64())
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if let Some(kind) = config.get("extension_type").and_then(Value::as_str) {
            if !EXTENSION_TYPES.contains(&kind) {
                diagnostics.push(
                    Diagnostic::error(format!("Unsupported extension_type '{}'", kind))
                        .with_detail("expected bundle or plugin")
                        .with_attribute("extension_type"),
                );
            }
        }
        if config.get("file_hash").is_some_and(|v| !v.is_null())
            && config.get("file_path").map(Value::is_null).unwrap_or(true)
        {
            diagnostics.push(
                Diagnostic::warning("file_hash has no effect without file_path")
                    .with_attribute("file_hash"),
            );
        }
        diagnostics
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn create(&self, api: &dyn CloudApi, planned: Value) -> Result<Value, ProviderError> {
        let model: ExtensionModel = decode(planned)?;
        let mut extension = api
            .create_extension(&model.to_request())
            .await
            .map_err(|e| ProviderError::api("failed to create extension", e))?;
        info!(id = %extension.id, name = %model.name, "Created extension");

        if let Some(path) = &model.file_path {
            upload(api, &extension.id, path).await?;
            extension = api
                .get_extension(&extension.id)
                .await
                .map_err(|e| ProviderError::api("failed to read extension", e))?;
        }

        encode(&model.refreshed(extension))
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn read(&self, api: &dyn CloudApi, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: ExtensionModel = decode(state)?;
        let id = state_id(&model)?;
        gone_or(api.get_extension(id).await, "failed to read extension")?
            .map(|extension| encode(&model.refreshed(extension)))
            .transpose()
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn update(
        &self,
        api: &dyn CloudApi,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: ExtensionModel = decode(prior)?;
        let model: ExtensionModel = decode(planned)?;
        let id = state_id(&prior)?;

        let mut extension = api
            .update_extension(id, &model.to_request())
            .await
            .map_err(|e| ProviderError::api("failed to update extension", e))?;

        let reupload = model.file_hash != prior.file_hash || model.file_path != prior.file_path;
        if let (true, Some(path)) = (reupload, &model.file_path) {
            upload(api, id, path).await?;
            extension = api
                .get_extension(id)
                .await
                .map_err(|e| ProviderError::api("failed to read extension", e))?;
        }

        encode(&model.refreshed(extension))
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn delete(&self, api: &dyn CloudApi, state: Value) -> Result<(), ProviderError> {
        let model: ExtensionModel = decode(state)?;
        let id = state_id(&model)?;
        gone_or(api.delete_extension(id).await, "failed to delete extension")?;
        info!(%id, "Deleted extension");
        Ok(())
    }

    async fn import(&self, api: &dyn CloudApi, id: &str) -> Result<Value, ProviderError> {
        let extension = api
            .get_extension(id)
            .await
            .map_err(|e| ProviderError::api("failed to import extension", e))?;
        encode(&ExtensionModel::default().refreshed(extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryApi;
    use serde_json::json;
    use std::io::Write;

    #[tokio::test]
    async fn test_create_with_upload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"bundle-bytes").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let api = InMemoryApi::new();
        let state = ExtensionResource
            .create(
                &api,
                json!({
                    "name": "synonyms",
                    "extension_type": "bundle",
                    "version": "7.*",
                    "file_path": path,
                    "file_hash": "abc"
                }),
            )
            .await
            .unwrap();

        let id = state["id"].as_str().unwrap();
        assert_eq!(api.uploaded(id).await.unwrap(), b"bundle-bytes".to_vec());
        assert_eq!(state["size"], 12);
        assert_eq!(state["file_hash"], "abc");
        assert!(state["last_modified"].is_string());
    }

    #[tokio::test]
    async fn test_update_reuploads_on_hash_change() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"v1").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let api = InMemoryApi::new();
        let config = json!({
            "name": "synonyms",
            "extension_type": "bundle",
            "version": "7.*",
            "file_path": path,
            "file_hash": "h1"
        });
        let state = ExtensionResource.create(&api, config).await.unwrap();
        let id = state["id"].as_str().unwrap().to_string();

        std::fs::write(&path, b"version-2").unwrap();
        let mut planned = state.clone();
        planned["description"] = json!("updated");
        let same_hash = ExtensionResource
            .update(&api, state.clone(), planned.clone())
            .await
            .unwrap();
        assert_eq!(same_hash["description"], "updated");
        assert_eq!(api.uploaded(&id).await.unwrap(), b"v1".to_vec());

        planned["file_hash"] = json!("h2");
        let updated = ExtensionResource
            .update(&api, same_hash, planned)
            .await
            .unwrap();
        assert_eq!(api.uploaded(&id).await.unwrap(), b"version-2".to_vec());
        assert_eq!(updated["size"], 9);
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let api = InMemoryApi::new();
        let err = ExtensionResource
            .create(
                &api,
                json!({
                    "name": "x",
                    "extension_type": "plugin",
                    "version": "7.10.0",
                    "file_path": "/does/not/exist.zip"
                }),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/does/not/exist.zip"));
    }

    #[tokio::test]
    async fn test_read_and_delete_gone() {
        let api = InMemoryApi::new();
        let state = ExtensionResource
            .create(
                &api,
                json!({"name": "x", "extension_type": "plugin", "version": "7.10.0",
                       "download_url": "https://example.com/plugin.zip"}),
            )
            .await
            .unwrap();
        assert_eq!(state["download_url"], "https://example.com/plugin.zip");

        ExtensionResource.delete(&api, state.clone()).await.unwrap();
        assert_eq!(api.extension_count().await, 0);
        assert!(ExtensionResource.read(&api, state.clone()).await.unwrap().is_none());
        ExtensionResource.delete(&api, state).await.unwrap();
    }

    #[test]
    fn test_validate() {
        let diagnostics = ExtensionResource.validate(&json!({
            "name": "x", "extension_type": "theme", "version": "1", "file_hash": "abc"
        }));
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics[0].is_error());
        assert!(!diagnostics[1].is_error());
    }
}
