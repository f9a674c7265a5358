//! In-memory control plane.
//!
//! Keeps deployments, extensions and traffic filters in maps behind an
//! async `RwLock` and answers with the same status codes as the real API
//! (404 for unknown IDs, 403 for IDs marked as forbidden). IDs come from a
//! counter so test runs are deterministic.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::models::*;
use super::{ApiError, CloudApi};

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    stacks: HashMap<String, Vec<StackVersion>>,
    deployments: BTreeMap<String, DeploymentGetResponse>,
    extensions: BTreeMap<String, Extension>,
    traffic_filters: BTreeMap<String, TrafficFilterRulesetInfo>,
    forbidden: BTreeSet<String>,
    uploads: HashMap<String, Vec<u8>>,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:032x}", self.next_id)
    }

    fn check_access(&self, id: &str) -> Result<(), ApiError> {
        if self.forbidden.contains(id) {
            return Err(ApiError::status(403, format!("Access to {} is forbidden", id)));
        }
        Ok(())
    }

    fn deployment_mut(&mut self, id: &str) -> Result<&mut DeploymentGetResponse, ApiError> {
        self.check_access(id)?;
        self.deployments
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("Deployment {} not found", id)))
    }

    fn traffic_filter_mut(&mut self, id: &str) -> Result<&mut TrafficFilterRulesetInfo, ApiError> {
        self.check_access(id)?;
        self.traffic_filters
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("Traffic filter {} not found", id)))
    }

    fn extension_mut(&mut self, id: &str) -> Result<&mut Extension, ApiError> {
        self.check_access(id)?;
        self.extensions
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("Extension {} not found", id)))
    }

    /// Replace the resources of a deployment, keeping the IDs of resources
    /// whose `ref_id` survives.
    fn apply_resources(&mut self, deployment_id: &str, resources: &DeploymentResources) {
        let previous = self
            .deployments
            .get(deployment_id)
            .map(|d| d.resources.clone())
            .unwrap_or_default();

        let mut elasticsearch = Vec::new();
        for payload in &resources.elasticsearch {
            let id = match previous
                .elasticsearch
                .iter()
                .find(|es| es.ref_id == payload.ref_id)
            {
                Some(es) => es.id.clone(),
                None => self.next_id(),
            };
            elasticsearch.push(ElasticsearchResourceInfo {
                info: ClusterInfo {
                    status: "started".to_string(),
                    healthy: true,
                    metadata: endpoint_metadata(&id, &payload.region),
                    plan_info: PlanInfo {
                        current: Some(PlanAttempt {
                            plan: payload.plan.clone(),
                        }),
                    },
                },
                ref_id: payload.ref_id.clone(),
                region: payload.region.clone(),
                id,
            });
        }

        let mut kibana = Vec::new();
        for payload in &resources.kibana {
            let id = match previous.kibana.iter().find(|kb| kb.ref_id == payload.ref_id) {
                Some(kb) => kb.id.clone(),
                None => self.next_id(),
            };
            kibana.push(KibanaResourceInfo {
                info: ClusterInfo {
                    status: "started".to_string(),
                    healthy: true,
                    metadata: endpoint_metadata(&id, &payload.region),
                    plan_info: PlanInfo {
                        current: Some(PlanAttempt {
                            plan: payload.plan.clone(),
                        }),
                    },
                },
                ref_id: payload.ref_id.clone(),
                region: payload.region.clone(),
                elasticsearch_cluster_ref_id: payload.elasticsearch_cluster_ref_id.clone(),
                id,
            });
        }

        if let Some(deployment) = self.deployments.get_mut(deployment_id) {
            deployment.resources = DeploymentResourcesInfo {
                elasticsearch,
                kibana,
            };
            deployment.healthy = true;
        }
    }
}

fn endpoint_metadata(id: &str, region: &str) -> ClusterMetadata {
    ClusterMetadata {
        endpoint: Some(format!("{}.{}.found.io", id, region)),
        cloud_id: Some(format!("deployment:{}", id)),
        ports: Some(ClusterPorts {
            http: 9200,
            https: 443,
        }),
    }
}

/// A [`CloudApi`] backed by process memory.
///
/// Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryApi {
    inner: Arc<RwLock<State>>,
}

impl InMemoryApi {
    /// Create an empty control plane.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the stack versions of a region (newest first).
    pub async fn set_stacks(&self, region: impl Into<String>, stacks: Vec<StackVersion>) {
        self.inner.write().await.stacks.insert(region.into(), stacks);
    }

    /// Make every call touching `id` fail with 403.
    pub async fn forbid(&self, id: impl Into<String>) {
        self.inner.write().await.forbidden.insert(id.into());
    }

    /// Remove a deployment behind the provider's back.
    pub async fn remove_deployment(&self, id: &str) {
        self.inner.write().await.deployments.remove(id);
    }

    /// Remove a traffic filter behind the provider's back.
    pub async fn remove_traffic_filter(&self, id: &str) {
        self.inner.write().await.traffic_filters.remove(id);
    }

    /// Number of deployments that are not shut down.
    pub async fn running_deployments(&self) -> usize {
        self.inner
            .read()
            .await
            .deployments
            .values()
            .filter(|d| !d.is_stopped())
            .count()
    }

    /// Number of stored traffic filter rulesets.
    pub async fn traffic_filter_count(&self) -> usize {
        self.inner.read().await.traffic_filters.len()
    }

    /// Number of stored extensions.
    pub async fn extension_count(&self) -> usize {
        self.inner.read().await.extensions.len()
    }

    /// Bytes last uploaded for an extension.
    pub async fn uploaded(&self, id: &str) -> Option<Vec<u8>> {
        self.inner.read().await.uploads.get(id).cloned()
    }
}

#[async_trait]
impl CloudApi for InMemoryApi {
    async fn list_stacks(&self, region: &str) -> Result<Vec<StackVersion>, ApiError> {
        let state = self.inner.read().await;
        state
            .stacks
            .get(region)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("Region {} not found", region)))
    }

    async fn create_deployment(
        &self,
        request: &DeploymentCreateRequest,
    ) -> Result<DeploymentCreateResponse, ApiError> {
        if request.resources.elasticsearch.is_empty() {
            return Err(ApiError::status(
                400,
                "deployments.missing_elasticsearch: at least one Elasticsearch resource is required",
            ));
        }

        let mut state = self.inner.write().await;
        for ruleset in request
            .settings
            .iter()
            .filter_map(|s| s.traffic_filter_settings.as_ref())
            .flat_map(|t| t.rulesets.iter())
        {
            if !state.traffic_filters.contains_key(ruleset) {
                return Err(ApiError::status(
                    400,
                    format!("traffic_filter.not_found: ruleset {} does not exist", ruleset),
                ));
            }
        }

        let id = state.next_id();
        let password = format!("pw-{}", state.next_id());
        state.deployments.insert(
            id.clone(),
            DeploymentGetResponse {
                id: id.clone(),
                name: request.name.clone().unwrap_or_else(|| id.clone()),
                alias: request.alias.clone(),
                healthy: true,
                metadata: request.metadata.clone(),
                settings: request.settings.clone(),
                resources: DeploymentResourcesInfo::default(),
            },
        );
        state.apply_resources(&id, &request.resources);

        for ruleset in request
            .settings
            .iter()
            .filter_map(|s| s.traffic_filter_settings.as_ref())
            .flat_map(|t| t.rulesets.iter())
        {
            if let Some(filter) = state.traffic_filters.get_mut(ruleset) {
                filter.associations.push(FilterAssociation {
                    entity_type: ASSOCIATION_DEPLOYMENT.to_string(),
                    id: id.clone(),
                });
                filter.total_associations += 1;
            }
        }

        let deployment = &state.deployments[&id];
        let mut resources = Vec::new();
        for (index, es) in deployment.resources.elasticsearch.iter().enumerate() {
            resources.push(DeploymentResource {
                kind: "elasticsearch".to_string(),
                ref_id: es.ref_id.clone(),
                id: es.id.clone(),
                region: es.region.clone(),
                cloud_id: es.info.metadata.cloud_id.clone(),
                credentials: (index == 0).then(|| ClusterCredentials {
                    username: "elastic".to_string(),
                    password: password.clone(),
                }),
            });
        }
        for kb in &deployment.resources.kibana {
            resources.push(DeploymentResource {
                kind: "kibana".to_string(),
                ref_id: kb.ref_id.clone(),
                id: kb.id.clone(),
                region: kb.region.clone(),
                cloud_id: None,
                credentials: None,
            });
        }

        Ok(DeploymentCreateResponse {
            id: deployment.id.clone(),
            name: deployment.name.clone(),
            alias: deployment.alias.clone(),
            resources,
        })
    }

    async fn get_deployment(&self, id: &str) -> Result<DeploymentGetResponse, ApiError> {
        let state = self.inner.read().await;
        state.check_access(id)?;
        let mut deployment = state
            .deployments
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("Deployment {} not found", id)))?;

        let rulesets: Vec<String> = state
            .traffic_filters
            .values()
            .filter(|f| f.is_associated_with(id))
            .map(|f| f.id.clone())
            .collect();
        deployment.settings = Some(DeploymentSettings {
            traffic_filter_settings: Some(TrafficFilterSettings { rulesets }),
        });
        Ok(deployment)
    }

    async fn update_deployment(
        &self,
        id: &str,
        request: &DeploymentUpdateRequest,
    ) -> Result<(), ApiError> {
        let mut state = self.inner.write().await;
        let deployment = state.deployment_mut(id)?;
        if deployment.is_stopped() {
            return Err(ApiError::status(
                409,
                format!("Deployment {} has been shut down", id),
            ));
        }
        if let Some(name) = &request.name {
            deployment.name = name.clone();
        }
        deployment.alias = request.alias.clone();
        deployment.metadata = request.metadata.clone();
        state.apply_resources(id, &request.resources);
        Ok(())
    }

    async fn shutdown_deployment(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.inner.write().await;
        let deployment = state.deployment_mut(id)?;
        for es in &mut deployment.resources.elasticsearch {
            es.info.status = "stopped".to_string();
        }
        for kb in &mut deployment.resources.kibana {
            kb.info.status = "stopped".to_string();
        }
        deployment.healthy = false;

        for filter in state.traffic_filters.values_mut() {
            let before = filter.associations.len();
            filter.associations.retain(|a| a.id != id);
            filter.total_associations -= (before - filter.associations.len()) as i32;
        }
        Ok(())
    }

    async fn create_extension(&self, request: &ExtensionRequest) -> Result<Extension, ApiError> {
        let mut state = self.inner.write().await;
        let id = state.next_id();
        let extension = Extension {
            id: id.clone(),
            name: request.name.clone(),
            description: request.description.clone(),
            extension_type: request.extension_type.clone(),
            version: request.version.clone(),
            download_url: request.download_url.clone(),
            url: Some(format!("repo://{}", id)),
            file_metadata: None,
        };
        state.extensions.insert(id, extension.clone());
        Ok(extension)
    }

    async fn get_extension(&self, id: &str) -> Result<Extension, ApiError> {
        let mut state = self.inner.write().await;
        state.extension_mut(id).map(|e| e.clone())
    }

    async fn update_extension(
        &self,
        id: &str,
        request: &ExtensionRequest,
    ) -> Result<Extension, ApiError> {
        let mut state = self.inner.write().await;
        let extension = state.extension_mut(id)?;
        extension.name = request.name.clone();
        extension.description = request.description.clone();
        extension.version = request.version.clone();
        extension.download_url = request.download_url.clone();
        Ok(extension.clone())
    }

    async fn upload_extension(
        &self,
        id: &str,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<Extension, ApiError> {
        let mut state = self.inner.write().await;
        let size = contents.len() as i64;
        let extension = state.extension_mut(id)?;
        extension.file_metadata = Some(ExtensionFileMetadata {
            last_modified_date: Some("2020-01-01T00:00:00Z".to_string()),
            size: Some(size),
            url: Some(format!("repo://{}/{}", id, file_name)),
        });
        let extension = extension.clone();
        state.uploads.insert(id.to_string(), contents);
        Ok(extension)
    }

    async fn delete_extension(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.inner.write().await;
        state.check_access(id)?;
        state.uploads.remove(id);
        state
            .extensions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found(format!("Extension {} not found", id)))
    }

    async fn create_traffic_filter(
        &self,
        request: &TrafficFilterRulesetRequest,
    ) -> Result<String, ApiError> {
        let mut state = self.inner.write().await;
        let id = state.next_id();
        let rules: Vec<TrafficFilterRule> = request
            .rules
            .iter()
            .map(|rule| {
                let mut rule = rule.clone();
                rule.id = Some(state.next_id());
                rule
            })
            .collect();
        state.traffic_filters.insert(
            id.clone(),
            TrafficFilterRulesetInfo {
                id: id.clone(),
                name: request.name.clone(),
                region: request.region.clone(),
                kind: request.kind.clone(),
                include_by_default: request.include_by_default,
                description: request.description.clone(),
                rules,
                associations: Vec::new(),
                total_associations: 0,
            },
        );
        Ok(id)
    }

    async fn get_traffic_filter(
        &self,
        id: &str,
        include_associations: bool,
    ) -> Result<TrafficFilterRulesetInfo, ApiError> {
        let mut state = self.inner.write().await;
        let mut filter = state.traffic_filter_mut(id)?.clone();
        if !include_associations {
            filter.associations.clear();
        }
        Ok(filter)
    }

    async fn update_traffic_filter(
        &self,
        id: &str,
        request: &TrafficFilterRulesetRequest,
    ) -> Result<(), ApiError> {
        let mut state = self.inner.write().await;
        state.traffic_filter_mut(id)?;
        let rules: Vec<TrafficFilterRule> = request
            .rules
            .iter()
            .map(|rule| {
                let mut rule = rule.clone();
                if rule.id.is_none() {
                    rule.id = Some(state.next_id());
                }
                rule
            })
            .collect();
        let filter = state.traffic_filter_mut(id)?;
        filter.name = request.name.clone();
        filter.include_by_default = request.include_by_default;
        filter.description = request.description.clone();
        filter.rules = rules;
        Ok(())
    }

    async fn delete_traffic_filter(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.inner.write().await;
        let filter = state.traffic_filter_mut(id)?;
        if !filter.associations.is_empty() {
            return Err(ApiError::status(
                409,
                format!("Traffic filter {} is still associated with deployments", id),
            ));
        }
        state.traffic_filters.remove(id);
        Ok(())
    }

    async fn associate_traffic_filter(
        &self,
        ruleset_id: &str,
        deployment_id: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.inner.write().await;
        state.deployment_mut(deployment_id)?;
        let filter = state.traffic_filter_mut(ruleset_id)?;
        if !filter.is_associated_with(deployment_id) {
            filter.associations.push(FilterAssociation {
                entity_type: ASSOCIATION_DEPLOYMENT.to_string(),
                id: deployment_id.to_string(),
            });
            filter.total_associations += 1;
        }
        Ok(())
    }

    async fn disassociate_traffic_filter(
        &self,
        ruleset_id: &str,
        deployment_id: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.inner.write().await;
        let filter = state.traffic_filter_mut(ruleset_id)?;
        if !filter.is_associated_with(deployment_id) {
            return Err(ApiError::not_found(format!(
                "Association between {} and {} not found",
                ruleset_id, deployment_id
            )));
        }
        filter.associations.retain(|a| a.id != deployment_id);
        filter.total_associations -= 1;
        Ok(())
    }
}
