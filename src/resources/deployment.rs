//! The `ec_deployment` resource.
//!
//! A deployment always has one Elasticsearch resource and may have one
//! Kibana resource. Sizes are written as `"4g"`/`"512m"` in configuration
//! and sent to the API in MB.
//!
//! The Elasticsearch password is only returned when the deployment is
//! created, so it is carried over from prior state on every read.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::{decode, encode, gone_or, Resource};
use crate::api::{
    CloudApi, DeploymentCreateRequest, DeploymentGetResponse, DeploymentMetadata,
    DeploymentResources, DeploymentSettings, DeploymentTemplateReference, DeploymentUpdateRequest,
    ElasticsearchConfiguration, ElasticsearchPayload, ElasticsearchPlan,
    ElasticsearchTopologyElement, KibanaConfiguration, KibanaPayload, KibanaPlan,
    KibanaTopologyElement, MetadataItem, TopologySize, TrafficFilterSettings,
};
use crate::error::ProviderError;
use crate::memory::{parse_size, size_to_state, SizeError};
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};

pub const TYPE_NAME: &str = "ec_deployment";

const DEFAULT_ES_REF_ID: &str = "main-elasticsearch";
const DEFAULT_KIBANA_REF_ID: &str = "main-kibana";
const DEFAULT_SIZE_RESOURCE: &str = "memory";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct DeploymentModel {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    pub region: String,
    pub version: String,
    pub deployment_template_id: String,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub traffic_filter: Option<Vec<String>>,
    #[serde(default)]
    pub elasticsearch_username: Option<String>,
    #[serde(default)]
    pub elasticsearch_password: Option<String>,
    pub elasticsearch: ElasticsearchModel,
    #[serde(default)]
    pub kibana: Option<KibanaModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ElasticsearchModel {
    #[serde(default)]
    pub autoscale: Option<bool>,
    #[serde(default)]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub cloud_id: Option<String>,
    #[serde(default)]
    pub https_endpoint: Option<String>,
    #[serde(default)]
    pub topology: Vec<TopologyModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct TopologyModel {
    pub id: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub size_resource: Option<String>,
    #[serde(default)]
    pub zone_count: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct KibanaModel {
    #[serde(default)]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub elasticsearch_cluster_ref_id: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub https_endpoint: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub size_resource: Option<String>,
    #[serde(default)]
    pub zone_count: Option<i32>,
}

fn topology_size(
    size: &Option<String>,
    resource: &Option<String>,
    path: &str,
) -> Result<Option<TopologySize>, ProviderError> {
    let Some(size) = size else {
        return Ok(None);
    };
    let mb = parse_size(size).map_err(|e| ProviderError::Validation(format!("{}: {}", path, e)))?;
    Ok(Some(TopologySize {
        value: i32::try_from(mb)
            .map_err(|_| {
                ProviderError::Validation(format!("{}: {}", path, SizeError::TooLarge(size.clone())))
            })?,
        resource: resource
            .clone()
            .unwrap_or_else(|| DEFAULT_SIZE_RESOURCE.to_string()),
    }))
}

/// State form of an API size. Without a size, `size_resource` falls back to
/// the prior state's value or the default.
fn size_from_api(
    size: Option<&TopologySize>,
    prior_resource: Option<&String>,
    path: &str,
) -> Result<(Option<String>, Option<String>), ProviderError> {
    let Some(size) = size else {
        let resource = prior_resource
            .cloned()
            .unwrap_or_else(|| DEFAULT_SIZE_RESOURCE.to_string());
        return Ok((None, Some(resource)));
    };
    let mb = u32::try_from(size.value).map_err(|_| {
        ProviderError::InvalidRequest(format!(
            "{}: API returned a negative size ({})",
            path, size.value
        ))
    })?;
    Ok((Some(size_to_state(mb)), Some(size.resource.clone())))
}

impl DeploymentModel {
    fn es_ref_id(&self) -> String {
        self.elasticsearch
            .ref_id
            .clone()
            .unwrap_or_else(|| DEFAULT_ES_REF_ID.to_string())
    }

    fn metadata(&self) -> Option<DeploymentMetadata> {
        self.tags.as_ref().map(|tags| DeploymentMetadata {
            tags: tags
                .iter()
                .map(|(key, value)| MetadataItem {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        })
    }

    fn traffic_filters(&self) -> BTreeSet<String> {
        self.traffic_filter.iter().flatten().cloned().collect()
    }

    fn resources(&self) -> Result<DeploymentResources, ProviderError> {
        let es = &self.elasticsearch;
        let cluster_topology = es
            .topology
            .iter()
            .enumerate()
            .map(|(index, topology)| {
                Ok(ElasticsearchTopologyElement {
                    id: topology.id.clone(),
                    size: topology_size(
                        &topology.size,
                        &topology.size_resource,
                        &format!("elasticsearch.topology[{}].size", index),
                    )?,
                    zone_count: topology.zone_count,
                })
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        let elasticsearch = ElasticsearchPayload {
            region: self.region.clone(),
            ref_id: self.es_ref_id(),
            plan: ElasticsearchPlan {
                elasticsearch: ElasticsearchConfiguration {
                    version: self.version.clone(),
                },
                deployment_template: Some(DeploymentTemplateReference {
                    id: self.deployment_template_id.clone(),
                }),
                autoscaling_enabled: es.autoscale,
                cluster_topology,
            },
        };

        let kibana = self
            .kibana
            .as_ref()
            .map(|kibana| -> Result<KibanaPayload, ProviderError> {
                Ok(KibanaPayload {
                    region: self.region.clone(),
                    ref_id: kibana
                        .ref_id
                        .clone()
                        .unwrap_or_else(|| DEFAULT_KIBANA_REF_ID.to_string()),
                    elasticsearch_cluster_ref_id: kibana
                        .elasticsearch_cluster_ref_id
                        .clone()
                        .unwrap_or_else(|| self.es_ref_id()),
                    plan: KibanaPlan {
                        kibana: KibanaConfiguration {
                            version: self.version.clone(),
                        },
                        cluster_topology: vec![KibanaTopologyElement {
                            size: topology_size(&kibana.size, &kibana.size_resource, "kibana.size")?,
                            zone_count: kibana.zone_count,
                        }],
                    },
                })
            })
            .transpose()?;

        Ok(DeploymentResources {
            elasticsearch: vec![elasticsearch],
            kibana: kibana.into_iter().collect(),
        })
    }

    fn create_request(&self) -> Result<DeploymentCreateRequest, ProviderError> {
        let rulesets: Vec<String> = self.traffic_filters().into_iter().collect();
        Ok(DeploymentCreateRequest {
            name: self.name.clone(),
            alias: self.alias.clone(),
            metadata: self.metadata(),
            settings: (!rulesets.is_empty()).then(|| DeploymentSettings {
                traffic_filter_settings: Some(TrafficFilterSettings { rulesets }),
            }),
            resources: self.resources()?,
        })
    }

    fn update_request(&self) -> Result<DeploymentUpdateRequest, ProviderError> {
        Ok(DeploymentUpdateRequest {
            name: self.name.clone(),
            alias: self.alias.clone(),
            prune_orphans: true,
            metadata: Some(self.metadata().unwrap_or_default()),
            resources: self.resources()?,
        })
    }

    /// Build state from the API view. Credentials and the shape of optional
    /// collections come from `prior`.
    fn from_remote(remote: &DeploymentGetResponse, prior: &Self) -> Result<Self, ProviderError> {
        let es = remote.elasticsearch().ok_or_else(|| {
            ProviderError::InvalidRequest(format!(
                "deployment {} has no Elasticsearch resource",
                remote.id
            ))
        })?;
        let es_plan = es.info.plan_info.current.as_ref().map(|attempt| &attempt.plan);

        let topology = es_plan
            .map(|plan| {
                plan.cluster_topology
                    .iter()
                    .enumerate()
                    .map(|(index, element)| {
                        let prior_resource = prior
                            .elasticsearch
                            .topology
                            .iter()
                            .find(|t| t.id == element.id)
                            .and_then(|t| t.size_resource.as_ref());
                        let (size, size_resource) = size_from_api(
                            element.size.as_ref(),
                            prior_resource,
                            &format!("elasticsearch.topology[{}].size", index),
                        )?;
                        Ok(TopologyModel {
                            id: element.id.clone(),
                            size,
                            size_resource,
                            zone_count: element.zone_count,
                        })
                    })
                    .collect::<Result<Vec<_>, ProviderError>>()
            })
            .transpose()?
            .unwrap_or_else(|| prior.elasticsearch.topology.clone());

        let kibana = remote
            .kibana()
            .map(|kb| -> Result<KibanaModel, ProviderError> {
                let element = kb
                    .info
                    .plan_info
                    .current
                    .as_ref()
                    .and_then(|attempt| attempt.plan.cluster_topology.first());
                let (size, size_resource) = size_from_api(
                    element.and_then(|e| e.size.as_ref()),
                    prior.kibana.as_ref().and_then(|k| k.size_resource.as_ref()),
                    "kibana.size",
                )?;
                Ok(KibanaModel {
                    ref_id: Some(kb.ref_id.clone()),
                    elasticsearch_cluster_ref_id: Some(kb.elasticsearch_cluster_ref_id.clone())
                        .filter(|r| !r.is_empty()),
                    resource_id: Some(kb.id.clone()),
                    https_endpoint: kb.info.metadata.https_endpoint(),
                    size,
                    size_resource,
                    zone_count: element.and_then(|e| e.zone_count),
                })
            })
            .transpose()?;

        let tags: BTreeMap<String, String> = remote
            .metadata
            .iter()
            .flat_map(|m| m.tags.iter())
            .map(|item| (item.key.clone(), item.value.clone()))
            .collect();
        let mut traffic_filter = remote.traffic_filters();
        traffic_filter.sort();

        Ok(Self {
            id: Some(remote.id.clone()),
            name: Some(remote.name.clone()),
            alias: remote.alias.clone().filter(|a| !a.is_empty()),
            region: es.region.clone(),
            version: es_plan
                .map(|plan| plan.elasticsearch.version.clone())
                .unwrap_or_else(|| prior.version.clone()),
            deployment_template_id: es_plan
                .and_then(|plan| plan.deployment_template.as_ref())
                .map(|template| template.id.clone())
                .unwrap_or_else(|| prior.deployment_template_id.clone()),
            tags: (!tags.is_empty() || prior.tags.is_some()).then_some(tags),
            traffic_filter: (!traffic_filter.is_empty() || prior.traffic_filter.is_some())
                .then_some(traffic_filter),
            elasticsearch_username: prior.elasticsearch_username.clone(),
            elasticsearch_password: prior.elasticsearch_password.clone(),
            elasticsearch: ElasticsearchModel {
                autoscale: es_plan.and_then(|plan| plan.autoscaling_enabled),
                ref_id: Some(es.ref_id.clone()),
                resource_id: Some(es.id.clone()),
                region: Some(es.region.clone()),
                cloud_id: es.info.metadata.cloud_id.clone(),
                https_endpoint: es.info.metadata.https_endpoint(),
                topology,
            },
            kibana,
        })
    }
}

fn state_id(model: &DeploymentModel) -> Result<&str, ProviderError> {
    model
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::InvalidRequest("state has no id".to_string()))
}

fn size_diagnostic(size: Option<&Value>, path: &str) -> Option<Diagnostic> {
    let size = size?.as_str()?;
    parse_size(size).err().map(|e| {
        Diagnostic::error("Invalid size")
            .with_detail(e.to_string())
            .with_attribute(path)
    })
}

/// Manages an Elastic Cloud deployment.
#[derive(Debug, Default)]
pub struct DeploymentResource;

impl DeploymentResource {
    async fn fetch(
        &self,
        api: &dyn CloudApi,
        id: &str,
        prior: &DeploymentModel,
    ) -> Result<Value, ProviderError> {
        let remote = api
            .get_deployment(id)
            .await
            .map_err(|e| ProviderError::api("failed to read deployment", e))?;
        encode(&DeploymentModel::from_remote(&remote, prior)?)
    }
}

fn elasticsearch_block() -> Block {
    let topology = Block::new()
        .with_description("Instance configuration of one topology element")
        .with_attribute(
            "id",
            Attribute::required_string().with_description("e.g. hot_content, warm, master"),
        )
        .with_attribute(
            "size",
            Attribute::optional_computed_string().with_description("Instance size, e.g. 4g"),
        )
        .with_attribute(
            "size_resource",
            Attribute::optional_computed_string().with_default(json!(DEFAULT_SIZE_RESOURCE)),
        )
        .with_attribute("zone_count", Attribute::optional_computed_int64());

    Block::new()
        .with_description("Elasticsearch cluster of the deployment")
        .with_attribute("autoscale", Attribute::optional_computed_bool())
        .with_attribute(
            "ref_id",
            Attribute::optional_computed_string().with_default(json!(DEFAULT_ES_REF_ID)),
        )
        .with_attribute("resource_id", Attribute::computed_string())
        .with_attribute("region", Attribute::computed_string())
        .with_attribute("cloud_id", Attribute::computed_string())
        .with_attribute("https_endpoint", Attribute::computed_string())
        .with_block("topology", NestedBlock::list(topology))
}

fn kibana_block() -> Block {
    Block::new()
        .with_description("Kibana instance of the deployment")
        .with_attribute(
            "ref_id",
            Attribute::optional_computed_string().with_default(json!(DEFAULT_KIBANA_REF_ID)),
        )
        .with_attribute("elasticsearch_cluster_ref_id", Attribute::optional_computed_string())
        .with_attribute("resource_id", Attribute::computed_string())
        .with_attribute("https_endpoint", Attribute::computed_string())
        .with_attribute("size", Attribute::optional_computed_string())
        .with_attribute(
            "size_resource",
            Attribute::optional_computed_string().with_default(json!(DEFAULT_SIZE_RESOURCE)),
        )
        .with_attribute("zone_count", Attribute::optional_computed_int64())
}

#[async_trait]
impl Resource for DeploymentResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Elastic Cloud deployment")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::optional_computed_string())
            .with_attribute("alias", Attribute::optional_computed_string())
            .with_attribute("region", Attribute::required_string().with_force_new())
            .with_attribute(
                "version",
                Attribute::required_string()
                    .with_description("Stack version, usually taken from the ec_stack data source"),
            )
            .with_attribute("deployment_template_id", Attribute::required_string())
            .with_attribute("tags", Attribute::optional_string_map())
            .with_attribute(
                "traffic_filter",
                Attribute::optional_string_set()
                    .with_description("Traffic filter ruleset IDs attached to the deployment"),
            )
            .with_attribute("elasticsearch_username", Attribute::computed_string())
            .with_attribute("elasticsearch_password", Attribute::computed_string().sensitive())
            .with_block("elasticsearch", NestedBlock::single(elasticsearch_block()).required())
            .with_block("kibana", NestedBlock::single(kibana_block()))
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let topology = config
            .pointer("/elasticsearch/topology")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for (index, element) in topology.iter().enumerate() {
            diagnostics.extend(size_diagnostic(
                element.get("size"),
                &format!("elasticsearch.topology[{}].size", index),
            ));
        }
        diagnostics.extend(size_diagnostic(config.pointer("/kibana/size"), "kibana.size"));
        diagnostics
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn create(&self, api: &dyn CloudApi, planned: Value) -> Result<Value, ProviderError> {
        let mut model: DeploymentModel = decode(planned)?;
        let request = model.create_request()?;

        let response = api
            .create_deployment(&request)
            .await
            .map_err(|e| ProviderError::api("failed to create deployment", e))?;
        info!(id = %response.id, region = %model.region, "Created deployment");

        match response.resources.iter().find_map(|r| r.credentials.as_ref()) {
            Some(credentials) => {
                model.elasticsearch_username = Some(credentials.username.clone());
                model.elasticsearch_password = Some(credentials.password.clone());
            },
            None => warn!(id = %response.id, "Create response carried no Elasticsearch credentials"),
        }

        self.fetch(api, &response.id, &model).await
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn read(&self, api: &dyn CloudApi, state: Value) -> Result<Option<Value>, ProviderError> {
        let prior: DeploymentModel = decode(state)?;
        let id = state_id(&prior)?;

        let Some(remote) = gone_or(api.get_deployment(id).await, "failed to read deployment")?
        else {
            warn!(%id, "Deployment not found, removing from state");
            return Ok(None);
        };
        if remote.is_stopped() {
            warn!(%id, "Deployment has been shut down, removing from state");
            return Ok(None);
        }

        encode(&DeploymentModel::from_remote(&remote, &prior)?).map(Some)
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn update(
        &self,
        api: &dyn CloudApi,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: DeploymentModel = decode(prior)?;
        let mut model: DeploymentModel = decode(planned)?;
        let id = state_id(&prior)?.to_string();

        api.update_deployment(&id, &model.update_request()?)
            .await
            .map_err(|e| ProviderError::api("failed to update deployment", e))?;
        debug!(%id, "Applied deployment plan");

        let before = prior.traffic_filters();
        let after = model.traffic_filters();
        for ruleset in after.difference(&before) {
            api.associate_traffic_filter(ruleset, &id)
                .await
                .map_err(|e| ProviderError::api("failed to associate traffic filter", e))?;
            debug!(%id, %ruleset, "Associated traffic filter");
        }
        for ruleset in before.difference(&after) {
            gone_or(
                api.disassociate_traffic_filter(ruleset, &id).await,
                "failed to remove traffic filter association",
            )?;
            debug!(%id, %ruleset, "Removed traffic filter association");
        }

        model.elasticsearch_username = prior.elasticsearch_username.clone();
        model.elasticsearch_password = prior.elasticsearch_password.clone();
        self.fetch(api, &id, &model).await
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn delete(&self, api: &dyn CloudApi, state: Value) -> Result<(), ProviderError> {
        let model: DeploymentModel = decode(state)?;
        let id = state_id(&model)?;
        match api.shutdown_deployment(id).await {
            Ok(()) => {
                info!(%id, "Shut down deployment");
                Ok(())
            },
            Err(e) if e.is_not_found() => {
                debug!(%id, "Deployment already gone");
                Ok(())
            },
            Err(e) => Err(ProviderError::api("failed to shut down deployment", e)),
        }
    }

    async fn import(&self, api: &dyn CloudApi, id: &str) -> Result<Value, ProviderError> {
        let remote = api
            .get_deployment(id)
            .await
            .map_err(|e| ProviderError::api("failed to import deployment", e))?;
        if remote.is_stopped() {
            return Err(ProviderError::NotFound(format!(
                "deployment {} has been shut down",
                id
            )));
        }
        encode(&DeploymentModel::from_remote(&remote, &DeploymentModel::default())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{InMemoryApi, TrafficFilterRule, TrafficFilterRulesetRequest};

    fn config() -> Value {
        json!({
            "name": "logging",
            "region": "us-east-1",
            "version": "7.9.1",
            "deployment_template_id": "aws-io-optimized-v2",
            "tags": {"team": "search"},
            "elasticsearch": {
                "topology": [
                    {"id": "hot_content", "size": "4g", "zone_count": 2},
                    {"id": "warm", "size": "2048m", "size_resource": "storage"}
                ]
            },
            "kibana": {"size": "1g"}
        })
    }

    async fn ruleset(api: &InMemoryApi, name: &str) -> String {
        api.create_traffic_filter(&TrafficFilterRulesetRequest {
            name: name.to_string(),
            region: "us-east-1".to_string(),
            kind: "ip".to_string(),
            rules: vec![TrafficFilterRule {
                source: Some("10.0.0.0/8".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create() {
        let api = InMemoryApi::new();
        let state = DeploymentResource.create(&api, config()).await.unwrap();

        assert_eq!(state["name"], "logging");
        assert_eq!(state["version"], "7.9.1");
        assert_eq!(state["deployment_template_id"], "aws-io-optimized-v2");
        assert_eq!(state["elasticsearch_username"], "elastic");
        assert!(state["elasticsearch_password"].as_str().unwrap().starts_with("pw-"));
        assert_eq!(state["tags"], json!({"team": "search"}));
        assert_eq!(state["traffic_filter"], Value::Null);

        let es = &state["elasticsearch"];
        assert_eq!(es["ref_id"], "main-elasticsearch");
        assert_eq!(es["region"], "us-east-1");
        assert!(es["https_endpoint"].as_str().unwrap().ends_with(":443"));
        assert_eq!(es["topology"][0]["size"], "4g");
        assert_eq!(es["topology"][0]["size_resource"], "memory");
        assert_eq!(es["topology"][0]["zone_count"], 2);
        assert_eq!(es["topology"][1]["size"], "2g");
        assert_eq!(es["topology"][1]["size_resource"], "storage");

        assert_eq!(state["kibana"]["size"], "1g");
        assert_eq!(state["kibana"]["elasticsearch_cluster_ref_id"], "main-elasticsearch");
        assert_eq!(api.running_deployments().await, 1);
    }

    #[tokio::test]
    async fn test_read_keeps_credentials() {
        let api = InMemoryApi::new();
        let state = DeploymentResource.create(&api, config()).await.unwrap();
        let refreshed = DeploymentResource.read(&api, state.clone()).await.unwrap();
        assert_eq!(refreshed, Some(state));
    }

    #[tokio::test]
    async fn test_read_removed_when_gone_or_stopped() {
        let api = InMemoryApi::new();
        let state = DeploymentResource.create(&api, config()).await.unwrap();
        let id = state["id"].as_str().unwrap().to_string();

        api.shutdown_deployment(&id).await.unwrap();
        assert!(DeploymentResource.read(&api, state.clone()).await.unwrap().is_none());

        api.remove_deployment(&id).await;
        assert!(DeploymentResource.read(&api, state.clone()).await.unwrap().is_none());

        let state = DeploymentResource.create(&api, config()).await.unwrap();
        api.forbid(state["id"].as_str().unwrap()).await;
        assert!(DeploymentResource.read(&api, state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_applies_traffic_filter_changes() {
        let api = InMemoryApi::new();
        let office = ruleset(&api, "office").await;
        let vpn = ruleset(&api, "vpn").await;

        let mut config = config();
        config["traffic_filter"] = json!([office]);
        let state = DeploymentResource.create(&api, config).await.unwrap();
        assert_eq!(state["traffic_filter"], json!([office]));

        let mut planned = state.clone();
        planned["name"] = json!("logging-v2");
        planned["traffic_filter"] = json!([vpn]);
        planned["elasticsearch"]["topology"][0]["size"] = json!("8g");
        let updated = DeploymentResource
            .update(&api, state.clone(), planned)
            .await
            .unwrap();

        assert_eq!(updated["name"], "logging-v2");
        assert_eq!(updated["traffic_filter"], json!([vpn]));
        assert_eq!(updated["elasticsearch"]["topology"][0]["size"], "8g");
        assert_eq!(updated["elasticsearch"]["resource_id"], state["elasticsearch"]["resource_id"]);
        assert_eq!(updated["elasticsearch_password"], state["elasticsearch_password"]);
    }

    #[tokio::test]
    async fn test_update_prunes_kibana() {
        let api = InMemoryApi::new();
        let state = DeploymentResource.create(&api, config()).await.unwrap();

        let mut planned = state.clone();
        planned["kibana"] = Value::Null;
        let updated = DeploymentResource.update(&api, state, planned).await.unwrap();
        assert_eq!(updated["kibana"], Value::Null);
    }

    #[tokio::test]
    async fn test_update_stopped_deployment_fails() {
        let api = InMemoryApi::new();
        let state = DeploymentResource.create(&api, config()).await.unwrap();
        api.shutdown_deployment(state["id"].as_str().unwrap())
            .await
            .unwrap();

        let err = DeploymentResource
            .update(&api, state.clone(), state)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing() {
        let api = InMemoryApi::new();
        let state = DeploymentResource.create(&api, config()).await.unwrap();

        DeploymentResource.delete(&api, state.clone()).await.unwrap();
        assert_eq!(api.running_deployments().await, 0);

        api.remove_deployment(state["id"].as_str().unwrap()).await;
        DeploymentResource.delete(&api, state).await.unwrap();
    }

    #[tokio::test]
    async fn test_import() {
        let api = InMemoryApi::new();
        let state = DeploymentResource.create(&api, config()).await.unwrap();
        let id = state["id"].as_str().unwrap();

        let imported = DeploymentResource.import(&api, id).await.unwrap();
        assert_eq!(imported["id"], id);
        assert_eq!(imported["elasticsearch_password"], Value::Null);
        assert_eq!(imported["elasticsearch"], state["elasticsearch"]);

        let err = DeploymentResource.import(&api, "missing").await.unwrap_err();
        assert!(err.to_string().contains("failed to import deployment"));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_size() {
        let api = InMemoryApi::new();
        let mut uneven = config();
        uneven["elasticsearch"]["topology"][0]["size"] = json!("700m");
        let err = DeploymentResource.create(&api, uneven).await.unwrap_err();
        assert!(err.to_string().contains("elasticsearch.topology[0].size"));
        assert_eq!(api.running_deployments().await, 0);

        let mut oversized = config();
        oversized["kibana"]["size"] = json!("4194303.5g");
        let err = DeploymentResource.create(&api, oversized).await.unwrap_err();
        assert!(err.to_string().contains("kibana.size: size \"4194303.5g\" is too large"));
        assert_eq!(api.running_deployments().await, 0);
    }

    #[tokio::test]
    async fn test_unsized_elements_plan_without_changes() {
        let api = InMemoryApi::new();
        let schema = DeploymentResource.schema();
        let config = json!({
            "name": "logging",
            "region": "us-east-1",
            "version": "7.17.1",
            "deployment_template_id": "aws-io-optimized-v2",
            "elasticsearch": {
                "topology": [
                    {"id": "hot_content", "size": "2g"},
                    {"id": "master"}
                ]
            },
            "kibana": {}
        });

        let planned = crate::plan::plan(&schema, None, &config).planned_state;
        let state = DeploymentResource.create(&api, planned).await.unwrap();
        assert_eq!(state["kibana"]["size"], Value::Null);
        assert_eq!(state["kibana"]["size_resource"], "memory");
        assert_eq!(state["elasticsearch"]["topology"][1]["size"], Value::Null);
        assert_eq!(state["elasticsearch"]["topology"][1]["size_resource"], "memory");

        let refreshed = DeploymentResource
            .read(&api, state.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed, state);

        let result = crate::plan::plan(&schema, Some(&refreshed), &config);
        assert!(result.changes.is_empty(), "unexpected changes: {:?}", result.changes);
        assert!(!result.requires_replace);
    }

    #[tokio::test]
    async fn test_unsized_elements_keep_prior_size_resource() {
        let api = InMemoryApi::new();
        let mut config = config();
        config["elasticsearch"]["topology"][1] = json!({"id": "warm", "size_resource": "storage"});
        config["kibana"] = json!({"size_resource": "storage"});
        let state = DeploymentResource.create(&api, config).await.unwrap();

        assert_eq!(state["elasticsearch"]["topology"][1]["size"], Value::Null);
        assert_eq!(state["elasticsearch"]["topology"][1]["size_resource"], "storage");
        assert_eq!(state["kibana"]["size_resource"], "storage");
    }

    #[tokio::test]
    async fn test_from_remote_rejects_negative_size() {
        let api = InMemoryApi::new();
        let state = DeploymentResource.create(&api, config()).await.unwrap();
        let prior: DeploymentModel = decode(state.clone()).unwrap();
        let id = state["id"].as_str().unwrap();

        let mut remote = api.get_deployment(id).await.unwrap();
        remote.resources.kibana[0]
            .info
            .plan_info
            .current
            .as_mut()
            .unwrap()
            .plan
            .cluster_topology[0]
            .size = Some(TopologySize {
            value: -1024,
            resource: "memory".to_string(),
        });
        let err = DeploymentModel::from_remote(&remote, &prior).unwrap_err();
        assert!(err.to_string().contains("kibana.size: API returned a negative size (-1024)"));

        let mut remote = api.get_deployment(id).await.unwrap();
        remote.resources.elasticsearch[0]
            .info
            .plan_info
            .current
            .as_mut()
            .unwrap()
            .plan
            .cluster_topology[1]
            .size = Some(TopologySize {
            value: -512,
            resource: "storage".to_string(),
        });
        let err = DeploymentModel::from_remote(&remote, &prior).unwrap_err();
        assert!(err.to_string().contains("elasticsearch.topology[1].size"));
    }

    #[test]
    fn test_validate_sizes() {
        let mut invalid = config();
        invalid["elasticsearch"]["topology"][1]["size"] = json!("3x");
        invalid["kibana"]["size"] = json!("256m");

        let diagnostics = DeploymentResource.validate(&invalid);
        let attributes: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(attributes, vec!["elasticsearch.topology[1].size", "kibana.size"]);
        assert!(DeploymentResource.validate(&config()).is_empty());
    }

    #[test]
    fn test_update_request_prunes_orphans() {
        let model: DeploymentModel = decode(config()).unwrap();
        let request = model.update_request().unwrap();
        assert!(request.prune_orphans);
        assert_eq!(request.resources.kibana.len(), 1);
        let size = request.resources.elasticsearch[0].plan.cluster_topology[0]
            .size
            .clone()
            .unwrap();
        assert_eq!(size.value, 4096);
        assert_eq!(size.resource, "memory");
    }
}
