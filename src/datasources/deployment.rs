//! The `ec_deployment` data source: a summary of an existing deployment.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::api::{CloudApi, ClusterMetadata, DeploymentGetResponse};
use crate::error::ProviderError;
use crate::resources::{decode, encode, DataSource};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema};

pub const TYPE_NAME: &str = "ec_deployment";

#[derive(Debug, Deserialize)]
struct DeploymentLookup {
    id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct DeploymentSummary {
    id: String,
    name: String,
    alias: Option<String>,
    region: Option<String>,
    healthy: bool,
    deployment_template_id: Option<String>,
    traffic_filter: Vec<String>,
    tags: BTreeMap<String, String>,
    elasticsearch: Vec<ResourceSummary>,
    kibana: Vec<ResourceSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ResourceSummary {
    ref_id: String,
    resource_id: String,
    status: String,
    healthy: bool,
    version: Option<String>,
    cloud_id: Option<String>,
    https_endpoint: Option<String>,
}

impl ResourceSummary {
    fn new(
        ref_id: &str,
        resource_id: &str,
        status: &str,
        healthy: bool,
        version: Option<String>,
        metadata: &ClusterMetadata,
    ) -> Self {
        Self {
            ref_id: ref_id.to_string(),
            resource_id: resource_id.to_string(),
            status: status.to_string(),
            healthy,
            version,
            cloud_id: metadata.cloud_id.clone(),
            https_endpoint: metadata.https_endpoint(),
        }
    }
}

impl From<DeploymentGetResponse> for DeploymentSummary {
    fn from(remote: DeploymentGetResponse) -> Self {
        let elasticsearch = remote
            .resources
            .elasticsearch
            .iter()
            .map(|es| {
                let plan = es.info.plan_info.current.as_ref().map(|a| &a.plan);
                ResourceSummary::new(
                    &es.ref_id,
                    &es.id,
                    &es.info.status,
                    es.info.healthy,
                    plan.map(|p| p.elasticsearch.version.clone()),
                    &es.info.metadata,
                )
            })
            .collect();
        let kibana = remote
            .resources
            .kibana
            .iter()
            .map(|kb| {
                ResourceSummary::new(
                    &kb.ref_id,
                    &kb.id,
                    &kb.info.status,
                    kb.info.healthy,
                    kb.info
                        .plan_info
                        .current
                        .as_ref()
                        .map(|a| a.plan.kibana.version.clone()),
                    &kb.info.metadata,
                )
            })
            .collect();

        let template = remote
            .elasticsearch()
            .and_then(|es| es.info.plan_info.current.as_ref())
            .and_then(|a| a.plan.deployment_template.as_ref())
            .map(|t| t.id.clone());
        let mut traffic_filter = remote.traffic_filters();
        traffic_filter.sort();

        Self {
            region: remote.elasticsearch().map(|es| es.region.clone()),
            deployment_template_id: template,
            traffic_filter,
            tags: remote
                .metadata
                .iter()
                .flat_map(|m| m.tags.iter())
                .map(|t| (t.key.clone(), t.value.clone()))
                .collect(),
            elasticsearch,
            kibana,
            id: remote.id,
            name: remote.name,
            alias: remote.alias.filter(|a| !a.is_empty()),
            healthy: remote.healthy,
        }
    }
}

fn summary_block(description: &str) -> NestedBlock {
    NestedBlock::list(
        Block::new()
            .with_description(description)
            .with_attribute("ref_id", Attribute::computed_string())
            .with_attribute("resource_id", Attribute::computed_string())
            .with_attribute("status", Attribute::computed_string())
            .with_attribute("healthy", Attribute::computed_bool())
            .with_attribute("version", Attribute::computed_string())
            .with_attribute("cloud_id", Attribute::computed_string())
            .with_attribute("https_endpoint", Attribute::computed_string()),
    )
}

/// Looks up a deployment by ID.
#[derive(Debug, Default)]
pub struct DeploymentDataSource;

#[async_trait]
impl DataSource for DeploymentDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Retrieves information about an existing deployment")
            .with_attribute("id", Attribute::required_string())
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("alias", Attribute::computed_string())
            .with_attribute("region", Attribute::computed_string())
            .with_attribute("healthy", Attribute::computed_bool())
            .with_attribute("deployment_template_id", Attribute::computed_string())
            .with_attribute("traffic_filter", Attribute::computed_string_list())
            .with_attribute(
                "tags",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    AttributeFlags::computed(),
                ),
            )
            .with_block("elasticsearch", summary_block("Elasticsearch resources"))
            .with_block("kibana", summary_block("Kibana resources"))
    }

    #[instrument(skip_all, fields(data_source = TYPE_NAME))]
    async fn read(&self, api: &dyn CloudApi, config: Value) -> Result<Value, ProviderError> {
        let lookup: DeploymentLookup = decode(config)?;
        let remote = api.get_deployment(&lookup.id).await.map_err(|e| {
            if e.is_not_found() {
                ProviderError::NotFound(format!("deployment {}", lookup.id))
            } else {
                ProviderError::api("failed to read deployment", e)
            }
        })?;
        debug!(id = %lookup.id, "Read deployment");
        encode(&DeploymentSummary::from(remote))
    }
}
