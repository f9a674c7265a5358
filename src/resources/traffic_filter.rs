//! The `ec_deployment_traffic_filter` resource.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::{decode, encode, gone_or, Resource};
use crate::api::{CloudApi, TrafficFilterRule, TrafficFilterRulesetInfo, TrafficFilterRulesetRequest};
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};

pub const TYPE_NAME: &str = "ec_deployment_traffic_filter";

/// Ruleset types accepted by the control plane.
pub const FILTER_TYPES: &[&str] = &[
    "ip",
    "vpce",
    "azure_private_endpoint",
    "gcp_private_service_connect_endpoint",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct TrafficFilterModel {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub region: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub include_by_default: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rule: Vec<RuleModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct RuleModel {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub azure_endpoint_name: Option<String>,
    #[serde(default)]
    pub azure_endpoint_guid: Option<String>,
}

impl TrafficFilterModel {
    fn to_request(&self) -> TrafficFilterRulesetRequest {
        TrafficFilterRulesetRequest {
            name: self.name.clone(),
            region: self.region.clone(),
            kind: self.kind.clone(),
            include_by_default: self.include_by_default,
            description: self.description.clone(),
            rules: self
                .rule
                .iter()
                .map(|r| TrafficFilterRule {
                    id: r.id.clone(),
                    source: r.source.clone(),
                    description: r.description.clone(),
                    azure_endpoint_name: r.azure_endpoint_name.clone(),
                    azure_endpoint_guid: r.azure_endpoint_guid.clone(),
                })
                .collect(),
        }
    }

    fn from_info(info: TrafficFilterRulesetInfo) -> Self {
        Self {
            id: Some(info.id),
            name: info.name,
            region: info.region,
            kind: info.kind,
            include_by_default: info.include_by_default,
            description: info.description.filter(|d| !d.is_empty()),
            rule: info
                .rules
                .into_iter()
                .map(|r| RuleModel {
                    id: r.id,
                    source: r.source,
                    description: r.description.filter(|d| !d.is_empty()),
                    azure_endpoint_name: r.azure_endpoint_name,
                    azure_endpoint_guid: r.azure_endpoint_guid,
                })
                .collect(),
        }
    }
}

fn state_id(state: &Value) -> Result<String, ProviderError> {
    state
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::InvalidRequest("state has no id".to_string()))
}

/// Check that every rule carries the fields its ruleset type needs.
fn validate_rules(kind: &str, rules: &[RuleModel]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    if !FILTER_TYPES.contains(&kind) {
        diagnostics.push(
            Diagnostic::error(format!("Unsupported traffic filter type '{}'", kind))
                .with_detail(format!("expected one of: {}", FILTER_TYPES.join(", ")))
                .with_attribute("type"),
        );
        return diagnostics;
    }

    for (i, rule) in rules.iter().enumerate() {
        let path = format!("rule.{}", i);
        if kind == "azure_private_endpoint" {
            if rule.azure_endpoint_name.is_none() || rule.azure_endpoint_guid.is_none() {
                diagnostics.push(
                    Diagnostic::error("Incomplete Azure private endpoint rule")
                        .with_detail("azure_endpoint_name and azure_endpoint_guid are both required")
                        .with_attribute(path.clone()),
                );
            }
            if rule.source.is_some() {
                diagnostics.push(
                    Diagnostic::error("source is not supported for azure_private_endpoint rules")
                        .with_attribute(format!("{}.source", path)),
                );
            }
        } else {
            if rule.source.as_deref().map(str::is_empty).unwrap_or(true) {
                diagnostics.push(
                    Diagnostic::error(format!("source is required for {} rules", kind))
                        .with_attribute(format!("{}.source", path)),
                );
            }
            if rule.azure_endpoint_name.is_some() || rule.azure_endpoint_guid.is_some() {
                diagnostics.push(
                    Diagnostic::error(format!("Azure endpoint fields are not supported for {} rules", kind))
                        .with_attribute(path),
                );
            }
        }
    }
    diagnostics
}

/// Manages a traffic filter ruleset.
#[derive(Debug, Default)]
pub struct TrafficFilterResource;

impl TrafficFilterResource {
    async fn fetch(&self, api: &dyn CloudApi, id: &str) -> Result<Option<Value>, ProviderError> {
        let info = gone_or(
            api.get_traffic_filter(id, false).await,
            "failed to read traffic filter",
        )?;
        info.map(|info| encode(&TrafficFilterModel::from_info(info)))
            .transpose()
    }
}

#[async_trait]
impl Resource for TrafficFilterResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Traffic filter ruleset that can be attached to deployments")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "region",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Region the ruleset applies to"),
            )
            .with_attribute(
                "type",
                Attribute::required_string()
                    .with_force_new()
                    .with_description(format!("One of {}", FILTER_TYPES.join(", "))),
            )
            .with_attribute(
                "include_by_default",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .with_description("Attach the ruleset to new deployments automatically"),
            )
            .with_attribute("description", Attribute::optional_string())
            .with_block(
                "rule",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("id", Attribute::computed_string())
                        .with_attribute(
                            "source",
                            Attribute::optional_string().with_description(
                                "IP address, CIDR, VPC endpoint ID or PSC connection ID",
                            ),
                        )
                        .with_attribute("description", Attribute::optional_string())
                        .with_attribute("azure_endpoint_name", Attribute::optional_string())
                        .with_attribute("azure_endpoint_guid", Attribute::optional_string()),
                )
                .with_min_items(1),
            )
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        match serde_json::from_value::<TrafficFilterModel>(config.clone()) {
            Ok(model) => validate_rules(&model.kind, &model.rule),
            // Shape errors are already reported by schema validation.
            Err(_) => Vec::new(),
        }
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn create(&self, api: &dyn CloudApi, planned: Value) -> Result<Value, ProviderError> {
        let model: TrafficFilterModel = decode(planned)?;
        let id = api
            .create_traffic_filter(&model.to_request())
            .await
            .map_err(|e| ProviderError::api("failed to create traffic filter", e))?;
        info!(%id, region = %model.region, "Created traffic filter");

        self.fetch(api, &id).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("traffic filter {} disappeared after create", id))
        })
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn read(&self, api: &dyn CloudApi, state: Value) -> Result<Option<Value>, ProviderError> {
        let id = state_id(&state)?;
        let value = self.fetch(api, &id).await?;
        if value.is_none() {
            warn!(%id, "Traffic filter no longer exists");
        }
        Ok(value)
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn update(
        &self,
        api: &dyn CloudApi,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let id = state_id(&prior)?;
        let model: TrafficFilterModel = decode(planned)?;
        api.update_traffic_filter(&id, &model.to_request())
            .await
            .map_err(|e| ProviderError::api("failed to update traffic filter", e))?;
        debug!(%id, "Updated traffic filter");

        self.fetch(api, &id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("traffic filter {}", id)))
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn delete(&self, api: &dyn CloudApi, state: Value) -> Result<(), ProviderError> {
        let id = state_id(&state)?;
        let Some(info) = gone_or(
            api.get_traffic_filter(&id, true).await,
            "failed to read traffic filter",
        )?
        else {
            return Ok(());
        };

        for association in &info.associations {
            debug!(%id, deployment_id = %association.id, "Removing traffic filter association");
            gone_or(
                api.disassociate_traffic_filter(&id, &association.id).await,
                "failed to remove traffic filter association",
            )?;
        }

        gone_or(
            api.delete_traffic_filter(&id).await,
            "failed to delete traffic filter",
        )?;
        info!(%id, "Deleted traffic filter");
        Ok(())
    }

    async fn import(&self, api: &dyn CloudApi, id: &str) -> Result<Value, ProviderError> {
        self.fetch(api, id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("traffic filter {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryApi;

    fn config() -> Value {
        json!({
            "name": "office",
            "region": "us-east-1",
            "type": "ip",
            "include_by_default": false,
            "rule": [{"source": "192.168.0.0/16", "description": "office"}]
        })
    }

    #[tokio::test]
    async fn test_create_read_update_delete() {
        let api = InMemoryApi::new();
        let resource = TrafficFilterResource;

        let state = resource.create(&api, config()).await.unwrap();
        let id = state["id"].as_str().unwrap().to_string();
        assert_eq!(state["type"], "ip");
        assert!(state["rule"][0]["id"].is_string());

        let read = resource.read(&api, state.clone()).await.unwrap().unwrap();
        assert_eq!(read, state);

        let mut planned = state.clone();
        planned["name"] = json!("home");
        planned["rule"] = json!([{"source": "10.0.0.1"}]);
        let updated = resource.update(&api, state.clone(), planned).await.unwrap();
        assert_eq!(updated["name"], "home");
        assert_eq!(updated["rule"][0]["source"], "10.0.0.1");
        assert_eq!(updated["id"], id.as_str());

        resource.delete(&api, updated.clone()).await.unwrap();
        assert!(resource.read(&api, updated.clone()).await.unwrap().is_none());
        // Deleting twice is fine.
        resource.delete(&api, updated).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_associations() {
        let api = InMemoryApi::new();
        let resource = TrafficFilterResource;
        let state = resource.create(&api, config()).await.unwrap();
        let id = state["id"].as_str().unwrap();

        let deployment = api
            .create_deployment(&crate::api::DeploymentCreateRequest {
                resources: crate::api::DeploymentResources {
                    elasticsearch: vec![crate::api::ElasticsearchPayload {
                        region: "us-east-1".to_string(),
                        ref_id: "main-elasticsearch".to_string(),
                        ..Default::default()
                    }],
                    kibana: vec![],
                },
                ..Default::default()
            })
            .await
            .unwrap();
        api.associate_traffic_filter(id, &deployment.id).await.unwrap();

        resource.delete(&api, state.clone()).await.unwrap();
        assert_eq!(api.traffic_filter_count().await, 0);
    }

    #[tokio::test]
    async fn test_read_forbidden_is_gone() {
        let api = InMemoryApi::new();
        let state = TrafficFilterResource.create(&api, config()).await.unwrap();
        api.forbid(state["id"].as_str().unwrap()).await;
        assert!(TrafficFilterResource.read(&api, state).await.unwrap().is_none());
    }

    #[test]
    fn test_validate_ip_rules_need_source() {
        let diagnostics = TrafficFilterResource.validate(&json!({
            "name": "office", "region": "us-east-1", "type": "ip",
            "rule": [{"description": "missing"}]
        }));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("rule.0.source"));
    }

    #[test]
    fn test_validate_azure_rules() {
        let diagnostics = TrafficFilterResource.validate(&json!({
            "name": "private", "region": "azure-eastus2", "type": "azure_private_endpoint",
            "rule": [
                {"azure_endpoint_name": "ep", "azure_endpoint_guid": "guid"},
                {"azure_endpoint_name": "ep", "source": "1.1.1.1"}
            ]
        }));
        let paths: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(paths, vec!["rule.1", "rule.1.source"]);
    }

    #[test]
    fn test_validate_unknown_type() {
        let diagnostics = TrafficFilterResource.validate(&json!({
            "name": "x", "region": "us-east-1", "type": "firewall", "rule": [{"source": "1.1.1.1"}]
        }));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("type"));
    }
}
