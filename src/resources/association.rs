//! The `ec_deployment_traffic_filter_association` resource.
//!
//! Attaches an existing ruleset to an existing deployment. Both IDs force
//! replacement, so there is no in-place update.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{decode, encode, gone_or, Resource};
use crate::api::CloudApi;
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

pub const TYPE_NAME: &str = "ec_deployment_traffic_filter_association";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AssociationModel {
    #[serde(default)]
    id: Option<String>,
    deployment_id: String,
    traffic_filter_id: String,
}

impl AssociationModel {
    fn new(deployment_id: String, traffic_filter_id: String) -> Self {
        Self {
            id: Some(format!("{}-{}", deployment_id, traffic_filter_id)),
            deployment_id,
            traffic_filter_id,
        }
    }
}

/// Parse `<deployment_id>,<traffic_filter_id>`.
fn parse_import_id(id: &str) -> Result<(String, String), ProviderError> {
    match id.split_once(',') {
        Some((deployment, filter))
            if !deployment.is_empty() && !filter.is_empty() && !filter.contains(',') =>
        {
            Ok((deployment.to_string(), filter.to_string()))
        },
        _ => Err(ProviderError::InvalidRequest(format!(
            "invalid import id \"{}\": expected <deployment_id>,<traffic_filter_id>",
            id
        ))),
    }
}

/// Manages one ruleset/deployment association.
#[derive(Debug, Default)]
pub struct TrafficFilterAssociationResource;

impl TrafficFilterAssociationResource {
    async fn exists(
        &self,
        api: &dyn CloudApi,
        model: &AssociationModel,
    ) -> Result<bool, ProviderError> {
        let info = gone_or(
            api.get_traffic_filter(&model.traffic_filter_id, true).await,
            "failed to read traffic filter",
        )?;
        Ok(info
            .map(|info| info.is_associated_with(&model.deployment_id))
            .unwrap_or(false))
    }
}

#[async_trait]
impl Resource for TrafficFilterAssociationResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Associates a traffic filter ruleset with a deployment")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("deployment_id", Attribute::required_string().with_force_new())
            .with_attribute("traffic_filter_id", Attribute::required_string().with_force_new())
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn create(&self, api: &dyn CloudApi, planned: Value) -> Result<Value, ProviderError> {
        let planned: AssociationModel = decode(planned)?;
        api.associate_traffic_filter(&planned.traffic_filter_id, &planned.deployment_id)
            .await
            .map_err(|e| ProviderError::api("failed to associate traffic filter", e))?;
        info!(
            deployment_id = %planned.deployment_id,
            traffic_filter_id = %planned.traffic_filter_id,
            "Associated traffic filter"
        );
        encode(&AssociationModel::new(
            planned.deployment_id,
            planned.traffic_filter_id,
        ))
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn read(&self, api: &dyn CloudApi, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: AssociationModel = decode(state)?;
        if !self.exists(api, &model).await? {
            warn!(
                deployment_id = %model.deployment_id,
                traffic_filter_id = %model.traffic_filter_id,
                "Traffic filter association no longer exists"
            );
            return Ok(None);
        }
        encode(&AssociationModel::new(model.deployment_id, model.traffic_filter_id)).map(Some)
    }

    async fn update(
        &self,
        _api: &dyn CloudApi,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        // Every attribute forces replacement; nothing to send.
        let planned: AssociationModel = decode(planned)?;
        encode(&AssociationModel::new(
            planned.deployment_id,
            planned.traffic_filter_id,
        ))
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn delete(&self, api: &dyn CloudApi, state: Value) -> Result<(), ProviderError> {
        let model: AssociationModel = decode(state)?;
        gone_or(
            api.disassociate_traffic_filter(&model.traffic_filter_id, &model.deployment_id)
                .await,
            "failed to remove traffic filter association",
        )?;
        Ok(())
    }

    async fn import(&self, api: &dyn CloudApi, id: &str) -> Result<Value, ProviderError> {
        let (deployment_id, traffic_filter_id) = parse_import_id(id)?;
        let model = AssociationModel::new(deployment_id, traffic_filter_id);
        if !self.exists(api, &model).await? {
            return Err(ProviderError::NotFound(format!(
                "traffic filter {} is not associated with deployment {}",
                model.traffic_filter_id, model.deployment_id
            )));
        }
        encode(&model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        DeploymentCreateRequest, DeploymentResources, ElasticsearchPayload, InMemoryApi,
        TrafficFilterRule, TrafficFilterRulesetRequest,
    };
    use serde_json::json;

    async fn fixture(api: &InMemoryApi) -> (String, String) {
        let filter = api
            .create_traffic_filter(&TrafficFilterRulesetRequest {
                name: "office".to_string(),
                region: "us-east-1".to_string(),
                kind: "ip".to_string(),
                rules: vec![TrafficFilterRule {
                    source: Some("1.1.1.1".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            })
            .await
            .unwrap();
        let deployment = api
            .create_deployment(&DeploymentCreateRequest {
                resources: DeploymentResources {
                    elasticsearch: vec![ElasticsearchPayload {
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
        (deployment.id, filter)
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let api = InMemoryApi::new();
        let (deployment_id, filter_id) = fixture(&api).await;
        let resource = TrafficFilterAssociationResource;

        let state = resource
            .create(
                &api,
                json!({"deployment_id": deployment_id, "traffic_filter_id": filter_id}),
            )
            .await
            .unwrap();
        assert_eq!(state["id"], format!("{}-{}", deployment_id, filter_id));

        assert_eq!(
            resource.read(&api, state.clone()).await.unwrap(),
            Some(state.clone())
        );

        resource.delete(&api, state.clone()).await.unwrap();
        assert!(resource.read(&api, state.clone()).await.unwrap().is_none());
        resource.delete(&api, state).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_when_ruleset_gone() {
        let api = InMemoryApi::new();
        let (deployment_id, filter_id) = fixture(&api).await;
        let state = TrafficFilterAssociationResource
            .create(
                &api,
                json!({"deployment_id": deployment_id, "traffic_filter_id": filter_id}),
            )
            .await
            .unwrap();

        api.remove_traffic_filter(&filter_id).await;
        assert!(TrafficFilterAssociationResource
            .read(&api, state)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_import() {
        let api = InMemoryApi::new();
        let (deployment_id, filter_id) = fixture(&api).await;
        let resource = TrafficFilterAssociationResource;

        let import_id = format!("{},{}", deployment_id, filter_id);
        let err = resource.import(&api, &import_id).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));

        api.associate_traffic_filter(&filter_id, &deployment_id)
            .await
            .unwrap();
        let state = resource.import(&api, &import_id).await.unwrap();
        assert_eq!(state["deployment_id"], deployment_id.as_str());
        assert_eq!(state["traffic_filter_id"], filter_id.as_str());
    }

    #[test]
    fn test_parse_import_id() {
        assert_eq!(
            parse_import_id("dep,tf").unwrap(),
            ("dep".to_string(), "tf".to_string())
        );
        assert!(parse_import_id("dep").is_err());
        assert!(parse_import_id(",tf").is_err());
        assert!(parse_import_id("a,b,c").is_err());
    }
}
