//! Typed payloads exchanged with the Elastic Cloud control-plane API.
//!
//! Only the fields the provider reads or writes are modelled. Unknown fields
//! in responses are ignored, and optional request fields are omitted when
//! unset so that the API applies its own defaults.

use serde::{Deserialize, Serialize};

// ============================================================================
// Stack versions
// ============================================================================

/// Response body of `GET /regions/{region}/stack/versions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackVersionConfigs {
    /// Available stack versions, newest first.
    #[serde(default)]
    pub stacks: Vec<StackVersion>,
}

/// A single stack version and the per-product constraints that apply to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackVersion {
    /// Version string, e.g. `7.9.1`.
    pub version: String,
    /// Whether the calling user can create deployments on this version.
    #[serde(default)]
    pub accessible: Option<bool>,
    /// The oldest version that can be upgraded to this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_upgradable_from: Option<String>,
    /// Versions this one can be upgraded to.
    #[serde(default)]
    pub upgradable_to: Vec<String>,
    /// Whether the version is on the allowlist.
    #[serde(default, rename = "whitelisted")]
    pub allowlisted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch: Option<StackProductConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kibana: Option<StackProductConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apm: Option<StackProductConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_search: Option<StackProductConfig>,
}

impl StackVersion {
    /// Create a bare stack version with no product metadata.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }
}

/// Product-specific constraints for a stack version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackProductConfig {
    /// Settings that cannot be set by users.
    #[serde(default, rename = "blacklist")]
    pub denylist: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_constraints: Option<CapacityConstraints>,
    #[serde(default)]
    pub compatible_node_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub default_plugins: Vec<String>,
}

/// Minimum and maximum instance size in MB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityConstraints {
    pub min: i32,
    pub max: i32,
}

// ============================================================================
// Deployments
// ============================================================================

/// Body of `POST /deployments`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentCreateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DeploymentMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<DeploymentSettings>,
    pub resources: DeploymentResources,
}

/// Body of `PUT /deployments/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentUpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Remove resources that are not part of this request.
    pub prune_orphans: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DeploymentMetadata>,
    pub resources: DeploymentResources,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMetadata {
    #[serde(default)]
    pub tags: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_filter_settings: Option<TrafficFilterSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficFilterSettings {
    #[serde(default)]
    pub rulesets: Vec<String>,
}

/// Resource payloads of a create or update request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResources {
    #[serde(default)]
    pub elasticsearch: Vec<ElasticsearchPayload>,
    #[serde(default)]
    pub kibana: Vec<KibanaPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchPayload {
    pub region: String,
    pub ref_id: String,
    pub plan: ElasticsearchPlan,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchPlan {
    pub elasticsearch: ElasticsearchConfiguration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_template: Option<DeploymentTemplateReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling_enabled: Option<bool>,
    #[serde(default)]
    pub cluster_topology: Vec<ElasticsearchTopologyElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticsearchConfiguration {
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTemplateReference {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticsearchTopologyElement {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<TopologySize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_count: Option<i32>,
}

/// Instance size of a topology element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySize {
    /// Size in MB of `resource`.
    pub value: i32,
    /// `memory` or `storage`.
    pub resource: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KibanaPayload {
    pub region: String,
    pub ref_id: String,
    pub elasticsearch_cluster_ref_id: String,
    pub plan: KibanaPlan,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KibanaPlan {
    pub kibana: KibanaConfiguration,
    #[serde(default)]
    pub cluster_topology: Vec<KibanaTopologyElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KibanaConfiguration {
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KibanaTopologyElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<TopologySize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_count: Option<i32>,
}

/// Response body of `POST /deployments`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentCreateResponse {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub resources: Vec<DeploymentResource>,
}

/// A resource created as part of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResource {
    pub kind: String,
    pub ref_id: String,
    pub id: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_id: Option<String>,
    /// Only returned for Elasticsearch resources, and only on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<ClusterCredentials>,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ClusterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCredentials")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// Response body of `GET /deployments/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentGetResponse {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DeploymentMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<DeploymentSettings>,
    #[serde(default)]
    pub resources: DeploymentResourcesInfo,
}

impl DeploymentGetResponse {
    /// The first Elasticsearch resource, which every deployment has.
    pub fn elasticsearch(&self) -> Option<&ElasticsearchResourceInfo> {
        self.resources.elasticsearch.first()
    }

    /// The first Kibana resource, if any.
    pub fn kibana(&self) -> Option<&KibanaResourceInfo> {
        self.resources.kibana.first()
    }

    /// Traffic filter ruleset IDs attached to the deployment.
    pub fn traffic_filters(&self) -> Vec<String> {
        self.settings
            .as_ref()
            .and_then(|s| s.traffic_filter_settings.as_ref())
            .map(|t| t.rulesets.clone())
            .unwrap_or_default()
    }

    /// A deployment whose Elasticsearch resources have all been stopped is
    /// treated as deleted.
    pub fn is_stopped(&self) -> bool {
        !self.resources.elasticsearch.is_empty()
            && self
                .resources
                .elasticsearch
                .iter()
                .all(|es| es.info.status == "stopped")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResourcesInfo {
    #[serde(default)]
    pub elasticsearch: Vec<ElasticsearchResourceInfo>,
    #[serde(default)]
    pub kibana: Vec<KibanaResourceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchResourceInfo {
    pub ref_id: String,
    pub id: String,
    pub region: String,
    pub info: ClusterInfo<ElasticsearchPlan>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KibanaResourceInfo {
    pub ref_id: String,
    pub id: String,
    pub region: String,
    #[serde(default)]
    pub elasticsearch_cluster_ref_id: String,
    pub info: ClusterInfo<KibanaPlan>,
}

/// Runtime information about a deployment resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo<P> {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub healthy: bool,
    #[serde(default)]
    pub metadata: ClusterMetadata,
    #[serde(default = "PlanInfo::empty")]
    pub plan_info: PlanInfo<P>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<ClusterPorts>,
}

impl ClusterMetadata {
    /// `https://<endpoint>:<port>` when both parts are known.
    pub fn https_endpoint(&self) -> Option<String> {
        match (&self.endpoint, &self.ports) {
            (Some(host), Some(ports)) => Some(format!("https://{}:{}", host, ports.https)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterPorts {
    pub http: i32,
    pub https: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanInfo<P> {
    #[serde(default = "Option::default")]
    pub current: Option<PlanAttempt<P>>,
}

impl<P> PlanInfo<P> {
    fn empty() -> Self {
        Self { current: None }
    }
}

impl<P> Default for PlanInfo<P> {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAttempt<P> {
    pub plan: P,
}

// ============================================================================
// Extensions
// ============================================================================

/// Body of the extension create and update calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub extension_type: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

/// A custom bundle or plugin uploaded to the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub extension_type: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_metadata: Option<ExtensionFileMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionFileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ============================================================================
// Traffic filters
// ============================================================================

/// Body of the ruleset create and update calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficFilterRulesetRequest {
    pub name: String,
    pub region: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub include_by_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub rules: Vec<TrafficFilterRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficFilterRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_endpoint_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_endpoint_guid: Option<String>,
}

/// Response body of the ruleset create call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficFilterRulesetResponse {
    pub id: String,
}

/// Response body of `GET /deployments/traffic-filter/rulesets/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficFilterRulesetInfo {
    pub id: String,
    pub name: String,
    pub region: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub include_by_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Vec<TrafficFilterRule>,
    #[serde(default)]
    pub associations: Vec<FilterAssociation>,
    #[serde(default)]
    pub total_associations: i32,
}

impl TrafficFilterRulesetInfo {
    /// Whether the ruleset is attached to the given deployment.
    pub fn is_associated_with(&self, deployment_id: &str) -> bool {
        self.associations
            .iter()
            .any(|a| a.entity_type == ASSOCIATION_DEPLOYMENT && a.id == deployment_id)
    }
}

/// Entity type used for deployment associations.
pub const ASSOCIATION_DEPLOYMENT: &str = "deployment";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterAssociation {
    pub entity_type: String,
    pub id: String,
}

/// Error envelope returned by the API on non-2xx responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BasicFailedReply {
    #[serde(default)]
    pub errors: Vec<BasicFailedReplyElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BasicFailedReplyElement {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stack_version_field_names() {
        let stack: StackVersion = serde_json::from_value(json!({
            "version": "7.9.1",
            "accessible": true,
            "whitelisted": true,
            "upgradable_to": ["7.9.2"],
            "elasticsearch": {
                "blacklist": ["http.port"],
                "capacity_constraints": {"min": 512, "max": 65536},
                "plugins": ["analysis-icu"]
            }
        }))
        .unwrap();

        assert_eq!(stack.allowlisted, Some(true));
        let es = stack.elasticsearch.unwrap();
        assert_eq!(es.denylist, vec!["http.port"]);
        assert_eq!(es.capacity_constraints.unwrap().max, 65536);
    }

    #[test]
    fn test_traffic_filter_type_rename() {
        let req = TrafficFilterRulesetRequest {
            name: "office".to_string(),
            region: "us-east-1".to_string(),
            kind: "ip".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["type"], "ip");
        assert!(value.get("description").is_none());
    }

    #[test]
    fn test_deployment_stopped() {
        let mut deployment: DeploymentGetResponse = serde_json::from_value(json!({
            "id": "abc",
            "resources": {
                "elasticsearch": [{
                    "ref_id": "main-elasticsearch",
                    "id": "es1",
                    "region": "us-east-1",
                    "info": {"status": "stopped"}
                }]
            }
        }))
        .unwrap();
        assert!(deployment.is_stopped());

        deployment.resources.elasticsearch[0].info.status = "started".to_string();
        assert!(!deployment.is_stopped());
    }

    #[test]
    fn test_https_endpoint() {
        let metadata = ClusterMetadata {
            endpoint: Some("abc.us-east-1.aws.found.io".to_string()),
            cloud_id: None,
            ports: Some(ClusterPorts {
                http: 9200,
                https: 443,
            }),
        };
        assert_eq!(
            metadata.https_endpoint().as_deref(),
            Some("https://abc.us-east-1.aws.found.io:443")
        );
        assert!(ClusterMetadata::default().https_endpoint().is_none());
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let creds = ClusterCredentials {
            username: "elastic".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("elastic"));
        assert!(!debug.contains("hunter2"));
    }
}
