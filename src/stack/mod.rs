//! The `ec_stack` data source.
//!
//! Lists the stack versions of a region and picks one with
//! [`selector::select`]. With `lock = true` a `latest` lookup keeps
//! returning the version recorded in `version` on later reads.

pub mod selector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::api::{CloudApi, StackProductConfig, StackVersion};
use crate::error::ProviderError;
use crate::resources::{decode, encode, DataSource};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema};

pub use selector::{select, SelectError, Versioned, LATEST};

pub const TYPE_NAME: &str = "ec_stack";

#[derive(Debug, Clone, Deserialize)]
struct StackConfig {
    version_regex: String,
    region: String,
    #[serde(default)]
    lock: Option<bool>,
    /// Recorded by a previous locked read.
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StackState {
    id: String,
    version_regex: String,
    region: String,
    lock: bool,
    version: String,
    accessible: Option<bool>,
    min_upgradable_from: Option<String>,
    upgradable_to: Vec<String>,
    allowlisted: Option<bool>,
    elasticsearch: Vec<ProductState>,
    kibana: Vec<ProductState>,
    apm: Vec<ProductState>,
    enterprise_search: Vec<ProductState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProductState {
    denylist: Vec<String>,
    capacity_constraints_max: Option<i32>,
    capacity_constraints_min: Option<i32>,
    compatible_node_types: Vec<String>,
    docker_image: Option<String>,
    plugins: Vec<String>,
    default_plugins: Vec<String>,
}

impl From<&StackProductConfig> for ProductState {
    fn from(config: &StackProductConfig) -> Self {
        Self {
            denylist: config.denylist.clone(),
            capacity_constraints_max: config.capacity_constraints.map(|c| c.max),
            capacity_constraints_min: config.capacity_constraints.map(|c| c.min),
            compatible_node_types: config.compatible_node_types.clone(),
            docker_image: config.docker_image.clone(),
            plugins: config.plugins.clone(),
            default_plugins: config.default_plugins.clone(),
        }
    }
}

fn product(config: &Option<StackProductConfig>) -> Vec<ProductState> {
    config.iter().map(ProductState::from).collect()
}

impl StackState {
    fn new(config: &StackConfig, stack: &StackVersion) -> Self {
        Self {
            id: format!("{}/{}", config.region, config.version_regex),
            version_regex: config.version_regex.clone(),
            region: config.region.clone(),
            lock: config.lock.unwrap_or(false),
            version: stack.version.clone(),
            accessible: stack.accessible,
            min_upgradable_from: stack.min_upgradable_from.clone(),
            upgradable_to: stack.upgradable_to.clone(),
            allowlisted: stack.allowlisted,
            elasticsearch: product(&stack.elasticsearch),
            kibana: product(&stack.kibana),
            apm: product(&stack.apm),
            enterprise_search: product(&stack.enterprise_search),
        }
    }
}

fn product_block(name: &str) -> NestedBlock {
    NestedBlock::list(
        Block::new()
            .with_description(format!("{} constraints of the stack version", name))
            .with_attribute(
                "denylist",
                Attribute::computed_string_list()
                    .with_description("Settings that cannot be set in user settings"),
            )
            .with_attribute("capacity_constraints_max", Attribute::computed_int64())
            .with_attribute("capacity_constraints_min", Attribute::computed_int64())
            .with_attribute("compatible_node_types", Attribute::computed_string_list())
            .with_attribute("docker_image", Attribute::computed_string())
            .with_attribute("plugins", Attribute::computed_string_list())
            .with_attribute("default_plugins", Attribute::computed_string_list()),
    )
}

/// Reads stack version metadata.
#[derive(Debug, Default)]
pub struct StackDataSource;

#[async_trait]
impl DataSource for StackDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Retrieves information about an Elastic Cloud stack version")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "version_regex",
                Attribute::required_string()
                    .with_description("Regular expression matched against versions, or \"latest\""),
            )
            .with_attribute("region", Attribute::required_string())
            .with_attribute(
                "lock",
                Attribute::optional_bool()
                    .with_description("Keep the version resolved by \"latest\" on later reads"),
            )
            .with_attribute("version", Attribute::optional_computed_string())
            .with_attribute("accessible", Attribute::computed_bool())
            .with_attribute("min_upgradable_from", Attribute::computed_string())
            .with_attribute(
                "upgradable_to",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::computed(),
                ),
            )
            .with_attribute("allowlisted", Attribute::computed_bool())
            .with_block("elasticsearch", product_block("Elasticsearch"))
            .with_block("kibana", product_block("Kibana"))
            .with_block("apm", product_block("APM"))
            .with_block("enterprise_search", product_block("Enterprise Search"))
    }

    #[instrument(skip_all, fields(data_source = TYPE_NAME))]
    async fn read(&self, api: &dyn CloudApi, config: Value) -> Result<Value, ProviderError> {
        let config: StackConfig = decode(config)?;
        let stacks = api
            .list_stacks(&config.region)
            .await
            .map_err(|e| ProviderError::api("failed to list stack versions", e))?;

        let stack = select(
            &config.version_regex,
            config.version.as_deref().unwrap_or_default(),
            config.lock.unwrap_or(false),
            &stacks,
        )?;
        debug!(region = %config.region, version = %stack.version, "Selected stack version");

        encode(&StackState::new(&config, stack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CapacityConstraints, InMemoryApi};
    use crate::validation::validate;
    use serde_json::json;

    async fn api() -> InMemoryApi {
        let api = InMemoryApi::new();
        let mut newest = StackVersion::new("7.9.1");
        newest.accessible = Some(true);
        newest.upgradable_to = vec!["7.9.2".to_string()];
        newest.elasticsearch = Some(StackProductConfig {
            denylist: vec!["http.port".to_string()],
            capacity_constraints: Some(CapacityConstraints { min: 512, max: 65536 }),
            docker_image: Some("docker.elastic.co/cloud-assets/elasticsearch:7.9.1".to_string()),
            ..Default::default()
        });
        api.set_stacks(
            "us-east-1",
            vec![
                newest,
                StackVersion::new("7.9.0"),
                StackVersion::new("7.8.1"),
                StackVersion::new("7.8.0"),
            ],
        )
        .await;
        api
    }

    #[tokio::test]
    async fn test_read_latest() {
        let api = api().await;
        let state = StackDataSource
            .read(&api, json!({"version_regex": "latest", "region": "us-east-1"}))
            .await
            .unwrap();

        assert_eq!(state["version"], "7.9.1");
        assert_eq!(state["accessible"], true);
        assert_eq!(state["lock"], false);
        assert_eq!(state["upgradable_to"], json!(["7.9.2"]));
        assert_eq!(state["elasticsearch"][0]["denylist"], json!(["http.port"]));
        assert_eq!(state["elasticsearch"][0]["capacity_constraints_max"], 65536);
        assert_eq!(state["kibana"], json!([]));
    }

    #[tokio::test]
    async fn test_read_regex() {
        let api = api().await;
        let state = StackDataSource
            .read(&api, json!({"version_regex": "7.8.?", "region": "us-east-1"}))
            .await
            .unwrap();
        assert_eq!(state["version"], "7.8.1");
        assert_eq!(state["id"], "us-east-1/7.8.?");
    }

    #[tokio::test]
    async fn test_locked_read_keeps_version() {
        let api = api().await;
        let state = StackDataSource
            .read(
                &api,
                json!({"version_regex": "latest", "region": "us-east-1", "lock": true, "version": "7.8.1"}),
            )
            .await
            .unwrap();
        assert_eq!(state["version"], "7.8.1");
        assert_eq!(state["version_regex"], "latest");
    }

    #[tokio::test]
    async fn test_no_match_is_error() {
        let api = api().await;
        let err = StackDataSource
            .read(&api, json!({"version_regex": "6.8.0", "region": "us-east-1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Stack(SelectError::NoMatch { .. })));
        assert!(err.to_string().contains("\"6.8.0\""));
    }

    #[tokio::test]
    async fn test_unknown_region_is_error() {
        let api = api().await;
        let err = StackDataSource
            .read(&api, json!({"version_regex": "latest", "region": "mars-1"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to list stack versions"));
    }

    #[test]
    fn test_schema_requires_inputs() {
        let diagnostics = validate(&StackDataSource.schema(), &json!({"lock": true}));
        let attributes: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(attributes, vec!["region", "version_regex"]);
    }
}
