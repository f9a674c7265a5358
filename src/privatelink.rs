//! Private connectivity endpoints per cloud region.
//!
//! These data sources answer from a static catalog; no API call is made.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::CloudApi;
use crate::error::ProviderError;
use crate::resources::{decode, encode, DataSource};
use crate::schema::{Attribute, Schema};

struct AwsEndpoint {
    region: &'static str,
    vpc_service_name: &'static str,
    domain_name: &'static str,
    zone_ids: &'static [&'static str],
}

struct AzureEndpoint {
    region: &'static str,
    service_alias: &'static str,
    domain_name: &'static str,
}

struct GcpEndpoint {
    region: &'static str,
    service_attachment_uri: &'static str,
    domain_name: &'static str,
}

const AWS_ENDPOINTS: &[AwsEndpoint] = &[
    AwsEndpoint {
        region: "us-east-1",
        vpc_service_name: "com.amazonaws.vpce.us-east-1.vpce-svc-0e42e1e06ed010238",
        domain_name: "vpce.us-east-1.aws.elastic-cloud.com",
        zone_ids: &["use1-az2", "use1-az4", "use1-az6"],
    },
    AwsEndpoint {
        region: "us-west-2",
        vpc_service_name: "com.amazonaws.vpce.us-west-2.vpce-svc-0e69febae1fb91870",
        domain_name: "vpce.us-west-2.aws.elastic-cloud.com",
        zone_ids: &["usw2-az1", "usw2-az2", "usw2-az3"],
    },
    AwsEndpoint {
        region: "eu-west-1",
        vpc_service_name: "com.amazonaws.vpce.eu-west-1.vpce-svc-01f2afe87944eb12b",
        domain_name: "vpce.eu-west-1.aws.elastic-cloud.com",
        zone_ids: &["euw1-az1", "euw1-az2", "euw1-az3"],
    },
];

const AZURE_ENDPOINTS: &[AzureEndpoint] = &[AzureEndpoint {
    region: "eastus2",
    service_alias: "eastus2-prod-006-privatelink-service.64359670-9a1d-4ed1-8a4f-1e8c3fb4d9b8.eastus2.azure.privatelinkservice",
    domain_name: "privatelink.eastus2.azure.elastic-cloud.com",
}];

const GCP_ENDPOINTS: &[GcpEndpoint] = &[GcpEndpoint {
    region: "us-central1",
    service_attachment_uri: "projects/cloud-production-168820/regions/us-central1/serviceAttachments/proxy-psc-production-us-central1-v1-attachment",
    domain_name: "psc.us-central1.gcp.cloud.es.io",
}];

#[derive(Debug, Deserialize)]
struct RegionConfig {
    region: String,
}

fn unknown_region(provider: &str, region: &str, supported: Vec<&str>) -> ProviderError {
    ProviderError::Validation(format!(
        "region '{}' is not supported for {} private connectivity; supported regions: {}",
        region,
        provider,
        supported.join(", ")
    ))
}

fn region_schema(description: &str) -> Schema {
    Schema::v0()
        .with_description(description)
        .with_attribute("id", Attribute::computed_string())
        .with_attribute("region", Attribute::required_string())
        .with_attribute("domain_name", Attribute::computed_string())
}

#[derive(Debug, Default)]
pub struct AwsPrivatelinkEndpoint;

#[derive(Debug, Serialize)]
struct AwsState<'a> {
    id: &'a str,
    region: &'a str,
    vpc_service_name: &'a str,
    domain_name: &'a str,
    zone_ids: &'a [&'a str],
}

#[async_trait]
impl DataSource for AwsPrivatelinkEndpoint {
    fn type_name(&self) -> &'static str {
        "ec_aws_privatelink_endpoint"
    }

    fn schema(&self) -> Schema {
        region_schema("AWS PrivateLink endpoint of a region")
            .with_attribute("vpc_service_name", Attribute::computed_string())
            .with_attribute("zone_ids", Attribute::computed_string_list())
    }

    async fn read(&self, _api: &dyn CloudApi, config: Value) -> Result<Value, ProviderError> {
        let config: RegionConfig = decode(config)?;
        let endpoint = AWS_ENDPOINTS
            .iter()
            .find(|e| e.region == config.region)
            .ok_or_else(|| {
                unknown_region("AWS", &config.region, AWS_ENDPOINTS.iter().map(|e| e.region).collect())
            })?;
        encode(&AwsState {
            id: endpoint.region,
            region: endpoint.region,
            vpc_service_name: endpoint.vpc_service_name,
            domain_name: endpoint.domain_name,
            zone_ids: endpoint.zone_ids,
        })
    }
}

#[derive(Debug, Default)]
pub struct AzurePrivatelinkEndpoint;

#[derive(Debug, Serialize)]
struct AzureState<'a> {
    id: &'a str,
    region: &'a str,
    service_alias: &'a str,
    domain_name: &'a str,
}

#[async_trait]
impl DataSource for AzurePrivatelinkEndpoint {
    fn type_name(&self) -> &'static str {
        "ec_azure_privatelink_endpoint"
    }

    fn schema(&self) -> Schema {
        region_schema("Azure Private Link endpoint of a region")
            .with_attribute("service_alias", Attribute::computed_string())
    }

    async fn read(&self, _api: &dyn CloudApi, config: Value) -> Result<Value, ProviderError> {
        let config: RegionConfig = decode(config)?;
        let endpoint = AZURE_ENDPOINTS
            .iter()
            .find(|e| e.region == config.region)
            .ok_or_else(|| {
                unknown_region(
                    "Azure",
                    &config.region,
                    AZURE_ENDPOINTS.iter().map(|e| e.region).collect(),
                )
            })?;
        encode(&AzureState {
            id: endpoint.region,
            region: endpoint.region,
            service_alias: endpoint.service_alias,
            domain_name: endpoint.domain_name,
        })
    }
}

#[derive(Debug, Default)]
pub struct GcpPrivateServiceConnectEndpoint;

#[derive(Debug, Serialize)]
struct GcpState<'a> {
    id: &'a str,
    region: &'a str,
    service_attachment_uri: &'a str,
    domain_name: &'a str,
}

#[async_trait]
impl DataSource for GcpPrivateServiceConnectEndpoint {
    fn type_name(&self) -> &'static str {
        "ec_gcp_private_service_connect_endpoint"
    }

    fn schema(&self) -> Schema {
        region_schema("GCP Private Service Connect endpoint of a region")
            .with_attribute("service_attachment_uri", Attribute::computed_string())
    }

    async fn read(&self, _api: &dyn CloudApi, config: Value) -> Result<Value, ProviderError> {
        let config: RegionConfig = decode(config)?;
        let endpoint = GCP_ENDPOINTS
            .iter()
            .find(|e| e.region == config.region)
            .ok_or_else(|| {
                unknown_region("GCP", &config.region, GCP_ENDPOINTS.iter().map(|e| e.region).collect())
            })?;
        encode(&GcpState {
            id: endpoint.region,
            region: endpoint.region,
            service_attachment_uri: endpoint.service_attachment_uri,
            domain_name: endpoint.domain_name,
        })
    }
}
