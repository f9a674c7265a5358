//! Read-only data sources.
//!
//! `ec_stack` and the private connectivity lookups live in their own
//! modules; they are re-exported here so the provider registers every data
//! source from one place.

pub mod deployment;

pub use crate::privatelink::{
    AwsPrivatelinkEndpoint, AzurePrivatelinkEndpoint, GcpPrivateServiceConnectEndpoint,
};
pub use crate::stack::StackDataSource;
pub use deployment::DeploymentDataSource;
