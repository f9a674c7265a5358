//! Elastic Cloud infrastructure provider.
//!
//! Manages Elastic Cloud deployments, deployment extensions and traffic
//! filter rulesets, and looks up stack versions, behind a gRPC provider
//! protocol modelled on
//! [terraform-plugin-go](https://github.com/hashicorp/terraform-plugin-go).
//!
//! # Layout
//!
//! - [`api`]: the control-plane client trait with HTTP and in-memory
//!   implementations
//! - [`stack`]: the `ec_stack` data source and the version selector
//! - [`resources`] and [`datasources`]: the managed object types
//! - [`provider`]: [`EcProvider`], which routes protocol calls to them
//! - [`server`]: the gRPC service, handshake and shutdown handling
//!
//! # Running
//!
//! ```ignore
//! use ec_provider::{config::EnvDefaults, serve, EcProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ec_provider::server::ServeError> {
//!     serve(EcProvider::new(EnvDefaults::from_env())).await
//! }
//! ```
//!
//! # Handshake
//!
//! Once listening, the process writes one line to stdout:
//!
//! ```text
//! EC_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `EC_PROVIDER|<protocol_version>|<address>`. The host connects to
//! the address over gRPC; all logging goes to stderr.

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod datasources;
pub mod error;
pub mod logging;
pub mod memory;
pub mod plan;
pub mod privatelink;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod stack;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use error::ProviderError;
pub use logging::{init_logging, try_init_logging, LogFormat, LogOptions};
pub use provider::EcProvider;
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on, serve_on_with_options, serve_with_options, serve_with_shutdown,
    ProviderService, ServeOptions,
};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate, validate_result};

pub use async_trait::async_trait;
pub use serde_json;
pub use tonic;
pub use tracing;
