//! Minecraft Provider
//!
//! An infrastructure provider that places schematic files into a Minecraft
//! world. It manages one resource type, `minecraft_schema`.
//!
//! # Overview
//!
//! A placed schematic cannot be modified in place; the world only supports
//! placing and removing one. The provider therefore:
//!
//! - hashes the schematic file when the resource is created and stores the
//!   digest in the computed `schema_hash` attribute ([`hasher`]);
//! - re-hashes the file on every plan and requires replacement when the
//!   contents changed, even if `schema_path` did not ([`drift`]);
//! - attaches a warning naming the path and both digests.
//!
//! The crate also provides:
//!
//! - **Schema types** ([`schema`]) and boundary validation ([`validation`])
//! - **Resources** ([`resource`], [`resources`]) registered in an explicit
//!   [`ResourceRegistry`] built at startup
//! - **ProviderService trait** and a JSON-lines server ([`server`])
//! - **Testing harness** ([`testing`])
//! - **Logging** through `tracing` ([`logging`])
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use minecraft_provider::{init_logging, resources, serve, MemoryWorld, MinecraftProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     let provider = MinecraftProvider::new(resources::registry(), Arc::new(MemoryWorld::new()));
//!     serve(provider).await
//! }
//! ```
//!
//! # Handshake
//!
//! When the provider starts via [`serve`], it writes one line to stdout:
//!
//! ```text
//! MINECRAFT_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `MINECRAFT_PROVIDER|<protocol_version>|<address>`. The host then
//! connects and exchanges newline-delimited JSON requests and responses.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod drift;
pub mod error;
pub mod hasher;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod resources;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;
pub mod world;

// Re-export main types at crate root
pub use config::ProviderConfig;
pub use drift::{detect, Baseline, Drift};
pub use error::ProviderError;
pub use hasher::{hash_bytes, hash_file};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::MinecraftProvider;
pub use resource::{Resource, ResourceContext, ResourceRegistry};
pub use schema::ProviderSchema;
pub use server::{
    handle_request, serve, serve_on, serve_on_with_options, serve_with_options, ProviderService,
    Request, Response, ServeOptions,
};
pub use types::{AttributeChange, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION};
pub use validation::{is_valid, validate, validate_result};
pub use world::{MemoryWorld, Origin, Placement, WorldClient};

pub use async_trait::async_trait;
pub use serde_json;
pub use tracing;
