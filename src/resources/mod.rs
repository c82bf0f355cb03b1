//! Resource types served by the provider.

pub mod schema;

use crate::resource::ResourceRegistry;

/// Registry of every resource type this provider manages.
pub fn registry() -> ResourceRegistry {
    ResourceRegistry::new().with_resource(schema::TYPE_NAME, schema::SchemaResource::boxed)
}
