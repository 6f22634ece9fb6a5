// ABOUTME: Serializable registry configuration, so peers can share one ordered list of registrations.
// ABOUTME: Any serde format works; entries are applied in order, which fixes the handles.

use crate::error::Result;
use crate::registry::{Registry, RegistryBuilder};
use crate::schema::RecordSchema;
use crate::types::TypeDesc;
use serde::{Deserialize, Serialize};

/// One registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeEntry {
    /// A record type with its schema.
    Record(RecordSchema),
    /// Any other type, by canonical name.
    Type { name: TypeDesc },
}

/// An ordered list of registrations.
///
/// ```
/// use graphcodec::RegistryConfig;
///
/// let json = r#"{"types":[
///     {"kind":"record","name":"Node","fields":[{"name":"next","type":"Node"}]},
///     {"kind":"type","name":"Node[]"}
/// ]}"#;
/// let config: RegistryConfig = serde_json::from_str(json).unwrap();
/// let registry = config.build().unwrap();
/// assert_eq!(registry.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub types: Vec<TypeEntry>,
}

impl RegistryConfig {
    /// Append a record registration.
    #[must_use]
    pub fn record(mut self, schema: RecordSchema) -> Self {
        self.types.push(TypeEntry::Record(schema));
        self
    }

    /// Append a type registration.
    #[must_use]
    pub fn ty(mut self, name: TypeDesc) -> Self {
        self.types.push(TypeEntry::Type { name });
        self
    }

    /// A builder with every entry applied.
    pub fn builder(&self) -> Result<RegistryBuilder> {
        RegistryBuilder::from_config(self)
    }

    /// Build the registry this configuration describes.
    pub fn build(&self) -> Result<Registry> {
        self.builder()?.build()
    }
}
