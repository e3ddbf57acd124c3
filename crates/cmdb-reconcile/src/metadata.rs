//! Model Metadata
//!
//! Uniqueness rules and attribute declarations for object types. The
//! reconciler reads them on every message and never writes them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cmdb_core::{ObjectType, TenantId};

use crate::store::StoreResult;

/// A uniqueness rule: an ordered list of attribute ids identifying a CI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueRule {
    pub id: i64,
    pub object_type: ObjectType,
    /// Attribute ids, in rule order.
    pub keys: Vec<i64>,
    /// Whether the rule is enforced as the identity of the object type.
    pub must_check: bool,
}

/// Declared type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttributeType {
    SingleChar,
    LongChar,
    Int,
    Float,
    Enum,
    Date,
    Time,
    Bool,
    List,
    Organization,
    User,
    Timezone,
    /// A type this crate has no special handling for.
    Other(String),
}

impl AttributeType {
    /// Wire name of the type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SingleChar => "singlechar",
            Self::LongChar => "longchar",
            Self::Int => "int",
            Self::Float => "float",
            Self::Enum => "enum",
            Self::Date => "date",
            Self::Time => "time",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Organization => "organization",
            Self::User => "objuser",
            Self::Timezone => "timezone",
            Self::Other(name) => name,
        }
    }

    /// True for types compared numerically.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// True for types compared as unordered sets.
    #[must_use]
    pub fn is_set_valued(&self) -> bool {
        matches!(self, Self::List | Self::Organization)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "singlechar" => Self::SingleChar,
            "longchar" => Self::LongChar,
            "int" => Self::Int,
            "float" => Self::Float,
            "enum" => Self::Enum,
            "date" => Self::Date,
            "time" => Self::Time,
            "bool" => Self::Bool,
            "list" => Self::List,
            "organization" => Self::Organization,
            "objuser" | "user" => Self::User,
            "timezone" => Self::Timezone,
            other => Self::Other(other.to_string()),
        })
    }
}

impl From<String> for AttributeType {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(ty) => ty,
            Err(never) => match never {},
        }
    }
}

impl From<AttributeType> for String {
    fn from(value: AttributeType) -> Self {
        value.as_str().to_string()
    }
}

/// Declaration of one attribute of an object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMeta {
    pub id: i64,
    pub object_type: ObjectType,
    /// Attribute key inside CI documents.
    pub property_id: String,
    /// Human-readable name.
    pub property_name: String,
    pub property_type: AttributeType,
}

impl AttributeMeta {
    /// Convenience constructor.
    #[must_use]
    pub fn new(
        id: i64,
        object_type: impl Into<ObjectType>,
        property_id: impl Into<String>,
        property_name: impl Into<String>,
        property_type: AttributeType,
    ) -> Self {
        Self {
            id,
            object_type: object_type.into(),
            property_id: property_id.into(),
            property_name: property_name.into(),
            property_type,
        }
    }
}

/// Declared-type side table for one object type.
#[derive(Debug, Clone, Default)]
pub struct AttributeTable {
    by_property: HashMap<String, AttributeMeta>,
    property_by_id: HashMap<i64, String>,
}

impl AttributeTable {
    /// Build the table from attribute declarations.
    #[must_use]
    pub fn new(attributes: Vec<AttributeMeta>) -> Self {
        let mut table = Self::default();
        for attr in attributes {
            table.property_by_id.insert(attr.id, attr.property_id.clone());
            table.by_property.insert(attr.property_id.clone(), attr);
        }
        table
    }

    /// Look up an attribute by its document key.
    #[must_use]
    pub fn get(&self, property_id: &str) -> Option<&AttributeMeta> {
        self.by_property.get(property_id)
    }

    /// Look up an attribute by its numeric id.
    #[must_use]
    pub fn by_id(&self, id: i64) -> Option<&AttributeMeta> {
        self.property_by_id
            .get(&id)
            .and_then(|property| self.by_property.get(property))
    }

    /// Declared type of an attribute.
    #[must_use]
    pub fn type_of(&self, property_id: &str) -> Option<&AttributeType> {
        self.get(property_id).map(|attr| &attr.property_type)
    }

    /// Display name of an attribute, falling back to its key.
    #[must_use]
    pub fn display_name<'a>(&'a self, property_id: &'a str) -> &'a str {
        self.get(property_id)
            .map_or(property_id, |attr| attr.property_name.as_str())
    }

    /// Iterate over all declarations.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeMeta> {
        self.by_property.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_property.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_property.is_empty()
    }
}

/// Read-only access to model definitions.
#[async_trait]
pub trait ModelMetadata: Send + Sync {
    /// Uniqueness rules flagged must-check for the object type.
    async fn must_check_rules(
        &self,
        object_type: &ObjectType,
        tenant: &TenantId,
    ) -> StoreResult<Vec<UniqueRule>>;

    /// Every attribute declared on the object type.
    async fn attributes(
        &self,
        object_type: &ObjectType,
        tenant: &TenantId,
    ) -> StoreResult<Vec<AttributeMeta>>;
}
