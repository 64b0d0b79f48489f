//! Shared entity types for the Vigil audit backend.
//!
//! These are the records the backend stores: datasets grouping audit data,
//! individual audit records produced by the API gateway, and the assets those
//! records refer to. Every entity is keyed by `(owner, name)` and carries a
//! `createdTime` timestamp that listing endpoints sort by default.
//!
//! Field names serialise in camelCase. The storage layer derives physical
//! column names from these logical names, so renaming a field here renames
//! the column it maps to.

use serde::{Deserialize, Serialize};

/// Logical name of the owner field shared by every entity.
pub const OWNER_FIELD: &str = "owner";

/// Logical name of the creation timestamp shared by every entity.
pub const CREATED_TIME_FIELD: &str = "createdTime";

/// A named collection of audit data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dataset {
    /// Organization that owns the dataset.
    pub owner: String,
    /// Unique name within the owner.
    pub name: String,
    /// RFC 3339 creation timestamp.
    pub created_time: String,
    /// Human-readable name.
    pub display_name: String,
    /// Free-form description.
    pub description: String,
}

/// A single audited API call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    /// Organization that owns the record.
    pub owner: String,
    /// Unique name within the owner.
    pub name: String,
    /// RFC 3339 creation timestamp.
    pub created_time: String,
    /// Organization of the acting user.
    pub organization: String,
    /// Client address the request came from.
    pub client_ip: String,
    /// Acting user.
    pub user: String,
    /// HTTP method of the audited call.
    pub method: String,
    /// Request URI of the audited call.
    pub request_uri: String,
    /// Logical action name (e.g. `add-asset`).
    pub action: String,
    /// Serialized request object.
    pub object: String,
    /// Serialized response.
    pub response: String,
    /// Whether a webhook was triggered for this record.
    pub is_triggered: bool,
}

/// An infrastructure asset under audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Asset {
    /// Organization that owns the asset.
    pub owner: String,
    /// Unique name within the owner.
    pub name: String,
    /// RFC 3339 creation timestamp.
    pub created_time: String,
    /// Human-readable name.
    pub display_name: String,
    /// Asset category (e.g. `Machine`, `Database`).
    pub category: String,
    /// Asset type within the category (e.g. `MySQL`, `SSH`).
    #[serde(rename = "type")]
    pub asset_type: String,
    /// Host name or address.
    pub endpoint: String,
    /// Service port.
    pub port: i64,
    /// Login user name.
    pub username: String,
    /// Free-form description.
    pub description: String,
}
