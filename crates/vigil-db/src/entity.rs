//! Entity descriptors, cell values and row conversion.
//!
//! An [`EntityDescriptor`] is the static structural description of one table:
//! its logical name and an ordered list of columns. Descriptors double as the
//! allow-list for request-supplied field names, since only declared fields
//! can be resolved to a column.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::error::QueryError;
use crate::naming::snake_case;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Bounded string.
    Varchar(u16),
    /// Unbounded string.
    Text,
    /// 64-bit integer.
    BigInt,
    /// Boolean flag.
    Bool,
}

/// One column of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Logical (camelCase) field name, as serialised by the entity type.
    pub field: &'static str,
    /// Storage type.
    pub kind: ColumnKind,
    /// Whether the column is part of the primary key.
    pub key: bool,
}

impl ColumnDef {
    /// A primary-key column.
    pub const fn key(field: &'static str, kind: ColumnKind) -> Self {
        Self {
            field,
            kind,
            key: true,
        }
    }

    /// A regular, nullable column.
    pub const fn new(field: &'static str, kind: ColumnKind) -> Self {
        Self {
            field,
            kind,
            key: false,
        }
    }

    /// Physical column name.
    pub fn column_name(&self) -> String {
        snake_case(self.field)
    }
}

/// Structural description of a storage relation.
#[derive(Debug, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Logical entity name; the table name derives from it.
    pub name: &'static str,
    /// Columns in declaration order.
    pub columns: &'static [ColumnDef],
}

impl EntityDescriptor {
    /// Looks up a declared column by logical field name.
    pub fn column(&self, field: &str) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Primary-key columns in declaration order.
    pub fn key_columns(&self) -> impl Iterator<Item = &'static ColumnDef> {
        self.columns.iter().filter(|c| c.key)
    }
}

/// A type stored in its own table.
pub trait Entity: Serialize + DeserializeOwned + Send + 'static {
    /// The table this type maps to.
    const DESCRIPTOR: &'static EntityDescriptor;
}

/// A bound parameter or decoded cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Integer.
    Int(i64),
    /// Boolean.
    Bool(bool),
    /// String.
    Text(String),
}

impl Value {
    fn into_json(self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Int(i) => Json::from(i),
            Self::Bool(b) => Json::Bool(b),
            Self::Text(s) => Json::String(s),
        }
    }

    fn from_json(column: &ColumnDef, json: Option<&Json>) -> Result<Self, QueryError> {
        let mismatch = |expected: &str| QueryError::InvalidValue {
            field: column.field.to_string(),
            reason: format!("expected {expected}"),
        };
        match (column.kind, json) {
            (_, None | Some(Json::Null)) => Ok(Self::Null),
            (ColumnKind::Varchar(_) | ColumnKind::Text, Some(Json::String(s))) => {
                Ok(Self::Text(s.clone()))
            }
            (ColumnKind::BigInt, Some(Json::Number(n))) => {
                n.as_i64().map(Self::Int).ok_or_else(|| mismatch("a 64-bit integer"))
            }
            (ColumnKind::Bool, Some(Json::Bool(b))) => Ok(Self::Bool(*b)),
            (ColumnKind::Varchar(_) | ColumnKind::Text, _) => Err(mismatch("a string")),
            (ColumnKind::BigInt, _) => Err(mismatch("an integer")),
            (ColumnKind::Bool, _) => Err(mismatch("a boolean")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

/// A decoded row, keyed by logical field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(&'static str, Value)>,
}

impl Row {
    pub(crate) fn new(cells: Vec<(&'static str, Value)>) -> Self {
        Self { cells }
    }

    /// Returns the value of a field, if the row has it.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    /// Converts the row to a JSON object. `NULL` cells are omitted.
    pub fn into_json(self) -> Json {
        let object: Map<String, Json> = self
            .cells
            .into_iter()
            .filter(|(_, value)| *value != Value::Null)
            .map(|(name, value)| (name.to_string(), value.into_json()))
            .collect();
        Json::Object(object)
    }

    /// Deserialises the row into an entity.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Serialization` if the row does not fit `E`.
    pub fn decode<E: Entity>(self) -> Result<E, QueryError> {
        Ok(serde_json::from_value(self.into_json())?)
    }
}

/// Serialises an entity into one value per descriptor column, in order.
///
/// # Errors
///
/// Returns `QueryError::Serialization` if `E` does not serialise to an object,
/// or `QueryError::InvalidValue` if a field's type does not match its column.
pub fn encode<E: Entity>(entity: &E) -> Result<Vec<Value>, QueryError> {
    let json = serde_json::to_value(entity)?;
    let Json::Object(object) = json else {
        return Err(QueryError::InvalidValue {
            field: E::DESCRIPTOR.name.to_string(),
            reason: "entity must serialise to an object".to_string(),
        });
    };
    E::DESCRIPTOR
        .columns
        .iter()
        .map(|column| Value::from_json(column, object.get(column.field)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    struct Probe {
        owner: String,
        hit_count: i64,
        enabled: bool,
    }

    const PROBE: EntityDescriptor = EntityDescriptor {
        name: "Probe",
        columns: &[
            ColumnDef::key("owner", ColumnKind::Varchar(100)),
            ColumnDef::new("hitCount", ColumnKind::BigInt),
            ColumnDef::new("enabled", ColumnKind::Bool),
        ],
    };

    impl Entity for Probe {
        const DESCRIPTOR: &'static EntityDescriptor = &PROBE;
    }

    #[test]
    fn encode_follows_descriptor_order() {
        let probe = Probe {
            owner: "admin".to_string(),
            hit_count: 7,
            enabled: true,
        };
        let values = encode(&probe).expect("encode should succeed");
        assert_eq!(
            values,
            vec![Value::from("admin"), Value::Int(7), Value::Bool(true)]
        );
    }

    #[test]
    fn decode_skips_nulls_and_uses_defaults() {
        let row = Row::new(vec![
            ("owner", Value::from("admin")),
            ("hitCount", Value::Null),
            ("enabled", Value::Bool(true)),
        ]);
        assert_eq!(row.get("owner"), Some(&Value::from("admin")));

        let probe: Probe = row.decode().expect("decode should succeed");
        assert_eq!(probe.hit_count, 0);
        assert!(probe.enabled);
    }

    #[test]
    fn type_mismatch_is_reported_per_field() {
        let column = ColumnDef::new("hitCount", ColumnKind::BigInt);
        let err = Value::from_json(&column, Some(&Json::String("x".into())))
            .expect_err("string is not an integer");
        assert!(matches!(err, QueryError::InvalidValue { field, .. } if field == "hitCount"));
    }

    #[test]
    fn descriptor_lookup_is_by_logical_name() {
        assert_eq!(PROBE.column("hitCount").map(|c| c.column_name()), Some("hit_count".to_string()));
        assert!(PROBE.column("hit_count").is_none());
        assert_eq!(PROBE.key_columns().count(), 1);
    }
}
