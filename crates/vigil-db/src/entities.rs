//! Table layouts for the shared entity types.

use vigil_types::{Asset, Dataset, Record};

use crate::entity::{ColumnDef, ColumnKind, Entity, EntityDescriptor};

impl Entity for Dataset {
    const DESCRIPTOR: &'static EntityDescriptor = &EntityDescriptor {
        name: "Dataset",
        columns: &[
            ColumnDef::key("owner", ColumnKind::Varchar(100)),
            ColumnDef::key("name", ColumnKind::Varchar(100)),
            ColumnDef::new("createdTime", ColumnKind::Varchar(100)),
            ColumnDef::new("displayName", ColumnKind::Varchar(100)),
            ColumnDef::new("description", ColumnKind::Varchar(500)),
        ],
    };
}

impl Entity for Record {
    const DESCRIPTOR: &'static EntityDescriptor = &EntityDescriptor {
        name: "Record",
        columns: &[
            ColumnDef::key("owner", ColumnKind::Varchar(100)),
            ColumnDef::key("name", ColumnKind::Varchar(100)),
            ColumnDef::new("createdTime", ColumnKind::Varchar(100)),
            ColumnDef::new("organization", ColumnKind::Varchar(100)),
            ColumnDef::new("clientIp", ColumnKind::Varchar(100)),
            ColumnDef::new("user", ColumnKind::Varchar(100)),
            ColumnDef::new("method", ColumnKind::Varchar(100)),
            ColumnDef::new("requestUri", ColumnKind::Varchar(1000)),
            ColumnDef::new("action", ColumnKind::Varchar(1000)),
            ColumnDef::new("object", ColumnKind::Text),
            ColumnDef::new("response", ColumnKind::Text),
            ColumnDef::new("isTriggered", ColumnKind::Bool),
        ],
    };
}

impl Entity for Asset {
    const DESCRIPTOR: &'static EntityDescriptor = &EntityDescriptor {
        name: "Asset",
        columns: &[
            ColumnDef::key("owner", ColumnKind::Varchar(100)),
            ColumnDef::key("name", ColumnKind::Varchar(100)),
            ColumnDef::new("createdTime", ColumnKind::Varchar(100)),
            ColumnDef::new("displayName", ColumnKind::Varchar(100)),
            ColumnDef::new("category", ColumnKind::Varchar(100)),
            ColumnDef::new("type", ColumnKind::Varchar(100)),
            ColumnDef::new("endpoint", ColumnKind::Varchar(100)),
            ColumnDef::new("port", ColumnKind::BigInt),
            ColumnDef::new("username", ColumnKind::Varchar(100)),
            ColumnDef::new("description", ColumnKind::Varchar(500)),
        ],
    };
}

/// Every table the backend needs, in synchronization order.
pub const ENTITIES: &[&EntityDescriptor] = &[
    Dataset::DESCRIPTOR,
    Record::DESCRIPTOR,
    Asset::DESCRIPTOR,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{encode, Value};

    #[test]
    fn descriptors_cover_every_serialised_field() {
        let record = Record::default();
        let json = serde_json::to_value(&record).expect("record should serialise");
        let object = json.as_object().expect("record is an object");
        assert_eq!(object.len(), Record::DESCRIPTOR.columns.len());
        for key in object.keys() {
            assert!(
                Record::DESCRIPTOR.column(key).is_some(),
                "field {key} has no column"
            );
        }

        let asset = serde_json::to_value(Asset::default()).expect("asset should serialise");
        assert_eq!(
            asset.as_object().map(|o| o.len()),
            Some(Asset::DESCRIPTOR.columns.len())
        );
        let dataset = serde_json::to_value(Dataset::default()).expect("dataset should serialise");
        assert_eq!(
            dataset.as_object().map(|o| o.len()),
            Some(Dataset::DESCRIPTOR.columns.len())
        );
    }

    #[test]
    fn every_entity_is_keyed_by_owner_and_name() {
        for entity in ENTITIES {
            let keys: Vec<_> = entity.key_columns().map(|c| c.field).collect();
            assert_eq!(keys, ["owner", "name"], "{} keys", entity.name);
            assert!(entity.column("createdTime").is_some());
        }
    }

    #[test]
    fn asset_type_maps_to_type_column() {
        let asset = Asset {
            asset_type: "MySQL".to_string(),
            port: 3306,
            ..Asset::default()
        };
        let values = encode(&asset).expect("encode should succeed");
        assert_eq!(values[5], Value::from("MySQL"));
        assert_eq!(values[7], Value::Int(3306));
    }
}
