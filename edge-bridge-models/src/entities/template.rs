//! `SeaORM` Entity definition for device templates.
//!
//! Templates are content-addressed: `digest` is the canonical SHA-256 over
//! the template fields and is unique, so equivalent templates share a row.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "template")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub description: String,
    pub protocol: String,
    pub firmware_update_protocol: String,
    #[sea_orm(unique)]
    pub digest: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::device::Entity")]
    Device,
    #[sea_orm(has_many = "super::sensor_manifest::Entity")]
    SensorManifest,
    #[sea_orm(has_many = "super::actuator_manifest::Entity")]
    ActuatorManifest,
    #[sea_orm(has_many = "super::alarm_manifest::Entity")]
    AlarmManifest,
    #[sea_orm(has_many = "super::configuration_manifest::Entity")]
    ConfigurationManifest,
}

impl Related<super::device::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Device.def()
    }
}

impl Related<super::sensor_manifest::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SensorManifest.def()
    }
}

impl Related<super::actuator_manifest::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ActuatorManifest.def()
    }
}

impl Related<super::alarm_manifest::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlarmManifest.def()
    }
}

impl Related<super::configuration_manifest::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ConfigurationManifest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
