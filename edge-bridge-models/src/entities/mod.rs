//! `SeaORM` entity definitions for the device repository and the
//! platform-bound outbound message store.

pub mod actuator_manifest;
pub mod alarm_manifest;
pub mod configuration_manifest;
pub mod device;
pub mod file_info;
pub mod outbound_message;
pub mod sensor_manifest;
pub mod template;

use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

/// Manifest label list, stored as a JSON column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Labels(pub Vec<String>);
