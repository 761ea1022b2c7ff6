//! Device repository with content-addressed template deduplication.
//!
//! Invariants:
//! - a persisted device references exactly one template row;
//! - templates are deduplicated by digest: saving two devices with
//!   equivalent templates produces a single template row;
//! - removing the last device referencing a template removes the template
//!   and all its manifest rows in the same transaction.

use edge_bridge_error::{storage::StorageError, StorageResult};
use edge_bridge_models::entities::{
    actuator_manifest, alarm_manifest, configuration_manifest, device, sensor_manifest, template,
    Labels,
};
use edge_bridge_models::{
    ActuatorManifest, AlarmManifest, AlarmSeverity, ConfigurationManifest, DataType, Device,
    DeviceTemplate, SensorManifest,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tokio::sync::Mutex;
use tracing::debug;

/// Repository for device and template rows.
///
/// All operations are serialized under a single mutex; the dedup check and
/// the subsequent insert must not interleave with another save.
pub struct DeviceRepository {
    conn: DatabaseConnection,
    lock: Mutex<()>,
}

impl DeviceRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self {
            conn,
            lock: Mutex::new(()),
        }
    }

    /// Upsert a device. An existing row with the same key is fully
    /// replaced.
    pub async fn save(&self, dev: &Device) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let txn = self.conn.begin().await?;
        Self::save_in(&txn, dev).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Remove a device by key. No-op when the key is unknown.
    pub async fn remove(&self, device_key: &str) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let txn = self.conn.begin().await?;
        Self::remove_in(&txn, device_key).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Remove every device (and thereby every template). The lock is held
    /// across the whole sweep so no device saved concurrently survives it.
    pub async fn remove_all(&self) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let rows = device::Entity::find().all(&self.conn).await?;
        for row in rows {
            let txn = self.conn.begin().await?;
            Self::remove_in(&txn, &row.key).await?;
            txn.commit().await?;
        }
        Ok(())
    }

    /// Reconstruct the full device including its template.
    pub async fn find_by_device_key(&self, device_key: &str) -> StorageResult<Option<Device>> {
        let _guard = self.lock.lock().await;

        let row = device::Entity::find_by_id(device_key).one(&self.conn).await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let tpl = template::Entity::find_by_id(row.template_id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| StorageError::EntityNotFound(format!("template {}", row.template_id)))?;

        let tmpl = Self::load_template(&self.conn, &tpl).await?;
        Ok(Some(Device {
            key: row.key,
            password: row.password,
            template: tmpl,
        }))
    }

    pub async fn find_all_device_keys(&self) -> StorageResult<Vec<String>> {
        let _guard = self.lock.lock().await;
        let rows = device::Entity::find().all(&self.conn).await?;
        Ok(rows.into_iter().map(|r| r.key).collect())
    }

    pub async fn contains_device_with_key(&self, device_key: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock().await;
        let count = device::Entity::find_by_id(device_key)
            .count(&self.conn)
            .await?;
        Ok(count > 0)
    }

    /// Number of template rows; used by tests to check deduplication.
    pub async fn template_count(&self) -> StorageResult<u64> {
        let _guard = self.lock.lock().await;
        Ok(template::Entity::find().count(&self.conn).await?)
    }

    async fn save_in<C: ConnectionTrait>(conn: &C, dev: &Device) -> StorageResult<()> {
        // Full replace on key conflict
        if device::Entity::find_by_id(dev.key.as_str()).count(conn).await? != 0 {
            Self::remove_in(conn, &dev.key).await?;
        }

        let digest = dev.template.digest();
        let template_id = match template::Entity::find()
            .filter(template::Column::Digest.eq(&digest))
            .one(conn)
            .await?
        {
            // Equivalent template exists, reference it
            Some(existing) => existing.id,
            None => Self::insert_template(conn, &dev.template, &digest).await?,
        };

        device::ActiveModel {
            key: Set(dev.key.clone()),
            password: Set(dev.password.clone()),
            template_id: Set(template_id),
        }
        .insert(conn)
        .await?;

        debug!(device_key = %dev.key, digest = %digest, "Device saved");
        Ok(())
    }

    async fn remove_in<C: ConnectionTrait>(conn: &C, device_key: &str) -> StorageResult<()> {
        let Some(row) = device::Entity::find_by_id(device_key).one(conn).await? else {
            return Ok(());
        };

        let referents = device::Entity::find()
            .filter(device::Column::TemplateId.eq(row.template_id))
            .count(conn)
            .await?;

        device::Entity::delete_by_id(device_key).exec(conn).await?;

        if referents == 1 {
            // Last referent: drop the template and its manifest rows
            sensor_manifest::Entity::delete_many()
                .filter(sensor_manifest::Column::TemplateId.eq(row.template_id))
                .exec(conn)
                .await?;
            actuator_manifest::Entity::delete_many()
                .filter(actuator_manifest::Column::TemplateId.eq(row.template_id))
                .exec(conn)
                .await?;
            alarm_manifest::Entity::delete_many()
                .filter(alarm_manifest::Column::TemplateId.eq(row.template_id))
                .exec(conn)
                .await?;
            configuration_manifest::Entity::delete_many()
                .filter(configuration_manifest::Column::TemplateId.eq(row.template_id))
                .exec(conn)
                .await?;
            template::Entity::delete_by_id(row.template_id)
                .exec(conn)
                .await?;
        }

        debug!(device_key, "Device removed");
        Ok(())
    }

    async fn insert_template<C: ConnectionTrait>(
        conn: &C,
        tmpl: &DeviceTemplate,
        digest: &str,
    ) -> StorageResult<i32> {
        let inserted = template::ActiveModel {
            name: Set(tmpl.name.clone()),
            description: Set(tmpl.description.clone()),
            protocol: Set(tmpl.protocol.clone()),
            firmware_update_protocol: Set(tmpl.firmware_update_protocol.clone()),
            digest: Set(digest.to_string()),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        for s in &tmpl.sensors {
            sensor_manifest::ActiveModel {
                reference: Set(s.reference.clone()),
                name: Set(s.name.clone()),
                description: Set(s.description.clone()),
                unit: Set(s.unit.clone()),
                reading_type: Set(s.reading_type.clone()),
                data_type: Set(s.data_type.as_str().to_string()),
                precision: Set(s.precision as i32),
                minimum: Set(s.minimum),
                maximum: Set(s.maximum),
                delimiter: Set(s.delimiter.clone()),
                labels: Set(Labels(s.labels.clone())),
                template_id: Set(inserted.id),
                ..Default::default()
            }
            .insert(conn)
            .await?;
        }

        for a in &tmpl.actuators {
            actuator_manifest::ActiveModel {
                reference: Set(a.reference.clone()),
                name: Set(a.name.clone()),
                description: Set(a.description.clone()),
                unit: Set(a.unit.clone()),
                reading_type: Set(a.reading_type.clone()),
                data_type: Set(a.data_type.as_str().to_string()),
                precision: Set(a.precision as i32),
                minimum: Set(a.minimum),
                maximum: Set(a.maximum),
                delimiter: Set(a.delimiter.clone()),
                labels: Set(Labels(a.labels.clone())),
                template_id: Set(inserted.id),
                ..Default::default()
            }
            .insert(conn)
            .await?;
        }

        for al in &tmpl.alarms {
            alarm_manifest::ActiveModel {
                reference: Set(al.reference.clone()),
                name: Set(al.name.clone()),
                description: Set(al.description.clone()),
                message: Set(al.message.clone()),
                severity: Set(al.severity.as_str().to_string()),
                template_id: Set(inserted.id),
                ..Default::default()
            }
            .insert(conn)
            .await?;
        }

        for c in &tmpl.configurations {
            configuration_manifest::ActiveModel {
                reference: Set(c.reference.clone()),
                name: Set(c.name.clone()),
                description: Set(c.description.clone()),
                data_type: Set(c.data_type.as_str().to_string()),
                minimum: Set(c.minimum),
                maximum: Set(c.maximum),
                delimiter: Set(c.delimiter.clone()),
                default_value: Set(c.default_value.clone()),
                labels: Set(Labels(c.labels.clone())),
                template_id: Set(inserted.id),
                ..Default::default()
            }
            .insert(conn)
            .await?;
        }

        Ok(inserted.id)
    }

    async fn load_template<C: ConnectionTrait>(
        conn: &C,
        row: &template::Model,
    ) -> StorageResult<DeviceTemplate> {
        let mut tmpl = DeviceTemplate::new(
            row.name.clone(),
            row.description.clone(),
            row.protocol.clone(),
            row.firmware_update_protocol.clone(),
        );

        let sensors = sensor_manifest::Entity::find()
            .filter(sensor_manifest::Column::TemplateId.eq(row.id))
            .order_by_asc(sensor_manifest::Column::Id)
            .all(conn)
            .await?;
        tmpl.sensors = sensors
            .into_iter()
            .map(|s| SensorManifest {
                reference: s.reference,
                name: s.name,
                description: s.description,
                unit: s.unit,
                reading_type: s.reading_type,
                data_type: DataType::from_str_loose(&s.data_type),
                precision: s.precision as u32,
                minimum: s.minimum,
                maximum: s.maximum,
                delimiter: s.delimiter,
                labels: s.labels.0,
            })
            .collect();

        let actuators = actuator_manifest::Entity::find()
            .filter(actuator_manifest::Column::TemplateId.eq(row.id))
            .order_by_asc(actuator_manifest::Column::Id)
            .all(conn)
            .await?;
        tmpl.actuators = actuators
            .into_iter()
            .map(|a| ActuatorManifest {
                reference: a.reference,
                name: a.name,
                description: a.description,
                unit: a.unit,
                reading_type: a.reading_type,
                data_type: DataType::from_str_loose(&a.data_type),
                precision: a.precision as u32,
                minimum: a.minimum,
                maximum: a.maximum,
                delimiter: a.delimiter,
                labels: a.labels.0,
            })
            .collect();

        let alarms = alarm_manifest::Entity::find()
            .filter(alarm_manifest::Column::TemplateId.eq(row.id))
            .order_by_asc(alarm_manifest::Column::Id)
            .all(conn)
            .await?;
        tmpl.alarms = alarms
            .into_iter()
            .map(|al| AlarmManifest {
                reference: al.reference,
                name: al.name,
                description: al.description,
                message: al.message,
                severity: AlarmSeverity::from_str_loose(&al.severity),
            })
            .collect();

        let configurations = configuration_manifest::Entity::find()
            .filter(configuration_manifest::Column::TemplateId.eq(row.id))
            .order_by_asc(configuration_manifest::Column::Id)
            .all(conn)
            .await?;
        tmpl.configurations = configurations
            .into_iter()
            .map(|c| ConfigurationManifest {
                reference: c.reference,
                name: c.name,
                description: c.description,
                data_type: DataType::from_str_loose(&c.data_type),
                minimum: c.minimum,
                maximum: c.maximum,
                delimiter: c.delimiter,
                default_value: c.default_value,
                labels: c.labels.0,
            })
            .collect();

        Ok(tmpl)
    }
}
