//! Demo gateway module.
//!
//! Generates readings for every sensor in the configured manifest on a
//! fixed interval and keeps a local actuator table whose current values
//! are reported alongside. Values come from either a random or an
//! incremental generator.

use edge_bridge_core::EdgeBridge;
use edge_bridge_models::{
    ActuatorState, DataType, GatewayConfig, SensorManifest, ValueGenerator,
};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Actuator value held as a tagged variant instead of a handler
/// class hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub enum ActuatorValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ActuatorValue {
    pub fn for_data_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Boolean => ActuatorValue::Bool(false),
            DataType::Numeric => ActuatorValue::Number(0.0),
            DataType::String => ActuatorValue::Text(String::new()),
        }
    }

    pub fn set_from_string(&mut self, value: &str) {
        match self {
            ActuatorValue::Bool(inner) => *inner = value == "true",
            ActuatorValue::Number(inner) => {
                if let Ok(parsed) = value.parse::<f64>() {
                    *inner = parsed;
                }
            }
            ActuatorValue::Text(inner) => *inner = value.to_string(),
        }
    }

    pub fn get_as_string(&self) -> String {
        match self {
            ActuatorValue::Bool(inner) => inner.to_string(),
            ActuatorValue::Number(inner) => inner.to_string(),
            ActuatorValue::Text(inner) => inner.clone(),
        }
    }
}

pub struct DemoApplication {
    sensors: Vec<SensorManifest>,
    actuators: HashMap<String, ActuatorValue>,
    generator: ValueGenerator,
    interval: Duration,
}

impl DemoApplication {
    pub fn new(config: &GatewayConfig) -> Self {
        let actuators = config
            .manifest
            .actuators
            .iter()
            .map(|manifest| {
                (
                    manifest.reference.clone(),
                    ActuatorValue::for_data_type(manifest.data_type),
                )
            })
            .collect();

        Self {
            sensors: config.manifest.sensors.clone(),
            actuators,
            generator: config.generator,
            interval: Duration::from_millis(config.readings_interval.max(1)),
        }
    }

    pub async fn run(self, bridge: Arc<EdgeBridge>) {
        info!(
            sensors = self.sensors.len(),
            actuators = self.actuators.len(),
            "Demo module started"
        );

        let mut counter: u64 = 0;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            counter += 1;

            for sensor in &self.sensors {
                let values = self.generate_values(sensor, counter);
                bridge.add_sensor_reading(&sensor.reference, values, 0).await;
            }

            for (reference, value) in &self.actuators {
                bridge
                    .add_actuator_status(reference, &value.get_as_string(), ActuatorState::Ready)
                    .await;
            }
        }
    }

    /// Handle an actuation request against the local table.
    #[allow(dead_code)]
    pub fn set_actuator(&mut self, reference: &str, value: &str) {
        if let Some(actuator) = self.actuators.get_mut(reference) {
            actuator.set_from_string(value);
        }
    }

    fn generate_values(&self, sensor: &SensorManifest, counter: u64) -> Vec<String> {
        let slots = if sensor.delimiter.is_empty() {
            1
        } else {
            // Composite vectors carry one value per label
            sensor.labels.len().max(1)
        };

        (0..slots)
            .map(|slot| match sensor.data_type {
                DataType::Boolean => (counter % 2 == 0).to_string(),
                DataType::Numeric => {
                    let span = (sensor.maximum - sensor.minimum).abs().max(f64::EPSILON);
                    let value = match self.generator {
                        ValueGenerator::Random => {
                            rand::thread_rng().gen_range(sensor.minimum..=sensor.maximum)
                        }
                        ValueGenerator::Incremental => {
                            sensor.minimum + ((counter + slot as u64) as f64 % span)
                        }
                    };
                    format!("{:.prec$}", value, prec = sensor.precision as usize)
                }
                DataType::String => format!("sample-{counter}"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actuator_value_roundtrip() {
        let mut value = ActuatorValue::for_data_type(DataType::Boolean);
        value.set_from_string("true");
        assert_eq!(value.get_as_string(), "true");

        let mut value = ActuatorValue::for_data_type(DataType::Numeric);
        value.set_from_string("4.5");
        assert_eq!(value.get_as_string(), "4.5");
        // Garbage leaves the previous value in place
        value.set_from_string("not a number");
        assert_eq!(value.get_as_string(), "4.5");

        let mut value = ActuatorValue::for_data_type(DataType::String);
        value.set_from_string("on");
        assert_eq!(value.get_as_string(), "on");
    }

    #[test]
    fn incremental_values_stay_in_range() {
        let sensor = SensorManifest {
            reference: "T".to_string(),
            name: "Temperature".to_string(),
            description: String::new(),
            unit: "C".to_string(),
            reading_type: "TEMPERATURE".to_string(),
            data_type: DataType::Numeric,
            precision: 1,
            minimum: 10.0,
            maximum: 20.0,
            delimiter: String::new(),
            labels: Vec::new(),
        };

        let config_stub = DemoApplication {
            sensors: vec![sensor.clone()],
            actuators: HashMap::new(),
            generator: ValueGenerator::Incremental,
            interval: Duration::from_millis(1),
        };

        for counter in 0..50 {
            let values = config_stub.generate_values(&sensor, counter);
            assert_eq!(values.len(), 1);
            let value: f64 = values[0].parse().unwrap();
            assert!((10.0..=20.0).contains(&value), "value {value} out of range");
        }
    }

    #[test]
    fn composite_sensor_emits_one_value_per_label() {
        let sensor = SensorManifest {
            reference: "ACL".to_string(),
            name: "Accelerometer".to_string(),
            description: String::new(),
            unit: "g".to_string(),
            reading_type: "ACCELEROMETER".to_string(),
            data_type: DataType::Numeric,
            precision: 2,
            minimum: -2.0,
            maximum: 2.0,
            delimiter: ",".to_string(),
            labels: vec!["x".into(), "y".into(), "z".into()],
        };

        let app = DemoApplication {
            sensors: vec![sensor.clone()],
            actuators: HashMap::new(),
            generator: ValueGenerator::Incremental,
            interval: Duration::from_millis(1),
        };

        assert_eq!(app.generate_values(&sensor, 1).len(), 3);
    }
}
