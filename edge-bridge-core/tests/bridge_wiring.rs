//! End-to-end wiring: a bridge with fake brokers on both sides, driven
//! through the inbound dispatch, command buffers and publishers.

use async_trait::async_trait;
use edge_bridge_core::{BrokerEvent, EdgeBridge, FirmwareInstaller, MessageBroker};
use edge_bridge_error::BridgeResult;
use edge_bridge_models::{GatewayConfig, Message};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

struct FakeBroker {
    published: Mutex<Vec<Message>>,
    subscriptions: Mutex<Vec<String>>,
    events_rx: Mutex<Option<mpsc::Receiver<BrokerEvent>>>,
    events_tx: mpsc::Sender<BrokerEvent>,
}

impl FakeBroker {
    fn new() -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(64);
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            events_rx: Mutex::new(Some(events_rx)),
            events_tx,
        })
    }

    fn published(&self) -> Vec<Message> {
        self.published.lock().unwrap().clone()
    }

    async fn inject(&self, message: Message) {
        self.events_tx
            .send(BrokerEvent::Message(message))
            .await
            .unwrap();
    }
}

#[async_trait]
impl MessageBroker for FakeBroker {
    async fn connect(&self) -> bool {
        true
    }
    async fn disconnect(&self) {}
    async fn publish(&self, message: &Message) -> bool {
        self.published.lock().unwrap().push(message.clone());
        true
    }
    async fn subscribe(&self, topic: &str) -> bool {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        true
    }
    fn take_events(&self) -> Option<mpsc::Receiver<BrokerEvent>> {
        self.events_rx.lock().unwrap().take()
    }
}

struct NoopInstaller;

#[async_trait]
impl FirmwareInstaller for NoopInstaller {
    async fn install(&self, _firmware_path: &Path) -> BridgeResult<()> {
        Ok(())
    }
}

fn config(dir: &Path) -> GatewayConfig {
    serde_json::from_value(serde_json::json!({
        "key": "GW",
        "password": "secret",
        "platformMqttUri": "ssl://platform.example.com:8883",
        "localMqttUri": "tcp://localhost:1883",
        "keepAlive": false,
        "subdeviceManagement": "PLATFORM",
        "databasePath": "unused",
        "fileDownloadDirectory": dir.join("files").to_string_lossy(),
        "manifest": {
            "name": "Gateway",
            "protocol": "json",
            "firmwareUpdateProtocol": "dfu"
        }
    }))
    .unwrap()
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

fn count_on(messages: &[Message], kind: &str) -> usize {
    messages
        .iter()
        .filter(|m| m.channel.split('/').nth(1) == Some(kind))
        .count()
}

#[tokio::test(flavor = "multi_thread")]
async fn gateway_registration_then_buffered_child_flow() {
    let dir = tempfile::tempdir().unwrap();
    let conn = edge_bridge_storage::open_in_memory().await.unwrap();
    let platform = FakeBroker::new();
    let device = FakeBroker::new();

    let bridge = EdgeBridge::init(
        &config(dir.path()),
        conn,
        platform.clone(),
        device.clone(),
        Arc::new(NoopInstaller),
        None,
        "1.0.0",
    )
    .await
    .unwrap();

    bridge.connect().await;

    // Boot announcements reach the platform: registration request and
    // firmware version
    wait_until(|| count_on(&platform.published(), "register_device") == 1).await;
    wait_until(|| count_on(&platform.published(), "firmware_version_update") == 1).await;

    // A child registration before the gateway is confirmed stays buffered
    device
        .inject(Message::new(
            "d2p/register_device/d/child_X",
            serde_json::to_vec(&serde_json::json!({
                "deviceName": "Child",
                "deviceKey": "child_X",
                "template": {
                    "name": "Child",
                    "protocol": "json",
                    "firmwareUpdateProtocol": "dfu"
                }
            }))
            .unwrap(),
        ))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count_on(&platform.published(), "register_device"), 1);

    // Platform confirms the gateway: it lands in the repository and the
    // buffered child request goes out
    platform
        .inject(Message::new(
            "p2d/register_device/g/GW/d/GW",
            &br#"{"result":"OK"}"#[..],
        ))
        .await;

    wait_until(|| count_on(&platform.published(), "register_device") == 2).await;
    assert!(bridge
        .device_repository()
        .contains_device_with_key("GW")
        .await
        .unwrap());

    // Confirm the child too, then exercise the data path end to end
    platform
        .inject(Message::new(
            "p2d/register_device/g/GW/d/child_X",
            &br#"{"result":"OK"}"#[..],
        ))
        .await;
    let repository = bridge.device_repository();
    let mut child_known = false;
    for _ in 0..400 {
        if repository.contains_device_with_key("child_X").await.unwrap() {
            child_known = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(child_known, "child registration never persisted");

    device
        .inject(Message::new(
            "d2p/sensor_reading/d/child_X",
            &br#"{"reference":"T","values":["21.5"]}"#[..],
        ))
        .await;
    wait_until(|| {
        platform
            .published()
            .iter()
            .any(|m| m.channel == "d2p/sensor_reading/g/GW/d/child_X")
    })
    .await;

    bridge.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn subscriptions_cover_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let conn = edge_bridge_storage::open_in_memory().await.unwrap();
    let platform = FakeBroker::new();
    let device = FakeBroker::new();

    let bridge = EdgeBridge::init(
        &config(dir.path()),
        conn,
        platform.clone(),
        device.clone(),
        Arc::new(NoopInstaller),
        None,
        "1.0.0",
    )
    .await
    .unwrap();
    bridge.connect().await;

    wait_until(|| !platform.subscriptions.lock().unwrap().is_empty()).await;
    wait_until(|| !device.subscriptions.lock().unwrap().is_empty()).await;

    let platform_subs = platform.subscriptions.lock().unwrap().clone();
    assert!(platform_subs.contains(&"p2d/file_upload_initiate/g/GW".to_string()));
    assert!(platform_subs.contains(&"p2d/register_device/g/GW/#".to_string()));
    assert!(platform_subs.contains(&"p2d/actuator_set/g/GW/#".to_string()));

    let device_subs = device.subscriptions.lock().unwrap().clone();
    assert!(device_subs.contains(&"d2p/register_device/d/+".to_string()));
    assert!(device_subs.contains(&"d2p/sensor_reading/#".to_string()));

    bridge.stop().await;
}
