use edge_bridge_models::{
    ActuatorManifest, DataType, Device, DeviceTemplate, SensorManifest,
};
use edge_bridge_repository::DeviceRepository;

fn template() -> DeviceTemplate {
    let mut tmpl = DeviceTemplate::new("Sample", "Sample template", "json", "dfu");
    tmpl.sensors.push(SensorManifest {
        reference: "T".to_string(),
        name: "Temperature".to_string(),
        description: "Ambient temperature".to_string(),
        unit: "C".to_string(),
        reading_type: "TEMPERATURE".to_string(),
        data_type: DataType::Numeric,
        precision: 1,
        minimum: -40.0,
        maximum: 85.0,
        delimiter: String::new(),
        labels: Vec::new(),
    });
    tmpl.actuators.push(ActuatorManifest {
        reference: "SW".to_string(),
        name: "Switch".to_string(),
        description: String::new(),
        unit: String::new(),
        reading_type: "SWITCH".to_string(),
        data_type: DataType::Boolean,
        precision: 0,
        minimum: 0.0,
        maximum: 1.0,
        delimiter: String::new(),
        labels: vec!["main".to_string()],
    });
    tmpl
}

async fn repository() -> DeviceRepository {
    let conn = edge_bridge_storage::open_in_memory().await.unwrap();
    DeviceRepository::new(conn)
}

#[tokio::test]
async fn equivalent_templates_are_deduplicated() {
    let repo = repository().await;

    repo.save(&Device::new("A", "pw_a", template())).await.unwrap();
    repo.save(&Device::new("B", "pw_b", template())).await.unwrap();

    assert_eq!(repo.template_count().await.unwrap(), 1);

    let a = repo.find_by_device_key("A").await.unwrap().unwrap();
    let b = repo.find_by_device_key("B").await.unwrap().unwrap();
    assert_eq!(a.template.digest(), b.template.digest());

    let mut keys = repo.find_all_device_keys().await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["A".to_string(), "B".to_string()]);
}

#[tokio::test]
async fn different_templates_get_separate_rows() {
    let repo = repository().await;

    let mut other = template();
    other.sensors[0].precision = 3;

    repo.save(&Device::new("A", "", template())).await.unwrap();
    repo.save(&Device::new("B", "", other)).await.unwrap();

    assert_eq!(repo.template_count().await.unwrap(), 2);
}

#[tokio::test]
async fn roundtrip_preserves_the_template() {
    let repo = repository().await;
    let saved = Device::new("A", "pw", template());

    repo.save(&saved).await.unwrap();
    let loaded = repo.find_by_device_key("A").await.unwrap().unwrap();

    assert_eq!(loaded.password, "pw");
    assert_eq!(loaded.template, saved.template);
    assert_eq!(loaded.template.digest(), saved.template.digest());
}

#[tokio::test]
async fn remove_drops_template_with_last_referent() {
    let repo = repository().await;

    repo.save(&Device::new("A", "", template())).await.unwrap();
    repo.save(&Device::new("B", "", template())).await.unwrap();

    repo.remove("A").await.unwrap();
    // B still references the shared template
    assert_eq!(repo.template_count().await.unwrap(), 1);
    assert!(repo.contains_device_with_key("B").await.unwrap());

    repo.remove("B").await.unwrap();
    assert_eq!(repo.template_count().await.unwrap(), 0);
    assert!(repo.find_by_device_key("B").await.unwrap().is_none());
}

#[tokio::test]
async fn remove_unknown_key_is_a_noop() {
    let repo = repository().await;
    repo.remove("ghost").await.unwrap();
    assert!(repo.find_all_device_keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn save_replaces_existing_device() {
    let repo = repository().await;

    repo.save(&Device::new("A", "old", template())).await.unwrap();

    let mut changed = template();
    changed.name = "Changed".to_string();
    repo.save(&Device::new("A", "new", changed.clone())).await.unwrap();

    // Old template row must be gone, only the replacement remains
    assert_eq!(repo.template_count().await.unwrap(), 1);
    let loaded = repo.find_by_device_key("A").await.unwrap().unwrap();
    assert_eq!(loaded.password, "new");
    assert_eq!(loaded.template.digest(), changed.digest());
}

#[tokio::test]
async fn remove_all_empties_the_repository() {
    let repo = repository().await;

    repo.save(&Device::new("GW", "", template())).await.unwrap();
    repo.save(&Device::new("C", "", template())).await.unwrap();

    repo.remove_all().await.unwrap();

    assert!(repo.find_all_device_keys().await.unwrap().is_empty());
    assert_eq!(repo.template_count().await.unwrap(), 0);
}
