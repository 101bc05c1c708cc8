//! Integration tests for the service against HTTP appliances

use serde_json::{json, Value};
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use replica_sync::config::Config;
use replica_sync::error::{AppError, SyncPhase};
use replica_sync::service::Service;

fn auth_ok(sid: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "session": {"valid": true, "totp": false, "sid": sid, "csrf": "csrf", "validity": 300},
        "took": 0.002
    }))
}

fn primary_config() -> Value {
    json!({
        "dns": {"upstreams": ["9.9.9.9"], "domain": {"name": "lan", "local": true}},
        "dhcp": {"active": false},
        "webserver": {"port": "80"},
        "misc": {"privacylevel": 0}
    })
}

async fn mount_primary(server: &MockServer, rebuild: bool) {
    Mock::given(method("POST"))
        .and(path("/api/auth"))
        .and(body_json(json!({"password": "primary-pw"})))
        .respond_with(auth_ok("primary-sid"))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/teleporter"))
        .and(header("X-FTL-SID", "primary-sid"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK-bundle".to_vec()))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "config": primary_config(),
            "took": 0.01
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/action/gravity"))
        .respond_with(ResponseTemplate::new(200).set_body_string("  [✓] Done.\n"))
        .expect(if rebuild { 1 } else { 0 })
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/auth"))
        .and(header("X-FTL-SID", "primary-sid"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_replica(server: &MockServer, expected_patch: Value, rebuild: bool) {
    Mock::given(method("POST"))
        .and(path("/api/auth"))
        .respond_with(auth_ok("replica-sid"))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/teleporter"))
        .and(header("X-FTL-SID", "replica-sid"))
        .and(body_string_contains("PK-bundle"))
        .and(body_string_contains("\"config\":false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/config"))
        .and(body_json(json!({"config": expected_patch})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"config": {}})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/action/gravity"))
        .respond_with(ResponseTemplate::new(200))
        .expect(if rebuild { 1 } else { 0 })
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/auth"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
}

fn config(primary: &MockServer, replica: &MockServer, webhook: &MockServer, sync: &str) -> Config {
    let yaml = format!(
        r#"
primary:
  url: "{}"
  password: "primary-pw"
replicas:
  - url: "{}/"
    password: "replica-pw"
client:
  retry_delay_secs: 0
  timeout_secs: 5
{}
webhook:
  success:
    url: "{}/success"
    body: "synced"
  failure:
    url: "{}/failure"
    method: "PUT"
"#,
        primary.uri(),
        replica.uri(),
        sync,
        webhook.uri(),
        webhook.uri()
    );
    Config::from_yaml(&yaml).unwrap()
}

// Test 1: Full sync with rebuild against HTTP appliances fires the success hook
#[tokio::test]
async fn test_full_sync_over_http() {
    let primary = MockServer::start().await;
    let replica = MockServer::start().await;
    let webhook = MockServer::start().await;

    mount_primary(&primary, true).await;
    mount_replica(
        &replica,
        json!({
            "dns": {"upstreams": ["9.9.9.9"], "domain": {"name": "lan", "local": true}},
            "dhcp": {"active": false},
            "misc": {"privacylevel": 0}
        }),
        true,
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/success"))
        .and(body_string_contains("synced"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&webhook)
        .await;
    Mock::given(path("/failure"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&webhook)
        .await;

    let service = Service::from_config(config(
        &primary,
        &replica,
        &webhook,
        "sync:\n  full_sync: true\n  run_gravity: true",
    ))
    .unwrap();

    let report = service.sync_once().await.unwrap();
    assert_eq!(report.replicas, 1);
    assert!(report.rebuild_triggered);
}

// Test 2: Selective sync sends only the filtered, enabled sections
#[tokio::test]
async fn test_selective_sync_over_http() {
    let primary = MockServer::start().await;
    let replica = MockServer::start().await;
    let webhook = MockServer::start().await;

    mount_primary(&primary, false).await;
    mount_replica(
        &replica,
        json!({"dns": {"domain": {"name": "lan"}}}),
        false,
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/success"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&webhook)
        .await;

    let sync = r#"sync:
  full_sync: false
  gravity:
    adlist: true
  config:
    dns:
      enabled: true
      include: ["domain.name"]
    dhcp:
      enabled: false"#;

    let service = Service::from_config(config(&primary, &replica, &webhook, sync)).unwrap();

    let report = service.sync_once().await.unwrap();
    assert!(!report.rebuild_triggered);
}

// Test 3: Rejected replica credentials fail the run after three attempts
#[tokio::test]
async fn test_replica_unauthorized() {
    let primary = MockServer::start().await;
    let replica = MockServer::start().await;
    let webhook = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth"))
        .respond_with(auth_ok("primary-sid"))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/auth"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&primary)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"key": "unauthorized", "message": "Unauthorized"}
        })))
        .expect(3)
        .mount(&replica)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&replica)
        .await;

    Mock::given(method("PUT"))
        .and(path("/failure"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&webhook)
        .await;

    let service = Service::from_config(config(
        &primary,
        &replica,
        &webhook,
        "sync:\n  full_sync: true",
    ))
    .unwrap();

    match service.sync_once().await {
        Err(AppError::Sync(err)) => {
            assert_eq!(err.phase(), SyncPhase::Authenticate);
            assert!(err.to_string().contains("Unauthorized"));
        }
        other => panic!("Expected sync failure, got {:?}", other),
    }
}

// Test 4: A failing webhook does not fail the run
#[tokio::test]
async fn test_webhook_failure_ignored() {
    let primary = MockServer::start().await;
    let replica = MockServer::start().await;
    let webhook = MockServer::start().await;

    mount_primary(&primary, false).await;
    mount_replica(
        &replica,
        json!({
            "dns": {"upstreams": ["9.9.9.9"], "domain": {"name": "lan", "local": true}},
            "dhcp": {"active": false},
            "misc": {"privacylevel": 0}
        }),
        false,
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/success"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&webhook)
        .await;

    let service = Service::from_config(config(
        &primary,
        &replica,
        &webhook,
        "sync:\n  full_sync: true",
    ))
    .unwrap();

    assert!(service.sync_once().await.is_ok());
}
