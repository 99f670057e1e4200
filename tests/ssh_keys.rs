//! Ephemeral trust lifecycle and request-signature verification.

mod util;

use std::time::Duration;

use panel_migrate::inventory::{MemoryInventory, WebsiteInfo};
use panel_migrate::migration::{ItemSelection, ItemStatus, MigrationStep, WebsiteSelection};
use panel_migrate::remote::signing::sign_request;
use util::harness;

fn inventory() -> MemoryInventory {
    MemoryInventory::new().with_website(WebsiteInfo {
        id: 1,
        name: "shop".into(),
        listens: vec!["80".into()],
        domains: vec![],
        path: String::new(),
        kind: "static".into(),
    })
}

fn selection() -> ItemSelection {
    ItemSelection {
        websites: vec![WebsiteSelection {
            id: 1,
            name: "shop".into(),
            path: String::new(),
        }],
        ..Default::default()
    }
}

#[test]
fn remote_key_removal_failure_still_deletes_local_files() {
    let h = harness(inventory());
    h.panel.fail_endpoint("DELETE", "/api/toolbox_migration/ssh_key");

    h.service.precheck(h.connection()).unwrap();
    let job = h.service.start(selection()).unwrap();
    assert!(job.wait_timeout(Duration::from_secs(10)));

    // Teardown was attempted against the peer and failed...
    assert_eq!(h.panel.requests_for("DELETE", "/api/toolbox_migration/ssh_key").len(), 1);
    // ...but the local pair is gone regardless, and the run's results
    // are untouched by the cleanup failure.
    assert!(!h.key_path().exists());
    assert!(!h.key_path().with_extension("pub").exists());
    let results = h.service.results();
    assert_eq!(results.step, MigrationStep::Done);
    assert_eq!(results.results[0].status, ItemStatus::Success);
}

#[test]
fn key_deploy_failure_aborts_the_run_and_removes_local_files() {
    let h = harness(inventory());
    h.panel.fail_endpoint("POST", "/api/toolbox_migration/ssh_key");

    h.service.precheck(h.connection()).unwrap();
    let job = h.service.start(selection()).unwrap();
    assert!(job.wait_timeout(Duration::from_secs(10)));

    let results = h.service.results();
    assert_eq!(results.step, MigrationStep::Done);
    assert!(results.results.is_empty());
    assert!(!h.key_path().exists());
    assert!(!h.key_path().with_extension("pub").exists());
}

#[test]
fn deployed_key_is_the_generated_public_key() {
    let h = harness(inventory());
    h.service.precheck(h.connection()).unwrap();
    let job = h.service.start(selection()).unwrap();
    assert!(job.wait_timeout(Duration::from_secs(10)));

    let adds = h.panel.requests_for("POST", "/api/toolbox_migration/ssh_key");
    let body: serde_json::Value = serde_json::from_str(&adds[0].body).unwrap();
    let key = body["public_key"].as_str().unwrap();
    assert!(key.starts_with("ssh-ed25519 "));
    assert_eq!(key, key.trim());
}

#[test]
fn inbound_trust_endpoints_edit_authorized_keys() {
    let h = harness(MemoryInventory::new());
    let key = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIPeerKey migration@peer";

    h.service.add_ssh_key(&format!("{key}\n")).unwrap();
    let path = h.tmp.path().join(".ssh/authorized_keys");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), format!("{key}\n"));

    h.service.remove_ssh_key(key).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

    assert!(matches!(
        h.service.add_ssh_key("  ").unwrap_err(),
        panel_migrate::migration::MigrateError::Validation(_)
    ));
}

#[test]
fn outbound_requests_carry_verifiable_signatures() {
    let h = harness(inventory());
    h.service.precheck(h.connection()).unwrap();
    let job = h.service.start(selection()).unwrap();
    assert!(job.wait_timeout(Duration::from_secs(10)));

    let requests = h.panel.requests();
    assert!(!requests.is_empty());

    for request in requests {
        let timestamp: i64 = request
            .timestamp
            .as_deref()
            .expect("X-Timestamp header present")
            .parse()
            .expect("X-Timestamp is unix seconds");

        // Recompute the signature from the recorded request material; it
        // must match the Authorization header the client sent.
        let expected = sign_request(
            &request.method,
            &request.path,
            &[],
            request.body.as_bytes(),
            7,
            "secret",
            timestamp,
        );
        assert_eq!(
            request.authorization.as_deref(),
            Some(expected.authorization.as_str()),
            "signature mismatch for {} {}",
            request.method,
            request.path
        );
    }
}
