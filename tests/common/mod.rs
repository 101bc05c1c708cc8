//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use replica_sync::client::TargetClient;
use replica_sync::error::TargetError;
use replica_sync::models::{ConfigDocument, RebuildSelection};
use replica_sync::sync::Replicator;

/// Operations of the target contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Authenticate,
    FetchBundle,
    ImportBundle,
    FetchDocument,
    PatchDocument,
    TriggerRebuild,
    CloseSession,
}

/// One recorded call, in the order the orchestrator made it
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub target: String,
    pub op: Op,
}

/// Call log shared by every fake target of one test
pub type Journal = Arc<Mutex<Vec<Call>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// In-process target that records calls and fails on demand
pub struct FakeTarget {
    name: String,
    journal: Journal,
    bundle: Bytes,
    document: ConfigDocument,
    failures: Mutex<HashMap<Op, u32>>,
    imported: Mutex<Vec<(Bytes, RebuildSelection)>>,
    patches: Mutex<Vec<Value>>,
}

impl FakeTarget {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            bundle: Bytes::from_static(b"PK\x03\x04teleporter"),
            document: ConfigDocument::try_from(primary_document()).unwrap(),
            failures: Mutex::new(HashMap::new()),
            imported: Mutex::new(Vec::new()),
            patches: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `times` calls of `op`
    pub fn failing(self, op: Op, times: u32) -> Self {
        self.failures.lock().unwrap().insert(op, times);
        self
    }

    pub fn with_document(mut self, document: Value) -> Self {
        self.document = ConfigDocument::try_from(document).unwrap();
        self
    }

    pub fn count(&self, op: Op) -> usize {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.target == self.name && call.op == op)
            .count()
    }

    pub fn imported(&self) -> Vec<(Bytes, RebuildSelection)> {
        self.imported.lock().unwrap().clone()
    }

    pub fn patches(&self) -> Vec<Value> {
        self.patches.lock().unwrap().clone()
    }

    fn record(&self, op: Op) -> Result<(), TargetError> {
        self.journal.lock().unwrap().push(Call {
            target: self.name.clone(),
            op,
        });

        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(TargetError::ServerError(503))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl TargetClient for FakeTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authenticate(&self) -> Result<(), TargetError> {
        self.record(Op::Authenticate)
    }

    async fn fetch_bundle(&self) -> Result<Bytes, TargetError> {
        self.record(Op::FetchBundle)?;
        Ok(self.bundle.clone())
    }

    async fn import_bundle(
        &self,
        bundle: &Bytes,
        selection: &RebuildSelection,
    ) -> Result<(), TargetError> {
        self.record(Op::ImportBundle)?;
        self.imported
            .lock()
            .unwrap()
            .push((bundle.clone(), *selection));
        Ok(())
    }

    async fn fetch_document(&self) -> Result<ConfigDocument, TargetError> {
        self.record(Op::FetchDocument)?;
        Ok(self.document.clone())
    }

    async fn patch_document(&self, partial: &ConfigDocument) -> Result<(), TargetError> {
        self.record(Op::PatchDocument)?;
        self.patches
            .lock()
            .unwrap()
            .push(serde_json::to_value(partial).unwrap());
        Ok(())
    }

    async fn trigger_rebuild(&self) -> Result<(), TargetError> {
        self.record(Op::TriggerRebuild)
    }

    async fn close_session(&self) -> Result<(), TargetError> {
        self.record(Op::CloseSession)
    }
}

/// Primary document with every section, including the never-synced ones
pub fn primary_document() -> Value {
    json!({
        "dns": {
            "upstreams": ["9.9.9.9", "149.112.112.112"],
            "domain": {"name": "lan", "local": true},
            "reply": {"host": {"force4": true, "IPv4": "10.0.0.2", "force6": false}}
        },
        "dhcp": {"active": true, "start": "10.0.0.100", "end": "10.0.0.200"},
        "ntp": {"ipv4": {"active": true, "address": ""}},
        "resolver": {"resolveIPv4": true, "networkNames": true},
        "database": {"DBimport": true, "maxDBdays": 91},
        "webserver": {"port": "80o,443os", "api": {"pwhash": "hash"}},
        "files": {"database": "/etc/pihole/pihole-FTL.db"},
        "misc": {"privacylevel": 0, "nice": -10},
        "debug": {"database": false, "networking": false}
    })
}

/// Syncable part of [`primary_document`]
pub fn syncable_document() -> Value {
    let mut document = primary_document();
    if let Value::Object(map) = &mut document {
        map.remove("webserver");
        map.remove("files");
    }
    document
}

/// Orchestrator over fake targets, without retry delay
pub fn replicator(primary: &Arc<FakeTarget>, replicas: &[Arc<FakeTarget>]) -> Replicator {
    Replicator::new(
        primary.clone(),
        replicas
            .iter()
            .map(|replica| replica.clone() as Arc<dyn TargetClient>)
            .collect(),
        Duration::ZERO,
    )
}

/// Operations recorded in the journal, in order, as `(target, op)` pairs
pub fn calls(journal: &Journal) -> Vec<(String, Op)> {
    journal
        .lock()
        .unwrap()
        .iter()
        .map(|call| (call.target.clone(), call.op))
        .collect()
}
