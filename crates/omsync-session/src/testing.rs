//! Simulated controller for session tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use omsync_frame::unframe;
use omsync_transport::{ManualClock, MockTransport};
use serde_json::{json, Value};

pub(crate) const BANNER: &str =
    "FIRMWARE_NAME: RepRapFirmware for Duet 3 MB6HC FIRMWARE_VERSION: 3.5.1";

/// Answers `M115` and `M409` like a standalone controller would.
#[derive(Debug)]
pub(crate) struct Controller {
    pub mode: String,
    pub uptime: u64,
    pub seqs: Value,
    pub keys: BTreeMap<String, Value>,
    /// Keys that get no reply at all.
    pub silent: BTreeSet<String>,
    /// `(flag, key)` for every object-model query seen.
    pub requests: Vec<(char, String)>,
    /// Any other command seen.
    pub gcodes: Vec<String>,
}

impl Controller {
    pub fn fff() -> Self {
        let keys = [
            ("heat", json!({"heaters": [{"current": 21.0, "state": "off"}]})),
            ("tools", json!([{"number": 0, "state": "off"}])),
            ("job", json!({"file": {"fileName": null}, "layer": null})),
            ("network", json!({"name": "duet", "interfaces": [{"type": "wifi"}]})),
        ];
        Self {
            mode: "FFF".to_string(),
            uptime: 12000,
            seqs: json!({"state": 1, "heat": 1, "tools": 1, "job": 1, "network": 1, "reply": 0}),
            keys: keys
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
            silent: BTreeSet::new(),
            requests: Vec::new(),
            gcodes: Vec::new(),
        }
    }

    /// Controller behind a single-board computer: no sequence counters.
    pub fn sbc(mut self) -> Self {
        self.seqs = Value::Null;
        self
    }

    /// Change a key and bump its counter.
    pub fn update(&mut self, key: &str, value: Value) {
        self.keys.insert(key.to_string(), value);
        if let Some(counter) = self.seqs.get_mut(key) {
            *counter = json!(counter.as_i64().unwrap_or(0) + 1);
        }
    }

    /// Counters after a restart.
    pub fn reset_counters(&mut self) {
        if let Some(seqs) = self.seqs.as_object_mut() {
            for counter in seqs.values_mut() {
                *counter = json!(1);
            }
        }
    }

    pub fn switch_to_cnc(&mut self) {
        self.mode = "CNC".to_string();
        self.keys.insert("move".to_string(), json!({"axes": [{"letter": "X"}]}));
        self.keys.insert("spindles".to_string(), json!([{"current": 0}]));
        if let Some(seqs) = self.seqs.as_object_mut() {
            seqs.insert("move".to_string(), json!(1));
            seqs.insert("spindles".to_string(), json!(1));
        }
    }

    /// Requests as `"<flag> <key>"`.
    pub fn request_log(&self) -> Vec<String> {
        self.requests
            .iter()
            .map(|(flag, key)| format!("{flag} {key}"))
            .collect()
    }

    fn state(&self) -> Value {
        json!({"status": "idle", "machineMode": self.mode, "upTime": self.uptime})
    }

    fn respond(&mut self, line: &str) -> Vec<u8> {
        let Some(command) = unframe(line) else {
            return b"Error: bad checksum\nok\n".to_vec();
        };
        if command == "M115" {
            return format!("{BANNER}\nok\n").into_bytes();
        }
        let Some((flags, key)) = parse_query(command) else {
            self.gcodes.push(command.to_string());
            return b"ok\n".to_vec();
        };

        self.requests
            .push((flags.chars().next().unwrap_or('?'), key.to_string()));
        if self.silent.contains(key) {
            return Vec::new();
        }
        let result = match key {
            "state" => self.state(),
            "seqs" => self.seqs.clone(),
            other => self.keys.get(other).cloned().unwrap_or(Value::Null),
        };
        let envelope = json!({"key": key, "flags": flags, "result": result});
        format!("{envelope}\nok\n").into_bytes()
    }
}

fn parse_query(command: &str) -> Option<(&str, &str)> {
    let rest = command.strip_prefix("M409 F\"")?;
    let (flags, rest) = rest.split_once('"')?;
    let key = rest.strip_prefix(" K\"")?.strip_suffix('"')?;
    Some((flags, key))
}

/// Wire `controller` to a mock transport on a fresh manual clock.
pub(crate) fn attach(
    controller: Controller,
) -> (Rc<RefCell<Controller>>, MockTransport, ManualClock) {
    let clock = ManualClock::new();
    let controller = Rc::new(RefCell::new(controller));
    let responder = Rc::clone(&controller);
    let mock = MockTransport::new(clock.clone())
        .with_responder(move |line| responder.borrow_mut().respond(line));
    (controller, mock, clock)
}
