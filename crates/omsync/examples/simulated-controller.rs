//! Sync against an in-process simulated controller.
//!
//! Run with:
//!   cargo run --example simulated-controller
//!
//! The controller heats its bed a little every cycle and reboots once
//! halfway through, so the output shows dirty keys and a resync.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use omsync::frame::unframe;
use omsync::session::{CycleReport, RunOptions, Session, SessionConfig, SessionView};
use omsync::transport::{ManualClock, MockTransport};
use serde_json::{json, Value};

struct Heater {
    temperature: f64,
    counter: i64,
    uptime: u64,
    ticks: u32,
}

impl Heater {
    fn answer(&mut self, line: &str) -> Vec<u8> {
        let Some(command) = unframe(line) else {
            return b"Error: checksum mismatch\nok\n".to_vec();
        };
        if command == "M115" {
            return b"FIRMWARE_NAME: RepRapFirmware (simulated)\nok\n".to_vec();
        }
        let Some((flags, key)) = command
            .strip_prefix("M409 F\"")
            .and_then(|rest| rest.split_once("\" K\""))
        else {
            return b"ok\n".to_vec();
        };
        let key = key.trim_end_matches('"');

        if key == "seqs" {
            // Every seqs poll is one tick of the simulation.
            self.ticks += 1;
            self.temperature += 7.5;
            self.counter += 1;
            self.uptime = if self.ticks == 6 { 0 } else { self.uptime + 1 };
        }
        let result = match key {
            "seqs" => json!({
                "state": 1,
                "heat": self.counter,
                "tools": 1,
                "job": 1,
                "network": 1,
            }),
            "state" => json!({"status": "idle", "machineMode": "FFF", "upTime": self.uptime}),
            "heat" => json!({"heaters": [{"current": self.temperature, "active": 60.0}]}),
            "tools" => json!([{"number": 0, "heaters": [0]}]),
            "job" => json!({"file": {"fileName": null}}),
            "network" => json!({"name": "sim"}),
            _ => Value::Null,
        };
        format!("{}\nok\n", json!({"key": key, "flags": flags, "result": result})).into_bytes()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::new();
    let heater = Rc::new(RefCell::new(Heater {
        temperature: 20.0,
        counter: 1,
        uptime: 100,
        ticks: 0,
    }));
    let responder = Rc::clone(&heater);
    let mock = MockTransport::new(clock.clone())
        .with_responder(move |line| responder.borrow_mut().answer(line));

    let mut session = Session::with_clock(mock, clock, SessionConfig::default())?;
    session.connect()?;
    eprintln!("Connected: {}", session.firmware().unwrap_or("unknown firmware"));

    let mut print = |view: &SessionView<'_>, report: &CycleReport| {
        let current = view
            .lookup(&["heat", "heaters"])
            .and_then(|heaters| heaters[0]["current"].as_f64())
            .unwrap_or_default();
        match &report.resync {
            Some(reason) => println!("cycle {:>2}: resync ({reason})", report.cycle),
            None => println!(
                "cycle {:>2}: {} bed={current:.1}C verbose={:?}",
                report.cycle, view.state, report.verbose_keys
            ),
        }
    };
    let options = RunOptions {
        update_interval: Duration::from_secs(1),
        max_cycles: Some(12),
    };
    let summary = session.run(&mut print, &options, &AtomicBool::new(false))?;
    eprintln!(
        "Done: {} cycles, {} successful",
        summary.cycles, summary.successful
    );
    Ok(())
}
