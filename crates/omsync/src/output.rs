use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use omsync_frame::ScanOutcome;
use omsync_model::{MachineMode, SequencingMode, Snapshot, Value};
use omsync_session::{CycleReport, ResyncReason, SessionState, SessionView};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CycleOutput<'a> {
    cycle: u64,
    success: bool,
    state: SessionState,
    machine_mode: Option<MachineMode>,
    sequencing: SequencingMode,
    verbose_keys: &'a [String],
    failed_keys: &'a [String],
    scheduler_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    resync: Option<&'a ResyncReason>,
    elapsed_ms: u64,
    snapshot: &'a Snapshot,
}

/// Print the outcome of one update cycle.
pub fn print_cycle(view: &SessionView<'_>, report: &CycleReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CycleOutput {
                cycle: report.cycle,
                success: report.success,
                state: view.state,
                machine_mode: view.machine_mode,
                sequencing: view.sequencing,
                verbose_keys: &report.verbose_keys,
                failed_keys: &report.failed_keys,
                scheduler_failed: report.scheduler_failed,
                resync: report.resync.as_ref(),
                elapsed_ms: report.elapsed_ms,
                snapshot: view.snapshot,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CYCLE", "STATE", "MODE", "STATUS", "UPTIME", "FAILED"])
                .add_row(vec![
                    report.cycle.to_string(),
                    view.state.to_string(),
                    mode_label(view.machine_mode),
                    text_at(view, &["state", "status"]),
                    text_at(view, &["state", "upTime"]),
                    failed_label(report),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{}", pretty_line(view, report));
        }
        OutputFormat::Raw => {
            print_json(view.snapshot);
        }
    }
}

/// Print the firmware banner from a handshake.
pub fn print_probe(device: &str, firmware: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            print_json(&serde_json::json!({"device": device, "firmware": firmware}));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DEVICE", "FIRMWARE"])
                .add_row(vec![device, firmware]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{device}: {firmware}"),
        OutputFormat::Raw => print_raw(firmware.as_bytes()),
    }
}

/// Print the reply to a raw command.
pub fn print_reply(command: &str, reply: &ScanOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let blocks: Vec<Value> = reply
                .blocks
                .iter()
                .map(|block| {
                    serde_json::from_str(block).unwrap_or_else(|_| Value::String(block.clone()))
                })
                .collect();
            print_json(&serde_json::json!({
                "command": command,
                "text": reply.text,
                "blocks": blocks,
                "terminated": reply.terminated,
            }));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "REPLY", "TERMINATED"])
                .add_row(vec![
                    command.to_string(),
                    reply_text(reply),
                    reply.terminated.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!("{}", reply_text(reply)),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn pretty_line(view: &SessionView<'_>, report: &CycleReport) -> String {
    let mut line = format!(
        "#{} {} {} status={} uptime={}",
        report.cycle,
        view.state,
        mode_label(view.machine_mode),
        text_at(view, &["state", "status"]),
        text_at(view, &["state", "upTime"]),
    );
    if let Some(reason) = &report.resync {
        line.push_str(&format!(" resync=\"{reason}\""));
    }
    if !report.success {
        line.push_str(&format!(" failed={}", failed_label(report)));
    }
    line
}

fn mode_label(mode: Option<MachineMode>) -> String {
    mode.map_or_else(|| "-".to_string(), |mode| mode.to_string())
}

fn failed_label(report: &CycleReport) -> String {
    let mut failed = report.failed_keys.clone();
    if report.scheduler_failed {
        failed.push("seqs".to_string());
    }
    if failed.is_empty() {
        "-".to_string()
    } else {
        failed.join(",")
    }
}

fn text_at(view: &SessionView<'_>, path: &[&str]) -> String {
    match view.lookup(path) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    }
}

fn reply_text(reply: &ScanOutcome) -> String {
    let mut parts: Vec<&str> = reply.blocks.iter().map(String::as_str).collect();
    if !reply.text.is_empty() {
        parts.push(reply.text.as_str());
    }
    parts.join(" ")
}
