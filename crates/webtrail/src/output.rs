use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use webtrail_call::{code_name, Status};
use webtrail_frame::Metadata;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput {
    index: usize,
    size: usize,
    payload: String,
}

pub fn print_message(index: usize, payload: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                index,
                size: payload.len(),
                payload: payload_preview(payload),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    index.to_string(),
                    payload.len().to_string(),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("[{index}] {} bytes: {}", payload.len(), payload_preview(payload));
        }
        OutputFormat::Raw => {
            print_raw(payload);
        }
    }
}

#[derive(Serialize)]
struct OutcomeOutput<'a> {
    code: u32,
    code_name: &'a str,
    message: &'a str,
    messages_received: usize,
    leading_metadata: Vec<(String, Vec<String>)>,
    trailing_metadata: Vec<(String, Vec<String>)>,
}

/// Final outcome line, printed after all messages.
pub fn print_outcome(
    status: &Status,
    messages_received: usize,
    leading: Option<&Metadata>,
    trailing: Option<&Metadata>,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = OutcomeOutput {
                code: status.code,
                code_name: code_name(status.code),
                message: &status.message,
                messages_received,
                leading_metadata: metadata_entries(leading),
                trailing_metadata: metadata_entries(trailing),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STATUS", "CODE", "MESSAGES", "DETAIL"])
                .add_row(vec![
                    code_name(status.code).to_string(),
                    status.code.to_string(),
                    messages_received.to_string(),
                    status.message.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("status={status} messages={messages_received}");
            for (key, values) in metadata_entries(leading) {
                println!("leading  {key}: {}", values.join(", "));
            }
            for (key, values) in metadata_entries(trailing) {
                println!("trailing {key}: {}", values.join(", "));
            }
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn metadata_entries(metadata: Option<&Metadata>) -> Vec<(String, Vec<String>)> {
    metadata
        .map(|md| {
            md.iter()
                .map(|(key, values)| (key.to_string(), values.to_vec()))
                .collect()
        })
        .unwrap_or_default()
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}
