use std::io::IsTerminal;

use afelink_rpc::Response;
use afelink_transport::PortInfo;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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
struct RegisterOutput {
    address: String,
    value: u32,
    hex: String,
}

#[derive(Serialize)]
struct AckOutput<'a> {
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    status: &'a str,
}

#[derive(Serialize)]
struct PortOutput<'a> {
    name: &'a str,
    kind: &'a str,
    description: Option<&'a str>,
}

pub fn hex_word(value: u32) -> String {
    format!("{value:#010x}")
}

pub fn hex_address(address: u32) -> String {
    format!("{address:#06x}")
}

pub fn print_register(address: u32, value: u32, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&RegisterOutput {
            address: hex_address(address),
            value,
            hex: hex_word(value),
        }),
        OutputFormat::Table => print_table(
            vec!["ADDRESS", "HEX", "DECIMAL"],
            vec![vec![hex_address(address), hex_word(value), value.to_string()]],
        ),
        OutputFormat::Pretty => {
            println!("{} = {} ({value})", hex_address(address), hex_word(value));
        }
    }
}

/// Acknowledge a write-type command.
pub fn print_ack(method: &str, address: Option<u32>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&AckOutput {
            method,
            address: address.map(hex_address),
            status: afelink_rpc::DONE,
        }),
        OutputFormat::Table | OutputFormat::Pretty => match address {
            Some(address) => println!("{method} {}: {}", hex_address(address), afelink_rpc::DONE),
            None => println!("{method}: {}", afelink_rpc::DONE),
        },
    }
}

pub fn print_words(words: &[u32], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&words),
        OutputFormat::Table => print_table(
            vec!["INDEX", "HEX", "DECIMAL"],
            words
                .iter()
                .enumerate()
                .map(|(i, w)| vec![i.to_string(), hex_word(*w), w.to_string()])
                .collect(),
        ),
        OutputFormat::Pretty => {
            for word in words {
                println!("{}", hex_word(*word));
            }
        }
    }
}

pub fn print_response(response: &Response, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(response),
        OutputFormat::Table => print_table(
            vec!["ID", "RESULT"],
            vec![vec![response.id.to_string(), response.result.to_string()]],
        ),
        OutputFormat::Pretty => {
            println!(
                "{}",
                serde_json::to_string_pretty(&response.result)
                    .unwrap_or_else(|_| response.result.to_string())
            );
        }
    }
}

pub fn print_ports(ports: &[PortInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out: Vec<_> = ports
                .iter()
                .map(|p| PortOutput {
                    name: &p.name,
                    kind: p.kind,
                    description: p.description.as_deref(),
                })
                .collect();
            print_json(&out);
        }
        OutputFormat::Table => print_table(
            vec!["PORT", "TYPE", "DESCRIPTION"],
            ports
                .iter()
                .map(|p| {
                    vec![
                        p.name.clone(),
                        p.kind.to_string(),
                        p.description.clone().unwrap_or_default(),
                    ]
                })
                .collect(),
        ),
        OutputFormat::Pretty => {
            if ports.is_empty() {
                println!("no serial ports found");
            }
            for p in ports {
                match &p.description {
                    Some(desc) => println!("{} ({}, {desc})", p.name, p.kind),
                    None => println!("{} ({})", p.name, p.kind),
                }
            }
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_table(header: Vec<&str>, rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}
