//! Read a block of consecutive registers and print them.
//!
//! Run with:
//!   cargo run --example register-dump -- /dev/ttyACM0 0x2000 8
//!
//! Registers are 32 bits wide and 4 bytes apart.

use std::time::Duration;

use afelink::rpc::{read_register, ConnectionConfig};
use afelink::transport::{SerialConfig, SerialStream};
use afelink::Connection;

fn parse_word(text: &str) -> Result<u32, std::num::ParseIntError> {
    match text.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: register-dump <port> <start> [count]")?;
    let start = parse_word(&args.next().unwrap_or_else(|| "0x2000".into()))?;
    let count: u32 = args.next().map(|c| c.parse()).transpose()?.unwrap_or(8);

    let port = SerialStream::open(&SerialConfig::new(&path))?;
    let mut conn = Connection::open_with_config(
        port,
        ConnectionConfig {
            response_timeout: Duration::from_millis(200),
            ..ConnectionConfig::default()
        },
    );
    conn.flush_input();

    for i in 0..count {
        let address = start + i * 4;
        match read_register(&mut conn, address) {
            Ok(value) => println!("{address:#06x}: {value:#010x}"),
            Err(e) => eprintln!("{address:#06x}: {e}"),
        }
    }
    Ok(())
}
