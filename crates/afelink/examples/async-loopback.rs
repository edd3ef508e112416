//! Drive an in-process fake bridge with the async connection.
//!
//! Run with:
//!   cargo run --example async-loopback --features async
//!
//! The fake bridge dribbles each reply out a few bytes at a time to show
//! frames being reassembled across reads.

use std::time::Duration;

use afelink::rpc::{params, AsyncConnection, ConnectionConfig};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

async fn fake_bridge(mut wire: DuplexStream) -> std::io::Result<()> {
    let mut register = 0u32;
    let mut buf = [0u8; 512];
    loop {
        let n = wire.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let Ok(req) = serde_json::from_slice::<Value>(&buf[..n]) else {
            continue;
        };
        let result = match req["method"].as_str() {
            Some("wr") => {
                register = req["params"]["data"].as_u64().unwrap_or(0) as u32;
                json!("done")
            }
            Some("rd") => json!(register),
            _ => json!(null),
        };
        let reply = json!({"id": req["id"], "result": result}).to_string();
        for piece in reply.as_bytes().chunks(7) {
            wire.write_all(piece).await?;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host, bridge) = tokio::io::duplex(1024);
    tokio::spawn(fake_bridge(bridge));

    let mut conn = AsyncConnection::open_with_config(
        host,
        ConnectionConfig {
            response_timeout: Duration::from_millis(500),
            ..ConnectionConfig::default()
        },
    );

    // -1 goes out as 0xffffffff.
    conn.exchange_request("wr", params([("address", 0x2230), ("data", -1)]), None)
        .await?;
    let resp = conn
        .exchange_request("rd", params([("address", 0x2230)]), None)
        .await?
        .ok_or("connection closed")?;
    println!("id={} result={:#010x}", resp.id, resp.result.as_u64().unwrap_or(0));
    Ok(())
}
