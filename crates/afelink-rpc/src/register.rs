//! Register-level operations on top of [`Exchange`].
//!
//! Method names match the bridge firmware: `rd`, `wr`, `set_bits`,
//! `clr_bits`, `wr_mask`, `rd_fifo`, `reset`. Write-type commands answer
//! `"done"`. Against a closed connection, writes are skipped (the skip is
//! logged) while reads fail with [`RpcError::PortClosed`], since there is no
//! value to return.

use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::canonical::to_wire_u32;
use crate::connection::Exchange;
use crate::envelope::{params, Params};
use crate::error::{Result, RpcError};

/// Result string the bridge sends for completed write-type commands.
pub const DONE: &str = "done";

/// Limits for [`poll_register`].
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Give up after this many reads. Default: 100.
    pub max_attempts: u32,
    /// Give up once this much time has passed. Default: 1 s.
    pub timeout: Duration,
    /// Pause between reads. Default: none.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            timeout: Duration::from_secs(1),
            interval: Duration::ZERO,
        }
    }
}

/// Reset the AFE.
pub fn reset<E: Exchange + ?Sized>(link: &mut E) -> Result<()> {
    command(link, "reset", Params::new())
}

/// Read one 32-bit register.
pub fn read_register<E: Exchange + ?Sized>(link: &mut E, address: u32) -> Result<u32> {
    let result = query(link, "rd", params([("address", address)]))?;
    let word = result
        .as_number()
        .and_then(|_| to_wire_u32(&result))
        .ok_or(RpcError::UnexpectedResult {
            expected: "a number",
            got: result.clone(),
        })?;
    debug!(
        address = format_args!("{address:#06x}"),
        value = format_args!("{word:#010x}"),
        "register read"
    );
    Ok(word)
}

/// Overwrite one register.
pub fn write_register<E: Exchange + ?Sized>(link: &mut E, address: u32, data: u32) -> Result<()> {
    command(link, "wr", params([("address", address), ("data", data)]))
}

/// OR `bits` into a register.
pub fn set_bits<E: Exchange + ?Sized>(link: &mut E, address: u32, bits: u32) -> Result<()> {
    command(link, "set_bits", params([("address", address), ("data", bits)]))
}

/// Clear `bits` in a register.
pub fn clear_bits<E: Exchange + ?Sized>(link: &mut E, address: u32, bits: u32) -> Result<()> {
    command(link, "clr_bits", params([("address", address), ("data", bits)]))
}

/// Replace the bits selected by `mask` with the matching bits of `data`.
pub fn write_masked<E: Exchange + ?Sized>(
    link: &mut E,
    address: u32,
    mask: u32,
    data: u32,
) -> Result<()> {
    command(
        link,
        "wr_mask",
        params([("address", address), ("mask", mask), ("data", data)]),
    )
}

/// Read up to `count` words from the data FIFO.
///
/// Extra words are dropped; entries that are not numbers read as 0.
pub fn read_fifo<E: Exchange + ?Sized>(link: &mut E, count: u32) -> Result<Vec<u32>> {
    let result = query(link, "rd_fifo", params([("readcount", count)]))?;
    let Value::Array(items) = result else {
        return Err(RpcError::UnexpectedResult {
            expected: "an array",
            got: result,
        });
    };
    if items.len() > count as usize {
        warn!(asked = count, got = items.len(), "FIFO returned extra words");
    }
    Ok(items
        .iter()
        .take(count as usize)
        .map(|item| match item {
            Value::Number(_) => to_wire_u32(item).unwrap_or(0),
            _ => 0,
        })
        .collect())
}

/// Read `address` until `value & mask` is non-zero.
///
/// Bounded by both `config.max_attempts` and `config.timeout`; returns the
/// first value with a bit of `mask` set.
pub fn poll_register<E: Exchange + ?Sized>(
    link: &mut E,
    address: u32,
    mask: u32,
    config: &PollConfig,
) -> Result<u32> {
    let started = Instant::now();
    let mut attempts = 0u32;

    while attempts < config.max_attempts {
        attempts += 1;
        let value = read_register(link, address)?;
        if value & mask != 0 {
            debug!(address = format_args!("{address:#06x}"), attempts, "register ready");
            return Ok(value);
        }
        if started.elapsed() >= config.timeout {
            break;
        }
        if !config.interval.is_zero() {
            std::thread::sleep(config.interval);
        }
    }

    warn!(
        address = format_args!("{address:#06x}"),
        mask = format_args!("{mask:#010x}"),
        attempts,
        "register poll gave up"
    );
    Err(RpcError::PollExhausted { address, attempts })
}

fn query<E: Exchange + ?Sized>(link: &mut E, method: &str, params: Params) -> Result<Value> {
    match link.exchange_request(method, params, None)? {
        Some(response) => Ok(response.result),
        None => Err(RpcError::PortClosed),
    }
}

fn command<E: Exchange + ?Sized>(link: &mut E, method: &str, params: Params) -> Result<()> {
    let Some(response) = link.exchange_request(method, params, None)? else {
        return Ok(());
    };
    if response.result.as_str() == Some(DONE) {
        Ok(())
    } else {
        warn!(method, result = %response.result, "command not acknowledged");
        Err(RpcError::UnexpectedResult {
            expected: "\"done\"",
            got: response.result,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use afelink_transport::{ScriptedSource, Step};
    use serde_json::json;

    use super::*;
    use crate::connection::Connection;

    type Registers = Arc<Mutex<HashMap<u32, u32>>>;

    /// A bridge that keeps a register file and answers like the firmware.
    fn fake_bridge(registers: Registers) -> ScriptedSource {
        ScriptedSource::with_responder(move |req| {
            let req: Value = serde_json::from_slice(req).unwrap();
            let id = req["id"].clone();
            let p = &req["params"];
            let word = |key: &str| p[key].as_u64().unwrap_or(0) as u32;
            let mut regs = registers.lock().unwrap();

            let result = match req["method"].as_str().unwrap() {
                "reset" => {
                    regs.clear();
                    json!(DONE)
                }
                "rd" => json!(regs.get(&word("address")).copied().unwrap_or(0)),
                "wr" => {
                    regs.insert(word("address"), word("data"));
                    json!(DONE)
                }
                "set_bits" => {
                    *regs.entry(word("address")).or_default() |= word("data");
                    json!(DONE)
                }
                "clr_bits" => {
                    *regs.entry(word("address")).or_default() &= !word("data");
                    json!(DONE)
                }
                "wr_mask" => {
                    let reg = regs.entry(word("address")).or_default();
                    *reg = (*reg & !word("mask")) | (word("data") & word("mask"));
                    json!(DONE)
                }
                "rd_fifo" => json!((0..word("readcount")).collect::<Vec<_>>()),
                other => {
                    return vec![Step::data(
                        json!({"id": id, "error": format!("unknown method {other}")}).to_string(),
                    )]
                }
            };
            vec![Step::data(json!({"id": id, "result": result}).to_string())]
        })
    }

    fn bridge() -> (Connection<ScriptedSource>, Registers) {
        let regs = Registers::default();
        (Connection::open(fake_bridge(Arc::clone(&regs))), regs)
    }

    const CALDATLOCK: u32 = 0x2230;

    #[test]
    fn write_then_read_back_full_words() {
        let (mut conn, _) = bridge();
        for value in [0u32, 1, 0x8000_0000, 0xDEAD_BEEF, u32::MAX] {
            write_register(&mut conn, CALDATLOCK, value).unwrap();
            assert_eq!(read_register(&mut conn, CALDATLOCK).unwrap(), value);
        }
    }

    #[test]
    fn set_and_clear_bits() {
        let (mut conn, _) = bridge();

        write_register(&mut conn, CALDATLOCK, 0).unwrap();
        set_bits(&mut conn, CALDATLOCK, 0x8000_0000).unwrap();
        assert_eq!(read_register(&mut conn, CALDATLOCK).unwrap(), 0x8000_0000);

        write_register(&mut conn, CALDATLOCK, u32::MAX).unwrap();
        clear_bits(&mut conn, CALDATLOCK, 0x1).unwrap();
        assert_eq!(read_register(&mut conn, CALDATLOCK).unwrap(), 0xFFFF_FFFE);

        clear_bits(&mut conn, CALDATLOCK, 0x1).unwrap();
        assert_eq!(read_register(&mut conn, CALDATLOCK).unwrap(), 0xFFFF_FFFE);
    }

    #[test]
    fn masked_write_touches_only_masked_bits() {
        let (mut conn, _) = bridge();
        write_register(&mut conn, 0x2000, 0xFFFF_0000).unwrap();
        write_masked(&mut conn, 0x2000, 0x0000_FF00, 0x1234_5678).unwrap();
        assert_eq!(read_register(&mut conn, 0x2000).unwrap(), 0xFFFF_5600);
    }

    #[test]
    fn fifo_read_is_truncated_to_count() {
        let (mut conn, _) = bridge();
        assert_eq!(read_fifo(&mut conn, 4).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn fifo_non_numbers_read_as_zero() {
        let mut conn = Connection::open(ScriptedSource::with_steps([Step::data(
            r#"{"id":0,"result":[7,"x",null,9,10]}"#,
        )]));
        assert_eq!(read_fifo(&mut conn, 4).unwrap(), vec![7, 0, 0, 9]);
    }

    #[test]
    fn reset_clears_registers() {
        let (mut conn, regs) = bridge();
        write_register(&mut conn, 1, 5).unwrap();
        reset(&mut conn).unwrap();
        assert!(regs.lock().unwrap().is_empty());
    }

    #[test]
    fn unacknowledged_write_is_an_error() {
        let mut conn = Connection::open(ScriptedSource::with_steps([Step::data(
            r#"{"id":0,"result":"busy"}"#,
        )]));
        assert!(matches!(
            write_register(&mut conn, 1, 2),
            Err(RpcError::UnexpectedResult { .. })
        ));
    }

    #[test]
    fn non_numeric_read_is_an_error() {
        let mut conn = Connection::open(ScriptedSource::with_steps([Step::data(
            r#"{"id":0,"result":"done"}"#,
        )]));
        assert!(matches!(
            read_register(&mut conn, 1),
            Err(RpcError::UnexpectedResult { .. })
        ));
    }

    #[test]
    fn closed_connection_skips_writes_but_fails_reads() {
        let mut conn: Connection<ScriptedSource> = Connection::closed();
        write_register(&mut conn, 1, 2).unwrap();
        assert!(matches!(
            read_register(&mut conn, 1),
            Err(RpcError::PortClosed)
        ));
    }

    #[test]
    fn poll_returns_once_bit_is_set() {
        let mut conn = Connection::open(ScriptedSource::with_steps([
            Step::data(r#"{"id":0,"result":0}"#),
            Step::data(r#"{"id":1,"result":0}"#),
            Step::data(r#"{"id":2,"result":4}"#),
        ]));
        let value = poll_register(&mut conn, 0x0A10, 0x4, &PollConfig::default()).unwrap();
        assert_eq!(value, 4);
        assert_eq!(conn.next_id(), 3);
    }

    #[test]
    fn poll_gives_up_after_max_attempts() {
        let (mut conn, _) = bridge();
        let cfg = PollConfig {
            max_attempts: 5,
            ..PollConfig::default()
        };
        assert!(matches!(
            poll_register(&mut conn, 0x0A10, 0x4, &cfg),
            Err(RpcError::PollExhausted { attempts: 5, .. })
        ));
    }

    #[test]
    fn poll_gives_up_after_timeout() {
        let (mut conn, _) = bridge();
        let cfg = PollConfig {
            max_attempts: u32::MAX,
            timeout: Duration::from_millis(20),
            interval: Duration::from_millis(2),
        };
        let started = Instant::now();
        assert!(matches!(
            poll_register(&mut conn, 0x0A10, 0x4, &cfg),
            Err(RpcError::PollExhausted { .. })
        ));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn unknown_method_surfaces_device_error() {
        let (mut conn, _) = bridge();
        let err = conn
            .exchange_request("bogus", Params::new(), None)
            .unwrap_err();
        assert!(matches!(err, RpcError::PeerError(_)));
    }
}
