use std::time::Instant;

use afelink_rpc::{clear_bits, read_register, set_bits, write_register, Exchange, RpcError};
use serde::Serialize;
use tracing::{info, warn};

use crate::cmd::{LinkArgs, SelftestArgs};
use crate::exit::{rpc_error, CliResult, FAILURE, SUCCESS};
use crate::output::{hex_address, hex_word, print_json, print_table, OutputFormat};

/// Fixed write/read-back patterns, run before the random rounds.
const PATTERNS: [u32; 11] = [
    0xFFFF_FFFF,
    0x0000_0001,
    0x7FFF_FFFF,
    0xAAAA_AAAA,
    0x5555_5555,
    0x1234_5678,
    0x8765_4321,
    0x0904_0ADF,
    0xDEAD_BEAF,
    0x0000_0000,
    0x4000_0000,
];

#[derive(Clone, Copy, Debug)]
enum BitOp {
    Set,
    Clear,
}

/// (name, starting value, operation, bits, expected value)
const BIT_CASES: [(&str, u32, BitOp, u32, u32); 6] = [
    ("set bit 0", 0, BitOp::Set, 0x1, 0x1),
    ("set bit 31", 0, BitOp::Set, 0x8000_0000, 0x8000_0000),
    ("clear bit 0", u32::MAX, BitOp::Clear, 0x1, 0xFFFF_FFFE),
    ("clear bit 31", u32::MAX, BitOp::Clear, 0x8000_0000, 0x7FFF_FFFF),
    ("set already-set bit", 0x1, BitOp::Set, 0x1, 0x1),
    ("clear already-clear bit", 0xFFFF_FFFE, BitOp::Clear, 0x1, 0xFFFF_FFFE),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

#[derive(Debug, Serialize)]
struct SelftestOutput {
    address: String,
    checks: Vec<CheckResult>,
    elapsed_ms: u64,
    overall: &'static str,
}

pub fn run(args: SelftestArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = link.connect()?;
    if args.reset {
        afelink_rpc::reset(&mut conn).map_err(|err| rpc_error("reset failed", err))?;
        conn.flush_input();
    }

    let started = Instant::now();
    let random = (0..args.iterations).map(|_| rand::random::<u32>() | 0x8000_0000);
    let mut checks = round_trips(&mut conn, args.address, PATTERNS.into_iter().chain(random));
    checks.extend(bit_checks(&mut conn, args.address));
    let elapsed = started.elapsed();

    let failed = checks.iter().filter(|c| c.status == CheckStatus::Fail).count();
    info!(
        checks = checks.len(),
        failed,
        elapsed_ms = elapsed.as_millis() as u64,
        "selftest finished"
    );

    let output = SelftestOutput {
        address: hex_address(args.address),
        checks,
        elapsed_ms: elapsed.as_millis() as u64,
        overall: if failed == 0 { "pass" } else { "fail" },
    };
    print_selftest(&output, format);

    Ok(if failed == 0 { SUCCESS } else { FAILURE })
}

fn round_trips<E: Exchange + ?Sized>(
    link: &mut E,
    address: u32,
    values: impl IntoIterator<Item = u32>,
) -> Vec<CheckResult> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let name = format!("write/read {}", i + 1);
            let outcome =
                write_register(link, address, value).and_then(|()| read_register(link, address));
            judge(name, value, outcome)
        })
        .collect()
}

fn bit_checks<E: Exchange + ?Sized>(link: &mut E, address: u32) -> Vec<CheckResult> {
    BIT_CASES
        .iter()
        .map(|&(name, start, op, bits, expected)| {
            let outcome = write_register(link, address, start)
                .and_then(|()| match op {
                    BitOp::Set => set_bits(link, address, bits),
                    BitOp::Clear => clear_bits(link, address, bits),
                })
                .and_then(|()| read_register(link, address));
            judge(name.to_string(), expected, outcome)
        })
        .collect()
}

fn judge(name: String, expected: u32, outcome: Result<u32, RpcError>) -> CheckResult {
    let (status, detail) = match outcome {
        Ok(got) if got == expected => (
            CheckStatus::Pass,
            format!("wrote {}, read {}", hex_word(expected), hex_word(got)),
        ),
        Ok(got) => (
            CheckStatus::Fail,
            format!("expected {}, read {}", hex_word(expected), hex_word(got)),
        ),
        Err(err) => (CheckStatus::Fail, err.to_string()),
    };
    if status == CheckStatus::Fail {
        warn!(check = %name, %detail, "selftest check failed");
    }
    CheckResult {
        name,
        status,
        detail,
    }
}

fn print_selftest(output: &SelftestOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table => {
            print_table(
                vec!["CHECK", "STATUS", "DETAIL"],
                output
                    .checks
                    .iter()
                    .map(|c| {
                        vec![
                            c.name.clone(),
                            status_label(c.status).to_string(),
                            c.detail.clone(),
                        ]
                    })
                    .collect(),
            );
            println!("overall: {} ({} ms)", output.overall, output.elapsed_ms);
        }
        OutputFormat::Pretty => {
            println!("afelink selftest on {}\n", output.address);
            for c in &output.checks {
                println!("  [{}] {}: {}", status_label(c.status), c.name, c.detail);
            }
            println!("\noverall: {} ({} ms)", output.overall, output.elapsed_ms);
        }
    }
}

fn status_label(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
    }
}
