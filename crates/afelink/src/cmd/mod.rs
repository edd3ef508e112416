use std::time::Duration;

use afelink_rpc::{Connection, ConnectionConfig};
use afelink_transport::{SerialConfig, SerialStream, DEFAULT_BAUD_RATE};
use clap::{Args, Subcommand};
use tracing::debug;

use crate::exit::{rpc_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod call;
pub mod ports;
pub mod register;
pub mod selftest;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read a register.
    Rd(RdArgs),
    /// Write a register.
    Wr(WrArgs),
    /// Set bits in a register.
    SetBits(BitsArgs),
    /// Clear bits in a register.
    ClrBits(BitsArgs),
    /// Replace the masked bits of a register.
    WrMask(WrMaskArgs),
    /// Read words from the data FIFO.
    RdFifo(RdFifoArgs),
    /// Poll a register until any bit of a mask is set.
    Poll(PollArgs),
    /// Reset the AFE.
    Reset,
    /// Send an arbitrary request and print the response.
    Call(CallArgs),
    /// Run register read/write and bit-operation checks against the device.
    Selftest(SelftestArgs),
    /// List serial ports.
    Ports,
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Rd(args) => register::rd(args, link, format),
        Command::Wr(args) => register::wr(args, link, format),
        Command::SetBits(args) => register::set_bits(args, link, format),
        Command::ClrBits(args) => register::clr_bits(args, link, format),
        Command::WrMask(args) => register::wr_mask(args, link, format),
        Command::RdFifo(args) => register::rd_fifo(args, link, format),
        Command::Poll(args) => register::poll(args, link, format),
        Command::Reset => register::reset(link, format),
        Command::Call(args) => call::run(args, link, format),
        Command::Selftest(args) => selftest::run(args, link, format),
        Command::Ports => ports::run(format),
        Command::Version(args) => version::run(args),
    }
}

/// Serial link options shared by every device command.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Serial device of the bridge (e.g. /dev/ttyACM0, COM3).
    #[arg(long, short = 'p', env = "AFELINK_PORT", global = true)]
    pub port: Option<String>,
    /// Line rate.
    #[arg(long, env = "AFELINK_BAUD", default_value_t = DEFAULT_BAUD_RATE, global = true)]
    pub baud: u32,
    /// Time allowed for each response (e.g. 50ms, 2s).
    #[arg(long, env = "AFELINK_TIMEOUT", default_value = "50ms", global = true)]
    pub timeout: String,
}

impl LinkArgs {
    pub fn connection_config(&self) -> CliResult<ConnectionConfig> {
        Ok(ConnectionConfig {
            response_timeout: parse_duration(&self.timeout)?,
            ..ConnectionConfig::default()
        })
    }

    /// Open the port and drop anything the device sent before we arrived.
    pub fn connect(&self) -> CliResult<Connection<SerialStream>> {
        let Some(path) = self.port.as_deref() else {
            return Err(CliError::usage(
                "no serial port given (use --port or AFELINK_PORT)",
            ));
        };
        let config = self.connection_config()?;
        let serial = SerialConfig {
            path: path.to_string(),
            baud_rate: self.baud,
            timeout: config.response_timeout,
        };

        let stream = afelink_transport::serial::open(&serial)
            .map_err(|err| rpc_error("open failed", err.into()))?;
        let mut conn = Connection::open_with_config(stream, config);
        let dropped = conn.flush_input();
        debug!(dropped, "stale input dropped on open");
        Ok(conn)
    }
}

#[derive(Args, Debug)]
pub struct RdArgs {
    /// Register address (decimal or 0x hex).
    #[arg(value_parser = parse_u32)]
    pub address: u32,
}

#[derive(Args, Debug)]
pub struct WrArgs {
    #[arg(value_parser = parse_u32)]
    pub address: u32,
    #[arg(value_parser = parse_u32)]
    pub data: u32,
}

#[derive(Args, Debug)]
pub struct BitsArgs {
    #[arg(value_parser = parse_u32)]
    pub address: u32,
    /// Bits to set or clear.
    #[arg(value_parser = parse_u32)]
    pub bits: u32,
}

#[derive(Args, Debug)]
pub struct WrMaskArgs {
    #[arg(value_parser = parse_u32)]
    pub address: u32,
    #[arg(value_parser = parse_u32)]
    pub mask: u32,
    #[arg(value_parser = parse_u32)]
    pub data: u32,
}

#[derive(Args, Debug)]
pub struct RdFifoArgs {
    /// Number of words to read.
    #[arg(value_parser = parse_u32)]
    pub count: u32,
}

#[derive(Args, Debug)]
pub struct PollArgs {
    #[arg(value_parser = parse_u32)]
    pub address: u32,
    /// Stop when any of these bits is set.
    #[arg(long, value_parser = parse_u32)]
    pub mask: u32,
    /// Maximum number of reads.
    #[arg(long, default_value_t = 100)]
    pub attempts: u32,
    /// Overall time limit (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub within: String,
    /// Pause between reads (e.g. 10ms).
    #[arg(long)]
    pub interval: Option<String>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Method name, e.g. rd, wr, reset.
    pub method: String,
    /// Parameters as a JSON object.
    #[arg(long)]
    pub params: Option<String>,
    /// Use this request id instead of the connection counter.
    #[arg(long)]
    pub id: Option<u64>,
    /// Send address/data/mask exactly as given.
    #[arg(long)]
    pub no_canonicalize: bool,
}

#[derive(Args, Debug)]
pub struct SelftestArgs {
    /// Scratch register to exercise.
    #[arg(long, value_parser = parse_u32, default_value = "0x2230")]
    pub address: u32,
    /// Random write/read-back rounds on top of the fixed patterns.
    #[arg(long, default_value_t = 50)]
    pub iterations: u32,
    /// Reset the AFE before testing.
    #[arg(long)]
    pub reset: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a register word: decimal, or hex with a `0x` prefix.
pub fn parse_u32(input: &str) -> Result<u32, String> {
    let input = input.trim().replace('_', "");
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid 32-bit value {input:?}: {err}"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_u32_hex_and_decimal() {
        assert_eq!(parse_u32("0x2230").unwrap(), 0x2230);
        assert_eq!(parse_u32("0XFFFFFFFF").unwrap(), u32::MAX);
        assert_eq!(parse_u32("8752").unwrap(), 8752);
        assert_eq!(parse_u32("0x8000_0000").unwrap(), 0x8000_0000);
    }

    #[test]
    fn parse_u32_rejects_out_of_range() {
        assert!(parse_u32("0x1_0000_0000").is_err());
        assert!(parse_u32("-1").is_err());
        assert!(parse_u32("zz").is_err());
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("50ms").unwrap(), Duration::from_millis(50));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0ms").is_err());
        assert!(parse_duration("fast").is_err());
    }

    #[test]
    fn connect_without_port_is_usage_error() {
        let link = LinkArgs {
            port: None,
            baud: DEFAULT_BAUD_RATE,
            timeout: "50ms".into(),
        };
        let err = link.connect().unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }
}
