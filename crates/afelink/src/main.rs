mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, LinkArgs};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "afelink", version, about = "Talk to AFE bridge firmware over serial")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(flatten)]
    link: LinkArgs,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, &cli.link, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_register_args() {
        let cli = Cli::try_parse_from([
            "afelink",
            "--port",
            "/dev/ttyACM0",
            "wr-mask",
            "0x2230",
            "0xff00",
            "0x1234",
        ])
        .expect("wr-mask args should parse");

        match cli.command {
            Command::WrMask(args) => {
                assert_eq!(args.address, 0x2230);
                assert_eq!(args.mask, 0xff00);
                assert_eq!(args.data, 0x1234);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.link.port.as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn link_flags_are_global() {
        let cli = Cli::try_parse_from([
            "afelink",
            "rd",
            "0x400",
            "--baud",
            "115200",
            "--timeout",
            "2s",
        ])
        .expect("rd args should parse");
        assert!(matches!(cli.command, Command::Rd(_)));
        assert_eq!(cli.link.baud, 115_200);
        assert_eq!(cli.link.timeout, "2s");
    }

    #[test]
    fn rejects_out_of_range_word() {
        let err = Cli::try_parse_from(["afelink", "wr", "0x400", "0x100000000"])
            .expect_err("33-bit value should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_call_with_params() {
        let cli = Cli::try_parse_from([
            "afelink",
            "call",
            "rd",
            "--params",
            r#"{"address":1024}"#,
            "--id",
            "0",
        ])
        .expect("call args should parse");
        match cli.command {
            Command::Call(args) => {
                assert_eq!(args.method, "rd");
                assert_eq!(args.id, Some(0));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
