use afelink_rpc::PollConfig;

use crate::cmd::{
    parse_duration, BitsArgs, LinkArgs, PollArgs, RdArgs, RdFifoArgs, WrArgs, WrMaskArgs,
};
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::{print_ack, print_register, print_words, OutputFormat};

pub fn rd(args: RdArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = link.connect()?;
    let value = afelink_rpc::read_register(&mut conn, args.address)
        .map_err(|err| rpc_error("rd failed", err))?;
    print_register(args.address, value, format);
    Ok(SUCCESS)
}

pub fn wr(args: WrArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = link.connect()?;
    afelink_rpc::write_register(&mut conn, args.address, args.data)
        .map_err(|err| rpc_error("wr failed", err))?;
    print_ack("wr", Some(args.address), format);
    Ok(SUCCESS)
}

pub fn set_bits(args: BitsArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = link.connect()?;
    afelink_rpc::set_bits(&mut conn, args.address, args.bits)
        .map_err(|err| rpc_error("set_bits failed", err))?;
    print_ack("set_bits", Some(args.address), format);
    Ok(SUCCESS)
}

pub fn clr_bits(args: BitsArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = link.connect()?;
    afelink_rpc::clear_bits(&mut conn, args.address, args.bits)
        .map_err(|err| rpc_error("clr_bits failed", err))?;
    print_ack("clr_bits", Some(args.address), format);
    Ok(SUCCESS)
}

pub fn wr_mask(args: WrMaskArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = link.connect()?;
    afelink_rpc::write_masked(&mut conn, args.address, args.mask, args.data)
        .map_err(|err| rpc_error("wr_mask failed", err))?;
    print_ack("wr_mask", Some(args.address), format);
    Ok(SUCCESS)
}

pub fn rd_fifo(args: RdFifoArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = link.connect()?;
    let words = afelink_rpc::read_fifo(&mut conn, args.count)
        .map_err(|err| rpc_error("rd_fifo failed", err))?;
    print_words(&words, format);
    Ok(SUCCESS)
}

pub fn poll(args: PollArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let config = PollConfig {
        max_attempts: args.attempts,
        timeout: parse_duration(&args.within)?,
        interval: match args.interval.as_deref() {
            Some(interval) => parse_duration(interval)?,
            None => PollConfig::default().interval,
        },
    };
    let mut conn = link.connect()?;
    let value = afelink_rpc::poll_register(&mut conn, args.address, args.mask, &config)
        .map_err(|err| rpc_error("poll failed", err))?;
    print_register(args.address, value, format);
    Ok(SUCCESS)
}

pub fn reset(link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = link.connect()?;
    afelink_rpc::reset(&mut conn).map_err(|err| rpc_error("reset failed", err))?;
    print_ack("reset", None, format);
    Ok(SUCCESS)
}
