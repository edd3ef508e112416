use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::{print_ports, OutputFormat};

pub fn run(format: OutputFormat) -> CliResult<i32> {
    let ports = afelink_transport::available_ports()
        .map_err(|err| rpc_error("port enumeration failed", err.into()))?;
    print_ports(&ports, format);
    Ok(SUCCESS)
}
