use docklink_nsof::decode_from_slice;

use crate::cmd::DumpArgs;
use crate::exit::{io_error, nsof_error, CliResult, SUCCESS};
use crate::output::{print_value, OutputFormat};

pub fn run(args: DumpArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = std::fs::read(&args.file).map_err(|err| io_error("read failed", err))?;
    let value = decode_from_slice(&bytes).map_err(|err| nsof_error("decode failed", err))?;
    print_value(&value, format);
    Ok(SUCCESS)
}
