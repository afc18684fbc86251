use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("docklink {}", env!("CARGO_PKG_VERSION"));
    if args.extended {
        println!("protocol version {}", docklink_pipe::PROTOCOL_VERSION);
        println!(
            "minimum peer version {}",
            docklink_pipe::MINIMUM_PROTOCOL_VERSION
        );
        println!("nsof stream version {}", docklink_nsof::tags::VERSION);
    }
    Ok(SUCCESS)
}
