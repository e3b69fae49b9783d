use streamframe_frame::{DEFAULT_MAX_PAYLOAD, PREFIX_SIZE};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("streamframe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: streamframe");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("STREAMFRAME_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("prefix_size: {PREFIX_SIZE}");
    println!("default_max_frame_size: {DEFAULT_MAX_PAYLOAD}");
    println!(
        "features: conn={}, async={}, cli=true",
        cfg!(feature = "conn"),
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}
