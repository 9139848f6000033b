use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("scriptwire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: scriptwire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("SCRIPTWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    let byte_order = if cfg!(target_endian = "little") {
        "little"
    } else {
        "big"
    };
    println!("frame_byte_order: {byte_order}");
    println!("max_payload: {}", scriptwire_frame::DEFAULT_MAX_PAYLOAD);
    println!("features: channel={}, cli=true", cfg!(feature = "channel"));

    Ok(SUCCESS)
}
