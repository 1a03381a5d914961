//! Smoke test for the bridge: loads the sample reservoir module and calls
//! `add` once with positional and once with named arguments.
//!
//! ```bash
//! cargo run -p shadercall-cli --bin debug_invoke
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use shadercall::{BridgeError, Device, DeviceParameters, ShaderModule};

fn run() -> Result<(), BridgeError> {
    let shaders = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../shaders");

    // The module path is relative to the include directory.
    let common = shaders.join("common");
    let params = DeviceParameters::new()
        .with_base_dir(&common)
        .with_include_path(&common);
    let device = Device::new(params)?;

    let module = ShaderModule::load(&device, "../utility/reservoir.wgsl")?;

    let result = module.call("add", [1.0, 2.0])?;
    println!("{result}");

    let result = module.call_named("add", [("a", 1.0), ("b", 2.0)])?;
    println!("{result}");

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
