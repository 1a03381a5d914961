//! `shadercall` command line tool.
//!
//! ```bash
//! shadercall -I shaders/common shaders/utility/reservoir.wgsl add 1.0 2.0
//! shadercall -I shaders/common shaders/utility/reservoir.wgsl add a=1.0 b=2.0
//! shadercall --list shaders/utility/reservoir.wgsl
//! ```

mod args;

use std::process::ExitCode;

use clap::Parser;
use shadercall::{Arguments, BridgeError, Device, ShaderModule};

use args::CliArgs;

fn run(cli: &CliArgs, arguments: Arguments) -> Result<(), BridgeError> {
    let device = Device::new(cli.device_parameters())?;
    log::info!("Using {} backend", device.backend_name());

    let module = ShaderModule::load(&device, &cli.module)?;

    if cli.list {
        for signature in module.entry_points() {
            println!("{signature}");
        }
        return Ok(());
    }

    let Some(entry) = cli.entry.as_deref() else {
        return Ok(());
    };
    let result = module.invoke_with(entry, arguments)?;
    println!("{result}");
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = CliArgs::parse();
    log::debug!("shadercall v{}", shadercall::VERSION);

    let arguments = cli.call_arguments().unwrap_or_else(|e| e.exit());

    match run(&cli, arguments) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
