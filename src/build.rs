//! Top-level flows: cross compiling packages and listing platforms.

use crate::bootstrap;
use crate::cancel::CancelToken;
use crate::config::{BuildConfig, Mode};
use crate::dispatch::Dispatcher;
use crate::platform::supported_platforms;
use crate::toolchain::{GoToolchain, Toolchain};
use anyhow::{Context, Result, bail};

pub const NO_VALID_PLATFORMS: &str = "No valid platforms to build for. If you specified a value
for the 'os', 'arch', or 'osarch' flags, make sure you're
using a valid value.";

/// Runs whatever `config.mode` asks for against the toolchain on `PATH`.
/// Returns the built artifact paths (empty for the other modes).
pub fn run(config: &BuildConfig, cancel: &CancelToken) -> Result<Vec<String>> {
    let toolchain = GoToolchain::locate(&config.template.go_cmd)?;
    match config.mode {
        Mode::BuildToolchain => {
            bootstrap::build_toolchain(&toolchain, config, cancel)?;
            Ok(vec![])
        }
        Mode::ListPlatforms => {
            for platform in list_platforms(&toolchain)? {
                println!("{platform}");
            }
            Ok(vec![])
        }
        Mode::Build => cross_compile(&toolchain, config, cancel),
    }
}

/// Every `os/arch` pair the installed toolchain supports.
pub fn list_platforms<T: Toolchain + ?Sized>(toolchain: &T) -> Result<Vec<String>> {
    let version = toolchain.version().context("error reading Go version")?;
    Ok(supported_platforms(&version)
        .iter()
        .map(ToString::to_string)
        .collect())
}

/// Builds every `main` package under `config.packages` for every selected
/// platform. Fails before building anything when no platform is selected.
pub fn cross_compile<T: Toolchain + ?Sized>(
    toolchain: &T,
    config: &BuildConfig,
    cancel: &CancelToken,
) -> Result<Vec<String>> {
    let version = toolchain.version().context("error reading Go version")?;
    log::debug!("Go version: {version}");

    let main_dirs = toolchain
        .main_dirs(&config.packages)
        .context("Error reading packages")?;

    if !config.filter.is_empty() {
        log::debug!("Platform filter: {:?}", config.filter);
    }
    let platforms = config.filter.resolve(&supported_platforms(&version));
    if platforms.is_empty() {
        bail!(NO_VALID_PLATFORMS);
    }

    if config.show_progress {
        println!("Number of parallel builds: {}\n", config.parallel);
    }

    let report = Dispatcher::new(toolchain, &config.template, config.parallel)
        .with_cancel(cancel.clone())
        .show_progress(config.show_progress)
        .dispatch(&main_dirs, &platforms)?;

    Ok(report.into_result()?)
}
