//! Building per-platform toolchains for Go releases older than 1.5, which
//! cannot cross compile out of the box.

use crate::cancel::CancelToken;
use crate::config::BuildConfig;
use crate::dispatch::worker_pool;
use crate::platform::{self, Platform, supported_platforms};
use crate::results::{AggregateError, BuildResults};
use crate::toolchain::Toolchain;
use anyhow::{Context, Result, anyhow};
use console::style;
use rayon::prelude::*;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

/// First release that cross compiles without a bootstrapped toolchain.
pub const NATIVE_CROSS_COMPILE: (u32, u32) = (1, 5);

/// Every platform builds inside the same GOROOT source tree, so only one
/// build may run at a time.
const TOOLCHAIN_PARALLELISM: usize = 1;

/// Entry point for `-build-toolchain`.
pub fn build_toolchain<T: Toolchain + ?Sized>(
    toolchain: &T,
    config: &BuildConfig,
    cancel: &CancelToken,
) -> Result<()> {
    let version = toolchain.version().context("error reading Go version")?;
    let version_parts = platform::version_parts(&version).context("error reading Go version")?;
    if version_parts >= NATIVE_CROSS_COMPILE {
        println!("-build-toolchain is no longer required for Go 1.5 or later.");
        println!("You can start using gox immediately!");
        return Ok(());
    }

    let root = toolchain.root().context("error finding GOROOT")?;

    if config.stream_output {
        println!("Verbose mode enabled. Output from building each toolchain will be");
        println!("outputted to stdout as they are built.\n");
    }

    let platforms = config.filter.resolve(&supported_platforms(&version));

    if config.parallel > TOOLCHAIN_PARALLELISM {
        println!("The toolchain build can't be parallelized because compiling a single");
        println!("Go source directory can only be done for one platform at a time. Therefore,");
        println!("the toolchain for each platform will be built one at a time.\n");
    }

    ToolchainBootstrap::new(&root)
        .stream_output(config.stream_output)
        .with_cancel(cancel.clone())
        .run(&platforms)
}

/// Runs GOROOT's `make` script once per platform.
pub struct ToolchainBootstrap {
    script_dir: PathBuf,
    script: PathBuf,
    stream_output: bool,
    cancel: CancelToken,
}

fn script_name() -> &'static str {
    if cfg!(windows) { "make.bat" } else { "make.bash" }
}

impl ToolchainBootstrap {
    pub fn new(root: &Path) -> Self {
        let script_dir = root.join("src");
        let script = script_dir.join(script_name());
        ToolchainBootstrap {
            script_dir,
            script,
            stream_output: false,
            cancel: CancelToken::new(),
        }
    }

    /// Echo each output line as `<platform>: <line>` while the script runs.
    pub fn stream_output(mut self, stream_output: bool) -> Self {
        self.stream_output = stream_output;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Builds every platform, one at a time, and reports all failures
    /// together as an [`AggregateError`].
    pub fn run(&self, platforms: &[Platform]) -> Result<()> {
        let pool = worker_pool(TOOLCHAIN_PARALLELISM)?;
        let results = BuildResults::new();

        pool.install(|| {
            platforms.par_iter().for_each(|platform| {
                if self.cancel.is_cancelled() {
                    results.push_error(platform, "build cancelled");
                } else if let Err(e) = self.build_platform(platform) {
                    results.push_error(platform, format!("{e:#}"));
                }
            });
        });

        let (_, errors) = results.into_parts();
        match AggregateError::from_errors(errors) {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    fn build_platform(&self, platform: &Platform) -> Result<()> {
        println!("{} Toolchain: {platform}", style("-->").cyan());

        let mut child = Command::new(&self.script)
            .arg("--no-clean")
            .current_dir(&self.script_dir)
            .env("GOOS", &platform.os)
            .env("GOARCH", &platform.arch)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| anyhow!("Error building '{platform}': {e}"))?;

        let stdout = child.stdout.take().context("stdout was not captured")?;
        let stderr = child.stderr.take().context("stderr was not captured")?;
        let prefix = self.stream_output.then(|| platform.to_string());

        // Both readers are joined before leaving the scope, so every line has
        // been drained and echoed by the time the status is inspected.
        let (status, stdout, stderr) = thread::scope(|scope| {
            let stdout = scope.spawn(|| drain(stdout, prefix.as_deref()));
            let stderr = scope.spawn(|| drain(stderr, prefix.as_deref()));
            let status = child.wait();
            (status, join_reader(stdout), join_reader(stderr))
        });

        let status = status.with_context(|| format!("Error building '{platform}'"))?;
        if !status.success() {
            return Err(anyhow!(
                "Error building '{platform}'.\n\nStdout: {}\n\nStderr: {}\n",
                stdout?,
                stderr?
            ));
        }
        Ok(())
    }
}

fn join_reader(handle: thread::ScopedJoinHandle<'_, io::Result<String>>) -> Result<String> {
    match handle.join() {
        Ok(output) => Ok(output?),
        Err(_) => Err(anyhow!("output reader panicked")),
    }
}

/// Reads `reader` to end-of-stream line by line, echoing each line with
/// `prefix` when one is given, and returns everything read.
///
/// A read error stops the capture but not the reading: the rest of the
/// stream is discarded so the writing process never blocks on a full pipe.
fn drain(reader: impl Read, prefix: Option<&str>) -> io::Result<String> {
    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                let _ = io::copy(&mut reader, &mut io::sink());
                return Err(e);
            }
        }
        let text = String::from_utf8_lossy(&line);
        if let Some(prefix) = prefix {
            println!("{prefix}: {}", text.trim_end_matches(['\n', '\r']));
        }
        captured.push_str(&text);
    }
    Ok(captured)
}
