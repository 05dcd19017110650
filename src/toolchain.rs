//! The external Go toolchain: version and root lookup, package discovery and
//! single-package cross compilation.

use crate::compile::CompileOptions;
use crate::env_override::EnvSource;
use crate::platform::Platform;
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Operations the build needs from a toolchain.
pub trait Toolchain: Sync {
    /// Full version string, e.g. `go1.8.3`.
    fn version(&self) -> Result<String>;

    /// Installation root (`GOROOT`).
    fn root(&self) -> Result<PathBuf>;

    /// Import paths of the `main` packages matched by `packages`.
    fn main_dirs(&self, packages: &[String]) -> Result<Vec<String>>;

    /// Builds one package for one platform and returns the artifact path.
    fn compile(&self, opts: &CompileOptions) -> Result<String>;
}

const VERSION_SOURCE: &str = r#"package main

import (
	"fmt"
	"runtime"
)

func main() { fmt.Print(runtime.Version()) }
"#;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedPackage {
    name: String,
    import_path: String,
}

/// The `go` command (or a replacement given with `-gocmd`) found on `PATH`.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    cmd: String,
    path: PathBuf,
}

impl GoToolchain {
    pub fn locate(cmd: &str) -> Result<Self> {
        let path = which::which(cmd).map_err(|_| anyhow!("{cmd} executable must be on the PATH"))?;
        log::debug!("Using {cmd} at {}", path.display());
        Ok(GoToolchain {
            cmd: cmd.to_string(),
            path,
        })
    }

    fn command(&self) -> Command {
        Command::new(&self.path)
    }
}

/// Runs `command` to completion and returns its stdout; a failed status
/// carries the captured stderr.
fn run_captured(mut command: Command, what: &str) -> Result<String> {
    let output = command
        .output()
        .with_context(|| format!("Could not run {what}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("{}\nStderr: {}", output.status, stderr.trim_end()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn parse_main_dirs(listing: &str) -> Result<Vec<String>> {
    let mut dirs = Vec::new();
    for package in serde_json::Deserializer::from_str(listing).into_iter::<ListedPackage>() {
        let package = package.context("Could not decode package listing")?;
        if package.name == "main" {
            dirs.push(package.import_path);
        }
    }
    Ok(dirs)
}

impl Toolchain for GoToolchain {
    fn version(&self) -> Result<String> {
        // `go run` output is stable across releases, unlike `go version`.
        let dir = tempfile::Builder::new().prefix("gox").tempdir()?;
        let source = dir.path().join("version.go");
        std::fs::write(&source, VERSION_SOURCE)?;

        let mut command = self.command();
        command.arg("run").arg(&source).current_dir(dir.path());
        let version = run_captured(command, &format!("{} run", self.cmd))?;
        Ok(version.trim().to_string())
    }

    fn root(&self) -> Result<PathBuf> {
        let mut command = self.command();
        command.args(["env", "GOROOT"]);
        let root = run_captured(command, &format!("{} env", self.cmd))?;
        Ok(PathBuf::from(root.trim()))
    }

    fn main_dirs(&self, packages: &[String]) -> Result<Vec<String>> {
        let mut command = self.command();
        command.args(["list", "-json"]).args(packages);
        let listing = run_captured(command, &format!("{} list", self.cmd))?;
        parse_main_dirs(&listing)
    }

    fn compile(&self, opts: &CompileOptions) -> Result<String> {
        let output = std::path::absolute(Path::new(&opts.output_path()?))?;
        let cgo = opts.cgo_enabled(&Platform::host(), &EnvSource::Process);
        let (dir, package) = opts.package_location();

        let mut command = Command::new(&opts.go_cmd);
        command
            .args(opts.build_args(&output, package))
            .env("GOOS", &opts.platform.os)
            .env("GOARCH", &opts.platform.arch)
            .env("CGO_ENABLED", if cgo { "1" } else { "0" });
        if let Some(dir) = dir {
            command.current_dir(dir);
        }

        log::debug!("{}: {:?}", opts.platform, command);
        run_captured(command, &format!("{} build", opts.go_cmd))?;
        Ok(output.to_string_lossy().into_owned())
    }
}
