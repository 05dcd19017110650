//! Parallel fan-out of one compiler invocation per (platform, package) pair.

use crate::cancel::CancelToken;
use crate::compile::CompileTemplate;
use crate::env_override::EnvSource;
use crate::platform::Platform;
use crate::results::{AggregateError, BuildResults};
use crate::toolchain::Toolchain;
use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::path::Path;

/// A pool whose thread count bounds how many external processes run at once.
pub fn worker_pool(parallel: usize) -> Result<ThreadPool> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(parallel.max(1))
        .thread_name(|i| format!("gox-worker-{i}"))
        .build()?;
    Ok(pool)
}

/// Outcome of a dispatch. When `error` is set, `artifacts` only holds the
/// builds that succeeded.
#[derive(Debug)]
pub struct DispatchReport {
    /// Artifact paths in completion order.
    pub artifacts: Vec<String>,
    pub error: Option<AggregateError>,
}

impl DispatchReport {
    pub fn into_result(self) -> Result<Vec<String>, AggregateError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.artifacts),
        }
    }
}

pub struct Dispatcher<'a, T: Toolchain + ?Sized> {
    toolchain: &'a T,
    template: &'a CompileTemplate,
    parallel: usize,
    env: EnvSource,
    cancel: CancelToken,
    show_progress: bool,
}

impl<'a, T: Toolchain + ?Sized> Dispatcher<'a, T> {
    pub fn new(toolchain: &'a T, template: &'a CompileTemplate, parallel: usize) -> Self {
        Dispatcher {
            toolchain,
            template,
            parallel,
            env: EnvSource::Process,
            cancel: CancelToken::new(),
            show_progress: false,
        }
    }

    pub fn with_env(mut self, env: EnvSource) -> Self {
        self.env = env;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn show_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Builds every package for every platform and waits for all of them.
    /// A failed build never stops its siblings.
    pub fn dispatch(&self, packages: &[String], platforms: &[Platform]) -> Result<DispatchReport> {
        let jobs: Vec<(&Platform, &String)> = platforms
            .iter()
            .flat_map(|platform| packages.iter().map(move |package| (platform, package)))
            .collect();

        let pool = worker_pool(self.parallel)?;
        let progress = self.progress_bar(jobs.len() as u64);
        let results = BuildResults::new();

        // Jobs are pulled from the list one at a time, so they start in
        // platform-major order.
        pool.install(|| {
            jobs.iter()
                .par_bridge()
                .for_each(|(platform, package)| self.build_one(platform, package, &results, &progress));
        });
        progress.finish_and_clear();

        let (artifacts, errors) = results.into_parts();
        log::debug!(
            "Dispatched {} builds: {} succeeded, {} failed",
            jobs.len(),
            artifacts.len(),
            errors.len()
        );
        Ok(DispatchReport {
            artifacts,
            error: AggregateError::from_errors(errors),
        })
    }

    fn build_one(&self, platform: &Platform, package: &str, results: &BuildResults, progress: &ProgressBar) {
        if self.cancel.is_cancelled() {
            results.push_error(platform, "build cancelled");
            progress.inc(1);
            return;
        }

        if self.show_progress {
            announce(&progress_line(platform, package), progress, |line| println!("{line}"));
        }

        let mut opts = self.template.options_for(package, platform);
        opts.apply_env_overrides(&self.env);

        match self.toolchain.compile(&opts) {
            Ok(artifact) => {
                let path = Path::new(package).join(artifact);
                results.push_artifact(path.to_string_lossy().into_owned());
            }
            Err(e) => {
                log::debug!("{platform}: {package} failed");
                results.push_error(platform, format!("{e:#}"));
            }
        }
        progress.inc(1);
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        match ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_bar}") {
            Ok(progress_style) => bar.set_style(progress_style),
            Err(e) => log::debug!("progress template: {e}"),
        }
        bar
    }
}

fn progress_line(platform: &Platform, package: &str) -> String {
    format!("{} {:>15}: {}", style("-->").cyan(), platform.to_string(), package)
}

/// Emits `line` with the bar cleared. A bar drawing to a non-terminal is
/// hidden, and `ProgressBar::println` drops lines on hidden bars.
fn announce(line: &str, progress: &ProgressBar, emit: impl FnOnce(&str)) {
    progress.suspend(|| emit(line));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::tests::FakeToolchain;
    use std::time::Duration;

    fn platforms(pairs: &[&str]) -> Vec<Platform> {
        pairs.iter().map(|p| p.parse().unwrap()).collect()
    }

    fn packages(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn one_failure_out_of_six() {
        let toolchain = FakeToolchain::new("go1.8", &[]).failing_on("darwin/amd64");
        let template = CompileTemplate::default();
        let report = Dispatcher::new(&toolchain, &template, 2)
            .dispatch(
                &packages(&["acme/tool", "acme/other"]),
                &platforms(&["linux/amd64", "linux/386", "darwin/amd64"]),
            )
            .unwrap();

        assert_eq!(toolchain.calls(), 6);
        assert_eq!(report.artifacts.len(), 4);
        let error = report.error.expect("a build failed");
        assert_eq!(error.len(), 2);
        assert!(error.errors().iter().all(|e| e.starts_with("darwin/amd64: ")));
    }

    #[test]
    fn single_failing_invocation_is_reported_once() {
        struct FailOnce(FakeToolchain);

        impl Toolchain for FailOnce {
            fn version(&self) -> Result<String> {
                self.0.version()
            }
            fn root(&self) -> Result<std::path::PathBuf> {
                self.0.root()
            }
            fn main_dirs(&self, packages: &[String]) -> Result<Vec<String>> {
                self.0.main_dirs(packages)
            }
            fn compile(&self, opts: &crate::compile::CompileOptions) -> Result<String> {
                let artifact = self.0.compile(opts)?;
                if opts.platform.os == "darwin" && opts.package_path == "acme/other" {
                    anyhow::bail!("undefined: main");
                }
                Ok(artifact)
            }
        }

        let toolchain = FailOnce(FakeToolchain::new("go1.8", &[]));
        let template = CompileTemplate::default();
        let report = Dispatcher::new(&toolchain, &template, 2)
            .dispatch(
                &packages(&["acme/tool", "acme/other"]),
                &platforms(&["linux/amd64", "linux/386", "darwin/amd64"]),
            )
            .unwrap();

        assert_eq!(report.artifacts.len(), 5);
        let error = report.error.expect("a build failed");
        assert_eq!(error.errors(), ["darwin/amd64: undefined: main"]);
    }

    #[test]
    fn never_exceeds_parallelism() {
        let toolchain = FakeToolchain::new("go1.8", &[]).with_delay(Duration::from_millis(20));
        let template = CompileTemplate::default();
        let report = Dispatcher::new(&toolchain, &template, 2)
            .dispatch(
                &packages(&["a", "b", "c"]),
                &platforms(&["linux/amd64", "linux/386", "darwin/amd64"]),
            )
            .unwrap();

        assert_eq!(report.artifacts.len(), 9);
        let peak = toolchain.max_in_flight.load(std::sync::atomic::Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak concurrency was {peak}");
    }

    #[test]
    fn jobs_start_in_platform_order() {
        let toolchain = FakeToolchain::new("go1.8", &[]).with_delay(Duration::from_millis(50));
        let template = CompileTemplate::default();
        let targets = platforms(&["linux/386", "linux/amd64", "darwin/386", "darwin/amd64"]);
        Dispatcher::new(&toolchain, &template, 2)
            .dispatch(&packages(&["tool"]), &targets)
            .unwrap();

        let started = toolchain.started.lock().unwrap();
        assert_eq!(started.len(), 4);
        let mut first_wave = started[..2].to_vec();
        first_wave.sort();
        let mut expected = targets[..2].to_vec();
        expected.sort();
        assert_eq!(first_wave, expected, "start order was {started:?}");
    }

    #[test]
    fn progress_lines_are_emitted_through_hidden_bars() {
        let line = progress_line(&Platform::new("linux", "arm"), "acme/tool");
        assert!(line.ends_with("      linux/arm: acme/tool"), "{line}");

        for bar in [
            ProgressBar::hidden(),
            ProgressBar::with_draw_target(Some(3), indicatif::ProgressDrawTarget::hidden()),
        ] {
            let mut emitted = Vec::new();
            announce(&line, &bar, |l| emitted.push(l.to_string()));
            assert_eq!(emitted, vec![line.clone()]);
        }
    }

    #[test]
    fn serial_dispatch_runs_one_at_a_time() {
        let toolchain = FakeToolchain::new("go1.8", &[]).with_delay(Duration::from_millis(5));
        let template = CompileTemplate::default();
        Dispatcher::new(&toolchain, &template, 1)
            .dispatch(&packages(&["a", "b"]), &platforms(&["linux/amd64", "linux/arm"]))
            .unwrap();
        assert_eq!(toolchain.max_in_flight.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn artifacts_are_joined_to_their_package() {
        let toolchain = FakeToolchain::new("go1.8", &[]);
        let template = CompileTemplate::default();
        let report = Dispatcher::new(&toolchain, &template, 4)
            .dispatch(&packages(&["acme/tool"]), &platforms(&["windows/386"]))
            .unwrap();
        let artifacts = report.into_result().unwrap();
        assert_eq!(
            artifacts,
            vec![Path::new("acme/tool").join("tool_windows_386.exe").to_string_lossy().into_owned()]
        );
    }

    #[test]
    fn env_overrides_reach_each_invocation() {
        let toolchain = FakeToolchain::new("go1.8", &[]);
        let template = CompileTemplate {
            ldflags: "-X main.v=1".to_string(),
            ..CompileTemplate::default()
        };
        Dispatcher::new(&toolchain, &template, 2)
            .with_env(EnvSource::fixed([("GOX_LINUX_ARM_LDFLAGS", "-s -w")]))
            .dispatch(&packages(&["tool"]), &platforms(&["linux/amd64", "linux/arm"]))
            .unwrap();

        let compiled = toolchain.compiled.lock().unwrap();
        for opts in compiled.iter() {
            let expected = if opts.platform.arch == "arm" { "-s -w" } else { "-X main.v=1" };
            assert_eq!(opts.ldflags, expected);
        }
        assert_eq!(compiled.len(), 2);
    }

    #[test]
    fn cancelled_runs_launch_nothing() {
        let toolchain = FakeToolchain::new("go1.8", &[]);
        let template = CompileTemplate::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = Dispatcher::new(&toolchain, &template, 2)
            .with_cancel(cancel)
            .dispatch(&packages(&["tool"]), &platforms(&["linux/amd64", "linux/arm"]))
            .unwrap();

        assert_eq!(toolchain.calls(), 0);
        assert!(report.artifacts.is_empty());
        assert_eq!(report.error.unwrap().len(), 2);
    }

    #[test]
    fn nothing_to_build_is_not_an_error() {
        let toolchain = FakeToolchain::new("go1.8", &[]);
        let template = CompileTemplate::default();
        let report = Dispatcher::new(&toolchain, &template, 2)
            .dispatch(&[], &platforms(&["linux/amd64"]))
            .unwrap();
        assert!(report.error.is_none());
        assert!(report.artifacts.is_empty());
    }
}
