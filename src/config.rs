use crate::cli::Cli;
use crate::compile::CompileTemplate;
use crate::filter::PlatformFilter;
use anyhow::Result;
use log::LevelFilter;

/// Hosts where a CPU-derived default oversubscribes the machine.
const CAPPED_HOSTS: &[&str] = &["solaris", "illumos"];
const CAPPED_PARALLELISM: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Build,
    BuildToolchain,
    ListPlatforms,
}

/// Settings for one run, built once from the command line.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub mode: Mode,
    pub packages: Vec<String>,
    pub filter: PlatformFilter,
    pub template: CompileTemplate,
    pub parallel: usize,
    /// Echo toolchain build output as it is produced.
    pub stream_output: bool,
    /// Print per-build progress lines.
    pub show_progress: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            mode: Mode::Build,
            packages: vec![".".to_string()],
            filter: PlatformFilter::default(),
            template: CompileTemplate::default(),
            parallel: 1,
            stream_output: false,
            show_progress: false,
        }
    }
}

impl BuildConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut filter = PlatformFilter::default();
        for value in &cli.os {
            filter.add_os(value);
        }
        for value in &cli.arch {
            filter.add_arch(value);
        }
        for value in &cli.osarch {
            filter.add_osarch(value)?;
        }

        let mode = if cli.build_toolchain {
            Mode::BuildToolchain
        } else if cli.osarch_list {
            Mode::ListPlatforms
        } else {
            Mode::Build
        };

        let packages = if cli.packages.is_empty() {
            vec![".".to_string()]
        } else {
            cli.packages.clone()
        };

        let level = cli.verbose.log_level_filter();

        Ok(BuildConfig {
            mode,
            packages,
            filter,
            template: CompileTemplate {
                output: cli.output.clone(),
                ldflags: cli.ldflags.clone(),
                gcflags: cli.gcflags.clone(),
                tags: cli.tags.clone(),
                go_cmd: cli.gocmd.clone(),
                cgo: cli.cgo,
                rebuild: cli.rebuild,
            },
            parallel: resolve_parallelism(cli.parallel, num_cpus::get(), std::env::consts::OS),
            stream_output: level >= LevelFilter::Debug,
            show_progress: level >= LevelFilter::Info,
        })
    }
}

/// Turns the requested parallelism into a worker count.
///
/// Zero or less means one less than the number of CPUs, but at least one.
/// Capped hosts default to, and never exceed, three.
pub fn resolve_parallelism(requested: i64, cpus: usize, host_os: &str) -> usize {
    let capped = CAPPED_HOSTS.contains(&host_os);
    if requested <= 0 {
        if capped {
            return CAPPED_PARALLELISM;
        }
        return if cpus < 2 { 1 } else { cpus - 1 };
    }

    let requested = usize::try_from(requested).unwrap_or(usize::MAX);
    if capped {
        requested.min(CAPPED_PARALLELISM)
    } else {
        requested
    }
}
