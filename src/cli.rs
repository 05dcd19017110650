use crate::compile::{DEFAULT_GO_CMD, DEFAULT_OUTPUT_TEMPLATE};
use clap::{ArgAction, Parser};
use clap_verbosity_flag::{InfoLevel, Verbosity};

const AFTER_HELP: &str = "\
Output path template:

  The output path for the compiled binaries is specified with the --output
  flag. The value may use {{.Dir}}, {{.OS}} and {{.Arch}}; the default is
  \"{{.Dir}}_{{.OS}}_{{.Arch}}\".

Platforms (OS/Arch):

  --os and --arch take space-separated lists of GOOS/GOARCH values. Prefix a
  value with \"!\" to skip it. If a list is made up of only negations, the
  negations are taken out of the full supported list.

  --osarch takes complete os/arch pairs such as \"darwin/amd64\", also
  negatable with \"!\". It has the highest precedence: a listed pair is built
  even if its OS or Arch is negated in --os or --arch.

Platform overrides:

  --gcflags and --ldflags can be overridden per platform with environment
  variables of the form:

    GOX_[OS]_[ARCH]_GCFLAGS
    GOX_[OS]_[ARCH]_LDFLAGS

Single-dash spellings (-os, -osarch=linux/arm, -build-toolchain, ...) are
accepted as well.";

/// Cross-compiles Go applications in parallel.
///
/// Without --os, --arch or --osarch, builds for every pair supported by the
/// installed Go version.
#[derive(Parser, Debug)]
#[command(version, after_help = AFTER_HELP)]
pub struct Cli {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Space-separated list of operating systems to build for
    #[arg(long, value_name = "OS", action = ArgAction::Append)]
    pub os: Vec<String>,

    /// Space-separated list of architectures to build for
    #[arg(long, value_name = "ARCH", action = ArgAction::Append)]
    pub arch: Vec<String>,

    /// Space-separated list of os/arch pairs to build for
    #[arg(long, value_name = "OS/ARCH", action = ArgAction::Append)]
    pub osarch: Vec<String>,

    /// Additional '-ldflags' value to pass to go build
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub ldflags: String,

    /// Additional '-gcflags' value to pass to go build
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub gcflags: String,

    /// Additional '-tags' value to pass to go build
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub tags: String,

    /// Output path template
    #[arg(long, default_value = DEFAULT_OUTPUT_TEMPLATE)]
    pub output: String,

    /// Amount of parallelism; zero or less uses the number of CPUs minus one
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub parallel: i64,

    /// Build cross-compilation toolchains (Go older than 1.5)
    #[arg(long)]
    pub build_toolchain: bool,

    /// Sets CGO_ENABLED=1, requires a proper C toolchain
    #[arg(long)]
    pub cgo: bool,

    /// Force rebuilding of packages that are up to date
    #[arg(long)]
    pub rebuild: bool,

    /// List supported os/arch pairs for your Go version
    #[arg(long)]
    pub osarch_list: bool,

    /// Build command
    #[arg(long, default_value = DEFAULT_GO_CMD)]
    pub gocmd: String,

    /// Packages to build. Defaults to the current directory.
    pub packages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::LevelFilter;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["gox"]).unwrap();
        assert_eq!(cli.parallel, -1);
        assert_eq!(cli.output, DEFAULT_OUTPUT_TEMPLATE);
        assert_eq!(cli.gocmd, "go");
        assert!(cli.packages.is_empty());
        assert_eq!(cli.verbose.log_level_filter(), LevelFilter::Info);
    }

    #[test]
    fn repeated_selectors_accumulate() {
        let cli = Cli::try_parse_from(["gox", "--os", "linux", "--os=!darwin", "./cmd/a", "./cmd/b"]).unwrap();
        assert_eq!(cli.os, vec!["linux", "!darwin"]);
        assert_eq!(cli.packages, vec!["./cmd/a", "./cmd/b"]);
    }

    #[test]
    fn hyphenated_flag_values() {
        let cli = Cli::try_parse_from(["gox", "--ldflags", "-s -w", "--parallel", "-1"]).unwrap();
        assert_eq!(cli.ldflags, "-s -w");
        assert_eq!(cli.parallel, -1);
    }

    #[test]
    fn verbose_raises_level() {
        let cli = Cli::try_parse_from(["gox", "--verbose"]).unwrap();
        assert_eq!(cli.verbose.log_level_filter(), LevelFilter::Debug);
    }
}
