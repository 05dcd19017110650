use anyhow::Result;
use clap::Parser;
use console::style;
use std::{env, io::Write};

use gox::{build, cancel::CancelToken, cli, config::BuildConfig};

/// Long options that may also be spelled with a single dash.
const GO_STYLE_FLAGS: &[&str] = &[
    "arch",
    "build-toolchain",
    "cgo",
    "gcflags",
    "gocmd",
    "help",
    "ldflags",
    "os",
    "osarch",
    "osarch-list",
    "output",
    "parallel",
    "quiet",
    "rebuild",
    "tags",
    "verbose",
    "version",
];

/// Options whose value may follow as a separate argument.
const VALUE_FLAGS: &[&str] = &[
    "arch", "gcflags", "gocmd", "ldflags", "os", "osarch", "output", "parallel", "tags",
];

fn main() -> Result<()> {
    let raw_args: Vec<String> = env::args().collect();
    let cli = parse_cli(raw_args).unwrap_or_else(|err| err.exit());

    env_logger::Builder::new()
        .format(|buf, record| writeln!(buf, "{}:\n{}", record.level(), record.args()))
        .filter_level(cli.verbose.log_level_filter())
        .target(env_logger::fmt::Target::Stdout)
        .init();

    let config = match BuildConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => fail(&e),
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        log::warn!("Could not install interrupt handler: {e}");
    }

    match build::run(&config, &cancel) {
        Err(e) => fail(&e),
        Ok(artifacts) => {
            for artifact in &artifacts {
                log::debug!("built {artifact}");
            }
            Ok(())
        }
    }
}

fn error_message(e: &anyhow::Error) -> String {
    format!("{} {e:#}", style("error:").red().bold())
}

fn fail(e: &anyhow::Error) -> ! {
    eprintln!("{}", error_message(e));
    std::process::exit(1)
}

fn parse_cli(raw_args: Vec<String>) -> Result<cli::Cli, clap::Error> {
    cli::Cli::try_parse_from(normalize_go_style_flags(raw_args))
}

/// Rewrites `-flag` and `-flag=value` to their `--` form for known long
/// options. Values given as a separate argument and everything after a bare
/// `--` are left alone.
fn normalize_go_style_flags(args: Vec<String>) -> Vec<String> {
    let mut normalized = Vec::with_capacity(args.len());
    let mut passthrough = false;
    let mut value_next = false;
    for (idx, arg) in args.into_iter().enumerate() {
        if idx == 0 || passthrough || value_next {
            value_next = false;
            normalized.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
            normalized.push(arg);
            continue;
        }
        let (dashes, name, inline_value) = match long_flag(&arg) {
            Some(flag) => flag,
            None => {
                normalized.push(arg);
                continue;
            }
        };
        value_next = !inline_value && VALUE_FLAGS.contains(&name);
        if dashes == 1 && GO_STYLE_FLAGS.contains(&name) {
            normalized.push(format!("-{arg}"));
        } else {
            normalized.push(arg);
        }
    }
    normalized
}

/// Splits `-name`, `--name` and their `=value` forms into the dash count,
/// the name and whether a value is attached.
fn long_flag(arg: &str) -> Option<(usize, &str, bool)> {
    let (dashes, rest) = match arg.strip_prefix("--") {
        Some(rest) => (2, rest),
        None => (1, arg.strip_prefix('-')?),
    };
    if rest.is_empty() {
        return None;
    }
    Some(match rest.split_once('=') {
        Some((name, _)) => (dashes, name, true),
        None => (dashes, rest, false),
    })
}
