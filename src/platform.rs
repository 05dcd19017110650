use anyhow::{Result, anyhow};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// A compilation target, named the way the Go toolchain names it
/// (`GOOS`/`GOARCH`), e.g. `linux/amd64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Platform {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this process runs on, translated to toolchain names.
    pub fn host() -> Self {
        Platform::new(
            go_os_name(std::env::consts::OS),
            go_arch_name(std::env::consts::ARCH),
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((os, arch)) if !os.is_empty() && !arch.is_empty() && !arch.contains('/') => {
                Ok(Platform::new(os, arch))
            }
            _ => Err(anyhow!("Invalid platform: {s}")),
        }
    }
}

fn go_os_name(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn go_arch_name(arch: &str) -> &str {
    let little_endian = cfg!(target_endian = "little");
    match arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "loongarch64" => "loong64",
        "powerpc" => "ppc",
        "powerpc64" if little_endian => "ppc64le",
        "powerpc64" => "ppc64",
        "mips" if little_endian => "mipsle",
        "mips64" if little_endian => "mips64le",
        other => other,
    }
}

type PlatformTable = &'static [(&'static str, &'static str)];

const PLATFORMS_1_0: PlatformTable = &[
    ("darwin", "386"),
    ("darwin", "amd64"),
    ("linux", "386"),
    ("linux", "amd64"),
    ("linux", "arm"),
    ("freebsd", "386"),
    ("freebsd", "amd64"),
    ("openbsd", "386"),
    ("openbsd", "amd64"),
    ("windows", "386"),
    ("windows", "amd64"),
];

const ADDED_1_1: PlatformTable = &[
    ("freebsd", "arm"),
    ("netbsd", "386"),
    ("netbsd", "amd64"),
    ("netbsd", "arm"),
    ("plan9", "386"),
];

const ADDED_1_3: PlatformTable = &[
    ("dragonfly", "386"),
    ("dragonfly", "amd64"),
    ("nacl", "amd64"),
    ("nacl", "amd64p32"),
    ("nacl", "arm"),
    ("solaris", "amd64"),
];

const ADDED_1_4: PlatformTable = &[("android", "arm"), ("plan9", "amd64")];

const ADDED_1_5: PlatformTable = &[
    ("darwin", "arm"),
    ("darwin", "arm64"),
    ("linux", "arm64"),
    ("linux", "ppc64"),
    ("linux", "ppc64le"),
];

const ADDED_1_6: PlatformTable = &[
    ("android", "386"),
    ("linux", "mips64"),
    ("linux", "mips64le"),
];

const ADDED_1_7: PlatformTable = &[("linux", "s390x"), ("plan9", "arm")];

const ADDED_1_8: PlatformTable = &[("linux", "mips"), ("linux", "mipsle")];

/// Newest version with its own entry in the table; anything later reuses it.
const LATEST: (u32, u32) = (1, 8);

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^go(\d+)\.(\d+)").expect("version regex is valid"))
}

/// Extracts `(major, minor)` from a toolchain version string such as
/// `go1.8.3` or `go1.21rc2`.
pub fn version_parts(version: &str) -> Result<(u32, u32)> {
    let captures = version_regex()
        .captures(version.trim())
        .ok_or_else(|| anyhow!("unrecognized Go version: {version:?}"))?;
    let major = captures[1].parse()?;
    let minor = captures[2].parse()?;
    Ok((major, minor))
}

/// Every platform the given toolchain version can target, in table order.
pub fn supported_platforms(version: &str) -> Vec<Platform> {
    if !version.starts_with("go") {
        return platforms_for(LATEST);
    }

    match version_parts(version) {
        Ok(parts) => platforms_for(parts.min(LATEST)),
        Err(e) => {
            log::warn!("Unable to parse current go version: {version}\n{e}");
            platforms_for(LATEST)
        }
    }
}

fn platforms_for(version: (u32, u32)) -> Vec<Platform> {
    let mut tables = vec![PLATFORMS_1_0];
    if version >= (1, 1) {
        tables.push(ADDED_1_1);
    }
    if version >= (1, 3) {
        tables.push(ADDED_1_3);
    }
    if version >= (1, 4) {
        tables.push(ADDED_1_4);
    }
    if version >= (1, 5) {
        tables.push(ADDED_1_5);
    }
    // 1.7 lists its own additions ahead of the ones 1.6 introduced.
    if version >= (1, 7) {
        tables.push(ADDED_1_7);
        tables.push(ADDED_1_6);
    } else if version >= (1, 6) {
        tables.push(ADDED_1_6);
    }
    if version >= (1, 8) {
        tables.push(ADDED_1_8);
    }

    tables
        .into_iter()
        .flatten()
        .map(|(os, arch)| Platform::new(*os, *arch))
        .collect()
}
