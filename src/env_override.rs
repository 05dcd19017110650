//! Per-platform flag overrides read from `GOX_<OS>_<ARCH>_<FLAG>` variables.

use crate::platform::Platform;
use ahash::AHashMap;

pub const ENV_PREFIX: &str = "GOX";

/// Where override variables are looked up.
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    /// The environment of the running process.
    #[default]
    Process,
    /// A fixed set of variables.
    Fixed(AHashMap<String, String>),
}

impl EnvSource {
    pub fn fixed<K: Into<String>, V: Into<String>>(vars: impl IntoIterator<Item = (K, V)>) -> Self {
        EnvSource::Fixed(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn get(&self, name: &str) -> Option<String> {
        match self {
            EnvSource::Process => std::env::var(name).ok(),
            EnvSource::Fixed(vars) => vars.get(name).cloned(),
        }
    }
}

fn normalize_ident(v: &str) -> String {
    v.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Name of the variable that overrides `flag` for `platform`,
/// e.g. `GOX_LINUX_AMD64_LDFLAGS`.
pub fn override_var_name(platform: &Platform, flag: &str) -> String {
    format!(
        "{ENV_PREFIX}_{}_{}_{}",
        normalize_ident(&platform.os),
        normalize_ident(&platform.arch),
        normalize_ident(flag)
    )
}

/// Replaces `target` with the platform's override for `flag` when one is set
/// and non-empty. Returns whether an override was applied.
pub fn apply(target: &mut String, platform: &Platform, flag: &str, env: &EnvSource) -> bool {
    let name = override_var_name(platform, flag);
    match env.get(&name) {
        Some(value) if !value.is_empty() => {
            log::debug!("{platform}: {flag} overridden by {name}");
            *target = value;
            true
        }
        _ => false,
    }
}
