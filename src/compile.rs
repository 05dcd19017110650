use crate::env_override::{self, EnvSource};
use crate::platform::Platform;
use anyhow::{Result, anyhow, bail};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DEFAULT_OUTPUT_TEMPLATE: &str = "{{.Dir}}_{{.OS}}_{{.Arch}}";
pub const DEFAULT_GO_CMD: &str = "go";

/// Settings shared by every compiler invocation of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileTemplate {
    pub output: String,
    pub ldflags: String,
    pub gcflags: String,
    pub tags: String,
    pub go_cmd: String,
    pub cgo: bool,
    pub rebuild: bool,
}

impl Default for CompileTemplate {
    fn default() -> Self {
        CompileTemplate {
            output: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            ldflags: String::new(),
            gcflags: String::new(),
            tags: String::new(),
            go_cmd: DEFAULT_GO_CMD.to_string(),
            cgo: false,
            rebuild: false,
        }
    }
}

impl CompileTemplate {
    pub fn options_for(&self, package_path: &str, platform: &Platform) -> CompileOptions {
        CompileOptions {
            package_path: package_path.to_string(),
            platform: platform.clone(),
            output_template: self.output.clone(),
            ldflags: self.ldflags.clone(),
            gcflags: self.gcflags.clone(),
            tags: self.tags.clone(),
            go_cmd: self.go_cmd.clone(),
            cgo: self.cgo,
            rebuild: self.rebuild,
        }
    }
}

/// Everything needed to build one package for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub package_path: String,
    pub platform: Platform,
    pub output_template: String,
    pub ldflags: String,
    pub gcflags: String,
    pub tags: String,
    pub go_cmd: String,
    pub cgo: bool,
    pub rebuild: bool,
}

impl CompileOptions {
    /// Applies `GOX_<OS>_<ARCH>_LDFLAGS` and `GOX_<OS>_<ARCH>_GCFLAGS`.
    pub fn apply_env_overrides(&mut self, env: &EnvSource) {
        env_override::apply(&mut self.ldflags, &self.platform, "LDFLAGS", env);
        env_override::apply(&mut self.gcflags, &self.platform, "GCFLAGS", env);
    }

    /// Rendered output template, with `.exe` appended for windows targets.
    pub fn output_path(&self) -> Result<String> {
        let dir = Path::new(&self.package_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.package_path.clone());

        let mut path = render_output_template(
            &self.output_template,
            &dir,
            &self.platform.os,
            &self.platform.arch,
        )?;
        if self.platform.os == "windows" {
            path.push_str(".exe");
        }
        Ok(path)
    }

    /// CGO is used when asked for, or when building for the host itself
    /// unless `CGO_ENABLED=0` is set.
    pub fn cgo_enabled(&self, host: &Platform, env: &EnvSource) -> bool {
        if self.cgo {
            return true;
        }
        if env.get("CGO_ENABLED").as_deref() == Some("0") {
            return false;
        }
        &self.platform == host
    }

    /// Directory to run the build from and the package argument to pass.
    ///
    /// The toolchain reports packages outside GOPATH as `_/abs/path`; those are
    /// built from inside the directory with no package argument.
    pub fn package_location(&self) -> (Option<PathBuf>, Option<&str>) {
        match self.package_path.strip_prefix('_') {
            Some(dir) => (Some(local_package_dir(dir)), None),
            None => (None, Some(self.package_path.as_str())),
        }
    }

    pub fn build_args(&self, output: &Path, package: Option<&str>) -> Vec<String> {
        let mut args = vec!["build".to_string()];
        if self.rebuild {
            args.push("-a".to_string());
        }
        args.extend([
            "-gcflags".to_string(),
            self.gcflags.clone(),
            "-ldflags".to_string(),
            self.ldflags.clone(),
            "-tags".to_string(),
            self.tags.clone(),
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
        ]);
        if let Some(package) = package {
            args.push(package.to_string());
        }
        args
    }
}

#[cfg(windows)]
fn local_package_dir(dir: &str) -> PathBuf {
    // `_/c_/Users/me` -> `c:/Users/me`
    let dir = dir.trim_start_matches(['/', '\\']);
    PathBuf::from(dir.replacen('_', ":", 1))
}

#[cfg(not(windows))]
fn local_package_dir(dir: &str) -> PathBuf {
    PathBuf::from(dir)
}

fn template_action_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*\.(\w+)\s*\}\}").expect("template regex is valid"))
}

/// Expands `{{.Dir}}`, `{{.OS}}` and `{{.Arch}}` in an output template.
pub fn render_output_template(template: &str, dir: &str, os: &str, arch: &str) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for captures in template_action_regex().captures_iter(template) {
        let action = captures.get(0).expect("group 0 always matches");
        rendered.push_str(&template[last..action.start()]);
        let value = match &captures[1] {
            "Dir" => dir,
            "OS" => os,
            "Arch" => arch,
            other => bail!("output template {template:?}: unknown field .{other}"),
        };
        rendered.push_str(value);
        last = action.end();
    }
    rendered.push_str(&template[last..]);

    if rendered.contains("{{") {
        return Err(anyhow!("output template {template:?}: unsupported action"));
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(package_path: &str, platform: &str) -> CompileOptions {
        CompileTemplate::default().options_for(package_path, &platform.parse().unwrap())
    }

    #[test]
    fn default_template_renders() {
        let opts = options("github.com/acme/tool", "linux/arm");
        assert_eq!(opts.output_path().unwrap(), "tool_linux_arm");
    }

    #[test]
    fn windows_gets_exe_suffix() {
        let opts = options("github.com/acme/tool", "windows/amd64");
        assert_eq!(opts.output_path().unwrap(), "tool_windows_amd64.exe");
    }

    #[test]
    fn template_allows_spacing_and_literals() {
        let rendered =
            render_output_template("build/{{ .OS }}-{{.Arch}}/{{.Dir}}", "app", "darwin", "arm64").unwrap();
        assert_eq!(rendered, "build/darwin-arm64/app");
    }

    #[test]
    fn template_rejects_unknown_fields() {
        let err = render_output_template("{{.Version}}", "app", "linux", "amd64").unwrap_err();
        assert!(err.to_string().contains("unknown field .Version"));
    }

    #[test]
    fn template_rejects_other_actions() {
        assert!(render_output_template("{{if .OS}}x{{end}}", "app", "linux", "amd64").is_err());
    }

    #[test]
    fn overrides_touch_only_their_fields() {
        let mut opts = options("app", "linux/amd64");
        opts.ldflags = "-X main.v=1".to_string();
        opts.tags = "netgo".to_string();
        let env = EnvSource::fixed([("GOX_LINUX_AMD64_GCFLAGS", "-N -l")]);
        opts.apply_env_overrides(&env);
        assert_eq!(opts.ldflags, "-X main.v=1");
        assert_eq!(opts.gcflags, "-N -l");
        assert_eq!(opts.tags, "netgo");
    }

    #[test]
    fn cgo_follows_host_unless_disabled() {
        let host = Platform::new("linux", "amd64");
        let native = options("app", "linux/amd64");
        let cross = options("app", "linux/arm");
        let empty = EnvSource::fixed(Vec::<(String, String)>::new());
        let disabled = EnvSource::fixed([("CGO_ENABLED", "0")]);

        assert!(native.cgo_enabled(&host, &empty));
        assert!(!native.cgo_enabled(&host, &disabled));
        assert!(!cross.cgo_enabled(&host, &empty));

        let mut forced = cross.clone();
        forced.cgo = true;
        assert!(forced.cgo_enabled(&host, &disabled));
    }

    #[test]
    fn build_args_order() {
        let mut opts = options("github.com/acme/tool", "linux/amd64");
        opts.rebuild = true;
        opts.ldflags = "-s -w".to_string();
        let (dir, package) = opts.package_location();
        assert!(dir.is_none());
        let args = opts.build_args(Path::new("/out/tool"), package);
        assert_eq!(
            args,
            vec![
                "build", "-a", "-gcflags", "", "-ldflags", "-s -w", "-tags", "", "-o", "/out/tool",
                "github.com/acme/tool"
            ]
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn local_packages_build_in_place() {
        let opts = options("_/home/me/tool", "linux/amd64");
        let (dir, package) = opts.package_location();
        assert_eq!(dir, Some(PathBuf::from("/home/me/tool")));
        assert_eq!(package, None);
        assert_eq!(opts.output_path().unwrap(), "tool_linux_amd64");
    }
}
