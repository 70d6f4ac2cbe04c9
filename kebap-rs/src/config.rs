//! Driver configuration: include search path and startup file.
//!
//! | Source | Setting |
//! |--------|---------|
//! | `-I<dir>` | include directories, searched first |
//! | `KEBAP_PATH` | colon-separated include directories |
//! | `-f` / `-f<file>` | no startup file / this startup file |
//! | `KEBAP_RC` | startup file when `-f` is not given |
//! | `~/.kebaprc` | default startup file, if it exists |

use std::path::{Path, PathBuf};

use crate::cli::{CliArgs, StartupFile};

/// Environment variable holding extra include directories.
pub const PATH_VAR: &str = "KEBAP_PATH";
/// Environment variable naming the startup file.
pub const RC_VAR: &str = "KEBAP_RC";
/// Startup file name in the home directory.
pub const RC_FILE: &str = ".kebaprc";

/// A non-fatal error encountered while reading a file named by the config.
#[derive(Debug)]
pub struct ConfigError {
    pub path: PathBuf,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Settings the driver needs before running any script.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DriverConfig {
    pub include_path: Vec<PathBuf>,
    pub startup_file: Option<PathBuf>,
}

impl DriverConfig {
    /// Resolve from CLI flags, the process environment and the user's home
    /// directory.
    pub fn resolve(args: &CliArgs) -> Self {
        let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        Self::resolve_with(args, |name| std::env::var(name).ok(), home.as_deref())
    }

    /// Resolve with explicit environment lookup and home directory (exposed
    /// for testing).
    pub fn resolve_with(args: &CliArgs, env: impl Fn(&str) -> Option<String>, home: Option<&Path>) -> Self {
        let mut include_path = args.include_dirs.clone();
        if let Some(dirs) = env(PATH_VAR) {
            include_path.extend(split_path_list(&dirs));
        }

        let startup_file = match &args.startup {
            StartupFile::Skip => None,
            StartupFile::Explicit(path) => Some(path.clone()),
            StartupFile::Search => env(RC_VAR)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or_else(|| home.map(|h| h.join(RC_FILE)).filter(|p| p.is_file())),
        };

        tracing::debug!(?include_path, ?startup_file, "resolved driver config");
        DriverConfig {
            include_path,
            startup_file,
        }
    }

    /// Text of the startup file, if one is configured.
    pub fn read_startup(&self) -> Result<Option<(PathBuf, String)>, ConfigError> {
        let Some(path) = &self.startup_file else {
            return Ok(None);
        };
        std::fs::read_to_string(path)
            .map(|text| Some((path.clone(), text)))
            .map_err(|e| ConfigError {
                path: path.clone(),
                message: e.to_string(),
            })
    }
}

/// Split a colon-separated directory list, dropping empty entries.
pub fn split_path_list(s: &str) -> Vec<PathBuf> {
    s.split(':').filter(|d| !d.is_empty()).map(PathBuf::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parse_argv;

    fn args(list: &[&str]) -> CliArgs {
        parse_argv(&list.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn split_list() {
        assert_eq!(split_path_list("/a::/b:"), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn cli_dirs_come_before_environment() {
        let env = |name: &str| (name == PATH_VAR).then(|| "/env/one:/env/two".to_owned());
        let cfg = DriverConfig::resolve_with(&args(&["-I/cli"]), env, None);
        assert_eq!(
            cfg.include_path,
            vec![PathBuf::from("/cli"), PathBuf::from("/env/one"), PathBuf::from("/env/two")]
        );
    }

    #[test]
    fn startup_from_home_only_if_present() {
        let home = tempfile::tempdir().unwrap();
        let cfg = DriverConfig::resolve_with(&args(&[]), no_env, Some(home.path()));
        assert_eq!(cfg.startup_file, None);

        std::fs::write(home.path().join(RC_FILE), "int ready = 1;").unwrap();
        let cfg = DriverConfig::resolve_with(&args(&[]), no_env, Some(home.path()));
        assert_eq!(cfg.startup_file, Some(home.path().join(RC_FILE)));
        let (_, text) = cfg.read_startup().unwrap().unwrap();
        assert_eq!(text, "int ready = 1;");
    }

    #[test]
    fn rc_variable_and_flags() {
        let env = |name: &str| (name == RC_VAR).then(|| "/etc/kebap.rc".to_owned());
        let cfg = DriverConfig::resolve_with(&args(&[]), env, None);
        assert_eq!(cfg.startup_file, Some(PathBuf::from("/etc/kebap.rc")));
        let cfg = DriverConfig::resolve_with(&args(&["-f"]), env, None);
        assert_eq!(cfg.startup_file, None);
        let cfg = DriverConfig::resolve_with(&args(&["-fmine.rc"]), env, None);
        assert_eq!(cfg.startup_file, Some(PathBuf::from("mine.rc")));
    }

    #[test]
    fn unreadable_startup_file() {
        let cfg = DriverConfig {
            include_path: Vec::new(),
            startup_file: Some(PathBuf::from("/nonexistent/kebap/rc")),
        };
        let err = cfg.read_startup().unwrap_err();
        assert!(err.to_string().starts_with("/nonexistent/kebap/rc: "));
    }
}
