//! Configuration management for apib-mock.
//!
//! Handles:
//! - Command-line argument parsing
//! - Optional TOML config file (explicit, project, or user-global)
//! - Resolving both into a single `Config`

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::mock::MockCommand;
use crate::tls::{CertificateSubject, TlsPaths};

/// Name of the project-level config file looked up in the working directory
pub const PROJECT_CONFIG_FILE: &str = "apib-mock.toml";

/// Command-line arguments for apib-mock
#[derive(Debug, Default, Parser)]
#[command(name = "apib-mock")]
#[command(about = "Merge API Blueprint fragments and serve them with a mock server")]
#[command(version)]
pub struct Args {
    /// Config file to load instead of the default lookup
    #[arg(long, short = 'c', help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Directory fragment paths are resolved against")]
    pub root: Option<PathBuf>,

    #[arg(long, short = 'e', help = "Entry blueprint, relative to the root")]
    pub entry: Option<PathBuf>,

    #[arg(long, short = 'o', help = "Generated blueprint, relative to the root")]
    pub output: Option<PathBuf>,

    #[arg(long, short = 'p', help = "Port for the mock server")]
    pub port: Option<u16>,

    #[arg(long, help = "Mock server program to run (default: drakov)")]
    pub mock_program: Option<String>,

    #[arg(long, help = "Generate the merged file once without watching")]
    pub no_watch: bool,

    #[arg(long, help = "Do not start the mock server")]
    pub no_mock: bool,

    #[arg(long, help = "Serve over TLS")]
    pub ssl: bool,

    #[arg(long, help = "Generate a self-signed certificate with openssl")]
    pub generate_ssl: bool,

    /// Log level
    #[arg(long, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,
}

/// Mock server section of the config file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MockSettings {
    pub run: bool,
    pub program: String,
    pub port: u16,
    pub auto_options: bool,
    pub stealth_mode: bool,
    pub watch: bool,
    pub extra_args: Vec<String>,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            run: true,
            program: "drakov".to_string(),
            port: 8081,
            auto_options: true,
            stealth_mode: false,
            watch: false,
            extra_args: Vec::new(),
        }
    }
}

/// TLS section of the config file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    pub enable: bool,
    pub generate: bool,
    pub remove_on_exit: bool,
    pub openssl: String,
    pub paths: TlsPaths,
    pub subject: CertificateSubject,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enable: false,
            generate: false,
            remove_on_exit: false,
            openssl: "openssl".to_string(),
            paths: TlsPaths::default(),
            subject: CertificateSubject::default(),
        }
    }
}

/// Contents of a TOML config file; every field is optional
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub root: PathBuf,
    pub entry: PathBuf,
    pub output: PathBuf,
    pub watch: bool,
    pub log_level: String,
    pub mock: MockSettings,
    pub tls: TlsSettings,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./src"),
            entry: PathBuf::from("./index.apib"),
            output: PathBuf::from("./drakov.apib"),
            watch: true,
            log_level: "info".to_string(),
            mock: MockSettings::default(),
            tls: TlsSettings::default(),
        }
    }
}

impl FileConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config TOML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Combined configuration from all sources
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub root: PathBuf,
    pub entry: PathBuf,
    pub output: PathBuf,
    pub watch: bool,
    pub mock: MockSettings,
    pub tls: TlsSettings,
    pub log_level: String,
    /// Config file the values were read from, if any
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(FileConfig::default(), Args::default(), None)
    }
}

impl Config {
    /// Create configuration from command-line arguments and config files
    pub fn from_args_and_env() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Create configuration from explicit arguments (useful for testing)
    pub fn from_args(args: Args) -> Result<Self> {
        let config_path = match &args.config {
            Some(path) => Some(path.clone()),
            None => find_config_file(),
        };

        let file = match &config_path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        Ok(Self::merge(file, args, config_path))
    }

    /// Apply command-line overrides on top of file values
    pub fn merge(file: FileConfig, args: Args, config_path: Option<PathBuf>) -> Self {
        let mut mock = file.mock;
        if let Some(port) = args.port {
            mock.port = port;
        }
        if let Some(program) = args.mock_program {
            mock.program = program;
        }
        if args.no_mock {
            mock.run = false;
        }

        let mut tls = file.tls;
        if args.ssl {
            tls.enable = true;
        }
        if args.generate_ssl {
            tls.enable = true;
            tls.generate = true;
        }

        Config {
            root: args.root.unwrap_or(file.root),
            entry: args.entry.unwrap_or(file.entry),
            output: args.output.unwrap_or(file.output),
            watch: file.watch && !args.no_watch,
            mock,
            tls,
            log_level: args.log_level.unwrap_or(file.log_level),
            config_path,
        }
    }

    /// Entry blueprint, resolved against the root
    pub fn entry_path(&self) -> PathBuf {
        self.root.join(&self.entry)
    }

    /// Generated blueprint, resolved against the root
    pub fn output_path(&self) -> PathBuf {
        self.root.join(&self.output)
    }

    /// Build the mock server command line for the generated blueprint
    pub fn mock_command(&self) -> Result<MockCommand> {
        let source = std::path::absolute(self.output_path()).with_context(|| {
            format!("Failed to resolve output path: {}", self.output_path().display())
        })?;

        let mut command = MockCommand::new(&self.mock.program, source, self.mock.port);
        command.auto_options = self.mock.auto_options;
        command.stealth_mode = self.mock.stealth_mode;
        command.watch = self.mock.watch;
        command.extra_args = self.mock.extra_args.clone();

        if self.tls.enable {
            let key = std::path::absolute(&self.tls.paths.key)?;
            let crt = std::path::absolute(&self.tls.paths.crt)?;
            command = command.with_tls(key, crt);
        }

        Ok(command)
    }
}

/// Look for `./apib-mock.toml`, then `<config dir>/apib-mock/config.toml`
fn find_config_file() -> Option<PathBuf> {
    let project = PathBuf::from(PROJECT_CONFIG_FILE);
    if project.is_file() {
        return Some(project);
    }

    dirs::config_dir()
        .map(|dir| dir.join("apib-mock").join("config.toml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.entry_path(), PathBuf::from("./src/./index.apib"));
        assert_eq!(config.output_path(), PathBuf::from("./src/./drakov.apib"));
        assert!(config.watch);
        assert!(config.mock.run);
        assert_eq!(config.mock.port, 8081);
        assert!(!config.tls.enable);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_partial_toml() {
        let file = FileConfig::from_toml(
            r#"
root = "api"
watch = false

[mock]
port = 3000
stealth_mode = true

[tls]
enable = true

[tls.subject]
common_names = ["api.local"]
"#,
        )
        .expect("parse");

        assert_eq!(file.root, PathBuf::from("api"));
        assert_eq!(file.entry, PathBuf::from("./index.apib"));
        assert!(!file.watch);
        assert_eq!(file.mock.port, 3000);
        assert!(file.mock.stealth_mode);
        assert_eq!(file.mock.program, "drakov");
        assert!(file.tls.enable);
        assert_eq!(file.tls.subject.common_names, vec!["api.local"]);
        assert_eq!(file.tls.subject.country, "US");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(FileConfig::from_toml("watch = \"yes\"").is_err());
    }

    #[test]
    fn test_args_override_file() {
        let args = Args::parse_from([
            "apib-mock",
            "--root",
            "docs",
            "--port",
            "9000",
            "--no-watch",
            "--generate-ssl",
            "--log-level",
            "debug",
        ]);
        let config = Config::merge(FileConfig::default(), args, None);

        assert_eq!(config.root, PathBuf::from("docs"));
        assert_eq!(config.mock.port, 9000);
        assert!(!config.watch);
        assert!(config.tls.enable);
        assert!(config.tls.generate);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_mock_command_uses_tls_paths() {
        let mut config = Config::default();
        config.tls.enable = true;

        let command = config.mock_command().expect("mock command");
        assert!(command.source_file.is_absolute());
        assert!(command.source_file.ends_with("drakov.apib"));
        assert!(command.ssl_key_file.as_ref().is_some_and(|p| p.ends_with("server.key")));
        assert!(command.ssl_crt_file.as_ref().is_some_and(|p| p.ends_with("server.crt")));
    }
}
