//! Mock server process
//!
//! The mock server itself is an external program (drakov by default). This
//! module only builds its command line and manages the child process.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};

/// Command line for the external mock server
#[derive(Debug, Clone, PartialEq)]
pub struct MockCommand {
    pub program: String,
    pub source_file: PathBuf,
    pub port: u16,
    pub auto_options: bool,
    pub stealth_mode: bool,
    pub watch: bool,
    pub ssl_key_file: Option<PathBuf>,
    pub ssl_crt_file: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

impl MockCommand {
    pub fn new(program: impl Into<String>, source_file: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            program: program.into(),
            source_file: source_file.into(),
            port,
            auto_options: true,
            stealth_mode: false,
            watch: false,
            ssl_key_file: None,
            ssl_crt_file: None,
            extra_args: Vec::new(),
        }
    }

    /// Serve over TLS using the given key and certificate
    pub fn with_tls(mut self, key: impl Into<PathBuf>, crt: impl Into<PathBuf>) -> Self {
        self.ssl_key_file = Some(key.into());
        self.ssl_crt_file = Some(crt.into());
        self
    }

    /// Arguments passed to the mock server program
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.source_file.display().to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ];

        if self.auto_options {
            args.push("--autoOptions".to_string());
        }
        if self.stealth_mode {
            args.push("--stealthmode".to_string());
        }
        if self.watch {
            args.push("--watch".to_string());
        }
        if let (Some(key), Some(crt)) = (&self.ssl_key_file, &self.ssl_crt_file) {
            args.push("--sslKeyFile".to_string());
            args.push(key.display().to_string());
            args.push("--sslCrtFile".to_string());
            args.push(crt.display().to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

/// A running (or stopped) mock server child process
pub struct MockServer {
    command: MockCommand,
    child: Option<Child>,
}

impl MockServer {
    pub fn new(command: MockCommand) -> Self {
        Self {
            command,
            child: None,
        }
    }

    /// Spawn the mock server
    pub fn start(&mut self) -> Result<()> {
        let child = self.command.to_command().spawn().with_context(|| {
            format!("Failed to start mock server: {}", self.command.program)
        })?;

        log::info!(
            "Started {} on port {} (pid {})",
            self.command.program,
            self.command.port,
            child.id().map(|id| id.to_string()).unwrap_or_else(|| "?".to_string())
        );
        self.child = Some(child);
        Ok(())
    }

    /// Kill the mock server and wait for it to exit
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        // Already exited on its own
        if let Some(status) = child.try_wait()? {
            log::warn!("{} had already exited with {}", self.command.program, status);
            return Ok(());
        }

        child
            .kill()
            .await
            .with_context(|| format!("Failed to stop mock server: {}", self.command.program))?;
        log::info!("Stopped {}", self.command.program);
        Ok(())
    }

    /// Stop then start again so the server picks up the regenerated file
    pub async fn restart(&mut self) -> Result<()> {
        self.stop().await?;
        self.start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let cmd = MockCommand::new("drakov", "/srv/api/drakov.apib", 8081);
        assert_eq!(
            cmd.args(),
            vec!["-f", "/srv/api/drakov.apib", "-p", "8081", "--autoOptions"]
        );
    }

    #[test]
    fn test_all_flags() {
        let mut cmd = MockCommand::new("drakov", "out.apib", 3000)
            .with_tls("ssl/server.key", "ssl/server.crt");
        cmd.auto_options = false;
        cmd.stealth_mode = true;
        cmd.watch = true;
        cmd.extra_args = vec!["--public".to_string()];

        assert_eq!(
            cmd.args(),
            vec![
                "-f",
                "out.apib",
                "-p",
                "3000",
                "--stealthmode",
                "--watch",
                "--sslKeyFile",
                "ssl/server.key",
                "--sslCrtFile",
                "ssl/server.crt",
                "--public",
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let mut server = MockServer::new(MockCommand::new("drakov", "x.apib", 8081));
        server.stop().await.expect("stop is a no-op");
        assert!(server.child.is_none());
    }

    #[tokio::test]
    async fn test_start_missing_program_fails() {
        let mut server = MockServer::new(MockCommand::new(
            "apib-mock-definitely-not-installed",
            "x.apib",
            8081,
        ));
        assert!(server.start().is_err());
        assert!(server.child.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restart_cycle() {
        // `true` ignores the drakov arguments and exits immediately
        let mut server = MockServer::new(MockCommand::new("true", "unused.apib", 8081));
        server.start().expect("start");
        server.restart().await.expect("restart");
        assert!(server.child.is_some());
        server.stop().await.expect("stop");
        assert!(server.child.is_none());
    }
}
