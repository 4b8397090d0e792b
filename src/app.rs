//! The apib-mock run loop
//!
//! Certificates (optional) → load fragments → write merged file → start the
//! mock server → regenerate on every fragment change until interrupted.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Config;
use crate::mock::MockServer;
use crate::output::{remove_output, write_output};
use crate::store::FragmentStore;
use crate::tls;
use crate::watcher::{FragmentWatcher, WatchEvent};

/// Start apib-mock and run until ctrl-c
pub async fn serve() -> Result<()> {
    let config = Config::from_args_and_env()?;
    init_logging(&config);

    if let Some(path) = &config.config_path {
        log::info!("Using config file {}", path.display());
    }

    run_until(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for interrupt: {}", e);
        }
    })
    .await
}

fn init_logging(config: &Config) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();
}

/// Run until `shutdown` resolves, then clean up the generated file.
///
/// The generated file is also removed when the watch loop fails.
pub async fn run_until(config: Config, shutdown: impl Future<Output = ()>) -> Result<()> {
    let mut app = App::start(config).await?;

    if !app.config.watch && app.server.is_none() {
        log::info!("Nothing to watch or serve, leaving {}", app.output.display());
        return Ok(());
    }

    match watch_loop(&mut app, shutdown).await {
        Ok(()) => app.shutdown().await,
        Err(e) => {
            if let Err(cleanup) = app.shutdown().await {
                log::warn!("Cleanup after failure also failed: {:#}", cleanup);
            }
            Err(e)
        }
    }
}

async fn watch_loop(app: &mut App, shutdown: impl Future<Output = ()>) -> Result<()> {
    let (_watcher, mut events) = if app.config.watch {
        let (watcher, rx) = FragmentWatcher::start(&app.store.paths())?;
        (Some(watcher), Some(rx))
    } else {
        (None, None)
    };

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            changed = next_changes(&mut events) => app.apply_changes(changed).await?,
        }
    }
}

/// Wait for the next batch of changed fragments.
///
/// Events already queued behind the first one are folded into the same
/// batch so a burst of writes regenerates once.
async fn next_changes(events: &mut Option<UnboundedReceiver<WatchEvent>>) -> BTreeSet<PathBuf> {
    loop {
        let Some(rx) = events.as_mut() else {
            return std::future::pending().await;
        };

        match rx.recv().await {
            Some(WatchEvent::Changed(path)) => {
                let mut changed = BTreeSet::from([path]);
                while let Ok(event) = rx.try_recv() {
                    match event {
                        WatchEvent::Changed(path) => {
                            changed.insert(path);
                        }
                        WatchEvent::Error(e) => log::warn!("Fragment watcher error: {}", e),
                    }
                }
                return changed;
            }
            Some(WatchEvent::Error(e)) => log::warn!("Fragment watcher error: {}", e),
            None => {
                log::warn!("Fragment watcher stopped");
                *events = None;
            }
        }
    }
}

/// Running state: the fragment store plus the optional mock server
pub struct App {
    config: Config,
    store: FragmentStore,
    output: PathBuf,
    server: Option<MockServer>,
}

impl App {
    /// Generate certificates if asked, write the merged file, start the mock server
    pub async fn start(config: Config) -> Result<Self> {
        if config.tls.enable && config.tls.generate {
            tls::generate(&config.tls.paths, &config.tls.subject, &config.tls.openssl)
                .await
                .context("Failed to generate ssl certificates")?;
        }

        let store = FragmentStore::load(&config.root, &config.entry_path()).await?;
        let output = config.output_path();

        let mut app = Self {
            server: None,
            store,
            output,
            config,
        };
        app.regenerate().await?;

        if app.config.mock.run {
            let mut server = MockServer::new(app.config.mock_command()?);
            if let Err(e) = server.start() {
                remove_output(&app.output).await?;
                return Err(e);
            }
            app.server = Some(server);
        }

        Ok(app)
    }

    /// Write the merged document from the current store contents
    pub async fn regenerate(&self) -> Result<()> {
        write_output(&self.output, &self.store.render()).await
    }

    /// Re-read changed fragments, rewrite the merged file and restart the server
    pub async fn apply_changes(&mut self, paths: BTreeSet<PathBuf>) -> Result<()> {
        let mut refreshed = 0;
        for path in &paths {
            if self.store.refresh(path).await? {
                log::info!("Fragment changed: {}", path.display());
                refreshed += 1;
            }
        }
        if refreshed == 0 {
            return Ok(());
        }

        self.regenerate().await?;

        if let Some(server) = self.server.as_mut() {
            server.restart().await?;
        }
        Ok(())
    }

    /// Stop the mock server and delete generated files
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(mut server) = self.server.take() {
            server.stop().await?;
        }

        remove_output(&self.output).await?;

        if self.config.tls.enable && self.config.tls.remove_on_exit {
            tls::remove(&self.config.tls.paths).await?;
        }
        Ok(())
    }
}
