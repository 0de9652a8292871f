use crate::cigale::CigaleError;
use crate::conf::CigaleConfig;

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, instrument, warn};

/// Invokes the CIGALE executables in an explicit working directory.
#[derive(Debug, Clone)]
pub struct CigaleRunner {
    executable: String,
    plots_executable: String,
    timeout: Option<Duration>,
}

impl CigaleRunner {
    pub fn new(executable: impl Into<String>, plots_executable: impl Into<String>) -> Self {
        CigaleRunner {
            executable: executable.into(),
            plots_executable: plots_executable.into(),
            timeout: None,
        }
    }

    pub fn from_config(config: &CigaleConfig) -> Self {
        CigaleRunner::new(&config.executable, &config.plots_executable)
            .with_timeout(config.timeout_secs.map(Duration::from_secs))
    }

    /// The child is killed when a call runs past `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Expands `pcigale.ini` from the data file and module list.
    pub async fn genconf(&self, directory: &Path) -> Result<(), CigaleError> {
        self.invoke(&self.executable, &["genconf"], directory).await
    }

    /// Runs the fit; CIGALE writes its results under `out/`.
    pub async fn run(&self, directory: &Path) -> Result<(), CigaleError> {
        self.invoke(&self.executable, &["run"], directory).await
    }

    pub async fn sed_plots(&self, directory: &Path) -> Result<(), CigaleError> {
        self.invoke(&self.plots_executable, &["sed"], directory).await
    }

    #[instrument(skip(self), err)]
    async fn invoke(
        &self,
        program: &str,
        args: &[&str],
        directory: &Path,
    ) -> Result<(), CigaleError> {
        if !directory.is_dir() {
            return Err(CigaleError::MissingDirectory(directory.to_path_buf()));
        }
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        info!(%command, directory = %directory.display(), "starting external command");

        let mut child = Command::new(program)
            .args(args)
            .current_dir(directory)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CigaleError::Spawn {
                command: command.clone(),
                source,
            })?;

        let waited = match self.timeout {
            Some(timeout) => {
                let waited = tokio::time::timeout(timeout, child.wait()).await;
                match waited {
                    Ok(status) => status,
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            warn!(%command, error = %e, "failed to kill timed out command");
                        }
                        return Err(CigaleError::TimedOut { command, timeout });
                    }
                }
            }
            None => child.wait().await,
        };
        let status = waited.map_err(|source| CigaleError::Wait {
            command: command.clone(),
            source,
        })?;

        if !status.success() {
            return Err(CigaleError::Failed { command, status });
        }
        info!(%command, "external command finished");
        Ok(())
    }
}
