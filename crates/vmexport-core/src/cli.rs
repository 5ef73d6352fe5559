//! Runner for the cloud vendors' command line tools (az, gcloud, aws)

use crate::error::ExportError;
use serde::de::DeserializeOwned;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0} not found in PATH. Please install it and log in")]
    NotInstalled(String),

    #[error("{program} {command} failed: {stderr}")]
    Failed {
        program: String,
        command: String,
        stderr: String,
    },

    #[error("Failed to parse {program} output: {source}")]
    Parse {
        program: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// stderr of a failed command, empty otherwise
    pub fn stderr(&self) -> &str {
        match self {
            CliError::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

impl From<CliError> for ExportError {
    fn from(e: CliError) -> Self {
        match e {
            CliError::NotInstalled(_) => ExportError::Connection(e.to_string()),
            CliError::Io(io) => ExportError::Io(io),
            other => ExportError::CommandFailed(other.to_string()),
        }
    }
}

/// Runs one vendor CLI with fixed global arguments
///
/// Child processes are killed when the returned future is dropped, so a
/// cancelled export does not leave CLI invocations running.
#[derive(Debug, Clone)]
pub struct CliRunner {
    program: String,
    global_args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl CliRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Arguments appended to every invocation (e.g. `--output json`)
    pub fn with_global_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run and return stdout
    pub async fn run(&self, args: &[&str]) -> Result<String, CliError> {
        tracing::debug!("Running: {} {}", self.program, args.join(" "));
        self.exec(args).await
    }

    /// Like [`CliRunner::run`] but only the subcommand is logged
    pub async fn run_sensitive(&self, args: &[&str]) -> Result<String, CliError> {
        tracing::debug!(
            "Running: {} {} <arguments hidden>",
            self.program,
            args.iter().take(2).copied().collect::<Vec<_>>().join(" ")
        );
        self.exec(args).await
    }

    /// Run and parse stdout as JSON
    pub async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, CliError> {
        let output = self.run(args).await?;
        serde_json::from_str(&output).map_err(|source| CliError::Parse {
            program: self.program.clone(),
            source,
        })
    }

    async fn exec(&self, args: &[&str]) -> Result<String, CliError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd.args(&self.global_args);
        cmd.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CliError::NotInstalled(self.program.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(CliError::Failed {
                program: self.program.clone(),
                command: args.iter().take(3).copied().collect::<Vec<_>>().join(" "),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
