// ABOUTME: Container log retrieval.
// ABOUTME: Streams log lines and offers a helper that gathers a bounded tail as text.

use super::sealed::Sealed;
use crate::types::ContainerId;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

pub type LogLineStream = Pin<Box<dyn Stream<Item = Result<LogLine, LogError>> + Send>>;

/// Container log access.
#[async_trait]
pub trait LogOps: Sealed + Send + Sync {
    /// Stream the container's log lines selected by `opts`.
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<LogLineStream, LogError>;
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub stdout: bool,
    pub stderr: bool,
    /// Lines from the end; `None` means all.
    pub tail: Option<u64>,
}

impl LogOptions {
    pub fn tail(n: u64) -> Self {
        Self {
            stdout: true,
            stderr: true,
            tail: Some(n),
        }
    }
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            tail: None,
            ..Self::tail(0)
        }
    }
}

/// One line of container output.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub content: String,
    pub stream: LogStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Errors from reading container logs.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("no container {0} to read logs from")]
    ContainerNotFound(String),

    #[error("log stream broke: {0}")]
    Stream(String),
}

/// Read the last `lines` log lines of a stopped container into one string.
pub async fn collect_logs<L: LogOps + ?Sized>(
    runtime: &L,
    id: &ContainerId,
    lines: u64,
) -> Result<String, LogError> {
    let mut stream = runtime.container_logs(id, &LogOptions::tail(lines)).await?;
    let mut out = String::new();
    while let Some(line) = stream.next().await {
        out.push_str(&line?.content);
    }
    Ok(out)
}
