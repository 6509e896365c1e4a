//! Launches the external worker for one batch and classifies how it ended.
//!
//! The worker receives the batch's URLs as a JSON array on stdin, followed by
//! EOF. Its stdout and stderr are read line by line, logged, and kept in
//! bounded buffers. Stdout lines shaped like
//! `{"type":"progress","index":1,"total":3,...}` are counted as progress.
//! The exit status alone decides the outcome.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use rankwatch_core::AppConfig;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use uuid::Uuid;

use crate::interpreter::{InterpreterProbe, PYTHON_VERSION_PATTERN};
use crate::CrawlError;

const DEFAULT_MAX_CAPTURED_LINES: usize = 500;
const FAILURE_LOG_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Working directory of the worker process.
    pub project_root: PathBuf,
    /// Script passed as the interpreter's first argument.
    pub script: PathBuf,
    pub interpreter_candidates: Vec<String>,
    pub version_pattern: String,
    /// Lines kept per stream; older lines are dropped first.
    pub max_captured_lines: usize,
}

impl WorkerConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            project_root: config.project_root.clone(),
            script: config.worker_script.clone(),
            interpreter_candidates: config.interpreter_candidates.clone(),
            version_pattern: PYTHON_VERSION_PATTERN.to_string(),
            max_captured_lines: config.worker_max_captured_lines,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            script: PathBuf::from("python/crawl_and_update.py"),
            interpreter_candidates: rankwatch_core::config::default_interpreter_candidates(),
            version_pattern: PYTHON_VERSION_PATTERN.to_string(),
            max_captured_lines: DEFAULT_MAX_CAPTURED_LINES,
        }
    }
}

/// Terminal classification of one batch. Exactly one per batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BatchOutcome {
    Success,
    /// Exit code; `-1` when the worker was terminated by a signal.
    NonZeroExit(i32),
    SpawnError(String),
    InterpreterNotFound,
}

impl BatchOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    fn from_exit_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => Self::Success,
            Some(code) => Self::NonZeroExit(code),
            None => Self::NonZeroExit(-1),
        }
    }
}

impl std::fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NonZeroExit(code) => write!(f, "exited with code {code}"),
            Self::SpawnError(reason) => write!(f, "failed to launch: {reason}"),
            Self::InterpreterNotFound => write!(f, "no interpreter available"),
        }
    }
}

/// A structured progress line emitted by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProgressEvent {
    pub index: u64,
    pub total: u64,
    #[serde(default)]
    pub asin: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WorkerLine {
    Progress(ProgressEvent),
}

/// Parses a worker stdout line as a progress event.
#[must_use]
pub fn parse_progress(line: &str) -> Option<ProgressEvent> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    match serde_json::from_str::<WorkerLine>(trimmed) {
        Ok(WorkerLine::Progress(event)) => Some(event),
        Err(_) => None,
    }
}

/// What a finished worker left behind.
#[derive(Debug, Clone)]
pub struct WorkerRun {
    pub outcome: BatchOutcome,
    pub items_reported: usize,
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
}

impl WorkerRun {
    fn without_output(outcome: BatchOutcome) -> Self {
        Self {
            outcome,
            items_reported: 0,
            stdout_tail: Vec::new(),
            stderr_tail: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct LineCapture {
    lines: VecDeque<String>,
    max: usize,
    progress: usize,
}

impl LineCapture {
    fn new(max: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max.min(64)),
            max,
            progress: 0,
        }
    }

    fn push(&mut self, line: String) {
        if self.max == 0 {
            return;
        }
        if self.lines.len() == self.max {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}

#[derive(Debug)]
pub struct ProcessSupervisor {
    config: WorkerConfig,
    probe: InterpreterProbe,
}

impl ProcessSupervisor {
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidPattern`] when the configured version
    /// pattern does not compile.
    pub fn new(config: WorkerConfig) -> Result<Self, CrawlError> {
        let probe = InterpreterProbe::new(
            config.interpreter_candidates.clone(),
            &config.version_pattern,
        )?;
        Ok(Self { config, probe })
    }

    /// Resolves (and caches) the interpreter used to launch workers.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InterpreterNotFound`] when no candidate qualifies.
    pub async fn resolve_interpreter(&self) -> Result<String, CrawlError> {
        self.probe.resolve().await
    }

    /// Resolves the interpreter and runs one worker to completion.
    ///
    /// An unresolvable interpreter yields [`BatchOutcome::InterpreterNotFound`]
    /// without spawning anything.
    pub async fn run(&self, batch_id: Uuid, urls: &[String]) -> WorkerRun {
        match self.resolve_interpreter().await {
            Ok(interpreter) => self.execute(&interpreter, batch_id, urls).await,
            Err(_) => WorkerRun::without_output(BatchOutcome::InterpreterNotFound),
        }
    }

    /// Runs one worker with an already-resolved interpreter.
    pub async fn execute(&self, interpreter: &str, batch_id: Uuid, urls: &[String]) -> WorkerRun {
        let payload = match serde_json::to_vec(urls) {
            Ok(p) => p,
            Err(e) => {
                return WorkerRun::without_output(BatchOutcome::SpawnError(format!(
                    "failed to encode URL list: {e}"
                )))
            }
        };

        let mut command = Command::new(interpreter);
        command
            .arg(&self.config.script)
            .current_dir(&self.config.project_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let reason = format!(
                    "failed to launch '{interpreter} {}' in {}: {e}",
                    self.config.script.display(),
                    self.config.project_root.display()
                );
                tracing::error!(%batch_id, reason = %reason, "supervisor: worker spawn failed");
                return WorkerRun::without_output(BatchOutcome::SpawnError(reason));
            }
        };

        tracing::info!(
            %batch_id,
            pid = child.id(),
            url_count = urls.len(),
            "supervisor: worker started"
        );

        let max = self.config.max_captured_lines;
        let (_, stdout, stderr) = tokio::join!(
            feed_stdin(child.stdin.take(), payload, batch_id),
            capture_lines(child.stdout.take(), Stream::Stdout, batch_id, max),
            capture_lines(child.stderr.take(), Stream::Stderr, batch_id, max),
        );

        let outcome = match child.wait().await {
            Ok(status) => BatchOutcome::from_exit_status(status),
            Err(e) => BatchOutcome::SpawnError(format!("failed to wait for worker: {e}")),
        };

        let run = WorkerRun {
            outcome,
            items_reported: stdout.progress,
            stdout_tail: stdout.into_lines(),
            stderr_tail: stderr.into_lines(),
        };
        log_outcome(batch_id, &run);
        run
    }
}

async fn feed_stdin(stdin: Option<ChildStdin>, payload: Vec<u8>, batch_id: Uuid) {
    let Some(mut stdin) = stdin else {
        tracing::warn!(%batch_id, "supervisor: worker stdin unavailable");
        return;
    };

    if let Err(e) = stdin.write_all(&payload).await {
        tracing::warn!(%batch_id, error = %e, "supervisor: failed to write URL list to worker");
        return;
    }
    if let Err(e) = stdin.shutdown().await {
        tracing::warn!(%batch_id, error = %e, "supervisor: failed to close worker stdin");
    }
}

async fn capture_lines<R>(
    reader: Option<R>,
    stream: Stream,
    batch_id: Uuid,
    max: usize,
) -> LineCapture
where
    R: AsyncRead + Unpin,
{
    let mut capture = LineCapture::new(max);
    let Some(reader) = reader else {
        return capture;
    };

    // Raw reads: a non-UTF-8 byte must not stop draining the pipe, or the
    // worker's next write dies with SIGPIPE.
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%batch_id, error = %e, "supervisor: failed to read worker output");
                break;
            }
        }
        let line = decode_line(&buf);

        match stream {
            Stream::Stdout => {
                if let Some(event) = parse_progress(&line) {
                    capture.progress += 1;
                    tracing::info!(
                        %batch_id,
                        index = event.index,
                        total = event.total,
                        asin = event.asin.as_deref().unwrap_or(""),
                        url = event.url.as_deref().unwrap_or(""),
                        status = event.status.as_deref().unwrap_or(""),
                        "supervisor: worker progress"
                    );
                } else {
                    tracing::info!(%batch_id, "worker: {line}");
                }
            }
            Stream::Stderr => tracing::warn!(%batch_id, "worker stderr: {line}"),
        }
        capture.push(line);
    }
    capture
}

/// Lossy UTF-8 decode with the trailing `\n` / `\r\n` stripped.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn log_outcome(batch_id: Uuid, run: &WorkerRun) {
    if run.outcome.is_success() {
        tracing::info!(
            %batch_id,
            items_reported = run.items_reported,
            "supervisor: worker finished successfully"
        );
        return;
    }

    let tail_start = run.stderr_tail.len().saturating_sub(FAILURE_LOG_TAIL_LINES);
    let stderr_tail = run.stderr_tail[tail_start..].join("\n");
    tracing::error!(
        %batch_id,
        outcome = %run.outcome,
        items_reported = run.items_reported,
        stderr_tail = %stderr_tail,
        "supervisor: worker failed"
    );
}
