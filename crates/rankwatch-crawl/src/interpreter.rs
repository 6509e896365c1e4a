//! Locates a working interpreter for the worker script.

use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tokio::sync::OnceCell;

use crate::CrawlError;

/// Matches `Python 3.11.4` and friends in `--version` output.
pub const PYTHON_VERSION_PATTERN: &str = r"(?i)python\s+\d+\.\d+";

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Probes interpreter candidates in order and caches the first that answers
/// its version query with matching output.
///
/// A failed probe is not cached: the next call probes again, so an
/// interpreter installed after startup is picked up.
#[derive(Debug)]
pub struct InterpreterProbe {
    candidates: Vec<String>,
    version_args: Vec<String>,
    pattern: Regex,
    resolved: OnceCell<String>,
}

impl InterpreterProbe {
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidPattern`] when `pattern` is not a valid regex.
    pub fn new(candidates: Vec<String>, pattern: &str) -> Result<Self, CrawlError> {
        Ok(Self {
            candidates,
            version_args: vec!["--version".to_string()],
            pattern: Regex::new(pattern)?,
            resolved: OnceCell::new(),
        })
    }

    /// The cached interpreter, if a probe already succeeded.
    #[must_use]
    pub fn cached(&self) -> Option<&str> {
        self.resolved.get().map(String::as_str)
    }

    /// Returns the first usable candidate.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InterpreterNotFound`] listing every candidate
    /// tried when none of them qualifies.
    pub async fn resolve(&self) -> Result<String, CrawlError> {
        self.resolved
            .get_or_try_init(|| self.probe_all())
            .await
            .cloned()
    }

    async fn probe_all(&self) -> Result<String, CrawlError> {
        for candidate in &self.candidates {
            if self.probe(candidate).await {
                tracing::info!(interpreter = %candidate, "supervisor: interpreter resolved");
                return Ok(candidate.clone());
            }
        }

        tracing::error!(
            tried = ?self.candidates,
            "supervisor: no usable interpreter found"
        );
        Err(CrawlError::InterpreterNotFound {
            tried: self.candidates.clone(),
        })
    }

    async fn probe(&self, candidate: &str) -> bool {
        let output = Command::new(candidate)
            .args(&self.version_args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(PROBE_TIMEOUT, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::debug!(interpreter = %candidate, error = %e, "supervisor: probe failed to launch");
                return false;
            }
            Err(_) => {
                tracing::warn!(interpreter = %candidate, "supervisor: probe timed out");
                return false;
            }
        };

        if !output.status.success() {
            tracing::debug!(
                interpreter = %candidate,
                status = %output.status,
                "supervisor: probe exited unsuccessfully"
            );
            return false;
        }

        // Python 2 prints its version on stderr.
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let matched = self.pattern.is_match(&combined);
        if !matched {
            tracing::debug!(
                interpreter = %candidate,
                output = %combined.trim(),
                "supervisor: probe output did not match version pattern"
            );
        }
        matched
    }
}
