use std::path::PathBuf;

use crate::error::{Error, Result};

/// Prefix for diagnostics and thread names.
pub const TOOL_NAME: &str = "cut-and-run";

/// Environment variable consulted for the worker count.
pub const THREADS_ENV: &str = "OMP_NUM_THREADS";

/// Output stem that every worker shares verbatim.
pub const NULL_SINK: &str = "/dev/null";

/// Everything a run needs, resolved before any file is opened.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub input: PathBuf,
    /// Shell command each worker runs; its stdin receives the worker's range.
    pub command: String,
    pub stem: String,
    pub extension: String,
    pub thread_count: usize,
    /// Exit the process from the first failing worker instead of
    /// waiting for the others.
    pub fail_fast: bool,
}

impl RunConfig {
    pub fn new(
        input: impl Into<PathBuf>,
        command: impl Into<String>,
        stem: impl Into<String>,
        thread_count: usize,
    ) -> Self {
        Self {
            input: input.into(),
            command: command.into(),
            stem: stem.into(),
            extension: String::new(),
            thread_count,
            fail_fast: false,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

/// Number of processing units available to this process.
pub fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Parse a worker count. The whole value must be a non-negative decimal
/// integer; zero means "use all available".
pub fn parse_thread_count(value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(0) => Ok(available_threads()),
        Ok(n) => Ok(n),
        Err(_) => Err(Error::InvalidThreadCount(value.to_string())),
    }
}

/// Pick the worker count: explicit option, then environment, then CPUs.
pub fn resolve_thread_count(option: Option<&str>, env: Option<&str>) -> Result<usize> {
    match option.or(env) {
        Some(value) => parse_thread_count(value),
        None => Ok(available_threads()),
    }
}
