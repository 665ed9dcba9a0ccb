use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::config::NULL_SINK;

/// Where one worker's command writes its standard output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputTarget {
    /// Shared by every worker; concurrent writes are harmless.
    Null,
    File(PathBuf),
}

impl OutputTarget {
    /// Resolve the target for worker `index` of `thread_count`.
    pub fn for_worker(stem: &str, extension: &str, index: usize, thread_count: usize) -> Self {
        if stem == NULL_SINK {
            OutputTarget::Null
        } else {
            OutputTarget::File(PathBuf::from(output_name(
                stem,
                extension,
                index,
                thread_count,
            )))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            OutputTarget::Null => Path::new(NULL_SINK),
            OutputTarget::File(p) => p,
        }
    }

    /// Create (or truncate) the target and hand it over as a child's stdout.
    pub fn open(&self) -> io::Result<Stdio> {
        match self {
            OutputTarget::Null => Ok(Stdio::null()),
            OutputTarget::File(p) => Ok(Stdio::from(File::create(p)?)),
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())
    }
}

/// Number of decimal digits in `n` (at least 1).
pub fn index_width(n: usize) -> usize {
    let mut width = 1;
    let mut rest = n / 10;
    while rest > 0 {
        width += 1;
        rest /= 10;
    }
    width
}

/// `stem` + index zero-padded to the width of `thread_count` + `extension`.
/// The null sink is returned unchanged.
pub fn output_name(stem: &str, extension: &str, index: usize, thread_count: usize) -> String {
    if stem == NULL_SINK {
        return stem.to_string();
    }
    format!(
        "{}{:0>width$}{}",
        stem,
        index,
        extension,
        width = index_width(thread_count)
    )
}
