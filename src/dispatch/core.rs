use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::process::{self, Command, ExitStatus, Stdio};

use rayon::prelude::*;

use super::naming::OutputTarget;
use crate::common::io::{alloc_buffer, block_size, open_input};
use crate::config::{RunConfig, TOOL_NAME};
use crate::error::{Error, Result};
use crate::scan::{PartitionPlan, plan_file};

/// What one worker did.
#[derive(Clone, Debug)]
pub struct WorkerReport {
    pub index: usize,
    pub range: Range<u64>,
    /// Bytes actually delivered to the command's stdin.
    pub bytes_sent: u64,
    pub target: OutputTarget,
    /// Recorded, never acted on: output correctness is the command's business.
    pub status: ExitStatus,
}

/// Outcome of a complete run.
#[derive(Debug)]
pub struct RunSummary {
    pub plan: PartitionPlan,
    pub workers: Vec<WorkerReport>,
}

impl RunSummary {
    pub fn bytes_sent(&self) -> u64 {
        self.workers.iter().map(|w| w.bytes_sent).sum()
    }
}

/// Copy at most `len` bytes from `reader` to `writer` through `buf`.
///
/// Each read asks for `min(buf.len(), remaining)` and only what the read
/// returned is forwarded, so the copy never strays past the range. Stops
/// early at end of input (the last range ends one past EOF) or when the
/// consumer closes its end of the pipe. Returns the bytes delivered.
pub fn copy_range<R, W>(
    reader: &mut R,
    writer: &mut W,
    len: u64,
    buf: &mut [u8],
) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut remaining = len;
    let mut sent = 0u64;
    while remaining > 0 {
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = match reader.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        match writer.write_all(&buf[..n]) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!(sent, "command closed its input early");
                return Ok(sent);
            }
            Err(e) => return Err(e),
        }
        sent += n as u64;
        remaining -= n as u64;
    }
    Ok(sent)
}

/// Run one worker: private handle, private buffer, private command.
fn run_worker(config: &RunConfig, plan: &PartitionPlan, index: usize) -> Result<WorkerReport> {
    let range = plan.range(index);
    let target = OutputTarget::for_worker(
        &config.stem,
        &config.extension,
        index,
        plan.thread_count(),
    );

    // Never share a cursor with another worker
    let mut input = open_input(&config.input)?;
    let mut buf = alloc_buffer(block_size(&input), "worker read buffer")?;

    let spawn_error = |source: io::Error| Error::Spawn {
        command: config.command.clone(),
        target: target.to_string(),
        source,
    };
    let stdout = target.open().map_err(spawn_error)?;
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(&config.command)
        .env("FILE", target.path())
        .stdin(Stdio::piped())
        .stdout(stdout)
        .spawn()
        .map_err(spawn_error)?;

    tracing::info!(
        worker = index,
        start = range.start,
        end = range.end,
        output = %target,
        "sending range to command"
    );

    let len = range.end - range.start;
    let copied = match child.stdin.take() {
        Some(mut stdin) => input
            .seek(SeekFrom::Start(range.start))
            .and_then(|_| copy_range(&mut input, &mut stdin, len, &mut buf)),
        None => Err(io::Error::other("command stdin not captured")),
    };
    // stdin is dropped by now: the command sees end of input
    let status = child.wait();

    let bytes_sent =
        copied.map_err(|e| Error::io(format!("worker {}: cannot send input", index), e))?;
    let status =
        status.map_err(|e| Error::io(format!("worker {}: cannot wait for command", index), e))?;

    if !status.success() {
        tracing::warn!(worker = index, %status, command = %config.command, "command failed");
    }
    tracing::debug!(worker = index, bytes_sent, "worker finished");

    Ok(WorkerReport {
        index,
        range,
        bytes_sent,
        target,
        status,
    })
}

/// Run every worker of `plan` concurrently and wait for all of them.
///
/// Each worker runs on its own pool thread. Results are joined in worker
/// order and the first failure (by index) is returned. With
/// `config.fail_fast`, a failing worker ends the process on the spot.
pub fn dispatch(config: &RunConfig, plan: &PartitionPlan) -> Result<Vec<WorkerReport>> {
    let thread_count = plan.thread_count();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .thread_name(|i| format!("{}-worker-{}", TOOL_NAME, i))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    let results: Vec<Result<WorkerReport>> = pool.install(|| {
        (0..thread_count)
            .into_par_iter()
            .with_max_len(1)
            .map(|index| {
                let outcome = run_worker(config, plan, index);
                if config.fail_fast
                    && let Err(ref e) = outcome
                {
                    eprintln!("{}: {}", TOOL_NAME, e);
                    process::exit(e.exit_code());
                }
                outcome
            })
            .collect()
    });

    results.into_iter().collect()
}

/// Scan, plan and dispatch `config.input`.
pub fn run(config: &RunConfig) -> Result<RunSummary> {
    tracing::info!(threads = config.thread_count, "starting");
    let plan = plan_file(&config.input, config.thread_count)?;
    let workers = dispatch(config, &plan)?;
    let summary = RunSummary { plan, workers };
    tracing::info!(bytes = summary.bytes_sent(), "all workers finished");
    Ok(summary)
}
