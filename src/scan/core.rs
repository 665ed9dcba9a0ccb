use std::io::{self, Read};
use std::ops::Range;
use std::path::Path;

use memchr::memchr_iter;

use crate::common::io::{alloc_buffer, block_size, map_for_scan, open_input};
use crate::error::{Error, Result};

/// The only byte recognized as a line terminator.
pub const LINE_SEPARATOR: u8 = b'\n';

/// Initial room in the boundary vector. Doubled whenever it fills up.
const INITIAL_LINE_CAPACITY: usize = 1_000_000;

/// Every line start in a file, in order, plus the end-of-file sentinel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineStarts {
    starts: Vec<u64>,
    eof_sentinel: u64,
}

impl LineStarts {
    /// Absolute offsets of the first byte of each line. Always begins with 0.
    /// A trailing newline records one final start equal to the file length.
    pub fn starts(&self) -> &[u64] {
        &self.starts
    }

    pub fn total_lines(&self) -> usize {
        self.starts.len()
    }

    /// One past the last byte of the file.
    pub fn eof_sentinel(&self) -> u64 {
        self.eof_sentinel
    }

    pub fn file_len(&self) -> u64 {
        self.eof_sentinel - 1
    }
}

/// Accumulates line starts while bytes stream past.
struct StartRecorder {
    starts: Vec<u64>,
    position: u64,
}

impl StartRecorder {
    fn with_capacity(capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let mut starts = Vec::new();
        starts
            .try_reserve_exact(capacity)
            .map_err(|_| Error::Alloc {
                what: "line start table",
                bytes: capacity * size_of::<u64>(),
            })?;
        // First line always begins at offset 0
        starts.push(0);
        Ok(Self {
            starts,
            position: 0,
        })
    }

    #[inline]
    fn record(&mut self, offset: u64) -> Result<()> {
        if self.starts.len() == self.starts.capacity() {
            let additional = self.starts.capacity();
            self.starts
                .try_reserve_exact(additional)
                .map_err(|_| Error::Alloc {
                    what: "line start table",
                    bytes: (self.starts.capacity() + additional) * size_of::<u64>(),
                })?;
        }
        self.starts.push(offset);
        Ok(())
    }

    fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        let base = self.position;
        for pos in memchr_iter(LINE_SEPARATOR, chunk) {
            // Next line starts right after the separator
            self.record(base + pos as u64 + 1)?;
        }
        self.position += chunk.len() as u64;
        Ok(())
    }

    fn finish(self) -> LineStarts {
        LineStarts {
            starts: self.starts,
            eof_sentinel: self.position + 1,
        }
    }
}

/// Scan a stream once with a `buf_size` read buffer and record every line start.
pub fn scan_reader<R: Read + ?Sized>(reader: &mut R, buf_size: usize) -> Result<LineStarts> {
    scan_reader_with_capacity(reader, buf_size, INITIAL_LINE_CAPACITY)
}

pub(crate) fn scan_reader_with_capacity<R: Read + ?Sized>(
    reader: &mut R,
    buf_size: usize,
    initial_capacity: usize,
) -> Result<LineStarts> {
    let mut buf = alloc_buffer(buf_size.max(1), "read buffer")?;
    let mut recorder = StartRecorder::with_capacity(initial_capacity)?;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::io("read error", e)),
        };
        recorder.feed(&buf[..n])?;
    }
    Ok(recorder.finish())
}

/// Record every line start of an in-memory buffer.
pub fn scan_bytes(data: &[u8]) -> Result<LineStarts> {
    let mut recorder = StartRecorder::with_capacity(INITIAL_LINE_CAPACITY)?;
    recorder.feed(data)?;
    Ok(recorder.finish())
}

/// Scan a file on disk. Large regular files are mapped; everything else is
/// streamed through a buffer sized to the filesystem block size.
///
/// The handle is closed before returning. Workers must open their own.
pub fn scan_file(path: &Path) -> Result<LineStarts> {
    let mut file = open_input(path)?;

    if let Some(mmap) = map_for_scan(&file) {
        tracing::debug!(bytes = mmap.len(), "scanning memory-mapped input");
        return scan_bytes(&mmap);
    }

    let buf_size = block_size(&file);
    tracing::info!(block_size = buf_size, "scanning input");
    scan_reader(&mut file, buf_size).map_err(|e| match e {
        // Reading a directory and the like: the input itself is unusable
        Error::Io { source, .. } => Error::NoInput {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Number of lines between consecutive samples of the boundary table.
///
/// Rounds up unconditionally so the walk never produces more than
/// `thread_count` samples. The last range is usually short.
#[inline]
pub(crate) fn lines_per_worker(total_lines: usize, thread_count: usize) -> usize {
    total_lines / thread_count + 1
}

/// The `thread_count + 1` offsets that cut a file into worker ranges.
///
/// Worker `i` owns `offsets[i]..offsets[i + 1]`. Every offset except the
/// last is a line start; the last is the end-of-file sentinel, one past
/// the final byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionPlan {
    offsets: Vec<u64>,
    total_lines: usize,
    lines_per_worker: usize,
}

impl PartitionPlan {
    /// Downsample the full boundary table into a plan.
    ///
    /// Consumes the table and compacts the sampled starts to its front, so
    /// no second table is allocated. When there are fewer samples than
    /// workers, the plan is padded with the sentinel and the trailing
    /// workers get empty ranges.
    pub fn from_line_starts(lines: LineStarts, thread_count: usize) -> Result<Self> {
        if thread_count == 0 {
            return Err(Error::InvalidThreadCount("0".to_string()));
        }
        let LineStarts {
            starts: mut offsets,
            eof_sentinel,
        } = lines;
        let total_lines = offsets.len();
        let step = lines_per_worker(total_lines, thread_count);

        let mut sampled = 0;
        let mut c = 0;
        while c < total_lines {
            offsets[sampled] = offsets[c];
            sampled += 1;
            c += step;
        }
        offsets.truncate(sampled);

        let wanted = thread_count + 1;
        if wanted > offsets.len() {
            offsets
                .try_reserve_exact(wanted - offsets.len())
                .map_err(|_| Error::Alloc {
                    what: "partition plan",
                    bytes: wanted * size_of::<u64>(),
                })?;
        }
        offsets.resize(wanted, eof_sentinel);
        offsets.shrink_to_fit();

        Ok(Self {
            offsets,
            total_lines,
            lines_per_worker: step,
        })
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn thread_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    pub fn lines_per_worker(&self) -> usize {
        self.lines_per_worker
    }

    pub fn eof_sentinel(&self) -> u64 {
        self.offsets[self.offsets.len() - 1]
    }

    /// Half-open byte range owned by worker `index`.
    pub fn range(&self, index: usize) -> Range<u64> {
        self.offsets[index]..self.offsets[index + 1]
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        self.offsets.windows(2).map(|w| w[0]..w[1])
    }
}

/// Scan `path` and plan `thread_count` ranges over it.
pub fn plan_file(path: &Path, thread_count: usize) -> Result<PartitionPlan> {
    if thread_count == 0 {
        return Err(Error::InvalidThreadCount("0".to_string()));
    }
    let lines = scan_file(path)?;
    let plan = PartitionPlan::from_line_starts(lines, thread_count)?;
    tracing::info!(
        total_lines = plan.total_lines(),
        lines_per_worker = plan.lines_per_worker(),
        "partition plan ready"
    );
    Ok(plan)
}
