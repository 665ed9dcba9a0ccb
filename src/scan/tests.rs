use super::core::{lines_per_worker, scan_reader_with_capacity};
use super::*;
use crate::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use proptest::prelude::*;

// ---- Helper functions ----

fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Generate test content: N lines of "line X\n".
fn generate_lines(n: usize) -> Vec<u8> {
    let mut content = Vec::new();
    for i in 1..=n {
        content.extend_from_slice(format!("line {}\n", i).as_bytes());
    }
    content
}

fn plan_bytes(data: &[u8], threads: usize) -> PartitionPlan {
    PartitionPlan::from_line_starts(scan_bytes(data).unwrap(), threads).unwrap()
}

/// Slice the data by the plan, clipping the sentinel range at EOF.
fn slice_ranges<'a>(data: &'a [u8], plan: &PartitionPlan) -> Vec<&'a [u8]> {
    let len = data.len() as u64;
    plan.ranges()
        .map(|r| &data[r.start.min(len) as usize..r.end.min(len) as usize])
        .collect()
}

/// Reader that hands out at most `chunk` bytes per call and injects an
/// `Interrupted` error before every read.
struct TrickleReader<'a> {
    data: &'a [u8],
    chunk: usize,
    interrupt_next: bool,
}

impl Read for TrickleReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.interrupt_next {
            self.interrupt_next = false;
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }
        self.interrupt_next = true;
        let n = self.chunk.min(buf.len()).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

// ---- Boundary scanning ----

#[test]
fn test_scan_records_start_after_each_newline() {
    let lines = scan_bytes(b"ab\ncde\nf\n").unwrap();
    assert_eq!(lines.starts(), &[0, 3, 7, 9]);
    assert_eq!(lines.total_lines(), 4);
    assert_eq!(lines.file_len(), 9);
    assert_eq!(lines.eof_sentinel(), 10);
}

#[test]
fn test_scan_no_trailing_newline() {
    let lines = scan_bytes(b"ab\ncd").unwrap();
    assert_eq!(lines.starts(), &[0, 3]);
    assert_eq!(lines.eof_sentinel(), 6);
}

#[test]
fn test_scan_empty_input() {
    let lines = scan_bytes(b"").unwrap();
    assert_eq!(lines.starts(), &[0]);
    assert_eq!(lines.eof_sentinel(), 1);
}

#[test]
fn test_scan_only_newlines() {
    let lines = scan_bytes(b"\n\n\n").unwrap();
    assert_eq!(lines.starts(), &[0, 1, 2, 3]);
}

#[test]
fn test_scan_crlf_only_counts_lf() {
    let lines = scan_bytes(b"a\r\nb\rc\n").unwrap();
    assert_eq!(lines.starts(), &[0, 3, 7]);
}

#[test]
fn test_scan_reader_matches_bytes_for_small_buffers() {
    let data = generate_lines(57);
    let expected = scan_bytes(&data).unwrap();
    for buf_size in [1, 2, 3, 7, 64, 4096] {
        let got = scan_reader(&mut &data[..], buf_size).unwrap();
        assert_eq!(got, expected, "buf_size {}", buf_size);
    }
}

#[test]
fn test_scan_reader_short_and_interrupted_reads() {
    let data = generate_lines(20);
    let mut reader = TrickleReader {
        data: &data,
        chunk: 3,
        interrupt_next: true,
    };
    let got = scan_reader(&mut reader, 16).unwrap();
    assert_eq!(got, scan_bytes(&data).unwrap());
}

#[test]
fn test_scan_table_grows_past_initial_capacity() {
    let data = generate_lines(100);
    let got = scan_reader_with_capacity(&mut &data[..], 8, 1).unwrap();
    assert_eq!(got.total_lines(), 101);
    assert_eq!(got, scan_bytes(&data).unwrap());
}

#[test]
fn test_scan_reader_propagates_read_error() {
    struct Broken;
    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }
    let err = scan_reader(&mut Broken, 16).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn test_scan_file_missing() {
    let err = scan_file(Path::new("/nonexistent_cut_and_run_scan")).unwrap_err();
    assert!(matches!(err, Error::NoInput { .. }));
}

#[cfg(unix)]
#[test]
fn test_scan_file_directory_is_no_input() {
    let dir = tempfile::tempdir().unwrap();
    let err = scan_file(dir.path()).unwrap_err();
    assert!(matches!(err, Error::NoInput { .. }), "{:?}", err);
}

#[test]
fn test_scan_file_streaming_small_file() {
    let dir = tempfile::tempdir().unwrap();
    let data = generate_lines(10);
    let path = create_test_file(dir.path(), "in.txt", &data);
    assert_eq!(scan_file(&path).unwrap(), scan_bytes(&data).unwrap());
}

#[test]
fn test_scan_file_mmap_matches_streaming() {
    // Above the mmap threshold
    let dir = tempfile::tempdir().unwrap();
    let data = generate_lines(200_000);
    assert!(data.len() as u64 > crate::common::io::MMAP_THRESHOLD);
    let path = create_test_file(dir.path(), "big.txt", &data);
    let mapped = scan_file(&path).unwrap();
    let streamed = scan_reader(&mut fs::File::open(&path).unwrap(), 4096).unwrap();
    assert_eq!(mapped, streamed);
    assert_eq!(mapped.total_lines(), 200_001);
}

#[test]
fn test_scan_file_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_test_file(dir.path(), "in.txt", &generate_lines(33));
    assert_eq!(plan_file(&path, 4).unwrap(), plan_file(&path, 4).unwrap());
}

// ---- Partition planning ----

#[test]
fn test_lines_per_worker_rounds_up() {
    assert_eq!(lines_per_worker(9, 3), 4);
    assert_eq!(lines_per_worker(10, 3), 4);
    assert_eq!(lines_per_worker(8, 4), 3);
    assert_eq!(lines_per_worker(1, 4), 1);
}

#[test]
fn test_plan_nine_lines_three_workers() {
    // No trailing newline, so exactly 9 recorded starts
    let data = b"l1\nl2\nl3\nl4\nl5\nl6\nl7\nl8\nl9";
    let plan = plan_bytes(data, 3);
    assert_eq!(plan.total_lines(), 9);
    assert_eq!(plan.lines_per_worker(), 4);
    assert_eq!(plan.offsets(), &[0, 12, 24, 27]);
    let pieces = slice_ranges(data, &plan);
    assert_eq!(pieces[0], b"l1\nl2\nl3\nl4\n");
    assert_eq!(pieces[1], b"l5\nl6\nl7\nl8\n");
    assert_eq!(pieces[2], b"l9");
}

#[test]
fn test_plan_nine_lines_with_trailing_newline() {
    let data = generate_lines(9);
    let plan = plan_bytes(&data, 3);
    assert_eq!(plan.lines_per_worker(), 4);
    let pieces = slice_ranges(&data, &plan);
    assert_eq!(pieces[0], b"line 1\nline 2\nline 3\nline 4\n");
    assert_eq!(pieces[1], b"line 5\nline 6\nline 7\nline 8\n");
    assert_eq!(pieces[2], b"line 9\n");
}

#[test]
fn test_plan_empty_input_four_workers() {
    let plan = plan_bytes(b"", 4);
    assert_eq!(plan.offsets(), &[0, 1, 1, 1, 1]);
    assert_eq!(plan.thread_count(), 4);
    assert!(slice_ranges(b"", &plan).iter().all(|p| p.is_empty()));
}

#[test]
fn test_plan_more_workers_than_lines() {
    let data = b"a\nb\n";
    let plan = plan_bytes(data, 8);
    assert_eq!(plan.offsets().len(), 9);
    assert_eq!(&plan.offsets()[..4], &[0, 2, 4, 5]);
    assert!(plan.offsets()[3..].iter().all(|&o| o == 5));
    let empty = plan.ranges().filter(|r| r.is_empty()).count();
    assert_eq!(empty, 5);
}

#[test]
fn test_plan_single_worker_covers_everything() {
    let data = generate_lines(5);
    let plan = plan_bytes(&data, 1);
    assert_eq!(plan.offsets(), &[0, data.len() as u64 + 1]);
    assert_eq!(plan.range(0), 0..data.len() as u64 + 1);
}

#[test]
fn test_plan_rejects_zero_workers() {
    let err = PartitionPlan::from_line_starts(scan_bytes(b"x\n").unwrap(), 0).unwrap_err();
    assert!(matches!(err, Error::InvalidThreadCount(_)));
}

#[test]
fn test_plan_file_rejects_zero_workers_before_opening() {
    let err = plan_file(Path::new("/nonexistent_cut_and_run_scan"), 0).unwrap_err();
    assert!(matches!(err, Error::InvalidThreadCount(_)));
}

#[test]
fn test_plan_eof_sentinel_is_last() {
    let data = generate_lines(12);
    let plan = plan_bytes(&data, 5);
    assert_eq!(plan.eof_sentinel(), data.len() as u64 + 1);
    assert_eq!(plan.range(4).end, plan.eof_sentinel());
}

// ---- Plan invariants ----

fn text_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop_oneof![Just(b'\n'), Just(b'a'), Just(b'z'), Just(b' ')],
        0..400,
    )
}

proptest! {
    #[test]
    fn prop_plan_shape(data in text_strategy(), threads in 1usize..40) {
        let plan = plan_bytes(&data, threads);
        let offsets = plan.offsets();
        prop_assert_eq!(offsets.len(), threads + 1);
        prop_assert_eq!(offsets[0], 0);
        prop_assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(offsets[threads] >= data.len() as u64);
    }

    #[test]
    fn prop_ranges_reconstruct_input(data in text_strategy(), threads in 1usize..40) {
        let plan = plan_bytes(&data, threads);
        let rebuilt: Vec<u8> = slice_ranges(&data, &plan).concat();
        prop_assert_eq!(rebuilt, data);
    }

    #[test]
    fn prop_boundaries_are_line_starts(data in text_strategy(), threads in 1usize..40) {
        let lines = scan_bytes(&data).unwrap();
        let starts = lines.starts().to_vec();
        let sentinel = lines.eof_sentinel();
        let plan = PartitionPlan::from_line_starts(lines, threads).unwrap();
        for &offset in &plan.offsets()[..threads] {
            prop_assert!(offset == sentinel || starts.binary_search(&offset).is_ok());
        }
    }

    #[test]
    fn prop_streaming_matches_in_memory(data in text_strategy(), buf_size in 1usize..64) {
        let streamed = scan_reader(&mut &data[..], buf_size).unwrap();
        prop_assert_eq!(streamed, scan_bytes(&data).unwrap());
    }
}
