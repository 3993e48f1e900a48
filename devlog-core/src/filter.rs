use encoding_rs::UTF_8;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::validation::QueryPredicate;

/// How many lines are scanned between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 4096;

/// Keeps the most recent `capacity` lines pushed into it, in push order.
#[derive(Debug)]
pub struct TailBuffer {
    capacity: usize,
    lines: VecDeque<String>,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            // Grows on demand; the limit may be as large as 99999.
            lines: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}

/// The bounded, ordered result of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub lines: Vec<String>,
    pub total_matches: usize,
    pub lines_scanned: usize,
}

impl FilterOutcome {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// True when older matches were dropped to honour the limit.
    pub fn truncated(&self) -> bool {
        self.total_matches > self.lines.len()
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

#[derive(Debug)]
enum Interrupt {
    Io(io::Error),
    Cancelled,
}

/// Streams `reader` line by line and keeps the last `predicate.limit()` matches.
fn scan_reader<R: BufRead>(
    mut reader: R,
    predicate: &QueryPredicate,
    cancel: &CancellationToken,
) -> Result<FilterOutcome, Interrupt> {
    let mut tail = TailBuffer::new(predicate.limit());
    let mut buf = Vec::with_capacity(256);
    let mut total_matches = 0usize;
    let mut lines_scanned = 0usize;

    loop {
        if lines_scanned % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }

        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).map_err(Interrupt::Io)?;
        if read == 0 {
            break;
        }

        let bytes = trim_line_ending(&buf);
        let (line, _) = if lines_scanned == 0 {
            UTF_8.decode_with_bom_removal(bytes)
        } else {
            UTF_8.decode_without_bom_handling(bytes)
        };
        lines_scanned += 1;

        if predicate.matches(&line) {
            total_matches += 1;
            tail.push(line.into_owned());
        }
    }

    Ok(FilterOutcome {
        lines: tail.into_lines(),
        total_matches,
        lines_scanned,
    })
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Scans the log file at `path`. Blocking; see [`filter_log_source`] for the
/// async entry point.
pub fn filter_file(
    path: &Path,
    predicate: &QueryPredicate,
    cancel: &CancellationToken,
) -> Result<FilterOutcome, ScanError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ScanError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => ScanError::SourceUnreadable {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let metadata = file.metadata().map_err(|e| ScanError::SourceUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    if metadata.is_dir() {
        return Err(ScanError::SourceUnreadable {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, "path is a directory"),
        });
    }
    debug!("Scanning {} ({} bytes)", path.display(), metadata.len());

    let started = Instant::now();
    let outcome = scan_reader(BufReader::new(file), predicate, cancel).map_err(|e| match e {
        Interrupt::Io(source) => ScanError::ScanFailed {
            path: path.to_path_buf(),
            source,
        },
        Interrupt::Cancelled => ScanError::Cancelled {
            path: path.to_path_buf(),
        },
    })?;

    info!(
        path = %path.display(),
        scanned = outcome.lines_scanned,
        matches = outcome.total_matches,
        kept = outcome.lines.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "log scan finished"
    );
    Ok(outcome)
}

/// Runs [`filter_file`] on the blocking pool. The scan polls `cancel` and stops
/// early once it fires.
pub async fn filter_log_source(
    path: PathBuf,
    predicate: QueryPredicate,
    cancel: CancellationToken,
) -> Result<FilterOutcome, ScanError> {
    let task_path = path.clone();
    match tokio::task::spawn_blocking(move || filter_file(&task_path, &predicate, &cancel)).await {
        Ok(result) => result,
        Err(join_error) => {
            warn!("Log scan task failed: {}", join_error);
            Err(ScanError::ScanFailed {
                path,
                source: io::Error::new(io::ErrorKind::Other, join_error.to_string()),
            })
        }
    }
}
