//! `Range` header parsing and window policy
//!
//! Accepts a single `bytes=<start>?-<end>?` range. Suffix lengths clamp to
//! the file; positions at or past the end of the file are unsatisfiable.
//! After parsing, a request at byte 0 is widened so the engine gets a useful
//! first chunk, while reads past byte 0 keep their HTTP window and instead
//! ask the engine to prefetch ahead.

use crate::config::StreamingConfig;

/// Inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered, never zero.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for a file of `file_length` bytes.
    pub fn content_range(&self, file_length: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, file_length)
    }
}

/// File-relative window the engine should fetch first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityWindow {
    pub offset: u64,
    pub len: u64,
}

/// Negotiated response window plus the window to prioritize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeOutcome {
    pub range: ByteRange,
    pub priority: PriorityWindow,
}

/// No satisfiable range; carries the length for `Content-Range: bytes */<len>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Range not satisfiable for file of {file_length} bytes")]
pub struct RangeUnsatisfiable {
    pub file_length: u64,
}

impl RangeUnsatisfiable {
    pub fn content_range(&self) -> String {
        format!("bytes */{}", self.file_length)
    }
}

/// Turns `Range` headers into response and priority windows.
#[derive(Debug, Clone)]
pub struct RangeNegotiator {
    min_initial_window: u64,
    resume_prefetch_window: u64,
    max_chunk_size: Option<u64>,
}

impl RangeNegotiator {
    /// Creates a negotiator; an initial window of zero is treated as one byte.
    pub fn new(config: &StreamingConfig) -> Self {
        Self {
            min_initial_window: config.min_initial_window.max(1),
            resume_prefetch_window: config.resume_prefetch_window,
            max_chunk_size: config.max_chunk_size,
        }
    }

    /// Negotiates a request for a file of `file_length` bytes.
    ///
    /// Ranges starting at byte 0 always cover at least the initial window.
    /// `is_resume` marks a read against a resource that was already loaded;
    /// at byte 0 it extends the priority window to the prefetch window.
    ///
    /// # Errors
    ///
    /// - `RangeUnsatisfiable` - Header missing or malformed, empty file, or
    ///   a position at or beyond the end of the file
    pub fn negotiate(
        &self,
        range_header: Option<&str>,
        file_length: u64,
        is_resume: bool,
    ) -> Result<RangeOutcome, RangeUnsatisfiable> {
        let unsatisfiable = RangeUnsatisfiable { file_length };
        if file_length == 0 {
            return Err(unsatisfiable);
        }

        let header = range_header.ok_or(unsatisfiable)?;
        let mut range = self.parse(header, file_length).ok_or(unsatisfiable)?;

        let priority = if range.start == 0 {
            let initial_end = self.min_initial_window.min(file_length) - 1;
            range.end = range.end.max(initial_end);
            let len = if is_resume {
                self.resume_prefetch_window.max(range.length())
            } else {
                range.length()
            };
            PriorityWindow { offset: 0, len }
        } else {
            PriorityWindow {
                offset: range.start,
                len: self.resume_prefetch_window.max(range.length()),
            }
        };

        Ok(RangeOutcome { range, priority })
    }

    fn parse(&self, header: &str, file_length: u64) -> Option<ByteRange> {
        let ranges = header.trim().strip_prefix("bytes=")?;
        let (start, end) = ranges.split_once('-')?;
        let start = parse_position(start.trim())?;
        let end = parse_position(end.trim())?;
        let last = file_length - 1;

        match (start, end) {
            (None, None) => None,
            (None, Some(suffix)) => {
                let suffix = suffix.min(file_length);
                if suffix == 0 {
                    return None;
                }
                Some(ByteRange {
                    start: file_length - suffix,
                    end: last,
                })
            }
            (Some(start), None) => {
                if start >= file_length {
                    return None;
                }
                let end = match self.max_chunk_size {
                    Some(chunk) => last.min(start.saturating_add(chunk.max(1) - 1)),
                    None => last,
                };
                Some(ByteRange { start, end })
            }
            (Some(start), Some(end)) => {
                if start >= file_length || end >= file_length || end < start {
                    return None;
                }
                Some(ByteRange { start, end })
            }
        }
    }
}

/// Empty is `Some(None)`; digits parse saturating; anything else is `None`.
fn parse_position(raw: &str) -> Option<Option<u64>> {
    if raw.is_empty() {
        return Some(None);
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(Some(raw.parse().unwrap_or(u64::MAX)))
}
