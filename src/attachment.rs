use std::fmt;
use std::path::{Path, PathBuf};

/// Fixed allowance per attachment part for MIME headers and the boundary
/// line, added on top of the base64 payload. A safety margin, not exact
/// framing arithmetic.
pub const PART_OVERHEAD_BYTES: u64 = 512;

/// How the transport encodes attachment bodies. The batcher only ever sees
/// sizes that already went through this, so the expansion factor lives in
/// one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    Base64,
}

impl TransferEncoding {
    /// Estimated on-the-wire size of a part carrying `raw` payload bytes.
    pub fn encoded_len(&self, raw: u64) -> u64 {
        match self {
            // 4 output bytes per 3 input bytes, rounded up to a full group
            TransferEncoding::Base64 => (raw + 2) / 3 * 4 + PART_OVERHEAD_BYTES,
        }
    }
}

/// One file admitted for sending. Immutable once built; the data is carried
/// along so the dispatcher never touches the filesystem.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub path: PathBuf,
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub raw_size: u64,
    pub encoded_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooLarge,
    Unreadable,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooLarge => write!(f, "exceeds the maximum allowed size"),
            RejectReason::Unreadable => write!(f, "could not be read"),
        }
    }
}

/// A file excluded from sending. Never fatal; callers accumulate these and
/// report them at the end of the run.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub path: PathBuf,
    pub reason: RejectReason,
    pub detail: Option<String>,
}

#[derive(Debug)]
pub enum Admission {
    Accepted(Attachment),
    Rejected(Rejection),
}

/// Decide whether `path` may be attached at all. The size probe runs before
/// the content read, so a file that is both unreadable and oversized reports
/// a single rejection, first detected wins.
pub fn admit(path: &Path, max_file_size: u64, encoding: TransferEncoding) -> Admission {
    let raw_size = match path.metadata() {
        Ok(meta) => meta.len(),
        Err(e) => {
            return Admission::Rejected(Rejection {
                path: path.to_path_buf(),
                reason: RejectReason::Unreadable,
                detail: Some(e.to_string()),
            });
        }
    };

    if raw_size > max_file_size {
        return Admission::Rejected(Rejection {
            path: path.to_path_buf(),
            reason: RejectReason::TooLarge,
            detail: None,
        });
    }

    // Files can disappear between collection and this read; skip and report
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            return Admission::Rejected(Rejection {
                path: path.to_path_buf(),
                reason: RejectReason::Unreadable,
                detail: Some(e.to_string()),
            });
        }
    };

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("unknown")
        .to_string();

    let raw_size = data.len() as u64;
    let encoded_size = encoding.encoded_len(raw_size);

    log::debug!(
        "Admitted {} ({} bytes raw, {} bytes encoded)",
        path.display(),
        raw_size,
        encoded_size
    );

    Admission::Accepted(Attachment {
        path: path.to_path_buf(),
        filename,
        content_type: content_type_for(path).to_string(),
        data,
        raw_size,
        encoded_size,
    })
}

/// Determine content type based on file extension
fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("txt") => "text/plain",
        Some("pdf") => "application/pdf",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        }
        _ => "application/octet-stream",
    }
}
