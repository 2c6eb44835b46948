//! Core data model shared across the archive engine

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A source object. Never read or rewritten during a run; payload bytes are
/// only ever referenced by server-side range copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub mtime: DateTime<Utc>,
}

impl Entry {
    pub fn new<B, K, E>(bucket: B, key: K, size: u64, etag: E, mtime: DateTime<Utc>) -> Self
    where
        B: Into<String>,
        K: Into<String>,
        E: Into<String>,
    {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size,
            etag: etag.into(),
            mtime,
        }
    }
}

/// A committed object in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    pub etag: String,
    pub size: u64,
}

/// One completed multipart part, as reported by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPartInfo {
    pub part_number: i32,
    pub etag: String,
}

/// The atomic unit fed to multipart assembly.
///
/// The concatenation of the bytes of every piece in plan order equals the
/// final archive, modulo the leading pad the redistributor trims.
#[derive(Debug, Clone)]
pub enum Piece {
    /// An in-memory buffer: tar headers, the generated manifest, padding
    Literal { bytes: Bytes },
    /// An inclusive byte range of an existing object
    RemoteRange {
        bucket: String,
        key: String,
        start: u64,
        end: u64,
    },
    /// An entire existing object
    RemoteWhole {
        bucket: String,
        key: String,
        size: u64,
    },
}

impl Piece {
    pub fn literal<B: Into<Bytes>>(bytes: B) -> Self {
        Piece::Literal {
            bytes: bytes.into(),
        }
    }

    pub fn whole_of(entry: &Entry) -> Self {
        Piece::RemoteWhole {
            bucket: entry.bucket.clone(),
            key: entry.key.clone(),
            size: entry.size,
        }
    }

    pub fn whole_of_object(obj: &ObjectRef) -> Self {
        Piece::RemoteWhole {
            bucket: obj.bucket.clone(),
            key: obj.key.clone(),
            size: obj.size,
        }
    }

    /// Inclusive range `[start, end]` of a committed object
    pub fn range_of_object(obj: &ObjectRef, start: u64, end: u64) -> Self {
        Piece::RemoteRange {
            bucket: obj.bucket.clone(),
            key: obj.key.clone(),
            start,
            end,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            Piece::Literal { bytes } => bytes.len() as u64,
            Piece::RemoteRange { start, end, .. } => end - start + 1,
            Piece::RemoteWhole { size, .. } => *size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Piece::Literal { .. })
    }
}

/// An ordered piece sequence plus the number of leading pad bytes the final
/// rewrite drops
#[derive(Debug, Clone)]
pub struct Plan {
    pub pieces: Vec<Piece>,
    pub trim_prefix: u64,
}

impl Plan {
    pub fn total_len(&self) -> u64 {
        self.pieces.iter().map(Piece::len).sum()
    }

    /// Archive length once the leading pad is trimmed
    pub fn archive_len(&self) -> u64 {
        self.total_len() - self.trim_prefix
    }
}

/// A contiguous slice of the plan, sized to satisfy the minimum-part rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Index of the first piece in the group
    pub start: usize,
    /// Index one past the last piece in the group
    pub end: usize,
    /// Total byte size of the group's pieces
    pub size: u64,
}

/// Store constants and tunables the engine plans against
#[derive(Debug, Clone, Copy)]
pub struct StoreLimits {
    /// Minimum size of every multipart part except the last
    pub min_part_size: u64,
    /// Maximum number of parts in one multipart upload
    pub max_parts: usize,
    /// Target accumulated size at which the grouper closes a batch
    pub batch_target: u64,
}

pub const MIB: u64 = 1024 * 1024;

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            min_part_size: 5 * MIB,
            max_parts: 10_000,
            batch_target: 10 * MIB,
        }
    }
}
