//! Layout planning
//!
//! Turns the ordered entry list into the piece sequence whose concatenation
//! is the final archive: leading pad, synthetic manifest, header/payload
//! pairs, trailer. Pure; the planner never touches the store.

use crate::error::StarchResult;
use crate::models::{Entry, Piece, Plan, StoreLimits};
use crate::tarball;
use bytes::{Bytes, BytesMut};

/// Build the plan for one run.
///
/// `zero_pad` is the run's shared pad buffer; its length doubles as the
/// `trim_prefix` the redistributor drops. The synthetic manifest entry is
/// archived first, then every source entry in order, then the trailer.
pub fn layout(
    zero_pad: Bytes,
    manifest: &Entry,
    manifest_payload: Bytes,
    entries: &[Entry],
) -> Plan {
    let trim_prefix = zero_pad.len() as u64;
    let mut pieces = Vec::with_capacity(2 * entries.len() + 4);

    pieces.push(Piece::Literal { bytes: zero_pad });
    pieces.push(Piece::literal(tarball::build_header(manifest, None)));
    pieces.push(Piece::Literal {
        bytes: manifest_payload,
    });

    let mut predecessor = manifest;
    for entry in entries {
        pieces.push(Piece::literal(tarball::build_header(entry, Some(predecessor))));
        // a zero-byte payload has no bytes to copy; its header carries size 0
        if entry.size > 0 {
            pieces.push(Piece::whole_of(entry));
        }
        predecessor = entry;
    }

    let body_len: u64 = pieces.iter().map(Piece::len).sum();
    pieces.push(Piece::literal(tarball::trailer(body_len - trim_prefix)));

    Plan {
        pieces,
        trim_prefix,
    }
}

/// Check the invariants every plan must satisfy before upload starts.
/// A failure here is a programmer error, never a store condition.
pub fn verify(plan: &Plan, limits: &StoreLimits) -> StarchResult<()> {
    use crate::error::StarchError;

    if plan.trim_prefix != limits.min_part_size {
        return Err(StarchError::invariant(format!(
            "trim prefix {} does not match the minimum part size {}",
            plan.trim_prefix, limits.min_part_size
        )));
    }
    if plan.archive_len() % tarball::BLOCK_SIZE != 0 {
        return Err(StarchError::invariant(format!(
            "archive length {} is not a multiple of {}",
            plan.archive_len(),
            tarball::BLOCK_SIZE
        )));
    }
    if plan.archive_len() < limits.min_part_size {
        return Err(StarchError::invariant(format!(
            "archive length {} is below the minimum object size {}",
            plan.archive_len(),
            limits.min_part_size
        )));
    }
    match plan.pieces.last() {
        Some(Piece::Literal { bytes })
            if bytes.len() as u64 >= tarball::TRAILER_BLOCKS
                && bytes.iter().all(|&b| b == 0) => {}
        _ => {
            return Err(StarchError::invariant(
                "plan does not end with the zero-block trailer".to_string(),
            ))
        }
    }
    Ok(())
}

/// Merge runs of adjacent literal pieces into single literals.
///
/// The byte layout is unchanged; this only reduces the number of parts the
/// assembly paths have to push through the store. In particular it fuses the
/// leading pad with the manifest header, manifest payload and first entry
/// header into one buffer that clears the minimum part size on its own.
pub fn coalesce(pieces: &[Piece]) -> Vec<Piece> {
    let mut out: Vec<Piece> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        match (out.last_mut(), piece) {
            (Some(Piece::Literal { bytes: acc }), Piece::Literal { bytes }) => {
                let mut merged = BytesMut::with_capacity(acc.len() + bytes.len());
                merged.extend_from_slice(acc);
                merged.extend_from_slice(bytes);
                *acc = merged.freeze();
            }
            _ => out.push(piece.clone()),
        }
    }
    out
}
