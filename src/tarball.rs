//! POSIX ustar header construction
//!
//! Builds the literal byte runs that sit between payload range copies in the
//! assembled archive: per-entry headers (including the zero padding that
//! rounds the previous payload up to a block boundary), PAX extended headers
//! for names the ustar fields cannot hold, and the end-of-archive trailer.

use crate::models::Entry;

/// Tar block size; every header and payload is rounded to this
pub const BLOCK_SIZE: u64 = 512;

/// Two zero blocks terminate the archive
pub const TRAILER_BLOCKS: u64 = 2 * BLOCK_SIZE;

const NAME_LEN: usize = 100;
const PREFIX_LEN: usize = 155;
const PAX_HEADER_NAME: &str = "@PaxHeader";

// Field offsets within a 512-byte ustar header block
const OFF_NAME: usize = 0;
const OFF_MODE: usize = 100;
const OFF_UID: usize = 108;
const OFF_GID: usize = 116;
const OFF_SIZE: usize = 124;
const OFF_MTIME: usize = 136;
const OFF_CHKSUM: usize = 148;
const OFF_TYPEFLAG: usize = 156;
const OFF_MAGIC: usize = 257;
const OFF_VERSION: usize = 263;
const OFF_PREFIX: usize = 345;

/// Zero bytes needed to round `len` up to the next block boundary
pub fn block_padding(len: u64) -> u64 {
    (BLOCK_SIZE - (len % BLOCK_SIZE)) % BLOCK_SIZE
}

/// Header bytes for `entry`, preceded by the zero padding that rounds the
/// predecessor's payload up to a block boundary.
///
/// Keys that fit neither the 100-byte name field nor a ustar prefix/name
/// split get a PAX extended header with a `path` record in front of the
/// ustar block.
pub fn build_header(entry: &Entry, predecessor: Option<&Entry>) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 * BLOCK_SIZE as usize);

    if let Some(prev) = predecessor {
        out.resize(block_padding(prev.size) as usize, 0);
    }

    let mtime = entry.mtime.timestamp().max(0) as u64;
    let mut block = [0u8; BLOCK_SIZE as usize];

    match split_name(entry.key.as_bytes()) {
        Some((prefix, name)) => {
            block[OFF_NAME..OFF_NAME + name.len()].copy_from_slice(name);
            block[OFF_PREFIX..OFF_PREFIX + prefix.len()].copy_from_slice(prefix);
        }
        None => {
            // PAX long-name extension; the ustar name keeps a truncated echo
            // so pre-PAX readers still show something recognisable
            out.extend_from_slice(&pax_path_header(entry.key.as_bytes(), mtime));
            let echo = &entry.key.as_bytes()[..NAME_LEN];
            block[OFF_NAME..OFF_NAME + NAME_LEN].copy_from_slice(echo);
        }
    }

    fill_common_fields(&mut block, entry.size, mtime, b'0');
    out.extend_from_slice(&block);
    out
}

/// End-of-archive trailer: padding of the final payload up to a block
/// boundary plus two zero blocks. `archive_len` is the archive length
/// accumulated so far, leading pad excluded.
pub fn trailer(archive_len: u64) -> Vec<u8> {
    vec![0u8; (block_padding(archive_len) + TRAILER_BLOCKS) as usize]
}

/// Split a key into ustar `(prefix, name)` fields, or `None` when no legal
/// split exists and a PAX record is required.
fn split_name(key: &[u8]) -> Option<(&[u8], &[u8])> {
    if key.len() <= NAME_LEN {
        return Some((&[], key));
    }
    // prefix '/' name must reassemble the key exactly, so only a slash can
    // carry the split
    let limit = key.len().min(PREFIX_LEN + 1);
    for i in (0..limit).rev() {
        if key[i] == b'/' && key.len() - i - 1 <= NAME_LEN && i <= PREFIX_LEN {
            return Some((&key[..i], &key[i + 1..]));
        }
    }
    None
}

/// One PAX extended header: an `x`-typed ustar block followed by the record
/// data, zero-padded to a block boundary.
fn pax_path_header(key: &[u8], mtime: u64) -> Vec<u8> {
    let record = pax_record(b"path", key);

    let mut block = [0u8; BLOCK_SIZE as usize];
    let name = PAX_HEADER_NAME.as_bytes();
    block[OFF_NAME..OFF_NAME + name.len()].copy_from_slice(name);
    fill_common_fields(&mut block, record.len() as u64, mtime, b'x');

    let mut out = Vec::with_capacity(2 * BLOCK_SIZE as usize);
    out.extend_from_slice(&block);
    out.extend_from_slice(&record);
    out.resize(out.len() + block_padding(record.len() as u64) as usize, 0);
    out
}

/// `"{len} {key}={value}\n"` where len counts the whole record, its own
/// digits included
fn pax_record(key: &[u8], value: &[u8]) -> Vec<u8> {
    let payload_len = key.len() + value.len() + 3;
    let mut total_len = payload_len + decimal_digits(payload_len);
    if decimal_digits(total_len) > decimal_digits(payload_len) {
        total_len += 1;
    }

    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(total_len.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(key);
    out.push(b'=');
    out.extend_from_slice(value);
    out.push(b'\n');
    out
}

fn decimal_digits(n: usize) -> usize {
    (n.max(1).ilog10() + 1) as usize
}

/// Mode, ownership, size, mtime, typeflag, magic and checksum shared by
/// regular and PAX header blocks
fn fill_common_fields(block: &mut [u8; BLOCK_SIZE as usize], size: u64, mtime: u64, typeflag: u8) {
    write_octal(&mut block[OFF_MODE..OFF_MODE + 8], 0o644);
    write_octal(&mut block[OFF_UID..OFF_UID + 8], 0);
    write_octal(&mut block[OFF_GID..OFF_GID + 8], 0);
    write_octal(&mut block[OFF_SIZE..OFF_SIZE + 12], size);
    write_octal(&mut block[OFF_MTIME..OFF_MTIME + 12], mtime);
    block[OFF_TYPEFLAG] = typeflag;
    block[OFF_MAGIC..OFF_MAGIC + 6].copy_from_slice(b"ustar\0");
    block[OFF_VERSION..OFF_VERSION + 2].copy_from_slice(b"00");
    write_checksum(block);
}

/// Zero-padded octal digits terminated by NUL
fn write_octal(field: &mut [u8], value: u64) {
    let digits = field.len() - 1;
    let mut v = value;
    field[digits] = 0;
    for i in (0..digits).rev() {
        field[i] = b'0' + (v & 7) as u8;
        v >>= 3;
    }
}

/// Sum of all header octets with the checksum field read as spaces,
/// formatted as six octal digits, NUL, space
fn write_checksum(block: &mut [u8; BLOCK_SIZE as usize]) {
    block[OFF_CHKSUM..OFF_CHKSUM + 8].fill(b' ');
    let sum: u32 = block.iter().map(|&b| b as u32).sum();

    let field = &mut block[OFF_CHKSUM..OFF_CHKSUM + 8];
    let mut v = sum;
    for i in (0..6).rev() {
        field[i] = b'0' + (v & 7) as u8;
        v >>= 3;
    }
    field[6] = 0;
    field[7] = b' ';
}
