//! Sidecar binary codec.
//!
//! # Format
//!
//! All integers are little-endian u64; section tags are eight ASCII bytes,
//! zero padded, read as a little-endian u64.
//!
//! ```text
//! header:   tag "DirDB", version
//! TOC:      tag "TOC",     entry count, entry stride (>= 16)
//!           entries: size, first file index   (padded to the stride)
//! FILES:    tag "FILES",   entry count, entry stride (>= 48)
//!           entries: name offset, hash lo, hash hi, inode,
//!                    mtime (FILETIME), link count   (padded to the stride)
//! STRINGS:  tag "STRINGS", byte count, raw string data
//! ```
//!
//! File sizes are not stored per entry; entries are sorted by (size, name)
//! and the TOC records the first entry index of each distinct size. Names
//! live in the STRINGS blob as length-prefixed, non-terminated byte runs
//! (see [`append_length_string`]). Unknown trailing bytes inside a declared
//! entry stride are skipped, so future fields can be appended without
//! breaking old readers.
//!
//! Any structural violation produces a [`DirdbError::Codec`] naming the
//! failing field; no partial catalog is ever returned.

use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::{DirCatalog, FileEntry, SIDECAR_NAME};
use crate::error::{DirdbError, Result};
use crate::hasher::Hash128;
use crate::paths::normalize_path;

/// Current sidecar format version.
pub const DIRDB_VERSION: u64 = 1;

/// Canonical strides written by this encoder.
const TOC_ENTRY_BYTES: u64 = 16;
const FILE_ENTRY_BYTES: u64 = 48;

/// Pack up to eight ASCII bytes into a little-endian tag word.
fn make_tag(tag: &str) -> u64 {
    let mut value = 0u64;
    for (index, byte) in tag.bytes().take(8).enumerate() {
        value |= u64::from(byte) << (8 * index);
    }
    value
}

/// Path of the sidecar inside `dir`.
#[must_use]
pub fn sidecar_path(dir: &Path) -> PathBuf {
    dir.join(SIDECAR_NAME)
}

fn append_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Append a length-prefixed string: lengths up to 0xfc use one byte,
/// larger lengths use a marker byte (0xff/0xfe/0xfd) followed by a
/// little-endian u16/u32/u64.
fn append_length_string(out: &mut Vec<u8>, s: &str) {
    let len = s.len();
    if len <= 0xfc {
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(0xff);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else if len <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    } else {
        out.push(0xfd);
        out.extend_from_slice(&(len as u64).to_le_bytes());
    }
    out.extend_from_slice(s.as_bytes());
}

/// Serialize catalog entries into a sidecar blob (canonical form).
///
/// Entries must already be in catalog order; names are appended to the
/// string blob in entry order.
#[must_use]
pub fn encode(files: &[FileEntry]) -> Vec<u8> {
    let toc = crate::catalog::toc_runs(files);

    let mut strings = Vec::new();
    let mut name_offsets = Vec::with_capacity(files.len());
    for file in files {
        name_offsets.push(strings.len() as u64);
        append_length_string(&mut strings, &file.name);
    }

    let mut out = Vec::new();
    append_u64(&mut out, make_tag("DirDB"));
    append_u64(&mut out, DIRDB_VERSION);

    append_u64(&mut out, make_tag("TOC"));
    append_u64(&mut out, toc.len() as u64);
    append_u64(&mut out, TOC_ENTRY_BYTES);
    for (size, file_index) in toc {
        append_u64(&mut out, size);
        append_u64(&mut out, file_index);
    }

    append_u64(&mut out, make_tag("FILES"));
    append_u64(&mut out, files.len() as u64);
    append_u64(&mut out, FILE_ENTRY_BYTES);
    for (file, name_offset) in files.iter().zip(&name_offsets) {
        append_u64(&mut out, *name_offset);
        append_u64(&mut out, file.hash.lo);
        append_u64(&mut out, file.hash.hi);
        append_u64(&mut out, file.inode);
        append_u64(&mut out, file.mtime);
        append_u64(&mut out, file.num_links);
    }

    append_u64(&mut out, make_tag("STRINGS"));
    append_u64(&mut out, strings.len() as u64);
    out.extend_from_slice(&strings);
    out
}

/// Cursor over a sidecar blob with field-level error context.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> Reader<'a> {
    fn read_u64(&mut self, what: &str) -> Result<u64> {
        let end = self.pos.checked_add(8).filter(|&e| e <= self.data.len());
        let Some(end) = end else {
            return Err(DirdbError::codec(
                self.path,
                format!("unexpected end of data while reading {what}"),
            ));
        };
        let value = u64::from_le_bytes(self.data[self.pos..end].try_into().unwrap());
        self.pos = end;
        Ok(value)
    }

    fn expect_tag(&mut self, tag: &str) -> Result<()> {
        let value = self.read_u64(&format!("{tag} tag"))?;
        if value != make_tag(tag) {
            return Err(DirdbError::codec(self.path, format!("missing {tag} tag")));
        }
        Ok(())
    }

    /// Jump past declared per-entry padding.
    fn seek_entry_end(&mut self, entry_start: usize, stride: u64, what: &str) -> Result<()> {
        let end = entry_start
            .checked_add(stride as usize)
            .filter(|&e| e <= self.data.len());
        match end {
            Some(end) => {
                self.pos = end;
                Ok(())
            }
            None => Err(DirdbError::codec(
                self.path,
                format!("unexpected end of data inside {what}"),
            )),
        }
    }
}

/// Read one length-prefixed string out of the STRINGS blob.
fn read_length_string(strings: &[u8], offset: u64, path: &Path) -> Result<String> {
    let offset = offset as usize;
    if offset >= strings.len() {
        return Err(DirdbError::codec(path, "name offset out of range"));
    }
    let mut pos = offset;
    let prefix = strings[pos];
    pos += 1;
    let len = match prefix {
        0x00..=0xfc => u64::from(prefix),
        0xff => {
            let bytes: [u8; 2] = strings
                .get(pos..pos + 2)
                .ok_or_else(|| DirdbError::codec(path, "truncated 2-byte string length"))?
                .try_into()
                .unwrap();
            pos += 2;
            u64::from(u16::from_le_bytes(bytes))
        }
        0xfe => {
            let bytes: [u8; 4] = strings
                .get(pos..pos + 4)
                .ok_or_else(|| DirdbError::codec(path, "truncated 4-byte string length"))?
                .try_into()
                .unwrap();
            pos += 4;
            u64::from(u32::from_le_bytes(bytes))
        }
        0xfd => {
            let bytes: [u8; 8] = strings
                .get(pos..pos + 8)
                .ok_or_else(|| DirdbError::codec(path, "truncated 8-byte string length"))?
                .try_into()
                .unwrap();
            pos += 8;
            u64::from_le_bytes(bytes)
        }
    };
    let end = (pos as u64).checked_add(len).map(|e| e as usize);
    let bytes = end
        .and_then(|e| strings.get(pos..e))
        .ok_or_else(|| DirdbError::codec(path, "string length out of range"))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Deserialize a sidecar blob into catalog entries.
///
/// `db_path` is used only for error messages.
///
/// # Errors
///
/// [`DirdbError::Codec`] on any structural violation: wrong tag, unknown
/// version, undersized entry stride, truncated section, inconsistent TOC or
/// out-of-range name offset.
pub fn decode(data: &[u8], db_path: &Path) -> Result<Vec<FileEntry>> {
    let mut reader = Reader {
        data,
        pos: 0,
        path: db_path,
    };

    reader.expect_tag("DirDB")?;
    let version = reader.read_u64("version")?;
    if version != DIRDB_VERSION {
        return Err(DirdbError::codec(
            db_path,
            format!("unsupported version {version}"),
        ));
    }

    reader.expect_tag("TOC")?;
    let toc_count = reader.read_u64("TOC entry count")?;
    let toc_stride = reader.read_u64("TOC entry size")?;
    if toc_stride < TOC_ENTRY_BYTES {
        return Err(DirdbError::codec(
            db_path,
            format!("TOC entry size {toc_stride} below minimum {TOC_ENTRY_BYTES}"),
        ));
    }
    let mut toc = Vec::new();
    for _ in 0..toc_count {
        let entry_start = reader.pos;
        let size = reader.read_u64("TOC size")?;
        let file_index = reader.read_u64("TOC file index")?;
        reader.seek_entry_end(entry_start, toc_stride, "TOC entry")?;
        toc.push((size, file_index));
    }

    reader.expect_tag("FILES")?;
    let file_count = reader.read_u64("file entry count")?;
    let file_stride = reader.read_u64("file entry size")?;
    if file_stride < FILE_ENTRY_BYTES {
        return Err(DirdbError::codec(
            db_path,
            format!("file entry size {file_stride} below minimum {FILE_ENTRY_BYTES}"),
        ));
    }
    struct RawEntry {
        name_offset: u64,
        hash: Hash128,
        inode: u64,
        mtime: u64,
        num_links: u64,
    }
    let mut raw_entries = Vec::new();
    for _ in 0..file_count {
        let entry_start = reader.pos;
        let name_offset = reader.read_u64("name offset")?;
        let lo = reader.read_u64("hash lo")?;
        let hi = reader.read_u64("hash hi")?;
        let inode = reader.read_u64("inode")?;
        let mtime = reader.read_u64("mtime")?;
        let num_links = reader.read_u64("link count")?;
        reader.seek_entry_end(entry_start, file_stride, "file entry")?;
        raw_entries.push(RawEntry {
            name_offset,
            hash: Hash128 { hi, lo },
            inode,
            mtime,
            num_links,
        });
    }

    reader.expect_tag("STRINGS")?;
    let strings_len = reader.read_u64("strings size")? as usize;
    let strings_end = reader.pos.checked_add(strings_len);
    let strings = strings_end
        .and_then(|end| data.get(reader.pos..end))
        .ok_or_else(|| DirdbError::codec(db_path, "STRINGS size out of range"))?;

    // Reconstruct per-entry sizes from the TOC runs.
    let mut sizes = vec![0u64; raw_entries.len()];
    if !raw_entries.is_empty() {
        if toc.is_empty() {
            return Err(DirdbError::codec(db_path, "missing TOC entries"));
        }
        if toc[0].1 != 0 {
            return Err(DirdbError::codec(db_path, "TOC does not start at index 0"));
        }
    }
    for (run, &(size, start)) in toc.iter().enumerate() {
        let end = toc
            .get(run + 1)
            .map_or(raw_entries.len() as u64, |next| next.1);
        if start > end || end > raw_entries.len() as u64 {
            return Err(DirdbError::codec(db_path, "inconsistent TOC file index"));
        }
        for slot in &mut sizes[start as usize..end as usize] {
            *slot = size;
        }
    }

    let mut files = Vec::with_capacity(raw_entries.len());
    for (raw, size) in raw_entries.into_iter().zip(sizes) {
        files.push(FileEntry {
            name: read_length_string(strings, raw.name_offset, db_path)?,
            size,
            hash: raw.hash,
            inode: raw.inode,
            mtime: raw.mtime,
            num_links: raw.num_links,
        });
    }
    Ok(files)
}

/// Read and decode the sidecar of `dir`.
pub fn read_catalog(dir: &Path) -> Result<DirCatalog> {
    let db_path = sidecar_path(dir);
    let data = fs::read(&db_path).map_err(|e| DirdbError::io(&db_path, e))?;
    let files = decode(&data, &db_path)?;
    Ok(DirCatalog {
        path: normalize_path(dir),
        files,
        db_size: data.len() as u64,
        hashed_bytes: 0,
        hash_seconds: 0.0,
    })
}

/// Encode and atomically replace the sidecar of `dir`.
///
/// The blob is written to a sibling temporary which is then renamed over
/// the sidecar, so readers never observe a partial catalog. Returns the
/// sidecar size in bytes.
pub fn write_catalog(dir: &Path, files: &[FileEntry]) -> Result<u64> {
    let db_path = sidecar_path(dir);
    let tmp_path = dir.join(format!("{SIDECAR_NAME}.tmp"));
    let blob = encode(files);
    fs::write(&tmp_path, &blob).map_err(|e| DirdbError::io(&tmp_path, e))?;
    if let Err(e) = fs::rename(&tmp_path, &db_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(DirdbError::io(&db_path, e));
    }
    Ok(blob.len() as u64)
}
