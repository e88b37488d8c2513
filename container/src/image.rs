//! # Container image codec
//!
//! The flat image format, bit-exactly:
//!
//! ```text
//! [1 byte]   file count N (0..=255)
//! N records:
//!   [8 bytes]   little-endian file size S
//!   [256 bytes] filename, NUL-terminated, zero-padded
//!   [S bytes]   payload
//! ```
//!
//! No checksums, no alignment padding, no directories. A zero-file image
//! is the single byte `0x00`.
//!
//! Unpacking goes through a staging directory that is renamed into place
//! only after the entire image has been read, so the final path never
//! holds a partial tree. Packing enumerates the directory once and
//! reuses the buffered listing for both the count and the stream, which
//! makes the output deterministic for identical directory contents.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use corral_fs::{path, DirEntry, FileHandle, FileKind, FsError, OpenOptions, Vfs};

use crate::error::{ContainerError, ContainerResult};

/// Most files one image can carry: the count must fit in one byte.
pub const IMAGE_MAX_FILES: usize = 255;

/// Size of the on-media filename field, terminator included.
pub const IMAGE_NAME_FIELD: usize = 256;

/// Flash-friendly copy unit.
const COPY_CHUNK: usize = 512;

/// Unpack the image at `image_path` into `final_dir`.
///
/// Missing ancestors of `final_dir` are created on demand; a
/// pre-existing `final_dir` fails with [`ContainerError::AlreadyExists`].
/// Records land in `stage_dir`, which is renamed to `final_dir` after
/// the last byte is read; on any failure the stage is removed.
pub fn unpack(
    vfs: &dyn Vfs,
    image_path: &str,
    final_dir: &str,
    stage_dir: &str,
) -> ContainerResult<()> {
    ensure_dirs(vfs, path::parent(final_dir))?;
    if vfs.stat(final_dir).is_ok() {
        return Err(ContainerError::AlreadyExists);
    }
    // A stage left over from an interrupted run is stale; clear it.
    if vfs.stat(stage_dir).is_ok() {
        remove_tree(vfs, stage_dir)?;
    }

    let img = vfs.open(image_path, OpenOptions::read_only())?;
    if let Err(e) = vfs.mkdir(stage_dir) {
        let _ = vfs.close(img);
        return Err(e.into());
    }
    let result = unpack_records(vfs, img, stage_dir);
    let _ = vfs.close(img);

    if let Err(e) = result {
        if let Err(cleanup) = remove_tree(vfs, stage_dir) {
            log::warn!("stage {} not removed after failed unpack: {}", stage_dir, cleanup);
        }
        return Err(e);
    }
    if let Err(e) = vfs.rename(stage_dir, final_dir) {
        let _ = remove_tree(vfs, stage_dir);
        return Err(e.into());
    }
    log::info!("unpacked {} into {}", image_path, final_dir);
    Ok(())
}

fn unpack_records(vfs: &dyn Vfs, img: FileHandle, stage_dir: &str) -> ContainerResult<()> {
    let mut count_buf = [0u8; 1];
    read_exact(vfs, img, &mut count_buf)?;
    let count = usize::from(count_buf[0]);

    for _ in 0..count {
        let mut size_buf = [0u8; 8];
        read_exact(vfs, img, &mut size_buf)?;
        let size = u64::from_le_bytes(size_buf);

        let mut name_buf = [0u8; IMAGE_NAME_FIELD];
        read_exact(vfs, img, &mut name_buf)?;
        // The last byte is forced to NUL, so a terminator always exists.
        name_buf[IMAGE_NAME_FIELD - 1] = 0;
        let nul = name_buf
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(IMAGE_NAME_FIELD - 1);
        let name =
            core::str::from_utf8(&name_buf[..nul]).map_err(|_| ContainerError::ImageCorrupt)?;
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(ContainerError::ImageCorrupt);
        }

        let dest = format!("{}/{}", stage_dir.trim_end_matches('/'), name);
        let out = vfs.open(&dest, OpenOptions::create_for_write())?;
        let copied = copy_exact(vfs, img, out, size);
        let _ = vfs.close(out);
        copied?;
    }
    Ok(())
}

/// Pack the regular files of `src_dir` into an image at `out_path`.
///
/// Subdirectories (and dot entries, on stores that report them) are
/// skipped. More than [`IMAGE_MAX_FILES`] files fail; names longer than
/// 255 bytes are truncated into the field. A failed pack removes the
/// partial output file.
pub fn pack(vfs: &dyn Vfs, src_dir: &str, out_path: &str) -> ContainerResult<()> {
    // One buffered enumeration serves the count and the stream.
    let entries = vfs.read_dir(src_dir)?;
    let files: Vec<&DirEntry> = entries
        .iter()
        .filter(|e| e.kind == FileKind::File && e.name != "." && e.name != "..")
        .collect();
    if files.len() > IMAGE_MAX_FILES {
        return Err(ContainerError::TooManyFiles);
    }

    let out = vfs.open(out_path, OpenOptions::create_for_write())?;
    let result = pack_records(vfs, src_dir, &files, out);
    let _ = vfs.close(out);

    if let Err(e) = result {
        if vfs.remove(out_path).is_err() {
            log::warn!("partial image {} not removed after failed pack", out_path);
        }
        return Err(e);
    }
    log::info!("packed {} files from {} into {}", files.len(), src_dir, out_path);
    Ok(())
}

fn pack_records(
    vfs: &dyn Vfs,
    src_dir: &str,
    files: &[&DirEntry],
    out: FileHandle,
) -> ContainerResult<()> {
    write_all(vfs, out, &[files.len() as u8])?;

    for entry in files {
        let src_path = format!("{}/{}", src_dir.trim_end_matches('/'), entry.name);
        let size = vfs.stat(&src_path)?.size;

        write_all(vfs, out, &size.to_le_bytes())?;

        let mut name_buf = [0u8; IMAGE_NAME_FIELD];
        let name_bytes = entry.name.as_bytes();
        let n = name_bytes.len().min(IMAGE_NAME_FIELD - 1);
        name_buf[..n].copy_from_slice(&name_bytes[..n]);
        write_all(vfs, out, &name_buf)?;

        let src = vfs.open(&src_path, OpenOptions::read_only())?;
        let copied = copy_exact(vfs, src, out, size);
        let _ = vfs.close(src);
        copied?;
    }
    Ok(())
}

/// Copy exactly `size` bytes between two open handles.
fn copy_exact(vfs: &dyn Vfs, src: FileHandle, dst: FileHandle, size: u64) -> ContainerResult<()> {
    let mut chunk = [0u8; COPY_CHUNK];
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(COPY_CHUNK as u64) as usize;
        read_exact(vfs, src, &mut chunk[..n])?;
        write_all(vfs, dst, &chunk[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

fn read_exact(vfs: &dyn Vfs, h: FileHandle, buf: &mut [u8]) -> ContainerResult<()> {
    let mut off = 0;
    while off < buf.len() {
        match vfs.read(h, &mut buf[off..])? {
            // A short stream is a truncated image.
            0 => return Err(ContainerError::ImageCorrupt),
            n => off += n,
        }
    }
    Ok(())
}

fn write_all(vfs: &dyn Vfs, h: FileHandle, buf: &[u8]) -> ContainerResult<()> {
    let mut off = 0;
    while off < buf.len() {
        match vfs.write(h, &buf[off..])? {
            0 => return Err(ContainerError::Fs(FsError::NoSpace)),
            n => off += n,
        }
    }
    Ok(())
}

/// Create the canonical image store (and its ancestors) if missing.
pub fn ensure_image_store(vfs: &dyn Vfs) -> ContainerResult<()> {
    ensure_dirs(vfs, crate::manager::IMAGE_DIR)
}

/// Create every missing directory along `dir`.
pub(crate) fn ensure_dirs(vfs: &dyn Vfs, dir: &str) -> ContainerResult<()> {
    let mut cur = String::new();
    for seg in dir.split('/').filter(|s| !s.is_empty()) {
        cur.push('/');
        cur.push_str(seg);
        match vfs.stat(&cur) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(ContainerError::Fs(FsError::NotDirectory)),
            Err(FsError::NotFound) => vfs.mkdir(&cur)?,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Remove a directory tree, depth first.
pub(crate) fn remove_tree(vfs: &dyn Vfs, dir: &str) -> Result<(), FsError> {
    for entry in vfs.read_dir(dir)? {
        let child = format!("{}/{}", dir.trim_end_matches('/'), entry.name);
        match entry.kind {
            FileKind::Dir => remove_tree(vfs, &child)?,
            FileKind::File => vfs.remove(&child)?,
        }
    }
    vfs.remove(dir)
}
