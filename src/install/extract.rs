//! Archive extraction and asset copying
//!
//! - Zip bundles are spooled from the asset stream into an unnamed temp file,
//!   then unpacked entry by entry (in archive order) into a staging directory
//!   inside the destination and moved into place. Reading through the central
//!   directory accepts entries whose sizes only follow in a data descriptor.
//!   The entry containing the sentinel is moved last, so a crash or a corrupt
//!   archive never leaves a sentinel behind that claims the set is installed.
//! - Tar.gz resources are either copied verbatim for an external tool to
//!   unpack, or unpacked in-process.

use std::ffi::OsString;
use std::fs;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use log::{debug, info, warn};
use tar::Archive;
use zip::ZipArchive;

use super::assets::AssetSource;
use super::error::{ProvisionError, Result};

const BUFFER_SIZE: usize = 4096;
const STAGING_PREFIX: &str = ".staging-";

/// Unpack a zip stream into `dest`, staged so `sentinel` appears last.
///
/// Returns the number of entries extracted.
pub fn unzip_staged<R: Read>(reader: R, dest: &Path, sentinel: &Path) -> Result<usize> {
    remove_stale_staging(dest)?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(dest)
        .map_err(|e| ProvisionError::io(dest, e))?;

    let count = unzip_stream(reader, staging.path())?;
    promote(staging.path(), dest, sentinel)?;

    // TempDir removes whatever is left of the staging directory on drop.
    Ok(count)
}

/// Drop staging trees left behind by a process that was killed mid-extraction.
fn remove_stale_staging(dest: &Path) -> Result<()> {
    let entries = fs::read_dir(dest).map_err(|e| ProvisionError::io(dest, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ProvisionError::io(dest, e))?;
        if !entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
            continue;
        }
        let path = entry.path();
        warn!("Removing stale staging directory {}", path.display());
        let removed = if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| ProvisionError::io(&path, e))?;
    }
    Ok(())
}

/// Unpack every entry of a zip stream into `dest`, in archive order.
pub fn unzip_stream<R: Read>(mut reader: R, dest: &Path) -> Result<usize> {
    let mut buf = [0u8; BUFFER_SIZE];

    // Unnamed, so nothing shows up in `dest` and it vanishes on drop
    let mut spool = tempfile::tempfile_in(dest).map_err(|e| ProvisionError::io(dest, e))?;
    copy_buffered(&mut reader, &mut spool, &mut buf, dest)?;
    spool
        .seek(SeekFrom::Start(0))
        .map_err(|e| ProvisionError::io(dest, e))?;

    let mut archive = ZipArchive::new(spool)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let rel = entry
            .enclosed_name()
            .ok_or_else(|| ProvisionError::UnsafeEntry {
                name: entry.name().to_string(),
            })?;
        let out = dest.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&out).map_err(|e| ProvisionError::io(&out, e))?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).map_err(|e| ProvisionError::io(parent, e))?;
            }
            let file = fs::File::create(&out).map_err(|e| ProvisionError::io(&out, e))?;
            let mut writer = BufWriter::new(file);
            copy_buffered(&mut entry, &mut writer, &mut buf, &out)?;
            writer.flush().map_err(|e| ProvisionError::io(&out, e))?;
        }

        debug!("Extracted {}", rel.display());
    }

    Ok(archive.len())
}

/// Move the staged tree into `dest`, merging into existing directories.
fn promote(staging: &Path, dest: &Path, sentinel: &Path) -> Result<()> {
    let sentinel_root: Option<OsString> = sentinel.components().find_map(|c| match c {
        Component::Normal(part) => Some(part.to_os_string()),
        _ => None,
    });

    let entries = fs::read_dir(staging).map_err(|e| ProvisionError::io(staging, e))?;
    let mut deferred = None;
    for entry in entries {
        let entry = entry.map_err(|e| ProvisionError::io(staging, e))?;
        let name = entry.file_name();
        if sentinel_root.as_ref() == Some(&name) {
            deferred = Some(name);
            continue;
        }
        merge_into(&entry.path(), &dest.join(&name))?;
    }

    if let Some(name) = deferred {
        merge_into(&staging.join(&name), &dest.join(&name))?;
    }
    Ok(())
}

fn merge_into(src: &Path, dst: &Path) -> Result<()> {
    let src_is_dir = fs::symlink_metadata(src)
        .map_err(|e| ProvisionError::io(src, e))?
        .is_dir();
    let dst_is_dir = fs::symlink_metadata(dst).map(|m| m.is_dir()).unwrap_or(false);

    if src_is_dir && dst_is_dir {
        for entry in fs::read_dir(src).map_err(|e| ProvisionError::io(src, e))? {
            let entry = entry.map_err(|e| ProvisionError::io(src, e))?;
            merge_into(&entry.path(), &dst.join(entry.file_name()))?;
        }
        return Ok(());
    }

    fs::rename(src, dst).map_err(|e| ProvisionError::io(dst, e))
}

/// Copy the asset `name` verbatim to `<dest>/<name>`.
///
/// Written under a `.part` name first and renamed once complete.
pub fn copy_asset(source: &dyn AssetSource, name: &str, dest: &Path) -> Result<PathBuf> {
    let mut reader = source.open(name)?;

    let target = dest.join(name);
    let partial = dest.join(format!("{name}.part"));
    let file = fs::File::create(&partial).map_err(|e| ProvisionError::io(&partial, e))?;
    let mut writer = BufWriter::new(file);
    let mut buf = [0u8; BUFFER_SIZE];
    let copied = copy_buffered(&mut reader, &mut writer, &mut buf, &partial)?;
    writer.flush().map_err(|e| ProvisionError::io(&partial, e))?;
    drop(writer);

    fs::rename(&partial, &target).map_err(|e| ProvisionError::io(&target, e))?;
    info!("Copied {name} ({copied} bytes) to {}", target.display());
    Ok(target)
}

/// Unpack a gzip-compressed tar archive into `dest` without external tools.
pub fn unpack_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive).map_err(|e| ProvisionError::io(archive, e))?;
    let mut tar = Archive::new(GzDecoder::new(file));
    tar.unpack(dest).map_err(|e| ProvisionError::io(archive, e))
}

fn copy_buffered(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    buf: &mut [u8],
    path: &Path,
) -> Result<u64> {
    let mut total = 0u64;
    loop {
        let n = reader.read(buf).map_err(|e| ProvisionError::io(path, e))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .map_err(|e| ProvisionError::io(path, e))?;
        total += n as u64;
    }
    Ok(total)
}
