//! Zip archive codec.
//!
//! Extraction treats every archive as untrusted: entry names are joined to
//! the destination lexically and must stay inside it, and entry sizes are
//! checked against hard limits before a single byte is written.

use crate::manifest::{MANIFEST_FILE, Manifest};
use crate::{Error, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Largest uncompressed entry accepted (1 TiB).
pub const MAX_ENTRY_SIZE: u64 = 1 << 40;
/// Largest accepted uncompressed/compressed ratio.
pub const MAX_COMPRESSION_RATIO: u64 = 100;
/// Bytes read past an entry's declared size before giving up.
pub const READ_SLACK: u64 = 10 * 1024 * 1024;

const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// Packs the whole tree under `source_dir` into `archive_path` and returns
/// the number of entries written.
pub fn compress(source_dir: &Path, archive_path: &Path) -> Result<usize> {
    let file = File::create(archive_path).map_err(|e| Error::io_at(archive_path, e))?;
    let mut zip = ZipWriter::new(file);
    let mut count = 0;

    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(source_dir) else {
            continue;
        };
        let name = entry_name(relative);
        let metadata = entry.metadata()?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(permission_bits(&metadata));

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options.large_file(metadata.len() >= u32::MAX as u64))?;
            let mut source = File::open(entry.path()).map_err(|e| Error::io_at(entry.path(), e))?;
            io::copy(&mut source, &mut zip).map_err(|e| Error::io_at(entry.path(), e))?;
        }
        count += 1;
    }

    zip.finish()?;
    info!("Wrote {} entries to {}", count, archive_path.display());
    Ok(count)
}

/// Unpacks `archive_path` into `dest_dir`, refusing traversal and
/// decompression-bomb entries. Returns the number of files written.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let mut archive = open(archive_path)?;
    fs::create_dir_all(dest_dir).map_err(|e| Error::io_at(dest_dir, e))?;
    let mut files = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let target = safe_join(dest_dir, &name)?;
        check_entry_size(&name, entry.compressed_size(), entry.size())?;

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io_at(&target, e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
        }
        let mode = entry.unix_mode();
        let limit = entry.size().saturating_add(READ_SLACK);
        let mut out = File::create(&target).map_err(|e| Error::io_at(&target, e))?;
        let written = io::copy(&mut (&mut entry).take(limit), &mut out)
            .map_err(|e| Error::io_at(&target, e))?;
        if written == limit {
            let mut probe = [0u8; 1];
            if entry.read(&mut probe).map_err(|e| Error::io_at(&target, e))? > 0 {
                return Err(Error::SuspiciousArchiveEntry {
                    entry: name,
                    reason: "entry data exceeds its declared size".into(),
                });
            }
        }
        apply_mode(&target, mode)?;

        debug!("Extracted {} ({} bytes)", name, written);
        files += 1;
    }

    info!("Extracted {} files from {}", files, archive_path.display());
    Ok(files)
}

/// Reads `metadata.yaml` straight out of the archive without extracting it.
pub fn read_manifest(archive_path: &Path) -> Result<Manifest> {
    let mut archive = open(archive_path)?;
    let mut entry = match archive.by_name(MANIFEST_FILE) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(Error::ManifestNotFound(archive_path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    check_entry_size(MANIFEST_FILE, entry.compressed_size(), entry.size())?;

    let limit = entry.size().saturating_add(READ_SLACK);
    let mut text = String::new();
    (&mut entry)
        .take(limit)
        .read_to_string(&mut text)
        .map_err(|e| Error::io_at(archive_path, e))?;
    Manifest::from_yaml(&text)
}

/// True for a `.zip` file starting with the local-file-header magic.
pub fn is_zip_file(path: &Path) -> Result<bool> {
    let has_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if !has_extension {
        return Ok(false);
    }

    let mut file = File::open(path).map_err(|e| Error::io_at(path, e))?;
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == ZIP_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(Error::io_at(path, e)),
    }
}

/// Joins an archive entry name onto `base` without touching the filesystem.
/// Absolute names, drive prefixes and `..` that would climb above `base`
/// are rejected.
pub fn safe_join(base: &Path, entry_name: &str) -> Result<PathBuf> {
    let unsafe_path = || Error::UnsafeArchivePath {
        entry: entry_name.to_string(),
    };

    let normalized = entry_name.replace('\\', "/");
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(unsafe_path());
    }

    let mut joined = base.to_path_buf();
    let mut depth = 0usize;
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if depth == 0 {
                    return Err(unsafe_path());
                }
                depth -= 1;
                joined.pop();
            }
            part => {
                if part.contains('\0') {
                    return Err(unsafe_path());
                }
                joined.push(part);
                depth += 1;
            }
        }
    }
    Ok(joined)
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Rejects entries whose declared size or compression ratio is implausible.
pub fn check_entry_size(entry: &str, compressed: u64, uncompressed: u64) -> Result<()> {
    if uncompressed > MAX_ENTRY_SIZE {
        return Err(Error::SuspiciousArchiveEntry {
            entry: entry.to_string(),
            reason: format!(
                "declared size {uncompressed} bytes exceeds the {MAX_ENTRY_SIZE} byte limit"
            ),
        });
    }
    if compressed > 0 && uncompressed > compressed.saturating_mul(MAX_COMPRESSION_RATIO) {
        return Err(Error::SuspiciousArchiveEntry {
            entry: entry.to_string(),
            reason: format!(
                "compression ratio {} exceeds {MAX_COMPRESSION_RATIO}",
                uncompressed / compressed
            ),
        });
    }
    Ok(())
}

fn open(archive_path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(archive_path).map_err(|e| Error::io_at(archive_path, e))?;
    match ZipArchive::new(BufReader::new(file)) {
        Ok(archive) => Ok(archive),
        Err(ZipError::InvalidArchive(_)) => Err(Error::NotAnArchive(archive_path.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
            .map_err(|e| Error::io_at(path, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_compress_and_extract_tree() {
        let work = TempDir::new().unwrap();
        let source = work.path().join("staging");
        fs::create_dir_all(source.join("install_dir/Saved/empty")).unwrap();
        fs::write(source.join("install_dir/Saved/slot1.sav"), b"slot one").unwrap();
        fs::write(source.join("metadata.yaml"), b"version: '1'\n").unwrap();

        let archive = work.path().join("foo_20240301_120000.zip");
        let entries = compress(&source, &archive).unwrap();
        assert_eq!(entries, 5);
        assert!(is_zip_file(&archive).unwrap());

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().trim_end_matches('/').to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "install_dir",
                "install_dir/Saved",
                "install_dir/Saved/empty",
                "install_dir/Saved/slot1.sav",
                "metadata.yaml",
            ]
        );

        let out = work.path().join("out");
        assert_eq!(extract(&archive, &out).unwrap(), 2);
        assert_eq!(fs::read(out.join("install_dir/Saved/slot1.sav")).unwrap(), b"slot one");
        assert!(out.join("install_dir/Saved/empty").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_survive() {
        use std::os::unix::fs::PermissionsExt;

        let work = TempDir::new().unwrap();
        let source = work.path().join("staging");
        fs::create_dir_all(&source).unwrap();
        let script = source.join("run.sh");
        fs::write(&script, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).unwrap();

        let archive = work.path().join("a.zip");
        compress(&source, &archive).unwrap();
        let out = work.path().join("out");
        extract(&archive, &out).unwrap();

        let mode = fs::metadata(out.join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_traversal_entry_rejected() {
        let work = TempDir::new().unwrap();
        let archive = work.path().join("evil.zip");
        write_zip(&archive, &[("../../etc/password", b"root::0:0")]);

        let dest = work.path().join("a/b/dest");
        let err = extract(&archive, &dest).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsafeArchivePath { ref entry } if entry == "../../etc/password"
        ));
        assert!(!work.path().join("a/etc").exists());
        assert!(!work.path().join("etc").exists());
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_safe_join() {
        let base = Path::new("/dest");
        assert_eq!(safe_join(base, "a/b.txt").unwrap(), PathBuf::from("/dest/a/b.txt"));
        assert_eq!(safe_join(base, "a/../b.txt").unwrap(), PathBuf::from("/dest/b.txt"));
        assert_eq!(safe_join(base, "./a/").unwrap(), PathBuf::from("/dest/a"));
        for name in ["../x", "a/../../x", "/etc/passwd", "C:/Windows/x", "c:x", "..\\..\\x"] {
            assert!(
                matches!(safe_join(base, name), Err(Error::UnsafeArchivePath { .. })),
                "{name} was accepted"
            );
        }
    }

    #[test]
    fn test_size_limits() {
        // 1 MB compressed declaring 10 GB uncompressed
        assert!(matches!(
            check_entry_size("bomb.bin", 1_000_000, 10_000_000_000),
            Err(Error::SuspiciousArchiveEntry { .. })
        ));
        assert!(matches!(
            check_entry_size("huge.bin", 0, MAX_ENTRY_SIZE + 1),
            Err(Error::SuspiciousArchiveEntry { .. })
        ));
        assert!(check_entry_size("ok.bin", 1_000, 100_000).is_ok());
        assert!(check_entry_size("empty", 0, 0).is_ok());
    }

    #[test]
    fn test_high_ratio_entry_rejected_before_write() {
        let work = TempDir::new().unwrap();
        let archive = work.path().join("zeros.zip");
        let zeros = vec![0u8; 4 * 1024 * 1024];
        write_zip(&archive, &[("install_dir/zeros.bin", &zeros)]);

        let dest = work.path().join("dest");
        assert!(matches!(
            extract(&archive, &dest),
            Err(Error::SuspiciousArchiveEntry { ref entry, .. }) if entry == "install_dir/zeros.bin"
        ));
        assert!(!dest.join("install_dir/zeros.bin").exists());
    }

    /// Deterministic bytes deflate can't shrink.
    fn noise(len: usize) -> Vec<u8> {
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 24) as u8
            })
            .collect()
    }

    fn patch_u32(bytes: &mut [u8], offset: usize, value: u32) {
        bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn test_entry_larger_than_declared_rejected() {
        let work = TempDir::new().unwrap();
        let archive = work.path().join("liar.zip");
        write_zip(&archive, &[("install_dir/big.bin", &noise(12 * 1024 * 1024))]);

        // Rewrite the declared uncompressed size to 1 MiB in the local
        // header and in the central directory header.
        let declared = 1024 * 1024;
        let mut bytes = fs::read(&archive).unwrap();
        assert_eq!(&bytes[..4], b"PK\x03\x04");
        patch_u32(&mut bytes, 22, declared);
        let central = bytes
            .windows(4)
            .rposition(|w| w == b"PK\x01\x02")
            .unwrap();
        patch_u32(&mut bytes, central + 24, declared);
        fs::write(&archive, &bytes).unwrap();

        let dest = work.path().join("dest");
        let err = extract(&archive, &dest).unwrap_err();
        assert!(
            matches!(
                err,
                Error::SuspiciousArchiveEntry { ref entry, .. } if entry == "install_dir/big.bin"
            ),
            "unexpected error: {err:?}"
        );
        let written = fs::metadata(dest.join("install_dir/big.bin")).unwrap().len();
        assert_eq!(written, declared as u64 + READ_SLACK);
    }

    #[test]
    fn test_read_manifest_without_extracting() {
        let work = TempDir::new().unwrap();
        let manifest = Manifest::new("foo", Vec::new());
        let archive = work.path().join("foo.zip");
        let yaml = manifest.to_yaml().unwrap();
        write_zip(&archive, &[(MANIFEST_FILE, yaml.as_bytes())]);

        assert_eq!(read_manifest(&archive).unwrap(), manifest);

        let bare = work.path().join("bare.zip");
        write_zip(&bare, &[("install_dir/save.dat", b"x")]);
        assert!(matches!(read_manifest(&bare), Err(Error::ManifestNotFound(_))));
    }

    #[test]
    fn test_is_zip_file() {
        let work = TempDir::new().unwrap();
        let fake = work.path().join("fake.zip");
        fs::write(&fake, b"not a zip").unwrap();
        assert!(!is_zip_file(&fake).unwrap());

        let short = work.path().join("short.zip");
        fs::write(&short, b"PK").unwrap();
        assert!(!is_zip_file(&short).unwrap());

        let real = work.path().join("real.ZIP");
        write_zip(&real, &[("a", b"a")]);
        assert!(is_zip_file(&real).unwrap());

        let wrong_ext = work.path().join("real.tar");
        fs::copy(&real, &wrong_ext).unwrap();
        assert!(!is_zip_file(&wrong_ext).unwrap());
    }
}
