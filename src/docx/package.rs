use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::docx::workspace::destroy;
use crate::docx::{CONTENT_TYPES_PART, MEDIA_DIR};
use crate::error::{DocxError, Result};

/// Extracts every entry of `archive_path` into `dest_dir`.
///
/// The archive is opened and fully read (so CRC mismatches and unsafe entry
/// names surface) before the destination is touched. Only then is `dest_dir`
/// cleared and recreated. Returns the number of files written.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let open_err = |source: ZipError| DocxError::ArchiveOpen {
        path: archive_path.to_path_buf(),
        source,
    };

    let f = File::open(archive_path).map_err(|e| open_err(ZipError::Io(e)))?;
    let mut zip = ZipArchive::new(f).map_err(open_err)?;
    verify_entries(&mut zip).map_err(open_err)?;

    destroy(dest_dir)?;
    std::fs::create_dir_all(dest_dir).map_err(|e| DocxError::io(dest_dir, e))?;

    let mut written = 0usize;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(open_err)?;
        let rel = entry
            .enclosed_name()
            .ok_or_else(|| open_err(invalid_entry(entry.name())))?;
        let target = dest_dir.join(rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| DocxError::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocxError::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| DocxError::io(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| DocxError::io(&target, e))?;
        written += 1;
    }

    log::debug!(
        "extracted {written} entries from {} into {}",
        archive_path.display(),
        dest_dir.display()
    );
    Ok(written)
}

fn verify_entries(zip: &mut ZipArchive<File>) -> std::result::Result<(), ZipError> {
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.enclosed_name().is_none() {
            return Err(invalid_entry(entry.name()));
        }
        if !entry.is_dir() {
            // The reader checks the CRC once the entry is fully consumed.
            io::copy(&mut entry, &mut io::sink())?;
        }
    }
    Ok(())
}

fn invalid_entry(name: &str) -> ZipError {
    ZipError::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("unsafe entry name: {name}"),
    ))
}

/// Packs every regular file under `source_dir` into `output_path`.
///
/// Entry names are paths relative to `source_dir` with `/` separators.
/// `[Content_Types].xml` is written first, the rest in sorted order. Media is
/// stored, everything else deflated. Returns the number of entries written.
pub fn pack(source_dir: &Path, output_path: &Path) -> Result<usize> {
    let pack_err = |source: ZipError| DocxError::ArchivePack {
        path: output_path.to_path_buf(),
        source,
    };

    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| pack_err(ZipError::Io(e.into())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|_| pack_err(invalid_entry(&entry.path().display().to_string())))?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((name, entry.path().to_path_buf()));
    }
    files.sort_by_key(|(name, _)| name != CONTENT_TYPES_PART);

    let f = File::create(output_path).map_err(|e| pack_err(ZipError::Io(e)))?;
    let mut zout = ZipWriter::new(f);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let media_prefix = format!("{MEDIA_DIR}/");

    for (name, path) in &files {
        let data = std::fs::read(path).map_err(|e| DocxError::io(path, e))?;
        let opts = if name.starts_with(&media_prefix) {
            stored
        } else {
            deflated
        };
        zout.start_file(name.clone(), opts).map_err(pack_err)?;
        zout.write_all(&data)
            .map_err(|e| pack_err(ZipError::Io(e)))?;
    }
    zout.finish().map_err(pack_err)?;

    log::debug!(
        "packed {} entries from {} into {}",
        files.len(),
        source_dir.display(),
        output_path.display()
    );
    Ok(files.len())
}

/// Reads a single entry of an archive into memory.
pub fn read_entry(archive_path: &Path, name: &str) -> Result<Vec<u8>> {
    let open_err = |source: ZipError| DocxError::ArchiveOpen {
        path: archive_path.to_path_buf(),
        source,
    };
    let f = File::open(archive_path).map_err(|e| open_err(ZipError::Io(e)))?;
    let mut zip = ZipArchive::new(f).map_err(open_err)?;
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(DocxError::MissingPart(name.to_string())),
        Err(e) => return Err(open_err(e)),
    };
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut data)
        .map_err(|e| open_err(ZipError::Io(e)))?;
    Ok(data)
}

/// Lists entry names in archive order.
pub fn entry_names(archive_path: &Path) -> Result<Vec<String>> {
    let open_err = |source: ZipError| DocxError::ArchiveOpen {
        path: archive_path.to_path_buf(),
        source,
    };
    let f = File::open(archive_path).map_err(|e| open_err(ZipError::Io(e)))?;
    let zip = ZipArchive::new(f).map_err(open_err)?;
    Ok(zip.file_names().map(|n| n.to_string()).collect())
}
