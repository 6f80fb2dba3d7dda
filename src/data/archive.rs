use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use xz2::read::XzDecoder;
use zip::ZipArchive;

use super::error::Result;

// ---------------------------------------------------------------------------
// Extraction primitive
// ---------------------------------------------------------------------------

/// Unpacks an archive into an existing directory.
///
/// Only called by the [`Loader`](super::loader::Loader) when the extraction
/// directory does not exist yet.
pub trait Extractor {
    /// Extract every member of a zip archive into `dest`.
    fn extract_zip(&self, archive: &Path, dest: &Path) -> Result<()>;

    /// Decompress a single xz stream into `dest`, returning the written file.
    fn decompress_xz(&self, archive: &Path, dest: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsExtractor;

impl Extractor for FsExtractor {
    fn extract_zip(&self, archive: &Path, dest: &Path) -> Result<()> {
        let file = File::open(archive)?;
        let mut zip = ZipArchive::new(BufReader::new(file))?;
        zip.extract(dest)?;
        Ok(())
    }

    fn decompress_xz(&self, archive: &Path, dest: &Path) -> Result<PathBuf> {
        let out_path = dest.join(xz_output_name(archive));
        let mut decoder = XzDecoder::new(BufReader::new(File::open(archive)?));
        let mut out = BufWriter::new(File::create(&out_path)?);
        io::copy(&mut decoder, &mut out)?;
        out.flush()?;
        Ok(out_path)
    }
}

/// Name of the file an xz stream decompresses to: the archive's file name
/// without `.xz`, with `.csv` appended when nothing else is left to tell the
/// format (`PP_users.csv.xz` -> `PP_users.csv`, `dump.xz` -> `dump.csv`).
pub fn xz_output_name(archive: &Path) -> String {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if Path::new(&stem).extension().is_some() {
        stem
    } else {
        format!("{stem}.csv")
    }
}

/// Directory an archive extracts into: the path without its final
/// extension, plus `suffix` (`RAW_recipes.csv.zip` -> `RAW_recipes.csv_extracted`).
pub fn extraction_dir(archive: &Path, suffix: &str) -> PathBuf {
    let mut name = archive.with_extension("").into_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Regular files directly inside `dir`, sorted by path.
pub fn list_members(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut members = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            members.push(entry.path());
        }
    }
    members.sort();
    Ok(members)
}
