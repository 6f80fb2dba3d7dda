use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info};

use super::archive::{extraction_dir, list_members, Extractor, FsExtractor};
use super::error::{DataError, Result};
use super::format::FileFormat;
use super::model::Table;
use super::reader::{FsReader, TableReader};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Appended to the archive path (minus its extension) to name the
    /// extraction directory.
    pub extract_suffix: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extract_suffix: "_extracted".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Table cache
// ---------------------------------------------------------------------------

/// Memoized tables keyed by the exact path string passed to
/// [`Loader::load`]. File contents and mtimes are never consulted.
#[derive(Debug, Default, Clone)]
pub struct TableCache {
    tables: HashMap<String, Arc<Table>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<Table>> {
        self.tables.get(key).cloned()
    }

    pub fn insert(&mut self, key: impl Into<String>, table: Arc<Table>) {
        self.tables.insert(key.into(), table);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tables.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Resolves file references to tables, hiding archive formats.
///
/// Not synchronized: share it behind a lock if several threads load.
pub struct Loader {
    reader: Box<dyn TableReader>,
    extractor: Box<dyn Extractor>,
    cache: TableCache,
    extractions: HashMap<PathBuf, Vec<PathBuf>>,
    config: LoaderConfig,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// Filesystem-backed loader with the default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::default()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    /// Forget every memoized table and extraction listing. Extraction
    /// directories on disk are left alone.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.extractions.clear();
    }

    /// Load a table from a `.csv`, `.zip`, `.xz`, `.pkl`, `.parquet` or
    /// `.json` file.
    ///
    /// Results are memoized on the path string. Failures are logged and
    /// returned; nothing is cached for them.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<Arc<Table>> {
        let path = path.as_ref();
        let key = path.to_string_lossy().into_owned();

        if let Some(table) = self.cache.get(&key) {
            debug!("Cache hit for {key}");
            return Ok(table);
        }

        match self.load_uncached(path) {
            Ok(table) => {
                let table = Arc::new(table);
                self.cache.insert(key, Arc::clone(&table));
                Ok(table)
            }
            Err(e) => {
                error!("Error while loading data from {}: {e}", path.display());
                Err(e)
            }
        }
    }

    fn load_uncached(&mut self, path: &Path) -> Result<Table> {
        let format = FileFormat::detect(path);
        match format {
            FileFormat::Unknown => Err(DataError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
            FileFormat::Zip | FileFormat::Xz => {
                let members = self.extract_members(path, format)?;
                let member = members
                    .iter()
                    .find(|m| FileFormat::detect(m) == FileFormat::Csv)
                    .ok_or_else(|| DataError::NoTabularMember {
                        archive: path.to_path_buf(),
                    })?;
                debug!("Using member {} of {}", member.display(), path.display());
                let table = self.reader.read(member, FileFormat::Csv)?;
                info!("Loaded CSV from archive: {}", member.display());
                Ok(table)
            }
            _ => {
                let table = self.reader.read(path, format)?;
                info!("Loaded {format:?} file: {}", path.display());
                Ok(table)
            }
        }
    }

    /// Extract a `.zip` or `.xz` archive next to itself and list the
    /// extracted files (sorted by path).
    ///
    /// Extraction is skipped when the target directory already exists.
    pub fn extract(&mut self, archive: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let archive = archive.as_ref();
        let format = FileFormat::detect(archive);

        let result = if format.is_archive() {
            self.extract_members(archive, format)
        } else {
            Err(DataError::UnsupportedFormat {
                path: archive.to_path_buf(),
            })
        };

        if let Err(e) = &result {
            error!("Error while extracting {}: {e}", archive.display());
        }
        result
    }

    fn extract_members(&mut self, archive: &Path, format: FileFormat) -> Result<Vec<PathBuf>> {
        if let Some(members) = self.extractions.get(archive) {
            debug!("Extraction of {} already listed", archive.display());
            return Ok(members.clone());
        }

        let dir = extraction_dir(archive, &self.config.extract_suffix);
        let reused = dir.exists();
        if !reused {
            fs::create_dir_all(&dir)?;
            if let Err(e) = self.run_extractor(archive, &dir, format) {
                // A half-filled directory would pass for a valid cache next time.
                let _ = fs::remove_dir_all(&dir);
                return Err(e);
            }
        }

        let members = list_members(&dir)?;
        match (reused, format) {
            (true, _) => info!(
                "Reusing existing extraction of {} in {}",
                archive.display(),
                dir.display()
            ),
            (false, FileFormat::Xz) => info!(
                "Decompressed {} successfully into {}",
                archive.display(),
                dir.display()
            ),
            (false, _) => info!(
                "Unzipped {} successfully into {}",
                archive.display(),
                dir.display()
            ),
        }
        self.extractions
            .insert(archive.to_path_buf(), members.clone());
        Ok(members)
    }

    fn run_extractor(&self, archive: &Path, dir: &Path, format: FileFormat) -> Result<()> {
        match format {
            FileFormat::Zip => self.extractor.extract_zip(archive, dir),
            FileFormat::Xz => {
                let written = self.extractor.decompress_xz(archive, dir)?;
                debug!("Decompressed {} to {}", archive.display(), written.display());
                Ok(())
            }
            _ => Err(DataError::UnsupportedFormat {
                path: archive.to_path_buf(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Swaps in custom primitives, a pre-filled cache or a different config.
#[derive(Default)]
pub struct LoaderBuilder {
    reader: Option<Box<dyn TableReader>>,
    extractor: Option<Box<dyn Extractor>>,
    cache: TableCache,
    config: LoaderConfig,
}

impl LoaderBuilder {
    pub fn reader(mut self, reader: impl TableReader + 'static) -> Self {
        self.reader = Some(Box::new(reader));
        self
    }

    pub fn extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractor = Some(Box::new(extractor));
        self
    }

    pub fn cache(mut self, cache: TableCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Loader {
        Loader {
            reader: self.reader.unwrap_or_else(|| Box::new(FsReader)),
            extractor: self.extractor.unwrap_or_else(|| Box::new(FsExtractor)),
            cache: self.cache,
            extractions: HashMap::new(),
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{CellValue, Column};
    use std::cell::Cell;
    use std::fs::File;
    use std::io::Write;
    use std::rc::Rc;
    use std::sync::{Mutex, Once};
    use std::thread::{self, ThreadId};
    use log::{Level, Log, Metadata, Record};
    use tempfile::tempdir;

    const RECIPES_CSV: &str = "name,n_steps,tags\npizza,4,bio\nsoup,7,\nsalad,2,vegan\n";

    struct CountingReader {
        calls: Rc<Cell<usize>>,
    }

    impl TableReader for CountingReader {
        fn read(&self, path: &Path, format: FileFormat) -> Result<Table> {
            self.calls.set(self.calls.get() + 1);
            FsReader.read(path, format)
        }
    }

    struct CountingExtractor {
        calls: Rc<Cell<usize>>,
    }

    impl Extractor for CountingExtractor {
        fn extract_zip(&self, archive: &Path, dest: &Path) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            FsExtractor.extract_zip(archive, dest)
        }

        fn decompress_xz(&self, archive: &Path, dest: &Path) -> Result<PathBuf> {
            self.calls.set(self.calls.get() + 1);
            FsExtractor.decompress_xz(archive, dest)
        }
    }

    fn write_zip(path: &Path, members: &[(&str, &str)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, body) in members {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    /// Process-wide logger that remembers records per test thread.
    struct Captured;

    static RECORDS: Mutex<Vec<(ThreadId, Level, String)>> = Mutex::new(Vec::new());
    static INSTALL: Once = Once::new();

    impl Log for Captured {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            if record.target().starts_with(module_path!().trim_end_matches("::tests")) {
                RECORDS.lock().unwrap().push((
                    thread::current().id(),
                    record.level(),
                    record.args().to_string(),
                ));
            }
        }

        fn flush(&self) {}
    }

    /// Install the capturing logger and forget this thread's earlier records.
    fn start_capture() {
        INSTALL.call_once(|| {
            log::set_logger(&Captured).unwrap();
            log::set_max_level(log::LevelFilter::Trace);
        });
        let me = thread::current().id();
        RECORDS.lock().unwrap().retain(|(id, _, _)| *id != me);
    }

    /// Records logged by the calling thread at `level` since `start_capture`.
    fn captured(level: Level) -> Vec<String> {
        let me = thread::current().id();
        RECORDS
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, l, _)| *id == me && *l == level)
            .map(|(_, _, msg)| msg.clone())
            .collect()
    }

    fn assert_recipes(table: &Table) {
        assert_eq!(table.column_names(), vec!["name", "n_steps", "tags"]);
        assert_eq!(table.num_rows(), 3);
        assert_eq!(
            table.column("tags").unwrap().values,
            vec!["bio".into(), CellValue::Null, "vegan".into()]
        );
    }

    #[test]
    fn test_load_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("RAW_recipes.csv");
        fs::write(&path, RECIPES_CSV).unwrap();

        let mut loader = Loader::new();
        assert_recipes(&loader.load(&path).unwrap());
    }

    #[test]
    fn test_load_zip_picks_first_csv_member() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("RAW_recipes.csv.zip");
        write_zip(
            &path,
            &[
                ("z_other.csv", "a\n1\n"),
                ("README.txt", "not a table"),
                ("RAW_recipes.csv", RECIPES_CSV),
            ],
        );

        let mut loader = Loader::new();
        let table = loader.load(&path).unwrap();
        assert_recipes(&table);
        assert!(dir.path().join("RAW_recipes.csv_extracted").is_dir());
    }

    #[test]
    fn test_load_xz() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("RAW_recipes.csv.xz");
        let mut enc = xz2::write::XzEncoder::new(File::create(&path).unwrap(), 6);
        enc.write_all(RECIPES_CSV.as_bytes()).unwrap();
        enc.finish().unwrap();

        let mut loader = Loader::new();
        assert_recipes(&loader.load(&path).unwrap());
        assert!(dir
            .path()
            .join("RAW_recipes.csv_extracted/RAW_recipes.csv")
            .is_file());
    }

    #[test]
    fn test_zip_without_csv_member() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.zip");
        write_zip(&path, &[("notes.txt", "hello")]);

        let mut loader = Loader::new();
        let err = loader.load(&path).unwrap_err();
        assert!(matches!(err, DataError::NoTabularMember { .. }));
    }

    #[test]
    fn test_unsupported_format_touches_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.txt");

        let mut loader = Loader::new();
        let err = loader.load(&path).unwrap_err();
        assert!(matches!(err, DataError::UnsupportedFormat { .. }));
        assert_eq!(
            err.to_string(),
            format!("Unsupported file type: {}", path.display())
        );
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(loader.cache().is_empty());
    }

    #[test]
    fn test_extract_rejects_non_archives_with_same_message() {
        let mut loader = Loader::new();
        let err = loader.extract("test.unsupported").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported file type: test.unsupported");

        let err = loader.extract("plain.csv").unwrap_err();
        assert!(matches!(err, DataError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_load_is_memoized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recipes.csv");
        fs::write(&path, RECIPES_CSV).unwrap();

        let calls = Rc::new(Cell::new(0));
        let mut loader = Loader::builder()
            .reader(CountingReader {
                calls: Rc::clone(&calls),
            })
            .build();

        let first = loader.load(&path).unwrap();
        let second = loader.load(&path).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));

        loader.clear_cache();
        let third = loader.load(&path).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(*first, *third);
    }

    #[test]
    fn test_memo_ignores_file_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recipes.csv");
        fs::write(&path, RECIPES_CSV).unwrap();

        let mut loader = Loader::new();
        let before = loader.load(&path).unwrap();
        fs::write(&path, "other\n1\n").unwrap();
        let after = loader.load(&path).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_injected_cache_short_circuits_reads() {
        let table = Table::new(vec![Column::new("id", vec![1.into()])]).unwrap();
        let mut cache = TableCache::new();
        cache.insert("virtual.csv", Arc::new(table.clone()));

        let calls = Rc::new(Cell::new(0));
        let mut loader = Loader::builder()
            .reader(CountingReader {
                calls: Rc::clone(&calls),
            })
            .cache(cache)
            .build();

        assert_eq!(*loader.load("virtual.csv").unwrap(), table);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_extract_reuses_existing_directory() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("PP_users.csv.zip");
        write_zip(&archive, &[("PP_users.csv", "u\n1\n")]);

        let extracted = dir.path().join("PP_users.csv_extracted");
        fs::create_dir(&extracted).unwrap();
        fs::write(extracted.join("b.csv"), "u\n2\n").unwrap();
        fs::write(extracted.join("a.csv"), "u\n3\n").unwrap();

        let calls = Rc::new(Cell::new(0));
        let mut loader = Loader::builder()
            .extractor(CountingExtractor {
                calls: Rc::clone(&calls),
            })
            .build();

        let members = loader.extract(&archive).unwrap();
        assert_eq!(calls.get(), 0);
        assert_eq!(members, vec![extracted.join("a.csv"), extracted.join("b.csv")]);
    }

    #[test]
    fn test_extract_runs_once() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("interactions.zip");
        write_zip(&archive, &[("interactions.csv", "u,r\n1,5\n")]);

        let calls = Rc::new(Cell::new(0));
        let mut loader = Loader::builder()
            .extractor(CountingExtractor {
                calls: Rc::clone(&calls),
            })
            .build();

        let first = loader.extract(&archive).unwrap();
        loader.clear_cache();
        let second = loader.extract(&archive).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(first, second);
        assert_eq!(first, vec![dir.path().join("interactions_extracted/interactions.csv")]);
    }

    #[test]
    fn test_failed_extraction_leaves_no_directory() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let mut loader = Loader::new();
        assert!(matches!(loader.extract(&archive), Err(DataError::Zip(_))));
        assert!(!dir.path().join("broken_extracted").exists());
    }

    #[test]
    fn test_custom_extract_suffix() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("recipes.zip");
        write_zip(&archive, &[("recipes.csv", RECIPES_CSV)]);

        let mut loader = Loader::builder()
            .config(LoaderConfig {
                extract_suffix: ".unpacked".to_string(),
            })
            .build();
        assert_recipes(&loader.load(&archive).unwrap());
        assert!(dir.path().join("recipes.unpacked").is_dir());
    }

    #[test]
    fn test_load_logs_once_per_outcome() {
        start_capture();
        let dir = tempdir().unwrap();
        let good = dir.path().join("recipes.csv");
        fs::write(&good, RECIPES_CSV).unwrap();
        let absent = dir.path().join("absent.csv");

        let mut loader = Loader::new();
        let err = loader.load(&absent).unwrap_err();
        let errors = captured(Level::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains(&absent.display().to_string()));
        assert!(errors[0].contains(&err.to_string()));
        assert!(captured(Level::Info).is_empty());

        loader.load(&good).unwrap();
        loader.load(&good).unwrap();
        let infos = captured(Level::Info);
        assert_eq!(infos.len(), 1);
        assert!(infos[0].contains(&good.display().to_string()));
        assert_eq!(captured(Level::Error).len(), 1);
    }

    #[test]
    fn test_extract_logs_format_specific_message() {
        start_capture();
        let dir = tempdir().unwrap();
        let archive = dir.path().join("ratings.csv.xz");
        let mut enc = xz2::write::XzEncoder::new(File::create(&archive).unwrap(), 6);
        enc.write_all(b"u,r\n1,5\n").unwrap();
        enc.finish().unwrap();

        Loader::new().extract(&archive).unwrap();
        Loader::new().extract(&archive).unwrap();
        let infos = captured(Level::Info);
        assert_eq!(infos.len(), 2);
        assert!(infos[0].starts_with("Decompressed "));
        assert!(infos[1].starts_with("Reusing existing extraction"));

        assert!(Loader::new().extract("notes.txt").is_err());
        let errors = captured(Level::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("notes.txt"));
        assert!(errors[0].contains("Unsupported file type"));
    }
}
