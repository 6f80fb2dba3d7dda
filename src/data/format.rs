use std::path::Path;

/// Decoding strategy implied by a file's suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Zip,
    Xz,
    Pickle,
    Parquet,
    Json,
    Unknown,
}

impl FileFormat {
    /// Detect the format from the final extension (case-insensitive).
    ///
    /// `RAW_recipes.csv.zip` is a `Zip`; only the last suffix counts.
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "csv" => FileFormat::Csv,
            "zip" => FileFormat::Zip,
            "xz" => FileFormat::Xz,
            "pkl" | "pickle" => FileFormat::Pickle,
            "parquet" | "pq" => FileFormat::Parquet,
            "json" => FileFormat::Json,
            _ => FileFormat::Unknown,
        }
    }

    /// Archives go through extraction before parsing.
    pub fn is_archive(self) -> bool {
        matches!(self, FileFormat::Zip | FileFormat::Xz)
    }
}
