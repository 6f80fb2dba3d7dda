/// Data layer: core types, loading, and filtering.
///
/// Architecture:
/// ```text
///  .csv / .zip / .xz / .pkl / .parquet / .json
///        │
///        ▼
///   ┌──────────┐   archives   ┌──────────┐
///   │  loader   │ ───────────▶ │ archive  │  extract next to the file
///   └──────────┘              └──────────┘
///        │  format + path
///        ▼
///   ┌──────────┐
///   │  reader   │  parse file → Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  per-column accepted values → matching rows
///   └──────────┘
/// ```

pub mod archive;
pub mod error;
pub mod filter;
pub mod format;
pub mod loader;
pub mod model;
pub mod reader;

pub use error::{DataError, Result};
pub use filter::{filter, filtered_indices, parse_filter_values, FilterSpec, FilterValue};
pub use format::FileFormat;
pub use loader::{Loader, LoaderConfig, TableCache};
pub use model::{CellValue, Column, Table};
