//! Loading and filtering for the Mangetamain recipe dataset.
//!
//! [`data::Loader`] turns CSV files, zip/xz archives, pickles, Parquet and
//! JSON exports into [`data::Table`]s; [`data::filter()`] selects rows by
//! per-column accepted values.

pub mod data;
pub mod logging;
