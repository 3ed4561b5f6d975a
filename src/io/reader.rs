//! Streaming CSV reader with iterator interface
//!
//! [`RecordReader`] yields one deserialized row at a time together with its
//! line number, so a bad row can be reported and skipped without stopping
//! the replay. Conversion into ledger requests lives in
//! [`crate::io::csv_format`].
//!
//! # Error Handling
//!
//! - Fatal errors (file not found) are returned from `open()`
//! - Individual row parse errors are yielded as `Err` items, prefixed with
//!   their line number

use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;

/// Streaming reader over rows of type `T`
#[derive(Debug)]
pub struct RecordReader<T, R = File> {
    reader: csv::Reader<R>,
    line_num: usize,
    _row: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> RecordReader<T, File> {
    /// Open a CSV file with a header row
    pub fn open(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;
        Ok(Self::from_reader(file))
    }
}

impl<T: DeserializeOwned, R: Read> RecordReader<T, R> {
    /// Wrap any reader
    ///
    /// Fields are trimmed and rows may omit trailing empty columns.
    pub fn from_reader(input: R) -> Self {
        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(input);

        Self {
            reader,
            line_num: 1,
            _row: PhantomData,
        }
    }
}

impl<T: DeserializeOwned, R: Read> Iterator for RecordReader<T, R> {
    /// Line number and row, or a message naming the line that failed
    type Item = Result<(usize, T), String>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.reader.deserialize::<T>().next()?;
        self.line_num += 1;
        Some(
            row.map(|record| (self.line_num, record))
                .map_err(|e| format!("Line {}: CSV parse error: {}", self.line_num, e)),
        )
    }
}
