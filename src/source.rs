//! Record file source.
//!
//! Reads one record per line with comma-separated fields. Blank lines are
//! skipped and fields are trimmed.

use batchwire_client::{IterSource, SourceError};
use batchwire_protocol::Record;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// Record source backed by a file.
pub type FileSource = IterSource<FileRecords<BufReader<File>>>;

/// Opens `path` as a record source.
///
/// With `prefix` set, every record gets it as its first field.
pub fn open(path: &Path, prefix: Option<String>) -> Result<FileSource, SourceError> {
    let file = File::open(path)?;
    Ok(IterSource::new(FileRecords::new(BufReader::new(file), prefix)))
}

/// Iterates the records of a line-oriented reader.
pub struct FileRecords<B> {
    lines: Lines<B>,
    line: usize,
    prefix: Option<String>,
}

impl<B: BufRead> FileRecords<B> {
    pub fn new(reader: B, prefix: Option<String>) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            prefix,
        }
    }

    fn parse(&self, text: &str) -> Result<Record, SourceError> {
        let fields = self
            .prefix
            .iter()
            .cloned()
            .chain(text.split(',').map(|f| f.trim().to_string()));
        let record = Record::new(fields);
        record
            .validate(self.line)
            .map_err(|e| SourceError::InvalidRecord {
                line: self.line,
                reason: e.to_string(),
            })?;
        Ok(record)
    }
}

impl<B: BufRead> Iterator for FileRecords<B> {
    type Item = Result<Record, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(SourceError::Io(e))),
            };
            self.line += 1;

            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            return Some(self.parse(text));
        }
    }
}
