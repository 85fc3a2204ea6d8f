//! Batch message bodies.
//!
//! A batch body is newline-separated text:
//!
//! ```text
//! 3            <- cardinality (non-final batch)
//! 1/Ana/Paz/30904509/1999-03-17/7574
//! 1/Leo/Paz/30904510/1998-01-02/1200
//! 1/Eva/Gil/30904511/2000-11-30/0042
//! ```
//!
//! The final batch of a transfer suffixes the cardinality line with `|EOF`
//! (e.g. `2|EOF`). Fields are joined with `/` and never escaped, so fields
//! containing `/` or a newline are rejected at encode time.

use crate::error::MessageError;
use std::fmt;

/// Separator between the fields of a record line.
pub const FIELD_SEPARATOR: char = '/';

/// Suffix appended to the cardinality line of the final batch.
pub const FINAL_MARKER: &str = "|EOF";

/// An opaque record rendered as one line of `/`-joined fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub fields: Vec<String>,
}

impl Record {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a record line. Every `/` starts a new field.
    pub fn from_line(line: &str) -> Self {
        Self::new(line.split(FIELD_SEPARATOR))
    }

    /// Renders the record as a single line.
    pub fn to_line(&self) -> String {
        let mut line = String::new();
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(FIELD_SEPARATOR);
            }
            line.push_str(field);
        }
        line
    }

    /// Checks that no field would break the line structure.
    pub fn validate(&self, index: usize) -> Result<(), MessageError> {
        for (field, value) in self.fields.iter().enumerate() {
            if value.contains(FIELD_SEPARATOR) || value.contains('\n') || value.contains('\r') {
                return Err(MessageError::InvalidField {
                    record: index,
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The first line of a batch body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHeader {
    /// Number of records in the batch.
    pub count: usize,
    /// Whether this is the last batch of the transfer.
    pub is_final: bool,
}

impl BatchHeader {
    pub fn new(count: usize, is_final: bool) -> Self {
        Self { count, is_final }
    }

    /// Parses a cardinality line such as `5` or `2|EOF`.
    pub fn parse(line: &str) -> Result<Self, MessageError> {
        let (digits, is_final) = match line.strip_suffix(FINAL_MARKER) {
            Some(digits) => (digits, true),
            None => (line, false),
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MessageError::MalformedCount(line.to_string()));
        }
        let count = digits
            .parse()
            .map_err(|_| MessageError::MalformedCount(line.to_string()))?;

        Ok(Self { count, is_final })
    }
}

impl fmt::Display for BatchHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_final {
            write!(f, "{}{}", self.count, FINAL_MARKER)
        } else {
            write!(f, "{}", self.count)
        }
    }
}

/// Serializes records into a batch body.
pub fn encode_batch(records: &[Record], is_final: bool) -> Result<String, MessageError> {
    if records.is_empty() {
        return Err(MessageError::EmptyBatch);
    }

    let mut body = BatchHeader::new(records.len(), is_final).to_string();
    for (i, record) in records.iter().enumerate() {
        record.validate(i)?;
        body.push('\n');
        body.push_str(&record.to_line());
    }
    Ok(body)
}

/// Parses a batch body back into its header and records.
pub fn decode_batch(body: &[u8]) -> Result<(BatchHeader, Vec<Record>), MessageError> {
    let text = std::str::from_utf8(body).map_err(|_| MessageError::InvalidUtf8)?;
    let mut lines = text.split('\n');

    // split() always yields at least one item
    let header = BatchHeader::parse(lines.next().unwrap_or_default())?;
    if header.count == 0 {
        return Err(MessageError::EmptyBatch);
    }

    let records: Vec<Record> = lines.map(Record::from_line).collect();
    if records.len() != header.count {
        return Err(MessageError::CountMismatch {
            declared: header.count,
            actual: records.len(),
        });
    }

    Ok((header, records))
}
