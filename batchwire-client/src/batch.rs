//! Batch formation.
//!
//! Records are pulled from a [`RecordSource`] in groups of at most
//! `batch_size`. The batch that drains the source carries the final marker.

use crate::error::{ClientError, SourceError};
use std::iter::Peekable;

/// Result of a single pull from a record source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pulled<R> {
    pub records: Vec<R>,
    /// No records remain after this pull.
    pub exhausted: bool,
}

/// A lazy supplier of records.
///
/// Implementations must report `exhausted` on the same pull that hands out
/// the last record, otherwise the last batch cannot be marked final.
pub trait RecordSource {
    type Record;

    /// Pulls up to `max` records.
    fn pull(&mut self, max: usize) -> Result<Pulled<Self::Record>, SourceError>;
}

/// Adapts a fallible iterator into a [`RecordSource`] using one-record lookahead.
pub struct IterSource<I: Iterator> {
    iter: Peekable<I>,
}

impl<I, R> IterSource<I>
where
    I: Iterator<Item = Result<R, SourceError>>,
{
    pub fn new(iter: I) -> Self {
        Self {
            iter: iter.peekable(),
        }
    }
}

impl<I, R> RecordSource for IterSource<I>
where
    I: Iterator<Item = Result<R, SourceError>>,
{
    type Record = R;

    fn pull(&mut self, max: usize) -> Result<Pulled<R>, SourceError> {
        let mut records = Vec::with_capacity(max);
        while records.len() < max {
            match self.iter.next() {
                Some(record) => records.push(record?),
                None => break,
            }
        }
        let exhausted = self.iter.peek().is_none();
        Ok(Pulled { records, exhausted })
    }
}

/// Wraps an infallible collection of records as a source.
pub fn from_records<R>(
    records: impl IntoIterator<Item = R>,
) -> IterSource<impl Iterator<Item = Result<R, SourceError>>> {
    IterSource::new(records.into_iter().map(Ok))
}

/// A bounded group of records sent as one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<R> {
    /// Zero-based position of the batch in the transfer.
    pub index: usize,
    pub records: Vec<R>,
    pub is_final: bool,
}

impl<R> Batch<R> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Turns a record source into a sequence of batches.
pub struct Batcher<S> {
    source: S,
    batch_size: usize,
    next_index: usize,
    done: bool,
}

impl<S: RecordSource> Batcher<S> {
    pub fn new(source: S, batch_size: usize) -> Result<Self, ClientError> {
        if batch_size == 0 {
            return Err(ClientError::InvalidBatchSize);
        }
        Ok(Self {
            source,
            batch_size,
            next_index: 0,
            done: false,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns whether the final batch has been produced.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Produces the next batch, or `None` once the source is drained.
    pub fn next_batch(&mut self) -> Result<Option<Batch<S::Record>>, SourceError> {
        if self.done {
            return Ok(None);
        }

        let pulled = self.source.pull(self.batch_size)?;
        if pulled.records.is_empty() {
            self.done = true;
            return Ok(None);
        }

        let is_final = pulled.exhausted || pulled.records.len() < self.batch_size;
        if is_final {
            self.done = true;
        }

        let batch = Batch {
            index: self.next_index,
            records: pulled.records,
            is_final,
        };
        self.next_index += 1;
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(len: usize, batch_size: usize) -> Vec<Batch<usize>> {
        let mut batcher = Batcher::new(from_records(0..len), batch_size).unwrap();
        let mut batches = Vec::new();
        while let Some(batch) = batcher.next_batch().unwrap() {
            batches.push(batch);
        }
        assert!(batcher.next_batch().unwrap().is_none());
        batches
    }

    fn sizes(batches: &[Batch<usize>]) -> Vec<usize> {
        batches.iter().map(Batch::len).collect()
    }

    fn finals(batches: &[Batch<usize>]) -> Vec<bool> {
        batches.iter().map(|b| b.is_final).collect()
    }

    #[test]
    fn test_partial_last_batch() {
        let batches = collect(5, 2);
        assert_eq!(sizes(&batches), vec![2, 2, 1]);
        assert_eq!(finals(&batches), vec![false, false, true]);
        assert_eq!(batches[2].records, vec![4]);
    }

    #[test]
    fn test_exact_multiple_marks_last_full_batch() {
        let batches = collect(4, 2);
        assert_eq!(sizes(&batches), vec![2, 2]);
        assert_eq!(finals(&batches), vec![false, true]);
    }

    #[test]
    fn test_empty_source() {
        assert!(collect(0, 3).is_empty());
    }

    #[test]
    fn test_single_record() {
        let batches = collect(1, 1);
        assert_eq!(sizes(&batches), vec![1]);
        assert_eq!(finals(&batches), vec![true]);
    }

    #[test]
    fn test_source_smaller_than_batch() {
        let batches = collect(3, 10);
        assert_eq!(sizes(&batches), vec![3]);
        assert!(batches[0].is_final);
    }

    #[test]
    fn test_batch_counts() {
        for len in 0..25 {
            for batch_size in 1..7 {
                let batches = collect(len, batch_size);
                assert_eq!(batches.len(), len.div_ceil(batch_size));

                for (i, batch) in batches.iter().enumerate() {
                    assert_eq!(batch.index, i);
                    let last = i + 1 == batches.len();
                    assert_eq!(batch.is_final, last);
                    if !last {
                        assert_eq!(batch.len(), batch_size);
                    }
                }

                let flattened: Vec<usize> =
                    batches.into_iter().flat_map(|b| b.records).collect();
                assert_eq!(flattened, (0..len).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = Batcher::new(from_records(0..3), 0);
        assert!(matches!(result, Err(ClientError::InvalidBatchSize)));
    }

    #[test]
    fn test_source_error_propagates() {
        let items = vec![
            Ok(1),
            Ok(2),
            Err(SourceError::InvalidRecord {
                line: 3,
                reason: "bad".to_string(),
            }),
            Ok(4),
        ];
        let mut batcher = Batcher::new(IterSource::new(items.into_iter()), 2).unwrap();

        let first = batcher.next_batch().unwrap().unwrap();
        assert_eq!(first.records, vec![1, 2]);
        assert!(!first.is_final);

        let err = batcher.next_batch().unwrap_err();
        assert!(matches!(err, SourceError::InvalidRecord { line: 3, .. }));
    }

    #[test]
    fn test_iter_source_reports_exhaustion_on_draining_pull() {
        let mut source = from_records(vec!["a", "b"]);
        let pulled = source.pull(2).unwrap();
        assert_eq!(pulled.records, vec!["a", "b"]);
        assert!(pulled.exhausted);
    }
}
