//! Row filtering stage.

use crate::error::StreamResult;
use crate::types::RecordBatch;

use super::predicate::Predicate;

/// Drop the rows of `batch` for which `predicate` is not true.
///
/// Column references are resolved against this batch's schema, so an unknown column surfaces
/// here as [`crate::StreamError::InvalidPredicate`].
pub fn filter_batch(batch: &mut RecordBatch, predicate: &Predicate) -> StreamResult<()> {
    let bound = predicate.bind(&batch.schema)?;
    batch.try_retain_rows(|row| bound.matches(row))
}

/// Lazy filter over an upstream batch sequence.
///
/// Batches may shrink (even to zero rows) but are never split, merged, or reordered. Without a
/// predicate every batch passes through untouched. After an error nothing further is pulled.
pub struct FilterStage<I> {
    upstream: I,
    predicate: Option<Predicate>,
    failed: bool,
}

impl<I> FilterStage<I>
where
    I: Iterator<Item = StreamResult<RecordBatch>>,
{
    pub fn new(upstream: I, predicate: Option<Predicate>) -> Self {
        Self {
            upstream,
            predicate,
            failed: false,
        }
    }
}

impl<I> Iterator for FilterStage<I>
where
    I: Iterator<Item = StreamResult<RecordBatch>>,
{
    type Item = StreamResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self.upstream.next()?.and_then(|mut batch| {
            if let Some(pred) = &self.predicate {
                filter_batch(&mut batch, pred)?;
            }
            Ok(batch)
        });
        self.failed = result.is_err();
        Some(result)
    }
}
