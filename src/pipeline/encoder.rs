//! NDJSON frame encoding with running group counts.

use serde::Serialize;

use crate::error::StreamResult;
use crate::processing::RunningCounts;
use crate::types::{RecordBatch, Records};

/// One NDJSON line of the response body.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame<'a> {
    /// The (filtered, enriched) rows of one batch.
    Data { rows: Records<'a> },
    /// Full snapshot of the running counts after a batch.
    Progress { running_counts: &'a RunningCounts },
}

impl Frame<'_> {
    /// Serialize as a single `\n`-terminated line.
    pub fn to_line(&self) -> StreamResult<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Pulls batches from upstream and yields one encoded frame per call.
///
/// For each batch a data frame is yielded first; if a group-by column is configured and
/// present in the batch, the matching progress frame is held and yielded by the following
/// call, before the next batch is pulled.
pub struct FrameEncoder<I> {
    upstream: I,
    group_by: Option<String>,
    counts: RunningCounts,
    pending_progress: Option<String>,
    done: bool,
}

impl<I> FrameEncoder<I>
where
    I: Iterator<Item = StreamResult<RecordBatch>>,
{
    pub fn new(upstream: I, group_by: Option<String>) -> Self {
        Self {
            upstream,
            group_by,
            counts: RunningCounts::new(),
            pending_progress: None,
            done: false,
        }
    }

    /// Counts accumulated so far.
    pub fn running_counts(&self) -> &RunningCounts {
        &self.counts
    }

    fn encode_batch(&mut self, batch: &RecordBatch) -> StreamResult<String> {
        let data = Frame::Data {
            rows: batch.records(),
        }
        .to_line()?;

        if let Some(col) = &self.group_by {
            if self.counts.update(batch, col) {
                let progress = Frame::Progress {
                    running_counts: &self.counts,
                }
                .to_line()?;
                self.pending_progress = Some(progress);
            }
        }
        Ok(data)
    }
}

impl<I> Iterator for FrameEncoder<I>
where
    I: Iterator<Item = StreamResult<RecordBatch>>,
{
    type Item = StreamResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(progress) = self.pending_progress.take() {
            return Some(Ok(progress));
        }
        if self.done {
            return None;
        }
        let result = match self.upstream.next() {
            None => {
                self.done = true;
                return None;
            }
            Some(Ok(batch)) => self.encode_batch(&batch),
            Some(Err(e)) => Err(e),
        };
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}
