//! One request's worth of streaming: reader → filter → enrich → encoder.
//!
//! A [`StreamPipeline`] owns every stage (and therefore the file handle and the running counts)
//! for exactly one response. It is an `Iterator<Item = StreamResult<String>>` of NDJSON lines;
//! nothing is read from disk until the caller pulls, and dropping the pipeline closes the file.
//!
//! ## Observability
//!
//! If a [`StreamObserver`] is configured via [`PipelineOptions`]:
//!
//! - `on_success` fires once the last frame has been pulled
//! - `on_failure` fires for open failures and mid-stream errors, with a computed severity
//! - `on_alert` additionally fires when that severity is >= `alert_at_or_above`
//! - `on_cancelled` fires when the pipeline is dropped before it finished
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use csv_ndjson_stream::pipeline::{
//!     PipelineConfig, PipelineOptions, StreamPipeline, TracingObserver,
//! };
//!
//! # fn main() -> Result<(), csv_ndjson_stream::StreamError> {
//! let config = PipelineConfig::new("data/sales.csv")
//!     .with_chunk_size(2)
//!     .with_group_by("category");
//! let options = PipelineOptions {
//!     observer: Some(Arc::new(TracingObserver)),
//!     ..Default::default()
//! };
//! for line in StreamPipeline::open(&config, &options)? {
//!     print!("{}", line?);
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{StreamError, StreamResult};
use crate::ingestion::{CsvBatchReader, ReaderOptions};
use crate::processing::{EnrichStage, FilterStage, Predicate, ScaleSpec};
use crate::types::RecordBatch;

pub mod encoder;
pub mod metrics;
pub mod observability;

pub use encoder::{Frame, FrameEncoder};
pub use metrics::{StreamMetrics, StreamStats};
pub use observability::{
    CompositeObserver, StreamContext, StreamObserver, StreamSeverity, TracingObserver,
};

/// Records per batch when the request does not say otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Everything one stream needs, already validated at the request boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub path: PathBuf,
    pub chunk_size: usize,
    pub columns: Option<Vec<String>>,
    pub query: Option<String>,
    pub scale: Option<ScaleSpec>,
    pub group_by: Option<String>,
}

impl PipelineConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            columns: None,
            query: None,
            scale: None,
            group_by: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_scale(mut self, scale: ScaleSpec) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }

    /// Checks that do not need the file.
    pub fn validate(&self) -> StreamResult<()> {
        if self.chunk_size == 0 {
            return Err(StreamError::config("chunksize must be a positive integer"));
        }
        if let Some(cols) = &self.columns {
            if cols.is_empty() || cols.iter().any(|c| c.is_empty()) {
                return Err(StreamError::config("cols must list non-empty column names"));
            }
        }
        if let Some(scale) = &self.scale {
            if scale.source.is_empty() || scale.output.is_empty() {
                return Err(StreamError::config("scale_src and scale_out must be non-empty"));
            }
            if !scale.factor.is_finite() {
                return Err(StreamError::config("scale_factor must be finite"));
            }
        }
        Ok(())
    }

    fn context(&self) -> StreamContext {
        StreamContext {
            path: self.path.clone(),
            chunk_size: self.chunk_size,
            query: self.query.clone(),
            group_by: self.group_by.clone(),
        }
    }
}

/// Observer wiring for [`StreamPipeline::open`].
#[derive(Clone)]
pub struct PipelineOptions {
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn StreamObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: StreamSeverity,
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("observer", &self.observer.as_ref().map(|_| "<observer>"))
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            observer: None,
            alert_at_or_above: StreamSeverity::Critical,
        }
    }
}

type BatchIter = Box<dyn Iterator<Item = StreamResult<RecordBatch>> + Send>;

/// Lazy NDJSON line source for one response.
pub struct StreamPipeline {
    frames: FrameEncoder<BatchIter>,
    metrics: Arc<StreamMetrics>,
    ctx: StreamContext,
    options: PipelineOptions,
    finished: bool,
}

impl StreamPipeline {
    /// Validate `config`, open the source and assemble the stages.
    ///
    /// Fails eagerly on a missing source, an unknown allow-list column or a predicate syntax
    /// error. Unknown predicate columns surface on the first pull.
    pub fn open(config: &PipelineConfig, options: &PipelineOptions) -> StreamResult<Self> {
        let ctx = config.context();
        match Self::build(config) {
            Ok((frames, metrics)) => Ok(Self {
                frames,
                metrics,
                ctx,
                options: options.clone(),
                finished: false,
            }),
            Err(e) => {
                report_failure(options, &ctx, &e);
                Err(e)
            }
        }
    }

    fn build(config: &PipelineConfig) -> StreamResult<(FrameEncoder<BatchIter>, Arc<StreamMetrics>)> {
        config.validate()?;
        let predicate = config.query.as_deref().map(Predicate::parse).transpose()?;

        let mut reader_options = ReaderOptions::new(config.chunk_size);
        if let Some(cols) = &config.columns {
            reader_options = reader_options.with_columns(cols.clone());
        }
        let reader = CsvBatchReader::open(&config.path, &reader_options)?;

        let metrics = Arc::new(StreamMetrics::new());
        let read_metrics = Arc::clone(&metrics);
        let reader = reader.inspect(move |r| {
            if let Ok(batch) = r {
                read_metrics.on_batch_read(batch.row_count());
            }
        });
        let filtered = FilterStage::new(reader, predicate);
        let enriched = EnrichStage::new(filtered, config.scale.clone());
        let emit_metrics = Arc::clone(&metrics);
        let counted = enriched.inspect(move |r| {
            if let Ok(batch) = r {
                emit_metrics.on_rows_emitted(batch.row_count());
            }
        });

        let frames = FrameEncoder::new(Box::new(counted) as BatchIter, config.group_by.clone());
        Ok((frames, metrics))
    }

    pub fn context(&self) -> &StreamContext {
        &self.ctx
    }

    pub fn stats(&self) -> StreamStats {
        self.metrics.snapshot()
    }

    /// `true` once the last frame (or an error) has been yielded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Iterator for StreamPipeline {
    type Item = StreamResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.frames.next() {
            Some(Ok(line)) => {
                self.metrics.on_frame();
                Some(Ok(line))
            }
            Some(Err(e)) => {
                self.finished = true;
                report_failure(&self.options, &self.ctx, &e);
                Some(Err(e))
            }
            None => {
                self.finished = true;
                if let Some(obs) = &self.options.observer {
                    obs.on_success(&self.ctx, self.metrics.snapshot());
                }
                None
            }
        }
    }
}

impl Drop for StreamPipeline {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(obs) = &self.options.observer {
                obs.on_cancelled(&self.ctx, self.metrics.snapshot());
            }
        }
    }
}

fn report_failure(options: &PipelineOptions, ctx: &StreamContext, e: &StreamError) {
    if let Some(obs) = &options.observer {
        let severity = StreamSeverity::for_error(e);
        obs.on_failure(ctx, severity, e);
        if severity >= options.alert_at_or_above {
            obs.on_alert(ctx, severity, e);
        }
    }
}
