//! Derived-column stage: `output = numeric(source) * factor`.

use crate::error::{StreamError, StreamResult};
use crate::types::{DataType, RecordBatch, Value};

/// Which column to scale, by how much, and where to put the result.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSpec {
    pub source: String,
    pub factor: f64,
    pub output: String,
}

impl ScaleSpec {
    pub fn new(source: impl Into<String>, factor: f64, output: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            factor,
            output: output.into(),
        }
    }

    /// Build a spec from the three optional request parameters.
    ///
    /// All three absent means no enrichment; a partial triple is an
    /// [`StreamError::InvalidConfiguration`].
    pub fn from_parts(
        source: Option<&str>,
        factor: Option<&str>,
        output: Option<&str>,
    ) -> StreamResult<Option<Self>> {
        match (source, factor, output) {
            (None, None, None) => Ok(None),
            (Some(source), Some(factor), Some(output)) => {
                let factor = factor.trim().parse::<f64>().map_err(|e| {
                    StreamError::config(format!("scale_factor '{factor}' is not a number: {e}"))
                })?;
                Ok(Some(Self::new(source, factor, output)))
            }
            _ => Err(StreamError::config(
                "scale_src, scale_factor and scale_out must be supplied together",
            )),
        }
    }
}

/// Apply `spec` to one batch. Returns `false` (batch untouched) when the source column is
/// missing from this batch.
pub fn enrich_batch(batch: &mut RecordBatch, spec: &ScaleSpec) -> bool {
    let Some(src) = batch.schema.index_of(&spec.source) else {
        return false;
    };
    let factor = spec.factor;
    batch.set_column(&spec.output, DataType::Float64, |row| {
        match row.get(src).and_then(Value::coerce_f64) {
            Some(v) => Value::Float64(v * factor),
            None => Value::Null,
        }
    });
    true
}

/// Lazy enrichment over an upstream batch sequence. Holds no cross-batch state.
pub struct EnrichStage<I> {
    upstream: I,
    spec: Option<ScaleSpec>,
}

impl<I> EnrichStage<I>
where
    I: Iterator<Item = StreamResult<RecordBatch>>,
{
    pub fn new(upstream: I, spec: Option<ScaleSpec>) -> Self {
        Self { upstream, spec }
    }
}

impl<I> Iterator for EnrichStage<I>
where
    I: Iterator<Item = StreamResult<RecordBatch>>,
{
    type Item = StreamResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = match self.upstream.next()? {
            Ok(batch) => batch,
            Err(e) => return Some(Err(e)),
        };
        if let Some(spec) = &self.spec {
            enrich_batch(&mut batch, spec);
        }
        Some(Ok(batch))
    }
}
