//! Query-string parameters of the streaming endpoints.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{StreamError, StreamResult};
use crate::pipeline::PipelineConfig;
use crate::processing::ScaleSpec;

/// Raw request parameters. Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamParams {
    pub path: Option<String>,
    pub chunksize: Option<String>,
    pub cols: Option<String>,
    pub query: Option<String>,
    pub scale_src: Option<String>,
    pub scale_factor: Option<String>,
    pub scale_out: Option<String>,
    pub groupby: Option<String>,
}

impl StreamParams {
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            path: get("path"),
            chunksize: get("chunksize"),
            cols: get("cols"),
            query: get("query"),
            scale_src: get("scale_src"),
            scale_factor: get("scale_factor"),
            scale_out: get("scale_out"),
            groupby: get("groupby"),
        }
    }

    /// Validate and turn into a [`PipelineConfig`].
    ///
    /// `default_chunk_size` applies when `chunksize` is absent. When `data_root` is set the path
    /// is resolved against it and must stay inside it.
    pub fn into_config(
        self,
        default_chunk_size: usize,
        data_root: Option<&Path>,
    ) -> StreamResult<PipelineConfig> {
        let path = self
            .path
            .ok_or_else(|| StreamError::config("missing required parameter 'path'"))?;
        let path = resolve_path(&path, data_root)?;

        let chunk_size = match self.chunksize.as_deref() {
            None => default_chunk_size,
            Some(raw) => parse_chunk_size(raw)?,
        };

        let mut config = PipelineConfig::new(path).with_chunk_size(chunk_size);
        if let Some(cols) = self.cols.as_deref() {
            let cols: Vec<&str> = cols.split(',').map(str::trim).filter(|c| !c.is_empty()).collect();
            if !cols.is_empty() {
                config = config.with_columns(cols);
            }
        }
        config.query = self.query;
        config.scale = ScaleSpec::from_parts(
            self.scale_src.as_deref(),
            self.scale_factor.as_deref(),
            self.scale_out.as_deref(),
        )?;
        config.group_by = self.groupby;

        config.validate()?;
        Ok(config)
    }
}

fn parse_chunk_size(raw: &str) -> StreamResult<usize> {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(StreamError::config(format!(
            "chunksize must be a positive integer, got '{raw}'"
        ))),
    }
}

fn resolve_path(raw: &str, data_root: Option<&Path>) -> StreamResult<PathBuf> {
    let requested = PathBuf::from(raw);
    let Some(root) = data_root else {
        return Ok(requested);
    };

    let joined = root.join(&requested);
    // Reject `..` lexically first so that missing files outside the root do not turn into 404s.
    if requested.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(StreamError::config(format!("path '{raw}' escapes the data root")));
    }
    match (joined.canonicalize(), root.canonicalize()) {
        (Ok(full), Ok(root)) if !full.starts_with(&root) => Err(StreamError::config(format!(
            "path '{raw}' escapes the data root"
        ))),
        // Missing files are reported by the reader as SourceNotFound.
        _ => Ok(joined),
    }
}
