//! `csv-ndjson-stream` serves large CSV files over HTTP as newline-delimited JSON, batch by batch.
//!
//! A request names a CSV file plus an optional column allow-list, filter expression, derived
//! column and group-by column. The file is read lazily in bounded batches; each batch is filtered,
//! enriched and written to the socket as one `data` frame, optionally followed by a `progress`
//! frame carrying cumulative per-key counts. Memory use is bounded by the batch size regardless of
//! file size.
//!
//! ## Frames
//!
//! ```text
//! {"type":"data","rows":[{"category":"a","value":1},{"category":"b","value":2}]}
//! {"type":"progress","running_counts":{"a":1,"b":1}}
//! ```
//!
//! ## Quick example: stream a file without the server
//!
//! ```no_run
//! use csv_ndjson_stream::pipeline::{PipelineConfig, PipelineOptions, StreamPipeline};
//!
//! # fn main() -> Result<(), csv_ndjson_stream::StreamError> {
//! let config = PipelineConfig::new("sales.csv")
//!     .with_chunk_size(1000)
//!     .with_query("value > 10 and category != 'x'")
//!     .with_group_by("category");
//! for line in StreamPipeline::open(&config, &PipelineOptions::default())? {
//!     print!("{}", line?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Running the server
//!
//! ```no_run
//! use csv_ndjson_stream::{config::ServerConfig, server::Server};
//!
//! # fn main() -> std::io::Result<()> {
//! let server = Server::bind(ServerConfig::default())?;
//! println!("listening on {}", server.local_addr()?);
//! server.run()
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: incremental CSV reading into typed [`types::RecordBatch`]es
//! - [`processing`]: predicate language, filter and enrichment stages, running counts
//! - [`pipeline`]: stage composition, NDJSON frame encoding, metrics and observers
//! - [`server`]: HTTP endpoints and request parameter handling
//! - [`config`]: server configuration
//! - [`types`]: schema, values and batches
//! - [`error`]: the shared error type

pub mod config;
pub mod error;
pub mod ingestion;
pub mod pipeline;
pub mod processing;
pub mod server;
pub mod types;

pub use error::{StreamError, StreamResult};
