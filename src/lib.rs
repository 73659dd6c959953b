pub mod cipher;
pub mod config;
pub mod filter;
pub mod gearman;
pub mod payload;
pub mod pipeline;

pub use cipher::CipherCache;
pub use config::{Config, Endpoint, Filters};
pub use filter::FilterEngine;
pub use payload::PayloadParser;
pub use pipeline::{DropReason, JobSink, Outcome, Pipeline};
