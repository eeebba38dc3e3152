//! Time-or-count windowing stage.
//!
//! Records decoded from inbound frames are collected into windows; a window
//! closes when it holds `max_count` records or `max_duration` after its
//! first record, whichever comes first. Each closed window is persisted as
//! one batch and reported downstream as one status frame.

pub mod config;
pub mod error;
pub mod flush;
pub mod pipeline;
pub mod window;

pub use config::{PipelineConfig, RetryPolicy, RetrySettings, WindowConfig, WindowSettings};
pub use error::{EngineError, WindowError};
pub use flush::FlushWorker;
pub use pipeline::{Pipeline, PipelineStats, ReadySink};
pub use window::{Offer, WindowAccumulator};
