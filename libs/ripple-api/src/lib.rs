pub mod error;
pub mod record;
pub mod sink;

pub use error::{SinkError, SinkErrorKind};
pub use record::{Batch, RawFrame, Record};
pub use sink::{BatchSink, FlushResult, Stored};
