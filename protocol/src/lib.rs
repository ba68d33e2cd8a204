mod line_protocol;
mod metric;
mod signal;
mod writer;

pub use line_protocol::LineProtocol;
pub use metric::{FieldValue, Metric};
pub use signal::{Signal, SignalDecoder};
pub use writer::OutputWriter;
