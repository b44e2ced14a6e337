mod error_log;
mod tracing_sink;

pub use error_log::ErrorLog;
pub use tracing_sink::TracingSink;
