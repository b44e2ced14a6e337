mod call_args;
mod narrowing;
mod trace;

pub use call_args::CallArgs;
pub use narrowing::Narrowing;
pub use trace::{OpcodeTrace, TraceDraft};
