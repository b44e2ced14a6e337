//! Frame and stack model
//!
//! Hexagonal Architecture:
//! - domain: `FrameState` (operand stack, block stack, CFG position, exit
//!   reason), block entries, activation records, the tri-state lookup result
//! - infrastructure: branch conditions restricting a tested variable

pub mod domain;
pub mod infrastructure;

pub use domain::{Block, BlockKind, Frame, FrameState, LookupResult, SimpleFrame, Why};
pub use infrastructure::{new_condition, restrict_by, restrict_condition, Restriction};
