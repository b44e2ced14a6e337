//! Exit reasons carried across `finally` bodies

use crate::features::frame_state::{BlockKind, FrameState, Why};
use crate::shared::models::Opcode;

/// Remembers why control left a protected region, per open `SETUP_*`,
/// so the `END_FINALLY` closing it can resume that exit.
///
/// Only consulted when `END_FINALLY` has no normal continuation; a normal
/// path through the `finally` body always wins.
#[derive(Debug, Default)]
pub struct FinallyStateTracker {
    stack: Vec<(usize, Option<Why>)>,
}

impl FinallyStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the state produced by `opcode`; returns the exit reason to
    /// restore at an `END_FINALLY`
    pub fn process(&mut self, opcode: Opcode, op_index: usize, state: &FrameState) -> Option<Why> {
        match opcode {
            Opcode::SetupExcept | Opcode::SetupFinally => {
                self.stack.push((op_index, None));
                None
            }
            Opcode::EndFinally => {
                let (_, why) = self.stack.pop()?;
                match (state.why, why) {
                    (Some(_), Some(stored)) => Some(stored),
                    _ => None,
                }
            }
            _ => {
                if let (Some(top), Some(Why::Return)) = (self.stack.last_mut(), state.why) {
                    top.1 = Some(Why::Return);
                }
                None
            }
        }
    }

    /// Leaving the frame from inside a `finally`-protected region: the
    /// targets the current block queued must not run
    pub fn check_early_exit(state: &FrameState) -> bool {
        state.has_block(BlockKind::Finally)
            && matches!(state.why, Some(Why::Return) | Some(Why::Exception))
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
