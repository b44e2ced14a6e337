mod block;
mod frame;
mod lookup;
mod state;

pub use block::{Block, BlockKind, Why};
pub use frame::{Frame, SimpleFrame};
pub use lookup::LookupResult;
pub use state::FrameState;
