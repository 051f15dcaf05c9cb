pub mod invstk;
pub mod switch;
pub mod thread;

pub use invstk::{InvFrame, InvStk};
pub use thread::{Thread, ThreadTable, Tid, flags};
