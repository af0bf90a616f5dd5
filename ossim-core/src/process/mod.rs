pub mod table;
pub mod thread;

pub use thread::{ChildLink, Thread, ThreadState};

/// Process/thread identity: a small integer, also used directly as the
/// index into the global [`table::ProcessTable`].
pub type Pid = u32;
