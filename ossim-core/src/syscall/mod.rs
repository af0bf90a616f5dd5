pub mod dispatch;
pub mod numbers;

pub use dispatch::{dispatch, DispatchOutcome};
pub use numbers::SyscallNumber;
