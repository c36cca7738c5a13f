//! Core engine: the poll cycle and top-N membership tracking.

pub mod membership;
pub mod poller;

pub use membership::{MembershipDiff, MembershipTracker};
pub use poller::{CycleReport, Poller};
