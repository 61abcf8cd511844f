//! Cooperative task scheduling: the two-lane queue and fan-out groups.

mod group;
mod queue;

pub use group::GroupId;
pub(crate) use group::GroupTable;
pub use queue::{Lane, TaskQueue, Ticket};
pub(crate) use queue::Task;
