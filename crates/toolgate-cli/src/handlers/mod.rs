//! Command handlers. Each handler is a read-only consumer of the
//! process manager; none of them holds long-lived state.

pub mod doctor;
pub mod list;
pub mod tools;
