//! The long-running tracker process: a polling loop that records the
//! selected device's location and battery, and the HTTP gateway beside it.

pub mod daemon;
pub mod shutdown;
pub mod tracker;
