//! Turning raw scan frames into discrete key presses.
mod edge;

pub use edge::*;
