//! Request handlers.

mod events;

pub use events::*;
