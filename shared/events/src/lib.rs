//! Event envelope/catalog and signed webhook delivery shared by the Event
//! Bus (C8) and Webhook Pipeline (C9).

pub mod events;
pub mod webhook;

pub use events::*;
pub use webhook::*;
