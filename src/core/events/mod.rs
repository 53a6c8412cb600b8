

pub mod base;
pub mod bus;

pub use base::{EntityAction, Event};
pub use bus::{BroadcastHub, ObserverId, Subscription};
