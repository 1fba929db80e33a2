//! In-process event dispatch for the booking core.
//!
//! - `EventName`: closed set of names a bus dispatches on
//! - `EventBus`: named pub/sub with sequential, in-order handler execution
//! - `Handler`: boxed async handler type + `handler_fn` constructor

pub mod bus;
pub mod event;
pub mod handler;

pub use bus::{EventBus, Subscription};
pub use event::EventName;
pub use handler::{Handler, HandlerResult, handler_fn};
