//! Domain events module.
//!
//! Event types and the sink trait used to publish facts about committed
//! changes (booked complex transactions, changed instruments).

mod domain_event;
mod sink;

pub use domain_event::*;
pub use sink::*;
