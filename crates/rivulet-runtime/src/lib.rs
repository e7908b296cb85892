//! Rivulet Runtime - streaming execution pipeline
//!
//! Events flow from an input handle (or trigger) into a per-stream
//! junction, which fans them out in arrival order to every subscribed
//! query pipeline. Each pipeline routes by partition key into an isolated
//! window + projector instance and delivers the resulting current/expired
//! output events to registered callbacks.

pub mod aggregation;
pub mod clock;
pub mod engine;
pub mod event;
pub mod junction;
pub mod output;
pub mod partition;
pub mod trigger;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::Engine;
pub use event::{SharedEvent, StreamEvent};
pub use junction::{StreamJunction, Subscriber};
pub use output::OutputDispatcher;
pub use trigger::{EventTrigger, IntervalTrigger};
pub use window::{Emission, Window};
