mod channel;
mod event;

pub use channel::{EventChannel, EventPublisher, EventSubscriber};
pub use event::{EventInfo, RunEvent, RunStats, TestCase};
