pub mod high_prio_queue;
pub mod message_queue;

pub use high_prio_queue::HighPrioQueue;
pub use message_queue::{EntryState, MessageQueue, QueueEntryPtr};
