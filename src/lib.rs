pub mod clock;
pub mod codec;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod params;
pub mod queue;
pub mod redundancy;
pub mod slave;

pub use clock::{Clock, FakeClock, SystemClock};
pub use codec::Codec;
pub use connection::{Connection, ConnectionConfig, ConnectionHandle};
pub use error::{CloseReason, Error};
pub use frame::Apdu;
pub use handler::{
    ConnectionEvent, ConnectionEventHandler, ConnectionRequestHandler, Plugin, PluginOutcome,
    RawMessageHandler, ServerHandler,
};
pub use params::{APCIParameters, AppLayerParameters};
pub use queue::{EntryState, HighPrioQueue, MessageQueue, QueueEntryPtr};
pub use redundancy::{select_group, RedundancyGroup};
pub use slave::{Slave, SlaveDriver, ServerMode};
