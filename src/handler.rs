use std::future::Future;
use std::net::IpAddr;
use std::ops::Deref;

use chrono::{DateTime, Utc};

use crate::error::{CloseReason, Error};
use crate::frame::asdu::Asdu;
use crate::frame::csys::{ObjectQCC, ObjectQOI, ObjectQRP};

/// Application-level callbacks a `Slave` dispatches into, one method per ASDU command
/// type plus a generic fallback for anything else: interrogation, counter-
/// interrogation, read, clock sync, process reset and delay acquisition.
pub trait ServerHandler {
    type Future: Future<Output = Result<Vec<Asdu>, Error>> + Send;

    fn call_interrogation(&self, asdu: Asdu, qoi: ObjectQOI) -> Self::Future;
    fn call_counter_interrogation(&self, asdu: Asdu, qcc: ObjectQCC) -> Self::Future;
    fn call_read(&self, asdu: Asdu) -> Self::Future;
    fn call_clock_sync(&self, asdu: Asdu, time: DateTime<Utc>) -> Self::Future;
    fn call_reset_process(&self, asdu: Asdu, qrp: ObjectQRP) -> Self::Future;
    fn call_delay_acquisition(&self, asdu: Asdu, msec: u16) -> Self::Future;
    fn call(&self, asdu: Asdu) -> Self::Future;
}

impl<D> ServerHandler for D
where
    D: Deref + ?Sized,
    D::Target: ServerHandler,
{
    type Future = <D::Target as ServerHandler>::Future;

    fn call(&self, asdu: Asdu) -> Self::Future {
        self.deref().call(asdu)
    }
    fn call_interrogation(&self, asdu: Asdu, qoi: ObjectQOI) -> Self::Future {
        self.deref().call_interrogation(asdu, qoi)
    }
    fn call_counter_interrogation(&self, asdu: Asdu, qcc: ObjectQCC) -> Self::Future {
        self.deref().call_counter_interrogation(asdu, qcc)
    }
    fn call_read(&self, asdu: Asdu) -> Self::Future {
        self.deref().call_read(asdu)
    }
    fn call_clock_sync(&self, asdu: Asdu, time: DateTime<Utc>) -> Self::Future {
        self.deref().call_clock_sync(asdu, time)
    }
    fn call_reset_process(&self, asdu: Asdu, qrp: ObjectQRP) -> Self::Future {
        self.deref().call_reset_process(asdu, qrp)
    }
    fn call_delay_acquisition(&self, asdu: Asdu, msec: u16) -> Self::Future {
        self.deref().call_delay_acquisition(asdu, msec)
    }
}

/// Gates an accepted TCP peer before a `Connection` slot is allocated for it.
pub trait ConnectionRequestHandler: Send + Sync {
    fn accept(&self, peer: IpAddr) -> bool;
}

impl<F> ConnectionRequestHandler for F
where
    F: Fn(IpAddr) -> bool + Send + Sync,
{
    fn accept(&self, peer: IpAddr) -> bool {
        self(peer)
    }
}

/// Lifecycle notifications for a connection: a typed enum carrying every transition
/// the application cares about, rather than a single error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Closed(CloseReason),
    Activated,
    Deactivated,
}

/// A sink for [`ConnectionEvent`]s, peer-addressed.
pub trait ConnectionEventHandler: Send + Sync {
    fn on_event(&self, peer: IpAddr, event: ConnectionEvent);
}

impl<F> ConnectionEventHandler for F
where
    F: Fn(IpAddr, ConnectionEvent) + Send + Sync,
{
    fn on_event(&self, peer: IpAddr, event: ConnectionEvent) {
        self(peer, event)
    }
}

/// Observes every decoded ASDU, active or not, before dispatch — an audit tap.
pub trait RawMessageHandler: Send + Sync {
    fn on_message(&self, peer: IpAddr, asdu: &Asdu);
}

impl<F> RawMessageHandler for F
where
    F: Fn(IpAddr, &Asdu) + Send + Sync,
{
    fn on_message(&self, peer: IpAddr, asdu: &Asdu) {
        self(peer, asdu)
    }
}

/// Whether a plugin consumed an ASDU itself, or left it for the normal dispatch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginOutcome {
    Handled,
    NotHandled,
}

/// A list of these is held by `Slave`: `handle_asdu` gets first refusal on every
/// decoded ASDU, `run_periodic` is polled on the same tick as `handle_timeouts`.
pub trait Plugin: Send + Sync {
    fn handle_asdu(&self, peer: IpAddr, asdu: &Asdu) -> PluginOutcome;
    fn run_periodic(&self, peer: IpAddr);
}
