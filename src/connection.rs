use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Notify;
use tokio::time::interval;
use tokio_util::codec::Framed;

use crate::clock::Clock;
use crate::codec::Codec;
use crate::error::{CloseReason, Error};
use crate::frame::apci::{
    new_iframe, new_sframe, new_uframe, ApciKind, SeqNo, U_STARTDT_ACTIVE, U_STARTDT_CONFIRM,
    U_STOPDT_ACTIVE, U_STOPDT_CONFIRM, U_TESTFR_ACTIVE, U_TESTFR_CONFIRM,
};
use crate::frame::asdu::{Asdu, Cause, TypeID, INFO_OBJ_ADDR_IRRELEVANT, INVALID_COMMON_ADDR};
use crate::handler::{
    ConnectionEvent, ConnectionEventHandler, Plugin, PluginOutcome, RawMessageHandler,
    ServerHandler,
};
use crate::params::APCIParameters;
use crate::queue::{HighPrioQueue, MessageQueue, QueueEntryPtr};

/// Shared flags a `Slave` reads/writes from outside the task driving this connection.
/// A naive design would give the slave a reference back into the live `Connection`,
/// creating a cycle; instead the slave only ever sees this non-owning handle, while
/// the k-buffer, timers and receive-side counters stay owned exclusively by whichever
/// driver — threaded task or threadless tick — is advancing the connection.
pub struct ConnectionHandle {
    pub peer: SocketAddr,
    is_active: AtomicBool,
    close_notify: Arc<Notify>,
}

impl ConnectionHandle {
    pub fn new(peer: SocketAddr) -> Arc<Self> {
        Arc::new(ConnectionHandle {
            peer,
            is_active: AtomicBool::new(false),
            close_notify: Arc::new(Notify::new()),
        })
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    /// Deactivate from the outside; used by `Slave::activate` to enforce exclusivity
    /// among peers sharing an activation scope.
    pub fn deactivate(&self) {
        self.is_active.store(false, Ordering::SeqCst);
    }

    fn activate(&self) {
        self.is_active.store(true, Ordering::SeqCst);
    }

    /// Request the connection close itself at its next opportunity (threaded mode
    /// only; the threadless driver is stopped by the caller simply ceasing to `tick`).
    pub fn close(&self) {
        self.close_notify.notify_one();
    }
}

#[derive(Debug, Clone, Copy)]
struct SentEntry {
    seq_no: SeqNo,
    queue_entry: Option<QueueEntryPtr>,
    sent_time: u64,
}

/// The APCI window/timer state a `Connection` carries. Kept as its own struct,
/// separate from I/O, so `check_seqno` and the timer logic can be unit tested without
/// a socket.
struct Window {
    send_count: SeqNo,
    receive_count: SeqNo,
    unconfirmed_received_i: u16,
    outstanding_testfr_con: u8,
    timeout_t2_triggered: bool,
    last_confirmation_time: u64,
    next_t3_timeout: u64,
    k_buffer: std::collections::VecDeque<SentEntry>,
}

impl Window {
    fn new(now_ms: u64, t3_secs: u64) -> Self {
        Window {
            send_count: SeqNo::ZERO,
            receive_count: SeqNo::ZERO,
            unconfirmed_received_i: 0,
            outstanding_testfr_con: 0,
            timeout_t2_triggered: false,
            last_confirmation_time: u64::MAX,
            next_t3_timeout: now_ms + t3_secs * 1000,
            k_buffer: std::collections::VecDeque::new(),
        }
    }

    fn window_full(&self, k: u16) -> bool {
        self.k_buffer.len() >= k as usize
    }

    /// Sequence-number check: confirm every sent I-frame up to and including
    /// `seq_no`, reporting whether `seq_no` was valid given the current k-buffer.
    fn check_seqno(&mut self, seq_no: SeqNo, low_queue: &MessageQueue) -> bool {
        let (old, new) = match (self.k_buffer.front(), self.k_buffer.back()) {
            (Some(o), Some(n)) => (o.seq_no, n.seq_no),
            _ => return seq_no == self.send_count,
        };

        if seq_no == old.prev() {
            // Re-ack of the most recently confirmed prefix; nothing left to confirm.
            return true;
        }

        let in_range = if old.0 <= new.0 {
            old.0 <= seq_no.0 && seq_no.0 <= new.0
        } else {
            seq_no.0 >= old.0 || seq_no.0 <= new.0
        };
        if !in_range {
            return false;
        }

        while let Some(entry) = self.k_buffer.front().copied() {
            if let Some(ptr) = entry.queue_entry {
                low_queue.mark_confirmed(ptr);
            }
            self.k_buffer.pop_front();
            if entry.seq_no == seq_no {
                break;
            }
        }
        true
    }

    /// Clock-going-backwards guard: clamp any stored timestamp that is ahead of `now`
    /// in place rather than treating it as an error.
    fn clamp_to_now(&mut self, now: u64) {
        if self.next_t3_timeout > now {
            self.next_t3_timeout = now;
        }
        if self.last_confirmation_time != u64::MAX && self.last_confirmation_time > now {
            self.last_confirmation_time = now;
        }
        for entry in self.k_buffer.iter_mut() {
            if entry.sent_time > now {
                entry.sent_time = now;
            }
        }
    }
}

/// Everything a connection needs from its owning `Slave`: the queues it is bound to
/// (per the server mode, resolved once at accept time), shared parameters/clock, the
/// application callbacks, and a closure that performs activation-exclusivity
/// enforcement within this connection's scope.
pub struct ConnectionConfig<H> {
    pub handle: Arc<ConnectionHandle>,
    pub on_activate: Arc<dyn Fn() + Send + Sync>,
    pub low_queue: Arc<MessageQueue>,
    pub high_queue: Arc<HighPrioQueue>,
    pub params: APCIParameters,
    pub clock: Arc<dyn Clock>,
    pub handler: Arc<H>,
    pub event_handler: Option<Arc<dyn ConnectionEventHandler>>,
    pub raw_handler: Option<Arc<dyn RawMessageHandler>>,
    pub plugins: Vec<Arc<dyn Plugin>>,
}

/// What came out of advancing a connection by one step.
pub enum Advance {
    Idle,
    Closed(CloseReason),
}

/// Drives one accepted peer's APCI state machine, built-in interrogation/
/// counter-interrogation dispatch, and outbound draining. The same per-connection
/// logic (`handle_timeouts`, `drain_outbound`, one-message processing) drives both the
/// threaded (`run`, one `tokio::spawn`ed task per connection) and threadless
/// (`Slave::tick`, cooperative polling) schedulers; an internal self-addressed mpsc
/// channel would add no decoupling within a single task, so there isn't one.
pub struct Connection<H, T> {
    handle: Arc<ConnectionHandle>,
    on_activate: Arc<dyn Fn() + Send + Sync>,
    low_queue: Arc<MessageQueue>,
    high_queue: Arc<HighPrioQueue>,
    params: APCIParameters,
    clock: Arc<dyn Clock>,
    handler: Arc<H>,
    event_handler: Option<Arc<dyn ConnectionEventHandler>>,
    raw_handler: Option<Arc<dyn RawMessageHandler>>,
    plugins: Vec<Arc<dyn Plugin>>,
    framed: Framed<T, Codec>,
    win: Window,
}

impl<H, T> Connection<H, T>
where
    H: ServerHandler + Send + Sync + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(config: ConnectionConfig<H>, stream: T) -> Self {
        let now = config.clock.now_ms();
        let win = Window::new(now, config.params.t3);
        let connection = Connection {
            handle: config.handle,
            on_activate: config.on_activate,
            low_queue: config.low_queue,
            high_queue: config.high_queue,
            params: config.params,
            clock: config.clock,
            handler: config.handler,
            event_handler: config.event_handler,
            raw_handler: config.raw_handler,
            plugins: config.plugins,
            framed: Framed::new(stream, Codec),
            win,
        };
        if let Some(eh) = &connection.event_handler {
            eh.on_event(connection.handle.peer.ip(), ConnectionEvent::Opened);
        }
        connection
    }

    pub fn peer(&self) -> SocketAddr {
        self.handle.peer
    }

    pub fn handle(&self) -> Arc<ConnectionHandle> {
        self.handle.clone()
    }

    /// Threaded driver: owns the connection until it closes, select!-ing over a 100ms
    /// tick, the transport stream, and an external close request.
    pub async fn run(mut self, close_notify: Arc<Notify>) -> Result<(), Error> {
        let mut tick = interval(Duration::from_millis(100));
        let reason = loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.on_tick().await {
                        Ok(()) => {}
                        Err(reason) => break reason,
                    }
                }
                _ = close_notify.notified() => {
                    break CloseReason::Stopped;
                }
                apdu = self.framed.next() => {
                    match self.on_frame(apdu).await {
                        Ok(()) => {}
                        Err(reason) => break reason,
                    }
                }
            }
        };
        self.close(reason);
        Ok(())
    }

    /// Threadless driver: one bounded attempt to read a frame (non-blocking), then
    /// timers and outbound draining, all within the caller's own task. Returns
    /// `Advance::Closed` once the connection should be dropped from the table.
    pub async fn tick(&mut self) -> Advance {
        let next = self.framed.next().now_or_never();
        if let Some(apdu) = next {
            if let Err(reason) = self.on_frame(apdu).await {
                return Advance::Closed(reason);
            }
        }
        if let Err(reason) = self.on_tick().await {
            return Advance::Closed(reason);
        }
        Advance::Idle
    }

    fn close(&self, reason: CloseReason) {
        let peer = self.handle.peer;
        log::info!("[{peer}] connection closed: {reason}");
        if self.handle.is_active() {
            self.handle.deactivate();
            self.low_queue.revert_unconfirmed_to_waiting();
        }
        if let Some(eh) = &self.event_handler {
            eh.on_event(peer.ip(), ConnectionEvent::Closed(reason));
        }
    }

    pub fn close_and_notify(self, reason: CloseReason) {
        self.close(reason);
    }

    async fn on_tick(&mut self) -> Result<(), CloseReason> {
        for plugin in &self.plugins {
            plugin.run_periodic(self.handle.peer.ip());
        }
        handle_timeouts(&mut self.win, &self.params, &self.clock, &mut self.framed).await?;
        if self.handle.is_active() {
            drain_outbound(
                &mut self.win,
                &self.params,
                &self.clock,
                &self.low_queue,
                &self.high_queue,
                &mut self.framed,
            )
            .await
            .map_err(|_| CloseReason::Transport)?;
        }
        Ok(())
    }

    async fn on_frame(
        &mut self,
        apdu: Option<anyhow::Result<crate::frame::Apdu>>,
    ) -> Result<(), CloseReason> {
        let peer = self.handle.peer;
        let apdu = match apdu {
            Some(Ok(apdu)) => apdu,
            Some(Err(e)) => {
                log::error!("[{peer}] framing error: {e}");
                return Err(CloseReason::FramingError);
            }
            None => {
                log::info!("[{peer}] stream closed by peer");
                return Err(CloseReason::PeerClosed);
            }
        };

        let now = self.clock.now_ms();
        self.win.next_t3_timeout = now + self.params.t3 * 1000;

        match ApciKind::from(apdu.apci) {
            ApciKind::I(iapci) => {
                log::debug!(
                    "[{peer}] RX I-frame send_sn={} rcv_sn={}",
                    iapci.send_sn.0,
                    iapci.rcv_sn.0
                );

                if !self.win.timeout_t2_triggered {
                    self.win.timeout_t2_triggered = true;
                    self.win.last_confirmation_time = now;
                }

                if iapci.send_sn != self.win.receive_count {
                    log::error!(
                        "[{peer}] sequence error: got N(S)={} expected {}",
                        iapci.send_sn.0,
                        self.win.receive_count.0
                    );
                    return Err(CloseReason::SequenceError);
                }
                if !self.win.check_seqno(iapci.rcv_sn, &self.low_queue) {
                    log::error!("[{peer}] invalid N(R)={}", iapci.rcv_sn.0);
                    return Err(CloseReason::SequenceError);
                }

                self.win.receive_count = self.win.receive_count.next();
                self.win.unconfirmed_received_i += 1;

                if let Some(asdu) = apdu.asdu {
                    if let Some(rh) = &self.raw_handler {
                        rh.on_message(peer.ip(), &asdu);
                    }
                    if self.handle.is_active() {
                        let handled_by_plugin = self
                            .plugins
                            .iter()
                            .any(|p| p.handle_asdu(peer.ip(), &asdu) == PluginOutcome::Handled);
                        if !handled_by_plugin {
                            if let Err(e) = dispatch(
                                &self.handler,
                                &self.high_queue,
                                &self.low_queue,
                                &self.clock,
                                asdu,
                            )
                            .await
                            {
                                log::warn!("[{peer}] handler error: {e}");
                            }
                        }
                    }
                }

                if self.win.unconfirmed_received_i >= self.params.w {
                    send_s(&mut self.framed, self.win.receive_count)
                        .await
                        .map_err(|_| CloseReason::Transport)?;
                    self.win.unconfirmed_received_i = 0;
                    self.win.timeout_t2_triggered = false;
                }
            }
            ApciKind::U(uapci) => {
                log::debug!("[{peer}] RX U-frame function={:#x}", uapci.function);
                match uapci.function {
                    U_STARTDT_ACTIVE => {
                        (self.on_activate)();
                        self.handle.activate();
                        self.high_queue.reset();
                        send_u(&mut self.framed, U_STARTDT_CONFIRM)
                            .await
                            .map_err(|_| CloseReason::Transport)?;
                        if let Some(eh) = &self.event_handler {
                            eh.on_event(peer.ip(), ConnectionEvent::Activated);
                        }
                    }
                    U_STOPDT_ACTIVE => {
                        self.handle.deactivate();
                        send_u(&mut self.framed, U_STOPDT_CONFIRM)
                            .await
                            .map_err(|_| CloseReason::Transport)?;
                        if let Some(eh) = &self.event_handler {
                            eh.on_event(peer.ip(), ConnectionEvent::Deactivated);
                        }
                    }
                    U_TESTFR_CONFIRM => {
                        self.win.outstanding_testfr_con = 0;
                    }
                    U_TESTFR_ACTIVE => {
                        send_u(&mut self.framed, U_TESTFR_CONFIRM)
                            .await
                            .map_err(|_| CloseReason::Transport)?;
                    }
                    other => {
                        log::warn!("[{peer}] unsupported U-frame function {other:#x}");
                    }
                }
            }
            ApciKind::S(sapci) => {
                log::debug!("[{peer}] RX S-frame rcv_sn={}", sapci.rcv_sn.0);
                if !self.win.check_seqno(sapci.rcv_sn, &self.low_queue) {
                    log::error!("[{peer}] invalid N(R)={} in S-frame", sapci.rcv_sn.0);
                    return Err(CloseReason::SequenceError);
                }
            }
        }
        Ok(())
    }
}

async fn send_u<T>(framed: &mut Framed<T, Codec>, function: u8) -> anyhow::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(new_uframe(function)).await
}

async fn send_s<T>(framed: &mut Framed<T, Codec>, rcv_sn: SeqNo) -> anyhow::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(new_sframe(rcv_sn)).await
}

async fn send_i<T>(
    win: &mut Window,
    params: &APCIParameters,
    clock: &Arc<dyn Clock>,
    framed: &mut Framed<T, Codec>,
    asdu: Asdu,
    queue_entry: Option<QueueEntryPtr>,
) -> anyhow::Result<bool>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    if win.window_full(params.k) {
        return Ok(false);
    }
    let send_sn = win.send_count;
    let rcv_sn = win.receive_count;
    let apdu = new_iframe(asdu, send_sn, rcv_sn);
    framed.send(apdu).await?;

    let now = clock.now_ms();
    win.k_buffer.push_back(SentEntry {
        seq_no: send_sn,
        queue_entry,
        sent_time: now,
    });
    win.send_count = send_sn.next();
    win.unconfirmed_received_i = 0;
    win.timeout_t2_triggered = false;
    Ok(true)
}

/// Drains outbound traffic: the high-priority queue entirely, then at most one
/// low-priority entry per pass.
async fn drain_outbound<T>(
    win: &mut Window,
    params: &APCIParameters,
    clock: &Arc<dyn Clock>,
    low_queue: &MessageQueue,
    high_queue: &HighPrioQueue,
    framed: &mut Framed<T, Codec>,
) -> anyhow::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(asdu) = high_queue.next() {
        if !send_i(win, params, clock, framed, asdu, None).await? {
            break;
        }
    }

    if !win.window_full(params.k) {
        if let Some((ptr, asdu)) = low_queue.next_waiting() {
            send_i(win, params, clock, framed, asdu, Some(ptr)).await?;
        }
    }
    Ok(())
}

/// Checks the three timers: T3 idle keep-alive, T2 ack deadline, T1 peer-ack timeout.
async fn handle_timeouts<T>(
    win: &mut Window,
    params: &APCIParameters,
    clock: &Arc<dyn Clock>,
    framed: &mut Framed<T, Codec>,
) -> Result<(), CloseReason>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let now = clock.now_ms();
    win.clamp_to_now(now);

    if now >= win.next_t3_timeout {
        if win.outstanding_testfr_con > 2 {
            return Err(CloseReason::TimeoutT3Overrun);
        }
        if send_u(framed, U_TESTFR_ACTIVE).await.is_err() {
            return Err(CloseReason::Transport);
        }
        win.outstanding_testfr_con += 1;
        win.next_t3_timeout = now + params.t3 * 1000;
    }

    if win.unconfirmed_received_i > 0
        && now.saturating_sub(win.last_confirmation_time) >= params.t2 * 1000
    {
        if send_s(framed, win.receive_count).await.is_err() {
            return Err(CloseReason::Transport);
        }
        win.unconfirmed_received_i = 0;
        win.timeout_t2_triggered = false;
        win.last_confirmation_time = now;
    }

    if let Some(oldest) = win.k_buffer.front() {
        if now.saturating_sub(oldest.sent_time) >= params.t1 * 1000 {
            return Err(CloseReason::TimeoutT1);
        }
    }

    Ok(())
}

/// Built-in dispatch of `C_IC_NA_1`/`C_CI_NA_1`/`C_RD_NA_1`/`C_CS_NA_1`/`C_RP_NA_1`/
/// `C_CD_NA_1`, falling through to the generic handler for everything else.
/// Command-confirmation style responses (built-in dispatch output, and UNKNOWN_*
/// echoes) go through the high-priority queue; general application output goes
/// through the low-priority queue so it is confirmation-tracked and replayed to a
/// successor connection.
async fn dispatch<H: ServerHandler>(
    handler: &Arc<H>,
    high_queue: &HighPrioQueue,
    low_queue: &MessageQueue,
    clock: &Arc<dyn Clock>,
    asdu: Asdu,
) -> Result<(), Error> {
    let ca = asdu.identifier.common_addr;
    let cause = asdu.identifier.cot.cause().get();

    match asdu.identifier.type_id {
        TypeID::C_IC_NA_1 => {
            if !(cause == Cause::Activation || cause == Cause::Deactivation) {
                high_queue.enqueue(asdu.mirror(Cause::UnknownCOT));
                return Ok(());
            }
            if ca == INVALID_COMMON_ADDR {
                high_queue.enqueue(asdu.mirror(Cause::UnknownCA));
                return Ok(());
            }
            let (ioa, qoi) = asdu.get_interrogation_cmd()?;
            if ioa.addr().get().value() != INFO_OBJ_ADDR_IRRELEVANT {
                high_queue.enqueue(asdu.mirror(Cause::UnknownIOA));
                return Ok(());
            }
            for out in handler.call_interrogation(asdu, qoi).await? {
                high_queue.enqueue(out);
            }
        }
        TypeID::C_CI_NA_1 => {
            if cause != Cause::Activation {
                high_queue.enqueue(asdu.mirror(Cause::UnknownCOT));
                return Ok(());
            }
            if ca == INVALID_COMMON_ADDR {
                high_queue.enqueue(asdu.mirror(Cause::UnknownCA));
                return Ok(());
            }
            let (ioa, qcc) = asdu.get_counter_interrogation_cmd()?;
            if ioa.addr().get().value() != INFO_OBJ_ADDR_IRRELEVANT {
                high_queue.enqueue(asdu.mirror(Cause::UnknownIOA));
                return Ok(());
            }
            for out in handler.call_counter_interrogation(asdu, qcc).await? {
                high_queue.enqueue(out);
            }
        }
        TypeID::C_RD_NA_1 => {
            if cause != Cause::Request {
                high_queue.enqueue(asdu.mirror(Cause::UnknownCOT));
                return Ok(());
            }
            if ca == INVALID_COMMON_ADDR {
                high_queue.enqueue(asdu.mirror(Cause::UnknownCA));
                return Ok(());
            }
            asdu.get_read_cmd()?;
            for out in handler.call_read(asdu).await? {
                high_queue.enqueue(out);
            }
        }
        TypeID::C_CS_NA_1 => {
            if cause != Cause::Activation {
                high_queue.enqueue(asdu.mirror(Cause::UnknownCOT));
                return Ok(());
            }
            if ca == INVALID_COMMON_ADDR {
                high_queue.enqueue(asdu.mirror(Cause::UnknownCA));
                return Ok(());
            }
            let (_, time) = asdu.get_clock_sync_cmd()?;
            for out in handler.call_clock_sync(asdu, time).await? {
                high_queue.enqueue(out);
            }
        }
        TypeID::C_RP_NA_1 => {
            if cause != Cause::Activation {
                high_queue.enqueue(asdu.mirror(Cause::UnknownCOT));
                return Ok(());
            }
            if ca == INVALID_COMMON_ADDR {
                high_queue.enqueue(asdu.mirror(Cause::UnknownCA));
                return Ok(());
            }
            let (_, qrp) = asdu.get_reset_process_cmd()?;
            for out in handler.call_reset_process(asdu, qrp).await? {
                high_queue.enqueue(out);
            }
        }
        TypeID::C_CD_NA_1 => {
            if cause != Cause::Activation {
                high_queue.enqueue(asdu.mirror(Cause::UnknownCOT));
                return Ok(());
            }
            if ca == INVALID_COMMON_ADDR {
                high_queue.enqueue(asdu.mirror(Cause::UnknownCA));
                return Ok(());
            }
            let (_, msec) = asdu.get_delay_acquisition_cmd()?;
            for out in handler.call_delay_acquisition(asdu, msec).await? {
                high_queue.enqueue(out);
            }
        }
        _ => {
            let now = clock.now_ms();
            for out in handler.call(asdu).await? {
                low_queue.enqueue(out, now);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::asdu::{CauseOfTransmission, Identifier, VariableStruct};
    use bit_struct::*;
    use bytes::Bytes;

    fn asdu() -> Asdu {
        Asdu {
            identifier: Identifier {
                type_id: TypeID::M_SP_NA_1,
                vsq: VariableStruct::new(u1::new(0).unwrap(), u7::new(1).unwrap()),
                cot: CauseOfTransmission::new(false, true, Cause::Spontaneous),
                common_addr: 1,
            },
            raw: Bytes::new(),
        }
    }

    #[test]
    fn check_seqno_empty_buffer_requires_exact_match() {
        let q = MessageQueue::new(4);
        let mut win = Window::new(0, 20);
        assert!(win.check_seqno(SeqNo::ZERO, &q));
        assert!(!win.check_seqno(SeqNo(1), &q));
    }

    #[test]
    fn check_seqno_confirms_prefix_and_advances_oldest() {
        let q = MessageQueue::new(4);
        q.enqueue(asdu(), 1);
        q.enqueue(asdu(), 2);
        let (ptr0, _) = q.next_waiting().unwrap();
        let (ptr1, _) = q.next_waiting().unwrap();

        let mut win = Window::new(0, 20);
        win.k_buffer.push_back(SentEntry {
            seq_no: SeqNo(0),
            queue_entry: Some(ptr0),
            sent_time: 0,
        });
        win.k_buffer.push_back(SentEntry {
            seq_no: SeqNo(1),
            queue_entry: Some(ptr1),
            sent_time: 0,
        });

        assert!(win.check_seqno(SeqNo(0), &q));
        assert_eq!(win.k_buffer.len(), 1);
        assert_eq!(win.k_buffer.front().unwrap().seq_no, SeqNo(1));
    }

    #[test]
    fn check_seqno_rejects_out_of_window() {
        let q = MessageQueue::new(4);
        let mut win = Window::new(0, 20);
        win.k_buffer.push_back(SentEntry {
            seq_no: SeqNo(5),
            queue_entry: None,
            sent_time: 0,
        });
        win.k_buffer.push_back(SentEntry {
            seq_no: SeqNo(8),
            queue_entry: None,
            sent_time: 0,
        });
        assert!(!win.check_seqno(SeqNo(20), &q));
        assert!(win.check_seqno(SeqNo(4), &q)); // re-ack of prefix (old - 1)
    }

    #[test]
    fn clamp_to_now_handles_clock_regression() {
        let mut win = Window::new(1_000, 20);
        win.next_t3_timeout = 50_000;
        win.last_confirmation_time = 60_000;
        win.k_buffer.push_back(SentEntry {
            seq_no: SeqNo::ZERO,
            queue_entry: None,
            sent_time: 70_000,
        });
        win.clamp_to_now(1_000);
        assert_eq!(win.next_t3_timeout, 1_000);
        assert_eq!(win.last_confirmation_time, 1_000);
        assert_eq!(win.k_buffer.front().unwrap().sent_time, 1_000);
    }
}
