use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use bit_struct::*;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

use iec104_slave::connection::{Advance, Connection, ConnectionConfig, ConnectionHandle};
use iec104_slave::frame::apci::{
    new_iframe, new_sframe, new_uframe, ApciKind, SeqNo, U_STARTDT_ACTIVE, U_STARTDT_CONFIRM,
    U_TESTFR_ACTIVE, U_TESTFR_CONFIRM,
};
use iec104_slave::frame::asdu::{Asdu, Cause, CauseOfTransmission, Identifier, TypeID, VariableStruct};
use iec104_slave::frame::csys::{ObjectQCC, ObjectQOI, ObjectQRP};
use iec104_slave::{
    APCIParameters, Codec, Error, FakeClock, HighPrioQueue, MessageQueue, ServerHandler,
};

struct TestHandler;

impl ServerHandler for TestHandler {
    type Future = BoxFuture<'static, Result<Vec<Asdu>, Error>>;

    fn call_interrogation(&self, _asdu: Asdu, _qoi: ObjectQOI) -> Self::Future {
        Box::pin(async { Ok(Vec::new()) })
    }
    fn call_counter_interrogation(&self, _asdu: Asdu, _qcc: ObjectQCC) -> Self::Future {
        Box::pin(async { Ok(Vec::new()) })
    }
    fn call_read(&self, _asdu: Asdu) -> Self::Future {
        Box::pin(async { Ok(Vec::new()) })
    }
    fn call_clock_sync(&self, _asdu: Asdu, _time: chrono::DateTime<chrono::Utc>) -> Self::Future {
        Box::pin(async { Ok(Vec::new()) })
    }
    fn call_reset_process(&self, _asdu: Asdu, _qrp: ObjectQRP) -> Self::Future {
        Box::pin(async { Ok(Vec::new()) })
    }
    fn call_delay_acquisition(&self, _asdu: Asdu, _msec: u16) -> Self::Future {
        Box::pin(async { Ok(Vec::new()) })
    }
    fn call(&self, _asdu: Asdu) -> Self::Future {
        Box::pin(async { Ok(Vec::new()) })
    }
}

fn peer_addr() -> SocketAddr {
    "127.0.0.1:12345".parse().unwrap()
}

fn test_asdu() -> Asdu {
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

/// Builds a connection over one end of a loopback `tokio::io::duplex` pair, returning
/// it plus a `Framed` codec over the other end that the test drives as the peer.
fn harness(
    params: APCIParameters,
    clock: Arc<FakeClock>,
) -> (
    Connection<TestHandler, DuplexStream>,
    Framed<DuplexStream, Codec>,
) {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let handle = ConnectionHandle::new(peer_addr());
    let config = ConnectionConfig {
        handle,
        on_activate: Arc::new(|| {}),
        low_queue: Arc::new(MessageQueue::new(16)),
        high_queue: Arc::new(HighPrioQueue::new(16)),
        params,
        clock,
        handler: Arc::new(TestHandler),
        event_handler: None,
        raw_handler: None,
        plugins: Vec::new(),
    };
    let connection = Connection::new(config, server_io);
    let client = Framed::new(client_io, Codec);
    (connection, client)
}

/// STARTDT handshake activates the connection and echoes STARTDT_CON.
#[tokio::test]
async fn startdt_handshake_activates_connection() {
    let clock = Arc::new(FakeClock::new(0));
    let (mut connection, mut client) = harness(APCIParameters::default(), clock);

    client.send(new_uframe(U_STARTDT_ACTIVE)).await.unwrap();
    assert!(matches!(connection.tick().await, Advance::Idle));
    assert!(connection.handle().is_active());

    let reply = client.next().await.unwrap().unwrap();
    match ApciKind::from(reply.apci) {
        ApciKind::U(u) => assert_eq!(u.function, U_STARTDT_CONFIRM),
        _ => panic!("expected STARTDT_CON"),
    }
}

/// Once `w` unacknowledged I-frames have been received, the connection sends an
/// unsolicited S-frame ack on the next tick after the w-th arrives.
#[tokio::test]
async fn w_unacked_iframes_trigger_s_frame_ack() {
    let clock = Arc::new(FakeClock::new(0));
    let params = APCIParameters {
        w: 3,
        ..APCIParameters::default()
    };
    let (mut connection, mut client) = harness(params, clock);

    client.send(new_uframe(U_STARTDT_ACTIVE)).await.unwrap();
    assert!(matches!(connection.tick().await, Advance::Idle));
    let _ = client.next().await.unwrap().unwrap(); // STARTDT_CON

    for i in 0..3u16 {
        client
            .send(new_iframe(test_asdu(), SeqNo(i), SeqNo::ZERO))
            .await
            .unwrap();
        assert!(matches!(connection.tick().await, Advance::Idle));
    }

    let reply = client.next().await.unwrap().unwrap();
    match ApciKind::from(reply.apci) {
        ApciKind::S(s) => assert_eq!(s.rcv_sn, SeqNo(3)),
        _ => panic!("expected S-frame ack"),
    }
}

/// Below the `w` threshold, a pending ack is still flushed once `t2` elapses.
#[tokio::test]
async fn t2_timeout_flushes_pending_ack() {
    let clock = Arc::new(FakeClock::new(0));
    let params = APCIParameters {
        w: 100,
        t2: 1,
        ..APCIParameters::default()
    };
    let (mut connection, mut client) = harness(params, Arc::clone(&clock));

    client.send(new_uframe(U_STARTDT_ACTIVE)).await.unwrap();
    assert!(matches!(connection.tick().await, Advance::Idle));
    let _ = client.next().await.unwrap().unwrap(); // STARTDT_CON

    client
        .send(new_iframe(test_asdu(), SeqNo::ZERO, SeqNo::ZERO))
        .await
        .unwrap();
    assert!(matches!(connection.tick().await, Advance::Idle));

    clock.advance(1_500);
    assert!(matches!(connection.tick().await, Advance::Idle));

    let reply = client.next().await.unwrap().unwrap();
    match ApciKind::from(reply.apci) {
        ApciKind::S(s) => assert_eq!(s.rcv_sn, SeqNo(1)),
        _ => panic!("expected S-frame ack"),
    }
}

/// Four T3 cycles with no TESTFR_CON in between close the connection on overrun;
/// a confirm arriving in between resets the counter and keeps it open.
#[tokio::test]
async fn t3_overrun_without_testfr_confirm_closes_connection() {
    let clock = Arc::new(FakeClock::new(0));
    let params = APCIParameters {
        t3: 1,
        ..APCIParameters::default()
    };
    let (mut connection, mut client) = harness(params, Arc::clone(&clock));

    for _ in 0..3 {
        clock.advance(1_000);
        assert!(matches!(connection.tick().await, Advance::Idle));
        let testfr = client.next().await.unwrap().unwrap();
        match ApciKind::from(testfr.apci) {
            ApciKind::U(u) => assert_eq!(u.function, U_TESTFR_ACTIVE),
            _ => panic!("expected TESTFR_ACT"),
        }
    }

    clock.advance(1_000);
    match connection.tick().await {
        Advance::Closed(reason) => {
            assert_eq!(reason.to_string(), "more than two unanswered TESTFR_ACT")
        }
        Advance::Idle => panic!("expected the connection to close on T3 overrun"),
    }
}

/// A TESTFR_CON received before the next T3 deadline resets the outstanding counter,
/// so the connection survives indefinitely as long as the peer keeps answering.
#[tokio::test]
async fn testfr_confirm_resets_overrun_counter() {
    let clock = Arc::new(FakeClock::new(0));
    let params = APCIParameters {
        t3: 1,
        ..APCIParameters::default()
    };
    let (mut connection, mut client) = harness(params, Arc::clone(&clock));

    for _ in 0..5 {
        clock.advance(1_000);
        assert!(matches!(connection.tick().await, Advance::Idle));
        let testfr = client.next().await.unwrap().unwrap();
        match ApciKind::from(testfr.apci) {
            ApciKind::U(u) => assert_eq!(u.function, U_TESTFR_ACTIVE),
            _ => panic!("expected TESTFR_ACT"),
        }
        client.send(new_uframe(U_TESTFR_CONFIRM)).await.unwrap();
        assert!(matches!(connection.tick().await, Advance::Idle));
    }
}

/// An S-frame carrying an out-of-window N(R) is a sequence error and closes the
/// connection, independent of the I-frame path.
#[tokio::test]
async fn s_frame_with_invalid_nr_closes_connection() {
    let clock = Arc::new(FakeClock::new(0));
    let (mut connection, mut client) = harness(APCIParameters::default(), clock);

    client.send(new_uframe(U_STARTDT_ACTIVE)).await.unwrap();
    assert!(matches!(connection.tick().await, Advance::Idle));
    let _ = client.next().await.unwrap().unwrap(); // STARTDT_CON

    client.send(new_sframe(SeqNo(500))).await.unwrap();
    match connection.tick().await {
        Advance::Closed(reason) => assert_eq!(reason.to_string(), "N(S)/N(R) sequence error"),
        Advance::Idle => panic!("expected a sequence error close"),
    }
}
