use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use bit_struct::*;
use byteorder::{LittleEndian, WriteBytesExt};
use bytes::{BufMut, BytesMut};
use futures::future::BoxFuture;
use tokio::net::TcpListener;

use iec104_slave::frame::asdu::{
    Asdu, Cause, CauseOfTransmission, Identifier, TypeID, VariableStruct,
};
use iec104_slave::frame::csys::{ObjectQCC, ObjectQOI, ObjectQRP};
use iec104_slave::{APCIParameters, AppLayerParameters, Error, ServerHandler, Slave};

/// A toy process image: single-point information objects keyed by information object
/// address. Demonstrates the minimal `Asdu` surface the core exposes, encoding the
/// single-point value byte by hand rather than via a full command encoder.
struct ExampleHandler {
    points: Arc<Mutex<HashMap<u16, bool>>>,
}

impl ExampleHandler {
    fn new(points: HashMap<u16, bool>) -> Self {
        ExampleHandler {
            points: Arc::new(Mutex::new(points)),
        }
    }

    fn interrogation_response(&self) -> Asdu {
        let points = self.points.lock().unwrap();
        let mut raw = BytesMut::new();
        let mut writer = raw.writer();
        for (addr, value) in points.iter() {
            writer
                .write_u24::<LittleEndian>(*addr as u32)
                .expect("write to BytesMut never fails");
            writer
                .write_u8(if *value { 0x01 } else { 0x00 })
                .expect("write to BytesMut never fails");
        }
        let raw = writer.into_inner();
        Asdu {
            identifier: Identifier {
                type_id: TypeID::M_SP_NA_1,
                vsq: VariableStruct::new(u1::new(0).unwrap(), u7::new(points.len() as u8).unwrap()),
                cot: CauseOfTransmission::new(false, false, Cause::InterrogatedByStation),
                common_addr: 1,
            },
            raw: raw.freeze(),
        }
    }
}

impl ServerHandler for ExampleHandler {
    type Future = BoxFuture<'static, Result<Vec<Asdu>, Error>>;

    fn call_interrogation(&self, _asdu: Asdu, _qoi: ObjectQOI) -> Self::Future {
        let response = self.interrogation_response();
        Box::pin(async move { Ok(vec![response]) })
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

    fn call(&self, asdu: Asdu) -> Self::Future {
        log::debug!("unhandled ASDU type {:?}", asdu.identifier.type_id);
        Box::pin(async { Ok(Vec::new()) })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let socket_addr = "127.0.0.1:2404".parse().unwrap();
    println!("Starting up server on {socket_addr}");

    let mut points = HashMap::new();
    points.insert(100, false);
    points.insert(111, true);
    points.insert(121, false);

    let handler = ExampleHandler::new(points);
    let slave = Arc::new(Slave::new(
        handler,
        APCIParameters::default(),
        AppLayerParameters::default(),
    ));
    slave.set_max_open_connections(16);

    let listener = TcpListener::bind(socket_addr).await?;
    slave.start(listener).await?;

    Ok(())
}
