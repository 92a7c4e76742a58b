use anyhow::Result;
use bytes::Bytes;
use iec104_slave::frame::asdu::{Asdu, Cause, TypeID};

#[test]
fn decode_and_encode_asdu() -> Result<()> {
    let bytes = Bytes::from_static(&[0x01, 0x01, 0x06, 0x00, 0x80, 0x60, 0x00, 0x01, 0x02, 0x03]);
    let asdu: Asdu = bytes.clone().try_into()?;
    assert_eq!(asdu.identifier.type_id, TypeID::M_SP_NA_1);
    assert_eq!(asdu.identifier.vsq.number().get().value(), 0x01);
    assert_eq!(asdu.identifier.cot.cause().get(), Cause::Activation);
    assert_eq!(asdu.identifier.common_addr, 0x8000);
    assert_eq!(asdu.raw, Bytes::from_static(&[0x60, 0x00, 0x01, 0x02, 0x03]));

    let raw: Bytes = asdu.try_into()?;
    assert_eq!(bytes, raw);
    Ok(())
}

#[test]
fn asdu_from_bytes_unknown_type_id_cause() -> Result<()> {
    let bytes = Bytes::from_static(&[
        0x30, 0x01, 0x6C, 0x00, 0x01, 0x00, 0x05, 0x62, 0x00, 0x32, 0x00, 0x80,
    ]);
    let asdu: Asdu = bytes.clone().try_into()?;
    assert_eq!(asdu.identifier.type_id, TypeID::C_SE_NA_1);
    assert_eq!(asdu.identifier.vsq.number().get().value(), 0x01);
    assert_eq!(asdu.identifier.cot.cause().get(), Cause::UnknownTypeID);
    assert_eq!(asdu.identifier.common_addr, 0x0100);
    assert_eq!(
        asdu.raw,
        Bytes::from_static(&[0x00, 0x05, 0x62, 0x00, 0x32, 0x00, 0x80])
    );

    let raw: Bytes = asdu.try_into()?;
    assert_eq!(bytes, raw);
    Ok(())
}

#[test]
fn asdu_too_short_is_rejected() {
    let bytes = Bytes::from_static(&[0x01, 0x01, 0x06, 0x00]);
    let result: Result<Asdu> = bytes.try_into();
    assert!(result.is_err());
}
