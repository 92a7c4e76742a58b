use crate::frame::asdu::{Asdu, IDENTIFIER_SIZE};

pub const START_FRAME: u8 = 0x68;

// APDU form, max size 255
//      |              APCI                   |       ASDU         |
//      | start | APDU length | control field |       ASDU         |
//                       |          APDU field size(253)           |
// bytes|    1  |    1   |        4           |                    |
pub const APCI_FIELD_SIZE: usize = 6;
pub const APCICTL_FIELD_SIZE: usize = 4;
pub const APDU_SIZE_MAX: usize = 255;
pub const APDU_LENGTH_MIN: u8 = 4;

// U-frame control field function codes (pre-OR with the 0b11 unnumbered tag).
pub const U_STARTDT_ACTIVE: u8 = 0x04;
pub const U_STARTDT_CONFIRM: u8 = 0x08;
pub const U_STOPDT_ACTIVE: u8 = 0x10;
pub const U_STOPDT_CONFIRM: u8 = 0x20;
pub const U_TESTFR_ACTIVE: u8 = 0x40;
pub const U_TESTFR_CONFIRM: u8 = 0x80;

pub const MOD_32768: u32 = 32768;

/// A 15-bit I-frame sequence number (N(S) or N(R)) with mod-32768 arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SeqNo(pub u16);

impl SeqNo {
    pub const ZERO: SeqNo = SeqNo(0);

    pub fn next(self) -> SeqNo {
        SeqNo((self.0 as u32 + 1).rem_euclid(MOD_32768) as u16)
    }

    /// Forward distance from `self` to `other`, wrap-aware: `other` reached by advancing
    /// `self` this many steps (mod 32768).
    pub fn forward_distance_to(self, other: SeqNo) -> u32 {
        (other.0 as i32 - self.0 as i32).rem_euclid(MOD_32768 as i32) as u32
    }

    pub fn prev(self) -> SeqNo {
        SeqNo(((self.0 as i32 - 1).rem_euclid(MOD_32768 as i32)) as u16)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Apci {
    pub start: u8,
    pub apdu_length: u8,
    pub ctrl1: u8,
    pub ctrl2: u8,
    pub ctrl3: u8,
    pub ctrl4: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct IApci {
    pub send_sn: SeqNo,
    pub rcv_sn: SeqNo,
}

#[derive(Debug, Clone, Copy)]
pub struct UApci {
    pub function: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct SApci {
    pub rcv_sn: SeqNo,
}

#[derive(Debug, Clone, Copy)]
pub enum ApciKind {
    I(IApci),
    U(UApci),
    S(SApci),
}

impl From<Apci> for ApciKind {
    fn from(apci: Apci) -> Self {
        if apci.ctrl1 & 0x01 == 0 {
            return ApciKind::I(IApci {
                send_sn: SeqNo(((apci.ctrl1 as u16) >> 1) | ((apci.ctrl2 as u16) << 7)),
                rcv_sn: SeqNo(((apci.ctrl3 as u16) >> 1) | ((apci.ctrl4 as u16) << 7)),
            });
        }

        if apci.ctrl1 & 0x03 == 0x01 {
            return ApciKind::S(SApci {
                rcv_sn: SeqNo(((apci.ctrl3 as u16) >> 1) | ((apci.ctrl4 as u16) << 7)),
            });
        }

        ApciKind::U(UApci {
            function: apci.ctrl1 & 0xfc,
        })
    }
}

/// The 6-byte header plus an optional ASDU payload for an I-frame.
#[derive(Debug)]
pub struct Apdu {
    pub apci: Apci,
    pub asdu: Option<Asdu>,
}

pub fn new_iframe(asdu: Asdu, send_sn: SeqNo, rcv_sn: SeqNo) -> Apdu {
    let apci = Apci {
        start: START_FRAME,
        apdu_length: APCICTL_FIELD_SIZE as u8 + IDENTIFIER_SIZE as u8 + asdu.raw.len() as u8,
        ctrl1: (send_sn.0 << 1) as u8,
        ctrl2: (send_sn.0 >> 7) as u8,
        ctrl3: (rcv_sn.0 << 1) as u8,
        ctrl4: (rcv_sn.0 >> 7) as u8,
    };
    Apdu {
        apci,
        asdu: Some(asdu),
    }
}

pub fn new_sframe(rcv_sn: SeqNo) -> Apdu {
    Apdu {
        apci: Apci {
            start: START_FRAME,
            apdu_length: APCICTL_FIELD_SIZE as u8,
            ctrl1: 0x01,
            ctrl2: 0x00,
            ctrl3: (rcv_sn.0 << 1) as u8,
            ctrl4: (rcv_sn.0 >> 7) as u8,
        },
        asdu: None,
    }
}

pub fn new_uframe(function: u8) -> Apdu {
    Apdu {
        apci: Apci {
            start: START_FRAME,
            apdu_length: APCICTL_FIELD_SIZE as u8,
            ctrl1: function | 0x03,
            ctrl2: 0x00,
            ctrl3: 0x00,
            ctrl4: 0x00,
        },
        asdu: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seqno_wraps_at_32768() {
        assert_eq!(SeqNo(32767).next(), SeqNo(0));
        assert_eq!(SeqNo(0).prev(), SeqNo(32767));
    }

    #[test]
    fn seqno_forward_distance_wraps() {
        assert_eq!(SeqNo(5).forward_distance_to(SeqNo(8)), 3);
        assert_eq!(SeqNo(32766).forward_distance_to(SeqNo(1)), 3);
        assert_eq!(SeqNo(5).forward_distance_to(SeqNo(5)), 0);
    }

    #[test]
    fn classify_startdt_act() {
        let apci = Apci {
            start: START_FRAME,
            apdu_length: 4,
            ctrl1: U_STARTDT_ACTIVE | 0x03,
            ctrl2: 0,
            ctrl3: 0,
            ctrl4: 0,
        };
        match ApciKind::from(apci) {
            ApciKind::U(u) => assert_eq!(u.function, U_STARTDT_ACTIVE),
            _ => panic!("expected U-frame"),
        }
    }

    #[test]
    fn classify_iframe_seqnos() {
        // 68 04 02 00 03 00 -> send_sn=1, rcv_sn=1
        let apci = Apci {
            start: START_FRAME,
            apdu_length: 4,
            ctrl1: 0x02,
            ctrl2: 0x00,
            ctrl3: 0x03,
            ctrl4: 0x00,
        };
        match ApciKind::from(apci) {
            ApciKind::I(i) => {
                assert_eq!(i.send_sn, SeqNo(1));
                assert_eq!(i.rcv_sn, SeqNo(1));
            }
            _ => panic!("expected I-frame"),
        }
    }
}
