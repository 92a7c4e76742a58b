use bit_struct::*;

// QOI - Qualifier of Interrogation
bit_struct! {
    pub struct ObjectQOI(u8) {
        range: u8,   // 0-19 reserved, 20 station, 21-36 group 1-16, 37-255 reserved
    }
}

// QCC - Qualifier of Counter Interrogation Command
bit_struct! {
    pub struct ObjectQCC(u8) {
        qcc: u8,
    }
}

// QRP - Qualifier of Reset Process Command
bit_struct! {
    pub struct ObjectQRP(u8) {
        qrp: u8,     // 0 reserved, 1 process reset, 2 reset event buffer
    }
}
