/// APCI-layer tunables. Defaults are the book values from IEC 60870-5-104.
#[derive(Debug, Clone, Copy)]
pub struct APCIParameters {
    /// Max unacknowledged I-frames the connection may have outstanding.
    pub k: u16,
    /// Max unacknowledged received I-frames before an S-frame is required.
    pub w: u16,
    /// Connect timeout, seconds.
    pub t0: u64,
    /// Ack timeout for sent I-frames, seconds.
    pub t1: u64,
    /// Interval within which a received I-frame must be acknowledged, seconds.
    pub t2: u64,
    /// Idle keep-alive interval, seconds.
    pub t3: u64,
}

impl Default for APCIParameters {
    fn default() -> Self {
        APCIParameters {
            k: 12,
            w: 8,
            t0: 10,
            t1: 15,
            t2: 10,
            t3: 20,
        }
    }
}

impl APCIParameters {
    /// `t2 < t1` and `w <= 2k/3` are the conventional bounds; violating them isn't a
    /// wire-protocol error but is almost certainly a misconfiguration.
    pub fn is_sane(&self) -> bool {
        self.t2 < self.t1 && (self.w as u32) * 3 <= (self.k as u32) * 2
    }
}

/// Application-layer tunables: sizes independent of the ASDU content itself. Kept
/// separate from `APCIParameters` since the two vary independently — a deployment can
/// retune queue depths without touching the wire-protocol timers, and vice versa.
#[derive(Debug, Clone, Copy)]
pub struct AppLayerParameters {
    pub common_addr_size: u8,
    pub info_obj_addr_size: u8,
    pub cot_size: u8,
}

impl Default for AppLayerParameters {
    fn default() -> Self {
        AppLayerParameters {
            common_addr_size: 2,
            info_obj_addr_size: 3,
            cot_size: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        assert!(APCIParameters::default().is_sane());
    }

    #[test]
    fn violating_w_bound_is_detected() {
        let p = APCIParameters {
            w: 100,
            ..Default::default()
        };
        assert!(!p.is_sane());
    }
}
