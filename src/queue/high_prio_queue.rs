use std::collections::VecDeque;
use std::sync::Mutex;

use crate::frame::asdu::Asdu;

/// Transient high-priority ring: command-response ASDUs (ACT_CON, ACT_TERM,
/// test-frame echoes, clock-sync confirms) that bypass the bulk event queue but carry
/// no confirmation tracking — if they can't be delivered they are simply dropped.
pub struct HighPrioQueue {
    capacity: usize,
    entries: Mutex<VecDeque<Asdu>>,
}

impl HighPrioQueue {
    pub fn new(capacity: usize) -> Self {
        HighPrioQueue {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `false` (entry dropped) when the queue is already at capacity.
    pub fn enqueue(&self, asdu: Asdu) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            return false;
        }
        entries.push_back(asdu);
        true
    }

    pub fn next(&self) -> Option<Asdu> {
        self.entries.lock().unwrap().pop_front()
    }

    pub fn reset(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::asdu::{Cause, CauseOfTransmission, Identifier, TypeID, VariableStruct};
    use bit_struct::*;
    use bytes::Bytes;

    fn test_asdu() -> Asdu {
        Asdu {
            identifier: Identifier {
                type_id: TypeID::C_IC_NA_1,
                vsq: VariableStruct::new(u1::new(0).unwrap(), u7::new(1).unwrap()),
                cot: CauseOfTransmission::new(false, true, Cause::ActivationCon),
                common_addr: 1,
            },
            raw: Bytes::new(),
        }
    }

    #[test]
    fn enqueue_fails_when_full() {
        let q = HighPrioQueue::new(2);
        assert!(q.enqueue(test_asdu()));
        assert!(q.enqueue(test_asdu()));
        assert!(!q.enqueue(test_asdu()));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn fifo_order() {
        let q = HighPrioQueue::new(4);
        q.enqueue(test_asdu());
        assert!(q.next().is_some());
        assert!(q.next().is_none());
    }
}
