use std::collections::VecDeque;
use std::sync::Mutex;

use crate::frame::asdu::Asdu;

/// Opaque handle correlating a k-buffer slot to a [`MessageQueue`] entry: a monotonic
/// `id` plus the `timestamp` the entry carried when it was captured, so a confirmation
/// arriving after the entry has already been evicted and its slot reused is rejected
/// rather than confirming the wrong payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntryPtr {
    pub id: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Waiting,
    SentUnconfirmed,
    Free,
}

struct Entry {
    id: u64,
    timestamp: u64,
    state: EntryState,
    asdu: Asdu,
}

/// Persistent low-priority ASDU ring. Modelled as a fixed-entry-count ring of owned
/// entries rather than a packed byte buffer, since the exact memory layout is an
/// implementation detail, not a contractual one. Never rejects an `enqueue`; the
/// oldest entries are evicted to make room.
pub struct MessageQueue {
    capacity: usize,
    entries: Mutex<VecDeque<Entry>>,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        MessageQueue {
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

    /// Enqueue an ASDU, evicting from the oldest end until it fits. Never fails.
    pub fn enqueue(&self, asdu: Asdu, now_ms: u64) {
        let mut entries = self.entries.lock().unwrap();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        // id assignment races across concurrent enqueuers if taken outside the lock;
        // derive it from the deque's current tail instead.
        let id = Self::next_id(&mut entries);
        entries.push_back(Entry {
            id,
            timestamp: now_ms,
            state: EntryState::Waiting,
            asdu,
        });
    }

    fn next_id(entries: &mut VecDeque<Entry>) -> u64 {
        entries.back().map(|e| e.id + 1).unwrap_or(0)
    }

    /// Find the oldest `Waiting` entry, flip it to `SentUnconfirmed`, and return a
    /// handle plus its payload.
    pub fn next_waiting(&self) -> Option<(QueueEntryPtr, Asdu)> {
        let mut entries = self.entries.lock().unwrap();
        for entry in entries.iter_mut() {
            if entry.state == EntryState::Waiting {
                entry.state = EntryState::SentUnconfirmed;
                return Some((
                    QueueEntryPtr {
                        id: entry.id,
                        timestamp: entry.timestamp,
                    },
                    entry.asdu.clone(),
                ));
            }
        }
        None
    }

    /// Mark an in-flight entry confirmed. Rejected silently if the entry's timestamp
    /// no longer matches (it was evicted and the slot holds something else, or was
    /// never found) — a stale handle must never confirm the wrong payload.
    pub fn mark_confirmed(&self, ptr: QueueEntryPtr) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.id == ptr.id && e.timestamp == ptr.timestamp)
        {
            entry.state = EntryState::Free;
        }
    }

    /// Flip every `SentUnconfirmed` entry back to `Waiting`. Called when the
    /// connection that held them is torn down, so the next activating peer
    /// retransmits them in original order.
    pub fn revert_unconfirmed_to_waiting(&self) {
        let mut entries = self.entries.lock().unwrap();
        for entry in entries.iter_mut() {
            if entry.state == EntryState::SentUnconfirmed {
                entry.state = EntryState::Waiting;
            }
        }
    }

    pub fn release_all(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::asdu::{Cause, CauseOfTransmission, Identifier, TypeID, VariableStruct};
    use bit_struct::*;
    use bytes::Bytes;

    fn test_asdu(tag: u8) -> Asdu {
        Asdu {
            identifier: Identifier {
                type_id: TypeID::M_SP_NA_1,
                vsq: VariableStruct::new(u1::new(0).unwrap(), u7::new(1).unwrap()),
                cot: CauseOfTransmission::new(false, true, Cause::Spontaneous),
                common_addr: 1,
            },
            raw: Bytes::from(vec![tag]),
        }
    }

    #[test]
    fn enqueue_never_rejects_and_evicts_oldest() {
        let q = MessageQueue::new(16);
        for i in 0..20u8 {
            q.enqueue(test_asdu(i), i as u64);
        }
        assert_eq!(q.len(), 16);
        let (_, first) = q.next_waiting().unwrap();
        assert_eq!(first.raw, Bytes::from(vec![4]));
    }

    #[test]
    fn confirm_then_revert_round_trip() {
        let q = MessageQueue::new(4);
        q.enqueue(test_asdu(1), 100);
        q.enqueue(test_asdu(2), 200);

        let (ptr1, _) = q.next_waiting().unwrap();
        let (ptr2, _) = q.next_waiting().unwrap();
        assert!(q.next_waiting().is_none());

        q.mark_confirmed(ptr1);
        q.revert_unconfirmed_to_waiting();

        // ptr2's entry reverted to Waiting, ptr1's stays Free.
        let (ptr2_again, asdu) = q.next_waiting().unwrap();
        assert_eq!(ptr2_again, ptr2);
        assert_eq!(asdu.raw, Bytes::from(vec![2]));
    }

    #[test]
    fn stale_confirmation_is_ignored() {
        let q = MessageQueue::new(2);
        q.enqueue(test_asdu(1), 10);
        let (ptr, _) = q.next_waiting().unwrap();
        q.enqueue(test_asdu(2), 20);
        q.enqueue(test_asdu(3), 30); // evicts entry 1's slot

        q.mark_confirmed(ptr);
        // entry 1 is gone; confirming it must not touch entry 2 or 3.
        let (_, asdu) = q.next_waiting().unwrap();
        assert_eq!(asdu.raw, Bytes::from(vec![2]));
    }
}
