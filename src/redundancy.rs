use std::net::IpAddr;
use std::sync::Arc;

use crate::queue::{HighPrioQueue, MessageQueue};

/// Names a `{MessageQueue, HighPrioQueue}` pair plus an IP allow-list. A
/// group with `allowed_clients = None` is the catch-all matched when no named group's
/// list contains the peer. The queues are `Arc`-wrapped so every connection bound to
/// this group's scope shares the same rings, rather than each connection getting its
/// own copy — the whole point of a redundancy group is the queue pair, not the peer.
pub struct RedundancyGroup {
    pub name: Option<String>,
    pub low_queue: Arc<MessageQueue>,
    pub high_queue: Arc<HighPrioQueue>,
    pub allowed_clients: Option<Vec<IpAddr>>,
}

impl RedundancyGroup {
    pub fn new(
        name: Option<String>,
        low_capacity: usize,
        high_capacity: usize,
        allowed_clients: Option<Vec<IpAddr>>,
    ) -> Self {
        RedundancyGroup {
            name,
            low_queue: Arc::new(MessageQueue::new(low_capacity)),
            high_queue: Arc::new(HighPrioQueue::new(high_capacity)),
            allowed_clients,
        }
    }

    pub fn is_catch_all(&self) -> bool {
        self.allowed_clients.is_none()
    }

    pub fn accepts(&self, peer: &IpAddr) -> bool {
        match &self.allowed_clients {
            None => true,
            Some(allowed) => allowed.contains(peer),
        }
    }
}

/// First-match-then-catch-all peer IP resolution used by `MULTIPLE_REDUNDANCY_GROUPS`.
pub fn select_group<'a>(groups: &'a [RedundancyGroup], peer: &IpAddr) -> Option<&'a RedundancyGroup> {
    groups
        .iter()
        .find(|g| !g.is_catch_all() && g.accepts(peer))
        .or_else(|| groups.iter().find(|g| g.is_catch_all()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins_over_catch_all() {
        let groups = vec![
            RedundancyGroup::new(
                Some("a".into()),
                4,
                4,
                Some(vec!["10.0.0.1".parse().unwrap()]),
            ),
            RedundancyGroup::new(None, 4, 4, None),
        ];
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let found = select_group(&groups, &peer).unwrap();
        assert_eq!(found.name.as_deref(), Some("a"));
    }

    #[test]
    fn falls_back_to_catch_all() {
        let groups = vec![
            RedundancyGroup::new(
                Some("a".into()),
                4,
                4,
                Some(vec!["10.0.0.1".parse().unwrap()]),
            ),
            RedundancyGroup::new(None, 4, 4, None),
        ];
        let peer: IpAddr = "10.0.0.2".parse().unwrap();
        let found = select_group(&groups, &peer).unwrap();
        assert!(found.is_catch_all());
    }

    #[test]
    fn rejects_when_no_match_and_no_catch_all() {
        let groups = vec![RedundancyGroup::new(
            Some("a".into()),
            4,
            4,
            Some(vec!["10.0.0.1".parse().unwrap()]),
        )];
        let peer: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(select_group(&groups, &peer).is_none());
    }
}
