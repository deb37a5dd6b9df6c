//! Failure detector
//!
//! Hard timeout only: an entry unrefreshed for `tremove` ticks is evicted
//! on the next pass, with no suspicion phase and no indirect ping. Entries past
//! `tfail` are logged as suspected for visibility and otherwise treated
//! like any other member.

use crate::node::Node;
use member_gossip_core::Tick;
use tracing::{debug, info};

impl Node {
    pub(crate) fn reap(&mut self, now: Tick) {
        let tremove = self.config.tremove;

        for entry in self.table.evict_expired(now, tremove) {
            info!(
                node = %self.identity(),
                member = %entry.identity,
                age = entry.age(now),
                "evicting silent member"
            );
            self.suspected.remove(&entry.identity);
            self.note_removed(entry.identity);
        }

        let suspects = self.table.suspects(now, self.config.tfail, tremove);
        for identity in &suspects {
            if self.suspected.insert(*identity) {
                debug!(node = %self.identity(), member = %identity, "member suspected");
            }
        }
        self.suspected.retain(|identity| suspects.contains(identity));
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::Clock;
    use crate::config::EngineConfig;
    use crate::node::tests::{heartbeat_from, id, Harness};

    fn reaper_node(h: &Harness) -> crate::node::Node {
        let mut config = EngineConfig::new(id(1), id(1));
        config.tfail = 2;
        config.tremove = 5;
        let mut node = h.node_with(config);
        node.bootstrap().unwrap();
        node
    }

    #[test]
    fn test_evicts_at_threshold_not_before() {
        let h = Harness::new();
        let mut node = reaper_node(&h);

        h.deliver(1, heartbeat_from(2, 1, 0, vec![]));
        node.step();
        assert_eq!(node.members(), vec![id(2)]);

        for _ in 0..4 {
            h.clock.advance(1);
            node.step();
            assert_eq!(node.members(), vec![id(2)], "tick {}", h.clock.now());
        }

        h.clock.advance(1);
        node.step();
        assert!(node.members().is_empty());
        assert_eq!(h.events.removed(id(1), id(2)), 1);

        h.clock.advance(1);
        node.step();
        assert_eq!(h.events.removed(id(1), id(2)), 1);
    }

    #[test]
    fn test_refresh_postpones_eviction() {
        let h = Harness::new();
        let mut node = reaper_node(&h);

        h.deliver(1, heartbeat_from(2, 1, 0, vec![]));
        node.step();

        h.clock.advance(4);
        h.deliver(1, heartbeat_from(2, 2, 4, vec![]));
        node.step();

        h.clock.advance(4);
        node.step();
        assert_eq!(node.members(), vec![id(2)]);

        h.clock.advance(1);
        node.step();
        assert!(node.members().is_empty());
    }

    #[test]
    fn test_suspicion_tracks_soft_threshold() {
        let h = Harness::new();
        let mut node = reaper_node(&h);

        h.deliver(1, heartbeat_from(2, 1, 0, vec![]));
        node.step();
        assert!(node.suspects().is_empty());

        h.clock.advance(2);
        node.step();
        assert_eq!(node.suspects(), vec![id(2)]);
        assert!(node.suspected.contains(&id(2)));
        // suspicion alone never evicts or stops gossip
        assert_eq!(node.members(), vec![id(2)]);

        h.deliver(1, heartbeat_from(2, 3, 2, vec![]));
        node.step();
        assert!(node.suspects().is_empty());
        assert!(node.suspected.is_empty());
    }

    #[test]
    fn test_evicted_member_readmitted_on_contact() {
        let h = Harness::new();
        let mut node = reaper_node(&h);

        h.deliver(1, heartbeat_from(2, 1, 0, vec![]));
        node.step();
        h.clock.advance(5);
        node.step();
        assert!(node.members().is_empty());

        h.deliver(1, heartbeat_from(2, 9, 5, vec![]));
        node.step();
        assert_eq!(node.members(), vec![id(2)]);
        assert_eq!(h.events.added(id(1), id(2)), 2);
    }
}
