//! ECU liveness tracking
//!
//! A role counts as connected while its last EXU frame is younger than the
//! timeout. Only transitions are reported, so a silent ECU is logged once
//! rather than every tick.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use testbed_core::EcuRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy)]
struct RoleStatus {
    last_seen: Option<Instant>,
    link: Link,
}

#[derive(Debug, Clone)]
pub struct Liveness {
    timeout: Duration,
    roles: BTreeMap<EcuRole, RoleStatus>,
}

impl Liveness {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            roles: BTreeMap::new(),
        }
    }

    /// Start tracking `role`; it is disconnected until its first frame
    pub fn watch(&mut self, role: EcuRole) {
        self.roles.entry(role).or_insert(RoleStatus {
            last_seen: None,
            link: Link::Disconnected,
        });
    }

    /// Record a frame; returns `true` if this reconnected the role
    pub fn seen(&mut self, role: EcuRole, at: Instant) -> bool {
        let status = self.roles.entry(role).or_insert(RoleStatus {
            last_seen: None,
            link: Link::Disconnected,
        });
        if status.last_seen.map_or(true, |prev| at > prev) {
            status.last_seen = Some(at);
        }
        let changed = status.link == Link::Disconnected;
        status.link = Link::Connected;
        changed
    }

    /// Mark roles silent for longer than the timeout; returns those that
    /// just dropped
    pub fn expire(&mut self, now: Instant) -> Vec<EcuRole> {
        let mut dropped = Vec::new();
        for (role, status) in self.roles.iter_mut() {
            let Some(last) = status.last_seen else {
                continue;
            };
            if status.link == Link::Connected && now.saturating_duration_since(last) > self.timeout {
                status.link = Link::Disconnected;
                dropped.push(*role);
            }
        }
        dropped
    }

    pub fn link(&self, role: EcuRole) -> Option<Link> {
        self.roles.get(&role).map(|s| s.link)
    }

    pub fn is_connected(&self, role: EcuRole) -> bool {
        self.link(role) == Some(Link::Connected)
    }
}
