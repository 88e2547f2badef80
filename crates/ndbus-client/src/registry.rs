//! Signal subscriptions.
//!
//! The registry maps match rules to the messages listening on them. Rules
//! are indexed by (bus, interface, member); path, sender and destination
//! narrow the match when a rule sets them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use ndbus_core::Bus;
use serde::Serialize;
use tracing::trace;

use crate::transport::SignalHeader;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one message entity inside the core loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A signal subscription filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MatchRule {
    pub bus: Bus,
    pub iface: String,
    pub member: String,
    /// `None` listens on every object path.
    pub path: Option<String>,
    pub sender: Option<String>,
    pub destination: Option<String>,
}

impl MatchRule {
    pub fn new(bus: Bus, iface: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            bus,
            iface: iface.into(),
            member: member.into(),
            path: None,
            sender: None,
            destination: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// The rule in bus `AddMatch` syntax.
    pub fn match_string(&self) -> String {
        let mut rule = format!(
            "type='signal',interface='{}',member='{}'",
            self.iface, self.member
        );
        for (key, value) in [
            ("path", &self.path),
            ("sender", &self.sender),
            ("destination", &self.destination),
        ] {
            if let Some(value) = value {
                rule.push_str(&format!(",{key}='{value}'"));
            }
        }
        rule
    }

    /// Returns true if a signal with `header` on `bus` passes this rule.
    pub fn matches(&self, bus: Bus, header: &SignalHeader) -> bool {
        self.bus == bus
            && self.iface == header.iface
            && self.member == header.member
            && self.path.as_ref().is_none_or(|p| *p == header.path)
            && self.sender.as_ref().is_none_or(|s| header.sender.as_ref() == Some(s))
            && self
                .destination
                .as_ref()
                .is_none_or(|d| header.destination.as_ref() == Some(d))
    }

    fn key(&self) -> RuleKey {
        (self.bus, self.iface.clone(), self.member.clone())
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.match_string())
    }
}

type RuleKey = (Bus, String, String);

#[derive(Debug)]
struct Subscription {
    rule: MatchRule,
    listeners: Vec<ListenerId>,
}

/// Match rules and their listeners.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    index: BTreeMap<RuleKey, Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `listener` to `rule`. Returns true when this is the rule's first
    /// listener, i.e. the bus-level subscription must be made.
    ///
    /// Registering the same listener twice is a no-op.
    pub fn register(&mut self, rule: MatchRule, listener: ListenerId) -> bool {
        let subscriptions = self.index.entry(rule.key()).or_default();
        if let Some(sub) = subscriptions.iter_mut().find(|s| s.rule == rule) {
            if !sub.listeners.contains(&listener) {
                sub.listeners.push(listener);
            }
            return false;
        }

        trace!(rule = %rule, %listener, "New match rule");
        subscriptions.push(Subscription {
            rule,
            listeners: vec![listener],
        });
        true
    }

    /// Removes `listener` from `rule`. Returns `None` if it was not
    /// registered, otherwise whether the rule is now unused.
    pub fn unregister(&mut self, rule: &MatchRule, listener: ListenerId) -> Option<bool> {
        let key = rule.key();
        let subscriptions = self.index.get_mut(&key)?;
        let pos = subscriptions.iter().position(|s| &s.rule == rule)?;
        let sub = &mut subscriptions[pos];
        let idx = sub.listeners.iter().position(|l| *l == listener)?;
        sub.listeners.remove(idx);

        if !sub.listeners.is_empty() {
            return Some(false);
        }
        subscriptions.remove(pos);
        if subscriptions.is_empty() {
            self.index.remove(&key);
        }
        Some(true)
    }

    /// Every listener whose rules match the signal, each listed once, in
    /// registration order of their rules.
    pub fn listeners_for(&self, bus: Bus, header: &SignalHeader) -> Vec<ListenerId> {
        let key = (bus, header.iface.clone(), header.member.clone());
        let mut listeners = Vec::new();
        for sub in self.index.get(&key).into_iter().flatten() {
            if !sub.rule.matches(bus, header) {
                continue;
            }
            for listener in &sub.listeners {
                if !listeners.contains(listener) {
                    listeners.push(*listener);
                }
            }
        }
        listeners
    }

    /// Drops `listener` from every rule. Returns the rules left unused.
    pub fn remove_listener(&mut self, listener: ListenerId) -> Vec<MatchRule> {
        let mut emptied = Vec::new();
        for subscriptions in self.index.values_mut() {
            subscriptions.retain_mut(|sub| {
                sub.listeners.retain(|l| *l != listener);
                if sub.listeners.is_empty() {
                    emptied.push(sub.rule.clone());
                    false
                } else {
                    true
                }
            });
        }
        self.index.retain(|_, subs| !subs.is_empty());
        emptied
    }

    /// Drops every rule of `bus`. Returns the removed rules.
    pub fn remove_bus(&mut self, bus: Bus) -> Vec<MatchRule> {
        let keys: Vec<_> = self.index.keys().filter(|k| k.0 == bus).cloned().collect();
        keys.into_iter()
            .filter_map(|key| self.index.remove(&key))
            .flatten()
            .map(|sub| sub.rule)
            .collect()
    }

    pub fn contains(&self, rule: &MatchRule) -> bool {
        self.listener_count(rule) > 0
    }

    /// Number of listeners registered on exactly `rule`.
    pub fn listener_count(&self, rule: &MatchRule) -> usize {
        self.index
            .get(&rule.key())
            .and_then(|subs| subs.iter().find(|s| &s.rule == rule))
            .map_or(0, |sub| sub.listeners.len())
    }

    /// Number of distinct rules.
    pub fn len(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &MatchRule> {
        self.index.values().flatten().map(|sub| &sub.rule)
    }
}
