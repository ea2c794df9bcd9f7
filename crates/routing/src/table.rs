//! Routing table: rules, registry, and copy-on-write updates

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use regex::Regex;
use shunt_backend::Backend;
use shunt_config::{NodeSpec, RulesDocument};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, RoutingError};

/// One routing rule: a compiled pattern and its backends
///
/// The pattern string is the rule's stable key; the backend list is
/// ordered and free of duplicate identities.
#[derive(Clone)]
pub struct Rule {
    pattern: String,
    matcher: Regex,
    backends: Vec<Arc<Backend>>,
}

impl Rule {
    /// The rule's pattern as configured
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether this rule accepts the given metric name
    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }

    /// Backends receiving metrics accepted by this rule
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("pattern", &self.pattern)
            .field("backend_count", &self.backends.len())
            .finish()
    }
}

/// Immutable view of the table for the dispatch path
///
/// Snapshots are cheap to take and hold; an update replaces the current
/// snapshot without disturbing readers of older ones.
#[derive(Default, Clone)]
pub struct TableSnapshot {
    rules: Vec<Rule>,
    registry: HashMap<NodeSpec, Arc<Backend>>,
}

impl TableSnapshot {
    /// Rules in insertion order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Every registered backend
    pub fn backends(&self) -> impl Iterator<Item = &Arc<Backend>> {
        self.registry.values()
    }

    /// Number of rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Number of distinct backends
    pub fn backend_count(&self) -> usize {
        self.registry.len()
    }

    fn has_rule(&self, pattern: &str) -> bool {
        self.rules.iter().any(|rule| rule.pattern == pattern)
    }
}

impl std::fmt::Debug for TableSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSnapshot")
            .field("rule_count", &self.rule_count())
            .field("backend_count", &self.backend_count())
            .finish()
    }
}

/// The live routing table
pub struct RoutingTable {
    current: ArcSwap<TableSnapshot>,
    update_lock: Mutex<()>,
    probe_interval: Duration,
    shutdown: CancellationToken,
}

impl RoutingTable {
    /// Create an empty table
    ///
    /// Backends constructed by later updates probe on `probe_interval`
    /// and observe `shutdown` through child tokens.
    pub fn new(probe_interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            current: ArcSwap::from_pointee(TableSnapshot::default()),
            update_lock: Mutex::new(()),
            probe_interval,
            shutdown,
        }
    }

    /// Take a read snapshot of the current rules and registry
    #[inline]
    pub fn snapshot(&self) -> Arc<TableSnapshot> {
        self.current.load_full()
    }

    /// Apply a desired configuration, extending the table
    ///
    /// Updates are serialized among themselves. All unknown patterns are
    /// compiled before anything is mutated, so a compile failure leaves
    /// the table untouched. Backend construction happens while the new
    /// snapshot is being built; a construction failure publishes the
    /// additions committed so far and aborts.
    ///
    /// Applying the same document twice is a no-op the second time.
    pub async fn update(&self, desired: &RulesDocument) -> Result<()> {
        let _guard = self.update_lock.lock().await;
        let mut working = (*self.current.load_full()).clone();

        // Compile every unknown pattern up front; nothing is published yet
        for pattern in desired.rules.keys() {
            if !working.has_rule(pattern) {
                let matcher =
                    Regex::new(pattern).map_err(|e| RoutingError::RuleCompile {
                        pattern: pattern.clone(),
                        source: e,
                    })?;
                working.rules.push(Rule {
                    pattern: pattern.clone(),
                    matcher,
                    backends: Vec::new(),
                });
                debug!(pattern = %pattern, "added routing rule");
            }
        }

        for (pattern, nodes) in &desired.rules {
            for node in nodes {
                let backend = match working.registry.get(node) {
                    Some(existing) => Arc::clone(existing),
                    None => {
                        match Backend::connect(
                            node.clone(),
                            self.probe_interval,
                            &self.shutdown,
                        )
                        .await
                        {
                            Ok(created) => {
                                let created = Arc::new(created);
                                working
                                    .registry
                                    .insert(node.clone(), Arc::clone(&created));
                                info!(backend = %node, "created backend");
                                created
                            }
                            Err(e) => {
                                // Keep the additions made so far visible,
                                // matching the partial-update contract
                                self.current.store(Arc::new(working));
                                return Err(RoutingError::BackendOpen {
                                    node: node.clone(),
                                    source: e,
                                });
                            }
                        }
                    }
                };

                if let Some(rule) =
                    working.rules.iter_mut().find(|rule| rule.pattern == *pattern)
                    && !rule.backends.iter().any(|b| b.node() == node)
                {
                    debug!(backend = %node, pattern = %pattern, "added backend to rule");
                    rule.backends.push(backend);
                }
            }
        }

        self.current.store(Arc::new(working));
        Ok(())
    }

    /// Shut down every registered backend concurrently and join them
    pub async fn shutdown(&self) {
        let snapshot = self.snapshot();
        let mut shutdowns = Vec::with_capacity(snapshot.backend_count());
        for backend in snapshot.backends() {
            let backend = Arc::clone(backend);
            shutdowns.push(tokio::spawn(async move { backend.shutdown().await }));
        }
        for task in shutdowns {
            let _ = task.await;
        }
    }
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("RoutingTable")
            .field("rule_count", &snapshot.rule_count())
            .field("backend_count", &snapshot.backend_count())
            .finish()
    }
}
