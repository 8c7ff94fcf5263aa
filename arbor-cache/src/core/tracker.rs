use std::collections::{HashMap, VecDeque};

use tracing::debug;

use super::types::Depth;

/// Bounded visit history: target identifier → depth of the last visit.
///
/// Purely observational. Cache lookups never consult this map; it exists
/// so scan orchestration can see how deep a node was last walked.
#[derive(Debug)]
pub struct VisitTracker {
    visits: HashMap<String, Depth>,
    order: VecDeque<String>,
    max_tracked: usize,
    /// LRU bookkeeping runs only while OOM protection is on.
    ordered: bool,
}

impl VisitTracker {
    pub fn new(max_tracked: usize, ordered: bool) -> Self {
        Self {
            visits: HashMap::new(),
            order: VecDeque::new(),
            max_tracked,
            ordered,
        }
    }

    /// Record a visit of `target`, dropping the stalest record when the
    /// cap is exceeded (an arbitrary one in unordered mode).
    pub fn record(&mut self, target: &str, depth: Depth) {
        if self.max_tracked == 0 {
            return;
        }

        let known = self.visits.insert(target.to_string(), depth).is_some();
        if self.ordered {
            if known {
                self.order.retain(|tracked| tracked != target);
            }
            self.order.push_back(target.to_string());
        }

        while self.visits.len() > self.max_tracked {
            let victim = if self.ordered {
                self.order.pop_front()
            } else {
                self.visits.keys().next().cloned()
            };
            match victim {
                Some(target) => {
                    self.visits.remove(&target);
                    debug!("Visit tracker dropped: {}", target);
                }
                None => break,
            }
        }
    }

    /// Depth recorded by the most recent visit of `target`.
    pub fn last_depth(&self, target: &str) -> Option<Depth> {
        self.visits.get(target).copied()
    }

    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    pub fn clear(&mut self) {
        self.visits.clear();
        self.order.clear();
    }
}
