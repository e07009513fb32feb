use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use rand::Rng;
use tether_graph::Link;
use tether_ir::{Case, OperationId, Response, StatusPattern};

use crate::trace::ScenarioId;

/// Where an observation was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservationOrigin {
    pub scenario: ScenarioId,
    pub step: usize,
}

/// A recorded `(case, response)` pair. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Observation {
    pub case: Arc<Case>,
    pub response: Arc<Response>,
    pub status_code: u16,
    pub origin: ObservationOrigin,
    /// The link that produced this step's case, if any.
    pub link: Option<Arc<Link>>,
    /// The observation that link extracted from.
    pub parent: Option<Arc<Observation>>,
}

impl Observation {
    pub fn new(case: Case, response: Response, origin: ObservationOrigin) -> Self {
        Self {
            status_code: response.status_code,
            case: Arc::new(case),
            response: Arc::new(response),
            origin,
            link: None,
            parent: None,
        }
    }

    pub fn with_source(mut self, link: Option<Arc<Link>>, parent: Option<Observation>) -> Self {
        self.link = link;
        self.parent = parent.map(Arc::new);
        self
    }

    pub fn operation(&self) -> &OperationId {
        &self.case.operation
    }

    /// This observation and every observation it was derived from, oldest first.
    pub fn lineage(&self) -> Vec<&Observation> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent.as_deref() {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }
}

/// Per-operation observation bundles with FIFO eviction.
#[derive(Debug, Clone)]
pub struct BundleStore {
    capacity: usize,
    bundles: HashMap<OperationId, VecDeque<Observation>>,
    /// Observations recorded since the last `take_new`.
    fresh: Vec<Observation>,
}

impl BundleStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            bundles: HashMap::new(),
            fresh: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&mut self, observation: Observation) {
        self.fresh.push(observation.clone());
        self.insert(observation);
    }

    fn insert(&mut self, observation: Observation) {
        let bundle = self
            .bundles
            .entry(observation.operation().clone())
            .or_default();
        if bundle.len() >= self.capacity {
            bundle.pop_front();
        }
        bundle.push_back(observation);
    }

    /// Uniform pick among everything recorded for `operation`.
    pub fn sample<R: Rng + ?Sized>(&self, operation: &OperationId, rng: &mut R) -> Option<&Observation> {
        let bundle = self.bundles.get(operation)?;
        if bundle.is_empty() {
            return None;
        }
        bundle.get(rng.gen_range(0..bundle.len()))
    }

    /// Uniform pick among observations of `operation` whose status matches.
    pub fn sample_matching<R: Rng + ?Sized>(
        &self,
        operation: &OperationId,
        pattern: &StatusPattern,
        rng: &mut R,
    ) -> Option<&Observation> {
        let matching: Vec<&Observation> = self
            .bundles
            .get(operation)?
            .iter()
            .filter(|o| pattern.matches(o.status_code))
            .collect();
        if matching.is_empty() {
            return None;
        }
        Some(matching[rng.gen_range(0..matching.len())])
    }

    pub fn has_matching(&self, operation: &OperationId, pattern: &StatusPattern) -> bool {
        self.bundles
            .get(operation)
            .is_some_and(|b| b.iter().any(|o| pattern.matches(o.status_code)))
    }

    pub fn len(&self, operation: &OperationId) -> usize {
        self.bundles.get(operation).map_or(0, VecDeque::len)
    }

    pub fn total(&self) -> usize {
        self.bundles.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn reset(&mut self) {
        self.bundles.clear();
        self.fresh.clear();
    }

    /// Drain the observations recorded since the previous call.
    pub fn take_new(&mut self) -> Vec<Observation> {
        std::mem::take(&mut self.fresh)
    }
}

/// Run-scoped store. Each scenario works on a snapshot and hands back its
/// new observations when it ends; the merge is the only point that locks.
#[derive(Debug)]
pub struct SharedBundleStore {
    inner: Mutex<BundleStore>,
}

impl SharedBundleStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BundleStore::new(capacity)),
        }
    }

    /// A private copy for one scenario.
    pub fn snapshot(&self) -> BundleStore {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut view = guard.clone();
        view.fresh.clear();
        view
    }

    pub fn merge(&self, observations: Vec<Observation>) {
        if observations.is_empty() {
            return;
        }
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for observation in observations {
            guard.insert(observation);
        }
    }

    pub fn reset(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }

    pub fn total(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tether_ir::Operation;

    fn observe(op: &Operation, status: u16, step: usize) -> Observation {
        Observation::new(
            Case::new(op),
            Response::new(status),
            ObservationOrigin {
                scenario: ScenarioId(0),
                step,
            },
        )
    }

    #[test]
    fn test_fifo_eviction() {
        let op = Operation::new("createUser", "post", "/users");
        let mut store = BundleStore::new(2);
        store.record(observe(&op, 201, 0));
        store.record(observe(&op, 201, 1));
        store.record(observe(&op, 201, 2));
        assert_eq!(store.len(&op.id), 2);

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..20 {
            let sampled = store.sample(&op.id, &mut rng).unwrap();
            assert_ne!(sampled.origin.step, 0, "oldest observation must be evicted");
        }
    }

    #[test]
    fn test_sample_matching_filters_status() {
        let op = Operation::new("createUser", "post", "/users");
        let mut store = BundleStore::new(10);
        store.record(observe(&op, 400, 0));
        store.record(observe(&op, 201, 1));

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let pattern = StatusPattern::Exact(201);
        for _ in 0..10 {
            assert_eq!(
                store.sample_matching(&op.id, &pattern, &mut rng).unwrap().status_code,
                201
            );
        }
        assert!(store.has_matching(&op.id, &StatusPattern::Class(4)));
        assert!(!store.has_matching(&op.id, &StatusPattern::Class(5)));
        assert!(store
            .sample_matching(&op.id, &StatusPattern::Exact(500), &mut rng)
            .is_none());
    }

    #[test]
    fn test_empty_sample() {
        let store = BundleStore::new(10);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(store.sample(&OperationId::new("x"), &mut rng).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_shared_merge_is_visible_to_next_snapshot() {
        let op = Operation::new("createUser", "post", "/users");
        let shared = SharedBundleStore::new(10);

        let mut first = shared.snapshot();
        first.record(observe(&op, 201, 0));
        shared.merge(first.take_new());

        let second = shared.snapshot();
        assert_eq!(second.len(&op.id), 1);
        assert!(first.take_new().is_empty());

        shared.reset();
        assert_eq!(shared.total(), 0);
    }

    #[test]
    fn test_lineage_is_oldest_first() {
        let create = Operation::new("createUser", "post", "/users");
        let get = Operation::new("getUser", "get", "/users/{id}");
        let root = observe(&create, 201, 0);
        let child = observe(&get, 200, 1).with_source(None, Some(root));
        let lineage = child.lineage();
        assert_eq!(lineage.len(), 2);
        assert_eq!(lineage[0].operation(), &create.id);
        assert_eq!(lineage[1].operation(), &get.id);
    }
}
