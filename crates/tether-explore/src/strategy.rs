use std::collections::HashMap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tether_ir::OperationId;

/// Per-scenario operation weights.
///
/// Swarm testing: at scenario start a random half of the operations is
/// down-weighted by the swarm factor. Weights never reach zero, so every
/// enabled transition stays reachable.
#[derive(Debug, Clone)]
pub struct WeightTable {
    weights: HashMap<OperationId, f64>,
    default: f64,
}

impl WeightTable {
    pub fn new() -> Self {
        Self {
            weights: HashMap::new(),
            default: 1.0,
        }
    }

    /// Draw a swarm configuration for `operations`.
    pub fn swarm<'a>(
        operations: impl IntoIterator<Item = &'a OperationId>,
        factor: f64,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut table = Self::new();
        if factor >= 1.0 {
            return table;
        }
        for operation in operations {
            if rng.gen_bool(0.5) {
                table.set(operation, factor);
            }
        }
        table
    }

    /// Weight of transitions into `operation`. Defaults to 1.0.
    pub fn get(&self, operation: &OperationId) -> f64 {
        self.weights.get(operation).copied().unwrap_or(self.default)
    }

    pub fn set(&mut self, operation: &OperationId, weight: f64) {
        self.weights.insert(operation.clone(), weight.max(f64::MIN_POSITIVE));
    }

    /// Operations currently weighted below the default.
    pub fn suppressed(&self) -> Vec<&OperationId> {
        let mut out: Vec<&OperationId> = self
            .weights
            .iter()
            .filter(|(_, &w)| w < self.default)
            .map(|(op, _)| op)
            .collect();
        out.sort();
        out
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides which candidate transition the state machine takes.
pub trait Strategy: Send {
    /// Pick an index into `weights`. `None` only when `weights` is empty.
    fn choose(&mut self, weights: &[f64]) -> Option<usize>;

    /// The strategy's RNG, shared with bundle sampling and generation so a
    /// single seed drives the whole scenario.
    fn rng(&mut self) -> &mut ChaCha8Rng;

    /// Name of this strategy (for tracing).
    fn name(&self) -> &str;
}

/// Weighted random choice, seeded for reproducibility.
pub struct PseudoRandomStrategy {
    rng: ChaCha8Rng,
}

impl PseudoRandomStrategy {
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self { rng }
    }
}

impl Strategy for PseudoRandomStrategy {
    fn choose(&mut self, weights: &[f64]) -> Option<usize> {
        if weights.is_empty() {
            return None;
        }
        let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
        if total <= 0.0 {
            return Some(self.rng.gen_range(0..weights.len()));
        }

        let mut roll: f64 = self.rng.gen::<f64>() * total;
        for (i, &weight) in weights.iter().enumerate() {
            roll -= weight.max(0.0);
            if roll <= 0.0 {
                return Some(i);
            }
        }
        // Float rounding can leave a sliver of roll.
        Some(weights.len() - 1)
    }

    fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    fn name(&self) -> &str {
        "pseudo_random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_default_weight() {
        let table = WeightTable::new();
        assert_eq!(table.get(&OperationId::new("a")), 1.0);
    }

    #[test]
    fn test_swarm_never_zero() {
        let ops: Vec<OperationId> = (0..32).map(|i| OperationId::new(format!("op{i}"))).collect();
        let table = WeightTable::swarm(&ops, 0.0, &mut rng());
        assert!(!table.suppressed().is_empty());
        for op in &ops {
            assert!(table.get(op) > 0.0, "{op} must keep a nonzero weight");
        }
    }

    #[test]
    fn test_swarm_disabled_at_factor_one() {
        let ops = vec![OperationId::new("a"), OperationId::new("b")];
        let table = WeightTable::swarm(&ops, 1.0, &mut rng());
        assert!(table.suppressed().is_empty());
    }

    #[test]
    fn test_weighted_choice_prefers_heavy() {
        let mut strategy = PseudoRandomStrategy::new(rng());
        let mut counts = [0u32; 2];
        for _ in 0..1000 {
            counts[strategy.choose(&[1.0, 9.0]).unwrap()] += 1;
        }
        assert!(counts[1] > counts[0] * 3, "counts: {counts:?}");
        assert!(counts[0] > 0, "light candidate must still be chosen");
    }

    #[test]
    fn test_choose_empty() {
        let mut strategy = PseudoRandomStrategy::new(rng());
        assert_eq!(strategy.choose(&[]), None);
        assert_eq!(strategy.name(), "pseudo_random");
    }
}
