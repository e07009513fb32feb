use rand::RngCore;
use tether_ir::{Case, GenerationMode, Operation};

/// Source of cases for a single operation.
///
/// Abstracted behind a trait so the engine never depends on a particular
/// data-generation strategy. Implementations must be deterministic for a
/// given RNG state.
pub trait Generator: Send + Sync {
    fn generate(&self, operation: &Operation, mode: GenerationMode, rng: &mut dyn RngCore) -> Case;
}

/// Generates empty cases: no parameters, no body. Useful when every value
/// comes from links.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyGenerator;

impl Generator for EmptyGenerator {
    fn generate(&self, operation: &Operation, mode: GenerationMode, _rng: &mut dyn RngCore) -> Case {
        Case::new(operation).with_mode(mode)
    }
}
