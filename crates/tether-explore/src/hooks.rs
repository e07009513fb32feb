use std::sync::Arc;

use tether_ir::{Case, Response};

use crate::trace::ScenarioId;

/// User extension points around a scenario and each call. Every method has
/// a no-op default.
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    fn setup(&self, _scenario: ScenarioId) {}

    /// May replace the case that is about to be sent.
    fn before_call(&self, case: Case) -> Case {
        case
    }

    fn after_call(&self, _case: &Case, _response: &Response) {}

    fn teardown(&self, _scenario: ScenarioId) {}
}

/// Hooks in three ordered layers: global, schema, scenario.
#[derive(Clone, Default)]
pub struct HookLayers {
    global: Vec<Arc<dyn Hook>>,
    schema: Vec<Arc<dyn Hook>>,
    scenario: Vec<Arc<dyn Hook>>,
}

impl HookLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(mut self, hook: Arc<dyn Hook>) -> Self {
        self.global.push(hook);
        self
    }

    pub fn with_schema(mut self, hook: Arc<dyn Hook>) -> Self {
        self.schema.push(hook);
        self
    }

    pub fn with_scenario(mut self, hook: Arc<dyn Hook>) -> Self {
        self.scenario.push(hook);
        self
    }

    /// All hooks in application order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Hook>> {
        self.global
            .iter()
            .chain(self.schema.iter())
            .chain(self.scenario.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.schema.is_empty() && self.scenario.is_empty()
    }

    pub fn setup(&self, scenario: ScenarioId) {
        self.iter().for_each(|h| h.setup(scenario));
    }

    pub fn before_call(&self, case: Case) -> Case {
        self.iter().fold(case, |case, h| h.before_call(case))
    }

    pub fn after_call(&self, case: &Case, response: &Response) {
        self.iter().for_each(|h| h.after_call(case, response));
    }

    pub fn teardown(&self, scenario: ScenarioId) {
        self.iter().for_each(|h| h.teardown(scenario));
    }
}

impl std::fmt::Debug for HookLayers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |layer: &[Arc<dyn Hook>]| -> Vec<String> {
            layer.iter().map(|h| h.name().to_string()).collect()
        };
        f.debug_struct("HookLayers")
            .field("global", &names(&self.global))
            .field("schema", &names(&self.schema))
            .field("scenario", &names(&self.scenario))
            .finish()
    }
}
