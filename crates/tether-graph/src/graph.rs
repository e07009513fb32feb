use std::collections::HashMap;
use std::sync::Arc;

use tether_ir::{Operation, OperationId};

use crate::link::Link;

/// Operations and the links between them. Immutable once built; share it
/// behind an `Arc`.
#[derive(Debug, Clone)]
pub struct LinkGraph {
    operations: Vec<Operation>,
    index: HashMap<OperationId, usize>,
    links: Vec<Arc<Link>>,
    outgoing: HashMap<OperationId, Vec<usize>>,
}

impl LinkGraph {
    pub(crate) fn new(operations: Vec<Operation>, links: Vec<Link>) -> Self {
        let index = operations
            .iter()
            .enumerate()
            .map(|(i, op)| (op.id.clone(), i))
            .collect();
        let mut outgoing: HashMap<OperationId, Vec<usize>> = HashMap::new();
        for (i, link) in links.iter().enumerate() {
            outgoing.entry(link.source.clone()).or_default().push(i);
        }
        Self {
            operations,
            index,
            links: links.into_iter().map(Arc::new).collect(),
            outgoing,
        }
    }

    /// Links leaving `operation` whose status pattern matches `status`.
    pub fn links_from(&self, operation: &OperationId, status: u16) -> Vec<&Arc<Link>> {
        self.outgoing_links(operation)
            .filter(|link| link.status.matches(status))
            .collect()
    }

    /// Every link leaving `operation`, regardless of status.
    pub fn outgoing_links<'a>(
        &'a self,
        operation: &OperationId,
    ) -> impl Iterator<Item = &'a Arc<Link>> + 'a {
        self.outgoing
            .get(operation)
            .into_iter()
            .flatten()
            .map(|&i| &self.links[i])
    }

    pub fn all_operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operation(&self, id: &OperationId) -> Option<&Operation> {
        self.index.get(id).map(|&i| &self.operations[i])
    }

    pub fn links(&self) -> &[Arc<Link>] {
        &self.links
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
