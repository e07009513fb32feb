//! The link graph: which operations exist and how responses of one feed
//! requests to another.

pub mod builder;
pub mod graph;
pub mod link;

use tether_ir::SchemaDocument;

pub use builder::{GraphError, LinkGraphBuilder};
pub use graph::LinkGraph;
pub use link::{BodyRule, ExtractionFailure, Link, ParameterRule};

/// Build the graph for a schema document, collecting every error.
pub fn build_graph(document: &SchemaDocument) -> Result<LinkGraph, Vec<GraphError>> {
    LinkGraphBuilder::from_document(document).build()
}
