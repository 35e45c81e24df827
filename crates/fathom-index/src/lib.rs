//! Structural code intelligence over SCIP indexes.
//!
//! This crate provides:
//! - A bounds-checked decoder for the SCIP protobuf stream
//! - A per-project symbol graph with call, inheritance and reference edges
//! - Suffix lookup over SCIP descriptors
//! - Resolution of loose names like `Main.greet` to canonical symbols
//! - Depth-bounded traversal of callers, callees and type hierarchies
//! - JSON snapshot persistence

pub mod descriptor;
pub mod graph;
pub mod graph_builder;
pub mod resolver;
pub mod scip;
pub mod service;
pub mod storage;
pub mod store;
pub mod suffix_index;
pub mod traverser;

// Re-exports
pub use descriptor::{Descriptor, DescriptorKind, ParsedSymbol};
pub use graph::{
    DanglingEdge, Direction, Edge, EdgeKind, GraphError, IngestReport, Location, Occurrence,
    OccurrenceRole, ProjectGraph, ProjectId, Symbol, SymbolId, SymbolKind,
};
pub use graph_builder::GraphBuilder;
pub use resolver::{DescriptorResolver, NormalizedQuery, ResolverConfig, DEFAULT_MAX_RESULTS};
pub use scip::{FactRecord, MalformedKind, MalformedStreamError};
pub use service::StructuralSearch;
pub use storage::GraphStorage;
pub use store::SymbolGraphStore;
pub use traverser::{
    Cycle, GraphTraverser, NestedNode, TraversalConfig, TraversalNode, TraversalTree,
    DEFAULT_DEPTH_CEILING,
};
