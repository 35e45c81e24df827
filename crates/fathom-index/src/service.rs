//! Query facade over the store, resolver and traverser.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{debug, info};

use crate::graph::{
    Direction, EdgeKind, GraphError, Occurrence, ProjectGraph, ProjectId, Symbol,
};
use crate::resolver::{DescriptorResolver, ResolverConfig};
use crate::store::SymbolGraphStore;
use crate::traverser::{GraphTraverser, TraversalConfig, TraversalTree};

/// Structural search over every indexed project.
///
/// Cheap to clone; clones share the same store.
#[derive(Debug, Clone)]
pub struct StructuralSearch {
    store: Arc<SymbolGraphStore>,
    resolver: DescriptorResolver,
    traverser: GraphTraverser,
}

impl StructuralSearch {
    pub fn new(store: SymbolGraphStore) -> Self {
        Self {
            store: Arc::new(store),
            resolver: DescriptorResolver::new(),
            traverser: GraphTraverser::new(),
        }
    }

    pub fn with_resolver_config(mut self, config: ResolverConfig) -> Self {
        self.resolver = DescriptorResolver::with_config(config);
        self
    }

    pub fn with_traversal_config(mut self, config: TraversalConfig) -> Self {
        self.traverser = GraphTraverser::with_config(config);
        self
    }

    pub fn store(&self) -> &SymbolGraphStore {
        &self.store
    }

    pub fn traversal_config(&self) -> &TraversalConfig {
        self.traverser.config()
    }

    /// Ranked symbols for a dotted name or descriptor suffix.
    pub fn resolve_symbol(&self, project: &str, query: &str) -> Result<Vec<Symbol>, GraphError> {
        let graph = self.store.graph(project)?;
        Ok(self.resolver.resolve(&graph, query))
    }

    /// A symbol by exact id, else the best-ranked match for `query`.
    pub fn find_symbol(&self, project: &str, query: &str) -> Result<Option<Symbol>, GraphError> {
        let graph = self.store.graph(project)?;
        if let Some(symbol) = graph.symbol(query) {
            return Ok(Some(symbol.clone()));
        }
        Ok(self.resolver.resolve(&graph, query).into_iter().next())
    }

    pub fn find_occurrences(&self, project: &str, symbol: &str) -> Result<Vec<Occurrence>, GraphError> {
        self.store.occurrences(project, symbol)
    }

    pub fn traverse_graph(
        &self,
        project: &str,
        start: &str,
        edge_kind: EdgeKind,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Option<TraversalTree>, GraphError> {
        let graph = self.store.graph(project)?;
        self.traverser
            .traverse(&graph, start, edge_kind, direction, max_depth)
    }

    /// Read a SCIP index from disk and ingest it on the blocking pool.
    pub async fn ingest_file(
        &self,
        project: &str,
        path: impl AsRef<Path>,
    ) -> Result<Arc<ProjectGraph>, GraphError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read SCIP index: {:?}", path))?;
        debug!("Read {} bytes from {:?}", bytes.len(), path);

        let store = Arc::clone(&self.store);
        let project_id = project.to_string();
        let graph = tokio::task::spawn_blocking(move || store.ingest_bytes(&project_id, &bytes))
            .await
            .map_err(|e| anyhow!("Ingest task for {} failed: {}", project, e))??;

        info!(
            project,
            "Ingested {:?}: {} documents, {} symbols",
            path,
            graph.report().documents,
            graph.symbol_count()
        );
        Ok(graph)
    }

    pub fn ingest_bytes(&self, project: &str, bytes: &[u8]) -> Result<Arc<ProjectGraph>, GraphError> {
        self.store.ingest_bytes(project, bytes)
    }

    pub fn remove_project(&self, project: &str) -> Result<bool, GraphError> {
        self.store.remove(project)
    }

    pub fn projects(&self) -> Vec<ProjectId> {
        self.store.projects()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scip::encode::{DocumentBuilder, IndexWriter, OccurrenceBuilder};
    use tempfile::TempDir;

    const MAIN: &str = "semanticdb maven . . com/example/Main#main().";
    const GREET: &str = "semanticdb maven . . com/example/Main#greet().";

    fn index() -> Vec<u8> {
        IndexWriter::new()
            .document(
                DocumentBuilder::new("Main.java")
                    .occurrence(OccurrenceBuilder::definition(MAIN, [2, 23, 27]).enclosing([2, 4, 5, 5]))
                    .occurrence(OccurrenceBuilder::reference(GREET, [3, 8, 13]))
                    .occurrence(OccurrenceBuilder::definition(GREET, [7, 18, 23]).enclosing([7, 4, 9, 5])),
            )
            .finish()
    }

    #[test]
    fn test_queries_through_facade() {
        let search = StructuralSearch::new(SymbolGraphStore::new());
        search.ingest_bytes("sample", &index()).unwrap();

        let found = search.resolve_symbol("sample", "Main.greet").unwrap();
        assert_eq!(found[0].id, GREET);
        assert_eq!(search.find_symbol("sample", MAIN).unwrap().unwrap().id, MAIN);
        assert_eq!(search.find_occurrences("sample", GREET).unwrap().len(), 2);

        let callers = search
            .traverse_graph("sample", GREET, EdgeKind::Call, Direction::Incoming, 3)
            .unwrap()
            .unwrap();
        assert_eq!(callers.reached(), vec![MAIN]);
        assert_eq!(search.projects(), vec!["sample".to_string()]);
        assert!(matches!(
            search.resolve_symbol("other", "greet"),
            Err(GraphError::ProjectNotIndexed(_))
        ));
    }

    #[test]
    fn test_find_symbol_picks_named_overload() {
        let foo = "semanticdb maven . . p/Util#foo().";
        let foo_1 = "semanticdb maven . . p/Util#foo(+1).";
        let bytes = IndexWriter::new()
            .document(
                DocumentBuilder::new("Util.java")
                    .occurrence(OccurrenceBuilder::definition(foo, [2, 9, 12]))
                    .occurrence(OccurrenceBuilder::definition(foo_1, [6, 9, 12])),
            )
            .finish();
        let search = StructuralSearch::new(SymbolGraphStore::new());
        search.ingest_bytes("sample", &bytes).unwrap();

        assert_eq!(search.find_symbol("sample", "Util#foo(+1).").unwrap().unwrap().id, foo_1);
        assert_eq!(search.find_symbol("sample", "Util.foo(+1).").unwrap().unwrap().id, foo_1);
        assert_eq!(search.find_symbol("sample", "Util#foo().").unwrap().unwrap().id, foo);
        let ids: Vec<String> = search
            .resolve_symbol("sample", "Util#foo(+1).")
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![foo_1.to_string()]);
    }

    #[test]
    fn test_ingest_file_on_blocking_pool() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.scip");
        std::fs::write(&path, index()).unwrap();

        let search = StructuralSearch::new(SymbolGraphStore::new());
        let graph = tokio_test::block_on(search.ingest_file("sample", &path)).unwrap();
        assert_eq!(graph.symbol_count(), 2);
        assert!(graph.source_digest().is_some());
    }

    #[tokio::test]
    async fn test_ingest_missing_file() {
        let search = StructuralSearch::new(SymbolGraphStore::new());
        let err = search
            .ingest_file("sample", "/nonexistent/index.scip")
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Storage(_)));
        assert!(search.projects().is_empty());
    }
}
