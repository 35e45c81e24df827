//! In-memory store of project graphs.
//!
//! Every ingest builds a complete [`ProjectGraph`] off to the side and then
//! swaps the project's `Arc` under a short write lock. Readers clone the `Arc`
//! and keep querying the version they got, so they observe either the old or
//! the new graph in full.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::descriptor;
use crate::graph::{
    Direction, Edge, EdgeKind, GraphError, Occurrence, ProjectGraph, ProjectId, Symbol,
};
use crate::graph_builder::GraphBuilder;
use crate::scip::{FactRecord, MalformedStreamError};
use crate::storage::GraphStorage;
use crate::suffix_index::SegmentPattern;

/// Thread-safe collection of per-project graphs.
#[derive(Debug, Default)]
pub struct SymbolGraphStore {
    graphs: RwLock<HashMap<ProjectId, Arc<ProjectGraph>>>,
    ingesting: Mutex<HashSet<ProjectId>>,
    storage: Option<GraphStorage>,
}

/// Marks a project as being ingested until dropped.
pub struct IngestGuard<'a> {
    store: &'a SymbolGraphStore,
    project: ProjectId,
}

impl Drop for IngestGuard<'_> {
    fn drop(&mut self) {
        self.store.ingesting.lock().remove(&self.project);
    }
}

impl SymbolGraphStore {
    /// Store without persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that persists every ingest, starting empty.
    pub fn with_storage(storage: GraphStorage) -> Self {
        Self {
            storage: Some(storage),
            ..Self::default()
        }
    }

    /// Store that persists every ingest, preloaded with all saved snapshots.
    pub fn open(storage: GraphStorage) -> Result<Self, GraphError> {
        let graphs = storage
            .load_all()?
            .into_iter()
            .map(|graph| (graph.project().to_string(), Arc::new(graph)))
            .collect();
        Ok(Self {
            graphs: RwLock::new(graphs),
            ingesting: Mutex::new(HashSet::new()),
            storage: Some(storage),
        })
    }

    /// Snapshot storage, when persistence is enabled.
    pub fn storage(&self) -> Option<&GraphStorage> {
        self.storage.as_ref()
    }

    /// Claim the ingest slot of a project.
    pub fn begin_ingest(&self, project: &str) -> Result<IngestGuard<'_>, GraphError> {
        if !self.ingesting.lock().insert(project.to_string()) {
            return Err(GraphError::IngestInProgress(project.to_string()));
        }
        Ok(IngestGuard {
            store: self,
            project: project.to_string(),
        })
    }

    /// Replace a project's graph with one built from `records`.
    ///
    /// On any error the previous graph stays in place.
    pub fn ingest<I>(&self, project: &str, records: I) -> Result<Arc<ProjectGraph>, GraphError>
    where
        I: IntoIterator<Item = Result<FactRecord, MalformedStreamError>>,
    {
        let _guard = self.begin_ingest(project)?;
        let graph = GraphBuilder::new(project).build(records)?;
        self.install(graph)
    }

    /// Decode and ingest a raw SCIP index.
    pub fn ingest_bytes(&self, project: &str, bytes: &[u8]) -> Result<Arc<ProjectGraph>, GraphError> {
        let _guard = self.begin_ingest(project)?;
        let graph = GraphBuilder::new(project).build_from_bytes(bytes)?;
        self.install(graph)
    }

    /// Persist (when configured) and publish a finished graph.
    fn install(&self, graph: ProjectGraph) -> Result<Arc<ProjectGraph>, GraphError> {
        if let Some(storage) = &self.storage {
            storage.save(&graph)?;
        }
        let graph = Arc::new(graph);
        let previous = self
            .graphs
            .write()
            .insert(graph.project().to_string(), Arc::clone(&graph));
        info!(
            project = graph.project(),
            generation = %graph.generation(),
            replaced = previous.is_some(),
            "Installed graph with {} symbols and {} edges",
            graph.symbol_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Current graph of a project.
    pub fn graph(&self, project: &str) -> Result<Arc<ProjectGraph>, GraphError> {
        self.graphs
            .read()
            .get(project)
            .cloned()
            .ok_or_else(|| GraphError::ProjectNotIndexed(project.to_string()))
    }

    /// Symbol with exactly this SCIP id.
    pub fn lookup_by_exact_id(&self, project: &str, id: &str) -> Result<Option<Symbol>, GraphError> {
        Ok(self.graph(project)?.symbol(id).cloned())
    }

    /// Symbols whose descriptors end with the descriptor suffix `suffix`,
    /// e.g. `Main#greet().`. Sorted by id; text that is not a valid
    /// descriptor suffix matches nothing.
    pub fn lookup_by_suffix(&self, project: &str, suffix: &str) -> Result<Vec<Symbol>, GraphError> {
        let graph = self.graph(project)?;
        let descriptors = match descriptor::parse_descriptors(suffix) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                debug!("Suffix {:?} is not a descriptor suffix: {}", suffix, e);
                return Ok(Vec::new());
            }
        };
        let pattern: Vec<SegmentPattern> = descriptors.iter().map(SegmentPattern::exact).collect();
        Ok(graph
            .symbols_with_suffix(&pattern)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Edges of `kind` touching `id` from the given side, ordered by site.
    pub fn edges_from(
        &self,
        project: &str,
        id: &str,
        kind: EdgeKind,
        direction: Direction,
    ) -> Result<Vec<Edge>, GraphError> {
        Ok(self
            .graph(project)?
            .edges_from(id, kind, direction)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Occurrences of `id` ordered by location, references included.
    pub fn occurrences(&self, project: &str, id: &str) -> Result<Vec<Occurrence>, GraphError> {
        Ok(self.graph(project)?.occurrences(id).to_vec())
    }

    /// Indexed project ids, sorted.
    pub fn projects(&self) -> Vec<ProjectId> {
        let mut projects: Vec<ProjectId> = self.graphs.read().keys().cloned().collect();
        projects.sort();
        projects
    }

    /// Drop a project's graph and its snapshot. Returns whether it existed.
    pub fn remove(&self, project: &str) -> Result<bool, GraphError> {
        let _guard = self.begin_ingest(project)?;
        let persisted = match &self.storage {
            Some(storage) => storage.remove(project)?,
            None => false,
        };
        let removed = self.graphs.write().remove(project).is_some();
        if removed || persisted {
            info!(project, "Removed project graph");
        }
        Ok(removed || persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scip::encode::{DocumentBuilder, IndexWriter, OccurrenceBuilder};
    use crate::scip::{MalformedKind, MalformedStreamError};

    const MAIN: &str = "semanticdb maven . . com/example/Main#";
    const GREET: &str = "semanticdb maven . . com/example/Main#greet().";
    const GREET_1: &str = "semanticdb maven . . com/example/Main#greet(+1).";

    fn index(symbols: &[&str]) -> Vec<u8> {
        let mut doc = DocumentBuilder::new("Main.java");
        for (line, symbol) in symbols.iter().enumerate() {
            doc = doc.occurrence(OccurrenceBuilder::definition(*symbol, [line as i32, 0, 4]));
        }
        IndexWriter::new().document(doc).finish()
    }

    #[test]
    fn test_unknown_project() {
        let store = SymbolGraphStore::new();
        assert!(matches!(
            store.lookup_by_exact_id("nope", MAIN),
            Err(GraphError::ProjectNotIndexed(p)) if p == "nope"
        ));
        assert!(store.projects().is_empty());
    }

    #[test]
    fn test_exact_and_suffix_lookup() {
        let store = SymbolGraphStore::new();
        store.ingest_bytes("sample", &index(&[MAIN, GREET, GREET_1])).unwrap();

        assert_eq!(store.lookup_by_exact_id("sample", GREET).unwrap().unwrap().name, "greet");
        assert!(store.lookup_by_exact_id("sample", "Main#greet().").unwrap().is_none());

        let ids: Vec<String> = store
            .lookup_by_suffix("sample", "Main#greet().")
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![GREET.to_string(), GREET_1.to_string()]);
        assert!(store.lookup_by_suffix("sample", "reet().").unwrap().is_empty());
        assert!(store.lookup_by_suffix("sample", "Main#greet(").unwrap().is_empty());
    }

    #[test]
    fn test_suffix_lookup_honours_overload() {
        let store = SymbolGraphStore::new();
        store.ingest_bytes("sample", &index(&[MAIN, GREET, GREET_1])).unwrap();

        let found = store.lookup_by_suffix("sample", "Main#greet(+1).").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, GREET_1);
        assert!(store.lookup_by_suffix("sample", "Main#greet(+2).").unwrap().is_empty());
    }

    #[test]
    fn test_reingest_replaces_graph() {
        let store = SymbolGraphStore::new();
        let first = store.ingest_bytes("sample", &index(&[MAIN, GREET])).unwrap();
        let second = store.ingest_bytes("sample", &index(&[MAIN])).unwrap();

        assert_ne!(first.generation(), second.generation());
        assert!(store.lookup_by_exact_id("sample", GREET).unwrap().is_none());
        // A reader holding the old Arc still sees the old graph.
        assert!(first.contains(GREET));
    }

    #[test]
    fn test_failed_ingest_keeps_previous_graph() {
        let store = SymbolGraphStore::new();
        let before = store.ingest_bytes("sample", &index(&[MAIN, GREET])).unwrap();

        let records = vec![Err(MalformedStreamError::new(7, MalformedKind::TruncatedVarint))];
        let err = store.ingest("sample", records).unwrap_err();
        assert!(matches!(err, GraphError::Malformed(_)));

        let after = store.graph("sample").unwrap();
        assert_eq!(after.generation(), before.generation());
        // The ingest slot was released.
        assert!(store.begin_ingest("sample").is_ok());
    }

    #[test]
    fn test_ingest_slot_is_exclusive_per_project() {
        let store = SymbolGraphStore::new();
        let guard = store.begin_ingest("sample").unwrap();
        assert!(matches!(
            store.ingest_bytes("sample", &index(&[MAIN])),
            Err(GraphError::IngestInProgress(_))
        ));
        assert!(store.ingest_bytes("other", &index(&[MAIN])).is_ok());
        drop(guard);
        assert!(store.ingest_bytes("sample", &index(&[MAIN])).is_ok());
    }

    #[test]
    fn test_remove() {
        let store = SymbolGraphStore::new();
        store.ingest_bytes("sample", &index(&[MAIN])).unwrap();
        assert!(store.remove("sample").unwrap());
        assert!(!store.remove("sample").unwrap());
        assert!(store.graph("sample").is_err());
    }
}
