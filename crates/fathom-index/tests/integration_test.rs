//! Integration tests for fathom-index.
//!
//! Fixtures are synthetic SCIP indexes shaped like scip-java output for a
//! small sample project.

use std::sync::mpsc;
use std::thread;

use tempfile::tempdir;

use fathom_index::scip::encode::{DocumentBuilder, IndexWriter, OccurrenceBuilder, SymbolBuilder};
use fathom_index::scip::{self, SymbolRoles};
use fathom_index::{
    Direction, EdgeKind, FactRecord, GraphError, GraphStorage, MalformedStreamError,
    StructuralSearch, SymbolGraphStore, TraversalConfig,
};

const PKG: &str = "semanticdb maven maven/com.example/sample-java-project 1.0-SNAPSHOT ";
const JDK: &str = "semanticdb maven jdk 11 ";
const COMMONS: &str = "semanticdb maven maven/org.apache.commons/commons-lang3 3.12.0 ";

fn sym(descriptors: &str) -> String {
    format!("{PKG}{descriptors}")
}

fn main_class() -> String {
    sym("com/example/Main#")
}

fn main_method() -> String {
    sym("com/example/Main#main().")
}

fn greet() -> String {
    sym("com/example/Main#greet().")
}

fn helper() -> String {
    sym("com/example/Main#helperMethod().")
}

/// `Main.java` from the sample project: `main` calls `greet`, which calls
/// into commons-lang; `helperMethod` only prints.
fn sample_index() -> Vec<u8> {
    let out = format!("{JDK}java/lang/System#out.");
    let println = format!("{JDK}java/io/PrintStream#println(+8).");
    let string_utils = format!("{COMMONS}org/apache/commons/lang3/StringUtils#");
    let is_blank = format!("{COMMONS}org/apache/commons/lang3/StringUtils#isBlank().");
    let args = sym("com/example/Main#main().(args)");
    let name = sym("com/example/Main#greet().(name)");

    let document = DocumentBuilder::new("src/main/java/com/example/Main.java")
        .language("java")
        .symbol(
            SymbolBuilder::new(main_class())
                .documentation("A simple class for demonstrating the Fathom search indexer.")
                .signature("public class Main"),
        )
        .symbol(
            SymbolBuilder::new(main_method())
                .documentation("The main entry point for the application.")
                .signature("public static void main(String[] args)"),
        )
        .symbol(
            SymbolBuilder::new(greet())
                .documentation("A simple method that returns a greeting string.")
                .signature("public static String greet(String name)"),
        )
        .symbol(SymbolBuilder::new(helper()).signature("private void helperMethod()"))
        .occurrence(
            OccurrenceBuilder::reference(&string_utils, [2, 7, 43]).roles(SymbolRoles::IMPORT),
        )
        .occurrence(OccurrenceBuilder::definition(main_class(), [7, 13, 17]))
        .occurrence(OccurrenceBuilder::definition(main_method(), [14, 23, 27]).enclosing([14, 4, 17, 5]))
        .occurrence(OccurrenceBuilder::definition(&args, [14, 37, 41]))
        .occurrence(OccurrenceBuilder::reference(&out, [15, 15, 18]))
        .occurrence(OccurrenceBuilder::reference(&println, [15, 19, 26]))
        .occurrence(OccurrenceBuilder::reference(greet(), [16, 8, 13]))
        .occurrence(OccurrenceBuilder::definition(greet(), [25, 25, 30]).enclosing([25, 4, 30, 5]))
        .occurrence(OccurrenceBuilder::definition(&name, [25, 38, 42]))
        .occurrence(OccurrenceBuilder::reference(&string_utils, [26, 12, 23]))
        .occurrence(OccurrenceBuilder::reference(&is_blank, [26, 24, 31]))
        .occurrence(OccurrenceBuilder::reference(&name, [26, 32, 36]))
        .occurrence(OccurrenceBuilder::reference(&name, [29, 27, 31]))
        .occurrence(OccurrenceBuilder::definition(helper(), [35, 17, 29]).enclosing([35, 4, 37, 5]))
        .occurrence(OccurrenceBuilder::reference(&out, [36, 15, 18]))
        .occurrence(OccurrenceBuilder::reference(&println, [36, 19, 26]));

    IndexWriter::new()
        .metadata("scip-java", "0.10.4", "file:///work/sample_java_project")
        .document(document)
        .external_symbol(SymbolBuilder::new(&is_blank).documentation("Checks if a CharSequence is blank."))
        .finish()
}

/// Two classes whose methods call each other.
fn cyclic_index() -> Vec<u8> {
    let a = sym("p/A#a().");
    let b = sym("p/B#b().");
    IndexWriter::new()
        .document(
            DocumentBuilder::new("p/A.java")
                .occurrence(OccurrenceBuilder::definition(&a, [2, 9, 10]).enclosing([2, 2, 4, 3]))
                .occurrence(OccurrenceBuilder::reference(&b, [3, 4, 5])),
        )
        .document(
            DocumentBuilder::new("p/B.java")
                .occurrence(OccurrenceBuilder::definition(&b, [2, 9, 10]).enclosing([2, 2, 4, 3]))
                .occurrence(OccurrenceBuilder::reference(&a, [3, 4, 5])),
        )
        .finish()
}

/// Type hierarchy declared through `is_implementation` relationships, one
/// type per line: each `(child, parent)` pair makes `child` extend `parent`.
fn hierarchy_index(types: &[&str], supertypes: &[(&str, &str)]) -> Vec<u8> {
    let mut document = DocumentBuilder::new("p/Types.java");
    for (line, name) in types.iter().enumerate() {
        let mut info = SymbolBuilder::new(sym(&format!("p/{name}#")));
        for (_, parent) in supertypes.iter().filter(|(child, _)| child == name) {
            info = info.implementation(sym(&format!("p/{parent}#")));
        }
        document = document
            .symbol(info)
            .occurrence(OccurrenceBuilder::definition(sym(&format!("p/{name}#")), [line as i32, 6, 12]));
    }
    IndexWriter::new().document(document).finish()
}

fn ingested_store() -> SymbolGraphStore {
    let store = SymbolGraphStore::new();
    store.ingest_bytes("sample", &sample_index()).unwrap();
    store
}

#[test]
fn test_exactly_defined_symbols_are_indexed() {
    let store = ingested_store();
    let graph = store.graph("sample").unwrap();

    for id in [main_class(), main_method(), greet(), helper()] {
        assert!(store.lookup_by_exact_id("sample", &id).unwrap().is_some(), "{id}");
    }
    // Two parameters plus the four above.
    assert_eq!(graph.symbol_count(), 6);
    let is_blank = format!("{COMMONS}org/apache/commons/lang3/StringUtils#isBlank().");
    assert!(store.lookup_by_exact_id("sample", &is_blank).unwrap().is_none());

    let symbol = store.lookup_by_exact_id("sample", &greet()).unwrap().unwrap();
    assert_eq!(symbol.location.start_line, 26);
    assert_eq!(symbol.arity, Some(1));
    assert_eq!(
        symbol.documentation.as_deref(),
        Some("A simple method that returns a greeting string.")
    );
    assert_eq!(graph.metadata().unwrap().tool_name.as_deref(), Some("scip-java"));
}

#[test]
fn test_sample_project_callers_and_callees() {
    let search = StructuralSearch::new(ingested_store());

    let callers = search
        .traverse_graph("sample", &greet(), EdgeKind::Call, Direction::Incoming, 3)
        .unwrap()
        .unwrap();
    assert_eq!(callers.reached(), vec![main_method()]);
    assert_eq!(callers.nodes[1].site.as_ref().unwrap().start_line, 17);

    let callees = search
        .traverse_graph("sample", &main_method(), EdgeKind::Call, Direction::Outgoing, 3)
        .unwrap()
        .unwrap();
    assert_eq!(callees.reached(), vec![greet()]);

    let helper_callees = search
        .traverse_graph("sample", &helper(), EdgeKind::Call, Direction::Outgoing, 3)
        .unwrap()
        .unwrap();
    assert!(helper_callees.reached().is_empty());
}

#[test]
fn test_external_targets_reported_as_dangling() {
    let store = ingested_store();
    let graph = store.graph("sample").unwrap();
    let report = graph.report();

    assert_eq!(report.call_edges, 1);
    // out + println twice, StringUtils + isBlank once; the import is outside
    // every method body.
    assert_eq!(report.dangling_edges.len(), 6);
    assert!(report
        .dangling_edges
        .iter()
        .any(|e| e.kind == EdgeKind::Call && e.target.ends_with("StringUtils#isBlank().")));
    // Parameters never become edge targets.
    assert!(report.dangling_edges.iter().all(|e| !e.target.ends_with("(name)")));
}

#[test]
fn test_resolve_queries() {
    let search = StructuralSearch::new(ingested_store());
    for query in ["com.example.Main.greet", "Main.greet", "greet", "greet(String)", "Main#greet()."] {
        let found = search.resolve_symbol("sample", query).unwrap();
        assert_eq!(found.len(), 1, "{query}");
        assert_eq!(found[0].id, greet(), "{query}");
    }
    assert!(search.resolve_symbol("sample", "reet").unwrap().is_empty());
    assert!(search.resolve_symbol("sample", "example.Greet").unwrap().is_empty());
    assert_eq!(search.resolve_symbol("sample", "Main").unwrap()[0].id, main_class());
}

#[test]
fn test_overloads_both_returned_in_stable_order() {
    let foo_int = sym("com/example/Util#foo().");
    let foo_string = sym("com/example/Util#foo(+1).");
    let bytes = IndexWriter::new()
        .document(
            DocumentBuilder::new("src/main/java/com/example/Util.java")
                .symbol(SymbolBuilder::new(&foo_int).signature("static int foo(int x)"))
                .symbol(SymbolBuilder::new(&foo_string).signature("static int foo(String s)"))
                .occurrence(OccurrenceBuilder::definition(&foo_string, [8, 15, 18]))
                .occurrence(OccurrenceBuilder::definition(&foo_int, [4, 15, 18])),
        )
        .finish();

    let first = SymbolGraphStore::new();
    first.ingest_bytes("util", &bytes).unwrap();
    let second = SymbolGraphStore::new();
    second.ingest_bytes("util", &bytes).unwrap();

    let a = StructuralSearch::new(first).resolve_symbol("util", "foo").unwrap();
    let b = StructuralSearch::new(second).resolve_symbol("util", "foo").unwrap();
    let ids: Vec<&str> = a.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec![foo_int.as_str(), foo_string.as_str()]);
    assert_eq!(a, b);
}

#[test]
fn test_cyclic_traversal_terminates() {
    let store = SymbolGraphStore::new();
    store.ingest_bytes("cyclic", &cyclic_index()).unwrap();
    let search = StructuralSearch::new(store);

    let tree = search
        .traverse_graph("cyclic", &sym("p/A#a()."), EdgeKind::Call, Direction::Outgoing, 5)
        .unwrap()
        .unwrap();
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.cycles.len(), 1);
    assert_eq!(tree.cycles[0].to, sym("p/A#a()."));
}

#[test]
fn test_subtypes_and_supertypes() {
    let store = SymbolGraphStore::new();
    let bytes = hierarchy_index(
        &["Shape", "Circle", "Square", "UnitCircle"],
        &[("Circle", "Shape"), ("Square", "Shape"), ("UnitCircle", "Circle")],
    );
    store.ingest_bytes("shapes", &bytes).unwrap();
    let search = StructuralSearch::new(store);
    let shape = sym("p/Shape#");

    let subtypes = search
        .traverse_graph("shapes", &shape, EdgeKind::Inheritance, Direction::Incoming, 3)
        .unwrap()
        .unwrap();
    assert_eq!(
        subtypes.reached(),
        vec![sym("p/Circle#"), sym("p/Square#"), sym("p/UnitCircle#")]
    );
    assert_eq!(subtypes.nodes[3].depth, 2);
    assert!(subtypes.cycles.is_empty());

    let supertypes = search
        .traverse_graph("shapes", &sym("p/UnitCircle#"), EdgeKind::Inheritance, Direction::Outgoing, 3)
        .unwrap()
        .unwrap();
    assert_eq!(supertypes.reached(), vec![sym("p/Circle#"), shape.clone()]);
    assert!(supertypes.cycles.is_empty());

    // Inheritance edges never show up as calls.
    let calls = search
        .traverse_graph("shapes", &shape, EdgeKind::Call, Direction::Incoming, 3)
        .unwrap()
        .unwrap();
    assert!(calls.reached().is_empty());
}

#[test]
fn test_circular_type_hierarchy_is_flagged() {
    let store = SymbolGraphStore::new();
    let bytes = hierarchy_index(
        &["Base", "Child", "Grand"],
        &[("Child", "Base"), ("Grand", "Child"), ("Base", "Grand")],
    );
    store.ingest_bytes("cycle", &bytes).unwrap();
    let search = StructuralSearch::new(store);
    let (base, child, grand) = (sym("p/Base#"), sym("p/Child#"), sym("p/Grand#"));

    let subtypes = search
        .traverse_graph("cycle", &base, EdgeKind::Inheritance, Direction::Incoming, 5)
        .unwrap()
        .unwrap();
    assert_eq!(subtypes.reached(), vec![child.clone(), grand.clone()]);
    assert_eq!(subtypes.cycles.len(), 1);
    assert_eq!(subtypes.cycles[0].from, grand);
    assert_eq!(subtypes.cycles[0].to, base);

    let supertypes = search
        .traverse_graph("cycle", &grand, EdgeKind::Inheritance, Direction::Outgoing, 5)
        .unwrap()
        .unwrap();
    assert_eq!(supertypes.reached(), vec![child, base.clone()]);
    assert_eq!(supertypes.cycles.len(), 1);
    assert_eq!(supertypes.cycles[0].from, base);
    assert_eq!(supertypes.cycles[0].to, grand);
}

#[test]
fn test_depth_above_ceiling_rejected() {
    let search = StructuralSearch::new(ingested_store());
    let err = search
        .traverse_graph("sample", &greet(), EdgeKind::Call, Direction::Incoming, 11)
        .unwrap_err();
    assert!(matches!(
        err,
        GraphError::DepthLimitExceeded {
            requested: 11,
            ceiling: 10
        }
    ));

    let strict = StructuralSearch::new(ingested_store())
        .with_traversal_config(TraversalConfig::new().with_depth_ceiling(2));
    assert!(strict
        .traverse_graph("sample", &greet(), EdgeKind::Call, Direction::Incoming, 3)
        .is_err());
}

#[test]
fn test_reingest_with_subset_replaces_graph() {
    let store = ingested_store();
    let subset = IndexWriter::new()
        .document(
            DocumentBuilder::new("src/main/java/com/example/Main.java")
                .occurrence(OccurrenceBuilder::definition(main_class(), [7, 13, 17])),
        )
        .finish();
    store.ingest_bytes("sample", &subset).unwrap();

    assert!(store.lookup_by_exact_id("sample", &main_class()).unwrap().is_some());
    assert!(store.lookup_by_exact_id("sample", &greet()).unwrap().is_none());
    assert!(store
        .edges_from("sample", &main_method(), EdgeKind::Call, Direction::Outgoing)
        .unwrap()
        .is_empty());
    assert!(store.occurrences("sample", &greet()).unwrap().is_empty());
}

#[test]
fn test_truncated_stream_keeps_prior_graph() {
    let store = ingested_store();
    let before = store.graph("sample").unwrap().generation();

    let mut bytes = sample_index();
    bytes.truncate(bytes.len() - 5);
    let err = store.ingest_bytes("sample", &bytes).unwrap_err();
    match err {
        GraphError::Malformed(e) => assert!(e.offset <= bytes.len()),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(store.graph("sample").unwrap().generation(), before);
    assert!(store.lookup_by_exact_id("sample", &greet()).unwrap().is_some());
}

#[test]
fn test_concurrent_ingest_of_same_project_fails_fast() {
    let store = SymbolGraphStore::new();
    let records: Vec<Result<FactRecord, MalformedStreamError>> = scip::decode_all(&sample_index()).unwrap().into_iter().map(Ok).collect();
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    thread::scope(|scope| {
        let slow = scope.spawn(|| {
            let mut pending = records.into_iter();
            let mut first = true;
            let gated = std::iter::from_fn(move || {
                if first {
                    first = false;
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                }
                pending.next()
            });
            store.ingest("sample", gated)
        });

        started_rx.recv().unwrap();
        assert!(matches!(
            store.ingest_bytes("sample", &sample_index()),
            Err(GraphError::IngestInProgress(p)) if p == "sample"
        ));
        // Other projects are not blocked.
        store.ingest_bytes("other", &cyclic_index()).unwrap();
        release_tx.send(()).unwrap();

        let graph = slow.join().unwrap().unwrap();
        assert_eq!(graph.symbol_count(), 6);
    });

    assert_eq!(store.projects(), vec!["other".to_string(), "sample".to_string()]);
}

#[test]
fn test_persisted_graphs_survive_restart() {
    let dir = tempdir().unwrap();
    let generation = {
        let store = SymbolGraphStore::with_storage(GraphStorage::init(dir.path()).unwrap());
        store.ingest_bytes("sample", &sample_index()).unwrap().generation()
    };

    let reopened = SymbolGraphStore::open(GraphStorage::init(dir.path()).unwrap()).unwrap();
    assert_eq!(reopened.projects(), vec!["sample".to_string()]);
    let graph = reopened.graph("sample").unwrap();
    assert_eq!(graph.generation(), generation);
    assert_eq!(graph.report().dangling_edges.len(), 6);

    let search = StructuralSearch::new(reopened);
    assert_eq!(search.resolve_symbol("sample", "Main.greet").unwrap()[0].id, greet());
    assert!(search.remove_project("sample").unwrap());
    assert!(GraphStorage::init(dir.path()).unwrap().list().unwrap().is_empty());
}

#[tokio::test]
async fn test_ingest_file_and_query() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.scip");
    tokio::fs::write(&path, sample_index()).await.unwrap();

    let search = StructuralSearch::new(SymbolGraphStore::new());
    let graph = search.ingest_file("sample", &path).await.unwrap();
    assert_eq!(graph.documents().len(), 1);
    assert_eq!(graph.documents()[0].language.as_deref(), Some("java"));

    let occurrences = search.find_occurrences("sample", &greet()).unwrap();
    let lines: Vec<usize> = occurrences.iter().map(|o| o.location.start_line).collect();
    assert_eq!(lines, vec![17, 26]);
}
