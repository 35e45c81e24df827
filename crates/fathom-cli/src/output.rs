//! Text and JSON rendering of command results.

use std::io::{self, Write};

use fathom_index::{IngestReport, NestedNode, Occurrence, OccurrenceRole, Symbol, TraversalTree};
use serde::Serialize;

pub fn json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn ingest_report(out: &mut dyn Write, project: &str, report: &IngestReport) -> io::Result<()> {
    writeln!(
        out,
        "Ingested {}: {} documents, {} symbols, {} occurrences",
        project, report.documents, report.symbols, report.occurrences
    )?;
    writeln!(
        out,
        "  edges: {} call, {} inheritance, {} reference",
        report.call_edges, report.inheritance_edges, report.reference_edges
    )?;
    if !report.dangling_edges.is_empty() {
        writeln!(
            out,
            "  dropped {} edges to symbols defined outside the index",
            report.dangling_edges.len()
        )?;
    }
    if report.duplicate_definitions > 0 {
        writeln!(out, "  demoted {} duplicate definitions", report.duplicate_definitions)?;
    }
    Ok(())
}

pub fn symbols(out: &mut dyn Write, symbols: &[Symbol]) -> io::Result<()> {
    if symbols.is_empty() {
        return writeln!(out, "No matching symbols");
    }
    for symbol in symbols {
        writeln!(out, "{}  {}  {}", symbol.kind.label(), symbol.location, symbol.id)?;
        if let Some(signature) = &symbol.signature {
            writeln!(out, "    {}", signature)?;
        }
    }
    Ok(())
}

pub fn occurrences(out: &mut dyn Write, occurrences: &[Occurrence]) -> io::Result<()> {
    for occurrence in occurrences {
        let role = match occurrence.role() {
            OccurrenceRole::Definition => "def",
            OccurrenceRole::Reference => "ref",
            OccurrenceRole::Import => "import",
            OccurrenceRole::WriteAccess => "write",
            OccurrenceRole::ReadAccess => "read",
        };
        writeln!(out, "{:<6} {}", role, occurrence.location)?;
    }
    Ok(())
}

pub fn tree(out: &mut dyn Write, tree: &TraversalTree) -> io::Result<()> {
    write_node(out, &tree.to_nested(), 0)?;
    if !tree.cycles.is_empty() {
        writeln!(out, "cycles:")?;
        for cycle in &tree.cycles {
            writeln!(out, "  {} -> {} at {}", cycle.from, cycle.to, cycle.site)?;
        }
    }
    Ok(())
}

fn write_node(out: &mut dyn Write, node: &NestedNode, indent: usize) -> io::Result<()> {
    match &node.site {
        Some(site) => writeln!(
            out,
            "{:indent$}{} ({})  via {}",
            "",
            node.name,
            node.location,
            site,
            indent = indent * 2
        )?,
        None => writeln!(
            out,
            "{:indent$}{} ({})",
            "",
            node.name,
            node.location,
            indent = indent * 2
        )?,
    }
    for child in &node.children {
        write_node(out, child, indent + 1)?;
    }
    Ok(())
}
