// Integration tests for Fukurow components
// These tests verify end-to-end functionality across multiple crates

use anyhow::{anyhow, Result};
use fukurow_core::{Literal, NamedNode, Term, Triple, Variable};
use fukurow_sparql::{EngineConfig, QueryResult, SparqlEngine, SparqlError};
use fukurow_store::{QuadStore, SharedStore};
use std::thread;

// Set RUST_LOG=fukurow_sparql=debug to see plans and update summaries
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const PREFIX: &str = "PREFIX ex: <http://example.org/>\n";

fn ex(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.org/{}", local))
}

fn column(result: &QueryResult, name: &str) -> Result<Vec<Term>> {
    let rows = result.bindings().ok_or_else(|| anyhow!("not a SELECT result"))?;
    Ok(rows.iter().filter_map(|row| row.get(&Variable::new(name)).cloned()).collect())
}

fn org_store() -> QuadStore {
    let mut store = QuadStore::new();
    store.load(vec![
        Triple::new(ex("alice"), ex("manages"), ex("bob")),
        Triple::new(ex("bob"), ex("manages"), ex("carol")),
        Triple::new(ex("carol"), ex("manages"), ex("dave")),
        Triple::new(ex("alice"), ex("salary"), Literal::from(120i64)),
        Triple::new(ex("bob"), ex("salary"), Literal::from(90i64)),
        Triple::new(ex("carol"), ex("salary"), Literal::from(70i64)),
        Triple::new(ex("dave"), ex("salary"), Literal::from(50i64)),
        Triple::new(ex("alice"), ex("name"), Literal::new_simple("Alice")).in_graph(ex("hr")),
    ]);
    store
}

#[test]
fn test_end_to_end_query_over_shared_store() -> Result<()> {
    init_tracing();
    let engine = SparqlEngine::with_store(SharedStore::from_store(org_store()));

    let result = engine.query(&format!(
        "{PREFIX} SELECT ?report (SUM(?s) AS ?cost) WHERE {{
            ex:alice ex:manages+ ?report . ?report ex:salary ?s
         }} GROUP BY ?report ORDER BY DESC(?cost)"
    ))?;

    assert_eq!(column(&result, "report")?, vec![ex("bob").into(), ex("carol").into(), ex("dave").into()]);
    Ok(())
}

#[test]
fn test_update_then_query_pipeline() -> Result<()> {
    init_tracing();
    let engine = SparqlEngine::with_store(SharedStore::from_store(org_store()));

    let summary = engine.update(&format!(
        "{PREFIX}
         DELETE {{ ?p ex:salary ?old }} INSERT {{ ?p ex:salary ?new }}
         WHERE {{ ?p ex:salary ?old FILTER(?old < 80) BIND(?old + 10 AS ?new) }}"
    ))?;
    assert_eq!(summary.deleted, 2);
    assert_eq!(summary.inserted, 2);

    let result = engine.query(&format!("{PREFIX} ASK {{ ex:dave ex:salary 60 }}"))?;
    assert_eq!(result.boolean(), Some(true));

    let store = engine.store().read()?;
    store.validate()?;
    assert_eq!(store.len(), 8);
    Ok(())
}

#[test]
fn test_named_graph_visibility_follows_config() -> Result<()> {
    let shared = SharedStore::from_store(org_store());
    let query = format!("{PREFIX} SELECT ?n WHERE {{ ?p ex:name ?n }}");

    let strict = SparqlEngine::with_store(shared.clone());
    assert!(strict.query(&query)?.is_empty());

    let union = SparqlEngine::with_store(shared).with_config(EngineConfig {
        union_default_graph: true,
        ..EngineConfig::default()
    });
    assert_eq!(column(&union.query(&query)?, "n")?, vec![Literal::new_simple("Alice").into()]);
    Ok(())
}

#[test]
fn test_construct_feeds_another_store() -> Result<()> {
    let engine = SparqlEngine::with_store(SharedStore::from_store(org_store()));
    let result = engine.query(&format!(
        "{PREFIX} CONSTRUCT {{ ?b ex:reportsTo ?a }} WHERE {{ ?a ex:manages ?b }}"
    ))?;
    let triples = result.triples().ok_or_else(|| anyhow!("not a graph result"))?;

    let mut derived = QuadStore::new();
    assert_eq!(derived.load(triples.iter().cloned()), 3);
    assert!(derived.contains(&Triple::new(ex("bob"), ex("reportsTo"), ex("alice"))));
    Ok(())
}

#[test]
fn test_error_handling_integration() {
    let engine = SparqlEngine::new();

    assert!(matches!(engine.query("SELECT WHERE"), Err(SparqlError::Syntax { .. })));
    assert!(matches!(
        engine.query("SELECT * WHERE { SERVICE <http://example.org/sparql> { ?s ?p ?o } }"),
        Err(SparqlError::Unsupported(_))
    ));
    assert!(matches!(
        engine.query("SELECT * WHERE { ?s ?p ?o FILTER(<http://example.org/nope>(?o)) }"),
        Err(SparqlError::UnboundFunction(_))
    ));
    assert!(matches!(
        engine.update("DELETE DATA { _:b <http://example.org/p> 1 }"),
        Err(SparqlError::Syntax { .. })
    ));
    assert!(matches!(
        engine.update("DELETE { _:b <http://example.org/p> ?o } WHERE { ?s <http://example.org/p> ?o }"),
        Err(SparqlError::InvalidQuery(_))
    ));
}

#[test]
fn test_results_serialize_to_json() -> Result<()> {
    let engine = SparqlEngine::with_store(SharedStore::from_store(org_store()));
    let result = engine.query(&format!("{PREFIX} SELECT ?s WHERE {{ ?s ex:salary 50 }}"))?;
    let json = result.to_json();
    assert_eq!(json["head"]["vars"], serde_json::json!(["s"]));
    assert_eq!(json["results"]["bindings"][0]["s"]["value"], "http://example.org/dave");
    Ok(())
}

#[test]
fn test_concurrent_readers_and_writer() -> Result<()> {
    let engine = SparqlEngine::with_store(SharedStore::from_store(org_store()));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || -> Result<usize, SparqlError> {
                let result = engine.query("SELECT * WHERE { ?s ?p ?o }")?;
                Ok(result.len())
            })
        })
        .collect();

    let writer = {
        let engine = engine.clone();
        thread::spawn(move || engine.update("INSERT DATA { <http://example.org/erin> <http://example.org/salary> 40 }"))
    };

    for reader in readers {
        let seen = reader.join().map_err(|_| anyhow!("reader panicked"))??;
        // atomic update: either before or after the insert
        assert!(seen == 7 || seen == 8, "unexpected snapshot size {}", seen);
    }
    writer.join().map_err(|_| anyhow!("writer panicked"))??;

    let store = engine.store().read()?;
    assert_eq!(store.len(), 9);
    assert_eq!(store.graph_names(), vec![ex("hr")]);
    Ok(())
}
