use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fukurow_core::{Literal, NamedNode, Triple};
use fukurow_sparql::{
    compile, evaluate, DefaultSparqlOptimizer, DefaultSparqlParser, QueryResults, QueryStats, SparqlEngine,
    SparqlOptimizer, SparqlParser,
};
use fukurow_store::{QuadStore, SharedStore};

fn iri(s: String) -> NamedNode {
    NamedNode::new_unchecked(s)
}

/// Generate a social network-like dataset
fn generate_test_data(size: usize) -> QuadStore {
    let mut store = QuadStore::new();
    let rdf_type = NamedNode::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#type");
    let person_class = NamedNode::new_unchecked("http://example.org/Person");

    for i in 0..size {
        let person = iri(format!("http://example.org/person{}", i));
        let age = (i % 100 + 18) as i64;

        store.insert(&Triple::new(person.clone(), rdf_type.clone(), person_class.clone()));
        store.insert(&Triple::new(
            person.clone(),
            iri("http://example.org/name".to_string()),
            Literal::new_simple(format!("Person {}", i)),
        ));
        store.insert(&Triple::new(person.clone(), iri("http://example.org/age".to_string()), Literal::from(age)));

        if i > 0 {
            store.insert(&Triple::new(
                person.clone(),
                iri("http://example.org/knows".to_string()),
                iri(format!("http://example.org/person{}", i - 1)),
            ));
        }

        for j in 0..3 {
            store.insert(&Triple::new(
                person.clone(),
                iri("http://example.org/interestedIn".to_string()),
                iri(format!("http://example.org/interest{}", (i + j) % 50)),
            ));
        }
    }

    store
}

const QUERIES: &[(&str, &str)] = &[
    ("simple_select", "SELECT ?s ?p ?o WHERE { ?s ?p ?o } LIMIT 100"),
    ("filter_query", "SELECT ?person ?name WHERE { ?person <http://example.org/name> ?name . ?person <http://example.org/age> ?age . FILTER(?age > 25) }"),
    ("join_query", "SELECT ?a ?b WHERE { ?a <http://example.org/knows> ?b . ?b <http://example.org/name> ?name }"),
    ("aggregate_query", "SELECT ?interest (COUNT(?person) AS ?count) WHERE { ?person <http://example.org/interestedIn> ?interest } GROUP BY ?interest"),
    ("complex_join", "SELECT ?person ?friend ?interest WHERE { ?person <http://example.org/knows> ?friend . ?person <http://example.org/interestedIn> ?interest . ?friend <http://example.org/interestedIn> ?interest }"),
];

fn count(results: QueryResults<'_>) -> usize {
    match results {
        QueryResults::Solutions(solutions) => solutions.count(),
        QueryResults::Graph(triples) => triples.len(),
        QueryResults::Boolean(_) => 1,
    }
}

/// Benchmark SPARQL parsing performance
fn benchmark_sparql_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparql_parsing");
    let parser = DefaultSparqlParser::new();

    for (name, query) in QUERIES {
        group.bench_with_input(BenchmarkId::from_parameter(name), query, |b, query| {
            b.iter(|| parser.parse_query(black_box(query)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark query execution over growing stores
fn benchmark_sparql_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparql_execution");

    for (size_name, data_size) in [("small", 100), ("medium", 1000), ("large", 5000)] {
        let store = generate_test_data(data_size);
        for (name, query) in &QUERIES[..3] {
            let compiled = compile(query).unwrap();
            group.bench_with_input(
                BenchmarkId::from_parameter(format!("{}_{}", size_name, name)),
                &compiled,
                |b, compiled| {
                    b.iter(|| count(evaluate(black_box(compiled), black_box(&store)).unwrap()));
                },
            );
        }
    }

    group.finish();
}

/// Benchmark plan optimization with store statistics
fn benchmark_sparql_optimization(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparql_optimization");
    let store = generate_test_data(1000);
    let stats = QueryStats::from_statistics(&store.statistics());
    let optimizer = DefaultSparqlOptimizer::default();

    for (name, query) in QUERIES {
        let compiled = compile(query).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &compiled, |b, compiled| {
            b.iter(|| optimizer.optimize(black_box(compiled.algebra.clone()), Some(&stats)));
        });
    }

    group.finish();
}

/// Benchmark end-to-end processing through the engine (parse + optimize + execute)
fn benchmark_end_to_end_sparql(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparql_end_to_end");
    let engine = SparqlEngine::with_store(SharedStore::from_store(generate_test_data(2000)));

    for (name, query) in QUERIES {
        group.bench_with_input(BenchmarkId::from_parameter(name), query, |b, query| {
            b.iter(|| engine.query_with(black_box(query), count).unwrap());
        });
    }

    group.finish();
}

/// Benchmark property path closure on a chain
fn benchmark_property_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparql_paths");
    let store = generate_test_data(500);

    for (name, query) in [
        ("one_or_more_bound", "SELECT ?x WHERE { <http://example.org/person499> <http://example.org/knows>+ ?x }"),
        ("zero_or_more_bound", "SELECT ?x WHERE { ?x <http://example.org/knows>* <http://example.org/person0> }"),
    ] {
        let compiled = compile(query).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &compiled, |b, compiled| {
            b.iter(|| count(evaluate(black_box(compiled), black_box(&store)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_sparql_parsing,
    benchmark_sparql_execution,
    benchmark_sparql_optimization,
    benchmark_end_to_end_sparql,
    benchmark_property_paths
);
criterion_main!(benches);
