use fukurow_core::{GraphName, Literal, NamedNode, Term, Triple, Variable};
use fukurow_sparql::{
    compile, evaluate, evaluate_with, Algebra, FunctionRegistry, QueryResults, QueryShape, Solution, SparqlError,
};
use fukurow_store::QuadStore;

// Basic compile-and-evaluate tests over a small social graph

fn ex(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.org/{}", local))
}

fn term(local: &str) -> Term {
    ex(local).into()
}

fn var(name: &str) -> Variable {
    Variable::new(name)
}

fn knows_store() -> QuadStore {
    let mut store = QuadStore::new();
    store.insert(&Triple::new(ex("a"), ex("knows"), ex("b")));
    store.insert(&Triple::new(ex("b"), ex("knows"), ex("c")));
    store
}

fn select(store: &QuadStore, text: &str) -> Vec<Solution> {
    let query = compile(text).unwrap();
    let solutions = match evaluate(&query, store).unwrap() {
        QueryResults::Solutions(solutions) => solutions.collect(),
        other => panic!("expected solutions, got {:?}", other),
    };
    solutions
}

fn ask(store: &QuadStore, text: &str) -> bool {
    let query = compile(text).unwrap();
    let result = match evaluate(&query, store).unwrap() {
        QueryResults::Boolean(result) => result,
        other => panic!("expected boolean, got {:?}", other),
    };
    result
}

#[test]
fn test_simple_select_query() {
    let query = compile(
        r#"
    PREFIX foaf: <http://xmlns.com/foaf/0.1/>
    SELECT ?name ?email
    WHERE {
        ?person foaf:name ?name .
        ?person foaf:mbox ?email .
    }
    "#,
    )
    .unwrap();

    match &query.shape {
        QueryShape::Select { variables } => assert_eq!(variables, &vec![var("name"), var("email")]),
        other => panic!("Expected SELECT query, got {:?}", other),
    }
    assert!(matches!(query.algebra, Algebra::Project(_, _)));
}

#[test]
fn test_one_or_more_path_scenario() {
    let store = knows_store();
    let mut pairs: Vec<(Term, Term)> = select(
        &store,
        "PREFIX ex: <http://example.org/> SELECT ?x ?y WHERE { ?x ex:knows+ ?y }",
    )
    .into_iter()
    .map(|row| (row.get(&var("x")).cloned().unwrap(), row.get(&var("y")).cloned().unwrap()))
    .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            (term("a"), term("b")),
            (term("a"), term("c")),
            (term("b"), term("c")),
        ]
    );
}

#[test]
fn test_ask_scenario() {
    let store = knows_store();
    assert!(!ask(&store, "PREFIX ex: <http://example.org/> ASK { ex:a ex:knows ex:z }"));
    assert!(ask(&store, "PREFIX ex: <http://example.org/> ASK { ex:a ex:knows ex:b }"));
}

#[test]
fn test_count_scenario() {
    let store = knows_store();
    let rows = select(
        &store,
        "PREFIX ex: <http://example.org/> SELECT (COUNT(?x) AS ?n) WHERE { ?x ex:knows ?y }",
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(&var("n")), Some(&Term::from(Literal::from(2i64))));
}

#[test]
fn test_cycle_terminates() {
    let mut store = knows_store();
    store.insert(&Triple::new(ex("c"), ex("knows"), ex("a")));
    let rows = select(
        &store,
        "PREFIX ex: <http://example.org/> SELECT ?y WHERE { ex:a ex:knows* ?y }",
    );
    // a itself plus b and c, each once
    assert_eq!(rows.len(), 3);
}

#[test]
fn test_bgp_soundness() {
    let store = knows_store();
    let rows = select(
        &store,
        "PREFIX ex: <http://example.org/> SELECT * WHERE { ?x ex:knows ?y . ?y ex:knows ?z }",
    );
    assert_eq!(rows.len(), 1);
    for row in rows {
        let x = row.get(&var("x")).cloned().unwrap();
        let y = row.get(&var("y")).cloned().unwrap();
        let z = row.get(&var("z")).cloned().unwrap();
        let first = Triple::from_terms(x, term("knows"), y.clone(), GraphName::DefaultGraph).unwrap();
        let second = Triple::from_terms(y, term("knows"), z, GraphName::DefaultGraph).unwrap();
        assert!(store.contains(&first));
        assert!(store.contains(&second));
    }
}

#[test]
fn test_filter_on_unbound_variable_excludes_rows() {
    let store = knows_store();
    let rows = select(
        &store,
        "PREFIX ex: <http://example.org/> SELECT * WHERE { ?x ex:knows ?y FILTER(?never > 1) }",
    );
    assert!(rows.is_empty());
}

#[test]
fn test_type_error_in_filter_is_not_fatal() {
    let mut store = knows_store();
    store.insert(&Triple::new(ex("a"), ex("age"), Literal::from(30i64)));
    store.insert(&Triple::new(ex("b"), ex("age"), Literal::new_simple("unknown")));
    let rows = select(
        &store,
        "PREFIX ex: <http://example.org/> SELECT ?x WHERE { ?x ex:age ?age FILTER(?age > 18) }",
    );
    assert_eq!(rows, vec![[(var("x"), term("a"))].into_iter().collect::<Solution>()]);
}

#[test]
fn test_construct_query() {
    let store = knows_store();
    let query = compile(
        "PREFIX ex: <http://example.org/>
         CONSTRUCT { ?y ex:knownBy ?x } WHERE { ?x ex:knows ?y }",
    )
    .unwrap();
    let triples = match evaluate(&query, &store).unwrap() {
        QueryResults::Graph(triples) => triples,
        other => panic!("Expected CONSTRUCT result, got {:?}", other),
    };
    assert_eq!(triples.len(), 2);
    assert!(triples.contains(&Triple::new(ex("b"), ex("knownBy"), ex("a"))));
}

#[test]
fn test_describe_query() {
    let mut store = knows_store();
    store.insert(&Triple::new(ex("z"), ex("likes"), ex("y")));
    let query = compile("DESCRIBE <http://example.org/b>").unwrap();
    let triples = match evaluate(&query, &store).unwrap() {
        QueryResults::Graph(triples) => triples,
        other => panic!("Expected DESCRIBE result, got {:?}", other),
    };
    // b as object of the first triple and subject of the second
    assert_eq!(triples.len(), 2);
}

#[test]
fn test_describe_star_ignores_blank_node_bindings() {
    let store = knows_store();
    let query = compile("DESCRIBE * WHERE { <http://example.org/a> <http://example.org/knows> _:x }").unwrap();
    match evaluate(&query, &store).unwrap() {
        QueryResults::Graph(triples) => assert!(triples.is_empty()),
        other => panic!("Expected DESCRIBE result, got {:?}", other),
    };
}

#[test]
fn test_evaluate_checks_unknown_functions() {
    let store = knows_store();
    let filtered = compile("SELECT * WHERE { ?s ?p ?o FILTER(<http://example.org/fn>(?o)) }").unwrap();
    assert!(matches!(evaluate(&filtered, &store), Err(SparqlError::UnboundFunction(_))));

    let bound = compile("SELECT ?x WHERE { ?s ?p ?o BIND(<http://example.org/fn>(?o) AS ?x) }").unwrap();
    assert!(evaluate(&bound, &store).is_ok());

    let mut functions = FunctionRegistry::new();
    functions.register(ex("fn"), |args: &[Term]| Some(Literal::from(args.len() == 1).into()));
    let rows = match evaluate_with(&filtered, &store, &functions).unwrap() {
        QueryResults::Solutions(solutions) => solutions.count(),
        other => panic!("expected solutions, got {:?}", other),
    };
    assert_eq!(rows, 2);
}

#[test]
fn test_unspaced_comparison_in_filter() {
    let mut store = QuadStore::new();
    for (person, age) in [("a", 20i64), ("b", 30), ("c", 40)] {
        store.insert(&Triple::new(ex(person), ex("age"), Literal::from(age)));
    }
    let rows = select(
        &store,
        "SELECT ?p WHERE { ?p <http://example.org/age> ?age FILTER(?age<35&&?age>25) }",
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(&var("p")), Some(&term("b")));
}

#[test]
fn test_syntax_error_reports_position() {
    let err = compile("SELECT ?x\nWHERE { ?x <http://example.org/p> }").unwrap_err();
    match err {
        SparqlError::Syntax { line, column, .. } => {
            assert_eq!(line, 2);
            assert_eq!(column, 35);
        }
        other => panic!("expected syntax error, got {:?}", other),
    }
}

#[test]
fn test_unterminated_iri_is_syntax_error() {
    assert!(matches!(
        compile("SELECT * WHERE { ?s <http://example.org/p ?o }"),
        Err(SparqlError::Syntax { .. })
    ));
}

#[test]
fn test_unterminated_string_is_syntax_error() {
    assert!(matches!(
        compile("SELECT * WHERE { ?s ?p \"open }"),
        Err(SparqlError::Syntax { .. })
    ));
}

#[test]
fn test_undefined_prefix_is_syntax_error() {
    assert!(matches!(
        compile("SELECT * WHERE { ?s foaf:name ?o }"),
        Err(SparqlError::Syntax { .. })
    ));
}

#[test]
fn test_ungrouped_projection_is_invalid() {
    assert!(matches!(
        compile("SELECT ?x (COUNT(?y) AS ?n) WHERE { ?x ?p ?y }"),
        Err(SparqlError::InvalidQuery(_))
    ));
}
