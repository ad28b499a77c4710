use fukurow_core::{BlankNode, GraphName, Literal, NamedNode, Term, Triple};
use fukurow_store::{QuadPattern, QuadStore, SharedStore};
use proptest::prelude::*;
use std::collections::HashSet;

fn ex(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.org/{}", local))
}

fn create_test_triple(subject: &str, predicate: &str, object: &str) -> Triple {
    Triple::new(ex(subject), ex(predicate), ex(object))
}

fn sorted(triples: impl Iterator<Item = Triple>) -> Vec<Triple> {
    let mut v: Vec<Triple> = triples.collect();
    v.sort();
    v
}

#[test]
fn test_store_creation() {
    let store = QuadStore::new();
    assert_eq!(store.statistics().total_triples, 0);
    assert_eq!(store.statistics().graph_count, 0);
    assert!(store.is_empty());
}

#[test]
fn test_insert_single_triple() {
    let mut store = QuadStore::new();
    let triple = create_test_triple("s1", "p1", "o1");

    assert!(store.insert(&triple));
    assert_eq!(store.statistics().total_triples, 1);
    assert_eq!(store.statistics().graph_count, 1);

    let results: Vec<Triple> = store
        .match_pattern(&QuadPattern::new().with_subject(ex("s1")).with_predicate(ex("p1")).with_object(ex("o1")))
        .collect();
    assert_eq!(results, vec![triple]);
}

#[test]
fn test_insert_multiple_graphs() {
    let mut store = QuadStore::new();
    store.insert(&create_test_triple("s1", "p1", "o1"));
    store.insert(&create_test_triple("s2", "p2", "o2").in_graph(ex("graph1")));
    store.insert(&create_test_triple("s3", "p3", "o3").in_graph(ex("graph2")));

    assert_eq!(store.statistics().total_triples, 3);
    assert_eq!(store.statistics().graph_count, 3);

    let default_only = QuadPattern::new().with_graph(GraphName::DefaultGraph);
    assert_eq!(store.match_pattern(&default_only).count(), 1);
    let graph1 = QuadPattern::new().with_graph(ex("graph1"));
    assert_eq!(store.match_pattern(&graph1).count(), 1);
    assert_eq!(store.iter().count(), 3);
}

#[test]
fn test_match_every_bound_subset() {
    let mut store = QuadStore::new();
    let triples = vec![
        create_test_triple("a", "p", "b"),
        create_test_triple("a", "q", "c"),
        create_test_triple("b", "p", "c"),
        create_test_triple("a", "p", "c").in_graph(ex("g")),
    ];
    for t in &triples {
        store.insert(t);
    }

    for target in &triples {
        for mask in 0u8..16 {
            let mut pattern = QuadPattern::new();
            if mask & 1 != 0 {
                pattern.subject = Some(Term::from(target.subject.clone()));
            }
            if mask & 2 != 0 {
                pattern.predicate = Some(Term::from(target.predicate.clone()));
            }
            if mask & 4 != 0 {
                pattern.object = Some(target.object.clone());
            }
            if mask & 8 != 0 {
                pattern.graph = Some(target.graph.clone());
            }
            let expected = sorted(triples.iter().filter(|t| pattern.matches(t)).cloned());
            let found = sorted(store.match_pattern(&pattern));
            assert_eq!(found, expected, "mask {:04b}", mask);
        }
    }
}

#[test]
fn test_delete_and_clear() {
    let mut store = QuadStore::new();
    let t1 = create_test_triple("s1", "p1", "o1");
    let t2 = Triple::new(BlankNode::new_unchecked("b"), ex("p1"), Literal::from(3i64));
    store.insert(&t1);
    store.insert(&t2);

    assert!(store.delete(&t1));
    assert!(!store.delete(&t1));
    assert_eq!(store.len(), 1);

    store.clear();
    assert!(store.is_empty());
    assert!(store.validate().is_ok());
}

#[test]
fn test_shared_store_concurrent_readers() {
    let shared = SharedStore::new();
    shared
        .load((0..100).map(|i| create_test_triple(&format!("s{}", i), "p", "o")))
        .unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let shared = shared.clone();
            scope.spawn(move || {
                let store = shared.read().unwrap();
                let predicate = Term::from(ex("p"));
                assert_eq!(store.quads_for_pattern(None, Some(&predicate), None, None).count(), 100);
            });
        }
    });

    assert!(shared.delete(&create_test_triple("s0", "p", "o")).unwrap());
    assert_eq!(shared.len().unwrap(), 99);
}

#[test]
fn test_statistics_serialize() {
    let mut store = QuadStore::new();
    store.insert(&create_test_triple("a", "p", "b"));
    let json = serde_json::to_value(store.statistics()).unwrap();
    assert_eq!(json["total_triples"], 1);
    assert_eq!(json["predicate_counts"][0][0], "http://example.org/p");
}

fn arb_triple() -> impl Strategy<Value = Triple> {
    (0..5u8, 0..3u8, 0..5u8, 0..3u8, any::<bool>()).prop_map(|(s, p, o, g, literal)| {
        let object: Term = if literal {
            Literal::from(o as i64).into()
        } else {
            ex(&format!("n{}", o)).into()
        };
        let triple = Triple::new(ex(&format!("n{}", s)), ex(&format!("p{}", p)), object);
        if g == 0 {
            triple
        } else {
            triple.in_graph(ex(&format!("g{}", g)))
        }
    })
}

proptest! {
    #[test]
    fn prop_insert_then_delete_restores_matches(
        existing in prop::collection::vec(arb_triple(), 0..30),
        extra in arb_triple(),
    ) {
        let mut store = QuadStore::new();
        for t in &existing {
            store.insert(t);
        }
        let already_present = store.contains(&extra);
        let pattern = QuadPattern::new()
            .with_subject(Term::from(extra.subject.clone()))
            .with_predicate(extra.predicate.clone());
        let before: HashSet<Triple> = store.match_pattern(&pattern).collect();

        store.insert(&extra);
        if !already_present {
            store.delete(&extra);
        }

        let after: HashSet<Triple> = store.match_pattern(&pattern).collect();
        prop_assert_eq!(before, after);
        prop_assert!(store.validate().is_ok());
    }

    #[test]
    fn prop_store_is_a_set(triples in prop::collection::vec(arb_triple(), 0..40)) {
        let store: QuadStore = triples.iter().cloned().collect();
        let distinct: HashSet<Triple> = triples.into_iter().collect();
        prop_assert_eq!(store.len(), distinct.len());
        let stored: HashSet<Triple> = store.iter().collect();
        prop_assert_eq!(stored, distinct);
    }
}
