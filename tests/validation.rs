use pipeline_parser::model::{Edge, EdgeEndpoints, Node, Pipeline};
use pipeline_parser::validation::{PipelineValidator, ValidationError};
use serde_json::json;

fn pipeline(nodes: &[&str], edges: &[(&str, &str)]) -> Pipeline {
    Pipeline {
        nodes: nodes.iter().map(|id| Node::new(*id)).collect(),
        edges: edges.iter().map(|(s, t)| Edge::new(*s, *t)).collect(),
    }
}

fn pair(source: &str, target: &str) -> (String, String) {
    (source.to_string(), target.to_string())
}

#[test]
fn linear_pipeline_is_a_dag() {
    let report = PipelineValidator::new()
        .validate(&pipeline(&["A", "B", "C"], &[("A", "B"), ("B", "C")]))
        .unwrap();

    assert_eq!(report.num_nodes, 3);
    assert_eq!(report.num_edges, 2);
    assert!(report.is_dag);
    assert!(report.cycle_path.is_empty());
}

#[test]
fn triangle_reports_all_three_edges() {
    let report = PipelineValidator::new()
        .validate(&pipeline(
            &["A", "B", "C"],
            &[("A", "B"), ("B", "C"), ("C", "A")],
        ))
        .unwrap();

    assert!(!report.is_dag);
    assert_eq!(
        report.cycle_path,
        vec![pair("A", "B"), pair("B", "C"), pair("C", "A")]
    );
}

#[test]
fn pipelines_without_edges_are_always_dags() {
    for count in [0usize, 1, 5, 50] {
        let ids: Vec<String> = (0..count).map(|i| format!("n{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let report = PipelineValidator::new()
            .validate(&pipeline(&refs, &[]))
            .unwrap();
        assert_eq!(report.num_nodes, count);
        assert_eq!(report.num_edges, 0);
        assert!(report.is_dag);
        assert!(report.cycle_path.is_empty());
    }
}

#[test]
fn self_loop_is_never_a_dag() {
    let report = PipelineValidator::new()
        .validate(&pipeline(&["A", "B"], &[("A", "B"), ("B", "B")]))
        .unwrap();
    assert!(!report.is_dag);
    assert_eq!(report.cycle_path, vec![pair("B", "B")]);
}

#[test]
fn duplicate_ids_win_over_dangling_edges() {
    let err = PipelineValidator::new()
        .validate(&pipeline(&["A", "A", "B", "B", "A"], &[("A", "Z")]))
        .unwrap_err();
    assert_eq!(
        err,
        ValidationError::DuplicateNodeIds {
            ids: vec!["A".to_string(), "B".to_string()]
        }
    );
    assert_eq!(err.to_string(), "Duplicate node IDs found");
}

#[test]
fn every_dangling_edge_is_reported() {
    let err = PipelineValidator::new()
        .validate(&pipeline(
            &["A", "B"],
            &[("A", "Z"), ("A", "B"), ("Y", "B"), ("X", "W")],
        ))
        .unwrap_err();

    let ValidationError::InvalidEdges { edges } = &err else {
        panic!("expected invalid edges, got {err:?}");
    };
    let listed: Vec<(&str, &str)> = edges
        .iter()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect();
    assert_eq!(listed, vec![("A", "Z"), ("Y", "B"), ("X", "W")]);
    assert_eq!(
        err.to_string(),
        "Invalid edges found: edges refer to nonexistent nodes"
    );
}

#[test]
fn single_node_with_edge_to_missing_node() {
    let err = PipelineValidator::new()
        .validate(&pipeline(&["A"], &[("A", "Z")]))
        .unwrap_err();
    assert_eq!(
        err,
        ValidationError::InvalidEdges {
            edges: vec![EdgeEndpoints {
                source: "A".into(),
                target: "Z".into()
            }]
        }
    );
}

#[test]
fn parallel_edges_are_counted_separately() {
    let report = PipelineValidator::new()
        .validate(&pipeline(&["A", "B"], &[("A", "B"), ("A", "B"), ("A", "B")]))
        .unwrap();
    assert_eq!(report.num_edges, 3);
    assert!(report.is_dag);
}

#[test]
fn optional_fields_do_not_affect_the_result() {
    let decorated: Pipeline = serde_json::from_value(json!({
        "nodes": [
            {"id": "in", "type": "customInput", "data": {"label": "Input", "nested": {"x": 1}}},
            {"id": "llm", "type": "llm"},
            {"id": "out"}
        ],
        "edges": [
            {"source": "in", "target": "llm", "type": "smoothstep"},
            {"source": "llm", "target": "out"}
        ]
    }))
    .unwrap();
    let plain = pipeline(&["in", "llm", "out"], &[("in", "llm"), ("llm", "out")]);

    let validator = PipelineValidator::new();
    assert_eq!(
        validator.validate(&decorated).unwrap(),
        validator.validate(&plain).unwrap()
    );
}

#[test]
fn validation_is_idempotent_and_leaves_input_untouched() {
    let input = pipeline(
        &["A", "B", "C", "D"],
        &[("A", "B"), ("B", "C"), ("C", "B"), ("C", "D")],
    );
    let before = input.clone();
    let validator = PipelineValidator::new();

    let first = validator.validate(&input);
    let second = validator.validate(&input);

    assert_eq!(first, second);
    assert_eq!(input, before);
    let report = first.unwrap();
    assert_eq!(report.cycle_path, vec![pair("B", "C"), pair("C", "B")]);
}

#[test]
fn cycle_witness_is_a_closed_walk() {
    let report = PipelineValidator::new()
        .validate(&pipeline(
            &["s", "a", "b", "c", "d", "t"],
            &[
                ("s", "a"),
                ("a", "b"),
                ("b", "t"),
                ("b", "c"),
                ("c", "d"),
                ("d", "a"),
            ],
        ))
        .unwrap();

    let cycle = report.cycle_path;
    assert!(!cycle.is_empty());
    for window in cycle.windows(2) {
        assert_eq!(window[0].1, window[1].0);
    }
    assert_eq!(cycle.last().unwrap().1, cycle.first().unwrap().0);
    assert_eq!(cycle.len(), 4);
}

#[test]
fn heavily_repeated_ids_are_listed_once_in_first_seen_order() {
    let ids: Vec<String> = (0..50_000).map(|i| format!("node-{i}")).collect();
    let mut nodes: Vec<Node> = ids.iter().map(|id| Node::new(id.as_str())).collect();
    // Every id submitted three times, the repeats in reverse order.
    for id in ids.iter().rev().chain(ids.iter()) {
        nodes.push(Node::new(id.as_str()));
    }
    let input = Pipeline {
        nodes,
        edges: Vec::new(),
    };

    let started = std::time::Instant::now();
    let err = PipelineValidator::new().validate(&input).unwrap_err();
    let elapsed = started.elapsed();

    let ValidationError::DuplicateNodeIds { ids: reported } = err else {
        panic!("expected duplicate ids");
    };
    let expected: Vec<String> = ids.iter().rev().cloned().collect();
    assert_eq!(reported, expected);
    assert!(
        elapsed < std::time::Duration::from_secs(5),
        "duplicate check took {elapsed:?}"
    );
}
