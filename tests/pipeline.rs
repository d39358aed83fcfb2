//! End-to-end pipeline tests over canonical trees the parsing front-end
//! would produce.

use bumpalo::Bump;
use relopt::{
    AggregateCall, AggregateFunc, AlgebraNode, Attr, CmpOp, Optimizer, OptimizerConfig,
    OutputColumn, Predicate, Scalar, SortKey,
};

/// Canonical tree for:
///
/// ```sql
/// SELECT d.name, COUNT(*) AS cnt
/// FROM Dept d, Emp e
/// WHERE e.salary > 50000 AND e.dept_id = d.id AND d.region = 'West'
/// GROUP BY d.name
/// HAVING cnt > 2
/// ORDER BY d.name ASC
/// ```
///
/// Cross product, stacked WHERE conjuncts, grouping, the HAVING filter as
/// a Selection above it, final projection, order.
fn report_query(arena: &Bump) -> &AlgebraNode<'_> {
    let dept = AlgebraNode::relation(arena, "Dept", "d");
    let emp = AlgebraNode::relation(arena, "Emp", "e");
    let cross = AlgebraNode::cross(arena, dept, emp);

    let salary = Predicate::compare(
        arena,
        Scalar::Attr(Attr::qualified("e", "salary")),
        CmpOp::Gt,
        Scalar::Literal("50000"),
    );
    let join_pred = Predicate::eq_attrs(
        arena,
        Attr::qualified("e", "dept_id"),
        Attr::qualified("d", "id"),
    );
    let region = Predicate::compare(
        arena,
        Scalar::Attr(Attr::qualified("d", "region")),
        CmpOp::Eq,
        Scalar::Literal("'West'"),
    );
    let filtered = AlgebraNode::selection(
        arena,
        AlgebraNode::selection(arena, AlgebraNode::selection(arena, cross, salary), join_pred),
        region,
    );

    let grouped = AlgebraNode::group_aggregate(
        arena,
        filtered,
        &[Attr::qualified("d", "name")],
        &[AggregateCall {
            func: AggregateFunc::Count,
            arg: None,
            alias: "cnt",
        }],
    );
    let having = Predicate::compare(
        arena,
        Scalar::Attr(Attr::bare("cnt")),
        CmpOp::Gt,
        Scalar::Literal("2"),
    );
    let hav_filtered = AlgebraNode::selection(arena, grouped, having);
    let projected = AlgebraNode::projection(
        arena,
        hav_filtered,
        &[
            OutputColumn::Attr(Attr::qualified("d", "name")),
            OutputColumn::Attr(Attr::bare("cnt")),
        ],
    );
    AlgebraNode::order(
        arena,
        projected,
        &[SortKey {
            attr: Attr::qualified("d", "name"),
            ascending: true,
        }],
    )
}

mod pipeline_tests {
    use super::*;

    #[test]
    fn test_report_query_full_pipeline() {
        let arena = Bump::new();
        let tree = report_query(&arena);
        let out = Optimizer::default().optimize(tree, &arena).unwrap();

        let expected = "\
τ [d.name ASC]
  π [d.name, cnt]
    σ [cnt > 2]
      γ [by: d.name | COUNT(*) AS cnt]
        ⨝ [e.dept_id = d.id]
          π [d.id, d.name]
            σ [d.region = 'West']
              Dept AS d
          π [e.dept_id]
            σ [e.salary > 50000]
              Emp AS e";
        assert_eq!(out.root.to_string(), expected);
    }

    #[test]
    fn test_pipeline_output_is_a_fixed_point() {
        let arena = Bump::new();
        let tree = report_query(&arena);
        let optimizer = Optimizer::default();

        let once = optimizer.optimize(tree, &arena).unwrap();
        let twice = optimizer.optimize(once.root, &arena).unwrap();
        assert_eq!(once.root, twice.root);
    }

    #[test]
    fn test_trace_starts_canonical_and_tracks_every_change() {
        let arena = Bump::new();
        let tree = report_query(&arena);
        let out = Optimizer::default().optimize(tree, &arena).unwrap();

        let steps = out.trace.steps();
        assert!(steps.len() > 1);
        assert_eq!(steps[0].rule, "canonical");
        assert_eq!(steps[0].root, tree);
        // the last applied snapshot is the final tree
        assert_eq!(steps.last().unwrap().root, out.root);
        // selections moved, cross product became a join
        assert!(steps.iter().any(|s| s.rule == "selection_pushdown"));
        assert!(steps.iter().any(|s| s.rule == "joinize_selections"));
    }

    #[test]
    fn test_trace_snapshots_survive_later_stages() {
        let arena = Bump::new();
        let tree = report_query(&arena);
        let out = Optimizer::default().optimize(tree, &arena).unwrap();

        // rendering an early snapshot still works after the tree has been
        // rewritten many times over
        let first = &out.trace.steps()[0];
        assert!(first.rendered_tree().contains("×"));
    }

    #[test]
    fn test_relation_set_is_preserved() {
        let arena = Bump::new();
        let tree = report_query(&arena);
        let out = Optimizer::default().optimize(tree, &arena).unwrap();

        let before = tree.aliases_under();
        let after = out.root.aliases_under();
        assert_eq!(before, after);
    }

    #[test]
    fn test_disabled_trace_still_optimizes() {
        let arena = Bump::new();
        let tree = report_query(&arena);
        let optimizer = Optimizer::new(OptimizerConfig {
            unnesting_enabled: true,
            emit_trace: false,
        });
        let out = optimizer.optimize(tree, &arena).unwrap();
        assert!(out.trace.steps().is_empty());
        assert!(matches!(out.root, AlgebraNode::Order(_)));
    }
}

mod ordering_tests {
    use super::*;

    #[test]
    fn test_three_way_join_builds_left_deep_spine() {
        let arena = Bump::new();
        // SELECT * FROM A a, B b, C c
        // WHERE b.a_id = a.id AND c.b_id = b.id AND b.kind = 'x'
        let a = AlgebraNode::relation(&arena, "A", "a");
        let b = AlgebraNode::relation(&arena, "B", "b");
        let c = AlgebraNode::relation(&arena, "C", "c");
        let cross = AlgebraNode::cross(&arena, AlgebraNode::cross(&arena, a, b), c);

        let ab = Predicate::eq_attrs(
            &arena,
            Attr::qualified("b", "a_id"),
            Attr::qualified("a", "id"),
        );
        let bc = Predicate::eq_attrs(
            &arena,
            Attr::qualified("c", "b_id"),
            Attr::qualified("b", "id"),
        );
        let kind = Predicate::compare(
            &arena,
            Scalar::Attr(Attr::qualified("b", "kind")),
            CmpOp::Eq,
            Scalar::Literal("'x'"),
        );
        let tree = AlgebraNode::selection(
            &arena,
            AlgebraNode::selection(&arena, AlgebraNode::selection(&arena, cross, ab), bc),
            kind,
        );

        let out = Optimizer::default().optimize(tree, &arena).unwrap();

        // the filtered factor leads, every join carries its equality
        let expected = "\
⨝ [c.b_id = b.id]
  ⨝ [b.a_id = a.id]
    σ [b.kind = 'x']
      B AS b
    A AS a
  C AS c";
        assert_eq!(out.root.to_string(), expected);
    }

    #[test]
    fn test_duplicate_where_conjunct_is_eliminated() {
        let arena = Bump::new();
        let rel = AlgebraNode::relation(&arena, "Dept", "d");
        let region = Predicate::compare(
            &arena,
            Scalar::Attr(Attr::qualified("d", "region")),
            CmpOp::Eq,
            Scalar::Literal("'West'"),
        );
        let again = Predicate::compare(
            &arena,
            Scalar::Attr(Attr::bare("region")),
            CmpOp::Eq,
            Scalar::Literal("'West'"),
        );
        let both = Predicate::and(&arena, &[region, again]);
        let tree = AlgebraNode::selection(&arena, rel, both);

        let out = Optimizer::default().optimize(tree, &arena).unwrap();
        let AlgebraNode::Selection(kept) = out.root else {
            panic!("one selection should survive");
        };
        assert!(matches!(kept.input, AlgebraNode::Relation(_)));
    }
}

mod aggregation_tests {
    use super::*;

    #[test]
    fn test_decomposable_aggregate_is_pushed_below_the_join() {
        let arena = Bump::new();
        // SELECT d.name, SUM(e.salary) AS total
        // FROM Dept d, Emp e WHERE e.dept_id = d.id
        // GROUP BY d.name, e.dept_id
        let dept = AlgebraNode::relation(&arena, "Dept", "d");
        let emp = AlgebraNode::relation(&arena, "Emp", "e");
        let cross = AlgebraNode::cross(&arena, dept, emp);
        let join_pred = Predicate::eq_attrs(
            &arena,
            Attr::qualified("e", "dept_id"),
            Attr::qualified("d", "id"),
        );
        let filtered = AlgebraNode::selection(&arena, cross, join_pred);
        let tree = AlgebraNode::group_aggregate(
            &arena,
            filtered,
            &[Attr::qualified("d", "name"), Attr::qualified("e", "dept_id")],
            &[AggregateCall {
                func: AggregateFunc::Sum,
                arg: Some(Attr::qualified("e", "salary")),
                alias: "total",
            }],
        );

        let out = Optimizer::default().optimize(tree, &arena).unwrap();

        let AlgebraNode::GroupAggregate(outer) = out.root else {
            panic!("combining aggregate expected at the root");
        };
        assert_eq!(outer.aggregates[0].func, AggregateFunc::Sum);
        assert_eq!(outer.aggregates[0].arg, Some(Attr::bare("part_total")));
        let AlgebraNode::Join(join) = outer.input else {
            panic!("join expected below the combiner");
        };
        assert!(
            matches!(join.left, AlgebraNode::GroupAggregate(_))
                || matches!(join.right, AlgebraNode::GroupAggregate(_)),
            "one join side should carry the partial aggregate"
        );
    }

    #[test]
    fn test_having_on_group_key_moves_below_grouping() {
        let arena = Bump::new();
        // HAVING d.name <> 'HQ' filters a grouping attribute only
        let rel = AlgebraNode::relation(&arena, "Dept", "d");
        let grouped = AlgebraNode::group_aggregate(
            &arena,
            rel,
            &[Attr::qualified("d", "name")],
            &[AggregateCall {
                func: AggregateFunc::Count,
                arg: None,
                alias: "cnt",
            }],
        );
        let having = Predicate::compare(
            &arena,
            Scalar::Attr(Attr::qualified("d", "name")),
            CmpOp::NotEq,
            Scalar::Literal("'HQ'"),
        );
        let tree = AlgebraNode::selection(&arena, grouped, having);

        let out = Optimizer::default().optimize(tree, &arena).unwrap();
        let AlgebraNode::GroupAggregate(agg) = out.root else {
            panic!("grouping should surface above the filter");
        };
        assert!(matches!(agg.input, AlgebraNode::Selection(_)));
    }
}

mod validation_tests {
    use super::*;
    use relopt::UnresolvedAttribute;

    #[test]
    fn test_unknown_alias_in_input_aborts_the_run() {
        let arena = Bump::new();
        let rel = AlgebraNode::relation(&arena, "Dept", "d");
        let pred = Predicate::eq_attrs(
            &arena,
            Attr::qualified("x", "id"),
            Attr::qualified("d", "id"),
        );
        let tree = AlgebraNode::selection(&arena, rel, pred);

        let err = Optimizer::default().optimize(tree, &arena).unwrap_err();
        let unresolved = err.downcast_ref::<UnresolvedAttribute>().unwrap();
        assert!(unresolved.to_string().contains("x.id"));
    }

    #[test]
    fn test_unqualified_attrs_are_accepted_without_schema() {
        let arena = Bump::new();
        let rel = AlgebraNode::relation(&arena, "Dept", "d");
        let pred = Predicate::compare(
            &arena,
            Scalar::Attr(Attr::bare("region")),
            CmpOp::Eq,
            Scalar::Literal("'West'"),
        );
        let tree = AlgebraNode::selection(&arena, rel, pred);

        let out = Optimizer::default().optimize(tree, &arena).unwrap();
        assert!(matches!(out.root, AlgebraNode::Selection(_)));
    }
}
