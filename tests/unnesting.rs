//! Integration tests for subquery unnesting through the full pipeline.

use bumpalo::Bump;
use relopt::{
    AlgebraNode, Attr, CmpOp, Optimizer, OptimizerConfig, OutputColumn, Predicate, Scalar,
    StepKind,
};

/// Subquery for `SELECT t.y FROM T t WHERE t.z = o.w`, correlated to an
/// outer relation aliased `o`.
fn correlated_subquery(arena: &Bump) -> &AlgebraNode<'_> {
    let rel = AlgebraNode::relation(arena, "T", "t");
    let correlation = Predicate::eq_attrs(
        arena,
        Attr::qualified("t", "z"),
        Attr::qualified("o", "w"),
    );
    let filtered = AlgebraNode::selection(arena, rel, correlation);
    AlgebraNode::projection(
        arena,
        filtered,
        &[OutputColumn::Attr(Attr::qualified("t", "y"))],
    )
}

mod semijoin_tests {
    use super::*;

    #[test]
    fn test_in_subquery_becomes_semijoin() {
        let arena = Bump::new();
        // SELECT * FROM Outer o WHERE o.x IN (SELECT t.y FROM T t WHERE t.z = o.w)
        let outer = AlgebraNode::relation(&arena, "Outer", "o");
        let pred = Predicate::in_subquery(
            &arena,
            Attr::qualified("o", "x"),
            correlated_subquery(&arena),
            false,
        );
        let tree = AlgebraNode::selection(&arena, outer, pred);

        let out = Optimizer::default().optimize(tree, &arena).unwrap();

        let expected = "\
⋉ [t.z = o.w]
  Outer AS o
  π [t.y]
    T AS t";
        assert_eq!(out.root.to_string(), expected);
    }

    #[test]
    fn test_not_exists_becomes_antijoin() {
        let arena = Bump::new();
        let outer = AlgebraNode::relation(&arena, "Outer", "o");
        let pred = Predicate::exists(&arena, correlated_subquery(&arena), true);
        let tree = AlgebraNode::selection(&arena, outer, pred);

        let out = Optimizer::default().optimize(tree, &arena).unwrap();

        let AlgebraNode::AntiJoin(aj) = out.root else {
            panic!("expected an antijoin, got:\n{}", out.root);
        };
        assert_eq!(aj.predicate.to_string(), "t.z = o.w");
    }

    #[test]
    fn test_subquery_local_filter_survives_on_inner_side() {
        let arena = Bump::new();
        // WHERE t.z = o.w AND t.kind = 'x' in the subquery: the local
        // filter stays inside the inner tree after the correlation is
        // spliced out
        let rel = AlgebraNode::relation(&arena, "T", "t");
        let correlation = Predicate::eq_attrs(
            &arena,
            Attr::qualified("t", "z"),
            Attr::qualified("o", "w"),
        );
        let local = Predicate::compare(
            &arena,
            Scalar::Attr(Attr::qualified("t", "kind")),
            CmpOp::Eq,
            Scalar::Literal("'x'"),
        );
        let both = Predicate::and(&arena, &[correlation, local]);
        let filtered = AlgebraNode::selection(&arena, rel, both);
        let subquery = AlgebraNode::projection(
            &arena,
            filtered,
            &[OutputColumn::Attr(Attr::qualified("t", "y"))],
        );

        let outer = AlgebraNode::relation(&arena, "Outer", "o");
        let pred = Predicate::in_subquery(&arena, Attr::qualified("o", "x"), subquery, false);
        let tree = AlgebraNode::selection(&arena, outer, pred);

        let out = Optimizer::default().optimize(tree, &arena).unwrap();

        let AlgebraNode::SemiJoin(sj) = out.root else {
            panic!("expected a semijoin, got:\n{}", out.root);
        };
        assert_eq!(sj.predicate.to_string(), "t.z = o.w");
        let inner_text = sj.inner.to_string();
        assert!(
            inner_text.contains("t.kind = 'x'"),
            "local filter missing from inner tree:\n{}",
            inner_text
        );
    }
}

mod unsupported_shape_tests {
    use super::*;

    #[test]
    fn test_uncorrelated_in_is_left_nested_and_flagged() {
        let arena = Bump::new();
        let rel = AlgebraNode::relation(&arena, "T", "t");
        let subquery = AlgebraNode::projection(
            &arena,
            rel,
            &[OutputColumn::Attr(Attr::qualified("t", "y"))],
        );
        let outer = AlgebraNode::relation(&arena, "Outer", "o");
        let pred = Predicate::in_subquery(&arena, Attr::qualified("o", "x"), subquery, false);
        let tree = AlgebraNode::selection(&arena, outer, pred);

        let out = Optimizer::default().optimize(tree, &arena).unwrap();

        assert!(matches!(out.root, AlgebraNode::Selection(_)));
        let skip = out
            .trace
            .steps()
            .iter()
            .find(|s| s.kind == StepKind::Skipped)
            .expect("a skipped-shape note should be in the trace");
        assert!(skip.description.contains("unsupported shape"));
    }

    #[test]
    fn test_unnesting_disabled_by_config() {
        let arena = Bump::new();
        let outer = AlgebraNode::relation(&arena, "Outer", "o");
        let pred = Predicate::in_subquery(
            &arena,
            Attr::qualified("o", "x"),
            correlated_subquery(&arena),
            false,
        );
        let tree = AlgebraNode::selection(&arena, outer, pred);

        let optimizer = Optimizer::new(OptimizerConfig {
            unnesting_enabled: false,
            emit_trace: true,
        });
        let out = optimizer.optimize(tree, &arena).unwrap();
        assert!(matches!(out.root, AlgebraNode::Selection(_)));
    }
}
