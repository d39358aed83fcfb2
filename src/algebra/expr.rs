//! # Predicate Model
//!
//! Boolean expressions attached to Selection, Join, SemiJoin and AntiJoin
//! nodes. Predicates are built once (by the parsing front-end, through the
//! builder functions here) and never edited in place afterwards: rewrite
//! rules relocate or drop the tree nodes wrapping a predicate, they do not
//! restructure the predicate itself. The one exception is conjunct
//! decomposition, which replaces a Selection holding `And([a, b, c])` with
//! a chain of three Selections, each holding one atom.
//!
//! ## Shape
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | `Compare` | `left <op> right` over attributes, literals, aggregates |
//! | `And` / `Or` | n-ary connectives |
//! | `InSubquery` | `attr [NOT] IN (<canonicalized subquery tree>)` |
//! | `Exists` | `[NOT] EXISTS (<canonicalized subquery tree>)` |
//!
//! Subqueries are held as already-canonicalized [`AlgebraNode`] trees, not
//! raw AST: the unnesting rule inspects and splices them directly.

use super::AlgebraNode;
use bumpalo::Bump;
use smallvec::SmallVec;
use std::fmt;

/// An attribute reference, optionally qualified by a relation alias.
///
/// The parsing front-end qualifies references where it can; unqualified
/// names survive only when the source text left them ambiguous, and the
/// rules treat them conservatively (they pin a Selection in place rather
/// than risk moving it across the wrong join boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attr<'a> {
    pub relation: Option<&'a str>,
    pub name: &'a str,
}

impl<'a> Attr<'a> {
    pub fn new(relation: Option<&'a str>, name: &'a str) -> Self {
        Self { relation, name }
    }

    pub fn qualified(relation: &'a str, name: &'a str) -> Self {
        Self {
            relation: Some(relation),
            name,
        }
    }

    pub fn bare(name: &'a str) -> Self {
        Self {
            relation: None,
            name,
        }
    }

    /// Equality up to alias qualification: a missing qualifier on either
    /// side matches any qualifier on the other. Used by redundant-predicate
    /// elimination, where `region = 'West'` and `d.region = 'West'` count
    /// as the same filter.
    pub fn matches(&self, other: &Attr<'a>) -> bool {
        if self.name != other.name {
            return false;
        }
        match (self.relation, other.relation) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for Attr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.relation {
            Some(rel) => write!(f, "{}.{}", rel, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }

    /// Whether a partial aggregate of this function can be combined into
    /// the final result by a second aggregation. AVG is not
    /// self-decomposable without carrying both sum and count.
    pub fn is_decomposable(&self) -> bool {
        !matches!(self, Self::Avg)
    }

    /// The function that re-aggregates partial results of `self`.
    /// COUNT partials are combined by summing; the rest combine with
    /// themselves. AVG has no combiner.
    pub fn combiner(&self) -> Option<Self> {
        match self {
            Self::Count => Some(Self::Sum),
            Self::Sum => Some(Self::Sum),
            Self::Min => Some(Self::Min),
            Self::Max => Some(Self::Max),
            Self::Avg => None,
        }
    }
}

/// An aggregate call with its output alias. `arg: None` is `COUNT(*)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateCall<'a> {
    pub func: AggregateFunc,
    pub arg: Option<Attr<'a>>,
    pub alias: &'a str,
}

impl fmt::Display for AggregateCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arg {
            Some(arg) => write!(f, "{}({}) AS {}", self.func.name(), arg, self.alias),
            None => write!(f, "{}(*) AS {}", self.func.name(), self.alias),
        }
    }
}

/// A comparison operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar<'a> {
    Attr(Attr<'a>),
    /// Literal kept as source text; the optimizer never evaluates values.
    Literal(&'a str),
    /// Aggregate result, as it appears in a HAVING predicate.
    Aggregate(AggregateCall<'a>),
}

impl fmt::Display for Scalar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Attr(a) => write!(f, "{}", a),
            Scalar::Literal(text) => write!(f, "{}", text),
            Scalar::Aggregate(call) => match call.arg {
                Some(arg) => write!(f, "{}({})", call.func.name(), arg),
                None => write!(f, "{}(*)", call.func.name()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate<'a> {
    Compare {
        left: Scalar<'a>,
        op: CmpOp,
        right: Scalar<'a>,
    },
    And(&'a [&'a Predicate<'a>]),
    Or(&'a [&'a Predicate<'a>]),
    InSubquery {
        attr: Attr<'a>,
        subquery: &'a AlgebraNode<'a>,
        negated: bool,
    },
    Exists {
        subquery: &'a AlgebraNode<'a>,
        negated: bool,
    },
}

impl<'a> Predicate<'a> {
    pub fn compare(
        arena: &'a Bump,
        left: Scalar<'a>,
        op: CmpOp,
        right: Scalar<'a>,
    ) -> &'a Predicate<'a> {
        arena.alloc(Predicate::Compare { left, op, right })
    }

    /// `left.attr = right.attr`, the shape joinization and unnesting look for.
    pub fn eq_attrs(arena: &'a Bump, left: Attr<'a>, right: Attr<'a>) -> &'a Predicate<'a> {
        Self::compare(arena, Scalar::Attr(left), CmpOp::Eq, Scalar::Attr(right))
    }

    pub fn and(arena: &'a Bump, parts: &[&'a Predicate<'a>]) -> &'a Predicate<'a> {
        arena.alloc(Predicate::And(arena.alloc_slice_copy(parts)))
    }

    pub fn or(arena: &'a Bump, parts: &[&'a Predicate<'a>]) -> &'a Predicate<'a> {
        arena.alloc(Predicate::Or(arena.alloc_slice_copy(parts)))
    }

    pub fn in_subquery(
        arena: &'a Bump,
        attr: Attr<'a>,
        subquery: &'a AlgebraNode<'a>,
        negated: bool,
    ) -> &'a Predicate<'a> {
        arena.alloc(Predicate::InSubquery {
            attr,
            subquery,
            negated,
        })
    }

    pub fn exists(
        arena: &'a Bump,
        subquery: &'a AlgebraNode<'a>,
        negated: bool,
    ) -> &'a Predicate<'a> {
        arena.alloc(Predicate::Exists { subquery, negated })
    }

    /// Flattens nested `And`s into atomic conjuncts, in source order.
    /// A non-`And` predicate is its own single conjunct.
    pub fn conjuncts(&'a self) -> SmallVec<[&'a Predicate<'a>; 8]> {
        let mut out = SmallVec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts(&'a self, out: &mut SmallVec<[&'a Predicate<'a>; 8]>) {
        match self {
            Predicate::And(parts) => {
                for part in *parts {
                    part.collect_conjuncts(out);
                }
            }
            _ => out.push(self),
        }
    }

    /// Attribute references made by this predicate itself. Does not descend
    /// into subquery trees; the subquery's own references belong to its own
    /// nodes (only the correlated ones leak out, and the unnesting rule
    /// finds those by inspecting the subquery tree directly).
    pub fn referenced_attrs(&self) -> SmallVec<[Attr<'a>; 4]> {
        let mut out = SmallVec::new();
        self.collect_attrs(&mut out);
        out
    }

    fn collect_attrs(&self, out: &mut SmallVec<[Attr<'a>; 4]>) {
        match self {
            Predicate::Compare { left, right, .. } => {
                for scalar in [left, right] {
                    match scalar {
                        Scalar::Attr(a) => out.push(*a),
                        Scalar::Aggregate(call) => {
                            if let Some(arg) = call.arg {
                                out.push(arg);
                            }
                        }
                        Scalar::Literal(_) => {}
                    }
                }
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                for part in *parts {
                    part.collect_attrs(out);
                }
            }
            Predicate::InSubquery { attr, .. } => out.push(*attr),
            Predicate::Exists { .. } => {}
        }
    }

    /// Whether any operand is an aggregate result. HAVING predicates with
    /// aggregate operands must stay above their GroupAggregate.
    pub fn references_aggregate(&self) -> bool {
        match self {
            Predicate::Compare { left, right, .. } => {
                matches!(left, Scalar::Aggregate(_)) || matches!(right, Scalar::Aggregate(_))
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().any(|p| p.references_aggregate())
            }
            Predicate::InSubquery { .. } | Predicate::Exists { .. } => false,
        }
    }

    /// Syntactic identity up to alias qualification: same shape, same
    /// operators, attribute operands compared with [`Attr::matches`].
    /// Subquery predicates compare by full tree equality.
    pub fn syntactically_equal(&self, other: &Predicate<'a>) -> bool {
        match (self, other) {
            (
                Predicate::Compare { left, op, right },
                Predicate::Compare {
                    left: ol,
                    op: oop,
                    right: or,
                },
            ) => op == oop && scalar_matches(left, ol) && scalar_matches(right, or),
            (Predicate::And(a), Predicate::And(b)) | (Predicate::Or(a), Predicate::Or(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.syntactically_equal(y))
            }
            (
                Predicate::InSubquery {
                    attr,
                    subquery,
                    negated,
                },
                Predicate::InSubquery {
                    attr: oa,
                    subquery: os,
                    negated: on,
                },
            ) => negated == on && attr.matches(oa) && subquery == os,
            (
                Predicate::Exists { subquery, negated },
                Predicate::Exists {
                    subquery: os,
                    negated: on,
                },
            ) => negated == on && subquery == os,
            _ => false,
        }
    }
}

fn scalar_matches<'a>(a: &Scalar<'a>, b: &Scalar<'a>) -> bool {
    match (a, b) {
        (Scalar::Attr(x), Scalar::Attr(y)) => x.matches(y),
        _ => a == b,
    }
}

impl fmt::Display for Predicate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { left, op, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            Predicate::And(parts) => write_joined(f, parts, " AND "),
            Predicate::Or(parts) => write_joined(f, parts, " OR "),
            Predicate::InSubquery { attr, negated, .. } => {
                write!(f, "{}{} IN (<subquery>)", attr, if *negated { " NOT" } else { "" })
            }
            Predicate::Exists { negated, .. } => {
                write!(f, "{}EXISTS (<subquery>)", if *negated { "NOT " } else { "" })
            }
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    parts: &[&Predicate<'_>],
    sep: &str,
) -> fmt::Result {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "({})", part)?;
    }
    Ok(())
}
