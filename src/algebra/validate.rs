//! Attribute-resolvability checking.
//!
//! Every qualified attribute reference in a tree must resolve to a
//! Relation reachable beneath the node making the reference; correlated
//! references inside a subquery tree may also resolve against the scope of
//! the node whose predicate holds the subquery. The check runs on the
//! input tree before the pipeline starts (failure is fatal) and on every
//! rewritten tree before it is accepted (failure aborts only that
//! rewrite).
//!
//! Unqualified names cannot be attributed to a relation without a schema
//! catalog, which this crate deliberately does not have; they pass the
//! check and the rules treat them conservatively instead.

use super::AlgebraNode;
use std::collections::HashSet;
use std::fmt;

/// A qualified attribute reference with no reachable relation. The tree
/// holding it is not semantically valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedAttribute {
    pub attr: String,
    pub node: &'static str,
}

impl fmt::Display for UnresolvedAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attribute {} on {} node resolves to no relation beneath it",
            self.attr, self.node
        )
    }
}

impl std::error::Error for UnresolvedAttribute {}

pub fn check_resolvable(root: &AlgebraNode<'_>) -> Result<(), UnresolvedAttribute> {
    let outer = HashSet::new();
    check_node(root, &outer)
}

fn check_node<'a>(
    node: &'a AlgebraNode<'a>,
    outer: &HashSet<&'a str>,
) -> Result<(), UnresolvedAttribute> {
    let mut scope = node.aliases_under();
    scope.extend(outer.iter().copied());

    for attr in node.own_attrs() {
        if let Some(relation) = attr.relation {
            if !scope.contains(relation) {
                return Err(UnresolvedAttribute {
                    attr: attr.to_string(),
                    node: node.kind_name(),
                });
            }
        }
    }

    // Subquery trees see this node's scope, which is what lets their
    // correlation predicates reference outer relations.
    for subquery in node.predicate_subqueries() {
        check_node(subquery, &scope)?;
    }

    for child in node.inputs() {
        check_node(child, outer)?;
    }
    Ok(())
}
