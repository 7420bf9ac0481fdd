//! Per-dialect render plans.
//!
//! Conditions only ever test the dialect, so each dialect's path through a
//! template is fully known at compile time. A plan is that path flattened:
//! literal SQL (column types and boolean literals already substituted) and
//! the argument markers in the exact order they will bind.

use std::collections::HashSet;

use lexlib_types::Dialect;

use super::parse::Node;
use super::TemplateError;
use crate::typemap::{bool_literal, column_type};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Sql(String),
    Scalar(String),
    List(String),
    Now,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Plan {
    pub(crate) segments: Vec<Segment>,
}

impl Plan {
    /// Flattens `nodes` for `dialect`, rejecting any argument declared twice
    /// on the same path.
    pub(crate) fn build(nodes: &[Node], dialect: Dialect) -> Result<Self, TemplateError> {
        let mut builder = PlanBuilder {
            dialect,
            segments: Vec::new(),
            declared: HashSet::new(),
        };
        builder.walk(nodes)?;
        Ok(Self {
            segments: builder.segments,
        })
    }
}

struct PlanBuilder {
    dialect: Dialect,
    segments: Vec<Segment>,
    declared: HashSet<String>,
}

impl PlanBuilder {
    fn walk(&mut self, nodes: &[Node]) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Sql(text) => self.sql(text),
                Node::Arg { name, list } => {
                    if !self.declared.insert(name.clone()) {
                        return Err(TemplateError::DuplicateArgument {
                            name: name.clone(),
                            dialect: self.dialect,
                        });
                    }
                    self.segments.push(if *list {
                        Segment::List(name.clone())
                    } else {
                        Segment::Scalar(name.clone())
                    });
                }
                Node::Bool(value) => {
                    let literal = bool_literal(*value, self.dialect);
                    self.sql(literal);
                }
                Node::Now => self.segments.push(Segment::Now),
                Node::DialectName => {
                    let name = self.dialect.name();
                    self.sql(name);
                }
                Node::Column(kind) => {
                    let fragment = column_type(*kind, self.dialect);
                    self.sql(&fragment);
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let dialect = self.dialect;
                    let chosen = branches
                        .iter()
                        .find(|(cond, _)| cond.holds(dialect))
                        .map_or(otherwise.as_slice(), |(_, body)| body.as_slice());
                    self.walk(chosen)?;
                }
            }
        }
        Ok(())
    }

    fn sql(&mut self, text: &str) {
        if let Some(Segment::Sql(last)) = self.segments.last_mut() {
            last.push_str(text);
        } else {
            self.segments.push(Segment::Sql(text.to_string()));
        }
    }
}

/// Distinct argument names across every branch, in source order.
pub(crate) fn argument_names(nodes: &[Node]) -> Vec<String> {
    fn collect(nodes: &[Node], names: &mut Vec<String>) {
        for node in nodes {
            match node {
                Node::Arg { name, .. } => {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    for (_, body) in branches {
                        collect(body, names);
                    }
                    collect(otherwise, names);
                }
                _ => {}
            }
        }
    }

    let mut names = Vec::new();
    collect(nodes, &mut names);
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::parse::parse;

    #[test]
    fn plan_substitutes_static_fragments() {
        let nodes = parse("create table t (a {{int}}, b {{bool}} default {{FALSE}})")
            .expect("should parse");
        let plan = Plan::build(&nodes, Dialect::Postgres).expect("should build");
        assert_eq!(
            plan.segments,
            vec![Segment::Sql(
                "create table t (a bigint, b boolean default false)".to_string()
            )]
        );
    }

    #[test]
    fn exclusive_branches_may_share_a_name() {
        let nodes = parse(
            r#"{{if sqlite}}a = {{arg "x"}}{{else}}b = {{arg "x"}}{{end}}"#,
        )
        .expect("should parse");
        for dialect in Dialect::ALL {
            Plan::build(&nodes, dialect).expect("one declaration per path");
        }
        assert_eq!(argument_names(&nodes), vec!["x".to_string()]);
    }

    #[test]
    fn duplicate_on_one_path_is_rejected_for_that_dialect() {
        let nodes = parse(r#"{{arg "x"}}{{if mysql}}, {{arg "x"}}{{end}}"#).expect("should parse");
        Plan::build(&nodes, Dialect::Sqlite).expect("sqlite path declares x once");
        assert_eq!(
            Plan::build(&nodes, Dialect::Mysql).expect_err("mysql path declares x twice"),
            TemplateError::DuplicateArgument {
                name: "x".to_string(),
                dialect: Dialect::Mysql
            }
        );
    }

    #[test]
    fn names_follow_first_occurrence() {
        let nodes = parse(
            r#"{{arg "b"}} {{if postgres}}{{args "a"}}{{else}}{{arg "c"}}{{end}} {{arg "d"}}"#,
        )
        .expect("should parse");
        assert_eq!(argument_names(&nodes), vec!["b", "a", "c", "d"]);
    }
}
