//! In-memory model of an ffmpeg `-filter_complex` graph.
//!
//! Statements are typed (ordered inputs, a chain of ops, ordered outputs)
//! and the graph enforces its invariants structurally at insertion time:
//! labels are unique, every consumed label was produced by an earlier
//! statement, and no label is consumed twice. Escaping happens only when
//! the graph is serialized.

use std::collections::HashSet;
use std::fmt;

use anyhow::{bail, Result};

use crate::escape::{escape_expr, escape_filter_path, escape_text};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(String);

impl Label {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// A filter parameter value, tagged with how it must be embedded.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Numbers and engine expressions that contain no delimiters.
    Literal(String),
    /// A file path: quoted, slashes normalized, `:` and `'` escaped.
    Path(String),
    /// Free text: quoted, `\` then `:` then `'` escaped.
    Text(String),
    /// A generated per-pixel expression: quoted, `\` `:` `,` escaped.
    Expr(String),
}

impl ParamValue {
    pub fn lit(value: impl fmt::Display) -> Self {
        Self::Literal(value.to_string())
    }

    fn render(&self) -> String {
        match self {
            Self::Literal(raw) => raw.clone(),
            Self::Path(path) => format!("'{}'", escape_filter_path(path)),
            Self::Text(text) => format!("'{}'", escape_text(text)),
            Self::Expr(expr) => format!("'{}'", escape_expr(expr)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterOp {
    name: String,
    params: Vec<(Option<String>, ParamValue)>,
}

impl FilterOp {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.params.push((Some(key.into()), value));
        self
    }

    /// Positional parameter (no `key=` prefix).
    pub fn pos(mut self, value: ParamValue) -> Self {
        self.params.push((None, value));
        self
    }

    pub fn render(&self) -> String {
        if self.params.is_empty() {
            return self.name.clone();
        }
        let params = self
            .params
            .iter()
            .map(|(key, value)| match key {
                Some(key) => format!("{key}={}", value.render()),
                None => value.render(),
            })
            .collect::<Vec<_>>()
            .join(":");
        format!("{}={params}", self.name)
    }
}

/// One chain statement: `[in..]op,op,..[out..]`.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    inputs: Vec<Label>,
    ops: Vec<FilterOp>,
    outputs: Vec<Label>,
}

impl Statement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, label: Label) -> Self {
        self.inputs.push(label);
        self
    }

    pub fn op(mut self, op: FilterOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn output(mut self, label: Label) -> Self {
        self.outputs.push(label);
        self
    }

    fn render(&self) -> String {
        let inputs = self.inputs.iter().map(Label::to_string).collect::<String>();
        let ops = self
            .ops
            .iter()
            .map(FilterOp::render)
            .collect::<Vec<_>>()
            .join(",");
        let outputs = self
            .outputs
            .iter()
            .map(Label::to_string)
            .collect::<String>();
        format!("{inputs}{ops}{outputs}")
    }
}

#[derive(Debug, Default)]
pub struct FilterGraph {
    statements: Vec<Statement>,
    produced: HashSet<String>,
    consumed: HashSet<String>,
    next_id: u32,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an externally produced stream (e.g. `0:v`, `1:a`) so
    /// statements may consume it.
    pub fn source(&mut self, name: &str) -> Label {
        self.produced.insert(name.to_owned());
        Label(name.to_owned())
    }

    /// Allocate a fresh label. One monotonic counter backs every prefix,
    /// so labels are unique across the whole compile.
    pub fn fresh(&mut self, prefix: &str) -> Label {
        let label = Label(format!("{prefix}{}", self.next_id));
        self.next_id += 1;
        label
    }

    /// Append a statement, checking the DAG invariants: inputs must exist
    /// and be unconsumed, outputs must be new labels.
    pub fn push(&mut self, statement: Statement) -> Result<()> {
        if statement.ops.is_empty() {
            bail!("filter statement has no operations");
        }
        for input in &statement.inputs {
            if !self.produced.contains(input.name()) {
                bail!("label '{}' consumed before it is produced", input.name());
            }
            if self.consumed.contains(input.name()) {
                bail!("label '{}' consumed twice", input.name());
            }
        }
        for output in &statement.outputs {
            if self.produced.contains(output.name()) {
                bail!("label '{}' produced twice", output.name());
            }
        }

        for input in &statement.inputs {
            self.consumed.insert(input.name().to_owned());
        }
        for output in &statement.outputs {
            self.produced.insert(output.name().to_owned());
        }
        self.statements.push(statement);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn is_consumed(&self, label: &Label) -> bool {
        self.consumed.contains(label.name())
    }

    /// Serialize to the `-filter_complex` argument.
    pub fn render(&self) -> String {
        self.statements
            .iter()
            .map(Statement::render)
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterGraph, FilterOp, ParamValue, Statement};

    #[test]
    fn statements_render_with_labels_and_params() {
        let mut graph = FilterGraph::new();
        let base = graph.source("0:v");
        let out = graph.fresh("v");
        graph
            .push(
                Statement::new()
                    .input(base)
                    .op(
                        FilterOp::new("scale")
                            .param("w", ParamValue::lit(1920))
                            .param("h", ParamValue::lit(1080)),
                    )
                    .op(FilterOp::new("hflip"))
                    .output(out),
            )
            .expect("statement should insert");

        assert_eq!(graph.render(), "[0:v]scale=w=1920:h=1080,hflip[v0]");
    }

    #[test]
    fn positional_params_render_without_key() {
        let op = FilterOp::new("rotate")
            .pos(ParamValue::lit("1.57"))
            .param("fillcolor", ParamValue::lit("black"));
        let mut graph = FilterGraph::new();
        let base = graph.source("0:v");
        let out = graph.fresh("v");
        graph
            .push(Statement::new().input(base).op(op).output(out))
            .expect("statement should insert");
        assert_eq!(graph.render(), "[0:v]rotate=1.57:fillcolor=black[v0]");
    }

    #[test]
    fn forward_references_are_rejected() {
        let mut graph = FilterGraph::new();
        let ghost = graph.fresh("v");
        let out = graph.fresh("v");
        let result = graph.push(
            Statement::new()
                .input(ghost)
                .op(FilterOp::new("null"))
                .output(out),
        );
        assert!(result.is_err(), "consuming an unproduced label should fail");
    }

    #[test]
    fn duplicate_output_labels_are_rejected() {
        let mut graph = FilterGraph::new();
        let base = graph.source("0:v");
        let out = graph.fresh("v");
        graph
            .push(
                Statement::new()
                    .input(base)
                    .op(FilterOp::new("null"))
                    .output(out.clone()),
            )
            .expect("first statement should insert");

        let result = graph.push(Statement::new().op(FilterOp::new("null")).output(out));
        assert!(result.is_err(), "a label may only be produced once");
    }

    #[test]
    fn double_consumption_is_rejected() {
        let mut graph = FilterGraph::new();
        let base = graph.source("0:v");
        let first = graph.fresh("v");
        let second = graph.fresh("v");
        graph
            .push(
                Statement::new()
                    .input(base.clone())
                    .op(FilterOp::new("null"))
                    .output(first),
            )
            .expect("first statement should insert");

        let result = graph.push(
            Statement::new()
                .input(base)
                .op(FilterOp::new("null"))
                .output(second),
        );
        assert!(result.is_err(), "single-consumer edges must be enforced");
    }

    #[test]
    fn labels_are_unique_across_prefixes() {
        let mut graph = FilterGraph::new();
        let a = graph.fresh("v");
        let b = graph.fresh("as");
        let c = graph.fresh("v");
        assert_eq!(a.name(), "v0");
        assert_eq!(b.name(), "as1");
        assert_eq!(c.name(), "v2");
    }

    #[test]
    fn quoted_params_escape_at_serialization() {
        let mut graph = FilterGraph::new();
        let out = graph.fresh("img");
        graph
            .push(
                Statement::new()
                    .op(
                        FilterOp::new("movie")
                            .pos(ParamValue::Path("C:\\media\\it's.png".to_owned()))
                            .param("loop", ParamValue::lit(0)),
                    )
                    .output(out),
            )
            .expect("statement should insert");
        assert_eq!(graph.render(), r"movie='C\:/media/it\'s.png':loop=0[img0]");
    }
}
