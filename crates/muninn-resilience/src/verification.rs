//! Constraint extraction and REPL-backed verification.
//!
//! Pulls `@requires`/`@ensures`/`@invariant` annotations, type hints, and
//! `assert` statements out of source text, renders them as a small Python
//! program that declares `z3` variables and constraints, runs it through a
//! `muninn-repl` supervisor, and parses the printed JSON result into a
//! [`Verdict`].

use std::sync::Arc;
use std::time::Duration;

use muninn_repl::{CancellationToken, ReplSupervisor};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ResilienceError, Result};

pub const DEFAULT_SOLVER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Requires,
    Ensures,
    Invariant,
    Assertion,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    /// The constraint's boolean expression, in Python syntax.
    pub expr: String,
}

/// A variable referenced by the constraints, with its inferred Z3 sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDecl {
    pub name: String,
    pub sort: VariableSort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableSort {
    Int,
    Real,
    Bool,
}

impl VariableSort {
    fn from_annotation(annotation: &str) -> Option<Self> {
        match annotation {
            "int" => Some(VariableSort::Int),
            "float" => Some(VariableSort::Real),
            "bool" => Some(VariableSort::Bool),
            _ => None,
        }
    }

    fn z3_constructor(&self) -> &'static str {
        match self {
            VariableSort::Int => "Int",
            VariableSort::Real => "Real",
            VariableSort::Bool => "Bool",
        }
    }
}

/// The solver's answer for a constraint set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Satisfied,
    Violated,
    Unknown,
    Timeout,
    Error,
}

#[derive(Debug, Clone, Deserialize)]
struct SolverOutput {
    verdict: String,
    #[serde(default)]
    counter_example: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub verdict: Verdict,
    pub counter_example: Option<serde_json::Value>,
    pub message: Option<String>,
}

/// Extracts preconditions/postconditions/invariants/assertions from `source`.
/// Annotations are matched regardless of surrounding docstring quoting;
/// `assert` statements are picked up wherever they appear.
pub fn extract_constraints(source: &str) -> Vec<Constraint> {
    let annotation_re =
        Regex::new(r"(?m)@(requires|ensures|invariant)\(([^)]*)\)").expect("valid regex");
    let assert_re = Regex::new(r"(?m)^\s*assert\s+(.+?)\s*(?:,.*)?$").expect("valid regex");

    let mut constraints = Vec::new();
    for caps in annotation_re.captures_iter(source) {
        let kind = match &caps[1] {
            "requires" => ConstraintKind::Requires,
            "ensures" => ConstraintKind::Ensures,
            "invariant" => ConstraintKind::Invariant,
            _ => unreachable!("regex only matches the three alternatives above"),
        };
        constraints.push(Constraint {
            kind,
            expr: normalize_expr(caps[2].trim()),
        });
    }
    for caps in assert_re.captures_iter(source) {
        constraints.push(Constraint {
            kind: ConstraintKind::Assertion,
            expr: normalize_expr(caps[1].trim()),
        });
    }
    constraints
}

/// Rewrites a handful of non-Python boolean operators into Python's, so
/// constraints lifted from other-language docstrings still parse.
fn normalize_expr(expr: &str) -> String {
    expr.replace("&&", " and ").replace("||", " or ").replace("!=", " != ")
}

/// Extracts `name: type` annotations (`int`/`float`/`bool`) from `source`.
pub fn extract_variables(source: &str) -> Vec<VariableDecl> {
    let annotation_re = Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*:\s*(int|float|bool)\b")
        .expect("valid regex");
    let mut seen = std::collections::HashSet::new();
    let mut vars = Vec::new();
    for caps in annotation_re.captures_iter(source) {
        let name = caps[1].to_string();
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(sort) = VariableSort::from_annotation(&caps[2]) {
            vars.push(VariableDecl { name, sort });
        }
    }
    vars
}

/// Renders a Z3-backed Python program that declares `variables`, adds every
/// constraint in `constraints`, and prints a JSON verdict to stdout.
pub fn render_solver_program(variables: &[VariableDecl], constraints: &[Constraint]) -> String {
    let mut lines = vec![
        "import json".to_string(),
        "from z3 import Solver, Int, Real, Bool, sat, unsat, unknown".to_string(),
        "s = Solver()".to_string(),
    ];

    for var in variables {
        lines.push(format!("{} = {}('{}')", var.name, var.sort.z3_constructor(), var.name));
    }
    for constraint in constraints {
        lines.push(format!("s.add({})", constraint.expr));
    }

    lines.push("result = s.check()".to_string());
    lines.push("if result == sat:".to_string());
    lines.push("    model = s.model()".to_string());
    lines.push(
        "    payload = {'verdict': 'satisfied', 'counter_example': {str(d): str(model[d]) for d in model}}"
            .to_string(),
    );
    lines.push("elif result == unsat:".to_string());
    lines.push("    payload = {'verdict': 'violated', 'counter_example': None}".to_string());
    lines.push("else:".to_string());
    lines.push("    payload = {'verdict': 'unknown', 'counter_example': None}".to_string());
    lines.push("print(json.dumps(payload))".to_string());

    lines.join("\n")
}

fn parse_verdict(raw: &str) -> Verdict {
    match raw {
        "satisfied" => Verdict::Satisfied,
        "violated" => Verdict::Violated,
        "timeout" => Verdict::Timeout,
        "error" => Verdict::Error,
        _ => Verdict::Unknown,
    }
}

/// Runs the generated solver program through `supervisor` under a default
/// 30-second timeout, parsing the printed JSON line into a verdict.
pub async fn verify(
    supervisor: Arc<ReplSupervisor>,
    source: &str,
    cancel: CancellationToken,
) -> Result<VerificationResult> {
    verify_with_timeout(supervisor, source, cancel, DEFAULT_SOLVER_TIMEOUT).await
}

pub async fn verify_with_timeout(
    supervisor: Arc<ReplSupervisor>,
    source: &str,
    cancel: CancellationToken,
    solver_timeout: Duration,
) -> Result<VerificationResult> {
    let constraints = extract_constraints(source);
    let variables = extract_variables(source);
    let program = render_solver_program(&variables, &constraints);

    let outcome = match tokio::time::timeout(solver_timeout, supervisor.execute(cancel, &program)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => return Err(ResilienceError::from(e)),
        Err(_) => {
            return Ok(VerificationResult {
                verdict: Verdict::Timeout,
                counter_example: None,
                message: Some(format!("solver call exceeded {:?}", solver_timeout)),
            });
        }
    };

    if let Some(error_repr) = outcome.error_repr {
        return Ok(VerificationResult {
            verdict: Verdict::Error,
            counter_example: None,
            message: Some(error_repr),
        });
    }

    let json_line = outcome
        .output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("");
    let parsed: SolverOutput = serde_json::from_str(json_line)
        .map_err(|e| ResilienceError::Verification(format!("unparseable solver output: {e}")))?;

    Ok(VerificationResult {
        verdict: parse_verdict(&parsed.verdict),
        counter_example: parsed.counter_example,
        message: parsed.message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_requires_ensures_invariant() {
        let source = r#"
def withdraw(balance: int, amount: int) -> int:
    """
    @requires(amount > 0)
    @requires(amount <= balance)
    @ensures(result >= 0)
    @invariant(balance >= 0)
    """
    return balance - amount
"#;
        let constraints = extract_constraints(source);
        assert_eq!(constraints.len(), 4);
        assert!(constraints.iter().any(|c| c.kind == ConstraintKind::Requires && c.expr == "amount > 0"));
        assert!(constraints.iter().any(|c| c.kind == ConstraintKind::Ensures));
        assert!(constraints.iter().any(|c| c.kind == ConstraintKind::Invariant));
    }

    #[test]
    fn extracts_assert_statements() {
        let source = "def f(x: int):\n    assert x > 0\n    assert x != 5, 'no five'\n";
        let constraints = extract_constraints(source);
        let asserts: Vec<_> = constraints.iter().filter(|c| c.kind == ConstraintKind::Assertion).collect();
        assert_eq!(asserts.len(), 2);
        assert_eq!(asserts[0].expr, "x > 0");
        assert!(asserts[1].expr.starts_with("x"));
    }

    #[test]
    fn normalizes_non_python_operators() {
        let source = "def f(x: int):\n    assert x > 0 && x < 10\n";
        let constraints = extract_constraints(source);
        assert!(constraints[0].expr.contains(" and "));
    }

    #[test]
    fn extracts_typed_variables_deduplicated() {
        let source = "def f(balance: int, amount: int, active: bool):\n    pass\n";
        let vars = extract_variables(source);
        assert_eq!(vars.len(), 3);
        assert!(vars.iter().any(|v| v.name == "balance" && v.sort == VariableSort::Int));
        assert!(vars.iter().any(|v| v.name == "active" && v.sort == VariableSort::Bool));
    }

    #[test]
    fn render_includes_declarations_and_constraints() {
        let variables = vec![VariableDecl { name: "x".to_string(), sort: VariableSort::Int }];
        let constraints = vec![Constraint { kind: ConstraintKind::Requires, expr: "x > 0".to_string() }];
        let program = render_solver_program(&variables, &constraints);
        assert!(program.contains("x = Int('x')"));
        assert!(program.contains("s.add(x > 0)"));
        assert!(program.contains("json.dumps(payload)"));
    }

    #[test]
    fn parses_satisfied_verdict_with_counter_example() {
        let raw = r#"{"verdict": "satisfied", "counter_example": {"x": "5"}}"#;
        let parsed: SolverOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(parse_verdict(&parsed.verdict), Verdict::Satisfied);
        assert!(parsed.counter_example.is_some());
    }
}
