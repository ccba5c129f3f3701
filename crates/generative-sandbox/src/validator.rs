//! Validation pipeline for oracle output
//!
//! Stages run in order and short-circuit on the first failure:
//!
//! 1. textual cleanup ([`crate::clean`])
//! 2. parse check
//! 3. completeness check (pluggable [`CompletenessDetector`])
//! 4. shape check: exactly one plain top-level function
//!
//! Nothing here executes code.

use crate::clean::clean;
use crate::error::ValidationError;
use crate::language::{first_error, line_of, named_children, text_of, Language};
use generative_artifact::{Origin, SynthesizedArtifact};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use tree_sitter::Node;

static PASS_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bpass\b").expect("pass token pattern"));

/// Outcome of validating one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    /// Candidate does not parse or defines no function
    SyntaxInvalid(String),
    /// Body is only placeholders
    Incomplete(String),
    /// Not exactly one plain top-level function
    ShapeInvalid(String),
    /// Candidate is ready to run
    Accepted(SynthesizedArtifact),
}

impl ValidationVerdict {
    /// Whether the candidate passed every stage
    #[inline]
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Accepted artifact, or the stage that refused the candidate
    ///
    /// # Errors
    /// Returns the [`ValidationError`] matching a refusing verdict
    pub fn into_result(self) -> Result<SynthesizedArtifact, ValidationError> {
        match self {
            Self::Accepted(artifact) => Ok(artifact),
            Self::SyntaxInvalid(msg) => Err(ValidationError::SyntaxInvalid(msg)),
            Self::Incomplete(msg) => Err(ValidationError::Incomplete(msg)),
            Self::ShapeInvalid(msg) => Err(ValidationError::ShapeInvalid(msg)),
        }
    }
}

/// One statement of the candidate function's body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyStatement {
    /// Tree-sitter node kind (`pass_statement`, `expression_statement`, ...)
    pub kind: String,
    /// Source text of the statement
    pub text: String,
    /// Kind of the only named child, for expression statements
    pub expression: Option<String>,
}

/// What a [`CompletenessDetector`] gets to look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySummary {
    /// Entire cleaned candidate
    pub source: String,
    /// Name of the first function defined
    pub function: String,
    /// Top-level statements of that function's body
    pub statements: Vec<BodyStatement>,
}

/// Decides whether a parsed candidate is only a placeholder
pub trait CompletenessDetector: Send + Sync + Debug {
    /// Whether `body` has no real implementation
    fn is_incomplete(&self, body: &BodySummary) -> bool;
}

/// Flags bodies made only of `pass`, `...`, docstrings and
/// `raise NotImplementedError`
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderBody;

impl CompletenessDetector for PlaceholderBody {
    fn is_incomplete(&self, body: &BodySummary) -> bool {
        body.statements.iter().all(|stmt| match stmt.kind.as_str() {
            "pass_statement" => true,
            "expression_statement" => matches!(
                stmt.expression.as_deref(),
                Some("ellipsis" | "string" | "concatenated_string")
            ),
            "raise_statement" => stmt.text.contains("NotImplementedError"),
            _ => false,
        })
    }
}

/// Flags any candidate containing the word `pass`
#[derive(Debug, Clone, Copy, Default)]
pub struct PassToken;

impl CompletenessDetector for PassToken {
    fn is_incomplete(&self, body: &BodySummary) -> bool {
        PASS_TOKEN.is_match(&body.source)
    }
}

/// Serializable selector for the completeness detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletenessPolicy {
    /// [`PlaceholderBody`]
    #[default]
    Placeholder,
    /// [`PassToken`]
    PassToken,
}

impl CompletenessPolicy {
    /// Detector this selector stands for
    #[must_use]
    pub fn detector(self) -> Arc<dyn CompletenessDetector> {
        match self {
            Self::Placeholder => Arc::new(PlaceholderBody),
            Self::PassToken => Arc::new(PassToken),
        }
    }
}

/// Runs the validation stages over raw candidates
#[derive(Debug, Clone)]
pub struct Validator {
    detector: Arc<dyn CompletenessDetector>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Arc::new(PlaceholderBody))
    }
}

impl Validator {
    /// Validator flagging placeholders with `detector`
    #[must_use]
    pub fn new(detector: Arc<dyn CompletenessDetector>) -> Self {
        Self { detector }
    }

    /// Validator using the detector `policy` selects
    #[must_use]
    pub fn with_policy(policy: CompletenessPolicy) -> Self {
        Self::new(policy.detector())
    }

    /// Validate `raw` oracle (or cached, or supplied) text
    #[must_use]
    pub fn validate(&self, raw: &str, origin: Origin) -> ValidationVerdict {
        let source = clean(raw);

        let tree = match Language::Python.parse(&source) {
            Ok(tree) => tree,
            Err(e) => return ValidationVerdict::SyntaxInvalid(e.to_string()),
        };
        let root = tree.root_node();
        if let Some(bad) = first_error(root) {
            let what = if bad.is_missing() {
                format!("missing {}", bad.kind())
            } else {
                format!("unexpected '{}'", text_of(&bad, &source).trim())
            };
            return ValidationVerdict::SyntaxInvalid(format!("{what} at line {}", line_of(&bad)));
        }

        let top = named_children(&root);
        let Some(function) = top.iter().find_map(function_of) else {
            return ValidationVerdict::SyntaxInvalid("no function definition found".to_string());
        };

        let summary = summarize(&source, function);
        if self.detector.is_incomplete(&summary) {
            tracing::debug!("Candidate {} has a placeholder body", summary.function);
            return ValidationVerdict::Incomplete(format!(
                "function '{}' has no implementation",
                summary.function
            ));
        }

        if let Some(problem) = shape_problem(&top) {
            return ValidationVerdict::ShapeInvalid(problem);
        }

        ValidationVerdict::Accepted(SynthesizedArtifact::new(
            raw,
            source,
            summary.function,
            origin,
        ))
    }
}

/// The function definition a top-level node holds, decorated or not
fn function_of<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    match node.kind() {
        "function_definition" => Some(*node),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .filter(|d| d.kind() == "function_definition"),
        _ => None,
    }
}

fn summarize(source: &str, function: Node<'_>) -> BodySummary {
    let name = function
        .child_by_field_name("name")
        .map(|n| text_of(&n, source).to_string())
        .unwrap_or_default();
    let statements = function
        .child_by_field_name("body")
        .map(|body| {
            named_children(&body)
                .into_iter()
                .map(|stmt| {
                    let expression = (stmt.kind() == "expression_statement")
                        .then(|| named_children(&stmt))
                        .filter(|children| children.len() == 1)
                        .map(|children| children[0].kind().to_string());
                    BodyStatement {
                        kind: stmt.kind().to_string(),
                        text: text_of(&stmt, source).to_string(),
                        expression,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    BodySummary {
        source: source.to_string(),
        function: name,
        statements,
    }
}

fn shape_problem(top: &[Node<'_>]) -> Option<String> {
    let [only] = top else {
        return Some(format!(
            "expected exactly one top-level statement, found {}",
            top.len()
        ));
    };
    match only.kind() {
        "function_definition" => {
            let mut cursor = only.walk();
            let is_async = only
                .children(&mut cursor)
                .next()
                .is_some_and(|c| c.kind() == "async");
            is_async.then(|| "async function definitions are not accepted".to_string())
        }
        "decorated_definition" => Some("decorated function definitions are not accepted".to_string()),
        other => Some(format!("top-level {other} is not a function definition")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn validate(raw: &str) -> ValidationVerdict {
        Validator::default().validate(raw, Origin::Oracle)
    }

    #[test]
    fn accepts_single_function_and_extracts_entry_point() {
        let raw = "### BEGIN FUNCTION ###\ndef add(a, b):\n    return sum([a, b])\n### END FUNCTION ###";
        let ValidationVerdict::Accepted(artifact) = validate(raw) else {
            panic!("expected acceptance");
        };
        assert_eq!(artifact.entry_point(), "add");
        assert_eq!(artifact.source(), "def add(a, b):\n    return sum([a, b])\n");
        assert_eq!(artifact.raw(), raw);
        assert_eq!(artifact.origin(), Origin::Oracle);
    }

    #[test]
    fn non_ascii_indentation_is_rejected_not_fatal() {
        let verdict = validate(" def f():\n\u{a0}   return 1\n");
        assert!(!matches!(verdict, ValidationVerdict::Accepted(_)));
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(matches!(
            validate("def add(a, b)\n    return a + b\n"),
            ValidationVerdict::SyntaxInvalid(_)
        ));
        assert!(matches!(
            validate("x = 1\n"),
            ValidationVerdict::SyntaxInvalid(_)
        ));
        assert!(matches!(validate(""), ValidationVerdict::SyntaxInvalid(_)));
    }

    #[test]
    fn placeholder_bodies_are_incomplete() {
        for body in ["pass", "...", "\"\"\"todo\"\"\"", "raise NotImplementedError()"] {
            let raw = format!("def f(x):\n    {body}\n");
            assert!(
                matches!(validate(&raw), ValidationVerdict::Incomplete(_)),
                "{body}"
            );
        }
        let documented = "def f(x):\n    \"\"\"doc\"\"\"\n    pass\n";
        assert!(matches!(validate(documented), ValidationVerdict::Incomplete(_)));
    }

    #[test]
    fn pass_inside_real_body_is_complete_by_default() {
        let raw = "def f(xs):\n    for x in xs:\n        pass\n    return len(xs)\n";
        assert!(validate(raw).is_accepted());

        let legacy = Validator::with_policy(CompletenessPolicy::PassToken);
        assert!(matches!(
            legacy.validate(raw, Origin::Oracle),
            ValidationVerdict::Incomplete(_)
        ));
        let bypass = "def f(x):\n    return 'bypass'\n";
        assert!(legacy.validate(bypass, Origin::Oracle).is_accepted());
    }

    #[test]
    fn shape_rejects_extra_statements_and_decorators() {
        let two = "def f():\n    return 1\n\ndef g():\n    return 2\n";
        assert!(matches!(validate(two), ValidationVerdict::ShapeInvalid(_)));

        let trailing = "def f():\n    return 1\nprint(f())\n";
        assert!(matches!(validate(trailing), ValidationVerdict::ShapeInvalid(_)));

        let decorated = "@cache\ndef f():\n    return 1\n";
        assert!(matches!(validate(decorated), ValidationVerdict::ShapeInvalid(_)));

        let asynchronous = "async def f():\n    return 1\n";
        assert!(matches!(validate(asynchronous), ValidationVerdict::ShapeInvalid(_)));
    }

    #[test]
    fn self_parameter_is_removed_before_parsing() {
        let raw = "    def area(self, w, h):\n        return w * h\n";
        let artifact = validate(raw).into_result().unwrap();
        assert_eq!(artifact.source(), "def area(w, h):\n    return w * h\n");
    }

    #[test]
    fn refusals_map_to_validation_errors() {
        let err = validate("def f():\n    pass\n").into_result().unwrap_err();
        assert_eq!(err.stage(), "completeness");
    }

    #[test]
    fn completeness_policy_deserializes() {
        let policy: CompletenessPolicy = serde_json::from_str("\"pass_token\"").unwrap();
        assert_eq!(policy, CompletenessPolicy::PassToken);
    }
}
