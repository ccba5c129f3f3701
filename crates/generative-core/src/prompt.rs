//! Prompt assembly
//!
//! Every generation prompt embeds [`GENERATION_RULES`] and the delimiter
//! example; the validator strips the delimiters back out of the answer.

use generative_artifact::{CallContext, Value};
use generative_sandbox::clean::{BEGIN_MARKER, END_MARKER};
use std::fmt::Write;

/// Constraints every generated function must honor
pub const GENERATION_RULES: &str = "\
- Write only Python code.
- Write exactly one function.
- Keep the same number of parameters as the original function.
- Do not write comments.
- Do not write any explanation.
- Do not write a header.
- Do not write code outside the function.
- Do not call the function itself.
- Do not use decorators.
- Do not print anything.
- Do not repeat yourself.
- Only call functions from the list of available functions or builtins.
- Do not write anything before ### BEGIN FUNCTION ### or after ### END FUNCTION ###.
- Stop generating after ### END FUNCTION ###.
- Do not write malicious or destructive code.";

/// Which kind of unit the oracle is asked for
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationShape {
    /// Rewrite (or repair) an existing unit
    Repair {
        /// Source of the unit being replaced
        source: String,
        /// Error text captured from a failed run
        failure: Option<String>,
    },
    /// Produce a zero-argument unit for a missing attribute
    Materialize {
        /// Normalized attribute name
        name: String,
        /// Keyword arguments the attribute was requested with
        kwargs: CallContext,
    },
}

/// Everything needed to render one generation prompt
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    shape: GenerationShape,
    context: Vec<(String, String)>,
}

impl GenerationRequest {
    /// Replace `source` using the harvested `context`
    #[must_use]
    pub fn repair(source: impl Into<String>, context: Vec<(String, String)>) -> Self {
        Self {
            shape: GenerationShape::Repair {
                source: source.into(),
                failure: None,
            },
            context,
        }
    }

    /// Materialize attribute `name` requested with `kwargs`
    #[must_use]
    pub fn materialize(
        name: impl Into<String>,
        kwargs: CallContext,
        context: Vec<(String, String)>,
    ) -> Self {
        Self {
            shape: GenerationShape::Materialize {
                name: name.into(),
                kwargs,
            },
            context,
        }
    }

    /// Attach the error text of a failed run (repair shape only)
    #[must_use]
    pub fn with_failure(mut self, failure: impl Into<String>) -> Self {
        if let GenerationShape::Repair { failure: slot, .. } = &mut self.shape {
            *slot = Some(failure.into());
        }
        self
    }

    /// What the oracle is asked to produce
    #[inline]
    #[must_use]
    pub fn shape(&self) -> &GenerationShape {
        &self.shape
    }

    /// Harvested `(name, source)` helpers
    #[inline]
    #[must_use]
    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    /// Render the full prompt text
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        match &self.shape {
            GenerationShape::Repair { source, failure } => {
                out.push_str(
                    "The given source code is potentially broken. \
                     Please rewrite the function using the available functions.\n\n",
                );
                push_rules(&mut out);
                let _ = write!(out, "\nAvailable functions: {}\n", render_context(&self.context));
                let _ = write!(out, "\nSource code:\n{source}\n");
                if let Some(failure) = failure {
                    let _ = write!(
                        out,
                        "\nThe original function failed with the following error:\n{failure}\n"
                    );
                }
            }
            GenerationShape::Materialize { name, kwargs } => {
                let _ = write!(
                    out,
                    "Generate a function named: {name} that takes no parameters \
                     and uses the following keyword arguments as its inputs: {}\n\n",
                    kwargs.kwargs_repr()
                );
                push_rules(&mut out);
                let _ = write!(out, "\nAvailable functions: {}\n", render_context(&self.context));
            }
        }
        out
    }
}

fn push_rules(out: &mut String) {
    out.push_str("Rules:\n");
    out.push_str(GENERATION_RULES);
    let _ = write!(
        out,
        "\n\nDon't:\nHere is the function you asked for:\n{BEGIN_MARKER}\ndef func(a, b):\n    return a + b\n{END_MARKER}\nLet me know if you need anything else.\n\
         \nDo:\n{BEGIN_MARKER}\ndef func(a, b):\n    return a + b\n{END_MARKER}\n"
    );
}

/// Harvested context as a list of `(name, source)` tuples
#[must_use]
pub fn render_context(context: &[(String, String)]) -> String {
    Value::List(
        context
            .iter()
            .map(|(name, source)| {
                Value::Tuple(vec![Value::Str(name.clone()), Value::Str(source.clone())])
            })
            .collect(),
    )
    .repr()
}

/// Critic prompt: interpret `code` on `input` and answer true or false
#[must_use]
pub fn semantic_check(code: &str, input: &str, context: &str) -> String {
    format!(
        "You are a Python interpreter. Trace the execution of the code below \
         step by step for the given input, using the available functions as context.\n\
         Answer only with true if the code runs without errors and does what its name \
         and parameters suggest, otherwise answer only with false.\n\n\
         Available functions: {context}\n\n\
         Code:\n{code}\n\n\
         Input: {input}\n\n\
         is_semantically_correct(code, input, context) ="
    )
}

/// Explain prompt for a captured failure
#[must_use]
pub fn stack_trace(trace: &str) -> String {
    format!(
        "Explain the following stack trace:\n{trace}\n\n\
         Human-readable summary:\n\n\
         Suggestions for how to fix the error:\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Vec<(String, String)> {
        vec![("sub".into(), "def sub(a, b):\n    return a - b\n".into())]
    }

    #[test]
    fn repair_prompt_carries_rules_source_and_context() {
        let prompt = GenerationRequest::repair("def add(a, b):\n    return sum([a, b])\n", context())
            .render();
        assert!(prompt.contains("potentially broken"));
        assert!(prompt.contains(GENERATION_RULES));
        assert!(prompt.contains("def add(a, b):"));
        assert!(prompt.contains("[('sub', 'def sub(a, b):\\n    return a - b\\n')]"));
        assert!(!prompt.contains("failed with the following error"));
    }

    #[test]
    fn failure_text_is_embedded() {
        let prompt = GenerationRequest::repair("def f(a):\n    return 1 / a\n", Vec::new())
            .with_failure("ZeroDivisionError: division by zero")
            .render();
        assert!(prompt.contains("ZeroDivisionError: division by zero"));
        assert!(prompt.contains("Available functions: []"));
    }

    #[test]
    fn materialize_prompt_names_kwargs() {
        let kwargs = CallContext::keywords([("modes", "study")]);
        let request = GenerationRequest::materialize("save_custom_mode", kwargs, Vec::new())
            .with_failure("ignored");
        let prompt = request.render();
        assert!(prompt.contains("Generate a function named: save_custom_mode"));
        assert!(prompt.contains("{'modes': 'study'}"));
        assert!(!prompt.contains("ignored"));
    }

    #[test]
    fn auxiliary_prompts() {
        let check = semantic_check("def f(): return 1", "()", "[]");
        assert!(check.contains("def f(): return 1"));
        assert!(check.ends_with("is_semantically_correct(code, input, context) ="));

        let explain = stack_trace("ValueError: bad");
        assert!(explain.starts_with("Explain the following stack trace:\nValueError: bad"));
        assert!(explain.contains("Suggestions for how to fix the error:"));
    }
}
