//! Critic boundary
//!
//! A critic reviews a validated candidate before it runs. Its answer is free
//! text; [`decode_verdict`] reduces it to a boolean.

use crate::error::{DecodeError, OracleError};
use crate::oracle::{generate_within, Oracle};
use crate::prompt;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("punctuation pattern"));
static VERDICT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(true|false)\b").expect("verdict pattern"));

/// Semantic reviewer of candidates
#[async_trait]
pub trait Critic: Send + Sync {
    /// Judge `candidate` for `sample_input` given the harvested `context`
    ///
    /// # Errors
    /// Returns [`OracleError`] when the backend fails
    async fn judge(
        &self,
        candidate: &str,
        sample_input: &str,
        context: &str,
    ) -> Result<String, OracleError>;
}

/// Decode a critic answer
///
/// Punctuation is dropped and the first whole-word `true` or `false`
/// (case-insensitive) decides.
///
/// # Errors
/// Returns [`DecodeError`] when neither word appears
pub fn decode_verdict(text: &str) -> Result<bool, DecodeError> {
    let cleaned = PUNCTUATION.replace_all(text, "").to_lowercase();
    match VERDICT.find(&cleaned).map(|m| m.as_str()) {
        Some("true") => Ok(true),
        Some(_) => Ok(false),
        None => Err(DecodeError(text.to_string())),
    }
}

/// Critic that asks an [`Oracle`] to act as an interpreter
#[derive(Clone)]
pub struct OracleCritic {
    oracle: Arc<dyn Oracle>,
    timeout: Duration,
}

impl OracleCritic {
    /// Critic asking `oracle` with the default critic timeout
    #[must_use]
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            timeout: Duration::from_secs(30),
        }
    }

    /// Bound each judgement by `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for OracleCritic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleCritic")
            .field("oracle", &self.oracle.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl Critic for OracleCritic {
    async fn judge(
        &self,
        candidate: &str,
        sample_input: &str,
        context: &str,
    ) -> Result<String, OracleError> {
        let prompt = prompt::semantic_check(candidate, sample_input, context);
        generate_within(self.oracle.as_ref(), &prompt, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FnOracle;
    use proptest::prelude::*;

    #[test]
    fn first_verdict_wins() {
        assert_eq!(decode_verdict("True."), Ok(true));
        assert_eq!(decode_verdict("**FALSE**"), Ok(false));
        assert_eq!(decode_verdict("false, not true"), Ok(false));
        assert_eq!(decode_verdict("It's true: no false positives"), Ok(true));
    }

    #[test]
    fn words_must_stand_alone() {
        assert!(decode_verdict("untrue falsehood").is_err());
        assert!(decode_verdict("").is_err());
    }

    #[test]
    fn punctuation_is_removed_before_matching() {
        assert_eq!(decode_verdict("'true'"), Ok(true));
        assert_eq!(decode_verdict("is_semantically_correct = false"), Ok(false));
    }

    #[tokio::test]
    async fn oracle_critic_renders_semantic_check() {
        let oracle = FnOracle::new("interp", |prompt| {
            Ok(if prompt.contains("Input: (3, 4)") { "true" } else { "false" }.to_string())
        });
        let critic = OracleCritic::new(Arc::new(oracle));
        let answer = critic
            .judge("def add(a, b):\n    return a + b\n", "(3, 4)", "[]")
            .await
            .unwrap();
        assert_eq!(decode_verdict(&answer), Ok(true));
    }

    proptest! {
        #[test]
        fn prop_verdict_survives_surrounding_prose(
            prefix in "[a-eg-su-z ]{0,20}",
            verdict in prop::bool::ANY,
            upper in prop::bool::ANY,
        ) {
            let word = if verdict { "true" } else { "false" };
            let word = if upper { word.to_uppercase() } else { word.to_string() };
            let text = format!("{prefix} {word}!");
            prop_assert_eq!(decode_verdict(&text), Ok(verdict));
        }
    }
}
