//! Oracle boundary
//!
//! An [`Oracle`] turns a prompt into text. The engine only ever sees
//! `Result<String, OracleError>`; timeouts are applied on this side of the
//! boundary so a slow backend looks exactly like a failed one.

use crate::error::OracleError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Text generator behind every synthesis
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Generate a completion for `prompt`
    ///
    /// # Errors
    /// Returns [`OracleError`] when the backend fails
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;

    /// Backend name for logs
    fn name(&self) -> &str {
        "oracle"
    }
}

/// Oracle backed by a synchronous closure
///
/// Useful for deterministic backends and for embedding applications that
/// already own an HTTP client.
pub struct FnOracle {
    name: String,
    generate: Arc<dyn Fn(&str) -> Result<String, OracleError> + Send + Sync>,
}

impl FnOracle {
    /// Oracle named `name` answering with `generate`
    pub fn new<F>(name: impl Into<String>, generate: F) -> Self
    where
        F: Fn(&str) -> Result<String, OracleError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            generate: Arc::new(generate),
        }
    }
}

impl fmt::Debug for FnOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOracle").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Oracle for FnOracle {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        (self.generate)(prompt)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Call `oracle` under `timeout`, treating blank output as a failure
///
/// # Errors
/// Returns [`OracleError::Timeout`] when `timeout` elapses,
/// [`OracleError::Empty`] for whitespace-only output, otherwise whatever the
/// backend returned
pub async fn generate_within(
    oracle: &dyn Oracle,
    prompt: &str,
    timeout: Duration,
) -> Result<String, OracleError> {
    let text = tokio::time::timeout(timeout, oracle.generate(prompt))
        .await
        .map_err(|_| OracleError::Timeout(timeout))??;
    if text.trim().is_empty() {
        return Err(OracleError::Empty);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sleepy;

    #[async_trait]
    impl Oracle for Sleepy {
        async fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("def f():\n    return 1\n".into())
        }
    }

    #[tokio::test]
    async fn timeout_maps_to_oracle_failure() {
        let err = generate_within(&Sleepy, "p", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err, OracleError::Timeout(Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn blank_output_is_empty() {
        let oracle = FnOracle::new("blank", |_| Ok("  \n".into()));
        let err = generate_within(&oracle, "p", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, OracleError::Empty);
    }

    #[tokio::test]
    async fn closure_oracle_sees_prompt() {
        let oracle = FnOracle::new("echo", |p| Ok(p.to_uppercase()));
        assert_eq!(oracle.name(), "echo");
        let text = generate_within(&oracle, "abc", Duration::from_secs(1)).await.unwrap();
        assert_eq!(text, "ABC");
    }
}
