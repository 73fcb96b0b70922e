use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub edition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub result: String,
    pub error: String,
}

impl ExecutionOutcome {
    pub fn succeeded(stdout: String, stderr: String) -> Self {
        Self {
            success: true,
            result: stdout,
            error: stderr,
        }
    }

    /// Non-zero exit: stderr is appended to whatever stdout was produced.
    pub fn exited_with_failure(stdout: String, stderr: String) -> Self {
        let mut result = stdout;
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(&stderr);
        Self {
            success: false,
            result,
            error: stderr,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            result: message.clone(),
            error: message,
        }
    }

    pub fn timed_out(deadline: Duration) -> Self {
        Self::failure(format!(
            "Execution timeout ({} seconds)",
            deadline.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ExecutionOutcome, ExecutionRequest};

    #[test]
    fn failed_exit_joins_stdout_and_stderr() {
        let outcome =
            ExecutionOutcome::exited_with_failure("partial".to_string(), "panicked".to_string());
        assert!(!outcome.success);
        assert_eq!(outcome.result, "partial\npanicked");
        assert_eq!(outcome.error, "panicked");

        let outcome = ExecutionOutcome::exited_with_failure(String::new(), "error[E0425]".into());
        assert_eq!(outcome.result, "error[E0425]");
    }

    #[test]
    fn timeout_message_names_the_deadline() {
        let outcome = ExecutionOutcome::timed_out(Duration::from_secs(10));
        assert_eq!(outcome.result, "Execution timeout (10 seconds)");
        assert_eq!(outcome.error, outcome.result);
        assert!(!outcome.success);
    }

    #[test]
    fn request_tolerates_missing_and_unknown_fields() {
        let request: ExecutionRequest =
            serde_json::from_str(r#"{"code":"fn main() {}","optimize":"0"}"#).unwrap();
        assert_eq!(request.code, "fn main() {}");
        assert!(request.version.is_empty());
        assert!(request.edition.is_empty());
    }
}
