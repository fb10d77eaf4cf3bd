pub mod config;
pub mod doctor;
pub mod smoke;

use serde::Serialize;
use tokio::runtime::Runtime;

pub const EXIT_OK: u8 = 0;
pub const EXIT_CHECK_FAILED: u8 = 1;
pub const EXIT_CONFIG_INVALID: u8 = 2;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// Status of one `doctor` or `smoke` check, and of the report as a whole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

impl CheckStatus {
    /// A report fails as soon as one check fails; skipped checks do not count against it.
    pub fn overall(statuses: impl IntoIterator<Item = CheckStatus>) -> Self {
        if statuses.into_iter().any(|status| status == CheckStatus::Fail) {
            CheckStatus::Fail
        } else {
            CheckStatus::Pass
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        }
    }
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'a str,
    error_class: &'a str,
    message: String,
}

impl CommandResult {
    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload =
            CommandOutcome { command, status: "error", error_class, message: message.into() };
        let output = serde_json::to_string(&payload).unwrap_or_else(|error| {
            format!(
                "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
                escape_json(command),
                escape_json(&error.to_string())
            )
        });
        Self { exit_code, output }
    }
}

/// Store checks run on a private current-thread runtime so commands stay synchronous.
pub(crate) fn check_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

pub(crate) fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{escape_json, CheckStatus, CommandResult, EXIT_CONFIG_INVALID};

    #[test]
    fn failure_payload_names_command_and_error_class() {
        let result =
            CommandResult::failure("config", "config_validation", "bad level", EXIT_CONFIG_INVALID);
        let payload: serde_json::Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, EXIT_CONFIG_INVALID);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert_eq!(payload["message"], "bad level");
    }

    #[test]
    fn skipped_checks_do_not_fail_a_report() {
        use CheckStatus::{Fail, Pass, Skipped};

        assert_eq!(CheckStatus::overall([Pass, Skipped]), Pass);
        assert_eq!(CheckStatus::overall([Pass, Fail, Skipped]), Fail);
        assert_eq!(CheckStatus::overall([]), Pass);
    }

    #[test]
    fn escape_json_quotes_backslashes_and_quotes() {
        assert_eq!(escape_json(r#"say "hi" \ bye"#), r#"say \"hi\" \\ bye"#);
    }
}
