//! Prerequisite tool checks
//!
//! Availability comes from `which`, versions from the tool's own
//! `--version` output, compared with `semver`.

use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v?(\d+\.\d+(?:\.\d+)?)").expect("version regex is valid"));

/// A tool to check
#[derive(Debug, Clone)]
pub struct ToolRequirement {
    pub command: String,
    pub version_args: Vec<String>,
    pub min_version: Option<String>,
}

impl ToolRequirement {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            version_args: vec!["--version".to_string()],
            min_version: None,
        }
    }

    pub fn min_version(mut self, version: impl Into<String>) -> Self {
        self.min_version = Some(version.into());
        self
    }
}

/// Outcome of a tool check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ToolState {
    Available,
    Missing,
    VersionTooOld { found: String, required: String },
    CheckFailed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub command: String,
    pub state: ToolState,
    pub version: Option<String>,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        self.state == ToolState::Available
    }
}

/// Runs availability and version checks with a per-check timeout
#[derive(Debug, Clone)]
pub struct ToolCheck {
    timeout: Duration,
}

impl Default for ToolCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCheck {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Check all tools concurrently
    pub async fn check_all(&self, tools: &[ToolRequirement]) -> Vec<ToolStatus> {
        join_all(tools.iter().map(|t| self.check(t))).await
    }

    pub async fn check(&self, tool: &ToolRequirement) -> ToolStatus {
        if which::which(&tool.command).is_err() {
            return ToolStatus {
                command: tool.command.clone(),
                state: ToolState::Missing,
                version: None,
            };
        }

        let version = match self.get_version(tool).await {
            Ok(version) => version,
            Err(error) => {
                return ToolStatus {
                    command: tool.command.clone(),
                    state: ToolState::CheckFailed { error },
                    version: None,
                }
            }
        };

        let state = match (&version, &tool.min_version) {
            (Some(found), Some(required)) if !version_satisfies(found, required) => {
                ToolState::VersionTooOld {
                    found: found.clone(),
                    required: required.clone(),
                }
            }
            _ => ToolState::Available,
        };

        ToolStatus {
            command: tool.command.clone(),
            state,
            version,
        }
    }

    async fn get_version(&self, tool: &ToolRequirement) -> Result<Option<String>, String> {
        let result = tokio::time::timeout(self.timeout, async {
            Command::new(&tool.command)
                .args(&tool.version_args)
                .kill_on_drop(true)
                .output()
                .await
        })
        .await;

        match result {
            Ok(Ok(output)) => {
                let text = if output.stdout.is_empty() {
                    String::from_utf8_lossy(&output.stderr).into_owned()
                } else {
                    String::from_utf8_lossy(&output.stdout).into_owned()
                };
                Ok(parse_version(&text))
            }
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "{} did not report a version within {}s",
                tool.command,
                self.timeout.as_secs()
            )),
        }
    }
}

/// Extract the first version-looking token, e.g. `Python 3.13.1` -> `3.13.1`
pub fn parse_version(text: &str) -> Option<String> {
    VERSION_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn normalize(version: &str) -> Option<semver::Version> {
    let trimmed = version.trim().trim_start_matches('v');
    let padded = match trimmed.matches('.').count() {
        0 => format!("{}.0.0", trimmed),
        1 => format!("{}.0", trimmed),
        _ => trimmed.to_string(),
    };
    semver::Version::parse(&padded).ok()
}

/// Whether `actual >= required`; unparsable versions are accepted
pub fn version_satisfies(actual: &str, required: &str) -> bool {
    match (normalize(actual), normalize(required)) {
        (Some(actual), Some(required)) => actual >= required,
        _ => true,
    }
}
