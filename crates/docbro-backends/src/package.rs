//! Package manager probe for the installed `docbro` tool

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Probe and remove the application package
///
/// Both calls answer `false` on timeout or a missing binary; they never error.
#[async_trait]
pub trait PackageManager: Send + Sync {
    fn name(&self) -> &'static str;

    async fn is_installed(&self, package: &str) -> bool;

    async fn uninstall(&self, package: &str) -> bool;
}

/// Python tool installer driving the package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageTool {
    Uv,
    Pipx,
}

impl PackageTool {
    pub fn binary(&self) -> &'static str {
        match self {
            PackageTool::Uv => "uv",
            PackageTool::Pipx => "pipx",
        }
    }

    fn list_args(&self) -> &'static [&'static str] {
        match self {
            PackageTool::Uv => &["tool", "list"],
            PackageTool::Pipx => &["list", "--short"],
        }
    }

    fn uninstall_args<'a>(&self, package: &'a str) -> Vec<&'a str> {
        match self {
            PackageTool::Uv => vec!["tool", "uninstall", package],
            PackageTool::Pipx => vec!["uninstall", package],
        }
    }
}

/// Package manager backed by `uv tool` or `pipx` subprocesses
#[derive(Debug, Clone)]
pub struct CliPackageManager {
    tool: PackageTool,
    timeout: Duration,
}

impl CliPackageManager {
    pub fn new(tool: PackageTool, timeout: Duration) -> Self {
        Self { tool, timeout }
    }

    /// Prefer `uv` when present on PATH, otherwise `pipx`
    pub fn detect(timeout: Duration) -> Self {
        let tool = if which::which("uv").is_ok() {
            PackageTool::Uv
        } else {
            PackageTool::Pipx
        };
        Self::new(tool, timeout)
    }

    pub fn tool(&self) -> PackageTool {
        self.tool
    }

    /// Run the tool with a bounded timeout; `None` on timeout or spawn failure
    async fn run(&self, args: &[&str]) -> Option<std::process::Output> {
        let binary = self.tool.binary();
        debug!("Running: {} {}", binary, args.join(" "));
        let child = Command::new(binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => Some(output),
            Ok(Err(e)) => {
                warn!("{} could not be run: {}", binary, e);
                None
            }
            Err(_) => {
                warn!(
                    "{} {} timed out after {}s",
                    binary,
                    args.join(" "),
                    self.timeout.as_secs()
                );
                None
            }
        }
    }
}

#[async_trait]
impl PackageManager for CliPackageManager {
    fn name(&self) -> &'static str {
        self.tool.binary()
    }

    async fn is_installed(&self, package: &str) -> bool {
        match self.run(self.tool.list_args()).await {
            Some(output) if output.status.success() => {
                listing_contains(&String::from_utf8_lossy(&output.stdout), package)
            }
            _ => false,
        }
    }

    async fn uninstall(&self, package: &str) -> bool {
        match self.run(&self.tool.uninstall_args(package)).await {
            Some(output) if output.status.success() => true,
            Some(output) => {
                warn!(
                    "{} uninstall {} failed: {}",
                    self.tool.binary(),
                    package,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            None => false,
        }
    }
}

/// Whether a `uv tool list` / `pipx list --short` listing names the package
pub fn listing_contains(listing: &str, package: &str) -> bool {
    listing.lines().any(|line| {
        line.split_whitespace()
            .next()
            .is_some_and(|first| first.eq_ignore_ascii_case(package))
    })
}
