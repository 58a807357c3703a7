//! Container backend contract and the Docker CLI implementation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Container as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub status: String,
}

/// Volume as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub mountpoint: Option<String>,
}

/// Container backend failures
#[derive(Error, Debug)]
pub enum ContainerError {
    /// The container or volume no longer exists
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The volume is mounted by a container
    #[error("Resource in use: {resource}: {detail}")]
    InUse { resource: String, detail: String },

    /// The daemon or the CLI binary is unavailable
    #[error("Container backend unreachable: {0}")]
    Unreachable(String),

    #[error("Command '{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

impl ContainerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound { .. })
    }

    /// Map CLI stderr to a typed error
    pub fn from_stderr(command: &str, resource: &str, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        if lower.contains("no such container")
            || lower.contains("no such volume")
            || lower.contains("not found")
        {
            ContainerError::NotFound {
                resource: resource.to_string(),
            }
        } else if lower.contains("in use") {
            ContainerError::InUse {
                resource: resource.to_string(),
                detail: stderr.trim().to_string(),
            }
        } else if lower.contains("cannot connect to the docker daemon")
            || lower.contains("is the docker daemon running")
            || lower.contains("error during connect")
        {
            ContainerError::Unreachable(stderr.trim().to_string())
        } else {
            ContainerError::CommandFailed {
                command: command.to_string(),
                stderr: stderr.trim().to_string(),
            }
        }
    }
}

/// Operations DocBro needs from a container runtime
///
/// List calls never fail: an unreachable backend yields empty lists.
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list_containers(&self) -> Vec<ContainerInfo>;

    async fn list_volumes(&self) -> Vec<VolumeInfo>;

    async fn stop(&self, id: &str, timeout: Duration) -> Result<(), ContainerError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), ContainerError>;

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), ContainerError>;

    /// Whether a running container currently mounts the volume
    async fn is_mounted(&self, volume: &str) -> Result<bool, ContainerError>;
}

/// Container backend driving the `docker` CLI
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Use a different CLI binary (e.g. `podman`)
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, ContainerError> {
        debug!("Running: {} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    ContainerError::Unreachable(format!("{} binary not found", self.binary))
                }
                _ => ContainerError::Unreachable(e.to_string()),
            })
    }

    /// Run a mutating command, mapping a non-zero exit to a typed error
    async fn run_checked(&self, args: &[&str], resource: &str) -> Result<String, ContainerError> {
        let output = self.run(args).await?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let command = format!("{} {}", self.binary, args.join(" "));
        Err(ContainerError::from_stderr(&command, resource, &stderr))
    }

    async fn list_json_lines(&self, args: &[&str]) -> Option<String> {
        match self.run(args).await {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                warn!(
                    "{} {} failed: {}",
                    self.binary,
                    args.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }
}

#[async_trait]
impl ContainerBackend for DockerCli {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn list_containers(&self) -> Vec<ContainerInfo> {
        self.list_json_lines(&["ps", "-a", "--no-trunc", "--format", "{{json .}}"])
            .await
            .map(|out| parse_container_lines(&out))
            .unwrap_or_default()
    }

    async fn list_volumes(&self) -> Vec<VolumeInfo> {
        self.list_json_lines(&["volume", "ls", "--format", "{{json .}}"])
            .await
            .map(|out| parse_volume_lines(&out))
            .unwrap_or_default()
    }

    async fn stop(&self, id: &str, timeout: Duration) -> Result<(), ContainerError> {
        let secs = timeout.as_secs().to_string();
        self.run_checked(&["stop", "-t", &secs, id], id).await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), ContainerError> {
        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(id);
        self.run_checked(&args, id).await?;
        Ok(())
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), ContainerError> {
        let mut args = vec!["volume", "rm"];
        if force {
            args.push("-f");
        }
        args.push(name);
        self.run_checked(&args, name).await?;
        Ok(())
    }

    async fn is_mounted(&self, volume: &str) -> Result<bool, ContainerError> {
        let filter = format!("volume={}", volume);
        let stdout = self
            .run_checked(&["ps", "-q", "--filter", &filter], volume)
            .await?;
        Ok(stdout.lines().any(|l| !l.trim().is_empty()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    names: String,
    #[serde(default)]
    labels: String,
    #[serde(default)]
    state: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VolumeLine {
    name: String,
    #[serde(default)]
    labels: String,
    #[serde(default)]
    mountpoint: String,
}

/// Parse docker's `k=v,k2=v2` label format
pub fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}

/// Parse `docker ps --format '{{json .}}'` output; bad lines are skipped
pub fn parse_container_lines(output: &str) -> Vec<ContainerInfo> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<PsLine>(line) {
            Ok(ps) => Some(ContainerInfo {
                id: ps.id,
                name: ps.names.split(',').next().unwrap_or_default().to_string(),
                labels: parse_labels(&ps.labels),
                status: ps.state,
            }),
            Err(e) => {
                debug!("skipping unparsable container line: {}", e);
                None
            }
        })
        .collect()
}

/// Parse `docker volume ls --format '{{json .}}'` output
pub fn parse_volume_lines(output: &str) -> Vec<VolumeInfo> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<VolumeLine>(line) {
            Ok(v) => Some(VolumeInfo {
                name: v.name,
                labels: parse_labels(&v.labels),
                mountpoint: Some(v.mountpoint).filter(|m| !m.is_empty()),
            }),
            Err(e) => {
                debug!("skipping unparsable volume line: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        let labels = parse_labels("com.docbro.managed=true,tier=,flag");
        assert_eq!(labels["com.docbro.managed"], "true");
        assert_eq!(labels["tier"], "");
        assert_eq!(labels["flag"], "");
        assert!(parse_labels("").is_empty());
    }

    #[test]
    fn test_parse_container_lines() {
        let out = r#"{"ID":"abc123","Names":"docbro-qdrant","Labels":"com.docbro.managed=true","State":"running"}
not json
{"ID":"def456","Names":"postgres","Labels":"","State":"exited"}
"#;
        let containers = parse_container_lines(out);
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "docbro-qdrant");
        assert_eq!(containers[0].status, "running");
        assert!(containers[1].labels.is_empty());
    }

    #[test]
    fn test_parse_volume_lines() {
        let out = r#"{"Name":"docbro_data","Labels":"","Mountpoint":"/var/lib/docker/volumes/docbro_data/_data","Driver":"local"}
{"Name":"docbro_shared","Labels":"com.docbro.external=true","Mountpoint":""}"#;
        let volumes = parse_volume_lines(out);
        assert_eq!(volumes.len(), 2);
        assert_eq!(
            volumes[0].mountpoint.as_deref(),
            Some("/var/lib/docker/volumes/docbro_data/_data")
        );
        assert!(volumes[1].mountpoint.is_none());
        assert_eq!(volumes[1].labels["com.docbro.external"], "true");
    }

    #[test]
    fn test_error_from_stderr() {
        assert!(ContainerError::from_stderr("docker rm x", "x", "Error: No such container: x")
            .is_not_found());
        assert!(matches!(
            ContainerError::from_stderr(
                "docker volume rm v",
                "v",
                "Error response from daemon: remove v: volume is in use - [abc]"
            ),
            ContainerError::InUse { .. }
        ));
        assert!(matches!(
            ContainerError::from_stderr(
                "docker ps",
                "",
                "Cannot connect to the Docker daemon at unix:///var/run/docker.sock"
            ),
            ContainerError::Unreachable(_)
        ));
        assert!(matches!(
            ContainerError::from_stderr("docker rm x", "x", "boom"),
            ContainerError::CommandFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_yields_empty_lists() {
        let cli = DockerCli::with_binary("docbro-no-such-binary-for-tests");
        assert!(cli.list_containers().await.is_empty());
        assert!(cli.list_volumes().await.is_empty());
        assert!(matches!(
            cli.stop("abc", Duration::from_secs(1)).await,
            Err(ContainerError::Unreachable(_))
        ));
    }
}
