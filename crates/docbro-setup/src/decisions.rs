//! Critical install decisions and their persisted log
//!
//! Each decision is recorded before the operator is asked, then resolved in
//! place. On resume a resolved decision is reused instead of asked again.

use crate::error::{Result, SetupError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docbro_core::store::{self, load_json, save_json, StateStore, DECISIONS_NAMESPACE};
use docbro_core::types::InstallPhase;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Times the resolver is asked before the default option is taken
pub const MAX_DECISION_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOption {
    pub id: String,
    pub label: String,
}

impl DecisionOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// One recorded decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision_id: String,
    pub phase: InstallPhase,
    pub title: String,
    pub options: Vec<DecisionOption>,
    pub default_option: String,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_choice: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(
        decision_id: impl Into<String>,
        phase: InstallPhase,
        title: impl Into<String>,
        options: Vec<DecisionOption>,
        default_option: impl Into<String>,
    ) -> Self {
        Self {
            decision_id: decision_id.into(),
            phase,
            title: title.into(),
            options,
            default_option: default_option.into(),
            resolved: false,
            user_choice: None,
            timestamp: Utc::now(),
        }
    }

    pub fn has_option(&self, choice: &str) -> bool {
        self.options.iter().any(|o| o.id == choice)
    }
}

/// All decisions of one installation, persisted at `decisions/<id>`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionLog {
    pub installation_id: String,
    pub decisions: Vec<DecisionRecord>,
}

impl DecisionLog {
    pub fn new(installation_id: impl Into<String>) -> Self {
        Self {
            installation_id: installation_id.into(),
            decisions: Vec::new(),
        }
    }

    fn key(installation_id: &str) -> String {
        store::key(DECISIONS_NAMESPACE, installation_id)
    }

    /// Load the log, or start an empty one
    pub fn load(store: &dyn StateStore, installation_id: &str) -> Result<Self> {
        Ok(load_json(store, &Self::key(installation_id))?
            .unwrap_or_else(|| Self::new(installation_id)))
    }

    pub fn save(&self, store: &dyn StateStore) -> Result<()> {
        save_json(store, &Self::key(&self.installation_id), self)?;
        Ok(())
    }

    pub fn get(&self, decision_id: &str) -> Option<&DecisionRecord> {
        self.decisions.iter().find(|d| d.decision_id == decision_id)
    }

    /// Add a decision, replacing an unresolved one with the same id
    pub fn record(&mut self, decision: DecisionRecord) {
        match self
            .decisions
            .iter_mut()
            .find(|d| d.decision_id == decision.decision_id)
        {
            Some(existing) if !existing.resolved => *existing = decision,
            Some(_) => {}
            None => self.decisions.push(decision),
        }
    }

    /// Resolve a recorded decision in place
    pub fn submit_decision(&mut self, decision_id: &str, choice: &str) -> Result<()> {
        let record = self
            .decisions
            .iter_mut()
            .find(|d| d.decision_id == decision_id)
            .ok_or_else(|| SetupError::UnknownDecision {
                decision_id: decision_id.to_string(),
            })?;
        if !record.has_option(choice) {
            return Err(SetupError::InvalidChoice {
                decision_id: decision_id.to_string(),
                choice: choice.to_string(),
            });
        }
        record.resolved = true;
        record.user_choice = Some(choice.to_string());
        record.timestamp = Utc::now();
        Ok(())
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.decisions.iter().filter(|d| !d.resolved)
    }
}

/// Answers decisions; `None` means no answer this time
#[async_trait]
pub trait DecisionResolver: Send + Sync {
    async fn resolve(&self, decision: &DecisionRecord) -> Option<String>;
}

/// Always takes the default option
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

#[async_trait]
impl DecisionResolver for DefaultResolver {
    async fn resolve(&self, decision: &DecisionRecord) -> Option<String> {
        Some(decision.default_option.clone())
    }
}

/// Record a decision, ask the resolver a bounded number of times, persist the answer
///
/// Falls back to the default option when no valid answer arrives.
pub async fn decide(
    log: &mut DecisionLog,
    store: &dyn StateStore,
    resolver: &dyn DecisionResolver,
    decision: DecisionRecord,
) -> Result<String> {
    if let Some(choice) = log
        .get(&decision.decision_id)
        .filter(|d| d.resolved)
        .and_then(|d| d.user_choice.clone())
    {
        info!(decision = %decision.decision_id, %choice, "reusing recorded decision");
        return Ok(choice);
    }

    let decision_id = decision.decision_id.clone();
    let default_option = decision.default_option.clone();
    log.record(decision.clone());
    log.save(store)?;

    let mut chosen = None;
    for attempt in 1..=MAX_DECISION_ATTEMPTS {
        match resolver.resolve(&decision).await {
            Some(choice) if decision.has_option(&choice) => {
                chosen = Some(choice);
                break;
            }
            Some(choice) => warn!(
                decision = %decision_id,
                attempt,
                "'{}' is not one of the offered options",
                choice
            ),
            None => warn!(decision = %decision_id, attempt, "no answer"),
        }
    }
    let choice = chosen.unwrap_or_else(|| {
        warn!(decision = %decision_id, "using default option '{}'", default_option);
        default_option
    });

    log.submit_decision(&decision_id, &choice)?;
    log.save(store)?;
    info!(decision = %decision_id, %choice, "decision resolved");
    Ok(choice)
}
