//! Phase-based traffic policy documents and their merge algebra.
//!
//! A [`TrafficPolicy`] holds ordered rule lists for each request lifecycle
//! phase. Merging is append-only: the left document's rules always run before
//! the right document's rules within a phase.
//!
//! The legacy `inbound`/`outbound` schema and the root level `enabled` flag are
//! accepted on input. `enabled` never takes part in phase merging, it is only
//! written back by [`TrafficPolicy::to_persisted`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub mod actions;

pub const ON_HTTP_REQUEST: &str = "on_http_request";
pub const ON_HTTP_RESPONSE: &str = "on_http_response";
pub const ON_TCP_CONNECT: &str = "on_tcp_connect";

const LEGACY_INBOUND: &str = "inbound";
const LEGACY_OUTBOUND: &str = "outbound";
const ENABLED: &str = "enabled";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("traffic policy must be a JSON object")]
    NotAnObject,
    #[error("traffic policy field `enabled` must be a boolean")]
    InvalidEnabled,
    #[error("invalid rules in phase {phase}: {source}")]
    InvalidPhase {
        phase: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid traffic policy json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    OnHttpRequest,
    OnHttpResponse,
    OnTcpConnect,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::OnTcpConnect, Phase::OnHttpRequest, Phase::OnHttpResponse];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::OnHttpRequest => ON_HTTP_REQUEST,
            Phase::OnHttpResponse => ON_HTTP_RESPONSE,
            Phase::OnTcpConnect => ON_TCP_CONNECT,
        }
    }

    fn from_key(key: &str) -> Option<Phase> {
        match key {
            ON_HTTP_REQUEST | LEGACY_INBOUND => Some(Phase::OnHttpRequest),
            ON_HTTP_RESPONSE | LEGACY_OUTBOUND => Some(Phase::OnHttpResponse),
            ON_TCP_CONNECT => Some(Phase::OnTcpConnect),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Action {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Implicitly ANDed. An empty list always matches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expressions: Vec<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Rule {
            name: Some(name.into()),
            ..Rule::default()
        }
    }

    pub fn with_expressions<I, S>(mut self, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expressions
            .extend(expressions.into_iter().map(Into::into));
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Returns a copy whose expressions are `gate` followed by the rule's own.
    pub fn gated(&self, gate: &[String]) -> Rule {
        let mut expressions = gate.to_vec();
        expressions.extend(self.expressions.iter().cloned());
        Rule {
            name: self.name.clone(),
            expressions,
            actions: self.actions.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficPolicy {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_http_request: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_http_response: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_tcp_connect: Vec<Rule>,
    /// Phases this crate does not model, passed through untouched.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
    /// Root level `enabled` from legacy documents, tracked out of band.
    #[serde(skip)]
    pub enabled: Option<bool>,
}

impl TrafficPolicy {
    pub fn new() -> Self {
        TrafficPolicy::default()
    }

    /// Parses a policy document, remapping legacy phases and stripping the
    /// root level `enabled` flag into [`TrafficPolicy::enabled`].
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let Value::Object(mut root) = value else {
            return Err(Error::NotAnObject);
        };

        let enabled = match root.remove(ENABLED) {
            None | Some(Value::Null) => None,
            Some(Value::Bool(enabled)) => Some(enabled),
            Some(_) => return Err(Error::InvalidEnabled),
        };

        let mut policy = TrafficPolicy {
            enabled,
            ..TrafficPolicy::default()
        };

        // INFO: current phase names are applied before their legacy aliases so a
        // document carrying both keeps the current rules first.
        let mut legacy = Vec::new();
        for (key, value) in root {
            match Phase::from_key(&key) {
                Some(phase) if key == phase.as_str() => policy.extend_phase(phase, &key, value)?,
                Some(phase) => legacy.push((phase, key, value)),
                None => {
                    policy.other.insert(key, value);
                }
            }
        }
        for (phase, key, value) in legacy {
            policy.extend_phase(phase, &key, value)?;
        }

        Ok(policy)
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    fn extend_phase(&mut self, phase: Phase, key: &str, value: Value) -> Result<(), Error> {
        if value.is_null() {
            return Ok(());
        }
        let rules: Vec<Rule> =
            serde_json::from_value(value).map_err(|source| Error::InvalidPhase {
                phase: key.to_owned(),
                source,
            })?;
        self.rules_mut(phase).extend(rules);
        Ok(())
    }

    pub fn rules(&self, phase: Phase) -> &[Rule] {
        match phase {
            Phase::OnHttpRequest => &self.on_http_request,
            Phase::OnHttpResponse => &self.on_http_response,
            Phase::OnTcpConnect => &self.on_tcp_connect,
        }
    }

    pub fn rules_mut(&mut self, phase: Phase) -> &mut Vec<Rule> {
        match phase {
            Phase::OnHttpRequest => &mut self.on_http_request,
            Phase::OnHttpResponse => &mut self.on_http_response,
            Phase::OnTcpConnect => &mut self.on_tcp_connect,
        }
    }

    pub fn push(&mut self, phase: Phase, rule: Rule) {
        self.rules_mut(phase).push(rule);
    }

    pub fn is_empty(&self) -> bool {
        Phase::ALL.iter().all(|phase| self.rules(*phase).is_empty()) && self.other.is_empty()
    }

    /// Appends `other`'s rules after this policy's rules, phase by phase.
    pub fn merge(&mut self, other: &TrafficPolicy) {
        for phase in Phase::ALL {
            let rules = other.rules(phase).to_vec();
            self.rules_mut(phase).extend(rules);
        }

        for (key, value) in &other.other {
            match self.other.get_mut(key) {
                Some(Value::Array(existing)) => {
                    if let Value::Array(more) = value {
                        existing.extend(more.iter().cloned());
                    }
                }
                Some(_) => {}
                None => {
                    self.other.insert(key.clone(), value.clone());
                }
            }
        }

        self.enabled = merge_enabled(self.enabled, other.enabled);
    }

    pub fn merged(mut self, other: &TrafficPolicy) -> TrafficPolicy {
        self.merge(other);
        self
    }

    /// Copies every rule of this policy, gating each one with `gate`.
    pub fn gated(&self, gate: &[String]) -> TrafficPolicy {
        let mut gated = TrafficPolicy {
            other: self.other.clone(),
            enabled: self.enabled,
            ..TrafficPolicy::default()
        };
        for phase in Phase::ALL {
            *gated.rules_mut(phase) = self.rules(phase).iter().map(|r| r.gated(gate)).collect();
        }
        gated
    }

    /// Phase document without the `enabled` flag.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Document as written to the platform, carrying `enabled` when one was set.
    pub fn to_persisted(&self) -> Value {
        let mut value = self.to_value();
        if let (Some(enabled), Value::Object(root)) = (self.enabled, &mut value) {
            root.insert(ENABLED.to_owned(), Value::Bool(enabled));
        }
        value
    }
}

/// `true` unless both sides are explicitly `false`. An unset side defers to
/// the other.
pub fn merge_enabled(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (None, other) | (other, None) => other,
        (Some(false), Some(false)) => Some(false),
        _ => Some(true),
    }
}

/// Folds policies left to right. `None` when nothing was given.
pub fn merge_all<'a, I>(policies: I) -> Option<TrafficPolicy>
where
    I: IntoIterator<Item = &'a TrafficPolicy>,
{
    policies.into_iter().fold(None, |acc, policy| match acc {
        None => Some(policy.clone()),
        Some(acc) => Some(acc.merged(policy)),
    })
}
