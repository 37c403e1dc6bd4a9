use crate::models::principal::Principal;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::OnceLock;
use utoipa::ToSchema;

/// How single logout is delivered to a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogoutType {
    #[default]
    BackChannel,
    FrontChannel,
    None,
}

/// Gate controlling whether a matched service may be used at all, whether it
/// may participate in SSO reuse, and which principal attributes it requires.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessStrategy {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub sso_enabled: bool,

    /// Attribute name -> accepted values; the principal must carry at least
    /// one accepted value for every listed attribute.
    #[serde(default)]
    pub required_attributes: HashMap<String, Vec<String>>,
}

fn default_true() -> bool {
    true
}

impl Default for AccessStrategy {
    fn default() -> Self {
        Self {
            enabled: true,
            sso_enabled: true,
            required_attributes: HashMap::new(),
        }
    }
}

impl AccessStrategy {
    pub fn authorized_for(&self, principal: &Principal) -> bool {
        if !self.enabled {
            return false;
        }
        self.required_attributes
            .iter()
            .all(|(key, accepted)| principal.has_any_value(key, accepted))
    }
}

/// Expiration attached to a service definition, advisory unless
/// `delete_when_expired` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ServiceExpirationPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub delete_when_expired: bool,

    #[serde(default)]
    pub notify_when_expired: bool,
}

impl ServiceExpirationPolicy {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Utc::now() > at).unwrap_or(false)
    }
}

/// A registered trust relationship: one application allowed to use this server.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisteredService {
    /// Assigned on first save; 0 means unassigned
    #[serde(default)]
    pub id: u64,

    pub name: String,

    /// Matching expression for inbound service URLs: a URL prefix, a regex,
    /// or a bare domain
    pub service_id: String,

    /// Lower sorts first when several definitions match the same URL
    #[serde(default)]
    pub evaluation_order: i32,

    #[serde(default)]
    pub access_strategy: AccessStrategy,

    #[serde(default)]
    pub expiration_policy: ServiceExpirationPolicy,

    #[serde(default)]
    pub logout_type: LogoutType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logout_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RegisteredService {
    pub fn new(name: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            service_id: service_id.into(),
            evaluation_order: 0,
            access_strategy: AccessStrategy::default(),
            expiration_policy: ServiceExpirationPolicy::default(),
            logout_type: LogoutType::default(),
            logout_url: None,
            description: None,
        }
    }

    /// Compile the matcher for this definition. Called once at load time by
    /// the catalog; convenience callers may match directly.
    pub fn matcher(&self) -> ServiceMatcher {
        ServiceMatcher::for_expression(&self.service_id)
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.matcher().matches(candidate)
    }

    /// Total order for tie-breaking among matching definitions:
    /// evaluation order, case-insensitive name, service id, then id.
    pub fn evaluation_cmp(&self, other: &RegisteredService) -> Ordering {
        self.evaluation_order
            .cmp(&other.evaluation_order)
            .then_with(|| self.name.to_lowercase().cmp(&other.name.to_lowercase()))
            .then_with(|| self.service_id.cmp(&other.service_id))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Matching strategy, selected once when a definition is loaded.
#[derive(Debug, Clone)]
pub enum ServiceMatcher {
    /// Case-insensitive URL prefix (stored lower-cased)
    Literal(String),
    /// Case-insensitive regular expression
    Regex(Regex),
    /// Bare domain compared against the candidate's host
    Domain(String),
}

const REGEX_METACHARS: &[char] = &['^', '$', '*', '?', '(', ')', '[', ']', '|', '+', '\\'];

impl ServiceMatcher {
    pub fn for_expression(expression: &str) -> ServiceMatcher {
        if expression.contains(REGEX_METACHARS) {
            match Regex::new(&format!("(?i){}", expression)) {
                Ok(re) => return ServiceMatcher::Regex(re),
                Err(e) => {
                    tracing::warn!(
                        expression = %expression,
                        error = %e,
                        "Service id expression failed to compile as a regex; treating it as a literal"
                    );
                    return ServiceMatcher::Literal(expression.to_lowercase());
                }
            }
        }
        if expression.starts_with("http://") || expression.starts_with("https://") {
            ServiceMatcher::Literal(expression.to_lowercase())
        } else {
            ServiceMatcher::Domain(expression.to_lowercase())
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            ServiceMatcher::Literal(prefix) => candidate.to_lowercase().starts_with(prefix),
            ServiceMatcher::Regex(re) => re.is_match(candidate),
            ServiceMatcher::Domain(domain) => {
                extract_host(candidate).as_deref() == Some(domain.as_str())
            }
        }
    }
}

static HOST_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Capture the host portion of an http(s)-like expression, lower-cased.
/// Tolerates a leading `^` and an escaped scheme (`https?`) so it also works
/// on regex-shaped service ids.
pub fn extract_host(expression: &str) -> Option<String> {
    let pattern = HOST_PATTERN.get_or_init(|| {
        Regex::new(r"^\^?https?\??://(.*?)(?:[(]?[:/]|$)").expect("host pattern is valid")
    });
    pattern
        .captures(expression)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}
