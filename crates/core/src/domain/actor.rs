use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PracticeId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProviderId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatientId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Topline,
    Downline,
    Practice,
    Provider,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Topline => "topline",
            Self::Downline => "downline",
            Self::Practice => "practice",
            Self::Provider => "provider",
        }
    }

    pub fn is_rep(&self) -> bool {
        matches!(self, Self::Topline | Self::Downline)
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "topline" => Ok(Self::Topline),
            "downline" => Ok(Self::Downline),
            "practice" | "doctor" => Ok(Self::Practice),
            "provider" => Ok(Self::Provider),
            other => Err(DomainError::InvariantViolation(format!("unknown role `{other}`"))),
        }
    }
}

/// The resolved, effective identity of whoever is calling into the core.
///
/// Session handling and impersonation happen upstream; this value is passed
/// explicitly into every operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub user_id: UserId,
    pub role: Role,
    #[serde(default)]
    pub practice_id: Option<PracticeId>,
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
    #[serde(default)]
    pub linked_topline_rep_id: Option<UserId>,
    #[serde(default)]
    pub linked_downline_rep_id: Option<UserId>,
}

impl ActorContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role,
            practice_id: None,
            provider_id: None,
            linked_topline_rep_id: None,
            linked_downline_rep_id: None,
        }
    }

    pub fn with_practice(mut self, practice_id: impl Into<String>) -> Self {
        self.practice_id = Some(PracticeId(practice_id.into()));
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(ProviderId(provider_id.into()));
        self
    }

    pub fn with_topline_rep(mut self, rep_id: impl Into<String>) -> Self {
        self.linked_topline_rep_id = Some(UserId(rep_id.into()));
        self
    }

    pub fn with_downline_rep(mut self, rep_id: impl Into<String>) -> Self {
        self.linked_downline_rep_id = Some(UserId(rep_id.into()));
        self
    }

    /// The topline rep whose scoping applies to this actor's orders.
    pub fn rep_scope(&self) -> Option<&UserId> {
        match self.role {
            Role::Topline => Some(&self.user_id),
            Role::Admin => None,
            Role::Downline | Role::Practice | Role::Provider => self.linked_topline_rep_id.as_ref(),
        }
    }
}
