//! The entitlement record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Plan given to wallets seen for the first time.
pub const DEFAULT_PLAN: &str = "free";

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    #[default]
    Active,
    Cancelled,
    PastDue,
    Suspended,
}

impl EntitlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementStatus::Active => "active",
            EntitlementStatus::Cancelled => "cancelled",
            EntitlementStatus::PastDue => "past_due",
            EntitlementStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for EntitlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntitlementStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(EntitlementStatus::Active),
            "cancelled" => Ok(EntitlementStatus::Cancelled),
            "past_due" => Ok(EntitlementStatus::PastDue),
            "suspended" => Ok(EntitlementStatus::Suspended),
            other => Err(StoreError::InvalidData(format!("unknown status: {other}"))),
        }
    }
}

/// A wallet's subscription state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub xpub: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peer_id: String,
    pub plan: String,
    pub status: EntitlementStatus,
    /// Unix seconds; `0` means no expiry.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub expires_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl Entitlement {
    /// A fresh active free-plan record.
    pub fn new_default(xpub: &str, peer_id: &str, now: i64) -> Self {
        Self {
            xpub: xpub.trim().to_string(),
            peer_id: peer_id.trim().to_string(),
            plan: DEFAULT_PLAN.to_string(),
            status: EntitlementStatus::Active,
            expires_at: 0,
            updated_at: now,
        }
    }

    /// Whether status and expiry allow access at `now`.
    pub fn is_active(&self, now: i64) -> bool {
        if self.status != EntitlementStatus::Active {
            return false;
        }
        self.expires_at <= 0 || now < self.expires_at
    }

    /// Trim fields and fill defaults before a write.
    pub(crate) fn normalized(&self, now: i64) -> Result<Self, StoreError> {
        let xpub = self.xpub.trim();
        if xpub.is_empty() {
            return Err(StoreError::MissingField("xpub"));
        }
        let plan = match self.plan.trim() {
            "" => DEFAULT_PLAN,
            p => p,
        };
        Ok(Self {
            xpub: xpub.to_string(),
            peer_id: self.peer_id.trim().to_string(),
            plan: plan.to_string(),
            status: self.status,
            expires_at: self.expires_at,
            updated_at: now,
        })
    }
}
