use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, PlanId};

pub type AccountId = Uuid;

/// Independent verification checks an account can pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationFlag {
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "mobile")]
    Mobile,
    #[serde(rename = "kyc")]
    Kyc,
    #[serde(rename = "twoFA")]
    TwoFa,
}

impl VerificationFlag {
    pub const ALL: [VerificationFlag; 4] = [
        VerificationFlag::Email,
        VerificationFlag::Mobile,
        VerificationFlag::Kyc,
        VerificationFlag::TwoFa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationFlag::Email => "email",
            VerificationFlag::Mobile => "mobile",
            VerificationFlag::Kyc => "kyc",
            VerificationFlag::TwoFa => "twoFA",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "email" => Some(VerificationFlag::Email),
            "mobile" => Some(VerificationFlag::Mobile),
            "kyc" => Some(VerificationFlag::Kyc),
            "twofa" | "2fa" | "two_fa" => Some(VerificationFlag::TwoFa),
            _ => None,
        }
    }
}

impl std::fmt::Display for VerificationFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub email: bool,
    pub mobile: bool,
    pub kyc: bool,
    #[serde(rename = "twoFA")]
    pub two_fa: bool,
}

impl Verification {
    pub fn get(&self, flag: VerificationFlag) -> bool {
        match flag {
            VerificationFlag::Email => self.email,
            VerificationFlag::Mobile => self.mobile,
            VerificationFlag::Kyc => self.kyc,
            VerificationFlag::TwoFa => self.two_fa,
        }
    }

    pub fn set(&mut self, flag: VerificationFlag, verified: bool) {
        match flag {
            VerificationFlag::Email => self.email = verified,
            VerificationFlag::Mobile => self.mobile = verified,
            VerificationFlag::Kyc => self.kyc = verified,
            VerificationFlag::TwoFa => self.two_fa = verified,
        }
    }

    pub fn is_fully_verified(&self) -> bool {
        VerificationFlag::ALL.iter().all(|flag| self.get(*flag))
    }
}

/// What a caller supplies when registering a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountProfile {
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
}

impl AccountProfile {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            mobile: None,
        }
    }

    pub fn with_mobile(mut self, mobile: impl Into<String>) -> Self {
        self.mobile = Some(mobile.into());
        self
    }

    /// Returns a description of the first problem found, if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be blank".to_string());
        }
        let email = self.email.trim();
        if email.is_empty() {
            return Err("email must not be blank".to_string());
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(format!("'{}' is not an email address", email)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
    /// Current balance in cents. Never negative once written by the store.
    pub balance: Cents,
    pub verification: Verification,
    pub plan: Option<PlanId>,
    pub plan_purchased_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Registers a profile as a fresh, zero-balance, unverified account.
    pub fn new(profile: AccountProfile, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: profile.name.trim().to_string(),
            email: profile.email.trim().to_string(),
            mobile: profile.mobile.map(|m| m.trim().to_string()),
            balance: 0,
            verification: Verification::default(),
            plan: None,
            plan_purchased_at: None,
            created_at,
        }
    }

    /// Key used to detect duplicate registrations.
    pub fn email_key(&self) -> String {
        normalize_email(&self.email)
    }

    pub fn is_verified(&self, flag: VerificationFlag) -> bool {
        self.verification.get(flag)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
