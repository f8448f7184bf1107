use serde::{Deserialize, Serialize};

use super::Cents;

pub type PlanId = String;

/// A purchasable subscription tier. Reference data: the ledger never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub price: Cents,
    pub features: Vec<String>,
}

impl Plan {
    pub fn new(id: impl Into<PlanId>, name: impl Into<String>, price: Cents) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            features: Vec::new(),
        }
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }
}

/// Catalog seeded into storage that holds no plans yet.
pub fn default_catalog() -> Vec<Plan> {
    vec![
        Plan::new("starter", "Starter", 10000).with_features([
            "Spot trading",
            "Daily market summary",
            "Email support",
        ]),
        Plan::new("pro", "Professional", 30000).with_features([
            "Spot trading",
            "Real-time signals",
            "Portfolio analytics",
            "Priority support",
        ]),
        Plan::new("elite", "Elite", 100000).with_features([
            "Spot trading",
            "Real-time signals",
            "Portfolio analytics",
            "Dedicated account manager",
            "Reduced withdrawal fees",
        ]),
    ]
}
