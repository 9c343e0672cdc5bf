use serde::Serialize;

use crate::models::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

/// A purchasable plan. Amounts are kept in cents to avoid float money.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingPlan {
    pub id: &'static str,
    pub name: &'static str,
    pub billing_cycle: BillingCycle,
    pub amount_cents: u32,
    pub currency: &'static str,
    pub membership: Tier,
    pub duration_days: i64,
}

impl PricingPlan {
    /// Amount formatted the way payment providers expect ("10.00").
    pub fn amount_value(&self) -> String {
        format!("{}.{:02}", self.amount_cents / 100, self.amount_cents % 100)
    }
}

pub const PLANS: &[PricingPlan] = &[
    PricingPlan {
        id: "FREE",
        name: "Free",
        billing_cycle: BillingCycle::Monthly,
        amount_cents: 0,
        currency: "USD",
        membership: Tier::Free,
        duration_days: 9999,
    },
    PricingPlan {
        id: "PROFESSIONAL_MONTHLY",
        name: "Professional Monthly",
        billing_cycle: BillingCycle::Monthly,
        amount_cents: 1_000,
        currency: "USD",
        membership: Tier::Premium,
        duration_days: 30,
    },
    PricingPlan {
        id: "PROFESSIONAL_YEARLY",
        name: "Professional Yearly",
        billing_cycle: BillingCycle::Yearly,
        amount_cents: 9_600,
        currency: "USD",
        membership: Tier::Premium,
        duration_days: 365,
    },
];

pub fn plan_by_id(id: &str) -> Option<&'static PricingPlan> {
    PLANS.iter().find(|p| p.id == id)
}
