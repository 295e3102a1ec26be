//! `BonusTemplate`: the configuration a `BonusHandler` reads from, spec
//! §4.10. Stored in its own sled tree keyed by `code`; a tiered template
//! backs the referral handler's "highest qualifying tier" rule.

use serde::{Deserialize, Serialize};

use custodia_core::types::{Currency, MinorUnits, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusType {
    DailyLogin,
    Birthday,
    Anniversary,
    Seasonal,
    Flash,
    Referral,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferralTier {
    pub min_referred_deposit: MinorUnits,
    pub bonus_value: MinorUnits,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BonusValueSpec {
    Fixed(MinorUnits),
    Tiered(Vec<ReferralTier>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BonusTemplate {
    pub code: String,
    pub bonus_type: BonusType,
    pub currency: Currency,
    pub value: BonusValueSpec,
    pub turnover_multiplier: u32,
    pub expiration_days: i64,
    pub valid_from: Option<Timestamp>,
    pub valid_until: Option<Timestamp>,
    pub max_total_uses: Option<u32>,
    #[serde(default)]
    pub total_uses: u32,
}

impl BonusTemplate {
    pub fn new(
        code: impl Into<String>,
        bonus_type: BonusType,
        currency: Currency,
        value: BonusValueSpec,
        turnover_multiplier: u32,
        expiration_days: i64,
    ) -> Self {
        Self {
            code: code.into(),
            bonus_type,
            currency,
            value,
            turnover_multiplier,
            expiration_days,
            valid_from: None,
            valid_until: None,
            max_total_uses: None,
            total_uses: 0,
        }
    }

    pub fn with_validity_window(mut self, valid_from: Timestamp, valid_until: Timestamp) -> Self {
        self.valid_from = Some(valid_from);
        self.valid_until = Some(valid_until);
        self
    }

    pub fn with_max_total_uses(mut self, max: u32) -> Self {
        self.max_total_uses = Some(max);
        self
    }

    /// The template's flat value, or the smallest referral tier if tiered —
    /// callers wanting the tier a specific deposit qualifies for use
    /// `ReferralHandler::calculate_value` instead.
    pub fn fixed_value(&self) -> MinorUnits {
        match &self.value {
            BonusValueSpec::Fixed(v) => *v,
            BonusValueSpec::Tiered(tiers) => tiers.iter().map(|t| t.bonus_value).min().unwrap_or(0),
        }
    }

    pub fn is_within_validity_window(&self, now: Timestamp) -> bool {
        let after_start = self.valid_from.map_or(true, |from| now >= from);
        let before_end = self.valid_until.map_or(true, |until| now <= until);
        after_start && before_end
    }
}
