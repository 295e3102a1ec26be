//! Concrete `BonusHandler`s, one per `BonusType`. Daily/birthday/anniversary
//! windows reuse the same "is this timestamp inside the allowed window"
//! idea as `chronx-timelock::schedule`'s year-anchored release dates; flash
//! and referral read their own shared invariants off the template (spec
//! §4.10: validity window + total-uses cap; highest qualifying tier).

use chrono::DateTime;
use tracing::info;

use custodia_core::bonus::UserBonus;
use custodia_core::types::{MinorUnits, Timestamp};

use crate::handler::{BonusContext, BonusHandler, Eligibility};
use crate::template::{BonusTemplate, BonusType, BonusValueSpec};

fn calendar_day(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn calendar_year(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y").to_string())
        .unwrap_or_else(|| ts.to_string())
}

pub struct DailyLoginHandler;

impl BonusHandler for DailyLoginHandler {
    fn bonus_type(&self) -> BonusType {
        BonusType::DailyLogin
    }

    fn validate_specific(&self, _template: &BonusTemplate, _ctx: &BonusContext) -> Eligibility {
        Eligibility::Eligible
    }

    fn window_key(&self, template: &BonusTemplate, ctx: &BonusContext) -> Option<String> {
        Some(format!("{}:{}", template.code, calendar_day(ctx.now)))
    }
}

pub struct BirthdayHandler;

impl BonusHandler for BirthdayHandler {
    fn bonus_type(&self) -> BonusType {
        BonusType::Birthday
    }

    fn validate_specific(&self, _template: &BonusTemplate, _ctx: &BonusContext) -> Eligibility {
        Eligibility::Eligible
    }

    fn window_key(&self, template: &BonusTemplate, ctx: &BonusContext) -> Option<String> {
        Some(format!("{}:{}", template.code, calendar_year(ctx.now)))
    }
}

pub struct AnniversaryHandler;

impl BonusHandler for AnniversaryHandler {
    fn bonus_type(&self) -> BonusType {
        BonusType::Anniversary
    }

    fn validate_specific(&self, _template: &BonusTemplate, _ctx: &BonusContext) -> Eligibility {
        Eligibility::Eligible
    }

    fn window_key(&self, template: &BonusTemplate, ctx: &BonusContext) -> Option<String> {
        Some(format!("{}:{}", template.code, calendar_year(ctx.now)))
    }
}

pub struct SeasonalHandler;

impl BonusHandler for SeasonalHandler {
    fn bonus_type(&self) -> BonusType {
        BonusType::Seasonal
    }

    fn validate_specific(&self, template: &BonusTemplate, ctx: &BonusContext) -> Eligibility {
        if template.is_within_validity_window(ctx.now) {
            Eligibility::Eligible
        } else {
            Eligibility::Ineligible("seasonal bonus is outside its active window".into())
        }
    }

    // One claim per template code, not per year: a seasonal template
    // represents a single event run, not a recurring yearly slot.
    fn window_key(&self, template: &BonusTemplate, _ctx: &BonusContext) -> Option<String> {
        Some(template.code.clone())
    }
}

pub struct FlashHandler;

impl BonusHandler for FlashHandler {
    fn bonus_type(&self) -> BonusType {
        BonusType::Flash
    }

    fn validate_specific(&self, template: &BonusTemplate, ctx: &BonusContext) -> Eligibility {
        if !template.is_within_validity_window(ctx.now) {
            return Eligibility::Ineligible("flash bonus is outside its valid_from/valid_until window".into());
        }
        if let Some(max) = template.max_total_uses {
            if template.total_uses >= max {
                return Eligibility::Ineligible("flash bonus has reached its total-uses cap".into());
            }
        }
        Eligibility::Eligible
    }

    fn calculate_expiration(&self, template: &BonusTemplate, now: Timestamp) -> Timestamp {
        let default = now + template.expiration_days * 86_400;
        match template.valid_until {
            Some(until) if until < default => until,
            _ => default,
        }
    }

    fn window_key(&self, template: &BonusTemplate, _ctx: &BonusContext) -> Option<String> {
        Some(template.code.clone())
    }
}

pub struct ReferralHandler;

impl BonusHandler for ReferralHandler {
    fn bonus_type(&self) -> BonusType {
        BonusType::Referral
    }

    fn validate_specific(&self, _template: &BonusTemplate, ctx: &BonusContext) -> Eligibility {
        if ctx.referrer_id.is_none() || ctx.referee_id.is_none() || ctx.referred_deposit.is_none() {
            return Eligibility::Ineligible("referral bonus requires a referrer, referee, and referred deposit".into());
        }
        Eligibility::Eligible
    }

    fn calculate_value(&self, template: &BonusTemplate, ctx: &BonusContext) -> MinorUnits {
        let deposit = ctx.referred_deposit.unwrap_or(0);
        match &template.value {
            BonusValueSpec::Tiered(tiers) => tiers
                .iter()
                .filter(|t| deposit >= t.min_referred_deposit)
                .map(|t| t.bonus_value)
                .max()
                .unwrap_or(0),
            BonusValueSpec::Fixed(v) => *v,
        }
    }

    // Referral bonuses are cash, credited without a wagering requirement.
    fn calculate_turnover(&self, _template: &BonusTemplate, _value: MinorUnits) -> MinorUnits {
        0
    }

    fn window_key(&self, template: &BonusTemplate, ctx: &BonusContext) -> Option<String> {
        let referee = ctx.referee_id.map(|id| id.to_string()).unwrap_or_default();
        Some(format!("{}:{}", template.code, referee))
    }

    fn on_awarded(&self, user_bonus: &UserBonus) {
        info!(user_bonus_id = %user_bonus.id, referrer = ?user_bonus.referrer_id, "referral bonus awarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_core::types::{Currency, UserId};

    fn template() -> BonusTemplate {
        BonusTemplate::new(
            "referral_tiers",
            BonusType::Referral,
            Currency::new("eur"),
            BonusValueSpec::Tiered(vec![
                crate::template::ReferralTier { min_referred_deposit: 0, bonus_value: 500 },
                crate::template::ReferralTier { min_referred_deposit: 10_000, bonus_value: 2_000 },
                crate::template::ReferralTier { min_referred_deposit: 50_000, bonus_value: 10_000 },
            ]),
            1,
            30,
        )
    }

    #[test]
    fn referral_picks_the_highest_qualifying_tier() {
        let handler = ReferralHandler;
        let ctx = BonusContext::for_referral(UserId::new(), 0, UserId::new(), UserId::new(), 15_000);
        let value = handler.calculate_value(&template(), &ctx);
        assert_eq!(value, 2_000);
    }

    #[test]
    fn referral_without_a_deposit_is_ineligible() {
        let handler = ReferralHandler;
        let ctx = BonusContext::new(UserId::new(), 0);
        assert_eq!(handler.validate_specific(&template(), &ctx), Eligibility::Ineligible(
            "referral bonus requires a referrer, referee, and referred deposit".into()
        ));
    }

    #[test]
    fn flash_bonus_rejects_outside_its_window() {
        let handler = FlashHandler;
        let t = BonusTemplate::new("flash", BonusType::Flash, Currency::new("eur"), BonusValueSpec::Fixed(500), 1, 7)
            .with_validity_window(100, 200);
        let ctx = BonusContext::new(UserId::new(), 500);
        assert!(matches!(handler.validate_specific(&t, &ctx), Eligibility::Ineligible(_)));
    }

    #[test]
    fn daily_login_window_key_is_scoped_to_the_calendar_day() {
        let handler = DailyLoginHandler;
        let t = BonusTemplate::new("daily", BonusType::DailyLogin, Currency::new("eur"), BonusValueSpec::Fixed(100), 1, 1);
        let same_day = handler.window_key(&t, &BonusContext::new(UserId::new(), 1_700_000_000));
        let next_day = handler.window_key(&t, &BonusContext::new(UserId::new(), 1_700_000_000 + 86_400));
        assert_ne!(same_day, next_day);
    }
}
