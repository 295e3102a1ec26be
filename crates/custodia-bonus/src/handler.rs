//! `BonusHandler`: the per-type capability set spec §4.10 and §9 describe
//! as a prototype/dynamic dispatch table in the source, re-expressed here
//! as a plain trait object registered in `BonusRegistry`.

use custodia_core::bonus::{UserBonus, UserBonusStatus};
use custodia_core::types::{MinorUnits, Timestamp, UserBonusId, UserId};

use crate::template::{BonusTemplate, BonusType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible(String),
}

/// Everything a handler needs beyond the template itself to judge and
/// size an award.
#[derive(Clone, Debug)]
pub struct BonusContext {
    pub owner: UserId,
    pub now: Timestamp,
    pub referee_id: Option<UserId>,
    pub referrer_id: Option<UserId>,
    pub referred_deposit: Option<MinorUnits>,
}

impl BonusContext {
    pub fn new(owner: UserId, now: Timestamp) -> Self {
        Self { owner, now, referee_id: None, referrer_id: None, referred_deposit: None }
    }

    pub fn for_referral(owner: UserId, now: Timestamp, referrer_id: UserId, referee_id: UserId, referred_deposit: MinorUnits) -> Self {
        Self {
            owner,
            now,
            referee_id: Some(referee_id),
            referrer_id: Some(referrer_id),
            referred_deposit: Some(referred_deposit),
        }
    }
}

/// The common pipeline is `Validate -> Calculate -> Persist -> Award`
/// (spec §4.10); a handler supplies the per-type pieces of the first two
/// stages plus a window key that scopes "one claim per window per user"
/// and an `on_awarded` hook run after the ledger credit lands.
pub trait BonusHandler: Send + Sync {
    fn bonus_type(&self) -> BonusType;

    fn validate_specific(&self, template: &BonusTemplate, ctx: &BonusContext) -> Eligibility;

    fn calculate_value(&self, template: &BonusTemplate, _ctx: &BonusContext) -> MinorUnits {
        template.fixed_value()
    }

    fn calculate_expiration(&self, template: &BonusTemplate, now: Timestamp) -> Timestamp {
        now + template.expiration_days * 86_400
    }

    fn calculate_turnover(&self, template: &BonusTemplate, value: MinorUnits) -> MinorUnits {
        value * template.turnover_multiplier as MinorUnits
    }

    fn build_user_bonus(
        &self,
        template: &BonusTemplate,
        ctx: &BonusContext,
        value: MinorUnits,
        turnover_required: MinorUnits,
        expires_at: Timestamp,
    ) -> UserBonus {
        UserBonus {
            id: UserBonusId::new(),
            owner: ctx.owner,
            template_code: template.code.clone(),
            status: UserBonusStatus::Pending,
            original_value: value,
            current_value: value,
            turnover_required,
            turnover_progress: 0,
            expires_at,
            referee_id: ctx.referee_id,
            referrer_id: ctx.referrer_id,
            created_at: ctx.now,
            updated_at: ctx.now,
        }
    }

    /// Scopes "one claim per window per user" (spec §4.10): `None` means
    /// the template is claimable at most once ever for this owner.
    fn window_key(&self, template: &BonusTemplate, ctx: &BonusContext) -> Option<String>;

    fn on_awarded(&self, _user_bonus: &UserBonus) {}
}
