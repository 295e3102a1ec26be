//! `BonusEngine::award` runs the shared `Validate -> Calculate -> Persist ->
//! Award` pipeline (spec §4.10). Persist runs inside one sled multi-tree
//! transaction across templates/user_bonuses/claim-windows — the same
//! secondary-index-tree technique `custodia-ledger::engine` uses for its
//! account and external-ref indexes, since sled trees carry no uniqueness
//! constraints of their own. Award then credits the `bonus` balance type
//! through `custodia-wallet`.

use std::sync::Arc;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use tracing::info;

use custodia_core::bonus::{UserBonus, UserBonusStatus};
use custodia_core::error::CustodiaError;
use custodia_core::wallet::{BalanceType, WalletTransactionType};
use custodia_wallet::WalletEngine;

use crate::handler::{BonusContext, Eligibility};
use crate::registry::BonusRegistry;
use crate::template::BonusTemplate;

fn claim_window_key(template_code: &str, window: &str) -> Vec<u8> {
    format!("{template_code}|{window}").into_bytes()
}

pub struct BonusEngine {
    templates: sled::Tree,
    user_bonuses: sled::Tree,
    claim_windows: sled::Tree,
    wallet: Arc<WalletEngine>,
    registry: BonusRegistry,
}

impl BonusEngine {
    pub fn open(db: &sled::Db, wallet: Arc<WalletEngine>) -> Result<Self, CustodiaError> {
        Ok(Self {
            templates: db.open_tree("bonus_templates").map_err(|e| CustodiaError::Storage(e.to_string()))?,
            user_bonuses: db.open_tree("user_bonuses").map_err(|e| CustodiaError::Storage(e.to_string()))?,
            claim_windows: db.open_tree("bonus_claim_windows").map_err(|e| CustodiaError::Storage(e.to_string()))?,
            wallet,
            registry: BonusRegistry::with_defaults(),
        })
    }

    pub fn registry_mut(&mut self) -> &mut BonusRegistry {
        &mut self.registry
    }

    pub fn put_template(&self, template: &BonusTemplate) -> Result<(), CustodiaError> {
        let bytes = bincode::serialize(template).map_err(|e| CustodiaError::Serialization(e.to_string()))?;
        self.templates
            .insert(template.code.as_bytes(), bytes)
            .map_err(|e| CustodiaError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_template(&self, code: &str) -> Result<BonusTemplate, CustodiaError> {
        let bytes = self
            .templates
            .get(code.as_bytes())
            .map_err(|e| CustodiaError::Storage(e.to_string()))?
            .ok_or_else(|| CustodiaError::BonusTemplateNotFound(code.to_string()))?;
        bincode::deserialize(&bytes).map_err(|e| CustodiaError::Serialization(e.to_string()))
    }

    pub fn get_user_bonus(&self, id: &custodia_core::types::UserBonusId) -> Result<Option<UserBonus>, CustodiaError> {
        let raw = self
            .user_bonuses
            .get(id.as_bytes())
            .map_err(|e| CustodiaError::Storage(e.to_string()))?;
        raw.map(|bytes| bincode::deserialize(&bytes).map_err(|e| CustodiaError::Serialization(e.to_string())))
            .transpose()
    }

    pub fn award(&self, code: &str, ctx: BonusContext) -> Result<UserBonus, CustodiaError> {
        let template = self.get_template(code)?;
        let handler = self
            .registry
            .get(template.bonus_type)
            .ok_or_else(|| CustodiaError::Other(format!("no bonus handler registered for {:?}", template.bonus_type)))?;

        match handler.validate_specific(&template, &ctx) {
            Eligibility::Eligible => {}
            Eligibility::Ineligible(reason) => return Err(CustodiaError::BonusNotEligible(reason)),
        }

        let value = handler.calculate_value(&template, &ctx);
        let expires_at = handler.calculate_expiration(&template, ctx.now);
        let turnover_required = handler.calculate_turnover(&template, value);
        let user_bonus = handler.build_user_bonus(&template, &ctx, value, turnover_required, expires_at);
        let window = handler.window_key(&template, &ctx);

        let persisted = self.persist(&template, user_bonus, window.as_deref())?;
        self.credit_wallet(&persisted, &template)?;
        handler.on_awarded(&persisted);
        info!(user_bonus_id = %persisted.id, template_code = %template.code, value, "bonus awarded");
        Ok(persisted)
    }

    fn persist(&self, template: &BonusTemplate, mut user_bonus: UserBonus, window: Option<&str>) -> Result<UserBonus, CustodiaError> {
        user_bonus.status = UserBonusStatus::Active;
        let code = template.code.clone();
        let max_total_uses = template.max_total_uses;

        let outcome: Result<UserBonus, TransactionError<CustodiaError>> =
            (&self.templates, &self.user_bonuses, &self.claim_windows).transaction(|(templates, user_bonuses, claim_windows)| {
                if let Some(w) = window {
                    let key = claim_window_key(&code, w);
                    if claim_windows.get(&key)?.is_some() {
                        return Err(ConflictableTransactionError::Abort(CustodiaError::BonusNotEligible(format!(
                            "already claimed for window {w}"
                        ))));
                    }
                }

                let mut stored_template: BonusTemplate = match templates.get(code.as_bytes())? {
                    Some(bytes) => bincode::deserialize(&bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?,
                    None => return Err(ConflictableTransactionError::Abort(CustodiaError::BonusTemplateNotFound(code.clone()))),
                };

                if let Some(max) = max_total_uses {
                    if stored_template.total_uses >= max {
                        return Err(ConflictableTransactionError::Abort(CustodiaError::BonusNotEligible(
                            "bonus template has reached its total-uses cap".into(),
                        )));
                    }
                }
                stored_template.total_uses += 1;

                let template_bytes = bincode::serialize(&stored_template)
                    .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?;
                templates.insert(code.as_bytes(), template_bytes)?;

                let user_bonus_bytes = bincode::serialize(&user_bonus)
                    .map_err(|e| ConflictableTransactionError::Abort(CustodiaError::Serialization(e.to_string())))?;
                user_bonuses.insert(user_bonus.id.as_bytes().to_vec(), user_bonus_bytes)?;

                if let Some(w) = window {
                    let key = claim_window_key(&code, w);
                    claim_windows.insert(key, user_bonus.id.as_bytes().to_vec())?;
                }

                Ok(user_bonus.clone())
            });

        outcome.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => CustodiaError::Storage(e.to_string()),
        })
    }

    fn credit_wallet(&self, user_bonus: &UserBonus, template: &BonusTemplate) -> Result<(), CustodiaError> {
        let wallet = self
            .wallet
            .create_wallet(user_bonus.owner, template.currency.clone(), "main", user_bonus.created_at)?;
        self.wallet.create_wallet_transaction(
            wallet.id,
            user_bonus.owner,
            WalletTransactionType::BonusCredit,
            BalanceType::Bonus,
            user_bonus.current_value,
            template.currency.clone(),
            Some(format!("bonus {}", template.code)),
            user_bonus.created_at,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_core::types::{Currency, UserId};
    use custodia_ledger::LedgerEngine;
    use custodia_opstate::OperationStateTracker;
    use std::time::{SystemTime, UNIX_EPOCH};

    use crate::template::BonusValueSpec;

    fn rand_suffix() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos() as u64
    }

    fn temp_engine() -> BonusEngine {
        let dir = std::env::temp_dir().join(format!("custodia_bonus_test_{}_{}", std::process::id(), rand_suffix()));
        let db = custodia_repository::open_db(&dir).unwrap();
        let ledger = Arc::new(LedgerEngine::open(&db).unwrap());
        let opstate = Arc::new(OperationStateTracker::open(&db).unwrap());
        let wallet = Arc::new(WalletEngine::open(&db, ledger, opstate).unwrap());
        BonusEngine::open(&db, wallet).unwrap()
    }

    fn eur() -> Currency {
        Currency::new("eur")
    }

    #[test]
    fn awarding_credits_the_bonus_balance() {
        let engine = temp_engine();
        engine
            .put_template(&BonusTemplate::new("daily", crate::template::BonusType::DailyLogin, eur(), BonusValueSpec::Fixed(100), 20, 7))
            .unwrap();
        let owner = UserId::new();

        let awarded = engine.award("daily", BonusContext::new(owner, 1_700_000_000)).unwrap();

        assert_eq!(awarded.current_value, 100);
        assert_eq!(awarded.turnover_required, 2_000);
        let wallet = engine.wallet.create_wallet(owner, eur(), "main", 1_700_000_000).unwrap();
        let balance = engine.wallet.balance(wallet.id, custodia_core::wallet::BalanceType::Bonus).unwrap();
        assert_eq!(balance, 100);
    }

    #[test]
    fn daily_bonus_cannot_be_claimed_twice_the_same_day() {
        let engine = temp_engine();
        engine
            .put_template(&BonusTemplate::new("daily", crate::template::BonusType::DailyLogin, eur(), BonusValueSpec::Fixed(100), 20, 7))
            .unwrap();
        let owner = UserId::new();

        engine.award("daily", BonusContext::new(owner, 1_700_000_000)).unwrap();
        let err = engine.award("daily", BonusContext::new(owner, 1_700_000_100)).unwrap_err();
        assert!(matches!(err, CustodiaError::BonusNotEligible(_)));
    }

    #[test]
    fn daily_bonus_can_be_claimed_again_the_next_day() {
        let engine = temp_engine();
        engine
            .put_template(&BonusTemplate::new("daily", crate::template::BonusType::DailyLogin, eur(), BonusValueSpec::Fixed(100), 20, 7))
            .unwrap();
        let owner = UserId::new();

        engine.award("daily", BonusContext::new(owner, 1_700_000_000)).unwrap();
        let second = engine.award("daily", BonusContext::new(owner, 1_700_000_000 + 86_400)).unwrap();
        assert_eq!(second.current_value, 100);
    }

    #[test]
    fn flash_bonus_respects_its_total_uses_cap() {
        let engine = temp_engine();
        engine
            .put_template(
                &BonusTemplate::new("launch_flash", crate::template::BonusType::Flash, eur(), BonusValueSpec::Fixed(250), 1, 3)
                    .with_validity_window(0, 10_000)
                    .with_max_total_uses(1),
            )
            .unwrap();

        engine.award("launch_flash", BonusContext::new(UserId::new(), 10)).unwrap();
        let err = engine.award("launch_flash", BonusContext::new(UserId::new(), 20)).unwrap_err();
        assert!(matches!(err, CustodiaError::BonusNotEligible(_)));
    }

    #[test]
    fn unknown_template_code_is_rejected() {
        let engine = temp_engine();
        let err = engine.award("nonexistent", BonusContext::new(UserId::new(), 0)).unwrap_err();
        assert!(matches!(err, CustodiaError::BonusTemplateNotFound(_)));
    }
}
