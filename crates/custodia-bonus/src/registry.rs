//! `BonusRegistry`: a capability-table dispatch in place of the source's
//! prototype/dynamic bonus handlers (spec §9) — a `HashMap<BonusType, Arc<dyn
//! BonusHandler>>` that can be extended with a custom handler per type.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::BonusHandler;
use crate::handlers::{AnniversaryHandler, BirthdayHandler, DailyLoginHandler, FlashHandler, ReferralHandler, SeasonalHandler};
use crate::template::BonusType;

pub struct BonusRegistry {
    handlers: HashMap<BonusType, Arc<dyn BonusHandler>>,
}

impl BonusRegistry {
    pub fn with_defaults() -> Self {
        let mut handlers: HashMap<BonusType, Arc<dyn BonusHandler>> = HashMap::new();
        handlers.insert(BonusType::DailyLogin, Arc::new(DailyLoginHandler));
        handlers.insert(BonusType::Birthday, Arc::new(BirthdayHandler));
        handlers.insert(BonusType::Anniversary, Arc::new(AnniversaryHandler));
        handlers.insert(BonusType::Seasonal, Arc::new(SeasonalHandler));
        handlers.insert(BonusType::Flash, Arc::new(FlashHandler));
        handlers.insert(BonusType::Referral, Arc::new(ReferralHandler));
        Self { handlers }
    }

    pub fn register(&mut self, handler: Arc<dyn BonusHandler>) {
        self.handlers.insert(handler.bonus_type(), handler);
    }

    pub fn get(&self, bonus_type: BonusType) -> Option<Arc<dyn BonusHandler>> {
        self.handlers.get(&bonus_type).cloned()
    }
}

impl Default for BonusRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
