//! User bonus entity (C10).

use serde::{Deserialize, Serialize};

use crate::types::{MinorUnits, Timestamp, UserBonusId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserBonusStatus {
    Pending,
    Active,
    Expired,
    Forfeited,
    Converted,
}

impl UserBonusStatus {
    pub fn can_transition_to(self, next: UserBonusStatus) -> bool {
        use UserBonusStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Active, Expired)
                | (Active, Forfeited)
                | (Active, Converted)
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserBonus {
    pub id: UserBonusId,
    pub owner: UserId,
    pub template_code: String,
    pub status: UserBonusStatus,
    pub original_value: MinorUnits,
    pub current_value: MinorUnits,
    pub turnover_required: MinorUnits,
    pub turnover_progress: MinorUnits,
    pub expires_at: Timestamp,
    pub referee_id: Option<UserId>,
    pub referrer_id: Option<UserId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UserBonus {
    pub fn is_consistent(&self) -> bool {
        self.current_value >= 0
            && self.current_value <= self.original_value
            && self.turnover_progress >= 0
    }

    pub fn is_converted_eligible(&self) -> bool {
        self.turnover_progress >= self.turnover_required
    }
}

impl crate::entity::Entity for UserBonus {
    fn collection() -> &'static str {
        "user_bonuses"
    }
    fn id_bytes(&self) -> Vec<u8> {
        self.id.as_bytes().to_vec()
    }
    fn set_created_at(&mut self, ts: Timestamp) {
        self.created_at = ts;
    }
    fn set_updated_at(&mut self, ts: Timestamp) {
        self.updated_at = ts;
    }
}
