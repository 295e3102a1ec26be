use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Monetary amount in minor units (e.g. cents). Always an integer.
pub type MinorUnits = i64;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

// ── Generic ULID-backed id newtype ───────────────────────────────────────────

/// Declares a `Ulid`-backed id newtype: `Display`, `FromStr`, `new()`, serde
/// as a plain string. ULIDs are lexically time-ordered, which is what makes
/// the `(sortValue, id)` cursor-pagination pair in the repository fall out
/// for free when sorting by id.
macro_rules! ulid_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Ulid);

        impl $name {
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            pub fn as_bytes(&self) -> [u8; 16] {
                self.0.to_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Ulid::from_str(s)?))
            }
        }
    };
}

ulid_id!(TenantId);
ulid_id!(UserId);
ulid_id!(AccountId);
ulid_id!(WalletId);
ulid_id!(SessionId);
ulid_id!(TransferId);
ulid_id!(NotificationId);
ulid_id!(SagaId);
ulid_id!(OperationId);
ulid_id!(WalletTransactionId);
ulid_id!(LedgerTransactionId);
ulid_id!(UserBonusId);

/// Opaque brand identifier. Unlike the ulid ids above, brands are small,
/// human-chosen strings ("default", "acme-eu") configured by operators, not
/// generated at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrandId(pub String);

impl fmt::Display for BrandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO-4217-shaped currency code, always stored upper-case.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(pub String);

impl Currency {
    pub fn new(code: &str) -> Self {
        Self(code.to_ascii_uppercase())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ulid_ids_roundtrip_through_display() {
        let id = UserId::new();
        let s = id.to_string();
        let parsed: UserId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn currency_is_upper_cased() {
        assert_eq!(Currency::new("eur").to_string(), "EUR");
    }
}
