//! Validity windows for a sequence of keys.
//!
//! Operators declare only `use_from`. Expiry is derived: a key stays
//! publishable until its successor has been active for the overlap period,
//! so verifiers holding tokens signed by the old key can still find it.
//! The last key of a sequence has no successor and gets a long default.

use crate::errors::PassportError;
use crate::keys::KeyGroup;
use chrono::{DateTime, Datelike, Duration, Months, Utc};

/// Validity of the last key in a sequence, in calendar months.
pub const LAST_KEY_VALIDITY_MONTHS: u32 = 120;

/// One scheduled key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    /// Custodian key identifier as configured (alias, id, or ARN).
    pub key_id: String,
    /// Operator-declared activation instant.
    pub use_from: DateTime<Utc>,
    /// Derived by [`apply_expiration_policy`].
    pub expires_at: DateTime<Utc>,
}

impl KeyEntry {
    /// Creates an entry whose expiry is the last-key default until a policy
    /// is applied to its sequence.
    pub fn new(key_id: impl Into<String>, use_from: DateTime<Utc>) -> Self {
        Self {
            key_id: key_id.into(),
            use_from,
            expires_at: last_key_expiry(use_from),
        }
    }
}

/// Anything carrying a schedule entry.
pub trait Scheduled {
    fn entry(&self) -> &KeyEntry;
}

impl Scheduled for KeyEntry {
    fn entry(&self) -> &KeyEntry {
        self
    }
}

/// Populates `expires_at` for a sequence ordered by ascending `use_from`.
///
/// Entry `i` expires at entry `i + 1`'s `use_from` plus `overlap_days`; the
/// last entry expires [`LAST_KEY_VALIDITY_MONTHS`] after its own `use_from`.
/// Arithmetic that overflows saturates at the maximum representable instant.
pub fn apply_expiration_policy(entries: Vec<KeyEntry>, overlap_days: u32) -> Vec<KeyEntry> {
    let overlap = Duration::days(i64::from(overlap_days));
    let successors: Vec<Option<DateTime<Utc>>> = entries
        .iter()
        .skip(1)
        .map(|next| Some(next.use_from))
        .chain(std::iter::once(None))
        .collect();

    entries
        .into_iter()
        .zip(successors)
        .map(|(mut entry, successor)| {
            entry.expires_at = match successor {
                Some(next_use_from) => next_use_from
                    .checked_add_signed(overlap)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
                None => last_key_expiry(entry.use_from),
            };
            entry
        })
        .collect()
}

/// Ten calendar years after `use_from`. A Feb 29 start whose target year
/// has no Feb 29 lands on Mar 1 rather than clamping back to Feb 28.
fn last_key_expiry(use_from: DateTime<Utc>) -> DateTime<Utc> {
    let Some(expiry) = use_from.checked_add_months(Months::new(LAST_KEY_VALIDITY_MONTHS)) else {
        return DateTime::<Utc>::MAX_UTC;
    };

    if expiry.day() < use_from.day() {
        expiry
            .checked_add_signed(Duration::days(1))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    } else {
        expiry
    }
}

/// The key with the greatest `use_from <= now`.
///
/// Evaluated over every entry regardless of order. When several entries share
/// the winning `use_from`, the first one encountered wins.
pub fn active_key_at<T: Scheduled>(keys: &[T], now: DateTime<Utc>) -> Option<&T> {
    keys.iter()
        .filter(|key| key.entry().use_from <= now)
        .fold(None, |best: Option<&T>, key| match best {
            Some(current) if current.entry().use_from >= key.entry().use_from => Some(current),
            _ => Some(key),
        })
}

/// Every key with `expires_at > now`, in input order.
pub fn visible_keys_at<T: Scheduled>(keys: &[T], now: DateTime<Utc>) -> Vec<&T> {
    keys.iter()
        .filter(|key| key.entry().expires_at > now)
        .collect()
}

/// Entries for all three groups plus the overlap policy, as loaded from
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchedule {
    pub overlap_days: u32,
    pub jwt: Vec<KeyEntry>,
    pub jose: Vec<KeyEntry>,
    pub jwks: Vec<KeyEntry>,
}

impl KeySchedule {
    pub fn group(&self, group: KeyGroup) -> &[KeyEntry] {
        match group {
            KeyGroup::Jwt => &self.jwt,
            KeyGroup::Jose => &self.jose,
            KeyGroup::Jwks => &self.jwks,
        }
    }

    /// Every group must be non-empty with unique, strictly ascending
    /// `use_from` and non-empty key identifiers.
    pub fn validate(&self) -> Result<(), PassportError> {
        for group in KeyGroup::ALL {
            let entries = self.group(group);
            if entries.is_empty() {
                return Err(PassportError::Configuration(format!(
                    "key group {group} has no keys"
                )));
            }

            if entries.iter().any(|e| e.key_id.trim().is_empty()) {
                return Err(PassportError::Configuration(format!(
                    "key group {group} has an entry without key_id"
                )));
            }

            let ascending = entries
                .windows(2)
                .all(|pair| matches!(pair, [a, b] if a.use_from < b.use_from));
            if !ascending {
                return Err(PassportError::Configuration(format!(
                    "key group {group} must list use_from in strictly ascending order"
                )));
            }
        }
        Ok(())
    }

    /// The schedule with expiry derived for every group.
    pub fn with_expiration_policy(self) -> Self {
        let overlap_days = self.overlap_days;
        Self {
            overlap_days,
            jwt: apply_expiration_policy(self.jwt, overlap_days),
            jose: apply_expiration_policy(self.jose, overlap_days),
            jwks: apply_expiration_policy(self.jwks, overlap_days),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn three_keys() -> Vec<KeyEntry> {
        vec![
            KeyEntry::new("k1", utc(2024, 1, 1)),
            KeyEntry::new("k2", utc(2025, 1, 1)),
            KeyEntry::new("k3", utc(2026, 1, 1)),
        ]
    }

    fn ids<T: Scheduled>(keys: &[&T]) -> Vec<String> {
        keys.iter().map(|k| k.entry().key_id.clone()).collect()
    }

    #[test]
    fn test_policy_overlap_180_days() {
        let keys = apply_expiration_policy(three_keys(), 180);

        let expiries: Vec<_> = keys.iter().map(|k| k.expires_at).collect();
        assert_eq!(
            expiries,
            vec![utc(2025, 6, 30), utc(2026, 6, 30), utc(2036, 1, 1)]
        );
    }

    #[test]
    fn test_policy_zero_overlap() {
        let keys = apply_expiration_policy(three_keys(), 0);
        assert_eq!(keys[0].expires_at, utc(2025, 1, 1));
        assert_eq!(keys[1].expires_at, utc(2026, 1, 1));
    }

    #[test]
    fn test_policy_empty_and_single() {
        assert!(apply_expiration_policy(Vec::new(), 30).is_empty());

        let single = apply_expiration_policy(vec![KeyEntry::new("only", utc(2024, 3, 15))], 30);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].expires_at, utc(2034, 3, 15));
    }

    #[test]
    fn test_policy_leap_day_tail() {
        let keys = apply_expiration_policy(vec![KeyEntry::new("a", utc(2024, 2, 29))], 0);
        assert_eq!(keys[0].expires_at, utc(2034, 3, 1));

        let keys = apply_expiration_policy(vec![KeyEntry::new("b", utc(2024, 2, 28))], 0);
        assert_eq!(keys[0].expires_at, utc(2034, 2, 28));

        let noon = Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap();
        let keys = apply_expiration_policy(vec![KeyEntry::new("c", noon)], 0);
        assert_eq!(
            keys[0].expires_at,
            Utc.with_ymd_and_hms(2034, 3, 1, 12, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_policy_is_idempotent() {
        let once = apply_expiration_policy(three_keys(), 90);
        let twice = apply_expiration_policy(once.clone(), 90);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_policy_saturates_instead_of_overflowing() {
        let near_max = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        let keys = apply_expiration_policy(
            vec![KeyEntry::new("a", utc(2024, 1, 1)), KeyEntry::new("b", near_max)],
            30,
        );
        assert_eq!(keys[0].expires_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(keys[1].expires_at, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_active_key_picks_greatest_use_from_not_after_now() {
        let keys = apply_expiration_policy(three_keys(), 180);

        assert!(active_key_at(&keys, utc(2023, 12, 31)).is_none());
        assert_eq!(active_key_at(&keys, utc(2024, 1, 1)).unwrap().key_id, "k1");
        assert_eq!(active_key_at(&keys, utc(2025, 3, 1)).unwrap().key_id, "k2");
        assert_eq!(active_key_at(&keys, utc(2030, 1, 1)).unwrap().key_id, "k3");
    }

    #[test]
    fn test_active_key_ignores_storage_order() {
        let mut keys = apply_expiration_policy(three_keys(), 180);
        keys.reverse();
        assert_eq!(active_key_at(&keys, utc(2025, 3, 1)).unwrap().key_id, "k2");
    }

    #[test]
    fn test_active_key_tie_first_encountered_wins() {
        let keys = vec![
            KeyEntry::new("first", utc(2024, 1, 1)),
            KeyEntry::new("second", utc(2024, 1, 1)),
        ];
        assert_eq!(
            active_key_at(&keys, utc(2024, 6, 1)).unwrap().key_id,
            "first"
        );
    }

    #[test]
    fn test_visible_between_second_and_third_use_from() {
        let keys = apply_expiration_policy(three_keys(), 180);

        // Still inside the first key's overlap window; k3 is pre-published
        let now = utc(2025, 3, 1);
        assert_eq!(active_key_at(&keys, now).unwrap().key_id, "k2");
        assert_eq!(ids(&visible_keys_at(&keys, now)), vec!["k1", "k2", "k3"]);

        // Overlap elapsed, k1 drops out
        let now = utc(2025, 8, 1);
        assert_eq!(active_key_at(&keys, now).unwrap().key_id, "k2");
        assert_eq!(ids(&visible_keys_at(&keys, now)), vec!["k2", "k3"]);

        // Among the first two keys only
        let first_two = &keys[..2];
        assert_eq!(
            ids(&visible_keys_at(first_two, utc(2025, 6, 29))),
            vec!["k1", "k2"]
        );
        assert_eq!(ids(&visible_keys_at(first_two, utc(2025, 6, 30))), vec!["k2"]);
    }

    #[test]
    fn test_visible_uses_strict_expiry() {
        let keys = apply_expiration_policy(three_keys(), 180);
        let at_expiry = utc(2025, 6, 30);
        assert!(!ids(&visible_keys_at(&keys, at_expiry)).contains(&"k1".to_string()));
    }

    #[test]
    fn test_visible_without_active() {
        // A future key is visible for pre-distribution before it signs anything
        let keys = apply_expiration_policy(three_keys(), 180);
        let now = utc(2023, 6, 1);
        assert!(active_key_at(&keys, now).is_none());
        assert_eq!(visible_keys_at(&keys, now).len(), 3);
    }

    #[test]
    fn test_schedule_validate() {
        let schedule = KeySchedule {
            overlap_days: 10,
            jwt: three_keys(),
            jose: vec![KeyEntry::new("e", utc(2024, 1, 1))],
            jwks: vec![KeyEntry::new("p", utc(2024, 1, 1))],
        };
        assert!(schedule.validate().is_ok());

        let mut empty = schedule.clone();
        empty.jose.clear();
        let err = empty.validate().unwrap_err();
        assert!(err.to_string().contains("jose"));

        let mut duplicate = schedule.clone();
        duplicate.jwt[1].use_from = duplicate.jwt[0].use_from;
        assert!(matches!(
            duplicate.validate(),
            Err(PassportError::Configuration(_))
        ));

        let mut blank = schedule;
        blank.jwks[0].key_id = "  ".to_string();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_schedule_with_expiration_policy() {
        let schedule = KeySchedule {
            overlap_days: 180,
            jwt: three_keys(),
            jose: vec![KeyEntry::new("e", utc(2024, 1, 1))],
            jwks: vec![KeyEntry::new("p", utc(2024, 1, 1))],
        }
        .with_expiration_policy();

        assert_eq!(schedule.jwt[0].expires_at, utc(2025, 6, 30));
        assert_eq!(schedule.jose[0].expires_at, utc(2034, 1, 1));
    }
}
