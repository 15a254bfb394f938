//! Slowly changing dimension versioning.
//!
//! Versions of one business key move `Current -> Historical` as newer versions are
//! opened. SCD2 periods are half-open: a version is active from its start up to,
//! but excluding, the next version's start; the current version ends at a sentinel.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use seedforge_core::DataType;

use crate::generators::GeneratedValue;

/// Largest gap between consecutive version starts, in days.
pub const MAX_VERSION_GAP_DAYS: u64 = 365;

/// Upper bound (exclusive) of in-place updates applied to an SCD1 row.
pub const SCD1_MAX_UPDATES: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
    /// The latest version of its business key.
    Current,
    /// Closed by a newer version.
    Historical,
}

impl VersionState {
    pub fn of(version_index: u64, versions: u64) -> Self {
        if version_index + 1 >= versions {
            VersionState::Current
        } else {
            VersionState::Historical
        }
    }
}

/// End marker of the current version.
pub fn open_end(dtype: DataType) -> Option<GeneratedValue> {
    let date = NaiveDate::from_ymd_opt(9999, 12, 31)?;
    match dtype {
        DataType::Date => Some(GeneratedValue::Date(date)),
        DataType::Datetime => {
            let time = NaiveTime::from_hms_opt(23, 59, 59)?;
            Some(GeneratedValue::Timestamp(NaiveDateTime::new(date, time)))
        }
        _ => None,
    }
}

/// Start of every version: `first`, then each later start a random positive gap after the previous one.
///
/// Returns `None` when the chain would reach the open-end sentinel.
pub fn version_starts(
    first: &GeneratedValue,
    versions: u64,
    rng: &mut dyn RngCore,
) -> Option<Vec<GeneratedValue>> {
    let mut starts = Vec::with_capacity(versions as usize);
    starts.push(first.clone());
    let mut current = first.clone();
    for _ in 1..versions {
        current = advance(&current, rng)?;
        starts.push(current.clone());
    }
    Some(starts)
}

fn advance(value: &GeneratedValue, rng: &mut dyn RngCore) -> Option<GeneratedValue> {
    let next = match value {
        GeneratedValue::Date(date) => {
            let gap = rng.random_range(1..=MAX_VERSION_GAP_DAYS);
            GeneratedValue::Date(date.checked_add_days(Days::new(gap))?)
        }
        GeneratedValue::Timestamp(ts) => {
            let gap = rng.random_range(1..=(MAX_VERSION_GAP_DAYS * 86_400) as i64);
            GeneratedValue::Timestamp(ts.checked_add_signed(TimeDelta::seconds(gap))?)
        }
        _ => return None,
    };
    let sentinel = match &next {
        GeneratedValue::Date(_) => open_end(DataType::Date),
        _ => open_end(DataType::Datetime),
    }?;
    if below(&next, &sentinel) { Some(next) } else { None }
}

fn below(left: &GeneratedValue, right: &GeneratedValue) -> bool {
    match (left, right) {
        (GeneratedValue::Date(a), GeneratedValue::Date(b)) => a < b,
        (GeneratedValue::Timestamp(a), GeneratedValue::Timestamp(b)) => a < b,
        _ => false,
    }
}

/// Active period of `version`: its own start, and the next start or the sentinel.
pub fn period(
    starts: &[GeneratedValue],
    version: usize,
    dtype: DataType,
) -> Option<(GeneratedValue, GeneratedValue)> {
    let from = starts.get(version)?.clone();
    let to = match starts.get(version + 1) {
        Some(next) => next.clone(),
        None => open_end(dtype)?,
    };
    Some((from, to))
}

/// Number of overwrite events an SCD1 row went through.
pub fn scd1_updates(rng: &mut dyn RngCore) -> u32 {
    rng.random_range(0..SCD1_MAX_UPDATES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn date(raw: &str) -> GeneratedValue {
        GeneratedValue::Date(NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date"))
    }

    #[test]
    fn periods_chain_without_overlap() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let starts = version_starts(&date("2020-01-01"), 3, &mut rng).expect("chain");
        assert_eq!(starts.len(), 3);
        for version in 0..3 {
            let (from, to) = period(&starts, version, DataType::Date).expect("period");
            assert!(below(&from, &to));
            if version < 2 {
                assert_eq!(to, starts[version + 1]);
            } else {
                assert_eq!(to, date("9999-12-31"));
            }
        }
    }

    #[test]
    fn datetime_sentinel_is_end_of_day() {
        assert_eq!(
            open_end(DataType::Datetime).map(|value| value.render()),
            Some("9999-12-31T23:59:59Z".to_string())
        );
        assert_eq!(open_end(DataType::Text), None);
    }

    #[test]
    fn chain_stops_before_the_sentinel() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(version_starts(&date("9999-12-30"), 2, &mut rng).is_none());
    }

    #[test]
    fn only_the_last_version_is_current() {
        assert_eq!(VersionState::of(0, 2), VersionState::Historical);
        assert_eq!(VersionState::of(1, 2), VersionState::Current);
        assert_eq!(VersionState::of(0, 1), VersionState::Current);
    }
}
