//! Garbage-collection policies (spec §4.5): evaluated against a
//! timestamp-ascending list of snapshot sets sharing a schedule's basename.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

use snapm_core::SnapshotSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GcPolicyType {
    All,
    Count,
    Age,
    Timeline,
}

/// Garbage-collection policy parameters and evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy_type")]
pub enum GcPolicy {
    #[serde(rename = "ALL")]
    All { policy_name: String },
    #[serde(rename = "COUNT")]
    Count { policy_name: String, keep_count: u32 },
    #[serde(rename = "AGE")]
    Age {
        policy_name: String,
        #[serde(default)]
        keep_years: u32,
        #[serde(default)]
        keep_months: u32,
        #[serde(default)]
        keep_weeks: u32,
        #[serde(default)]
        keep_days: u32,
    },
    #[serde(rename = "TIMELINE")]
    Timeline {
        policy_name: String,
        #[serde(default)]
        keep_yearly: u32,
        #[serde(default)]
        keep_quarterly: u32,
        #[serde(default)]
        keep_monthly: u32,
        #[serde(default)]
        keep_weekly: u32,
        #[serde(default)]
        keep_daily: u32,
        #[serde(default)]
        keep_hourly: u32,
    },
}

impl GcPolicy {
    pub fn name(&self) -> &str {
        match self {
            GcPolicy::All { policy_name }
            | GcPolicy::Count { policy_name, .. }
            | GcPolicy::Age { policy_name, .. }
            | GcPolicy::Timeline { policy_name, .. } => policy_name,
        }
    }

    pub fn policy_type(&self) -> GcPolicyType {
        match self {
            GcPolicy::All { .. } => GcPolicyType::All,
            GcPolicy::Count { .. } => GcPolicyType::Count,
            GcPolicy::Age { .. } => GcPolicyType::Age,
            GcPolicy::Timeline { .. } => GcPolicyType::Timeline,
        }
    }

    fn age_to_days(keep_years: u32, keep_months: u32, keep_weeks: u32, keep_days: u32) -> i64 {
        (keep_years as f64 * 365.25 + keep_months as f64 * 30.44 + keep_weeks as f64 * 7.0 + keep_days as f64).ceil() as i64
    }

    /// Evaluate this policy against `sets`, sorted by ascending timestamp,
    /// and return the subset that should be garbage collected.
    pub fn evaluate<'a>(&self, sets: &'a [SnapshotSet]) -> Vec<&'a SnapshotSet> {
        match self {
            GcPolicy::All { .. } => Vec::new(),
            GcPolicy::Count { keep_count, .. } => {
                let end = sets.len().saturating_sub(*keep_count as usize);
                sets[..end].iter().collect()
            }
            GcPolicy::Age { keep_years, keep_months, keep_weeks, keep_days, .. } => {
                let days = Self::age_to_days(*keep_years, *keep_months, *keep_weeks, *keep_days);
                let limit = Local::now() - chrono::Duration::days(days);
                sets.iter().filter(|s| set_datetime(s) < limit).collect()
            }
            GcPolicy::Timeline {
                keep_yearly,
                keep_quarterly,
                keep_monthly,
                keep_weekly,
                keep_daily,
                keep_hourly,
                ..
            } => evaluate_timeline(sets, *keep_yearly, *keep_quarterly, *keep_monthly, *keep_weekly, *keep_daily, *keep_hourly),
        }
    }

    /// `true` if this policy has any non-default keep parameters (always
    /// `true` for `All`).
    pub fn has_params(&self) -> bool {
        match self {
            GcPolicy::All { .. } => true,
            GcPolicy::Count { keep_count, .. } => *keep_count > 0,
            GcPolicy::Age { keep_years, keep_months, keep_weeks, keep_days, .. } => {
                Self::age_to_days(*keep_years, *keep_months, *keep_weeks, *keep_days) > 0
            }
            GcPolicy::Timeline { keep_yearly, keep_quarterly, keep_monthly, keep_weekly, keep_daily, keep_hourly, .. } => {
                [keep_yearly, keep_quarterly, keep_monthly, keep_weekly, keep_daily, keep_hourly].iter().any(|k| **k > 0)
            }
        }
    }
}

fn set_datetime(set: &SnapshotSet) -> DateTime<Local> {
    Local.timestamp_opt(set.timestamp(), 0).single().expect("valid snapshot set timestamp")
}

const CATEGORIES: [&str; 6] = ["yearly", "quarterly", "monthly", "weekly", "daily", "hourly"];

fn category_boundary(dt: DateTime<Local>, category: &str) -> Option<DateTime<Local>> {
    use chrono::Datelike;
    match category {
        "yearly" => Some(Local.with_ymd_and_hms(dt.year(), 1, 1, 0, 0, 0).single()?),
        "quarterly" => {
            if !matches!(dt.month(), 1 | 4 | 7 | 10) {
                return None;
            }
            Some(Local.with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0).single()?)
        }
        "monthly" => Some(Local.with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0).single()?),
        "weekly" => {
            if dt.weekday().num_days_from_monday() != 0 {
                return None;
            }
            Some(Local.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), 0, 0, 0).single()?)
        }
        "daily" => Some(Local.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), 0, 0, 0).single()?),
        "hourly" => Some(Local.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), dt.hour(), 0, 0).single()?),
        _ => None,
    }
}

/// Classifies each set into every category it is the first member of after
/// that category's boundary, then deletes a set only if no category it
/// belongs to wants to keep it (or it belongs to no category at all).
fn evaluate_timeline(
    sets: &[SnapshotSet],
    keep_yearly: u32,
    keep_quarterly: u32,
    keep_monthly: u32,
    keep_weekly: u32,
    keep_daily: u32,
    keep_hourly: u32,
) -> Vec<&SnapshotSet> {
    use std::collections::{HashMap, HashSet};

    let keep_counts: HashMap<&str, u32> = CATEGORIES
        .iter()
        .zip([keep_yearly, keep_quarterly, keep_monthly, keep_weekly, keep_daily, keep_hourly])
        .map(|(c, k)| (*c, k))
        .collect();

    let mut classified: HashMap<&str, Vec<&SnapshotSet>> = CATEGORIES.iter().map(|c| (*c, Vec::new())).collect();
    let mut seen_boundaries: HashMap<&str, HashSet<DateTime<Local>>> = CATEGORIES.iter().map(|c| (*c, HashSet::new())).collect();
    let mut categories_of: HashMap<*const SnapshotSet, Vec<&str>> = HashMap::new();

    for set in sets {
        let dt = set_datetime(set);
        let mut memberships = Vec::new();
        for category in CATEGORIES {
            let Some(boundary) = category_boundary(dt, category) else { continue };
            if dt >= boundary && !seen_boundaries[category].contains(&boundary) {
                classified.get_mut(category).unwrap().push(set);
                seen_boundaries.get_mut(category).unwrap().insert(boundary);
                memberships.push(category);
            }
        }
        categories_of.insert(set as *const SnapshotSet, memberships);
    }

    let kept_by_category: HashMap<&str, HashSet<*const SnapshotSet>> = CATEGORIES
        .iter()
        .map(|category| {
            let keep = keep_counts[category] as usize;
            let members = &classified[category];
            let start = members.len().saturating_sub(keep);
            let kept = if keep == 0 { HashSet::new() } else { members[start..].iter().map(|s| *s as *const SnapshotSet).collect() };
            (*category, kept)
        })
        .collect();

    sets.iter()
        .filter(|set| {
            let ptr = *set as *const SnapshotSet;
            let memberships = &categories_of[&ptr];
            if memberships.is_empty() {
                return true;
            }
            !memberships.iter().any(|category| kept_by_category[category].contains(&ptr))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapm_core::Snapshot;

    fn set_at(name: &str, timestamp: i64) -> SnapshotSet {
        let snapshot = Snapshot::new(
            format!("{name}-snap"),
            name.to_string(),
            None,
            "/dev/vg/origin".to_string(),
            timestamp,
            "/".to_string(),
            "lvm2-cow".to_string(),
            1024,
            512,
        );
        SnapshotSet::new(name, timestamp, vec![snapshot]).unwrap()
    }

    #[test]
    fn count_policy_keeps_newest_n() {
        let sets = vec![set_at("a", 1), set_at("b", 2), set_at("c", 3)];
        let policy = GcPolicy::Count { policy_name: "p".to_string(), keep_count: 2 };
        let deleted = policy.evaluate(&sets);
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].name(), "a");
    }

    #[test]
    fn all_policy_deletes_nothing() {
        let sets = vec![set_at("a", 1)];
        let policy = GcPolicy::All { policy_name: "p".to_string() };
        assert!(policy.evaluate(&sets).is_empty());
    }

    #[test]
    fn timeline_keeps_set_wanted_by_any_category() {
        // A Monday set is both weekly and daily; keep_weekly=1 should save it
        // even though keep_daily=0 would otherwise delete it.
        let monday = Local.with_ymd_and_hms(2026, 7, 27, 0, 0, 0).unwrap().timestamp();
        let sets = vec![set_at("a", monday)];
        let policy = GcPolicy::Timeline {
            policy_name: "p".to_string(),
            keep_yearly: 0,
            keep_quarterly: 0,
            keep_monthly: 0,
            keep_weekly: 1,
            keep_daily: 0,
            keep_hourly: 0,
        };
        assert!(policy.evaluate(&sets).is_empty());
    }

    #[test]
    fn timeline_deletes_set_no_category_wants() {
        let tuesday = Local.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap().timestamp();
        let sets = vec![set_at("a", tuesday)];
        let policy = GcPolicy::Timeline {
            policy_name: "p".to_string(),
            keep_yearly: 0,
            keep_quarterly: 0,
            keep_monthly: 0,
            keep_weekly: 0,
            keep_daily: 0,
            keep_hourly: 0,
        };
        let deleted = policy.evaluate(&sets);
        assert_eq!(deleted.len(), 1);
    }
}
