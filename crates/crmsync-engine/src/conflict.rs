//! Conflict detection and resolution between entity versions.
//!
//! Resolution is a pure function of the two versions: it never touches
//! the store or the network, so every strategy is deterministic and
//! directly testable. Fields that carry money or identity always force
//! manual review regardless of strategy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::entity::StandardEntity;

/// Fields where silent auto-resolution is never acceptable.
const CRITICAL_FIELDS: &[&str] = &["email", "amount", "closeDate"];

/// Shape of a single field disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides have a value and they differ.
    ValueMismatch,
    /// Target has a value the source lacks.
    MissingSource,
    /// Source has a value the target lacks.
    MissingTarget,
}

/// How to resolve field conflicts automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Incoming platform data wins.
    #[default]
    SourceWins,
    /// The stored version wins.
    TargetWins,
    /// The version with the fresher update timestamp wins.
    NewestWins,
    /// The version with more populated checked fields wins.
    MostCompleteWins,
    /// Field-by-field: on mismatch take the longer value.
    Merge,
    /// Never auto-resolve; flag everything for review.
    Manual,
}

impl ConflictStrategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::SourceWins => "source_wins",
            ConflictStrategy::TargetWins => "target_wins",
            ConflictStrategy::NewestWins => "newest_wins",
            ConflictStrategy::MostCompleteWins => "most_complete_wins",
            ConflictStrategy::Merge => "merge",
            ConflictStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "source_wins" => Ok(ConflictStrategy::SourceWins),
            "target_wins" => Ok(ConflictStrategy::TargetWins),
            "newest_wins" => Ok(ConflictStrategy::NewestWins),
            "most_complete_wins" => Ok(ConflictStrategy::MostCompleteWins),
            "merge" => Ok(ConflictStrategy::Merge),
            "manual" => Ok(ConflictStrategy::Manual),
            _ => Err(format!("Unknown conflict strategy: {s}")),
        }
    }
}

/// One field-level disagreement between two versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConflict {
    /// Standardized field name.
    pub field: String,
    pub kind: ConflictKind,
    /// Incoming value, if present.
    pub source_value: Option<Value>,
    /// Stored value, if present.
    pub target_value: Option<Value>,
    /// Whether this field forces manual review.
    pub critical: bool,
}

/// Outcome of resolving two versions of an entity.
#[derive(Debug, Clone)]
pub struct ConflictResolution {
    /// Strategy that was applied.
    pub strategy: ConflictStrategy,
    /// The merged entity to persist.
    pub resolved: StandardEntity,
    /// Field conflicts that were detected, resolved or not.
    pub conflicts: Vec<FieldConflict>,
    /// True when a human must confirm before the record is trusted.
    pub requires_manual_review: bool,
}

/// Pure field-level conflict resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConflictResolver;

impl ConflictResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Detect field conflicts between an incoming source version and
    /// the stored target version.
    ///
    /// A value counts as absent when it is missing, null, or an empty
    /// string.
    #[must_use]
    pub fn detect(&self, source: &StandardEntity, target: &StandardEntity) -> Vec<FieldConflict> {
        let mut conflicts = Vec::new();
        for field in StandardEntity::conflict_fields(source.kind()) {
            let s = present(source.field(field));
            let t = present(target.field(field));
            let kind = match (&s, &t) {
                (Some(sv), Some(tv)) if sv != tv => ConflictKind::ValueMismatch,
                (None, Some(_)) => ConflictKind::MissingSource,
                (Some(_), None) => ConflictKind::MissingTarget,
                _ => continue,
            };
            conflicts.push(FieldConflict {
                field: (*field).to_string(),
                kind,
                source_value: s,
                target_value: t,
                critical: CRITICAL_FIELDS.contains(field),
            });
        }
        conflicts
    }

    /// Resolve two versions under a strategy.
    ///
    /// With no conflicts the source version is taken as-is. Each
    /// strategy chooses a whole base record: target for TargetWins and
    /// Manual, the fresher or fuller record for NewestWins and
    /// MostCompleteWins, target overlaid with every present source
    /// field for SourceWins. Critical fields always set the
    /// manual-review flag, whatever the strategy.
    #[must_use]
    pub fn resolve(
        &self,
        source: &StandardEntity,
        target: &StandardEntity,
        strategy: ConflictStrategy,
    ) -> ConflictResolution {
        let conflicts = self.detect(source, target);
        if conflicts.is_empty() {
            return ConflictResolution {
                strategy,
                resolved: source.clone(),
                conflicts,
                requires_manual_review: false,
            };
        }

        let requires_manual_review =
            strategy == ConflictStrategy::Manual || conflicts.iter().any(|c| c.critical);

        let resolved = match strategy {
            // Manual never auto-resolves: the stored version stays
            // as-is until a human decides.
            ConflictStrategy::Manual | ConflictStrategy::TargetWins => target.clone(),
            ConflictStrategy::SourceWins => source_over_target(source, target),
            ConflictStrategy::NewestWins => {
                if newest_is_target(source, target) {
                    target.clone()
                } else {
                    source.clone()
                }
            }
            ConflictStrategy::MostCompleteWins => {
                if completeness(target) > completeness(source) {
                    target.clone()
                } else {
                    source.clone()
                }
            }
            ConflictStrategy::Merge => {
                let mut merged = source.clone();
                for conflict in &conflicts {
                    if let Some(value) = merge_values(
                        conflict.source_value.as_ref(),
                        conflict.target_value.as_ref(),
                    ) {
                        merged.set_field(&conflict.field, value);
                    }
                }
                merged
            }
        };

        ConflictResolution {
            strategy,
            resolved,
            conflicts,
            requires_manual_review,
        }
    }
}

/// Target overlaid with every present source field: source values take
/// precedence, target fills the gaps.
fn source_over_target(source: &StandardEntity, target: &StandardEntity) -> StandardEntity {
    let mut resolved = source.clone();
    for field in StandardEntity::conflict_fields(source.kind()) {
        if present(source.field(field)).is_none() {
            if let Some(value) = present(target.field(field)) {
                resolved.set_field(field, value);
            }
        }
    }
    for (key, value) in &target.custom_fields {
        if !resolved.custom_fields.contains_key(key) {
            resolved.custom_fields.insert(key.clone(), value.clone());
        }
    }
    resolved
}

/// Number of non-empty checked fields in a record.
fn completeness(entity: &StandardEntity) -> usize {
    StandardEntity::conflict_fields(entity.kind())
        .iter()
        .filter(|field| present(entity.field(field)).is_some())
        .count()
}

/// Treat null and empty strings as absent.
fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

/// Source wins ties and the case where neither side has a timestamp.
fn newest_is_target(source: &StandardEntity, target: &StandardEntity) -> bool {
    match (source.effective_timestamp(), target.effective_timestamp()) {
        (Some(s), Some(t)) => t > s,
        (None, Some(_)) => true,
        _ => false,
    }
}

/// Merge semantics: both present and mismatched takes the longer
/// string representation; one-sided takes the present one.
fn merge_values(source: Option<&Value>, target: Option<&Value>) -> Option<Value> {
    match (source, target) {
        (Some(s), Some(t)) => {
            if value_len(t) > value_len(s) {
                Some(t.clone())
            } else {
                Some(s.clone())
            }
        }
        (Some(s), None) => Some(s.clone()),
        (None, Some(t)) => Some(t.clone()),
        (None, None) => None,
    }
}

fn value_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.len(),
        other => other.to_string().len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crmsync_adapter::{CrmPlatform, EntityKind};
    use serde_json::json;
    use uuid::Uuid;

    fn contact(first: &str, phone: Option<&str>) -> StandardEntity {
        let mut e = StandardEntity::new(
            "c1",
            CrmPlatform::HubSpot,
            Uuid::nil(),
            EntityKind::Contact,
        );
        e.set_field("firstName", json!(first));
        if let Some(p) = phone {
            e.set_field("phone", json!(p));
        }
        e
    }

    #[test]
    fn test_no_conflicts_takes_source() {
        let source = contact("Ada", Some("123"));
        let target = contact("Ada", Some("123"));
        let resolution = ConflictResolver::new().resolve(
            &source,
            &target,
            ConflictStrategy::Manual,
        );
        assert!(resolution.conflicts.is_empty());
        assert!(!resolution.requires_manual_review);
        assert_eq!(resolution.resolved.field("firstName"), Some(json!("Ada")));
    }

    #[test]
    fn test_detect_kinds() {
        let source = contact("Ada", None);
        let target = contact("Adeline", Some("123"));
        let conflicts = ConflictResolver::new().detect(&source, &target);
        let by_field = |f: &str| conflicts.iter().find(|c| c.field == f).unwrap();
        assert_eq!(by_field("firstName").kind, ConflictKind::ValueMismatch);
        assert_eq!(by_field("phone").kind, ConflictKind::MissingSource);
    }

    #[test]
    fn test_empty_string_counts_as_absent() {
        let mut source = contact("Ada", None);
        source.set_field("phone", json!(""));
        let target = contact("Ada", Some("123"));
        let conflicts = ConflictResolver::new().detect(&source, &target);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::MissingSource);
    }

    #[test]
    fn test_target_wins() {
        let source = contact("Ada", None);
        let target = contact("Adeline", None);
        let resolution =
            ConflictResolver::new().resolve(&source, &target, ConflictStrategy::TargetWins);
        assert_eq!(
            resolution.resolved.field("firstName"),
            Some(json!("Adeline"))
        );
        assert!(!resolution.requires_manual_review);
    }

    #[test]
    fn test_target_wins_ignores_source_only_fields() {
        let source = contact("Ada", Some("555"));
        let target = contact("Adeline", None);
        let resolution =
            ConflictResolver::new().resolve(&source, &target, ConflictStrategy::TargetWins);
        assert_eq!(
            resolution.resolved.field("firstName"),
            Some(json!("Adeline"))
        );
        // The stored version stays exactly as it was.
        assert_eq!(resolution.resolved.field("phone"), None);
    }

    #[test]
    fn test_source_wins_keeps_target_only_fields() {
        let source = contact("Ada", None);
        let target = contact("Adeline", Some("123"));
        let resolution =
            ConflictResolver::new().resolve(&source, &target, ConflictStrategy::SourceWins);
        assert_eq!(resolution.resolved.field("firstName"), Some(json!("Ada")));
        // Fields the source lacks are not blanked.
        assert_eq!(resolution.resolved.field("phone"), Some(json!("123")));
    }

    #[test]
    fn test_newest_wins_prefers_fresher_timestamp() {
        let mut source = contact("Ada", None);
        let mut target = contact("Adeline", None);
        source.updated_at = Some(Utc::now() - Duration::hours(2));
        target.updated_at = Some(Utc::now());
        let resolution =
            ConflictResolver::new().resolve(&source, &target, ConflictStrategy::NewestWins);
        assert_eq!(
            resolution.resolved.field("firstName"),
            Some(json!("Adeline"))
        );
    }

    #[test]
    fn test_newest_wins_defaults_to_source_without_timestamps() {
        let source = contact("Ada", None);
        let target = contact("Adeline", None);
        let resolution =
            ConflictResolver::new().resolve(&source, &target, ConflictStrategy::NewestWins);
        assert_eq!(resolution.resolved.field("firstName"), Some(json!("Ada")));
    }

    #[test]
    fn test_most_complete_fills_gaps() {
        let source = contact("Ada", None);
        let target = contact("Ada", Some("123"));
        let resolution = ConflictResolver::new().resolve(
            &source,
            &target,
            ConflictStrategy::MostCompleteWins,
        );
        assert_eq!(resolution.resolved.field("phone"), Some(json!("123")));
    }

    #[test]
    fn test_most_complete_compares_whole_records() {
        let source = contact("Ada", None);
        let mut target = contact("Adeline", Some("123"));
        target.set_field("company", json!("Analytical Engines"));
        target.set_field("lastName", json!("Lovelace"));
        let resolution = ConflictResolver::new().resolve(
            &source,
            &target,
            ConflictStrategy::MostCompleteWins,
        );
        // The fuller record wins as a whole, mismatched fields included.
        assert_eq!(
            resolution.resolved.field("firstName"),
            Some(json!("Adeline"))
        );
        assert_eq!(resolution.resolved.field("phone"), Some(json!("123")));
    }

    #[test]
    fn test_most_complete_tie_favors_source() {
        let source = contact("Ada", Some("555"));
        let target = contact("Adeline", Some("123"));
        let resolution = ConflictResolver::new().resolve(
            &source,
            &target,
            ConflictStrategy::MostCompleteWins,
        );
        assert_eq!(resolution.resolved.field("firstName"), Some(json!("Ada")));
    }

    #[test]
    fn test_merge_takes_longer_value() {
        let source = contact("Ada", None);
        let target = contact("Adeline", None);
        let resolution =
            ConflictResolver::new().resolve(&source, &target, ConflictStrategy::Merge);
        assert_eq!(
            resolution.resolved.field("firstName"),
            Some(json!("Adeline"))
        );
    }

    #[test]
    fn test_critical_field_forces_review() {
        let mut source = contact("Ada", None);
        source.set_field("email", json!("ada@new.example.com"));
        let mut target = contact("Ada", None);
        target.set_field("email", json!("ada@old.example.com"));
        let resolution =
            ConflictResolver::new().resolve(&source, &target, ConflictStrategy::SourceWins);
        assert!(resolution.requires_manual_review);
        assert!(resolution.conflicts.iter().any(|c| c.critical));
        // Source still applied so the record is not stale while pending.
        assert_eq!(
            resolution.resolved.field("email"),
            Some(json!("ada@new.example.com"))
        );
    }

    #[test]
    fn test_manual_strategy_keeps_target_and_flags() {
        let source = contact("Ada", None);
        let target = contact("Adeline", None);
        let resolution =
            ConflictResolver::new().resolve(&source, &target, ConflictStrategy::Manual);
        assert!(resolution.requires_manual_review);
        // Nothing is auto-applied under manual.
        assert_eq!(
            resolution.resolved.field("firstName"),
            Some(json!("Adeline"))
        );
    }

    #[test]
    fn test_strategy_roundtrip() {
        for strategy in [
            ConflictStrategy::SourceWins,
            ConflictStrategy::TargetWins,
            ConflictStrategy::NewestWins,
            ConflictStrategy::MostCompleteWins,
            ConflictStrategy::Merge,
            ConflictStrategy::Manual,
        ] {
            let parsed: ConflictStrategy = strategy.as_str().parse().unwrap();
            assert_eq!(strategy, parsed);
        }
    }
}
