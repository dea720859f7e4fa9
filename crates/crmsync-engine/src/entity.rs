//! Standardized CRM entities.
//!
//! Every record pulled from a platform is normalized into a
//! [`StandardEntity`] with typed attributes per kind plus a bag of
//! custom fields. Fields are addressed by camelCase name so the mapper
//! and conflict resolver can work over all kinds uniformly.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crmsync_adapter::{CrmPlatform, EntityKind};

use crate::types::RecordSyncStatus;

/// Typed attributes of a contact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
}

/// Typed attributes of a deal or opportunity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealFields {
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub stage: Option<String>,
    /// Win probability in percent, 0..=100.
    pub probability: Option<u8>,
    pub close_date: Option<NaiveDate>,
    pub description: Option<String>,
}

/// Typed attributes of a lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
}

/// Kind-specific attributes of a standardized entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityAttributes {
    Contact(ContactFields),
    Deal(DealFields),
    Lead(LeadFields),
}

impl EntityAttributes {
    /// Create empty attributes for a kind.
    #[must_use]
    pub fn empty(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Contact => EntityAttributes::Contact(ContactFields::default()),
            EntityKind::Deal => EntityAttributes::Deal(DealFields::default()),
            EntityKind::Lead => EntityAttributes::Lead(LeadFields::default()),
        }
    }

    /// Entity kind of these attributes.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityAttributes::Contact(_) => EntityKind::Contact,
            EntityAttributes::Deal(_) => EntityKind::Deal,
            EntityAttributes::Lead(_) => EntityKind::Lead,
        }
    }
}

/// Identity of an entity across sync runs.
///
/// Uniqueness is enforced over this triple: one local row per owning
/// user, platform, and platform-native record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub user_id: Uuid,
    pub platform: CrmPlatform,
    pub external_id: String,
}

impl NaturalKey {
    pub fn new(user_id: Uuid, platform: CrmPlatform, external_id: impl Into<String>) -> Self {
        Self {
            user_id,
            platform,
            external_id: external_id.into(),
        }
    }
}

/// A CRM record normalized into the common schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardEntity {
    /// Platform-native record id.
    pub external_id: String,
    /// Platform the record came from.
    pub platform: CrmPlatform,
    /// Owning user.
    pub user_id: Uuid,
    /// Typed attributes per kind.
    pub attributes: EntityAttributes,
    /// Platform fields with no standardized counterpart.
    pub custom_fields: serde_json::Map<String, Value>,
    /// Last time this record was written by a sync run.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Per-record bookkeeping status.
    pub sync_status: RecordSyncStatus,
    /// Error from the last failed sync attempt, if any.
    pub sync_error: Option<String>,
    /// Remote creation timestamp, when the platform reports one.
    pub created_at: Option<DateTime<Utc>>,
    /// Remote update timestamp, when the platform reports one.
    pub updated_at: Option<DateTime<Utc>>,
}

impl StandardEntity {
    /// Create an empty entity of the given kind.
    #[must_use]
    pub fn new(
        external_id: impl Into<String>,
        platform: CrmPlatform,
        user_id: Uuid,
        kind: EntityKind,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            platform,
            user_id,
            attributes: EntityAttributes::empty(kind),
            custom_fields: serde_json::Map::new(),
            last_sync_at: None,
            sync_status: RecordSyncStatus::Pending,
            sync_error: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Entity kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.attributes.kind()
    }

    /// Natural key of this entity.
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(self.user_id, self.platform, self.external_id.clone())
    }

    /// Best available freshness timestamp: `updated_at`, falling back
    /// to `created_at`.
    #[must_use]
    pub fn effective_timestamp(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }

    /// Read a standardized field by camelCase name. Unknown names fall
    /// through to `custom_fields`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        let typed = match &self.attributes {
            EntityAttributes::Contact(c) => match name {
                "firstName" => opt_str(&c.first_name),
                "lastName" => opt_str(&c.last_name),
                "email" => opt_str(&c.email),
                "phone" => opt_str(&c.phone),
                "company" => opt_str(&c.company),
                "jobTitle" => opt_str(&c.job_title),
                _ => None,
            },
            EntityAttributes::Deal(d) => match name {
                "name" => opt_str(&d.name),
                "amount" => d.amount.and_then(|a| {
                    serde_json::Number::from_f64(a).map(Value::Number)
                }),
                "currency" => opt_str(&d.currency),
                "stage" => opt_str(&d.stage),
                "probability" => d.probability.map(|p| Value::Number(p.into())),
                "closeDate" => d
                    .close_date
                    .map(|date| Value::String(date.format("%Y-%m-%d").to_string())),
                "description" => opt_str(&d.description),
                _ => None,
            },
            EntityAttributes::Lead(l) => match name {
                "firstName" => opt_str(&l.first_name),
                "lastName" => opt_str(&l.last_name),
                "email" => opt_str(&l.email),
                "company" => opt_str(&l.company),
                "status" => opt_str(&l.status),
                "source" => opt_str(&l.source),
                _ => None,
            },
        };
        typed.or_else(|| self.custom_fields.get(name).cloned())
    }

    /// Write a standardized field by camelCase name. Unknown names and
    /// values of the wrong shape land in `custom_fields` so nothing is
    /// dropped.
    pub fn set_field(&mut self, name: &str, value: Value) {
        let consumed = match &mut self.attributes {
            EntityAttributes::Contact(c) => match name {
                "firstName" => set_str(&mut c.first_name, &value),
                "lastName" => set_str(&mut c.last_name, &value),
                "email" => set_str(&mut c.email, &value),
                "phone" => set_str(&mut c.phone, &value),
                "company" => set_str(&mut c.company, &value),
                "jobTitle" => set_str(&mut c.job_title, &value),
                _ => false,
            },
            EntityAttributes::Deal(d) => match name {
                "name" => set_str(&mut d.name, &value),
                "amount" => {
                    if let Some(n) = value.as_f64() {
                        d.amount = Some(n);
                        true
                    } else {
                        false
                    }
                }
                "currency" => set_str(&mut d.currency, &value),
                "stage" => set_str(&mut d.stage, &value),
                "probability" => {
                    if let Some(p) = value.as_u64().filter(|p| *p <= 100) {
                        d.probability = Some(p as u8);
                        true
                    } else {
                        false
                    }
                }
                "closeDate" => {
                    if let Some(s) = value.as_str() {
                        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                            d.close_date = Some(date);
                            return;
                        }
                    }
                    false
                }
                "description" => set_str(&mut d.description, &value),
                _ => false,
            },
            EntityAttributes::Lead(l) => match name {
                "firstName" => set_str(&mut l.first_name, &value),
                "lastName" => set_str(&mut l.last_name, &value),
                "email" => set_str(&mut l.email, &value),
                "company" => set_str(&mut l.company, &value),
                "status" => set_str(&mut l.status, &value),
                "source" => set_str(&mut l.source, &value),
                _ => false,
            },
        };
        if !consumed {
            self.custom_fields.insert(name.to_string(), value);
        }
    }

    /// Standardized field names that participate in conflict detection
    /// for a kind.
    #[must_use]
    pub fn conflict_fields(kind: EntityKind) -> &'static [&'static str] {
        match kind {
            EntityKind::Contact => &["firstName", "lastName", "email", "phone", "company"],
            EntityKind::Deal => &[
                "name",
                "amount",
                "stage",
                "closeDate",
                "probability",
                "description",
            ],
            EntityKind::Lead => &["firstName", "lastName", "email", "company", "status"],
        }
    }
}

fn opt_str(value: &Option<String>) -> Option<Value> {
    value.as_ref().map(|s| Value::String(s.clone()))
}

fn set_str(slot: &mut Option<String>, value: &Value) -> bool {
    match value.as_str() {
        Some(s) => {
            *slot = Some(s.to_string());
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deal() -> StandardEntity {
        StandardEntity::new("d1", CrmPlatform::HubSpot, Uuid::new_v4(), EntityKind::Deal)
    }

    #[test]
    fn test_field_roundtrip_on_deal() {
        let mut e = deal();
        e.set_field("name", json!("Acme Deal"));
        e.set_field("amount", json!(5000.0));
        e.set_field("stage", json!("negotiation"));
        e.set_field("closeDate", json!("2026-09-30"));

        assert_eq!(e.field("name"), Some(json!("Acme Deal")));
        assert_eq!(e.field("amount"), Some(json!(5000.0)));
        assert_eq!(e.field("stage"), Some(json!("negotiation")));
        assert_eq!(e.field("closeDate"), Some(json!("2026-09-30")));
        match &e.attributes {
            EntityAttributes::Deal(d) => {
                assert_eq!(d.amount, Some(5000.0));
                assert_eq!(
                    d.close_date,
                    Some(NaiveDate::from_ymd_opt(2026, 9, 30).unwrap())
                );
            }
            other => panic!("expected deal attributes, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_field_goes_to_custom() {
        let mut e = deal();
        e.set_field("hs_pipeline", json!("default"));
        assert_eq!(e.field("hs_pipeline"), Some(json!("default")));
        assert!(e.custom_fields.contains_key("hs_pipeline"));
    }

    #[test]
    fn test_wrong_shape_lands_in_custom() {
        let mut e = deal();
        e.set_field("amount", json!("not a number"));
        assert!(e.custom_fields.contains_key("amount"));
        match &e.attributes {
            EntityAttributes::Deal(d) => assert!(d.amount.is_none()),
            other => panic!("expected deal attributes, got {other:?}"),
        }
    }

    #[test]
    fn test_probability_range_enforced() {
        let mut e = deal();
        e.set_field("probability", json!(150));
        match &e.attributes {
            EntityAttributes::Deal(d) => assert!(d.probability.is_none()),
            other => panic!("expected deal attributes, got {other:?}"),
        }
        e.set_field("probability", json!(75));
        assert_eq!(e.field("probability"), Some(json!(75)));
    }

    #[test]
    fn test_effective_timestamp_falls_back() {
        let mut e = deal();
        assert!(e.effective_timestamp().is_none());
        let created = Utc::now();
        e.created_at = Some(created);
        assert_eq!(e.effective_timestamp(), Some(created));
        let updated = created + chrono::Duration::hours(1);
        e.updated_at = Some(updated);
        assert_eq!(e.effective_timestamp(), Some(updated));
    }

    #[test]
    fn test_natural_key_identity() {
        let user = Uuid::new_v4();
        let a = StandardEntity::new("x", CrmPlatform::Zoho, user, EntityKind::Contact);
        let b = StandardEntity::new("x", CrmPlatform::Zoho, user, EntityKind::Lead);
        // Same key regardless of kind; kind is not part of identity.
        assert_eq!(a.natural_key(), b.natural_key());
        let c = StandardEntity::new("x", CrmPlatform::Pipedrive, user, EntityKind::Contact);
        assert_ne!(a.natural_key(), c.natural_key());
    }

    #[test]
    fn test_conflict_fields_per_kind() {
        assert!(StandardEntity::conflict_fields(EntityKind::Contact).contains(&"email"));
        assert!(StandardEntity::conflict_fields(EntityKind::Deal).contains(&"closeDate"));
        assert!(StandardEntity::conflict_fields(EntityKind::Lead).contains(&"status"));
    }
}
