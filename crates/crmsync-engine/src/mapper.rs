//! Field mapping between platform payloads and standardized entities.
//!
//! Each (platform, kind) pair has a static rule table. A rule either
//! reads a path out of the raw record (dotted paths descend into
//! nested objects) or derives the value with a function, for shapes a
//! path cannot express such as Pipedrive's email arrays. Reverse
//! mapping uses the path rules only.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crmsync_adapter::{CrmPlatform, EntityKind, RawRecord};

use crate::entity::StandardEntity;
use crate::error::{Result, SyncError};

/// How a standardized field is produced from a raw record.
#[derive(Clone, Copy)]
pub enum FieldSource {
    /// Read a (possibly dotted) path out of the raw record.
    Path(&'static str),
    /// Compute the value from the whole raw record.
    Derived(fn(&RawRecord) -> Option<Value>),
}

/// One standardized field and where it comes from.
#[derive(Clone, Copy)]
pub struct FieldRule {
    /// Standardized camelCase field name.
    pub field: &'static str,
    pub source: FieldSource,
}

const fn path(field: &'static str, p: &'static str) -> FieldRule {
    FieldRule {
        field,
        source: FieldSource::Path(p),
    }
}

const fn derived(field: &'static str, f: fn(&RawRecord) -> Option<Value>) -> FieldRule {
    FieldRule {
        field,
        source: FieldSource::Derived(f),
    }
}

/// Maps raw platform records to [`StandardEntity`] values and back.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldMapper;

impl FieldMapper {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Normalize one raw record into the common schema.
    ///
    /// The record id is required and its absence fails the record; any
    /// individual field that fails to map is logged and skipped.
    pub fn map_from_platform(
        &self,
        platform: CrmPlatform,
        kind: EntityKind,
        user_id: Uuid,
        raw: &RawRecord,
    ) -> Result<StandardEntity> {
        let external_id = extract_id(platform, kind, raw).ok_or_else(|| {
            SyncError::mapping("<unknown>", format!("{platform} record has no id field"))
        })?;

        let mut entity = StandardEntity::new(external_id.clone(), platform, user_id, kind);
        entity.created_at = extract_timestamp(raw, created_key(platform));
        entity.updated_at = extract_timestamp(raw, updated_key(platform));

        let mut mapped_paths: Vec<&str> = vec![id_key(platform, kind)];
        mapped_paths.push(created_key(platform));
        mapped_paths.push(updated_key(platform));

        for rule in rules(platform, kind) {
            let value = match rule.source {
                FieldSource::Path(p) => {
                    mapped_paths.push(p);
                    lookup_path(raw, p)
                        .cloned()
                        .or_else(|| lookup_aliases(raw, rule.field))
                }
                FieldSource::Derived(f) => f(raw),
            };
            match value {
                Some(v) if !v.is_null() => entity.set_field(rule.field, v),
                _ => {
                    warn!(
                        platform = %platform,
                        field = rule.field,
                        external_id = %external_id,
                        "source field missing or unmappable, skipping"
                    );
                }
            }
        }

        // Everything unmapped that is a scalar survives as a custom field.
        if let Some(obj) = raw.as_object() {
            for (key, value) in obj {
                if mapped_paths.contains(&key.as_str()) || !is_scalar(value) {
                    continue;
                }
                entity.custom_fields.insert(key.clone(), value.clone());
            }
        }

        Ok(entity)
    }

    /// Render an entity back into a platform payload.
    ///
    /// Only path rules with flat paths reverse cleanly; derived fields
    /// and nested paths are left out.
    #[must_use]
    pub fn map_to_platform(&self, entity: &StandardEntity) -> RawRecord {
        let mut out = serde_json::Map::new();
        for rule in rules(entity.platform, entity.kind()) {
            if let FieldSource::Path(p) = rule.source {
                if p.contains('.') {
                    continue;
                }
                if let Some(value) = entity.field(rule.field) {
                    out.insert(p.to_string(), value);
                }
            }
        }
        for (key, value) in &entity.custom_fields {
            out.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(out)
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Number(_) | Value::Bool(_)
    )
}

/// Descend a dotted path through nested objects.
fn lookup_path<'a>(raw: &'a RawRecord, path: &str) -> Option<&'a Value> {
    let mut current = raw;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Common renamings across platforms, tried when the primary path misses.
fn lookup_aliases(raw: &RawRecord, field: &str) -> Option<Value> {
    let aliases: &[&str] = match field {
        "firstName" => &["first_name", "firstname", "FirstName", "First_Name"],
        "lastName" => &["last_name", "lastname", "LastName", "Last_Name"],
        "email" => &["Email", "email1", "emailaddress1"],
        "phone" => &["Phone", "telephone1", "phone_work"],
        "company" => &["Company", "company", "companyname", "account_name"],
        "name" => &["Name", "name", "title"],
        "amount" => &["Amount", "amount", "value"],
        "stage" => &["Stage", "stage", "sales_stage"],
        _ => &[],
    };
    aliases
        .iter()
        .find_map(|alias| raw.get(*alias).filter(|v| !v.is_null()).cloned())
}

fn id_key(platform: CrmPlatform, kind: EntityKind) -> &'static str {
    match platform {
        CrmPlatform::Salesforce => "Id",
        CrmPlatform::Dynamics => match kind {
            EntityKind::Contact => "contactid",
            EntityKind::Deal => "opportunityid",
            EntityKind::Lead => "leadid",
        },
        _ => "id",
    }
}

fn extract_id(platform: CrmPlatform, kind: EntityKind, raw: &RawRecord) -> Option<String> {
    let value = raw.get(id_key(platform, kind))?;
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn updated_key(platform: CrmPlatform) -> &'static str {
    match platform {
        CrmPlatform::HubSpot => "updatedAt",
        CrmPlatform::Salesforce => "LastModifiedDate",
        CrmPlatform::Zoho => "Modified_Time",
        CrmPlatform::Pipedrive => "update_time",
        CrmPlatform::Dynamics => "modifiedon",
        CrmPlatform::SugarCrm => "date_modified",
    }
}

fn created_key(platform: CrmPlatform) -> &'static str {
    match platform {
        CrmPlatform::HubSpot => "createdAt",
        CrmPlatform::Salesforce => "CreatedDate",
        CrmPlatform::Zoho => "Created_Time",
        CrmPlatform::Pipedrive => "add_time",
        CrmPlatform::Dynamics => "createdon",
        CrmPlatform::SugarCrm => "date_entered",
    }
}

/// Parse a platform timestamp. RFC 3339 first, then the space-separated
/// form Pipedrive uses, taken as UTC.
fn extract_timestamp(raw: &RawRecord, key: &str) -> Option<DateTime<Utc>> {
    let s = raw.get(key)?.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

const HUBSPOT_CONTACT: &[FieldRule] = &[
    path("firstName", "firstname"),
    path("lastName", "lastname"),
    path("email", "email"),
    path("phone", "phone"),
    path("company", "company"),
    path("jobTitle", "jobtitle"),
];

const HUBSPOT_DEAL: &[FieldRule] = &[
    path("name", "dealname"),
    derived("amount", |raw| parse_amount(raw.get("amount")?)),
    path("stage", "dealstage"),
    derived("closeDate", |raw| date_only(raw.get("closedate")?)),
    path("description", "description"),
];

const HUBSPOT_LEAD: &[FieldRule] = &[
    path("firstName", "firstname"),
    path("lastName", "lastname"),
    path("email", "email"),
    path("company", "company"),
    path("status", "hs_lead_status"),
];

const SALESFORCE_CONTACT: &[FieldRule] = &[
    path("firstName", "FirstName"),
    path("lastName", "LastName"),
    path("email", "Email"),
    path("phone", "Phone"),
    path("jobTitle", "Title"),
];

const SALESFORCE_DEAL: &[FieldRule] = &[
    path("name", "Name"),
    derived("amount", |raw| parse_amount(raw.get("Amount")?)),
    path("stage", "StageName"),
    derived("probability", |raw| probability(raw.get("Probability")?)),
    derived("closeDate", |raw| date_only(raw.get("CloseDate")?)),
    path("description", "Description"),
];

const SALESFORCE_LEAD: &[FieldRule] = &[
    path("firstName", "FirstName"),
    path("lastName", "LastName"),
    path("email", "Email"),
    path("company", "Company"),
    path("status", "Status"),
    path("source", "LeadSource"),
];

const ZOHO_CONTACT: &[FieldRule] = &[
    path("firstName", "First_Name"),
    path("lastName", "Last_Name"),
    path("email", "Email"),
    path("phone", "Phone"),
    path("company", "Account_Name.name"),
    path("jobTitle", "Title"),
];

const ZOHO_DEAL: &[FieldRule] = &[
    path("name", "Deal_Name"),
    derived("amount", |raw| parse_amount(raw.get("Amount")?)),
    path("currency", "Currency"),
    path("stage", "Stage"),
    derived("probability", |raw| probability(raw.get("Probability")?)),
    derived("closeDate", |raw| date_only(raw.get("Closing_Date")?)),
    path("description", "Description"),
];

const ZOHO_LEAD: &[FieldRule] = &[
    path("firstName", "First_Name"),
    path("lastName", "Last_Name"),
    path("email", "Email"),
    path("company", "Company"),
    path("status", "Lead_Status"),
    path("source", "Lead_Source"),
];

const PIPEDRIVE_CONTACT: &[FieldRule] = &[
    derived("firstName", |raw| name_part(raw, 0)),
    derived("lastName", |raw| name_part(raw, 1)),
    derived("email", |raw| primary_from_list(raw.get("email")?)),
    derived("phone", |raw| primary_from_list(raw.get("phone")?)),
    path("company", "org_id.name"),
];

const PIPEDRIVE_DEAL: &[FieldRule] = &[
    path("name", "title"),
    derived("amount", |raw| parse_amount(raw.get("value")?)),
    path("currency", "currency"),
    derived("stage", |raw| stringify(raw.get("stage_id")?)),
    derived("probability", |raw| probability(raw.get("probability")?)),
    derived("closeDate", |raw| date_only(raw.get("expected_close_date")?)),
];

const PIPEDRIVE_LEAD: &[FieldRule] = &[
    derived("firstName", |raw| name_part(raw, 0)),
    derived("lastName", |raw| name_part(raw, 1)),
    path("company", "organization_name"),
    path("source", "source_name"),
];

const DYNAMICS_CONTACT: &[FieldRule] = &[
    path("firstName", "firstname"),
    path("lastName", "lastname"),
    path("email", "emailaddress1"),
    path("phone", "telephone1"),
    path("company", "companyname"),
    path("jobTitle", "jobtitle"),
];

const DYNAMICS_DEAL: &[FieldRule] = &[
    path("name", "name"),
    derived("amount", |raw| parse_amount(raw.get("estimatedvalue")?)),
    path("stage", "stepname"),
    derived("probability", |raw| probability(raw.get("closeprobability")?)),
    derived("closeDate", |raw| date_only(raw.get("estimatedclosedate")?)),
    path("description", "description"),
];

const DYNAMICS_LEAD: &[FieldRule] = &[
    path("firstName", "firstname"),
    path("lastName", "lastname"),
    path("email", "emailaddress1"),
    path("company", "companyname"),
    derived("status", |raw| stringify(raw.get("statuscode")?)),
];

const SUGARCRM_CONTACT: &[FieldRule] = &[
    path("firstName", "first_name"),
    path("lastName", "last_name"),
    path("email", "email1"),
    path("phone", "phone_work"),
    path("company", "account_name"),
    path("jobTitle", "title"),
];

const SUGARCRM_DEAL: &[FieldRule] = &[
    path("name", "name"),
    derived("amount", |raw| parse_amount(raw.get("amount")?)),
    path("stage", "sales_stage"),
    derived("probability", |raw| probability(raw.get("probability")?)),
    derived("closeDate", |raw| date_only(raw.get("date_closed")?)),
    path("description", "description"),
];

const SUGARCRM_LEAD: &[FieldRule] = &[
    path("firstName", "first_name"),
    path("lastName", "last_name"),
    path("email", "email1"),
    path("company", "account_name"),
    path("status", "status"),
    path("source", "lead_source"),
];

fn rules(platform: CrmPlatform, kind: EntityKind) -> &'static [FieldRule] {
    match (platform, kind) {
        (CrmPlatform::HubSpot, EntityKind::Contact) => HUBSPOT_CONTACT,
        (CrmPlatform::HubSpot, EntityKind::Deal) => HUBSPOT_DEAL,
        (CrmPlatform::HubSpot, EntityKind::Lead) => HUBSPOT_LEAD,
        (CrmPlatform::Salesforce, EntityKind::Contact) => SALESFORCE_CONTACT,
        (CrmPlatform::Salesforce, EntityKind::Deal) => SALESFORCE_DEAL,
        (CrmPlatform::Salesforce, EntityKind::Lead) => SALESFORCE_LEAD,
        (CrmPlatform::Zoho, EntityKind::Contact) => ZOHO_CONTACT,
        (CrmPlatform::Zoho, EntityKind::Deal) => ZOHO_DEAL,
        (CrmPlatform::Zoho, EntityKind::Lead) => ZOHO_LEAD,
        (CrmPlatform::Pipedrive, EntityKind::Contact) => PIPEDRIVE_CONTACT,
        (CrmPlatform::Pipedrive, EntityKind::Deal) => PIPEDRIVE_DEAL,
        (CrmPlatform::Pipedrive, EntityKind::Lead) => PIPEDRIVE_LEAD,
        (CrmPlatform::Dynamics, EntityKind::Contact) => DYNAMICS_CONTACT,
        (CrmPlatform::Dynamics, EntityKind::Deal) => DYNAMICS_DEAL,
        (CrmPlatform::Dynamics, EntityKind::Lead) => DYNAMICS_LEAD,
        (CrmPlatform::SugarCrm, EntityKind::Contact) => SUGARCRM_CONTACT,
        (CrmPlatform::SugarCrm, EntityKind::Deal) => SUGARCRM_DEAL,
        (CrmPlatform::SugarCrm, EntityKind::Lead) => SUGARCRM_LEAD,
    }
}

/// Amounts arrive as numbers or numeric strings depending on platform.
fn parse_amount(value: &Value) -> Option<Value> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    serde_json::Number::from_f64(n).map(Value::Number)
}

/// Clamp a probability to 0..=100 as an integer.
fn probability(value: &Value) -> Option<Value> {
    let p = value.as_f64()?;
    if !(0.0..=100.0).contains(&p) {
        return None;
    }
    Some(Value::Number((p.round() as u64).into()))
}

/// Keep only the date portion of a date or datetime string.
fn date_only(value: &Value) -> Option<Value> {
    let s = value.as_str()?;
    let date = s.get(..10)?;
    if date.len() == 10 && date.as_bytes()[4] == b'-' && date.as_bytes()[7] == b'-' {
        Some(Value::String(date.to_string()))
    } else {
        None
    }
}

fn stringify(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => Some(Value::String(s.clone())),
        Value::Number(n) => Some(Value::String(n.to_string())),
        _ => None,
    }
}

/// First or last token of a full name, for platforms that expose only
/// one `name` or `title` field. Explicit `first_name`/`last_name`
/// fields win when present.
fn name_part(raw: &RawRecord, index: usize) -> Option<Value> {
    let explicit_key = if index == 0 { "first_name" } else { "last_name" };
    if let Some(explicit) = raw.get(explicit_key).and_then(|v| v.as_str()) {
        if !explicit.is_empty() {
            return Some(Value::String(explicit.to_string()));
        }
    }
    let full = raw
        .get("name")
        .or_else(|| raw.get("title"))
        .and_then(|v| v.as_str())?;
    let mut parts = full.splitn(2, ' ');
    let part = if index == 0 {
        parts.next()
    } else {
        parts.nth(1)
    }?;
    if part.is_empty() {
        None
    } else {
        Some(Value::String(part.to_string()))
    }
}

/// Extract the primary entry from a Pipedrive `[{value, primary}]` list.
fn primary_from_list(value: &Value) -> Option<Value> {
    let list = value.as_array()?;
    let entry = list
        .iter()
        .find(|e| e.get("primary").and_then(Value::as_bool) == Some(true))
        .or_else(|| list.first())?;
    entry.get("value").filter(|v| !v.is_null()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityAttributes;
    use serde_json::json;

    fn mapper() -> FieldMapper {
        FieldMapper::new()
    }

    #[test]
    fn test_hubspot_deal_mapping() {
        let raw = json!({
            "id": "d1",
            "dealname": "Acme Deal",
            "amount": "5000",
            "dealstage": "negotiation",
            "closedate": "2026-09-30T00:00:00Z",
            "updatedAt": "2026-08-01T10:00:00Z",
            "hs_pipeline": "default"
        });
        let entity = mapper()
            .map_from_platform(CrmPlatform::HubSpot, EntityKind::Deal, Uuid::new_v4(), &raw)
            .unwrap();
        assert_eq!(entity.external_id, "d1");
        match &entity.attributes {
            EntityAttributes::Deal(d) => {
                assert_eq!(d.name.as_deref(), Some("Acme Deal"));
                assert_eq!(d.amount, Some(5000.0));
                assert_eq!(d.stage.as_deref(), Some("negotiation"));
                assert_eq!(
                    d.close_date,
                    chrono::NaiveDate::from_ymd_opt(2026, 9, 30)
                );
            }
            other => panic!("expected deal attributes, got {other:?}"),
        }
        assert!(entity.updated_at.is_some());
        assert_eq!(
            entity.custom_fields.get("hs_pipeline"),
            Some(&json!("default"))
        );
    }

    #[test]
    fn test_missing_id_fails_record() {
        let raw = json!({"dealname": "orphan"});
        let err = mapper()
            .map_from_platform(CrmPlatform::HubSpot, EntityKind::Deal, Uuid::new_v4(), &raw)
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_missing_field_is_skipped_not_fatal() {
        let raw = json!({"id": "d2", "dealname": "No amount"});
        let entity = mapper()
            .map_from_platform(CrmPlatform::HubSpot, EntityKind::Deal, Uuid::new_v4(), &raw)
            .unwrap();
        match &entity.attributes {
            EntityAttributes::Deal(d) => {
                assert_eq!(d.name.as_deref(), Some("No amount"));
                assert!(d.amount.is_none());
            }
            other => panic!("expected deal attributes, got {other:?}"),
        }
    }

    #[test]
    fn test_pipedrive_person_mapping() {
        let raw = json!({
            "id": 42,
            "name": "Ada Lovelace",
            "email": [
                {"value": "old@example.com", "primary": false},
                {"value": "ada@example.com", "primary": true}
            ],
            "org_id": {"name": "Analytical Engines"},
            "update_time": "2026-08-01 09:30:00"
        });
        let entity = mapper()
            .map_from_platform(
                CrmPlatform::Pipedrive,
                EntityKind::Contact,
                Uuid::new_v4(),
                &raw,
            )
            .unwrap();
        assert_eq!(entity.external_id, "42");
        match &entity.attributes {
            EntityAttributes::Contact(c) => {
                assert_eq!(c.first_name.as_deref(), Some("Ada"));
                assert_eq!(c.last_name.as_deref(), Some("Lovelace"));
                assert_eq!(c.email.as_deref(), Some("ada@example.com"));
                assert_eq!(c.company.as_deref(), Some("Analytical Engines"));
            }
            other => panic!("expected contact attributes, got {other:?}"),
        }
        assert!(entity.updated_at.is_some());
    }

    #[test]
    fn test_salesforce_lead_mapping() {
        let raw = json!({
            "Id": "00Q1",
            "FirstName": "Grace",
            "LastName": "Hopper",
            "Email": "grace@example.com",
            "Company": "Navy",
            "Status": "Working",
            "LeadSource": "Referral",
            "LastModifiedDate": "2026-07-15T12:00:00.000+0000"
        });
        let entity = mapper()
            .map_from_platform(
                CrmPlatform::Salesforce,
                EntityKind::Lead,
                Uuid::new_v4(),
                &raw,
            )
            .unwrap();
        match &entity.attributes {
            EntityAttributes::Lead(l) => {
                assert_eq!(l.email.as_deref(), Some("grace@example.com"));
                assert_eq!(l.status.as_deref(), Some("Working"));
                assert_eq!(l.source.as_deref(), Some("Referral"));
            }
            other => panic!("expected lead attributes, got {other:?}"),
        }
    }

    #[test]
    fn test_alias_fallback() {
        // A HubSpot-shaped record carrying snake_case keys still maps.
        let raw = json!({"id": "c1", "first_name": "Ida", "last_name": "Rhodes"});
        let entity = mapper()
            .map_from_platform(
                CrmPlatform::HubSpot,
                EntityKind::Contact,
                Uuid::new_v4(),
                &raw,
            )
            .unwrap();
        match &entity.attributes {
            EntityAttributes::Contact(c) => {
                assert_eq!(c.first_name.as_deref(), Some("Ida"));
                assert_eq!(c.last_name.as_deref(), Some("Rhodes"));
            }
            other => panic!("expected contact attributes, got {other:?}"),
        }
    }

    #[test]
    fn test_reverse_mapping_uses_platform_names() {
        let raw = json!({
            "id": "d1",
            "dealname": "Acme Deal",
            "amount": "5000",
            "dealstage": "negotiation"
        });
        let entity = mapper()
            .map_from_platform(CrmPlatform::HubSpot, EntityKind::Deal, Uuid::new_v4(), &raw)
            .unwrap();
        let out = mapper().map_to_platform(&entity);
        assert_eq!(out.get("dealname"), Some(&json!("Acme Deal")));
        assert_eq!(out.get("dealstage"), Some(&json!("negotiation")));
        // Derived fields do not reverse.
        assert!(out.get("amount").is_none() || out.get("amount").unwrap().is_string());
    }

    #[test]
    fn test_date_only() {
        assert_eq!(
            date_only(&json!("2026-09-30T00:00:00Z")),
            Some(json!("2026-09-30"))
        );
        assert_eq!(date_only(&json!("2026-09-30")), Some(json!("2026-09-30")));
        assert_eq!(date_only(&json!("30/09/2026")), None);
    }

    #[test]
    fn test_parse_amount_shapes() {
        assert_eq!(parse_amount(&json!("1234.5")), Some(json!(1234.5)));
        assert_eq!(parse_amount(&json!(99)), Some(json!(99.0)));
        assert_eq!(parse_amount(&json!("oops")), None);
    }
}
