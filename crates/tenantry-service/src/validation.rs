//! Request bodies and their validation rules.
//!
//! Bodies reject unknown fields at deserialization time (422 through
//! [`crate::extract::ApiJson`]); the `validate` methods then trim and check
//! values and collect every problem into one [`FieldIssues`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use tenantry_core::{TenantId, DEFAULT_CURRENCY};
use tenantry_store::Patch;

use crate::error::ApiError;

// ============================================================================
// Constants
// ============================================================================

const SKU_MAX: usize = 64;
const NAME_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 2000;
const PRICE_MAX: i64 = 10_000_000;

// ============================================================================
// Issues
// ============================================================================

/// Validation problems, grouped by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldIssues {
    /// Problems not tied to one field.
    pub form_errors: Vec<String>,
    /// Problems per field.
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl FieldIssues {
    /// Record a form-level problem.
    pub fn form(&mut self, message: impl Into<String>) {
        self.form_errors.push(message.into());
    }

    /// Record a problem with `field`.
    pub fn field(&mut self, field: &str, message: impl Into<String>) {
        self.field_errors.entry(field.to_string()).or_default().push(message.into());
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.form_errors.is_empty() && self.field_errors.is_empty()
    }

    /// `Ok` when empty, otherwise a 422.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn check_sku(issues: &mut FieldIssues, sku: &str) {
    if sku.is_empty() || sku.len() > SKU_MAX {
        issues.field("sku", format!("must be 1-{SKU_MAX} characters"));
    } else if !sku.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
        issues.field("sku", "SKU can only contain letters, numbers, '.', '_' and '-'");
    }
}

fn check_name(issues: &mut FieldIssues, name: &str) {
    if name.is_empty() || name.chars().count() > NAME_MAX {
        issues.field("name", format!("must be 1-{NAME_MAX} characters"));
    }
}

fn check_description(issues: &mut FieldIssues, description: Option<&str>) {
    if description.is_some_and(|d| d.chars().count() > DESCRIPTION_MAX) {
        issues.field("description", format!("must be at most {DESCRIPTION_MAX} characters"));
    }
}

fn check_price(issues: &mut FieldIssues, price: i64) {
    if !(0..=PRICE_MAX).contains(&price) {
        issues.field("price_in_pence", format!("must be between 0 and {PRICE_MAX}"));
    }
}

fn check_currency(issues: &mut FieldIssues, currency: Option<&str>) {
    if currency.is_some_and(|c| c != DEFAULT_CURRENCY) {
        issues.field("currency", format!("only {DEFAULT_CURRENCY} is supported"));
    }
}

fn check_expected_version(issues: &mut FieldIssues, version: i64) {
    if version < 1 {
        issues.field("expected_version", "must be a positive integer");
    }
}

fn trimmed(s: &mut String) {
    let t = s.trim();
    if t.len() != s.len() {
        *s = t.to_string();
    }
}

// ============================================================================
// Products
// ============================================================================

/// `POST /api/admin/products` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductCreate {
    /// SKU, unique per tenant.
    pub sku: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Price in pence.
    pub price_in_pence: i64,
    /// Only `GBP`.
    #[serde(default)]
    pub currency: Option<String>,
    /// Defaults to active.
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl ProductCreate {
    /// Trim and check every field.
    pub fn validate(&mut self) -> Result<(), ApiError> {
        trimmed(&mut self.sku);
        trimmed(&mut self.name);
        if let Some(d) = self.description.as_mut() {
            trimmed(d);
        }

        let mut issues = FieldIssues::default();
        check_sku(&mut issues, &self.sku);
        check_name(&mut issues, &self.name);
        check_description(&mut issues, self.description.as_deref());
        check_price(&mut issues, self.price_in_pence);
        check_currency(&mut issues, self.currency.as_deref());
        issues.finish()
    }
}

/// `PATCH /api/admin/products/:id` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductUpdate {
    /// Version the caller last saw.
    pub expected_version: i64,
    /// New SKU.
    #[serde(default)]
    pub sku: Option<String>,
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New description; `null` clears it.
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    /// New price.
    #[serde(default)]
    pub price_in_pence: Option<i64>,
    /// Currency, `GBP` only.
    #[serde(default)]
    pub currency: Option<String>,
    /// New active flag.
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl ProductUpdate {
    /// Trim and check the supplied fields; at least one is required.
    pub fn validate(&mut self) -> Result<(), ApiError> {
        let mut issues = FieldIssues::default();
        check_expected_version(&mut issues, self.expected_version);

        if let Some(sku) = self.sku.as_mut() {
            trimmed(sku);
            check_sku(&mut issues, sku);
        }
        if let Some(name) = self.name.as_mut() {
            trimmed(name);
            check_name(&mut issues, name);
        }
        if let Some(Some(d)) = self.description.as_mut() {
            trimmed(d);
            check_description(&mut issues, Some(d));
        }
        if let Some(price) = self.price_in_pence {
            check_price(&mut issues, price);
        }
        check_currency(&mut issues, self.currency.as_deref());

        if self.patch().is_empty() {
            issues.form("No changes provided");
        }
        issues.finish()
    }

    /// The changed fields as a store patch.
    #[must_use]
    pub fn patch(&self) -> Patch {
        let mut patch = Patch::new();
        if let Some(sku) = &self.sku {
            patch = patch.set("sku", sku.as_str());
        }
        if let Some(name) = &self.name {
            patch = patch.set("name", name.as_str());
        }
        if let Some(description) = &self.description {
            patch = patch.set("description", description.clone().map_or(Value::Null, Value::String));
        }
        if let Some(price) = self.price_in_pence {
            patch = patch.set("price_in_pence", price);
        }
        if let Some(currency) = &self.currency {
            patch = patch.set("currency", currency.as_str());
        }
        if let Some(active) = self.is_active {
            patch = patch.set("is_active", active);
        }
        patch
    }

    /// Names of the fields this update changes, for the audit diff.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&'static str> {
        [
            ("sku", self.sku.is_some()),
            ("name", self.name.is_some()),
            ("description", self.description.is_some()),
            ("price_in_pence", self.price_in_pence.is_some()),
            ("currency", self.currency.is_some()),
            ("is_active", self.is_active.is_some()),
        ]
        .into_iter()
        .filter_map(|(f, set)| set.then_some(f))
        .collect()
    }
}

// ============================================================================
// Members
// ============================================================================

/// Capability flags in member bodies. Absent means "leave as is" on update.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MemberCaps {
    /// Ownership; only owners may set it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_owner: Option<bool>,
    /// Member administration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_manage_members: Option<bool>,
    /// Product writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_manage_products: Option<bool>,
    /// Product reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_view_products: Option<bool>,
}

impl MemberCaps {
    /// Whether any flag is present.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.is_owner.is_some()
            || self.can_manage_members.is_some()
            || self.can_manage_products.is_some()
            || self.can_view_products.is_some()
    }

    /// The present flags as a store patch.
    #[must_use]
    pub fn patch(&self) -> Patch {
        [
            ("is_owner", self.is_owner),
            ("can_manage_members", self.can_manage_members),
            ("can_manage_products", self.can_manage_products),
            ("can_view_products", self.can_view_products),
        ]
        .into_iter()
        .fold(Patch::new(), |patch, (field, value)| match value {
            Some(v) => patch.set(field, v),
            None => patch,
        })
    }
}

/// `POST /api/admin/members` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberCreate {
    /// Email of an existing user.
    pub email: String,
    /// Initial capabilities.
    #[serde(default)]
    pub caps: MemberCaps,
}

impl MemberCreate {
    /// Normalize and check the email.
    pub fn validate(&mut self) -> Result<(), ApiError> {
        self.email = self.email.trim().to_ascii_lowercase();
        let mut issues = FieldIssues::default();
        if !looks_like_email(&self.email) {
            issues.field("email", "Invalid email");
        }
        issues.finish()
    }
}

/// `PATCH /api/admin/members/:id` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberUpdate {
    /// Version the caller last saw.
    pub expected_version: i64,
    /// Flags to change.
    pub caps: MemberCaps,
}

impl MemberUpdate {
    /// At least one capability must be present.
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut issues = FieldIssues::default();
        check_expected_version(&mut issues, self.expected_version);
        if !self.caps.any() {
            issues.field("caps", "No changes provided");
        }
        issues.finish()
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

// ============================================================================
// Tenant selection
// ============================================================================

/// `POST /api/tenant/select` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantSelect {
    /// Tenant to select.
    pub tenant_id: String,
}

impl TenantSelect {
    /// Parse the tenant id.
    pub fn tenant_id(&self) -> Result<TenantId, ApiError> {
        self.tenant_id.parse().map_err(|_| {
            let mut issues = FieldIssues::default();
            issues.field("tenant_id", "must be a UUID");
            ApiError::Validation(issues)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issues(err: ApiError) -> FieldIssues {
        match err {
            ApiError::Validation(issues) => issues,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn product_create_trims_and_accepts() {
        let mut body: ProductCreate =
            serde_json::from_value(json!({"sku": " AB-1 ", "name": " Widget ", "price_in_pence": 100})).unwrap();
        body.validate().unwrap();
        assert_eq!(body.sku, "AB-1");
        assert_eq!(body.name, "Widget");
    }

    #[test]
    fn product_create_collects_every_issue() {
        let mut body: ProductCreate = serde_json::from_value(
            json!({"sku": "bad sku!", "name": "", "price_in_pence": -1, "currency": "USD"}),
        )
        .unwrap();
        let issues = issues(body.validate().unwrap_err());
        for field in ["sku", "name", "price_in_pence", "currency"] {
            assert!(issues.field_errors.contains_key(field), "missing {field}");
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_value::<ProductCreate>(
            json!({"sku": "A", "name": "a", "price_in_pence": 1, "tenant_id": "x"}),
        );
        assert!(err.is_err());
    }

    #[test]
    fn product_update_requires_a_change() {
        let mut body: ProductUpdate = serde_json::from_value(json!({"expected_version": 1})).unwrap();
        let issues = issues(body.validate().unwrap_err());
        assert_eq!(issues.form_errors, vec!["No changes provided".to_string()]);
    }

    #[test]
    fn product_update_null_description_clears_it() {
        let mut body: ProductUpdate =
            serde_json::from_value(json!({"expected_version": 2, "description": null})).unwrap();
        body.validate().unwrap();
        assert_eq!(body.description, Some(None));
        assert_eq!(body.changed_fields(), vec!["description"]);
    }

    #[test]
    fn member_update_requires_a_capability() {
        let body: MemberUpdate = serde_json::from_value(json!({"expected_version": 1, "caps": {}})).unwrap();
        let issues = issues(body.validate().unwrap_err());
        assert!(issues.field_errors.contains_key("caps"));
    }

    #[test]
    fn email_shape() {
        assert!(looks_like_email("a@b.co"));
        assert!(!looks_like_email("a@b"));
        assert!(!looks_like_email("@b.co"));
        assert!(!looks_like_email("a b@c.co"));
    }
}
