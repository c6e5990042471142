//! Records exchanged between the data-access layer and the back-office
//! services.
//!
//! Amounts are `f64` throughout, as stored by the backend. Timestamps are UTC;
//! the backend stores them as RFC 3339 strings with millisecond precision.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Canonical timestamp text used for storage and range filters.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp. Accepts RFC 3339 and the space-separated form
/// Postgres emits for `timestamptz` columns.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%#z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Closed reporting window: both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(Error::validation(format!(
                "date range start {} is after end {}",
                format_timestamp(&start),
                format_timestamp(&end)
            )));
        }
        Ok(Self { start, end })
    }

    /// One calendar day in the given offset, from 00:00:00.000 to
    /// 23:59:59.999 local time.
    pub fn calendar_day(date: NaiveDate, offset: FixedOffset) -> Self {
        let local_start = date.and_time(NaiveTime::MIN);
        let utc_start =
            local_start - Duration::seconds(i64::from(offset.local_minus_utc()));
        let start = Utc.from_utc_datetime(&utc_start);
        let end = start + Duration::days(1) - Duration::milliseconds(1);
        Self { start, end }
    }

    /// Whole days from `first` through `last` in the given offset.
    pub fn days(first: NaiveDate, last: NaiveDate, offset: FixedOffset) -> Result<Self> {
        let start = Self::calendar_day(first, offset).start;
        let end = Self::calendar_day(last, offset).end;
        Self::new(start, end)
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts <= self.end
    }

    pub(crate) fn start_text(&self) -> String {
        format_timestamp(&self.start)
    }

    pub(crate) fn end_text(&self) -> String {
        format_timestamp(&self.end)
    }
}

/// Branch restriction applied to every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "branchId", rename_all = "camelCase")]
pub enum BranchFilter {
    AllBranches,
    Branch(String),
}

impl BranchFilter {
    /// Map a UI branch selector to a filter. Empty input and the legacy
    /// `ALL` selector mean no restriction.
    pub fn from_selector(selector: Option<&str>) -> Self {
        match selector.map(str::trim) {
            None | Some("") => BranchFilter::AllBranches,
            Some(s) if s.eq_ignore_ascii_case("all") => BranchFilter::AllBranches,
            Some(s) => BranchFilter::Branch(s.to_string()),
        }
    }

    pub fn branch_id(&self) -> Option<&str> {
        match self {
            BranchFilter::AllBranches => None,
            BranchFilter::Branch(id) => Some(id.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    #[serde(default)]
    pub product_id: Option<String>,
    pub quantity: i64,
    pub unit_price: f64,
    /// Unit cost of the product at report time; `None` when the product
    /// reference is gone or has no recorded cost.
    #[serde(default)]
    pub product_cost_price: Option<f64>,
}

impl SaleItem {
    /// Cost contribution of this line; a missing cost counts as zero.
    pub fn cost(&self) -> f64 {
        self.quantity as f64 * self.product_cost_price.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    #[serde(default)]
    pub id: Option<String>,
    /// Tax-inclusive sale total.
    pub total: f64,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<SaleItem>,
}

/// Payment channel a sale was settled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenderMethod {
    Cash,
    Card,
    Transfer,
}

impl TenderMethod {
    /// Classify a free-form payment method as recorded at the till.
    ///
    /// A sale without a method was taken in cash. Methods that match none of
    /// the known channels return `None` and only count toward the grand total.
    pub fn classify(raw: Option<&str>) -> Option<Self> {
        let method = raw
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "cash".to_string());
        if method == "cash" || method.contains("efectivo") {
            Some(TenderMethod::Cash)
        } else if method == "card" || method.contains("tarjeta") {
            Some(TenderMethod::Card)
        } else if method.contains("transfer") {
            Some(TenderMethod::Transfer)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TenderMethod::Cash => "cash",
            TenderMethod::Card => "card",
            TenderMethod::Transfer => "transfer",
        }
    }
}

// ---------------------------------------------------------------------------
// Expenses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseCategory {
    Renta,
    Servicios,
    Salarios,
    Suministros,
    Otros,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 5] = [
        ExpenseCategory::Renta,
        ExpenseCategory::Servicios,
        ExpenseCategory::Salarios,
        ExpenseCategory::Suministros,
        ExpenseCategory::Otros,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExpenseCategory::Renta => "renta",
            ExpenseCategory::Servicios => "servicios",
            ExpenseCategory::Salarios => "salarios",
            ExpenseCategory::Suministros => "suministros",
            ExpenseCategory::Otros => "otros",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
    }

    /// Decode a stored category; unknown values fall back to `otros`.
    pub(crate) fn from_stored(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| {
            tracing::warn!(category = %raw, "unknown expense category, filing under otros");
            ExpenseCategory::Otros
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub category: ExpenseCategory,
    pub branch_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub description: String,
    pub amount: f64,
    pub category: ExpenseCategory,
    pub branch_id: String,
}

// ---------------------------------------------------------------------------
// Vouchers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemedCoupon {
    pub id: String,
    #[serde(default)]
    pub code: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub redeemed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Cash cuts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashCutStatus {
    Pending,
    Approved,
    Rejected,
}

impl CashCutStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CashCutStatus::Pending => "pending",
            CashCutStatus::Approved => "approved",
            CashCutStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(CashCutStatus::Pending),
            "approved" => Some(CashCutStatus::Approved),
            "rejected" => Some(CashCutStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, CashCutStatus::Pending)
    }
}

/// A submitted till reconciliation awaiting or past supervisory review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashCut {
    pub id: String,
    pub branch_id: String,
    pub date: NaiveDate,
    pub total_cash: f64,
    pub total_card: f64,
    pub total_transfer: f64,
    pub expenses_amount: f64,
    pub calculated_total: f64,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: CashCutStatus,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCashCut {
    pub branch_id: String,
    pub date: NaiveDate,
    pub total_cash: f64,
    pub total_card: f64,
    pub total_transfer: f64,
    pub expenses_amount: f64,
    pub calculated_total: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Quotations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl QuotationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QuotationStatus::Pending => "pending",
            QuotationStatus::Accepted => "accepted",
            QuotationStatus::Rejected => "rejected",
            QuotationStatus::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(QuotationStatus::Pending),
            "accepted" => Some(QuotationStatus::Accepted),
            "rejected" => Some(QuotationStatus::Rejected),
            "expired" => Some(QuotationStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationItem {
    pub product_id: String,
    #[serde(default)]
    pub product_name: Option<String>,
    pub quantity: i64,
    pub unit_price: f64,
    #[serde(default)]
    pub wholesale_price: Option<f64>,
    #[serde(default)]
    pub wholesale_min_qty: Option<i64>,
}

/// Discount granted on a quotation subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "amount", rename_all = "lowercase")]
pub enum Discount {
    Percentage(f64),
    Fixed(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quotation {
    pub id: String,
    pub folio: i64,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    pub branch_id: String,
    #[serde(default)]
    pub created_by: Option<String>,
    pub items: Vec<QuotationItem>,
    pub subtotal: f64,
    pub discount_amount: f64,
    pub iva: f64,
    pub total: f64,
    pub status: QuotationStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A quotation with computed totals, ready to be stored. The backend
/// assigns `id`, `folio` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationDraft {
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub branch_id: String,
    pub created_by: Option<String>,
    pub items: Vec<QuotationItem>,
    pub subtotal: f64,
    pub discount_amount: f64,
    pub iva: f64,
    pub total: f64,
    pub status: QuotationStatus,
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    Seller,
    Warehouse,
    Finance,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Seller => "SELLER",
            UserRole::Warehouse => "WAREHOUSE",
            UserRole::Finance => "FINANCE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "ADMIN" => Some(UserRole::Admin),
            "SELLER" => Some(UserRole::Seller),
            "WAREHOUSE" => Some(UserRole::Warehouse),
            "FINANCE" => Some(UserRole::Finance),
            _ => None,
        }
    }

    /// Label shown on user-management screens.
    pub fn label(self) -> &'static str {
        match self {
            UserRole::Admin => "Administrador",
            UserRole::Seller => "Vendedor",
            UserRole::Warehouse => "Bodeguero",
            UserRole::Finance => "Contador",
        }
    }

    /// Roles allowed to approve or reject a submitted cash cut.
    pub fn can_review_cash_cuts(self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Finance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub branch_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).expect("valid timestamp")
    }

    #[test]
    fn test_calendar_day_utc_bounds() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let range = DateRange::calendar_day(day, FixedOffset::east_opt(0).unwrap());
        assert_eq!(range.start_text(), "2026-03-14T00:00:00.000Z");
        assert_eq!(range.end_text(), "2026-03-14T23:59:59.999Z");
    }

    #[test]
    fn test_calendar_day_respects_offset() {
        // Mexico City, UTC-6
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let range = DateRange::calendar_day(day, FixedOffset::west_opt(6 * 3600).unwrap());
        assert_eq!(range.start_text(), "2026-03-14T06:00:00.000Z");
        assert_eq!(range.end_text(), "2026-03-15T05:59:59.999Z");
    }

    #[test]
    fn test_date_range_is_closed_on_both_ends() {
        let range = DateRange::new(
            utc("2026-01-01T00:00:00Z"),
            utc("2026-01-31T23:59:59Z"),
        )
        .unwrap();
        assert!(range.contains(&utc("2026-01-01T00:00:00Z")));
        assert!(range.contains(&utc("2026-01-31T23:59:59Z")));
        assert!(!range.contains(&utc("2026-02-01T00:00:00Z")));
    }

    #[test]
    fn test_date_range_rejects_inverted_bounds() {
        let err = DateRange::new(utc("2026-02-01T00:00:00Z"), utc("2026-01-01T00:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_parse_timestamp_accepts_postgres_form() {
        let ts = parse_timestamp("2026-05-02 17:45:10.123+00").unwrap();
        assert_eq!(format_timestamp(&ts), "2026-05-02T17:45:10.123Z");
    }

    #[test]
    fn test_branch_filter_from_selector() {
        assert_eq!(BranchFilter::from_selector(None), BranchFilter::AllBranches);
        assert_eq!(BranchFilter::from_selector(Some("ALL")), BranchFilter::AllBranches);
        assert_eq!(BranchFilter::from_selector(Some("  ")), BranchFilter::AllBranches);
        assert_eq!(
            BranchFilter::from_selector(Some("BR-NORTE")),
            BranchFilter::Branch("BR-NORTE".into())
        );
        assert_eq!(
            BranchFilter::Branch("BR-1".into()).branch_id(),
            Some("BR-1")
        );
    }

    #[test]
    fn test_tender_classification() {
        assert_eq!(TenderMethod::classify(None), Some(TenderMethod::Cash));
        assert_eq!(TenderMethod::classify(Some("Efectivo")), Some(TenderMethod::Cash));
        assert_eq!(TenderMethod::classify(Some("CARD")), Some(TenderMethod::Card));
        assert_eq!(
            TenderMethod::classify(Some("Tarjeta de crédito")),
            Some(TenderMethod::Card)
        );
        assert_eq!(
            TenderMethod::classify(Some("transferencia")),
            Some(TenderMethod::Transfer)
        );
        assert_eq!(TenderMethod::classify(Some("cheque")), None);
    }

    #[test]
    fn test_sale_item_missing_cost_is_zero() {
        let item = SaleItem {
            product_id: None,
            quantity: 4,
            unit_price: 25.0,
            product_cost_price: None,
        };
        assert_eq!(item.cost(), 0.0);
    }

    #[test]
    fn test_expense_category_parsing() {
        assert_eq!(ExpenseCategory::parse("Renta"), Some(ExpenseCategory::Renta));
        assert_eq!(ExpenseCategory::parse("luz"), None);
        assert_eq!(ExpenseCategory::from_stored("luz"), ExpenseCategory::Otros);
    }

    #[test]
    fn test_discount_wire_shape() {
        let json = serde_json::to_value(Discount::Percentage(10.0)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "percentage", "amount": 10.0 }));
        let back: Discount =
            serde_json::from_value(serde_json::json!({ "type": "fixed", "amount": 50 })).unwrap();
        assert_eq!(back, Discount::Fixed(50.0));
    }

    #[test]
    fn test_user_role_review_rights() {
        assert!(UserRole::Admin.can_review_cash_cuts());
        assert!(UserRole::Finance.can_review_cash_cuts());
        assert!(!UserRole::Seller.can_review_cash_cuts());
        assert_eq!(UserRole::parse("warehouse"), Some(UserRole::Warehouse));
        assert_eq!(
            serde_json::to_value(UserRole::Finance).unwrap(),
            serde_json::json!("FINANCE")
        );
    }
}
