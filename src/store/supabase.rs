//! [`BackOfficeStore`] over the hosted Supabase (PostgREST) backend.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::lenient::{integer, number, opt_number, opt_timestamp};
use super::{BackOfficeStore, PostgrestQuery};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::models::{
    format_timestamp, BranchFilter, CashCut, CashCutStatus, DateRange, ExpenseCategory,
    ExpenseRecord, NewCashCut, NewExpense, NewProfile, Profile, Quotation, QuotationDraft,
    QuotationItem, QuotationStatus, RedeemedCoupon, SaleItem, SaleRecord, UserRole,
};

const SALE_COLUMNS: &str = "id, total, payment_method, created_at,
    sale_items ( product_id, quantity, unit_price, products ( cost_price ) )";

const SALE_TENDER_COLUMNS: &str = "id, total, payment_method, created_at";

pub struct SupabaseStore {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseStore {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Self::connect(&config.url, &config.anon_key, config.request_timeout)
    }

    /// Build a store for `base_url` (the project URL, without `/rest/v1`).
    pub fn connect(base_url: &str, anon_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    fn url_for(&self, query: &PostgrestQuery) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, query.table()))
            .map_err(|e| Error::Config(format!("invalid Supabase URL: {e}")))?;
        if !query.params().is_empty() {
            let mut qp = url.query_pairs_mut();
            for (k, v) in query.params() {
                qp.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
            .header("Content-Type", "application/json")
    }

    /// Send a request and decode the JSON array PostgREST answers with.
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, table: &str) -> Result<Vec<T>> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Network(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();
        // A body cut short mid-read must not pass for an empty result.
        let body = resp.text().await.map_err(|e| {
            warn!(table, status = status.as_u16(), error = %e, "backend response body unreadable");
            Error::Network(friendly_error(&self.base_url, &e))
        })?;

        if !status.is_success() {
            warn!(table, status = status.as_u16(), "backend request failed");
            return Err(status_error(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<T> = serde_json::from_str(&body)?;
        debug!(table, rows = rows.len(), "backend request ok");
        Ok(rows)
    }

    async fn select<T: DeserializeOwned>(&self, query: &PostgrestQuery) -> Result<Vec<T>> {
        let url = self.url_for(query)?;
        self.send(self.request(Method::GET, url), query.table()).await
    }

    async fn insert<T: DeserializeOwned>(&self, table: &str, body: Value) -> Result<T> {
        let url = self.url_for(&PostgrestQuery::from(table))?;
        let req = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&body);
        self.send::<T>(req, table)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Backend {
                status: 201,
                message: format!("insert into {table} returned no row"),
            })
    }

    async fn update<T: DeserializeOwned>(&self, query: &PostgrestQuery, body: Value) -> Result<Vec<T>> {
        let url = self.url_for(query)?;
        let req = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&body);
        self.send(req, query.table()).await
    }

    async fn delete(&self, query: &PostgrestQuery) -> Result<usize> {
        let url = self.url_for(query)?;
        let req = self
            .request(Method::DELETE, url)
            .header("Prefer", "return=representation");
        Ok(self.send::<Value>(req, query.table()).await?.len())
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach backend at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid backend URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Map a non-success response. PostgREST error bodies carry `message` and
/// optionally `details` / `hint`.
fn status_error(status: StatusCode, body: &str) -> Error {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let fallback = match status.as_u16() {
        401 => "API key is invalid or expired".to_string(),
        403 => "Not authorized for this table".to_string(),
        404 => "Backend endpoint not found".to_string(),
        s if s >= 500 => format!("Backend server error (HTTP {s})"),
        s => format!("Unexpected response from backend (HTTP {s})"),
    };
    let mut message = field("message").unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() || parsed.is_some() {
            fallback
        } else {
            trimmed.to_string()
        }
    });
    if let Some(details) = field("details") {
        message = format!("{message}: {details}");
    }

    if status == StatusCode::CONFLICT {
        return Error::Conflict(message);
    }
    Error::Backend {
        status: status.as_u16(),
        message,
    }
}

// ---------------------------------------------------------------------------
// Wire rows
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ProductRef {
    #[serde(default, deserialize_with = "opt_number")]
    cost_price: Option<f64>,
}

#[derive(Deserialize)]
struct SaleItemRow {
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default, deserialize_with = "integer")]
    quantity: i64,
    #[serde(default, deserialize_with = "number")]
    unit_price: f64,
    #[serde(default)]
    products: Option<ProductRef>,
}

#[derive(Deserialize)]
struct SaleRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, deserialize_with = "number")]
    total: f64,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    sale_items: Option<Vec<SaleItemRow>>,
}

impl From<SaleRow> for SaleRecord {
    fn from(row: SaleRow) -> Self {
        SaleRecord {
            id: row.id,
            total: row.total,
            payment_method: row.payment_method,
            created_at: row.created_at,
            items: row
                .sale_items
                .unwrap_or_default()
                .into_iter()
                .map(|item| SaleItem {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    product_cost_price: item.products.and_then(|p| p.cost_price),
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct ExpenseRow {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, deserialize_with = "number")]
    amount: f64,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    branch_id: Option<String>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    created_at: Option<DateTime<Utc>>,
}

impl From<ExpenseRow> for ExpenseRecord {
    fn from(row: ExpenseRow) -> Self {
        let created_at = row.created_at.unwrap_or_else(|| {
            warn!(expense_id = %row.id, "expense without created_at");
            DateTime::<Utc>::default()
        });
        ExpenseRecord {
            category: ExpenseCategory::from_stored(row.category.as_deref().unwrap_or("otros")),
            id: row.id,
            description: row.description.unwrap_or_default(),
            amount: row.amount,
            branch_id: row.branch_id.unwrap_or_default(),
            created_at,
        }
    }
}

#[derive(Deserialize)]
struct CouponRow {
    id: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, deserialize_with = "number")]
    amount: f64,
    #[serde(default, deserialize_with = "opt_timestamp")]
    redeemed_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct CashCutRow {
    id: String,
    branch_id: String,
    date: String,
    #[serde(default, deserialize_with = "number")]
    total_cash: f64,
    #[serde(default, deserialize_with = "number")]
    total_card: f64,
    #[serde(default, deserialize_with = "number")]
    total_transfer: f64,
    #[serde(default, deserialize_with = "number")]
    expenses_amount: f64,
    #[serde(default, deserialize_with = "number")]
    calculated_total: f64,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    approved_by: Option<String>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    approved_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<CashCutRow> for CashCut {
    type Error = Error;

    fn try_from(row: CashCutRow) -> Result<Self> {
        let raw_status = row.status.as_deref().unwrap_or("pending");
        let status = CashCutStatus::parse(raw_status).ok_or_else(|| {
            Error::InvalidState(format!("cash cut {} has unknown status '{raw_status}'", row.id))
        })?;
        // `date` columns come back as YYYY-MM-DD; tolerate a full timestamp.
        let date = NaiveDate::parse_from_str(row.date.get(..10).unwrap_or(&row.date), "%Y-%m-%d")
            .map_err(|_| {
                Error::InvalidState(format!("cash cut {} has unreadable date '{}'", row.id, row.date))
            })?;
        Ok(CashCut {
            id: row.id,
            branch_id: row.branch_id,
            date,
            total_cash: row.total_cash,
            total_card: row.total_card,
            total_transfer: row.total_transfer,
            expenses_amount: row.expenses_amount,
            calculated_total: row.calculated_total,
            notes: row.notes,
            status,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            created_at: row.created_at,
        })
    }
}

fn into_cuts(rows: Vec<CashCutRow>) -> Result<Vec<CashCut>> {
    rows.into_iter().map(CashCut::try_from).collect()
}

#[derive(Deserialize)]
struct QuotationRow {
    id: String,
    #[serde(default, deserialize_with = "integer")]
    folio: i64,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    branch_id: Option<String>,
    #[serde(default)]
    created_by: Option<String>,
    #[serde(default)]
    items: Option<Vec<QuotationItem>>,
    #[serde(default, deserialize_with = "number")]
    subtotal: f64,
    #[serde(default, deserialize_with = "number")]
    discount_amount: f64,
    #[serde(default, deserialize_with = "number")]
    iva: f64,
    #[serde(default, deserialize_with = "number")]
    total: f64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<QuotationRow> for Quotation {
    type Error = Error;

    fn try_from(row: QuotationRow) -> Result<Self> {
        let raw_status = row.status.as_deref().unwrap_or("pending");
        let status = QuotationStatus::parse(raw_status).ok_or_else(|| {
            Error::InvalidState(format!("quotation {} has unknown status '{raw_status}'", row.id))
        })?;
        Ok(Quotation {
            id: row.id,
            folio: row.folio,
            client_id: row.client_id,
            client_name: row.client_name,
            branch_id: row.branch_id.unwrap_or_default(),
            created_by: row.created_by,
            items: row.items.unwrap_or_default(),
            subtotal: row.subtotal,
            discount_amount: row.discount_amount,
            iva: row.iva,
            total: row.total,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(Deserialize)]
struct ProfileRow {
    id: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    branch_id: Option<String>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    created_at: Option<DateTime<Utc>>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        let role = row.role.as_deref().and_then(UserRole::parse).unwrap_or_else(|| {
            warn!(profile_id = %row.id, role = ?row.role, "unknown role, treating as seller");
            UserRole::Seller
        });
        Profile {
            id: row.id,
            full_name: row.full_name.unwrap_or_default(),
            email: row.email.unwrap_or_default(),
            role,
            branch_id: row.branch_id,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl BackOfficeStore for SupabaseStore {
    async fn fetch_sales(
        &self,
        range: &DateRange,
        branch: &BranchFilter,
    ) -> Result<Vec<SaleRecord>> {
        let query = PostgrestQuery::from("sales")
            .select(SALE_COLUMNS)
            .within("created_at", range)
            .for_branch(branch);
        let rows: Vec<SaleRow> = self.select(&query).await?;
        Ok(rows.into_iter().map(SaleRecord::from).collect())
    }

    async fn fetch_sales_for_cut(
        &self,
        range: &DateRange,
        branch_id: &str,
    ) -> Result<Vec<SaleRecord>> {
        let query = PostgrestQuery::from("sales")
            .select(SALE_TENDER_COLUMNS)
            .eq("branch_id", branch_id)
            .within("created_at", range);
        let rows: Vec<SaleRow> = self.select(&query).await?;
        Ok(rows.into_iter().map(SaleRecord::from).collect())
    }

    async fn fetch_expenses(
        &self,
        range: &DateRange,
        branch: &BranchFilter,
    ) -> Result<Vec<ExpenseRecord>> {
        let query = PostgrestQuery::from("expenses")
            .select("*")
            .within("created_at", range)
            .for_branch(branch);
        let rows: Vec<ExpenseRow> = self.select(&query).await?;
        Ok(rows.into_iter().map(ExpenseRecord::from).collect())
    }

    async fn list_expenses(&self, branch: &BranchFilter) -> Result<Vec<ExpenseRecord>> {
        let query = PostgrestQuery::from("expenses")
            .select("*")
            .for_branch(branch)
            .order("created_at", false);
        let rows: Vec<ExpenseRow> = self.select(&query).await?;
        Ok(rows.into_iter().map(ExpenseRecord::from).collect())
    }

    async fn insert_expense(&self, expense: &NewExpense) -> Result<ExpenseRecord> {
        let row: ExpenseRow = self
            .insert(
                "expenses",
                json!({
                    "description": expense.description,
                    "amount": expense.amount,
                    "category": expense.category.as_str(),
                    "branch_id": expense.branch_id,
                }),
            )
            .await?;
        Ok(row.into())
    }

    async fn fetch_redeemed_coupons(
        &self,
        range: &DateRange,
        branch_id: &str,
    ) -> Result<Vec<RedeemedCoupon>> {
        let query = PostgrestQuery::from("coupons")
            .select("*")
            .eq("branch_id", branch_id)
            .eq("status", "redeemed")
            .within("redeemed_at", range);
        let rows: Vec<CouponRow> = self.select(&query).await?;
        Ok(rows
            .into_iter()
            .map(|row| RedeemedCoupon {
                id: row.id,
                code: row.code,
                amount: row.amount,
                redeemed_at: row.redeemed_at,
            })
            .collect())
    }

    async fn find_cash_cut(&self, branch_id: &str, date: NaiveDate) -> Result<Option<CashCut>> {
        let query = PostgrestQuery::from("cash_cuts")
            .select("*")
            .eq("branch_id", branch_id)
            .eq("date", &date.format("%Y-%m-%d").to_string())
            .limit(1);
        Ok(into_cuts(self.select(&query).await?)?.into_iter().next())
    }

    async fn get_cash_cut(&self, id: &str) -> Result<Option<CashCut>> {
        let query = PostgrestQuery::from("cash_cuts").select("*").eq("id", id);
        Ok(into_cuts(self.select(&query).await?)?.into_iter().next())
    }

    async fn list_cash_cuts(&self) -> Result<Vec<CashCut>> {
        let query = PostgrestQuery::from("cash_cuts")
            .select("*")
            .order("date", false);
        into_cuts(self.select(&query).await?)
    }

    async fn insert_cash_cut(&self, cut: &NewCashCut) -> Result<CashCut> {
        let row: CashCutRow = self
            .insert(
                "cash_cuts",
                json!({
                    "branch_id": cut.branch_id,
                    "date": cut.date.format("%Y-%m-%d").to_string(),
                    "total_cash": cut.total_cash,
                    "total_card": cut.total_card,
                    "total_transfer": cut.total_transfer,
                    "expenses_amount": cut.expenses_amount,
                    "calculated_total": cut.calculated_total,
                    "notes": cut.notes,
                    "status": CashCutStatus::Pending.as_str(),
                }),
            )
            .await?;
        let stored = CashCut::try_from(row)?;
        info!(cut_id = %stored.id, branch_id = %stored.branch_id, date = %stored.date, "cash cut stored");
        Ok(stored)
    }

    async fn decide_cash_cut_if_pending(
        &self,
        id: &str,
        status: CashCutStatus,
        reviewer_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CashCut>> {
        // The status filter makes the PATCH a no-op once the cut has left
        // `pending`, so concurrent reviewers cannot both win.
        let query = PostgrestQuery::from("cash_cuts")
            .eq("id", id)
            .eq("status", CashCutStatus::Pending.as_str());
        let rows: Vec<CashCutRow> = self
            .update(
                &query,
                json!({
                    "status": status.as_str(),
                    "approved_by": reviewer_id,
                    "approved_at": format_timestamp(&at),
                }),
            )
            .await?;
        Ok(into_cuts(rows)?.into_iter().next())
    }

    async fn list_quotations(&self) -> Result<Vec<Quotation>> {
        let query = PostgrestQuery::from("quotations")
            .select("*")
            .order("created_at", false);
        let rows: Vec<QuotationRow> = self.select(&query).await?;
        rows.into_iter().map(Quotation::try_from).collect()
    }

    async fn get_quotation(&self, id: &str) -> Result<Option<Quotation>> {
        let query = PostgrestQuery::from("quotations").select("*").eq("id", id);
        let rows: Vec<QuotationRow> = self.select(&query).await?;
        rows.into_iter().next().map(Quotation::try_from).transpose()
    }

    async fn insert_quotation(&self, draft: &QuotationDraft) -> Result<Quotation> {
        let row: QuotationRow = self
            .insert(
                "quotations",
                json!({
                    "client_id": draft.client_id,
                    "client_name": draft.client_name,
                    "branch_id": draft.branch_id,
                    "created_by": draft.created_by,
                    "items": draft.items,
                    "subtotal": draft.subtotal,
                    "discount_amount": draft.discount_amount,
                    "iva": draft.iva,
                    "total": draft.total,
                    "status": draft.status.as_str(),
                }),
            )
            .await?;
        Quotation::try_from(row)
    }

    async fn update_quotation_status(
        &self,
        id: &str,
        status: QuotationStatus,
    ) -> Result<Option<Quotation>> {
        let query = PostgrestQuery::from("quotations").eq("id", id);
        let rows: Vec<QuotationRow> = self
            .update(&query, json!({ "status": status.as_str() }))
            .await?;
        rows.into_iter().next().map(Quotation::try_from).transpose()
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let query = PostgrestQuery::from("profiles")
            .select("*")
            .order("created_at", false);
        let rows: Vec<ProfileRow> = self.select(&query).await?;
        Ok(rows.into_iter().map(Profile::from).collect())
    }

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        let query = PostgrestQuery::from("profiles").select("*").eq("id", id);
        let rows: Vec<ProfileRow> = self.select(&query).await?;
        Ok(rows.into_iter().next().map(Profile::from))
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile> {
        let row: ProfileRow = self
            .insert(
                "profiles",
                json!({
                    "id": profile.id,
                    "full_name": profile.full_name,
                    "email": profile.email,
                    "role": profile.role.as_str(),
                    "branch_id": profile.branch_id,
                }),
            )
            .await?;
        Ok(row.into())
    }

    async fn delete_profile(&self, id: &str) -> Result<bool> {
        let query = PostgrestQuery::from("profiles").eq("id", id);
        Ok(self.delete(&query).await? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "anon-test-key";

    fn store_for(server: &MockServer) -> SupabaseStore {
        SupabaseStore::connect(&server.uri(), KEY, Duration::from_secs(5)).unwrap()
    }

    fn march_14() -> DateRange {
        DateRange::calendar_day(
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            FixedOffset::east_opt(0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fetch_sales_decodes_nested_cost() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/sales"))
            .and(header("apikey", KEY))
            .and(query_param("branch_id", "eq.BR-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": "S1",
                    "total": "116.00",
                    "payment_method": "cash",
                    "created_at": "2026-03-14T10:00:00+00:00",
                    "sale_items": [
                        { "product_id": "P1", "quantity": 2, "unit_price": 58, "products": { "cost_price": "30" } },
                        { "product_id": null, "quantity": 1, "unit_price": 10, "products": null }
                    ]
                }
            ])))
            .mount(&server)
            .await;

        let sales = store_for(&server)
            .fetch_sales(&march_14(), &BranchFilter::Branch("BR-1".into()))
            .await
            .unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].total, 116.0);
        assert_eq!(sales[0].items[0].product_cost_price, Some(30.0));
        assert_eq!(sales[0].items[1].product_cost_price, None);
    }

    #[tokio::test]
    async fn test_range_filters_sent_as_closed_bounds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/expenses"))
            .and(query_param("created_at", "gte.2026-03-14T00:00:00.000Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": "E1",
                    "description": "Renta local",
                    "amount": 200,
                    "category": "renta",
                    "branch_id": "BR-1",
                    "created_at": "2026-03-14T12:00:00Z"
                }
            ])))
            .mount(&server)
            .await;

        let expenses = store_for(&server)
            .fetch_expenses(&march_14(), &BranchFilter::AllBranches)
            .await
            .unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].category, ExpenseCategory::Renta);
        assert_eq!(expenses[0].amount, 200.0);
    }

    #[tokio::test]
    async fn test_backend_error_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/sales"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "42703",
                "message": "column sales.totl does not exist",
                "details": null
            })))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .fetch_sales(&march_14(), &BranchFilter::AllBranches)
            .await
            .unwrap_err();
        match err {
            Error::Backend { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("totl"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unique_violation_maps_to_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/cash_cuts"))
            .and(header("Prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint",
                "details": "Key (branch_id, date)=(BR-1, 2026-03-14) already exists."
            })))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .insert_cash_cut(&NewCashCut {
                branch_id: "BR-1".into(),
                date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                total_cash: 0.0,
                total_card: 0.0,
                total_transfer: 0.0,
                expenses_amount: 0.0,
                calculated_total: 0.0,
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_decide_filters_on_pending_status() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/cash_cuts"))
            .and(query_param("id", "eq.C1"))
            .and(query_param("status", "eq.pending"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": "C1",
                    "branch_id": "BR-1",
                    "date": "2026-03-14",
                    "total_cash": 500,
                    "total_card": 0,
                    "total_transfer": 0,
                    "expenses_amount": 100,
                    "calculated_total": 400,
                    "status": "approved",
                    "approved_by": "U1",
                    "approved_at": "2026-03-15T09:00:00.000Z"
                }
            ])))
            .mount(&server)
            .await;

        let at = crate::models::parse_timestamp("2026-03-15T09:00:00.000Z").unwrap();
        let cut = store_for(&server)
            .decide_cash_cut_if_pending("C1", CashCutStatus::Approved, "U1", at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cut.status, CashCutStatus::Approved);
        assert_eq!(cut.approved_by.as_deref(), Some("U1"));
    }

    #[tokio::test]
    async fn test_decide_on_settled_cut_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/cash_cuts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let at = Utc::now();
        let result = store_for(&server)
            .decide_cash_cut_if_pending("C1", CashCutStatus::Rejected, "U1", at)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        // Nothing listens on the discard port.
        let store = SupabaseStore::connect("http://127.0.0.1:9", KEY, Duration::from_secs(2)).unwrap();
        let err = store.list_cash_cuts().await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.is_upstream());
    }

    /// Backend that answers every request with a 200 whose body stops short
    /// of its declared length.
    async fn truncating_backend() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                          Content-Length: 500\r\n\r\n[{\"total\": 116",
                    )
                    .await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_truncated_body_is_network_error() {
        let store = SupabaseStore::connect(&truncating_backend().await, KEY, Duration::from_secs(5))
            .unwrap();
        let err = store
            .fetch_sales(&march_14(), &BranchFilter::AllBranches)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)), "unexpected error: {err:?}");
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_truncated_body_aborts_financial_summary() {
        let store = SupabaseStore::connect(&truncating_backend().await, KEY, Duration::from_secs(5))
            .unwrap();
        let result = crate::accounting::financial_summary(
            &store,
            &march_14(),
            &BranchFilter::Branch("BR-1".into()),
        )
        .await;
        assert!(matches!(result, Err(Error::Network(_))), "unexpected result: {result:?}");
    }

    #[tokio::test]
    async fn test_fetch_sales_for_cut_query_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/sales"))
            .and(query_param("select", SALE_TENDER_COLUMNS.replace(' ', "")))
            .and(query_param("branch_id", "eq.BR-1"))
            .and(query_param("created_at", "gte.2026-03-14T00:00:00.000Z"))
            .and(query_param("created_at", "lte.2026-03-14T23:59:59.999Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "S1", "total": 80, "payment_method": "transferencia", "created_at": "2026-03-14T18:30:00Z" },
                { "id": "S2", "total": "20.5", "payment_method": null, "created_at": "2026-03-14T19:00:00Z" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let sales = store_for(&server)
            .fetch_sales_for_cut(&march_14(), "BR-1")
            .await
            .unwrap();
        assert_eq!(sales.len(), 2);
        assert_eq!(sales[0].payment_method.as_deref(), Some("transferencia"));
        assert_eq!(sales[1].total, 20.5);
        assert!(sales.iter().all(|s| s.items.is_empty()));
    }

    #[tokio::test]
    async fn test_fetch_redeemed_coupons_query_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/coupons"))
            .and(query_param("branch_id", "eq.BR-1"))
            .and(query_param("status", "eq.redeemed"))
            .and(query_param("redeemed_at", "gte.2026-03-14T00:00:00.000Z"))
            .and(query_param("redeemed_at", "lte.2026-03-14T23:59:59.999Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "V1", "code": "vale-20", "amount": "20", "status": "redeemed", "redeemed_at": "2026-03-14T15:00:00Z" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let coupons = store_for(&server)
            .fetch_redeemed_coupons(&march_14(), "BR-1")
            .await
            .unwrap();
        assert_eq!(coupons.len(), 1);
        assert_eq!(coupons[0].code.as_deref(), Some("vale-20"));
        assert_eq!(coupons[0].amount, 20.0);
        assert!(coupons[0].redeemed_at.is_some());
    }

    #[tokio::test]
    async fn test_profiles_listed_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("order", "created_at.desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "U2", "full_name": "Zoe", "email": "z@example.com", "role": "FINANCE", "created_at": "2026-03-02T00:00:00Z" },
                { "id": "U1", "full_name": "Ana", "email": "a@example.com", "role": "ADMIN", "created_at": "2026-03-01T00:00:00Z" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let profiles = store_for(&server).list_profiles().await.unwrap();
        let ids: Vec<&str> = profiles.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["U2", "U1"]);
    }

    #[tokio::test]
    async fn test_delete_profile_counts_returned_rows() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", "eq.U9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "U9" }])))
            .mount(&server)
            .await;

        assert!(store_for(&server).delete_profile("U9").await.unwrap());
    }
}
