//! Data-access boundary between the back-office services and whichever
//! backend holds the records.
//!
//! Services never reach for a global client: every operation takes a
//! `&dyn BackOfficeStore`. Two implementations ship with the crate, the hosted
//! PostgREST backend ([`SupabaseStore`]) and a local SQLite ledger
//! ([`SqliteStore`]).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::models::{
    BranchFilter, CashCut, CashCutStatus, DateRange, ExpenseRecord, NewCashCut, NewExpense,
    NewProfile, Profile, Quotation, QuotationDraft, QuotationStatus, RedeemedCoupon, SaleRecord,
};

pub(crate) mod lenient;
pub mod query;
pub mod sqlite;
pub mod supabase;

pub use query::PostgrestQuery;
pub use sqlite::SqliteStore;
pub use supabase::SupabaseStore;

#[async_trait]
pub trait BackOfficeStore: Send + Sync {
    // -- sales -------------------------------------------------------------

    /// Sales created inside `range` with their line items and product cost.
    async fn fetch_sales(&self, range: &DateRange, branch: &BranchFilter)
        -> Result<Vec<SaleRecord>>;

    /// Sales of one branch inside `range` with their payment method. Line
    /// items are not loaded.
    async fn fetch_sales_for_cut(&self, range: &DateRange, branch_id: &str)
        -> Result<Vec<SaleRecord>>;

    // -- expenses ----------------------------------------------------------

    async fn fetch_expenses(
        &self,
        range: &DateRange,
        branch: &BranchFilter,
    ) -> Result<Vec<ExpenseRecord>>;

    /// Every expense for the branch filter, newest first.
    async fn list_expenses(&self, branch: &BranchFilter) -> Result<Vec<ExpenseRecord>>;

    /// Store an expense; the backend assigns `id` and `created_at`.
    async fn insert_expense(&self, expense: &NewExpense) -> Result<ExpenseRecord>;

    // -- vouchers ----------------------------------------------------------

    async fn fetch_redeemed_coupons(
        &self,
        range: &DateRange,
        branch_id: &str,
    ) -> Result<Vec<RedeemedCoupon>>;

    // -- cash cuts ---------------------------------------------------------

    async fn find_cash_cut(&self, branch_id: &str, date: NaiveDate) -> Result<Option<CashCut>>;

    async fn get_cash_cut(&self, id: &str) -> Result<Option<CashCut>>;

    /// All cuts, most recent business day first.
    async fn list_cash_cuts(&self) -> Result<Vec<CashCut>>;

    /// Store a new `pending` cut. A second cut for the same branch and day is
    /// a [`crate::Error::Conflict`].
    async fn insert_cash_cut(&self, cut: &NewCashCut) -> Result<CashCut>;

    /// Move a cut out of `pending` in one conditional write. Returns `None`
    /// when no pending cut with that id existed, in which case nothing was
    /// written.
    async fn decide_cash_cut_if_pending(
        &self,
        id: &str,
        status: CashCutStatus,
        reviewer_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CashCut>>;

    // -- quotations --------------------------------------------------------

    async fn list_quotations(&self) -> Result<Vec<Quotation>>;

    async fn get_quotation(&self, id: &str) -> Result<Option<Quotation>>;

    /// Store a quotation; the backend assigns `id`, `folio` and `created_at`.
    async fn insert_quotation(&self, draft: &QuotationDraft) -> Result<Quotation>;

    async fn update_quotation_status(
        &self,
        id: &str,
        status: QuotationStatus,
    ) -> Result<Option<Quotation>>;

    // -- profiles ----------------------------------------------------------

    async fn list_profiles(&self) -> Result<Vec<Profile>>;

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>>;

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile>;

    /// Returns `false` when no profile with that id existed.
    async fn delete_profile(&self, id: &str) -> Result<bool>;
}
