//! Financial summary, daily cash cut and the expense ledger.
//!
//! The aggregation functions are pure: callers fetch and filter the records
//! and pass them in. The `async` wrappers do the fetching through an explicit
//! [`BackOfficeStore`] handle and propagate any fetch failure unchanged.

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{
    BranchFilter, DateRange, ExpenseCategory, ExpenseRecord, NewExpense, RedeemedCoupon,
    SaleRecord, TenderMethod,
};
use crate::store::BackOfficeStore;

/// Mexican VAT rate. Sale totals are tax-inclusive.
pub const IVA_RATE: f64 = 0.16;

// ---------------------------------------------------------------------------
// Financial summary
// ---------------------------------------------------------------------------

/// Derived figures for a period. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    pub total_sales: f64,
    pub total_cogs: f64,
    pub total_expenses: f64,
    /// Tax contained in `total_sales`. Reporting only.
    pub total_iva: f64,
    pub gross_profit: f64,
    pub net_profit: f64,
}

impl FinancialSummary {
    /// Gross profit as a percentage of sales; 0 when there were no sales.
    pub fn gross_margin_pct(&self) -> f64 {
        percent_of_sales(self.gross_profit, self.total_sales)
    }

    /// Net profit as a percentage of sales; 0 when there were no sales.
    pub fn net_margin_pct(&self) -> f64 {
        percent_of_sales(self.net_profit, self.total_sales)
    }
}

fn percent_of_sales(value: f64, sales: f64) -> f64 {
    if sales == 0.0 {
        0.0
    } else {
        value / sales * 100.0
    }
}

/// Tax portion of a tax-inclusive amount.
pub fn back_calculate_iva(total: f64, rate: f64) -> f64 {
    total / (1.0 + rate) * rate
}

/// Sum starting from `+0.0`. `Iterator::sum` for floats starts from `-0.0`,
/// which leaks into empty totals.
pub(crate) fn sum_amounts(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, |acc, v| acc + v)
}

/// Aggregate already-filtered sales and expenses.
///
/// A line item without a product cost contributes nothing to the cost of
/// goods sold.
pub fn compute_summary(sales: &[SaleRecord], expenses: &[ExpenseRecord]) -> FinancialSummary {
    let total_sales = sum_amounts(sales.iter().map(|s| s.total));
    let total_cogs = sum_amounts(sales.iter().flat_map(|s| s.items.iter()).map(|item| item.cost()));
    let total_expenses = sum_amounts(expenses.iter().map(|e| e.amount));

    FinancialSummary {
        total_sales,
        total_cogs,
        total_expenses,
        total_iva: back_calculate_iva(total_sales, IVA_RATE),
        gross_profit: total_sales - total_cogs,
        net_profit: total_sales - total_cogs - total_expenses,
    }
}

/// Fetch sales and expenses for the window and summarise them.
pub async fn financial_summary(
    store: &dyn BackOfficeStore,
    range: &DateRange,
    branch: &BranchFilter,
) -> Result<FinancialSummary> {
    let sales = store.fetch_sales(range, branch).await?;
    let expenses = store.fetch_expenses(range, branch).await?;

    let uncosted = sales
        .iter()
        .flat_map(|s| s.items.iter())
        .filter(|item| item.product_cost_price.is_none())
        .count();
    if uncosted > 0 {
        debug!(lines = uncosted, "sale lines without product cost counted at zero");
    }

    let summary = compute_summary(&sales, &expenses);
    info!(
        sales = sales.len(),
        expenses = expenses.len(),
        total_sales = summary.total_sales,
        net_profit = summary.net_profit,
        "financial summary computed"
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Daily cash cut
// ---------------------------------------------------------------------------

/// Sale totals split by how they were paid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenderTotals {
    pub cash: f64,
    pub card: f64,
    pub transfer: f64,
    /// Every sale, including unrecognised payment methods.
    pub total: f64,
}

impl TenderTotals {
    pub fn from_sales(sales: &[SaleRecord]) -> Self {
        let mut totals = Self::default();
        for sale in sales {
            match TenderMethod::classify(sale.payment_method.as_deref()) {
                Some(TenderMethod::Cash) => totals.cash += sale.total,
                Some(TenderMethod::Card) => totals.card += sale.total,
                Some(TenderMethod::Transfer) => totals.transfer += sale.total,
                None => {}
            }
            totals.total += sale.total;
        }
        totals
    }

    pub fn for_method(&self, method: TenderMethod) -> f64 {
        match method {
            TenderMethod::Cash => self.cash,
            TenderMethod::Card => self.card,
            TenderMethod::Transfer => self.transfer,
        }
    }
}

/// One branch, one business day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashCutReport {
    pub branch_id: String,
    pub date: NaiveDate,
    pub tenders: TenderTotals,
    pub sales_count: usize,
    pub expenses: Vec<ExpenseRecord>,
    pub expense_total: f64,
    pub coupons: Vec<RedeemedCoupon>,
    pub coupon_total: f64,
    /// Cash tendered minus the day's expenses.
    pub cash_on_hand: f64,
}

pub fn compute_daily_cash_cut(
    branch_id: &str,
    date: NaiveDate,
    sales: &[SaleRecord],
    expenses: Vec<ExpenseRecord>,
    coupons: Vec<RedeemedCoupon>,
) -> CashCutReport {
    let tenders = TenderTotals::from_sales(sales);
    let expense_total = sum_amounts(expenses.iter().map(|e| e.amount));
    let coupon_total = sum_amounts(coupons.iter().map(|c| c.amount));

    CashCutReport {
        branch_id: branch_id.to_string(),
        date,
        tenders,
        sales_count: sales.len(),
        expenses,
        expense_total,
        coupons,
        coupon_total,
        cash_on_hand: tenders.cash - expense_total,
    }
}

/// Fetch one business day for a branch and build its cash-cut report.
pub async fn daily_cash_cut(
    store: &dyn BackOfficeStore,
    branch_id: &str,
    date: NaiveDate,
    utc_offset: FixedOffset,
) -> Result<CashCutReport> {
    if branch_id.trim().is_empty() {
        return Err(Error::validation("a branch is required for a cash cut"));
    }
    let day = DateRange::calendar_day(date, utc_offset);
    let branch = BranchFilter::Branch(branch_id.to_string());

    let sales = store.fetch_sales_for_cut(&day, branch_id).await?;
    let expenses = store.fetch_expenses(&day, &branch).await?;
    let coupons = store.fetch_redeemed_coupons(&day, branch_id).await?;

    let report = compute_daily_cash_cut(branch_id, date, &sales, expenses, coupons);
    info!(
        branch_id,
        date = %date,
        sales = report.sales_count,
        cash_on_hand = report.cash_on_hand,
        "daily cash cut computed"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Expense ledger
// ---------------------------------------------------------------------------

/// Validate and store an expense. Expenses cannot be edited afterwards.
pub async fn record_expense(
    store: &dyn BackOfficeStore,
    expense: NewExpense,
) -> Result<ExpenseRecord> {
    let description = expense.description.trim().to_string();
    if description.is_empty() {
        return Err(Error::validation("expense description is required"));
    }
    if !expense.amount.is_finite() || expense.amount <= 0.0 {
        return Err(Error::validation(format!(
            "expense amount must be greater than zero, got {}",
            expense.amount
        )));
    }
    let branch_id = expense.branch_id.trim().to_string();
    if branch_id.is_empty() {
        return Err(Error::validation("expense branch is required"));
    }

    let stored = store
        .insert_expense(&NewExpense {
            description,
            amount: expense.amount,
            category: expense.category,
            branch_id,
        })
        .await?;
    info!(
        expense_id = %stored.id,
        branch_id = %stored.branch_id,
        category = stored.category.as_str(),
        amount = stored.amount,
        "expense recorded"
    );
    Ok(stored)
}

pub async fn list_expenses(
    store: &dyn BackOfficeStore,
    branch: &BranchFilter,
) -> Result<Vec<ExpenseRecord>> {
    store.list_expenses(branch).await
}

/// Sum per category. Every category is present, empty ones at 0.
pub fn expenses_by_category(expenses: &[ExpenseRecord]) -> BTreeMap<ExpenseCategory, f64> {
    let mut totals: BTreeMap<ExpenseCategory, f64> =
        ExpenseCategory::ALL.into_iter().map(|c| (c, 0.0)).collect();
    for expense in expenses {
        *totals.entry(expense.category).or_insert(0.0) += expense.amount;
    }
    totals
}
