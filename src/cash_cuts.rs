//! Cash-cut submission and supervisory review.
//!
//! A cut starts `pending` and moves once to `approved` or `rejected`. The
//! move stamps the reviewer and the time and cannot be undone.

use chrono::{FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::accounting::{daily_cash_cut, CashCutReport};
use crate::error::{Error, Result};
use crate::models::{CashCut, CashCutStatus, NewCashCut};
use crate::store::BackOfficeStore;

/// Outcome a reviewer chooses for a pending cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    #[serde(alias = "approved")]
    Approve,
    #[serde(alias = "rejected")]
    Reject,
}

impl Decision {
    pub fn target_status(self) -> CashCutStatus {
        match self {
            Decision::Approve => CashCutStatus::Approved,
            Decision::Reject => CashCutStatus::Rejected,
        }
    }
}

/// Live report for a day together with its submitted cut, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashCutReview {
    pub report: CashCutReport,
    pub cut: Option<CashCut>,
}

impl CashCutReview {
    /// `None` while the day has not been submitted.
    pub fn status(&self) -> Option<CashCutStatus> {
        self.cut.as_ref().map(|c| c.status)
    }
}

/// Compute the day's report and file it for review.
pub async fn submit_cash_cut(
    store: &dyn BackOfficeStore,
    branch_id: &str,
    date: NaiveDate,
    utc_offset: FixedOffset,
    notes: Option<&str>,
) -> Result<CashCut> {
    if let Some(existing) = store.find_cash_cut(branch_id, date).await? {
        return Err(Error::Conflict(format!(
            "cash cut for branch {branch_id} on {date} was already submitted ({})",
            existing.status.as_str()
        )));
    }

    let report = daily_cash_cut(store, branch_id, date, utc_offset).await?;
    let notes = notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);

    let cut = store
        .insert_cash_cut(&NewCashCut {
            branch_id: report.branch_id.clone(),
            date,
            total_cash: report.tenders.cash,
            total_card: report.tenders.card,
            total_transfer: report.tenders.transfer,
            expenses_amount: report.expense_total,
            calculated_total: report.cash_on_hand,
            notes,
        })
        .await?;
    info!(cut_id = %cut.id, branch_id, date = %date, "cash cut submitted");
    Ok(cut)
}

pub async fn cash_cut_status(
    store: &dyn BackOfficeStore,
    branch_id: &str,
    date: NaiveDate,
) -> Result<Option<CashCutStatus>> {
    Ok(store
        .find_cash_cut(branch_id, date)
        .await?
        .map(|cut| cut.status))
}

pub async fn review_cash_cut(
    store: &dyn BackOfficeStore,
    branch_id: &str,
    date: NaiveDate,
    utc_offset: FixedOffset,
) -> Result<CashCutReview> {
    let report = daily_cash_cut(store, branch_id, date, utc_offset).await?;
    let cut = store.find_cash_cut(branch_id, date).await?;
    Ok(CashCutReview { report, cut })
}

pub async fn list_cash_cuts(store: &dyn BackOfficeStore) -> Result<Vec<CashCut>> {
    store.list_cash_cuts().await
}

/// Approve or reject a pending cut.
///
/// The reviewer must be a profile allowed to review cash cuts. A cut that is
/// no longer pending is left untouched and the call fails with
/// [`Error::InvalidState`].
pub async fn decide(
    store: &dyn BackOfficeStore,
    cut_id: &str,
    decision: Decision,
    reviewer_id: &str,
) -> Result<CashCut> {
    let reviewer = store
        .get_profile(reviewer_id)
        .await?
        .ok_or_else(|| Error::Unauthorized(format!("unknown reviewer {reviewer_id}")))?;
    if !reviewer.role.can_review_cash_cuts() {
        warn!(reviewer_id, role = reviewer.role.as_str(), "cash cut review refused");
        return Err(Error::Unauthorized(format!(
            "role {} cannot review cash cuts",
            reviewer.role.as_str()
        )));
    }

    let cut = store
        .get_cash_cut(cut_id)
        .await?
        .ok_or_else(|| Error::not_found("cash cut", cut_id))?;
    if cut.status.is_terminal() {
        return Err(Error::InvalidState(format!(
            "cash cut {cut_id} is already {}",
            cut.status.as_str()
        )));
    }

    let target = decision.target_status();
    let updated = store
        .decide_cash_cut_if_pending(cut_id, target, reviewer_id, Utc::now())
        .await?
        // Another reviewer settled it between the read and the write.
        .ok_or_else(|| Error::InvalidState(format!("cash cut {cut_id} is no longer pending")))?;

    info!(
        cut_id,
        reviewer_id,
        status = updated.status.as_str(),
        "cash cut reviewed"
    );
    Ok(updated)
}
