//! [`BackOfficeStore`] over the local SQLite ledger.
//!
//! Timestamps are stored as RFC 3339 text with millisecond precision in UTC
//! so range filters compare lexicographically.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::BackOfficeStore;
use crate::db::{self, f64_at, i64_at, opt_f64_at, DbState};
use crate::error::{Error, Result};
use crate::models::{
    format_timestamp, parse_timestamp, BranchFilter, CashCut, CashCutStatus, DateRange,
    ExpenseCategory, ExpenseRecord, NewCashCut, NewExpense, NewProfile, Profile, Quotation,
    QuotationDraft, QuotationItem, QuotationStatus, RedeemedCoupon, SaleItem, SaleRecord,
    UserRole,
};

pub struct SqliteStore {
    db: DbState,
}

impl SqliteStore {
    pub fn new(db: DbState) -> Self {
        Self { db }
    }

    /// Ledger in memory; nothing survives the process.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(db::open_in_memory()?))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.db.conn.lock().map_err(|_| Error::LockPoisoned)?;
        f(&conn)
    }

    // -----------------------------------------------------------------------
    // Ledger intake
    //
    // Sales, products and vouchers are written by the till. These let the
    // ledger receive them from an import or sync job.
    // -----------------------------------------------------------------------

    pub fn upsert_product(&self, id: &str, name: &str, cost_price: Option<f64>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO products (id, name, cost_price) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name,
                                               cost_price = excluded.cost_price",
                params![id, name, cost_price],
            )?;
            Ok(())
        })
    }

    /// Record a completed sale with its line items. Returns the sale id.
    pub fn record_sale(&self, branch_id: &str, sale: &SaleRecord) -> Result<String> {
        let sale_id = sale
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let created_at = format_timestamp(&sale.created_at.unwrap_or_else(Utc::now));

        self.with_conn(|conn| {
            conn.execute_batch("BEGIN IMMEDIATE")?;
            let result = (|| -> Result<()> {
                conn.execute(
                    "INSERT INTO sales (id, branch_id, total, payment_method, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![sale_id, branch_id, sale.total, sale.payment_method, created_at],
                )?;
                for item in &sale.items {
                    conn.execute(
                        "INSERT INTO sale_items (id, sale_id, product_id, quantity, unit_price)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            Uuid::new_v4().to_string(),
                            sale_id,
                            item.product_id,
                            item.quantity,
                            item.unit_price
                        ],
                    )?;
                }
                Ok(())
            })();
            match result {
                Ok(()) => {
                    conn.execute_batch("COMMIT")?;
                    debug!(sale_id = %sale_id, branch_id, "sale recorded");
                    Ok(sale_id.clone())
                }
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    Err(e)
                }
            }
        })
    }

    /// Record a voucher redemption.
    pub fn record_redeemed_coupon(&self, branch_id: &str, coupon: &RedeemedCoupon) -> Result<()> {
        let redeemed_at = format_timestamp(&coupon.redeemed_at.unwrap_or_else(Utc::now));
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO coupons (id, code, branch_id, amount, status, redeemed_at)
                 VALUES (?1, ?2, ?3, ?4, 'redeemed', ?5)",
                params![coupon.id, coupon.code, branch_id, coupon.amount, redeemed_at],
            )?;
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn opt_timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.and_then(|s| {
        let parsed = parse_timestamp(&s);
        if parsed.is_none() {
            warn!(value = %s, "unparseable timestamp in ledger");
        }
        parsed
    }))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

const EXPENSE_COLUMNS: &str = "id, description, amount, category, branch_id, created_at";

fn expense_from_row(row: &Row) -> rusqlite::Result<ExpenseRecord> {
    let category: String = row.get(3)?;
    Ok(ExpenseRecord {
        id: row.get(0)?,
        description: row.get(1)?,
        amount: f64_at(row, 2),
        category: ExpenseCategory::from_stored(&category),
        branch_id: row.get(4)?,
        created_at: opt_timestamp_at(row, 5)?.unwrap_or_default(),
    })
}

const CASH_CUT_COLUMNS: &str = "id, branch_id, date, total_cash, total_card, total_transfer, \
     expenses_amount, calculated_total, notes, status, approved_by, approved_at, created_at";

/// Cash cut as read from SQLite, before the status and date are validated.
struct CashCutRow {
    id: String,
    branch_id: String,
    date: String,
    total_cash: f64,
    total_card: f64,
    total_transfer: f64,
    expenses_amount: f64,
    calculated_total: f64,
    notes: Option<String>,
    status: String,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
}

impl CashCutRow {
    fn read(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            branch_id: row.get(1)?,
            date: row.get(2)?,
            total_cash: f64_at(row, 3),
            total_card: f64_at(row, 4),
            total_transfer: f64_at(row, 5),
            expenses_amount: f64_at(row, 6),
            calculated_total: f64_at(row, 7),
            notes: row.get(8)?,
            status: row.get(9)?,
            approved_by: row.get(10)?,
            approved_at: opt_timestamp_at(row, 11)?,
            created_at: opt_timestamp_at(row, 12)?,
        })
    }

    fn into_cut(self) -> Result<CashCut> {
        let status = CashCutStatus::parse(&self.status).ok_or_else(|| {
            Error::InvalidState(format!(
                "cash cut {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").map_err(|_| {
            Error::InvalidState(format!("cash cut {} has unreadable date '{}'", self.id, self.date))
        })?;
        Ok(CashCut {
            id: self.id,
            branch_id: self.branch_id,
            date,
            total_cash: self.total_cash,
            total_card: self.total_card,
            total_transfer: self.total_transfer,
            expenses_amount: self.expenses_amount,
            calculated_total: self.calculated_total,
            notes: self.notes,
            status,
            approved_by: self.approved_by,
            approved_at: self.approved_at,
            created_at: self.created_at,
        })
    }
}

fn query_cash_cuts(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<CashCut>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, CashCutRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(CashCutRow::into_cut).collect()
}

const QUOTATION_COLUMNS: &str = "id, folio, client_id, client_name, branch_id, created_by, \
     items, subtotal, discount_amount, iva, total, status, created_at";

struct QuotationRow {
    quotation: Quotation,
    items_json: String,
    status: String,
}

impl QuotationRow {
    fn read(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            quotation: Quotation {
                id: row.get(0)?,
                folio: i64_at(row, 1),
                client_id: row.get(2)?,
                client_name: row.get(3)?,
                branch_id: row.get(4)?,
                created_by: row.get(5)?,
                items: Vec::new(),
                subtotal: f64_at(row, 7),
                discount_amount: f64_at(row, 8),
                iva: f64_at(row, 9),
                total: f64_at(row, 10),
                status: QuotationStatus::Pending,
                created_at: opt_timestamp_at(row, 12)?,
            },
            items_json: row.get(6)?,
            status: row.get(11)?,
        })
    }

    fn into_quotation(self) -> Result<Quotation> {
        let mut quotation = self.quotation;
        quotation.items = serde_json::from_str::<Vec<QuotationItem>>(&self.items_json)?;
        quotation.status = QuotationStatus::parse(&self.status).ok_or_else(|| {
            Error::InvalidState(format!(
                "quotation {} has unknown status '{}'",
                quotation.id, self.status
            ))
        })?;
        Ok(quotation)
    }
}

const PROFILE_COLUMNS: &str = "id, full_name, email, role, branch_id, created_at";

fn profile_from_row(row: &Row) -> rusqlite::Result<Profile> {
    let id: String = row.get(0)?;
    let role: String = row.get(3)?;
    let role = UserRole::parse(&role).unwrap_or_else(|| {
        warn!(profile_id = %id, role = %role, "unknown role, treating as seller");
        UserRole::Seller
    });
    Ok(Profile {
        id,
        full_name: row.get(1)?,
        email: row.get(2)?,
        role,
        branch_id: row.get(4)?,
        created_at: opt_timestamp_at(row, 5)?,
    })
}

fn sale_items(conn: &Connection, sale_id: &str) -> Result<Vec<SaleItem>> {
    let mut stmt = conn.prepare_cached(
        "SELECT si.product_id, si.quantity, si.unit_price, p.cost_price
         FROM sale_items si
         LEFT JOIN products p ON p.id = si.product_id
         WHERE si.sale_id = ?1
         ORDER BY si.rowid",
    )?;
    let items = stmt
        .query_map(params![sale_id], |row| {
            Ok(SaleItem {
                product_id: row.get(0)?,
                quantity: i64_at(row, 1),
                unit_price: f64_at(row, 2),
                product_cost_price: opt_f64_at(row, 3),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

fn select_sales(
    conn: &Connection,
    range: &DateRange,
    branch_id: Option<&str>,
) -> Result<Vec<SaleRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, total, payment_method, created_at
         FROM sales
         WHERE created_at >= ?1 AND created_at <= ?2
           AND (?3 IS NULL OR branch_id = ?3)
         ORDER BY created_at",
    )?;
    let sales = stmt
        .query_map(
            params![range.start_text(), range.end_text(), branch_id],
            |row| {
                Ok(SaleRecord {
                    id: row.get(0)?,
                    total: f64_at(row, 1),
                    payment_method: row.get(2)?,
                    created_at: opt_timestamp_at(row, 3)?,
                    items: Vec::new(),
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sales)
}

#[async_trait]
impl BackOfficeStore for SqliteStore {
    async fn fetch_sales(
        &self,
        range: &DateRange,
        branch: &BranchFilter,
    ) -> Result<Vec<SaleRecord>> {
        self.with_conn(|conn| {
            let mut sales = select_sales(conn, range, branch.branch_id())?;
            for sale in &mut sales {
                if let Some(id) = sale.id.as_deref() {
                    sale.items = sale_items(conn, id)?;
                }
            }
            debug!(count = sales.len(), "fetched sales from ledger");
            Ok(sales)
        })
    }

    async fn fetch_sales_for_cut(
        &self,
        range: &DateRange,
        branch_id: &str,
    ) -> Result<Vec<SaleRecord>> {
        self.with_conn(|conn| select_sales(conn, range, Some(branch_id)))
    }

    async fn fetch_expenses(
        &self,
        range: &DateRange,
        branch: &BranchFilter,
    ) -> Result<Vec<ExpenseRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EXPENSE_COLUMNS} FROM expenses
                 WHERE created_at >= ?1 AND created_at <= ?2
                   AND (?3 IS NULL OR branch_id = ?3)
                 ORDER BY created_at"
            ))?;
            let rows = stmt
                .query_map(
                    params![range.start_text(), range.end_text(), branch.branch_id()],
                    expense_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    async fn list_expenses(&self, branch: &BranchFilter) -> Result<Vec<ExpenseRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EXPENSE_COLUMNS} FROM expenses
                 WHERE (?1 IS NULL OR branch_id = ?1)
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map(params![branch.branch_id()], expense_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    async fn insert_expense(&self, expense: &NewExpense) -> Result<ExpenseRecord> {
        let record = ExpenseRecord {
            id: Uuid::new_v4().to_string(),
            description: expense.description.clone(),
            amount: expense.amount,
            category: expense.category,
            branch_id: expense.branch_id.clone(),
            created_at: Utc::now(),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO expenses (id, description, amount, category, branch_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.description,
                    record.amount,
                    record.category.as_str(),
                    record.branch_id,
                    format_timestamp(&record.created_at)
                ],
            )?;
            Ok(())
        })?;
        Ok(record)
    }

    async fn fetch_redeemed_coupons(
        &self,
        range: &DateRange,
        branch_id: &str,
    ) -> Result<Vec<RedeemedCoupon>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, code, amount, redeemed_at FROM coupons
                 WHERE branch_id = ?1 AND status = 'redeemed'
                   AND redeemed_at >= ?2 AND redeemed_at <= ?3
                 ORDER BY redeemed_at",
            )?;
            let rows = stmt
                .query_map(
                    params![branch_id, range.start_text(), range.end_text()],
                    |row| {
                        Ok(RedeemedCoupon {
                            id: row.get(0)?,
                            code: row.get(1)?,
                            amount: f64_at(row, 2),
                            redeemed_at: opt_timestamp_at(row, 3)?,
                        })
                    },
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    async fn find_cash_cut(&self, branch_id: &str, date: NaiveDate) -> Result<Option<CashCut>> {
        let date = date.format("%Y-%m-%d").to_string();
        self.with_conn(|conn| {
            let sql =
                format!("SELECT {CASH_CUT_COLUMNS} FROM cash_cuts WHERE branch_id = ?1 AND date = ?2");
            Ok(query_cash_cuts(conn, &sql, params![branch_id, date])?.into_iter().next())
        })
    }

    async fn get_cash_cut(&self, id: &str) -> Result<Option<CashCut>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {CASH_CUT_COLUMNS} FROM cash_cuts WHERE id = ?1");
            Ok(query_cash_cuts(conn, &sql, params![id])?.into_iter().next())
        })
    }

    async fn list_cash_cuts(&self) -> Result<Vec<CashCut>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CASH_CUT_COLUMNS} FROM cash_cuts ORDER BY date DESC, created_at DESC"
            );
            query_cash_cuts(conn, &sql, params![])
        })
    }

    async fn insert_cash_cut(&self, cut: &NewCashCut) -> Result<CashCut> {
        let stored = CashCut {
            id: Uuid::new_v4().to_string(),
            branch_id: cut.branch_id.clone(),
            date: cut.date,
            total_cash: cut.total_cash,
            total_card: cut.total_card,
            total_transfer: cut.total_transfer,
            expenses_amount: cut.expenses_amount,
            calculated_total: cut.calculated_total,
            notes: cut.notes.clone(),
            status: CashCutStatus::Pending,
            approved_by: None,
            approved_at: None,
            created_at: Some(Utc::now()),
        };
        let created_at = stored.created_at.as_ref().map(format_timestamp);
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO cash_cuts (id, branch_id, date, total_cash, total_card, total_transfer,
                                        expenses_amount, calculated_total, notes, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10)",
                params![
                    stored.id,
                    stored.branch_id,
                    stored.date.format("%Y-%m-%d").to_string(),
                    stored.total_cash,
                    stored.total_card,
                    stored.total_transfer,
                    stored.expenses_amount,
                    stored.calculated_total,
                    stored.notes,
                    created_at
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Err(Error::Conflict(format!(
                    "a cash cut for branch {} on {} already exists",
                    stored.branch_id, stored.date
                ))),
                Err(e) => Err(e.into()),
            }
        })?;
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
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE cash_cuts SET status = ?1, approved_by = ?2, approved_at = ?3
                 WHERE id = ?4 AND status = 'pending'",
                params![status.as_str(), reviewer_id, format_timestamp(&at), id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let sql = format!("SELECT {CASH_CUT_COLUMNS} FROM cash_cuts WHERE id = ?1");
            Ok(query_cash_cuts(conn, &sql, params![id])?.into_iter().next())
        })
    }

    async fn list_quotations(&self) -> Result<Vec<Quotation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {QUOTATION_COLUMNS} FROM quotations ORDER BY created_at DESC, folio DESC"
            ))?;
            let rows = stmt
                .query_map([], QuotationRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(QuotationRow::into_quotation).collect()
        })
    }

    async fn get_quotation(&self, id: &str) -> Result<Option<Quotation>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {QUOTATION_COLUMNS} FROM quotations WHERE id = ?1"),
                    params![id],
                    QuotationRow::read,
                )
                .optional()?;
            row.map(QuotationRow::into_quotation).transpose()
        })
    }

    async fn insert_quotation(&self, draft: &QuotationDraft) -> Result<Quotation> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let items_json = serde_json::to_string(&draft.items)?;

        let folio = self.with_conn(|conn| {
            conn.execute_batch("BEGIN IMMEDIATE")?;
            let result = (|| -> Result<i64> {
                let folio: i64 = conn.query_row(
                    "SELECT COALESCE(MAX(folio), 0) + 1 FROM quotations",
                    [],
                    |row| row.get(0),
                )?;
                conn.execute(
                    "INSERT INTO quotations (id, folio, client_id, client_name, branch_id, created_by,
                                             items, subtotal, discount_amount, iva, total, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        id,
                        folio,
                        draft.client_id,
                        draft.client_name,
                        draft.branch_id,
                        draft.created_by,
                        items_json,
                        draft.subtotal,
                        draft.discount_amount,
                        draft.iva,
                        draft.total,
                        draft.status.as_str(),
                        format_timestamp(&created_at)
                    ],
                )?;
                Ok(folio)
            })();
            match result {
                Ok(folio) => {
                    conn.execute_batch("COMMIT")?;
                    Ok(folio)
                }
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    Err(e)
                }
            }
        })?;

        Ok(Quotation {
            id,
            folio,
            client_id: draft.client_id.clone(),
            client_name: draft.client_name.clone(),
            branch_id: draft.branch_id.clone(),
            created_by: draft.created_by.clone(),
            items: draft.items.clone(),
            subtotal: draft.subtotal,
            discount_amount: draft.discount_amount,
            iva: draft.iva,
            total: draft.total,
            status: draft.status,
            created_at: Some(created_at),
        })
    }

    async fn update_quotation_status(
        &self,
        id: &str,
        status: QuotationStatus,
    ) -> Result<Option<Quotation>> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE quotations SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )?)
        })?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_quotation(id).await
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([], profile_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                    params![id],
                    profile_from_row,
                )
                .optional()?)
        })
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile> {
        let created_at = Utc::now();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO profiles (id, full_name, email, role, branch_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    profile.id,
                    profile.full_name,
                    profile.email,
                    profile.role.as_str(),
                    profile.branch_id,
                    format_timestamp(&created_at)
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Err(Error::Conflict(format!(
                    "profile {} already exists",
                    profile.id
                ))),
                Err(e) => Err(e.into()),
            }
        })?;
        Ok(Profile {
            id: profile.id.clone(),
            full_name: profile.full_name.clone(),
            email: profile.email.clone(),
            role: profile.role,
            branch_id: profile.branch_id.clone(),
            created_at: Some(created_at),
        })
    }

    async fn delete_profile(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM profiles WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
    }
}
