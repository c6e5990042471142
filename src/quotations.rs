//! Customer quotations.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::accounting::{sum_amounts, IVA_RATE};
use crate::error::{Error, Result};
use crate::models::{Discount, Quotation, QuotationDraft, QuotationItem, QuotationStatus};
use crate::store::BackOfficeStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationTotals {
    pub subtotal: f64,
    pub discount_amount: f64,
    pub iva: f64,
    pub total: f64,
}

impl QuotationTotals {
    /// Price a list of items. IVA is added on top of the discounted
    /// subtotal; quoted prices are pre-tax.
    pub fn compute(items: &[QuotationItem], discount: Option<Discount>) -> Self {
        let subtotal = sum_amounts(items.iter().map(line_total));
        let discount_amount = match discount {
            Some(Discount::Percentage(pct)) => subtotal * pct.clamp(0.0, 100.0) / 100.0,
            Some(Discount::Fixed(amount)) => amount.max(0.0),
            None => 0.0,
        }
        .min(subtotal);
        let taxable = subtotal - discount_amount;
        let iva = taxable * IVA_RATE;
        Self {
            subtotal,
            discount_amount,
            iva,
            total: taxable + iva,
        }
    }
}

/// Unit price for the line, using the wholesale price once the quantity
/// reaches its threshold. A wholesale price needs both a positive price and
/// a positive minimum quantity; otherwise the list price stands.
pub fn effective_unit_price(item: &QuotationItem) -> f64 {
    match (item.wholesale_price, item.wholesale_min_qty) {
        (Some(price), Some(min_qty)) if price > 0.0 && min_qty > 0 && item.quantity >= min_qty => {
            price
        }
        _ => item.unit_price,
    }
}

fn line_total(item: &QuotationItem) -> f64 {
    item.quantity.max(0) as f64 * effective_unit_price(item)
}

/// Input for a new quotation. Totals are computed from the items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationRequest {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    pub branch_id: String,
    #[serde(default)]
    pub created_by: Option<String>,
    pub items: Vec<QuotationItem>,
    #[serde(default)]
    pub discount: Option<Discount>,
}

pub async fn list_quotations(store: &dyn BackOfficeStore) -> Result<Vec<Quotation>> {
    store.list_quotations().await
}

pub async fn get_quotation(store: &dyn BackOfficeStore, id: &str) -> Result<Quotation> {
    store
        .get_quotation(id)
        .await?
        .ok_or_else(|| Error::not_found("quotation", id))
}

pub async fn create_quotation(
    store: &dyn BackOfficeStore,
    request: QuotationRequest,
) -> Result<Quotation> {
    if request.branch_id.trim().is_empty() {
        return Err(Error::validation("quotation branch is required"));
    }
    let items: Vec<QuotationItem> = request
        .items
        .into_iter()
        .filter(|item| item.quantity > 0)
        .collect();
    if items.is_empty() {
        return Err(Error::validation(
            "a quotation needs at least one item with a positive quantity",
        ));
    }
    if let Some(item) = items.iter().find(|i| !i.unit_price.is_finite() || i.unit_price < 0.0) {
        return Err(Error::validation(format!(
            "invalid unit price for product {}",
            item.product_id
        )));
    }

    let totals = QuotationTotals::compute(&items, request.discount);
    let quotation = store
        .insert_quotation(&QuotationDraft {
            client_id: request.client_id,
            client_name: request.client_name,
            branch_id: request.branch_id,
            created_by: request.created_by,
            items,
            subtotal: totals.subtotal,
            discount_amount: totals.discount_amount,
            iva: totals.iva,
            total: totals.total,
            status: QuotationStatus::Pending,
        })
        .await?;
    info!(
        quotation_id = %quotation.id,
        folio = quotation.folio,
        total = quotation.total,
        "quotation created"
    );
    Ok(quotation)
}

pub async fn update_quotation_status(
    store: &dyn BackOfficeStore,
    id: &str,
    status: QuotationStatus,
) -> Result<Quotation> {
    let updated = store
        .update_quotation_status(id, status)
        .await?
        .ok_or_else(|| Error::not_found("quotation", id))?;
    info!(quotation_id = id, status = status.as_str(), "quotation status updated");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn line(quantity: i64, unit_price: f64, wholesale: Option<(f64, i64)>) -> QuotationItem {
        QuotationItem {
            product_id: format!("P-{quantity}"),
            product_name: None,
            quantity,
            unit_price,
            wholesale_price: wholesale.map(|(p, _)| p),
            wholesale_min_qty: wholesale.map(|(_, q)| q),
        }
    }

    #[test]
    fn test_wholesale_price_applies_from_threshold() {
        assert_eq!(effective_unit_price(&line(11, 10.0, Some((8.0, 12)))), 10.0);
        assert_eq!(effective_unit_price(&line(12, 10.0, Some((8.0, 12)))), 8.0);
        assert_eq!(effective_unit_price(&line(1, 10.0, None)), 10.0);
    }

    #[test]
    fn test_wholesale_price_needs_price_and_minimum() {
        let mut no_minimum = line(5, 100.0, None);
        no_minimum.wholesale_price = Some(60.0);
        assert_eq!(effective_unit_price(&no_minimum), 100.0);

        assert_eq!(effective_unit_price(&line(5, 100.0, Some((60.0, 0)))), 100.0);
        assert_eq!(effective_unit_price(&line(5, 100.0, Some((0.0, 3)))), 100.0);
        assert_eq!(effective_unit_price(&line(5, 100.0, Some((60.0, 3)))), 60.0);
    }

    #[test]
    fn test_totals_with_percentage_discount() {
        let totals = QuotationTotals::compute(
            &[line(2, 50.0, None), line(12, 10.0, Some((8.0, 12)))],
            Some(Discount::Percentage(10.0)),
        );
        assert_eq!(totals.subtotal, 196.0);
        assert!((totals.discount_amount - 19.6).abs() < 1e-9);
        assert!((totals.iva - 28.224).abs() < 1e-9);
        assert!((totals.total - 204.624).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_discount_is_capped_at_subtotal() {
        let totals = QuotationTotals::compute(&[line(1, 30.0, None)], Some(Discount::Fixed(50.0)));
        assert_eq!(totals.discount_amount, 30.0);
        assert_eq!(totals.iva, 0.0);
        assert_eq!(totals.total, 0.0);
    }

    #[test]
    fn test_no_discount() {
        let totals = QuotationTotals::compute(&[line(3, 100.0, None)], None);
        assert_eq!(totals.subtotal, 300.0);
        assert_eq!(totals.discount_amount, 0.0);
        assert!((totals.total - 348.0).abs() < 1e-9);
    }

    fn request(items: Vec<QuotationItem>) -> QuotationRequest {
        QuotationRequest {
            client_id: None,
            client_name: Some("Constructora Norte".into()),
            branch_id: "BR-1".into(),
            created_by: Some("U-SELLER".into()),
            items,
            discount: None,
        }
    }

    #[tokio::test]
    async fn test_create_requires_positive_quantity() {
        let store = SqliteStore::in_memory().unwrap();
        let err = create_quotation(&store, request(vec![line(0, 10.0, None)]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = create_quotation(&store, request(vec![])).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_get_and_update_status() {
        let store = SqliteStore::in_memory().unwrap();
        let created = create_quotation(&store, request(vec![line(3, 100.0, None), line(0, 1.0, None)]))
            .await
            .unwrap();
        assert_eq!(created.items.len(), 1);
        assert_eq!(created.subtotal, 300.0);
        assert_eq!(created.status, QuotationStatus::Pending);

        let fetched = get_quotation(&store, &created.id).await.unwrap();
        assert_eq!(fetched.folio, created.folio);

        let accepted = update_quotation_status(&store, &created.id, QuotationStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(accepted.status, QuotationStatus::Accepted);
        assert_eq!(list_quotations(&store).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_quotation_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(matches!(
            get_quotation(&store, "nope").await.unwrap_err(),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            update_quotation_status(&store, "nope", QuotationStatus::Expired)
                .await
                .unwrap_err(),
            Error::NotFound { .. }
        ));
    }
}
