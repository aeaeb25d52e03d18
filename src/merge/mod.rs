//! Stock reconciliation: subtract aggregated sales from the downloaded stock sheet.
//!
//! The stock table is left-joined against the per-product sales totals, so
//! every stock row survives exactly once and products that sold without a
//! stock row are dropped. The dropped ids are reported back to the caller.

mod sheet;

pub use calamine::Data;
pub use sheet::{product_key, Sheet};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{InputKind, PipelineError, Result};

pub const PRODUCT_ID: &str = "product_id";
pub const STOCK_QTY: &str = "stock_qty";
pub const QUANTITY_SOLD: &str = "quantity_sold";

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub output_path: PathBuf,
    /// Data rows in the stock sheet, equal to rows written.
    pub stock_rows: usize,
    /// Data rows in the sales sheet. This counts sales entries, not units.
    pub sales_rows: usize,
    /// Distinct products that had both a stock row and sales.
    pub matched_products: usize,
    /// Products with sales but no stock row, sorted.
    pub dropped_products: Vec<String>,
}

/// Reconcile `stock_path` against `sales_path` and write the result to `output_path`.
///
/// The stock file is checked before the sales file is looked at. The output
/// path must differ from both inputs; neither is ever rewritten.
pub fn reconcile(
    stock_path: &Path,
    sales_path: &Path,
    output_path: &Path,
) -> Result<ReconcileSummary> {
    if !stock_path.exists() {
        return Err(PipelineError::MissingInput {
            which: InputKind::Stock,
            path: stock_path.to_path_buf(),
        });
    }
    if !sales_path.exists() {
        return Err(PipelineError::MissingInput {
            which: InputKind::Sales,
            path: sales_path.to_path_buf(),
        });
    }
    if output_path == stock_path {
        return Err(PipelineError::InvalidConfig(format!(
            "reconciled output would overwrite the stock input {}",
            stock_path.display()
        )));
    }
    if output_path == sales_path {
        return Err(PipelineError::InvalidConfig(format!(
            "reconciled output would overwrite the sales log {}",
            sales_path.display()
        )));
    }

    let stock = Sheet::read(stock_path)?;
    let sales = Sheet::read(sales_path)?;

    let (updated, stats) = reconcile_sheets(&stock, &sales)?;
    updated.write_atomic(output_path)?;

    if !stats.dropped_products.is_empty() {
        tracing::warn!(
            dropped = ?stats.dropped_products,
            "Sales recorded for products missing from the stock sheet were ignored"
        );
    }
    tracing::info!(
        output = %output_path.display(),
        stock_rows = updated.rows.len(),
        sales_rows = sales.rows.len(),
        matched = stats.matched_products,
        "Reconciled stock"
    );

    Ok(ReconcileSummary {
        output_path: output_path.to_path_buf(),
        stock_rows: updated.rows.len(),
        sales_rows: sales.rows.len(),
        matched_products: stats.matched_products,
        dropped_products: stats.dropped_products,
    })
}

#[derive(Debug, Default)]
pub struct JoinStats {
    pub matched_products: usize,
    pub dropped_products: Vec<String>,
}

/// The pure part of [`reconcile`]: returns a copy of `stock` with only the
/// `stock_qty` column reduced by the aggregated sales.
pub fn reconcile_sheets(stock: &Sheet, sales: &Sheet) -> Result<(Sheet, JoinStats)> {
    let stock_id = stock.column(PRODUCT_ID)?;
    let stock_qty = stock.column(STOCK_QTY)?;
    let sales_id = sales.column(PRODUCT_ID)?;
    let sold_qty = sales.column(QUANTITY_SOLD)?;

    let sold = aggregate_sales(sales, sales_id, sold_qty)?;

    let mut updated = stock.clone();
    let mut matched = BTreeSet::new();

    for (i, row) in updated.rows.iter_mut().enumerate() {
        let Some(current) = stock.quantity(i, stock_qty)? else {
            tracing::debug!(row = i + 2, "Stock row has no quantity; left unchanged");
            continue;
        };

        let key = product_key(&row[stock_id]);
        let total = key.as_ref().and_then(|key| sold.get(key)).copied();
        if let (Some(key), Some(_)) = (key, total) {
            matched.insert(key);
        }

        let sold_qty = total.unwrap_or(Decimal::ZERO);
        let remaining = floor_subtract(current, sold_qty).ok_or_else(|| {
            PipelineError::spreadsheet(
                &stock.path,
                format!("row {}: {current} - {sold_qty} is out of range", i + 2),
            )
        })?;
        row[stock_qty] = quantity_cell(remaining);
    }

    let dropped_products = sold
        .keys()
        .filter(|key| !matched.contains(*key))
        .cloned()
        .collect();

    Ok((
        updated,
        JoinStats {
            matched_products: matched.len(),
            dropped_products,
        },
    ))
}

/// Sum `quantity_sold` per product. Rows without a product id, blank rows
/// included, don't contribute.
fn aggregate_sales(
    sales: &Sheet,
    id_col: usize,
    qty_col: usize,
) -> Result<BTreeMap<String, Decimal>> {
    let mut totals = BTreeMap::new();
    for (i, row) in sales.rows.iter().enumerate() {
        let Some(key) = product_key(&row[id_col]) else {
            continue;
        };
        let qty = sales.quantity(i, qty_col)?.unwrap_or(Decimal::ZERO);
        let total = totals.entry(key).or_insert(Decimal::ZERO);
        *total = total.checked_add(qty).ok_or_else(|| {
            PipelineError::spreadsheet(
                &sales.path,
                format!("row {}: total {QUANTITY_SOLD} is out of range", i + 2),
            )
        })?;
    }
    Ok(totals)
}

/// `max(0, stock - sold)`, or `None` if the difference overflows.
pub fn floor_subtract(stock: Decimal, sold: Decimal) -> Option<Decimal> {
    stock
        .checked_sub(sold)
        .map(|remaining| remaining.max(Decimal::ZERO))
}

/// Spreadsheets store every number as a double.
fn quantity_cell(value: Decimal) -> Data {
    Data::Float(value.normalize().to_f64().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    fn table(header: &[&str], rows: Vec<Vec<Data>>) -> Sheet {
        Sheet {
            path: PathBuf::from("test.xlsx"),
            name: "Sheet1".to_string(),
            header: header.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn floor_never_goes_negative() {
        assert_eq!(
            floor_subtract(Decimal::from(3), Decimal::from(10)),
            Some(Decimal::ZERO)
        );
        assert_eq!(
            floor_subtract(Decimal::from(10), Decimal::from(3)),
            Some(Decimal::from(7))
        );
        assert_eq!(floor_subtract(Decimal::MIN, Decimal::ONE), None);
    }

    #[test]
    fn blank_rows_keep_their_place() -> Result<()> {
        let stock = table(
            &["product_id", "stock_qty"],
            vec![
                vec![text("P1"), Data::Float(10.0)],
                vec![Data::Empty, Data::Empty],
                vec![text("P2"), Data::Float(4.0)],
            ],
        );
        let sales = table(
            &["product_id", "quantity_sold"],
            vec![
                vec![text("P1"), Data::Float(3.0)],
                vec![Data::Empty, Data::Empty],
            ],
        );

        let (updated, stats) = reconcile_sheets(&stock, &sales)?;
        assert_eq!(updated.rows.len(), 3);
        assert_eq!(updated.rows[0][1], Data::Float(7.0));
        assert_eq!(updated.rows[1], vec![Data::Empty, Data::Empty]);
        assert_eq!(updated.rows[2][1], Data::Float(4.0));
        assert_eq!(stats.matched_products, 1);

        Ok(())
    }

    #[test]
    fn other_columns_are_untouched() -> Result<()> {
        let stock = table(
            &["sku_name", "product_id", "stock_qty", "warehouse"],
            vec![
                vec![text("Mug"), text("P1"), Data::Float(10.0), text("north")],
                vec![text("Cup"), text("P2"), Data::Float(5.0), Data::Empty],
            ],
        );
        let sales = table(
            &["product_id", "quantity_sold"],
            vec![vec![text("P1"), Data::Float(4.0)]],
        );

        let (updated, stats) = reconcile_sheets(&stock, &sales)?;

        assert_eq!(updated.header, stock.header);
        assert_eq!(updated.rows[0][0], text("Mug"));
        assert_eq!(updated.rows[0][2], Data::Float(6.0));
        assert_eq!(updated.rows[0][3], text("north"));
        assert_eq!(updated.rows[1][2], Data::Float(5.0));
        assert_eq!(updated.rows[1][3], Data::Empty);
        assert_eq!(stats.matched_products, 1);

        Ok(())
    }

    #[test]
    fn sales_without_stock_row_are_dropped_and_reported() -> Result<()> {
        let stock = table(
            &["product_id", "stock_qty"],
            vec![vec![text("P1"), Data::Float(2.0)]],
        );
        let sales = table(
            &["product_id", "quantity_sold"],
            vec![
                vec![text("P9"), Data::Float(1.0)],
                vec![text("P1"), Data::Float(1.0)],
                vec![text("P3"), Data::Float(1.0)],
            ],
        );

        let (updated, stats) = reconcile_sheets(&stock, &sales)?;

        assert_eq!(updated.rows.len(), 1);
        assert_eq!(updated.rows[0][1], Data::Float(1.0));
        assert_eq!(stats.dropped_products, vec!["P3".to_string(), "P9".to_string()]);

        Ok(())
    }

    #[test]
    fn numeric_and_text_ids_join() -> Result<()> {
        let stock = table(
            &["product_id", "stock_qty"],
            vec![vec![Data::Float(101.0), Data::Float(9.0)]],
        );
        let sales = table(
            &["product_id", "quantity_sold"],
            vec![
                vec![text("101"), Data::Float(2.0)],
                vec![Data::Int(101), Data::Float(3.0)],
            ],
        );

        let (updated, _) = reconcile_sheets(&stock, &sales)?;
        assert_eq!(updated.rows[0][1], Data::Float(4.0));

        Ok(())
    }

    #[test]
    fn blank_sales_quantity_counts_as_zero() -> Result<()> {
        let stock = table(
            &["product_id", "stock_qty"],
            vec![vec![text("P1"), Data::Float(5.0)]],
        );
        let sales = table(
            &["product_id", "quantity_sold"],
            vec![
                vec![text("P1"), Data::Empty],
                vec![Data::Empty, Data::Float(3.0)],
            ],
        );

        let (updated, stats) = reconcile_sheets(&stock, &sales)?;
        assert_eq!(updated.rows[0][1], Data::Float(5.0));
        assert!(stats.dropped_products.is_empty());

        Ok(())
    }

    #[test]
    fn blank_stock_quantity_is_left_blank() -> Result<()> {
        let stock = table(
            &["product_id", "stock_qty"],
            vec![vec![text("P1"), Data::Empty]],
        );
        let sales = table(
            &["product_id", "quantity_sold"],
            vec![vec![text("P1"), Data::Float(2.0)]],
        );

        let (updated, _) = reconcile_sheets(&stock, &sales)?;
        assert_eq!(updated.rows[0][1], Data::Empty);

        Ok(())
    }

    #[test]
    fn missing_sales_column_is_reported() {
        let stock = table(&["product_id", "stock_qty"], vec![]);
        let sales = table(&["product_id", "qty"], vec![]);

        match reconcile_sheets(&stock, &sales) {
            Err(PipelineError::MissingColumn { column, .. }) => {
                assert_eq!(column, QUANTITY_SOLD)
            }
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }
}
