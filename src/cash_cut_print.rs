//! Printable daily cash-cut report, as HTML for a browser print dialog or as
//! ESC/POS bytes for a thermal printer.

use crate::accounting::CashCutReport;
use crate::escpos::{EscPosBuilder, PaperWidth};
use crate::formatters::{category_label, format_long_date_es, format_money, translate_status};
use crate::models::CashCutStatus;

/// Names printed above the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintHeader {
    pub business_name: String,
    /// Display name of the branch; the branch id is printed when empty.
    pub branch_name: String,
}

impl PrintHeader {
    fn branch_or<'a>(&'a self, report: &'a CashCutReport) -> &'a str {
        let name = self.branch_name.trim();
        if name.is_empty() {
            &report.branch_id
        } else {
            name
        }
    }
}

fn esc(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut line = String::new();
    for token in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(token);
            continue;
        }
        let next_len = line.chars().count() + 1 + token.chars().count();
        if next_len > width.max(8) {
            out.push(line);
            line = token.to_string();
        } else {
            line.push(' ');
            line.push_str(token);
        }
    }
    if !line.is_empty() {
        out.push(line);
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

fn html_shell(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="UTF-8"/>
<title>{}</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 0; padding: 24px; color: #0f172a; }}
header {{ text-align: center; border-bottom: 4px solid #0f172a; padding-bottom: 16px; margin-bottom: 24px; }}
header h1 {{ margin: 0; font-size: 28px; text-transform: uppercase; }}
header p {{ margin: 4px 0 0 0; font-size: 12px; font-weight: 700; }}
.cards {{ display: grid; grid-template-columns: repeat(5, 1fr); gap: 12px; }}
.card {{ border: 1px solid #cbd5e1; border-radius: 12px; padding: 12px; }}
.card.total {{ background: #0f172a; color: #fff; }}
.card span {{ display: block; font-size: 10px; text-transform: uppercase; color: #64748b; }}
.card strong {{ font-size: 18px; }}
table {{ width: 100%; border-collapse: collapse; font-size: 12px; margin-top: 8px; }}
th, td {{ padding: 6px 8px; border-bottom: 1px solid #e2e8f0; text-align: left; }}
.amount {{ text-align: right; }}
.empty {{ text-align: center; color: #94a3b8; font-style: italic; }}
.footer {{ display: flex; justify-content: space-between; border-top: 2px dashed #cbd5e1; margin-top: 24px; padding-top: 16px; }}
.status {{ font-weight: 800; letter-spacing: 0.1em; }}
</style>
</head>
<body>{}</body>
</html>"#,
        esc(title),
        body
    )
}

fn card(label: &str, value: f64, class: &str) -> String {
    format!(
        r#"<div class="card{class}"><span>{}</span><strong>{}</strong></div>"#,
        esc(label),
        esc(&format_money(value))
    )
}

fn table(title: &str, columns: (&str, &str), rows: &[(String, String)], empty: &str) -> String {
    let mut out = format!(
        "<section><h3>{}</h3><table><thead><tr><th>{}</th><th class=\"amount\">{}</th></tr></thead><tbody>",
        esc(title),
        esc(columns.0),
        esc(columns.1)
    );
    if rows.is_empty() {
        out.push_str(&format!(
            "<tr><td colspan=\"2\" class=\"empty\">{}</td></tr>",
            esc(empty)
        ));
    }
    for (label, amount) in rows {
        out.push_str(&format!(
            "<tr><td>{}</td><td class=\"amount\">{}</td></tr>",
            esc(label),
            esc(amount)
        ));
    }
    out.push_str("</tbody></table></section>");
    out
}

pub fn render_html(
    report: &CashCutReport,
    status: Option<CashCutStatus>,
    header: &PrintHeader,
) -> String {
    let branch = header.branch_or(report);
    let mut body = String::new();

    body.push_str(&format!(
        "<header><h1>{}</h1><p>REPORTE DE CORTE DIARIO - {}</p><p>{}</p></header>",
        esc(&header.business_name),
        esc(branch),
        esc(&format_long_date_es(report.date))
    ));

    body.push_str("<div class=\"cards\">");
    body.push_str(&card("Efectivo", report.tenders.cash, ""));
    body.push_str(&card("Tarjeta", report.tenders.card, ""));
    body.push_str(&card("Transferencia", report.tenders.transfer, ""));
    body.push_str(&card("Vales", report.coupon_total, ""));
    body.push_str(&card("Venta Total", report.tenders.total, " total"));
    body.push_str("</div>");

    let expense_rows: Vec<(String, String)> = report
        .expenses
        .iter()
        .map(|e| {
            (
                format!("{} ({})", e.description, category_label(e.category)),
                format!("-{}", format_money(e.amount)),
            )
        })
        .collect();
    body.push_str(&table(
        "Gastos Registrados",
        ("Descripción", "Monto"),
        &expense_rows,
        "No hay gastos hoy.",
    ));

    let coupon_rows: Vec<(String, String)> = report
        .coupons
        .iter()
        .map(|c| {
            (
                c.code.clone().unwrap_or_else(|| c.id.clone()).to_uppercase(),
                format_money(c.amount),
            )
        })
        .collect();
    body.push_str(&table(
        "Vales Canjeados",
        ("Código / Ref", "Monto"),
        &coupon_rows,
        "No hay vales hoy.",
    ));

    body.push_str(&format!(
        "<div class=\"footer\"><div><span>Tickets de Venta</span><p>{} registros</p>\
         <p class=\"status\">ESTADO: {}</p></div>\
         <div class=\"amount\"><span>Saldo en Caja (Efectivo)</span><p><strong>{}</strong></p>\
         <small>Efectivo - Gastos</small></div></div>",
        report.sales_count,
        translate_status(status),
        esc(&format_money(report.cash_on_hand))
    ));

    let title = format!("Corte {} {}", branch, report.date.format("%Y-%m-%d"));
    html_shell(&title, &body)
}

// ---------------------------------------------------------------------------
// ESC/POS
// ---------------------------------------------------------------------------

fn emit_pair(builder: &mut EscPosBuilder, label: &str, value: &str) {
    let width = builder.width();
    let label_len = label.chars().count();
    let value_len = value.chars().count();
    if label_len + value_len < width {
        builder.line_pair(label, value);
        return;
    }
    for line in wrap(label, width.saturating_sub(value_len + 1).max(8)) {
        builder.text(&line).lf();
    }
    builder.right().text(value).lf().left();
}

pub fn render_escpos(
    report: &CashCutReport,
    status: Option<CashCutStatus>,
    header: &PrintHeader,
    paper: PaperWidth,
) -> Vec<u8> {
    let mut b = EscPosBuilder::new().with_paper(paper);
    let width = b.width();
    let branch = header.branch_or(report).to_string();

    b.init().latin().center();
    b.bold(true).double_height().text(&header.business_name.to_uppercase()).lf();
    b.normal_size();
    for line in wrap(&format!("REPORTE DE CORTE DIARIO - {branch}"), width) {
        b.text(&line).lf();
    }
    b.bold(false).text(&format_long_date_es(report.date)).lf();
    b.left().separator();

    b.line_pair("Efectivo", &format_money(report.tenders.cash));
    b.line_pair("Tarjeta", &format_money(report.tenders.card));
    b.line_pair("Transferencia", &format_money(report.tenders.transfer));
    b.line_pair("Vales", &format_money(report.coupon_total));
    b.bold(true)
        .line_pair("Venta Total", &format_money(report.tenders.total))
        .bold(false);
    b.separator();

    b.bold(true).text("Gastos Registrados").lf().bold(false);
    if report.expenses.is_empty() {
        b.text("No hay gastos hoy.").lf();
    }
    for expense in &report.expenses {
        emit_pair(&mut b, &expense.description, &format!("-{}", format_money(expense.amount)));
    }
    b.separator();

    b.bold(true).text("Vales Canjeados").lf().bold(false);
    if report.coupons.is_empty() {
        b.text("No hay vales hoy.").lf();
    }
    for coupon in &report.coupons {
        let code = coupon.code.clone().unwrap_or_else(|| coupon.id.clone()).to_uppercase();
        emit_pair(&mut b, &code, &format_money(coupon.amount));
    }
    b.separator();

    b.line_pair("Tickets de venta", &report.sales_count.to_string());
    b.bold(true)
        .line_pair("Saldo en caja", &format_money(report.cash_on_hand))
        .bold(false);
    b.center()
        .text(&format!("ESTADO: {}", translate_status(status)))
        .lf();
    b.feed(3).cut();
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::compute_daily_cash_cut;
    use crate::models::{ExpenseCategory, ExpenseRecord, RedeemedCoupon, SaleRecord};
    use chrono::{NaiveDate, Utc};

    fn report() -> CashCutReport {
        let sales = vec![
            SaleRecord {
                id: None,
                total: 1250.0,
                payment_method: Some("efectivo".into()),
                created_at: None,
                items: vec![],
            },
            SaleRecord {
                id: None,
                total: 300.0,
                payment_method: Some("card".into()),
                created_at: None,
                items: vec![],
            },
        ];
        let expenses = vec![ExpenseRecord {
            id: "E1".into(),
            description: "Garrafón <agua> & hielo".into(),
            amount: 50.0,
            category: ExpenseCategory::Suministros,
            branch_id: "BR-1".into(),
            created_at: Utc::now(),
        }];
        let coupons = vec![RedeemedCoupon {
            id: "V1".into(),
            code: Some("vale-20".into()),
            amount: 20.0,
            redeemed_at: None,
        }];
        compute_daily_cash_cut(
            "BR-1",
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            &sales,
            expenses,
            coupons,
        )
    }

    fn header() -> PrintHeader {
        PrintHeader {
            business_name: "PINTAMAX".into(),
            branch_name: "Sucursal Centro".into(),
        }
    }

    #[test]
    fn test_html_contains_report_sections() {
        let html = render_html(&report(), Some(CashCutStatus::Pending), &header());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("REPORTE DE CORTE DIARIO - Sucursal Centro"));
        assert!(html.contains("sábado, 14 de marzo de 2026"));
        assert!(html.contains("$1,250.00"));
        assert!(html.contains("$1,550.00"));
        assert!(html.contains("VALE-20"));
        assert!(html.contains("$1,200.00"));
        assert!(html.contains("ESTADO: PENDIENTE"));
    }

    #[test]
    fn test_html_escapes_user_text() {
        let html = render_html(&report(), None, &header());
        assert!(html.contains("Garrafón &lt;agua&gt; &amp; hielo"));
        assert!(!html.contains("<agua>"));
        assert!(html.contains("ESTADO: SIN ENVIAR"));
    }

    #[test]
    fn test_html_empty_tables() {
        let mut r = report();
        r.expenses.clear();
        r.coupons.clear();
        let html = render_html(&r, None, &header());
        assert!(html.contains("No hay gastos hoy."));
        assert!(html.contains("No hay vales hoy."));
    }

    #[test]
    fn test_branch_id_used_without_branch_name() {
        let h = PrintHeader {
            business_name: "PINTAMAX".into(),
            branch_name: " ".into(),
        };
        let html = render_html(&report(), None, &h);
        assert!(html.contains("REPORTE DE CORTE DIARIO - BR-1"));
    }

    #[test]
    fn test_escpos_frames_and_content() {
        let bytes = render_escpos(
            &report(),
            Some(CashCutStatus::Approved),
            &header(),
            PaperWidth::Mm58,
        );
        // ESC @ then ESC t 2
        assert_eq!(&bytes[..5], &[0x1B, 0x40, 0x1B, 0x74, 2]);
        // Ends with a partial cut.
        assert_eq!(&bytes[bytes.len() - 4..], &[0x1D, 0x56, 0x41, 0x10]);

        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("ESTADO: APROBADO"));
        assert!(text.contains("$1,200.00"));
        assert!(text.contains("VALE-20"));
    }

    #[test]
    fn test_escpos_lines_fit_paper() {
        let bytes = render_escpos(&report(), None, &header(), PaperWidth::Mm58);
        // Split on LF and drop command bytes; every printed run fits 32 columns.
        for line in bytes.split(|&b| b == 0x0A) {
            let printable = line.iter().filter(|&&b| b >= 0x20).count();
            assert!(printable <= 32 + 8, "line too long: {printable}");
        }
    }
}
