//! Display helpers for Spanish (Mexico) reports.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::models::{CashCutStatus, ExpenseCategory};

/// Status label printed on cash-cut reports.
pub fn translate_status(status: Option<CashCutStatus>) -> &'static str {
    match status {
        None => "SIN ENVIAR",
        Some(CashCutStatus::Pending) => "PENDIENTE",
        Some(CashCutStatus::Approved) => "APROBADO",
        Some(CashCutStatus::Rejected) => "RECHAZADO",
    }
}

pub fn category_label(category: ExpenseCategory) -> &'static str {
    match category {
        ExpenseCategory::Renta => "Renta",
        ExpenseCategory::Servicios => "Servicios",
        ExpenseCategory::Salarios => "Salarios",
        ExpenseCategory::Suministros => "Suministros",
        ExpenseCategory::Otros => "Otros",
    }
}

/// `$1,234.50`; negatives as `-$1,234.50`.
pub fn format_money(value: f64) -> String {
    let cents = (value * 100.0).round();
    let negative = cents < 0.0;
    let cents = cents.abs() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!(
        "{}${grouped}.{:02}",
        if negative { "-" } else { "" },
        cents % 100
    )
}

const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

fn weekday_es(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "lunes",
        Weekday::Tue => "martes",
        Weekday::Wed => "miércoles",
        Weekday::Thu => "jueves",
        Weekday::Fri => "viernes",
        Weekday::Sat => "sábado",
        Weekday::Sun => "domingo",
    }
}

/// `sábado, 14 de marzo de 2026`
pub fn format_long_date_es(date: NaiveDate) -> String {
    format!(
        "{}, {} de {} de {}",
        weekday_es(date.weekday()),
        date.day(),
        MONTHS[date.month0() as usize],
        date.year()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0.0), "$0.00");
        assert_eq!(format_money(5.5), "$5.50");
        assert_eq!(format_money(999.999), "$1,000.00");
        assert_eq!(format_money(1234567.891), "$1,234,567.89");
        assert_eq!(format_money(-200.0), "-$200.00");
    }

    #[test]
    fn test_format_long_date_es() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(format_long_date_es(date), "sábado, 14 de marzo de 2026");
        let date = NaiveDate::from_ymd_opt(2026, 9, 2).unwrap();
        assert_eq!(format_long_date_es(date), "miércoles, 2 de septiembre de 2026");
    }

    #[test]
    fn test_translate_status() {
        assert_eq!(translate_status(None), "SIN ENVIAR");
        assert_eq!(translate_status(Some(CashCutStatus::Approved)), "APROBADO");
        assert_eq!(translate_status(Some(CashCutStatus::Rejected)), "RECHAZADO");
    }
}
