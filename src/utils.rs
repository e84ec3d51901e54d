use crate::error::{LedgerBuilderError, Result};
use chrono::{Datelike, Days, NaiveDate};

/// Three-letter month codes used by the consolidated workbooks, in month order.
pub const MONTH_CODES: [&str; 12] = [
    "ENE", "FEB", "MAR", "ABR", "MAY", "JUN", "JUL", "AGO", "SEP", "OCT", "NOV", "DIC",
];

const MONTH_NAMES_ES: [&str; 12] = [
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

const MONTH_NAMES_EN: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .checked_sub_days(Days::new(1))
        .unwrap()
}

/// Resolves a month token to its 1-based month number.
///
/// Accepts the three-letter codes the consolidated workbooks use (`ENE`..`DIC`),
/// full Spanish or English month names, and plain numerics (`"1"`..`"12"`).
pub fn month_number(token: &str) -> Result<u32> {
    let trimmed = token.trim();

    if let Some(idx) = MONTH_CODES
        .iter()
        .position(|c| c.eq_ignore_ascii_case(trimmed))
    {
        return Ok(idx as u32 + 1);
    }

    let lower = trimmed.to_lowercase();
    if let Some(idx) = MONTH_NAMES_ES.iter().position(|n| *n == lower) {
        return Ok(idx as u32 + 1);
    }
    if let Some(idx) = MONTH_NAMES_EN.iter().position(|n| *n == lower) {
        return Ok(idx as u32 + 1);
    }

    if let Ok(num) = trimmed.parse::<u32>() {
        if (1..=12).contains(&num) {
            return Ok(num);
        }
        return Err(LedgerBuilderError::InvalidMonthNumber(num));
    }

    Err(LedgerBuilderError::UnknownMonthToken(token.to_string()))
}

pub fn month_code(month: u32) -> Result<&'static str> {
    if !(1..=12).contains(&month) {
        return Err(LedgerBuilderError::InvalidMonthNumber(month));
    }
    Ok(MONTH_CODES[month as usize - 1])
}

/// Validates a month token coming in on a batch. The token format is the
/// caller's concern; the core only rejects empty tokens and tokens it cannot
/// resolve to a month number.
pub fn parse_month_token(token: &str, client: &str) -> Result<u32> {
    if token.trim().is_empty() {
        return Err(LedgerBuilderError::EmptyMonthToken(client.to_string()));
    }
    month_number(token)
}

/// The period immediately after `(year, month)`, rolling December into
/// January of the next year.
pub fn next_period(year: i32, month: u32) -> Result<(i32, u32)> {
    if !(1..=12).contains(&month) {
        return Err(LedgerBuilderError::InvalidMonthNumber(month));
    }
    if month == 12 {
        Ok((year + 1, 1))
    } else {
        Ok((year, month + 1))
    }
}

pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let year_diff = end.year() - start.year();
    let month_diff = end.month() as i32 - start.month() as i32;
    year_diff * 12 + month_diff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2023, 2),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            last_day_of_month(2023, 4),
            NaiveDate::from_ymd_opt(2023, 4, 30).unwrap()
        );
        assert_eq!(
            last_day_of_month(2023, 12),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_month_number_codes() {
        assert_eq!(month_number("ENE").unwrap(), 1);
        assert_eq!(month_number("ago").unwrap(), 8);
        assert_eq!(month_number("DIC").unwrap(), 12);
    }

    #[test]
    fn test_month_number_names_and_numerics() {
        assert_eq!(month_number("enero").unwrap(), 1);
        assert_eq!(month_number("September").unwrap(), 9);
        assert_eq!(month_number("11").unwrap(), 11);
    }

    #[test]
    fn test_month_number_rejects_unknown() {
        assert!(month_number("SMARCH").is_err());
        assert!(month_number("13").is_err());
        assert!(month_number("0").is_err());
    }

    #[test]
    fn test_parse_month_token_rejects_empty() {
        let err = parse_month_token("  ", "MAKRO").unwrap_err();
        assert!(matches!(err, LedgerBuilderError::EmptyMonthToken(_)));
    }

    #[test]
    fn test_next_period_rollover() {
        assert_eq!(next_period(2023, 7).unwrap(), (2023, 8));
        assert_eq!(next_period(2023, 12).unwrap(), (2024, 1));
        assert!(next_period(2023, 13).is_err());
    }

    #[test]
    fn test_months_between() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 31).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(months_between(start, end), 14);
    }

    #[test]
    fn test_month_code_roundtrip() {
        for m in 1..=12 {
            assert_eq!(month_number(month_code(m).unwrap()).unwrap(), m);
        }
    }
}
