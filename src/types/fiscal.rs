//! Financial-year arithmetic
//!
//! Tax withholding is bucketed by financial year, which runs April 1 through
//! March 31. A date in April or later belongs to the year `{Y}-{Y+1}`;
//! January through March belong to `{Y-1}-{Y}`.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An April-to-March financial year, identified by its starting calendar year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinancialYear {
    start_year: i32,
}

impl FinancialYear {
    /// The financial year starting April 1 of the given calendar year
    pub fn starting(start_year: i32) -> Self {
        FinancialYear { start_year }
    }

    /// The financial year containing the given date
    pub fn from_date(date: NaiveDate) -> Self {
        if date.month() >= 4 {
            FinancialYear {
                start_year: date.year(),
            }
        } else {
            FinancialYear {
                start_year: date.year() - 1,
            }
        }
    }

    /// The calendar year this financial year starts in
    pub fn start_year(self) -> i32 {
        self.start_year
    }

    /// The following financial year
    pub fn next(self) -> Self {
        FinancialYear {
            start_year: self.start_year + 1,
        }
    }

    /// The `"2024-2025"` style label used in records and reports
    pub fn label(self) -> String {
        format!("{}-{}", self.start_year, self.start_year + 1)
    }
}

impl fmt::Display for FinancialYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_year, self.start_year + 1)
    }
}

impl FromStr for FinancialYear {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("invalid financial year '{}'", s))?;
        let start: i32 = start
            .trim()
            .parse()
            .map_err(|_| format!("invalid financial year '{}'", s))?;
        let end: i32 = end
            .trim()
            .parse()
            .map_err(|_| format!("invalid financial year '{}'", s))?;
        if end != start + 1 {
            return Err(format!("invalid financial year '{}'", s));
        }
        Ok(FinancialYear { start_year: start })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case(date(2024, 4, 1), 2024)]
    #[case(date(2024, 5, 15), 2024)]
    #[case(date(2024, 12, 31), 2024)]
    #[case(date(2025, 1, 1), 2024)]
    #[case(date(2025, 3, 31), 2024)]
    #[case(date(2025, 4, 1), 2025)]
    fn test_from_date_boundaries(#[case] d: NaiveDate, #[case] expected_start: i32) {
        assert_eq!(FinancialYear::from_date(d).start_year(), expected_start);
    }

    #[test]
    fn test_label_format() {
        assert_eq!(FinancialYear::starting(2024).label(), "2024-2025");
    }

    #[test]
    fn test_next_advances_one_year() {
        assert_eq!(
            FinancialYear::starting(2024).next(),
            FinancialYear::starting(2025)
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let fy: FinancialYear = "2024-2025".parse().unwrap();
        assert_eq!(fy, FinancialYear::starting(2024));
        assert_eq!(fy.label().parse::<FinancialYear>().unwrap(), fy);
    }

    #[test]
    fn test_parse_rejects_non_consecutive_years() {
        assert!("2024-2026".parse::<FinancialYear>().is_err());
        assert!("2024".parse::<FinancialYear>().is_err());
    }
}
