//! UK tax years and submission protocol selection.
//!
//! A tax year runs 6 April to 5 April and is written `"2025-26"`. The
//! protocol used to report it is decided here, once, and threaded through
//! the rest of the pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MtdError;

/// First tax year reported through cumulative year-to-date summaries.
pub const CUMULATIVE_CUTOVER_START_YEAR: i32 = 2025;

/// A UK tax year identified by the calendar year it starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaxYear {
    start_year: i32,
}

impl TaxYear {
    pub fn new(start_year: i32) -> Self {
        Self { start_year }
    }

    /// The tax year a date falls in.
    pub fn containing(date: NaiveDate) -> Self {
        let boundary = NaiveDate::from_ymd_opt(date.year(), 4, 6);
        match boundary {
            Some(b) if date >= b => Self::new(date.year()),
            _ => Self::new(date.year() - 1),
        }
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    /// 6 April of the starting year.
    pub fn start(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.start_year, 4, 6).unwrap_or(NaiveDate::MIN)
    }

    /// 5 April of the following year.
    pub fn end(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.start_year + 1, 4, 5).unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    /// Standard quarterly update periods (6 Apr–5 Jul, 6 Jul–5 Oct,
    /// 6 Oct–5 Jan, 6 Jan–5 Apr).
    pub fn quarters(&self) -> [(NaiveDate, NaiveDate); 4] {
        let y = self.start_year;
        let d = |year: i32, month: u32, day: u32| {
            NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
        };
        [
            (d(y, 4, 6), d(y, 7, 5)),
            (d(y, 7, 6), d(y, 10, 5)),
            (d(y, 10, 6), d(y + 1, 1, 5)),
            (d(y + 1, 1, 6), d(y + 1, 4, 5)),
        ]
    }

    pub fn protocol(&self) -> SubmissionProtocol {
        SubmissionProtocol::for_tax_year(*self)
    }
}

impl fmt::Display for TaxYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:02}",
            self.start_year,
            (self.start_year + 1).rem_euclid(100)
        )
    }
}

impl FromStr for TaxYear {
    type Err = MtdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MtdError::Validation(format!("Invalid tax year '{s}', expected YYYY-YY"));

        let (start, end) = s.split_once('-').ok_or_else(invalid)?;
        if start.len() != 4 || end.len() != 2 {
            return Err(invalid());
        }
        let start_year: i32 = start.parse().map_err(|_| invalid())?;
        let end_suffix: i32 = end.parse().map_err(|_| invalid())?;
        if (start_year + 1).rem_euclid(100) != end_suffix {
            return Err(invalid());
        }
        Ok(Self::new(start_year))
    }
}

impl Serialize for TaxYear {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaxYear {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How a tax year's figures are reported to HMRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionProtocol {
    /// Discrete period summaries; each call creates, nothing is amended.
    Period,
    /// Year-to-date summaries; each call creates or amends the remote total.
    Cumulative,
}

impl SubmissionProtocol {
    pub fn for_tax_year(tax_year: TaxYear) -> Self {
        if tax_year.start_year() >= CUMULATIVE_CUTOVER_START_YEAR {
            SubmissionProtocol::Cumulative
        } else {
            SubmissionProtocol::Period
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionProtocol::Period => "period",
            SubmissionProtocol::Cumulative => "cumulative",
        }
    }
}

impl fmt::Display for SubmissionProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn display_and_parse() {
        let ty: TaxYear = "2025-26".parse().unwrap();
        assert_eq!(ty.start_year(), 2025);
        assert_eq!(ty.to_string(), "2025-26");
        assert_eq!(TaxYear::new(1999).to_string(), "1999-00");
    }

    #[test]
    fn parse_rejects_mismatched_suffix() {
        assert!("2025-27".parse::<TaxYear>().is_err());
        assert!("2025".parse::<TaxYear>().is_err());
        assert!("25-26".parse::<TaxYear>().is_err());
    }

    #[test]
    fn boundaries_are_sixth_and_fifth_april() {
        let ty = TaxYear::new(2024);
        assert_eq!(ty.start(), date(2024, 4, 6));
        assert_eq!(ty.end(), date(2025, 4, 5));
        assert_eq!(TaxYear::containing(date(2025, 4, 5)), ty);
        assert_eq!(TaxYear::containing(date(2025, 4, 6)), TaxYear::new(2025));
    }

    #[test]
    fn quarters_tile_the_year() {
        let ty = TaxYear::new(2023);
        let q = ty.quarters();
        assert_eq!(q[0].0, ty.start());
        assert_eq!(q[3].1, ty.end());
        for pair in q.windows(2) {
            assert_eq!(pair[0].1.succ_opt().unwrap(), pair[1].0);
        }
    }

    #[test]
    fn protocol_switches_at_cutover() {
        assert_eq!(
            SubmissionProtocol::for_tax_year(TaxYear::new(2024)),
            SubmissionProtocol::Period
        );
        assert_eq!(
            SubmissionProtocol::for_tax_year(TaxYear::new(2025)),
            SubmissionProtocol::Cumulative
        );
        assert_eq!(TaxYear::new(2026).protocol(), SubmissionProtocol::Cumulative);
    }

    #[test]
    fn serde_uses_textual_form() {
        let json = serde_json::to_string(&TaxYear::new(2023)).unwrap();
        assert_eq!(json, "\"2023-24\"");
        let back: TaxYear = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TaxYear::new(2023));
    }
}
