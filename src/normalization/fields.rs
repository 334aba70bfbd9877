use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Point value given to a clue whose value column cannot be read.
pub const DEFAULT_CLUE_VALUE: i32 = 200;

/// Literal date layout used by a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `YYYY-MM-DD`
    Iso,
    /// `MM/DD/YYYY`
    UsSlashed,
}

impl DateFormat {
    fn pattern(self) -> &'static str {
        match self {
            DateFormat::Iso => "%Y-%m-%d",
            DateFormat::UsSlashed => "%m/%d/%Y",
        }
    }
}

/// How the value column is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRule {
    /// Strip a leading currency symbol and thousands separators before parsing.
    pub strip_currency: bool,
}

/// Parse a clue value. Anything that is not a non-negative integer literal
/// (after optional currency cleaning) falls back to [`DEFAULT_CLUE_VALUE`].
pub fn parse_value(raw: &str, rule: ValueRule) -> i32 {
    let trimmed = raw.trim();
    let cleaned: String = if rule.strip_currency {
        trimmed
            .strip_prefix('$')
            .unwrap_or(trimmed)
            .chars()
            .filter(|c| *c != ',')
            .collect()
    } else {
        trimmed.to_string()
    };
    if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return DEFAULT_CLUE_VALUE;
    }
    cleaned.parse::<i32>().unwrap_or(DEFAULT_CLUE_VALUE)
}

/// Parse an air date in the given layout as midnight UTC. `None` when empty or malformed.
pub fn parse_airdate(raw: &str, format: DateFormat) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(trimmed, format.pattern()).ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Lenient date parser for query parameters: RFC 3339, `YYYY-MM-DD` or `MM/DD/YYYY`.
pub fn parse_date_param(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    parse_airdate(trimmed, DateFormat::Iso).or_else(|| parse_airdate(trimmed, DateFormat::UsSlashed))
}

/// Whether a round marker denotes the final round (no point value).
/// Seasons files number rounds 1..3; archive files spell them out.
pub fn is_final_round(round: &str) -> bool {
    let r = round.trim();
    r == "3" || r.to_ascii_lowercase().contains("final")
}

/// Explicit game id column: digits only, anything else is treated as absent.
pub fn parse_game_id(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const PLAIN: ValueRule = ValueRule {
        strip_currency: false,
    };
    const CURRENCY: ValueRule = ValueRule {
        strip_currency: true,
    };

    #[test]
    fn value_digits_are_used() {
        assert_eq!(parse_value("400", PLAIN), 400);
        assert_eq!(parse_value(" 1000 ", PLAIN), 1000);
        assert_eq!(parse_value("0", PLAIN), 0);
    }

    #[test]
    fn unparseable_value_defaults() {
        assert_eq!(parse_value("", PLAIN), DEFAULT_CLUE_VALUE);
        assert_eq!(parse_value("-200", PLAIN), DEFAULT_CLUE_VALUE);
        assert_eq!(parse_value("n/a", PLAIN), DEFAULT_CLUE_VALUE);
        assert_eq!(parse_value("$1,200", PLAIN), DEFAULT_CLUE_VALUE);
        assert_eq!(parse_value("99999999999", PLAIN), DEFAULT_CLUE_VALUE);
    }

    #[test]
    fn currency_cleaning() {
        assert_eq!(parse_value("$1,200", CURRENCY), 1200);
        assert_eq!(parse_value("$800", CURRENCY), 800);
        assert_eq!(parse_value("2,000", CURRENCY), 2000);
        assert_eq!(parse_value("$", CURRENCY), DEFAULT_CLUE_VALUE);
        assert_eq!(parse_value("€300", CURRENCY), DEFAULT_CLUE_VALUE);
    }

    #[test]
    fn airdate_formats() {
        let iso = parse_airdate("1984-09-10", DateFormat::Iso).unwrap();
        assert_eq!((iso.year(), iso.month(), iso.day()), (1984, 9, 10));
        let us = parse_airdate("09/10/1984", DateFormat::UsSlashed).unwrap();
        assert_eq!(iso, us);
        assert!(parse_airdate("09/10/1984", DateFormat::Iso).is_none());
        assert!(parse_airdate("", DateFormat::Iso).is_none());
        assert!(parse_airdate("1984-13-40", DateFormat::Iso).is_none());
    }

    #[test]
    fn date_params_accept_several_layouts() {
        let a = parse_date_param("2022-01-05").unwrap();
        let b = parse_date_param("2022-01-05T00:00:00Z").unwrap();
        let c = parse_date_param("01/05/2022").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(parse_date_param("yesterday").is_none());
    }

    #[test]
    fn final_round_markers() {
        assert!(is_final_round("3"));
        assert!(is_final_round("Final Jeopardy!"));
        assert!(!is_final_round("1"));
        assert!(!is_final_round("Double Jeopardy!"));
    }

    #[test]
    fn game_id_column() {
        assert_eq!(parse_game_id("4680"), Some(4680));
        assert_eq!(parse_game_id(" "), None);
        assert_eq!(parse_game_id("#4680"), None);
    }
}
