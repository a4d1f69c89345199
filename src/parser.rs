use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, PartialEq, Error)]
pub enum DueDateError {
    #[error("Due date cannot be empty.")]
    Empty,

    #[error("Unrecognized date '{0}' (use YYYY-MM-DD, today, tomorrow or +Nd)")]
    Unrecognized(String),
}

fn at_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Parses the due date editor's input. Dates are taken as UTC midnight,
/// matching what a date picker yields.
pub fn parse_due_date(input: &str, today: NaiveDate) -> Result<DateTime<Utc>, DueDateError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DueDateError::Empty);
    }

    match input.to_lowercase().as_str() {
        "today" => return Ok(at_midnight(today)),
        "tomorrow" => return Ok(at_midnight(today + Duration::days(1))),
        _ => {}
    }

    let relative_re = Regex::new(r"^\+(\d{1,4})d?$").unwrap();
    if let Some(caps) = relative_re.captures(input) {
        if let Ok(days) = caps[1].parse::<i64>() {
            return Ok(at_midnight(today + Duration::days(days)));
        }
    }

    let iso_re = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    if iso_re.is_match(input) {
        if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            return Ok(at_midnight(date));
        }
    }

    Err(DueDateError::Unrecognized(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 27).unwrap()
    }

    #[test]
    fn test_parse_iso_date() {
        let due = parse_due_date("2024-03-10", today()).unwrap();
        assert_eq!(due.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(due.timestamp() % 86_400, 0);
    }

    #[test]
    fn test_parse_relative() {
        let due = parse_due_date("+3d", today()).unwrap();
        assert_eq!(due.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let due = parse_due_date("+2", today()).unwrap();
        assert_eq!(due.date_naive(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_due_date(" Today ", today()).unwrap().date_naive(), today());
        assert_eq!(
            parse_due_date("tomorrow", today()).unwrap().date_naive(),
            NaiveDate::from_ymd_opt(2024, 2, 28).unwrap()
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_due_date("   ", today()), Err(DueDateError::Empty));
        assert!(matches!(
            parse_due_date("2024-13-01", today()),
            Err(DueDateError::Unrecognized(_))
        ));
        assert!(matches!(
            parse_due_date("next week", today()),
            Err(DueDateError::Unrecognized(_))
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(DueDateError::Empty.to_string(), "Due date cannot be empty.");
        let err = parse_due_date("soon", today()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unrecognized date 'soon' (use YYYY-MM-DD, today, tomorrow or +Nd)"
        );
    }
}
