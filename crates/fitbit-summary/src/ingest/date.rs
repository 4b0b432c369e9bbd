//! Calendar date extraction from export filenames

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([0-9]{4})-?([0-9]{2})-?([0-9]{2})").expect("date pattern is valid")
    })
}

/// Extract the first `YYYYMMDD` or `YYYY-MM-DD` date from a filename
///
/// The form is chosen by the length of the matched text: 8 characters is the
/// compact form, 10 the hyphenated one. A half-separated match such as
/// `2024-0809`, or digits that are not a real date, yield `None`.
pub fn extract_date(filename: &str) -> Option<NaiveDate> {
    let caps = date_pattern().captures(filename)?;
    let matched = caps.get(0)?.as_str();
    if matched.len() != 8 && matched.len() != 10 {
        return None;
    }

    let year = caps[1].parse::<i32>().ok()?;
    let month = caps[2].parse::<u32>().ok()?;
    let day = caps[3].parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_both_encodings_agree() {
        let compact = extract_date("heart_20240809_x.json");
        let hyphenated = extract_date("heart_2024-08-09_x.json");
        assert_eq!(compact, Some(ymd(2024, 8, 9)));
        assert_eq!(compact, hyphenated);
    }

    #[test]
    fn test_first_match_wins() {
        assert_eq!(
            extract_date("steps_2024-08-09_to_2024-08-10.json"),
            Some(ymd(2024, 8, 9))
        );
    }

    #[test]
    fn test_no_date() {
        assert_eq!(extract_date("heart.json"), None);
        assert_eq!(extract_date("heart_2024_08_09.json"), None);
    }

    #[test]
    fn test_invalid_calendar_date() {
        assert_eq!(extract_date("heart_20241399.json"), None);
        assert_eq!(extract_date("heart_2023-02-29.json"), None);
    }

    #[test]
    fn test_half_separated_form_rejected() {
        assert_eq!(extract_date("heart_2024-0809.json"), None);
        assert_eq!(extract_date("heart_202408-09.json"), None);
    }
}
