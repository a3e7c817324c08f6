use chrono::{Duration, NaiveDateTime};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Whole days until `end`, rounded up, never negative.
pub fn days_left(end: NaiveDateTime, now: NaiveDateTime) -> i64 {
    let millis = (end - now).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
}

/// Share of the goal raised, as a rounded percentage. Zero for a goal of zero.
pub fn percent_funded(raised: f64, goal: f64) -> i64 {
    if goal <= 0.0 || !goal.is_finite() || !raised.is_finite() {
        return 0;
    }
    ((raised / goal) * 100.0).round() as i64
}

pub fn end_date_after(now: NaiveDateTime, duration_days: i64) -> NaiveDateTime {
    now + Duration::days(duration_days)
}

/// Campaign description as stored: the pitch followed by a metadata footer.
pub fn campaign_description(
    short_description: &str,
    detailed_description: &str,
    creator_name: &str,
    contact_email: &str,
    currency: &str,
    website: Option<&str>,
    social_media: Option<&str>,
) -> String {
    let mut description = format!(
        "{}\n\n{}\n\n---\nCreator: {}\nContact: {}\nCurrency: {}\n",
        short_description.trim(),
        detailed_description.trim(),
        creator_name,
        contact_email,
        currency
    );
    if let Some(website) = website.filter(|w| !w.is_empty()) {
        description.push_str(&format!("Website: {website}\n"));
    }
    if let Some(social) = social_media.filter(|s| !s.is_empty()) {
        description.push_str(&format!("Social Media: {social}\n"));
    }
    description
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_days_left() {
        assert_eq!(days_left(at(10, 12), at(10, 12)), 0);
        assert_eq!(days_left(at(10, 13), at(10, 12)), 1);
        assert_eq!(days_left(at(11, 12), at(10, 12)), 1);
        assert_eq!(days_left(at(12, 0), at(10, 12)), 2);
        assert_eq!(days_left(at(1, 0), at(10, 12)), 0);
    }

    #[test]
    fn test_percent_funded() {
        assert_eq!(percent_funded(28.5, 50.0), 57);
        assert_eq!(percent_funded(15.8, 25.0), 63);
        assert_eq!(percent_funded(75.0, 50.0), 150);
        assert_eq!(percent_funded(10.0, 0.0), 0);
        assert_eq!(percent_funded(10.0, -5.0), 0);
    }

    #[test]
    fn test_end_date_after() {
        assert_eq!(end_date_after(at(1, 9), 30), at(31, 9));
    }

    #[test]
    fn test_campaign_description() {
        let description = campaign_description(
            " Short ",
            "Long",
            "Alice",
            "alice@example.com",
            "ETH",
            Some("https://example.com"),
            None,
        );
        assert!(description.starts_with("Short\n\nLong\n\n---\n"));
        assert!(description.contains("Creator: Alice\n"));
        assert!(description.contains("Website: https://example.com\n"));
        assert!(!description.contains("Social Media"));
    }
}
