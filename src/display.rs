// Human-readable labels for timestamps and presence

use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};

use crate::models::Presence;

/// Header line under a contact's name in an open conversation
pub fn presence_label(typing: bool, presence: Option<&Presence>, now: DateTime<Utc>) -> String {
    if typing {
        return "typing...".to_string();
    }
    match presence {
        Some(p) if p.is_online() => "online".to_string(),
        Some(p) if p.last_seen > 0 => match p.last_seen_at() {
            Some(seen) => format!("Last seen {}", relative_time(seen, now)),
            None => "offline".to_string(),
        },
        _ => "offline".to_string(),
    }
}

fn rounded_div(value: i64, by: i64) -> i64 {
    (value as f64 / by as f64).round() as i64
}

/// "a few seconds ago", "5 minutes ago", "a day ago" and so on.
/// Timestamps in the future read as just now.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = rounded_div((now - then).num_milliseconds().max(0), 1000);
    let minutes = rounded_div(seconds, 60);
    let hours = rounded_div(minutes, 60);
    let days = rounded_div(hours, 24);
    let months = (days as f64 / 30.436875).round() as i64;
    let years = rounded_div(months, 12);

    let phrase = if seconds < 45 {
        "a few seconds".to_string()
    } else if minutes <= 1 {
        "a minute".to_string()
    } else if minutes < 45 {
        format!("{} minutes", minutes)
    } else if hours <= 1 {
        "an hour".to_string()
    } else if hours < 22 {
        format!("{} hours", hours)
    } else if days <= 1 {
        "a day".to_string()
    } else if days < 26 {
        format!("{} days", days)
    } else if months <= 1 {
        "a month".to_string()
    } else if months < 11 {
        format!("{} months", months)
    } else if years <= 1 {
        "a year".to_string()
    } else {
        format!("{} years", years)
    };
    format!("{} ago", phrase)
}

/// Conversation list timestamp, in the calendar of `now`'s time zone
pub fn format_chat_timestamp<Tz>(timestamp: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let timestamp = timestamp.with_timezone(&now.timezone());
    let days_ago = (now.date_naive() - timestamp.date_naive()).num_days();

    match days_ago {
        0 => timestamp.format("%-I:%M %p").to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => timestamp.format("%a").to_string(),
        _ => timestamp.format("%d/%m/%Y").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PresenceState;
    use chrono::Duration;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_relative_time() {
        let now = at(2024, 3, 15, 12, 0);
        assert_eq!(relative_time(now - Duration::seconds(10), now), "a few seconds ago");
        assert_eq!(relative_time(now - Duration::seconds(70), now), "a minute ago");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(relative_time(now - Duration::minutes(50), now), "an hour ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(relative_time(now - Duration::hours(30), now), "a day ago");
        assert_eq!(relative_time(now - Duration::days(4), now), "4 days ago");
        assert_eq!(relative_time(now - Duration::days(100), now), "3 months ago");
        assert_eq!(relative_time(now - Duration::days(800), now), "2 years ago");
        assert_eq!(relative_time(now + Duration::minutes(5), now), "a few seconds ago");
    }

    #[test]
    fn test_presence_label() {
        let now = at(2024, 3, 15, 12, 0);
        let online = Presence {
            state: PresenceState::Online,
            last_seen: now.timestamp_millis(),
        };
        let offline = Presence {
            state: PresenceState::Offline,
            last_seen: (now - Duration::minutes(5)).timestamp_millis(),
        };

        assert_eq!(presence_label(true, Some(&offline), now), "typing...");
        assert_eq!(presence_label(false, Some(&online), now), "online");
        assert_eq!(presence_label(false, Some(&offline), now), "Last seen 5 minutes ago");
        assert_eq!(presence_label(false, None, now), "offline");
    }

    #[test]
    fn test_format_chat_timestamp() {
        // a Friday
        let now = at(2024, 3, 15, 18, 0);
        assert_eq!(format_chat_timestamp(&at(2024, 3, 15, 9, 5), &now), "9:05 AM");
        assert_eq!(format_chat_timestamp(&at(2024, 3, 14, 23, 0), &now), "Yesterday");
        assert_eq!(format_chat_timestamp(&at(2024, 3, 11, 8, 0), &now), "Mon");
        assert_eq!(format_chat_timestamp(&at(2024, 3, 1, 8, 0), &now), "01/03/2024");
    }
}
