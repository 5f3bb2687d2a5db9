// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Form validation for new scheduled messages.
//!
//! Date and time arrive as separate strings, the way they are typed into a
//! form, and are interpreted in a fixed UTC offset (KST by default).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use unicode_normalization::UnicodeNormalization;

use crate::models::{CreateMessageRequest, NewMessage};

/// Longest message text accepted, in characters. Matches the KakaoTalk
/// text template limit.
pub const MAX_MESSAGE_CHARS: usize = 200;

/// Default offset for interpreting submitted dates (UTC+09:00).
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 9 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("all fields are required: missing {0}")]
    MissingField(&'static str),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("invalid phone number '{0}'")]
    InvalidPhoneNumber(String),

    #[error("message is too long ({length} characters, limit {MAX_MESSAGE_CHARS})")]
    MessageTooLong { length: usize },

    #[error("scheduled time must be in the future")]
    NotInFuture,
}

/// The default offset as a [`FixedOffset`].
pub fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Parse an offset such as `+09:00`, `-05:30` or `Z`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Combine a `YYYY-MM-DD` date and an `HH:MM[:SS]` time in `offset` into a
/// UTC instant.
pub fn parse_schedule(
    date: &str,
    time: &str,
    offset: FixedOffset,
) -> Result<DateTime<Utc>, ScheduleError> {
    let date = date.trim();
    let time = time.trim();

    let naive_date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ScheduleError::InvalidDate(date.to_string()))?;
    let naive_time = NaiveTime::parse_from_str(time, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
        .map_err(|_| ScheduleError::InvalidTime(time.to_string()))?;

    // A fixed offset maps every local time to exactly one instant; the only
    // miss is a date at the edge of chrono's range, where subtracting the
    // offset overflows.
    offset
        .from_local_datetime(&naive_date.and_time(naive_time))
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| ScheduleError::InvalidDate(date.to_string()))
}

/// Validate a form submission against `now`.
///
/// Text fields are trimmed and the message is NFC normalized before its
/// length is checked, so decomposed Hangul counts the same as precomposed.
pub fn validate_request(
    request: &CreateMessageRequest,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<NewMessage, ScheduleError> {
    let recipient = required(&request.recipient, "recipient")?;
    let message: String = required(&request.message, "message")?.nfc().collect();
    let date = required(&request.scheduled_date, "scheduled_date")?;
    let time = required(&request.scheduled_time, "scheduled_time")?;

    let length = message.chars().count();
    if length > MAX_MESSAGE_CHARS {
        return Err(ScheduleError::MessageTooLong { length });
    }

    let phone_number = match request.phone_number.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(validate_phone_number(raw)?),
    };

    let scheduled_time = parse_schedule(date, time, offset)?;
    if scheduled_time <= now {
        return Err(ScheduleError::NotInFuture);
    }

    Ok(NewMessage {
        recipient: recipient.to_string(),
        phone_number,
        message,
        scheduled_time,
    })
}

/// Render a scheduled time as `yyyy년 MM월 dd일 HH:mm` in `offset`.
pub fn format_scheduled_time(time: DateTime<Utc>, offset: FixedOffset) -> String {
    time.with_timezone(&offset)
        .format("%Y년 %m월 %d일 %H:%M")
        .to_string()
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ScheduleError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ScheduleError::MissingField(field))
    } else {
        Ok(trimmed)
    }
}

fn validate_phone_number(raw: &str) -> Result<String, ScheduleError> {
    let valid_chars = raw.chars().all(|c| c.is_ascii_digit() || c == '-');
    let digits = raw.chars().filter(char::is_ascii_digit).count();
    if valid_chars && (9..=11).contains(&digits) && !raw.starts_with('-') && !raw.ends_with('-') {
        Ok(raw.to_string())
    } else {
        Err(ScheduleError::InvalidPhoneNumber(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn kst() -> FixedOffset {
        default_offset()
    }

    fn request(date: &str, time: &str) -> CreateMessageRequest {
        CreateMessageRequest {
            recipient: "홍길동".into(),
            phone_number: Some("010-1234-5678".into()),
            message: "생일 축하해!".into(),
            scheduled_date: date.into(),
            scheduled_time: time.into(),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        // 2026-03-01 09:00 KST
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn parses_date_and_time_in_offset() {
        let at = parse_schedule("2026-03-01", "09:30", kst()).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 3, 1, 0, 30, 0).unwrap());

        let with_seconds = parse_schedule("2026-03-01", "09:30:15", kst()).unwrap();
        assert_eq!(with_seconds.second(), 15);
    }

    #[test]
    fn rejects_malformed_date_and_time() {
        assert_eq!(
            parse_schedule("2026/03/01", "09:30", kst()),
            Err(ScheduleError::InvalidDate("2026/03/01".into()))
        );
        assert_eq!(
            parse_schedule("2026-02-30", "09:30", kst()),
            Err(ScheduleError::InvalidDate("2026-02-30".into()))
        );
        assert_eq!(
            parse_schedule("2026-03-01", "25:00", kst()),
            Err(ScheduleError::InvalidTime("25:00".into()))
        );
    }

    #[test]
    fn date_at_edge_of_range_is_invalid() {
        let earliest = NaiveDate::MIN.format("%Y-%m-%d").to_string();
        assert!(matches!(
            parse_schedule(&earliest, "00:00", kst()),
            Err(ScheduleError::InvalidDate(_))
        ));
    }

    #[test]
    fn offset_parsing() {
        assert_eq!(parse_utc_offset("+09:00"), FixedOffset::east_opt(9 * 3600));
        assert_eq!(parse_utc_offset("-05:30"), FixedOffset::east_opt(-(5 * 3600 + 1800)));
        assert_eq!(parse_utc_offset("Z"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("+3"), FixedOffset::east_opt(3 * 3600));
        assert!(parse_utc_offset("09:00").is_none());
        assert!(parse_utc_offset("+15:00").is_none());
        assert!(parse_utc_offset("").is_none());
    }

    #[test]
    fn validate_accepts_future_schedule() {
        let draft = validate_request(&request("2026-03-01", "09:01"), fixed_now(), kst()).unwrap();
        assert_eq!(draft.recipient, "홍길동");
        assert_eq!(draft.phone_number.as_deref(), Some("010-1234-5678"));
        assert_eq!(draft.scheduled_time, fixed_now() + chrono::Duration::minutes(1));
    }

    #[test]
    fn validate_rejects_now_and_past() {
        assert_eq!(
            validate_request(&request("2026-03-01", "09:00"), fixed_now(), kst()),
            Err(ScheduleError::NotInFuture)
        );
        assert_eq!(
            validate_request(&request("2026-02-28", "23:59"), fixed_now(), kst()),
            Err(ScheduleError::NotInFuture)
        );
    }

    #[test]
    fn validate_requires_all_fields() {
        let mut req = request("2026-03-02", "10:00");
        req.recipient = "   ".into();
        assert_eq!(
            validate_request(&req, fixed_now(), kst()),
            Err(ScheduleError::MissingField("recipient"))
        );

        let mut req = request("2026-03-02", "10:00");
        req.scheduled_time = String::new();
        assert_eq!(
            validate_request(&req, fixed_now(), kst()),
            Err(ScheduleError::MissingField("scheduled_time"))
        );
    }

    #[test]
    fn phone_number_is_optional_but_checked() {
        let mut req = request("2026-03-02", "10:00");
        req.phone_number = Some(" ".into());
        assert!(validate_request(&req, fixed_now(), kst()).unwrap().phone_number.is_none());

        req.phone_number = Some("010-12ab-5678".into());
        assert!(matches!(
            validate_request(&req, fixed_now(), kst()),
            Err(ScheduleError::InvalidPhoneNumber(_))
        ));

        req.phone_number = Some("0101".into());
        assert!(validate_request(&req, fixed_now(), kst()).is_err());
    }

    #[test]
    fn message_length_counts_normalized_characters() {
        let mut req = request("2026-03-02", "10:00");
        // "한" as conjoining jamo, three code points before NFC.
        req.message = "\u{1112}\u{1161}\u{11AB}".repeat(MAX_MESSAGE_CHARS);
        let draft = validate_request(&req, fixed_now(), kst()).unwrap();
        assert_eq!(draft.message.chars().count(), MAX_MESSAGE_CHARS);

        req.message = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(
            validate_request(&req, fixed_now(), kst()),
            Err(ScheduleError::MessageTooLong {
                length: MAX_MESSAGE_CHARS + 1
            })
        );
    }

    #[test]
    fn formats_in_offset() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 15, 5, 0).unwrap();
        assert_eq!(format_scheduled_time(at, kst()), "2026년 03월 02일 00:05");
    }
}
