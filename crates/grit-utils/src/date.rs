use bstr::{BStr, BString, ByteSlice};
use chrono::Local;

use crate::error::UtilError;
use crate::Result;

/// A commit timestamp: seconds since the epoch plus the writer's UTC offset.
///
/// The offset is stored in minutes so the `±HHMM` wire form round-trips
/// bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitDate {
    pub seconds: i64,
    pub offset_minutes: i32,
}

impl GitDate {
    pub fn new(seconds: i64, offset_minutes: i32) -> Self {
        Self {
            seconds,
            offset_minutes,
        }
    }

    /// The current time in the local timezone.
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            seconds: now.timestamp(),
            offset_minutes: now.offset().local_minus_utc() / 60,
        }
    }

    /// Parse `"<epoch> ±HHMM"`.
    pub fn parse(input: &BStr) -> Result<Self> {
        let text = input
            .to_str()
            .map_err(|_| UtilError::SignatureParse("non-UTF8 timestamp".into()))?;
        let mut parts = text.split_whitespace();
        let seconds: i64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| UtilError::SignatureParse(format!("bad timestamp: {text}")))?;
        let offset = parts
            .next()
            .ok_or_else(|| UtilError::SignatureParse(format!("missing timezone: {text}")))?;

        let (sign, digits) = match offset.as_bytes().first() {
            Some(b'+') => (1, &offset[1..]),
            Some(b'-') => (-1, &offset[1..]),
            _ => return Err(UtilError::SignatureParse(format!("bad timezone: {offset}"))),
        };
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(UtilError::SignatureParse(format!("bad timezone: {offset}")));
        }
        let hours: i32 = digits[..2].parse().unwrap();
        let minutes: i32 = digits[2..].parse().unwrap();

        Ok(Self {
            seconds,
            offset_minutes: sign * (hours * 60 + minutes),
        })
    }

    /// Serialize as `"<epoch> ±HHMM"`.
    pub fn to_string(&self) -> String {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let abs = self.offset_minutes.unsigned_abs();
        format!("{} {}{:02}{:02}", self.seconds, sign, abs / 60, abs % 60)
    }

    /// `YYYY-MM-DD` in the commit's own timezone, for short listings.
    pub fn short_date(&self) -> String {
        use chrono::{DateTime, FixedOffset};
        let offset = FixedOffset::east_opt(self.offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        match DateTime::from_timestamp(self.seconds, 0) {
            Some(utc) => utc.with_timezone(&offset).format("%Y-%m-%d").to_string(),
            None => String::from("????-??-??"),
        }
    }
}

/// An author or committer identity with timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub date: GitDate,
}

impl Signature {
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, date: GitDate) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            date,
        }
    }

    /// Parse `"Name <email> epoch ±HHMM"`.
    pub fn parse(input: &BStr) -> Result<Self> {
        let lt = input
            .find_byte(b'<')
            .ok_or_else(|| UtilError::SignatureParse("missing '<'".into()))?;
        let gt = input
            .find_byte(b'>')
            .filter(|&gt| gt > lt)
            .ok_or_else(|| UtilError::SignatureParse("missing '>'".into()))?;

        let name = BString::from(input[..lt].trim());
        let email = BString::from(input[lt + 1..gt].trim());
        let date = GitDate::parse(BStr::new(input[gt + 1..].trim()))?;

        Ok(Self { name, email, date })
    }

    /// Serialize as `"Name <email> epoch ±HHMM"`.
    pub fn to_bytes(&self) -> BString {
        let mut out = BString::from(self.name.clone());
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b"> ");
        out.extend_from_slice(self.date.to_string().as_bytes());
        out
    }
}
