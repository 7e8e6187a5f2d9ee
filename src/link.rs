//! Share link encoding.
//!
//! A share link path has the shape `/{yy}/{mm}/{dd}/{secret}/{object path}`.
//! The date is the expiry day in UTC; a link is valid through midnight at
//! the start of that day.  Expiry is always judged from this embedded date,
//! never from the cache TTL.

use chrono::{DateTime, NaiveDate, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Date segments (`yy/mm/dd`) plus secret plus at least one path segment.
const MIN_SEGMENTS: usize = 5;

/// A parsed share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    /// Midnight UTC of the embedded date.
    pub expires_at: DateTime<Utc>,
    pub secret: String,
    pub object_path: String,
}

/// Why a request path is not a share link.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("expected /yy/mm/dd/secret/path")]
    TooFewSegments,
    #[error("invalid date format: {0}")]
    InvalidDate(String),
    #[error("invalid percent-encoding in link")]
    InvalidEncoding,
}

impl ShareLink {
    /// A link is expired once `now` is strictly after its date, compared at
    /// whole-second granularity.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.expires_at.timestamp()
    }
}

/// Format the `yy/mm/dd` segments for `expires_at`.
pub fn date_segments(expires_at: &DateTime<Utc>) -> String {
    expires_at.format("%y/%m/%d").to_string()
}

/// Build a full share URL.
///
/// The secret and each path segment are percent-escaped; `base_url` is
/// used as-is apart from a trailing slash.
pub fn build_url(base_url: &str, expires_at: &DateTime<Utc>, secret: &str, object_path: &str) -> String {
    let path = object_path
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!(
        "{}/{}/{}/{}",
        base_url.trim_end_matches('/'),
        date_segments(expires_at),
        utf8_percent_encode(secret, SEGMENT),
        path
    )
}

fn decode(segment: &str) -> Result<String, LinkError> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| LinkError::InvalidEncoding)
}

fn two_digits(segment: &str) -> bool {
    segment.len() == 2 && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a request path (as received, still percent-encoded) into a link.
pub fn parse_path(path: &str) -> Result<ShareLink, LinkError> {
    let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
    if parts.len() < MIN_SEGMENTS {
        return Err(LinkError::TooFewSegments);
    }

    let (yy, mm, dd) = (parts[0], parts[1], parts[2]);
    let date_str = format!("{yy}-{mm}-{dd}");
    if !(two_digits(yy) && two_digits(mm) && two_digits(dd)) {
        return Err(LinkError::InvalidDate(date_str));
    }
    let date = NaiveDate::parse_from_str(&date_str, "%y-%m-%d")
        .map_err(|_| LinkError::InvalidDate(date_str.clone()))?;
    let expires_at = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| LinkError::InvalidDate(date_str))?
        .and_utc();

    let secret = decode(parts[3])?;
    let object_path = parts[4..]
        .iter()
        .map(|segment| decode(segment))
        .collect::<Result<Vec<_>, _>>()?
        .join("/");

    Ok(ShareLink {
        expires_at,
        secret,
        object_path,
    })
}
