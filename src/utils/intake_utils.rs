#![forbid(unsafe_code)]

use path_absolutize::Absolutize;
use std::ops::Deref;
use std::path::Path;
use chrono::{Utc, DateTime, SecondsFormat, FixedOffset, ParseError};

use poem::Request;

use log::{debug, LevelFilter};

// ***************************************************************************
//                                Constants
// ***************************************************************************
// Request headers captured into stored records.  All are untrusted client
// data and are stored as opaque strings, never parsed or acted upon.
pub const X_FORWARDED_FOR : &str = "x-forwarded-for";
pub const USER_AGENT      : &str = "user-agent";
pub const REFERER         : &str = "referer";

// ***************************************************************************
// GENERAL PUBLIC FUNCTIONS
// ***************************************************************************
// ---------------------------------------------------------------------------
// get_absolute_path:
// ---------------------------------------------------------------------------
/** Replace tilde (~) and environment variable values in a path name and
 * then construct the absolute path name.  The difference between
 * absolutize and standard canonicalize methods is that absolutize does not
 * care about whether the file exists and what the file really is.
 */
pub fn get_absolute_path(path: &str) -> String {
    // Replace ~ and environment variable values if possible.
    // On error, return the string version of the original path.
    let s = match shellexpand::full(path) {
        Ok(x) => x,
        Err(_) => return path.to_owned(),
    };

    // Convert to absolute path if necessary.
    // Return original input on error.
    let p = Path::new(s.deref());
    let p1 = match p.absolutize() {
        Ok(x) => x,
        Err(_) => return path.to_owned(),
    };
    let p2 = match p1.to_str() {
        Some(x) => x,
        None => return path.to_owned(),
    };

    p2.to_owned()
}

// ---------------------------------------------------------------------------
// timestamp_utc:
// ---------------------------------------------------------------------------
/** Get the current UTC timestamp */
pub fn timestamp_utc() -> DateTime<Utc> {
    Utc::now()
}

// ---------------------------------------------------------------------------
// timestamp_utc_to_str:
// ---------------------------------------------------------------------------
/** Convert a UTC datetime to rfc3339 format with microsecond precision, which
 * looks like this:  2022-09-13T14:14:42.719849Z
 */
pub fn timestamp_utc_to_str(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// timestamp_str_to_datetime:
// ---------------------------------------------------------------------------
/** Convert a timestamp string in rfc3339 format (ex: 2022-09-13T14:14:42.719849912+00:00)
 * to a DateTime object.  The result will contain a parse error if the string
 * does not conform to rfc3339.
 */
pub fn timestamp_str_to_datetime(ts: &str) -> Result<DateTime<FixedOffset>, ParseError> {
    DateTime::parse_from_rfc3339(ts)
}

// ---------------------------------------------------------------------------
// get_header:
// ---------------------------------------------------------------------------
/** Return a copy of the named header's value if the request carries one. */
pub fn get_header(http_req: &Request, name: &str) -> Option<String> {
    http_req.header(name).map(|v| v.to_string())
}

// ---------------------------------------------------------------------------
// client_ip:
// ---------------------------------------------------------------------------
/** Determine the client address to record for a request.  The first entry of
 * the X-Forwarded-For header wins when a proxy supplied one; otherwise the
 * transport-level peer address is used; otherwise there's nothing to record.
 */
pub fn client_ip(http_req: &Request) -> Option<String> {
    if let Some(forwarded) = get_header(http_req, X_FORWARDED_FOR) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    http_req.remote_addr().as_socket_addr().map(|addr| addr.ip().to_string())
}

// ***************************************************************************
//                                  Traits
// ***************************************************************************
pub trait RequestDebug {
    type Req;
    fn get_request_info(&self) -> String;
}

// ---------------------------------------------------------------------------
// debug_request:
// ---------------------------------------------------------------------------
// Dump http request information to the log.
pub fn debug_request(http_req: &Request, req: &impl RequestDebug) {
    // Check that debug or higher logging is in effect.
    let level = log::max_level();
    if level < LevelFilter::Debug {
        return;
    }

    // Accumulate the output.
    let mut s = "\n".to_string();

    // Restate the URI.
    let uri = http_req.uri();
    s += format!("  URI: {:?}\n", uri).as_str();

    // Accumulate the headers
    let it = http_req.headers().iter();
    for v in it {
         s += format!("  Header: {} = {:?} \n", v.0, v.1).as_str();
    };

    // Add the request's information.
    s += req.get_request_info().as_str();

    // Write the single log record.
    debug!("{}", s);
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_roundtrip() {
        let now = timestamp_utc();
        let s = timestamp_utc_to_str(now);
        let parsed = timestamp_str_to_datetime(&s).expect("rfc3339 timestamp");
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn timestamp_format_is_utc_with_micros() {
        let s = timestamp_utc_to_str(timestamp_utc());
        assert!(s.ends_with('Z'));
        // Date, time and fraction separators in their rfc3339 positions.
        assert_eq!(s.as_bytes()[10], b'T');
        assert_eq!(s.as_bytes()[19], b'.');
    }
}
