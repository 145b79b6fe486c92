//! Fixed code tables shared with the backend.
//!
//! The business codes and their descriptions are part of the wire contract
//! and must stay byte-identical to what the server emits.

/// Envelope code marking a successful business outcome.
pub const SUCCESS_CODE: &str = "1024-S200";

/// Message used when a request was sent but never answered.
pub const NO_RESPONSE_MESSAGE: &str = "Network error: Request not responded";

/// Business codes and their caller-facing descriptions.
pub const BUSINESS_CODES: [(&str, &str); 18] = [
    ("1024-B01", "Authentication failed: Invalid or expired token"),
    ("1024-B02", "Access denied: IP blocked or unauthorized"),
    ("1024-C01", "Invalid request data: Field validation failed"),
    (
        "1024-C02",
        "The application crashed due to a database connection exception",
    ),
    ("1024-D01", "System busy: Try again later"),
    ("1024-D02", "Quota exceeded: API rate limit reached"),
    ("1024-E01", "Network error: Backend service unavailable"),
    ("1024-E02", "DNS resolution failed: Invalid domain configuration"),
    ("1024-F01", "Decryption error: Invalid ciphertext or key"),
    ("1024-F02", "Invalid signature: Request tampering detected"),
    ("1024-G01", "Request timeout: Backend processing delayed"),
    ("1024-G02", "Service overloaded: Queue capacity full"),
    ("1024-H01", "License expired: Renew service subscription"),
    ("1024-H02", "Deprecated API version: Upgrade client"),
    (
        "1024-I01",
        "Automated traffic blocked: Robot detection triggered",
    ),
    ("1024-I02", "CAPTCHA required: Human verification needed"),
    (
        "1024-J01",
        "Unsupported language: Modify Accept-Language header",
    ),
    ("1024-J02", "Geo blocked: Service unavailable in your region"),
];

/// Business codes that feed the backoff state machine.
pub const RETRYABLE_BUSINESS_CODES: [&str; 4] = ["1024-D01", "1024-D02", "1024-G01", "1024-G02"];

/// Socket-level error codes treated as transient.
pub const NETWORK_ERROR_CODES: [&str; 5] = [
    "ECONNREFUSED",
    "ENOTFOUND",
    "ECONNRESET",
    "ETIMEDOUT",
    "ECONNABORTED",
];

/// HTTP statuses listed as transient. Status errors reaching the
/// coordinator are still terminal; retry is driven by the envelope code.
pub const RETRYABLE_HTTP_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Returns the description for a known business code.
pub fn business_message(code: &str) -> Option<&'static str> {
    BUSINESS_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, message)| *message)
}

/// Whether `code` (business or socket-level) is in the retryable set.
pub fn is_retryable_code(code: &str) -> bool {
    RETRYABLE_BUSINESS_CODES.contains(&code) || NETWORK_ERROR_CODES.contains(&code)
}

/// Whether an HTTP status is in the transient set.
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_HTTP_STATUSES.contains(&status)
}

/// Finds a socket-level error code mentioned in `text`.
pub fn find_network_code(text: &str) -> Option<&'static str> {
    NETWORK_ERROR_CODES
        .iter()
        .copied()
        .find(|code| text.contains(code))
}

/// Maps an HTTP status to its caller-facing message.
pub fn http_status_message(status: u16) -> String {
    let known = match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Interface address does not exist",
        408 => "Request Timeout",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        other => return format!("HTTP Error: {other}"),
    };
    known.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_table_covers_b01_through_j02() {
        assert_eq!(BUSINESS_CODES.first().map(|e| e.0), Some("1024-B01"));
        assert_eq!(BUSINESS_CODES.last().map(|e| e.0), Some("1024-J02"));
        assert_eq!(
            business_message("1024-D01"),
            Some("System busy: Try again later")
        );
        assert_eq!(business_message(SUCCESS_CODE), None);
        assert_eq!(business_message("1024-Z99"), None);
    }

    #[test]
    fn retryable_business_subset() {
        for code in ["1024-D01", "1024-D02", "1024-G01", "1024-G02"] {
            assert!(is_retryable_code(code), "{code} must be retryable");
        }
        for code in ["1024-B01", "1024-C01", "1024-E01", "1024-J02"] {
            assert!(!is_retryable_code(code), "{code} must be terminal");
        }
        assert!(is_retryable_code("ECONNRESET"));
    }

    #[test]
    fn http_status_messages() {
        assert_eq!(http_status_message(400), "Bad Request");
        assert_eq!(http_status_message(404), "Interface address does not exist");
        assert_eq!(http_status_message(418), "HTTP Error: 418");
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn network_code_detection() {
        assert_eq!(
            find_network_code("connect ECONNREFUSED 127.0.0.1:1024"),
            Some("ECONNREFUSED")
        );
        assert_eq!(find_network_code("invalid header value"), None);
    }
}
