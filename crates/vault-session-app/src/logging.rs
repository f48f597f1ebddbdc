//! Tracing bootstrap and log-text redaction.

use tracing_subscriber::EnvFilter;

/// Env var holding the tracing filter directive.
pub const LOG_ENV_VAR: &str = "VAULT_SESSION_LOG";

const DEFAULT_FILTER: &str = "info";
const REDACTED: &str = "<redacted>";

// `bearer` runs first so an `authorization=Bearer <token>` pair loses both
// the scheme and the token.
const SENSITIVE_KEYS: [&str; 5] = ["bearer", "password", "token", "authorization", "secret"];

/// Installs the global `fmt` subscriber.
///
/// The filter comes from [`LOG_ENV_VAR`], defaulting to `info`. A second call
/// is a no-op.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Redacts values following common secret markers in log-safe output.
///
/// A marker is one of the sensitive keys followed by `=` or `:` and optional
/// spaces, or `bearer` followed by spaces. The value up to the next
/// whitespace or delimiter is replaced; a key used as a plain word is kept.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for key in SENSITIVE_KEYS {
        redacted = redact_key_value(&redacted, key);
    }
    redacted
}

fn redact_key_value(input: &str, key: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `input`.
    let lower = input.to_ascii_lowercase();
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    let mut search = 0;

    while let Some(relative) = lower[search..].find(key) {
        let key_end = search + relative + key.len();
        let Some(value_start) = value_start_after(bytes, key_end, key == "bearer") else {
            search = key_end;
            continue;
        };
        let mut value_end = value_start;
        while value_end < bytes.len() && !is_value_delimiter(bytes[value_end]) {
            value_end += 1;
        }
        if value_end == value_start || &input[value_start..value_end] == REDACTED {
            search = value_end.max(key_end);
            continue;
        }

        out.push_str(&input[cursor..value_start]);
        out.push_str(REDACTED);
        cursor = value_end;
        search = value_end;
    }
    out.push_str(&input[cursor..]);
    out
}

/// Offset of the value after a key ending at `key_end`, if a separator
/// follows. An auth scheme is separated by spaces only; any other key needs
/// `=` or `:` first.
fn value_start_after(bytes: &[u8], key_end: usize, scheme: bool) -> Option<usize> {
    let mut index = key_end;
    if !scheme {
        if !matches!(bytes.get(index), Some(b'=' | b':')) {
            return None;
        }
        index += 1;
    }
    let spaces_from = index;
    while bytes.get(index) == Some(&b' ') {
        index += 1;
    }
    if scheme && index == spaces_from {
        return None;
    }
    Some(index)
}

fn is_value_delimiter(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'&' | b';' | b',' | b'"' | b'\'')
}
