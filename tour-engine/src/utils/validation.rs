// Input validation utilities

use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

const MAX_USER_ID_LEN: usize = 128;

static USER_ID_PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// Compiled once per process; user ids are checked on every store read and write.
fn user_id_pattern() -> Result<&'static Regex> {
    USER_ID_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$"))
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Internal error: failed to compile user id regex: {}", e))
}

/// Validate a user identity before it is used as a storage key or file name.
///
/// Only letters, digits, `-` and `_` are accepted; anything else (path separators, dots,
/// whitespace) is rejected rather than escaped.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    let s = user_id.trim();
    if s.is_empty() {
        return Err(anyhow::anyhow!("User id is required"));
    }
    if s != user_id {
        return Err(anyhow::anyhow!("User id must not have surrounding whitespace"));
    }
    if s.len() > MAX_USER_ID_LEN {
        return Err(anyhow::anyhow!(
            "User id must be at most {} characters",
            MAX_USER_ID_LEN
        ));
    }

    if !user_id_pattern()?.is_match(s) {
        return Err(anyhow::anyhow!("User id contains invalid characters"));
    }

    Ok(())
}
