use crate::error::ProviderError;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

const MAX_API_ERROR_CHARS: usize = 200;

/// The run of characters a credential is made of once its start is found.
const TOKEN_BODY: &str = r"[A-Za-z0-9._:+/=-]+";

/// One pass over the text catches both credential shapes we care about:
/// header/query/json markers (case-insensitive) trailed by a token, and bare
/// vendor key prefixes (case-sensitive). The marker or prefix is redacted
/// together with its value. A marker with no trailing token is left alone.
static SECRET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let markers = [
        r#"authorization:\s*bearer\s+"#,
        r#"api_key="#,
        r#"access_token="#,
        r#""api_key":""#,
        r#""access_token":""#,
    ]
    .join("|");
    let prefixes = ["sk-", "ghp_", "AIza"].join("|");

    Regex::new(&format!(
        "(?i:{markers}){TOKEN_BODY}|(?:{prefixes}){TOKEN_BODY}"
    ))
    .expect("valid secret pattern")
});

/// Scrub known secret-like token patterns from vendor error strings.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    SECRET_PATTERN.replace_all(input, "[REDACTED]")
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed.into_owned();
    }

    let truncated: String = scrubbed.chars().take(MAX_API_ERROR_CHARS).collect();
    format!("{truncated}...")
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &'static str, response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    ProviderError::Api {
        provider: provider.to_string(),
        status,
        message: sanitize_api_error(&body),
    }
}
