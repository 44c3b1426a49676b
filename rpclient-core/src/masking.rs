//! Credential masking for transport dumps and configuration output.

use http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, COOKIE};

const MASK: &str = "*****";

/// Headers whose values never reach a log line.
fn is_credential(name: &HeaderName) -> bool {
    *name == AUTHORIZATION
        || *name == COOKIE
        || matches!(name.as_str(), "x-api-key" | "x-auth-token")
}

/// Copy of `headers` with credential values replaced by a mask.
///
/// # Examples
///
/// ```
/// use http::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
/// use rpclient_core::masking::mask_headers;
///
/// let mut headers = HeaderMap::new();
/// headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer 0a1b2c3d"));
/// headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
///
/// let masked = mask_headers(&headers);
/// assert_eq!(masked[AUTHORIZATION], "*****");
/// assert_eq!(masked[ACCEPT], "application/json");
/// ```
pub fn mask_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if is_credential(name) {
                HeaderValue::from_static(MASK)
            } else {
                value.clone()
            };
            (name.clone(), value)
        })
        .collect()
}

/// Masks an access token, keeping its first four characters when it is long
/// enough to stay unguessable.
pub fn mask_token(token: &str) -> String {
    if token.chars().count() > 12 {
        let prefix: String = token.chars().take(4).collect();
        format!("{prefix}{MASK}")
    } else {
        MASK.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("authorization", true; "bearer token")]
    #[test_case("Cookie", true; "cookie")]
    #[test_case("X-Api-Key", true; "api key")]
    #[test_case("x-auth-token", true; "auth token")]
    #[test_case("user-agent", false; "user agent")]
    #[test_case("content-type", false; "content type")]
    fn masks_only_credentials(name: &str, masked: bool) {
        let name = HeaderName::from_bytes(name.as_bytes()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(name.clone(), HeaderValue::from_static("value"));

        let expected = if masked { MASK } else { "value" };
        assert_eq!(mask_headers(&headers)[&name], expected);
    }

    #[test]
    fn keeps_repeated_headers() {
        let mut headers = HeaderMap::new();
        headers.append("accept", HeaderValue::from_static("application/json"));
        headers.append("accept", HeaderValue::from_static("text/plain"));

        let masked = mask_headers(&headers);
        let values: Vec<_> = masked.get_all("accept").iter().collect();
        assert_eq!(values, vec!["application/json", "text/plain"]);
    }

    #[test_case("", "*****"; "empty")]
    #[test_case("short", "*****"; "short token")]
    #[test_case("0123456789ab", "*****"; "twelve chars")]
    #[test_case("0123456789abcdef", "0123*****"; "long token")]
    fn test_mask_token(token: &str, expected: &str) {
        assert_eq!(mask_token(token), expected);
    }
}
