//! Query string normalization.
//!
//! The waiting room hands visitors back with a handful of `ch-*` control
//! parameters appended to the target URL. We read them, then rebuild the
//! URL without them so the host can redirect to a clean address once the
//! cookie is set.

use url::Url;

/// Control parameter: waiting-room code.
pub const CH_CODE: &str = "ch-code";
/// Control parameter: visitor token.
pub const CH_ID: &str = "ch-id";
/// Control parameter: token signature.
pub const CH_ID_SIGNATURE: &str = "ch-id-signature";
/// Control parameter: public key echo.
pub const CH_PUBLIC_KEY: &str = "ch-public-key";
/// Control parameter: signature generation time.
pub const CH_REQUESTED: &str = "ch-requested";
/// Control parameter that is only ever discarded.
pub const CH_FRESH: &str = "ch-fresh";

/// Every parameter stripped from the cleaned URL.
pub const CONTROL_PARAMS: [&str; 6] = [
    CH_CODE,
    CH_ID,
    CH_ID_SIGNATURE,
    CH_PUBLIC_KEY,
    CH_REQUESTED,
    CH_FRESH,
];

/// Ordered `key -> value` view of a query string. Values stay raw (still
/// percent-encoded) so the cleaned URL reproduces them byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPairs {
    pairs: Vec<(String, String)>,
}

impl QueryPairs {
    /// Parse `a=1&b=2`. A leading `?` is ignored, empty segments are
    /// skipped, a segment without `=` gets an empty value, and a repeated
    /// key overwrites the earlier value in place.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut pairs: Vec<(String, String)> = Vec::new();

        for segment in query.split('&').filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            match pairs.iter_mut().find(|(k, _)| k == key) {
                Some(existing) => existing.1 = value.to_string(),
                None => pairs.push((key.to_string(), value.to_string())),
            }
        }

        Self { pairs }
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Drop every key in `keys`.
    pub fn remove_all(&mut self, keys: &[&str]) {
        self.pairs.retain(|(k, _)| !keys.contains(&k.as_str()));
    }

    /// Render back to `a=1&b=2`.
    pub fn to_query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Decoded `ch-*` values. Absent parameters are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlParams {
    /// `ch-code`
    pub code: String,
    /// `ch-id`
    pub id: String,
    /// `ch-id-signature`
    pub id_signature: String,
    /// `ch-public-key`
    pub public_key: String,
    /// `ch-requested`
    pub requested: String,
}

impl ControlParams {
    fn from_pairs(pairs: &QueryPairs) -> Self {
        Self {
            code: control_value(pairs, CH_CODE),
            id: control_value(pairs, CH_ID),
            id_signature: control_value(pairs, CH_ID_SIGNATURE),
            public_key: control_value(pairs, CH_PUBLIC_KEY),
            requested: control_value(pairs, CH_REQUESTED),
        }
    }
}

/// Decode a control value; the literal strings `undefined` and `null`
/// (what a JS waiting room emits for missing values) mean absent.
fn control_value(pairs: &QueryPairs, key: &str) -> String {
    let Some(raw) = pairs.get(key) else {
        return String::new();
    };

    let decoded = urlencoding::decode(raw)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| raw.to_string());

    match decoded.as_str() {
        "undefined" | "null" => String::new(),
        _ => decoded,
    }
}

/// Result of normalizing a request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    /// Extracted control parameters.
    pub control: ControlParams,

    /// URL with every control parameter removed.
    pub cleaned_url: String,

    /// Whether stripping removed anything.
    pub had_control_params: bool,
}

/// `scheme://host[:port]/path` without query or fragment.
pub fn base_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

/// `scheme://host[:port]/path[?query]`, dropping any fragment.
pub fn target_url(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", base_url(url), query),
        None => base_url(url),
    }
}

/// Path plus query string, the input room patterns are matched against.
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Extract control parameters and build the cleaned URL.
pub fn normalize(url: &Url) -> NormalizedUrl {
    let mut pairs = QueryPairs::parse(url.query().unwrap_or_default());
    let control = ControlParams::from_pairs(&pairs);

    let before = pairs.len();
    pairs.remove_all(&CONTROL_PARAMS);
    let had_control_params = pairs.len() < before;

    let cleaned_url = if pairs.is_empty() {
        base_url(url)
    } else {
        format!("{}?{}", base_url(url), pairs.to_query_string())
    };

    NormalizedUrl {
        control,
        cleaned_url,
        had_control_params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_pairs_in_order() {
        let pairs = QueryPairs::parse("?b=2&a=1&c=3");
        assert_eq!(pairs.to_query_string(), "b=2&a=1&c=3");
        assert_eq!(pairs.get("a"), Some("1"));
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let pairs = QueryPairs::parse("a=1&b=2&a=3");
        assert_eq!(pairs.get("a"), Some("3"));
        assert_eq!(pairs.to_query_string(), "a=3&b=2");
    }

    #[test]
    fn test_malformed_pairs_tolerated() {
        let pairs = QueryPairs::parse("flag&&x=1=2&=v");
        assert_eq!(pairs.get("flag"), Some(""));
        assert_eq!(pairs.get("x"), Some("1=2"));
        assert_eq!(pairs.get(""), Some("v"));
    }

    #[test]
    fn test_normalize_extracts_and_strips() {
        let url = parse(
            "https://www.example.test/?ch-id=tok0M7SBFAp9J8kK&ch-id-signature=73264cf4&ch-requested=2022-07-27T11%3A16%3A13Z&ch-code=&ch-fresh=true",
        );
        let normalized = normalize(&url);

        assert_eq!(normalized.control.id, "tok0M7SBFAp9J8kK");
        assert_eq!(normalized.control.id_signature, "73264cf4");
        assert_eq!(normalized.control.requested, "2022-07-27T11:16:13Z");
        assert_eq!(normalized.control.code, "");
        assert_eq!(normalized.cleaned_url, "https://www.example.test/");
        assert!(normalized.had_control_params);
    }

    #[test]
    fn test_normalize_preserves_other_params() {
        let url = parse("https://shop.test/list?page=2&ch-id=T&sort=price%20asc");
        let normalized = normalize(&url);
        assert_eq!(
            normalized.cleaned_url,
            "https://shop.test/list?page=2&sort=price%20asc"
        );
        assert!(normalized.had_control_params);
    }

    #[test]
    fn test_normalize_without_control_params() {
        let url = parse("https://shop.test/list?page=2");
        let normalized = normalize(&url);
        assert_eq!(normalized.cleaned_url, "https://shop.test/list?page=2");
        assert!(!normalized.had_control_params);
        assert_eq!(normalized.control, ControlParams::default());
    }

    #[test]
    fn test_sentinel_values_are_absent() {
        let url = parse("https://shop.test/?ch-id=undefined&ch-code=null&ch-public-key=pk");
        let normalized = normalize(&url);
        assert_eq!(normalized.control.id, "");
        assert_eq!(normalized.control.code, "");
        assert_eq!(normalized.control.public_key, "pk");
        assert!(normalized.had_control_params);
    }

    #[test]
    fn test_fresh_only_still_triggers_clean_redirect() {
        let url = parse("https://shop.test/a?ch-fresh=true");
        let normalized = normalize(&url);
        assert!(normalized.had_control_params);
        assert_eq!(normalized.cleaned_url, "https://shop.test/a");
    }

    #[test]
    fn test_target_and_path_helpers() {
        let url = parse("https://shop.test:8443/a/b?x=1#frag");
        assert_eq!(base_url(&url), "https://shop.test:8443/a/b");
        assert_eq!(target_url(&url), "https://shop.test:8443/a/b?x=1");
        assert_eq!(path_and_query(&url), "/a/b?x=1");
    }
}
