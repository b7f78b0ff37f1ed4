//! Model-hub URL rewriting
//!
//! Browsers cannot follow hub redirects to the XET CAS bridge because the
//! bridge sends no CORS headers. Clients rewrite those URLs to go through the
//! model proxy instead.

use reqwest::Url;

/// Host serving XET-backed model blobs
pub const XET_BRIDGE_HOST: &str = "cas-bridge.xethub.hf.co";

/// Model hub host whose `/resolve/` URLs redirect to the bridge
pub const HUB_HOST: &str = "huggingface.co";

/// Rewrite `url` to go through the proxy at `proxy_base`.
///
/// Returns `None` when the URL is not a model download and should be fetched
/// directly.
pub fn proxied_url(url: &str, proxy_base: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let base = proxy_base.trim_end_matches('/');

    if host == XET_BRIDGE_HOST {
        let path = parsed.path().trim_start_matches('/');
        return Some(match parsed.query() {
            Some(query) if !query.is_empty() => format!("{}/api/models/{}?{}", base, path, query),
            _ => format!("{}/api/models/{}", base, path),
        });
    }

    if is_hub_host(host, HUB_HOST) && parsed.path().contains("/resolve/") {
        let mut target = Url::parse(&format!("{}/api/hf-proxy", base)).ok()?;
        target.query_pairs_mut().append_pair("url", url);
        return Some(target.into());
    }

    None
}

/// Whether `host` is `allowed` or one of its subdomains
pub fn is_hub_host(host: &str, allowed: &str) -> bool {
    host == allowed
        || host
            .strip_suffix(allowed)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_xet_bridge() {
        let url = "https://cas-bridge.xethub.hf.co/xet-bridge-us/abc/def?X-Amz-Signature=1&x=2";
        assert_eq!(
            proxied_url(url, "http://127.0.0.1:18791/").as_deref(),
            Some("http://127.0.0.1:18791/api/models/xet-bridge-us/abc/def?X-Amz-Signature=1&x=2")
        );
    }

    #[test]
    fn test_rewrite_xet_bridge_without_query() {
        assert_eq!(
            proxied_url("https://cas-bridge.xethub.hf.co/blob", "http://proxy").as_deref(),
            Some("http://proxy/api/models/blob")
        );
    }

    #[test]
    fn test_rewrite_hub_resolve_url() {
        let url = "https://huggingface.co/org/model/resolve/main/lexicon.tsv";
        let rewritten = proxied_url(url, "http://proxy").unwrap();
        assert_eq!(
            rewritten,
            "http://proxy/api/hf-proxy?url=https%3A%2F%2Fhuggingface.co%2Forg%2Fmodel%2Fresolve%2Fmain%2Flexicon.tsv"
        );

        let decoded = Url::parse(&rewritten).unwrap();
        let (_, target) = decoded.query_pairs().next().unwrap();
        assert_eq!(target, url);
    }

    #[test]
    fn test_other_urls_untouched() {
        assert!(proxied_url("https://huggingface.co/org/model", "http://proxy").is_none());
        assert!(proxied_url("https://example.com/resolve/main/x", "http://proxy").is_none());
        assert!(proxied_url("not a url", "http://proxy").is_none());
    }

    #[test]
    fn test_hub_host_matching() {
        assert!(is_hub_host("huggingface.co", "huggingface.co"));
        assert!(is_hub_host("cdn.huggingface.co", "huggingface.co"));
        assert!(!is_hub_host("evilhuggingface.co", "huggingface.co"));
        assert!(!is_hub_host("huggingface.co.evil.com", "huggingface.co"));
    }
}
