//! URL extraction from deployment command output.

use std::sync::OnceLock;

use regex::Regex;

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"https?://[A-Za-z0-9][A-Za-z0-9.\-]*(?::\d+)?(?:/[^\s"'<>]*)?"#)
            .expect("static URL pattern is valid")
    })
}

/// Return the first well-formed http(s) URL in `text`, with trailing dots
/// trimmed.
///
/// ```
/// use nowci_core::urls::extract_first_url;
///
/// let out = "Deployed to https://example-app.now.sh. Aliasing...";
/// assert_eq!(
///     extract_first_url(out).as_deref(),
///     Some("https://example-app.now.sh")
/// );
/// ```
pub fn extract_first_url(text: &str) -> Option<String> {
    url_pattern()
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches('.'))
        .find(|url| has_host(url))
        .map(str::to_string)
}

/// Remove the scheme and trailing slashes, for host comparison.
pub fn strip_protocol(url: &str) -> &str {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    without_scheme.trim_end_matches('/')
}

fn has_host(url: &str) -> bool {
    let host = strip_protocol(url).split(['/', ':']).next().unwrap_or("");
    !host.is_empty() && !host.starts_with('.') && !host.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_period() {
        let out = "Deployed to https://example-app.now.sh. Aliasing...";
        assert_eq!(
            extract_first_url(out).as_deref(),
            Some("https://example-app.now.sh")
        );
    }

    #[test]
    fn returns_first_of_several() {
        let out = "> Ready! https://app-abc123.now.sh [2s]\n> Aliased https://app.example.com";
        assert_eq!(
            extract_first_url(out).as_deref(),
            Some("https://app-abc123.now.sh")
        );
    }

    #[test]
    fn keeps_path_and_port() {
        let out = "see http://localhost:3000/deployments/42 for details";
        assert_eq!(
            extract_first_url(out).as_deref(),
            Some("http://localhost:3000/deployments/42")
        );
    }

    #[test]
    fn none_without_url() {
        assert!(extract_first_url("nothing to see here").is_none());
        assert!(extract_first_url("").is_none());
        assert!(extract_first_url("https:// broken").is_none());
    }

    #[test]
    fn strip_protocol_removes_scheme_and_slash() {
        assert_eq!(strip_protocol("https://app.now.sh/"), "app.now.sh");
        assert_eq!(strip_protocol("http://app.now.sh"), "app.now.sh");
        assert_eq!(strip_protocol("app.now.sh"), "app.now.sh");
    }
}
