/// Extract `http://` and `https://` URLs from message text.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = text;
    while let Some(start) = find_scheme(rest) {
        let candidate = &rest[start..];
        let end = candidate
            .find(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '\'' | ')' | ']'))
            .unwrap_or(candidate.len());
        let url = &candidate[..end];
        let scheme_len = if url.starts_with("https://") { 8 } else { 7 };
        if url.len() > scheme_len {
            urls.push(url.to_string());
        }
        rest = &candidate[end.max(scheme_len)..];
    }
    urls
}

fn find_scheme(text: &str) -> Option<usize> {
    match (text.find("http://"), text.find("https://")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_urls() {
        assert_eq!(
            extract_urls("see https://example.org/a?b=c and (http://x.test/y) ok"),
            vec!["https://example.org/a?b=c", "http://x.test/y"]
        );
        assert_eq!(
            extract_urls("<https://a.example/>\"https://b.example\""),
            vec!["https://a.example/", "https://b.example"]
        );
    }

    #[test]
    fn test_ignores_bare_scheme() {
        assert!(extract_urls("just http:// here").is_empty());
        assert!(extract_urls("no links at all").is_empty());
    }
}
