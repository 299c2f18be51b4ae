//! URL parameter helpers shared by the credential sources and the identity
//! endpoint. Only the small subset of URL surgery the session needs: parsing
//! fragment/query parameter lists and stripping consumed parameters.

/// Split a URL into its pre-fragment part and the fragment, if any.
pub(crate) fn split_fragment(url: &str) -> (&str, Option<&str>) {
    match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    }
}

/// The query portion of a URL (between `?` and `#`), if any.
pub(crate) fn query_of(url: &str) -> Option<&str> {
    let (base, _) = split_fragment(url);
    base.split_once('?').map(|(_, query)| query)
}

/// Parse a `key=value&key=value` parameter string, percent-decoding values.
/// Malformed pairs are skipped rather than failing the whole parse.
pub(crate) fn parse_params(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).ok()?;
            let value = urlencoding::decode(value).ok()?;
            Some((key.into_owned(), value.into_owned()))
        })
        .collect()
}

/// Look up a parameter by name.
pub(crate) fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Rebuild a URL with the named query parameters removed. The fragment is
/// dropped as well; callers only use this to produce a safe landing URL after
/// consuming SSO callback markers or a token handoff.
pub(crate) fn strip_query_params(url: &str, names: &[&str]) -> String {
    let (base, _fragment) = split_fragment(url);
    let (path, query) = match base.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (base, None),
    };

    let kept: Vec<String> = query
        .map(parse_params)
        .unwrap_or_default()
        .into_iter()
        .filter(|(key, _)| !names.contains(&key.as_str()))
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(&key),
                urlencoding::encode(&value)
            )
        })
        .collect();

    if kept.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, kept.join("&"))
    }
}
