use std::collections::BTreeMap;

use http::Uri;
use url::Url;

use crate::error::Error;

/// Joins a base endpoint with a request path and appends query pairs,
/// producing the absolute URI the transport will dial. The path may itself
/// be absolute, in which case the base is ignored.
pub(crate) fn resolve_uri(
    base: &str,
    path: &str,
    query: &BTreeMap<String, String>,
) -> Result<Uri, Error> {
    let mut url = if path.starts_with("http://") || path.starts_with("https://") {
        Url::parse(path).map_err(|_| Error::InvalidUri {
            uri: path.to_owned(),
        })?
    } else {
        let base_url = Url::parse(base).map_err(|_| Error::InvalidUri {
            uri: base.to_owned(),
        })?;
        join_base_path(&base_url, path).ok_or_else(|| Error::InvalidUri {
            uri: format!("{base}{path}"),
        })?
    };

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }

    url.as_str().parse::<Uri>().map_err(|_| Error::InvalidUri {
        uri: url.into(),
    })
}

fn join_base_path(base: &Url, path: &str) -> Option<Url> {
    let trimmed_base = base.as_str().trim_end_matches('/');
    let trimmed_path = path.trim_start_matches('/');
    Url::parse(&format!("{trimmed_base}/{trimmed_path}")).ok()
}

/// Truncates a body preview for log output without splitting a UTF-8
/// character.
pub(crate) fn truncate_body(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
