//! URL canonicalisation, so the same article reached via two tracking-tagged
//! links lands on one ProcessedUrlMark key (spec.md §4.1).

const TRACKER_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
    "ref",
    "ref_src",
    "CMP",
    "ito",
    "intcid",
    "cmpid",
];

/// Lower-cases scheme and host, strips known tracking query parameters, and
/// drops a trailing fragment. Leaves the path case untouched since some
/// servers are case-sensitive there.
pub fn canonicalize_url(raw: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(raw) else {
        return raw.trim().to_string();
    };

    let lower_scheme = parsed.scheme().to_lowercase();
    let _ = parsed.set_scheme(&lower_scheme);
    if let Some(host) = parsed.host_str() {
        let lower_host = host.to_lowercase();
        let _ = parsed.set_host(Some(&lower_host));
    }
    parsed.set_fragment(None);

    let retained: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !TRACKER_PARAMS.iter().any(|t| t.eq_ignore_ascii_case(k)))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if retained.is_empty() {
        parsed.set_query(None);
    } else {
        let mut pairs = parsed.query_pairs_mut();
        pairs.clear();
        for (k, v) in &retained {
            pairs.append_pair(k, v);
        }
        drop(pairs);
    }

    parsed.to_string()
}
