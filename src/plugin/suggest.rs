//! "Did you mean" suggestions for unknown plugin and command names

const SUGGESTION_THRESHOLD: f64 = 0.7;

/// Closest candidate to `target` by Jaro-Winkler similarity, if any is
/// close enough. Ties keep the first candidate seen.
pub(crate) fn closest<'a>(
    target: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = strsim::jaro_winkler(target, candidate);
        if score < SUGGESTION_THRESHOLD {
            continue;
        }
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(name, _)| name.to_string())
}
