//! PV name matching: match modes and server-side regex preparation.

use std::sync::LazyLock;

use regex::Regex;

/// How a caller-supplied pattern is interpreted by [`Archive::search`].
///
/// [`Archive::search`]: crate::Archive::search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The pattern is a literal PV name.
    Exact,
    /// `?` matches one character, `*` any run; `\x` escapes.
    Wildcard,
    /// The pattern is passed to the server verbatim.
    Regex,
}

// name wrapped in a postprocessing operator, eg. "caplotbinning_42(some*pattern)"
static OP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9]+_[0-9]+)\(([^)]+)\)").expect("operator pattern")
});

/// Prepare a pattern for `getAllPVs`. The server matches the whole PV name
/// (implicit anchors) while callers expect substring semantics, so `.*` is
/// added where the pattern is not already anchored. Returns the regex and,
/// when the pattern was wrapped in an operator, the operator name to wrap
/// around each result.
pub(crate) fn normalize(pattern: &str, mode: MatchMode) -> (String, Option<String>) {
    let mut op = None;
    let mut pattern = pattern.to_string();
    if let Some(caps) = OP_PATTERN.captures(&pattern) {
        log::debug!("detected operator {:?}", &caps[1]);
        op = Some(caps[1].to_string());
        pattern = caps[2].to_string();
    }

    let mut pattern = match mode {
        MatchMode::Exact => {
            op = None;
            format!("^{}$", regex::escape(&pattern))
        }
        MatchMode::Wildcard => wild_to_regex(&pattern),
        MatchMode::Regex => pattern,
    };

    if !pattern.starts_with('^') && !pattern.starts_with(".*") {
        pattern.insert_str(0, ".*");
    }
    if !pattern.ends_with('$') && !pattern.ends_with(".*") {
        pattern.push_str(".*");
    }
    (pattern, op)
}

/// Translate a wildcard pattern into a regular expression.
pub fn wild_to_regex(pattern: &str) -> String {
    let mut out = String::new();
    let mut literal = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if matches!(c, '?' | '*' | '\\') && !literal.is_empty() {
            out.push_str(&regex::escape(&literal));
            literal.clear();
        }
        match c {
            '?' => out.push('.'),
            '*' => out.push_str(".*"),
            '\\' => match chars.next() {
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push_str(r"\\"),
            },
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        out.push_str(&regex::escape(&literal));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_translate() {
        assert_eq!(wild_to_regex("test?"), "test.");
        assert_eq!(wild_to_regex("a*b"), "a.*b");
        assert_eq!(wild_to_regex(r"lit\*eral"), r"lit\*eral");
        assert_eq!(wild_to_regex("SR{C:1}I"), r"SR\{C:1\}I");
    }

    #[test]
    fn partial_matches_get_anchored() {
        assert_eq!(normalize("test", MatchMode::Regex).0, ".*test.*");
        assert_eq!(normalize("^test$", MatchMode::Regex).0, "^test$");
        assert_eq!(normalize(".*test.*", MatchMode::Regex).0, ".*test.*");
        assert_eq!(normalize("test?", MatchMode::Wildcard).0, ".*test..*");
    }

    #[test]
    fn exact_escapes_and_anchors() {
        let (re, op) = normalize("LN-AM{RadMon:1}DoseRate-I", MatchMode::Exact);
        assert_eq!(re, r"^LN\-AM\{RadMon:1\}DoseRate\-I$");
        assert!(op.is_none());
    }

    #[test]
    fn operators_are_stripped_and_reported() {
        let (re, op) = normalize("caplotbinning_4(RF*)", MatchMode::Wildcard);
        assert_eq!(re, ".*RF.*");
        assert_eq!(op.as_deref(), Some("caplotbinning_4"));

        // exact lookups drop the operator entirely
        let (_, op) = normalize("caplotbinning_4(RF:V)", MatchMode::Exact);
        assert!(op.is_none());
    }
}
