//! DNS hostname glob matching.
//!
//! Hostname patterns may contain at most one `*`, at the start or the end
//! ("*.example.com", "foo.*", or the bare wildcard "*"). Both sides of a
//! comparison can be patterns: a Host's hostname glob is routinely matched
//! against a route group's host constraint, which may itself be a glob, so
//! the question is "could any concrete hostname satisfy both?".

/// Check whether two hostname patterns can match a common hostname.
///
/// Either side may be a literal hostname or a single-`*` glob. Patterns
/// with `*` anywhere but the first or last character never match.
pub fn hostglob_matches(a: &str, b: &str) -> bool {
    if a == "*" || b == "*" {
        return true;
    }
    if a == b {
        return true;
    }

    let a_glob = a.contains('*');
    let b_glob = b.contains('*');

    if !a_glob && !b_glob {
        return false;
    }

    // Interior stars are not valid DNS globs.
    if a_glob && !(a.starts_with('*') || a.ends_with('*')) {
        return false;
    }
    if b_glob && !(b.starts_with('*') || b.ends_with('*')) {
        return false;
    }

    match (a_glob, b_glob) {
        (true, false) => glob_matches_literal(a, b),
        (false, true) => glob_matches_literal(b, a),
        (true, true) => globs_overlap(a, b),
        (false, false) => unreachable!("handled above"),
    }
}

fn glob_matches_literal(glob: &str, value: &str) -> bool {
    if let Some(suffix) = glob.strip_prefix('*') {
        value.ends_with(suffix)
    } else if let Some(prefix) = glob.strip_suffix('*') {
        value.starts_with(prefix)
    } else {
        false
    }
}

fn globs_overlap(a: &str, b: &str) -> bool {
    match (a.strip_prefix('*'), b.strip_prefix('*')) {
        // Both suffix globs: one suffix must contain the other.
        (Some(sa), Some(sb)) => sa.ends_with(sb) || sb.ends_with(sa),
        (Some(_), None) | (None, Some(_)) => {
            // One suffix glob, one prefix glob: "<prefix><suffix>" always
            // satisfies both.
            true
        }
        (None, None) => {
            // Both prefix globs: one prefix must contain the other.
            let pa = a.strip_suffix('*').unwrap_or(a);
            let pb = b.strip_suffix('*').unwrap_or(b);
            pa.starts_with(pb) || pb.starts_with(pa)
        }
    }
}
