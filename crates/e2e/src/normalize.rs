//! Text canonicalization for output comparison

/// Replace every CRLF with LF, including a run of CRs before the LF
/// (`"\r\r\n"` becomes `"\n"`), so the result holds no CRLF. Lone CRs are
/// left alone.
pub fn unify_line_endings(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut crs = 0usize;
    for ch in raw.chars() {
        match ch {
            '\r' => crs += 1,
            '\n' => {
                crs = 0;
                out.push('\n');
            }
            other => {
                out.extend(std::iter::repeat('\r').take(crs));
                crs = 0;
                out.push(other);
            }
        }
    }
    out.extend(std::iter::repeat('\r').take(crs));
    out
}

/// Canonical form used for every actual/expected comparison: CRLF unified
/// to LF, then leading and trailing whitespace trimmed. Absent text is `""`.
pub fn normalize(raw: Option<&str>) -> String {
    match raw {
        Some(s) => unify_line_endings(s).trim().to_string(),
        None => String::new(),
    }
}

pub fn normalize_str(raw: &str) -> String {
    normalize(Some(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("" ; "empty")]
    #[test_case("   " ; "spaces only")]
    #[test_case("\r\n\t \r\n" ; "crlf and tabs")]
    #[test_case("මම කතන්දර පොත බලනව." ; "sinhala sentence")]
    #[test_case("  හෙට අපිට නිවාඩු. \r\nඋදේම හම්බෙමු.  " ; "multi line")]
    #[test_case("a\r\r\nb" ; "stray carriage return")]
    #[test_case("a\r\r\r\nb" ; "carriage return run")]
    #[test_case("\r\r\n x \r" ; "carriage returns at the edges")]
    #[test_case("\r\n\r\n" ; "only line breaks")]
    fn test_normalize_is_idempotent(s: &str) {
        let once = normalize_str(s);
        assert_eq!(normalize_str(&once), once);
    }

    #[test]
    fn test_none_is_empty() {
        assert_eq!(normalize(None), "");
    }

    #[test]
    fn test_crlf_unified_before_trim() {
        assert_eq!(
            normalize_str("\r\nhello. \r\nworld\r\n"),
            "hello. \nworld"
        );
    }

    #[test]
    fn test_inner_spacing_preserved() {
        assert_eq!(
            normalize_str("  මම   ගොඩක්      උසයි.  "),
            "මම   ගොඩක්      උසයි."
        );
    }

    #[test]
    fn test_trailing_period_kept() {
        assert_eq!(
            normalize_str("මම කතන්දර පොත බලනව.\n"),
            "මම කතන්දර පොත බලනව."
        );
    }

    #[test]
    fn test_zero_width_joiner_is_not_whitespace() {
        let s = "ශ්\u{200d}රි";
        assert_eq!(normalize_str(s), s);
    }

    #[test]
    fn test_unify_does_not_trim() {
        assert_eq!(unify_line_endings(" a\r\nb "), " a\nb ");
    }

    #[test]
    fn test_carriage_return_runs_collapse() {
        assert_eq!(unify_line_endings("a\r\r\nb"), "a\nb");
        assert_eq!(unify_line_endings("a\r\r\r\nb"), "a\nb");
        assert_eq!(normalize_str("a\r\r\r\nb"), "a\nb");
    }

    #[test]
    fn test_lone_carriage_return_kept() {
        assert_eq!(unify_line_endings("a\rb\r"), "a\rb\r");
    }
}
