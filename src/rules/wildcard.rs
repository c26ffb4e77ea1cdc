// Wildcard pattern matching for rule file specs
// Case-insensitive `*` / `?` globbing without a compiled-regex dependency

/// Check whether `candidate` matches `glob`.
///
/// Supports:
/// - `*` - zero or more characters, including path separators
/// - `?` - exactly one character
///
/// Matching ignores case. Every other glob character is literal.
pub fn matches(candidate: &str, glob: &str) -> bool {
    let candidate = fold_case(candidate);
    let glob = fold_case(glob);
    match_from(&candidate, &glob)
}

fn fold_case(s: &str) -> Vec<char> {
    s.chars().flat_map(char::to_lowercase).collect()
}

// Backtracking only ever resumes at the most recent star: on a mismatch the
// star swallows one more candidate character and matching retries from there.
// That keeps the worst case at O(n * m).
fn match_from(candidate: &[char], glob: &[char]) -> bool {
    let mut c = 0;
    let mut g = 0;
    let mut resume: Option<(usize, usize)> = None;

    while c < candidate.len() {
        match glob.get(g) {
            Some('*') => {
                // Try skipping the star first
                resume = Some((g, c));
                g += 1;
            }
            Some(&ch) if ch == '?' || ch == candidate[c] => {
                c += 1;
                g += 1;
            }
            _ => match resume {
                Some((star_g, star_c)) => {
                    // Let the star consume one more character and retry
                    resume = Some((star_g, star_c + 1));
                    g = star_g + 1;
                    c = star_c + 1;
                }
                None => return false,
            },
        }
    }

    glob[g..].iter().all(|&ch| ch == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_everything() {
        for s in ["", "a", "report.pdf", "/docs/sub/file.txt", "???"] {
            assert!(matches(s, "*"), "{s}");
            assert!(matches(s, "**"), "{s}");
        }
    }

    #[test]
    fn test_question_mark() {
        assert!(matches("abc", "a?c"));
        assert!(!matches("ac", "a?c"));
        assert!(!matches("abbc", "a?c"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(matches("REPORT.PDF", "*.pdf"));
        assert!(matches("report.pdf", "*.PDF"));
        assert!(matches("ÄRGER.txt", "ärger.*"));
    }

    #[test]
    fn test_star_crosses_separators() {
        assert!(matches("/docs/sub/a.txt", "/docs/*.txt"));
        assert!(matches("/docs/a.txt", "/docs/*"));
        assert!(!matches("/other/a.txt", "/docs/*"));
    }

    #[test]
    fn test_literal_and_trailing() {
        assert!(matches("file1.bin", "file?.bin"));
        assert!(!matches("file1.bin2", "file?.bin"));
        assert!(matches("a", "a*"));
        assert!(!matches("", "?"));
        assert!(!matches("abc", "abd"));
    }

    #[test]
    fn test_backtracking_with_multiple_stars() {
        assert!(matches("abcabcabd", "*abc*abd"));
        assert!(matches("mississippi", "m*iss*pi"));
        assert!(!matches("mississippi", "m*iss*px"));
        let long = "a".repeat(200);
        assert!(!matches(&long, "*a*a*a*a*b"));
    }
}
