//! Anchored glob matching for tool allow/deny filters.
//!
//! Supports `*` (any run of characters, including empty) and `?` (any
//! single character). Patterns are matched against the whole tool name,
//! case-sensitively.

/// Match `text` against an anchored glob `pattern`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    match_at(&p, &t)
}

fn match_at(pattern: &[char], text: &[char]) -> bool {
    // Iterative backtracking over the last '*' seen; classic two-pointer
    // wildcard match, O(len(pattern) * len(text)) worst case.
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == text[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            // Let the star absorb one more character and retry
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}
