//! Fuzzy duplicate detection for decoy prompts.

/// Normalize text for duplicate comparison (trim whitespace, lowercase)
fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Levenshtein distance over chars
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }

    let mut prev: Vec<usize> = (0..=a.len()).collect();
    let mut curr = vec![0; a.len() + 1];

    for (j, cb) in b.iter().enumerate() {
        curr[0] = j + 1;
        for (i, ca) in a.iter().enumerate() {
            let substitution = prev[i] + usize::from(ca != cb);
            curr[i + 1] = substitution.min(prev[i + 1] + 1).min(curr[i] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[a.len()]
}

/// Whether `candidate` is too close to an `existing` prompt.
///
/// Exact matches ignore case and surrounding whitespace. Otherwise the edit
/// distance must be strictly below half the candidate's length.
pub fn is_near_duplicate(existing: &str, candidate: &str) -> bool {
    let existing = normalize(existing);
    let candidate = normalize(candidate);
    if existing == candidate {
        return true;
    }
    edit_distance(&existing, &candidate) * 2 < candidate.chars().count()
}
