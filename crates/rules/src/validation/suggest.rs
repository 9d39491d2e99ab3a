//! Typo suggestions for type tags and registered names.
//!
//! Tags are snake_case, so spellings are folded first: case is ignored and
//! `-`, spaces and `.` count as `_`. Distance is optimal string alignment,
//! where swapping two adjacent characters is a single edit.

/// Canonical snake_case spelling of a tag.
pub(crate) fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' | '.' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Closest candidate to `input`, or `None` when nothing is near enough.
/// Ties go to the earlier candidate.
pub(crate) fn closest<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let wanted = normalize_tag(input);
    candidates
        .iter()
        .map(|&candidate| (candidate, normalize_tag(candidate)))
        .map(|(candidate, folded)| (candidate, edit_distance(&wanted, &folded), allowance(&wanted, &folded)))
        .filter(|&(_, distance, allowed)| distance <= allowed)
        .min_by_key(|&(_, distance, _)| distance)
        .map(|(candidate, _, _)| candidate)
}

/// One edit per three characters of the longer spelling, never less than one.
fn allowance(a: &str, b: &str) -> usize {
    (a.chars().count().max(b.chars().count()) / 3).max(1)
}

pub(crate) fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    // table[i][j] is the distance between a[..i] and b[..j].
    let mut table = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in table.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in table[0].iter_mut().enumerate() {
        *cell = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let replace = table[i - 1][j - 1] + usize::from(a[i - 1] != b[j - 1]);
            let mut best = replace.min(table[i - 1][j] + 1).min(table[i][j - 1] + 1);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(table[i - 2][j - 2] + 1);
            }
            table[i][j] = best;
        }
    }
    table[a.len()][b.len()]
}
