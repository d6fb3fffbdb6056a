/// Lower-cased alphanumerics only, so `property-list`, `Property_List` and
/// `propertylist` compare equal.
fn fold(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let substitution = diagonal + usize::from(ca != cb);
            row[j + 1] = substitution.min(above + 1).min(row[j] + 1);
            diagonal = above;
        }
    }
    row[b.len()]
}

fn distance(input: &str, candidate: &str) -> Option<usize> {
    if input.is_empty() || candidate.is_empty() {
        return None;
    }
    if input == candidate {
        return Some(0);
    }
    if candidate.contains(input) || input.contains(candidate) {
        return Some(1);
    }
    Some(edit_distance(input, candidate))
}

fn tolerance(folded_len: usize) -> usize {
    match folded_len {
        0 => 0,
        1..=4 => 1,
        5..=8 => 2,
        n => (n / 3).max(3),
    }
}

/// Up to `limit` candidates close to `input`, closest first.
pub fn suggest(input: &str, candidates: &[String], limit: usize) -> Vec<String> {
    let folded = fold(input);
    if folded.is_empty() {
        return Vec::new();
    }
    let allowed = tolerance(folded.len());
    let mut scored: Vec<(usize, &String)> = candidates
        .iter()
        .filter_map(|candidate| {
            distance(&folded, &fold(candidate))
                .filter(|d| *d <= allowed)
                .map(|d| (d, candidate))
        })
        .collect();
    scored.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.len().cmp(&b.1.len()))
            .then_with(|| a.1.cmp(b.1))
    });
    let mut out: Vec<String> = Vec::new();
    for (_, candidate) in scored {
        if !out.contains(candidate) {
            out.push(candidate.clone());
        }
        if out.len() >= limit.max(1) {
            break;
        }
    }
    out
}
