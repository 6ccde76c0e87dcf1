use crate::storage::BusinessRecord;

/// Street words folded to their postal abbreviation before comparison
const STREET_ABBREVIATIONS: &[(&str, &str)] = &[
    ("street", "st"),
    ("avenue", "ave"),
    ("boulevard", "blvd"),
    ("road", "rd"),
    ("drive", "dr"),
    ("lane", "ln"),
    ("court", "ct"),
    ("place", "pl"),
    ("parkway", "pkwy"),
    ("highway", "hwy"),
    ("square", "sq"),
    ("terrace", "ter"),
    ("suite", "ste"),
    ("north", "n"),
    ("south", "s"),
    ("east", "e"),
    ("west", "w"),
];

/// Builds the near-duplicate fingerprint of a record
///
/// # Normalization Steps
///
/// 1. Lowercase name and street address
/// 2. Replace punctuation with spaces and collapse whitespace
/// 3. Fold common street words to their abbreviation (street -> st, ...)
/// 4. Keep only the five-digit ZIP
///
/// # Returns
///
/// * `Some(String)` - `name|street|zip`
/// * `None` - The record has no name or street address to compare on
pub fn fingerprint(record: &BusinessRecord) -> Option<String> {
    let name = words(&record.name).join(" ");
    let street = record
        .address
        .address1
        .as_deref()
        .map(|street| {
            words(street)
                .into_iter()
                .map(|word| abbreviate(&word))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    if name.is_empty() || street.is_empty() {
        return None;
    }

    let zip: String = record
        .address
        .zip_code
        .as_deref()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(5)
        .collect();

    Some(format!("{}|{}|{}", name, street, zip))
}

/// Lowercased alphanumeric words
fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn abbreviate(word: &str) -> String {
    STREET_ABBREVIATIONS
        .iter()
        .find(|(long, _)| *long == word)
        .map(|(_, short)| short.to_string())
        .unwrap_or_else(|| word.to_string())
}
