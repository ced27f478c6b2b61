/// Canonical form used for every lexical comparison: lowercase, alphanumerics
/// and whitespace only, trimmed.
pub fn normalize(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .filter(|ch| ch.is_alphanumeric() || ch.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}
