use crate::taxonomy::RankedCandidate;

const INSTRUCTIONS: &str = "You are a product categorization assistant.
Choose the most specific, relevant and accurate category **from the list below** for the given internal product category.
Understand the basic product type in the internal category and the entire category path you are mapping to.
Candidates are listed from most to least likely; prefer earlier entries when two fit equally well.
ONLY respond with **one** of the exact category values from the list.
Do not rephrase, invent, or copy the internal category.
No explanations or formatting, just the category string exactly as it appears in the list.
Do not explain. Do not think aloud. Do not add any extra text or punctuation.";

/// Builds the oracle request for one label. Every candidate is listed
/// verbatim on its own line.
pub fn build_prompt(label: &str, candidates: &[RankedCandidate]) -> String {
    let listed = candidates
        .iter()
        .map(|candidate| format!("- {}", candidate.category))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{INSTRUCTIONS}\n\nInternal category: '{label}'\n\nAllowed categories:\n{listed}")
}
