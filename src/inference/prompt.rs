//! Forensic extraction prompt rendering.
//!
//! One prompt per window. The model is primed toward a bare JSON findings
//! array; the parser still tolerates chat filler around it.

/// System instruction sent with every window.
pub const SYSTEM_PROMPT: &str = "You are a forensic analyst. From the supplied \
document text, extract every concrete finding as a JSON array under the key \
\"findings\". Each finding is an object with fields: quote (verbatim source \
text), date (ISO format, best effort), summary, category, crime (or null), \
severity (1-5). Output JSON only, no commentary.";

/// Render the user prompt for one window of one file.
pub fn build_prompt(file_name: &str, window_index: usize, window_text: &str) -> String {
    format!(
        "FILE: {file_name}\nSEGMENT: {window_index}\nDATA:\n{window_text}\n\n\
         Respond with {{\"findings\": [...]}} only."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_file_and_segment() {
        let prompt = build_prompt("ledger_1977.txt", 3, "payment received");
        assert!(prompt.contains("FILE: ledger_1977.txt"));
        assert!(prompt.contains("SEGMENT: 3"));
        assert!(prompt.contains("payment received"));
    }

    #[test]
    fn system_prompt_demands_json_only() {
        assert!(SYSTEM_PROMPT.contains("JSON"));
        assert!(SYSTEM_PROMPT.contains("findings"));
    }
}
