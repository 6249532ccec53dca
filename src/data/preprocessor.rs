// ============================================================
// Layer 4 — Line Preprocessor
// ============================================================
// Every line read from a token, label or vocabulary file goes
// through the same cleaning before anything else looks at it:
//
//   1. Remove NUL bytes (some extractors emit them)
//   2. Trim surrounding whitespace, including the line ending

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    pub fn clean(&self, line: &str) -> String {
        let without_nul: String = line.chars().filter(|&c| c != '\0').collect();
        without_nul.trim().to_string()
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
