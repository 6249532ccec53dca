// ============================================================
// Layer 4 — Text File Loader
// ============================================================
// Reads newline-delimited UTF-8 files line by line and runs
// every line through the Preprocessor. All input files of the
// pipeline (token sequences, labels, vocabularies) come in
// through here.

use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::data::preprocessor::Preprocessor;
use crate::domain::vocabulary::{LabelVocabulary, TokenVocabulary};

pub struct TextFileLoader {
    preprocessor: Preprocessor,
}

impl TextFileLoader {
    pub fn new() -> Self {
        Self { preprocessor: Preprocessor::new() }
    }

    /// Every line of the file, cleaned. Blank lines are kept so that
    /// line numbers stay aligned between parallel files.
    pub fn read_lines(&self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Cannot open '{}'", path.display()))?;

        let mut lines = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .with_context(|| format!("Cannot read line {} of '{}'", n + 1, path.display()))?;
            lines.push(self.preprocessor.clean(&line));
        }

        tracing::debug!("Read {} lines from '{}'", lines.len(), path.display());
        Ok(lines)
    }

    pub fn token_vocabulary(&self, path: impl AsRef<Path>) -> Result<TokenVocabulary> {
        Ok(TokenVocabulary::from_lines(self.read_lines(path)?))
    }

    pub fn label_vocabulary(&self, path: impl AsRef<Path>) -> Result<LabelVocabulary> {
        Ok(LabelVocabulary::from_lines(self.read_lines(path)?))
    }
}

impl Default for TextFileLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_and_cleans_lines() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "a b\0\n\n  c \r\n").unwrap();

        let lines = TextFileLoader::new().read_lines(f.path()).unwrap();
        assert_eq!(lines, vec!["a b", "", "c"]);
    }

    #[test]
    fn test_token_vocabulary_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "x\ny").unwrap();

        let vocab = TextFileLoader::new().token_vocabulary(f.path()).unwrap();
        assert_eq!(vocab.id("x"), Some(2));
        assert_eq!(vocab.id("y"), Some(3));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = TextFileLoader::new().read_lines("/definitely/not/here.txt").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.txt"));
    }
}
