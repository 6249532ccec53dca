use anyhow::Result;
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::loader::TextFileLoader;
use crate::domain::{
    error::DomainError,
    label::LabelCodec,
    vocabulary::{LabelVocabulary, TokenVocabulary, UnknownTokens},
};

/// One numericalised example: a variable-length token id sequence and its label id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AstSample {
    pub token_ids: Vec<u32>,
    pub label:     usize,
}

/// Everything needed to turn raw lines into samples.
pub struct Numericalizer<'a> {
    pub tokens: &'a TokenVocabulary,
    pub labels: &'a LabelVocabulary,
    pub codec:  LabelCodec,
    pub policy: UnknownTokens,
}

#[derive(Debug, Clone)]
pub struct AstDataset {
    samples: Vec<AstSample>,
}

impl AstDataset {
    pub fn new(samples: Vec<AstSample>) -> Self { Self { samples } }

    /// Pair token lines with label lines. Every label must be in the
    /// vocabulary and inside the codec's range.
    pub fn from_lines(
        token_lines: &[String],
        label_lines: &[String],
        num:         &Numericalizer<'_>,
    ) -> Result<Self> {
        if token_lines.len() != label_lines.len() {
            return Err(DomainError::LineCountMismatch {
                tokens: token_lines.len(),
                labels: label_lines.len(),
            }
            .into());
        }

        let mut samples = Vec::with_capacity(token_lines.len());
        let mut missing = 0usize;
        for (n, (tokens, label)) in token_lines.iter().zip(label_lines).enumerate() {
            let (token_ids, absent) = num.tokens.encode(tokens, n + 1, num.policy)?;
            let label = num.labels.id(label)?;
            num.codec.split(label)?;
            missing += absent;
            samples.push(AstSample { token_ids, label });
        }

        if missing > 0 {
            tracing::warn!(
                "{} tokens were not in the vocabulary (policy: {:?})",
                missing,
                num.policy
            );
        }
        Ok(Self { samples })
    }

    pub fn from_files(
        tokens_path: impl AsRef<Path>,
        labels_path: impl AsRef<Path>,
        num:         &Numericalizer<'_>,
    ) -> Result<Self> {
        let loader = TextFileLoader::new();
        let token_lines = loader.read_lines(tokens_path)?;
        let label_lines = loader.read_lines(labels_path)?;
        Self::from_lines(&token_lines, &label_lines, num)
    }

}

impl Dataset<AstSample> for AstDataset {
    fn get(&self, index: usize) -> Option<AstSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn fixture() -> (TokenVocabulary, LabelVocabulary) {
        (
            TokenVocabulary::from_lines(["a", "b", "c"]),
            LabelVocabulary::from_lines(["d0_x", "d0_y", "d1_x", "d1_y"]),
        )
    }

    #[test]
    fn test_builds_one_sample_per_line() {
        let (tokens, labels) = fixture();
        let num = Numericalizer {
            tokens: &tokens,
            labels: &labels,
            codec:  LabelCodec::new(labels.len(), 2).unwrap(),
            policy: UnknownTokens::Drop,
        };
        let ds = AstDataset::from_lines(
            &lines(&["a b c", "a a", "b c c"]),
            &lines(&["d0_x", "d1_y", "d1_x"]),
            &num,
        )
        .unwrap();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.get(0).unwrap(), AstSample { token_ids: vec![2, 3, 4], label: 0 });
        assert_eq!(ds.get(1).unwrap().label, 3);
        assert_eq!(ds.iter().map(|s| s.label).collect::<Vec<_>>(), vec![0, 3, 2]);
    }

    #[test]
    fn test_unknown_tokens_are_dropped_by_default() {
        let (tokens, labels) = fixture();
        let num = Numericalizer {
            tokens: &tokens,
            labels: &labels,
            codec:  LabelCodec::new(labels.len(), 2).unwrap(),
            policy: UnknownTokens::default(),
        };
        let ds = AstDataset::from_lines(&lines(&["a zz b"]), &lines(&["d0_x"]), &num).unwrap();
        assert_eq!(ds.get(0).unwrap().token_ids, vec![2, 3]);
    }

    #[test]
    fn test_rejects_line_count_mismatch() {
        let (tokens, labels) = fixture();
        let num = Numericalizer {
            tokens: &tokens,
            labels: &labels,
            codec:  LabelCodec::new(labels.len(), 2).unwrap(),
            policy: UnknownTokens::Drop,
        };
        let err = AstDataset::from_lines(&lines(&["a", "b"]), &lines(&["d0_x"]), &num).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DomainError>(),
            Some(DomainError::LineCountMismatch { tokens: 2, labels: 1 })
        ));
    }

    #[test]
    fn test_rejects_unknown_label() {
        let (tokens, labels) = fixture();
        let num = Numericalizer {
            tokens: &tokens,
            labels: &labels,
            codec:  LabelCodec::new(labels.len(), 2).unwrap(),
            policy: UnknownTokens::Drop,
        };
        assert!(AstDataset::from_lines(&lines(&["a"]), &lines(&["d9_x"]), &num).is_err());
    }
}
