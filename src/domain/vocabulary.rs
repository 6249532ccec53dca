// ============================================================
// Layer 3 — Vocabularies
// ============================================================
// Two immutable mappings built once at startup:
//
//   TokenVocabulary  token string → id
//                    0 = @@PAD@@, 1 = @@UNK@@, file lines from 2
//   LabelVocabulary  label string → id, file lines from 0
//
// Line order is significant: it defines the ids, and for labels
// it defines the label → domain arithmetic of LabelCodec.
//
// VocabularyBuilder produces the files these two read, from the
// raw token and label files of every split.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

pub const PAD_TOKEN: &str = "@@PAD@@";
pub const UNK_TOKEN: &str = "@@UNK@@";
pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;

/// What to do with a token that is absent from the vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTokens {
    /// Leave the token out of the numericalised sequence.
    #[default]
    Drop,
    /// Map the token to `@@UNK@@`.
    Unk,
    /// Refuse the example.
    Error,
}

#[derive(Debug, Clone)]
pub struct TokenVocabulary {
    ids:    HashMap<String, u32>,
    tokens: Vec<String>,
}

impl TokenVocabulary {
    /// Build from the lines of a token index file.
    /// Empty lines and repeated tokens do not consume an id.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self { ids: HashMap::new(), tokens: Vec::new() };
        vocab.insert(PAD_TOKEN.to_string());
        vocab.insert(UNK_TOKEN.to_string());
        for line in lines {
            let token = line.into();
            if !token.is_empty() {
                vocab.insert(token);
            }
        }
        vocab
    }

    fn insert(&mut self, token: String) {
        if self.ids.contains_key(&token) {
            return;
        }
        self.ids.insert(token.clone(), self.tokens.len() as u32);
        self.tokens.push(token);
    }

    pub fn len(&self) -> usize { self.tokens.len() }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.ids.get(token).copied()
    }

    /// Tokens in id order.
    pub fn tokens(&self) -> &[String] { &self.tokens }

    /// Numericalise one whitespace-delimited line.
    ///
    /// Returns the ids and the number of tokens that were absent
    /// from the vocabulary.
    pub fn encode(
        &self,
        line:    &str,
        line_no: usize,
        policy:  UnknownTokens,
    ) -> Result<(Vec<u32>, usize), DomainError> {
        let mut ids     = Vec::new();
        let mut missing = 0usize;
        for token in line.split_whitespace() {
            match (self.id(token), policy) {
                (Some(id), _) => ids.push(id),
                (None, UnknownTokens::Drop) => missing += 1,
                (None, UnknownTokens::Unk) => {
                    missing += 1;
                    ids.push(UNK_ID);
                }
                (None, UnknownTokens::Error) => {
                    return Err(DomainError::UnknownToken {
                        token: token.to_string(),
                        line:  line_no,
                    });
                }
            }
        }
        Ok((ids, missing))
    }
}

#[derive(Debug, Clone)]
pub struct LabelVocabulary {
    ids:    HashMap<String, usize>,
    labels: Vec<String>,
}

impl LabelVocabulary {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids    = HashMap::new();
        let mut labels = Vec::new();
        for line in lines {
            let label = line.into();
            if label.is_empty() || ids.contains_key(&label) {
                continue;
            }
            ids.insert(label.clone(), labels.len());
            labels.push(label);
        }
        Self { ids, labels }
    }

    pub fn len(&self) -> usize { self.labels.len() }

    pub fn labels(&self) -> &[String] { &self.labels }

    pub fn id(&self, label: &str) -> Result<usize, DomainError> {
        self.ids
            .get(label)
            .copied()
            .ok_or_else(|| DomainError::UnknownLabel(label.to_string()))
    }
}

/// Collects tokens and label domains from raw split files and
/// renders the three vocabulary files.
#[derive(Debug, Default)]
pub struct VocabularyBuilder {
    classes: Vec<String>,
    tokens:  BTreeSet<String>,
    domains: BTreeSet<String>,
}

impl VocabularyBuilder {
    pub fn new(classes: &[String]) -> Result<Self, DomainError> {
        if classes.is_empty() {
            return Err(DomainError::EmptyDomainClasses);
        }
        let mut classes = classes.to_vec();
        classes.sort();
        classes.dedup();
        Ok(Self { classes, ..Default::default() })
    }

    pub fn add_token_line(&mut self, line: &str) {
        for token in line.split_whitespace() {
            if !self.tokens.contains(token) {
                self.tokens.insert(token.to_string());
            }
        }
    }

    /// The domain of a label is the part before its first `_`.
    pub fn add_label_line(&mut self, line: &str) {
        for label in line.split_whitespace() {
            let domain = label.split('_').next().unwrap_or(label);
            if !domain.is_empty() && !self.domains.contains(domain) {
                self.domains.insert(domain.to_string());
            }
        }
    }

    pub fn token_lines(&self) -> Vec<String> {
        self.tokens.iter().cloned().collect()
    }

    pub fn domain_lines(&self) -> Vec<String> {
        self.domains.iter().cloned().collect()
    }

    /// Domain-major, class-minor, so that `id div num_classes`
    /// is the line of the domain in the domain file.
    pub fn label_lines(&self) -> Vec<String> {
        self.domains
            .iter()
            .flat_map(|d| self.classes.iter().map(move |c| format!("{d}_{c}")))
            .collect()
    }
}
