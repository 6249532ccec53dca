// ============================================================
// Layer 2 — VocabUseCase
// ============================================================
// Builds the vocabulary files that `train` reads:
//
//   Step 1: Read token and label files of all three splits
//   Step 2: Collect sorted token set and sorted domain set
//   Step 3: Write token_to_idx, domain_to_idx, label_to_idx
//   Step 4: Merge the per-split terminal maps into hash_to_terminal,
//           later splits overriding earlier ones on equal hashes
//
// Identical inputs give byte-identical outputs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{ser::PrettyFormatter, Serializer, Value};
use std::{
    collections::BTreeMap,
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use crate::data::loader::TextFileLoader;
use crate::domain::vocabulary::VocabularyBuilder;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabConfig {
    pub train_x:        String,
    pub valid_x:        String,
    pub test_x:         String,
    pub train_y:        String,
    pub valid_y:        String,
    pub test_y:         String,
    pub domain_classes: Vec<String>,
    pub token_to_idx:   String,
    pub label_to_idx:   String,
    pub domain_to_idx:  String,
    /// JSON objects mapping terminal hashes to terminals, one per split
    #[serde(default)]
    pub train_vocab:      Option<String>,
    #[serde(default)]
    pub valid_vocab:      Option<String>,
    #[serde(default)]
    pub test_vocab:       Option<String>,
    /// Output of the merged terminal map; skipped when absent
    #[serde(default)]
    pub hash_to_terminal: Option<String>,
}

impl VocabConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config '{}'", path.display()))
    }
}

pub struct VocabUseCase {
    config: VocabConfig,
}

impl VocabUseCase {
    pub fn new(config: VocabConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg     = &self.config;
        let loader  = TextFileLoader::new();
        let mut builder = VocabularyBuilder::new(&cfg.domain_classes)?;

        for path in [&cfg.train_x, &cfg.valid_x, &cfg.test_x] {
            for line in loader.read_lines(path)? {
                builder.add_token_line(&line);
            }
        }
        for path in [&cfg.train_y, &cfg.valid_y, &cfg.test_y] {
            for line in loader.read_lines(path)? {
                builder.add_label_line(&line);
            }
        }

        let tokens  = builder.token_lines();
        let domains = builder.domain_lines();
        let labels  = builder.label_lines();
        write_lines(&cfg.token_to_idx,  &tokens)?;
        write_lines(&cfg.domain_to_idx, &domains)?;
        write_lines(&cfg.label_to_idx,  &labels)?;

        tracing::info!(
            "Wrote {} tokens, {} domains, {} labels",
            tokens.len(),
            domains.len(),
            labels.len()
        );

        if let Some(out) = &cfg.hash_to_terminal {
            let splits = [&cfg.train_vocab, &cfg.valid_vocab, &cfg.test_vocab];
            let merged = merge_terminal_maps(splits.into_iter().flatten())?;
            write_json(out, &merged)?;
            tracing::info!("Wrote {} terminal hashes", merged.len());
        }
        Ok(())
    }
}

fn merge_terminal_maps<'a>(
    paths: impl IntoIterator<Item = &'a String>,
) -> Result<BTreeMap<String, Value>> {
    let mut merged = BTreeMap::new();
    for path in paths {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read terminal map '{path}'"))?;
        let map: BTreeMap<String, Value> = serde_json::from_str(&json)
            .with_context(|| format!("'{path}' is not a JSON object"))?;
        merged.extend(map);
    }
    Ok(merged)
}

/// Pretty-printed with four-space indentation and sorted keys.
fn write_json(path: impl AsRef<Path>, map: &BTreeMap<String, Value>) -> Result<()> {
    let path = path.as_ref();
    let file = fs::File::create(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    let mut out = BufWriter::new(file);
    let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    map.serialize(&mut ser)?;
    out.flush()
        .with_context(|| format!("Cannot write '{}'", path.display()))
}

fn write_lines(path: impl AsRef<Path>, lines: &[String]) -> Result<()> {
    let path = path.as_ref();
    let file = fs::File::create(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    let mut out = BufWriter::new(file);
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()
        .with_context(|| format!("Cannot write '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::TextFileLoader;
    use crate::domain::label::LabelCodec;

    fn setup(dir: &Path) -> VocabConfig {
        let path = |name: &str| dir.join(name).to_string_lossy().into_owned();
        fs::write(dir.join("train.x"), "b a\nc a\n").unwrap();
        fs::write(dir.join("valid.x"), "d\n").unwrap();
        fs::write(dir.join("test.x"),  "a e\n").unwrap();
        fs::write(dir.join("train.y"), "python_good\njava_bad\n").unwrap();
        fs::write(dir.join("valid.y"), "java_good\n").unwrap();
        fs::write(dir.join("test.y"),  "cpp_bad\n").unwrap();
        VocabConfig {
            train_x: path("train.x"), valid_x: path("valid.x"), test_x: path("test.x"),
            train_y: path("train.y"), valid_y: path("valid.y"), test_y: path("test.y"),
            domain_classes: vec!["good".into(), "bad".into()],
            token_to_idx:  path("tokens.txt"),
            label_to_idx:  path("labels.txt"),
            domain_to_idx: path("domains.txt"),
            train_vocab: None, valid_vocab: None, test_vocab: None,
            hash_to_terminal: None,
        }
    }

    #[test]
    fn test_writes_sorted_vocabularies() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = setup(dir.path());
        VocabUseCase::new(cfg.clone()).execute().unwrap();

        let read = |p: &str| fs::read_to_string(p).unwrap();
        assert_eq!(read(&cfg.token_to_idx), "a\nb\nc\nd\ne\n");
        assert_eq!(read(&cfg.domain_to_idx), "cpp\njava\npython\n");
        assert_eq!(
            read(&cfg.label_to_idx),
            "cpp_bad\ncpp_good\njava_bad\njava_good\npython_bad\npython_good\n"
        );
    }

    #[test]
    fn test_label_ids_split_into_domain_lines() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = setup(dir.path());
        VocabUseCase::new(cfg.clone()).execute().unwrap();

        let loader  = TextFileLoader::new();
        let labels  = loader.label_vocabulary(&cfg.label_to_idx).unwrap();
        let domains = loader.read_lines(&cfg.domain_to_idx).unwrap();
        let codec   = LabelCodec::new(labels.len(), cfg.domain_classes.len()).unwrap();

        for (id, label) in labels.labels().iter().enumerate() {
            let (domain, _) = codec.split(id).unwrap();
            assert!(label.starts_with(&format!("{}_", domains[domain])));
        }
    }

    #[test]
    fn test_reruns_are_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = setup(dir.path());
        VocabUseCase::new(cfg.clone()).execute().unwrap();
        let first = fs::read(&cfg.label_to_idx).unwrap();
        VocabUseCase::new(cfg.clone()).execute().unwrap();
        assert_eq!(fs::read(&cfg.label_to_idx).unwrap(), first);
    }

    #[test]
    fn test_merges_terminal_maps_later_split_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = setup(dir.path());
        let write = |name: &str, body: &str| {
            let p = dir.path().join(name);
            fs::write(&p, body).unwrap();
            Some(p.to_string_lossy().into_owned())
        };
        cfg.train_vocab = write("train.json", r#"{"h2": "x", "h1": "y"}"#);
        cfg.test_vocab  = write("test.json",  r#"{"h1": "z", "h3": "w"}"#);
        cfg.hash_to_terminal = Some(dir.path().join("terminals.json").to_string_lossy().into_owned());
        VocabUseCase::new(cfg.clone()).execute().unwrap();

        let written = fs::read_to_string(cfg.hash_to_terminal.as_ref().unwrap()).unwrap();
        let merged: BTreeMap<String, String> = serde_json::from_str(&written).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["h1"], "z");
        assert_eq!(merged["h2"], "x");
        assert!(written.starts_with("{\n    \"h1\""));
    }

    #[test]
    fn test_rejects_terminal_map_that_is_not_an_object() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = setup(dir.path());
        let bad = dir.path().join("train.json");
        fs::write(&bad, "[1, 2]").unwrap();
        cfg.train_vocab = Some(bad.to_string_lossy().into_owned());
        cfg.hash_to_terminal = Some(dir.path().join("terminals.json").to_string_lossy().into_owned());
        assert!(VocabUseCase::new(cfg).execute().is_err());
    }

    #[test]
    fn test_rejects_empty_domain_classes() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = setup(dir.path());
        cfg.domain_classes.clear();
        assert!(VocabUseCase::new(cfg).execute().is_err());
    }
}
