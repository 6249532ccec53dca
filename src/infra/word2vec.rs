// ============================================================
// Layer 6 — Pretrained Word Vectors
// ============================================================
// Reads the binary word2vec key-vector format produced by the
// external embedding trainer:
//
//   "<count> <dim>\n"
//   then per entry: word bytes, b' ', dim little-endian f32,
//   optionally followed by b'\n'
//
// and lays the vectors out as an initial embedding table for a
// token vocabulary:
//
//   known tokens   their pretrained vector
//   @@UNK@@        otherwise uniform(-0.25, 0.25), L2-normalised
//   anything else  zeros (this includes @@PAD@@)

use anyhow::{bail, Context, Result};
use rand::Rng;
use std::{collections::HashMap, fs, path::Path};

use crate::domain::vocabulary::{TokenVocabulary, UNK_ID};
use crate::infra::weights::HostMatrix;

pub struct KeyedVectors {
    dim:     usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl KeyedVectors {
    pub fn load_binary(path: impl AsRef<Path>) -> Result<Self> {
        let path  = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Cannot read word vectors '{}'", path.display()))?;
        Self::parse(&bytes).with_context(|| format!("Malformed word vectors '{}'", path.display()))
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let newline = bytes
            .iter()
            .position(|&b| b == b'\n')
            .context("missing header line")?;
        let header = std::str::from_utf8(&bytes[..newline])?;
        let mut parts = header.split_whitespace();
        let (Some(count), Some(dim)) = (parts.next(), parts.next()) else {
            bail!("invalid header '{header}'");
        };
        let count: usize = count.parse()?;
        let dim: usize   = dim.parse()?;

        let mut pos     = newline + 1;
        let mut vectors = HashMap::with_capacity(count);
        for i in 0..count {
            while pos < bytes.len() && bytes[pos] == b'\n' {
                pos += 1;
            }
            let space = bytes[pos..]
                .iter()
                .position(|&b| b == b' ')
                .with_context(|| format!("truncated word at entry {i}"))?;
            let word = String::from_utf8_lossy(&bytes[pos..pos + space]).into_owned();
            pos += space + 1;

            let end = pos + dim * 4;
            if end > bytes.len() {
                bail!("truncated vector for '{word}'");
            }
            let vector = bytes[pos..end]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            vectors.insert(word, vector);
            pos = end;
        }

        Ok(Self { dim, vectors })
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { self.vectors.len() }

    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.vectors.get(word).map(Vec::as_slice)
    }

    /// Initial embedding table for `vocab`, one row per token id.
    pub fn embedding_matrix<R: Rng>(&self, vocab: &TokenVocabulary, rng: &mut R) -> Result<HostMatrix> {
        let dim = self.dim;
        let mut data = vec![0.0f32; vocab.len() * dim];

        let unk: Vec<f32> = (0..dim).map(|_| rng.gen_range(-0.25f32..0.25)).collect();
        let norm = unk.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-12);
        let unk_row = UNK_ID as usize * dim;
        for (slot, v) in data[unk_row..unk_row + dim].iter_mut().zip(&unk) {
            *slot = v / norm;
        }

        let mut matched = 0usize;
        for (id, token) in vocab.tokens().iter().enumerate() {
            if let Some(vector) = self.get(token) {
                data[id * dim..(id + 1) * dim].copy_from_slice(vector);
                matched += 1;
            }
        }

        if matched == 0 {
            tracing::warn!("No vocabulary token has a pretrained vector");
        } else {
            tracing::info!("{}/{} tokens initialised from pretrained vectors", matched, vocab.len());
        }
        HostMatrix::new(vocab.len(), dim, data)
    }
}
