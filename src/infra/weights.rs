// ============================================================
// Layer 6 — Weight Export
// ============================================================
// Writes the trained parameters as flat binary files for an
// external inference engine. The layout is bit-exact:
//
//   embeddings.bin        "<vocab_size> <embedding_dim>\n", then per
//                         token in id order: UTF-8 bytes, b' ',
//                         embedding_dim little-endian f32
//   conv_matrix.bin       [num_filters, kernel_size * embedding_dim]
//   conv_bias.bin         [num_filters]
//   attention_domains.bin [num_domains, num_filters]
//   bn_alpha/beta/mean/var.bin  [num_filters]
//   fc_matrices.bin       [num_domains * num_classes, num_filters]
//   fc_biases.bin         [num_domains * num_classes]
//
// Matrices are written transposed (column-major order of the
// shapes above), vectors as they are. No headers.

use anyhow::{bail, Context, Result};
use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::vocabulary::TokenVocabulary;

pub const EMBEDDINGS_FILE:   &str = "embeddings.bin";
pub const CONV_MATRIX_FILE:  &str = "conv_matrix.bin";
pub const CONV_BIAS_FILE:    &str = "conv_bias.bin";
pub const ATTENTION_FILE:    &str = "attention_domains.bin";
pub const BN_ALPHA_FILE:     &str = "bn_alpha.bin";
pub const BN_BETA_FILE:      &str = "bn_beta.bin";
pub const BN_MEAN_FILE:      &str = "bn_mean.bin";
pub const BN_VAR_FILE:       &str = "bn_var.bin";
pub const FC_MATRICES_FILE:  &str = "fc_matrices.bin";
pub const FC_BIASES_FILE:    &str = "fc_biases.bin";

/// A row-major f32 matrix copied off the device.
#[derive(Debug, Clone, PartialEq)]
pub struct HostMatrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl HostMatrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            bail!("{} values cannot form a {rows}x{cols} matrix", data.len());
        }
        Ok(Self { rows, cols, data })
    }

    pub fn vector(data: Vec<f32>) -> Self {
        Self { rows: data.len(), cols: 1, data }
    }

    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn column_major(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.data.len());
        for c in 0..self.cols {
            for r in 0..self.rows {
                out.push(self.data[r * self.cols + c]);
            }
        }
        out
    }

    fn from_column_major(rows: usize, cols: usize, values: &[f32]) -> Self {
        let mut data = vec![0.0f32; rows * cols];
        for c in 0..cols {
            for r in 0..rows {
                data[r * cols + c] = values[c * rows + r];
            }
        }
        Self { rows, cols, data }
    }
}

/// Every exported parameter group of the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelWeights {
    pub embeddings:        HostMatrix,
    pub conv_matrix:       HostMatrix,
    pub conv_bias:         HostMatrix,
    pub attention_domains: HostMatrix,
    pub bn_alpha:          HostMatrix,
    pub bn_beta:           HostMatrix,
    pub bn_mean:           HostMatrix,
    pub bn_var:            HostMatrix,
    pub fc_matrices:       HostMatrix,
    pub fc_biases:         HostMatrix,
}

impl ModelWeights {
    fn matrices(&self) -> [(&'static str, &HostMatrix); 9] {
        [
            (CONV_MATRIX_FILE, &self.conv_matrix),
            (CONV_BIAS_FILE,   &self.conv_bias),
            (ATTENTION_FILE,   &self.attention_domains),
            (BN_ALPHA_FILE,    &self.bn_alpha),
            (BN_BETA_FILE,     &self.bn_beta),
            (BN_MEAN_FILE,     &self.bn_mean),
            (BN_VAR_FILE,      &self.bn_var),
            (FC_MATRICES_FILE, &self.fc_matrices),
            (FC_BIASES_FILE,   &self.fc_biases),
        ]
    }
}

pub struct WeightExporter {
    dir: PathBuf,
}

impl WeightExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn export(&self, weights: &ModelWeights, vocab: &TokenVocabulary) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        write_embeddings(self.dir.join(EMBEDDINGS_FILE), vocab.tokens(), &weights.embeddings)?;
        for (name, matrix) in weights.matrices() {
            write_matrix(self.dir.join(name), matrix)?;
        }

        tracing::info!("Exported weights to '{}'", self.dir.display());
        Ok(())
    }
}

fn create(path: &Path) -> Result<BufWriter<fs::File>> {
    let file = fs::File::create(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    Ok(BufWriter::new(file))
}

pub fn write_matrix(path: impl AsRef<Path>, matrix: &HostMatrix) -> Result<()> {
    let path = path.as_ref();
    let mut out = create(path)?;
    for v in matrix.column_major() {
        out.write_all(&v.to_le_bytes())?;
    }
    out.flush()
        .with_context(|| format!("Cannot write '{}'", path.display()))
}

pub fn read_matrix(path: impl AsRef<Path>, rows: usize, cols: usize) -> Result<HostMatrix> {
    let path  = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("Cannot read '{}'", path.display()))?;
    if bytes.len() != rows * cols * 4 {
        bail!(
            "'{}' holds {} bytes, expected {} for a {rows}x{cols} matrix",
            path.display(),
            bytes.len(),
            rows * cols * 4
        );
    }
    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(HostMatrix::from_column_major(rows, cols, &values))
}

pub fn write_embeddings(path: impl AsRef<Path>, tokens: &[String], matrix: &HostMatrix) -> Result<()> {
    let path = path.as_ref();
    if tokens.len() != matrix.rows {
        bail!("{} tokens but {} embedding rows", tokens.len(), matrix.rows);
    }

    let mut out = create(path)?;
    writeln!(out, "{} {}", tokens.len(), matrix.cols)?;
    for (i, token) in tokens.iter().enumerate() {
        out.write_all(token.as_bytes())?;
        out.write_all(b" ")?;
        for v in matrix.row(i) {
            out.write_all(&v.to_le_bytes())?;
        }
    }
    out.flush()
        .with_context(|| format!("Cannot write '{}'", path.display()))
}

/// Read an `embeddings.bin` file back as (tokens, matrix).
pub fn read_embeddings(path: impl AsRef<Path>) -> Result<(Vec<String>, HostMatrix)> {
    let path  = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("Cannot read '{}'", path.display()))?;

    let newline = bytes
        .iter()
        .position(|&b| b == b'\n')
        .with_context(|| format!("'{}' has no header line", path.display()))?;
    let header = std::str::from_utf8(&bytes[..newline])?;
    let mut parts = header.split_whitespace();
    let (Some(n), Some(dim), None) = (parts.next(), parts.next(), parts.next()) else {
        bail!("Invalid embeddings header '{header}'");
    };
    let n: usize   = n.parse().with_context(|| format!("Invalid vocab size '{n}'"))?;
    let dim: usize = dim.parse().with_context(|| format!("Invalid dimension '{dim}'"))?;

    let mut pos    = newline + 1;
    let mut tokens = Vec::with_capacity(n);
    let mut data   = Vec::with_capacity(n * dim);
    for i in 0..n {
        let space = bytes[pos..]
            .iter()
            .position(|&b| b == b' ')
            .with_context(|| format!("Truncated word at entry {i}"))?;
        tokens.push(String::from_utf8(bytes[pos..pos + space].to_vec())?);
        pos += space + 1;

        let end = pos + dim * 4;
        if end > bytes.len() {
            bail!("Truncated vector at entry {i}");
        }
        data.extend(
            bytes[pos..end]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
        pos = end;
    }

    Ok((tokens, HostMatrix::new(n, dim, data)?))
}
