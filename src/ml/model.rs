use anyhow::{anyhow, ensure, Result};
use burn::{
    module::Param,
    optim::GradientsParams,
    nn::{
        conv::{Conv1d, Conv1dConfig},
        loss::CrossEntropyLossConfig,
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Embedding, EmbeddingConfig,
    },
    prelude::*,
    tensor::{activation, backend::AutodiffBackend, Distribution},
};

use crate::domain::{error::DomainError, label::LabelCodec};
use crate::infra::weights::{HostMatrix, ModelWeights};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct AstCodaConfig {
    pub kernel_size:   usize,
    pub embedding_dim: usize,
    pub num_filters:   usize,
    pub num_labels:    usize,
    pub num_classes:   usize,
    pub vocab_size:    usize,
    #[config(default = 0)]
    pub padding_idx:   usize,
    #[config(default = 0.5)]
    pub dropout:       f64,
    /// Also pad kernel_size - 1 positions after the sequence.
    #[config(default = false)]
    pub trailing_padding: bool,
    /// Upper bound on the L2 norm of every attention row, and of every
    /// embedding row unless the table comes from pretrained vectors.
    #[config(default = 1.0)]
    pub max_norm: f64,
}

impl AstCodaConfig {
    /// Check the sizes and return the label codec they imply.
    pub fn codec(&self) -> Result<LabelCodec, DomainError> {
        for (value, name) in [
            (self.kernel_size,   "kernel_size"),
            (self.embedding_dim, "embedding_dim"),
            (self.num_filters,   "num_filters"),
            (self.vocab_size,    "vocab_size"),
        ] {
            if value == 0 {
                return Err(DomainError::InvalidDimension(name));
            }
        }
        LabelCodec::new(self.num_labels, self.num_classes)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<AstCodaModel<B>> {
        self.init_with(None, device)
    }

    /// Build the model, optionally seeding the embedding table.
    pub fn init_with<B: Backend>(
        &self,
        pretrained: Option<&HostMatrix>,
        device:     &B::Device,
    ) -> Result<AstCodaModel<B>> {
        let codec = self.codec()?;
        ensure!(self.padding_idx < self.vocab_size, "padding_idx {} outside vocabulary", self.padding_idx);
        let (nd, nc, nf) = (codec.num_domains(), codec.num_classes(), self.num_filters);

        ensure!(self.max_norm > 0.0, "max_norm must be positive, got {}", self.max_norm);

        // Tables are built untracked and become leaf parameters in from_tensor.
        let mut embedding = EmbeddingConfig::new(self.vocab_size, self.embedding_dim).init(device);
        let table = match pretrained {
            Some(m) => {
                ensure!(
                    m.rows == self.vocab_size && m.cols == self.embedding_dim,
                    "pretrained embeddings are {}x{}, model expects {}x{}",
                    m.rows, m.cols, self.vocab_size, self.embedding_dim
                );
                Tensor::<B, 1>::from_floats(m.data.as_slice(), device).reshape([m.rows, m.cols])
            }
            None => {
                let p = self.padding_idx;
                let table = embedding.weight.val().detach().slice_assign(
                    [p..p + 1, 0..self.embedding_dim],
                    Tensor::zeros([1, self.embedding_dim], device),
                );
                clip_row_norms(table, self.max_norm)
            }
        };
        embedding.weight = Param::from_tensor(table.detach());

        // One input channel holding the flattened sequence; each window
        // spans kernel_size whole embeddings and moves one token at a time.
        let conv = Conv1dConfig::new(1, nf, self.embedding_dim * self.kernel_size)
            .with_stride(self.embedding_dim)
            .init(device);

        let xavier = (6.0 / (nd + nf) as f64).sqrt();
        let attention_domains = clip_row_norms(
            Tensor::random([nd, nf], Distribution::Uniform(-xavier, xavier), device),
            self.max_norm,
        );

        let head = 1.0 / (nf as f64).sqrt();
        let head_weight = Tensor::random([nd, nc, nf], Distribution::Uniform(-head, head), device);
        let head_bias   = Tensor::random([nd, nc], Distribution::Uniform(-head, head), device);

        Ok(AstCodaModel {
            embedding,
            conv,
            norm:              BatchNormConfig::new(nf).init(device),
            dropout:           DropoutConfig::new(self.dropout).init(),
            attention_domains: Param::from_tensor(attention_domains),
            head_weight:       Param::from_tensor(head_weight),
            head_bias:         Param::from_tensor(head_bias),
            kernel_size:       self.kernel_size,
            padding_idx:       self.padding_idx,
            trailing_pad:      if self.trailing_padding { self.kernel_size - 1 } else { 0 },
            num_domains:       nd,
            num_classes:       nc,
            max_norm:          self.max_norm,
            clip_embedding:    pretrained.is_none(),
        })
    }
}

/// Convolutional classifier with domain-conditioned attention pooling.
///
/// ```text
/// tokens [b, s] ─pad─▶ [b, s'] ─embed─▶ [b, s', E] ─flatten─▶ [b, 1, s'·E]
///   ─conv(k·E, stride E)─▶ features [b, F, p] ─bn─relu─dropout─▶ activations
///   domain ─▶ attention_domains row [b, F]
///   softmax(row · activations) over p ─▶ pooled [b, F]
///   head_weight[domain] · pooled + head_bias[domain] ─▶ logits [b, C]
/// ```
///
/// All per-domain heads live in one `[domains, classes, filters]` tensor
/// and are gathered by domain id, so the batch never branches per example.
#[derive(Module, Debug)]
pub struct AstCodaModel<B: Backend> {
    /// Token table — [vocab_size, embedding_dim]
    pub embedding:         Embedding<B>,
    /// One input channel, kernel k·E, stride E
    pub conv:              Conv1d<B>,
    /// Normalises each filter over batch and positions
    pub norm:              BatchNorm<B, 1>,
    pub dropout:           Dropout,
    /// One attention vector per domain — [num_domains, num_filters]
    pub attention_domains: Param<Tensor<B, 2>>,
    /// [num_domains, num_classes, num_filters]
    pub head_weight:       Param<Tensor<B, 3>>,
    /// [num_domains, num_classes]
    pub head_bias:         Param<Tensor<B, 2>>,
    pub kernel_size:       usize,
    /// Token id used for padding; its embedding gradient is masked
    pub padding_idx:       usize,
    /// Positions padded after the sequence, 0 or kernel_size - 1
    pub trailing_pad:      usize,
    pub num_domains:       usize,
    pub num_classes:       usize,
    pub max_norm:          f64,
    /// False when the embeddings were seeded from pretrained vectors.
    pub clip_embedding:    bool,
}

pub struct AstCodaOutput<B: Backend> {
    /// [batch, num_classes]
    pub logits:      Tensor<B, 2>,
    /// Convolution output before normalisation — [batch, num_filters, positions]
    pub features:    Tensor<B, 3>,
    /// [batch, num_filters, positions]
    pub activations: Tensor<B, 3>,
    /// Attention vector of each example's domain — [batch, num_filters]
    pub domains:     Tensor<B, 2>,
    /// Softmax weights over positions — [batch, positions]
    pub attention:   Tensor<B, 2>,
}

impl<B: Backend> AstCodaModel<B> {
    /// tokens: [batch, seq_len], domains: [batch] → logits [batch, num_classes]
    ///
    /// Batch norm and dropout are in training mode on an autodiff backend
    /// and in inference mode otherwise (see `AutodiffModule::valid`).
    pub fn forward(&self, tokens: Tensor<B, 2, Int>, domains: Tensor<B, 1, Int>) -> AstCodaOutput<B> {
        let [batch, _] = tokens.dims();
        let x = self.pad(tokens);
        let [_, len] = x.dims();

        let embedded = self.embedding.forward(x);
        let [_, _, emb] = embedded.dims();
        let features = self.conv.forward(embedded.reshape([batch, 1, len * emb]));
        let [_, filters, positions] = features.dims();

        let activations = activation::relu(self.norm.forward(features.clone()));
        let activations = self.dropout.forward(activations);

        let domain_vectors = self.attention_domains.val().select(0, domains.clone());

        // [b, 1, F] x [b, F, p] → [b, 1, p]
        let scores = domain_vectors
            .clone()
            .unsqueeze_dim::<3>(1)
            .matmul(activations.clone())
            .reshape([batch, positions]);
        let attention = activation::softmax(scores, 1);

        // [b, F, p] x [b, p, 1] → [b, F]
        let pooled = activations
            .clone()
            .matmul(attention.clone().unsqueeze_dim::<3>(2))
            .reshape([batch, filters]);

        // [b, C, F] x [b, F, 1] → [b, C]
        let weight = self.head_weight.val().select(0, domains.clone());
        let bias   = self.head_bias.val().select(0, domains);
        let logits = weight
            .matmul(pooled.unsqueeze_dim::<3>(2))
            .reshape([batch, self.num_classes])
            + bias;

        AstCodaOutput { logits, features, activations, domains: domain_vectors, attention }
    }

    /// Forward pass plus cross-entropy against the within-domain class.
    pub fn forward_loss(
        &self,
        tokens:  Tensor<B, 2, Int>,
        domains: Tensor<B, 1, Int>,
        classes: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, AstCodaOutput<B>) {
        let output = self.forward(tokens, domains);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.logits.device())
            .forward(output.logits.clone(), classes);
        (loss, output)
    }

    fn pad(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 2, Int> {
        let lead = self.kernel_size - 1;
        if lead == 0 && self.trailing_pad == 0 {
            return tokens;
        }
        let [batch, _] = tokens.dims();
        let device = tokens.device();
        let fill = |n: usize| Tensor::<B, 2, Int>::full([batch, n], self.padding_idx as i32, &device);

        let mut parts = Vec::with_capacity(3);
        if lead > 0 {
            parts.push(fill(lead));
        }
        parts.push(tokens);
        if self.trailing_pad > 0 {
            parts.push(fill(self.trailing_pad));
        }
        Tensor::cat(parts, 1)
    }

    /// Rescale attention rows, and embedding rows when enabled, whose L2
    /// norm exceeds `max_norm`. Parameter ids are kept, so optimizer
    /// state still lines up.
    pub fn clip_norms(mut self) -> Self {
        let max_norm = self.max_norm;
        let clip = |w: Tensor<B, 2>| {
            let tracked = w.is_require_grad();
            let w = clip_row_norms(w.detach(), max_norm);
            if tracked { w.require_grad() } else { w }
        };
        if self.clip_embedding {
            self.embedding.weight = self.embedding.weight.map(&clip);
        }
        self.attention_domains = self.attention_domains.map(&clip);
        self
    }

    /// Copy every exported parameter group to the host.
    pub fn export_weights(&self) -> Result<ModelWeights> {
        let [vocab, emb] = self.embedding.weight.val().dims();
        let [filters, _, window] = self.conv.weight.val().dims();
        let stacked = self.num_domains * self.num_classes;

        let conv_bias = match &self.conv.bias {
            Some(bias) => host(bias.val())?,
            None       => vec![0.0; filters],
        };

        Ok(ModelWeights {
            embeddings:        HostMatrix::new(vocab, emb, host(self.embedding.weight.val())?)?,
            conv_matrix:       HostMatrix::new(filters, window, host(self.conv.weight.val())?)?,
            conv_bias:         HostMatrix::vector(conv_bias),
            attention_domains: HostMatrix::new(self.num_domains, filters, host(self.attention_domains.val())?)?,
            bn_alpha:          HostMatrix::vector(host(self.norm.gamma.val())?),
            bn_beta:           HostMatrix::vector(host(self.norm.beta.val())?),
            bn_mean:           HostMatrix::vector(host(self.norm.running_mean.value())?),
            bn_var:            HostMatrix::vector(host(self.norm.running_var.value())?),
            fc_matrices:       HostMatrix::new(stacked, filters, host(self.head_weight.val())?)?,
            fc_biases:         HostMatrix::vector(host(self.head_bias.val())?),
        })
    }
}

impl<B: AutodiffBackend> AstCodaModel<B> {
    /// Zero the gradient of the padding row of the embedding table.
    pub fn mask_padding_grad(&self, mut grads: GradientsParams) -> GradientsParams {
        let id = self.embedding.weight.id;
        if let Some(grad) = grads.remove::<B::InnerBackend, 2>(id) {
            let [_, emb] = grad.dims();
            let p = self.padding_idx;
            let zeros = Tensor::zeros([1, emb], &grad.device());
            grads.register(id, grad.slice_assign([p..p + 1, 0..emb], zeros));
        }
        grads
    }
}

/// Scale each row down to L2 norm `max_norm` if it is longer.
fn clip_row_norms<B: Backend>(weight: Tensor<B, 2>, max_norm: f64) -> Tensor<B, 2> {
    let norms = weight.clone().powi_scalar(2).sum_dim(1).sqrt();
    let scale = norms.add_scalar(1e-7).recip().mul_scalar(max_norm).clamp_max(1.0);
    weight * scale
}

/// Row-major host copy of a float tensor.
fn host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("cannot copy tensor to host: {e:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn config() -> AstCodaConfig {
        // 2 domains x 2 classes
        AstCodaConfig::new(3, 4, 5, 4, 2, 6)
    }

    fn tokens(rows: &[&[i32]]) -> Tensor<TestBackend, 2, Int> {
        let width = rows[0].len();
        let flat: Vec<i32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::<TestBackend, 1, Int>::from_ints(flat.as_slice(), &Default::default())
            .reshape([rows.len(), width])
    }

    fn ids(values: &[i32]) -> Tensor<TestBackend, 1, Int> {
        Tensor::<TestBackend, 1, Int>::from_ints(values, &Default::default())
    }

    fn floats<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
        host(t).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let cfg = config();
        assert_eq!(cfg.padding_idx, 0);
        assert_eq!(cfg.dropout, 0.5);
        assert!(!cfg.trailing_padding);
    }

    #[test]
    fn test_rejects_indivisible_labels() {
        let err = AstCodaConfig::new(3, 4, 5, 5, 2, 6)
            .init::<TestBackend>(&Default::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DomainError>(),
            Some(DomainError::IndivisibleLabels { num_labels: 5, num_classes: 2 })
        ));
    }

    #[test]
    fn test_output_shapes() {
        let model = config().init::<TestBackend>(&Default::default()).unwrap();
        let out = model.forward(tokens(&[&[2, 3, 4, 0], &[2, 2, 0, 0], &[3, 4, 4, 5]]), ids(&[0, 1, 1]));

        assert_eq!(out.logits.dims(), [3, 2]);
        // Left padding keeps one window per input position.
        assert_eq!(out.features.dims(), [3, 5, 4]);
        assert_eq!(out.activations.dims(), [3, 5, 4]);
        assert_eq!(out.domains.dims(), [3, 5]);
        assert_eq!(out.attention.dims(), [3, 4]);
    }

    #[test]
    fn test_attention_sums_to_one() {
        let model = config().init::<TestBackend>(&Default::default()).unwrap();
        let out = model.forward(tokens(&[&[2, 3, 4], &[5, 0, 0]]), ids(&[1, 0]));
        for sum in floats(out.attention.sum_dim(1)) {
            assert!((sum - 1.0).abs() < 1e-5, "attention sums to {sum}");
        }
    }

    #[test]
    fn test_trailing_padding_adds_windows() {
        let model = config()
            .with_trailing_padding(true)
            .init::<TestBackend>(&Default::default())
            .unwrap();
        let out = model.forward(tokens(&[&[2, 3, 4]]), ids(&[0]));
        assert_eq!(out.attention.dims(), [1, 5]);
    }

    #[test]
    fn test_kernel_of_one_needs_no_padding() {
        let model = AstCodaConfig::new(1, 4, 5, 4, 2, 6)
            .init::<TestBackend>(&Default::default())
            .unwrap();
        let out = model.forward(tokens(&[&[2, 3]]), ids(&[1]));
        assert_eq!(out.features.dims(), [1, 5, 2]);
    }

    #[test]
    fn test_heads_are_selected_per_example() {
        let model = config().init::<TestBackend>(&Default::default()).unwrap();
        let row: &[i32] = &[2, 3, 4];

        let both  = floats(model.forward(tokens(&[row, row]), ids(&[0, 1])).logits);
        let first = floats(model.forward(tokens(&[row]), ids(&[0])).logits);
        let second = floats(model.forward(tokens(&[row]), ids(&[1])).logits);

        for (a, b) in both[..2].iter().zip(&first) {
            assert!((a - b).abs() < 1e-5);
        }
        for (a, b) in both[2..].iter().zip(&second) {
            assert!((a - b).abs() < 1e-5);
        }
        assert_ne!(first, second);
    }

    #[test]
    fn test_padding_row_starts_at_zero() {
        let model = config().init::<TestBackend>(&Default::default()).unwrap();
        let weights = model.export_weights().unwrap();
        assert!(weights.embeddings.row(0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_pretrained_embeddings_are_used_verbatim() {
        let data: Vec<f32> = (0..24).map(|v| v as f32 * 0.25).collect();
        let pretrained = HostMatrix::new(6, 4, data.clone()).unwrap();
        let model = config()
            .init_with::<TestBackend>(Some(&pretrained), &Default::default())
            .unwrap();
        assert_eq!(model.export_weights().unwrap().embeddings.data, data);
    }

    #[test]
    fn test_rejects_pretrained_shape_mismatch() {
        let pretrained = HostMatrix::new(6, 3, vec![0.0; 18]).unwrap();
        assert!(config().init_with::<TestBackend>(Some(&pretrained), &Default::default()).is_err());
    }

    #[test]
    fn test_exported_shapes() {
        let model = config().init::<TestBackend>(&Default::default()).unwrap();
        let w = model.export_weights().unwrap();
        assert_eq!((w.embeddings.rows, w.embeddings.cols), (6, 4));
        assert_eq!((w.conv_matrix.rows, w.conv_matrix.cols), (5, 12));
        assert_eq!(w.conv_bias.rows, 5);
        assert_eq!((w.attention_domains.rows, w.attention_domains.cols), (2, 5));
        assert_eq!(w.bn_mean.data, vec![0.0; 5]);
        assert_eq!(w.bn_var.data, vec![1.0; 5]);
        assert_eq!((w.fc_matrices.rows, w.fc_matrices.cols), (4, 5));
        assert_eq!(w.fc_biases.rows, 4);

        // Domain 1's head is rows 2..4 of the stacked matrix.
        let head = floats(model.head_weight.val().slice([1..2, 0..2, 0..5]));
        assert_eq!(&w.fc_matrices.data[10..20], head.as_slice());
    }

    #[test]
    fn test_sequences_are_padded_on_the_left() {
        // k = 2: window 0 is [PAD, first token], the last window ends at the last token.
        let model = AstCodaConfig::new(2, 4, 5, 4, 2, 6)
            .init::<TestBackend>(&Default::default())
            .unwrap();
        let out = model.forward(tokens(&[&[2, 3], &[2, 4]]), ids(&[0, 0]));
        assert_eq!(out.features.dims(), [2, 5, 2]);

        let window = |b: usize, w: usize| floats(out.features.clone().slice([b..b + 1, 0..5, w..w + 1]));
        assert_eq!(window(0, 0), window(1, 0));
        assert_ne!(window(0, 1), window(1, 1));
    }

    #[test]
    fn test_initial_rows_respect_max_norm() {
        let model = config().init::<TestBackend>(&Default::default()).unwrap();
        let w = model.export_weights().unwrap();
        for table in [&w.embeddings, &w.attention_domains] {
            for r in 0..table.rows {
                let norm = table.row(r).iter().map(|v| v * v).sum::<f32>().sqrt();
                assert!(norm <= 1.0 + 1e-5, "row {r} has norm {norm}");
            }
        }
    }

    #[test]
    fn test_clip_norms_only_shrinks_long_rows() {
        let device = Default::default();
        let mut model = config().init::<TestBackend>(&device).unwrap();
        let rows: Vec<f32> = vec![3.0, 4.0, 0.0, 0.0, 0.0, 0.1, 0.2, 0.0, 0.0, 0.0];
        model.attention_domains = Param::from_tensor(
            Tensor::<TestBackend, 1>::from_floats(rows.as_slice(), &device).reshape([2, 5]),
        );
        let id = model.attention_domains.id;

        let model = model.clip_norms();
        let clipped = floats(model.attention_domains.val());
        assert!((clipped[0] - 0.6).abs() < 1e-5 && (clipped[1] - 0.8).abs() < 1e-5);
        assert_eq!(&clipped[5..7], &[0.1, 0.2]);
        assert_eq!(model.attention_domains.id, id);
    }

    #[test]
    fn test_autodiff_init_and_padding_grad_mask() {
        type Ad = burn::backend::Autodiff<NdArray>;
        let device = Default::default();
        let model = config().init::<Ad>(&device).unwrap();
        assert!(model.embedding.weight.val().is_require_grad());

        let tokens = Tensor::<Ad, 1, Int>::from_ints([2, 0, 3, 4].as_slice(), &device).reshape([2, 2]);
        let labels = |v: &[i32]| Tensor::<Ad, 1, Int>::from_ints(v, &device);
        let (loss, _) = model.forward_loss(tokens, labels(&[0, 1]), labels(&[1, 0]));
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let grads = model.mask_padding_grad(grads);

        let grad = grads
            .get::<NdArray, 2>(model.embedding.weight.id)
            .expect("embedding gradient");
        let grad = floats(grad);
        assert!(grad[..4].iter().all(|&g| g == 0.0));
        assert!(grad[8..].iter().any(|&g| g != 0.0));
    }

    #[test]
    fn test_forward_loss_is_finite() {
        let model = config().init::<TestBackend>(&Default::default()).unwrap();
        let (loss, _) = model.forward_loss(tokens(&[&[2, 3], &[4, 5]]), ids(&[0, 1]), ids(&[1, 0]));
        let loss: f64 = loss.into_scalar().elem::<f64>();
        assert!(loss.is_finite() && loss > 0.0);
    }
}
