use burn::{
    nn::{
        attention::{generate_autoregressive_mask, MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        conv::{Conv1d, Conv1dConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
        PaddingConfig1d,
    },
    prelude::*,
    tensor::activation::gelu,
};

use crate::domain::amino_acid::VOCAB_SIZE;
use crate::domain::geometry::NUM_ANGLES;

/// Values predicted per residue: one (cos, sin) pair per angle.
pub const ANGLE_FEATURES: usize = NUM_ANGLES * 2;

const UNIT_EPS: f64 = 1e-8;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally, do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ProteinTransformerConfig {
    pub max_len:    usize,
    pub d_model:    usize,
    pub num_heads:  usize,
    pub num_layers: usize,
    pub d_ff:       usize,
    pub dropout:    f64,
    /// Odd kernel width of the convolution block, 0 = no convolution.
    #[config(default = 0)]
    pub conv_kernel: usize,
    /// Structure decoder depth, 0 = encoder only.
    #[config(default = 0)]
    pub decoder_layers: usize,
}

impl ProteinTransformerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ProteinTransformer<B> {
        let residue_embedding  = EmbeddingConfig::new(VOCAB_SIZE, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_len, self.d_model).init(device);
        let conv = (self.conv_kernel > 0).then(|| self.build_conv_block(device));
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let decoder = (self.decoder_layers > 0).then(|| StructureDecoder {
            input_proj: LinearConfig::new(ANGLE_FEATURES, self.d_model).init(device),
            layers: (0..self.decoder_layers)
                .map(|_| self.build_decoder_block(device))
                .collect(),
            dropout: DropoutConfig::new(self.dropout).init(),
        });
        let angle_head = LinearConfig::new(self.d_model, ANGLE_FEATURES).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        ProteinTransformer {
            residue_embedding, position_embedding, conv, layers,
            decoder, angle_head, dropout,
            max_len: self.max_len,
        }
    }

    fn attention<B: Backend>(&self, device: &B::Device) -> MultiHeadAttention<B> {
        MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device)
    }

    fn build_conv_block<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        let conv = Conv1dConfig::new(self.d_model, self.d_model, self.conv_kernel)
            .with_padding(PaddingConfig1d::Explicit(self.conv_kernel / 2))
            .init(device);
        let norm    = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        ConvBlock { conv, norm, dropout }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = self.attention(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }

    fn build_decoder_block<B: Backend>(&self, device: &B::Device) -> DecoderBlock<B> {
        DecoderBlock {
            self_attn:   self.attention(device),
            cross_attn:  self.attention(device),
            ffn_linear1: LinearConfig::new(self.d_model, self.d_ff).init(device),
            ffn_linear2: LinearConfig::new(self.d_ff, self.d_model).init(device),
            norm1:       LayerNormConfig::new(self.d_model).init(device),
            norm2:       LayerNormConfig::new(self.d_model).init(device),
            norm3:       LayerNormConfig::new(self.d_model).init(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
        }
    }
}

// ─── Convolution block ────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv:    Conv1d<B>,
    pub norm:    LayerNorm<B>,
    pub dropout: Dropout,
}

impl<B: Backend> ConvBlock<B> {
    /// x: [batch, seq_len, d_model], keep: [batch, seq_len, 1] (1 = real residue)
    pub fn forward(&self, x: Tensor<B, 3>, keep: Tensor<B, 3>) -> Tensor<B, 3> {
        // Conv1d wants channels first
        let local = self.conv.forward((x.clone() * keep).swap_dims(1, 2)).swap_dims(1, 2);
        self.norm.forward(x + self.dropout.forward(gelu(local)))
    }
}

// ─── Encoder ──────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn_output = self.self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad_mask))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(gelu(self.ffn_linear1.forward(x.clone())));
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

// ─── Structure decoder ────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub cross_attn:  MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub norm3:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> DecoderBlock<B> {
    pub fn forward(
        &self,
        y:        Tensor<B, 3>,
        memory:   Tensor<B, 3>,
        pad_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len, _] = y.dims();
        let causal = generate_autoregressive_mask::<B>(batch_size, seq_len, &y.device());

        let attn = self.self_attn
            .forward(MhaInput::self_attn(y.clone()).mask_pad(pad_mask.clone()).mask_attn(causal))
            .context;
        let y = self.norm1.forward(y + self.dropout.forward(attn));

        let cross = self.cross_attn
            .forward(MhaInput::new(y.clone(), memory.clone(), memory).mask_pad(pad_mask))
            .context;
        let y = self.norm2.forward(y + self.dropout.forward(cross));

        let ffn_out = self.ffn_linear2.forward(gelu(self.ffn_linear1.forward(y.clone())));
        self.norm3.forward(y + self.dropout.forward(ffn_out))
    }
}

/// Attends over the encoded sequence while reading the angles of
/// the residues before each position.
#[derive(Module, Debug)]
pub struct StructureDecoder<B: Backend> {
    pub input_proj: Linear<B>,
    pub layers:     Vec<DecoderBlock<B>>,
    pub dropout:    Dropout,
}

impl<B: Backend> StructureDecoder<B> {
    /// prev: [batch, seq_len, 22] angles of the previous residue at each position
    pub fn forward(
        &self,
        prev:     Tensor<B, 3>,
        pos_emb:  Tensor<B, 3>,
        memory:   Tensor<B, 3>,
        pad_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let mut y = self.dropout.forward(self.input_proj.forward(prev) + pos_emb);
        for layer in &self.layers {
            y = layer.forward(y, memory.clone(), pad_mask.clone());
        }
        y
    }
}

/// Shift angle pairs `[B, L, 11, 2]` right by one residue, flattened to
/// `[B, L, 22]`. Position 0 sees zeros.
pub fn shift_right<B: Backend>(trig: Tensor<B, 4>) -> Tensor<B, 3> {
    let [batch_size, seq_len, _, _] = trig.dims();
    let flat  = trig.reshape([batch_size, seq_len, ANGLE_FEATURES]);
    let start = Tensor::zeros([batch_size, 1, ANGLE_FEATURES], &flat.device());
    if seq_len == 1 {
        return start;
    }
    let body = flat.slice([0..batch_size, 0..seq_len - 1, 0..ANGLE_FEATURES]);
    Tensor::cat(vec![start, body], 1)
}

// ─── Full model ───────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct ProteinTransformer<B: Backend> {
    pub residue_embedding:  Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub conv:               Option<ConvBlock<B>>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub decoder:            Option<StructureDecoder<B>>,
    pub angle_head:         Linear<B>,
    pub dropout:            Dropout,
    pub max_len:            usize,
}

impl<B: Backend> ProteinTransformer<B> {
    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    /// Learned position embedding `[1, seq_len, d_model]`, broadcast over the batch.
    fn positions(&self, seq_len: usize, device: &B::Device) -> Tensor<B, 3> {
        let ids = Tensor::<B, 1, Int>::arange(0..seq_len as i64, device).reshape([1, seq_len]);
        self.position_embedding.forward(ids)
    }

    /// residues: [batch, seq_len] → encoded sequence [batch, seq_len, d_model]
    pub fn encode(&self, residues: Tensor<B, 2, Int>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let [_, seq_len] = residues.dims();
        let device = residues.device();

        let res_emb = self.residue_embedding.forward(residues);
        let mut x = self.dropout.forward(res_emb + self.positions(seq_len, &device));

        if let Some(conv) = &self.conv {
            let keep = pad_mask.clone().bool_not().float().unsqueeze_dim::<3>(2);
            x = conv.forward(x, keep);
        }
        for layer in &self.layers {
            x = layer.forward(x, pad_mask.clone());
        }
        x
    }

    /// Hidden states → unit (cos, sin) pairs `[batch, seq_len, 11, 2]`.
    fn project(&self, hidden: Tensor<B, 3>) -> Tensor<B, 4> {
        let [batch_size, seq_len, _] = hidden.dims();
        let raw  = self.angle_head.forward(hidden).reshape([batch_size, seq_len, NUM_ANGLES, 2]);
        let norm = raw.clone().powf_scalar(2.0).sum_dim(3).add_scalar(UNIT_EPS).sqrt();
        raw / norm
    }

    /// Predict angle pairs.
    ///
    /// `structure` holds the true angle pairs for teacher forcing. A model
    /// with a decoder and no `structure` decodes autoregressively. Encoder
    /// only models ignore `structure`.
    pub fn forward(
        &self,
        residues:  Tensor<B, 2, Int>,
        pad_mask:  Tensor<B, 2, Bool>,
        structure: Option<Tensor<B, 4>>,
    ) -> Tensor<B, 4> {
        let memory = self.encode(residues, pad_mask.clone());
        let Some(decoder) = &self.decoder else {
            return self.project(memory);
        };

        let [_, seq_len, _] = memory.dims();
        let pos_emb = self.positions(seq_len, &memory.device());
        match structure {
            Some(truth) => {
                let hidden = decoder.forward(shift_right(truth), pos_emb, memory, pad_mask);
                self.project(hidden)
            }
            None => self.generate(decoder, memory, pos_emb, pad_mask),
        }
    }

    /// Residue-by-residue decoding: each prediction becomes the next
    /// position's input.
    fn generate(
        &self,
        decoder:  &StructureDecoder<B>,
        memory:   Tensor<B, 3>,
        pos_emb:  Tensor<B, 3>,
        pad_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 4> {
        let [batch_size, seq_len, _] = memory.dims();
        let mut prev = Tensor::<B, 3>::zeros([batch_size, seq_len, ANGLE_FEATURES], &memory.device());
        let mut out  = self.project(decoder.forward(prev.clone(), pos_emb.clone(), memory.clone(), pad_mask.clone()));

        for i in 0..seq_len.saturating_sub(1) {
            let step = out
                .clone()
                .slice([0..batch_size, i..i + 1, 0..NUM_ANGLES, 0..2])
                .reshape([batch_size, 1, ANGLE_FEATURES]);
            prev = prev.slice_assign([0..batch_size, i + 1..i + 2, 0..ANGLE_FEATURES], step);
            out  = self.project(decoder.forward(prev.clone(), pos_emb.clone(), memory.clone(), pad_mask.clone()));
        }
        out
    }
}
