// ============================================================
// Layer 5: Evaluator and Predictor
// ============================================================
// Evaluator: runs a model over a whole dataset in ascending-length
// batches and averages the loss breakdown. Optionally superimposes
// every predicted structure on its experimental one (Kabsch) and
// reports the coordinate RMSD as well.
//
// Predictor: one sequence in, angles (radians) and all-atom
// coordinates out.
//
// Decoder models are run either with teacher forcing (validation
// during training) or autoregressively (test, evaluate, predict).

use anyhow::{bail, Result};
use burn::{data::dataloader::batcher::Batcher, prelude::*};
use serde::{Deserialize, Serialize};

use crate::data::{batcher::ProteinBatcher, dataset::ProteinDataset, sampler::LengthSampler};
use crate::domain::amino_acid::{AminoAcid, PAD_ID};
use crate::domain::geometry::{NUM_ANGLES, NUM_COORDS_PER_RESIDUE};
use crate::domain::superpose::kabsch_rmsd;
use crate::ml::losses::{structure_loss, BreakdownMean, LossBreakdown, LossKind};
use crate::ml::model::ProteinTransformer;
use crate::ml::structure::build_coords;

/// Copy a float tensor to the host.
pub fn to_host<B: Backend, const D: usize>(t: Tensor<B, D>) -> Result<Vec<f32>> {
    t.into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))
}

fn xyz_rows(flat: &[f32]) -> Vec<[f32; 3]> {
    flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()
}

/// Angles in radians from host (cos, sin) pairs laid out as `[L, 11, 2]`.
pub fn angles_from_trig(flat: &[f32]) -> Vec<[f32; NUM_ANGLES]> {
    flat.chunks_exact(NUM_ANGLES * 2)
        .map(|row| std::array::from_fn(|k| row[2 * k + 1].atan2(row[2 * k])))
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct EvalOptions {
    pub batch_size:      usize,
    pub loss:            LossKind,
    pub teacher_forcing: bool,
    pub with_rmsd:       bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProteinScore {
    pub id:     String,
    pub length: usize,
    pub rmsd:   Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub proteins:  usize,
    pub loss_kind: LossKind,
    pub loss:      f64,
    pub breakdown: LossBreakdown,
    pub mean_rmsd: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub per_protein: Vec<ProteinScore>,
}

impl EvalReport {
    pub fn log(&self, label: &str) {
        let opt = |v: Option<f64>| v.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".into());
        tracing::info!(
            "{} | {} proteins | {}={:.4} | drmsd={} | ln_drmsd={} | bb_drmsd={} | mse={:.4} (bb {:.4}, sc {:.4}) | rmsd={}",
            label,
            self.proteins,
            self.loss_kind,
            self.loss,
            opt(self.breakdown.drmsd),
            opt(self.breakdown.ln_drmsd),
            opt(self.breakdown.bb_drmsd),
            self.breakdown.mse,
            self.breakdown.bb_mse,
            self.breakdown.sc_mse,
            opt(self.mean_rmsd),
        );
    }
}

/// Evaluate `model` on every protein of `dataset`.
pub fn evaluate_dataset<B: Backend>(
    model:   &ProteinTransformer<B>,
    dataset: &ProteinDataset,
    opts:    EvalOptions,
    device:  &B::Device,
) -> Result<EvalReport> {
    let batcher = ProteinBatcher::<B>::new(device.clone());
    let sampler = LengthSampler::sorted(dataset.lengths(), opts.batch_size);

    let mut mean        = BreakdownMean::default();
    let mut per_protein = Vec::new();

    for indices in sampler.batches(0) {
        let batch = batcher.batch(dataset.select(&indices));
        let structure = (opts.teacher_forcing && model.has_decoder()).then(|| batch.angle_trig.clone());
        let pred = model.forward(batch.residues.clone(), batch.pad_mask.clone(), structure);

        let loss = structure_loss(opts.loss, pred, &batch, true);
        mean.add(&loss.breakdown, batch.batch_size());

        if !opts.with_rmsd {
            continue;
        }
        let Some(coords) = loss.coords else { continue };

        let pred_xyz  = xyz_rows(&to_host(coords)?);
        let true_xyz  = xyz_rows(&to_host(batch.coords.clone())?);
        let atom_mask = to_host(batch.atom_mask.clone())?;
        let n_atoms   = batch.max_len() * NUM_COORDS_PER_RESIDUE;

        for (b, id) in batch.ids.iter().enumerate() {
            let (p, t): (Vec<[f32; 3]>, Vec<[f32; 3]>) = (b * n_atoms..(b + 1) * n_atoms)
                .filter(|&a| atom_mask[a] > 0.5)
                .map(|a| (pred_xyz[a], true_xyz[a]))
                .unzip();
            per_protein.push(ProteinScore {
                id:     id.clone(),
                length: batch.lengths[b],
                rmsd:   kabsch_rmsd(&p, &t),
            });
        }
    }

    let breakdown = mean.mean();
    let rmsds: Vec<f64> = per_protein.iter().filter_map(|s| s.rmsd).collect();
    let mean_rmsd = (!rmsds.is_empty()).then(|| rmsds.iter().sum::<f64>() / rmsds.len() as f64);

    Ok(EvalReport {
        proteins: dataset.sample_count(),
        loss_kind: opts.loss,
        loss: breakdown.value(opts.loss),
        breakdown,
        mean_rmsd,
        per_protein,
    })
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub sequence: Vec<AminoAcid>,
    /// Radians, `[L]` rows of 11 angles
    pub angles:   Vec<[f32; NUM_ANGLES]>,
    /// `L * 13` atom slots
    pub coords:   Vec<[f32; 3]>,
}

pub struct Predictor<B: Backend> {
    model:  ProteinTransformer<B>,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: ProteinTransformer<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    pub fn predict(&self, sequence: &[AminoAcid]) -> Result<Prediction> {
        let len = sequence.len();
        if len == 0 {
            bail!("Cannot predict a structure for an empty sequence");
        }
        if len > self.model.max_len {
            bail!("Sequence has {} residues, the model supports at most {}", len, self.model.max_len);
        }

        let ids: Vec<i32> = sequence.iter().map(|aa| aa.token_id() as i32).collect();
        let residues = Tensor::<B, 1, Int>::from_ints(ids.as_slice(), &self.device).reshape([1, len]);
        let pad_mask = residues.clone().equal_elem(PAD_ID as i32);

        let trig   = self.model.forward(residues, pad_mask, None);
        let rows: Vec<Option<AminoAcid>> = sequence.iter().copied().map(Some).collect();
        let coords = build_coords(trig.clone(), &rows);

        Ok(Prediction {
            sequence: sequence.to_vec(),
            angles:   angles_from_trig(&to_host(trig)?),
            coords:   xyz_rows(&to_host(coords)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protein::ProteinRecord;
    use crate::ml::model::ProteinTransformerConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn model() -> ProteinTransformer<TestBackend> {
        ProteinTransformerConfig::new(12, 16, 2, 1, 32, 0.0)
            .with_decoder_layers(1)
            .init(&Default::default())
    }

    fn record(id: &str, seq: &str) -> ProteinRecord {
        let sequence = crate::domain::amino_acid::parse_sequence(seq).unwrap();
        let len = sequence.len();
        let coords = (0..len * NUM_COORDS_PER_RESIDUE)
            .map(|i| [i as f32 * 0.7, (i % 5) as f32, (i % 3) as f32 * 1.3])
            .collect();
        ProteinRecord::new(id, sequence, vec![[0.5; NUM_ANGLES]; len], coords)
    }

    #[test]
    fn test_angles_from_trig() {
        let a = 1.2f32;
        let mut flat = vec![0.0f32; NUM_ANGLES * 2];
        flat[0] = a.cos();
        flat[1] = a.sin();
        let angles = angles_from_trig(&flat);
        assert_eq!(angles.len(), 1);
        assert!((angles[0][0] - a).abs() < 1e-5);
    }

    #[test]
    fn test_evaluate_reports_every_protein() {
        let dataset = ProteinDataset::new(vec![record("a", "MKV"), record("b", "GAWS"), record("c", "PL")]);
        let opts = EvalOptions {
            batch_size: 2,
            loss: LossKind::Combined,
            teacher_forcing: false,
            with_rmsd: true,
        };
        let report = evaluate_dataset(&model(), &dataset, opts, &Default::default()).unwrap();
        assert_eq!(report.proteins, 3);
        assert_eq!(report.per_protein.len(), 3);
        assert!(report.loss.is_finite());
        assert!(report.breakdown.drmsd.is_some());
        assert!(report.mean_rmsd.is_some());
    }

    #[test]
    fn test_predictor_shapes() {
        let p = Predictor::new(model(), Default::default());
        let seq = crate::domain::amino_acid::parse_sequence("MKTAY").unwrap();
        let pred = p.predict(&seq).unwrap();
        assert_eq!(pred.angles.len(), 5);
        assert_eq!(pred.coords.len(), 5 * NUM_COORDS_PER_RESIDUE);
        assert!(pred.angles.iter().flatten().all(|a| a.abs() <= std::f32::consts::PI + 1e-4));
    }

    #[test]
    fn test_predictor_rejects_long_sequence() {
        let p = Predictor::new(model(), Default::default());
        let seq = vec![AminoAcid::Ala; 13];
        assert!(p.predict(&seq).is_err());
    }
}
