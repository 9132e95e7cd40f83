// ============================================================
// Layer 3: Kabsch Superposition
// ============================================================
// RMSD after optimal rigid alignment of two coordinate sets.
//
//   1. Center both sets on their centroids
//   2. Covariance H = P^T Q
//   3. SVD: H = U S V^T
//   4. Rotation R = V U^T, flipping the last singular vector
//      when det(R) < 0 so R is a proper rotation
//   5. RMSD over R P vs Q

use nalgebra::{Matrix3, Vector3};

fn centered(points: &[[f32; 3]]) -> Vec<Vector3<f64>> {
    let n = points.len() as f64;
    let vecs: Vec<Vector3<f64>> = points
        .iter()
        .map(|p| Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64))
        .collect();
    let centroid = vecs.iter().fold(Vector3::zeros(), |acc, v| acc + v) / n;
    vecs.into_iter().map(|v| v - centroid).collect()
}

/// Kabsch RMSD between two equally sized point sets.
/// Returns None when the sets differ in size or are empty.
pub fn kabsch_rmsd(a: &[[f32; 3]], b: &[[f32; 3]]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let p = centered(a);
    let q = centered(b);

    let mut h = Matrix3::<f64>::zeros();
    for (pi, qi) in p.iter().zip(&q) {
        h += pi * qi.transpose();
    }

    let svd = h.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);

    let mut r = v_t.transpose() * u.transpose();
    if r.determinant() < 0.0 {
        let mut v_t = v_t;
        v_t.row_mut(2).scale_mut(-1.0);
        r = v_t.transpose() * u.transpose();
    }

    let sum_sq: f64 = p
        .iter()
        .zip(&q)
        .map(|(pi, qi)| (r * pi - qi).norm_squared())
        .sum();

    Some((sum_sq / p.len() as f64).sqrt())
}
