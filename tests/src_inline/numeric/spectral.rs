use super::*;
use ndarray::Array2;
use rand::SeedableRng;

#[test]
fn test_top_eigenvalue_of_axis_aligned_cloud() {
    // x takes values -2, 2 and y takes -1, 1: covariance diag(4, 1)
    let mut m = Array2::<f64>::zeros((4, 2));
    let coords = [(-2.0, -1.0), (-2.0, 1.0), (2.0, -1.0), (2.0, 1.0)];
    for (i, (x, y)) in coords.iter().enumerate() {
        m[[i, 0]] = *x;
        m[[i, 1]] = *y;
    }
    let points = Points::from_rows(&m, &[0, 1, 2, 3]);
    let lambda = top_covariance_eigenvalue(&points, 100);
    assert!((lambda - 4.0).abs() < 1e-9, "lambda={lambda}");
}

#[test]
fn test_top_eigenvalue_of_constant_points_is_zero() {
    let m = Array2::<f64>::ones((5, 3));
    let points = Points::from_rows(&m, &[0, 1, 2, 3, 4]);
    assert_eq!(top_covariance_eigenvalue(&points, 10), 0.0);
}

#[test]
fn test_permute_columns_keeps_marginals_and_is_seeded() {
    let mut m = Array2::<f64>::zeros((6, 2));
    for i in 0..6 {
        m[[i, 0]] = i as f64;
        m[[i, 1]] = (10 * i) as f64;
    }
    let points = Points::from_rows(&m, &[0, 1, 2, 3, 4, 5]);
    let a = permute_columns(&points, &mut ChaCha8Rng::seed_from_u64(7));
    let b = permute_columns(&points, &mut ChaCha8Rng::seed_from_u64(7));
    assert_eq!(a, b);

    let mut col = a.column(1);
    col.sort_by(f64::total_cmp);
    assert_eq!(col, points.column(1));
}
