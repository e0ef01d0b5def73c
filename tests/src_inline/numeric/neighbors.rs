use super::*;
use ndarray::array;

#[test]
fn test_knn_orders_by_distance_then_index() {
    let m = array![[0.0, 0.0], [1.0, 0.0], [-1.0, 0.0], [5.0, 0.0]];
    let points = Points::from_rows(&m, &[0, 1, 2, 3]);
    let nn = knn(&points, 2);
    assert_eq!(nn[0], vec![1, 2]);
    assert_eq!(nn[3], vec![1, 0]);
}

#[test]
fn test_knn_clamps_k_to_available_points() {
    let m = array![[0.0, 0.0], [1.0, 0.0]];
    let points = Points::from_rows(&m, &[0, 1]);
    let nn = knn(&points, 10);
    assert_eq!(nn, vec![vec![1], vec![0]]);
}

#[test]
fn test_knn_single_point_has_no_neighbours() {
    let m = array![[0.0, 0.0]];
    let points = Points::from_rows(&m, &[0]);
    assert_eq!(knn(&points, 3), vec![Vec::<usize>::new()]);
}
