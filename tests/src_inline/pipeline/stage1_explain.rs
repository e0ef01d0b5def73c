use ndarray::array;

use super::*;
use crate::pipeline::fixtures::test_policy;

fn small_matrix() -> ExpressionMatrix {
    // g_up marks cells 0-2, g_down marks cells 3-5, g_flat is constant
    ExpressionMatrix::new(
        vec!["g_up".into(), "g_down".into(), "g_flat".into(), "g_noisy".into()],
        (0..6).map(|i| format!("c{i}")).collect(),
        array![
            [5.0, 5.5, 4.5, 0.0, 0.5, 0.0],
            [0.0, 0.2, 0.0, 6.0, 6.5, 5.5],
            [1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            [0.0, 9.0, 1.0, 8.0, 0.0, f64::NAN],
        ],
    )
    .unwrap()
}

fn structure(if_connected: bool, signal_pct: f64) -> StructureCheckResult {
    let (clusters, k) = if if_connected {
        (vec![1; 6], 1)
    } else {
        (vec![1, 1, 1, 2, 2, 2], 2)
    };
    StructureCheckResult {
        if_connected,
        clusters,
        k,
        signal_pct,
        cells: (0..6).map(|i| format!("c{i}")).collect(),
        dataset_fingerprint: 0,
    }
}

#[test]
fn test_markers_rank_cluster_specific_genes_first() {
    let markers = cluster_markers(&small_matrix(), &[1, 1, 1, 2, 2, 2], 2, 10);
    assert_eq!(markers.len(), 2);
    assert_eq!(markers[0].cluster, 1);
    assert_eq!(markers[0].n_cells, 3);
    assert_eq!(markers[0].genes[0].gene, "g_up");
    assert_eq!(markers[1].genes[0].gene, "g_down");
    assert!(markers.iter().all(|m| m.genes.iter().all(|g| g.t_stat > 0.0)));
    assert!(markers.iter().all(|m| m.genes.iter().all(|g| g.gene != "g_flat")));
    assert!(markers[0].genes[0].mean_in > markers[0].genes[0].mean_out);
}

#[test]
fn test_markers_truncate_to_top_n() {
    let markers = cluster_markers(&small_matrix(), &[1, 1, 1, 2, 2, 2], 2, 1);
    assert!(markers.iter().all(|m| m.genes.len() <= 1));
}

#[test]
fn test_variable_genes_sorted_by_variance() {
    let genes = variable_genes(&small_matrix(), 2);
    assert_eq!(genes.len(), 2);
    assert_eq!(genes[0].gene, "g_noisy");
    assert!(genes[0].variance >= genes[1].variance);
}

#[test]
fn test_explain_matches_failed_conditions() {
    let policy = test_policy();
    let norm = small_matrix();

    let ok = structure(true, 0.9);
    let gate = ProceedGate::evaluate(&ok, policy.signal_threshold);
    assert!(explain(&norm, &ok, &gate, &policy).is_empty());

    let split = structure(false, 0.9);
    let gate = ProceedGate::evaluate(&split, policy.signal_threshold);
    let e = explain(&norm, &split, &gate, &policy);
    assert!(e.markers.is_some());
    assert!(e.variable_genes.is_none());

    let weak = structure(true, 0.1);
    let gate = ProceedGate::evaluate(&weak, policy.signal_threshold);
    let e = explain(&norm, &weak, &gate, &policy);
    assert!(e.markers.is_none());
    assert_eq!(e.variable_genes.unwrap().len(), 4);
}
