use super::json::render_summary_json;
use super::text::render_report_text;
use super::*;
use crate::model::ranking::Decision;
use crate::model::structure::{ClusterMarkers, MarkerGene};

fn summary() -> SummaryData {
    SummaryData {
        tool: "kira-trajectoryqc".to_string(),
        version: "0.1.0".to_string(),
        policy: "default_v1".to_string(),
        state: "not_suitable".to_string(),
        message: None,
        dataset: Some(DatasetSummary {
            n_genes: 2000,
            n_cells: 500,
        }),
        structure: Some(StructureSummary {
            source: "computed".to_string(),
            if_connected: false,
            k: 2,
            cluster_sizes: vec![
                ClusterSize {
                    cluster: 1,
                    n_cells: 320,
                },
                ClusterSize {
                    cluster: 2,
                    n_cells: 180,
                },
            ],
            signal_pct: 0.71,
            signal_threshold: 0.46,
            signal_ok: true,
            proceed: false,
            observed_eigenvalue: Some(12.5),
            null_mean_eigenvalue: Some(3.6),
            simulations: Some(20),
            fingerprint: "00000000deadbeef".to_string(),
        }),
        explanation: Some(Explanation {
            markers: Some(vec![ClusterMarkers {
                cluster: 2,
                n_cells: 180,
                genes: vec![MarkerGene {
                    gene: "HBB".to_string(),
                    t_stat: 14.25,
                    mean_in: 5.0,
                    mean_out: 0.2,
                }],
            }]),
            variable_genes: None,
        }),
        ranking: None,
    }
}

#[test]
fn test_format_helpers() {
    assert_eq!(format_metric(Some(0.5)), "0.500000");
    assert_eq!(format_metric(Some(f64::NAN)), "NA");
    assert_eq!(format_metric(None), "NA");
    assert_eq!(format_flag(Some(true)), "TRUE");
    assert_eq!(format_flag(Some(false)), "FALSE");
    assert_eq!(format_flag(None), "NA");
    assert_eq!(format_rank(Some(3)), "3");
    assert_eq!(format_rank(None), "NA");
}

#[test]
fn test_text_report_explains_disconnection() {
    let text = render_report_text(&summary());
    assert!(text.contains("2000 genes x 500 cells"));
    assert!(text.contains("Connected: no (k=2)"));
    assert!(text.contains("Cluster sizes: 1:320, 2:180"));
    assert!(text.contains("not suitable: cells split into disconnected clusters"));
    assert!(text.contains("3. Why the gate failed"));
    assert!(text.contains("cluster 2 [180 cells]: HBB (14.25)"));
    assert!(text.contains("4. Candidates\nNot evaluated."));
}

#[test]
fn test_text_report_lists_candidates() {
    let mut data = summary();
    data.state = "ranked".to_string();
    data.explanation = None;
    data.ranking = Some(RankingSummary {
        viable: true,
        n_candidates: 1,
        n_ranked: 1,
        recommended: vec!["slingshot".to_string()],
        rows: vec![RankedResult {
            id: "slingshot".to_string(),
            dc_check: Some(true),
            simi_retain: Some(0.8),
            gof: Some(0.6),
            ushape: Some(0.1),
            score: Some(0.766667),
            rank: Some(1),
            decision: Decision::Recommended,
            note: String::new(),
        }],
    });
    let text = render_report_text(&data);
    assert!(!text.contains("3. Why the gate failed"));
    assert!(text.contains("slingshot rank=1 score=0.766667 dcCheck=TRUE Recommended"));
    assert!(text.contains("Recommended: slingshot"));
}

#[test]
fn test_text_report_without_dataset() {
    let mut data = summary();
    data.dataset = None;
    data.structure = None;
    data.explanation = None;
    data.state = "awaiting_input".to_string();
    data.message = Some("raw matrix not loaded".to_string());
    let text = render_report_text(&data);
    assert!(text.contains("Detail: raw matrix not loaded"));
    assert!(text.contains("2. Structure check\nNot run."));
}

#[test]
fn test_json_summary_fields() {
    let json = render_summary_json(&summary()).unwrap();
    assert!(json.ends_with('\n'));
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["tool"], "kira-trajectoryqc");
    assert_eq!(value["structure"]["k"], 2);
    assert_eq!(value["structure"]["cluster_sizes"][1]["n_cells"], 180);
    assert_eq!(value["explanation"]["markers"][0]["genes"][0]["gene"], "HBB");
    assert!(value["ranking"].is_null());
}
