use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::input::InputError;
use crate::input::blob::{read_blob, write_blob};
use crate::model::ranking::RankedTable;
use crate::model::structure::StructureCheckResult;
use crate::model::thresholds::PolicyProfile;
use crate::pipeline::PipelineError;
use crate::pipeline::controller::PipelineState;
use crate::pipeline::stage1_structure::{Stage1Output, Stage1Source};
use crate::report::json::render_summary_json;
use crate::report::text::render_report_text;
use crate::report::{
    ClusterSize, DatasetSummary, RankingSummary, StructureSummary, SummaryData, format_flag,
    format_metric, format_rank,
};

pub const RANKING_COLUMNS: [&str; 9] = [
    "id",
    "dcCheck",
    "simiRetain",
    "gof",
    "ushape",
    "score",
    "rank",
    "decision",
    "note",
];

#[derive(Debug, Clone)]
pub struct Stage4Input<'a> {
    pub state: &'a PipelineState,
    pub policy: &'a PolicyProfile,
    pub dataset: Option<(usize, usize)>,
    pub tool_name: String,
    pub tool_version: String,
}

/// Writes every report the state supports; returns the written paths.
pub fn write_reports(input: &Stage4Input<'_>, out_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    fs::create_dir_all(out_dir).map_err(InputError::from)?;
    let mut written = Vec::new();

    let structure_path = out_dir.join("structure.tsv");
    let blob_path = out_dir.join("stage1.ktq");
    match input.state.stage1() {
        Some(stage1) => {
            write_text(&structure_path, &render_structure_tsv(&stage1.result))?;
            written.push(structure_path);
            if stage1.source == Stage1Source::Computed {
                write_blob(&blob_path, &*stage1.result)?;
                written.push(blob_path);
            } else if !holds_result(&blob_path, &stage1.result) {
                // an existing blob may be the very file the result was loaded from
                remove_stale(&blob_path)?;
            }
        }
        None => {
            remove_stale(&structure_path)?;
            remove_stale(&blob_path)?;
        }
    }

    let ranking_path = out_dir.join("ranking.tsv");
    match input.state.ranking() {
        Some(table) => {
            write_text(&ranking_path, &render_ranking_tsv(table))?;
            written.push(ranking_path);
        }
        None => remove_stale(&ranking_path)?,
    }

    let summary = build_summary(input);
    let json = render_summary_json(&summary)
        .map_err(|e| InputError::InvalidInput(format!("summary.json: {e}")))?;
    let path = out_dir.join("summary.json");
    write_text(&path, &json)?;
    written.push(path);

    let path = out_dir.join("report.txt");
    write_text(&path, &render_report_text(&summary))?;
    written.push(path);

    for path in &written {
        tracing::info!("wrote {}", path.display());
    }
    Ok(written)
}

pub fn render_ranking_tsv(table: &RankedTable) -> String {
    let mut out = RANKING_COLUMNS.join("\t");
    out.push('\n');
    for row in &table.rows {
        let fields = [
            sanitize(&row.id),
            format_flag(row.dc_check).to_string(),
            format_metric(row.simi_retain),
            format_metric(row.gof),
            format_metric(row.ushape),
            format_metric(row.score),
            format_rank(row.rank),
            row.decision.as_str().to_string(),
            sanitize(&row.note),
        ];
        out.push_str(&fields.join("\t"));
        out.push('\n');
    }
    out
}

pub fn render_structure_tsv(result: &StructureCheckResult) -> String {
    let mut out = String::from("cell\tcluster\n");
    for (cell, cluster) in result.cells.iter().zip(&result.clusters) {
        out.push_str(&format!("{}\t{}\n", sanitize(cell), cluster));
    }
    out
}

pub fn build_summary(input: &Stage4Input<'_>) -> SummaryData {
    let message = match input.state {
        PipelineState::AwaitingInput(msg) | PipelineState::DatasetRejected(msg) => {
            Some(msg.clone())
        }
        _ => None,
    };
    let stage1 = input.state.stage1();
    SummaryData {
        tool: input.tool_name.clone(),
        version: input.tool_version.clone(),
        policy: input.policy.name.clone(),
        state: input.state.label().to_string(),
        message,
        dataset: input
            .dataset
            .map(|(n_genes, n_cells)| DatasetSummary { n_genes, n_cells }),
        structure: stage1.map(|s| structure_summary(s)),
        explanation: stage1
            .filter(|s| !s.explanation.is_empty())
            .map(|s| s.explanation.clone()),
        ranking: input.state.ranking().map(|table| RankingSummary {
            viable: table.viable,
            n_candidates: table.rows.len(),
            n_ranked: table.ranked().count(),
            recommended: table.recommended().map(|r| r.id.clone()).collect(),
            rows: table.rows.clone(),
        }),
    }
}

fn structure_summary(stage1: &Stage1Output) -> StructureSummary {
    let result = &stage1.result;
    StructureSummary {
        source: stage1.source.as_str().to_string(),
        if_connected: result.if_connected,
        k: result.k,
        cluster_sizes: result
            .cluster_sizes()
            .into_iter()
            .map(|(cluster, n_cells)| ClusterSize { cluster, n_cells })
            .collect(),
        signal_pct: result.signal_pct,
        signal_threshold: stage1.gate.threshold,
        signal_ok: stage1.gate.signal_ok,
        proceed: stage1.gate.proceed,
        observed_eigenvalue: stage1.homogeneity.as_ref().map(|h| h.observed),
        null_mean_eigenvalue: stage1.homogeneity.as_ref().map(|h| h.null_mean),
        simulations: stage1.homogeneity.as_ref().map(|h| h.simulations),
        fingerprint: format!("{:016x}", result.dataset_fingerprint),
    }
}

// tabs and newlines would break the fixed column layout
fn sanitize(field: &str) -> String {
    field.replace(['\t', '\n', '\r'], " ")
}

fn holds_result(path: &Path, result: &StructureCheckResult) -> bool {
    path.exists() && read_blob::<StructureCheckResult>(path).is_ok_and(|stored| stored == *result)
}

fn remove_stale(path: &Path) -> Result<(), InputError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("removed stale {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn write_text(path: &Path, contents: &str) -> Result<(), InputError> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(contents.as_bytes())?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage4_report.rs"]
mod tests;
