use crate::model::ranking::Decision;
use crate::model::structure::Explanation;
use crate::report::{SummaryData, format_flag, format_metric, format_rank};

pub fn render_report_text(data: &SummaryData) -> String {
    let mut out = String::new();

    out.push_str("Trajectory Suitability & Candidate Ranking Report\n");
    out.push_str("=================================================\n\n");
    out.push_str(&format!("Tool: {} {}\n", data.tool, data.version));
    out.push_str(&format!("Policy: {}\n", data.policy));
    out.push_str(&format!("State: {}\n", data.state));
    if let Some(message) = &data.message {
        out.push_str(&format!("Detail: {}\n", message));
    }
    out.push('\n');

    out.push_str("1. Dataset\n");
    match &data.dataset {
        Some(d) => out.push_str(&format!("{} genes x {} cells\n\n", d.n_genes, d.n_cells)),
        None => out.push_str("No dataset loaded; stored structure check used.\n\n"),
    }

    out.push_str("2. Structure check\n");
    match &data.structure {
        Some(s) => {
            out.push_str(&format!("Source: {}\n", s.source));
            out.push_str(&format!(
                "Connected: {} (k={})\n",
                if s.if_connected { "yes" } else { "no" },
                s.k
            ));
            if s.cluster_sizes.len() > 1 {
                let sizes = s
                    .cluster_sizes
                    .iter()
                    .map(|c| format!("{}:{}", c.cluster, c.n_cells))
                    .collect::<Vec<_>>();
                out.push_str(&format!("Cluster sizes: {}\n", sizes.join(", ")));
            }
            out.push_str(&format!(
                "Signal: {} (threshold {})\n",
                format_metric(Some(s.signal_pct)),
                format_metric(Some(s.signal_threshold))
            ));
            out.push_str(&format!(
                "Conclusion: {}\n\n",
                gate_statement(s.signal_ok, s.if_connected)
            ));
        }
        None => out.push_str("Not run.\n\n"),
    }

    if let Some(explanation) = &data.explanation {
        if !explanation.is_empty() {
            out.push_str("3. Why the gate failed\n");
            render_explanation(&mut out, explanation);
            out.push('\n');
        }
    }

    out.push_str("4. Candidates\n");
    match &data.ranking {
        Some(ranking) => {
            if !ranking.viable {
                out.push_str("No candidate keeps the embedding connected; nothing was ranked.\n");
            }
            for row in &ranking.rows {
                out.push_str(&format!(
                    "{} rank={} score={} dcCheck={} {}\n",
                    row.id,
                    format_rank(row.rank),
                    format_metric(row.score),
                    format_flag(row.dc_check),
                    row.decision.as_str()
                ));
                if !row.note.is_empty() {
                    out.push_str(&format!("  note: {}\n", row.note));
                }
            }
            let recommended = ranking
                .rows
                .iter()
                .filter(|r| r.decision == Decision::Recommended)
                .map(|r| r.id.as_str())
                .collect::<Vec<_>>();
            if !recommended.is_empty() {
                out.push_str(&format!("Recommended: {}\n", recommended.join(", ")));
            }
        }
        None => out.push_str("Not evaluated.\n"),
    }

    out
}

fn render_explanation(out: &mut String, explanation: &Explanation) {
    if let Some(markers) = &explanation.markers {
        out.push_str("Disconnected clusters; top markers per cluster (Welch t):\n");
        for cluster in markers {
            let genes = cluster
                .genes
                .iter()
                .map(|g| format!("{} ({:.2})", g.gene, g.t_stat))
                .collect::<Vec<_>>();
            out.push_str(&format!(
                "  cluster {} [{} cells]: {}\n",
                cluster.cluster,
                cluster.n_cells,
                if genes.is_empty() {
                    "-".to_string()
                } else {
                    genes.join(", ")
                }
            ));
        }
    }
    if let Some(genes) = &explanation.variable_genes {
        out.push_str("Weak structure signal; most variable genes (mean, variance):\n");
        for g in genes {
            out.push_str(&format!(
                "  {} ({}, {})\n",
                g.gene,
                format_metric(Some(g.mean)),
                format_metric(Some(g.variance))
            ));
        }
    }
}

fn gate_statement(signal_ok: bool, if_connected: bool) -> &'static str {
    match (signal_ok, if_connected) {
        (true, true) => "suitable for trajectory fitting",
        (true, false) => "not suitable: cells split into disconnected clusters",
        (false, true) => "not suitable: expression looks homogeneous",
        (false, false) => "not suitable: homogeneous signal and disconnected clusters",
    }
}
