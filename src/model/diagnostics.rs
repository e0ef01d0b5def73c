use serde::Serialize;

/// Per-candidate metrics; `None` marks a check that could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticRow {
    pub id: String,
    pub dc_check: Option<bool>,
    pub simi_retain: Option<f64>,
    pub gof: Option<f64>,
    pub ushape: Option<f64>,
    pub notes: Vec<String>,
}

impl DiagnosticRow {
    pub fn missing_checks(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.dc_check.is_none() {
            missing.push("dcCheck");
        }
        if self.simi_retain.is_none() {
            missing.push("simiRetain");
        }
        if self.gof.is_none() {
            missing.push("gof");
        }
        if self.ushape.is_none() {
            missing.push("ushape");
        }
        missing
    }
}
