//! Istanbul `coverage-summary.json` parsing.

use serde::{Deserialize, Serialize};

/// Line coverage for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    pub file: String,
    pub lines_pct: f64,
}

/// Line coverage for the whole project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageSummary {
    pub total_lines_pct: f64,
    pub files: Vec<FileCoverage>,
}

fn lines_pct(entry: &serde_json::Value) -> Option<f64> {
    entry.get("lines")?.get("pct")?.as_f64()
}

impl CoverageSummary {
    /// Parse the JSON summary. The `total` entry is required; file entries
    /// whose percentage is not a number (istanbul writes `"Unknown"` for
    /// empty files) are skipped.
    pub fn parse(json: &str) -> Result<Self, String> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
        let map = value
            .as_object()
            .ok_or_else(|| "coverage summary is not a JSON object".to_string())?;

        let total = map
            .get("total")
            .ok_or_else(|| "coverage summary has no 'total' entry".to_string())?;
        let total_lines_pct =
            lines_pct(total).ok_or_else(|| "'total.lines.pct' is missing or not a number".to_string())?;

        let files = map
            .iter()
            .filter(|(name, _)| name.as_str() != "total")
            .filter_map(|(name, entry)| {
                lines_pct(entry).map(|pct| FileCoverage {
                    file: name.clone(),
                    lines_pct: pct,
                })
            })
            .collect();

        Ok(Self {
            total_lines_pct,
            files,
        })
    }

    /// The `n` files with the lowest line coverage, worst first.
    pub fn worst_files(&self, n: usize) -> Vec<FileCoverage> {
        let mut files = self.files.clone();
        files.sort_by(|a, b| {
            a.lines_pct
                .partial_cmp(&b.lines_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.file.cmp(&b.file))
        });
        files.truncate(n);
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = r#"{
        "total": {"lines": {"total": 200, "covered": 150, "skipped": 0, "pct": 75}},
        "/app/src/a.js": {"lines": {"total": 100, "covered": 95, "pct": 95}},
        "/app/src/b.js": {"lines": {"total": 50, "covered": 20, "pct": 40}},
        "/app/src/c.js": {"lines": {"total": 50, "covered": 35, "pct": 70}},
        "/app/src/empty.js": {"lines": {"total": 0, "covered": 0, "pct": "Unknown"}}
    }"#;

    #[test]
    fn parses_total_and_files() {
        let summary = CoverageSummary::parse(SUMMARY).unwrap();
        assert_eq!(summary.total_lines_pct, 75.0);
        assert_eq!(summary.files.len(), 3);
    }

    #[test]
    fn worst_files_are_sorted_ascending() {
        let summary = CoverageSummary::parse(SUMMARY).unwrap();
        let worst = summary.worst_files(2);
        assert_eq!(worst[0].file, "/app/src/b.js");
        assert_eq!(worst[1].file, "/app/src/c.js");
    }

    #[test]
    fn missing_total_is_an_error() {
        assert!(CoverageSummary::parse(r#"{"a.js": {"lines": {"pct": 1}}}"#).is_err());
        assert!(CoverageSummary::parse("[]").is_err());
    }
}
