//! The four built-in notification templates, reproduced by behavior
//! rather than by exact text. Each renders `Data{static, entries, report}`
//! into a message body.

use serde::Serialize;

use crate::engine::Report;

#[derive(Debug, Clone)]
pub struct StaticData {
    pub title: String,
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Data<'a> {
    pub static_data: &'a StaticData,
    pub entries: &'a [LogEntry],
    pub report: &'a Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Default,
    DefaultLegacy,
    PorcelainV1SummaryNoLog,
    JsonV1,
}

impl Template {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Template::Default),
            "default-legacy" => Some(Template::DefaultLegacy),
            "porcelain.v1.summary-no-log" => Some(Template::PorcelainV1SummaryNoLog),
            "json.v1" => Some(Template::JsonV1),
            _ => None,
        }
    }

    pub fn render(&self, data: &Data) -> String {
        match self {
            Template::Default => render_default(data),
            Template::DefaultLegacy => render_default_legacy(data),
            Template::PorcelainV1SummaryNoLog => render_porcelain_summary(data),
            Template::JsonV1 => render_json(data),
        }
    }
}

fn render_default(data: &Data) -> String {
    let mut out = format!("{} ({})\n", data.static_data.title, data.static_data.host);
    out.push_str(&summary_line(data.report));
    if !data.entries.is_empty() {
        out.push_str("\n\n");
        for entry in data.entries {
            out.push_str(&format!("{}: {}\n", entry.level.to_ascii_uppercase(), entry.message));
        }
    }
    out
}

/// The legacy variant receives `Entries` directly rather than the full
/// `Data` struct, so the summary line (which needs the report) is omitted.
fn render_default_legacy(data: &Data) -> String {
    if data.entries.is_empty() {
        return String::new();
    }
    data.entries
        .iter()
        .map(|e| format!("{}: {}", e.level.to_ascii_uppercase(), e.message))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_porcelain_summary(data: &Data) -> String {
    summary_line(data.report)
}

#[derive(Serialize)]
struct JsonReport<'a> {
    title: &'a str,
    host: &'a str,
    entries: Vec<JsonEntry<'a>>,
    scanned: usize,
    updated: usize,
    restarted: usize,
    failed: usize,
    skipped: usize,
    stale: usize,
    fresh: usize,
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    level: &'a str,
    message: &'a str,
}

fn render_json(data: &Data) -> String {
    let payload = JsonReport {
        title: &data.static_data.title,
        host: &data.static_data.host,
        entries: data
            .entries
            .iter()
            .map(|e| JsonEntry { level: &e.level, message: &e.message })
            .collect(),
        scanned: data.report.scanned.len(),
        updated: data.report.updated.len(),
        restarted: data.report.restarted.len(),
        failed: data.report.failed.len(),
        skipped: data.report.skipped.len(),
        stale: data.report.stale.len(),
        fresh: data.report.fresh.len(),
    };
    serde_json::to_string(&payload).unwrap_or_default()
}

fn summary_line(report: &Report) -> String {
    format!(
        "scanned={} updated={} restarted={} failed={} skipped={} stale={} fresh={}",
        report.scanned.len(),
        report.updated.len(),
        report.restarted.len(),
        report.failed.len(),
        report.skipped.len(),
        report.stale.len(),
        report.fresh.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progress::Progress;

    fn sample_report() -> Report {
        Report::new(Progress::new())
    }

    #[test]
    fn template_names_round_trip() {
        assert_eq!(Template::parse("default"), Some(Template::Default));
        assert_eq!(Template::parse("json.v1"), Some(Template::JsonV1));
        assert_eq!(Template::parse("unknown"), None);
    }

    #[test]
    fn json_v1_entries_length_matches_input() {
        let static_data = StaticData { title: "sentinel".into(), host: "h1".into() };
        let report = sample_report();
        let entries = vec![
            LogEntry { level: "info".into(), message: "a".into() },
            LogEntry { level: "warn".into(), message: "b".into() },
        ];
        let data = Data { static_data: &static_data, entries: &entries, report: &report };
        let rendered = Template::JsonV1.render(&data);
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["entries"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["scanned"], 0);
    }

    #[test]
    fn legacy_template_ignores_report_and_uses_entries_only() {
        let static_data = StaticData { title: "t".into(), host: "h".into() };
        let report = sample_report();
        let entries = vec![LogEntry { level: "error".into(), message: "boom".into() }];
        let data = Data { static_data: &static_data, entries: &entries, report: &report };
        let rendered = Template::DefaultLegacy.render(&data);
        assert_eq!(rendered, "ERROR: boom");
    }

    #[test]
    fn porcelain_summary_has_no_entries() {
        let static_data = StaticData { title: "t".into(), host: "h".into() };
        let report = sample_report();
        let entries = vec![LogEntry { level: "info".into(), message: "hidden".into() }];
        let data = Data { static_data: &static_data, entries: &entries, report: &report };
        let rendered = Template::PorcelainV1SummaryNoLog.render(&data);
        assert!(!rendered.contains("hidden"));
        assert!(rendered.contains("scanned="));
    }
}
