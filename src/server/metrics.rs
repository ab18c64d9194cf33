//! Prometheus text exposition of finder results

use std::fmt::Write;

use crate::finder::FindResult;

/// Content type of the text exposition format
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricLabel {
    pub key: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub labels: Vec<MetricLabel>,
    pub value: u64,
}

/// State of the exporter at scrape time
#[derive(Debug)]
pub struct Snapshot<'a> {
    /// Results of the finder pass, `None` if the pass failed
    pub results: Option<&'a [FindResult]>,
    pub skipped_total: u64,
    pub errors_total: u64,
}

/// First eight characters of the hash part of a digest
pub fn short_digest(digest: &str) -> &str {
    let hash = digest.split_once(':').map_or(digest, |(_, hash)| hash);
    match hash.char_indices().nth(8) {
        Some((end, _)) => &hash[..end],
        None => hash,
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn label(key: &'static str, value: &str) -> MetricLabel {
    MetricLabel {
        key,
        value: value.to_string(),
    }
}

fn image_status_sample(result: &FindResult) -> Sample {
    Sample {
        labels: vec![
            label("input", &result.input),
            label("instance", &result.instance),
            label("source", &result.current.source),
            label("repository", &result.current.repository),
            label("current_tag", &result.current.tag),
            label("latest_tag", &result.latest.tag),
            label("current_digest", short_digest(&result.current.digest)),
            label("latest_digest", short_digest(&result.latest.digest)),
        ],
        value: u64::from(result.needs_update()),
    }
}

fn write_family(
    out: &mut String,
    name: &str,
    help: &str,
    kind: MetricKind,
    samples: &[Sample],
) {
    // Writing to a String cannot fail
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind.as_str());
    for sample in samples {
        out.push_str(name);
        if !sample.labels.is_empty() {
            let labels: Vec<String> = sample
                .labels
                .iter()
                .map(|l| format!("{}=\"{}\"", l.key, escape_label_value(&l.value)))
                .collect();
            let _ = write!(out, "{{{}}}", labels.join(","));
        }
        let _ = writeln!(out, " {}", sample.value);
    }
}

fn unlabeled(value: u64) -> Sample {
    Sample {
        labels: Vec::new(),
        value,
    }
}

/// Render all metric families under `namespace`
pub fn render(namespace: &str, snapshot: &Snapshot<'_>) -> String {
    let mut out = String::new();
    let name = |suffix: &str| format!("{}_{}", namespace, suffix);

    if let Some(results) = snapshot.results {
        let samples: Vec<Sample> = results.iter().map(image_status_sample).collect();
        write_family(
            &mut out,
            &name("image_status"),
            "Update status of an image (0=no-update, 1=needs-update).",
            MetricKind::Gauge,
            &samples,
        );
    }

    write_family(
        &mut out,
        &name("up"),
        "Whether the discovered images could be read.",
        MetricKind::Gauge,
        &[unlabeled(u64::from(snapshot.results.is_some()))],
    );
    write_family(
        &mut out,
        &name("finder_errors_total"),
        "Images whose latest version could not be resolved.",
        MetricKind::Counter,
        &[unlabeled(snapshot.errors_total)],
    );
    write_family(
        &mut out,
        &name("finder_skipped_total"),
        "Images skipped because of an unsupported tag or unknown registry.",
        MetricKind::Counter,
        &[unlabeled(snapshot.skipped_total)],
    );

    out
}
