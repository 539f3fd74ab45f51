//! Console rendering: separators, key/value lines and tables measured in
//! terminal columns, so CJK text and emoji stay aligned.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::analysis::{AnalysisReport, PromptBreakdown, RankedEntry};
use crate::civitai::{ImageRecord, ModelAvailability};
use crate::util::one_line;

const COLUMN_PADDING: usize = 2;
const MIN_COLUMN_WIDTH: usize = 5;

pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Cut `text` to at most `max_width` columns.
pub fn truncate_to_width(text: &str, max_width: usize) -> String {
    let mut width = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + w > max_width {
            break;
        }
        width += w;
        out.push(c);
    }
    out
}

pub fn pad_to_width(text: &str, target: usize) -> String {
    let pad = target.saturating_sub(display_width(text));
    format!("{}{}", text, " ".repeat(pad))
}

/// Builds console output into a buffer.
pub struct ConsoleFormatter {
    line_length: usize,
    buf: String,
}

impl ConsoleFormatter {
    pub fn new(line_length: usize) -> Self {
        Self {
            line_length: line_length.max(20),
            buf: String::new(),
        }
    }

    pub fn line_length(&self) -> usize {
        self.line_length
    }

    pub fn line(&mut self, text: &str) {
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    pub fn header(&mut self, title: &str) {
        self.titled('=', title);
    }

    pub fn subheader(&mut self, title: &str) {
        self.titled('-', title);
    }

    fn titled(&mut self, fill: char, title: &str) {
        let separator = fill.to_string().repeat(self.line_length);
        self.line(&separator);
        if !title.is_empty() {
            self.line(title);
            self.line(&separator);
        }
    }

    pub fn key_value(&mut self, key: &str, value: impl std::fmt::Display) {
        self.line(&format!("  {}: {}", key, value));
    }

    /// Aligned table. Columns are sized to content, then scaled down (never
    /// below the header, unless even headers do not fit) to the line length.
    pub fn table(&mut self, headers: &[&str], rows: &[Vec<String>]) {
        let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h)).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate().take(widths.len()) {
                widths[i] = widths[i].max(display_width(cell));
            }
        }
        let widths = self.fit_widths(widths, headers);

        let pad = " ".repeat(COLUMN_PADDING);
        let render = |cells: Vec<String>| format!("{}{}", pad, cells.join(&pad)).trim_end().to_string();

        let header_cells = headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| pad_to_width(&truncate_to_width(h, *w), *w))
            .collect();
        self.line(&render(header_cells));
        self.line(&render(widths.iter().map(|w| "-".repeat(*w)).collect()));

        for row in rows {
            let cells = row
                .iter()
                .zip(&widths)
                .map(|(cell, w)| pad_to_width(&truncate_to_width(&one_line(cell), *w), *w))
                .collect();
            self.line(&render(cells));
        }
    }

    fn fit_widths(&self, widths: Vec<usize>, headers: &[&str]) -> Vec<usize> {
        let gaps = COLUMN_PADDING * widths.len();
        let total: usize = widths.iter().sum::<usize>() + gaps;
        if total <= self.line_length || widths.is_empty() {
            return widths;
        }

        let budget = self.line_length.saturating_sub(gaps);
        let header_total: usize = headers.iter().map(|h| display_width(h)).sum();

        // Shrink the widest columns first, down to their header width.
        let mut widths = widths;
        if header_total <= budget {
            let floors: Vec<usize> = headers.iter().map(|h| display_width(h).max(MIN_COLUMN_WIDTH)).collect();
            while widths.iter().sum::<usize>() > budget {
                let Some((idx, _)) = widths
                    .iter()
                    .enumerate()
                    .filter(|(i, w)| **w > floors[*i])
                    .max_by_key(|(_, w)| **w)
                else {
                    break;
                };
                widths[idx] -= 1;
            }
            return widths;
        }

        let scale = budget as f64 / widths.iter().sum::<usize>() as f64;
        widths
            .into_iter()
            .map(|w| ((w as f64 * scale) as usize).max(MIN_COLUMN_WIDTH))
            .collect()
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

fn ranked_rows(entries: &[RankedEntry]) -> Vec<Vec<String>> {
    entries
        .iter()
        .map(|e| vec![e.key.clone(), e.count.to_string(), format!("{:.1}%", e.percentage)])
        .collect()
}

fn ranked_section(fmt: &mut ConsoleFormatter, title: &str, label: &str, entries: &[RankedEntry]) {
    fmt.blank();
    fmt.subheader(title);
    if entries.is_empty() {
        fmt.line("  (none)");
        return;
    }
    fmt.table(&[label, "Count", "Percentage"], &ranked_rows(entries));
}

/// Full console report for a collection analysis. `wide` adds the LoRA id and
/// link columns.
pub fn render_report(report: &AnalysisReport, line_length: usize, wide: bool) -> String {
    let mut fmt = ConsoleFormatter::new(line_length);

    let title = match report.collection_id {
        Some(id) => format!("Collection {} analysis", id),
        None => "Collection analysis".to_string(),
    };
    fmt.header(&title);
    fmt.key_value("Images analyzed", report.total_images);
    if let Some(limit) = report.limit_applied {
        fmt.key_value("Limit", limit);
    }
    let styles = &report.style_breakdown;
    fmt.key_value(
        "Prompt styles",
        format!("{} tag-style, {} natural language", styles.positive.tag, styles.positive.nlp),
    );
    fmt.key_value(
        "Negative styles",
        format!("{} tag-style, {} natural language", styles.negative.tag, styles.negative.nlp),
    );

    ranked_section(&mut fmt, "Top Models", "Model", &report.top_models);
    ranked_section(&mut fmt, "Top Model Versions", "Model Version", &report.top_model_versions);
    ranked_section(&mut fmt, "Top Samplers", "Sampler", &report.top_samplers);
    ranked_section(&mut fmt, "Top Steps", "Steps", &report.top_steps);
    ranked_section(&mut fmt, "Top CFG Scales", "CFG", &report.top_cfg_scales);

    fmt.blank();
    fmt.subheader("Top LoRAs");
    if report.top_loras.is_empty() {
        fmt.line("  (none)");
    } else {
        let mut headers = vec!["LoRA Name", "Usage", "Avg Weight"];
        if wide {
            headers.extend(["Model ID", "URL"]);
        }
        let rows: Vec<Vec<String>> = report
            .top_loras
            .iter()
            .map(|l| {
                let mut row = vec![l.name.clone(), l.usage_count.to_string(), format!("{:.2}", l.average_weight)];
                if wide {
                    row.push(l.model_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()));
                    row.push(l.civitai_url().unwrap_or_else(|| "-".to_string()));
                }
                row
            })
            .collect();
        fmt.table(&headers, &rows);
    }

    ranked_section(&mut fmt, "Top Tags", "Tag", &report.top_tags);
    ranked_section(&mut fmt, "Top Authors", "Author", &report.top_authors);
    ranked_section(&mut fmt, "Top Positive Concepts", "Concept", &report.top_positive_concepts);
    ranked_section(&mut fmt, "Top Negative Concepts", "Concept", &report.top_negative_concepts);
    ranked_section(&mut fmt, "Top Positive Phrases", "Phrase", &report.top_positive_phrases);
    ranked_section(&mut fmt, "Top Negative Phrases", "Phrase", &report.top_negative_phrases);

    if !report.sample_prompts.is_empty() {
        fmt.blank();
        fmt.subheader("Sample Prompts");
        let width = fmt.line_length().saturating_sub(4);
        for sample in &report.sample_prompts {
            fmt.line(&format!(
                "  [{}] {}",
                sample.image_id,
                sample.model.as_deref().unwrap_or("Unknown model")
            ));
            fmt.line(&format!("    {}", truncate_to_width(&one_line(&sample.prompt), width)));
        }
    }

    fmt.blank();
    fmt.header("");
    fmt.into_string()
}

/// Single-image view: metadata, resources and the per-prompt analysis.
pub fn render_image(
    record: &ImageRecord,
    positive: &PromptBreakdown,
    negative: &PromptBreakdown,
    line_length: usize,
) -> String {
    let mut fmt = ConsoleFormatter::new(line_length);
    fmt.header(&format!("Image {}", record.image_id));
    fmt.key_value("Page", record.page_url());
    if let Some(url) = &record.image_url {
        fmt.key_value("Image URL", url);
    }
    fmt.key_value("Author", record.author.as_deref().unwrap_or("Unknown"));

    fmt.blank();
    fmt.subheader("Model Information");
    fmt.key_value("Model", record.model.as_deref().unwrap_or("Unknown"));
    fmt.key_value("Model Version", record.model_version.as_deref().unwrap_or("Unknown"));
    fmt.key_value("Base Model", record.base_model.as_deref().unwrap_or("Unknown"));

    fmt.blank();
    fmt.subheader("Generation Parameters");
    fmt.key_value("Sampler", record.sampler.as_deref().unwrap_or("-"));
    fmt.key_value("Steps", opt(record.steps));
    fmt.key_value("CFG Scale", opt(record.cfg_scale));
    fmt.key_value("Seed", opt(record.seed));
    fmt.key_value("Clip Skip", opt(record.clip_skip));

    if !record.loras.is_empty() {
        fmt.blank();
        fmt.subheader("LoRAs");
        let rows: Vec<Vec<String>> = record
            .loras
            .iter()
            .map(|l| {
                vec![
                    l.name.clone(),
                    format!("{:.2}", l.weight),
                    l.model_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect();
        fmt.table(&["Name", "Model Weight", "Model ID"], &rows);
    }

    if !record.tags.is_empty() {
        fmt.blank();
        fmt.subheader("Tags");
        fmt.line(&format!("  {}", record.tags.join(", ")));
    }

    for (title, prompt, breakdown) in [
        ("Prompt", &record.prompt, positive),
        ("Negative Prompt", &record.negative_prompt, negative),
    ] {
        fmt.blank();
        fmt.subheader(title);
        if prompt.trim().is_empty() {
            fmt.line("  (empty)");
            continue;
        }
        fmt.line(&format!("  {}", one_line(prompt)));
        fmt.key_value("Style", breakdown.style);
        fmt.key_value("Concepts", breakdown.concepts.join(" | "));
        fmt.key_value("Phrases", breakdown.phrases.join(" | "));
    }

    fmt.blank();
    fmt.header("");
    fmt.into_string()
}

pub fn render_availability(result: &ModelAvailability, line_length: usize) -> String {
    let mut fmt = ConsoleFormatter::new(line_length);
    fmt.header(&format!("Model {}", result.model_id));
    if let Some(version) = result.model_version_id {
        fmt.key_value("Version", version);
    }
    let status = match result.available {
        Some(true) => "available",
        Some(false) => "unavailable",
        None => "unknown",
    };
    fmt.key_value("Availability", status);
    if let Some(model_status) = &result.status {
        fmt.key_value("Model status", model_status);
    }
    if let Some(error) = &result.error {
        fmt.key_value("Note", error);
    }
    fmt.key_value("Civitai", &result.civitai_url);
    if result.available != Some(true) {
        fmt.key_value("Archive", &result.archive_url);
    }
    fmt.header("");
    fmt.into_string()
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AggregateState, PromptAnalyzer, ReportBuilder};
    use crate::civitai::source::sample_records;

    #[test]
    fn test_width_helpers() {
        assert_eq!(display_width("abc"), 3);
        assert_eq!(display_width("日本"), 4);
        assert_eq!(truncate_to_width("日本語", 5), "日本");
        assert_eq!(truncate_to_width("hello", 10), "hello");
        assert_eq!(pad_to_width("日本", 6), "日本  ");
    }

    #[test]
    fn test_table_alignment() {
        let mut fmt = ConsoleFormatter::new(80);
        fmt.table(
            &["Name", "Count"],
            &[vec!["日本".to_string(), "1".to_string()], vec!["abcdef".to_string(), "10".to_string()]],
        );
        let out = fmt.into_string();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "  Name    Count");
        assert_eq!(lines[1], "  ------  -----");
        assert_eq!(lines[2], "  日本    1");
        assert_eq!(lines[3], "  abcdef  10");
    }

    #[test]
    fn test_table_fits_line_length() {
        let mut fmt = ConsoleFormatter::new(30);
        let long = "x".repeat(60);
        fmt.table(&["Name", "Count"], &[vec![long, "3".to_string()]]);
        for line in fmt.into_string().lines() {
            assert!(display_width(line) <= 30, "line too wide: {}", line);
        }
    }

    #[test]
    fn test_render_report_sections() {
        let records = sample_records();
        let state = AggregateState::from_records(&records, &PromptAnalyzer::default());
        let report = ReportBuilder::new(&state).collection(77, Some(50)).samples_from(&records).build();

        let narrow = render_report(&report, 80, false);
        assert!(narrow.contains("Collection 77 analysis"));
        assert!(narrow.contains("Top Positive Concepts"));
        assert!(narrow.contains("Detail Tweaker"));
        assert!(!narrow.contains("civitai.com/models/58390"));

        let wide = render_report(&report, 120, true);
        assert!(wide.contains("https://civitai.com/models/58390?modelVersionId=62833"));
    }

    #[test]
    fn test_render_empty_report() {
        let state = AggregateState::default();
        let report = ReportBuilder::new(&state).build();
        let out = render_report(&report, 80, false);
        assert!(out.contains("Images analyzed: 0"));
        assert!(out.contains("(none)"));
    }
}
