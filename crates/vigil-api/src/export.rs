use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use chrono::NaiveDate;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument};
use uuid::Uuid;

use vigil_db::models::NewsRow;

use crate::auth::AppState;
use crate::error::{ApiError, join_error};

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 14.0;

const TITLE_SIZE: f32 = 20.0;
const BODY_SIZE: f32 = 12.0;

// Characters per line at the two font sizes, for a 182 mm text column.
const TITLE_WRAP: usize = 48;
const BODY_WRAP: usize = 88;

/// Single-article PDF, served as an attachment
/// named after the title. Same visibility as reading the article.
pub async fn export_article(
    State(state): State<AppState>,
    Path(news_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state.db.get_news(&news_id.to_string())?;
    let filename = attachment_filename(&row.title);

    // PDF assembly is CPU-bound; keep it off the async runtime.
    let bytes = tokio::task::spawn_blocking(move || render_pdf(&row))
        .await
        .map_err(join_error)??;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

fn render_pdf(article: &NewsRow) -> Result<Vec<u8>, ApiError> {
    let (doc, page, layer) = PdfDocument::new(&article.title, Mm(PAGE_W), Mm(PAGE_H), "content");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("font load failed: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("font load failed: {e}")))?;

    let mut writer = PageWriter {
        doc: &doc,
        layer: doc.get_page(page).get_layer(layer),
        y: PAGE_H - MARGIN - 6.0,
    };

    for line in wrap(&article.title, TITLE_WRAP) {
        writer.line(&line, &bold, TITLE_SIZE);
    }
    writer.gap(6.0);

    writer.line(&format!("Country: {}", article.country), &regular, BODY_SIZE);
    writer.line(
        &format!("Threat Actor: {}", article.threat_actor),
        &regular,
        BODY_SIZE,
    );
    writer.line(
        &format!("Case Date: {}", long_date(&article.case_date)),
        &regular,
        BODY_SIZE,
    );
    writer.gap(8.0);

    for line in wrap(&article.description, BODY_WRAP) {
        writer.line(&line, &regular, BODY_SIZE);
    }
    writer.gap(6.0);

    writer.line("IOC:", &bold, BODY_SIZE);
    for line in wrap(&article.ioc, BODY_WRAP) {
        writer.line(&line, &regular, BODY_SIZE);
    }
    writer.gap(6.0);

    writer.line("MITRE Attack:", &bold, BODY_SIZE);
    for line in wrap(&article.mitre_attack, BODY_WRAP) {
        writer.line(&line, &regular, BODY_SIZE);
    }

    if let Some(recommendation) = &article.recommendation {
        writer.gap(6.0);
        writer.line("Recommendation:", &bold, BODY_SIZE);
        for line in wrap(recommendation, BODY_WRAP) {
            writer.line(&line, &regular, BODY_SIZE);
        }
    }

    doc.save_to_bytes()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("pdf serialization failed: {e}")))
}

struct PageWriter<'a> {
    doc: &'a printpdf::PdfDocumentReference,
    layer: printpdf::PdfLayerReference,
    y: f32,
}

impl PageWriter<'_> {
    fn line(&mut self, text: &str, font: &IndirectFontRef, size: f32) {
        // pt -> mm line advance, with a little leading
        let step = size * 0.45;
        if self.y < MARGIN + step {
            let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "content");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_H - MARGIN;
        }
        self.layer.use_text(text, size, Mm(MARGIN), Mm(self.y), font);
        self.y -= step;
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }
}

/// Greedy word wrap. Words longer than the width get a line of their own
/// rather than being split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current = word.to_string();
            } else if current.len() + 1 + word.len() <= width {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_string();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

/// Calendar date in long US format, e.g. "March 5, 2024". Unparseable
/// input is passed through untouched.
fn long_date(case_date: &str) -> String {
    match NaiveDate::parse_from_str(case_date, "%Y-%m-%d") {
        Ok(date) => date.format("%B %-d, %Y").to_string(),
        Err(_) => case_date.to_string(),
    }
}

fn attachment_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '"' | '\\' | '/' | '\n' | '\r'))
        .collect();
    format!("{}.pdf", cleaned.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_respects_width_and_paragraphs() {
        let lines = wrap("alpha beta gamma delta", 11);
        assert_eq!(lines, vec!["alpha beta", "gamma delta"]);

        let lines = wrap("one\ntwo three", 20);
        assert_eq!(lines, vec!["one", "two three"]);
    }

    #[test]
    fn wrap_keeps_overlong_words_whole() {
        let lines = wrap("short 45.153.186.12/aaaaaaaaaaaaaaaaaaaaaaa end", 10);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "short");
        assert_eq!(lines[2], "end");
    }

    #[test]
    fn long_date_formats_us_style() {
        assert_eq!(long_date("2024-03-05"), "March 5, 2024");
        assert_eq!(long_date("not-a-date"), "not-a-date");
    }

    #[test]
    fn filename_is_derived_from_title() {
        assert_eq!(
            attachment_filename("Emotet \"wave\" hits EU"),
            "Emotet wave hits EU.pdf"
        );
    }
}
