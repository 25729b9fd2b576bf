//! Builds a catalogue record for an uploaded file from what a contributor
//! types into the metadata form.

use crate::models::document::{DocumentContent, DocumentMetadata};
use chrono::{DateTime, Datelike, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

pub const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub const FLAG_IMAGE: &str = "/images/EN_Co-fundedbytheEU_RGB_POS.png";
pub const DEFAULT_SCALE: &str = "Regional (West Africa)";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("Please fill all required fields.")]
    MissingRequired,
    #[error("Please select at least one Country, one Theme and one Language.")]
    MissingSelection,
    #[error("month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),
}

/// Form input for one uploaded document. `month` is 1-based.
#[derive(Debug, Clone)]
pub struct DocumentDraft {
    pub title: String,
    pub description: String,
    pub month: u32,
    pub year: i32,
    pub countries: Vec<String>,
    pub themes: Vec<String>,
    pub langs: Vec<String>,
    pub scale: String,
}

impl DocumentDraft {
    /// Draft dated `now`, with the default scale and empty selections.
    pub fn new(title: impl Into<String>, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            month: now.month(),
            year: now.year(),
            countries: Vec::new(),
            themes: Vec::new(),
            langs: Vec::new(),
            scale: DEFAULT_SCALE.into(),
        }
    }

    /// Produce the record for `uploaded_key`, published at `now`.
    ///
    /// The document is filed under `uploads/{year}/{MM}/` with the uploaded
    /// file name; its thumbnail is the same path with `.pdf` swapped for `.png`.
    pub fn build(&self, uploaded_key: &str, now: DateTime<Utc>) -> Result<DocumentMetadata, DraftError> {
        if self.title.trim().is_empty() || self.description.trim().is_empty() {
            return Err(DraftError::MissingRequired);
        }
        if self.countries.is_empty() || self.themes.is_empty() || self.langs.is_empty() {
            return Err(DraftError::MissingSelection);
        }
        let month_label = month_label(self.month).ok_or(DraftError::InvalidMonth(self.month))?;

        let base_name = uploaded_key.rsplit('/').next().unwrap_or(uploaded_key);
        let target_key = format!("uploads/{}/{:02}/{}", self.year, self.month, base_name);
        let img_key = swap_pdf_extension(&target_key);

        let mut extra = Map::new();
        extra.insert("sourceKey".into(), Value::String(uploaded_key.to_string()));
        extra.insert("targetKey".into(), Value::String(target_key.clone()));

        Ok(DocumentMetadata {
            title: self.title.clone(),
            img: format!("/{}", img_key),
            flag: FLAG_IMAGE.into(),
            datecontent: format!("{} {}", month_label, self.year),
            bllink: format!("/documents/{}", slugify(&self.title)),
            permalink: format!("/{}", target_key),
            content: DocumentContent {
                published: format!("{} {}", MONTHS[now.month0() as usize], now.year()),
                description: self.description.clone(),
                countries: self.countries.join(", "),
                themes: self.themes.join(", "),
                scale: self.scale.clone(),
                langs: self.langs.join(", "),
            },
            extra,
        })
    }
}

fn month_label(month: u32) -> Option<&'static str> {
    MONTHS.get(month.checked_sub(1)? as usize).copied()
}

fn swap_pdf_extension(key: &str) -> String {
    match key.len().checked_sub(4) {
        Some(split) if key.is_char_boundary(split) && key[split..].eq_ignore_ascii_case(".pdf") => {
            format!("{}.png", &key[..split])
        }
        _ => key.to_string(),
    }
}

/// URL slug: lowercase ASCII alphanumerics separated by single hyphens.
/// Accented letters are folded to their base letter first.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let folded = input.nfd().filter(|c| !is_combining_mark(*c));
    for c in folded.flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "document".to_string()
    } else {
        slug.to_string()
    }
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036f}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 9, 30, 0).unwrap()
    }

    fn draft() -> DocumentDraft {
        DocumentDraft {
            title: "Sahel Food Crisis: 2024 Outlook".into(),
            description: "Cadre Harmonise results".into(),
            month: 3,
            year: 2024,
            countries: vec!["Mali".into(), "Niger".into()],
            themes: vec!["Food security".into()],
            langs: vec!["English".into(), "French".into()],
            scale: DEFAULT_SCALE.into(),
        }
    }

    #[test]
    fn builds_record_for_uploaded_key() {
        let doc = draft().build("1700000000000_report.pdf", now()).unwrap();

        assert_eq!(doc.img, "/uploads/2024/03/1700000000000_report.png");
        assert_eq!(doc.permalink, "/uploads/2024/03/1700000000000_report.pdf");
        assert_eq!(doc.bllink, "/documents/sahel-food-crisis-2024-outlook");
        assert_eq!(doc.datecontent, "March 2024");
        assert_eq!(doc.flag, FLAG_IMAGE);
        assert_eq!(doc.content.published, "April 2024");
        assert_eq!(doc.content.countries, "Mali, Niger");
        assert_eq!(doc.content.langs, "English, French");
        assert_eq!(doc.extra["sourceKey"], "1700000000000_report.pdf");
        assert_eq!(doc.extra["targetKey"], "uploads/2024/03/1700000000000_report.pdf");
    }

    #[test]
    fn non_pdf_keeps_its_extension_for_the_thumbnail() {
        let doc = draft().build("incoming/1700000000000_map.PNG", now()).unwrap();
        assert_eq!(doc.img, "/uploads/2024/03/1700000000000_map.PNG");
    }

    #[test]
    fn record_passes_recorder_validation() {
        let doc = draft().build("k.pdf", now()).unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert!(crate::models::document::missing_fields(&value).is_empty());
    }

    #[test]
    fn rejects_incomplete_drafts() {
        let mut d = draft();
        d.description = "  ".into();
        assert_eq!(d.build("k.pdf", now()).unwrap_err(), DraftError::MissingRequired);

        let mut d = draft();
        d.langs.clear();
        assert_eq!(d.build("k.pdf", now()).unwrap_err(), DraftError::MissingSelection);

        let mut d = draft();
        d.month = 13;
        assert_eq!(d.build("k.pdf", now()).unwrap_err(), DraftError::InvalidMonth(13));
    }

    #[test]
    fn new_draft_is_dated_now() {
        let d = DocumentDraft::new("t", "d", now());
        assert_eq!((d.month, d.year), (4, 2024));
        assert_eq!(d.scale, DEFAULT_SCALE);
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  --Rural/Urban  links-- "), "rural-urban-links");
        assert_eq!(slugify("!!!"), "document");
        assert_eq!(slugify(""), "document");
    }

    #[test]
    fn accented_titles_fold_to_base_letters() {
        assert_eq!(
            slugify("Sécurité alimentaire au Sahel"),
            "securite-alimentaire-au-sahel"
        );
        assert_eq!(slugify("Côte d'Ivoire: Élevage"), "cote-d-ivoire-elevage");
        assert_eq!(slugify("日本"), "document");
    }
}
