use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tantivy::schema::Document;

use crate::analysis::lemma::{LemmaEngines, LemmaLanguage};

use super::schema::{facet_path, DocFields};

/// Metadata pulled out of a file during extraction. Multi-valued fields
/// keep one entry per source value; blanks are dropped before they get
/// here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Vec<String>,
    pub creator: Vec<String>,
    pub subject: Vec<String>,
    pub keywords: Option<String>,
}

/// One extracted file, ready to become an index document.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub file_path: PathBuf,
    pub file_size: u64,
    /// Epoch milliseconds, taken from the file.
    pub created_date: i64,
    pub modified_date: i64,
    pub mime_type: String,
    pub metadata: DocumentMetadata,
    pub raw_text: String,
    /// ISO-639-1, when detection was confident.
    pub language: Option<String>,
}

impl ExtractedDocument {
    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn file_extension(&self) -> String {
        self.file_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// SHA-256 over the raw text bytes, hex encoded. The reconciliation skip
/// check compares these.
pub fn content_hash(raw_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Turns extracted records into index documents: storage classes per the
/// schema, facet values only for non-empty sources, every content shadow
/// populated from the same raw text.
pub struct DocumentBuilder {
    fields: DocFields,
    lemmas: Arc<LemmaEngines>,
}

impl DocumentBuilder {
    pub fn new(fields: DocFields, lemmas: Arc<LemmaEngines>) -> Self {
        Self { fields, lemmas }
    }

    pub fn fields(&self) -> &DocFields {
        &self.fields
    }

    pub fn build(&self, record: &ExtractedDocument) -> Document {
        let fields = &self.fields;
        let mut doc = Document::new();

        doc.add_text(fields.file_path, record.file_path.to_string_lossy());
        doc.add_text(fields.content_hash, content_hash(&record.raw_text));

        let file_name = record.file_name();
        if !file_name.is_empty() {
            doc.add_text(fields.file_name, &file_name);
        }
        let extension = record.file_extension();
        self.add_faceted(&mut doc, fields.file_extension, "file_extension", &extension);
        self.add_faceted(&mut doc, fields.file_type, "file_type", &record.mime_type);

        doc.add_u64(fields.file_size, record.file_size);
        doc.add_i64(fields.created_date, record.created_date);
        doc.add_i64(fields.modified_date, record.modified_date);
        doc.add_i64(fields.indexed_date, chrono::Utc::now().timestamp_millis());

        if let Some(title) = non_empty(record.metadata.title.as_deref()) {
            doc.add_text(fields.title, title);
        }
        for author in &record.metadata.author {
            self.add_faceted(&mut doc, fields.author, "author", author);
        }
        for creator in &record.metadata.creator {
            self.add_faceted(&mut doc, fields.creator, "creator", creator);
        }
        for subject in &record.metadata.subject {
            self.add_faceted(&mut doc, fields.subject, "subject", subject);
        }
        if let Some(keywords) = non_empty(record.metadata.keywords.as_deref()) {
            doc.add_text(fields.keywords, keywords);
        }
        if let Some(language) = non_empty(record.language.as_deref()) {
            self.add_faceted(&mut doc, fields.language, "language", language);
        }

        // same raw text in every shadow; the analyzers do the shaping
        doc.add_text(fields.content, &record.raw_text);
        doc.add_text(fields.content_reversed, &record.raw_text);
        doc.add_text(fields.content_translit_de, &record.raw_text);
        doc.add_text(
            fields.content_lemma_de,
            self.lemmas
                .index(LemmaLanguage::German)
                .lemma_text(&record.raw_text),
        );
        doc.add_text(
            fields.content_lemma_en,
            self.lemmas
                .index(LemmaLanguage::English)
                .lemma_text(&record.raw_text),
        );

        doc
    }

    fn add_faceted(
        &self,
        doc: &mut Document,
        field: tantivy::schema::Field,
        dimension: &str,
        value: &str,
    ) {
        let Some(value) = non_empty(Some(value)) else {
            return;
        };
        doc.add_text(field, value);
        doc.add_facet(self.fields.facet, facet_path(dimension, value));
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use tantivy::schema::Value;

    use super::*;

    fn record() -> ExtractedDocument {
        ExtractedDocument {
            file_path: PathBuf::from("/docs/contract.txt"),
            file_size: 42,
            created_date: 1_600_000_000_000,
            modified_date: 1_600_000_100_000,
            mime_type: "text/plain".into(),
            metadata: DocumentMetadata {
                title: Some("Contract".into()),
                author: vec!["Ada".into(), String::new()],
                creator: vec![],
                subject: vec!["legal".into()],
                keywords: None,
            },
            raw_text: "The signed contract is attached.".into(),
            language: Some("en".into()),
        }
    }

    fn builder() -> DocumentBuilder {
        DocumentBuilder::new(DocFields::new(), Arc::new(LemmaEngines::new(1024)))
    }

    #[test]
    fn content_hash_is_stable_sha256_hex() {
        let a = content_hash("same text");
        let b = content_hash("same text");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("other text"));
    }

    #[test]
    fn empty_values_produce_no_facets() {
        let b = builder();
        let doc = b.build(&record());
        let facets: Vec<String> = doc
            .get_all(b.fields().facet)
            .filter_map(|v| v.as_facet().map(|f| f.to_string()))
            .collect();
        assert!(facets.contains(&"/author/Ada".to_string()));
        assert!(facets.contains(&"/subject/legal".to_string()));
        assert!(facets.contains(&"/language/en".to_string()));
        assert!(facets.contains(&"/file_extension/txt".to_string()));
        // blank author dropped, no creator facet at all
        assert_eq!(facets.iter().filter(|f| f.starts_with("/author")).count(), 1);
        assert!(!facets.iter().any(|f| f.starts_with("/creator")));
    }

    #[test]
    fn every_content_shadow_is_populated() {
        let b = builder();
        let doc = b.build(&record());
        for field in [
            b.fields().content,
            b.fields().content_reversed,
            b.fields().content_translit_de,
            b.fields().content_lemma_de,
            b.fields().content_lemma_en,
        ] {
            assert!(doc.get_first(field).is_some());
        }
        let lemma_en = doc
            .get_first(b.fields().content_lemma_en)
            .and_then(|v| v.as_text())
            .unwrap();
        assert!(lemma_en.contains("sign"), "got {lemma_en:?}");
    }

    #[test]
    fn indexed_date_is_stamped_at_build_time() {
        let b = builder();
        let before = chrono::Utc::now().timestamp_millis();
        let doc = b.build(&record());
        let indexed = doc
            .get_first(b.fields().indexed_date)
            .and_then(|v| v.as_i64())
            .unwrap();
        assert!(indexed >= before);
    }
}
