use tantivy::schema::{
    Facet, FacetOptions, Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST,
    INDEXED, STORED, STRING,
};

use crate::analysis;

/// Monotonically numbered index schema version. Bump whenever the indexed
/// field shape changes; a committed index carrying a different number is
/// flagged for full reindex on open.
pub const SCHEMA_VERSION: u32 = 3;

/// Facet dimensions carried by every document, in the order they are
/// reported. The query planner consults this table so drill-sideways and
/// the builder agree on which dimensions exist.
pub const FACET_DIMENSIONS: &[FacetDimension] = &[
    FacetDimension { name: "author", multi_valued: true },
    FacetDimension { name: "creator", multi_valued: true },
    FacetDimension { name: "subject", multi_valued: true },
    FacetDimension { name: "language", multi_valued: false },
    FacetDimension { name: "file_extension", multi_valued: false },
    FacetDimension { name: "file_type", multi_valued: false },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacetDimension {
    pub name: &'static str,
    pub multi_valued: bool,
}

pub fn facet_dimension(name: &str) -> Option<&'static FacetDimension> {
    FACET_DIMENSIONS.iter().find(|dim| dim.name == name)
}

/// How a field is stored and what filters it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    /// Tokenized text, match-only. No exact filtering.
    AnalyzedText,
    /// Tokenized text that is also a facet dimension; exact filtering
    /// happens through the facet.
    AnalyzedFaceted,
    /// Untokenized string, exact-match filterable.
    ExactString,
    /// Integer point, range- and exact-filterable.
    NumericPoint,
    /// Epoch-millisecond point, range- and exact-filterable.
    DatePoint,
}

impl FieldClass {
    pub fn supports_term_operators(self) -> bool {
        !matches!(self, FieldClass::AnalyzedText)
    }

    pub fn supports_range(self) -> bool {
        matches!(self, FieldClass::NumericPoint | FieldClass::DatePoint)
    }

    pub fn describe(self) -> &'static str {
        match self {
            FieldClass::AnalyzedText => "analyzed text",
            FieldClass::AnalyzedFaceted => "analyzed text + facet",
            FieldClass::ExactString => "exact string",
            FieldClass::NumericPoint => "numeric point",
            FieldClass::DatePoint => "date point (epoch millis)",
        }
    }
}

/// A schema for indexing one personal document collection, one tantivy
/// document per file on disk.
#[derive(Clone)]
pub struct DocFields {
    pub schema: Schema,

    /// Absolute path, the unique document identity.
    pub file_path: Field,
    /// SHA-256 over the raw extracted text; drives upsert skip.
    pub content_hash: Field,

    pub file_name: Field,
    pub file_extension: Field,
    pub file_type: Field,
    pub file_size: Field,

    /// Epoch milliseconds.
    pub created_date: Field,
    pub modified_date: Field,
    pub indexed_date: Field,

    pub title: Field,
    pub author: Field,
    pub creator: Field,
    pub subject: Field,
    pub keywords: Field,
    pub language: Field,

    /// Primary token view plus its shadow views, all derived from the
    /// same raw text and differing only in analyzer.
    pub content: Field,
    pub content_reversed: Field,
    pub content_lemma_de: Field,
    pub content_lemma_en: Field,
    pub content_translit_de: Field,

    /// Single facet field holding `/dimension/value` paths for every
    /// dimension in [`FACET_DIMENSIONS`].
    pub facet: Field,
}

impl DocFields {
    pub fn new() -> Self {
        let mut builder = Schema::builder();

        let analyzed = |tokenizer: &str| {
            TextOptions::default().set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(tokenizer)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
        };
        let analyzed_stored = |tokenizer: &str| analyzed(tokenizer).set_stored();

        let file_path = builder.add_text_field("file_path", STRING | STORED);
        let content_hash = builder.add_text_field("content_hash", STRING | STORED);

        let file_name = builder.add_text_field("file_name", analyzed_stored(analysis::UNICODE));
        let file_extension =
            builder.add_text_field("file_extension", analyzed_stored(analysis::UNICODE));
        let file_type = builder.add_text_field("file_type", analyzed_stored(analysis::UNICODE));
        let file_size = builder.add_u64_field("file_size", INDEXED | STORED | FAST);

        let created_date = builder.add_i64_field("created_date", INDEXED | STORED | FAST);
        let modified_date = builder.add_i64_field("modified_date", INDEXED | STORED | FAST);
        let indexed_date = builder.add_i64_field("indexed_date", INDEXED | STORED | FAST);

        let title = builder.add_text_field("title", analyzed_stored(analysis::UNICODE));
        let author = builder.add_text_field("author", analyzed_stored(analysis::UNICODE));
        let creator = builder.add_text_field("creator", analyzed_stored(analysis::UNICODE));
        let subject = builder.add_text_field("subject", analyzed_stored(analysis::UNICODE));
        let keywords = builder.add_text_field("keywords", analyzed_stored(analysis::UNICODE));
        let language = builder.add_text_field("language", analyzed_stored(analysis::UNICODE));

        let content = builder.add_text_field("content", analyzed_stored(analysis::UNICODE));
        let content_reversed =
            builder.add_text_field("content_reversed", analyzed(analysis::UNICODE_REVERSED));
        let content_lemma_de =
            builder.add_text_field("content_lemma_de", analyzed(analysis::UNICODE));
        let content_lemma_en =
            builder.add_text_field("content_lemma_en", analyzed(analysis::UNICODE));
        let content_translit_de =
            builder.add_text_field("content_translit_de", analyzed(analysis::GERMAN_TRANSLIT));

        let facet = builder.add_facet_field("facet", FacetOptions::default());

        Self {
            schema: builder.build(),
            file_path,
            content_hash,
            file_name,
            file_extension,
            file_type,
            file_size,
            created_date,
            modified_date,
            indexed_date,
            title,
            author,
            creator,
            subject,
            keywords,
            language,
            content,
            content_reversed,
            content_lemma_de,
            content_lemma_en,
            content_translit_de,
            facet,
        }
    }

    /// Storage class by public field name; `None` for internal shadow
    /// fields and unknown names.
    pub fn field_class(name: &str) -> Option<FieldClass> {
        Some(match name {
            "content" | "title" | "keywords" | "file_name" => FieldClass::AnalyzedText,
            "author" | "creator" | "subject" | "language" | "file_extension" | "file_type" => {
                FieldClass::AnalyzedFaceted
            }
            "file_path" | "content_hash" => FieldClass::ExactString,
            "file_size" => FieldClass::NumericPoint,
            "created_date" | "modified_date" | "indexed_date" => FieldClass::DatePoint,
            _ => return None,
        })
    }

    /// The analyzer name a field is indexed with.
    pub fn analyzer_for(name: &str) -> &'static str {
        match name {
            "content_reversed" => analysis::UNICODE_REVERSED,
            "content_translit_de" => analysis::GERMAN_TRANSLIT,
            _ => analysis::UNICODE,
        }
    }

    pub fn field_by_name(&self, name: &str) -> Option<Field> {
        self.schema.get_field(name).ok()
    }

    pub fn date_field_names() -> &'static [&'static str] {
        &["created_date", "modified_date", "indexed_date"]
    }
}

impl Default for DocFields {
    fn default() -> Self {
        Self::new()
    }
}

/// Facet path for one dimension value, e.g. `/language/de`.
pub fn facet_path(dimension: &str, value: &str) -> Facet {
    Facet::from_path([dimension, value])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_exposes_every_public_field() {
        let fields = DocFields::new();
        for name in [
            "file_path",
            "content_hash",
            "file_name",
            "file_extension",
            "file_type",
            "file_size",
            "created_date",
            "modified_date",
            "indexed_date",
            "title",
            "author",
            "creator",
            "subject",
            "keywords",
            "language",
            "content",
            "content_reversed",
            "content_lemma_de",
            "content_lemma_en",
            "content_translit_de",
            "facet",
        ] {
            assert!(fields.field_by_name(name).is_some(), "missing field {name}");
        }
    }

    #[test]
    fn facet_dimensions_have_field_counterparts() {
        let fields = DocFields::new();
        for dim in FACET_DIMENSIONS {
            assert!(fields.field_by_name(dim.name).is_some());
            assert_eq!(
                DocFields::field_class(dim.name),
                Some(FieldClass::AnalyzedFaceted)
            );
        }
    }

    #[test]
    fn content_is_analyzed_only() {
        let class = DocFields::field_class("content").unwrap();
        assert!(!class.supports_term_operators());
        assert!(!class.supports_range());
    }

    #[test]
    fn date_fields_support_range() {
        for name in DocFields::date_field_names() {
            assert!(DocFields::field_class(name).unwrap().supports_range());
        }
    }

    #[test]
    fn facet_paths_nest_dimension_then_value() {
        assert_eq!(facet_path("language", "de").to_string(), "/language/de");
    }
}
