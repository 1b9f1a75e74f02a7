use std::collections::HashSet;
use std::path::Path;

use select::document::Document as HtmlDocument;
use select::predicate::Name;
use tracing::trace;

use crate::indexes::builder::{DocumentMetadata, ExtractedDocument};

use super::walker::{created_millis, modified_millis};

/// Per-file extraction failures. Counted into `files_failed`; a single
/// bad file never aborts the crawl.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported content type {mime} for {path}")]
    Unsupported { path: String, mime: String },
}

/// Turns a file on disk into an [`ExtractedDocument`]: MIME sniffing,
/// text conversion, lightweight metadata, language detection. The
/// content hash is computed downstream by the document builder.
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractError> {
        let io_err = |source| ExtractError::Io {
            path: path.display().to_string(),
            source,
        };
        let metadata = std::fs::metadata(path).map_err(io_err)?;
        let mime = sniff_mime(path);

        if !is_textual(&mime) {
            return Err(ExtractError::Unsupported {
                path: path.display().to_string(),
                mime,
            });
        }

        let bytes = std::fs::read(path).map_err(io_err)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        let (raw_text, doc_metadata) = if mime == "text/html" {
            extract_html(&text)
        } else if mime == "text/markdown" {
            (text.clone(), markdown_metadata(&text))
        } else {
            (text, DocumentMetadata::default())
        };

        let language = detect_language(&raw_text);
        trace!(path = %path.display(), %mime, ?language, "extracted");

        Ok(ExtractedDocument {
            file_path: path.to_path_buf(),
            file_size: metadata.len(),
            created_date: created_millis(&metadata),
            modified_date: modified_millis(&metadata),
            mime_type: mime,
            metadata: doc_metadata,
            raw_text,
            language,
        })
    }
}

/// Content sniffing first, extension fallback second.
fn sniff_mime(path: &Path) -> String {
    let by_extension = mime_by_extension(path);
    match tree_magic_mini::from_filepath(path) {
        // the sniffer reports generic text as text/plain; prefer the
        // extension's more specific type in that case
        Some("text/plain") | None => by_extension,
        Some(mime) => mime.to_owned(),
    }
}

fn mime_by_extension(path: &Path) -> String {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" | "xhtml" => "text/html",
        "xml" => "application/xml",
        "json" => "application/json",
        "yaml" | "yml" => "application/yaml",
        "csv" => "text/csv",
        "rs" | "java" | "py" | "js" | "ts" | "c" | "cpp" | "h" | "go" | "rb" | "sh" => {
            "text/x-source"
        }
        "pdf" => "application/pdf",
        "doc" | "docx" => "application/msword",
        _ => "application/octet-stream",
    }
    .to_owned()
}

fn is_textual(mime: &str) -> bool {
    mime.starts_with("text/")
        || matches!(
            mime,
            "application/xml" | "application/json" | "application/yaml" | "application/x-yaml"
        )
}

/// Strips markup, keeps `<title>` and the author/keywords/subject meta
/// tags.
fn extract_html(html: &str) -> (String, DocumentMetadata) {
    let document = HtmlDocument::from(html);
    let mut metadata = DocumentMetadata::default();

    if let Some(title) = document.find(Name("title")).next() {
        let title = title.text().trim().to_owned();
        if !title.is_empty() {
            metadata.title = Some(title);
        }
    }
    for meta in document.find(Name("meta")) {
        let (Some(name), Some(content)) = (meta.attr("name"), meta.attr("content")) else {
            continue;
        };
        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        match name.to_ascii_lowercase().as_str() {
            "author" => metadata.author.push(content.to_owned()),
            "keywords" => metadata.keywords = Some(content.to_owned()),
            "subject" => metadata.subject.push(content.to_owned()),
            "generator" => metadata.creator.push(content.to_owned()),
            _ => {}
        }
    }

    let mut text = String::new();
    for node in document.find(Name("body")) {
        collect_text(&node, &mut text);
    }
    if text.trim().is_empty() {
        // no body element, take everything outside script/style
        for node in document.find(Name("html")) {
            collect_text(&node, &mut text);
        }
    }
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (cleaned, metadata)
}

fn collect_text(node: &select::node::Node<'_>, out: &mut String) {
    if let Some(name) = node.name() {
        if name == "script" || name == "style" {
            return;
        }
    }
    if let Some(text) = node.as_text() {
        out.push_str(text);
        out.push(' ');
        return;
    }
    for child in node.children() {
        collect_text(&child, out);
    }
}

fn markdown_metadata(text: &str) -> DocumentMetadata {
    let title = text
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty());
    DocumentMetadata {
        title,
        ..Default::default()
    }
}

const EN_STOPWORDS: &[&str] = &[
    "the", "and", "is", "are", "was", "were", "of", "to", "in", "that", "it", "for", "with",
    "on", "this", "be", "not", "have", "has", "you",
];

const DE_STOPWORDS: &[&str] = &[
    "der", "die", "das", "und", "ist", "sind", "war", "wurde", "nicht", "ein", "eine", "mit",
    "für", "von", "auf", "dem", "den", "des", "im", "zu",
];

/// Stopword-profile language detection over the first few hundred
/// tokens. Returns an ISO-639-1 code only on a clear signal.
pub fn detect_language(text: &str) -> Option<String> {
    let en: HashSet<&str> = EN_STOPWORDS.iter().copied().collect();
    let de: HashSet<&str> = DE_STOPWORDS.iter().copied().collect();
    let mut en_hits = 0usize;
    let mut de_hits = 0usize;
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(500)
    {
        let lower = word.to_lowercase();
        if en.contains(lower.as_str()) {
            en_hits += 1;
        }
        if de.contains(lower.as_str()) {
            de_hits += 1;
        }
    }
    match (en_hits, de_hits) {
        (0, 0) => None,
        (en_hits, de_hits) if en_hits > de_hits => Some("en".to_owned()),
        (en_hits, de_hits) if de_hits > en_hits => Some("de".to_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_extraction_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "The signed contract is attached.").unwrap();

        let record = ContentExtractor.extract(&path).unwrap();
        assert_eq!(record.raw_text, "The signed contract is attached.");
        assert_eq!(record.mime_type, "text/plain");
        assert_eq!(record.language.as_deref(), Some("en"));
        assert!(record.modified_date > 0);
        assert_eq!(record.file_size, 32);
    }

    #[test]
    fn german_text_is_detected() {
        assert_eq!(
            detect_language("Der Arbeitsvertrag wurde von der Firma unterschrieben und ist gültig."),
            Some("de".to_owned())
        );
    }

    #[test]
    fn gibberish_has_no_language() {
        assert_eq!(detect_language("zzz qqq xxx"), None);
    }

    #[test]
    fn html_extraction_strips_tags_and_reads_meta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(
            &path,
            r#"<html><head><title>Quarterly Report</title>
               <meta name="author" content="Ada Lovelace">
               <meta name="keywords" content="finance, q3">
               <style>body { color: red }</style></head>
               <body><p>The figures are final.</p><script>var x=1;</script></body></html>"#,
        )
        .unwrap();

        let record = ContentExtractor.extract(&path).unwrap();
        assert_eq!(record.metadata.title.as_deref(), Some("Quarterly Report"));
        assert_eq!(record.metadata.author, vec!["Ada Lovelace"]);
        assert_eq!(record.metadata.keywords.as_deref(), Some("finance, q3"));
        assert_eq!(record.raw_text, "The figures are final.");
    }

    #[test]
    fn markdown_title_is_the_first_heading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "# Meeting Notes\n\nsome text here").unwrap();
        let record = ContentExtractor.extract(&path).unwrap();
        assert_eq!(record.metadata.title.as_deref(), Some("Meeting Notes"));
        assert_eq!(record.mime_type, "text/markdown");
    }

    #[test]
    fn binary_files_are_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, [0u8, 159, 146, 150, 0, 1, 2, 3]).unwrap();
        let err = ContentExtractor.extract(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported { .. }), "got {err:?}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ContentExtractor
            .extract(Path::new("/does/not/exist.txt"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }
}
