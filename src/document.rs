use std::{io::Cursor, sync::Arc};

use bytes::Bytes;
use tokio::task;
use tracing::{debug, info, warn};

use crate::{
    error::{ExtractionError, ServiceError},
    generation::GenerationService,
    model::{ContextMode, DocumentQuestion, GenerationResult},
};

pub const SUMMARY_CHAR_BUDGET: usize = 4000;
pub const TRUNCATION_MARKER: &str = "\n\n[... document truncated ...]";

pub trait DocumentExtractor: Send + Sync {
    fn supports_format(&self, filename: &str) -> bool;

    fn extract(&self, content: &[u8]) -> Result<String, ExtractionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl DocumentExtractor for PdfExtractor {
    fn supports_format(&self, filename: &str) -> bool {
        filename.to_lowercase().ends_with(".pdf")
    }

    fn extract(&self, content: &[u8]) -> Result<String, ExtractionError> {
        let reader = oxidize_pdf::parser::reader::PdfReader::new(Cursor::new(content.to_vec()))
            .map_err(|e| ExtractionError::Parse(e.to_string()))?;
        let doc = oxidize_pdf::parser::document::PdfDocument::new(reader);
        let page_count = doc
            .page_count()
            .map_err(|e| ExtractionError::Parse(format!("failed to read page count: {e}")))?;
        debug!(pages = page_count, "extracting PDF text");

        let mut parts = Vec::new();
        for index in 0..page_count {
            match doc.extract_text_from_page(index) {
                Ok(extracted) if !extracted.text.trim().is_empty() => {
                    parts.push(format!("--- Page {} ---\n{}", index + 1, extracted.text));
                }
                Ok(_) => {}
                // Image-only pages fail here; the rest of the document is still usable.
                Err(e) => warn!(page = index + 1, error = %e, "skipping page with extraction error"),
            }
        }
        Ok(parts.join("\n\n"))
    }
}

#[derive(Clone)]
pub struct DocumentService {
    generation: GenerationService,
    extractor: Arc<dyn DocumentExtractor>,
}

impl DocumentService {
    pub fn new(generation: GenerationService, extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self {
            generation,
            extractor,
        }
    }

    pub async fn answer(
        &self,
        question: DocumentQuestion,
        filename: &str,
        content: Bytes,
    ) -> Result<GenerationResult, ServiceError> {
        if !self.extractor.supports_format(filename) {
            return Err(ExtractionError::UnsupportedFormat(filename.to_string()).into());
        }
        if content.is_empty() {
            return Err(ExtractionError::EmptyDocument.into());
        }
        question.validate()?;
        info!(file = filename, bytes = content.len(), "processing document question");

        let extractor = self.extractor.clone();
        let text = task::spawn_blocking(move || extractor.extract(&content))
            .await
            .map_err(|err| ServiceError::Internal(format!("extraction task failed: {err}")))??;
        info!(file = filename, chars = text.chars().count(), "document text extracted");

        let prompt = compose_prompt(&question.question, &text, question.context_mode);
        debug!(prompt_chars = prompt.len(), "document prompt composed");

        let request = question.into_generation_request(prompt);
        self.generation.generate(&request).await
    }
}

pub fn compose_prompt(question: &str, document: &str, mode: ContextMode) -> String {
    let context = match mode {
        ContextMode::Summary => truncate(document, SUMMARY_CHAR_BUDGET),
        ContextMode::Full | ContextMode::Smart => document.to_string(),
    };

    format!(
        "Based on the following document content, please answer the question.\n\nDocument Content:\n{context}\n\nQuestion: {question}\n\nAnswer:"
    )
}

fn truncate(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => {
            debug!(budget, "document text truncated");
            format!("{}{TRUNCATION_MARKER}", &text[..cut])
        }
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{generation::testing::ScriptedProvider, model::ProviderRegistry};

    struct StubExtractor {
        text: Result<String, String>,
        calls: AtomicUsize,
    }

    impl StubExtractor {
        fn returning(text: &str) -> Arc<Self> {
            Arc::new(Self {
                text: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl DocumentExtractor for StubExtractor {
        fn supports_format(&self, filename: &str) -> bool {
            PdfExtractor.supports_format(filename)
        }

        fn extract(&self, _content: &[u8]) -> Result<String, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.text.clone().map_err(ExtractionError::Parse)
        }
    }

    fn service(extractor: Arc<StubExtractor>) -> (DocumentService, ScriptedProvider) {
        let provider =
            ScriptedProvider::new("llama2", &["llama2:latest"]).with_script(vec![Ok("42")]);
        let generation = GenerationService::new(ProviderRegistry::new(Arc::new(provider.clone())));
        (DocumentService::new(generation, extractor), provider)
    }

    #[test]
    fn full_mode_embeds_everything() {
        let document = "x".repeat(5000);
        let prompt = compose_prompt("Why?", &document, ContextMode::Full);
        assert!(prompt.contains(&document));
        assert!(!prompt.contains(TRUNCATION_MARKER));
        assert!(prompt.ends_with("Question: Why?\n\nAnswer:"));
    }

    #[test]
    fn smart_mode_behaves_like_full() {
        let document = "y".repeat(4500);
        assert_eq!(
            compose_prompt("q", &document, ContextMode::Smart),
            compose_prompt("q", &document, ContextMode::Full)
        );
    }

    #[test]
    fn summary_mode_truncates_long_documents() {
        let document = format!("{}{}", "a".repeat(4000), "b".repeat(10));
        let prompt = compose_prompt("q", &document, ContextMode::Summary);
        let expected = format!("{}{TRUNCATION_MARKER}", "a".repeat(4000));
        assert!(prompt.contains(&expected));
        assert!(!prompt.contains("ab"));
    }

    #[test]
    fn summary_mode_keeps_short_documents() {
        let document = "c".repeat(4000);
        let prompt = compose_prompt("q", &document, ContextMode::Summary);
        assert!(prompt.contains(&document));
        assert!(!prompt.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let document = "é".repeat(4001);
        let truncated = truncate(&document, SUMMARY_CHAR_BUDGET);
        assert_eq!(
            truncated.chars().count(),
            4000 + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn pdf_extension_check_is_case_insensitive() {
        assert!(PdfExtractor.supports_format("Report.PDF"));
        assert!(!PdfExtractor.supports_format("notes.txt"));
        assert!(!PdfExtractor.supports_format("pdf"));
    }

    fn sample_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = oxidize_pdf::Document::new();
        for text in pages {
            let mut page = oxidize_pdf::Page::a4();
            if !text.is_empty() {
                page.text()
                    .set_font(oxidize_pdf::Font::Helvetica, 12.0)
                    .at(50.0, 750.0)
                    .write(text)
                    .unwrap();
            }
            doc.add_page(page);
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.pdf");
        doc.save(&path).unwrap();
        std::fs::read(&path).unwrap()
    }

    #[test]
    fn pages_are_labelled_and_blank_pages_skipped() {
        let pdf = sample_pdf(&["Quarterly revenue grew", "", "Costs fell"]);
        let text = PdfExtractor.extract(&pdf).unwrap();

        assert!(text.starts_with("--- Page 1 ---\n"));
        assert!(text.contains("Quarterly revenue grew"));
        assert!(!text.contains("--- Page 2 ---"));
        assert!(text.contains("\n\n--- Page 3 ---\n"));
        assert!(text.contains("Costs fell"));
        let first = text.find("Quarterly").unwrap();
        let third = text.find("--- Page 3 ---").unwrap();
        assert!(first < third);
    }

    #[test]
    fn garbage_bytes_fail_extraction() {
        assert!(matches!(
            PdfExtractor.extract(b"definitely not a pdf"),
            Err(ExtractionError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_before_extraction() {
        let extractor = StubExtractor::returning("text");
        let (svc, provider) = service(extractor.clone());
        let err = svc
            .answer(DocumentQuestion::new("q"), "notes.txt", Bytes::from_static(b"abc"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Extraction(ExtractionError::UnsupportedFormat(_))
        ));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let extractor = StubExtractor::returning("text");
        let (svc, _) = service(extractor.clone());
        let err = svc
            .answer(DocumentQuestion::new("q"), "a.pdf", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Extraction(ExtractionError::EmptyDocument)
        ));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn answers_from_extracted_text() {
        let extractor = StubExtractor::returning("The answer is 42.");
        let (svc, provider) = service(extractor.clone());
        let result = svc
            .answer(
                DocumentQuestion::new("What is the answer?"),
                "facts.pdf",
                Bytes::from_static(b"%PDF-1.4"),
            )
            .await
            .unwrap();
        assert_eq!(result.generated_text, "42");
        assert!(result.prompt.contains("Document Content:\nThe answer is 42."));
        assert!(result.prompt.contains("Question: What is the answer?"));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn extraction_failure_is_surfaced() {
        let extractor = Arc::new(StubExtractor {
            text: Err("broken xref table".into()),
            calls: AtomicUsize::new(0),
        });
        let (svc, provider) = service(extractor);
        let err = svc
            .answer(DocumentQuestion::new("q"), "a.pdf", Bytes::from_static(b"%PDF"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Extraction(ExtractionError::Parse(_))));
        assert_eq!(provider.calls(), 0);
    }
}
