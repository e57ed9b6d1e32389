use super::*;
use crate::Document;

fn minimal_pdf() -> Vec<u8> {
    let body = "%PDF-1.5\n\
1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n\
3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>\nendobj\n";
    let xref_start = body.len();
    let tail = format!(
        "xref\n0 4\n0000000000 65535 f \n0000000009 00000 n \n0000000060 00000 n \n0000000117 00000 n \ntrailer\n<< /Size 4 /Root 1 0 R >>\nstartxref\n{xref_start}\n%%EOF"
    );
    let mut out = body.into_bytes();
    out.extend(tail.into_bytes());
    out
}

#[test]
fn load_document() {
    let doc = Document::load_mem(&minimal_pdf()).unwrap();
    assert_eq!(doc.version, "1.5");
    assert_eq!(doc.get_pages().len(), 1);
}

#[test]
#[should_panic(expected = "Xref(Start)")]
fn load_short_document() {
    let _doc = Document::load_mem(b"%PDF-1.5\n%%EOF\n").unwrap();
}

#[test]
fn load_document_with_preceding_bytes() {
    let mut content = Vec::new();
    content.extend(b"garbage");
    content.extend(minimal_pdf());
    let doc = Document::load_mem(&content).unwrap();
    assert_eq!(doc.version, "1.5");
}

fn doc_with_embedded_string(content: &str) -> String {
    const STREAM_CRUFT: usize = 33;
    let doc = format!(
        "%PDF-1.5\n\
1 0 obj<</Type/Pages/Kids[5 0 R]/Count 1/Resources 3 0 R/MediaBox[0 0 595 842]>>endobj\n\
2 0 obj<</Type/Font/Subtype/Type1/BaseFont/Courier>>endobj\n\
3 0 obj<</Font<</F1 2 0 R>>>>endobj\n\
5 0 obj<</Type/Page/Parent 1 0 R/Contents[4 0 R]>>endobj\n\
6 0 obj<</Type/Catalog/Pages 1 0 R>>endobj\n\
4 0 obj<</Length {}>>stream\nBT\n/F1 48 Tf\n100 600 Td\n({}) Tj\nET\nendstream endobj\n",
        content.len() + STREAM_CRUFT,
        content
    );
    format!(
        "{}xref\n0 7\n0000000000 65535 f \n0000000009 00000 n \n0000000096 00000 n \n0000000155 00000 n \n0000000291 00000 n \n0000000191 00000 n \n0000000248 00000 n \ntrailer\n<</Root 6 0 R/Size 7>>\nstartxref\n{}\n%%EOF",
        doc,
        doc.len()
    )
}

#[test]
fn load_many_shallow_brackets() {
    let content: String = std::iter::repeat("()").take(MAX_BRACKET * 10).flat_map(|x| x.chars()).collect();
    let doc = doc_with_embedded_string(&content);
    let _doc = Document::load_mem(doc.as_bytes()).unwrap();
}

#[test]
fn load_too_deep_brackets() {
    let content: Vec<u8> =
        std::iter::repeat(b'(').take(MAX_BRACKET + 1).chain(std::iter::repeat(b')').take(MAX_BRACKET + 1)).collect();
    let content = String::from_utf8(content).unwrap();
    let doc = doc_with_embedded_string(&content);
    // The over-nested literal string fails to parse as a string token, so the
    // page's Contents stream falls back to whatever recovery finds; loading
    // itself must not hang or stack-overflow.
    let _doc = Document::load_mem(doc.as_bytes());
}

#[test]
fn search_substring_finds_last_occurrence() {
    assert_eq!(Reader::search_substring(b"hello world", b"xyz", 0), None);
    assert_eq!(Reader::search_substring(b"hello world", b"world", 0), Some(6));

    let buffer = b"%%EOF\ntest%%EOF\nend";
    assert_eq!(Reader::search_substring(buffer, b"%%EOF", 0), Some(10));
    assert_eq!(Reader::search_substring(buffer, b"%%EOF", 6), Some(10));
    assert_eq!(Reader::search_substring(buffer, b"%%EOF", 15), None);
    assert_eq!(Reader::search_substring(b"%%EOF", b"%%EOF", 0), Some(0));

    let buffer_with_many_percents = b"%%%PDF-1.3%%%comment%%%more%%EOF";
    assert_eq!(Reader::search_substring(buffer_with_many_percents, b"%%EOF", 0), Some(27));
}

#[test]
fn load_metadata_without_loading_full_document() {
    let metadata = Document::load_metadata_mem(&minimal_pdf()).unwrap();
    assert_eq!(metadata.version, "1.5");
    assert_eq!(metadata.page_count, 1);
}

#[test]
fn detects_linearized_documents() {
    let body = "%PDF-1.5\n1 0 obj\n<< /Linearized 1 /L 1234 >>\nendobj\n";
    assert!(Reader::detect_linearized(body.as_bytes()));
    assert!(!Reader::detect_linearized(minimal_pdf().as_slice()));
}
