//! Attachment handling: document text extraction and image encoding.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Plain-text document extensions read verbatim. PDFs are handled
/// separately through a real extractor.
pub const TEXT_EXTENSIONS: [&str; 11] = [
    "txt", "md", "json", "csv", "xml", "html", "css", "js", "ts", "py", "sh",
];

/// Lowercased extension of a file name, without the dot.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

pub fn is_supported_document(extension: &str) -> bool {
    extension == "pdf" || TEXT_EXTENSIONS.contains(&extension)
}

/// Dotted list of accepted extensions, for user-facing messages.
pub fn supported_formats() -> String {
    let mut formats = vec![".pdf".to_string()];
    formats.extend(TEXT_EXTENSIONS.iter().map(|ext| format!(".{ext}")));
    formats.join(", ")
}

/// Extract readable text from a downloaded document.
///
/// PDFs go through the extractor; text formats are decoded lossily so a
/// stray invalid byte does not reject the whole file.
pub fn extract_document_text(bytes: &[u8], file_name: &str) -> Result<String> {
    let extension = extension_of(file_name).unwrap_or_default();

    if extension == "pdf" {
        return pdf_extract::extract_text_from_mem(bytes)
            .map_err(|err| anyhow!("failed to extract text from {file_name}: {err}"));
    }

    if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }

    bail!("unsupported document format: {file_name}");
}

/// Telegram serves photos as JPEG, so the data URI is always image/jpeg.
pub fn image_data_uri(bytes: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))
}
