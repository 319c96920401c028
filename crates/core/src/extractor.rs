use crate::error::ExtractError;
use flate2::read::DeflateDecoder;
use lopdf::Document as PdfDocument;
use regex::Regex;
use std::io::Read;
use std::path::Path;

/// Text pulled out of a stored file, plus the page count when the
/// format knows one.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub text: String,
    pub page_count: Option<u32>,
}

impl ExtractedContent {
    fn text_only(text: String) -> Self {
        Self {
            text,
            page_count: None,
        }
    }
}

/// Map a stored file and its declared content type to plain text.
///
/// Dispatch is a case-insensitive substring match on the declared type:
/// pdf, word/doc (further split on the `.docx` / `.doc` extension), and
/// text/plain. Anything else is an unsupported format — permanent for
/// the document, never retried.
pub fn extract_content(path: &Path, declared_content_type: &str) -> Result<ExtractedContent, ExtractError> {
    let content_type = declared_content_type.to_lowercase();

    if content_type.contains("pdf") {
        extract_pdf(path)
    } else if content_type.contains("word") || content_type.contains("doc") {
        extract_word(path)
    } else if content_type.contains("text") || content_type.contains("plain") {
        extract_plain(path)
    } else {
        Err(ExtractError::UnsupportedFormat(
            declared_content_type.to_string(),
        ))
    }
}

fn extract_plain(path: &Path) -> Result<ExtractedContent, ExtractError> {
    let bytes = std::fs::read(path)?;
    Ok(ExtractedContent::text_only(
        String::from_utf8_lossy(&bytes).into_owned(),
    ))
}

fn extract_pdf(path: &Path) -> Result<ExtractedContent, ExtractError> {
    let document =
        PdfDocument::load(path).map_err(|error| ExtractError::PdfParse(error.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| ExtractError::PdfParse(error.to_string()))?;
        pages.push(text);
    }

    let page_count = pages.len() as u32;
    Ok(ExtractedContent {
        text: pages.join("\n"),
        page_count: Some(page_count),
    })
}

fn extract_word(path: &Path) -> Result<ExtractedContent, ExtractError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_lowercase())
        .unwrap_or_default();

    if file_name.ends_with(".docx") {
        extract_docx(path)
    } else if file_name.ends_with(".doc") {
        extract_legacy_doc(path)
    } else {
        Err(ExtractError::UnsupportedFormat(format!(
            "unsupported word format: {file_name}"
        )))
    }
}

// --- .docx: ZIP container holding word/document.xml -------------------

fn extract_docx(path: &Path) -> Result<ExtractedContent, ExtractError> {
    let bytes = std::fs::read(path)?;
    let xml = docx_document_xml(&bytes)?;
    let text = docx_text_runs(&String::from_utf8_lossy(&xml));
    Ok(ExtractedContent::text_only(text))
}

fn le_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let slice = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([slice[0], slice[1]]))
}

fn le_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Pull the raw bytes of `word/document.xml` out of the ZIP container.
/// Walks the central directory (local headers lie about sizes when the
/// writer streamed with data descriptors), then inflates stored or
/// DEFLATE entries.
fn docx_document_xml(bytes: &[u8]) -> Result<Vec<u8>, ExtractError> {
    const EOCD_SIG: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
    const CENTRAL_SIG: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];

    if bytes.len() < 22 {
        return Err(ExtractError::DocxParse("file too short for a zip".to_string()));
    }

    let scan_floor = bytes.len().saturating_sub(22 + u16::MAX as usize);
    let eocd = (scan_floor..=bytes.len() - 22)
        .rev()
        .find(|&offset| bytes[offset..offset + 4] == EOCD_SIG)
        .ok_or_else(|| ExtractError::DocxParse("zip end-of-directory missing".to_string()))?;

    let mut cursor = le_u32(bytes, eocd + 16)
        .ok_or_else(|| ExtractError::DocxParse("truncated end-of-directory".to_string()))?
        as usize;

    while bytes.get(cursor..cursor + 4) == Some(CENTRAL_SIG.as_slice()) {
        let method = le_u16(bytes, cursor + 10);
        let comp_size = le_u32(bytes, cursor + 20);
        let name_len = le_u16(bytes, cursor + 28);
        let extra_len = le_u16(bytes, cursor + 30);
        let comment_len = le_u16(bytes, cursor + 32);
        let local_offset = le_u32(bytes, cursor + 42);

        let (Some(method), Some(comp_size), Some(name_len), Some(extra_len), Some(comment_len), Some(local_offset)) =
            (method, comp_size, name_len, extra_len, comment_len, local_offset)
        else {
            return Err(ExtractError::DocxParse("truncated central directory".to_string()));
        };

        let name_start = cursor + 46;
        let name = bytes
            .get(name_start..name_start + name_len as usize)
            .ok_or_else(|| ExtractError::DocxParse("truncated entry name".to_string()))?;

        if name == b"word/document.xml" {
            // The local header has its own (possibly different) extra field.
            let local = local_offset as usize;
            let local_name_len = le_u16(bytes, local + 26);
            let local_extra_len = le_u16(bytes, local + 28);
            let (Some(local_name_len), Some(local_extra_len)) = (local_name_len, local_extra_len)
            else {
                return Err(ExtractError::DocxParse("truncated local header".to_string()));
            };

            let data_start = local + 30 + local_name_len as usize + local_extra_len as usize;
            let data = bytes
                .get(data_start..data_start + comp_size as usize)
                .ok_or_else(|| ExtractError::DocxParse("truncated entry data".to_string()))?;

            return match method {
                0 => Ok(data.to_vec()),
                8 => {
                    let mut inflated = Vec::new();
                    DeflateDecoder::new(data)
                        .read_to_end(&mut inflated)
                        .map_err(|error| ExtractError::DocxParse(error.to_string()))?;
                    Ok(inflated)
                }
                other => Err(ExtractError::DocxParse(format!(
                    "unsupported zip compression method {other}"
                ))),
            };
        }

        cursor = name_start + name_len as usize + extra_len as usize + comment_len as usize;
    }

    Err(ExtractError::DocxParse(
        "word/document.xml not present in archive".to_string(),
    ))
}

/// Flatten the WordprocessingML body: one line per paragraph, text runs
/// concatenated in document order, entities unescaped.
fn docx_text_runs(xml: &str) -> String {
    // `<w:t>` or `<w:t xml:space=...>`, but never `<w:tab/>`.
    let run = Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").expect("static pattern");

    let mut lines = Vec::new();
    for paragraph in xml.split("</w:p>") {
        let mut line = String::new();
        for capture in run.captures_iter(paragraph) {
            line.push_str(&capture[1]);
        }
        if !line.trim().is_empty() {
            lines.push(unescape_xml(&line));
        }
    }
    lines.join("\n")
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// --- legacy .doc: OLE compound file ----------------------------------

const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Word 97 binary layout. The text lives in the WordDocument stream as
/// UTF-16LE or code-page runs; this routine validates the compound-file
/// signature and scans for printable runs rather than replaying the
/// full FIB piece table.
fn extract_legacy_doc(path: &Path) -> Result<ExtractedContent, ExtractError> {
    let bytes = std::fs::read(path)?;

    if bytes.len() < OLE_SIGNATURE.len() || bytes[..OLE_SIGNATURE.len()] != OLE_SIGNATURE {
        return Err(ExtractError::DocParse(
            "not an OLE compound file".to_string(),
        ));
    }

    let utf16 = printable_utf16_runs(&bytes);
    if !utf16.trim().is_empty() {
        return Ok(ExtractedContent::text_only(utf16));
    }

    Ok(ExtractedContent::text_only(printable_ascii_runs(&bytes)))
}

const MIN_RUN_CHARS: usize = 4;

fn printable_utf16_runs(bytes: &[u8]) -> String {
    let mut runs = Vec::new();
    let mut current = String::new();

    for pair in bytes.chunks_exact(2) {
        let code = u16::from_le_bytes([pair[0], pair[1]]);
        let printable = matches!(code, 0x20..=0x7E) || code == 0x09 || code == 0x0D;
        if printable {
            current.push(char::from_u32(code as u32).unwrap_or(' '));
        } else {
            if current.trim().len() >= MIN_RUN_CHARS {
                runs.push(current.trim().to_string());
            }
            current.clear();
        }
    }
    if current.trim().len() >= MIN_RUN_CHARS {
        runs.push(current.trim().to_string());
    }

    runs.join("\n")
}

fn printable_ascii_runs(bytes: &[u8]) -> String {
    let mut runs = Vec::new();
    let mut current = String::new();

    for &byte in bytes {
        let printable = matches!(byte, 0x20..=0x7E) || byte == b'\t';
        if printable {
            current.push(byte as char);
        } else {
            if current.trim().len() >= MIN_RUN_CHARS {
                runs.push(current.trim().to_string());
            }
            current.clear();
        }
    }
    if current.trim().len() >= MIN_RUN_CHARS {
        runs.push(current.trim().to_string());
    }

    runs.join("\n")
}
