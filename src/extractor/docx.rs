//! DOCX 텍스트 추출 모듈
//!
//! zip 아카이브의 `word/document.xml`에서 `w:t` 텍스트를 모읍니다.
//! 단락(`w:p`)은 빈 줄, 줄바꿈(`w:br`)은 개행, 탭(`w:tab`)은 탭으로 변환합니다.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// document.xml 최대 크기
const MAX_XML_ENTRY_BYTES: u64 = 32 * 1024 * 1024;

/// DOCX 파일에서 텍스트 추출
pub fn extract_text_from_docx(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read DOCX: {:?}", path))?;
    extract_text_from_docx_bytes(&bytes).with_context(|| format!("Invalid DOCX: {:?}", path))
}

/// 메모리의 DOCX 바이트에서 텍스트 추출
pub fn extract_text_from_docx_bytes(bytes: &[u8]) -> Result<String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).context("Not a zip archive")?;

    let entry = archive
        .by_name("word/document.xml")
        .context("word/document.xml not found")?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .context("Failed to read word/document.xml")?;

    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        anyhow::bail!("word/document.xml exceeds size limit");
    }

    paragraphs_from_xml(&xml)
}

/// document.xml → 단락 텍스트
fn paragraphs_from_xml(xml: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"br" | b"cr" => out.push('\n'),
                b"tab" => out.push('\t'),
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e.unescape().context("Invalid XML text")?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                anyhow::bail!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Leave Policy</w:t></w:r></w:p>
    <w:p>
      <w:r><w:t xml:space="preserve">Vacation requests must be </w:t></w:r>
      <w:r><w:t>submitted 14 days in advance.</w:t></w:r>
    </w:p>
    <w:p><w:r><w:t>Name:</w:t><w:tab/><w:t>Q&amp;A</w:t><w:br/><w:t>next line</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    fn docx_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_paragraphs_and_runs() {
        let bytes = docx_bytes(&[("word/document.xml", DOCUMENT_XML)]);
        let text = extract_text_from_docx_bytes(&bytes).unwrap();

        assert_eq!(
            text,
            "Leave Policy\n\n\
             Vacation requests must be submitted 14 days in advance.\n\n\
             Name:\tQ&A\nnext line"
        );
    }

    #[test]
    fn test_missing_document_xml() {
        let bytes = docx_bytes(&[("word/styles.xml", "<w:styles/>")]);
        let err = extract_text_from_docx_bytes(&bytes).unwrap_err();
        assert!(format!("{:#}", err).contains("word/document.xml"));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(extract_text_from_docx_bytes(b"plain text").is_err());
    }
}
