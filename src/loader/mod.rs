
use std::fs;
use std::io::Read;
use std::path::Path;

use pulldown_cmark::{Event as MdEvent, Parser, Tag, TagEnd};
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;
use tracing::debug;

use crate::{KbError, Result};

/// Load a source document and return its raw text content.
///
/// Dispatches on the file extension: PDF, plain text, Markdown, Word and
/// PowerPoint are accepted; anything else fails with `UnsupportedFileType`.
#[inline]
pub fn load_document(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    debug!("Loading document {} ({})", path.display(), extension);

    match extension.as_str() {
        "pdf" => load_pdf(path),
        "txt" => Ok(fs::read_to_string(path)?),
        "md" => Ok(markdown_to_text(&fs::read_to_string(path)?)),
        "doc" | "docx" => load_word(path),
        "ppt" | "pptx" => load_powerpoint(path),
        _ => Err(KbError::UnsupportedFileType(format!(
            ".{} ({})",
            extension,
            path.display()
        ))),
    }
}

fn load_pdf(path: &Path) -> Result<String> {
    pdf_extract::extract_text(path).map_err(|e| {
        KbError::Other(anyhow::anyhow!(
            "failed to extract text from {}: {}",
            path.display(),
            e
        ))
    })
}

/// Strip Markdown syntax, keeping the readable text with paragraph breaks.
pub fn markdown_to_text(markdown: &str) -> String {
    let mut text = String::new();

    for event in Parser::new(markdown) {
        match event {
            MdEvent::Text(content) | MdEvent::Code(content) => text.push_str(&content),
            MdEvent::SoftBreak => text.push(' '),
            MdEvent::HardBreak => text.push('\n'),
            MdEvent::Start(Tag::CodeBlock(_)) => {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            MdEvent::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock,
            ) => {
                if !text.ends_with("\n\n") {
                    text.push_str("\n\n");
                }
            }
            _ => {}
        }
    }

    text.trim_end().to_string()
}

/// Word documents are ZIP archives; the document body lives in
/// `word/document.xml` with runs of `<w:t>` text inside `<w:p>` paragraphs.
fn load_word(path: &Path) -> Result<String> {
    let mut archive = open_archive(path)?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| {
            KbError::Other(anyhow::anyhow!(
                "{} is not a readable Word document: {}",
                path.display(),
                e
            ))
        })?
        .read_to_string(&mut xml)?;

    Ok(extract_xml_text(&xml, b"w:t", b"w:p"))
}

/// PowerPoint decks keep one XML part per slide under `ppt/slides/`, with
/// text in `<a:t>` runs inside `<a:p>` paragraphs. Slides are concatenated in
/// slide order.
fn load_powerpoint(path: &Path) -> Result<String> {
    let mut archive = open_archive(path)?;

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
        .map(String::from)
        .collect();
    slide_names.sort_by_key(|name| slide_number(name));

    let mut slides = Vec::with_capacity(slide_names.len());
    for name in &slide_names {
        let mut xml = String::new();
        archive
            .by_name(name)
            .map_err(|e| {
                KbError::Other(anyhow::anyhow!(
                    "failed to read slide {} from {}: {}",
                    name,
                    path.display(),
                    e
                ))
            })?
            .read_to_string(&mut xml)?;
        slides.push(extract_xml_text(&xml, b"a:t", b"a:p"));
    }

    Ok(slides.join("\n\n"))
}

fn open_archive(path: &Path) -> Result<zip::ZipArchive<fs::File>> {
    let file = fs::File::open(path)?;
    zip::ZipArchive::new(file).map_err(|e| {
        KbError::Other(anyhow::anyhow!(
            "{} is not a readable Office document: {}",
            path.display(),
            e
        ))
    })
}

fn slide_number(name: &str) -> u32 {
    name.chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

/// Collect the character data of every `<text_tag>` element, inserting a line
/// break at the end of each `<para_tag>` element.
fn extract_xml_text(xml: &str, text_tag: &[u8], para_tag: &[u8]) -> String {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(element)) if element.name().as_ref() == text_tag => in_text = true,
            Ok(XmlEvent::End(element)) if element.name().as_ref() == text_tag => in_text = false,
            Ok(XmlEvent::End(element)) if element.name().as_ref() == para_tag => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(XmlEvent::Text(content)) if in_text => {
                out.push_str(&content.unescape().unwrap_or_default());
            }
            Ok(XmlEvent::Eof) | Err(_) => break,
            _ => {}
        }
    }

    out.trim_end().to_string()
}
