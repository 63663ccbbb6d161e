//! Serialize a [`Corpus`] back into its persisted XML form.

use crate::corpus::loader::CorpusError;
use crate::corpus::schema::{Corpus, Entry, Position};
use crate::edit::atomic_write;
use crate::operation::Operation;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::path::Path;

pub fn save_to_string(corpus: &Corpus) -> Result<String, CorpusError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;

    if corpus.files.is_empty() {
        emit(&mut writer, Event::Empty(BytesStart::new("errata")))?;
    } else {
        emit(&mut writer, Event::Start(BytesStart::new("errata")))?;
        for (key, file) in &corpus.files {
            let mut start = BytesStart::new("file");
            start.push_attribute(("name", key.as_str()));
            if let Some(path) = &file.path {
                start.push_attribute(("path", path.as_str()));
            }

            if file.entries.is_empty() {
                emit(&mut writer, Event::Empty(start))?;
                continue;
            }
            emit(&mut writer, Event::Start(start))?;
            for entry in &file.entries {
                write_entry(&mut writer, entry)?;
            }
            emit(&mut writer, Event::End(BytesEnd::new("file")))?;
        }
        emit(&mut writer, Event::End(BytesEnd::new("errata")))?;
    }

    let mut xml = String::from_utf8(writer.into_inner()).map_err(|e| CorpusError::Serialize {
        message: e.to_string(),
    })?;
    xml.push('\n');
    Ok(xml)
}

pub fn save_to_path(corpus: &Corpus, path: impl AsRef<Path>) -> Result<(), CorpusError> {
    let path = path.as_ref();
    let xml = save_to_string(corpus)?;
    atomic_write(path, xml.as_bytes()).map_err(|source| CorpusError::Save {
        path: path.to_path_buf(),
        source,
    })
}

fn write_entry(writer: &mut Writer<Vec<u8>>, entry: &Entry) -> Result<(), CorpusError> {
    let (name, mut start) = match entry.position {
        Position::Single { line, count } => {
            let number = if count <= 1 {
                line.to_string()
            } else {
                format!("{}-{}", line, line + count - 1)
            };
            let mut start = BytesStart::new("line");
            start.push_attribute(("number", number.as_str()));
            ("line", start)
        }
        Position::Range { from, to } => {
            let mut start = BytesStart::new("range");
            if let Some(from) = from {
                start.push_attribute(("from", from.to_string().as_str()));
            }
            if let Some(to) = to {
                start.push_attribute(("to", to.to_string().as_str()));
            }
            ("range", start)
        }
    };
    if let Some(comment) = &entry.comment {
        start.push_attribute(("comment", comment.as_str()));
    }

    emit(writer, Event::Start(start))?;
    text_element(writer, "find", entry.operation.find())?;
    match &entry.operation {
        Operation::Replace { replace, .. } => text_element(writer, "replace", replace)?,
        Operation::Move { distance, .. } if *distance < 0 => {
            text_element(writer, "up", &distance.unsigned_abs().to_string())?
        }
        Operation::Move { distance, .. } => text_element(writer, "down", &distance.to_string())?,
        Operation::Insert { text, .. } => text_element(writer, "insert", text)?,
        Operation::Remove { .. } => emit(writer, Event::Empty(BytesStart::new("delete")))?,
    }
    emit(writer, Event::End(BytesEnd::new(name)))
}

/// `<name>text</name>`, or `<name/>` for empty text so no indentation leaks
/// into the element's content.
fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<(), CorpusError> {
    if text.is_empty() {
        return emit(writer, Event::Empty(BytesStart::new(name)));
    }
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), CorpusError> {
    writer
        .write_event(event)
        .map_err(|e| CorpusError::Serialize {
            message: e.to_string(),
        })
}
