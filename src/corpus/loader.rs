use crate::corpus::schema::{Corpus, Entry, FileErrata, Position, ValidationError};
use crate::edit::EditError;
use crate::operation::Operation;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ROOT: &str = "errata";

#[derive(Debug)]
pub enum CorpusError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        source: ParseError,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    Serialize {
        message: String,
    },
    Save {
        path: PathBuf,
        source: EditError,
    },
}

impl CorpusError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            CorpusError::Parse { path: None, source } => CorpusError::Parse {
                path: Some(path),
                source,
            },
            CorpusError::Validation { path: None, source } => CorpusError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for CorpusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorpusError::Io { path, source } => {
                write!(
                    f,
                    "failed to read errata corpus from {}: {}",
                    path.display(),
                    source
                )
            }
            CorpusError::Parse { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse errata corpus ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse errata corpus: {}", source),
            },
            CorpusError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid errata corpus ({}): {}", path.display(), source),
                None => write!(f, "invalid errata corpus: {}", source),
            },
            CorpusError::Serialize { message } => {
                write!(f, "failed to serialize errata corpus: {}", message)
            }
            CorpusError::Save { path, source } => {
                write!(
                    f,
                    "failed to save errata corpus to {}: {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for CorpusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CorpusError::Io { source, .. } => Some(source),
            CorpusError::Parse { source, .. } => Some(source),
            CorpusError::Validation { source, .. } => Some(source),
            CorpusError::Save { source, .. } => Some(source),
            CorpusError::Serialize { .. } => None,
        }
    }
}

/// Structural problems in a persisted corpus. Any of them fails the whole load.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed XML near byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("expected <errata> root element, found <{found}>")]
    UnexpectedRoot { found: String },

    #[error("unexpected <{element}> inside <{parent}>")]
    UnexpectedElement { element: String, parent: String },

    #[error("unexpected text {text:?} inside <{parent}>")]
    UnexpectedText { text: String, parent: String },

    #[error("<{element}> is missing the '{attribute}' attribute")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("file '{0}' appears more than once")]
    DuplicateFile(String),

    #[error("'{file}' entry #{entry} has no <find> anchor")]
    MissingAnchor { file: String, entry: usize },

    #[error("'{file}' entry #{entry} has more than one <find> anchor")]
    DuplicateAnchor { file: String, entry: usize },

    #[error("'{file}' entry #{entry} has no operation (replace, up, down, delete or insert)")]
    MissingOperation { file: String, entry: usize },

    #[error("'{file}' entry #{entry} has more than one operation")]
    DuplicateOperation { file: String, entry: usize },

    #[error("'{file}' entry #{entry}: cannot parse {attribute} '{value}' as a line number")]
    InvalidLineNumber {
        file: String,
        entry: usize,
        attribute: &'static str,
        value: String,
    },

    #[error("'{file}' entry #{entry}: cannot parse move distance '{value}'")]
    InvalidDistance {
        file: String,
        entry: usize,
        value: String,
    },

    #[error("unexpected end of document inside <{0}>")]
    UnexpectedEof(String),
}

pub fn load_from_str(input: &str) -> Result<Corpus, CorpusError> {
    let corpus = CorpusReader::new(input)
        .read()
        .map_err(|source| CorpusError::Parse { path: None, source })?;
    corpus
        .validate()
        .map_err(|source| CorpusError::Validation { path: None, source })?;
    Ok(corpus)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Corpus, CorpusError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// One payload element of an entry, before it is paired with the anchor.
enum Payload {
    Replace(String),
    Up(String),
    Down(String),
    Delete,
    Insert(String),
}

struct CorpusReader<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> CorpusReader<'a> {
    fn new(input: &'a str) -> Self {
        // Text is kept verbatim: anchors may start or end with whitespace
        Self {
            reader: Reader::from_str(input),
        }
    }

    fn next(&mut self) -> Result<Event<'a>, ParseError> {
        self.reader.read_event().map_err(|e| self.xml_error(e))
    }

    fn xml_error(&self, error: impl fmt::Display) -> ParseError {
        ParseError::Xml {
            position: self.reader.buffer_position() as u64,
            message: error.to_string(),
        }
    }

    fn read(mut self) -> Result<Corpus, ParseError> {
        loop {
            match self.next()? {
                Event::Start(e) => {
                    expect_root(&e)?;
                    return self.read_root();
                }
                Event::Empty(e) => {
                    expect_root(&e)?;
                    return Ok(Corpus::default());
                }
                Event::Text(t) if is_blank(&t) => {}
                Event::Text(t) => {
                    return Err(ParseError::UnexpectedText {
                        text: String::from_utf8_lossy(&t).into_owned(),
                        parent: "document".to_string(),
                    })
                }
                Event::Eof => return Err(ParseError::UnexpectedEof("document".to_string())),
                _ => {}
            }
        }
    }

    fn read_root(&mut self) -> Result<Corpus, ParseError> {
        let mut corpus = Corpus::default();
        loop {
            match self.next()? {
                Event::Start(e) if e.name().as_ref() == b"file" => {
                    let (key, file) = self.read_file(&e, true)?;
                    insert_file(&mut corpus, key, file)?;
                }
                Event::Empty(e) if e.name().as_ref() == b"file" => {
                    let (key, file) = self.read_file(&e, false)?;
                    insert_file(&mut corpus, key, file)?;
                }
                Event::Start(e) | Event::Empty(e) => return Err(unexpected(&e, ROOT)),
                Event::Text(t) if is_blank(&t) => {}
                Event::Text(t) => return Err(unexpected_text(&t, ROOT)),
                Event::End(_) => return Ok(corpus),
                Event::Eof => return Err(ParseError::UnexpectedEof(ROOT.to_string())),
                _ => {}
            }
        }
    }

    fn read_file(
        &mut self,
        start: &BytesStart<'_>,
        has_body: bool,
    ) -> Result<(String, FileErrata), ParseError> {
        let mut key = None;
        let mut file = FileErrata::default();
        for (name, value) in self.attributes(start)? {
            match name.as_str() {
                "name" => key = Some(value),
                "path" => file.path = Some(value),
                _ => {}
            }
        }
        let key = key.ok_or(ParseError::MissingAttribute {
            element: "file",
            attribute: "name",
        })?;

        if !has_body {
            return Ok((key, file));
        }

        loop {
            match self.next()? {
                Event::Start(e) => {
                    let entry_no = file.entries.len() + 1;
                    let entry = self.read_entry(&e, &key, entry_no, true)?;
                    file.entries.push(entry);
                }
                Event::Empty(e) => {
                    let entry_no = file.entries.len() + 1;
                    let entry = self.read_entry(&e, &key, entry_no, false)?;
                    file.entries.push(entry);
                }
                Event::Text(t) if is_blank(&t) => {}
                Event::Text(t) => return Err(unexpected_text(&t, "file")),
                Event::End(_) => return Ok((key, file)),
                Event::Eof => return Err(ParseError::UnexpectedEof("file".to_string())),
                _ => {}
            }
        }
    }

    fn read_entry(
        &mut self,
        start: &BytesStart<'_>,
        file: &str,
        entry: usize,
        has_body: bool,
    ) -> Result<Entry, ParseError> {
        let element = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let attributes = self.attributes(start)?;
        let attribute = |name: &str| {
            attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };
        let line_number = |name: &'static str, value: &str| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidLineNumber {
                    file: file.to_string(),
                    entry,
                    attribute: name,
                    value: value.to_string(),
                })
        };

        let position = match element.as_str() {
            "line" => {
                let number = attribute("number").ok_or(ParseError::MissingAttribute {
                    element: "line",
                    attribute: "number",
                })?;
                match number.split_once('-') {
                    Some((first, last)) => {
                        let line = line_number("number", first)?;
                        let last = line_number("number", last)?;
                        if last < line {
                            return Err(ParseError::InvalidLineNumber {
                                file: file.to_string(),
                                entry,
                                attribute: "number",
                                value: number.to_string(),
                            });
                        }
                        Position::Single {
                            line,
                            count: last - line + 1,
                        }
                    }
                    None => Position::line(line_number("number", number)?),
                }
            }
            "range" => Position::Range {
                from: attribute("from")
                    .map(|v| line_number("from", v))
                    .transpose()?,
                to: attribute("to").map(|v| line_number("to", v)).transpose()?,
            },
            _ => return Err(unexpected(start, "file")),
        };
        let comment = attribute("comment").map(str::to_owned);

        let mut find = None;
        let mut payloads = Vec::new();
        if has_body {
            loop {
                match self.next()? {
                    Event::Start(e) => {
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        let text = self.read_text(&name)?;
                        collect_child(&e, &name, text, &element, &mut find, &mut payloads)
                            .map_err(|err| err.at(file, entry))?;
                    }
                    Event::Empty(e) => {
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        collect_child(&e, &name, String::new(), &element, &mut find, &mut payloads)
                            .map_err(|err| err.at(file, entry))?;
                    }
                    Event::Text(t) if is_blank(&t) => {}
                    Event::Text(t) => return Err(unexpected_text(&t, &element)),
                    Event::End(_) => break,
                    Event::Eof => return Err(ParseError::UnexpectedEof(element)),
                    _ => {}
                }
            }
        }

        let find = find.ok_or_else(|| ParseError::MissingAnchor {
            file: file.to_string(),
            entry,
        })?;
        let payload = match payloads.len() {
            0 => {
                return Err(ParseError::MissingOperation {
                    file: file.to_string(),
                    entry,
                })
            }
            1 => payloads.remove(0),
            _ => {
                return Err(ParseError::DuplicateOperation {
                    file: file.to_string(),
                    entry,
                })
            }
        };

        let distance = |value: &str| {
            value
                .trim()
                .parse::<isize>()
                .ok()
                .filter(|n| *n >= 0)
                .ok_or_else(|| ParseError::InvalidDistance {
                    file: file.to_string(),
                    entry,
                    value: value.to_string(),
                })
        };

        let operation = match payload {
            Payload::Replace(replace) => Operation::Replace { find, replace },
            Payload::Up(value) => Operation::Move {
                find,
                distance: -distance(&value)?,
            },
            Payload::Down(value) => Operation::Move {
                find,
                distance: distance(&value)?,
            },
            Payload::Delete => Operation::Remove { find },
            Payload::Insert(text) => Operation::Insert { find, text },
        };

        Ok(Entry {
            comment,
            position,
            operation,
        })
    }

    /// Collect the text content of a leaf element up to its end tag.
    fn read_text(&mut self, element: &str) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            match self.next()? {
                Event::Text(t) => {
                    let unescaped = t.unescape().map_err(|e| self.xml_error(e))?;
                    text.push_str(&unescaped);
                }
                Event::CData(c) => {
                    let raw = std::str::from_utf8(&c).map_err(|e| self.xml_error(e))?;
                    text.push_str(raw);
                }
                Event::Start(e) | Event::Empty(e) => return Err(unexpected(&e, element)),
                Event::End(_) => return Ok(text),
                Event::Eof => return Err(ParseError::UnexpectedEof(element.to_string())),
                _ => {}
            }
        }
    }

    fn attributes(&self, start: &BytesStart<'_>) -> Result<Vec<(String, String)>, ParseError> {
        start
            .attributes()
            .map(|attribute| {
                let attribute = attribute.map_err(|e| self.xml_error(e))?;
                let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
                let value = attribute
                    .unescape_value()
                    .map_err(|e| self.xml_error(e))?
                    .into_owned();
                Ok((key, value))
            })
            .collect()
    }
}

/// Entry-level problems found before the entry number is attached.
enum EntryIssue {
    DuplicateAnchor,
    Parse(ParseError),
}

impl EntryIssue {
    fn at(self, file: &str, entry: usize) -> ParseError {
        match self {
            EntryIssue::DuplicateAnchor => ParseError::DuplicateAnchor {
                file: file.to_string(),
                entry,
            },
            EntryIssue::Parse(error) => error,
        }
    }
}

/// Sort one child of an entry into the anchor or the payload list.
fn collect_child(
    start: &BytesStart<'_>,
    name: &str,
    text: String,
    parent: &str,
    find: &mut Option<String>,
    payloads: &mut Vec<Payload>,
) -> Result<(), EntryIssue> {
    let payload = match name {
        "find" => {
            if find.replace(text).is_some() {
                return Err(EntryIssue::DuplicateAnchor);
            }
            return Ok(());
        }
        "replace" => Payload::Replace(text),
        "up" => Payload::Up(text),
        "down" => Payload::Down(text),
        "delete" => Payload::Delete,
        "insert" => Payload::Insert(text),
        _ => return Err(EntryIssue::Parse(unexpected(start, parent))),
    };
    payloads.push(payload);
    Ok(())
}

fn insert_file(corpus: &mut Corpus, key: String, file: FileErrata) -> Result<(), ParseError> {
    if corpus.files.contains_key(&key) {
        return Err(ParseError::DuplicateFile(key));
    }
    corpus.files.insert(key, file);
    Ok(())
}

fn expect_root(start: &BytesStart<'_>) -> Result<(), ParseError> {
    if start.name().as_ref() == ROOT.as_bytes() {
        Ok(())
    } else {
        Err(ParseError::UnexpectedRoot {
            found: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        })
    }
}

fn unexpected(start: &BytesStart<'_>, parent: &str) -> ParseError {
    ParseError::UnexpectedElement {
        element: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        parent: parent.to_string(),
    }
}

fn unexpected_text(text: &[u8], parent: &str) -> ParseError {
    ParseError::UnexpectedText {
        text: String::from_utf8_lossy(text).trim().to_string(),
        parent: parent.to_string(),
    }
}

fn is_blank(text: &[u8]) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}
