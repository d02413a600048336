//! Read-only event view of package XML.
//!
//! Used to check documents and to look things up in the relationship and
//! content-type tables. Nothing here writes XML back: re-serializing through
//! a parser would reformat Word's markup.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlEvent {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
}

/// Element events and unescaped character data, in document order.
/// Declarations, comments and processing instructions are dropped.
pub fn parse_events(xml: &[u8]) -> Result<Vec<XmlEvent>, quick_xml::Error> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(s) => events.push(XmlEvent::Start {
                name: bytes_to_string(s.name().as_ref()),
                attrs: collect_attrs(&s)?,
            }),
            Event::End(e) => events.push(XmlEvent::End {
                name: bytes_to_string(e.name().as_ref()),
            }),
            Event::Empty(s) => events.push(XmlEvent::Empty {
                name: bytes_to_string(s.name().as_ref()),
                attrs: collect_attrs(&s)?,
            }),
            Event::Text(t) => events.push(XmlEvent::Text {
                text: t.unescape()?.into_owned(),
            }),
            Event::CData(t) => events.push(XmlEvent::Text {
                text: bytes_to_string(t.into_inner()),
            }),
            _ => {}
        }
    }
    Ok(events)
}

fn collect_attrs(s: &BytesStart<'_>) -> Result<Vec<(String, String)>, quick_xml::Error> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a?;
        let key = bytes_to_string(a.key.as_ref());
        let val = a.unescape_value()?.into_owned();
        attrs.push((key, val));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| local_name(k) == key)
        .map(|(_, v)| v.as_str())
}

/// Checks that `xml` parses and has exactly one balanced root element.
pub fn check_well_formed(xml: &[u8]) -> Result<(), String> {
    let events = parse_events(xml).map_err(|e| e.to_string())?;
    let mut stack: Vec<&str> = Vec::new();
    let mut roots = 0usize;
    for ev in &events {
        match ev {
            XmlEvent::Start { name, .. } => {
                if stack.is_empty() {
                    roots += 1;
                }
                stack.push(name);
            }
            XmlEvent::Empty { .. } if stack.is_empty() => roots += 1,
            XmlEvent::End { name } => match stack.pop() {
                Some(open) if open == name => {}
                Some(open) => return Err(format!("</{name}> closes <{open}>")),
                None => return Err(format!("</{name}> without matching start")),
            },
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        return Err(format!("<{open}> is never closed"));
    }
    match roots {
        1 => Ok(()),
        0 => Err("no root element".to_string()),
        n => Err(format!("{n} root elements")),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

/// Lists the `<Relationship>` entries of a relationships part.
pub fn relationships(xml: &[u8]) -> Result<Vec<Relationship>, quick_xml::Error> {
    let mut out = Vec::new();
    for ev in parse_events(xml)? {
        let (XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs }) = ev else {
            continue;
        };
        if local_name(&name) != "Relationship" {
            continue;
        }
        out.push(Relationship {
            id: attr(&attrs, "Id").unwrap_or_default().to_string(),
            rel_type: attr(&attrs, "Type").unwrap_or_default().to_string(),
            target: attr(&attrs, "Target").unwrap_or_default().to_string(),
        });
    }
    Ok(out)
}

/// Lowercased extensions declared by `<Default Extension=...>` entries.
pub fn content_type_extensions(xml: &[u8]) -> Result<Vec<String>, quick_xml::Error> {
    let mut out = Vec::new();
    for ev in parse_events(xml)? {
        let (XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs }) = ev else {
            continue;
        };
        if local_name(&name) != "Default" {
            continue;
        }
        if let Some(ext) = attr(&attrs, "Extension") {
            out.push(ext.trim().to_ascii_lowercase());
        }
    }
    Ok(out)
}

/// Escapes a value for use inside a double-quoted attribute.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
