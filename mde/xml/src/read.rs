use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::element::{Element, Node};
use crate::error::{XmlError, XmlResult};

/**
    Parse an XML document into an element tree.

    Whitespace-only text is dropped and remaining text is trimmed,
    comments and processing instructions are ignored.
*/
pub fn parse(xml: &str) -> XmlResult<Element> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if root.is_some() {
                    return Err(XmlError::ContentOutsideRoot);
                }
                stack.push(start_element(&e)?);
            }
            Ok(Event::Empty(e)) => {
                let element = start_element(&e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                // quick-xml rejects mismatched end tags itself
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Malformed("unexpected closing tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| XmlError::Malformed(e.to_string()))?;
                push_text(&mut stack, text.trim())?;
            }
            Ok(Event::CData(e)) => {
                let text =
                    String::from_utf8(e.into_inner().into_owned()).map_err(|_| XmlError::InvalidUtf8)?;
                push_text(&mut stack, text.trim())?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XmlError::Malformed(e.to_string())),
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Unclosed(open.name.clone()));
    }

    root.ok_or(XmlError::NoRoot)
}

fn start_element(e: &BytesStart) -> XmlResult<Element> {
    let mut element = Element::new(utf8(e.name().as_ref())?);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
        let key = utf8(attr.key.as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Malformed(e.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> XmlResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(XmlError::ContentOutsideRoot),
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) -> XmlResult<()> {
    if text.is_empty() {
        return Ok(());
    }
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Text(text.to_string()));
            Ok(())
        }
        None => Err(XmlError::ContentOutsideRoot),
    }
}

fn utf8(bytes: &[u8]) -> XmlResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| XmlError::InvalidUtf8)
}
