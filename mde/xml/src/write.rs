use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::element::{Element, Node};
use crate::error::{XmlError, XmlResult};

/**
    Serialize an element tree without an XML declaration.

    Attributes and children are written in the order they were built.
    Elements without children are written as empty tags.
*/
pub fn to_string(element: &Element) -> XmlResult<String> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, element)?;
    finish(writer)
}

/**
    Serialize an element tree preceded by `<?xml version="1.0" encoding="UTF-8"?>`.
*/
pub fn to_document_string(element: &Element) -> XmlResult<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| XmlError::Write(e.to_string()))?;
    write_element(&mut writer, element)?;
    finish(writer)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> XmlResult<()> {
    let start = BytesStart::new(element.name.as_str()).with_attributes(
        element
            .attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str())),
    );

    if element.children.is_empty() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(el) => write_element(writer, el)?,
            Node::Text(text) => emit(writer, Event::Text(BytesText::new(text)))?,
        }
    }
    emit(writer, Event::End(BytesEnd::new(element.name.as_str())))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> XmlResult<()> {
    writer
        .write_event(event)
        .map_err(|e| XmlError::Write(e.to_string()))
}

fn finish(writer: Writer<Vec<u8>>) -> XmlResult<String> {
    String::from_utf8(writer.into_inner()).map_err(|_| XmlError::InvalidUtf8)
}
