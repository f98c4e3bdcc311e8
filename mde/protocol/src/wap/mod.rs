/*!
    The `wap-provisioningdoc` format the Windows client applies after enrolling.

    Documents are described as a nested JSON object. Leaves become
    `parm` elements, nested objects become `characteristic` elements,
    and arrays of objects expand to sibling characteristics sharing a
    type. A leaf of the form `{ "type": "integer", "value": 5 }` adds a
    `datatype` attribute.
*/

use serde_json::{Map, Value};

use mde_xml::Element;

use crate::error::{ProtocolError, ProtocolResult};

mod profile;

pub use profile::{AuthType, ManagementEndpoint, PollSchedule, enrollment_profile};

const DOC_VERSION: &str = "1.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    String,
    Integer,
    Boolean,
}

impl Datatype {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parm {
    pub name: String,
    /// `None` for flag parameters that carry no value.
    pub value: Option<String>,
    pub datatype: Option<Datatype>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub kind: String,
    pub parms: Vec<Parm>,
    pub children: Vec<Characteristic>,
}

impl Characteristic {
    pub fn parm(&self, name: &str) -> Option<&Parm> {
        self.parms.iter().find(|parm| parm.name == name)
    }

    pub fn child(&self, kind: &str) -> Option<&Characteristic> {
        self.children.iter().find(|child| child.kind == kind)
    }

    fn to_element(&self) -> Element {
        let parms = self.parms.iter().map(|parm| {
            let mut el = Element::new("parm").attr("name", &parm.name);
            if let Some(value) = &parm.value {
                el = el.attr("value", value);
            }
            if let Some(datatype) = parm.datatype {
                el = el.attr("datatype", datatype.as_str());
            }
            el
        });
        Element::new("characteristic")
            .attr("type", &self.kind)
            .children(parms)
            .children(self.children.iter().map(Characteristic::to_element))
    }

    fn from_element(el: &Element, path: &str) -> ProtocolResult<Self> {
        let kind = required_attribute(el, "type", path)?;
        let path = format!("{path}/{kind}");
        let mut out = Self {
            kind,
            parms: Vec::new(),
            children: Vec::new(),
        };
        for child in el.elements() {
            match child.name.as_str() {
                "parm" => out.parms.push(Parm {
                    name: required_attribute(child, "name", &path)?,
                    value: child.attribute("value").map(str::to_string),
                    datatype: child.attribute("datatype").and_then(Datatype::parse),
                }),
                "characteristic" => out.children.push(Self::from_element(child, &path)?),
                other => return Err(invalid(&path, format!("unexpected element <{other}>"))),
            }
        }
        Ok(out)
    }
}

/**
    A complete provisioning document.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningDoc {
    pub characteristics: Vec<Characteristic>,
}

impl ProvisioningDoc {
    /**
        Build a document from a JSON object whose top-level entries are
        all characteristics.
    */
    pub fn from_tree(tree: &Value) -> ProtocolResult<Self> {
        let Value::Object(map) = tree else {
            return Err(invalid("", "the document root must be an object"));
        };
        let (parms, characteristics) = split(map, "")?;
        if let Some(parm) = parms.first() {
            return Err(invalid(
                &format!("/{}", parm.name),
                "parameters are not allowed at the document root",
            ));
        }
        Ok(Self { characteristics })
    }

    /**
        Follow a chain of characteristic types from the root.
    */
    pub fn find(&self, path: &[&str]) -> Option<&Characteristic> {
        let (first, rest) = path.split_first()?;
        let start = self.characteristics.iter().find(|c| c.kind == *first)?;
        rest.iter().try_fold(start, |current, kind| current.child(kind))
    }

    pub fn to_element(&self) -> Element {
        Element::new("wap-provisioningdoc")
            .attr("version", DOC_VERSION)
            .children(self.characteristics.iter().map(Characteristic::to_element))
    }

    /**
        The serialized document, including the XML declaration.
    */
    pub fn to_xml(&self) -> ProtocolResult<String> {
        Ok(mde_xml::to_document_string(&self.to_element())?)
    }

    pub fn parse(xml: &str) -> ProtocolResult<Self> {
        let root = mde_xml::parse(xml)?;
        if root.name != "wap-provisioningdoc" {
            return Err(invalid("", format!("unexpected root <{}>", root.name)));
        }
        let characteristics = root
            .elements()
            .map(|el| Characteristic::from_element(el, ""))
            .collect::<ProtocolResult<_>>()?;
        Ok(Self { characteristics })
    }
}

/**
    Split one object level into its parameters and child characteristics,
    each kept in insertion order.
*/
fn split(map: &Map<String, Value>, path: &str) -> ProtocolResult<(Vec<Parm>, Vec<Characteristic>)> {
    let mut parms = Vec::new();
    let mut children = Vec::new();
    for (key, value) in map {
        let here = format!("{path}/{key}");
        match value {
            Value::Object(inner) => match typed_parm(key, inner, &here)? {
                Some(parm) => parms.push(parm),
                None => children.push(characteristic(key, inner, &here)?),
            },
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let Value::Object(inner) = item else {
                        return Err(invalid(
                            &format!("{here}[{i}]"),
                            "array entries must be objects",
                        ));
                    };
                    children.push(characteristic(key, inner, &format!("{here}[{i}]"))?);
                }
            }
            leaf => parms.push(Parm {
                name: key.clone(),
                value: scalar(leaf),
                datatype: None,
            }),
        }
    }
    Ok((parms, children))
}

fn characteristic(kind: &str, map: &Map<String, Value>, path: &str) -> ProtocolResult<Characteristic> {
    let (parms, children) = split(map, path)?;
    Ok(Characteristic {
        kind: kind.to_string(),
        parms,
        children,
    })
}

/**
    Recognise a `{ type, value }` wrapper. Objects with any other
    set of keys are characteristics.
*/
fn typed_parm(name: &str, map: &Map<String, Value>, path: &str) -> ProtocolResult<Option<Parm>> {
    if map.len() != 2 {
        return Ok(None);
    }
    let (Some(Value::String(kind)), Some(value)) = (map.get("type"), map.get("value")) else {
        return Ok(None);
    };
    let Some(datatype) = Datatype::parse(kind) else {
        return Err(invalid(path, format!("unknown datatype \"{kind}\"")));
    };
    if matches!(value, Value::Object(_) | Value::Array(_) | Value::Null) {
        return Err(invalid(path, "typed values must be a string, number or boolean"));
    }
    Ok(Some(Parm {
        name: name.to_string(),
        value: scalar(value),
        datatype: Some(datatype),
    }))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn required_attribute(el: &Element, name: &str, path: &str) -> ProtocolResult<String> {
    el.attribute(name)
        .map(str::to_string)
        .ok_or_else(|| invalid(path, format!("<{}> without {name}", el.name)))
}

fn invalid(path: &str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidProfile {
        path: if path.is_empty() { "/".into() } else { path.to_string() },
        reason: reason.into(),
    }
}
