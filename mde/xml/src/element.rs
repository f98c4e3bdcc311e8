use crate::namespace::Namespace;

/**
    A node in a document tree.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/**
    An XML element with its qualified name, attributes in document
    order, and child nodes.

    Namespace declarations are ordinary `xmlns` attributes, so a tree
    built in code serializes exactly as it was assembled.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /**
        Create an element named `local` in `ns`, using the namespace's prefix.
    */
    pub fn in_ns(ns: Namespace, local: &str) -> Self {
        Self::new(ns.qualify(local))
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /**
        Add the `xmlns` declaration for `ns`.
    */
    pub fn declare(self, ns: Namespace) -> Self {
        let (key, uri) = ns.declaration();
        self.attr(key, uri)
    }

    /**
        Mark the element as `xsi:nil="true"`.
    */
    pub fn nil(self) -> Self {
        self.attr(Namespace::XmlSchemaInstance.qualify("nil"), "true")
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children
            .extend(children.into_iter().map(Node::Element));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /**
        The name without its prefix.
    */
    pub fn local_name(&self) -> &str {
        split_prefix(&self.name).1
    }

    pub fn prefix(&self) -> Option<&str> {
        split_prefix(&self.name).0
    }

    /**
        Look up an attribute by its name exactly as written.
    */
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /**
        First child element with the given local name.
    */
    pub fn find(&self, local: &str) -> Option<&Element> {
        self.elements().find(|el| el.local_name() == local)
    }

    /**
        Follow a chain of local names from this element.
    */
    pub fn find_path(&self, path: &[&str]) -> Option<&Element> {
        path.iter().try_fold(self, |el, local| el.find(local))
    }

    /**
        Concatenated text of the direct text children.
    */
    pub fn text_content(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn is_nil(&self) -> bool {
        self.attributes
            .iter()
            .any(|(key, value)| split_prefix(key).1 == "nil" && value == "true")
    }
}

pub(crate) fn split_prefix(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}
