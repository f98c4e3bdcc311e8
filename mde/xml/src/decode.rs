use std::fmt;
use std::str::FromStr;

use crate::element::{Element, split_prefix};
use crate::namespace::Namespace;

/**
    A single schema mismatch, located by the dotted path of qualified
    element names leading to it.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/**
    Every mismatch found while decoding one document.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationIssues {
    issues: Vec<Issue>,
}

impl ValidationIssues {
    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /**
        First issue whose path ends with `suffix`.
    */
    pub fn at(&self, suffix: &str) -> Option<&Issue> {
        self.issues.iter().find(|issue| issue.path.ends_with(suffix))
    }
}

impl From<Issue> for ValidationIssues {
    fn from(issue: Issue) -> Self {
        Self {
            issues: vec![issue],
        }
    }
}

impl fmt::Display for ValidationIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationIssues {}

/**
    Position within a parsed document: the element, its path from
    the root, and the namespace declarations in scope.
*/
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    element: &'a Element,
    path: String,
    scope: Vec<(&'a str, &'a str)>,
}

impl<'a> Cursor<'a> {
    fn enter(element: &'a Element, parent: Option<&Cursor<'a>>) -> Self {
        let (path, mut scope) = match parent {
            Some(parent) => (
                format!("{}.{}", parent.path, element.name),
                parent.scope.clone(),
            ),
            None => (element.name.clone(), Vec::new()),
        };
        for (key, value) in &element.attributes {
            if key == "xmlns" {
                scope.push(("", value.as_str()));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.push((prefix, value.as_str()));
            }
        }
        Self {
            element,
            path,
            scope,
        }
    }

    pub fn element(&self) -> &'a Element {
        self.element
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /**
        Resolved namespace URI of the element, if any.
    */
    pub fn namespace(&self) -> Option<&'a str> {
        self.resolve(self.element.prefix().unwrap_or(""))
    }

    pub fn is(&self, ns: Namespace, local: &str) -> bool {
        self.element.local_name() == local && self.namespace() == Some(ns.uri())
    }

    pub fn text(&self) -> String {
        self.element.text_content()
    }

    /**
        Look up an attribute by namespace and local name. Unqualified
        attributes are matched with `ns = None`.
    */
    pub fn attribute(&self, ns: Option<Namespace>, local: &str) -> Option<&'a str> {
        self.element
            .attributes
            .iter()
            .find(|(key, _)| {
                let (prefix, name) = split_prefix(key);
                if name != local || prefix == Some("xmlns") {
                    return false;
                }
                match (prefix, ns) {
                    (None, None) => true,
                    (Some("xml"), _) => false,
                    (Some(prefix), Some(ns)) => self.resolve(prefix) == Some(ns.uri()),
                    _ => false,
                }
            })
            .map(|(_, value)| value.as_str())
    }

    pub fn child_cursors(&self) -> impl Iterator<Item = Cursor<'a>> + '_ {
        self.element
            .elements()
            .map(move |child| Cursor::enter(child, Some(self)))
    }

    fn resolve(&self, prefix: &str) -> Option<&'a str> {
        self.scope
            .iter()
            .rev()
            .find(|(p, _)| *p == prefix)
            .map(|(_, uri)| *uri)
    }

    fn expected_path(&self, ns: Namespace, local: &str) -> String {
        format!("{}.{}", self.path, ns.qualify(local))
    }
}

/**
    Walks a parsed document against an expected shape, collecting
    every mismatch instead of stopping at the first one.

    Accessors return a fallback value when a field is missing or
    malformed, so decoding always reaches the end of the document.
    Call [`Decoder::finish`] to turn the collected issues into an error.
*/
#[derive(Debug, Default)]
pub struct Decoder {
    issues: Vec<Issue>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(Issue {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn finish<T>(self, value: T) -> Result<T, ValidationIssues> {
        if self.issues.is_empty() {
            Ok(value)
        } else {
            Err(ValidationIssues {
                issues: self.issues,
            })
        }
    }

    // ── Elements ───────────────────────────────────────────────────────

    pub fn root<'a>(&mut self, doc: &'a Element, ns: Namespace, local: &str) -> Option<Cursor<'a>> {
        let cursor = Cursor::enter(doc, None);
        if cursor.is(ns, local) {
            Some(cursor)
        } else {
            self.report(
                doc.name.clone(),
                format!("expected root element {{{}}}{local}", ns.uri()),
            );
            None
        }
    }

    /**
        A child element that must be present.
    */
    pub fn required<'a>(
        &mut self,
        parent: &Cursor<'a>,
        ns: Namespace,
        local: &str,
    ) -> Option<Cursor<'a>> {
        let before = self.issues.len();
        let found = self.lookup(parent, ns, local);
        if found.is_none() && self.issues.len() == before {
            self.report(parent.expected_path(ns, local), "missing required element");
        }
        found
    }

    /**
        A child element that may be absent. An `xsi:nil` element counts as absent.
    */
    pub fn optional<'a>(
        &mut self,
        parent: &Cursor<'a>,
        ns: Namespace,
        local: &str,
    ) -> Option<Cursor<'a>> {
        self.lookup(parent, ns, local)
            .filter(|cursor| !cursor.element.is_nil())
    }

    /**
        Every repetition of a child element. A single occurrence
        yields a one-element list, absence yields an empty one.
    */
    pub fn array<'a>(&mut self, parent: &Cursor<'a>, ns: Namespace, local: &str) -> Vec<Cursor<'a>> {
        let mut out = Vec::new();
        for child in parent.child_cursors() {
            if child.element.local_name() != local {
                continue;
            }
            if child.namespace() == Some(ns.uri()) {
                out.push(child);
            } else {
                self.report_namespace(&child, ns);
            }
        }
        out
    }

    // ── Scalars ────────────────────────────────────────────────────────

    /**
        Text of a required child element, empty when missing.
    */
    pub fn string(&mut self, parent: &Cursor<'_>, ns: Namespace, local: &str) -> String {
        self.required(parent, ns, local)
            .map(|cursor| cursor.text())
            .unwrap_or_default()
    }

    pub fn optional_string(
        &mut self,
        parent: &Cursor<'_>,
        ns: Namespace,
        local: &str,
    ) -> Option<String> {
        self.optional(parent, ns, local).map(|cursor| cursor.text())
    }

    /**
        Require a child element whose text is exactly `expected`.
    */
    pub fn literal(&mut self, parent: &Cursor<'_>, ns: Namespace, local: &str, expected: &str) {
        if let Some(cursor) = self.required(parent, ns, local) {
            let text = cursor.text();
            if text != expected {
                self.report(
                    cursor.path,
                    format!("expected literal \"{expected}\", found \"{text}\""),
                );
            }
        }
    }

    pub fn number<T: FromStr>(&mut self, parent: &Cursor<'_>, ns: Namespace, local: &str) -> Option<T> {
        let cursor = self.required(parent, ns, local)?;
        let text = cursor.text();
        match text.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.report(cursor.path, format!("expected a number, found \"{text}\""));
                None
            }
        }
    }

    pub fn boolean(&mut self, parent: &Cursor<'_>, ns: Namespace, local: &str) -> Option<bool> {
        let cursor = self.required(parent, ns, local)?;
        let text = cursor.text();
        match text.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => {
                self.report(cursor.path, format!("expected a boolean, found \"{text}\""));
                None
            }
        }
    }

    /**
        Map the element's text onto one of a fixed set of values.
    */
    pub fn one_of<T: Copy>(&mut self, cursor: &Cursor<'_>, allowed: &[(&str, T)]) -> Option<T> {
        self.pick(cursor.path.clone(), &cursor.text(), allowed)
    }

    // ── Attributes ─────────────────────────────────────────────────────

    pub fn attribute(
        &mut self,
        cursor: &Cursor<'_>,
        ns: Option<Namespace>,
        local: &str,
    ) -> Option<String> {
        let value = cursor.attribute(ns, local).map(str::to_string);
        if value.is_none() {
            let name = ns.map(|ns| ns.qualify(local)).unwrap_or_else(|| local.to_string());
            self.report(
                format!("{}@{name}", cursor.path),
                "missing required attribute",
            );
        }
        value
    }

    pub fn literal_attribute(
        &mut self,
        cursor: &Cursor<'_>,
        ns: Option<Namespace>,
        local: &str,
        expected: &str,
    ) {
        let Some(value) = self.attribute(cursor, ns, local) else {
            return;
        };
        if value != expected {
            self.report(
                format!("{}@{local}", cursor.path),
                format!("expected literal \"{expected}\", found \"{value}\""),
            );
        }
    }

    /**
        Map an attribute value onto one of a fixed set of values.
    */
    pub fn attribute_one_of<T: Copy>(
        &mut self,
        cursor: &Cursor<'_>,
        ns: Option<Namespace>,
        local: &str,
        allowed: &[(&str, T)],
    ) -> Option<T> {
        let value = self.attribute(cursor, ns, local)?;
        self.pick(format!("{}@{local}", cursor.path), &value, allowed)
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn pick<T: Copy>(&mut self, path: String, text: &str, allowed: &[(&str, T)]) -> Option<T> {
        let found = allowed
            .iter()
            .find(|(name, _)| *name == text)
            .map(|(_, value)| *value);
        if found.is_none() {
            let names: Vec<_> = allowed.iter().map(|(name, _)| *name).collect();
            self.report(
                path,
                format!("expected one of {}, found \"{text}\"", names.join("|")),
            );
        }
        found
    }

    fn lookup<'a>(&mut self, parent: &Cursor<'a>, ns: Namespace, local: &str) -> Option<Cursor<'a>> {
        let mut mismatched = None;
        for child in parent.child_cursors() {
            if child.element.local_name() != local {
                continue;
            }
            if child.namespace() == Some(ns.uri()) {
                return Some(child);
            }
            mismatched.get_or_insert(child);
        }
        if let Some(child) = mismatched {
            self.report_namespace(&child, ns);
        }
        None
    }

    fn report_namespace(&mut self, child: &Cursor<'_>, ns: Namespace) {
        let found = child.namespace().unwrap_or("no namespace").to_string();
        self.report(
            child.path.clone(),
            format!("expected namespace {}, found {found}", ns.uri()),
        );
    }
}
