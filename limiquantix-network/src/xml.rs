//! Mutable XML element tree for libvirt domain descriptions and network
//! definitions.
//!
//! Parsing and serialization go through `quick-xml`. The tree also derives
//! serde so the registry can persist definitions structurally instead of as
//! raw XML strings.
//!
//! The model is small: an element has a name, ordered attributes, ordered
//! child elements, the text before its first child and the text that follows
//! it inside its parent (`tail`). Comments, processing instructions and the
//! XML declaration are dropped on parse.
//!
//! Whitespace-only text runs are indentation and are dropped on parse; the
//! serializer re-indents with two spaces. Any other text is kept verbatim and
//! in document order, including mixed content such as `<p>a<b/>c</p>`. A tree
//! whose text and tails are never whitespace-only therefore satisfies
//! `parse(to_xml(e)) == e`.

use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};

/// A single XML element with its attributes, children and text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Text following this element, up to the parent's next child or end tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail: Option<String>,
}

impl Element {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
            tail: None,
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Builder-style text setter.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, keeping its position if it already exists.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(index).1)
    }

    // =========================================================================
    // Children
    // =========================================================================

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// All children with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn children_named_mut<'a>(
        &'a mut self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a mut Element> + 'a {
        self.children.iter_mut().filter(move |c| c.name == name)
    }

    /// Return the first child with the given name, appending an empty one if
    /// none exists.
    pub fn ensure_child(&mut self, name: &str) -> &mut Element {
        let index = match self.children.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.children.push(Element::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Remove every child with the given name. Returns how many were removed.
    pub fn remove_children(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|c| c.name != name);
        before - self.children.len()
    }

    /// Replace the first child named like `child` in place, dropping any
    /// further children of that name. Appends when there is none.
    ///
    /// The replaced child's tail text stays where it was.
    pub fn replace_child(&mut self, mut child: Element) {
        match self.children.iter().position(|c| c.name == child.name) {
            Some(index) => {
                let name = child.name.clone();
                child.tail = self.children[index].tail.take();
                self.children[index] = child;
                let mut seen = 0usize;
                self.children.retain(|c| {
                    if c.name != name {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.children.push(child),
        }
    }

    // =========================================================================
    // Parsing / serialization
    // =========================================================================

    /// Parse a document and return its root element.
    pub fn parse(input: &str) -> Result<Element> {
        let mut reader = Reader::from_str(input);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(Self::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Self::from_start(&start)?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        NetworkError::MalformedInput("unexpected closing tag".to_string())
                    })?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let value = text.unescape()?;
                    Self::append_text(&mut stack, &value)?;
                }
                Event::CData(data) => {
                    let value = String::from_utf8_lossy(&data).into_owned();
                    Self::append_text(&mut stack, &value)?;
                }
                Event::Eof => break,
                // Declarations, comments, PIs and doctypes carry nothing we keep
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(NetworkError::MalformedInput(format!(
                "unclosed element <{}>",
                open.name
            )));
        }

        root.ok_or_else(|| NetworkError::MalformedInput("document has no root element".to_string()))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Element> {
        let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
        for attr in start.attributes() {
            let attr = attr.map_err(|e| NetworkError::MalformedInput(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(element);
            return Ok(());
        }
        if root.is_some() {
            return Err(NetworkError::MalformedInput(
                "document has more than one root element".to_string(),
            ));
        }
        *root = Some(element);
        Ok(())
    }

    /// Text goes to the parent before its first child, and to the previous
    /// sibling's tail after that.
    fn append_text(stack: &mut [Element], value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Ok(());
        }

        let parent = stack.last_mut().ok_or_else(|| {
            NetworkError::MalformedInput("text outside of the root element".to_string())
        })?;
        let slot = match parent.children.last_mut() {
            Some(previous) => &mut previous.tail,
            None => &mut parent.text,
        };
        match slot {
            Some(existing) => existing.push_str(value),
            None => *slot = Some(value.to_string()),
        }
        Ok(())
    }

    /// Serialize the tree, indented with two spaces.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_to(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| NetworkError::Internal(e.to_string()))
    }

    fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_none() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            if let Some(text) = &self.text {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            for child in &self.children {
                child.write_to(writer)?;
            }
            writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        }

        if let Some(tail) = &self.tail {
            writer.write_event(Event::Text(BytesText::new(tail)))?;
        }
        Ok(())
    }
}
