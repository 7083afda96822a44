//! Owned XML element tree built on `quick-xml` events.
//!
//! The transformer needs to mutate entity subtrees (add attributes, drop children) and then
//! serialize them back, so the document is materialized into plain owned [`Element`] values.
//! Names are kept qualified (`md:EntityDescriptor`); lookups compare local names.

// crates.io
use quick_xml::{
	Reader,
	escape::{escape, partial_escape},
	events::{BytesStart, Event},
};
// self
use crate::{_prelude::*, metadata::ParseError};

/// A node inside an [`Element`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
	/// Nested element.
	Element(Element),
	/// Unescaped character data.
	Text(String),
	/// Raw CDATA section content.
	CData(String),
	/// Raw comment content.
	Comment(String),
}

/// An owned XML element with ordered attributes and children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
	/// Qualified element name.
	pub name: String,
	/// Attributes in document order, values unescaped.
	pub attributes: Vec<(String, String)>,
	/// Child nodes in document order.
	pub children: Vec<Node>,
}
impl Element {
	/// Creates an empty element.
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), ..Self::default() }
	}

	/// Element name without its namespace prefix.
	pub fn local_name(&self) -> &str {
		local_name(&self.name)
	}

	/// Value of the attribute with the exact qualified `name`.
	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	}

	/// Replaces the attribute value, or appends the attribute when absent.
	pub fn set_attribute(&mut self, name: &str, value: &str) {
		match self.attributes.iter_mut().find(|(key, _)| key == name) {
			Some((_, current)) => *current = value.to_owned(),
			None => self.attributes.push((name.to_owned(), value.to_owned())),
		}
	}

	/// Namespace declarations (`xmlns` and `xmlns:*`) made on this element.
	pub fn namespace_declarations(&self) -> impl Iterator<Item = &(String, String)> {
		self.attributes.iter().filter(|(key, _)| is_namespace_declaration(key))
	}

	/// Direct child elements.
	pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
		self.children.iter().filter_map(|node| match node {
			Node::Element(element) => Some(element),
			_ => None,
		})
	}

	/// First descendant (depth-first, document order) with the given local name.
	pub fn find(&self, local: &str) -> Option<&Element> {
		self.child_elements().find_map(|child| {
			if child.local_name() == local { Some(child) } else { child.find(local) }
		})
	}

	/// Mutable variant of [`Element::find`].
	pub fn find_mut(&mut self, local: &str) -> Option<&mut Element> {
		for node in &mut self.children {
			if let Node::Element(child) = node {
				if child.local_name() == local {
					return Some(child);
				}
				if let Some(found) = child.find_mut(local) {
					return Some(found);
				}
			}
		}

		None
	}

	/// All descendants with the given local name, in document order.
	pub fn find_all(&self, local: &str) -> Vec<&Element> {
		let mut found = Vec::new();

		self.collect(local, &mut found);

		found
	}

	fn collect<'a>(&'a self, local: &str, found: &mut Vec<&'a Element>) {
		for child in self.child_elements() {
			if child.local_name() == local {
				found.push(child);
			}

			child.collect(local, found);
		}
	}

	/// Concatenated text and CDATA content of the direct children.
	pub fn text(&self) -> String {
		self.children
			.iter()
			.filter_map(|node| match node {
				Node::Text(text) | Node::CData(text) => Some(text.as_str()),
				_ => None,
			})
			.collect()
	}

	/// Serializes the element and its subtree.
	pub fn to_xml(&self) -> String {
		let mut out = String::new();

		self.write(&mut out);

		out
	}

	fn write(&self, out: &mut String) {
		out.push('<');
		out.push_str(&self.name);

		for (key, value) in &self.attributes {
			out.push(' ');
			out.push_str(key);
			out.push_str("=\"");
			out.push_str(&escape(value.as_str()));
			out.push('"');
		}

		if self.children.is_empty() {
			out.push_str("/>");

			return;
		}

		out.push('>');

		for child in &self.children {
			match child {
				Node::Element(element) => element.write(out),
				Node::Text(text) => out.push_str(&partial_escape(text.as_str())),
				Node::CData(data) => {
					out.push_str("<![CDATA[");
					out.push_str(data);
					out.push_str("]]>");
				},
				Node::Comment(comment) => {
					out.push_str("<!--");
					out.push_str(comment);
					out.push_str("-->");
				},
			}
		}

		out.push_str("</");
		out.push_str(&self.name);
		out.push('>');
	}
}

/// Strips the namespace prefix from a qualified name.
pub fn local_name(name: &str) -> &str {
	name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Whether an attribute name declares a namespace.
pub fn is_namespace_declaration(name: &str) -> bool {
	name == "xmlns" || name.starts_with("xmlns:")
}

/// Parses a complete document and returns its root element.
pub fn parse(document: &str) -> Result<Element, ParseError> {
	let mut reader = Reader::from_str(document);
	let mut stack: Vec<Element> = Vec::new();
	let mut root = None;

	loop {
		let event = reader.read_event().map_err(|e| ParseError::Xml {
			message: format!("{e} (at byte {})", reader.buffer_position()),
		})?;

		match event {
			Event::Start(start) => stack.push(open_element(&start)?),
			Event::Empty(start) => {
				let element = open_element(&start)?;

				attach(&mut stack, &mut root, element)?;
			},
			Event::End(_) => {
				let element = stack.pop().ok_or_else(|| ParseError::Xml {
					message: "closing tag without a matching opening tag".into(),
				})?;

				attach(&mut stack, &mut root, element)?;
			},
			Event::Text(text) => {
				if let Some(parent) = stack.last_mut() {
					let text = text.unescape().map_err(|e| ParseError::Xml {
						message: format!("invalid character data: {e}"),
					})?;

					parent.children.push(Node::Text(text.into_owned()));
				}
			},
			Event::CData(data) => {
				if let Some(parent) = stack.last_mut() {
					parent.children.push(Node::CData(String::from_utf8_lossy(&data).into_owned()));
				}
			},
			Event::Comment(comment) => {
				if let Some(parent) = stack.last_mut() {
					parent
						.children
						.push(Node::Comment(String::from_utf8_lossy(&comment).into_owned()));
				}
			},
			Event::Eof => break,
			_ => {},
		}
	}

	if !stack.is_empty() {
		return Err(ParseError::Xml { message: "unexpected end of document".into() });
	}

	root.ok_or_else(|| ParseError::Xml { message: "document has no root element".into() })
}

fn open_element(start: &BytesStart) -> Result<Element, ParseError> {
	let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));

	for attribute in start.attributes() {
		let attribute = attribute
			.map_err(|e| ParseError::Xml { message: format!("invalid attribute: {e}") })?;
		let value = attribute
			.unescape_value()
			.map_err(|e| ParseError::Xml { message: format!("invalid attribute value: {e}") })?;

		element
			.attributes
			.push((String::from_utf8_lossy(attribute.key.as_ref()).into_owned(), value.into_owned()));
	}

	Ok(element)
}

fn attach(
	stack: &mut [Element],
	root: &mut Option<Element>,
	element: Element,
) -> Result<(), ParseError> {
	match stack.last_mut() {
		Some(parent) => parent.children.push(Node::Element(element)),
		None if root.is_none() => *root = Some(element),
		None => {
			return Err(ParseError::Xml { message: "document has more than one root element".into() });
		},
	}

	Ok(())
}
