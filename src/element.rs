// smupdate - show and update SnapMirror relationships over ONTAP ZAPI
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Element trees exchanged with the management API.
//!
//! Requests are written as XML from an [`Element`]; responses are read back
//! into a [`Response`] whose result elements use the same tree type.

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use std::fmt;
use thiserror::Error;

/// A named element: either a scalar leaf or a node holding ordered children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Leaf { name: String, value: String },
    Node { name: String, children: Vec<Element> },
}

impl Element {
    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> Self {
        Element::Leaf {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn node(name: impl Into<String>, children: Vec<Element>) -> Self {
        Element::Node {
            name: name.into(),
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Element::Leaf { name, .. } | Element::Node { name, .. } => name,
        }
    }

    /// Scalar value of a leaf. Nodes have none.
    pub fn value(&self) -> Option<&str> {
        match self {
            Element::Leaf { value, .. } => Some(value),
            Element::Node { .. } => None,
        }
    }

    pub fn children(&self) -> &[Element] {
        match self {
            Element::Leaf { .. } => &[],
            Element::Node { children, .. } => children,
        }
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children().iter().find(|c| c.name() == name)
    }

    pub fn child_string(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Element::value)
    }

    fn into_children(self) -> Vec<Element> {
        match self {
            Element::Leaf { .. } => Vec::new(),
            Element::Node { children, .. } => children,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Leaf { name, value } => {
                write!(f, "<{name}>{}</{name}>", escape(value.as_str()))
            }
            Element::Node { name, children } => {
                write!(f, "<{name}>")?;
                for child in children {
                    write!(f, "{child}")?;
                }
                write!(f, "</{name}>")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Passed,
    Failed,
}

/// Outcome of one API call: the `results` element of the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub reason: Option<String>,
    pub errno: Option<i32>,
    pub results: Vec<Element>,
}

impl Response {
    pub fn failed(errno: i32, reason: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            reason: Some(reason.into()),
            errno: Some(errno),
            results: Vec::new(),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == Status::Passed
    }

    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or_default()
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.results.iter().find(|c| c.name() == name)
    }

    pub fn child_string(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Element::value)
    }
}

#[derive(Debug, Error)]
pub enum XmlError {
    #[error(transparent)]
    Syntax(#[from] quick_xml::Error),
    #[error(transparent)]
    Attribute(#[from] AttrError),
    #[error("response document is empty")]
    Empty,
    #[error("unexpected root element `{0}`, expected `netapp`")]
    UnexpectedRoot(String),
    #[error("response has no `results` element")]
    MissingResults,
}

struct Frame {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Frame {
    fn finish(self) -> Element {
        if self.children.is_empty() {
            Element::leaf(self.name, self.text)
        } else {
            Element::node(self.name, self.children)
        }
    }
}

struct ResultsHeader {
    status: Status,
    reason: Option<String>,
    errno: Option<i32>,
}

/// Parses a `<netapp><results status=...>...</results></netapp>` reply.
pub fn parse_response(xml: &str) -> Result<Response, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Element> = None;
    let mut header: Option<ResultsHeader> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = local_name(&start);
                if stack.len() == 1 && name == "results" {
                    header = Some(read_header(&start)?);
                }
                stack.push(Frame {
                    name,
                    text: String::new(),
                    children: Vec::new(),
                });
            }
            Event::Empty(start) => {
                let name = local_name(&start);
                if stack.len() == 1 && name == "results" {
                    header = Some(read_header(&start)?);
                }
                attach(&mut stack, &mut root, Element::leaf(name, ""));
            }
            Event::Text(text) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => {
                if let Some(frame) = stack.pop() {
                    attach(&mut stack, &mut root, frame.finish());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let root = root.ok_or(XmlError::Empty)?;
    if root.name() != "netapp" {
        return Err(XmlError::UnexpectedRoot(root.name().to_string()));
    }
    let header = header.ok_or(XmlError::MissingResults)?;
    let results = root
        .into_children()
        .into_iter()
        .find(|c| c.name() == "results")
        .map(Element::into_children)
        .unwrap_or_default();

    Ok(Response {
        status: header.status,
        reason: header.reason,
        errno: header.errno,
        results,
    })
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attach(stack: &mut [Frame], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn read_header(start: &BytesStart<'_>) -> Result<ResultsHeader, XmlError> {
    let mut header = ResultsHeader {
        status: Status::Failed,
        reason: None,
        errno: None,
    };
    for attr in start.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.local_name().as_ref() {
            b"status" if value == "passed" => header.status = Status::Passed,
            b"reason" => header.reason = Some(value.into_owned()),
            b"errno" => header.errno = value.trim().parse().ok(),
            _ => {}
        }
    }
    Ok(header)
}
