//! SOAP 1.1 envelope rendering and response parsing.
//!
//! Requests are rendered from JSON: object fields become child elements,
//! arrays become repeated elements, scalars become text. Responses are parsed
//! back into JSON keyed by local element names, so a fault lands at
//! `Envelope.Body.Fault` regardless of the namespace prefix the server used.

use quick_xml::escape::{escape, resolve_xml_entity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::RemoteError;

/// SOAP 1.1 envelope namespace.
pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Render a request envelope calling `method` in `namespace` with `args`.
///
/// The method name and every object key become element names, so each must
/// be a valid unprefixed XML name.
pub fn build_request(namespace: &str, method: &str, args: &Value) -> Result<String, RemoteError> {
    check_element_name(method)?;
    let mut body = String::new();
    match args {
        Value::Object(fields) => {
            for (name, value) in fields {
                write_element(&mut body, name, value)?;
            }
        }
        Value::Null => {}
        scalar => write_text(&mut body, scalar),
    }
    Ok(format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap:Envelope xmlns:soap="{env}" xmlns:tns="{ns}">"#,
            "<soap:Body><tns:{method}>{body}</tns:{method}></soap:Body>",
            "</soap:Envelope>"
        ),
        env = SOAP_ENV_NS,
        ns = escape(namespace),
        method = method,
        body = body,
    ))
}

/// Whether `name` is an XML name without a namespace prefix (an NCName).
pub fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn check_element_name(name: &str) -> Result<(), RemoteError> {
    if is_element_name(name) {
        Ok(())
    } else {
        Err(RemoteError::new(format!(
            "Invalid SOAP request: '{name}' is not a valid XML element name"
        )))
    }
}

fn write_element(out: &mut String, name: &str, value: &Value) -> Result<(), RemoteError> {
    check_element_name(name)?;
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(out, name, item)?;
            }
        }
        Value::Null => {
            out.push('<');
            out.push_str(name);
            out.push_str("/>");
        }
        Value::Object(fields) => {
            out.push('<');
            out.push_str(name);
            out.push('>');
            for (child, value) in fields {
                write_element(out, child, value)?;
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        scalar => {
            out.push('<');
            out.push_str(name);
            out.push('>');
            write_text(out, scalar);
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
    Ok(())
}

fn write_text(out: &mut String, scalar: &Value) {
    match scalar {
        Value::String(s) => out.push_str(&escape(s.as_str())),
        other => out.push_str(&other.to_string()),
    }
}

struct Frame {
    name: String,
    children: Map<String, Value>,
    text: String,
    nil: bool,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Self {
        let nil = start.attributes().flatten().any(|attr| {
            attr.key.local_name().as_ref() == b"nil" && attr.value.as_ref() == b"true"
        });
        Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            children: Map::new(),
            text: String::new(),
            nil,
        }
    }

    fn close(self) -> (String, Value) {
        let value = if self.nil {
            Value::Null
        } else if self.children.is_empty() {
            if self.text.trim().is_empty() {
                Value::String(String::new())
            } else {
                Value::String(self.text)
            }
        } else {
            Value::Object(self.children)
        };
        (self.name, value)
    }
}

fn insert_child(parent: &mut Map<String, Value>, name: String, value: Value) {
    match parent.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.insert(name, value);
        }
    }
}

fn close_frame(stack: &mut [Frame], root: &mut Option<Value>, frame: Frame) {
    let (name, value) = frame.close();
    match stack.last_mut() {
        Some(parent) => insert_child(&mut parent.children, name, value),
        None => {
            let mut doc = Map::new();
            doc.insert(name, value);
            *root = Some(Value::Object(doc));
        }
    }
}

fn parse_error(e: impl std::fmt::Display) -> RemoteError {
    RemoteError::new(format!("Invalid SOAP response: {e}"))
}

/// Parse an XML document into JSON keyed by local element names.
///
/// Repeated sibling elements collapse into an array, leaf elements become
/// strings and `xsi:nil="true"` elements become `null`. Attributes are
/// otherwise dropped.
pub fn parse_response(xml: &str) -> Result<Value, RemoteError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(Frame::open(e)),
            Ok(Event::Empty(ref e)) => close_frame(&mut stack, &mut root, Frame::open(e)),
            Ok(Event::End(_)) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| parse_error("unbalanced closing tag"))?;
                close_frame(&mut stack, &mut root, frame);
            }
            Ok(Event::Text(ref e)) => {
                if let Some(frame) = stack.last_mut() {
                    let text = e.decode().map_err(parse_error)?;
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(frame) = stack.last_mut() {
                    frame
                        .text
                        .push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                if let Some(frame) = stack.last_mut() {
                    if let Some(ch) = e.resolve_char_ref().map_err(parse_error)? {
                        frame.text.push(ch);
                    } else {
                        let name = e.decode().map_err(parse_error)?;
                        let resolved = resolve_xml_entity(&name)
                            .ok_or_else(|| parse_error(format!("unknown entity &{name};")))?;
                        frame.text.push_str(resolved);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(parse_error("unexpected end of document"));
    }
    root.ok_or_else(|| parse_error("empty document"))
}

/// Human-readable message for a parsed fault, SOAP 1.1 or 1.2.
pub fn fault_message(fault: &Value) -> String {
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

    // SOAP 1.1: <faultcode/> and <faultstring/>
    let code = text(fault.get("faultcode"))
        // SOAP 1.2: <Code><Value/></Code> and <Reason><Text/></Reason>
        .or_else(|| text(fault.pointer("/Code/Value")));
    let reason = text(fault.get("faultstring")).or_else(|| text(fault.pointer("/Reason/Text")));

    match (code, reason) {
        (Some(code), Some(reason)) => format!("{code}: {reason}"),
        (None, Some(reason)) => reason,
        (Some(code), None) => code,
        (None, None) => "SOAP fault".to_string(),
    }
}

/// Split a parsed response document into its result or its fault.
///
/// A fault yields a [`RemoteError`] carrying the whole document as root. A
/// successful body yields the content of its single response element.
pub fn into_result(doc: Value) -> Result<Value, RemoteError> {
    if let Some(fault) = doc.pointer("/Envelope/Body/Fault") {
        let message = fault_message(fault);
        return Err(RemoteError::with_root(message, doc));
    }
    let body = doc
        .pointer("/Envelope/Body")
        .ok_or_else(|| parse_error("missing Envelope/Body"))?;
    match body {
        Value::Object(children) if children.len() == 1 => {
            Ok(children.values().next().cloned().unwrap_or(Value::Null))
        }
        Value::String(s) if s.is_empty() => Ok(Value::Null),
        other => Ok(other.clone()),
    }
}
