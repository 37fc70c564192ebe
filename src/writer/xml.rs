//! XML archive writer.
//!
//! Records serialize through an explicit element tree instead of any
//! reflective walk: scalar fields become attributes, container fields become
//! nested child elements, and the SQL body is the one CDATA text slot.

use crate::Result;
use crate::log::{Entry, Params};

use std::io::{self, Write};

/// One field value inside an element.
pub enum XmlValue {
    /// Rendered as an attribute on the owning element.
    Scalar(String),
    /// Rendered as a nested child element named after the field key.
    Element(XmlElement),
}

/// An element with ordered fields and an optional CDATA text body.
pub struct XmlElement {
    name: String,
    fields: Vec<(String, XmlValue)>,
    cdata: Option<String>,
}

impl XmlElement {
    pub fn new(name: &str) -> XmlElement {
        XmlElement {
            name: name.to_string(),
            fields: Vec::new(),
            cdata: None,
        }
    }

    pub fn scalar(&mut self, key: &str, value: impl Into<String>) {
        self.fields
            .push((key.to_string(), XmlValue::Scalar(value.into())));
    }

    pub fn child(&mut self, key: &str, element: XmlElement) {
        self.fields
            .push((key.to_string(), XmlValue::Element(element)));
    }

    pub fn cdata(&mut self, text: impl Into<String>) {
        self.cdata = Some(text.into());
    }

    fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "<{}", sanitize_name(&self.name))?;
        for (key, value) in &self.fields {
            if let XmlValue::Scalar(value) = value {
                write!(out, " {}=\"{}\"", sanitize_name(key), escape_attr(value))?;
            }
        }

        let children: Vec<&XmlElement> = self
            .fields
            .iter()
            .filter_map(|(_, value)| match value {
                XmlValue::Element(element) => Some(element),
                XmlValue::Scalar(_) => None,
            })
            .collect();
        if children.is_empty() && self.cdata.is_none() {
            return write!(out, "/>");
        }

        write!(out, ">")?;
        for child in children {
            child.write_to(out)?;
        }
        if let Some(text) = &self.cdata {
            write!(out, "<![CDATA[{}]]>", escape_cdata(text))?;
        }
        write!(out, "</{}>", sanitize_name(&self.name))
    }
}

/// Attribute and element names: any character outside `[A-Za-z0-9_.:-]`
/// becomes `-`.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// A literal `]]>` inside the body would terminate the CDATA section early.
fn escape_cdata(text: &str) -> String {
    text.replace("]]>", "]]&gt;")
}

fn log_element(entry: &Entry) -> XmlElement {
    let mut element = XmlElement::new("log");
    element.scalar("start", entry.start.to_string());
    if let Some(end) = entry.end {
        element.scalar("end", end.to_string());
    }
    if let Some(command) = &entry.command {
        element.scalar("title", command.clone());
    }
    if let Some(table) = &entry.table {
        element.scalar("table", table.clone());
    }
    element.child("params", params_element(&entry.params));
    element
}

fn params_element(params: &Params) -> XmlElement {
    let mut element = XmlElement::new("params");
    let known = [
        ("Time", &params.time),
        ("User@Host", &params.user_host),
        ("Query_time", &params.query_time),
        ("Lock_time", &params.lock_time),
        ("Rows_sent", &params.rows_sent),
        ("Rows_examined", &params.rows_examined),
    ];
    for (key, value) in known {
        if let Some(value) = value {
            element.scalar(key, value.clone());
        }
    }
    for (key, value) in &params.extra {
        element.scalar(key, value.clone());
    }
    element.cdata(params.body.clone());
    element
}

/// XML archive: declaration and stylesheet instruction up front, one `<log>`
/// element per record, window metadata on close when configured.
pub struct XmlWriter<W> {
    out: W,
    window: Option<(i64, i64)>,
}

impl<W: Write> XmlWriter<W> {
    pub fn open(mut out: W, window: Option<(i64, i64)>) -> Result<XmlWriter<W>> {
        out.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n")?;
        out.write_all(b"<?xml-stylesheet type=\"text/xsl\" href=\"archive.xsl\"?>\n")?;
        out.write_all(b"<archive><logs>\n")?;
        Ok(XmlWriter { out, window })
    }

    pub fn write(&mut self, entry: &Entry) -> Result<()> {
        log_element(entry).write_to(&mut self.out)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.out.write_all(b"</logs>")?;
        if let Some((begin, end)) = self.window {
            write!(self.out, "<meta begin=\"{}\" end=\"{}\"/>", begin, end)?;
        }
        self.out.write_all(b"</archive>\n")?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry() -> Entry {
        let mut params = Params::default();
        params.insert("Time", "160521 10:00:00".to_string());
        params.insert("User@Host", "app[app] @ localhost []".to_string());
        params.insert("Query_time", "1.5".to_string());
        params.body = "SET timestamp=1463824800;\nSELECT * FROM users;\n".to_string();
        Entry {
            start: 1463824800,
            end: Some(1463824801.5),
            command: Some("SELECT".to_string()),
            table: Some("users".to_string()),
            params,
        }
    }

    #[test]
    fn sanitizes_attribute_names() {
        assert_eq!(sanitize_name("a b"), "a-b");
        assert_eq!(sanitize_name("Query_time"), "Query_time");
        assert_eq!(sanitize_name("User@Host"), "User-Host");
        assert_eq!(sanitize_name("ns:attr.x-1"), "ns:attr.x-1");
    }

    #[test]
    fn escapes_attribute_values() {
        assert_eq!(escape_attr(r#"a<b>&"c'"#), "a&lt;b&gt;&amp;&quot;c&apos;");
    }

    #[test]
    fn cdata_terminator_roundtrips() {
        let body = "SELECT ']]>' FROM t;";
        let escaped = escape_cdata(body);
        assert_eq!(escaped, "SELECT ']]&gt;' FROM t;");
        assert_eq!(escaped.replace("]]&gt;", "]]>"), body);
    }

    #[test]
    fn log_element_shape() {
        let mut buf = Vec::new();
        log_element(&entry()).write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            concat!(
                r#"<log start="1463824800" end="1463824801.5" title="SELECT" table="users">"#,
                r#"<params Time="160521 10:00:00" User-Host="app[app] @ localhost []" Query_time="1.5">"#,
                "<![CDATA[SET timestamp=1463824800;\nSELECT * FROM users;\n]]>",
                "</params></log>"
            )
        );
    }

    #[test]
    fn document_framing_with_window_metadata() {
        let mut buf = Vec::new();
        let mut writer = XmlWriter::open(&mut buf, Some((100, 200))).unwrap();
        writer.write(&entry()).unwrap();
        writer.close().unwrap();

        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(text.contains("<?xml-stylesheet type=\"text/xsl\" href=\"archive.xsl\"?>"));
        assert!(text.contains("<archive><logs>\n"));
        assert!(text.ends_with("</logs><meta begin=\"100\" end=\"200\"/></archive>\n"));
    }

    #[test]
    fn document_framing_without_window() {
        let mut buf = Vec::new();
        let writer = XmlWriter::open(&mut buf, None).unwrap();
        writer.close().unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with("<archive><logs>\n</logs></archive>\n"));
    }
}
