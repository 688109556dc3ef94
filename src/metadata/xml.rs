//! Minimal element index over a Sentinel-2 metadata XML document
//!
//! The SAFE and tile metadata files are small (tens of kilobytes), so the
//! whole document is read once into a flat arena of elements. Lookups use
//! `/`-separated paths of local names; namespace prefixes such as `n1:` are
//! accepted in paths and ignored when matching.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use std::path::Path;

use crate::error::MetadataError;

#[derive(Debug, Clone)]
struct Node {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<usize>,
}

/// A parsed XML document
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<Node>,
    root: Option<usize>,
}

/// Borrowed handle to one element of an [`XmlDocument`]
#[derive(Debug, Clone, Copy)]
pub struct XmlElement<'a> {
    doc: &'a XmlDocument,
    index: usize,
}

impl XmlDocument {
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let reader = Reader::from_file(path)?;
        Self::parse(reader)
    }

    pub fn parse_str(xml: &str) -> Result<Self, MetadataError> {
        Self::parse(Reader::from_str(xml))
    }

    fn parse<R: BufRead>(mut reader: Reader<R>) -> Result<Self, MetadataError> {
        reader.trim_text(true);

        let mut doc = XmlDocument {
            nodes: Vec::new(),
            root: None,
        };
        let mut stack: Vec<usize> = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let index = doc.push_node(&e, stack.last().copied())?;
                    stack.push(index);
                }
                Event::Empty(e) => {
                    doc.push_node(&e, stack.last().copied())?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(e) => {
                    if let Some(&current) = stack.last() {
                        let text = e.unescape()?;
                        doc.nodes[current].text.push_str(&text);
                    }
                }
                Event::CData(e) => {
                    if let Some(&current) = stack.last() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        doc.nodes[current].text.push_str(&text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(doc)
    }

    fn push_node(&mut self, e: &BytesStart, parent: Option<usize>) -> Result<usize, MetadataError> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }

        let index = self.nodes.len();
        self.nodes.push(Node {
            name,
            attributes,
            text: String::new(),
            children: Vec::new(),
        });

        match parent {
            Some(p) => self.nodes[p].children.push(index),
            None if self.root.is_none() => self.root = Some(index),
            None => {}
        }

        Ok(index)
    }

    pub fn root(&self) -> Option<XmlElement<'_>> {
        self.root.map(|index| XmlElement { doc: self, index })
    }

    /// Find an element by a path relative to the root element.
    pub fn find(&self, path: &str) -> Option<XmlElement<'_>> {
        self.root()?.find(path)
    }

    pub fn find_all(&self, path: &str) -> Vec<XmlElement<'_>> {
        self.root().map(|r| r.find_all(path)).unwrap_or_default()
    }

    /// Trimmed text of the element at `path`; `None` if missing or empty.
    pub fn find_text(&self, path: &str) -> Option<&str> {
        self.root()?.find_text(path)
    }
}

fn local(segment: &str) -> &str {
    segment.rsplit(':').next().unwrap_or(segment)
}

impl<'a> XmlElement<'a> {
    fn node(&self) -> &'a Node {
        &self.doc.nodes[self.index]
    }

    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    pub fn text(&self) -> &'a str {
        self.node().text.trim()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.node()
            .attributes
            .iter()
            .find(|(k, _)| k == local(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> impl Iterator<Item = XmlElement<'a>> + 'a {
        let doc = self.doc;
        self.node()
            .children
            .iter()
            .map(move |&index| XmlElement { doc, index })
    }

    /// First element matching `path`, searched depth first.
    pub fn find(&self, path: &str) -> Option<XmlElement<'a>> {
        self.find_all(path).into_iter().next()
    }

    /// Every element matching `path`, in document order.
    pub fn find_all(&self, path: &str) -> Vec<XmlElement<'a>> {
        let mut current = vec![*self];
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let name = local(segment);
            current = current
                .iter()
                .flat_map(|e| e.children())
                .filter(|c| c.name() == name)
                .collect();
            if current.is_empty() {
                break;
            }
        }
        current
    }

    pub fn find_text(&self, path: &str) -> Option<&'a str> {
        self.find(path).map(|e| e.text()).filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<n1:Level-2A_User_Product xmlns:n1="https://psd-14.sentinel2.eo.esa.int/PSD/User_Product_Level-2A.xsd">
  <n1:General_Info>
    <Product_Info>
      <PRODUCT_URI>S2B_MSIL2A_20230122T231849_N0509_R030_T01UBT_20230123T001557.SAFE</PRODUCT_URI>
      <Datatake datatakeIdentifier="GS2B_20230122T231849_030716_N05.09">
        <SPACECRAFT_NAME>Sentinel-2B</SPACECRAFT_NAME>
      </Datatake>
    </Product_Info>
    <Band_List>
      <BAND_NAME>B1</BAND_NAME>
      <BAND_NAME>B2</BAND_NAME>
      <EMPTY/>
    </Band_List>
  </n1:General_Info>
  <Note><![CDATA[a < b]]></Note>
</n1:Level-2A_User_Product>"#;

    #[test]
    fn test_find_text_ignores_prefixes() {
        let doc = XmlDocument::parse_str(XML).unwrap();
        assert_eq!(doc.root().unwrap().name(), "Level-2A_User_Product");
        assert_eq!(
            doc.find_text("n1:General_Info/Product_Info/PRODUCT_URI"),
            Some("S2B_MSIL2A_20230122T231849_N0509_R030_T01UBT_20230123T001557.SAFE")
        );
        assert_eq!(
            doc.find_text("General_Info/Product_Info/Datatake/SPACECRAFT_NAME"),
            Some("Sentinel-2B")
        );
    }

    #[test]
    fn test_attributes_and_lists() {
        let doc = XmlDocument::parse_str(XML).unwrap();
        let datatake = doc.find("n1:General_Info/Product_Info/Datatake").unwrap();
        assert_eq!(
            datatake.attr("datatakeIdentifier"),
            Some("GS2B_20230122T231849_030716_N05.09")
        );
        assert_eq!(datatake.attr("missing"), None);

        let bands: Vec<&str> = doc
            .find_all("n1:General_Info/Band_List/BAND_NAME")
            .iter()
            .map(|e| e.text())
            .collect();
        assert_eq!(bands, vec!["B1", "B2"]);
    }

    #[test]
    fn test_missing_and_empty() {
        let doc = XmlDocument::parse_str(XML).unwrap();
        assert!(doc.find("n1:General_Info/Nope").is_none());
        assert!(doc.find_text("n1:General_Info/Band_List/EMPTY").is_none());
        assert_eq!(doc.find_text("Note"), Some("a < b"));
    }

    #[test]
    fn test_malformed_document() {
        assert!(XmlDocument::parse_str("<a><b></a>").is_err());
    }
}
