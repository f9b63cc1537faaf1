//! Reading and writing OSM XML documents.
//!
//! Only the attributes the filter needs are interpreted. Everything else (extra
//! attributes, tags, unknown elements) is kept as parsed and written back in the
//! same order.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
    str::FromStr,
};

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};
use tempfile::NamedTempFile;

use crate::{
    find_attribute, Attributes, Bounds, Content, Element, Entity, Error, Member, MemberType, Node,
    Osm, OsmId, Relation, Result, Way,
};

pub fn read_file(path: &Path) -> Result<Osm> {
    let file = File::open(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    from_reader(BufReader::new(file))
}

pub fn from_reader<R: BufRead>(input: R) -> Result<Osm> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(false);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position();
        let xml_error = |source: quick_xml::Error| Error::Xml { position, source };

        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Eof => break,
            Event::Start(e) => stack.push(read_element(&e).map_err(xml_error)?),
            Event::Empty(e) => {
                let element = read_element(&e).map_err(xml_error)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element)?;
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(xml_error)?.into_owned();
                // indentation between elements
                if text.trim().is_empty() {
                    buf.clear();
                    continue;
                }
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Content::Text(text));
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8(e.into_inner().into_owned())
                    .map_err(|err| xml_error(err.utf8_error().into()))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Content::Text(text));
                }
            }
            // declarations, comments, processing instructions and doctypes are not kept
            _ => (),
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(Error::parse(&open.name, "element is never closed"));
    }
    let root = root.ok_or_else(|| Error::parse("osm", "document has no root element"))?;
    Osm::try_from(root)
}

fn read_element(start: &BytesStart) -> quick_xml::Result<Element> {
    let name = std::str::from_utf8(start.name().as_ref())?.to_string();
    let mut attributes = Attributes::new();
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = std::str::from_utf8(attribute.key.as_ref())?.to_string();
        let value = attribute.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Content::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::parse(&element.name, "second root element")),
    }
    Ok(())
}

fn required_id(element: &str, attributes: &Attributes) -> Result<OsmId> {
    find_attribute(attributes, "id")
        .map(str::to_string)
        .ok_or_else(|| Error::parse(element, "missing `id` attribute"))
}

fn optional_ref(attributes: &Attributes) -> Option<OsmId> {
    find_attribute(attributes, "ref").map(str::to_string)
}

fn required<T: FromStr>(element: &str, attributes: &Attributes, key: &str) -> Result<T> {
    let value = find_attribute(attributes, key)
        .ok_or_else(|| Error::parse(element, format!("missing `{}` attribute", key)))?;
    value
        .trim()
        .parse()
        .map_err(|_| Error::parse(element, format!("`{}` has invalid value {:?}", key, value)))
}

impl TryFrom<Element> for Osm {
    type Error = Error;

    fn try_from(root: Element) -> Result<Self> {
        if root.name != "osm" {
            return Err(Error::parse(
                &root.name,
                "expected an <osm> document root",
            ));
        }

        let mut children = Vec::with_capacity(root.children.len());
        for child in root.children {
            let element = match child {
                Content::Element(element) => element,
                text @ Content::Text(_) => {
                    children.push(Entity::Other(text));
                    continue;
                }
            };
            children.push(match element.name.as_str() {
                "node" => Entity::Node(Node::try_from(element)?),
                "way" => Entity::Way(Way::try_from(element)?),
                "relation" => Entity::Relation(Relation::try_from(element)?),
                "bounds" => Entity::Bounds(Bounds::try_from(element)?),
                _ => Entity::Other(Content::Element(element)),
            });
        }
        Ok(Osm {
            attributes: root.attributes,
            children,
        })
    }
}

impl TryFrom<Element> for Node {
    type Error = Error;

    fn try_from(element: Element) -> Result<Self> {
        Ok(Node {
            id: required_id("node", &element.attributes)?,
            lat: required("node", &element.attributes, "lat")?,
            lon: required("node", &element.attributes, "lon")?,
            attributes: element.attributes,
            children: element.children,
        })
    }
}

impl TryFrom<Element> for Way {
    type Error = Error;

    fn try_from(element: Element) -> Result<Self> {
        let id = required_id("way", &element.attributes)?;
        let node_refs = element
            .children
            .iter()
            .filter_map(|child| match child {
                Content::Element(nd) if nd.name == "nd" => Some(optional_ref(&nd.attributes)),
                _ => None,
            })
            .collect();

        Ok(Way {
            id,
            node_refs,
            attributes: element.attributes,
            children: element.children,
        })
    }
}

impl TryFrom<Element> for Relation {
    type Error = Error;

    fn try_from(element: Element) -> Result<Self> {
        let id = required_id("relation", &element.attributes)?;
        let member = element
            .children
            .iter()
            .filter_map(|child| match child {
                Content::Element(member) if member.name == "member" => Some(Member {
                    member_type: MemberType::from(member.attribute("type")),
                    member_ref: optional_ref(&member.attributes),
                    role: member.attribute("role").unwrap_or_default().to_string(),
                }),
                _ => None,
            })
            .collect();

        Ok(Relation {
            id,
            member,
            attributes: element.attributes,
            children: element.children,
        })
    }
}

impl TryFrom<Element> for Bounds {
    type Error = Error;

    fn try_from(element: Element) -> Result<Self> {
        Ok(Bounds {
            min_lat: required("bounds", &element.attributes, "minlat")?,
            min_lon: required("bounds", &element.attributes, "minlon")?,
            max_lat: required("bounds", &element.attributes, "maxlat")?,
            max_lon: required("bounds", &element.attributes, "maxlon")?,
            attributes: element.attributes,
        })
    }
}

/// Writes `osm` to `path` through a temporary file in the same directory, so the
/// destination either keeps its previous content or holds the complete new document.
pub fn write_file(osm: &Osm, path: &Path) -> Result<()> {
    let write_error = |source: io::Error| Error::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(write_error)?;
    write_document(osm, BufWriter::new(file.as_file_mut()), path)?;
    file.persist(path).map_err(|err| write_error(err.error))?;
    Ok(())
}

fn write_document<W: Write>(osm: &Osm, mut output: W, path: &Path) -> Result<()> {
    to_writer(osm, &mut output).map_err(|source| Error::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    output.flush().map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn to_writer<W: Write>(osm: &Osm, output: W) -> quick_xml::Result<()> {
    let mut writer = Writer::new_with_indent(output, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(start_tag("osm", &osm.attributes)))?;

    for child in &osm.children {
        match child {
            Entity::Bounds(bounds) => {
                write_element(&mut writer, "bounds", &bounds.attributes, &[])?
            }
            Entity::Node(node) => {
                write_element(&mut writer, "node", &node.attributes, &node.children)?
            }
            Entity::Way(way) => write_element(&mut writer, "way", &way.attributes, &way.children)?,
            Entity::Relation(relation) => {
                write_element(&mut writer, "relation", &relation.attributes, &relation.children)?
            }
            Entity::Other(content) => write_content(&mut writer, content)?,
        }
    }

    writer.write_event(Event::End(BytesEnd::new("osm")))?;
    writer.into_inner().write_all(b"\n")?;
    Ok(())
}

pub fn to_string(osm: &Osm) -> quick_xml::Result<String> {
    let mut buffer = Vec::new();
    to_writer(osm, &mut buffer)?;
    String::from_utf8(buffer).map_err(|err| err.utf8_error().into())
}

fn start_tag<'a>(name: &'a str, attributes: &'a Attributes) -> BytesStart<'a> {
    BytesStart::new(name).with_attributes(
        attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str())),
    )
}

fn write_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    attributes: &Attributes,
    children: &[Content],
) -> quick_xml::Result<()> {
    if children.is_empty() {
        return writer.write_event(Event::Empty(start_tag(name, attributes)));
    }
    writer.write_event(Event::Start(start_tag(name, attributes)))?;
    for child in children {
        write_content(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))
}

fn write_content<W: Write>(writer: &mut Writer<W>, content: &Content) -> quick_xml::Result<()> {
    match content {
        Content::Element(element) => {
            write_element(writer, &element.name, &element.attributes, &element.children)
        }
        Content::Text(text) => writer.write_event(Event::Text(BytesText::new(text))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="JOSM">
  <note>The data included in this document is from www.openstreetmap.org.</note>
  <bounds minlat="-1.6" minlon="-48.5" maxlat="-1.4" maxlon="-48.4"/>
  <node id="1" visible="true" version="3" lat="-1.50" lon="-48.45" user="a&amp;b">
    <tag k="name" v="Praça &quot;Central&quot;"/>
  </node>
  <node id="-2" lat="-1.49" lon="-48.44"/>
  <way id="10" version="1">
    <nd ref="1"/>
    <tag k="highway" v="residential"/>
    <nd ref="-2"/>
  </way>
  <relation id="100">
    <member type="way" ref="10" role="outer"/>
    <member type="node" ref="1"/>
    <tag k="type" v="multipolygon"/>
  </relation>
</osm>
"#;

    fn some(id: &str) -> Option<OsmId> {
        Some(id.to_string())
    }

    #[test]
    fn parses_entities_and_references() {
        let osm = from_reader(SAMPLE.as_bytes()).unwrap();
        let nodes: Vec<&Node> = osm.nodes().collect();
        let way = osm.ways().next().unwrap();
        let relation = osm.relations().next().unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, "1");
        assert_eq!(nodes[0].lat, -1.5);
        assert_eq!(nodes[1].id, "-2");
        assert_eq!(way.node_refs, vec![some("1"), some("-2")]);
        assert_eq!(
            relation.member,
            vec![
                Member {
                    member_type: MemberType::Way,
                    member_ref: some("10"),
                    role: "outer".to_string(),
                },
                Member {
                    member_type: MemberType::Node,
                    member_ref: some("1"),
                    role: String::new(),
                },
            ]
        );
        assert_eq!(osm.bounds().unwrap().max_lon, -48.4);
        assert!(matches!(osm.children[0], Entity::Other(Content::Element(_))));
    }

    #[test]
    fn ids_are_kept_as_written() {
        let xml = r#"<osm>
  <node id="n1" lat="0.5" lon="0.5"/>
  <node id="8" lat="0.5" lon="0.5"/>
  <way id="w1"><nd ref="n1"/><nd ref="08"/></way>
</osm>"#;
        let osm = from_reader(xml.as_bytes()).unwrap();

        assert_eq!(osm.nodes().next().unwrap().id, "n1");
        assert_eq!(osm.ways().next().unwrap().node_refs, vec![some("n1"), some("08")]);
    }

    #[test]
    fn missing_type_and_ref_are_not_fatal() {
        let xml = r#"<osm>
  <way id="1"><nd ref="1"/><nd/></way>
  <relation id="2"><member ref="1" role=""/><member type="node"/></relation>
</osm>"#;
        let osm = from_reader(xml.as_bytes()).unwrap();
        let relation = osm.relations().next().unwrap();

        assert_eq!(osm.ways().next().unwrap().node_refs, vec![some("1"), None]);
        assert_eq!(relation.member[0].member_type, MemberType::Missing);
        assert_eq!(relation.member[1].member_ref, None);
    }

    #[test]
    fn unescapes_attribute_values() {
        let osm = from_reader(SAMPLE.as_bytes()).unwrap();
        let node = osm.nodes().next().unwrap();

        assert_eq!(find_attribute(&node.attributes, "user"), Some("a&b"));
        assert_eq!(
            node.tags().collect::<Vec<_>>(),
            vec![("name", "Praça \"Central\"")]
        );
    }

    #[test]
    fn written_document_parses_back_unchanged() {
        let osm = from_reader(SAMPLE.as_bytes()).unwrap();
        let written = to_string(&osm).unwrap();
        let reparsed = from_reader(written.as_bytes()).unwrap();

        assert_eq!(osm, reparsed);
    }

    #[test]
    fn keeps_attribute_order_and_child_position() {
        let osm = from_reader(SAMPLE.as_bytes()).unwrap();
        let written = to_string(&osm).unwrap();

        assert!(written.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(written.contains(
            r#"<node id="1" visible="true" version="3" lat="-1.50" lon="-48.45" user="a&amp;b">"#
        ));
        let nd = written.find(r#"<nd ref="1"/>"#).unwrap();
        let tag = written.find(r#"<tag k="highway" v="residential"/>"#).unwrap();
        let last_nd = written.find(r#"<nd ref="-2"/>"#).unwrap();
        assert!(nd < tag && tag < last_nd);
        assert!(written.contains("<note>The data included in this document is from www.openstreetmap.org.</note>"));
    }

    #[test]
    fn interleaved_root_children_keep_document_order() {
        let xml = r#"<osm>
  <node id="1" lat="0" lon="0"/>
  <way id="2"><nd ref="1"/></way>
  <bounds minlat="0" minlon="0" maxlat="1" maxlon="1"/>
  <node id="3" lat="0" lon="0"/>
  <note>  padded  text </note>
</osm>"#;
        let osm = from_reader(xml.as_bytes()).unwrap();
        let written = to_string(&osm).unwrap();

        let positions: Vec<usize> = [
            r#"<node id="1""#,
            r#"<way id="2">"#,
            "<bounds ",
            r#"<node id="3""#,
            "<note>  padded  text </note>",
        ]
        .iter()
        .map(|needle| written.find(needle).unwrap())
        .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]), "{}", written);
        assert_eq!(from_reader(written.as_bytes()).unwrap(), osm);
    }

    #[test]
    fn non_numeric_coordinate_is_a_parse_error() {
        let xml = r#"<osm><node id="1" lat="north" lon="1.0"/></osm>"#;
        match from_reader(xml.as_bytes()) {
            Err(Error::Parse { element, message }) => {
                assert_eq!(element, "node");
                assert!(message.contains("lat"), "{}", message);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn missing_id_is_a_parse_error() {
        let xml = r#"<osm><way><nd ref="1"/></way></osm>"#;
        assert!(matches!(
            from_reader(xml.as_bytes()),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn mismatched_tags_are_an_xml_error() {
        let xml = r#"<osm><node id="1" lat="0" lon="0"></way></osm>"#;
        assert!(matches!(from_reader(xml.as_bytes()), Err(Error::Xml { .. })));
    }

    #[test]
    fn wrong_root_is_rejected() {
        let xml = r#"<gpx><trk/></gpx>"#;
        assert!(matches!(
            from_reader(xml.as_bytes()),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn write_file_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.osm");
        std::fs::write(&path, "stale").unwrap();

        let osm = from_reader(SAMPLE.as_bytes()).unwrap();
        write_file(&osm, &path).unwrap();

        assert_eq!(read_file(&path).unwrap(), osm);
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.osm");

        let osm = from_reader(SAMPLE.as_bytes()).unwrap();
        assert!(matches!(write_file(&osm, &path), Err(Error::Write { .. })));
        assert!(!path.exists());
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn serialization_failure_keeps_its_source() {
        let osm = from_reader(SAMPLE.as_bytes()).unwrap();
        let err = write_document(&osm, BrokenPipe, Path::new("out.osm")).unwrap_err();

        assert!(matches!(err, Error::Serialize { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn reading_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_file(&dir.path().join("nope.osm")),
            Err(Error::Read { .. })
        ));
    }
}
