use crate::error::Result;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use std::io::Cursor;

static RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
static EXTERNAL_MODE: &str = "External";

/// 从源部件（或包根）到目标的关系
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    id: String,
    rel_type: String,
    // 部件的绝对路径，外部目标为原始URI
    target: String,
    external: bool,
}

impl Relationship {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    pub(crate) fn internal(id: String, rel_type: &str, target: &str) -> Self {
        Relationship {
            id,
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external: false,
        }
    }
}

/// 下一个rIdN：当前最大编号加一
pub(crate) fn next_relationship_id(rels: &[Relationship]) -> String {
    let max = rels
        .iter()
        .filter_map(|rel| rel.id.strip_prefix("rId")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

/// 关系文件路径，/word/document.xml对应/word/_rels/document.xml.rels，/对应/_rels/.rels
pub(crate) fn rels_path(source: &str) -> String {
    let (dir, file) = source.rsplit_once('/').unwrap_or(("", source));
    format!("{dir}/_rels/{file}.rels")
}

/// rels_path的逆运算，不是关系文件时返回None
pub(crate) fn source_of_rels(path: &str) -> Option<String> {
    let file = path.strip_suffix(".rels")?;
    let (dir, file) = file.rsplit_once('/')?;
    let dir = dir.strip_suffix("/_rels").or_else(|| (dir == "_rels").then_some(""))?;
    Some(format!("{dir}/{file}"))
}

fn base_dir(source: &str) -> &str {
    source.rsplit_once('/').map_or("/", |(dir, _)| dir)
}

fn normalize(segments: impl Iterator<Item = impl AsRef<str>>) -> String {
    let mut out: Vec<String> = Vec::new();
    for segment in segments {
        match segment.as_ref() {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s.to_string()),
        }
    }
    format!("/{}", out.join("/"))
}

/// 将.rels文件中的目标解析为绝对路径
pub(crate) fn resolve_target(source: &str, target: &str) -> String {
    if target.starts_with('/') {
        normalize(target.split('/'))
    } else {
        normalize(base_dir(source).split('/').chain(target.split('/')))
    }
}

/// 将绝对路径表示为相对于源部件目录的路径
pub(crate) fn relative_target(source: &str, target: &str) -> String {
    let base: Vec<&str> = base_dir(source).split('/').filter(|s| !s.is_empty()).collect();
    let target: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();
    let dirs = &target[..target.len().saturating_sub(1)];
    let common = base.iter().zip(dirs).take_while(|(a, b)| a == b).count();

    let mut segments = vec![".."; base.len() - common];
    segments.extend(&target[common..]);
    segments.join("/")
}

/// 读取关系文件
/// @param source 关系所属的部件路径
/// @param xml_data 关系文件内容
pub(crate) fn parse_relationships(source: &str, xml_data: &[u8]) -> Result<Vec<Relationship>> {
    let mut reader = quick_xml::Reader::from_reader(xml_data);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.name().as_ref() == b"Relationship" => {
                let mut id = String::new();
                let mut rel_type = String::new();
                let mut target = String::new();
                let mut external = false;
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"Id" => id = attr.unescape_value()?.into_owned(),
                        b"Type" => rel_type = attr.unescape_value()?.into_owned(),
                        b"Target" => target = attr.unescape_value()?.into_owned(),
                        b"TargetMode" => external = attr.unescape_value()? == EXTERNAL_MODE,
                        _ => {}
                    }
                }
                if !id.is_empty() {
                    if !external {
                        target = resolve_target(source, &target);
                    }
                    rels.push(Relationship {
                        id,
                        rel_type,
                        target,
                        external,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

pub(crate) fn write_relationships(source: &str, rels: &[Relationship]) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    writer.write_event(Event::Start(
        BytesStart::new("Relationships").with_attributes([("xmlns", RELATIONSHIPS_NS)]),
    ))?;

    for rel in rels {
        let target = if rel.external {
            rel.target.clone()
        } else {
            relative_target(source, &rel.target)
        };
        let mut relationship = BytesStart::new("Relationship").with_attributes([
            ("Id", rel.id.as_str()),
            ("Type", rel.rel_type.as_str()),
            ("Target", target.as_str()),
        ]);
        if rel.external {
            relationship.push_attribute(("TargetMode", EXTERNAL_MODE));
        }
        writer.write_event(Event::Empty(relationship))?;
    }

    writer.write_event(Event::End(BytesEnd::new("Relationships")))?;
    Ok(writer.into_inner().into_inner())
}
