use crate::error::Result;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use std::collections::BTreeMap;
use std::io::Cursor;

static CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// 解析后的`[Content_Types].xml`：扩展名默认类型以及部件覆盖类型
#[derive(Debug, Default)]
pub(crate) struct ContentTypes {
    pub defaults: BTreeMap<String, String>,
    pub overrides: BTreeMap<String, String>,
}

pub(crate) fn extension(path: &str) -> Option<String> {
    let file = path.rsplit('/').next()?;
    file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

impl ContentTypes {
    pub fn parse(xml_data: &[u8]) -> Result<Self> {
        let mut reader = quick_xml::Reader::from_reader(xml_data);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut types = ContentTypes::default();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Empty(e) | Event::Start(e) => {
                    let mut key = None;
                    let mut content_type = None;
                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"Extension" | b"PartName" => {
                                key = Some(attr.unescape_value()?.into_owned())
                            }
                            b"ContentType" => {
                                content_type = Some(attr.unescape_value()?.into_owned())
                            }
                            _ => {}
                        }
                    }
                    if let (Some(key), Some(content_type)) = (key, content_type) {
                        match e.name().as_ref() {
                            b"Default" => {
                                types.defaults.insert(key.to_ascii_lowercase(), content_type);
                            }
                            b"Override" => {
                                types.overrides.insert(key, content_type);
                            }
                            _ => {}
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(types)
    }

    /// 部件的内容类型：优先使用覆盖类型，否则使用扩展名默认类型
    /// @param path 部件路径
    pub fn lookup(&self, path: &str) -> Option<&str> {
        self.overrides
            .get(path)
            .or_else(|| self.defaults.get(&extension(path)?))
            .map(String::as_str)
    }
}

/// 生成`[Content_Types].xml`，内容类型与扩展名默认类型相同的部件不需要覆盖
pub(crate) fn write_content_types<'a>(
    defaults: &BTreeMap<String, String>,
    parts: impl Iterator<Item = (&'a str, &'a str)>,
) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    writer.write_event(Event::Start(
        BytesStart::new("Types").with_attributes([("xmlns", CONTENT_TYPES_NS)]),
    ))?;

    for (ext, content_type) in defaults {
        writer.write_event(Event::Empty(BytesStart::new("Default").with_attributes([
            ("Extension", ext.as_str()),
            ("ContentType", content_type.as_str()),
        ])))?;
    }
    for (path, content_type) in parts {
        let default = extension(path).and_then(|ext| defaults.get(&ext));
        if default.map(String::as_str) != Some(content_type) {
            writer.write_event(Event::Empty(BytesStart::new("Override").with_attributes([
                ("PartName", path),
                ("ContentType", content_type),
            ])))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("Types")))?;
    Ok(writer.into_inner().into_inner())
}
