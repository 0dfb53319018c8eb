use crate::error::{DocxError, Result};
use crate::xml::XmlTree;
use content_types::{ContentTypes, extension, write_content_types};
use log::{debug, info, warn};
use rels::{next_relationship_id, parse_relationships, rels_path, source_of_rels, write_relationships};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

mod content_types;
mod rels;

pub use rels::Relationship;

/// 包级别关系的源名称(/_rels/.rels)
pub static PACKAGE_ROOT: &str = "/";
static CONTENT_TYPES_ENTRY: &str = "[Content_Types].xml";
static RELATIONSHIPS_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.relationships+xml";
static XML_CONTENT_TYPE: &str = "application/xml";
static FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub enum PartData {
    Xml(XmlTree),
    Binary(Vec<u8>),
}

/// 包中的一个部件
#[derive(Debug, Clone)]
pub struct Part {
    path: String,
    content_type: String,
    data: PartData,
}

impl Part {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn data(&self) -> &PartData {
        &self.data
    }

    /// 部件序列化后的内容
    pub fn blob(&self) -> Result<Cow<'_, [u8]>> {
        match &self.data {
            PartData::Binary(bytes) => Ok(Cow::Borrowed(bytes)),
            PartData::Xml(tree) => Ok(Cow::Owned(tree.to_bytes()?)),
        }
    }
}

/// 内存中的OPC包：按路径存储部件，按源部件存储关系
/// 部件路径为绝对路径(/word/document.xml)，关系目标保存为绝对路径，保存时写成相对路径
#[derive(Debug, Clone)]
pub struct Package {
    parts: BTreeMap<String, Part>,
    relationships: BTreeMap<String, Vec<Relationship>>,
    default_content_types: BTreeMap<String, String>,
}

impl Package {
    pub fn new() -> Self {
        let mut default_content_types = BTreeMap::new();
        default_content_types.insert("rels".to_string(), RELATIONSHIPS_CONTENT_TYPE.to_string());
        default_content_types.insert("xml".to_string(), XML_CONTENT_TYPE.to_string());
        Package {
            parts: BTreeMap::new(),
            relationships: BTreeMap::new(),
            default_content_types,
        }
    }

    /// 打开压缩文件
    /// @param path 文件路径
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::read(file)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read(Cursor::new(data))
    }

    pub fn read<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            entries.push((format!("/{}", file.name()), contents));
        }

        let content_types = match entries
            .iter()
            .find(|(name, _)| name[1..] == *CONTENT_TYPES_ENTRY)
        {
            Some((_, contents)) => ContentTypes::parse(contents)?,
            None => ContentTypes::default(),
        };

        let mut package = Package::new();
        package.default_content_types.extend(content_types.defaults.clone());

        for (path, contents) in entries {
            if path[1..] == *CONTENT_TYPES_ENTRY {
                continue;
            }
            if let Some(source) = source_of_rels(&path) {
                let rels = parse_relationships(&source, &contents)?;
                package.relationships.insert(source, rels);
                continue;
            }
            let content_type = match content_types.lookup(&path) {
                Some(content_type) => content_type.to_string(),
                None => {
                    warn!("part {} has no content type", path);
                    FALLBACK_CONTENT_TYPE.to_string()
                }
            };
            package.parts.insert(
                path.clone(),
                Part {
                    path,
                    content_type,
                    data: PartData::Binary(contents),
                },
            );
        }

        info!(
            "loaded package with {} parts and {} relationship sources",
            package.parts.len(),
            package.relationships.len()
        );
        Ok(package)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.write(Cursor::new(Vec::new()))?.into_inner())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        File::create(path)?.write_all(&bytes)?;
        Ok(())
    }

    /// 写入压缩文件
    /// @param writer 写入对象
    pub fn write<W: Write + Seek>(&self, writer: W) -> Result<W> {
        self.check_relationships()?;
        let mut zip_writer = ZipWriter::new(writer);

        zip_writer.start_file(CONTENT_TYPES_ENTRY, entry_options())?;
        let parts = self
            .parts
            .values()
            .map(|part| (part.path.as_str(), part.content_type.as_str()));
        zip_writer.write_all(&write_content_types(&self.default_content_types, parts)?)?;

        for (source, rels) in &self.relationships {
            if rels.is_empty() {
                continue;
            }
            zip_writer.start_file(&rels_path(source)[1..], entry_options())?;
            zip_writer.write_all(&write_relationships(source, rels)?)?;
        }

        for part in self.parts.values() {
            zip_writer.start_file(&part.path[1..], entry_options())?;
            zip_writer.write_all(&part.blob()?)?;
        }

        info!("wrote package with {} parts", self.parts.len());
        Ok(zip_writer.finish()?)
    }

    // 内部关系必须指向包中的部件
    fn check_relationships(&self) -> Result<()> {
        for (source, rels) in &self.relationships {
            for rel in rels.iter().filter(|rel| !rel.is_external()) {
                if !self.parts.contains_key(rel.target()) {
                    return Err(DocxError::MissingPart(format!(
                        "{} (target of {} from {})",
                        rel.target(),
                        rel.id(),
                        source
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get_part(&self, path: &str) -> Option<&Part> {
        self.parts.get(path)
    }

    pub fn contains_part(&self, path: &str) -> bool {
        self.parts.contains_key(path)
    }

    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.values()
    }

    /// 添加部件
    /// @param path 部件路径
    /// @param content_type 部件类型
    /// @param data 部件内容
    pub fn add_part(&mut self, path: &str, content_type: &str, data: PartData) -> Result<&Part> {
        if content_type.is_empty() {
            return Err(DocxError::UnknownContentType(path.to_string()));
        }
        if self.parts.contains_key(path) {
            return Err(DocxError::DuplicatePart(path.to_string()));
        }
        if let Some(ext) = extension(path) {
            self.default_content_types
                .entry(ext)
                .or_insert_with(|| content_type.to_string());
        }
        debug!("add part {} ({})", path, content_type);
        Ok(self.parts.entry(path.to_string()).or_insert(Part {
            path: path.to_string(),
            content_type: content_type.to_string(),
            data,
        }))
    }

    /// 将部件解析为xml，以便直接编辑
    /// @param path 部件路径
    pub fn parse_xml_part(&mut self, path: &str) -> Result<()> {
        let part = self
            .parts
            .get_mut(path)
            .ok_or_else(|| DocxError::MissingPart(path.to_string()))?;
        if let PartData::Binary(bytes) = &part.data {
            part.data = PartData::Xml(XmlTree::parse(bytes)?);
        }
        Ok(())
    }

    pub fn xml_part(&self, path: &str) -> Result<&XmlTree> {
        match self.parts.get(path).map(|part| &part.data) {
            Some(PartData::Xml(tree)) => Ok(tree),
            Some(PartData::Binary(_)) => Err(DocxError::NotXmlPart(path.to_string())),
            None => Err(DocxError::MissingPart(path.to_string())),
        }
    }

    pub fn xml_part_mut(&mut self, path: &str) -> Result<&mut XmlTree> {
        match self.parts.get_mut(path).map(|part| &mut part.data) {
            Some(PartData::Xml(tree)) => Ok(tree),
            Some(PartData::Binary(_)) => Err(DocxError::NotXmlPart(path.to_string())),
            None => Err(DocxError::MissingPart(path.to_string())),
        }
    }

    /// 添加关系
    /// @param source 来源部件路径（包级关系使用 [`PACKAGE_ROOT`]）
    /// @param target 目标部件路径
    /// @param rel_type 关系类型
    /// @return 关系编号 rIdN
    pub fn add_relationship(&mut self, source: &str, target: &str, rel_type: &str) -> Result<String> {
        if source != PACKAGE_ROOT && !self.parts.contains_key(source) {
            return Err(DocxError::MissingPart(source.to_string()));
        }
        if !self.parts.contains_key(target) {
            return Err(DocxError::MissingPart(target.to_string()));
        }
        let rels = self.relationships.entry(source.to_string()).or_default();
        let id = next_relationship_id(rels);
        rels.push(Relationship::internal(id.clone(), rel_type, target));
        debug!("add relationship {} {} -> {}", id, source, target);
        Ok(id)
    }

    pub fn relationships(&self, source: &str) -> &[Relationship] {
        self.relationships
            .get(source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 指定类型的第一个内部关系目标
    /// @param source 源部件
    /// @param rel_type 关系类型
    pub fn get_relationship_target(&self, source: &str, rel_type: &str) -> Option<&Part> {
        self.relationships(source)
            .iter()
            .find(|rel| rel.rel_type() == rel_type && !rel.is_external())
            .and_then(|rel| self.parts.get(rel.target()))
    }

    /// 以prefix开头的部件路径中下一个未使用的编号
    /// @param prefix 路径前缀，例如/word/media/image
    pub fn unused_part_identifier(&self, prefix: &str) -> u32 {
        unused_part_identifier(self.parts.keys().map(String::as_str), prefix)
    }
}

impl Default for Package {
    fn default() -> Self {
        Self::new()
    }
}

/// paths中紧跟prefix之后的最大编号加一，没有编号时为1
pub fn unused_part_identifier<'a>(paths: impl IntoIterator<Item = &'a str>, prefix: &str) -> u32 {
    paths
        .into_iter()
        .filter_map(|path| {
            let rest = path.strip_prefix(prefix)?;
            let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            rest[..digits].parse::<u32>().ok()
        })
        .max()
        .map_or(1, |max| max + 1)
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}
