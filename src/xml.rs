use crate::error::Result;
use quick_xml::errors::{Error as XmlError, IllFormedError};
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::io::{Cursor, Write};

/// Arena中节点的编号
pub type NodeId = usize;

#[derive(Debug, Clone)]
enum NodeKind {
    // 属性值保存为转义后的形式
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    // 注释、CDATA和处理指令，原样写回
    Raw(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// 基于arena的xml树
/// 节点不会被释放，分离节点只是断开与父节点的连接，NodeId始终有效
#[derive(Debug, Clone, Default)]
pub struct XmlTree {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl XmlTree {
    /// 解析完整的xml文件
    /// @param contents xml文件内容
    pub fn parse(contents: &[u8]) -> Result<Self> {
        let mut tree = XmlTree::default();
        tree.roots = tree.parse_nodes(contents)?;
        Ok(tree)
    }

    /// 解析xml片段到当前树中，片段可以有多个顶层节点
    /// @param markup xml片段
    /// @return 游离的顶层节点，插入之前不属于任何父节点
    pub fn parse_fragment(&mut self, markup: &str) -> Result<Vec<NodeId>> {
        self.parse_nodes(markup.as_bytes())
    }

    fn parse_nodes(&mut self, contents: &[u8]) -> Result<Vec<NodeId>> {
        let mut reader = Reader::from_reader(contents);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut top = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let id = self.element_from(&e)?;
                    self.attach(stack.last().copied(), &mut top, id);
                    stack.push(id);
                }
                Event::Empty(e) => {
                    let id = self.element_from(&e)?;
                    self.attach(stack.last().copied(), &mut top, id);
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(e) => {
                    let text = e.unescape()?.into_owned();
                    let parent = stack.last().copied();
                    // 丢弃元素之间的缩进，保留run中的空白
                    if !text.trim().is_empty() || parent.is_some_and(|p| self.keeps_whitespace(p)) {
                        let id = self.push(NodeKind::Text(text));
                        self.attach(parent, &mut top, id);
                    }
                }
                Event::CData(e) => {
                    let raw = format!("<![CDATA[{}]]>", String::from_utf8_lossy(&e));
                    let id = self.push(NodeKind::Raw(raw));
                    self.attach(stack.last().copied(), &mut top, id);
                }
                Event::Comment(e) => {
                    let raw = format!("<!--{}-->", String::from_utf8_lossy(&e));
                    let id = self.push(NodeKind::Raw(raw));
                    self.attach(stack.last().copied(), &mut top, id);
                }
                Event::PI(e) => {
                    let raw = format!("<?{}?>", String::from_utf8_lossy(&e));
                    let id = self.push(NodeKind::Raw(raw));
                    self.attach(stack.last().copied(), &mut top, id);
                }
                Event::Eof => {
                    if let Some(&open) = stack.last() {
                        let name = self.name(open).unwrap_or_default().to_string();
                        return Err(XmlError::IllFormed(IllFormedError::MissingEndTag(name)).into());
                    }
                    break;
                }
                // 写入时重新生成xml声明
                _ => {}
            }
            buf.clear();
        }
        Ok(top)
    }

    fn element_from(&mut self, e: &BytesStart) -> Result<NodeId> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            attrs.push((
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                String::from_utf8_lossy(&attr.value).into_owned(),
            ));
        }
        Ok(self.push(NodeKind::Element { name, attrs }))
    }

    fn keeps_whitespace(&self, id: NodeId) -> bool {
        matches!(self.local_name(id), Some("t" | "delText" | "instrText"))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn attach(&mut self, parent: Option<NodeId>, top: &mut Vec<NodeId>, id: NodeId) {
        match parent {
            Some(parent) => {
                self.nodes[id].parent = Some(parent);
                self.nodes[parent].children.push(id);
            }
            None => top.push(id),
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// 第一个顶层元素，例如w:document
    pub fn root_element(&self) -> Option<NodeId> {
        self.roots.iter().copied().find(|&id| self.name(id).is_some())
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Element {
            name: name.to_string(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    /// 元素的完整名称，文本节点为None
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.name(id)
            .map(|name| name.rsplit_once(':').map_or(name, |(_, local)| local))
    }

    pub fn is_element(&self, id: NodeId, name: &str) -> bool {
        self.name(id) == Some(name)
    }

    /// 获取反转义后的属性值
    /// @param key 属性名称
    pub fn attr(&self, id: NodeId, key: &str) -> Option<String> {
        match &self.nodes[id].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| unescape(v).map_or_else(|_| v.clone(), Cow::into_owned)),
            _ => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, key: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id].kind {
            let value = escape(value).into_owned();
            match attrs.iter_mut().find(|(k, _)| k == key) {
                Some(attr) => attr.1 = value,
                None => attrs.push((key.to_string(), value)),
            }
        }
    }

    /// 文本节点的内容
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// 所有后代文本节点拼接成的文本
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(text) = self.text(id) {
            out.push_str(text);
        }
        for node in self.descendants(id) {
            if let Some(text) = self.text(node) {
                out.push_str(text);
            }
        }
        out
    }

    /// 用一个文本节点替换所有子节点
    /// @param text 文本内容
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.remove_children(id);
        let node = self.create_text(text);
        self.append_child(id, node);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn child_elements<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .filter(move |&child| self.is_element(child, name))
    }

    pub fn first_child_element(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.child_elements(id, name).next()
    }

    /// 按文档顺序返回所有后代节点，不包含自身
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.nodes[node].children.iter().rev().copied());
        }
        out
    }

    pub fn find_descendant(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|&node| self.is_element(node, name))
    }

    /// 最近的指定名称的祖先元素
    /// @param name 元素名称
    pub fn ancestor(&self, id: NodeId, name: &str) -> Option<NodeId> {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if self.is_element(node, name) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    fn siblings_mut(&mut self, parent: Option<NodeId>) -> &mut Vec<NodeId> {
        match parent {
            Some(parent) => &mut self.nodes[parent].children,
            None => &mut self.roots,
        }
    }

    /// 将节点从父节点中分离，节点及其子树仍然可用
    pub fn detach(&mut self, id: NodeId) {
        let parent = self.nodes[id].parent.take();
        self.siblings_mut(parent).retain(|&node| node != id);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.insert(0, child);
    }

    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        self.insert_at(reference, node, 0);
    }

    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        self.insert_at(reference, node, 1);
    }

    fn insert_at(&mut self, reference: NodeId, node: NodeId, shift: usize) {
        self.detach(node);
        let parent = self.nodes[reference].parent;
        self.nodes[node].parent = parent;
        let siblings = self.siblings_mut(parent);
        let index = siblings
            .iter()
            .position(|&n| n == reference)
            .map_or(siblings.len(), |i| i + shift);
        siblings.insert(index, node);
    }

    /// 用多个节点按顺序替换old节点
    /// @param old 被替换的节点
    /// @param nodes 新节点
    pub fn replace(&mut self, old: NodeId, nodes: &[NodeId]) {
        for &node in nodes {
            self.insert_before(old, node);
        }
        self.detach(old);
    }

    pub fn remove_children(&mut self, id: NodeId) {
        for child in std::mem::take(&mut self.nodes[id].children) {
            self.nodes[child].parent = None;
        }
    }

    /// 复制元素的名称和属性，不包含子节点
    pub fn shallow_clone(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id].kind.clone();
        self.push(kind)
    }

    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let copy = self.shallow_clone(id);
        for child in self.nodes[id].children.clone() {
            let child_copy = self.deep_clone(child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// 序列化整个xml树，包含xml声明
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        for &root in &self.roots {
            self.write_node(&mut writer, root)?;
        }
        Ok(writer.into_inner().into_inner())
    }

    /// 序列化一个子树，不包含xml声明
    pub fn node_to_string(&self, id: NodeId) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        self.write_node(&mut writer, id)?;
        Ok(String::from_utf8(writer.into_inner().into_inner())?)
    }

    fn write_node<W: Write>(&self, writer: &mut Writer<W>, id: NodeId) -> Result<()> {
        let node = &self.nodes[id];
        match &node.kind {
            NodeKind::Element { name, attrs } => {
                let mut content = name.clone();
                for (key, value) in attrs {
                    content.push(' ');
                    content.push_str(key);
                    content.push_str("=\"");
                    content.push_str(value);
                    content.push('"');
                }
                let start = BytesStart::from_content(content, name.len());
                if node.children.is_empty() {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    for &child in &node.children {
                        self.write_node(writer, child)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                }
            }
            NodeKind::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
            NodeKind::Raw(raw) => writer.get_mut().write_all(raw.as_bytes())?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_write_roundtrip() {
        let xml = r#"<?xml version="1.0"?><w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t xml:space="preserve"> a &amp; b </w:t></w:r></w:p></w:body></w:document>"#;
        let tree = XmlTree::parse(xml.as_bytes()).unwrap();
        let root = tree.root_element().unwrap();
        assert_eq!(tree.name(root), Some("w:document"));
        assert_eq!(tree.text_content(root), " a & b ");

        let written = String::from_utf8(tree.to_bytes().unwrap()).unwrap();
        assert!(written.starts_with("<?xml"));
        assert!(written.contains(r#"<w:t xml:space="preserve"> a &amp; b </w:t>"#));
        assert_eq!(XmlTree::parse(written.as_bytes()).unwrap().text_content(root), " a & b ");
    }

    #[test]
    fn test_indentation_dropped_but_run_spaces_kept() {
        let mut tree = XmlTree::default();
        let nodes = tree
            .parse_fragment("<w:p>\n  <w:r>\n    <w:t> </w:t>\n  </w:r>\n</w:p>")
            .unwrap();
        assert_eq!(nodes.len(), 1);
        let run = tree.children(nodes[0])[0];
        assert_eq!(tree.children(nodes[0]).len(), 1);
        let text = tree.children(run)[0];
        assert_eq!(tree.text_content(text), " ");
    }

    #[test]
    fn test_fragment_with_several_roots() {
        let mut tree = XmlTree::default();
        let nodes = tree.parse_fragment("<w:p/><w:tbl><w:tr/></w:tbl>").unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(tree.local_name(nodes[1]), Some("tbl"));
        assert_eq!(tree.parent(nodes[1]), None);
    }

    #[test]
    fn test_malformed_fragments_are_rejected() {
        let mut tree = XmlTree::default();
        assert!(tree.parse_fragment("<w:r><w:t>x</w:r>").is_err());
        assert!(tree.parse_fragment("<w:p><w:r></w:p>").is_err());
        assert!(tree.parse_fragment("<w:r><w:t>x").is_err());
        assert!(tree.parse_fragment("<w:r/>text<w:r/>").is_ok());
    }

    #[test]
    fn test_insert_replace_and_clone() {
        let mut tree = XmlTree::parse(b"<a><b/><c/></a>").unwrap();
        let a = tree.root_element().unwrap();
        let b = tree.first_child_element(a, "b").unwrap();
        let c = tree.first_child_element(a, "c").unwrap();

        let x = tree.create_element("x");
        tree.insert_after(b, x);
        let copy = tree.deep_clone(a);
        let y = tree.create_element("y");
        let z = tree.create_element("z");
        tree.replace(c, &[y, z]);

        assert_eq!(tree.node_to_string(a).unwrap(), "<a><b/><x/><y/><z/></a>");
        assert_eq!(tree.node_to_string(copy).unwrap(), "<a><b/><x/><c/></a>");
        assert_eq!(tree.parent(c), None);
    }

    #[test]
    fn test_attributes_are_escaped_once() {
        let mut tree = XmlTree::parse(br#"<w:pStyle w:val="A&amp;B"/>"#).unwrap();
        let style = tree.root_element().unwrap();
        assert_eq!(tree.attr(style, "w:val").as_deref(), Some("A&B"));
        tree.set_attr(style, "w:val", "C<D");
        assert_eq!(
            tree.node_to_string(style).unwrap(),
            r#"<w:pStyle w:val="C&lt;D"/>"#
        );
    }
}
