use crate::docx::word::*;
use crate::error::{DocxError, Result};
use crate::xml::{NodeId, XmlTree};
use log::debug;

/// 主文档中w:body元素的编辑视图
pub struct Body<'a> {
    tree: &'a mut XmlTree,
    body: NodeId,
}

impl<'a> Body<'a> {
    /// 查找文档中的body标签
    /// @param tree 主文档xml
    pub fn new(tree: &'a mut XmlTree) -> Result<Self> {
        let body = find_body(tree)?;
        Ok(Body { tree, body })
    }

    pub fn node(&self) -> NodeId {
        self.body
    }

    /// 在文档末尾添加空段落
    pub fn add_paragraph(&mut self) -> Paragraph<'_> {
        let node = self.tree.create_element(WORD_PARAGRAPH_TAG);
        self.append_block(node);
        Paragraph {
            tree: &mut *self.tree,
            node,
        }
    }

    /// 在文档末尾添加由run片段组成的段落，所有片段解析成功后才会修改文档
    /// @param style 段落样式
    /// @param runs run片段，例如文本或图片
    pub fn add_paragraph_with_runs(&mut self, style: Option<&str>, runs: &[String]) -> Result<NodeId> {
        let mut nodes = Vec::new();
        for run in runs {
            nodes.extend(self.tree.parse_fragment(run)?);
        }
        let mut paragraph = self.add_paragraph();
        if let Some(style) = style {
            paragraph.add_style(style);
        }
        paragraph.append_runs(&nodes);
        Ok(paragraph.node())
    }

    /// 在文档末尾添加xml片段，片段可以包含多个段落或表格
    /// @param markup xml片段
    pub fn add_xml_fragment(&mut self, markup: &str) -> Result<Vec<NodeId>> {
        let nodes = self.tree.parse_fragment(markup)?;
        for &node in &nodes {
            self.append_block(node);
        }
        debug!("appended {} block nodes", nodes.len());
        Ok(nodes)
    }

    /// 在文档末尾添加表格
    /// @param markup 表格xml片段
    pub fn add_table(&mut self, markup: &str) -> Result<Vec<NodeId>> {
        self.add_xml_fragment(markup)
    }

    /// body下按文档顺序排列的所有段落，包括表格中的段落
    pub fn paragraphs(&self) -> Vec<NodeId> {
        paragraphs(self.tree, self.body)
    }

    /// 提取文档中的纯文本，每个段落以换行符结尾
    pub fn plain_text(&self) -> String {
        plain_text(self.tree, self.body)
    }

    // 末尾的节属性必须保持为body的最后一个子元素
    fn append_block(&mut self, node: NodeId) {
        let section = self
            .tree
            .children(self.body)
            .last()
            .copied()
            .filter(|&last| self.tree.is_element(last, WORD_SECTION_PROPERTIES_TAG));
        match section {
            Some(section) => self.tree.insert_before(section, node),
            None => self.tree.append_child(self.body, node),
        }
    }
}

/// 段落句柄，用于设置样式和添加run
pub struct Paragraph<'a> {
    tree: &'a mut XmlTree,
    node: NodeId,
}

impl Paragraph<'_> {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// 设置段落样式
    /// @param style 样式名称
    pub fn add_style(&mut self, style: &str) -> &mut Self {
        let properties = match self
            .tree
            .first_child_element(self.node, WORD_PARAGRAPH_PROPERTIES_TAG)
        {
            Some(properties) => properties,
            None => {
                let properties = self.tree.create_element(WORD_PARAGRAPH_PROPERTIES_TAG);
                self.tree.prepend_child(self.node, properties);
                properties
            }
        };
        let style_node = match self
            .tree
            .first_child_element(properties, WORD_PARAGRAPH_STYLE_TAG)
        {
            Some(style_node) => style_node,
            None => {
                let style_node = self.tree.create_element(WORD_PARAGRAPH_STYLE_TAG);
                self.tree.prepend_child(properties, style_node);
                style_node
            }
        };
        self.tree.set_attr(style_node, "w:val", style);
        self
    }

    /// 添加文本
    /// @param text 文本内容
    /// @param style 字符样式
    pub fn add_text_run(&mut self, text: &str, style: Option<&str>) -> NodeId {
        let run = self.tree.create_element(WORD_RUN_TAG);
        if let Some(style) = style {
            let properties = self.tree.create_element(WORD_RUN_PROPERTIES_TAG);
            let style_node = self.tree.create_element(WORD_RUN_STYLE_TAG);
            self.tree.set_attr(style_node, "w:val", style);
            self.tree.append_child(properties, style_node);
            self.tree.append_child(run, properties);
        }
        let text_node = self.tree.create_element(WORD_TEXT_TAG);
        self.tree.set_attr(text_node, "xml:space", "preserve");
        self.tree.set_text(text_node, text);
        self.tree.append_child(run, text_node);
        self.tree.append_child(self.node, run);
        run
    }

    /// 添加已经解析好的run节点
    /// @param runs 游离的run节点
    pub fn append_runs(&mut self, runs: &[NodeId]) -> &mut Self {
        for &run in runs {
            self.tree.append_child(self.node, run);
        }
        self
    }
}

pub(crate) fn find_body(tree: &XmlTree) -> Result<NodeId> {
    tree.root_element()
        .and_then(|root| tree.find_descendant(root, WORD_BODY_TAG))
        .ok_or(DocxError::MissingBody)
}

pub(crate) fn plain_text(tree: &XmlTree, root: NodeId) -> String {
    let mut text = String::new();
    for paragraph in paragraphs(tree, root) {
        text.push_str(&paragraph_text(tree, paragraph));
        text.push('\n');
    }
    text
}

pub(crate) fn paragraphs(tree: &XmlTree, root: NodeId) -> Vec<NodeId> {
    tree.descendants(root)
        .into_iter()
        .filter(|&node| tree.is_element(node, WORD_PARAGRAPH_TAG))
        .collect()
}

/// 最近的段落祖先为paragraph的run，嵌套段落（文本框）中的run属于嵌套段落
pub(crate) fn paragraph_runs(tree: &XmlTree, paragraph: NodeId) -> Vec<NodeId> {
    tree.descendants(paragraph)
        .into_iter()
        .filter(|&node| {
            tree.is_element(node, WORD_RUN_TAG)
                && tree.ancestor(node, WORD_PARAGRAPH_TAG) == Some(paragraph)
        })
        .collect()
}

pub(crate) fn run_text(tree: &XmlTree, run: NodeId) -> String {
    tree.child_elements(run, WORD_TEXT_TAG)
        .map(|text| tree.text_content(text))
        .collect()
}

pub(crate) fn paragraph_text(tree: &XmlTree, paragraph: NodeId) -> String {
    paragraph_runs(tree, paragraph)
        .into_iter()
        .map(|run| run_text(tree, run))
        .collect()
}

/// 在文本的字节偏移at处拆分run
/// 原run保留at之前的文本，包含剩余文本的新run插入到其后并返回，两者格式相同
/// @param run 被拆分的run
/// @param at 字节偏移
pub(crate) fn split_run(tree: &mut XmlTree, run: NodeId, at: usize) -> NodeId {
    let right = tree.shallow_clone(run);
    tree.insert_after(run, right);
    if let Some(properties) = tree.first_child_element(run, WORD_RUN_PROPERTIES_TAG) {
        let copy = tree.deep_clone(properties);
        tree.append_child(right, copy);
    }

    let mut offset = 0;
    for child in tree.children(run).to_vec() {
        if tree.is_element(child, WORD_RUN_PROPERTIES_TAG) {
            continue;
        }
        if !tree.is_element(child, WORD_TEXT_TAG) {
            // 换行、制表符和图片没有文本长度
            if offset >= at {
                tree.append_child(right, child);
            }
            continue;
        }
        let text = tree.text_content(child);
        let end = offset + text.len();
        if offset >= at {
            tree.append_child(right, child);
        } else if end > at {
            let (left_text, right_text) = text.split_at(at - offset);
            let copy = tree.shallow_clone(child);
            tree.set_text(child, left_text);
            tree.set_attr(child, "xml:space", "preserve");
            tree.set_text(copy, right_text);
            tree.set_attr(copy, "xml:space", "preserve");
            tree.append_child(right, copy);
        }
        offset = end;
    }
    right
}
