use crate::docx::table::TableOptions;
use crate::docx::template::{EMPTY_PARAGRAPH, paragraph_fragment, text_run_fragment};
use crate::docx::word::*;
use crate::error::{DocxError, Result};
use crate::image::DocxImage;
use crate::package::Package;
use crate::xml::XmlTree;
use quick_xml::Reader;
use quick_xml::events::Event;

static EMPTY_CONTENT: Content = Content::Empty;

/// 可以添加到文档或用于替换的内容
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Content {
    /// 空段落，保持表格行对齐
    #[default]
    Empty,
    Text(String),
    /// 带字符样式的文本
    Styled { content: String, style: String },
    Sequence(Vec<Content>),
    /// 表格，每一项是一列
    Columns(Columns),
    Image(DocxImage),
    /// 已经生成好的WordprocessingML，w:tbl或者run、段落片段
    Raw(String),
}

impl Content {
    pub fn styled(content: &str, style: &str) -> Self {
        Content::Styled {
            content: content.to_string(),
            style: style.to_string(),
        }
    }

    pub fn raw(markup: &str) -> Self {
        Content::Raw(markup.to_string())
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<DocxImage> for Content {
    fn from(image: DocxImage) -> Self {
        Content::Image(image)
    }
}

impl From<Columns> for Content {
    fn from(columns: Columns) -> Self {
        Content::Columns(columns)
    }
}

impl<T: Into<Content>> From<Vec<T>> for Content {
    fn from(items: Vec<T>) -> Self {
        Content::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Content>> From<Option<T>> for Content {
    fn from(value: Option<T>) -> Self {
        value.map_or(Content::Empty, Into::into)
    }
}

/// 表格数据：按顺序排列的列（表头和列数据）以及表格参数
/// Sequence类型的列每一项对应一行，其他值只填充第一行
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Columns {
    columns: Vec<(String, Content)>,
    options: TableOptions,
}

impl Columns {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一列
    /// @param header 表头文字
    /// @param value 列数据
    pub fn column(mut self, header: &str, value: impl Into<Content>) -> Self {
        self.columns.push((header.to_string(), value.into()));
        self
    }

    pub fn with_options(mut self, options: TableOptions) -> Self {
        self.options = options;
        self
    }

    pub fn columns(&self) -> &[(String, Content)] {
        &self.columns
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// 数据行数：最长的Sequence列，单个值为1，空列为0
    pub fn row_count(&self) -> usize {
        self.columns
            .iter()
            .map(|(_, value)| match value {
                Content::Sequence(items) => items.len(),
                Content::Empty => 0,
                _ => 1,
            })
            .max()
            .unwrap_or(0)
    }

    /// 获取某一列在某一行的数据，超出范围时为空
    pub(crate) fn cell(value: &Content, row: usize) -> &Content {
        match value {
            Content::Sequence(items) => items.get(row).unwrap_or(&EMPTY_CONTENT),
            other if row == 0 => other,
            _ => &EMPTY_CONTENT,
        }
    }
}

/// 渲染后的一个块级片段
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Paragraph {
        style: Option<String>,
        runs: Vec<String>,
    },
    Table(String),
    Raw(String),
}

impl Fragment {
    pub fn to_xml(&self) -> String {
        match self {
            Fragment::Paragraph { style, runs } => paragraph_fragment(style.as_deref(), runs),
            Fragment::Table(markup) | Fragment::Raw(markup) => markup.clone(),
        }
    }

    fn ends_with_paragraph(&self) -> bool {
        match self {
            Fragment::Paragraph { .. } => true,
            Fragment::Table(_) => false,
            Fragment::Raw(markup) => {
                let markup = markup.trim_end();
                markup.ends_with("</w:p>") || markup.ends_with("<w:p/>")
            }
        }
    }
}

/// 将Content渲染成某个文档部件中的WordprocessingML
/// 渲染时图片会作为part的媒体部件添加，内容需要先经过validate检查
pub struct Composer<'a> {
    pub(crate) package: &'a mut Package,
    pub(crate) part: &'a str,
    // 下一个图片绘图对象编号，第一次添加图片时从文档中计算
    pub(crate) drawing_id: Option<u32>,
}

impl<'a> Composer<'a> {
    pub fn new(package: &'a mut Package, part: &'a str) -> Self {
        Composer {
            package,
            part,
            drawing_id: None,
        }
    }

    /// 将内容转换成段落或表格片段
    /// @param content 内容
    /// @param style 段落样式
    pub fn body_fragments(&mut self, content: &Content, style: Option<&str>) -> Result<Vec<Fragment>> {
        let style = style.map(str::to_string);
        let fragments = match content {
            Content::Empty => vec![Fragment::Paragraph {
                style,
                runs: vec![text_run_fragment("", None)],
            }],
            Content::Text(text) => vec![Fragment::Paragraph {
                style,
                runs: vec![text_run_fragment(text, None)],
            }],
            Content::Styled {
                content,
                style: run_style,
            } => vec![Fragment::Paragraph {
                style,
                runs: vec![text_run_fragment(content, Some(run_style))],
            }],
            Content::Sequence(items) => {
                let mut fragments = Vec::new();
                for item in items {
                    fragments.extend(self.body_fragments(item, None)?);
                }
                fragments
            }
            Content::Columns(columns) => vec![Fragment::Table(self.table(columns)?)],
            Content::Image(image) => vec![Fragment::Paragraph {
                style,
                runs: vec![self.image_run(image)?],
            }],
            Content::Raw(markup) => {
                if root_name(markup).as_deref() == Some(WORD_TABLE_TAG) {
                    vec![Fragment::Table(markup.clone())]
                } else {
                    vec![Fragment::Raw(markup.clone())]
                }
            }
        };
        Ok(fragments)
    }

    /// 内容的所有块级片段拼接成的xml
    /// @param content 内容
    /// @param style 段落样式
    pub fn body_markup(&mut self, content: &Content, style: Option<&str>) -> Result<String> {
        Ok(self
            .body_fragments(content, style)?
            .iter()
            .map(Fragment::to_xml)
            .collect())
    }

    /// 将内容转换成同一段落中的多个run
    /// @param content 文本、带样式的文本、图片或run片段
    pub fn inline_runs(&mut self, content: &Content) -> Result<Vec<String>> {
        let runs = match content {
            Content::Empty => vec![text_run_fragment("", None)],
            Content::Text(text) => vec![text_run_fragment(text, None)],
            Content::Styled { content, style } => vec![text_run_fragment(content, Some(style))],
            Content::Sequence(items) => {
                let mut runs = Vec::new();
                for item in items {
                    runs.extend(self.inline_runs(item)?);
                }
                runs
            }
            Content::Image(image) => vec![self.image_run(image)?],
            Content::Raw(markup) => vec![markup.clone()],
            Content::Columns(_) => {
                return Err(DocxError::InvalidContent(
                    "a table cannot be placed inside a paragraph".to_string(),
                ));
            }
        };
        Ok(runs)
    }

    /// 表格单元格的内容：相邻段落合并为一个，没有样式的段落使用列样式，
    /// 单元格总是以段落结尾
    /// @param content 单元格内容
    /// @param style 列样式
    pub(crate) fn cell_markup(&mut self, content: &Content, style: Option<&str>) -> Result<String> {
        let mut fragments: Vec<Fragment> = Vec::new();
        for fragment in self.body_fragments(content, style)? {
            let merged = match (fragments.last_mut(), &fragment) {
                (
                    Some(Fragment::Paragraph { style, runs }),
                    Fragment::Paragraph {
                        style: next_style,
                        runs: next_runs,
                    },
                ) => {
                    if style.is_none() {
                        *style = next_style.clone();
                    }
                    runs.extend(next_runs.iter().cloned());
                    true
                }
                _ => false,
            };
            if !merged {
                fragments.push(fragment);
            }
        }
        if let Some(column_style) = style {
            for fragment in &mut fragments {
                if let Fragment::Paragraph { style: style @ None, .. } = fragment {
                    *style = Some(column_style.to_string());
                }
            }
        }

        let mut markup: String = fragments.iter().map(Fragment::to_xml).collect();
        if !fragments.last().is_some_and(Fragment::ends_with_paragraph) {
            markup.push_str(EMPTY_PARAGRAPH);
        }
        Ok(markup)
    }
}

/// 在修改文档之前检查内容：图片格式必须受支持，表格至少有一列，
/// xml片段必须能够解析
/// @param content 内容
pub fn validate(content: &Content) -> Result<()> {
    match content {
        Content::Raw(markup) => {
            XmlTree::default()
                .parse_fragment(markup)
                .map_err(|e| DocxError::InvalidContent(format!("malformed markup: {e}")))?;
        }
        Content::Image(image) => {
            image.mime_type()?;
        }
        Content::Sequence(items) => {
            for item in items {
                validate(item)?;
            }
        }
        Content::Columns(columns) => {
            if columns.is_empty() {
                return Err(DocxError::InvalidTable("table has no columns".to_string()));
            }
            for (_, value) in columns.columns() {
                validate(value)?;
            }
        }
        Content::Empty | Content::Text(_) | Content::Styled { .. } => {}
    }
    Ok(())
}

/// 获取xml片段中第一个元素的名称
pub(crate) fn root_name(markup: &str) -> Option<String> {
    let mut reader = Reader::from_str(markup);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::template::BLANK_DOCUMENT;
    use crate::image::tests::png_image;
    use crate::package::PartData;
    use image::ImageFormat;

    fn package() -> Package {
        let mut package = Package::new();
        package
            .add_part(
                WORD_DOCUMENT,
                WORD_MAIN_CONTENT_TYPE,
                PartData::Xml(XmlTree::parse(BLANK_DOCUMENT.as_bytes()).unwrap()),
            )
            .unwrap();
        package
    }

    #[test]
    fn test_text_and_empty_paragraphs() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        assert_eq!(
            composer.body_markup(&"a & b".into(), Some("Quote")).unwrap(),
            r#"<w:p><w:pPr><w:pStyle w:val="Quote"/></w:pPr><w:r><w:t xml:space="preserve">a &amp; b</w:t></w:r></w:p>"#
        );
        assert_eq!(
            composer.body_markup(&Content::Empty, None).unwrap(),
            r#"<w:p><w:r><w:t xml:space="preserve"></w:t></w:r></w:p>"#
        );
        assert_eq!(
            composer.body_markup(&None::<&str>.into(), None).unwrap(),
            composer.body_markup(&Content::Empty, None).unwrap()
        );
    }

    #[test]
    fn test_sequence_renders_one_paragraph_per_entry() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        let content = Content::Sequence(vec!["one".into(), Content::styled("two", "Strong")]);
        let fragments = composer.body_fragments(&content, None).unwrap();
        assert_eq!(fragments.len(), 2);
        assert!(fragments[1].to_xml().contains(r#"<w:rStyle w:val="Strong"/>"#));
    }

    #[test]
    fn test_raw_table_is_a_block() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        let fragments = composer
            .body_fragments(&Content::raw("<w:tbl><w:tr/></w:tbl>"), None)
            .unwrap();
        assert_eq!(fragments, vec![Fragment::Table("<w:tbl><w:tr/></w:tbl>".to_string())]);
        let fragments = composer
            .body_fragments(&Content::raw("<w:r><w:br/></w:r>"), None)
            .unwrap();
        assert_eq!(fragments, vec![Fragment::Raw("<w:r><w:br/></w:r>".to_string())]);
    }

    #[test]
    fn test_cell_merges_paragraphs_and_closes_with_paragraph() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        let cell = composer
            .cell_markup(&vec!["Multiple ", "runs"].into(), Some("Cell"))
            .unwrap();
        assert_eq!(
            cell,
            concat!(
                r#"<w:p><w:pPr><w:pStyle w:val="Cell"/></w:pPr>"#,
                r#"<w:r><w:t xml:space="preserve">Multiple </w:t></w:r>"#,
                r#"<w:r><w:t xml:space="preserve">runs</w:t></w:r></w:p>"#
            )
        );

        let cell = composer
            .cell_markup(&Content::raw("<w:tbl><w:tr/></w:tbl>"), None)
            .unwrap();
        assert_eq!(cell, "<w:tbl><w:tr/></w:tbl><w:p/>");
    }

    #[test]
    fn test_inline_runs_reject_tables() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        let runs = composer
            .inline_runs(&vec![Content::from("a"), Content::styled("b", "Em")].into())
            .unwrap();
        assert_eq!(runs.len(), 2);
        let err = composer
            .inline_runs(&Columns::new().column("A", "1").into())
            .unwrap_err();
        assert!(matches!(err, DocxError::InvalidContent(_)));
    }

    #[test]
    fn test_image_paragraph_registers_media() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        let markup = composer
            .body_markup(&png_image(10, 10).into(), None)
            .unwrap();
        assert!(markup.starts_with("<w:p>"));
        assert!(markup.contains(r#"r:embed="rId1""#));
        assert!(package.contains_part("/word/media/image1.png"));
    }

    #[test]
    fn test_validate() {
        assert!(validate(&Content::Sequence(vec!["x".into(), Content::Empty])).is_ok());
        let tga = DocxImage::from_parts(vec![1, 2, 3], ImageFormat::Tga, 1, 1);
        assert!(matches!(
            validate(&vec![Content::from("x"), tga.into()].into()),
            Err(DocxError::UnsupportedImageFormat(_))
        ));
        assert!(matches!(
            validate(&Columns::new().into()),
            Err(DocxError::InvalidTable(_))
        ));
        let nested = Columns::new().column("outer", Columns::new());
        assert!(validate(&nested.into()).is_err());
    }

    #[test]
    fn test_validate_parses_raw_markup() {
        assert!(validate(&Content::raw("<w:r><w:t>x</w:t></w:r>")).is_ok());
        assert!(matches!(
            validate(&Content::raw("<w:r><w:t>x</w:r>")),
            Err(DocxError::InvalidContent(_))
        ));
        let in_sequence = Content::Sequence(vec!["a".into(), Content::raw("<w:p><w:r></w:p>")]);
        assert!(matches!(validate(&in_sequence), Err(DocxError::InvalidContent(_))));
        let in_column = Columns::new().column("A", vec![Content::raw("<w:p>")]);
        assert!(matches!(validate(&in_column.into()), Err(DocxError::InvalidContent(_))));
    }

    #[test]
    fn test_row_count_and_cells() {
        let columns = Columns::new()
            .column("a", vec!["1", "2", "3"])
            .column("b", vec!["x"])
            .column("c", Vec::<Content>::new())
            .column("d", "scalar");
        assert_eq!(columns.row_count(), 3);
        let d = &columns.columns()[3].1;
        assert_eq!(Columns::cell(d, 0), &Content::from("scalar"));
        assert_eq!(Columns::cell(d, 1), &Content::Empty);
        assert_eq!(Columns::cell(&columns.columns()[1].1, 2), &Content::Empty);
    }

    #[test]
    fn test_root_name() {
        assert_eq!(root_name("  <w:tbl><w:tr/></w:tbl>").as_deref(), Some("w:tbl"));
        assert_eq!(root_name("<w:p/>").as_deref(), Some("w:p"));
        assert_eq!(root_name("text only"), None);
    }
}
