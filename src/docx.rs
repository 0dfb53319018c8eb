use crate::docx::body::{Body, find_body, plain_text};
use crate::docx::compose::{Composer, root_name, validate};
use crate::docx::math::{math_paragraph, prepare_mathml};
use crate::docx::splice::{
    count_occurrences, replace_all_with_empty_runs, replace_all_with_text, replace_with_body_fragments,
    replace_with_run_fragment,
};
use crate::docx::template::{BLANK_DOCUMENT, BLANK_STYLES, LINE_BREAK_RUN, PAGE_BREAK};
use crate::docx::word::*;
use crate::error::{DocxError, Result};
use crate::image::DocxImage;
use crate::package::{PACKAGE_ROOT, Package, Part, PartData};
use crate::request::request_image;
use crate::xml::XmlTree;
use log::{debug, info};
use reqwest::Client;
use std::path::Path;

pub use compose::{Columns, Content, Fragment};
pub use math::MathTransform;
pub use table::{TableOptions, TableProperties};

mod body;
mod compose;
mod math;
mod media;
mod splice;
mod table;
mod template;
mod word;

/// word文档：包以及主文档部件的路径
#[derive(Debug, Clone)]
pub struct WordDocument {
    package: Package,
    main_part: String,
}

impl WordDocument {
    /// 打开docx文件
    /// @param path 文件路径
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_package(Package::open(path)?)
    }

    /// 从内存数据读取docx文件
    /// @param data docx文件内容
    pub fn from_data(data: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(data)?)
    }

    /// 创建空白文档
    pub fn blank() -> Result<Self> {
        let mut package = Package::new();
        package.add_part(
            WORD_DOCUMENT,
            WORD_MAIN_CONTENT_TYPE,
            PartData::Xml(XmlTree::parse(BLANK_DOCUMENT.as_bytes())?),
        )?;
        package.add_part(
            WORD_STYLES,
            WORD_STYLES_CONTENT_TYPE,
            PartData::Xml(XmlTree::parse(BLANK_STYLES.as_bytes())?),
        )?;
        package.add_relationship(PACKAGE_ROOT, WORD_DOCUMENT, OFFICE_DOCUMENT_TYPE)?;
        package.add_relationship(WORD_DOCUMENT, WORD_STYLES, STYLES_RELATIONSHIP_TYPE)?;
        Self::from_package(package)
    }

    /// 以已有文档为模板创建新文档，模板内容会被保留
    /// @param path 模板文件路径
    pub fn from_template<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path)
    }

    /// 包装已有的包，通过包级别的officeDocument关系查找主文档部件
    /// @param package 包
    pub fn from_package(mut package: Package) -> Result<Self> {
        let main_part = package
            .get_relationship_target(PACKAGE_ROOT, OFFICE_DOCUMENT_TYPE)
            .map(|part| part.path().to_string())
            .ok_or_else(|| {
                DocxError::MissingMainDocument("no officeDocument relationship".to_string())
            })?;
        package.parse_xml_part(&main_part)?;
        find_body(package.xml_part(&main_part)?)?;
        info!("opened word document with main part {}", main_part);
        Ok(WordDocument { package, main_part })
    }

    /// 生成docx文件内容
    pub fn to_data(&self) -> Result<Vec<u8>> {
        self.package.to_bytes()
    }

    /// 保存docx文件
    /// @param path 文件路径
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.package.save(path)
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn main_part(&self) -> &str {
        &self.main_part
    }

    pub fn get_part(&self, path: &str) -> Option<&Part> {
        self.package.get_part(path)
    }

    fn body(&mut self) -> Result<Body<'_>> {
        Body::new(self.package.xml_part_mut(&self.main_part)?)
    }

    /// 添加标题
    /// @param text 标题内容
    /// @param level 标题级别，对应样式Heading{level}
    pub fn add_heading(&mut self, text: &str, level: u8) -> Result<()> {
        self.body()?
            .add_paragraph()
            .add_style(&format!("Heading{level}"))
            .add_text_run(text, None);
        Ok(())
    }

    /// 添加二级标题
    pub fn add_sub_heading(&mut self, text: &str) -> Result<()> {
        self.add_heading(text, 2)
    }

    /// 添加段落
    /// @param content 文本、带样式的文本、它们的序列、图片或run片段
    /// @param style 段落样式
    pub fn add_paragraph(&mut self, content: impl Into<Content>, style: Option<&str>) -> Result<()> {
        let content = content.into();
        validate(&content)?;
        if !is_inline(&content) {
            return Err(DocxError::InvalidContent(
                "tables cannot be added as a paragraph, use add_table".to_string(),
            ));
        }
        let runs = Composer::new(&mut self.package, &self.main_part).inline_runs(&content)?;
        self.body()?.add_paragraph_with_runs(style, &runs)?;
        Ok(())
    }

    /// 添加分页符
    pub fn add_page_break(&mut self) -> Result<()> {
        self.body()?.add_xml_fragment(PAGE_BREAK)?;
        Ok(())
    }

    /// 添加换行
    pub fn add_line_break(&mut self) -> Result<()> {
        self.body()?
            .add_xml_fragment(&format!("<w:p>{LINE_BREAK_RUN}</w:p>"))?;
        Ok(())
    }

    /// 添加图片段落
    /// @param image 图片
    /// @param style 段落样式
    pub fn add_image(&mut self, image: &DocxImage, style: Option<&str>) -> Result<()> {
        let run = Composer::new(&mut self.package, &self.main_part).image_run(image)?;
        self.body()?.add_paragraph_with_runs(style, &[run])?;
        Ok(())
    }

    /// 下载网络图片并添加到文档中
    /// @param client 请求客户端
    /// @param url 图片url路径
    /// @param style 段落样式
    pub async fn add_image_from_url(
        &mut self,
        client: &Client,
        url: &str,
        style: Option<&str>,
    ) -> Result<()> {
        let image = request_image(client, url).await?;
        self.add_image(&image, style)
    }

    /// 添加表格
    /// @param columns 列名以及每列的数据
    /// @param options 表格参数
    pub fn add_table(&mut self, columns: Columns, options: TableOptions) -> Result<()> {
        let content = Content::Columns(columns.with_options(options));
        validate(&content)?;
        let markup = Composer::new(&mut self.package, &self.main_part).body_markup(&content, None)?;
        self.body()?.add_table(&markup)?;
        Ok(())
    }

    /// 根据html表格添加表格
    /// @param html 包含table标签的html片段
    /// @param options 表格参数
    pub fn add_table_from_html(&mut self, html: &str, options: TableOptions) -> Result<()> {
        let markup = Composer::new(&mut self.package, &self.main_part).html_table(html, &options)?;
        self.body()?.add_table(&markup)?;
        Ok(())
    }

    /// 添加公式
    /// @param omml Office Math片段(m:oMath)
    pub fn add_math(&mut self, omml: &str) -> Result<()> {
        self.body()?.add_xml_fragment(&math_paragraph(omml))?;
        Ok(())
    }

    /// 添加MathML公式，使用transform转换，没有math标签时不添加内容
    /// @param mathml MathML片段
    /// @param transform MathML到OMML的转换
    pub fn add_mathml(&mut self, mathml: &str, transform: &dyn MathTransform) -> Result<()> {
        let Some(mathml) = prepare_mathml(mathml)? else {
            debug!("no math element to add");
            return Ok(());
        };
        let omml = transform.mathml_to_omml(&mathml)?;
        if omml.trim().is_empty() {
            return Ok(());
        }
        self.add_math(&omml)
    }

    /// 获取文档纯文本，每个段落一行
    pub fn plain_text(&self) -> Result<String> {
        let tree = self.package.xml_part(&self.main_part)?;
        Ok(plain_text(tree, find_body(tree)?))
    }

    /// 替换文档中所有匹配的文本
    /// 文本替换保留原有格式；图片、带样式的文本和run片段在原位置插入；
    /// 其他内容替换匹配所在的段落。出错时文档保持不变
    /// @param source 查找的文本
    /// @param replacement 替换的内容
    /// @return 替换的数量
    pub fn replace_all(&mut self, source: &str, replacement: impl Into<Content>) -> Result<usize> {
        let replacement = replacement.into();
        validate(&replacement)?;

        let tree = self.package.xml_part_mut(&self.main_part)?;
        let body = find_body(tree)?;
        if let Content::Text(text) = &replacement {
            return Ok(replace_all_with_text(tree, body, source, text));
        }
        let count = count_occurrences(tree, body, source);
        if count == 0 {
            return Ok(0);
        }

        // 先生成所有替换内容，图片每次出现都会添加一个新的部件
        let mut rendered = Vec::with_capacity(count);
        let mut composer = Composer::new(&mut self.package, &self.main_part);
        for _ in 0..count {
            rendered.push(match &replacement {
                Content::Image(image) => (composer.image_run(image)?, true),
                Content::Styled { .. } => (composer.inline_runs(&replacement)?.concat(), true),
                Content::Raw(markup) => (
                    markup.clone(),
                    root_name(markup).as_deref() != Some(WORD_TABLE_TAG),
                ),
                other => (composer.body_markup(other, None)?, false),
            });
        }

        let tree = self.package.xml_part_mut(&self.main_part)?;
        let mut parsed = Vec::with_capacity(count);
        for (markup, inline) in &rendered {
            parsed.push((tree.parse_fragment(markup)?, *inline));
        }

        let markers = replace_all_with_empty_runs(tree, body, source);
        for (marker, (nodes, inline)) in markers.iter().copied().zip(parsed) {
            if inline {
                replace_with_run_fragment(tree, marker, &nodes);
            } else {
                replace_with_body_fragments(tree, marker, nodes);
            }
        }
        Ok(markers.len())
    }
}

// 段落中只能包含run级别的内容
fn is_inline(content: &Content) -> bool {
    match content {
        Content::Columns(_) => false,
        Content::Sequence(items) => items.iter().all(is_inline),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::tests::png_image;
    use image::ImageFormat;

    #[test]
    fn test_blank_document() {
        let doc = WordDocument::blank().unwrap();
        assert_eq!(doc.main_part(), WORD_DOCUMENT);
        assert_eq!(doc.plain_text().unwrap(), "");
        assert!(doc.get_part(WORD_STYLES).is_some());
    }

    #[test]
    fn test_missing_main_document() {
        let package = Package::new();
        let data = package.to_bytes().unwrap();
        assert!(matches!(
            WordDocument::from_data(&data),
            Err(DocxError::MissingMainDocument(_))
        ));
    }

    #[test]
    fn test_headings_and_styles() {
        let mut doc = WordDocument::blank().unwrap();
        doc.add_heading("Title", 1).unwrap();
        doc.add_sub_heading("Part").unwrap();
        doc.add_paragraph(vec![Content::from("a "), Content::styled("b", "Strong")], Some("Quote"))
            .unwrap();
        let xml = String::from_utf8(doc.package().xml_part(WORD_DOCUMENT).unwrap().to_bytes().unwrap())
            .unwrap();
        assert!(xml.contains(r#"<w:pStyle w:val="Heading1"/>"#));
        assert!(xml.contains(r#"<w:pStyle w:val="Heading2"/>"#));
        assert!(xml.contains(r#"<w:pStyle w:val="Quote"/>"#));
        assert!(xml.contains(r#"<w:rStyle w:val="Strong"/>"#));
        assert_eq!(doc.plain_text().unwrap(), "Title\nPart\na b\n");
    }

    #[test]
    fn test_paragraph_rejects_tables() {
        let mut doc = WordDocument::blank().unwrap();
        let err = doc
            .add_paragraph(vec![Content::from(Columns::new().column("A", "1"))], None)
            .unwrap_err();
        assert!(matches!(err, DocxError::InvalidContent(_)));
        assert_eq!(doc.plain_text().unwrap(), "");
    }

    #[test]
    fn test_breaks() {
        let mut doc = WordDocument::blank().unwrap();
        doc.add_paragraph("one", None).unwrap();
        doc.add_page_break().unwrap();
        doc.add_line_break().unwrap();
        let xml = String::from_utf8(doc.package().xml_part(WORD_DOCUMENT).unwrap().to_bytes().unwrap())
            .unwrap();
        assert!(xml.contains(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p><w:p><w:r><w:br/></w:r></w:p><w:sectPr>"#));
        assert_eq!(doc.plain_text().unwrap(), "one\n\n\n");
    }

    #[test]
    fn test_math() {
        let mut doc = WordDocument::blank().unwrap();
        doc.add_math("<m:oMath><m:r><m:t>x</m:t></m:r></m:oMath>").unwrap();
        let transform = |mathml: &str| -> Result<String> {
            assert!(mathml.contains(MATHML_NS));
            Ok("<m:oMath><m:r><m:t>y</m:t></m:r></m:oMath>".to_string())
        };
        doc.add_mathml("<math><mi>y</mi></math>", &transform).unwrap();
        doc.add_mathml("<p>not math</p>", &transform).unwrap();
        let tree = doc.package().xml_part(WORD_DOCUMENT).unwrap();
        let root = tree.root_element().unwrap();
        let formulas = tree
            .descendants(root)
            .into_iter()
            .filter(|&node| tree.is_element(node, "m:oMath"))
            .count();
        assert_eq!(formulas, 2);
    }

    #[test]
    fn test_replace_with_styled_text_stays_inline() {
        let mut doc = WordDocument::blank().unwrap();
        doc.add_paragraph("Dear NAME,", None).unwrap();
        assert_eq!(doc.replace_all("NAME", Content::styled("Ann", "Strong")).unwrap(), 1);
        assert_eq!(doc.plain_text().unwrap(), "Dear Ann,\n");
    }

    #[test]
    fn test_replace_with_sequence_splits_paragraph() {
        let mut doc = WordDocument::blank().unwrap();
        doc.add_paragraph("before LIST after", None).unwrap();
        let count = doc.replace_all("LIST", vec!["x", "y"]).unwrap();
        assert_eq!(count, 1);
        assert_eq!(doc.plain_text().unwrap(), "before \nx\ny\n after\n");
    }

    #[test]
    fn test_replace_with_image_and_raw_run() {
        let mut doc = WordDocument::blank().unwrap();
        doc.add_paragraph("[img] and [img]", None).unwrap();
        assert_eq!(doc.replace_all("[img]", png_image(4, 4)).unwrap(), 2);
        assert!(doc.get_part("/word/media/image1.png").is_some());
        assert!(doc.get_part("/word/media/image2.png").is_some());
        assert_eq!(doc.plain_text().unwrap(), " and \n");

        doc.add_paragraph("a-b", None).unwrap();
        doc.replace_all("-", Content::raw("<w:r><w:t>+</w:t></w:r>")).unwrap();
        assert_eq!(doc.plain_text().unwrap(), " and \na+b\n");
    }

    #[test]
    fn test_malformed_raw_replacement_changes_nothing() {
        let mut doc = WordDocument::blank().unwrap();
        doc.add_paragraph("keep KEY here", None).unwrap();
        let before = doc.package().xml_part(WORD_DOCUMENT).unwrap().to_bytes().unwrap();

        let err = doc
            .replace_all("KEY", Content::raw("<w:r><w:t>x</w:r>"))
            .unwrap_err();
        assert!(matches!(err, DocxError::InvalidContent(_)));
        assert_eq!(doc.plain_text().unwrap(), "keep KEY here\n");
        assert_eq!(
            doc.package().xml_part(WORD_DOCUMENT).unwrap().to_bytes().unwrap(),
            before
        );
    }

    #[test]
    fn test_failed_sequence_replacement_adds_no_media() {
        let mut doc = WordDocument::blank().unwrap();
        doc.add_paragraph("KEY", None).unwrap();
        let parts = doc.package().parts().count();

        let replacement = vec![
            Content::from(png_image(2, 2)),
            Content::raw("<w:p><w:r></w:p>"),
        ];
        assert!(doc.replace_all("KEY", replacement).is_err());
        assert_eq!(doc.package().parts().count(), parts);
        assert_eq!(doc.package().relationships(WORD_DOCUMENT).len(), 1);
        assert_eq!(doc.plain_text().unwrap(), "KEY\n");
    }

    #[test]
    fn test_malformed_raw_paragraph_adds_nothing() {
        let mut doc = WordDocument::blank().unwrap();
        assert!(doc.add_paragraph(Content::raw("<w:r><w:t>x</w:r>"), None).is_err());
        assert_eq!(doc.plain_text().unwrap(), "");
        doc.add_paragraph(Content::raw("<w:r><w:t>x</w:t></w:r>"), None).unwrap();
        assert_eq!(doc.plain_text().unwrap(), "x\n");
    }

    #[test]
    fn test_replace_sequence_in_every_occurrence() {
        let mut doc = WordDocument::blank().unwrap();
        doc.add_paragraph("A", None).unwrap();
        doc.add_paragraph("B A", None).unwrap();
        let replacement = vec![Content::from(png_image(2, 2)), Content::from("t")];
        assert_eq!(doc.replace_all("A", replacement).unwrap(), 2);
        assert!(doc.get_part("/word/media/image1.png").is_some());
        assert!(doc.get_part("/word/media/image2.png").is_some());
        assert!(doc.get_part("/word/media/image3.png").is_none());
        assert_eq!(doc.plain_text().unwrap(), "\nt\nB \n\nt\n");

        let xml = String::from_utf8(doc.package().xml_part(WORD_DOCUMENT).unwrap().to_bytes().unwrap())
            .unwrap();
        assert!(xml.contains(r#"<wp:docPr id="1" name="Picture 1"/>"#));
        assert!(xml.contains(r#"<wp:docPr id="2" name="Picture 2"/>"#));
    }

    #[test]
    fn test_replace_with_unsupported_image_changes_nothing() {
        let mut doc = WordDocument::blank().unwrap();
        doc.add_paragraph("here: X", None).unwrap();
        let parts = doc.package().parts().count();
        let image = DocxImage::from_parts(vec![0; 4], ImageFormat::Tga, 1, 1);
        assert!(doc.replace_all("X", image.clone()).is_err());
        assert!(doc.add_image(&image, None).is_err());
        assert_eq!(doc.package().parts().count(), parts);
        assert!(doc.package().relationships(WORD_DOCUMENT).len() == 1);
        assert_eq!(doc.plain_text().unwrap(), "here: X\n");
    }
}
