/// word文件中内容xml文件
pub static WORD_DOCUMENT: &str = "/word/document.xml";
/// word文件中样式xml文件
pub static WORD_STYLES: &str = "/word/styles.xml";
/// word文件中图片目录名称
pub static WORD_MEDIA_DIR: &str = "media";
/// word文件中图片名称前缀
pub static WORD_MEDIA_IMAGE: &str = "image";

/// 主文档关系类型
pub static OFFICE_DOCUMENT_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
/// 图片关系类型
pub static IMAGE_RELATIONSHIP_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
/// 样式关系类型
pub static STYLES_RELATIONSHIP_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

pub static WORD_MAIN_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
pub static WORD_STYLES_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";

/// 缺少命名空间的math标签使用的MathML命名空间
pub static MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";

/// word document.xml文件中的标签
pub static WORD_BODY_TAG: &str = "w:body";
pub static WORD_PARAGRAPH_TAG: &str = "w:p";
pub static WORD_PARAGRAPH_PROPERTIES_TAG: &str = "w:pPr";
pub static WORD_PARAGRAPH_STYLE_TAG: &str = "w:pStyle";
pub static WORD_RUN_TAG: &str = "w:r";
pub static WORD_RUN_PROPERTIES_TAG: &str = "w:rPr";
pub static WORD_RUN_STYLE_TAG: &str = "w:rStyle";
pub static WORD_TEXT_TAG: &str = "w:t";
pub static WORD_TABLE_TAG: &str = "w:tbl";
pub static WORD_TABLE_CELL_TAG: &str = "w:tc";
pub static WORD_SECTION_PROPERTIES_TAG: &str = "w:sectPr";
// 本地名称，前缀可能不同
pub static WORD_DRAWING_PROPERTIES: &str = "docPr";

/// 默认表格样式
pub static DEFAULT_TABLE_STYLE: &str = "LightGrid";
/// html表格宽度换算成twip的倍数
pub static HTML_WIDTH_TO_TWIPS: u32 = 15;
