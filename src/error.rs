use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
    #[error("XML escape error: {0}")]
    XmlEscape(#[from] quick_xml::escape::EscapeError),
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("read image error: {0}")]
    ReadImage(#[from] image::ImageError),
    #[error("Image url not found: {0}")]
    InvalidImageUrl(#[from] reqwest::Error),
    #[error("not an image: {0}")]
    NotImage(String),
    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),
    #[error("package has no main document part: {0}")]
    MissingMainDocument(String),
    #[error("duplicate part: {0}")]
    DuplicatePart(String),
    #[error("part not found: {0}")]
    MissingPart(String),
    #[error("part is not an XML part: {0}")]
    NotXmlPart(String),
    #[error("unknown content type for part: {0}")]
    UnknownContentType(String),
    #[error("document part has no body")]
    MissingBody,
    #[error("invalid table: {0}")]
    InvalidTable(String),
    #[error("invalid html table: {0}")]
    InvalidHtmlTable(String),
    #[error("invalid content: {0}")]
    InvalidContent(String),
}

pub type Result<T> = std::result::Result<T, DocxError>;
