pub mod docx;
pub mod error;
pub mod image;
pub mod package;
pub mod request;
pub mod xml;

pub use docx::{Columns, Content, MathTransform, TableOptions, TableProperties, WordDocument};
pub use error::{DocxError, Result};
pub use image::DocxImage;
