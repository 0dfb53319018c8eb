use crate::error::{DocxError, Result};
use image::{ImageFormat, ImageReader};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

// 图片最大宽度为21厘米, 1厘米约等于360000EMU
pub static DOCX_MAX_EMU: u64 = (21.0 * 360000.0) as u64;
// 1英寸=96像素
static DPI: f64 = 96f64;
// 1英寸=914400 EMU
static EMU: f64 = 914400f64;

/// 图片信息：数据、格式和像素尺寸
#[derive(Debug, Clone, PartialEq)]
pub struct DocxImage {
    // 图片数据
    image_data: Vec<u8>,
    // 图片格式
    format: ImageFormat,
    // 图片宽度(像素)
    width: u32,
    // 图片高度(像素)
    height: u32,
}

impl DocxImage {
    /// 读取图片文件
    /// @param image_path 图片路径
    pub fn new<P: AsRef<Path>>(image_path: P) -> Result<Self> {
        // 打开文件读取数据到数组中
        let mut file = File::open(image_path)?;
        let mut image_data = Vec::new();
        file.read_to_end(&mut image_data)?;
        Self::new_image_data(image_data)
    }

    /// 从内存数据创建图片，格式和尺寸由数据识别
    /// @param image_data 图片数据
    pub fn new_image_data(image_data: Vec<u8>) -> Result<Self> {
        let (format, width, height) = read_image_info(&image_data)?;
        Ok(DocxImage {
            image_data,
            format,
            width,
            height,
        })
    }

    /// 使用已知格式和尺寸创建图片，添加到文档时才检查格式
    /// @param image_data 图片数据
    /// @param format 图片格式
    /// @param width 宽度(像素)
    /// @param height 高度(像素)
    pub fn from_parts(image_data: Vec<u8>, format: ImageFormat, width: u32, height: u32) -> Self {
        DocxImage {
            image_data,
            format,
            width,
            height,
        }
    }

    /// 重新设置图片大小(像素)
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.image_data
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 图片文件扩展名，word不支持的格式返回错误
    pub fn extension(&self) -> Result<&'static str> {
        match self.format {
            ImageFormat::Png => Ok("png"),
            ImageFormat::Jpeg => Ok("jpeg"),
            ImageFormat::Gif => Ok("gif"),
            ImageFormat::Bmp => Ok("bmp"),
            ImageFormat::Tiff => Ok("tiff"),
            other => Err(DocxError::UnsupportedImageFormat(format!("{other:?}"))),
        }
    }

    pub fn mime_type(&self) -> Result<&'static str> {
        self.extension()?;
        Ok(self.format.to_mime_type())
    }

    /// 图片在文档中的尺寸(emu)，超过页面宽度时按比例缩小
    pub fn extent_emu(&self) -> (u64, u64) {
        let width_emu = (self.width as f64 * EMU / DPI) as u64;
        let height_emu = (self.height as f64 * EMU / DPI) as u64;
        // 判断图片是否大于文档宽度
        if width_emu > DOCX_MAX_EMU {
            // 按比例缩放高度，用u128避免溢出
            let height_emu = u128::from(height_emu) * u128::from(DOCX_MAX_EMU) / u128::from(width_emu);
            (DOCX_MAX_EMU, height_emu as u64)
        } else {
            (width_emu, height_emu)
        }
    }
}

fn read_image_info(image_data: &[u8]) -> Result<(ImageFormat, u32, u32)> {
    let reader = ImageReader::new(Cursor::new(image_data)).with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| DocxError::UnsupportedImageFormat("unrecognized image data".to_string()))?;
    let (width, height) = reader.into_dimensions()?;
    Ok((format, width, height))
}
