use crate::error::{DocxError, Result};
use crate::image::DocxImage;
use log::debug;
use reqwest::Client;

/// 获取图片数据
/// @param client 请求客户端
/// @param url 图片url路径
/// @return (data, content_type) 返回 Vec<u8>和图片类型
pub async fn request_image_data(client: &Client, url: &str) -> Result<(Vec<u8>, String)> {
    // 发送请求
    let response = client.get(url).send().await?;
    // 检查状态码
    if !response.status().is_success() {
        return Err(DocxError::NotImage(format!(
            "{} answered {}",
            url,
            response.status()
        )));
    }
    // 获取内容类型以验证是否为图片
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.starts_with("image/") {
        return Err(DocxError::NotImage(content_type));
    }
    // 读取字节
    let image_data = response.bytes().await?.to_vec();
    debug!("fetched {} bytes of {} from {}", image_data.len(), content_type, url);
    Ok((image_data, content_type))
}

/// 下载图片，格式和尺寸由图片数据识别
/// @param client 请求客户端
/// @param url 图片url路径
pub async fn request_image(client: &Client, url: &str) -> Result<DocxImage> {
    let (image_data, _) = request_image_data(client, url).await?;
    DocxImage::new_image_data(image_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_malformed_url_is_an_error() {
        let client = Client::new();
        let err = request_image(&client, "not a url").await.unwrap_err();
        assert!(matches!(err, DocxError::InvalidImageUrl(_)));
    }
}
