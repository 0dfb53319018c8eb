use crate::docx::compose::Composer;
use crate::docx::template::image_run_fragment;
use crate::docx::word::*;
use crate::error::Result;
use crate::image::DocxImage;
use crate::package::PartData;
use crate::xml::XmlTree;
use log::debug;

/// 部件所在目录，/word/document.xml对应/word
fn part_folder(part: &str) -> &str {
    part.rsplit_once('/').map_or("", |(folder, _)| folder)
}

// 文档中已有的最大绘图对象编号
fn max_drawing_id(tree: &XmlTree) -> u32 {
    tree.roots()
        .iter()
        .flat_map(|&root| std::iter::once(root).chain(tree.descendants(root)))
        .filter(|&node| tree.local_name(node) == Some(WORD_DRAWING_PROPERTIES))
        .filter_map(|node| tree.attr(node, "id")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}

impl Composer<'_> {
    fn next_drawing_id(&mut self) -> Result<u32> {
        let id = match self.drawing_id {
            Some(id) => id,
            None => max_drawing_id(self.package.xml_part(self.part)?).saturating_add(1),
        };
        self.drawing_id = Some(id.saturating_add(1));
        Ok(id)
    }

    /// 添加图片到文档中，返回引用该图片的run片段
    /// @param image 图片
    pub fn image_run(&mut self, image: &DocxImage) -> Result<String> {
        // 先检查格式，避免添加不完整的部件
        let extension = image.extension()?;
        let mime_type = image.mime_type()?;
        let drawing_id = self.next_drawing_id()?;

        let prefix = format!(
            "{}/{}/{}",
            part_folder(self.part),
            WORD_MEDIA_DIR,
            WORD_MEDIA_IMAGE
        );
        let identifier = self.package.unused_part_identifier(&prefix);
        let path = format!("{prefix}{identifier}.{extension}");
        self.package
            .add_part(&path, mime_type, PartData::Binary(image.data().to_vec()))?;
        let relation_id = self
            .package
            .add_relationship(self.part, &path, IMAGE_RELATIONSHIP_TYPE)?;

        let (width, height) = image.extent_emu();
        debug!("embedded {} as {} ({}x{} emu)", path, relation_id, width, height);
        Ok(image_run_fragment(drawing_id, identifier, &relation_id, width, height))
    }
}
