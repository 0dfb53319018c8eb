use crate::docx::word::MATHML_NS;
use crate::error::Result;
use crate::xml::XmlTree;

/// 将MathML转换为Office Math(m:oMath)，例如使用XSLT样式表
pub trait MathTransform {
    fn mathml_to_omml(&self, mathml: &str) -> Result<String>;
}

impl<F> MathTransform for F
where
    F: Fn(&str) -> Result<String>,
{
    fn mathml_to_omml(&self, mathml: &str) -> Result<String> {
        self(mathml)
    }
}

/// 为缺少命名空间的math标签添加MathML命名空间
/// @param mathml MathML片段
/// @return 没有math标签时返回None
pub fn prepare_mathml(mathml: &str) -> Result<Option<String>> {
    let mut tree = XmlTree::default();
    let roots = tree.parse_fragment(mathml)?;
    let math: Vec<_> = roots
        .iter()
        .flat_map(|&root| std::iter::once(root).chain(tree.descendants(root)))
        .filter(|&node| tree.local_name(node) == Some("math"))
        .collect();
    if math.is_empty() {
        return Ok(None);
    }
    for node in math {
        if tree.attr(node, "xmlns").is_none() {
            tree.set_attr(node, "xmlns", MATHML_NS);
        }
    }
    let mut prepared = String::new();
    for root in roots {
        prepared.push_str(&tree.node_to_string(root)?);
    }
    Ok(Some(prepared))
}

/// 公式段落
/// @param omml Office Math片段
pub fn math_paragraph(omml: &str) -> String {
    format!("<w:p>{omml}</w:p>")
}
