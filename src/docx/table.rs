use crate::docx::compose::{Columns, Composer, Content};
use crate::docx::word::*;
use crate::error::{DocxError, Result};
use crate::xml::{NodeId, XmlTree};
use log::{debug, warn};
use quick_xml::escape::escape;

/// 表格属性：样式、列宽(twips)、每列的段落样式以及首列和末列强调
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableProperties {
    style: Option<String>,
    column_widths: Option<Vec<u32>>,
    column_styles: Option<Vec<String>>,
    first_column: bool,
    last_column: bool,
}

impl TableProperties {
    /// @param style 表格样式，为空时使用LightGrid
    /// @param column_widths 列宽(twip, 1英寸=1440)
    /// @param column_styles 每列的段落样式
    pub fn new(
        style: Option<&str>,
        column_widths: Option<Vec<u32>>,
        column_styles: Option<Vec<String>>,
    ) -> Self {
        TableProperties {
            style: style.map(str::to_string),
            column_widths,
            column_styles,
            first_column: false,
            last_column: false,
        }
    }

    pub fn with_first_column(mut self, first_column: bool) -> Self {
        self.first_column = first_column;
        self
    }

    pub fn with_last_column(mut self, last_column: bool) -> Self {
        self.last_column = last_column;
        self
    }

    pub fn style(&self) -> &str {
        self.style.as_deref().unwrap_or(DEFAULT_TABLE_STYLE)
    }

    pub fn column_widths(&self) -> Option<&[u32]> {
        self.column_widths.as_deref()
    }

    pub fn column_styles(&self) -> Option<&[String]> {
        self.column_styles.as_deref()
    }

    pub fn first_column(&self) -> bool {
        self.first_column
    }

    pub fn last_column(&self) -> bool {
        self.last_column
    }

    fn column_width(&self, column: usize) -> Option<u32> {
        self.column_widths().and_then(|widths| widths.get(column).copied())
    }

    fn column_style(&self, column: usize) -> Option<&str> {
        self.column_styles()
            .and_then(|styles| styles.get(column))
            .map(String::as_str)
    }

    /// w:tblPr标签
    pub fn to_xml(&self) -> String {
        // 首行强调，末行不强调，不使用列带
        let mut look = 0x0020 | 0x0400;
        if self.first_column {
            look |= 0x0080;
        }
        if self.last_column {
            look |= 0x0100;
        }
        format!(
            concat!(
                r#"<w:tblPr><w:tblStyle w:val="{}"/><w:tblW w:w="0" w:type="auto"/>"#,
                r#"<w:tblLook w:val="{:04X}" w:firstRow="1" w:lastRow="0" w:firstColumn="{}" w:lastColumn="{}" w:noHBand="0" w:noVBand="1"/></w:tblPr>"#
            ),
            escape(self.style()),
            look,
            u8::from(self.first_column),
            u8::from(self.last_column)
        )
    }
}

/// 创建表格的参数
/// 设置了table_properties时，优先于单独设置的样式、列宽和列样式
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableOptions {
    table_style: Option<String>,
    column_widths: Option<Vec<u32>>,
    column_styles: Option<Vec<String>>,
    table_properties: Option<TableProperties>,
    skip_header: bool,
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_style(mut self, table_style: &str) -> Self {
        self.table_style = Some(table_style.to_string());
        self
    }

    pub fn with_column_widths(mut self, column_widths: Vec<u32>) -> Self {
        self.column_widths = Some(column_widths);
        self
    }

    pub fn with_column_styles<S: Into<String>>(mut self, column_styles: Vec<S>) -> Self {
        self.column_styles = Some(column_styles.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_table_properties(mut self, table_properties: TableProperties) -> Self {
        self.table_properties = Some(table_properties);
        self
    }

    pub fn with_skip_header(mut self, skip_header: bool) -> Self {
        self.skip_header = skip_header;
        self
    }

    pub fn skip_header(&self) -> bool {
        self.skip_header
    }

    /// 渲染使用的表格属性
    /// @param inferred_widths 推断出的列宽，只在没有明确设置列宽时使用
    pub(crate) fn resolve(&self, inferred_widths: Option<Vec<u32>>) -> TableProperties {
        let mut properties = match &self.table_properties {
            Some(properties) => properties.clone(),
            None => TableProperties::new(
                self.table_style.as_deref(),
                self.column_widths.clone(),
                self.column_styles.clone(),
            ),
        };
        if properties.column_widths.is_none() {
            properties.column_widths = inferred_widths;
        }
        properties
    }
}

impl Composer<'_> {
    /// 根据列数据生成表格
    /// @param columns 列名以及每列的数据
    pub fn table(&mut self, columns: &Columns) -> Result<String> {
        if columns.is_empty() {
            return Err(DocxError::InvalidTable("table has no columns".to_string()));
        }
        let properties = columns.options().resolve(None);
        let headers: Vec<Vec<String>> = vec![
            columns
                .columns()
                .iter()
                .map(|(header, _)| header.clone())
                .collect(),
        ];
        let rows: Vec<Vec<&Content>> = (0..columns.row_count())
            .map(|row| {
                columns
                    .columns()
                    .iter()
                    .map(|(_, value)| Columns::cell(value, row))
                    .collect()
            })
            .collect();
        debug!(
            "table with {} columns and {} rows",
            columns.columns().len(),
            rows.len()
        );
        self.table_markup(&properties, columns.options().skip_header(), &headers, &rows)
    }

    /// 根据html表格生成表格
    /// @param html 包含table标签的html片段
    /// @param options 表格参数
    pub fn html_table(&mut self, html: &str, options: &TableOptions) -> Result<String> {
        let table = HtmlTable::parse(html)?;
        let properties = options.resolve(table.widths);
        let rows: Vec<Vec<Content>> = table
            .body
            .into_iter()
            .map(|row| row.into_iter().map(Content::Text).collect())
            .collect();
        let rows: Vec<Vec<&Content>> = rows.iter().map(|row| row.iter().collect()).collect();
        debug!("html table with {} header rows and {} rows", table.head.len(), rows.len());
        self.table_markup(&properties, options.skip_header(), &table.head, &rows)
    }

    fn table_markup(
        &mut self,
        properties: &TableProperties,
        skip_header: bool,
        headers: &[Vec<String>],
        rows: &[Vec<&Content>],
    ) -> Result<String> {
        let mut fragment = String::from("<w:tbl>");
        fragment.push_str(&properties.to_xml());

        if let Some(widths) = properties.column_widths() {
            fragment.push_str("<w:tblGrid>");
            for width in widths {
                fragment.push_str(&format!(r#"<w:gridCol w:w="{width}"/>"#));
            }
            fragment.push_str("</w:tblGrid>");
        }

        if !skip_header {
            for header_row in headers {
                fragment.push_str("<w:tr>");
                for header in header_row {
                    fragment.push_str(&format!(
                        "<w:tc><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:tc>",
                        escape(header.as_str())
                    ));
                }
                fragment.push_str("</w:tr>");
            }
        }

        for row in rows {
            fragment.push_str("<w:tr>");
            for (column, value) in row.iter().enumerate() {
                fragment.push_str("<w:tc>");
                if let Some(width) = properties.column_width(column) {
                    fragment.push_str(&format!(
                        r#"<w:tcPr><w:tcW w:type="dxa" w:w="{width}"/></w:tcPr>"#
                    ));
                }
                fragment.push_str(&self.cell_markup(value, properties.column_style(column))?);
                fragment.push_str("</w:tc>");
            }
            fragment.push_str("</w:tr>");
        }

        fragment.push_str("</w:tbl>");
        Ok(fragment)
    }
}

/// html表格的表头行、数据行以及推断出的列宽
#[derive(Debug, Default, PartialEq)]
struct HtmlTable {
    head: Vec<Vec<String>>,
    body: Vec<Vec<String>>,
    widths: Option<Vec<u32>>,
}

impl HtmlTable {
    fn parse(html: &str) -> Result<Self> {
        let mut tree = XmlTree::default();
        let roots = tree
            .parse_fragment(html)
            .map_err(|e| DocxError::InvalidHtmlTable(e.to_string()))?;
        let table = roots
            .iter()
            .flat_map(|&root| std::iter::once(root).chain(tree.descendants(root)))
            .find(|&node| tree.local_name(node) == Some("table"))
            .ok_or_else(|| DocxError::InvalidHtmlTable("no table element".to_string()))?;

        let mut html_table = HtmlTable::default();
        let mut widths: Option<Vec<u32>> = None;

        if let Some(thead) = child_named(&tree, table, "thead") {
            for tr in children_named(&tree, thead, "tr") {
                let cells = children_named(&tree, tr, "th");
                infer_widths(&tree, &cells, &mut widths);
                html_table
                    .head
                    .push(cells.iter().map(|&cell| tree.text_content(cell)).collect());
            }
        }

        // 没有tbody时，直接使用table下的tr
        let body_rows = match child_named(&tree, table, "tbody") {
            Some(tbody) => children_named(&tree, tbody, "tr"),
            None => children_named(&tree, table, "tr"),
        };
        for tr in body_rows {
            let cells = children_named(&tree, tr, "td");
            infer_widths(&tree, &cells, &mut widths);
            html_table
                .body
                .push(cells.iter().map(|&cell| tree.text_content(cell)).collect());
        }

        html_table.widths = widths;
        Ok(html_table)
    }
}

fn child_named(tree: &XmlTree, parent: NodeId, name: &str) -> Option<NodeId> {
    children_named(tree, parent, name).into_iter().next()
}

fn children_named(tree: &XmlTree, parent: NodeId, name: &str) -> Vec<NodeId> {
    tree.children(parent)
        .iter()
        .copied()
        .filter(|&child| {
            tree.local_name(child)
                .is_some_and(|local| local.eq_ignore_ascii_case(name))
        })
        .collect()
}

// 第一个带有width属性的行决定列宽
fn infer_widths(tree: &XmlTree, cells: &[NodeId], widths: &mut Option<Vec<u32>>) {
    if widths.is_some() || !cells.iter().any(|&cell| tree.attr(cell, "width").is_some()) {
        return;
    }
    *widths = Some(
        cells
            .iter()
            .map(|&cell| {
                tree.attr(cell, "width")
                    .map_or(0, |width| html_width_twips(&width))
            })
            .collect(),
    );
}

/// html width属性开头的数字，"120px"为120
fn html_width(width: &str) -> u32 {
    let width = width.trim();
    let digits = width
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(width.len());
    match width[..digits].parse() {
        Ok(value) => value,
        Err(_) => {
            warn!("ignoring html width {:?}", width);
            0
        }
    }
}

/// html列宽换算成twips，溢出时为0
fn html_width_twips(width: &str) -> u32 {
    html_width(width)
        .checked_mul(HTML_WIDTH_TO_TWIPS)
        .unwrap_or_else(|| {
            warn!("html width {:?} is too large", width);
            0
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::template::BLANK_DOCUMENT;
    use crate::package::{Package, PartData};

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

    fn parse(markup: &str) -> (XmlTree, NodeId) {
        let tree = XmlTree::parse(markup.as_bytes()).unwrap();
        let table = tree.root_element().unwrap();
        (tree, table)
    }

    fn row_texts(tree: &XmlTree, table: NodeId) -> Vec<Vec<String>> {
        tree.child_elements(table, "w:tr")
            .map(|tr| {
                tree.child_elements(tr, WORD_TABLE_CELL_TAG)
                    .map(|tc| tree.text_content(tc))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_table_properties_markup() {
        assert_eq!(
            TableProperties::default().to_xml(),
            concat!(
                r#"<w:tblPr><w:tblStyle w:val="LightGrid"/><w:tblW w:w="0" w:type="auto"/>"#,
                r#"<w:tblLook w:val="0420" w:firstRow="1" w:lastRow="0" w:firstColumn="0" w:lastColumn="0" w:noHBand="0" w:noVBand="1"/></w:tblPr>"#
            )
        );
        let properties = TableProperties::new(Some("Grid"), None, None)
            .with_first_column(true)
            .with_last_column(true);
        let markup = properties.to_xml();
        assert!(markup.contains(r#"<w:tblStyle w:val="Grid"/>"#));
        assert!(markup.contains(r#"w:val="05A0""#));
        assert!(markup.contains(r#"w:firstColumn="1" w:lastColumn="1""#));
    }

    #[test]
    fn test_explicit_properties_win() {
        let properties = TableProperties::new(Some("Plain"), Some(vec![100]), None);
        let options = TableOptions::new()
            .with_table_style("Ignored")
            .with_column_widths(vec![1, 2])
            .with_table_properties(properties.clone());
        assert_eq!(options.resolve(Some(vec![9])), properties);

        let options = TableOptions::new().with_column_widths(vec![1, 2]);
        assert_eq!(options.resolve(Some(vec![9])).column_widths(), Some(&[1, 2][..]));
        assert_eq!(
            TableOptions::new().resolve(Some(vec![9])).column_widths(),
            Some(&[9][..])
        );
    }

    #[test]
    fn test_table_shape() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        let columns = Columns::new()
            .column("A", vec!["a1", "a2", "a3"])
            .column("B", vec!["b1"])
            .column("C", Vec::<Content>::new());
        let (tree, table) = parse(&composer.table(&columns).unwrap());
        assert_eq!(
            row_texts(&tree, table),
            vec![
                vec!["A", "B", "C"],
                vec!["a1", "b1", ""],
                vec!["a2", "", ""],
                vec!["a3", "", ""],
            ]
        );
        // 每个单元格都以段落结尾
        for tc in tree
            .descendants(table)
            .into_iter()
            .filter(|&node| tree.is_element(node, WORD_TABLE_CELL_TAG))
        {
            let last = *tree.children(tc).last().unwrap();
            assert!(tree.is_element(last, WORD_PARAGRAPH_TAG));
        }

        let skipped = columns.with_options(TableOptions::new().with_skip_header(true));
        let (tree, table) = parse(&composer.table(&skipped).unwrap());
        assert_eq!(row_texts(&tree, table).len(), 3);
    }

    #[test]
    fn test_widths_and_column_styles() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        let columns = Columns::new()
            .column("A", "x")
            .column("B", "y")
            .with_options(
                TableOptions::new()
                    .with_column_widths(vec![2000])
                    .with_column_styles(vec!["Left", "Right"]),
            );
        let markup = composer.table(&columns).unwrap();
        assert!(markup.contains(r#"<w:tblGrid><w:gridCol w:w="2000"/></w:tblGrid>"#));
        assert!(markup.contains(concat!(
            r#"<w:tc><w:tcPr><w:tcW w:type="dxa" w:w="2000"/></w:tcPr>"#,
            r#"<w:p><w:pPr><w:pStyle w:val="Left"/></w:pPr>"#
        )));
        assert!(markup.contains(r#"<w:tc><w:p><w:pPr><w:pStyle w:val="Right"/></w:pPr>"#));
    }

    #[test]
    fn test_header_is_escaped() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        let markup = composer
            .table(&Columns::new().column("R&D <2>", Content::Empty))
            .unwrap();
        assert!(markup.contains("<w:t>R&amp;D &lt;2&gt;</w:t>"));
        // 空列只有表头
        assert_eq!(markup.matches("<w:tr>").count(), 1);
    }

    #[test]
    fn test_nested_table_in_cell() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        let inner = Columns::new().column("inner", vec!["deep"]);
        let outer = Columns::new().column("outer", vec![Content::from(inner), "flat".into()]);
        let (tree, table) = parse(&composer.table(&outer).unwrap());
        let rows: Vec<NodeId> = tree.child_elements(table, "w:tr").collect();
        let nested_cell = tree.first_child_element(rows[1], WORD_TABLE_CELL_TAG).unwrap();
        let nested = tree.first_child_element(nested_cell, WORD_TABLE_TAG).unwrap();
        assert_eq!(tree.text_content(nested), "innerdeep");
        assert!(tree
            .children(nested_cell)
            .last()
            .is_some_and(|&last| tree.is_element(last, WORD_PARAGRAPH_TAG)));
        assert_eq!(row_texts(&tree, table)[2], vec!["flat"]);
    }

    #[test]
    fn test_html_table() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        let html = r#"<div><table>
            <thead><tr><th width="100">Name</th><th>Qty</th></tr></thead>
            <tbody>
                <tr><td>Apple</td><td>3</td></tr>
                <tr><td>Pear &amp; plum</td><td>5</td></tr>
            </tbody>
        </table></div>"#;
        let markup = composer.html_table(html, &TableOptions::new()).unwrap();
        assert!(markup.contains(
            r#"<w:tblGrid><w:gridCol w:w="1500"/><w:gridCol w:w="0"/></w:tblGrid>"#
        ));
        let (tree, table) = parse(&markup);
        assert_eq!(
            row_texts(&tree, table),
            vec![
                vec!["Name", "Qty"],
                vec!["Apple", "3"],
                vec!["Pear & plum", "5"],
            ]
        );

        let markup = composer
            .html_table(html, &TableOptions::new().with_column_widths(vec![10, 20]))
            .unwrap();
        assert!(markup.contains(r#"<w:gridCol w:w="10"/><w:gridCol w:w="20"/>"#));
    }

    #[test]
    fn test_html_table_without_head_or_body() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        let markup = composer
            .html_table(
                "<table><tr><td>1</td></tr><tr><td>2</td></tr></table>",
                &TableOptions::new(),
            )
            .unwrap();
        assert!(!markup.contains("<w:tblGrid>"));
        let (tree, table) = parse(&markup);
        assert_eq!(row_texts(&tree, table), vec![vec!["1"], vec!["2"]]);
    }

    #[test]
    fn test_html_without_table_is_an_error() {
        let mut package = package();
        let mut composer = Composer::new(&mut package, WORD_DOCUMENT);
        for html in ["<p>no table</p>", "", "<table><tr></table>"] {
            assert!(matches!(
                composer.html_table(html, &TableOptions::new()),
                Err(DocxError::InvalidHtmlTable(_))
            ));
        }
    }

    #[test]
    fn test_html_width() {
        assert_eq!(html_width("120"), 120);
        assert_eq!(html_width(" 80px"), 80);
        assert_eq!(html_width("auto"), 0);
        assert_eq!(html_width_twips("40"), 600);
        assert_eq!(html_width_twips("4000000000"), 0);
        assert_eq!(html_width_twips("99999999999"), 0);

        let table = HtmlTable::parse(
            r#"<table><tr><td width="4000000000">a</td><td width="10">b</td></tr></table>"#,
        )
        .unwrap();
        assert_eq!(table.widths, Some(vec![0, 150]));
    }
}
