use crate::docx::body::{paragraph_runs, paragraphs, run_text, split_run};
use crate::docx::word::*;
use crate::xml::{NodeId, XmlTree};
use log::debug;

/// 段落中的一个匹配位置
#[derive(Debug, Clone, PartialEq)]
struct Occurrence {
    paragraph: NodeId,
    start: usize,
    end: usize,
}

/// 段落中的一个run，以及其文本在段落文本中的字节范围
#[derive(Debug, Clone, Copy)]
struct RunSpan {
    run: NodeId,
    start: usize,
    end: usize,
}

fn run_spans(tree: &XmlTree, paragraph: NodeId) -> (String, Vec<RunSpan>) {
    let mut text = String::new();
    let mut spans = Vec::new();
    for run in paragraph_runs(tree, paragraph) {
        let start = text.len();
        text.push_str(&run_text(tree, run));
        spans.push(RunSpan {
            run,
            start,
            end: text.len(),
        });
    }
    (text, spans)
}

/// 查找所有匹配的位置，匹配不会跨越段落
fn locate(tree: &XmlTree, root: NodeId, needle: &str) -> Vec<(Occurrence, Vec<RunSpan>)> {
    let mut found = Vec::new();
    if needle.is_empty() {
        return found;
    }
    for paragraph in paragraphs(tree, root) {
        let (text, spans) = run_spans(tree, paragraph);
        for (start, matched) in text.match_indices(needle) {
            found.push((
                Occurrence {
                    paragraph,
                    start,
                    end: start + matched.len(),
                },
                spans.clone(),
            ));
        }
    }
    found
}

/// 在匹配的起止位置拆分run，返回匹配覆盖的所有run
fn isolate(tree: &mut XmlTree, occurrence: &Occurrence, spans: &[RunSpan]) -> Vec<NodeId> {
    let touched: Vec<RunSpan> = spans
        .iter()
        .copied()
        .filter(|span| span.start < occurrence.end && span.end > occurrence.start)
        .collect();
    let (Some(first), Some(last)) = (touched.first().copied(), touched.last().copied()) else {
        return Vec::new();
    };

    let mut runs: Vec<NodeId> = touched.iter().map(|span| span.run).collect();
    // 后面的匹配可能已经拆分了最后一个run
    let last_end = last.start + run_text(tree, last.run).len();
    if occurrence.end < last_end {
        // 原run保留匹配部分，剩余部分移到新的run
        split_run(tree, last.run, occurrence.end - last.start);
    }
    if occurrence.start > first.start {
        let matched = split_run(tree, first.run, occurrence.start - first.start);
        runs[0] = matched;
    }
    runs
}

/// 替换匹配的run：复制第一个匹配run的格式，包含text，标记run则没有文本
fn replacement_run(tree: &mut XmlTree, template: NodeId, text: Option<&str>) -> NodeId {
    let run = tree.shallow_clone(template);
    if let Some(properties) = tree.first_child_element(template, WORD_RUN_PROPERTIES_TAG) {
        let copy = tree.deep_clone(properties);
        tree.append_child(run, copy);
    }
    if let Some(text) = text {
        let text_node = tree.create_element(WORD_TEXT_TAG);
        tree.set_attr(text_node, "xml:space", "preserve");
        tree.set_text(text_node, text);
        tree.append_child(run, text_node);
    }
    run
}

fn splice(
    tree: &mut XmlTree,
    root: NodeId,
    needle: &str,
    replacement: Option<&str>,
) -> Vec<NodeId> {
    let found = locate(tree, root, needle);
    let mut inserted = Vec::with_capacity(found.len());
    // 从后往前替换，前面匹配的位置不受影响
    for (occurrence, spans) in found.iter().rev() {
        let runs = isolate(tree, occurrence, spans);
        let Some(&first) = runs.first() else {
            continue;
        };
        let run = match replacement {
            Some(text) => replacement_run(tree, first, Some(text)),
            None => tree.create_element(WORD_RUN_TAG),
        };
        tree.insert_before(first, run);
        for run in runs {
            tree.detach(run);
        }
        inserted.push(run);
    }
    inserted.reverse();
    inserted
}

/// 将所有匹配的文本替换为新的文本，保留第一个匹配run的格式
/// @param tree 文档xml
/// @param root 查找范围，一般为body
/// @param needle 查找的文本
/// @param replacement 替换的文本
/// @return 替换的数量
pub fn replace_all_with_text(
    tree: &mut XmlTree,
    root: NodeId,
    needle: &str,
    replacement: &str,
) -> usize {
    let count = splice(tree, root, needle, Some(replacement)).len();
    debug!("replaced {} occurrences of {:?} with text", count, needle);
    count
}

/// 将所有匹配替换为空的标记run
/// @return 按文档顺序排列的标记run
pub fn replace_all_with_empty_runs(tree: &mut XmlTree, root: NodeId, needle: &str) -> Vec<NodeId> {
    let markers = splice(tree, root, needle, None);
    debug!("replaced {} occurrences of {:?} with markers", markers.len(), needle);
    markers
}

/// 统计匹配的数量，不修改文档
/// @param root 查找范围，一般为body
/// @param needle 查找的文本
pub fn count_occurrences(tree: &XmlTree, root: NodeId, needle: &str) -> usize {
    locate(tree, root, needle).len()
}

/// 用已解析的run节点替换标记run
/// @param marker 标记run
/// @param runs 游离的run节点，例如图片
pub fn replace_with_run_fragment(tree: &mut XmlTree, marker: NodeId, runs: &[NodeId]) {
    tree.replace(marker, runs);
}

/// 用块级节点（段落、表格）替换标记所在的段落，标记前后的内容各自保留在
/// 新的段落中
/// @param marker 标记run
/// @param blocks 游离的块级节点
pub fn replace_with_body_fragments(tree: &mut XmlTree, marker: NodeId, blocks: Vec<NodeId>) {
    let Some(paragraph) = tree.ancestor(marker, WORD_PARAGRAPH_TAG) else {
        tree.replace(marker, &blocks);
        return;
    };
    let Some(container) = tree.parent(paragraph) else {
        return;
    };

    let right = split_paragraph(tree, paragraph, marker);
    tree.detach(marker);

    let mut tail = blocks;
    // 节属性留在后半段，即使后半段没有内容
    if has_content(tree, right) || has_section_break(tree, right) {
        tail.push(right);
    }
    if has_content(tree, paragraph) {
        let mut anchor = paragraph;
        for node in tail {
            tree.insert_after(anchor, node);
            anchor = node;
        }
    } else {
        tree.replace(paragraph, &tail);
    }

    // 单元格必须以段落结尾
    if tree.is_element(container, WORD_TABLE_CELL_TAG) {
        let ends_with_paragraph = tree
            .children(container)
            .iter()
            .rev()
            .find(|&&child| tree.name(child).is_some())
            .is_some_and(|&child| tree.is_element(child, WORD_PARAGRAPH_TAG));
        if !ends_with_paragraph {
            let closing = tree.create_element(WORD_PARAGRAPH_TAG);
            tree.append_child(container, closing);
        }
    }
}

/// 将marker之后的内容移动到新的游离段落中并返回
/// 中间的容器（例如超链接）会被复制，保持相同的嵌套结构
fn split_paragraph(tree: &mut XmlTree, paragraph: NodeId, marker: NodeId) -> NodeId {
    let mut child = marker;
    let mut right_child: Option<NodeId> = None;
    loop {
        let Some(parent) = tree.parent(child) else {
            break;
        };
        let right = tree.shallow_clone(parent);
        if parent == paragraph {
            if let Some(properties) =
                tree.first_child_element(parent, WORD_PARAGRAPH_PROPERTIES_TAG)
            {
                let copy = tree.deep_clone(properties);
                tree.append_child(right, copy);
                // 分节符只属于后半段
                if let Some(section) =
                    tree.first_child_element(properties, WORD_SECTION_PROPERTIES_TAG)
                {
                    tree.detach(section);
                }
            }
        }
        if let Some(right_child) = right_child {
            tree.append_child(right, right_child);
        }
        let siblings = tree.children(parent).to_vec();
        if let Some(index) = siblings.iter().position(|&node| node == child) {
            for &sibling in &siblings[index + 1..] {
                tree.append_child(right, sibling);
            }
        }
        if parent == paragraph {
            return right;
        }
        right_child = Some(right);
        child = parent;
    }
    tree.create_element(WORD_PARAGRAPH_TAG)
}

fn has_section_break(tree: &XmlTree, paragraph: NodeId) -> bool {
    tree.first_child_element(paragraph, WORD_PARAGRAPH_PROPERTIES_TAG)
        .and_then(|properties| tree.first_child_element(properties, WORD_SECTION_PROPERTIES_TAG))
        .is_some()
}

// 段落中是否还有内容（文本、图片、公式等）
fn has_content(tree: &XmlTree, paragraph: NodeId) -> bool {
    tree.descendants(paragraph).into_iter().any(|node| {
        (tree.is_element(node, WORD_RUN_TAG)
            && tree
                .children(node)
                .iter()
                .any(|&child| tree.name(child).is_some() && !tree.is_element(child, WORD_RUN_PROPERTIES_TAG)))
            || matches!(tree.local_name(node), Some("oMath" | "oMathPara"))
    })
}
