//! Prompts for the three LLM-backed decisions.
//!
//! Centralising every prompt here keeps wording changes away from the retry
//! and validation logic in the stages, and lets tests inspect prompts
//! without a model.
//!
//! Each prompt goes out as the only message of its request, so it carries
//! its own role and output instructions. Every prompt asks for a single
//! JSON object. The feature and target
//! prompts carry the attempt number so a model that keeps answering badly
//! is told this is a retry.

use crate::output::TableContext;
use crate::targets::OTHER_TABLE_TYPE;

/// Heading question: is `text` a heading, given its neighbours?
///
/// Expected reply: `{"结果": "是"}` or `{"结果": "否"}`.
pub fn title_prompt(text: &str, context: &[&str]) -> String {
    let context_list = serde_json::to_string(context).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"你是金融文档分析专家。请结合【段落上下文】判断【文本数据】是否为章节标题，只以JSON格式回答是或否。
【段落上下文】
{context_list}
【文本数据】
{text}
【判断要点】
1. 段落上下文是一个列表，每个元素可能是标题、正文段落、表格名称或目录条目；
2. 文本数据是段落上下文中的一个元素；
3. 目录条目虽然形似标题，但末尾带页码（阿拉伯或罗马数字），应回答否；
4. 多个带序号的短句连续出现、彼此之间没有正文，不构成“标题-正文”结构，应回答否；
5. 紧接着出现表格单位的是表格名称，不是标题，应回答否；
6. 含“表：”字样的是表格名称，应回答否；
7. 标题不一定带有文字或数字序号。
【输出格式】
{{"结果": "是"}} 或 {{"结果": "否"}}"#
    )
}

/// Table description request for one context.
///
/// Expected reply keys: 表格类型, 所属章节, 表格标题, 表头, 关键词, 时间序列.
pub fn table_feature_prompt(ctx: &TableContext, vocabulary: &[&str], attempt: u32) -> String {
    let types = vocabulary.join("、");
    format!(
        r#"你是财务表格分析专家。请根据表格所属章节、表格上下文和表格内容提取表格特征，以JSON格式输出。
【表格特征】
表格类型、所属章节、表格标题、表头、关键词、时间序列
【提取说明】
表格类型：
- 只能从以下类型中选择：{types}
- 不属于上述任何类型时，必须输出“{other}”，不得保留原表名
关键词：
- 如有期限信息，关键词中要包含期限
【表格所属章节】
{menu}
【表格上下文】
{pretext}
【表格内容】
{content}
【输出格式】
{{"表格类型": "", "所属章节": "", "表格标题": "", "表头": [], "关键词": [], "时间序列": []}}
【特别说明】
严格按JSON格式输出，所有字段都必须给出。这是第{attempt}次尝试，请确保格式正确。"#,
        other = OTHER_TABLE_TYPE,
        menu = ctx.menu,
        pretext = ctx.preceding_text,
        content = ctx.content,
    )
}

/// Arbitration request: which candidate best fits the target description?
///
/// `candidates` is the JSON array of candidate features. Expected reply:
/// `{"id": "<table id>"}`, or `{"id": "0"}` when none fits.
pub fn target_table_prompt(description: &str, candidates: &str, attempt: u32) -> String {
    format!(
        r#"你是财务表格分析专家。请根据【表格特征列表】判断哪一个表格最符合【目标表】，以JSON格式输出该表格的id。
【表格特征列表】
{candidates}
【目标表】
{description}
【输出格式】
{{"id": ""}}
【都不符合时输出】
{{"id": "0"}}
【特别说明】
严格按JSON格式输出，id必须原样取自表格特征列表。这是第{attempt}次尝试，请确保格式正确。"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RawTable;

    fn ctx() -> TableContext {
        TableContext {
            id: "0f1e-2d3c".into(),
            menu: "第五节 财务会计信息".into(),
            preceding_text: "表：发行人近三年合并现金流量表\n单位：万元".into(),
            content: "项目\t2024年\t2023年".into(),
            data: vec![],
            raw: RawTable::default(),
            paragraph_indices: vec![12],
        }
    }

    #[test]
    fn title_prompt_lists_context_as_json() {
        let p = title_prompt("（一）发行人概况", &["正文", "（一）发行人概况"]);
        assert!(p.contains(r#"["正文","（一）发行人概况"]"#), "got: {p}");
        assert!(p.contains(r#"{"结果": "是"}"#));
    }

    #[test]
    fn feature_prompt_carries_vocabulary_and_attempt() {
        let p = table_feature_prompt(&ctx(), &["资产负债表", "现金流"], 2);
        assert!(p.contains("资产负债表、现金流"));
        assert!(p.contains("其他表"));
        assert!(p.contains("第2次尝试"));
        assert!(p.contains("合并现金流量表"));
        assert!(p.contains("第五节 财务会计信息"));
    }

    #[test]
    fn target_prompt_carries_sentinel_and_attempt() {
        let p = target_table_prompt("现金流：最新", "[]", 3);
        assert!(p.contains(r#"{"id": "0"}"#));
        assert!(p.contains("第3次尝试"));
        assert!(p.contains("现金流：最新"));
    }
}
