//! Extraction prompt construction.

use tracing::debug;

use crate::models::config::PromptConfig;
use crate::models::schema::ExtractionSchema;

/// Prompt pair for one document.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub system: String,
    pub user: String,
    /// Set when the document text was cut to fit the input limit.
    pub truncation: Option<TruncationNote>,
}

/// Record of a tail truncation of the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationNote {
    pub original_chars: usize,
    pub kept_chars: usize,
}

/// Builds the instruction text sent to the model.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    schema: ExtractionSchema,
    max_input_chars: usize,
}

const SYSTEM_PROMPT: &str = "你是一个专业的简历解析助手，负责从简历文本中提取结构化信息。
只返回一个 JSON 对象，不要输出任何解释性文字或 Markdown 代码块。
字段名必须与给定结构完全一致；所有字段都必须出现。
简历中找不到的信息一律填空字符串 \"\"，不要猜测，不要省略字段。
日期统一写成 YYYY-MM 或 YYYY-MM-DD；仍在进行中的结束时间写 \"至今\"。
列表按简历中出现的顺序排列。";

impl PromptBuilder {
    pub fn new(config: &PromptConfig) -> Self {
        Self {
            schema: ExtractionSchema::CURRENT,
            max_input_chars: config.max_input_chars,
        }
    }

    /// Build the prompt pair for `text`.
    pub fn build(&self, text: &str) -> ExtractionRequest {
        let (body, truncation) = truncate_chars(text, self.max_input_chars);
        if let Some(note) = truncation {
            debug!(
                "Truncated document text from {} to {} chars",
                note.original_chars, note.kept_chars
            );
        }

        // Value serialization cannot fail
        let skeleton = serde_json::to_string_pretty(&self.schema.skeleton()).unwrap_or_default();
        let paths = self.schema.field_paths().join("\n");

        let user = format!(
            "请解析以下简历文本，按给定结构返回 JSON 结果。\n\n\
             简历文本：\n{body}\n\n\
             返回结构（值为字段说明）：\n{skeleton}\n\n\
             字段路径清单：\n{paths}\n\n\
             请只返回 JSON。"
        );

        ExtractionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user,
            truncation,
        }
    }
}

/// Keep at most `max_chars` characters from the head of `text`.
fn truncate_chars(text: &str, max_chars: usize) -> (&str, Option<TruncationNote>) {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => {
            let original_chars = text.chars().count();
            (
                &text[..byte_index],
                Some(TruncationNote {
                    original_chars,
                    kept_chars: max_chars,
                }),
            )
        }
        None => (text, None),
    }
}
