//! Shared helpers for provider implementations
//!
//! Model output post-processing used by every agent: fenced code block
//! extraction, tolerant JSON extraction, and chat message assembly.

use crate::message::Message;

/// A fenced code block extracted from model output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Language tag after the opening fence, if any
    pub language: Option<String>,
    /// Block content without the fences
    pub content: String,
}

/// Extract all fenced code blocks from text.
///
/// An unterminated trailing fence is treated as running to the end of the
/// input.
#[must_use]
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix("```") else {
            continue;
        };
        let language = {
            let tag = rest.trim();
            if tag.is_empty() {
                None
            } else {
                Some(tag.to_string())
            }
        };

        let mut content = String::new();
        for body_line in lines.by_ref() {
            if body_line.trim_start().starts_with("```") {
                break;
            }
            content.push_str(body_line);
            content.push('\n');
        }
        blocks.push(CodeBlock { language, content });
    }

    blocks
}

/// Extract a JSON value from model output.
///
/// Prefers a ```json fenced block, then any fenced block, then a raw parse
/// of the trimmed text.
pub fn extract_json(text: &str) -> serde_json::Result<serde_json::Value> {
    let blocks = extract_code_blocks(text);

    if let Some(block) = blocks
        .iter()
        .find(|b| b.language.as_deref() == Some("json"))
    {
        return serde_json::from_str(block.content.trim());
    }
    if let Some(block) = blocks.first() {
        if let Ok(value) = serde_json::from_str(block.content.trim()) {
            return Ok(value);
        }
    }
    serde_json::from_str(text.trim())
}

/// Assemble a chat message list from an optional system prompt and a user
/// prompt
#[must_use]
pub fn build_messages(system_prompt: Option<&str>, user_prompt: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(user_prompt));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_single_block() {
        let text = "Here is the code:\n```rust\nfn main() {}\n```\nDone.";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language.as_deref(), Some("rust"));
        assert_eq!(blocks[0].content, "fn main() {}\n");
    }

    #[test]
    fn test_extract_multiple_blocks() {
        let text = "```py\na = 1\n```\ntext\n```\nplain\n```";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language.as_deref(), Some("py"));
        assert!(blocks[1].language.is_none());
    }

    #[test]
    fn test_unterminated_block_runs_to_end() {
        let text = "```json\n{\"a\": 1}";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content.trim(), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_prefers_json_fence() {
        let text = "```\nnot json\n```\n```json\n{\"complexity\": \"simple\"}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["complexity"], "simple");
    }

    #[test]
    fn test_extract_json_raw_fallback() {
        let value = extract_json("  {\"phases\": []}  ").unwrap();
        assert!(value["phases"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_extract_json_rejects_garbage() {
        assert!(extract_json("no json here").is_err());
    }

    #[test]
    fn test_build_messages() {
        let with_system = build_messages(Some("be terse"), "hello");
        assert_eq!(with_system.len(), 2);

        let without = build_messages(None, "hello");
        assert_eq!(without.len(), 1);
    }
}
