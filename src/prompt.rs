//! 提示词常量与 Prompt 组装
//!
//! [`assemble`] 是纯函数：相同的检索结果、记忆窗口和问题总是得到相同的文本。

use crate::memory::ConversationTurn;
use crate::rag::ScoredChunk;

pub const SYSTEM_PROMPT: &str =
    "You are a friendly e-commerce assistant. Stay focused on store-related topics.";

pub const SAMPLE_QA: &str = "\
Example interactions:
Q: How much does the UltraPhone X cost?
A: The UltraPhone X costs $799. It's available in Black, Silver, and Blue colors.

Q: What are your shipping options?
A: We offer standard shipping (3-5 business days) for $4.99 and express shipping (1-2 business days) for $12.99. Orders over $50 qualify for free standard shipping.

Q: Can I return a laptop if I change my mind?
A: Yes, you can return a laptop within 30 days of purchase if it's in its original condition and packaging. A proof of purchase is required.

Q: When will the GamerPro 5 Laptop be available?
A: The GamerPro 5 Laptop is currently available for pre-order and will ship in 2 weeks.

Q: Do AirBuds Pro support wireless charging?
A: Yes, the AirBuds Pro support wireless charging and offer up to 24 hours of battery life.";

const STORE_CONTEXT: &str = "\
You are a helpful customer service AI assistant for an e-commerce store.
Your task is to help customers with:
- Product information, prices, and availability
- Shipping and return policies
- Technical specifications and features
- Color options and stock status

Use the ecommerce_assistant tool to retrieve accurate information from the knowledge base.
Use add_customer_note to record customer preferences or issues, and get_recent_notes to review them.
Always be polite, clear, and concise in your responses.

Here are some example interactions to follow:
";

pub const QUERY_TEMPLATE: &str = "\
{context_str}

Previous Conversation:
{chat_history}

Current Customer Question: {query_str}

Using the information provided above and keeping in mind the conversation context, please provide a helpful and accurate response.
Follow the style of the example interactions when responding.
If referring to previous conversation elements, be specific about what was discussed.

Assistant Response: ";

/// 知识库中找不到相关内容时直接返回给用户的固定回答
pub const NOT_FOUND_MESSAGE: &str = "I apologize, but I don't have enough information in my knowledge base to accurately answer your question. Please contact our customer support team for more detailed information.";

/// 工具执行失败（包括空索引）时的固定道歉
pub const APOLOGY_MESSAGE: &str = "I'm sorry, I ran into a problem while looking that up. Please try rephrasing your question, or contact our customer support team.";

/// 外部模型服务不可用时的道歉，提示用户稍后重试
pub const RETRY_APOLOGY_MESSAGE: &str = "I'm sorry, our assistant is temporarily unavailable. Please try again in a moment.";

/// 规划器的 system 消息：人设 + 店铺上下文 + 示例问答
pub fn planner_system_prompt() -> String {
    format!("{SYSTEM_PROMPT}\n\n{STORE_CONTEXT}{SAMPLE_QA}")
}

/// 按检索顺序拼接 chunk 文本；没有 chunk 时给出引导模型回答“信息不足”的说明
pub fn render_context(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return format!(
            "No relevant information was found in the knowledge base for this question.\n\
             If you cannot answer from the conversation alone, reply with exactly:\n{NOT_FOUND_MESSAGE}"
        );
    }
    chunks
        .iter()
        .map(|c| c.chunk.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// `Role: content`，从旧到新，每轮一行
pub fn render_history(window: &[ConversationTurn]) -> String {
    window
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 组装知识库问答的完整 prompt
pub fn assemble(chunks: &[ScoredChunk], window: &[ConversationTurn], query: &str) -> String {
    render(
        QUERY_TEMPLATE,
        &[
            ("context_str", render_context(chunks)),
            ("chat_history", render_history(window)),
            ("query_str", query.trim().to_string()),
        ],
    )
}

/// 单遍替换 `{name}` 占位符；替换进来的值不会再被展开，未知占位符原样保留
pub fn render(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (v, close))
        });
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
