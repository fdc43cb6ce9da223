//! Prompt construction for TNMT multi-label classification

use newslabel_core::text::{estimate_tokens, truncate_chars, truncate_to_tokens};
use newslabel_core::{ChatMessage, Label, Record};

const FEW_SHOT_EXAMPLES: &str = r#"
VÍ DỤ:

Ví dụ 1:
Tiêu đề: "Ô nhiễm nguồn nước do chất thải công nghiệp tại TP.HCM"
Mô tả: "Tình trạng ô nhiễm nguồn nước ngày càng nghiêm trọng"
Nội dung: "Các nhà máy xả thải trực tiếp xuống sông, ảnh hưởng đến chất lượng nước sinh hoạt..."

Output: [
  {"label": "Môi trường", "confidence": 0.95},
  {"label": "Tài nguyên nước", "confidence": 0.90}
]

Ví dụ 2:
Tiêu đề: "Ứng dụng viễn thám giám sát rừng tự nhiên"
Mô tả: "Sử dụng ảnh vệ tinh để theo dõi diện tích rừng"
Nội dung: "Công nghệ viễn thám giúp phát hiện sớm các khu vực bị phá rừng, bảo vệ đa dạng sinh học..."

Output: [
  {"label": "Viễn thám", "confidence": 0.98},
  {"label": "Đa dạng sinh học", "confidence": 0.85}
]

Ví dụ 3:
Tiêu đề: "Quy hoạch sử dụng đất nông nghiệp tỉnh An Giang"
Mô tả: "Kế hoạch sử dụng đất giai đoạn 2021-2025"
Nội dung: "Quy hoạch chi tiết việc sử dụng đất cho sản xuất nông nghiệp, bảo đảm hiệu quả kinh tế..."

Output: [
  {"label": "Đất đai", "confidence": 0.92}
]
"#;

const FORMAT_REMINDER: &str = r#"
QUAN TRỌNG:
- Chỉ trả về JSON array hợp lệ
- Không giải thích thêm
- Confidence score từ 0.0 đến 1.0
- Tên nhãn phải chính xác theo danh sách đã cho
"#;

/// Messages for one record, with the prompt-size estimate used for pacing
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub messages: Vec<ChatMessage>,
    /// Estimated prompt tokens across all messages
    pub estimated_tokens: u32,
    /// Whether the article body was cut to fit
    pub truncated: bool,
}

/// Builds classification prompts from records
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    max_content_chars: usize,
    max_prompt_tokens: u32,
}

impl PromptBuilder {
    /// Create a builder with a body character budget and a total prompt token ceiling
    pub fn new(max_content_chars: usize, max_prompt_tokens: u32) -> Self {
        Self {
            system_prompt: system_prompt(),
            max_content_chars,
            max_prompt_tokens,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Build the system and user messages for `record`.
    ///
    /// The body is first capped at the character budget. If the whole prompt
    /// still exceeds the token ceiling, the body is cut further from the end.
    pub fn build(&self, record: &Record) -> BuiltPrompt {
        let capped = truncate_chars(&record.content, self.max_content_chars);
        let mut truncated = record.content.chars().count() > self.max_content_chars;

        let overhead = estimate_tokens(&self.system_prompt)
            + estimate_tokens(&self.user_prompt(&record.title, &record.description, ""));
        let content_budget = self.max_prompt_tokens.saturating_sub(overhead);
        let (content, cut) = truncate_to_tokens(&capped, content_budget);
        truncated |= cut;

        let user = self.user_prompt(&record.title, &record.description, content);
        let estimated_tokens = estimate_tokens(&self.system_prompt) + estimate_tokens(&user);

        BuiltPrompt {
            messages: vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(user),
            ],
            estimated_tokens,
            truncated,
        }
    }

    fn user_prompt(&self, title: &str, description: &str, content: &str) -> String {
        format!(
            "{}\n\n{}\n\n{}",
            FEW_SHOT_EXAMPLES,
            classification_prompt(title, description, content),
            FORMAT_REMINDER
        )
    }
}

/// Role, taxonomy, and output format instructions
pub fn system_prompt() -> String {
    let labels = Label::ALL
        .iter()
        .map(|label| format!("{}. {}", label.id(), label.name()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Bạn là một chuyên gia phân loại văn bản trong lĩnh vực Tài nguyên và Môi trường (TNMT) của Việt Nam.

NHIỆM VỤ: Phân loại multi-label cho bài báo tiếng Việt vào một hoặc nhiều trong 12 danh mục sau:

{labels}

QUY TẮC PHÂN LOẠI:
1. Mỗi bài báo có thể thuộc 1 hoặc nhiều danh mục (multi-label)
2. Phân tích cẩn thận tiêu đề, mô tả và nội dung
3. Ưu tiên các nhãn chính xác và cụ thể nhất
4. Chỉ sử dụng nhãn "Khác" khi không phù hợp với 11 danh mục khác
5. Đánh giá độ tin cậy cho mỗi nhãn (0.0-1.0)

ĐỊNH DẠNG OUTPUT: JSON array với format:
[
  {{"label": "tên nhãn", "confidence": 0.85}},
  {{"label": "tên nhãn khác", "confidence": 0.75}}
]"#
    )
}

fn classification_prompt(title: &str, description: &str, content: &str) -> String {
    format!(
        "Phân loại bài báo sau vào các danh mục phù hợp:\n\n\
         TIÊU ĐỀ: {title}\n\n\
         MÔ TẢ: {description}\n\n\
         NỘI DUNG: {content}\n\n\
         Hãy phân tích và trả về kết quả theo định dạng JSON đã yêu cầu:"
    )
}
