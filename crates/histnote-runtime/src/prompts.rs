//! Prompts sent to the LLM.
//!
//! Prompt text is Vietnamese because the notes and the students are. The
//! schema block in [`SCHEMA_TEXT`] is the contract the validator in
//! `histnote-core` checks against; keep the two in step.

use std::collections::BTreeMap;

use histnote_core::{HistoryDocument, WhyQuestion};

use crate::study::BloomLevel;

/// Sentinel the model must write into fields the notes do not cover.
///
/// Passed through verbatim; nothing downstream treats it specially.
pub const INSUFFICIENT_DATA: &str = "Không đủ dữ kiện từ ghi chép";

/// Fixed schema text embedded in every document request.
pub const SCHEMA_TEXT: &str = r#"{
  "event_name": "string",
  "timeline": {
    "start": "string | null",
    "end": "string | null",
    "key_dates": [{"date":"string","note":"string"}]
  },
  "causes": [{"title":"string","details":["string"]}],
  "developments": [{"step":"string","details":["string"]}],
  "results": [{"title":"string","details":["string"]}],
  "significance": [{"title":"string","details":["string"]}],
  "related_events": [{"name":"string","relation":"string"}],
  "why_questions": [{"q":"string","expected_points":["string"]}],
  "mini_test": {
    "mcq": [{
      "q":"string",
      "choices":[{"id":"A","text":"string"},{"id":"B","text":"string"},{"id":"C","text":"string"},{"id":"D","text":"string"}],
      "answer":"A|B|C|D",
      "explain":"string"
    }],
    "ordering": [{
      "q":"string",
      "items":["string"],
      "answer_order":[0,1,2,3],
      "explain":"string"
    }],
    "short_answer": [{
      "q":"string",
      "rubric":["string"]
    }]
  }
}"#;

/// System prompt for structured (JSON) requests.
pub const JSON_SYSTEM_PROMPT: &str = "Bạn tạo JSON Lịch sử đúng schema. Không giải thích.";

/// System prompt for free-text answers.
pub const CHAT_SYSTEM_PROMPT: &str = "Bạn là trợ lý học tập, trả lời ngắn gọn.";

/// Document request built from OCR text.
pub fn history_prompt(ocr_text: &str) -> String {
    format!(
        "Bạn là trợ lý Lịch sử. Chỉ dùng thông tin từ đoạn OCR dưới đây để tạo JSON đúng schema. \
         Không bịa. Nếu thiếu dữ kiện, ghi \"{INSUFFICIENT_DATA}\" trong trường details tương ứng. \
         Trả về JSON thuần, không markdown.\n\n\
         Schema cố định:\n{SCHEMA_TEXT}\n\n\
         OCR:\n{ocr_text}\n"
    )
}

/// Document request for note photos sent directly to the model.
pub fn image_history_prompt(image_count: usize) -> String {
    format!(
        "Bạn là trợ lý Lịch sử. Đọc {image_count} ảnh ghi chép đính kèm theo thứ tự và chỉ dùng \
         nội dung trong ảnh để tạo JSON đúng schema. Không bịa. Nếu thiếu dữ kiện, ghi \
         \"{INSUFFICIENT_DATA}\" trong trường details tương ứng. Trả về JSON thuần, không markdown.\n\n\
         Schema cố định:\n{SCHEMA_TEXT}\n"
    )
}

fn section_line(doc: &HistoryDocument, section: &str) -> String {
    doc.knowledge_sections()
        .filter(|(name, _, _)| *name == section)
        .map(|(_, label, details)| format!("{}: {}", label, details.join("; ")))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Context block summarizing a document for follow-up questions.
pub fn chat_context(doc: &HistoryDocument) -> String {
    let timeline = &doc.timeline;
    format!(
        "Event: {}\nTimeline: {} - {}\nCauses: {}\nDevelopments: {}\nResults: {}\nSignificance: {}\n",
        doc.event_name,
        timeline.start.as_deref().unwrap_or(""),
        timeline.end.as_deref().unwrap_or(""),
        section_line(doc, "causes"),
        section_line(doc, "developments"),
        section_line(doc, "results"),
        section_line(doc, "significance"),
    )
}

/// Free-text question grounded in a document.
pub fn chat_prompt(doc: &HistoryDocument, question: &str) -> String {
    format!(
        "Bạn là trợ lý học tập Lịch sử. Trả lời ngắn gọn (tối đa 3 câu) cho câu hỏi \"vì sao\" \
         dựa trên ngữ cảnh bên dưới. Không bịa thêm ngoài ngữ cảnh. Nếu ngữ cảnh thiếu, nói rõ \
         \"{INSUFFICIENT_DATA}\".\nNgữ cảnh:\n{}\nCâu hỏi: {question}\n\
         Trả lời bằng tiếng Việt, thân thiện, dễ hiểu cho học sinh cấp 3.\n",
        chat_context(doc)
    )
}

/// One prompt grading every why-question against its expected points.
///
/// Unanswered questions are sent with an empty answer.
pub fn why_grading_prompt(questions: &[WhyQuestion], answers: &BTreeMap<usize, String>) -> String {
    let body = questions
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            format!(
                "Câu {}: {}\nĐiểm mong đợi: {}\nHọc sinh: {}",
                idx + 1,
                item.q,
                item.expected_points.join("; "),
                answers.get(&idx).map(String::as_str).unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Chấm nhanh câu hỏi vì sao theo rubric cho trước. Trả về JSON {{\"results\": [...]}}, mỗi câu một phần tử dạng:\n\
         {{\"q\": \"...\", \"score\": 0-10, \"comment\": \"...\"}}\n\
         Chỉ dùng thông tin được cấp, không mở rộng.\n{body}\n"
    )
}

pub fn short_answer_prompt(rubric: &[String], answer: &str) -> String {
    format!(
        "Chấm bài tự luận ngắn dựa trên rubric cho sẵn. Trả về JSON {{\"score\":0-10,\"comment\":\"...\"}}.\n\
         Rubric: {}\nBài làm: {answer}\n",
        rubric.join("; ")
    )
}

/// Question asked through the chat path to generate one tutor question.
pub fn tutor_question_request(level: BloomLevel) -> String {
    let instruction = match level {
        BloomLevel::Remember => "Hỏi lại dữ kiện cơ bản, mốc thời gian, nhân vật.",
        BloomLevel::Understand => "Hỏi vì sao/nguyên nhân/ý nghĩa ngắn gọn.",
        BloomLevel::Apply => "Đặt tình huống tương tự, hỏi vận dụng kiến thức để giải thích.",
        BloomLevel::Analyze => "Hỏi phản biện đa góc nhìn, hệ quả dài hạn hoặc so sánh.",
    };
    format!("{instruction}\nTạo 1 câu hỏi.")
}

pub fn tutor_feedback_request(question: &str, answer: &str) -> String {
    format!("Câu hỏi: {question}\nTrả lời của HS: {answer}\nNhận xét ngắn gọn (<=2 câu).")
}

pub fn essay_request(event_name: &str, essay: &str) -> String {
    format!(
        "Chấm lỗi tự luận lịch sử. Trả về JSON:\n\
         {{\"score\":0-10,\"patterns\":[\"...\"],\"suggest\":\"...\"}}\n\
         patterns liệt kê lỗi như thiếu mốc thời gian, thiếu dẫn chứng, suy luận nhân quả yếu.\n\
         Ngữ cảnh: {event_name}\nBài: {essay}\n"
    )
}

/// Comparison request. Event names are JSON-escaped before being embedded.
pub fn compare_request(event_name: &str, other: &str) -> String {
    let quote = |s: &str| serde_json::Value::from(s).to_string();
    format!(
        "So sánh 2 sự kiện lịch sử theo bảng JSON:\n{{\n \"fields\":[\"Nguyên nhân\",\"Diễn biến\",\"Kết quả\",\"Ý nghĩa\"],\n \
         \"event_a\":{},\n \"event_b\":{},\n \"rows\":[{{\"field\":\"...\",\"a\":\"...\",\"b\":\"...\"}}]\n}}\n\
         Chỉ dựa vào kiến thức sự kiện A (đã cho) và kiến thức thường gặp; nếu thiếu ghi \"Không đủ dữ kiện\".\n",
        quote(event_name),
        quote(other)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use histnote_core::{KnowledgeItem, Timeline};

    fn doc() -> HistoryDocument {
        HistoryDocument {
            event_name: "Cách mạng tháng Tám".to_string(),
            timeline: Timeline {
                start: Some("14/8/1945".to_string()),
                end: None,
                key_dates: vec![],
            },
            causes: vec![
                KnowledgeItem {
                    title: "Nhật đầu hàng".to_string(),
                    details: vec!["15/8/1945".to_string(), "thời cơ".to_string()],
                },
                KnowledgeItem {
                    title: "Lực lượng".to_string(),
                    details: vec!["Việt Minh".to_string()],
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_history_prompt_embeds_schema_sentinel_and_text() {
        let prompt = history_prompt("Ngày 19/8/1945 giành chính quyền ở Hà Nội");
        assert!(prompt.contains(SCHEMA_TEXT));
        assert!(prompt.contains(INSUFFICIENT_DATA));
        assert!(prompt.ends_with("Ngày 19/8/1945 giành chính quyền ở Hà Nội\n"));
    }

    #[test]
    fn test_image_prompt_mentions_count() {
        let prompt = image_history_prompt(3);
        assert!(prompt.contains("Đọc 3 ảnh"));
        assert!(prompt.contains(SCHEMA_TEXT));
    }

    #[test]
    fn test_chat_context_layout() {
        let context = chat_context(&doc());
        assert!(context.starts_with("Event: Cách mạng tháng Tám\n"));
        assert!(context.contains("Timeline: 14/8/1945 - \n"));
        assert!(context.contains("Causes: Nhật đầu hàng: 15/8/1945; thời cơ | Lực lượng: Việt Minh\n"));
        assert!(context.contains("Developments: \n"));
    }

    #[test]
    fn test_why_grading_prompt_blank_for_missing_answers() {
        let questions = vec![
            WhyQuestion {
                q: "Vì sao thắng lợi?".to_string(),
                expected_points: vec!["thời cơ".to_string(), "lực lượng".to_string()],
            },
            WhyQuestion {
                q: "Vì sao nhanh?".to_string(),
                expected_points: vec![],
            },
        ];
        let answers = BTreeMap::from([(0, "Nhờ thời cơ".to_string())]);
        let prompt = why_grading_prompt(&questions, &answers);

        assert!(prompt.contains("Câu 1: Vì sao thắng lợi?\nĐiểm mong đợi: thời cơ; lực lượng\nHọc sinh: Nhờ thời cơ"));
        assert!(prompt.contains("Câu 2: Vì sao nhanh?\nĐiểm mong đợi: \nHọc sinh: \n"));
    }

    #[test]
    fn test_tutor_requests_differ_per_level() {
        let prompts: Vec<_> = BloomLevel::ALL.iter().map(|l| tutor_question_request(*l)).collect();
        for (i, p) in prompts.iter().enumerate() {
            assert!(p.ends_with("Tạo 1 câu hỏi."));
            assert!(!prompts[i + 1..].contains(p));
        }
    }

    #[test]
    fn test_compare_request_escapes_names() {
        let prompt = compare_request("Cách mạng tháng Tám", "Chiến dịch \"Điện Biên Phủ\"");
        assert!(prompt.contains("\"event_a\":\"Cách mạng tháng Tám\""));
        assert!(prompt.contains(r#""event_b":"Chiến dịch \"Điện Biên Phủ\"""#));
    }
}
