use crate::config::{ApiSettings, PromptSettings};
use crate::llm::GradingRequest;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};

/// System prompt, with the question context appended when there is one.
pub fn system_text(prompts: &PromptSettings, question_context: Option<&str>) -> String {
    let mut text = prompts.system_message.clone();
    if let Some(context) = question_context {
        text.push_str(
            &prompts
                .question_context_format
                .replace("{question_context}", context),
        );
    }
    text
}

/// User prompt text with `{reference_answer_section}` filled in.
pub fn user_text(prompts: &PromptSettings, reference_answer: Option<&str>) -> String {
    let section = match reference_answer {
        Some(reference) => prompts
            .reference_answer_format
            .replace("{reference_answer}", reference),
        None => prompts.missing_reference_notice.clone(),
    };
    prompts
        .user_message_template
        .replace("{reference_answer_section}", &section)
}

/// Build the chat-completions body for one grading request.
pub fn request_body(
    api: &ApiSettings,
    prompts: &PromptSettings,
    request: &GradingRequest,
) -> Value {
    let image = general_purpose::STANDARD.encode(&request.image_png);

    let mut body = json!({
        "model": api.model,
        "messages": [
            {
                "role": "system",
                "content": system_text(prompts, request.question_context)
            },
            {
                "role": "user",
                "content": [
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:image/png;base64,{}", image)
                        }
                    },
                    {
                        "type": "text",
                        "text": user_text(prompts, request.reference_answer)
                    }
                ]
            }
        ],
        "temperature": api.temperature,
        "max_tokens": api.max_tokens
    });

    if let Some(top_p) = api.top_p {
        body["top_p"] = json!(top_p);
    }
    if let Some(seed) = api.seed {
        body["seed"] = json!(seed);
    }
    body
}

/// Pull the reply text out of a chat-completions response.
pub fn extract_reply(json: &Value) -> Option<String> {
    json.get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(reference: Option<&'a str>, context: Option<&'a str>) -> GradingRequest<'a> {
        GradingRequest {
            image_png: vec![0x89, b'P', b'N', b'G'],
            reference_answer: reference,
            question_context: context,
        }
    }

    #[test]
    fn reference_is_formatted_into_user_text() {
        let prompts = PromptSettings::default();
        let text = user_text(&prompts, Some("x = 4"));
        assert!(text.contains("Reference Answer:\n```markdown\nx = 4\n```"));
        assert!(!text.contains("{reference_answer_section}"));
    }

    #[test]
    fn missing_reference_uses_notice() {
        let prompts = PromptSettings::default();
        let text = user_text(&prompts, None);
        assert!(text.contains(&prompts.missing_reference_notice));
        assert!(!text.contains("Reference Answer:"));
    }

    #[test]
    fn context_goes_into_system_message() {
        let prompts = PromptSettings::default();
        assert_eq!(system_text(&prompts, None), prompts.system_message);
        assert!(system_text(&prompts, Some("Solve 2x = 8"))
            .ends_with("Question Context: Solve 2x = 8"));
    }

    #[test]
    fn body_layout() {
        let api = ApiSettings::default();
        let prompts = PromptSettings::default();
        let body = request_body(&api, &prompts, &request(Some("ref"), Some("ctx")));

        assert_eq!(body["model"], api.model.as_str());
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["top_p"], 1.0);
        assert_eq!(body["seed"], 42);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");

        let content = messages[1]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "image_url");
        let encoded = general_purpose::STANDARD.encode([0x89, b'P', b'N', b'G']);
        assert_eq!(
            content[0]["image_url"]["url"],
            format!("data:image/png;base64,{}", encoded)
        );
        assert_eq!(content[1]["type"], "text");
    }

    #[test]
    fn unset_sampling_fields_are_omitted() {
        let api = ApiSettings {
            top_p: None,
            seed: None,
            ..ApiSettings::default()
        };
        let body = request_body(&api, &PromptSettings::default(), &request(None, None));
        assert!(body.get("top_p").is_none());
        assert!(body.get("seed").is_none());
    }

    #[test]
    fn extracts_first_choice() {
        let json = json!({"choices": [{"message": {"role": "assistant", "content": "Score: 90"}}]});
        assert_eq!(extract_reply(&json).as_deref(), Some("Score: 90"));
        assert_eq!(extract_reply(&json!({"choices": []})), None);
        assert_eq!(extract_reply(&json!({"error": "nope"})), None);
    }
}
