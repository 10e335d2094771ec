use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;

use crate::media::VideoInfo;

const SEARCH_UNAVAILABLE: &str = "Tôi gặp sự cố khi tìm kiếm thông tin về điều đó ngay bây giờ.";
const SEARCH_EMPTY: &str = "Rất tiếc, tôi không thể tìm thấy thông tin vào lúc này.";

/// Grounded web/video search. Failures never propagate: `search_web`
/// answers with a polite fallback and `find_video` answers `None`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search_web(&self, query: &str) -> String;
    async fn find_video(&self, query: &str) -> Option<VideoInfo>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoAnswer {
    id: Option<String>,
    title: Option<String>,
}

/// Extracts the JSON object between the first `{` and the last `}`,
/// tolerating any prose the model wrapped around it.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

pub struct SearchClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl SearchClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key,
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "contents": [
                {
                    "parts": [
                        { "text": prompt }
                    ]
                }
            ],
            "tools": [
                { "google_search": {} }
            ]
        });

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateResponse>()
            .await?;

        let text = resp
            .candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl SearchProvider for SearchClient {
    async fn search_web(&self, query: &str) -> String {
        let prompt = format!(
            "Hãy tổng hợp câu trả lời thực tế cho truy vấn sau đây từ internet. \
             Trả lời trực tiếp và chỉ cung cấp thông tin bạn tìm thấy, không thêm \
             bất kỳ lời thoại nào. Truy vấn: \"{}\"",
            query
        );
        match self.generate(&prompt).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => SEARCH_EMPTY.to_string(),
            Err(e) => {
                tracing::error!("web search failed: {:?}", e);
                SEARCH_UNAVAILABLE.to_string()
            }
        }
    }

    async fn find_video(&self, query: &str) -> Option<VideoInfo> {
        let prompt = format!(
            "Nhiệm vụ của bạn là tìm một video trên YouTube và trả về ID cùng tiêu đề \
             của nó. Toàn bộ phản hồi BẮT BUỘC phải là một đối tượng JSON duy nhất. \
             Truy vấn của người dùng: \"{}\". \
             Nếu tìm thấy video: {{\"id\": \"VIDEO_ID\", \"title\": \"VIDEO_TITLE\"}}. \
             Nếu không tìm thấy: {{\"id\": null, \"title\": null}}. \
             KHÔNG ĐƯỢC PHÉP thêm bất kỳ văn bản nào khác.",
            query
        );
        let text = match self.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("video search failed: {:?}", e);
                return None;
            }
        };

        let json = extract_json_object(&text)?;
        let answer: VideoAnswer = match serde_json::from_str(json) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("video answer was not valid JSON: {}, text=> {:?}", e, text);
                return None;
            }
        };
        match (answer.id, answer.title) {
            (Some(id), Some(title)) => Some(VideoInfo { id, title }),
            _ => None,
        }
    }
}
