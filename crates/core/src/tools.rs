use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Duration;

use rio_live_types::events::server::FunctionCall;
use rio_live_types::tools::{FunctionTool, Tool};

use crate::UiCommand;
use crate::alarm::AlarmScheduler;
use crate::history::ChatTurn;
use crate::media::MediaLookup;
use crate::search::SearchProvider;

#[derive(Debug, thiserror::Error)]
pub enum ToolArgError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("tool {tool} is missing required argument {arg}")]
    MissingArg { tool: &'static str, arg: &'static str },
    #[error("tool {tool} argument {arg} has the wrong type")]
    BadArgType { tool: &'static str, arg: &'static str },
}

/// A validated tool invocation. Argument presence and types are checked at
/// this boundary, before any side effect runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    WebSearch { query: String },
    SetReminder { delay_minutes: f64, label: String },
    EnterDeepSleep,
    OpenTvChannel { channel_name: String },
    PlayYoutubeVideo { query: String },
    SetVolume { level: f64 },
    SetScreenBrightness { level: f64 },
}

fn str_arg(
    args: &serde_json::Value,
    tool: &'static str,
    arg: &'static str,
) -> Result<String, ToolArgError> {
    let value = args
        .get(arg)
        .ok_or(ToolArgError::MissingArg { tool, arg })?;
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or(ToolArgError::BadArgType { tool, arg })
}

fn num_arg(
    args: &serde_json::Value,
    tool: &'static str,
    arg: &'static str,
) -> Result<f64, ToolArgError> {
    let value = args
        .get(arg)
        .ok_or(ToolArgError::MissingArg { tool, arg })?;
    value.as_f64().ok_or(ToolArgError::BadArgType { tool, arg })
}

impl ToolInvocation {
    pub fn parse(name: &str, args: &serde_json::Value) -> Result<Self, ToolArgError> {
        match name {
            "get_information_from_web" => Ok(Self::WebSearch {
                query: str_arg(args, "get_information_from_web", "query")?,
            }),
            "set_reminder" => Ok(Self::SetReminder {
                delay_minutes: num_arg(args, "set_reminder", "delay_minutes")?,
                label: str_arg(args, "set_reminder", "label")?,
            }),
            "enter_deep_sleep" => Ok(Self::EnterDeepSleep),
            "open_tv_channel" => Ok(Self::OpenTvChannel {
                channel_name: str_arg(args, "open_tv_channel", "channel_name")?,
            }),
            "play_youtube_video" => Ok(Self::PlayYoutubeVideo {
                query: str_arg(args, "play_youtube_video", "query")?,
            }),
            "set_volume" => Ok(Self::SetVolume {
                level: num_arg(args, "set_volume", "level")?,
            }),
            "set_screen_brightness" => Ok(Self::SetScreenBrightness {
                level: num_arg(args, "set_screen_brightness", "level")?,
            }),
            other => Err(ToolArgError::UnknownTool(other.to_string())),
        }
    }
}

/// Side effects that must not interrupt in-flight speech: the orchestrator
/// consumes them at the next turn-complete instead of applying them now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEffect {
    DeepSleep,
    ChannelOpened,
    VideoOpened,
}

#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub reply: String,
    pub effect: Option<TurnEffect>,
}

impl ToolOutcome {
    fn reply(reply: String) -> Self {
        Self {
            reply,
            effect: None,
        }
    }

    fn with_effect(reply: String, effect: TurnEffect) -> Self {
        Self {
            reply,
            effect: Some(effect),
        }
    }
}

fn clamp_level(level: f64) -> u8 {
    level.clamp(0.0, 100.0).round() as u8
}

fn format_minutes(minutes: f64) -> String {
    if minutes.fract() == 0.0 {
        format!("{}", minutes as i64)
    } else {
        format!("{:.1}", minutes)
    }
}

/// Executes validated tool calls and renders their results as short
/// natural-language strings. Never fails towards the caller: lookup and
/// network problems become polite apologies.
pub struct ToolDispatcher {
    search: Arc<dyn SearchProvider>,
    media: Arc<dyn MediaLookup>,
    alarms: AlarmScheduler,
    ui_tx: mpsc::Sender<UiCommand>,
}

impl ToolDispatcher {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        media: Arc<dyn MediaLookup>,
        alarms: AlarmScheduler,
        ui_tx: mpsc::Sender<UiCommand>,
    ) -> Self {
        Self {
            search,
            media,
            alarms,
            ui_tx,
        }
    }

    /// Status line shown while a slow tool is being awaited, if any.
    pub fn thinking_status(call: &FunctionCall) -> Option<String> {
        match ToolInvocation::parse(call.name(), call.args()).ok()? {
            ToolInvocation::WebSearch { query } => {
                Some(format!("Đang tìm kiếm \"{}\"...", query))
            }
            ToolInvocation::OpenTvChannel { channel_name } => {
                Some(format!("Đang tìm kênh {}...", channel_name))
            }
            ToolInvocation::PlayYoutubeVideo { query } => {
                Some(format!("Đang tìm \"{}\" trên YouTube...", query))
            }
            _ => None,
        }
    }

    pub async fn dispatch(&self, call: &FunctionCall) -> ToolOutcome {
        let invocation = match ToolInvocation::parse(call.name(), call.args()) {
            Ok(invocation) => invocation,
            Err(e) => {
                tracing::warn!("rejected tool call {:?}: {}", call.name(), e);
                return ToolOutcome::reply("Đã xảy ra lỗi.".to_string());
            }
        };

        match invocation {
            ToolInvocation::WebSearch { query } => {
                let result = self.search.search_web(&query).await;
                self.send_ui(UiCommand::TranscriptionUpdate(Some(ChatTurn::rio(
                    result.clone(),
                ))))
                .await;
                ToolOutcome::reply(result)
            }
            ToolInvocation::SetReminder {
                delay_minutes,
                label,
            } => {
                if delay_minutes <= 0.0 {
                    tracing::warn!("refused to schedule a reminder in the past");
                    return ToolOutcome::reply(
                        "Mình không thể đặt lời nhắc trong quá khứ được.".to_string(),
                    );
                }
                let delay = Duration::from_secs_f64(delay_minutes * 60.0);
                self.alarms.schedule(delay, &label);
                ToolOutcome::reply(format!(
                    "Đã đặt lời nhắc \"{}\" sau {} phút.",
                    label,
                    format_minutes(delay_minutes)
                ))
            }
            ToolInvocation::EnterDeepSleep => ToolOutcome::with_effect(
                "Đã hiểu, đang vào chế độ ngủ sâu.".to_string(),
                TurnEffect::DeepSleep,
            ),
            ToolInvocation::OpenTvChannel { channel_name } => {
                match self.media.find_channel(&channel_name).await {
                    Ok(Some(channel)) => {
                        let reply = format!("Ok, đang mở kênh {} cho bạn đây.", channel.name);
                        self.send_ui(UiCommand::PlayChannel(channel)).await;
                        ToolOutcome::with_effect(reply, TurnEffect::ChannelOpened)
                    }
                    Ok(None) => ToolOutcome::reply(format!(
                        "Rất tiếc, mình không tìm thấy kênh {}.",
                        channel_name
                    )),
                    Err(e) => {
                        tracing::error!("channel lookup failed: {:?}", e);
                        ToolOutcome::reply(format!(
                            "Rất tiếc, mình không tìm thấy kênh {}.",
                            channel_name
                        ))
                    }
                }
            }
            ToolInvocation::PlayYoutubeVideo { query } => {
                match self.search.find_video(&query).await {
                    Some(video) => {
                        let reply =
                            format!("Ok, mình đang mở video \"{}\" cho bạn.", video.title);
                        self.send_ui(UiCommand::PlayVideo {
                            id: video.id,
                            title: video.title,
                        })
                        .await;
                        ToolOutcome::with_effect(reply, TurnEffect::VideoOpened)
                    }
                    None => ToolOutcome::reply(format!(
                        "Rất tiếc, mình không tìm thấy video nào có tên \"{}\".",
                        query
                    )),
                }
            }
            ToolInvocation::SetVolume { level } => {
                let level = clamp_level(level);
                self.send_ui(UiCommand::SetVolume(level)).await;
                ToolOutcome::reply(format!("Ok, đã đặt âm lượng thành {}%.", level))
            }
            ToolInvocation::SetScreenBrightness { level } => {
                let level = clamp_level(level);
                self.send_ui(UiCommand::SetBrightness(level)).await;
                ToolOutcome::reply(format!(
                    "Đã chỉnh độ sáng màn hình thành {}%.",
                    level
                ))
            }
        }
    }

    async fn send_ui(&self, command: UiCommand) {
        if let Err(e) = self.ui_tx.send(command).await {
            tracing::warn!("failed to deliver UI command: {:?}", e);
        }
    }
}

/// The fixed tool schema declared to the remote model when the session
/// opens. Argument validation against this contract happens in
/// `ToolInvocation::parse` before any side effect.
pub fn function_declarations() -> Vec<Tool> {
    vec![
        Tool::Function(FunctionTool::new(
            "get_information_from_web".to_string(),
            "Tìm kiếm trên internet để lấy thông tin khi bạn không biết câu trả lời. \
             Sử dụng cho các sự kiện gần đây, tin tức, hoặc các truy vấn cụ thể, thực tế."
                .to_string(),
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Truy vấn tìm kiếm hoặc chủ đề để tra cứu."
                    }
                },
                "required": ["query"]
            }),
        )),
        Tool::Function(FunctionTool::new(
            "set_reminder".to_string(),
            "Đặt báo thức hoặc lời nhắc cho một thời điểm trong tương lai. \
             Tính toán thời gian từ bây giờ đến lúc đó bằng phút."
                .to_string(),
            serde_json::json!({
                "type": "object",
                "properties": {
                    "delay_minutes": {
                        "type": "number",
                        "description": "Số phút kể từ bây giờ cho đến khi báo thức hoặc lời nhắc vang lên."
                    },
                    "label": {
                        "type": "string",
                        "description": "Nội dung của lời nhắc hoặc báo thức. Ví dụ: \"Thức dậy\" hoặc \"Gọi cho mẹ\"."
                    }
                },
                "required": ["delay_minutes", "label"]
            }),
        )),
        Tool::Function(FunctionTool::new(
            "enter_deep_sleep".to_string(),
            "Vào chế độ ngủ sâu (tiết kiệm pin, AOD) khi người dùng yêu cầu. \
             Chỉ sử dụng khi người dùng nói rõ ràng các cụm từ như \"ngủ sâu\", \
             \"chế độ tiết kiệm pin\", \"chế độ AOD\", hoặc \"tắt màn hình\"."
                .to_string(),
            serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        )),
        Tool::Function(FunctionTool::new(
            "open_tv_channel".to_string(),
            "Mở một kênh truyền hình trực tiếp khi người dùng yêu cầu xem TV. \
             Sử dụng tên kênh mà người dùng cung cấp."
                .to_string(),
            serde_json::json!({
                "type": "object",
                "properties": {
                    "channel_name": {
                        "type": "string",
                        "description": "Tên của kênh TV cần mở. Ví dụ: \"VTV1\", \"HTV7\"."
                    }
                },
                "required": ["channel_name"]
            }),
        )),
        Tool::Function(FunctionTool::new(
            "play_youtube_video".to_string(),
            "Tìm kiếm và phát một video trên YouTube. Sử dụng chức năng này khi người dùng \
             yêu cầu nghe một bài hát, xem một video cụ thể, hoặc tìm kiếm nội dung trên YouTube."
                .to_string(),
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Tên bài hát, nghệ sĩ, hoặc tiêu đề video để tìm kiếm."
                    }
                },
                "required": ["query"]
            }),
        )),
        Tool::Function(FunctionTool::new(
            "set_volume".to_string(),
            "Điều chỉnh âm lượng của video hoặc TV đang phát. \
             Mức âm lượng từ 0 (tắt tiếng) đến 100 (tối đa)."
                .to_string(),
            serde_json::json!({
                "type": "object",
                "properties": {
                    "level": {
                        "type": "number",
                        "description": "Mức âm lượng mong muốn, từ 0 đến 100."
                    }
                },
                "required": ["level"]
            }),
        )),
        Tool::Function(FunctionTool::new(
            "set_screen_brightness".to_string(),
            "Điều chỉnh độ sáng của màn hình ứng dụng. \
             Mức độ sáng từ 0 (tối nhất) đến 100 (sáng nhất)."
                .to_string(),
            serde_json::json!({
                "type": "object",
                "properties": {
                    "level": {
                        "type": "number",
                        "description": "Mức độ sáng mong muốn, từ 0 đến 100."
                    }
                },
                "required": ["level"]
            }),
        )),
    ]
}
