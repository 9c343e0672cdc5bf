use serde::Serialize;

use crate::models::CombinedSearch;

/// Stage reported in `status` events of the analysis stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStage {
    Extracting,
    Searching,
    Analyzing,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub status: AnalysisStage,
    pub message: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts_found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteEvent {
    pub status: AnalysisStage,
    pub message: String,
    pub progress: u8,
    /// The validated analysis JSON, as text.
    pub result: String,
    pub search_data: CombinedSearch,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Events pushed to the browser during a pain point analysis.
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    Status(StatusEvent),
    Complete(Box<CompleteEvent>),
    Error(ErrorEvent),
    Done,
}

impl AnalysisEvent {
    pub fn status(stage: AnalysisStage, message: impl Into<String>, progress: u8) -> Self {
        Self::Status(StatusEvent {
            status: stage,
            message: message.into(),
            progress,
            posts_found: None,
            keyword: None,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorEvent {
            kind: "error",
            error: ErrorBody {
                message: message.into(),
            },
        })
    }

    /// SSE `event:` name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Complete(_) => "complete",
            Self::Error(_) => "error",
            Self::Done => "done",
        }
    }

    /// SSE `data:` payload.
    pub fn data(&self) -> String {
        let encoded = match self {
            Self::Status(e) => serde_json::to_string(e),
            Self::Complete(e) => serde_json::to_string(e),
            Self::Error(e) => serde_json::to_string(e),
            Self::Done => return "[DONE]".to_string(),
        };
        encoded.unwrap_or_else(|e| format!("{{\"type\":\"error\",\"error\":{{\"message\":\"{}\"}}}}", e))
    }
}
