use serde::{Deserialize, Serialize};

/// Provider-side limit on tool-call identifier length.
pub const MAX_TOOL_CALL_ID_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw JSON argument payload as produced by the model.
    #[serde(default)]
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One entry of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            refusal: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// An assistant turn that only requests tool invocations.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            refusal: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn refusal(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            refusal: Some(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            refusal: None,
            tool_calls: Vec::new(),
            tool_call_id: Some(truncate_tool_call_id(&tool_call_id.into())),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Textual rendering used when validating a message: its content when there is any,
    /// otherwise the refusal, otherwise the JSON form of the whole record.
    pub fn render(&self) -> String {
        match (&self.content, &self.refusal) {
            (Some(content), _) if !content.is_empty() => content.clone(),
            (_, Some(refusal)) if !refusal.is_empty() => refusal.clone(),
            _ => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    /// Truncates every requested tool-call id to the provider limit.
    pub(crate) fn truncate_tool_call_ids(&mut self) {
        for call in &mut self.tool_calls {
            call.id = truncate_tool_call_id(&call.id);
        }
    }
}

pub fn truncate_tool_call_id(id: &str) -> String {
    match id.char_indices().nth(MAX_TOOL_CALL_ID_LEN) {
        Some((cut, _)) => id[..cut].to_string(),
        None => id.to_string(),
    }
}
