use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Structured-output descriptor forwarded to the completion service.
///
/// The schema is opaque here; it is whatever the caller's schema builder produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonSchema {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        schema: Value,
        #[serde(default = "default_strict")]
        strict: bool,
    },
}

fn default_strict() -> bool {
    true
}

impl ResponseFormat {
    pub fn text() -> Self {
        ResponseFormat::Text
    }

    /// Strict mode is on by default.
    pub fn json_schema(name: impl Into<String>, schema: Value) -> Self {
        ResponseFormat::JsonSchema {
            name: name.into(),
            description: None,
            schema,
            strict: true,
        }
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        if let ResponseFormat::JsonSchema { description, .. } = &mut self {
            *description = Some(text.into());
        }
        self
    }

    pub fn with_strict(mut self, enabled: bool) -> Self {
        if let ResponseFormat::JsonSchema { strict, .. } = &mut self {
            *strict = enabled;
        }
        self
    }

    /// Chat-completions `response_format` payload.
    pub fn to_request_value(&self) -> Value {
        match self {
            ResponseFormat::Text => json!({ "type": "text" }),
            ResponseFormat::JsonSchema {
                name,
                description,
                schema,
                strict,
            } => {
                let mut body = json!({
                    "name": name,
                    "schema": schema,
                    "strict": strict,
                });
                if let Some(description) = description {
                    body["description"] = Value::String(description.clone());
                }
                json!({ "type": "json_schema", "json_schema": body })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_schema_payload_carries_schema_verbatim() {
        let schema = json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"],
            "additionalProperties": false
        });
        let format = ResponseFormat::json_schema("weather", schema.clone())
            .with_description("A city lookup");

        let payload = format.to_request_value();
        assert_eq!(payload["type"], "json_schema");
        assert_eq!(payload["json_schema"]["schema"], schema);
        assert_eq!(payload["json_schema"]["strict"], true);
        assert_eq!(payload["json_schema"]["description"], "A city lookup");
    }

    #[test]
    fn text_ignores_schema_options() {
        let format = ResponseFormat::text().with_strict(false).with_description("x");
        assert_eq!(format, ResponseFormat::Text);
        assert_eq!(format.to_request_value(), json!({"type": "text"}));
    }
}
