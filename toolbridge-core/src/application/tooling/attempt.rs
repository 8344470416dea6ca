use serde_json::{Map as JsonMap, Value, json};

/// One wire-level encoding of a tool invocation.
///
/// Workers disagree on how a tool call is spelled, so a call walks
/// [`CALL_ATTEMPTS`] in order until one encoding is understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAttempt {
    /// `callTool` with `{ "name": tool, "parameters": args }`.
    StructuredCall,
    /// The tool name is the method; the arguments are the params.
    ToolAsMethod,
    /// The tool name is the method; params are `{ "parameters": args }`.
    ToolAsMethodWrapped,
    /// Like [`CallAttempt::ToolAsMethod`] with the `namespace_` prefix removed.
    UnprefixedToolAsMethod,
}

pub const CALL_ATTEMPTS: [CallAttempt; 4] = [
    CallAttempt::StructuredCall,
    CallAttempt::ToolAsMethod,
    CallAttempt::ToolAsMethodWrapped,
    CallAttempt::UnprefixedToolAsMethod,
];

const STRUCTURED_CALL_METHOD: &str = "callTool";

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCall {
    pub method: String,
    pub params: Value,
}

impl CallAttempt {
    pub fn label(self) -> &'static str {
        match self {
            CallAttempt::StructuredCall => "structured callTool",
            CallAttempt::ToolAsMethod => "tool name as method",
            CallAttempt::ToolAsMethodWrapped => "tool name with parameters wrapper",
            CallAttempt::UnprefixedToolAsMethod => "tool name without prefix",
        }
    }

    /// Builds the method/params pair for `tool`.
    ///
    /// Returns `None` when the encoding would repeat an earlier attempt
    /// (an unprefixed name for a tool that has no prefix).
    pub fn encode(self, tool: &str, arguments: &Value) -> Option<EncodedCall> {
        let arguments = normalize_arguments(arguments);
        let encoded = match self {
            CallAttempt::StructuredCall => EncodedCall {
                method: STRUCTURED_CALL_METHOD.to_string(),
                params: json!({ "name": tool, "parameters": arguments }),
            },
            CallAttempt::ToolAsMethod => EncodedCall {
                method: tool.to_string(),
                params: arguments,
            },
            CallAttempt::ToolAsMethodWrapped => EncodedCall {
                method: tool.to_string(),
                params: json!({ "parameters": arguments }),
            },
            CallAttempt::UnprefixedToolAsMethod => {
                let (_, rest) = tool.split_once('_')?;
                if rest.is_empty() {
                    return None;
                }
                EncodedCall {
                    method: rest.to_string(),
                    params: arguments,
                }
            }
        };
        Some(encoded)
    }
}

fn normalize_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::Null => Value::Object(JsonMap::new()),
        other => other.clone(),
    }
}
