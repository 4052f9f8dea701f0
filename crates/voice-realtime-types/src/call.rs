use std::collections::BTreeMap;

/// What a call is started against.
///
/// Either an opaque workflow identifier configured on the provider side, or an
/// assistant definition sent inline with the start request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallTarget {
    Workflow(String),
    Assistant(AssistantConfig),
}

impl CallTarget {
    pub fn workflow(id: &str) -> Self {
        Self::Workflow(id.to_string())
    }

    /// Returns the workflow id when the target is a workflow reference.
    pub fn workflow_id(&self) -> Option<&str> {
        match self {
            CallTarget::Workflow(id) => Some(id.as_str()),
            CallTarget::Assistant(_) => None,
        }
    }

    /// A target is usable when the workflow id is not blank or the inline
    /// assistant carries instructions.
    pub fn is_present(&self) -> bool {
        match self {
            CallTarget::Workflow(id) => !id.trim().is_empty(),
            CallTarget::Assistant(config) => !config.instructions.trim().is_empty(),
        }
    }
}

/// Inline assistant definition.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AssistantConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_message: Option<String>,
    instructions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

impl AssistantConfig {
    pub fn new(instructions: &str) -> Self {
        Self {
            instructions: instructions.to_string(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_first_message(mut self, first_message: &str) -> Self {
        self.first_message = Some(first_message.to_string());
        self
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.voice = Some(voice.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn first_message(&self) -> Option<&str> {
        self.first_message.as_deref()
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// Options passed alongside the target when starting a call.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StartOptions {
    /// Template substitutions applied by the provider (`{{username}}` etc).
    #[serde(default, rename = "variableValues")]
    pub variable_values: BTreeMap<String, String>,
}

impl StartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, key: &str, value: &str) -> Self {
        self.variable_values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn variable(&self, key: &str) -> Option<&str> {
        self.variable_values.get(key).map(String::as_str)
    }
}

/// Returned by the provider once a start request was accepted.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CallHandle {
    pub id: String,
    pub status: String,
}

impl CallHandle {
    pub fn new(id: &str, status: &str) -> Self {
        Self {
            id: id.to_string(),
            status: status.to_string(),
        }
    }
}
