//! Persona profiles: the independent workers a batch fans out over.

use serde::{Deserialize, Serialize};

/// Whether a persona can be scheduled into a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonaStatus {
    Active,
    Inactive,
}

/// A configured profile that independently answers a prompt in a batch.
///
/// Personas are owned by the caller and treated as immutable for the
/// duration of a batch. The `role_label` is a free-form profession string
/// ("Engineer", "Market Researcher", ...) substituted into the phase's
/// `{roleType}` template placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub display_name: String,
    pub role_label: String,
    /// Optional custom fragment appended after the phase's system prompt.
    pub system_prompt_fragment: Option<String>,
    pub model_id: String,
    pub status: PersonaStatus,
}

impl Persona {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        role_label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role_label: role_label.into(),
            system_prompt_fragment: None,
            model_id: String::new(),
            status: PersonaStatus::Active,
        }
    }

    /// Attach a custom system-prompt fragment (builder pattern).
    pub fn with_prompt_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.system_prompt_fragment = Some(fragment.into());
        self
    }

    /// Pin the persona to a specific upstream model (builder pattern).
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_status(mut self, status: PersonaStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == PersonaStatus::Active
    }
}
