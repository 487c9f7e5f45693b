//! Vidur Voice Agent Persona
//!
//! This module holds the static persona of the voice agent: its name, the
//! live model it runs on, a free-form description (loaded from a prompt file
//! at startup), and the behavioural instruction sent to the model when a
//! session opens.

pub const DEFAULT_AGENT_NAME: &str = "vidur_voice_agent";
pub const DEFAULT_LIVE_MODEL: &str = "gemini-live-2.5-flash-preview-native-audio";

pub const DEFAULT_INSTRUCTION: &str = "\
Speak in a friendly, confident, and natural tone, like a real human assistant.
Use conversational language, pause naturally between ideas, and sound helpful and approachable.
Avoid sounding robotic or overly formal.

Always guide users clearly. If they ask about Vidur's services, explain simply and warmly.
If you do not know the answer, say so politely and suggest visiting our website or contacting the Vidur team.

Your goal is to make every user feel like they are talking to a real, knowledgeable assistant, powered by Vidur.";

/// Persona and model selection for the live agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Internal agent name, surfaced to the model in its identity preamble.
    pub name: String,
    /// Live model identifier without the `models/` prefix.
    pub model: String,
    /// Who the agent is and what it knows about.
    pub description: String,
    /// How the agent should behave.
    pub instruction: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT_NAME.to_string(),
            model: DEFAULT_LIVE_MODEL.to_string(),
            description: String::new(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
        }
    }
}

impl AgentConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Composes the system instruction sent when a session opens: an identity
    /// preamble followed by the behavioural instruction.
    pub fn system_instruction(&self) -> String {
        let mut preamble = format!(
            "You are an agent. Your internal name is \"{}\".",
            self.name
        );
        let description = self.description.trim();
        if !description.is_empty() {
            preamble.push_str(&format!(
                " The description about you is \"{}\".",
                description
            ));
        }
        let instruction = self.instruction.trim();
        if instruction.is_empty() {
            preamble
        } else {
            format!("{}\n\n{}", preamble, instruction)
        }
    }
}
