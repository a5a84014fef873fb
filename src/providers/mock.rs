use super::response::{Completion, TokenUsage};
use super::traits::ProviderClient;
use crate::error::ProviderError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Deterministic mock provider used for tests and as the universal fallback.
///
/// The reply is a pure function of the prompt: a lexical signature selects a
/// canned template, and prompts that match no signature fall through to a
/// generic template indexed by a stable hash of the prompt. Same prompt,
/// same content.
pub struct MockClient;

const GOAL_DECOMPOSITION_TEMPLATE: &str = "\
Based on your goal, here are the suggested tasks:

1. **Research** — gather information and identify requirements (2-3 hours, week 1)
2. **Planning** — create a detailed action plan with milestones (1-2 hours, week 1)
3. **Implementation** — execute the main work and monitor progress (5-10 hours, weeks 2-3)

**Overall timeline**: 3-4 weeks

**Next steps**: start with the research phase and set up your environment.";

const TASK_SUGGESTIONS_TEMPLATE: &str = "\
Here are some suggested next tasks:

1. **Review current progress** — assess what's done and identify blockers (30 minutes)
2. **Plan next actions** — choose 2-3 tasks and set realistic deadlines (45 minutes)
3. **Execute priority task** — start with the most important item in focused sessions.";

const COOKING_TEMPLATE: &str = "\
Cooking is a great skill to build! Start with 2-3 basic recipes to master, \
practice techniques weekly, and stock your pantry with quality ingredients. \
What type of dishes interest you most?";

const MUSIC_TEMPLATE: &str = "\
Music goals work best when they fit your schedule. A simpler instrument and \
short daily practice sessions beat long irregular ones. What draws you to \
music, and how much time can you realistically dedicate each week?";

const WELLNESS_TEMPLATE: &str = "\
Wellness practices compound quickly. Starting with just 5-10 minutes of daily \
meditation or movement can make a significant difference. What aspect of \
wellness would you like to explore first?";

const TIME_COMMITMENT_TEMPLATE: &str = "\
Having a realistic time commitment is key. Break it into manageable sessions, \
schedule consistent practice times, and focus on quality over quantity. How \
would you like to structure your weekly time?";

const LIFE_IMPROVEMENT_TEMPLATE: &str = "\
That's a wonderful place to start. Common areas to consider: health, career, \
relationships, personal growth, and finances. Pick 1-2 that matter most right \
now and we can break them into achievable goals. What resonates most with you?";

const GENERIC_TEMPLATES: [&str; 3] = [
    "I understand you'd like to discuss your goals and progress. What specific \
     area would you like to focus on today?",
    "I can help with breaking down goals into tasks, planning your schedule, and \
     reviewing progress. What would be most helpful right now?",
    "Could you share more details about what you'd like to work on? The more \
     context you provide, the better I can assist you.",
];

impl MockClient {
    pub fn new() -> Self {
        Self
    }

    /// Everything after the last `user:` marker, the way the prompt builders
    /// append the user's message to a system prompt.
    fn extract_user_message(prompt_lower: &str) -> Option<&str> {
        prompt_lower
            .rfind("user:")
            .map(|idx| prompt_lower[idx + "user:".len()..].trim())
            .filter(|msg| !msg.is_empty())
    }

    /// Canned intent-classification JSON mirroring the lexical shape of the
    /// user message. Keeps classification deterministic in tests and offline.
    fn classification_reply(message: &str) -> String {
        let word_count = message.split_whitespace().count();

        let (intent, confidence, reasoning) = if message.contains("remind me to")
            || message.contains("i need to")
            || message.contains("todo")
            || message.contains("task")
        {
            ("create_task", 0.95, "message asks for a concrete to-do item")
        } else if message.contains("goal") || message.contains("want to achieve") {
            ("create_goal", 0.93, "message describes a new objective")
        } else if message.contains("project") {
            ("create_project", 0.92, "message references starting a project")
        } else if message.contains("settings")
            || message.contains("notification")
            || message.contains("prefer")
        {
            ("update_settings", 0.9, "message mentions preferences")
        } else if message.contains("rate") {
            ("rate_life_area", 0.9, "message asks to rate an area")
        } else if message.contains("advice")
            || message.contains("how can i")
            || message.contains("what should i")
            || message.contains("tips")
            || message.contains("help")
        {
            ("get_advice", 0.88, "message requests guidance")
        } else if word_count < 2 || message.len() < 4 {
            ("unknown", 0.4, "message carries no actionable signal")
        } else {
            ("chat_continuation", 0.75, "general conversational message")
        };

        serde_json::json!({
            "intent": intent,
            "confidence": confidence,
            "entities": {},
            "reasoning": reasoning,
        })
        .to_string()
    }

    fn conversation_reply(user_message: &str) -> Option<&'static str> {
        if user_message.contains("cooking") {
            Some(COOKING_TEMPLATE)
        } else if user_message.contains("piano")
            || user_message.contains("music")
            || user_message.contains("ukulele")
            || user_message.contains("instrument")
        {
            Some(MUSIC_TEMPLATE)
        } else if user_message.contains("meditation")
            || user_message.contains("wellness")
            || user_message.contains("mindfulness")
            || user_message.contains("health")
        {
            Some(WELLNESS_TEMPLATE)
        } else if user_message.contains("time")
            && (user_message.contains("hour") || user_message.contains("week"))
        {
            Some(TIME_COMMITMENT_TEMPLATE)
        } else if user_message.contains("improve") || user_message.contains("life") {
            Some(LIFE_IMPROVEMENT_TEMPLATE)
        } else {
            None
        }
    }

    fn generic_reply(prompt: &str) -> &'static str {
        let digest = Sha256::digest(prompt.as_bytes());
        GENERIC_TEMPLATES[digest[0] as usize % GENERIC_TEMPLATES.len()]
    }

    fn mock_response(prompt: &str) -> String {
        let prompt_lower = prompt.to_lowercase();

        if prompt_lower.contains("intent classification") {
            let message = Self::extract_user_message(&prompt_lower).unwrap_or("");
            return Self::classification_reply(message);
        }

        if prompt_lower.contains("goal") && prompt_lower.contains("decompose") {
            return GOAL_DECOMPOSITION_TEMPLATE.to_string();
        }

        if let Some(user_message) = Self::extract_user_message(&prompt_lower)
            && let Some(reply) = Self::conversation_reply(user_message)
        {
            return reply.to_string();
        }

        if prompt_lower.contains("task") {
            return TASK_SUGGESTIONS_TEMPLATE.to_string();
        }

        Self::generic_reply(prompt).to_string()
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for MockClient {
    async fn generate_completion(
        &self,
        prompt: &str,
        model: &str,
        _max_tokens: u32,
        _temperature: f64,
        _timeout: Duration,
    ) -> Result<Completion, ProviderError> {
        let content = Self::mock_response(prompt);
        let usage = TokenUsage::new(prompt.len() as u64 / 4, content.len() as u64 / 4);

        Ok(Completion::new(content, usage, model).with_finish_reason("stop"))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
