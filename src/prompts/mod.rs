mod engine;

pub use engine::PromptEngine;

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tera::Context;

/// Context for goal-decomposition prompts. Prompt builders consume these by
/// field; nothing here is looked up dynamically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalContext {
    pub life_areas: Vec<String>,
    pub existing_goals: Vec<String>,
    pub preferences: serde_json::Value,
}

/// Context for next-task suggestion prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    pub goal_title: String,
    pub goal_description: Option<String>,
    pub existing_tasks: Vec<String>,
    pub completed_tasks: Vec<String>,
}

/// Context for conversational and classification prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub recent_activity: Vec<String>,
    pub preferences: serde_json::Value,
    pub life_areas: Vec<String>,
}

const CHAT_SYSTEM_TEMPLATE: &str = "\
You are Northstar, a conversational AI assistant focused on helping users manage \
their life goals and tasks effectively.

Your communication style is {{ tone }}. You are knowledgeable about goal setting, \
task management, life balance, motivation and habit formation.

Key principles:
1. Listen actively and understand the user's context.
2. Ask clarifying questions that help users think through their goals.
3. Provide concrete, actionable advice.
4. Suggest breaking large goals into smaller steps.
{% if context_notes %}
Context for this conversation:
{% for note in context_notes %}- {{ note }}
{% endfor %}{% endif %}\
Keep responses conversational but purposeful.";

const CLASSIFICATION_TEMPLATE: &str = "\
You are the intent classification system for Northstar, a personal goal-management \
assistant.

Analyze the user's message and return a JSON response with the intent, a \
confidence score between 0.0 and 1.0, any extracted entities, and brief reasoning.
{% if has_context %}
User Context:
- Recent activity: {{ recent_activity }}
- Preferences: {{ preferences }}
- Life areas: {{ life_areas }}
{% endif %}
Intent definitions:
- create_goal: user wants to set a new goal or objective
- create_task: user wants to add a specific task or to-do item
- create_project: user wants to start a new project (collection of related goals/tasks)
- update_settings: user wants to modify preferences, notifications, or account settings
- rate_life_area: user wants to rate or evaluate a life area
- chat_continuation: general conversation or follow-up questions
- get_advice: user is asking for suggestions, tips, or guidance
- unknown: intent cannot be determined with confidence

Entity types to extract:
- title: main content/description for goals/tasks/projects
- due_date: date information, formatted as YYYY-MM-DD
- life_area: Health, Career, Relationships, Finance, Personal, Education, Recreation, Spiritual
- priority: high, medium, low
- duration: time estimates for tasks

Respond with JSON only, no prose:
{% raw %}{\"intent\": \"create_task\", \"confidence\": 0.96, \"entities\": {\"title\": \"Buy dumbbells\"}, \"reasoning\": \"...\"}{% endraw %}

Be conservative with confidence scores. Use confidence below 0.85 for ambiguous messages.";

const GOAL_DECOMPOSITION_TEMPLATE: &str = "\
Decompose the following goal into 3-6 concrete, actionable tasks.

Goal: {{ goal_description }}
{% if additional_context %}Additional context: {{ additional_context }}
{% endif %}{% if life_areas %}The user's life areas: {{ life_areas }}
{% endif %}{% if existing_goals %}Existing goals to stay consistent with: {{ existing_goals }}
{% endif %}
For each task give a short title, an estimated duration, and a rough timeline. \
Close with an overall timeline and suggested next steps.";

const NEXT_TASKS_TEMPLATE: &str = "\
Suggest the next 2-3 tasks for the goal below.

Goal: {{ goal_title }}
{% if goal_description %}Description: {{ goal_description }}
{% endif %}{% if existing_tasks %}Open tasks: {{ existing_tasks }}
{% endif %}{% if completed_tasks %}Completed tasks: {{ completed_tasks }}
{% endif %}
Prefer small, immediately actionable tasks that build on completed work.";

static ENGINE: LazyLock<PromptEngine> = LazyLock::new(|| {
    PromptEngine::new(&[
        ("chat_system", CHAT_SYSTEM_TEMPLATE),
        ("classification", CLASSIFICATION_TEMPLATE),
        ("goal_decomposition", GOAL_DECOMPOSITION_TEMPLATE),
        ("next_tasks", NEXT_TASKS_TEMPLATE),
    ])
    .expect("prompt templates are valid")
});

fn tone_for(preferences: &serde_json::Value) -> &'static str {
    match preferences.get("tone").and_then(|t| t.as_str()) {
        Some("coach") => "direct and motivational, like a personal coach",
        Some("minimal") => "concise and focused on actionable advice",
        Some("professional") => "professional yet warm and helpful",
        _ => "friendly and supportive",
    }
}

/// System prompt for general conversation, with optional per-turn context
/// guidance lines.
pub fn chat_system_prompt(
    preferences: &serde_json::Value,
    context_notes: &[String],
) -> anyhow::Result<String> {
    let mut ctx = Context::new();
    ctx.insert("tone", tone_for(preferences));
    if context_notes.is_empty() {
        ctx.insert("context_notes", &false);
    } else {
        ctx.insert("context_notes", context_notes);
    }
    ENGINE.render("chat_system", &ctx)
}

/// Full conversation prompt: system prompt plus the user's message.
pub fn chat_prompt(system_prompt: &str, message: &str) -> String {
    format!("{system_prompt}\n\nUser: {message}")
}

/// System prompt for Stage-A intent classification. The user message is
/// appended by the caller via [`chat_prompt`].
pub fn classification_prompt(context: Option<&ConversationContext>) -> anyhow::Result<String> {
    let mut ctx = Context::new();
    match context {
        Some(user_context) => {
            ctx.insert("has_context", &true);
            ctx.insert("recent_activity", &user_context.recent_activity.join(", "));
            ctx.insert("preferences", &user_context.preferences.to_string());
            ctx.insert("life_areas", &user_context.life_areas.join(", "));
        }
        None => ctx.insert("has_context", &false),
    }
    ENGINE.render("classification", &ctx)
}

/// Prompt asking the model to break a goal into tasks.
pub fn decompose_goal_prompt(
    goal_description: &str,
    context: &GoalContext,
    additional_context: Option<&str>,
) -> anyhow::Result<String> {
    let mut ctx = Context::new();
    ctx.insert("goal_description", goal_description);
    ctx.insert("additional_context", &additional_context.unwrap_or_default());
    ctx.insert("life_areas", &context.life_areas.join(", "));
    ctx.insert("existing_goals", &context.existing_goals.join(", "));
    ENGINE.render("goal_decomposition", &ctx)
}

/// Prompt asking the model to suggest follow-up tasks for a goal.
pub fn next_tasks_prompt(context: &TaskContext) -> anyhow::Result<String> {
    let mut ctx = Context::new();
    ctx.insert("goal_title", &context.goal_title);
    ctx.insert(
        "goal_description",
        &context.goal_description.clone().unwrap_or_default(),
    );
    ctx.insert("existing_tasks", &context.existing_tasks.join(", "));
    ctx.insert("completed_tasks", &context.completed_tasks.join(", "));
    ENGINE.render("next_tasks", &ctx)
}
