use crate::ai::AssistantTuning;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Five personality traits, each on a 0–100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleTraits {
    pub formality: u8,
    pub directness: u8,
    pub humor: u8,
    pub empathy: u8,
    pub motivation: u8,
}

impl Default for StyleTraits {
    fn default() -> Self {
        Self {
            formality: 50,
            directness: 50,
            humor: 30,
            empathy: 70,
            motivation: 60,
        }
    }
}

impl StyleTraits {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("formality", self.formality),
            ("directness", self.directness),
            ("humor", self.humor),
            ("empathy", self.empathy),
            ("motivation", self.motivation),
        ] {
            if value > 100 {
                return Err(format!("style trait {name} must be within [0, 100], got {value}"));
            }
        }
        Ok(())
    }
}

/// Per-user AI personality and model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantProfile {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub language: String,
    pub ai_model: String,
    pub style: StyleTraits,
    pub dialogue_temperature: f64,
    pub intent_temperature: f64,
    pub custom_instructions: Option<String>,
    pub requires_confirmation: bool,
    pub is_default: bool,
    pub is_public: bool,
    /// Monotonic millisecond timestamp, bumped on every mutation.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssistantProfile {
    pub fn tuning(&self) -> AssistantTuning {
        AssistantTuning {
            dialogue_temperature: self.dialogue_temperature,
            intent_temperature: self.intent_temperature,
        }
    }
}

/// Creation payload. Unset fields take profile defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAssistantProfile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_model")]
    pub ai_model: String,
    #[serde(default)]
    pub style: StyleTraits,
    #[serde(default = "default_dialogue_temperature")]
    pub dialogue_temperature: f64,
    #[serde(default = "default_intent_temperature")]
    pub intent_temperature: f64,
    #[serde(default)]
    pub custom_instructions: Option<String>,
    #[serde(default = "default_requires_confirmation")]
    pub requires_confirmation: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_public: bool,
}

fn default_language() -> String {
    "en".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_dialogue_temperature() -> f64 {
    0.7
}

fn default_intent_temperature() -> f64 {
    0.1
}

fn default_requires_confirmation() -> bool {
    true
}

/// Partial update; only present fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantProfileUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub ai_model: Option<String>,
    pub style: Option<StyleTraits>,
    pub dialogue_temperature: Option<f64>,
    pub intent_temperature: Option<f64>,
    pub custom_instructions: Option<String>,
    pub requires_confirmation: Option<bool>,
    pub is_default: Option<bool>,
    pub is_public: Option<bool>,
}

/// Permission levels in strictly increasing order; holding a level implies
/// every lower one.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PermissionLevel {
    Read,
    Edit,
    Admin,
    Owner,
}

/// A stored grant. One row per `(assistant, grantee)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantPermission {
    pub assistant_id: String,
    pub grantee_user_id: String,
    pub level: PermissionLevel,
    pub granted_by: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AssistantPermission {
    pub fn is_effective(&self, at: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expiry| expiry > at)
    }
}

pub fn validate_temperature(name: &str, value: f64) -> Result<(), String> {
    if (0.0..=2.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{name} must be within [0.0, 2.0], got {value}"))
    }
}
