pub mod anthropic;
pub mod factory;
pub mod mock;
pub mod openai;
pub mod response;
pub mod scrub;
pub mod traits;

pub use factory::{create_chain, create_client};
pub use response::{Completion, TokenUsage};
pub use scrub::{api_error, sanitize_api_error, scrub_secret_patterns};
pub use traits::ProviderClient;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Closed set of provider variants. Dispatch is by explicit match — there is
/// no string-keyed lookup anywhere past the config boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AiProvider {
    #[strum(serialize = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Local,
}

#[cfg(test)]
mod tests {
    use super::AiProvider;
    use std::str::FromStr;

    #[test]
    fn provider_names_round_trip() {
        for (name, variant) in [
            ("openai", AiProvider::OpenAi),
            ("anthropic", AiProvider::Anthropic),
            ("local", AiProvider::Local),
        ] {
            assert_eq!(AiProvider::from_str(name).unwrap(), variant);
            assert_eq!(variant.to_string(), name);
        }
    }

    #[test]
    fn unknown_provider_name_is_rejected() {
        assert!(AiProvider::from_str("palm").is_err());
    }

    #[test]
    fn serde_travels_lowercase() {
        let value = serde_json::to_value(AiProvider::OpenAi).unwrap();
        assert_eq!(value, serde_json::json!("openai"));
    }
}
