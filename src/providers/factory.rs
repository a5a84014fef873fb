use super::anthropic::AnthropicClient;
use super::mock::MockClient;
use super::openai::OpenAiClient;
use super::traits::ProviderClient;
use super::AiProvider;
use crate::config::AiSettings;

/// Build the client for one provider variant.
///
/// Key resolution prefers the explicit config value; the env-var fallback is
/// handled upstream by `Config::apply_env_overrides`, so this stays a pure
/// function of settings.
pub fn create_client(provider: AiProvider, settings: &AiSettings) -> Box<dyn ProviderClient> {
    match provider {
        AiProvider::OpenAi => Box::new(OpenAiClient::new(settings.openai_api_key.as_deref())),
        AiProvider::Anthropic => {
            Box::new(AnthropicClient::new(settings.anthropic_api_key.as_deref()))
        }
        AiProvider::Local => Box::new(MockClient::new()),
    }
}

/// Build the fallback chain for a primary provider: the primary first, then
/// the local mock (unless the primary already is the mock).
pub fn create_chain(
    primary: AiProvider,
    settings: &AiSettings,
) -> Vec<(AiProvider, Box<dyn ProviderClient>)> {
    let mut chain = vec![(primary, create_client(primary, settings))];
    if primary != AiProvider::Local {
        chain.push((AiProvider::Local, create_client(AiProvider::Local, settings)));
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_for_remote_primary_ends_with_local() {
        let settings = AiSettings::default();
        let chain = create_chain(AiProvider::OpenAi, &settings);

        let providers: Vec<AiProvider> = chain.iter().map(|(p, _)| *p).collect();
        assert_eq!(providers, vec![AiProvider::OpenAi, AiProvider::Local]);
    }

    #[test]
    fn chain_for_local_primary_has_single_entry() {
        let settings = AiSettings::default();
        let chain = create_chain(AiProvider::Local, &settings);

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].0, AiProvider::Local);
    }

    #[test]
    fn client_names_match_variants() {
        let settings = AiSettings::default();
        assert_eq!(create_client(AiProvider::OpenAi, &settings).name(), "openai");
        assert_eq!(
            create_client(AiProvider::Anthropic, &settings).name(),
            "anthropic"
        );
        assert_eq!(create_client(AiProvider::Local, &settings).name(), "local");
    }
}
