use super::Config;

impl Config {
    /// Apply process-wide environment overrides on top of the parsed file.
    ///
    /// Recognized variables follow the `AI_*` convention for engine tuning
    /// plus the vendor credential variables.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("AI_PROVIDER")
            && !provider.is_empty()
        {
            self.ai.provider = provider.trim().to_lowercase();
        }

        if let Ok(flag) = std::env::var("AI_ENABLE_CACHING")
            && let Ok(enabled) = flag.trim().parse::<bool>()
        {
            self.ai.enable_caching = enabled;
        }

        if let Ok(ttl_str) = std::env::var("AI_CACHE_TTL_SECONDS")
            && let Ok(ttl) = ttl_str.trim().parse::<u64>()
        {
            self.ai.cache_ttl_seconds = ttl;
        }

        if let Ok(threshold_str) = std::env::var("AI_INTENT_CONFIDENCE_THRESHOLD")
            && let Ok(threshold) = threshold_str.trim().parse::<f64>()
            && (0.0..=1.0).contains(&threshold)
        {
            self.conversation.intent_confidence_threshold = threshold;
        }

        if let Ok(cap_str) = std::env::var("AI_MAX_ASSISTANT_PROFILES_PER_USER")
            && let Ok(cap) = cap_str.trim().parse::<u32>()
            && cap > 0
        {
            self.conversation.max_assistant_profiles_per_user = cap;
        }

        if let Ok(idle_str) = std::env::var("AI_SESSION_IDLE_TIMEOUT_MINUTES")
            && let Ok(idle) = idle_str.trim().parse::<i64>()
            && idle > 0
        {
            self.conversation.session_idle_timeout_minutes = idle;
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY")
            && !key.trim().is_empty()
        {
            self.ai.openai_api_key = Some(key.trim().to_string());
        }

        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
            && !key.trim().is_empty()
        {
            self.ai.anthropic_api_key = Some(key.trim().to_string());
        }

        if let Ok(host) = std::env::var("NORTHSTAR_GATEWAY_HOST")
            && !host.is_empty()
        {
            self.gateway.host = host;
        }

        if let Ok(port_str) = std::env::var("NORTHSTAR_GATEWAY_PORT")
            && let Ok(port) = port_str.parse::<u16>()
        {
            self.gateway.port = port;
        }
    }
}
