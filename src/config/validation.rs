use crate::config::schema::{AIConfig, AgentConfig, AppConfig, BrandingConfig, SearchConfig};
use crate::error::{AstaError, Result};

/// Validate the whole configuration
pub fn validate_config(config: &AppConfig) -> Result<()> {
    validate_search(&config.search)?;
    validate_agent(&config.agent)?;
    validate_branding(&config.branding)?;
    validate_ai(&config.ai)?;

    if config.memory.context_entries > config.memory.max_entries {
        return Err(AstaError::Validation(format!(
            "memory.context_entries ({}) cannot exceed memory.max_entries ({})",
            config.memory.context_entries, config.memory.max_entries
        )));
    }

    Ok(())
}

/// Validate the search URL template
pub fn validate_search(search: &SearchConfig) -> Result<()> {
    if !search.url_template.contains("{query}") {
        return Err(AstaError::Validation(format!(
            "Search template {} must contain {{query}}",
            search.url_template
        )));
    }

    if !search.url_template.starts_with("http://") && !search.url_template.starts_with("https://")
    {
        return Err(AstaError::Validation(format!(
            "Search template {} must start with http:// or https://",
            search.url_template
        )));
    }

    Ok(())
}

/// Validate action timing
pub fn validate_agent(agent: &AgentConfig) -> Result<()> {
    if agent.wait_timeout_ms == 0 {
        return Err(AstaError::Validation(
            "agent.wait_timeout_ms must be greater than zero".to_string(),
        ));
    }

    if agent.wait_poll_interval_ms == 0 {
        return Err(AstaError::Validation(
            "agent.wait_poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Validate branding words
pub fn validate_branding(branding: &BrandingConfig) -> Result<()> {
    if branding.enabled && branding.replace.trim().is_empty() {
        return Err(AstaError::Validation(
            "branding.replace cannot be empty when branding is enabled".to_string(),
        ));
    }

    Ok(())
}

/// Validate providers and the default model selection
pub fn validate_ai(ai: &AIConfig) -> Result<()> {
    for (id, provider) in &ai.providers {
        if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://")
        {
            return Err(AstaError::Validation(format!(
                "Provider '{}' has invalid base_url: {}",
                id, provider.base_url
            )));
        }
    }

    if let Some(selection) = &ai.default_llm {
        let (provider_id, model) = selection.split_once(':').ok_or_else(|| {
            AstaError::Validation(format!(
                "Invalid default_llm format '{}'. Expected 'provider_id:model_name'",
                selection
            ))
        })?;

        if model.is_empty() {
            return Err(AstaError::Validation(format!(
                "default_llm '{}' names no model",
                selection
            )));
        }

        if !ai.providers.contains_key(provider_id) {
            return Err(AstaError::Validation(format!(
                "default_llm refers to unknown provider '{}'",
                provider_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ApiType, ProviderConfig};

    fn ollama() -> ProviderConfig {
        ProviderConfig {
            name: "Ollama".to_string(),
            api_type: ApiType::Ollama,
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            models: vec!["llama3".to_string()],
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_search_template_needs_placeholder() {
        let search = SearchConfig {
            url_template: "https://example.com/search".to_string(),
        };
        assert!(validate_search(&search).is_err());
    }

    #[test]
    fn test_zero_poll_interval() {
        let agent = AgentConfig {
            wait_poll_interval_ms: 0,
            ..AgentConfig::default()
        };
        assert!(validate_agent(&agent).is_err());
    }

    #[test]
    fn test_default_llm_must_reference_provider() {
        let mut ai = AIConfig {
            default_llm: Some("local:llama3".to_string()),
            ..AIConfig::default()
        };
        assert!(validate_ai(&ai).is_err());

        ai.providers.insert("local".to_string(), ollama());
        assert!(validate_ai(&ai).is_ok());

        ai.default_llm = Some("local".to_string());
        assert!(validate_ai(&ai).is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut provider = ollama();
        provider.base_url = "localhost:11434".to_string();
        let mut ai = AIConfig::default();
        ai.providers.insert("local".to_string(), provider);
        assert!(validate_ai(&ai).is_err());
    }
}
