/// Binds each oracle role to an LLM endpoint and its call settings.
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AppConfig, LlmConfig, OracleRole, ProviderEntry, DEFAULT_TEMPERATURE};
use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Provider plus per-call settings resolved for one role.
pub struct RoleBinding {
    pub provider: Arc<dyn LlmProvider>,
    pub call: CallConfig,
}

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    llm: LlmConfig,
}

impl ProviderRegistry {
    /// One OpenAI-compatible provider per `[llm.providers.<id>]` table.
    pub fn from_config(config: &AppConfig) -> Self {
        let providers = config
            .llm
            .providers
            .iter()
            .map(|(id, entry)| {
                let provider = OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key(id, entry));
                (id.clone(), Arc::new(provider) as Arc<dyn LlmProvider>)
            })
            .collect();
        Self { providers, llm: config.llm.clone() }
    }

    /// Registry over prebuilt providers with no role overrides; `active`
    /// serves every role.
    pub fn with_providers(active: &str, providers: impl IntoIterator<Item = Arc<dyn LlmProvider>>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.name().to_string(), p)).collect(),
            llm: LlmConfig { active_provider: active.to_string(), ..LlmConfig::default() },
        }
    }

    /// A `[llm.roles.<role>]` entry wins; otherwise the active provider's
    /// defaults are used without streaming.
    pub fn bind(&self, role: OracleRole) -> PilotResult<RoleBinding> {
        let binding = match self.llm.roles.entry(role) {
            Some(entry) => {
                let defaults = self.llm.providers.get(&entry.provider);
                RoleBinding {
                    provider: self.provider(&entry.provider, role)?,
                    call: CallConfig {
                        model: entry.model.clone(),
                        stream: entry.stream,
                        temperature: entry
                            .temperature
                            .or(defaults.map(|p| p.temperature))
                            .unwrap_or(DEFAULT_TEMPERATURE),
                    },
                }
            }
            None => {
                let id = &self.llm.active_provider;
                let defaults = self.llm.providers.get(id);
                RoleBinding {
                    provider: self.provider(id, role)?,
                    call: CallConfig {
                        model: defaults.map(|p| p.model.clone()).unwrap_or_default(),
                        stream: false,
                        temperature: defaults.map_or(DEFAULT_TEMPERATURE, |p| p.temperature),
                    },
                }
            }
        };
        tracing::debug!(
            %role,
            provider = binding.provider.name(),
            model = %binding.call.model,
            stream = binding.call.stream,
            "oracle role bound"
        );
        Ok(binding)
    }

    fn provider(&self, id: &str, role: OracleRole) -> PilotResult<Arc<dyn LlmProvider>> {
        self.providers.get(id).cloned().ok_or_else(|| {
            PilotError::Config(format!("{role} role needs provider {id:?}, which is not configured"))
        })
    }
}

/// `FRAMEPILOT_<ID>_API_KEY` from the environment, else the config value.
fn api_key(id: &str, entry: &ProviderEntry) -> String {
    std::env::var(format!("FRAMEPILOT_{}_API_KEY", id.to_uppercase()))
        .ok()
        .or_else(|| entry.api_key.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const CONFIG: &str = r#"
[llm]
active_provider = "local"

[llm.providers.local]
api_base = "http://127.0.0.1:8000/v1/chat/completions"
model = "general"
temperature = 0.3

[llm.providers.atlas]
api_base = "http://127.0.0.1:8001/v1/chat/completions"
model = "os-atlas"

[llm.roles.grounding]
provider = "atlas"
model = "os-atlas-7b"
stream = false

[llm.roles.bbox]
provider = "missing"
model = "x"
"#;

    #[test]
    fn role_entry_wins_over_active_provider() {
        let registry = ProviderRegistry::from_config(&parse_config(CONFIG).unwrap());
        let binding = registry.bind(OracleRole::Grounding).unwrap();
        assert_eq!(binding.provider.name(), "atlas");
        assert_eq!(binding.call.model, "os-atlas-7b");
        assert!(!binding.call.stream);
        assert_eq!(binding.call.temperature, 0.1);
    }

    #[test]
    fn unconfigured_roles_fall_back_to_active() {
        let registry = ProviderRegistry::from_config(&parse_config(CONFIG).unwrap());
        for role in [OracleRole::Planner, OracleRole::Executor] {
            let binding = registry.bind(role).unwrap();
            assert_eq!(binding.provider.name(), "local");
            assert_eq!(binding.call.model, "general");
            assert_eq!(binding.call.temperature, 0.3);
            assert!(!binding.call.stream);
        }
    }

    #[test]
    fn unknown_provider_names_the_role() {
        let registry = ProviderRegistry::from_config(&parse_config(CONFIG).unwrap());
        match registry.bind(OracleRole::Bbox) {
            Err(PilotError::Config(msg)) => {
                assert!(msg.contains("bbox"), "{msg}");
                assert!(msg.contains("missing"), "{msg}");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("bbox role should not resolve"),
        }

        let empty = ProviderRegistry::with_providers("nope", Vec::<Arc<dyn LlmProvider>>::new());
        assert!(matches!(empty.bind(OracleRole::Executor), Err(PilotError::Config(_))));
    }
}
