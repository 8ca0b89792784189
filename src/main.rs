use dotenv::dotenv;
use serenity::all::GatewayIntents;
use serenity::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zbot::config::Config;
use zbot::cooldown::{Clock, CooldownGate, SystemClock};
use zbot::discord::{ChannelHistory, Handler};
use zbot::groq::{CompletionProvider, DisabledProvider, GroqClient};
use zbot::keep_alive;
use zbot::language::LanguageResolver;
use zbot::leveling::Leveling;
use zbot::memory::{FactStore, InMemoryFactStore};
use zbot::orchestrator::{Orchestrator, OrchestratorSettings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    tokio::spawn(keep_alive::serve(config.keep_alive_port));

    let provider: Arc<dyn CompletionProvider> = match &config.groq_api_key {
        Some(api_key) => {
            info!("Groq API key loaded, model {}", config.groq_model);
            Arc::new(GroqClient::new(
                &config.groq_endpoint,
                api_key,
                config.request_timeout,
            ))
        }
        None => {
            warn!("GROQ_API_KEY not set, completions are disabled");
            Arc::new(DisabledProvider)
        }
    };

    let store: Arc<dyn FactStore> = Arc::new(InMemoryFactStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let orchestrator = Orchestrator::new(
        provider,
        Arc::new(ChannelHistory::new(&config.discord_token)),
        store.clone(),
        LanguageResolver::new(config.language_roles.clone()),
        CooldownGate::new(config.translator_cooldown),
        clock.clone(),
        OrchestratorSettings {
            model: config.groq_model.clone(),
            call_timeout: config.request_timeout,
        },
    );
    let leveling = Leveling::new(
        store,
        clock,
        config.level_role_a,
        config.level_role_b,
        config.request_timeout,
    );

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILDS;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(Handler::new(Arc::new(orchestrator), Arc::new(leveling)))
        .await?;

    client.start().await?;
    Ok(())
}
