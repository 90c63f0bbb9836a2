//! `kindred status` — Show configuration and relationship state.

use kindred_affinity::{AffinityStore, FileAffinityStore};
use kindred_config::AppConfig;
use kindred_core::conversation::ConversationId;

pub async fn run(conversation: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("Kindred Status");
    println!("==============");
    println!("  Config dir:  {}", AppConfig::config_dir().display());
    println!("  Provider:    {}", config.model.provider);
    println!("  Model:       {}", config.model.model);
    println!("  Memory:      {} ({})", config.memory.backend, config.memory_path().display());
    println!("  API key:     {}", if config.has_api_key() { "configured" } else { "missing" });

    let store = FileAffinityStore::new(config.affinity.dir.clone());
    let conversation = ConversationId::from(&conversation);
    match store.load(&conversation).await {
        Ok(snapshot) => {
            let days = snapshot.state.relationship_days(chrono::Utc::now());
            println!();
            println!("  Conversation: {conversation}");
            println!("  Affinity:     {}/100 (day {days})", snapshot.state.score);
            println!("  Mood:         {}", snapshot.emotion);
            if let Some(nickname) = &snapshot.profile.nickname {
                println!("  Nickname:     {nickname}");
            }
        }
        Err(e) => println!("\n  Could not load relationship state: {e}"),
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("\n  No config file yet — run `kindred onboard` first");
    }

    Ok(())
}
