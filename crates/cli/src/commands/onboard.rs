//! `kindred onboard` — First-time setup.

use kindred_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Kindred — First-Time Setup");
    println!("==========================\n");

    for dir in [
        config_dir.clone(),
        config_dir.join("relationships"),
        config_dir.join("memory"),
    ] {
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
            println!("  Created {}", dir.display());
        } else {
            println!("  Exists  {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("\n  Config already exists at {}", config_path.display());
        println!("  Edit it manually or delete it and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("\n  Created config.toml at {}", config_path.display());
        println!("\n  Next steps:");
        println!("    1. Set an API key (OPENROUTER_API_KEY or edit the config)");
        println!("    2. Run: kindred chat\n");
    }

    Ok(())
}
