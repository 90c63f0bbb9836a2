//! `kindred chat` — Interactive or single-message chat mode.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use kindred_affinity::AffinityStore;
use kindred_agent::{ConfirmationGate, Session, SessionDeps};
use kindred_config::AppConfig;
use kindred_core::conversation::ConversationId;
use kindred_core::tool::ToolCall;
use kindred_memory::store::MemoryStore;
use kindred_tools::ToolSinks;

use super::wiring;

/// Prompts on stdin before any sensitive tool runs. No answer within the
/// loop's timeout counts as a refusal.
struct StdinGate;

#[async_trait]
impl ConfirmationGate for StdinGate {
    async fn confirm(&self, call: &ToolCall) -> bool {
        println!();
        println!("  Kindred wants to run a sensitive action:");
        println!("    tool: {}", call.name);
        println!(
            "    args: {}",
            serde_json::to_string(&call.arguments).unwrap_or_else(|_| "<unprintable>".into())
        );
        print!("  Allow? [y/N] > ");
        let _ = std::io::stdout().flush();

        let line = tokio::task::spawn_blocking(|| {
            let mut buf = String::new();
            std::io::stdin().read_line(&mut buf).map(|_| buf)
        })
        .await;

        match line {
            Ok(Ok(answer)) => {
                let answer = answer.trim();
                answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
            }
            _ => false,
        }
    }
}

pub async fn run(
    message: Option<String>,
    conversation: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let (deps, sinks) = wiring::build_deps(&config, Arc::new(StdinGate)).await?;

    let conversation = ConversationId::from(&conversation);
    let mut session = Session::new(conversation.clone(), &deps);

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let record = session.take_turn(&msg).await?;
        eprint!("\r              \r");
        println!("{}", record.reply.content);
        return Ok(());
    }

    println!();
    println!("  Kindred — Companion Chat");
    println!("  ------------------------");
    println!("  Provider: {}  Model: {}", config.model.provider, config.model.model);
    println!("  Memory:   {}", config.memory.backend);
    println!();
    println!("  Commands: /status /boost /reset /tools /quit");
    println!();

    let stdin = std::io::stdin();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/status" => {
                print_status(&deps, &conversation).await;
                continue;
            }
            "/boost" => {
                boost(&deps, &conversation).await;
                continue;
            }
            "/reset" => {
                reset(&deps, &conversation).await;
                session = Session::new(conversation.clone(), &deps);
                continue;
            }
            "/tools" => {
                print_tools(&deps, &sinks).await;
                continue;
            }
            _ => {}
        }

        match session.take_turn(input).await {
            Ok(record) => {
                println!();
                for line in record.reply.content.lines() {
                    println!("  Kindred > {line}");
                }
                let mood = match deps.affinity.load(&conversation).await {
                    Ok(snapshot) => snapshot.emotion.to_string(),
                    Err(_) => "?".into(),
                };
                println!(
                    "  ({mood}, affinity {:+} -> {}/100)",
                    record.affinity_delta, record.affinity_score
                );
                println!();
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  See you soon.");
    Ok(())
}

async fn print_status(deps: &SessionDeps, conversation: &ConversationId) {
    let snapshot = match deps.affinity.load(conversation).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("  [Error] failed to load relationship: {e}");
            return;
        }
    };
    let days = snapshot.state.relationship_days(chrono::Utc::now());
    println!();
    println!("  Affinity:  {}/100", snapshot.state.score);
    println!("  Day:       {days}");
    println!("  Mood:      {}", snapshot.emotion);
    if let Some(nickname) = &snapshot.profile.nickname {
        println!("  Nickname:  {nickname}");
    }
    if let Some(relation) = &snapshot.profile.relation {
        println!("  Relation:  {relation}");
    }
    print_tiers(&deps.memory, conversation).await;
    println!();
}

async fn print_tiers(memory: &Arc<MemoryStore>, conversation: &ConversationId) {
    match memory.tier_counts(conversation).await {
        Ok((short, long)) => println!("  Memory:    {short} short, {long} long"),
        Err(e) => eprintln!("  [Error] failed to read memory: {e}"),
    }
}

/// Debug helper: bump the score without a conversation.
async fn boost(deps: &SessionDeps, conversation: &ConversationId) {
    match deps.affinity.load(conversation).await {
        Ok(mut snapshot) => {
            snapshot.state.apply(10);
            let score = snapshot.state.score;
            match deps.affinity.save(conversation, &snapshot).await {
                Ok(()) => println!("  Affinity boosted to {score}/100"),
                Err(e) => eprintln!("  [Error] failed to save: {e}"),
            }
        }
        Err(e) => eprintln!("  [Error] failed to load relationship: {e}"),
    }
}

async fn reset(deps: &SessionDeps, conversation: &ConversationId) {
    if let Err(e) = deps.memory.clear(conversation).await {
        eprintln!("  [Error] failed to clear memory: {e}");
        return;
    }
    let fresh = kindred_affinity::RelationshipSnapshot::default();
    match deps.affinity.save(conversation, &fresh).await {
        Ok(()) => println!("  Relationship and memory reset."),
        Err(e) => eprintln!("  [Error] failed to reset relationship: {e}"),
    }
}

async fn print_tools(deps: &SessionDeps, sinks: &ToolSinks) {
    println!();
    for definition in deps.tools.definitions() {
        let risk = deps.tools.risk_of(&definition.name);
        println!("  {:24} [{risk:?}] {}", definition.name, definition.description);
    }
    let outbox = sinks.outbox.lock().await;
    if !outbox.is_empty() {
        println!();
        println!("  Sent this session:");
        for msg in outbox.iter() {
            println!("    -> {}: {}", msg.recipient, msg.body);
        }
    }
    println!();
}
