//! Context assembly — turns relationship state, retrieved memories, and
//! tool schemas into one ordered, token-budgeted system prompt.
//!
//! Section order is fixed: persona always opens the prompt and the response
//! format always closes it. Retrieved memories are placed against the
//! lost-in-the-middle effect: the two highest-salience records take the
//! first and last slots, the rest fill inward by descending salience.
//!
//! # Determinism
//!
//! Assembly is a pure function of its input. Identical inputs produce
//! identical sections, ordering, and truncation decisions; the clock is an
//! input, never read inside.

use chrono::{DateTime, SecondsFormat, Utc};
use kindred_affinity::{style, RelationshipSnapshot};
use kindred_core::conversation::SectionStat;
use kindred_core::error::ContextError;
use kindred_core::memory::MemoryRecord;
use kindred_core::model::ToolDefinition;
use serde::{Deserialize, Serialize};

use crate::context::token;

/// The six prompt sections, in render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Persona,
    Memories,
    Tools,
    Timestamp,
    Rules,
    ResponseFormat,
}

impl SectionKind {
    pub fn tag(self) -> &'static str {
        match self {
            SectionKind::Persona => "persona",
            SectionKind::Memories => "memories",
            SectionKind::Tools => "tools",
            SectionKind::Timestamp => "timestamp",
            SectionKind::Rules => "rules",
            SectionKind::ResponseFormat => "response_format",
        }
    }
}

/// One rendered prompt section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSection {
    pub kind: SectionKind,
    pub body: String,
    pub tokens: usize,
}

/// Everything the assembler needs for one turn.
pub struct AssemblyInput<'a> {
    pub snapshot: &'a RelationshipSnapshot,
    /// Retrieved memories with salience set. Order does not matter; the
    /// assembler sorts.
    pub memories: &'a [MemoryRecord],
    pub tool_definitions: &'a [ToolDefinition],
    /// Whether the tools section may be dropped under budget pressure.
    pub tools_optional: bool,
    pub now: DateTime<Utc>,
}

/// The assembled prompt plus per-section metadata.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub sections: Vec<PromptSection>,
    pub total_tokens: usize,
    pub dropped_memories: usize,
}

impl AssembledPrompt {
    /// Render all sections into one system message.
    pub fn system_message(&self) -> String {
        self.sections
            .iter()
            .map(|s| format!("<{tag}>\n{body}\n</{tag}>", tag = s.kind.tag(), body = s.body))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Per-section stats for the turn record.
    pub fn stats(&self) -> Vec<SectionStat> {
        self.sections
            .iter()
            .map(|s| SectionStat {
                name: s.kind.tag().to_string(),
                tokens: s.tokens,
                dropped_records: if s.kind == SectionKind::Memories {
                    self.dropped_memories
                } else {
                    0
                },
            })
            .collect()
    }
}

const AGENT_NAME: &str = "Kindred";

const RULES: &str = "Stay in persona at all times; the tone guideline is not optional.\n\
Use a tool when the user's request needs outside information or an action; otherwise answer directly.\n\
Request at most one tool call per step and never invent tool output.\n\
If an action was declined, acknowledge the refusal plainly and move on.";

const RESPONSE_FORMAT: &str = "Reply with exactly one JSON object and nothing else:\n\
{\"reply\": \"<what you say to the user>\", \"emotion\": \"<basic|angry|busy|happy|love|pouting|sad>\", \
\"affinity_shift\": <integer -5..5>, \"nickname\": <string or null>, \"relation\": <string or null>}\n\
Set nickname or relation only when the user explicitly asked to change what you call them.";

/// The stateless context assembler. Create one and reuse it.
pub struct ContextAssembler {
    budget: usize,
}

impl ContextAssembler {
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    /// Default budget: 4096 tokens.
    pub fn with_default_budget() -> Self {
        Self::new(4096)
    }

    /// Assemble the prompt, trimming whole memories (lowest salience first)
    /// under budget pressure. Persona and response format are never
    /// touched; if they alone overflow the budget, assembly fails.
    pub fn assemble(&self, input: &AssemblyInput<'_>) -> Result<AssembledPrompt, ContextError> {
        let persona = self.persona_section(input);
        let response_format = section(SectionKind::ResponseFormat, RESPONSE_FORMAT.to_string());
        let rules = section(SectionKind::Rules, RULES.to_string());
        let timestamp = section(
            SectionKind::Timestamp,
            format!(
                "Current time: {}",
                input.now.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        );

        let mandatory = persona.tokens + response_format.tokens;
        if mandatory > self.budget {
            return Err(ContextError::BudgetExceeded {
                required: mandatory,
                budget: self.budget,
            });
        }

        let mut tools = (!input.tool_definitions.is_empty())
            .then(|| section(SectionKind::Tools, tools_body(input.tool_definitions)));

        // Descending salience, id as the deterministic tie-break.
        let mut ranked: Vec<&MemoryRecord> = input.memories.iter().collect();
        ranked.sort_by(|a, b| {
            b.salience
                .partial_cmp(&a.salience)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut include_timestamp = true;
        let mut include_rules = true;
        let mut dropped = 0usize;

        loop {
            let memories = (!ranked.is_empty())
                .then(|| section(SectionKind::Memories, memories_body(&ranked)));

            let mut total = mandatory;
            total += memories.as_ref().map_or(0, |s| s.tokens);
            total += tools.as_ref().map_or(0, |s| s.tokens);
            if include_timestamp {
                total += timestamp.tokens;
            }
            if include_rules {
                total += rules.tokens;
            }

            if total <= self.budget {
                let mut sections = Vec::with_capacity(6);
                sections.push(persona);
                if let Some(m) = memories {
                    sections.push(m);
                }
                if let Some(t) = tools {
                    sections.push(t);
                }
                if include_timestamp {
                    sections.push(timestamp);
                }
                if include_rules {
                    sections.push(rules);
                }
                sections.push(response_format);

                return Ok(AssembledPrompt {
                    sections,
                    total_tokens: total,
                    dropped_memories: dropped,
                });
            }

            // Over budget: shed in fixed order so the decision is
            // reproducible. Memories go first, lowest salience first.
            if !ranked.is_empty() {
                ranked.pop();
                dropped += 1;
            } else if tools.is_some() && input.tools_optional {
                tools = None;
            } else if include_timestamp {
                include_timestamp = false;
            } else if include_rules {
                include_rules = false;
            } else {
                let required = mandatory + tools.as_ref().map_or(0, |s| s.tokens);
                return Err(ContextError::BudgetExceeded {
                    required,
                    budget: self.budget,
                });
            }
        }
    }

    fn persona_section(&self, input: &AssemblyInput<'_>) -> PromptSection {
        let snapshot = input.snapshot;
        let persona_style = style(&snapshot.state, input.now);
        let days = snapshot.state.relationship_days(input.now);

        let mut body = format!(
            "You are {AGENT_NAME}, the user's companion.\n\
             Affinity: {}/100. Day {} of the relationship.\n\
             {}\n{}",
            snapshot.state.score, days, persona_style.tone, persona_style.depth,
        );
        body.push_str(&format!("\nCurrent mood: {}.", snapshot.emotion));
        if let Some(nickname) = &snapshot.profile.nickname {
            body.push_str(&format!("\nCall the user \"{nickname}\"."));
        }
        if let Some(relation) = &snapshot.profile.relation {
            body.push_str(&format!("\nThe user thinks of you as their {relation}."));
        }

        section(SectionKind::Persona, body)
    }
}

fn section(kind: SectionKind, body: String) -> PromptSection {
    let tokens = token::estimate_tokens(&body);
    PromptSection { kind, body, tokens }
}

/// Lost-in-the-middle placement over records already sorted by descending
/// salience: highest first, second-highest last, the rest inward.
fn placement_order<'a>(ranked: &[&'a MemoryRecord]) -> Vec<&'a MemoryRecord> {
    match ranked {
        [] | [_] => ranked.to_vec(),
        [first, second, rest @ ..] => {
            let mut ordered = Vec::with_capacity(ranked.len());
            ordered.push(*first);
            ordered.extend(rest.iter().copied());
            ordered.push(*second);
            ordered
        }
    }
}

fn memories_body(ranked: &[&MemoryRecord]) -> String {
    placement_order(ranked)
        .iter()
        .map(|r| format!("- [{}] {}", r.speaker, r.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn tools_body(definitions: &[ToolDefinition]) -> String {
    definitions
        .iter()
        .map(|d| {
            format!(
                "{}: {} (arguments: {})",
                d.name,
                d.description,
                serde_json::to_string(&d.parameters).unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
