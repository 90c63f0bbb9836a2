//! The risk-gated tool loop.
//!
//! One turn moves through an explicit state machine: the model thinks,
//! either answers or requests a tool, sensitive tools wait on a
//! confirmation gate, results feed back as observations, and the loop
//! resumes until a final reply, a refusal, or the step limit. Every tool
//! request is recorded as a [`ToolInvocation`] whether it ran or not.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kindred_core::conversation::{TurnOutcome, ToolInvocation};
use kindred_core::error::ModelError;
use kindred_core::model::{AgentReply, ChatMessage, ModelClient, ModelRequest};
use kindred_core::tool::{RiskTier, ToolCall, ToolRegistry};
use tracing::{debug, warn};

/// Answers the "may I run this?" question for sensitive tools.
///
/// Implementations must resolve promptly or the loop's timeout treats the
/// silence as a refusal.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, call: &ToolCall) -> bool;
}

/// Approves everything. For safe-only registries and tests.
pub struct AutoApprove;

#[async_trait]
impl ConfirmationGate for AutoApprove {
    async fn confirm(&self, _call: &ToolCall) -> bool {
        true
    }
}

/// Denies everything.
pub struct AutoDeny;

#[async_trait]
impl ConfirmationGate for AutoDeny {
    async fn confirm(&self, _call: &ToolCall) -> bool {
        false
    }
}

/// Loop behavior knobs.
#[derive(Debug, Clone)]
pub struct TurnLoopConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Model calls per turn before the loop aborts.
    pub max_steps: u32,
    /// Failed executions per tool before the loop gives a degraded answer.
    pub max_tool_retries: u32,
    pub confirmation_timeout: Duration,
}

impl Default for TurnLoopConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: Some(1024),
            max_steps: 8,
            max_tool_retries: 2,
            confirmation_timeout: Duration::from_secs(30),
        }
    }
}

/// Where the loop ended up and what it did on the way.
#[derive(Debug, Clone)]
pub struct TurnLoopResult {
    pub reply: AgentReply,
    pub outcome: TurnOutcome,
    pub invocations: Vec<ToolInvocation>,
    pub steps: u32,
}

/// Loop states. The machine only moves forward; terminal states produce a
/// [`TurnLoopResult`].
enum LoopState {
    Thinking,
    ToolRequested(ToolCall),
    AwaitingConfirmation(ToolCall),
    Executing(ToolCall),
    Answering(AgentReply),
    Cancelled(ToolCall),
    Aborted,
}

pub struct TurnLoop {
    model: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    gate: Arc<dyn ConfirmationGate>,
    config: TurnLoopConfig,
}

impl TurnLoop {
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
        gate: Arc<dyn ConfirmationGate>,
        config: TurnLoopConfig,
    ) -> Self {
        Self {
            model,
            tools,
            gate,
            config,
        }
    }

    /// Drive one turn to a terminal state.
    ///
    /// `messages` is the assembled transcript, system prompt first. A model
    /// error propagates to the caller; everything else resolves into a
    /// result, including refusals and the step limit.
    pub async fn run(&self, mut messages: Vec<ChatMessage>) -> Result<TurnLoopResult, ModelError> {
        let definitions = self.tools.definitions();
        let mut invocations: Vec<ToolInvocation> = Vec::new();
        let mut failures: HashMap<String, u32> = HashMap::new();
        let mut steps = 0u32;
        let mut state = LoopState::Thinking;

        loop {
            state = match state {
                LoopState::Thinking => {
                    if steps >= self.config.max_steps {
                        LoopState::Aborted
                    } else {
                        steps += 1;
                        debug!(step = steps, "model call");
                        let response = self
                            .model
                            .complete(ModelRequest {
                                model: self.config.model.clone(),
                                messages: messages.clone(),
                                temperature: self.config.temperature,
                                max_tokens: self.config.max_tokens,
                                tools: definitions.clone(),
                            })
                            .await?;

                        match response.tool_call() {
                            Some(tc) => {
                                let arguments = serde_json::from_str(&tc.arguments)
                                    .unwrap_or_else(|_| serde_json::json!({}));
                                let call = ToolCall {
                                    id: tc.id.clone(),
                                    name: tc.name.clone(),
                                    arguments,
                                    risk: self.tools.risk_of(&tc.name),
                                };
                                messages.push(response.message.clone());
                                LoopState::ToolRequested(call)
                            }
                            None => LoopState::Answering(final_reply(&response.message.content)),
                        }
                    }
                }

                LoopState::ToolRequested(call) => match call.risk {
                    RiskTier::Safe => LoopState::Executing(call),
                    RiskTier::Sensitive => LoopState::AwaitingConfirmation(call),
                },

                LoopState::AwaitingConfirmation(call) => {
                    let approved = tokio::time::timeout(
                        self.config.confirmation_timeout,
                        self.gate.confirm(&call),
                    )
                    .await
                    .unwrap_or_else(|_| {
                        warn!(tool = %call.name, "confirmation timed out, treating as refusal");
                        false
                    });

                    if approved {
                        invocations.push(invocation(&call, None, Some(true)));
                        LoopState::Executing(call)
                    } else {
                        LoopState::Cancelled(call)
                    }
                }

                LoopState::Executing(call) => {
                    match self.tools.execute(&call).await {
                        Ok(result) => {
                            debug!(tool = %call.name, success = result.success, "tool executed");
                            messages.push(ChatMessage::tool_result(&call.id, &result.output));
                            record_execution(&mut invocations, &call, result);
                            LoopState::Thinking
                        }
                        Err(e) => {
                            warn!(tool = %call.name, error = %e, "tool execution failed");
                            let count = failures.entry(call.name.clone()).or_insert(0);
                            *count += 1;
                            let failed = kindred_core::tool::ToolResult {
                                call_id: call.id.clone(),
                                success: false,
                                output: format!("Error: {e}"),
                                data: None,
                            };
                            messages.push(ChatMessage::tool_result(&call.id, &failed.output));
                            record_execution(&mut invocations, &call, failed);

                            if *count > self.config.max_tool_retries {
                                // Give up on this tool and answer with what
                                // we have instead of burning steps.
                                LoopState::Answering(AgentReply::plain(format!(
                                    "I tried to use {} but it kept failing, so I couldn't \
                                     finish that part. Want me to try something else?",
                                    call.name
                                )))
                            } else {
                                LoopState::Thinking
                            }
                        }
                    }
                }

                LoopState::Cancelled(call) => {
                    invocations.push(invocation(&call, None, Some(false)));
                    return Ok(TurnLoopResult {
                        reply: AgentReply::plain(format!(
                            "Okay, I won't do that. I'm skipping {} as you asked.",
                            call.name
                        )),
                        outcome: TurnOutcome::Cancelled,
                        invocations,
                        steps,
                    });
                }

                LoopState::Answering(reply) => {
                    return Ok(TurnLoopResult {
                        reply,
                        outcome: TurnOutcome::Done,
                        invocations,
                        steps,
                    });
                }

                LoopState::Aborted => {
                    warn!(steps, "step limit reached, aborting turn");
                    return Ok(TurnLoopResult {
                        reply: AgentReply::plain(
                            "I got a bit lost trying to finish that. Could you nudge me \
                             in the right direction?",
                        ),
                        outcome: TurnOutcome::Aborted,
                        invocations,
                        steps,
                    });
                }
            };
        }
    }
}

/// A final model message that fails structured parsing degrades to a
/// plain-text reply with the neutral emotion rather than an error.
fn final_reply(content: &str) -> AgentReply {
    if let Some(reply) = AgentReply::parse(content) {
        return reply;
    }
    let text = content.trim();
    if text.is_empty() {
        AgentReply::plain("Sorry, I lost my train of thought there. Say that again?")
    } else {
        AgentReply::plain(text)
    }
}

fn invocation(call: &ToolCall, result: Option<kindred_core::tool::ToolResult>, confirmed: Option<bool>) -> ToolInvocation {
    ToolInvocation {
        call_id: call.id.clone(),
        tool_name: call.name.clone(),
        arguments: call.arguments.clone(),
        result,
        confirmed,
    }
}

/// Attach a result to the most recent invocation record for this call, or
/// append a fresh record for unguarded (safe) calls.
fn record_execution(
    invocations: &mut Vec<ToolInvocation>,
    call: &ToolCall,
    result: kindred_core::tool::ToolResult,
) {
    if let Some(last) = invocations
        .iter_mut()
        .rev()
        .find(|i| i.call_id == call.id && i.result.is_none())
    {
        last.result = Some(result);
        return;
    }
    invocations.push(invocation(call, Some(result), None));
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_providers::mock::{FailingClient, SequentialClient};
    use kindred_tools::{default_registry, ToolSinks};
    use serde_json::json;

    fn loop_with(
        client: SequentialClient,
        gate: Arc<dyn ConfirmationGate>,
    ) -> (TurnLoop, ToolSinks) {
        let sinks = ToolSinks::new();
        let registry = Arc::new(default_registry(&sinks));
        let tl = TurnLoop::new(
            Arc::new(client),
            registry,
            gate,
            TurnLoopConfig::default(),
        );
        (tl, sinks)
    }

    fn opening(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::system("you are a test agent"), ChatMessage::user(text)]
    }

    #[tokio::test]
    async fn direct_answer_completes_in_one_step() {
        let client = SequentialClient::new(vec![SequentialClient::reply("hey there")]);
        let (tl, _) = loop_with(client, Arc::new(AutoApprove));

        let result = tl.run(opening("hi")).await.unwrap();
        assert_eq!(result.outcome, TurnOutcome::Done);
        assert_eq!(result.reply.reply, "hey there");
        assert_eq!(result.steps, 1);
        assert!(result.invocations.is_empty());
    }

    #[tokio::test]
    async fn safe_tool_runs_without_confirmation() {
        let client = SequentialClient::new(vec![
            SequentialClient::tool_call("c1", "web_search", json!({"query": "rust"})),
            SequentialClient::reply("found it"),
        ]);
        // A denying gate must not matter for safe tools.
        let (tl, _) = loop_with(client, Arc::new(AutoDeny));

        let result = tl.run(opening("search rust")).await.unwrap();
        assert_eq!(result.outcome, TurnOutcome::Done);
        assert_eq!(result.invocations.len(), 1);
        assert!(result.invocations[0].result.as_ref().unwrap().success);
        assert_eq!(result.invocations[0].confirmed, None);
    }

    #[tokio::test]
    async fn sensitive_tool_denied_leaves_no_side_effect() {
        let client = SequentialClient::new(vec![SequentialClient::tool_call(
            "c1",
            "send_message",
            json!({"recipient": "maya", "body": "hi"}),
        )]);
        let (tl, sinks) = loop_with(client, Arc::new(AutoDeny));

        let result = tl.run(opening("text maya")).await.unwrap();
        assert_eq!(result.outcome, TurnOutcome::Cancelled);
        assert!(result.reply.reply.contains("send_message"));
        assert_eq!(result.invocations.len(), 1);
        assert_eq!(result.invocations[0].confirmed, Some(false));
        assert!(result.invocations[0].result.is_none());
        assert!(sinks.outbox.lock().await.is_empty());
    }

    #[tokio::test]
    async fn sensitive_tool_approved_executes() {
        let client = SequentialClient::new(vec![
            SequentialClient::tool_call(
                "c1",
                "send_message",
                json!({"recipient": "maya", "body": "hi"}),
            ),
            SequentialClient::reply("sent!"),
        ]);
        let (tl, sinks) = loop_with(client, Arc::new(AutoApprove));

        let result = tl.run(opening("text maya")).await.unwrap();
        assert_eq!(result.outcome, TurnOutcome::Done);
        assert_eq!(result.invocations.len(), 1);
        assert_eq!(result.invocations[0].confirmed, Some(true));
        assert!(result.invocations[0].result.as_ref().unwrap().success);
        assert_eq!(sinks.outbox.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn gate_is_consulted_once_per_sensitive_request() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingGate(AtomicU32);
        #[async_trait]
        impl ConfirmationGate for CountingGate {
            async fn confirm(&self, _call: &ToolCall) -> bool {
                self.0.fetch_add(1, Ordering::SeqCst);
                true
            }
        }

        let gate = Arc::new(CountingGate(AtomicU32::new(0)));
        let client = SequentialClient::new(vec![
            SequentialClient::tool_call("c1", "web_search", json!({"query": "rust"})),
            SequentialClient::tool_call(
                "c2",
                "send_message",
                json!({"recipient": "maya", "body": "hi"}),
            ),
            SequentialClient::reply("all done"),
        ]);
        let (tl, _) = loop_with(client, gate.clone());

        let result = tl.run(opening("search then text maya")).await.unwrap();
        assert_eq!(result.outcome, TurnOutcome::Done);
        // One sensitive request, one confirmation; the safe call never
        // reached the gate.
        assert_eq!(gate.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hallucinated_tool_is_gated_then_cancelled() {
        let client = SequentialClient::new(vec![SequentialClient::tool_call(
            "c1",
            "erase_user_data",
            json!({}),
        )]);
        let (tl, _) = loop_with(client, Arc::new(AutoDeny));

        let result = tl.run(opening("do something weird")).await.unwrap();
        assert_eq!(result.outcome, TurnOutcome::Cancelled);
    }

    #[tokio::test]
    async fn tool_failure_feeds_back_and_loop_resumes() {
        // Missing "query" makes web_search fail once; the model recovers.
        let client = SequentialClient::new(vec![
            SequentialClient::tool_call("c1", "web_search", json!({})),
            SequentialClient::reply("never mind, answering directly"),
        ]);
        let (tl, _) = loop_with(client, Arc::new(AutoApprove));

        let result = tl.run(opening("search")).await.unwrap();
        assert_eq!(result.outcome, TurnOutcome::Done);
        let failed = &result.invocations[0];
        assert!(!failed.result.as_ref().unwrap().success);
        assert!(failed.result.as_ref().unwrap().output.starts_with("Error:"));
    }

    #[tokio::test]
    async fn repeated_tool_failure_degrades_to_answer() {
        let bad = || SequentialClient::tool_call("c", "web_search", json!({}));
        // max_tool_retries = 2, so the third failure gives up.
        let client = SequentialClient::new(vec![bad(), bad(), bad(), bad()]);
        let (tl, _) = loop_with(client, Arc::new(AutoApprove));

        let result = tl.run(opening("search")).await.unwrap();
        assert_eq!(result.outcome, TurnOutcome::Done);
        assert!(result.reply.reply.contains("web_search"));
        assert_eq!(result.invocations.len(), 3);
    }

    #[tokio::test]
    async fn step_limit_aborts() {
        let calls: Vec<_> = (0..10)
            .map(|i| {
                SequentialClient::tool_call(
                    &format!("c{i}"),
                    "read_messages",
                    json!({"limit": 1}),
                )
            })
            .collect();
        let (tl, _) = loop_with(SequentialClient::new(calls), Arc::new(AutoApprove));

        let result = tl.run(opening("loop forever")).await.unwrap();
        assert_eq!(result.outcome, TurnOutcome::Aborted);
        assert_eq!(result.steps, TurnLoopConfig::default().max_steps);
    }

    #[tokio::test]
    async fn unparseable_final_output_becomes_plain_reply() {
        let client =
            SequentialClient::new(vec![SequentialClient::raw("just some plain prose")]);
        let (tl, _) = loop_with(client, Arc::new(AutoApprove));

        let result = tl.run(opening("hi")).await.unwrap();
        assert_eq!(result.outcome, TurnOutcome::Done);
        assert_eq!(result.reply.reply, "just some plain prose");
        assert_eq!(result.reply.emotion, kindred_core::persona::Emotion::Basic);
    }

    #[tokio::test]
    async fn model_error_propagates() {
        let sinks = ToolSinks::new();
        let tl = TurnLoop::new(
            Arc::new(FailingClient),
            Arc::new(default_registry(&sinks)),
            Arc::new(AutoApprove),
            TurnLoopConfig::default(),
        );
        assert!(tl.run(opening("hi")).await.is_err());
    }

    #[tokio::test]
    async fn slow_gate_times_out_as_refusal() {
        struct SlowGate;
        #[async_trait]
        impl ConfirmationGate for SlowGate {
            async fn confirm(&self, _call: &ToolCall) -> bool {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                true
            }
        }

        let client = SequentialClient::new(vec![SequentialClient::tool_call(
            "c1",
            "send_message",
            json!({"recipient": "maya", "body": "hi"}),
        )]);
        let sinks = ToolSinks::new();
        let mut config = TurnLoopConfig::default();
        config.confirmation_timeout = Duration::from_millis(20);
        let tl = TurnLoop::new(
            Arc::new(client),
            Arc::new(default_registry(&sinks)),
            Arc::new(SlowGate),
            config,
        );

        let result = tl.run(opening("text maya")).await.unwrap();
        assert_eq!(result.outcome, TurnOutcome::Cancelled);
        assert!(sinks.outbox.lock().await.is_empty());
    }
}
