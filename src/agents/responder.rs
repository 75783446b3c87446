//! Role-specific responders wrapping the generation backend
//!
//! A responder never fails: any generation error collapses into a fixed
//! apologetic fallback, flagged as degraded so the orchestrator can record
//! it without aborting the request.

use super::generation::{ChatMessage, GenerationBackend, GenerationRequest};
use super::SupportRole;
use crate::config::ModelConfig;
use crate::error::{Result, SupportError};
use crate::session::{ConversationTurn, TurnRole};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Returned when the upstream answers successfully but with empty content
pub const EMPTY_REPLY_FALLBACK: &str = "I apologize, but I couldn't process your request.";

/// Apology used when generation fails outright for a role
pub fn fallback_answer(role: SupportRole) -> String {
    format!(
        "I encountered an error processing your {} question. Please try rephrasing or contact support.",
        role.topic()
    )
}

/// Final answer text plus whether it came from the degrade path
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub degraded: bool,
}

/// One specialist agent: instruction framing plus a model profile
pub struct Responder {
    role: SupportRole,
    backend: Arc<dyn GenerationBackend>,
    model: String,
    temperature: f32,
    bpe: CoreBPE,
    max_context_tokens: usize,
}

impl Responder {
    pub fn new(
        role: SupportRole,
        backend: Arc<dyn GenerationBackend>,
        config: &ModelConfig,
    ) -> Result<Self> {
        let model = match role {
            SupportRole::Billing => config.billing_model.clone(),
            SupportRole::Technical => config.technical_model.clone(),
            SupportRole::Policy => config.policy_model.clone(),
        };

        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| SupportError::Configuration(format!("tokenizer: {}", e)))?;

        Ok(Self {
            role,
            backend,
            model,
            temperature: default_temperature(role),
            bpe,
            max_context_tokens: config.max_context_tokens,
        })
    }

    pub fn role(&self) -> SupportRole {
        self.role
    }

    /// Answer the query with the assembled context and the session's recent
    /// history. Degrades instead of failing.
    pub async fn respond(
        &self,
        query: &str,
        context: &str,
        history: &[ConversationTurn],
    ) -> Answer {
        let context = self.clamp_context(context);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt(&context)));
        for turn in history {
            messages.push(match turn.role {
                TurnRole::User => ChatMessage::user(turn.text.clone()),
                TurnRole::Assistant => ChatMessage::assistant(turn.text.clone()),
            });
        }
        messages.push(ChatMessage::user(query));

        let request = GenerationRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: None,
        };

        match self.backend.generate(&request).await {
            Ok(text) if !text.trim().is_empty() => Answer {
                text: text.trim().to_string(),
                degraded: false,
            },
            Ok(_) => {
                warn!(role = %self.role, "upstream returned empty content");
                Answer {
                    text: EMPTY_REPLY_FALLBACK.to_string(),
                    degraded: true,
                }
            }
            Err(e) => {
                warn!(role = %self.role, error = %e, "generation failed, returning fallback");
                Answer {
                    text: fallback_answer(self.role),
                    degraded: true,
                }
            }
        }
    }

    fn instructions(&self) -> &'static str {
        match self.role {
            SupportRole::Billing => {
                "You are a billing support specialist. Help customers with:\n\
                 - Invoice questions\n\
                 - Pricing information\n\
                 - Payment and refund inquiries\n\
                 - Billing policies\n\n\
                 Cached policy text in the reference material is authoritative for policy terms; \
                 current billing data reflects the latest records.\n\
                 Always include all relevant details in your final response.\n\
                 Be friendly, professional, and clear in your explanations."
            }
            SupportRole::Technical => {
                "You are a technical support specialist. Help customers with:\n\
                 - Troubleshooting technical issues\n\
                 - Feature explanations and how-to guides\n\
                 - Bug reports and known issues\n\
                 - Technical questions about the product\n\n\
                 Provide clear, step-by-step solutions.\n\
                 Include all relevant technical details in your final response.\n\
                 Be patient, thorough, and technical when needed, but explain things clearly."
            }
            SupportRole::Policy => {
                "You are a policy and compliance specialist. Help customers understand:\n\
                 - Terms of Service\n\
                 - Privacy Policy\n\
                 - Data handling practices\n\
                 - Compliance requirements\n\n\
                 Always cite the specific policy section when answering.\n\
                 Be precise and quote relevant sections directly.\n\
                 If a customer's question is not covered by the policies, say so clearly."
            }
        }
    }

    fn system_prompt(&self, context: &str) -> String {
        if context.is_empty() {
            format!(
                "{}\n\nNo reference material was found for this query. Answer from general \
                 product knowledge only if certain; otherwise say you do not have that information.",
                self.instructions()
            )
        } else {
            format!(
                "{}\n\nUse the reference material below to answer. If it does not cover the \
                 question, say you do not have that information rather than guessing.\n\n{}",
                self.instructions(),
                context
            )
        }
    }

    /// Bound the context to the configured token budget before prompting
    fn clamp_context(&self, context: &str) -> String {
        let tokens = self.bpe.encode_with_special_tokens(context);
        if tokens.len() <= self.max_context_tokens {
            return context.to_string();
        }

        warn!(
            role = %self.role,
            tokens = tokens.len(),
            budget = self.max_context_tokens,
            "clamping oversized context"
        );

        match self.bpe.decode(tokens[..self.max_context_tokens].to_vec()) {
            Ok(clamped) => clamped,
            Err(_) => context.chars().take(self.max_context_tokens * 4).collect(),
        }
    }
}

fn default_temperature(role: SupportRole) -> f32 {
    match role {
        // slightly creative for explanations, deterministic for policy text
        SupportRole::Billing | SupportRole::Technical => 0.1,
        SupportRole::Policy => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::generation::GenerationError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    enum Script {
        Reply(&'static str),
        Blank,
        Fail,
    }

    struct ScriptedBackend {
        script: Script,
        captured: Mutex<Option<GenerationRequest>>,
    }

    impl ScriptedBackend {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                captured: Mutex::new(None),
            })
        }

        fn captured(&self) -> GenerationRequest {
            self.captured.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> std::result::Result<String, GenerationError> {
            *self.captured.lock().unwrap() = Some(request.clone());
            match self.script {
                Script::Reply(text) => Ok(text.to_string()),
                Script::Blank => Ok("   \n".to_string()),
                Script::Fail => Err(GenerationError::Timeout(30_000)),
            }
        }
    }

    fn responder(role: SupportRole, backend: Arc<ScriptedBackend>) -> Responder {
        Responder::new(role, backend, &ModelConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_respond_builds_prompt_with_context_and_history() {
        let backend = ScriptedBackend::new(Script::Reply("Your invoice total is $49."));
        let agent = responder(SupportRole::Billing, backend.clone());

        let history = vec![
            ConversationTurn::new(TurnRole::User, "hi"),
            ConversationTurn::new(TurnRole::Assistant, "hello, how can I help?"),
        ];

        let answer = agent
            .respond("what do I owe?", "CURRENT BILLING DATA:\nInvoice #1001", &history)
            .await;

        assert!(!answer.degraded);
        assert_eq!(answer.text, "Your invoice total is $49.");

        let request = backend.captured();
        assert_eq!(request.model, "gpt-4o");
        assert!((request.temperature - 0.1).abs() < f32::EPSILON);

        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].role, "system");
        assert!(request.messages[0].content.contains("billing support specialist"));
        assert!(request.messages[0].content.contains("Invoice #1001"));
        assert_eq!(request.messages[1].role, "user");
        assert_eq!(request.messages[2].role, "assistant");
        assert_eq!(request.messages[3].content, "what do I owe?");
    }

    #[tokio::test]
    async fn test_empty_context_changes_framing() {
        let backend = ScriptedBackend::new(Script::Reply("ok"));
        let agent = responder(SupportRole::Technical, backend.clone());

        agent.respond("help", "", &[]).await;

        let request = backend.captured();
        assert!(request.messages[0]
            .content
            .contains("No reference material was found"));
    }

    #[tokio::test]
    async fn test_generation_failure_degrades_to_role_fallback() {
        let backend = ScriptedBackend::new(Script::Fail);
        let agent = responder(SupportRole::Technical, backend);

        let answer = agent.respond("my app crashes", "", &[]).await;

        assert!(answer.degraded);
        assert_eq!(answer.text, fallback_answer(SupportRole::Technical));
        assert!(answer.text.contains("technical question"));
    }

    #[tokio::test]
    async fn test_blank_reply_degrades_to_generic_apology() {
        let backend = ScriptedBackend::new(Script::Blank);
        let agent = responder(SupportRole::Policy, backend);

        let answer = agent.respond("privacy?", "PRIVACY POLICY:\n...", &[]).await;

        assert!(answer.degraded);
        assert_eq!(answer.text, EMPTY_REPLY_FALLBACK);
    }

    #[tokio::test]
    async fn test_policy_uses_cheap_deterministic_profile() {
        let backend = ScriptedBackend::new(Script::Reply("ok"));
        let agent = responder(SupportRole::Policy, backend.clone());

        agent.respond("terms?", "", &[]).await;

        let request = backend.captured();
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.temperature, 0.0);
    }

    #[test]
    fn test_clamp_context_respects_budget() {
        let backend = ScriptedBackend::new(Script::Reply("ok"));
        let mut config = ModelConfig::default();
        config.max_context_tokens = 10;
        let agent = Responder::new(SupportRole::Technical, backend, &config).unwrap();

        let long = "troubleshooting network connectivity issues ".repeat(50);
        let clamped = agent.clamp_context(&long);

        let count = agent.bpe.encode_with_special_tokens(&clamped).len();
        assert!(count <= 10, "clamped to {} tokens", count);

        let short = "just a few tokens";
        assert_eq!(agent.clamp_context(short), short);
    }
}
