//! Answer synthesis.
//!
//! Builds the final prompt from the question, the bounded conversation window,
//! the ranked agreement passages and the response policy, then makes the one
//! answer-generating completion call of the request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::history::{format_turns, recent_turns};
use super::response_policy::ResponsePolicy;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::llm::{estimate_tokens, CompletionError, CompletionProvider, ResponseFormat};
use crate::text::truncate_chars;
use crate::types::{AgreementId, Classification, Intent, RankedContext, Turn};

pub const NO_PROVISIONS_ANSWER: &str = "Je n'ai trouvé aucune disposition correspondant à votre question dans les textes de cette convention collective. Vous pouvez reformuler votre question ou consulter directement le texte sur Légifrance.";

pub const CLARIFICATION_ANSWER: &str = "Je n'ai pas pu identifier la convention collective concernée. Pouvez-vous préciser son nom exact ou son numéro IDCC (4 chiffres, indiqué sur votre bulletin de paie) ?";

const GENERAL_PERSONA: &str = "Tu es un assistant spécialisé dans le droit du travail français et les conventions collectives nationales (CCN). Tu réponds en français, avec précision et sans inventer de références.";

const CONTEXT_RULES: &str = "Règles :
- Appuie-toi UNIQUEMENT sur les extraits fournis ci-dessous.
- Les extraits sont classés par autorité juridique décroissante. En cas de contradiction, le texte de rang le plus élevé prévaut (un arrêté ou un avenant l'emporte sur le texte de base, une annexe n'a qu'une valeur indicative).
- Cite la source de chaque règle sous la forme [n].
- Si les extraits ne permettent pas de répondre, dis-le clairement.";

pub struct AnswerSynthesizer {
    llm: Arc<dyn CompletionProvider>,
    history_turns: usize,
    max_passage_chars: usize,
    timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn CompletionProvider>, config: &EngineConfig) -> Self {
        Self {
            llm,
            history_turns: config.synthesis.history_turns,
            max_passage_chars: config.retrieval.max_passage_chars,
            timeout: config.synthesis.timeout(),
        }
    }

    /// Pick the answer path for a classification: a general reply, a
    /// clarification request when no agreement was identified, or an answer
    /// grounded in `context`.
    pub async fn synthesize(
        &self,
        question: &str,
        history: &[Turn],
        classification: &Classification,
        context: &RankedContext,
        policy: &ResponsePolicy,
    ) -> Result<String, EngineError> {
        match (classification.intent, &classification.agreement_id) {
            (Intent::GeneralQuestion, _) => self.answer_general(question, history, policy).await,
            (intent, None) => {
                tracing::info!(intent = ?intent, "Agreement not identified, asking for clarification");
                Ok(CLARIFICATION_ANSWER.to_string())
            }
            (_, Some(agreement)) => {
                self.answer_with_context(question, history, agreement, context, policy)
                    .await
            }
        }
    }

    /// Answer without agreement passages: greetings, meta and general questions.
    pub async fn answer_general(
        &self,
        question: &str,
        history: &[Turn],
        policy: &ResponsePolicy,
    ) -> Result<String, EngineError> {
        let prompt = self.build_general_prompt(question, history, policy);
        self.generate(&prompt, policy).await
    }

    /// Answer from the ranked passages of one agreement. An empty context
    /// yields the fixed no-provisions answer without calling the model.
    pub async fn answer_with_context(
        &self,
        question: &str,
        history: &[Turn],
        agreement: &AgreementId,
        context: &RankedContext,
        policy: &ResponsePolicy,
    ) -> Result<String, EngineError> {
        if context.is_empty() {
            tracing::info!(idcc = %agreement, "No passages retrieved, skipping synthesis");
            return Ok(NO_PROVISIONS_ANSWER.to_string());
        }
        let prompt = self.build_context_prompt(question, history, agreement, context, policy);
        self.generate(&prompt, policy).await
    }

    fn build_general_prompt(&self, question: &str, history: &[Turn], policy: &ResponsePolicy) -> String {
        let now = chrono::Local::now();
        let mut parts = Vec::with_capacity(5);
        parts.push(GENERAL_PERSONA.to_string());
        parts.push(format!(
            "Date et heure actuelles : {}",
            now.format("%d/%m/%Y %H:%M")
        ));
        parts.push("Si la question porte sur une convention collective précise sans l'identifier, invite l'utilisateur à indiquer son numéro IDCC.".to_string());
        self.push_history(&mut parts, history);
        parts.push(format!("Question : {}", question.trim()));
        parts.push(policy.instruction.to_string());
        parts.join("\n\n")
    }

    fn build_context_prompt(
        &self,
        question: &str,
        history: &[Turn],
        agreement: &AgreementId,
        context: &RankedContext,
        policy: &ResponsePolicy,
    ) -> String {
        let extracts = context
            .iter()
            .enumerate()
            .map(|(i, p)| {
                format!(
                    "[{}] {} | {}\n{}",
                    i + 1,
                    p.tier_label,
                    p.passage.source_label,
                    truncate_chars(p.passage.text.trim(), self.max_passage_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut parts = Vec::with_capacity(6);
        parts.push(GENERAL_PERSONA.to_string());
        parts.push(format!("Convention collective : IDCC {}", agreement));
        parts.push(CONTEXT_RULES.to_string());
        parts.push(format!("Extraits :\n{}", extracts));
        self.push_history(&mut parts, history);
        parts.push(format!("Question : {}", question.trim()));
        parts.push(policy.instruction.to_string());
        parts.join("\n\n")
    }

    fn push_history(&self, parts: &mut Vec<String>, history: &[Turn]) {
        let transcript = format_turns(recent_turns(history, self.history_turns));
        if !transcript.is_empty() {
            parts.push(format!("Conversation précédente :\n{}", transcript));
        }
    }

    async fn generate(&self, prompt: &str, policy: &ResponsePolicy) -> Result<String, EngineError> {
        let start = Instant::now();
        let answer = tokio::time::timeout(
            self.timeout,
            self.llm.complete(prompt, policy.max_tokens, ResponseFormat::Text),
        )
        .await
        .map_err(|_| EngineError::Synthesis(CompletionError::Timeout(self.timeout)))?
        .map_err(EngineError::Synthesis)?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(EngineError::Synthesis(CompletionError::MalformedBody(
                "empty answer".to_string(),
            )));
        }

        tracing::info!(
            length = ?policy.length,
            prompt_tokens = estimate_tokens(prompt),
            completion_tokens = estimate_tokens(answer),
            latency_ms = start.elapsed().as_millis() as u64,
            "Answer synthesized"
        );
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderInfo;
    use crate::reranking::rank_passages;
    use crate::types::{Passage, ResponseLength};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, usize)>>,
        reply: String,
    }

    #[async_trait]
    impl CompletionProvider for Recording {
        async fn complete(
            &self,
            prompt: &str,
            max_tokens: usize,
            format: ResponseFormat,
        ) -> Result<String, CompletionError> {
            assert_eq!(format, ResponseFormat::Text);
            self.calls.lock().push((prompt.to_string(), max_tokens));
            Ok(self.reply.clone())
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                name: "recording".into(),
                model: "test".into(),
                supports_json_mode: false,
            }
        }
    }

    fn recording(reply: &str) -> Arc<Recording> {
        Arc::new(Recording {
            calls: Mutex::new(Vec::new()),
            reply: reply.to_string(),
        })
    }

    fn id() -> AgreementId {
        AgreementId::parse("1979").unwrap()
    }

    fn passage(pid: &str, doc_type: &str, text: &str) -> Passage {
        Passage {
            id: pid.into(),
            agreement_id: id(),
            document_type: doc_type.into(),
            text: text.into(),
            relevance_score: 0.5,
            source_label: format!("Source {}", pid),
        }
    }

    #[tokio::test]
    async fn test_empty_context_skips_model() {
        let llm = recording("unused");
        let synth = AnswerSynthesizer::new(llm.clone(), &EngineConfig::default());
        let answer = synth
            .answer_with_context("préavis ?", &[], &id(), &RankedContext::empty(), &ResponsePolicy::default())
            .await
            .unwrap();
        assert_eq!(answer, NO_PROVISIONS_ANSWER);
        assert!(llm.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_context_prompt_lists_passages_in_rank_order() {
        let llm = recording("  Le préavis est de 8 jours [1].  ");
        let synth = AnswerSynthesizer::new(llm.clone(), &EngineConfig::default());
        let ctx = rank_passages(vec![
            passage("a", "ANNEXE", "Annexe sur le préavis"),
            passage("b", "ARRETE", "Arrêté sur le préavis"),
        ]);
        let policy = ResponsePolicy::select(Some(ResponseLength::Short));
        let answer = synth
            .answer_with_context("Quel préavis ?", &[Turn::user("bonjour")], &id(), &ctx, &policy)
            .await
            .unwrap();
        assert_eq!(answer, "Le préavis est de 8 jours [1].");

        let calls = llm.calls.lock();
        let (prompt, max_tokens) = &calls[0];
        assert_eq!(*max_tokens, 500);
        assert!(prompt.contains("IDCC 1979"));
        assert!(prompt.contains("2-3 phrases"));
        assert!(prompt.contains("user: bonjour"));
        let arrete = prompt.find("[1] Arrêté (force obligatoire) | Source b").unwrap();
        let annexe = prompt.find("[2] Annexe (valeur indicative) | Source a").unwrap();
        assert!(arrete < annexe);
    }

    #[tokio::test]
    async fn test_long_passages_are_truncated() {
        let llm = recording("ok");
        let mut config = EngineConfig::default();
        config.retrieval.max_passage_chars = 100;
        let synth = AnswerSynthesizer::new(llm.clone(), &config);
        let ctx = rank_passages(vec![passage("a", "AVENANT", &"x".repeat(500))]);
        synth
            .answer_with_context("q", &[], &id(), &ctx, &ResponsePolicy::default())
            .await
            .unwrap();
        let prompt = &llm.calls.lock()[0].0;
        assert!(prompt.contains(&format!("{}…", "x".repeat(100))));
        assert!(!prompt.contains(&"x".repeat(101)));
    }

    #[tokio::test]
    async fn test_general_prompt_carries_current_date() {
        let llm = recording("Bonjour !");
        let synth = AnswerSynthesizer::new(llm.clone(), &EngineConfig::default());
        let answer = synth
            .answer_general("bonjour", &[], &ResponsePolicy::default())
            .await
            .unwrap();
        assert_eq!(answer, "Bonjour !");
        let calls = llm.calls.lock();
        let today = chrono::Local::now().format("%d/%m/%Y").to_string();
        assert!(calls[0].0.contains(&today));
        assert_eq!(calls[0].1, 1500);
    }

    #[tokio::test]
    async fn test_synthesize_dispatches_on_classification() {
        let llm = recording("ok");
        let synth = AnswerSynthesizer::new(llm.clone(), &EngineConfig::default());
        let policy = ResponsePolicy::default();

        let unresolved = Classification::new(Intent::IdccIdentification, None, Some("x".into()), 0.4);
        let answer = synth
            .synthesize("q", &[], &unresolved, &RankedContext::empty(), &policy)
            .await
            .unwrap();
        assert_eq!(answer, CLARIFICATION_ANSWER);

        let scoped = Classification::ccn_search(id(), 0.9);
        let answer = synth
            .synthesize("q", &[], &scoped, &RankedContext::empty(), &policy)
            .await
            .unwrap();
        assert_eq!(answer, NO_PROVISIONS_ANSWER);
        assert!(llm.calls.lock().is_empty());

        synth
            .synthesize("q", &[], &Classification::general(1.0), &RankedContext::empty(), &policy)
            .await
            .unwrap();
        assert_eq!(llm.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_answer_is_an_error() {
        let synth = AnswerSynthesizer::new(recording("   "), &EngineConfig::default());
        let err = synth
            .answer_general("bonjour", &[], &ResponsePolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "synthesis_error");
    }
}
