//! Query pipeline stages - classification, agreement resolution, answer synthesis

pub mod agreement_resolver;
pub mod classifier;
pub mod history;
pub mod llm_classifier;
pub mod pre_detector;
pub mod response_policy;
pub mod synthesizer;

// Re-export commonly used types
pub use agreement_resolver::AgreementResolver;
pub use classifier::{
    ChainOutcome, ClassificationRequest, ClassificationStage, ClassifierChain,
    ExplicitAgreementStage,
};
pub use llm_classifier::LlmClassifier;
pub use pre_detector::PreDetector;
pub use response_policy::ResponsePolicy;
pub use synthesizer::{AnswerSynthesizer, CLARIFICATION_ANSWER, NO_PROVISIONS_ANSWER};
