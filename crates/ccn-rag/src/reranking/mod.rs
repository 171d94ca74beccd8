pub mod legal_hierarchy;

pub use legal_hierarchy::{rank_passages, tier_label, DocumentTypeTag};
