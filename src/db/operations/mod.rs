pub mod adaptations;
pub mod explanations;
pub mod grammar;
pub mod vocabulary;
