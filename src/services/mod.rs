pub mod adaptation;
pub mod classifier;
pub mod difficulty;
pub mod error;
pub mod explanation;
pub mod grammar_catalog;
pub mod knowledge;
pub mod level;
pub mod llm_provider;
pub mod pattern_detector;
pub mod tokenizer;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::DatabaseProxy;

pub use error::EngineError;

use adaptation::{AdaptationEngine, AdaptationResult};
use classifier::Classifier;
use difficulty::{DifficultyAnalyzer, TextAnalysis};
use explanation::{Explanation, ExplanationCache};
use knowledge::{GrammarMark, KnowledgeStore, VocabularyMark};
use level::{LevelEngine, LevelSnapshot};
use llm_provider::TextGenerator;

/// Every exposed operation of the proficiency engine, wired over one store
/// and one generator.
pub struct Engine {
    knowledge: Arc<KnowledgeStore>,
    analyzer: Arc<DifficultyAnalyzer>,
    levels: Arc<LevelEngine>,
    explanations: Arc<ExplanationCache>,
    adaptation: Arc<AdaptationEngine>,
}

impl Engine {
    pub fn new(proxy: Arc<DatabaseProxy>, generator: Arc<dyn TextGenerator>, config: &EngineConfig) -> Self {
        let knowledge = Arc::new(KnowledgeStore::new(Arc::clone(&proxy)));
        let classifier = Arc::new(Classifier::new(Arc::clone(&knowledge), config.classifier));
        let analyzer = Arc::new(DifficultyAnalyzer::new(classifier));
        let levels = Arc::new(LevelEngine::new(Arc::clone(&knowledge), config.level.clone()));
        let explanations = Arc::new(ExplanationCache::new(
            proxy,
            Arc::clone(&generator),
            config.explanation.clone(),
        ));
        let adaptation = Arc::new(AdaptationEngine::new(
            Arc::clone(&analyzer),
            Arc::clone(&knowledge),
            Arc::clone(&levels),
            generator,
            config.adaptation.clone(),
        ));

        Self {
            knowledge,
            analyzer,
            levels,
            explanations,
            adaptation,
        }
    }

    pub async fn classify_text(&self, learner_id: &str, text: &str) -> Result<TextAnalysis, EngineError> {
        self.analyzer.analyze(text, learner_id).await
    }

    pub async fn get_level(&self, learner_id: &str) -> Result<LevelSnapshot, EngineError> {
        self.levels.snapshot(learner_id).await
    }

    pub async fn mark_vocabulary(
        &self,
        learner_id: &str,
        word: &str,
        status: &str,
        translation: Option<&str>,
    ) -> Result<VocabularyMark, EngineError> {
        self.knowledge.mark_vocabulary(learner_id, word, status, translation).await
    }

    pub async fn mark_grammar(
        &self,
        learner_id: &str,
        pattern_id: &str,
        status: &str,
    ) -> Result<GrammarMark, EngineError> {
        self.knowledge.mark_grammar(learner_id, pattern_id, status).await
    }

    pub async fn adapt_text(
        &self,
        learner_id: &str,
        text: &str,
        target_unknown_percentage: Option<f64>,
    ) -> Result<AdaptationResult, EngineError> {
        self.adaptation.adapt(text, learner_id, target_unknown_percentage).await
    }

    pub async fn get_explanation(&self, word: &str) -> Result<Explanation, EngineError> {
        self.explanations.get(word).await
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeStore> {
        &self.knowledge
    }

    pub fn analyzer(&self) -> &Arc<DifficultyAnalyzer> {
        &self.analyzer
    }

    pub fn explanations(&self) -> &Arc<ExplanationCache> {
        &self.explanations
    }

    pub fn adaptation(&self) -> &Arc<AdaptationEngine> {
        &self.adaptation
    }
}
