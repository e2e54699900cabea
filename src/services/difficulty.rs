use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::services::classifier::{Classification, Classifier};
use crate::services::error::EngineError;
use crate::services::tokenizer::tokenize;

pub const MAX_TEXT_CHARS: usize = 50_000;
const UNKNOWN_WORDS_PREVIEW: usize = 20;
const SUGGESTION_LIMIT: usize = 10;
const READING_WORDS_PER_MINUTE: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyLabel {
    EasyReady,
    Comfortable,
    Challenging,
    Hard,
}

impl DifficultyLabel {
    pub fn from_unknown_percentage(unknown_percentage: f64) -> Self {
        if unknown_percentage <= 10.0 {
            Self::EasyReady
        } else if unknown_percentage <= 30.0 {
            Self::Comfortable
        } else if unknown_percentage <= 50.0 {
            Self::Challenging
        } else {
            Self::Hard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EasyReady => "easy/ready",
            Self::Comfortable => "comfortable",
            Self::Challenging => "challenging",
            Self::Hard => "hard",
        }
    }
}

impl Serialize for DifficultyLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStatistics {
    pub word_count: usize,
    pub sentence_count: usize,
    pub paragraph_count: usize,
    pub average_word_length: f64,
    pub average_sentence_length: f64,
    pub reading_time_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnalysis {
    pub words: BTreeMap<String, bool>,
    pub total_unique_words: usize,
    pub known_count: usize,
    pub unknown_count: usize,
    pub ignored_count: usize,
    pub known_percentage: f64,
    pub unknown_percentage: f64,
    pub difficulty_label: DifficultyLabel,
    pub unknown_words: Vec<String>,
    /// Grammar patterns found in the text; `true` = known.
    pub patterns: BTreeMap<String, bool>,
    pub statistics: TextStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSuggestion {
    pub word: String,
    pub frequency: usize,
    pub priority: usize,
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Pure measurement over a classification. Percentages are over counted
/// (non-ignored) unique words and always sum to exactly 100 when any word counts.
pub fn measure(classification: &Classification, text: &str) -> TextAnalysis {
    let known_count = classification.known_count();
    let unknown_count = classification.unknown_count();
    let total = known_count + unknown_count;

    let (known_percentage, unknown_percentage) = if total == 0 {
        (0.0, 0.0)
    } else {
        let unknown = round1(unknown_count as f64 / total as f64 * 100.0);
        (round1(100.0 - unknown), unknown)
    };

    TextAnalysis {
        words: classification.words.clone(),
        total_unique_words: total,
        known_count,
        unknown_count,
        ignored_count: classification.ignored.len(),
        known_percentage,
        unknown_percentage,
        difficulty_label: DifficultyLabel::from_unknown_percentage(unknown_percentage),
        unknown_words: classification
            .unknown_words()
            .take(UNKNOWN_WORDS_PREVIEW)
            .map(str::to_string)
            .collect(),
        patterns: classification.patterns.clone(),
        statistics: text_statistics(text),
    }
}

pub fn text_statistics(text: &str) -> TextStatistics {
    let tokens = tokenize(text);
    let word_count = tokens.len();
    if word_count == 0 {
        return TextStatistics::default();
    }

    let sentence_count = text
        .split(['.', '!', '?'])
        .filter(|segment| segment.chars().any(char::is_alphabetic))
        .count()
        .max(1);
    let paragraph_count = text
        .split("\n\n")
        .filter(|p| p.chars().any(char::is_alphabetic))
        .count()
        .max(1);
    let letters: usize = tokens.iter().map(|t| t.chars().filter(|c| *c != '\'').count()).sum();

    TextStatistics {
        word_count,
        sentence_count,
        paragraph_count,
        average_word_length: round1(letters as f64 / word_count as f64),
        average_sentence_length: round1(word_count as f64 / sentence_count as f64),
        reading_time_minutes: round1(word_count as f64 / READING_WORDS_PER_MINUTE),
    }
}

/// Unknown words worth learning first: frequent and short ones rank highest.
pub fn rank_suggestions(classification: &Classification, text: &str) -> Vec<LearningSuggestion> {
    let mut frequency: HashMap<String, usize> = HashMap::new();
    for token in tokenize(text) {
        *frequency.entry(token).or_insert(0) += 1;
    }

    let mut suggestions: Vec<LearningSuggestion> = classification
        .unknown_words()
        .map(|word| {
            let count = frequency.get(word).copied().unwrap_or(1);
            let length = word.chars().count().min(10);
            LearningSuggestion {
                word: word.to_string(),
                frequency: count,
                priority: count * (10 - length),
            }
        })
        .collect();

    suggestions.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.word.cmp(&b.word)));
    suggestions.truncate(SUGGESTION_LIMIT);
    suggestions
}

pub(crate) fn validate_text(text: &str) -> Result<(), EngineError> {
    if text.trim().is_empty() {
        return Err(EngineError::validation("text must not be empty"));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(EngineError::validation(format!(
            "text exceeds {MAX_TEXT_CHARS} characters"
        )));
    }
    Ok(())
}

pub struct DifficultyAnalyzer {
    classifier: Arc<Classifier>,
}

impl DifficultyAnalyzer {
    pub fn new(classifier: Arc<Classifier>) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub async fn analyze(&self, text: &str, learner_id: &str) -> Result<TextAnalysis, EngineError> {
        validate_text(text)?;
        let classification = self.classifier.classify(text, learner_id).await?;
        if classification.words.is_empty() && classification.ignored.is_empty() {
            return Err(EngineError::validation("text contains no words"));
        }
        Ok(measure(&classification, text))
    }

    /// Measures a generated candidate; word-less text yields an empty analysis instead of an error.
    pub async fn measure_candidate(&self, text: &str, learner_id: &str) -> Result<TextAnalysis, EngineError> {
        let classification = self.classifier.classify(text, learner_id).await?;
        Ok(measure(&classification, text))
    }

    pub async fn suggestions(
        &self,
        text: &str,
        learner_id: &str,
    ) -> Result<Vec<LearningSuggestion>, EngineError> {
        validate_text(text)?;
        let classification = self.classifier.classify(text, learner_id).await?;
        Ok(rank_suggestions(&classification, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification(known: usize, unknown: usize) -> (Classification, String) {
        let mut c = Classification::default();
        let mut words = Vec::new();
        for i in 0..known + unknown {
            let word = format!("w{}", letters(i));
            c.words.insert(word.clone(), i < known);
            c.order.push(word.clone());
            words.push(word);
        }
        (c, words.join(" "))
    }

    fn letters(mut n: usize) -> String {
        let mut s = String::new();
        loop {
            s.push((b'a' + (n % 26) as u8) as char);
            n /= 26;
            if n == 0 {
                return s;
            }
        }
    }

    #[test]
    fn nothing_known_is_hard() {
        let (c, text) = classification(0, 50);
        let analysis = measure(&c, &text);
        assert_eq!(analysis.unknown_percentage, 100.0);
        assert_eq!(analysis.known_percentage, 0.0);
        assert_eq!(analysis.difficulty_label, DifficultyLabel::Hard);
    }

    #[test]
    fn patterns_are_reported_without_touching_percentages() {
        let (mut c, text) = classification(1, 1);
        c.patterns.insert("past_continuous".to_string(), false);
        let analysis = measure(&c, &text);
        assert_eq!(analysis.patterns.get("past_continuous"), Some(&false));
        assert_eq!(analysis.unknown_percentage, 50.0);
    }

    #[test]
    fn forty_five_of_fifty_is_easy() {
        let (c, text) = classification(45, 5);
        let analysis = measure(&c, &text);
        assert_eq!(analysis.unknown_percentage, 10.0);
        assert_eq!(analysis.known_percentage, 90.0);
        assert_eq!(analysis.difficulty_label, DifficultyLabel::EasyReady);
    }

    #[test]
    fn label_boundaries() {
        assert_eq!(DifficultyLabel::from_unknown_percentage(10.0), DifficultyLabel::EasyReady);
        assert_eq!(DifficultyLabel::from_unknown_percentage(10.1), DifficultyLabel::Comfortable);
        assert_eq!(DifficultyLabel::from_unknown_percentage(30.0), DifficultyLabel::Comfortable);
        assert_eq!(DifficultyLabel::from_unknown_percentage(50.0), DifficultyLabel::Challenging);
        assert_eq!(DifficultyLabel::from_unknown_percentage(50.1), DifficultyLabel::Hard);
        assert_eq!(serde_json::to_value(DifficultyLabel::EasyReady).unwrap(), "easy/ready");
    }

    #[test]
    fn percentages_sum_to_one_hundred_for_thirds() {
        let (c, text) = classification(1, 2);
        let analysis = measure(&c, &text);
        assert_eq!(analysis.unknown_percentage, 66.7);
        assert!((analysis.known_percentage + analysis.unknown_percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn statistics() {
        let stats = text_statistics("One two three. Four five!\n\nSix seven eight nine ten?");
        assert_eq!(stats.word_count, 10);
        assert_eq!(stats.sentence_count, 3);
        assert_eq!(stats.paragraph_count, 2);
        assert_eq!(stats.reading_time_minutes, 0.1);
        assert_eq!(text_statistics("  ...  "), TextStatistics::default());
    }

    #[test]
    fn suggestions_prefer_frequent_short_words() {
        let mut c = Classification::default();
        for (word, known) in [("cat", false), ("extraordinary", false), ("dog", false), ("sun", true)] {
            c.words.insert(word.to_string(), known);
            c.order.push(word.to_string());
        }
        let ranked = rank_suggestions(&c, "cat cat dog extraordinary sun");
        let words: Vec<_> = ranked.iter().map(|s| s.word.as_str()).collect();
        assert_eq!(words, vec!["cat", "dog", "extraordinary"]);
        assert_eq!(ranked[0].priority, 14);
        assert_eq!(ranked[2].priority, 0);
    }
}
