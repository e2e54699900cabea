use serde::{Deserialize, Serialize};

/// Bumped whenever pattern ids are added, removed or moved between tiers.
pub const CATALOG_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    pub const ALL: [CefrLevel; 6] = [
        CefrLevel::A1,
        CefrLevel::A2,
        CefrLevel::B1,
        CefrLevel::B2,
        CefrLevel::C1,
        CefrLevel::C2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
            Self::C2 => "C2",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(value.trim()))
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn next(&self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }
}

impl std::fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarPattern {
    pub id: &'static str,
    pub name: &'static str,
    pub level: CefrLevel,
    pub example: &'static str,
}

const fn pattern(
    id: &'static str,
    name: &'static str,
    level: CefrLevel,
    example: &'static str,
) -> GrammarPattern {
    GrammarPattern {
        id,
        name,
        level,
        example,
    }
}

use CefrLevel::{A1, A2, B1, B2, C1, C2};

static CATALOG: &[GrammarPattern] = &[
    pattern("present_simple", "Present simple", A1, "She works in a bank."),
    pattern("present_continuous", "Present continuous", A1, "They are playing outside."),
    pattern("basic_questions", "Basic questions", A1, "Do you like coffee?"),
    pattern("basic_negatives", "Basic negatives", A1, "I don't eat meat."),
    pattern("articles", "Articles", A1, "A cat sat on the mat."),
    pattern("prepositions_place", "Prepositions of place", A1, "The book is on the table."),
    pattern("past_simple", "Past simple", A2, "We visited Rome last year."),
    pattern("future_will", "Future with will", A2, "It will rain tomorrow."),
    pattern("future_going_to", "Future with going to", A2, "I'm going to call her."),
    pattern("basic_comparatives", "Comparatives", A2, "This road is longer than that one."),
    pattern("basic_modals", "Basic modals", A2, "You can sit here."),
    pattern("time_expressions", "Time expressions", A2, "I usually wake up early."),
    pattern("prepositions_time", "Prepositions of time", A2, "The shop opens at nine."),
    pattern("question_formation", "Wh- questions", A2, "Where did you go?"),
    pattern("present_perfect", "Present perfect", B1, "I have lived here for years."),
    pattern(
        "present_perfect_continuous",
        "Present perfect continuous",
        B1,
        "She has been studying all day.",
    ),
    pattern("conditionals_type1", "First conditional", B1, "If it rains, we will stay home."),
    pattern("passive_voice_simple", "Simple passive", B1, "The letter was sent yesterday."),
    pattern("relative_clauses_basic", "Defining relative clauses", B1, "The man who called is here."),
    pattern("modal_verbs_basic", "Modals of obligation", B1, "You must wear a helmet."),
    pattern("gerunds_infinitives", "Gerunds and infinitives", B1, "I enjoy reading and want to travel."),
    pattern("adjective_intensifiers", "Intensifiers", B1, "The film was really exciting."),
    pattern("past_perfect", "Past perfect", B2, "The train had left when we arrived."),
    pattern("past_continuous", "Past continuous", B2, "I was cooking when you called."),
    pattern("future_continuous", "Future continuous", B2, "This time tomorrow I'll be flying."),
    pattern("conditionals_type2", "Second conditional", B2, "If I had time, I would help."),
    pattern("passive_voice_advanced", "Passive with modals", B2, "The work must be finished today."),
    pattern("passive_voice_perfect", "Perfect passive", B2, "The bridge has been repaired."),
    pattern("reported_speech", "Reported speech", B2, "She said she was tired."),
    pattern("modal_verbs_advanced", "Modals of deduction", B2, "He might have missed the bus."),
    pattern(
        "relative_clauses_advanced",
        "Non-defining relative clauses",
        B2,
        "My brother, who lives abroad, is visiting.",
    ),
    pattern("superlatives", "Superlatives", B2, "It was the best day of my life."),
    pattern("conditionals_type3", "Third conditional", C1, "If we had known, we would have come."),
    pattern("subjunctive", "Subjunctive", C1, "I suggest that he be present."),
    pattern("advanced_passive", "Impersonal passive", C1, "It is believed that the plan failed."),
    pattern("complex_sentences", "Complex subordination", C1, "Although tired, she kept working."),
    pattern("inversion", "Inversion", C1, "Never have I seen such a thing."),
    pattern("mixed_conditionals", "Mixed conditionals", C2, "If I had studied, I would be a doctor now."),
    pattern("cleft_sentences", "Cleft sentences", C2, "What I need is a holiday."),
    pattern("ellipsis", "Ellipsis and substitution", C2, "She can swim and so can I."),
    pattern(
        "advanced_discourse_markers",
        "Advanced discourse markers",
        C2,
        "Be that as it may, the results stand.",
    ),
];

pub fn catalog() -> &'static [GrammarPattern] {
    CATALOG
}

pub fn find_pattern(id: &str) -> Option<&'static GrammarPattern> {
    let id = id.trim();
    CATALOG.iter().find(|p| p.id == id)
}

pub fn patterns_for(level: CefrLevel) -> impl Iterator<Item = &'static GrammarPattern> {
    CATALOG.iter().filter(move |p| p.level == level)
}

pub fn required_count(level: CefrLevel) -> usize {
    patterns_for(level).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tier_sizes() {
        let sizes: Vec<usize> = CefrLevel::ALL.iter().map(|l| required_count(*l)).collect();
        assert_eq!(sizes, vec![6, 8, 8, 10, 5, 4]);
    }

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = catalog().iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), catalog().len());
    }

    #[test]
    fn level_parsing_and_order() {
        assert_eq!(CefrLevel::parse("b2"), Some(CefrLevel::B2));
        assert_eq!(CefrLevel::parse("D1"), None);
        assert_eq!(CefrLevel::A1.next(), Some(CefrLevel::A2));
        assert_eq!(CefrLevel::C2.next(), None);
        assert!(CefrLevel::A2 < CefrLevel::C1);
    }

    #[test]
    fn lookup() {
        assert_eq!(find_pattern("inversion").map(|p| p.level), Some(CefrLevel::C1));
        assert!(find_pattern("time_travel").is_none());
    }
}
