use std::sync::OnceLock;

use regex::Regex;

use crate::services::grammar_catalog;

/// Surface cues per catalog pattern. A pattern is present when any cue
/// matches. Matching is case-insensitive.
static RULES: &[(&str, &[&str])] = &[
    (
        "present_simple",
        &[
            r"\b(?:he|she|it)\s+(?:works|lives|plays|likes|goes|has|wants|needs|says|knows|makes|gets|eats|reads)\b",
            r"\b(?:i|you|we|they)\s+(?:work|live|play|like|go|have|want|need|know|make|get|eat|read)\b",
        ],
    ),
    (
        "present_continuous",
        &[r"\b(?:am|is|are)\s+\w+ing\b", r"\w['’](?:m|re)\s+\w+ing\b"],
    ),
    (
        "basic_questions",
        &[r"\b(?:do|does|are|is|can)\s+(?:i|you|he|she|it|we|they)\s+\w+[^.!?]*\?"],
    ),
    (
        "basic_negatives",
        &[
            r"\b(?:don|doesn|didn|isn|aren|wasn|weren|can|won)['’]t\b",
            r"\b(?:do|does|did)\s+not\b",
        ],
    ),
    ("articles", &[r"\b(?:a|an|the)\s+\w+"]),
    (
        "prepositions_place",
        &[
            r"\b(?:under|behind|between|opposite|next\s+to|in\s+front\s+of)\s+\w+",
            r"\b(?:on|in|at|under)\s+the\s+(?:table|floor|wall|door|corner|room|house|park|station|street|box|bed|desk|shelf)\b",
        ],
    ),
    (
        "past_simple",
        &[
            r"\b(?:i|you|he|she|it|we|they)\s+\w+ed\b",
            r"\b(?:went|came|saw|made|took|gave|said|told|thought|found|knew|bought|met)\b",
        ],
    ),
    ("future_will", &[r"\b(?:will|shall)\s+(?:not\s+)?\w+", r"\w['’]ll\s+\w+"]),
    (
        "future_going_to",
        &[r"\b(?:am|is|are)\s+going\s+to\s+\w+", r"\w['’](?:m|re|s)\s+going\s+to\s+\w+"],
    ),
    (
        "basic_comparatives",
        &[r"\b\w+er\s+than\b", r"\bmore\s+\w+\s+than\b", r"\bas\s+\w+\s+as\b"],
    ),
    ("basic_modals", &[r"\b(?:can|could)\s+(?:not\s+)?\w+", r"\bcan['’]t\s+\w+"]),
    (
        "time_expressions",
        &[
            r"\b(?:yesterday|tomorrow|usually|always|often|sometimes|never|already)\b",
            r"\b(?:last|next|this)\s+(?:year|month|week|day|night|time|morning|evening)\b",
        ],
    ),
    (
        "prepositions_time",
        &[
            r"\bat\s+(?:\d{1,2}|noon|midnight|night|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)\b",
            r"\bon\s+(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday|the\s+weekend)\b",
            r"\bin\s+(?:the\s+)?(?:morning|afternoon|evening|summer|winter|spring|autumn|\d{4})\b",
        ],
    ),
    (
        "question_formation",
        &[r"\b(?:what|where|when|why|how|who|which)\s+(?:do|does|did|are|is|was|were|will|would|can|could|have|has)\b"],
    ),
    (
        "present_perfect",
        &[
            r"\b(?:have|has)\s+(?:never\s+|already\s+|just\s+|not\s+)?(?:\w+ed|been|gone|done|seen|made|taken|given|known|written|had)\b",
            r"\w['’]ve\s+(?:never\s+|already\s+|just\s+)?(?:\w+ed|been|gone|done|seen)\b",
        ],
    ),
    (
        "present_perfect_continuous",
        &[r"\b(?:have|has)\s+been\s+\w+ing\b", r"\w['’]ve\s+been\s+\w+ing\b"],
    ),
    ("conditionals_type1", &[r"\bif\b[^.!?]*\bwill\b", r"\bif\b[^.!?]*\w['’]ll\b"]),
    (
        "passive_voice_simple",
        &[r"\b(?:am|is|are|was|were)\s+(?:\w+ed|made|taken|given|seen|done|written|spoken|sent|built|sold)\b"],
    ),
    (
        "relative_clauses_basic",
        &[
            r"\b\w+\s+(?:who|which|that)\s+(?:is|are|was|were|has|have|\w+ed|\w+s)\b",
            r"\b(?:whose|whom)\s+\w+",
        ],
    ),
    (
        "modal_verbs_basic",
        &[r"\b(?:must|should|ought\s+to|have\s+to|has\s+to)\s+\w+", r"\b(?:mustn|shouldn)['’]t\s+\w+"],
    ),
    (
        "gerunds_infinitives",
        &[
            r"\b(?:enjoy|enjoys|love|hate|like|avoid|finish|stop|mind)\s+\w+ing\b",
            r"\b(?:want|wants|wanted|need|needs|hope|decide|decided|plan|refuse|agree|promise)\s+to\s+\w+",
        ],
    ),
    (
        "adjective_intensifiers",
        &[r"\b(?:very|really|quite|extremely|incredibly|absolutely|totally|rather)\s+\w+"],
    ),
    (
        "past_perfect",
        &[
            r"\bhad\s+(?:never\s+|already\s+|just\s+)?(?:\w+ed|been|gone|done|seen|made|taken|given|left|known|eaten)\b",
            r"\w['’]d\s+(?:already\s+)?\w+ed\b",
        ],
    ),
    ("past_continuous", &[r"\b(?:was|were)\s+\w+ing\b"]),
    ("future_continuous", &[r"\bwill\s+be\s+\w+ing\b", r"\w['’]ll\s+be\s+\w+ing\b"]),
    ("conditionals_type2", &[r"\bif\b[^.!?]*\b(?:would|could|might)\s+\w+"]),
    (
        "passive_voice_advanced",
        &[r"\b(?:must|can|could|should|will|might|may)\s+be\s+(?:\w+ed|done|made|taken|given|seen|written|built|sent)\b"],
    ),
    (
        "passive_voice_perfect",
        &[r"\b(?:have|has|had)\s+been\s+(?:\w+ed|done|made|taken|given|seen|written|built|sent)\b"],
    ),
    (
        "reported_speech",
        &[r"\b(?:said|told\s+\w+|asked|explained|claimed|replied)\s+(?:that\s+)?(?:i|he|she|it|we|they)\s+(?:was|were|had|would|could)\b"],
    ),
    (
        "modal_verbs_advanced",
        &[
            r"\b(?:might|could|should|must|would)\s+have\s+(?:\w+ed|been|gone|done|seen|made|taken|known)\b",
            r"\b(?:can|couldn)['’]t\s+have\s+\w+",
        ],
    ),
    ("relative_clauses_advanced", &[r",\s*(?:who|which|whose|where)\s+\w+[^.!?]*,"]),
    ("superlatives", &[r"\bthe\s+(?:best|worst|most|least)\s+\w+", r"\bthe\s+\w+est\b"]),
    ("conditionals_type3", &[r"\bif\b[^.!?]*\bhad\s+\w+[^.!?]*\bwould\s+have\b"]),
    (
        "subjunctive",
        &[
            r"\b(?:suggest|suggested|insist|insisted|recommend|recommended|demand|demanded|request|requested)\s+that\s+\w+\s+(?:be|go|have|stay|take|leave)\b",
            r"\bif\s+(?:i|he|she|it)\s+were\b",
        ],
    ),
    (
        "advanced_passive",
        &[
            r"\bit\s+(?:is|was)\s+(?:believed|said|thought|reported|known|expected|claimed)\s+that\b",
            r"\b(?:is|are|was|were)\s+(?:said|believed|thought|reported|known)\s+to\s+(?:be|have)\b",
        ],
    ),
    (
        "complex_sentences",
        &[r"\b(?:although|though|whereas|unless|despite|even\s+though|in\s+spite\s+of|provided\s+that)\b"],
    ),
    (
        "inversion",
        &[
            r"\b(?:never|rarely|seldom|hardly|little)\s+(?:have|has|had|did|do|does|was|is|will|can)\s+(?:i|you|he|she|it|we|they)\b",
            r"\bnot\s+only\s+(?:did|do|does|is|was|has|have|can)\b",
            r"\bno\s+sooner\s+had\b",
        ],
    ),
    (
        "mixed_conditionals",
        &[r"\bif\b[^.!?]*\bhad\s+\w+[^.!?]*\bwould\s+\w+[^.!?]*\b(?:now|today)\b"],
    ),
    (
        "cleft_sentences",
        &[
            r"\bit\s+(?:is|was)\s+\w+\s+(?:who|that)\b",
            r"(?:^|[.!?]\s+)what\s+\w+\s+(?:\w+\s+)?(?:is|was)\b",
        ],
    ),
    (
        "ellipsis",
        &[r"\b(?:so|neither|nor)\s+(?:do|does|did|can|could|will|would|have|has|am|is|are)\s+(?:i|you|he|she|we|they)\b"],
    ),
    (
        "advanced_discourse_markers",
        &[r"\b(?:nevertheless|nonetheless|furthermore|moreover|consequently|notwithstanding|be\s+that\s+as\s+it\s+may|by\s+the\s+same\s+token|in\s+light\s+of)\b"],
    ),
];

fn compiled() -> &'static [(&'static str, Regex)] {
    static COMPILED: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        grammar_catalog::catalog()
            .iter()
            .filter_map(|pattern| {
                let (_, cues) = RULES.iter().find(|(id, _)| *id == pattern.id)?;
                let joined = cues.iter().map(|c| format!("(?:{c})")).collect::<Vec<_>>().join("|");
                match Regex::new(&format!("(?i){joined}")) {
                    Ok(re) => Some((pattern.id, re)),
                    Err(err) => {
                        tracing::error!(pattern = pattern.id, error = %err, "grammar cue failed to compile");
                        None
                    }
                }
            })
            .collect()
    })
}

/// Catalog ids whose cues appear in `text`, in catalog order.
pub fn detect(text: &str) -> Vec<&'static str> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    compiled()
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(id, _)| *id)
        .collect()
}
