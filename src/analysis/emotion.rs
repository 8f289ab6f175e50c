//! Emotion classification over keyword patterns.
//!
//! Each label carries a fixed valence/arousal coordinate. The winning label's
//! coordinate is reported as-is so repeated calls on the same text always
//! agree. Crisis indicators are checked on every call, independent of which
//! label wins.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::catalog::PatternCatalog;
use super::error::{AnalysisError, AnalyzerKind};
use super::risk::{RiskLevel, Span};
use super::TextAnalyzer;

/// Extra confidence per additional match of the same label.
pub const REPEAT_MATCH_BONUS: f32 = 0.15;
/// Extra crisis-indicator confidence per other indicator family present.
pub const CORROBORATION_BONUS: f32 = 0.1;
/// Confidence reported for `Neutral` when no label matched.
pub const NEUTRAL_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Sad,
    Lonely,
    Anxious,
    Angry,
    Calm,
    Frustrated,
    Excited,
    Content,
    Happy,
    GriefAdjustment,
    Neutral,
}

impl EmotionLabel {
    /// Catalog order. Also the tie-break order when confidences are equal.
    pub const ALL: [EmotionLabel; 11] = [
        Self::Sad,
        Self::Lonely,
        Self::Anxious,
        Self::Angry,
        Self::Calm,
        Self::Frustrated,
        Self::Excited,
        Self::Content,
        Self::Happy,
        Self::GriefAdjustment,
        Self::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sad => "sad",
            Self::Lonely => "lonely",
            Self::Anxious => "anxious",
            Self::Angry => "angry",
            Self::Calm => "calm",
            Self::Frustrated => "frustrated",
            Self::Excited => "excited",
            Self::Content => "content",
            Self::Happy => "happy",
            Self::GriefAdjustment => "grief_adjustment",
            Self::Neutral => "neutral",
        }
    }

    /// (valence, arousal), both in [-1, 1].
    pub fn coordinates(&self) -> (f32, f32) {
        match self {
            Self::Sad => (-0.6, -0.3),
            Self::Lonely => (-0.5, -0.4),
            Self::Anxious => (-0.5, 0.7),
            Self::Angry => (-0.7, 0.8),
            Self::Calm => (0.4, -0.5),
            Self::Frustrated => (-0.5, 0.5),
            Self::Excited => (0.7, 0.8),
            Self::Content => (0.5, -0.2),
            Self::Happy => (0.8, 0.5),
            Self::GriefAdjustment => (-0.4, -0.2),
            Self::Neutral => (0.0, 0.0),
        }
    }

    /// Confidence for a single match.
    fn specificity(&self) -> f32 {
        match self {
            Self::GriefAdjustment => 0.8,
            Self::Lonely | Self::Angry | Self::Excited => 0.75,
            Self::Sad | Self::Anxious | Self::Calm | Self::Frustrated | Self::Happy => 0.7,
            Self::Content => 0.65,
            Self::Neutral => NEUTRAL_CONFIDENCE,
        }
    }

    fn pattern(&self) -> Option<&'static str> {
        let source = match self {
            Self::Sad => {
                r"(?i)\b(?:sad|sadness|unhappy|depressed|miserable|crying|tears|heartbroken|feeling down|feel down|feeling blue)\b"
            }
            Self::Lonely => {
                r"(?i)\b(?:lonely|loneliness|alone|isolated|nobody visits|no one visits|no one to talk to|nobody to talk to|miss(?:ing)? (?:my )?(?:family|friends|company))\b"
            }
            Self::Anxious => {
                r"(?i)\b(?:anxious|anxiety|worried|worry|worrying|nervous|scared|afraid|panic(?:king)?|uneasy|on edge)\b"
            }
            Self::Angry => r"(?i)\b(?:angry|furious|mad at|hate|annoyed|rage|livid|outraged)\b",
            Self::Calm => r"(?i)\b(?:calm|peaceful|relaxed|serene|at ease|tranquil|rested)\b",
            Self::Frustrated => {
                r"(?i)\b(?:frustrated|frustrating|fed up|sick of|irritated|can't figure|keeps? going wrong)\b"
            }
            Self::Excited => {
                r"(?i)\b(?:excited|thrilled|can't wait|looking forward|eager)\b"
            }
            Self::Content => r"(?i)\b(?:content|satisfied|comfortable|grateful|thankful)\b",
            Self::Happy => {
                r"(?i)\b(?:happy|glad|joy|joyful|delighted|wonderful|cheerful|lovely day)\b"
            }
            Self::GriefAdjustment => {
                r"(?i)\b(?:grief|grieving|passed away|since (?:he|she) died|lost my (?:wife|husband|son|daughter|friend|partner|brother|sister)|miss (?:him|her) so much|new home|moving here|moved here|adjusting to|getting used to)\b"
            }
            Self::Neutral => return None,
        };
        Some(source)
    }

    /// Static support templates keyed by label.
    pub fn support_recommendations(&self) -> &'static [&'static str] {
        match self {
            Self::Sad => &[
                "Acknowledge the feeling and invite them to share more",
                "Suggest a favorite comforting activity",
            ],
            Self::Lonely => &[
                "Offer to arrange a call or visit with family or friends",
                "Suggest a group activity in the community",
            ],
            Self::Anxious => &[
                "Offer a short breathing or grounding exercise",
                "Provide clear information about upcoming events",
            ],
            Self::Angry => &[
                "Validate the frustration without arguing",
                "Give space and offer to revisit the topic later",
            ],
            Self::Calm => &["Maintain the current supportive routine"],
            Self::Frustrated => &[
                "Break the problem into smaller steps",
                "Offer help from a staff member",
            ],
            Self::Excited => &["Share in the excitement and ask about plans"],
            Self::Content => &["Reinforce the activities that are going well"],
            Self::Happy => &["Celebrate the positive moment and encourage sharing"],
            Self::GriefAdjustment => &[
                "Offer grief support resources or chaplaincy",
                "Encourage reminiscence and sharing memories",
            ],
            Self::Neutral => &["Continue the conversation with open-ended questions"],
        }
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crisis-adjacent phrase families, checked regardless of the primary label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorFamily {
    SuicidalStatement,
    SevereHopelessness,
    IsolationDespair,
    SelfWorthCollapse,
}

impl IndicatorFamily {
    pub const ALL: [IndicatorFamily; 4] = [
        Self::SuicidalStatement,
        Self::SevereHopelessness,
        Self::IsolationDespair,
        Self::SelfWorthCollapse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuicidalStatement => "suicidal_statement",
            Self::SevereHopelessness => "severe_hopelessness",
            Self::IsolationDespair => "isolation_despair",
            Self::SelfWorthCollapse => "self_worth_collapse",
        }
    }

    /// (base confidence, firing threshold, severity)
    ///
    /// Isolation and self-worth phrases start below their threshold: alone
    /// they read as sadness, and fire only when repeated or corroborated by
    /// another family.
    fn profile(&self) -> (f32, f32, RiskLevel) {
        match self {
            Self::SuicidalStatement => (0.95, 0.9, RiskLevel::Critical),
            Self::SevereHopelessness => (0.85, 0.8, RiskLevel::High),
            Self::IsolationDespair => (0.7, 0.75, RiskLevel::High),
            Self::SelfWorthCollapse => (0.7, 0.75, RiskLevel::High),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.profile().1
    }

    fn pattern(&self) -> &'static str {
        match self {
            Self::SuicidalStatement => {
                r"(?i)\b(?:want to die|wanna die|end my life|kill myself|suicide|suicidal|better off dead|no reason to live|don't want to (?:live|be here|be alive))\b"
            }
            Self::SevereHopelessness => {
                r"(?i)\b(?:hopeless|no hope|can't go on|cannot go on|no way out|nothing will (?:ever )?get better|give up on (?:everything|life))\b"
            }
            Self::IsolationDespair => {
                r"(?i)\b(?:nobody (?:cares|visits|would notice|would miss me)|no one (?:cares|visits|would notice|would miss me)|completely alone|all alone in the world|everyone has forgotten me|abandoned)\b"
            }
            Self::SelfWorthCollapse => {
                r"(?i)\b(?:worthless|i'm a burden|i am a burden|burden (?:to|on) (?:everyone|my family)|nobody needs me|no one needs me|i'm useless|i am useless)\b"
            }
        }
    }
}

const CRISIS_SUPPORT: &[&str] = &[
    "Connect immediately with a crisis counselor or the 988 Suicide & Crisis Lifeline",
    "Alert the care team for an in-person check",
];

/// Score for one label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub label: EmotionLabel,
    pub confidence: f32,
    pub matches: usize,
}

/// A crisis phrase found by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisIndicator {
    pub family: IndicatorFamily,
    pub phrase: String,
    pub span: Span,
    pub confidence: f32,
    pub severity: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionAnalysisResult {
    pub label: EmotionLabel,
    pub valence: f32,
    pub arousal: f32,
    pub confidence: f32,
    /// Every label, highest confidence first.
    pub scores: Vec<EmotionScore>,
    pub crisis_indicators: Vec<CrisisIndicator>,
    pub support_recommendations: Vec<String>,
    pub is_crisis: bool,
    pub intervention_level: RiskLevel,
}

pub struct EmotionPatterns {
    labels: Vec<(EmotionLabel, Regex)>,
    indicators: Vec<(IndicatorFamily, Regex)>,
}

impl EmotionPatterns {
    pub fn compile() -> Result<Self, AnalysisError> {
        let labels = EmotionLabel::ALL
            .iter()
            .filter_map(|label| label.pattern().map(|p| (*label, p)))
            .map(|(label, source)| compile_one("emotion", source).map(|re| (label, re)))
            .collect::<Result<Vec<_>, _>>()?;

        let indicators = IndicatorFamily::ALL
            .iter()
            .map(|family| compile_one("emotion_crisis", family.pattern()).map(|re| (*family, re)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { labels, indicators })
    }

    pub fn len(&self) -> usize {
        self.labels.len() + self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn compile_one(family: &'static str, source: &str) -> Result<Regex, AnalysisError> {
    Regex::new(source).map_err(|e| AnalysisError::PatternCompile {
        family,
        reason: e.to_string(),
    })
}

pub struct EmotionClassifier {
    catalog: Arc<PatternCatalog>,
}

impl EmotionClassifier {
    pub fn new(catalog: Arc<PatternCatalog>) -> Self {
        Self { catalog }
    }

    pub fn classify(&self, text: &str) -> EmotionAnalysisResult {
        let patterns = &self.catalog.emotion;

        let mut scores: Vec<EmotionScore> = EmotionLabel::ALL
            .iter()
            .map(|label| {
                let matches = patterns
                    .labels
                    .iter()
                    .find(|(l, _)| l == label)
                    .map(|(_, re)| re.find_iter(text).count())
                    .unwrap_or(0);
                EmotionScore {
                    label: *label,
                    confidence: label_confidence(*label, matches),
                    matches,
                }
            })
            .collect();

        if scores.iter().all(|s| s.matches == 0) {
            if let Some(neutral) = scores.iter_mut().find(|s| s.label == EmotionLabel::Neutral) {
                neutral.confidence = NEUTRAL_CONFIDENCE;
            }
        }

        // Stable sort keeps catalog order on ties
        scores.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let (label, confidence) = scores
            .first()
            .map(|s| (s.label, s.confidence))
            .unwrap_or((EmotionLabel::Neutral, NEUTRAL_CONFIDENCE));
        let (valence, arousal) = label.coordinates();

        let crisis_indicators = detect_indicators(patterns, text);
        let firing: Vec<&CrisisIndicator> = crisis_indicators
            .iter()
            .filter(|i| i.confidence > i.family.threshold())
            .collect();
        let is_crisis = !firing.is_empty();
        let intervention_level = firing
            .iter()
            .map(|i| i.severity)
            .max()
            .unwrap_or(RiskLevel::None);

        let mut support_recommendations: Vec<String> = Vec::new();
        if is_crisis {
            support_recommendations.extend(CRISIS_SUPPORT.iter().map(|s| s.to_string()));
        }
        support_recommendations.extend(
            label
                .support_recommendations()
                .iter()
                .map(|s| s.to_string()),
        );

        EmotionAnalysisResult {
            label,
            valence,
            arousal,
            confidence,
            scores,
            crisis_indicators,
            support_recommendations,
            is_crisis,
            intervention_level,
        }
    }
}

impl TextAnalyzer for EmotionClassifier {
    type Output = EmotionAnalysisResult;

    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Emotion
    }

    fn analyze(&self, text: &str) -> Result<EmotionAnalysisResult, AnalysisError> {
        Ok(self.classify(text))
    }
}

fn label_confidence(label: EmotionLabel, matches: usize) -> f32 {
    if matches == 0 {
        return 0.0;
    }
    let extra = (matches - 1) as f32 * REPEAT_MATCH_BONUS;
    (label.specificity() + extra).min(1.0)
}

/// Confidence is the family base, plus a bonus per repeat within the
/// family and per other family present in the same text.
fn detect_indicators(patterns: &EmotionPatterns, text: &str) -> Vec<CrisisIndicator> {
    let hits: Vec<(IndicatorFamily, Vec<regex::Match<'_>>)> = patterns
        .indicators
        .iter()
        .map(|(family, regex)| (*family, regex.find_iter(text).collect::<Vec<_>>()))
        .filter(|(_, matches)| !matches.is_empty())
        .collect();
    let corroborating = hits.len().saturating_sub(1) as f32;

    let mut found = Vec::new();
    for (family, matches) in &hits {
        let (base, _, severity) = family.profile();
        let repeats = (matches.len() - 1) as f32;
        let confidence = (base
            + repeats * REPEAT_MATCH_BONUS
            + corroborating * CORROBORATION_BONUS)
            .min(1.0);
        for m in matches {
            found.push(CrisisIndicator {
                family: *family,
                phrase: m.as_str().to_string(),
                span: Span::from(*m),
                confidence,
                severity,
            });
        }
    }
    found
}
