use serde::{Deserialize, Serialize};

/// A (name, confidence) pair returned by label detection. Confidence is a
/// percentage in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageLabel {
    pub name: String,
    pub confidence: f32,
}

impl DamageLabel {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

const PHYSICAL: &[&str] = &[
    "damage", "crack", "scratch", "dent", "broken", "chip", "split", "tear", "puncture", "gouge",
    "rupture", "fissure", "fracture", "destroyed",
];

const SURFACE: &[&str] = &[
    "rust",
    "corrosion",
    "wear",
    "deterioration",
    "degradation",
    "erosion",
    "stain",
    "discoloration",
    "peeling",
    "chipped paint",
    "surface damage",
];

const STRUCTURAL: &[&str] = &[
    "deformation",
    "warped",
    "bent",
    "misaligned",
    "collapsed",
    "buckled",
    "twisted",
    "structural failure",
    "compromised",
];

const MATERIAL: &[&str] = &[
    "shattered",
    "cracked glass",
    "metal fatigue",
    "material failure",
    "structural weakness",
    "fragmented",
];

const CONTEXTUAL: &[&str] = &[
    "impact",
    "collision",
    "accident",
    "trauma",
    "stress",
    "strain",
    "mechanical failure",
    "structural compromise",
];

/// Ordered, immutable vocabulary of lowercase damage substrings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamageKeywordSet {
    keywords: Vec<String>,
}

impl DamageKeywordSet {
    /// Builds a set from arbitrary keywords. Entries are lowercased and
    /// trimmed; blanks and repeats are dropped, first occurrence wins.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for k in keywords {
            let k = k.as_ref().trim().to_lowercase();
            if k.is_empty() || out.contains(&k) {
                continue;
            }
            out.push(k);
        }
        Self { keywords: out }
    }

    /// The built-in vocabulary plus `extra` keywords appended at the end.
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Self {
        Self::new(
            builtin_keywords()
                .map(str::to_string)
                .chain(extra.iter().map(|s| s.as_ref().to_string())),
        )
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// First keyword contained in `name` after case folding.
    pub fn matching_keyword(&self, name: &str) -> Option<&str> {
        let folded = name.to_lowercase();
        self.keywords
            .iter()
            .find(|k| folded.contains(k.as_str()))
            .map(String::as_str)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.matching_keyword(name).is_some()
    }
}

impl Default for DamageKeywordSet {
    fn default() -> Self {
        Self::new(builtin_keywords())
    }
}

fn builtin_keywords() -> impl Iterator<Item = &'static str> {
    PHYSICAL
        .iter()
        .chain(SURFACE)
        .chain(STRUCTURAL)
        .chain(MATERIAL)
        .chain(CONTEXTUAL)
        .copied()
}

/// Filters detected labels down to damage-relevant ones.
///
/// Matching is plain substring containment on the lowercased label name, so
/// "rust" also matches "trust". Order and duplicates of the input are kept.
#[derive(Debug, Clone, Default)]
pub struct DamageClassifier {
    keywords: DamageKeywordSet,
}

impl DamageClassifier {
    pub fn new(keywords: DamageKeywordSet) -> Self {
        Self { keywords }
    }

    pub fn keywords(&self) -> &DamageKeywordSet {
        &self.keywords
    }

    pub fn classify(&self, labels: &[DamageLabel]) -> Vec<DamageLabel> {
        labels
            .iter()
            .filter(|l| self.keywords.matches(&l.name))
            .cloned()
            .collect()
    }
}

/// [`DamageClassifier::classify`] with the built-in vocabulary.
pub fn classify(labels: &[DamageLabel]) -> Vec<DamageLabel> {
    DamageClassifier::default().classify(labels)
}
