//! Keyword-based event-type detection.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crisisbrief_shared::{EventCategory, EventType};

/// Keywords per category, in priority order for exact ties.
const KEYWORD_TABLE: &[(EventCategory, &[&str])] = &[
    (
        EventCategory::Earthquake,
        &["earthquake", "seismic", "tremor", "richter", "aftershock", "epicenter"],
    ),
    (
        EventCategory::Flood,
        &["flood", "flooding", "inundation", "overflow"],
    ),
    (
        EventCategory::Cyclone,
        &["cyclone", "hurricane", "typhoon", "storm", "landfall"],
    ),
    (
        EventCategory::Wildfire,
        &["wildfire", "fire", "blaze", "burning", "bushfire"],
    ),
    (EventCategory::Tsunami, &["tsunami", "tidal wave"]),
    (EventCategory::Drought, &["drought", "dry", "water shortage"]),
    (
        EventCategory::Landslide,
        &["landslide", "mudslide", "rockfall", "debris flow"],
    ),
    (
        EventCategory::VolcanicEruption,
        &["volcano", "volcanic", "eruption", "lava", "ash cloud"],
    ),
];

struct CategoryMatcher {
    category: EventCategory,
    keyword_count: usize,
    regex: Regex,
}

static MATCHERS: LazyLock<Vec<CategoryMatcher>> = LazyLock::new(|| {
    KEYWORD_TABLE
        .iter()
        .map(|(category, keywords)| {
            let alternation = keywords
                .iter()
                .map(|k| regex::escape(k).replace(' ', r"\s+"))
                .collect::<Vec<_>>()
                .join("|");
            CategoryMatcher {
                category: *category,
                keyword_count: keywords.len(),
                regex: Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("valid regex"),
            }
        })
        .collect()
});

struct CategoryScore {
    category: EventCategory,
    distinct: usize,
    first_pos: usize,
    keyword_count: usize,
}

/// Classify `text` into a disaster category.
///
/// The category with the most distinct matching keywords wins; ties go to
/// the category whose first match appears earliest. Text without any
/// keyword is a general disaster event with confidence 0.
pub fn detect(text: &str) -> EventType {
    let best = MATCHERS
        .iter()
        .enumerate()
        .filter_map(|(priority, matcher)| {
            let mut seen = HashSet::new();
            let mut first_pos = usize::MAX;
            for m in matcher.regex.find_iter(text) {
                first_pos = first_pos.min(m.start());
                seen.insert(normalize_keyword(m.as_str()));
            }
            (!seen.is_empty()).then_some((
                priority,
                CategoryScore {
                    category: matcher.category,
                    distinct: seen.len(),
                    first_pos,
                    keyword_count: matcher.keyword_count,
                },
            ))
        })
        .min_by_key(|(priority, score)| (Reverse(score.distinct), score.first_pos, *priority))
        .map(|(_, score)| score);

    let Some(score) = best else {
        debug!("no event keywords matched");
        return EventType::general();
    };

    let confidence = (score.distinct as f32 / score.keyword_count as f32).clamp(0.0, 1.0);
    debug!(
        category = score.category.label(),
        keywords = score.distinct,
        confidence,
        "event type detected"
    );
    EventType {
        category: score.category,
        label: score.category.label().to_string(),
        confidence,
    }
}

fn normalize_keyword(matched: &str) -> String {
    matched
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
