//! Field defaults applied to newly created documents.
//!
//! A document created with a blank `title` gets a generated placeholder when
//! the policy knows the collection: a tech-jargon sentence for `todos`, a
//! gerund-noun pair for `projects`. A missing `title` is left missing.

use std::cell::RefCell;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::Value;

use porthole_core::DocData;

/// Policy for filling blank fields on creation.
pub trait FieldDefaults {
    /// Placeholder title for a document in `collection`, if the policy has one.
    fn placeholder_title(&self, collection: &str) -> Option<String>;

    /// Replace a blank `title` with a placeholder.
    fn fill(&self, collection: &str, data: &mut DocData) {
        let blank = matches!(data.get("title"), Some(Value::String(title)) if title.trim().is_empty());
        if !blank {
            return;
        }
        if let Some(title) = self.placeholder_title(collection) {
            data.insert("title".to_owned(), Value::String(title));
        }
    }
}

/// Leave every document as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDefaults;

impl FieldDefaults for NoDefaults {
    fn placeholder_title(&self, _collection: &str) -> Option<String> {
        None
    }
}

const ABBREVIATIONS: &[&str] = &[
    "TCP", "HTTP", "SDD", "RAM", "GB", "CSS", "SSL", "AGP", "SQL", "FTP", "PCI", "AI", "RSS",
    "XML", "EXE", "HDD", "SMTP", "SMS", "USB", "PNG", "SCSI", "JSON", "XSS", "JBOD",
];

const ADJECTIVES: &[&str] = &[
    "auxiliary", "primary", "back-end", "digital", "open-source", "virtual", "cross-platform",
    "redundant", "online", "haptic", "multi-byte", "wireless", "1080p", "neural", "optical",
    "solid state", "mobile",
];

const NOUNS: &[&str] = &[
    "driver", "protocol", "bandwidth", "panel", "microchip", "program", "port", "card", "array",
    "interface", "system", "sensor", "firewall", "hard drive", "pixel", "alarm", "feed",
    "monitor", "application", "transmitter", "bus", "circuit", "capacitor", "matrix",
];

const VERBS: &[&str] = &[
    "back up", "bypass", "hack", "override", "compress", "copy", "navigate", "index", "connect",
    "generate", "quantify", "calculate", "synthesize", "transmit", "program", "reboot", "parse",
];

const ING_VERBS: &[&str] = &[
    "backing up", "bypassing", "hacking", "overriding", "compressing", "copying", "navigating",
    "indexing", "connecting", "generating", "quantifying", "calculating", "synthesizing",
    "transmitting", "programming", "parsing",
];

const TEMPLATES: &[&str] = &[
    "{ingverb} the {noun} won't do anything, we need to {verb} the {adjective} {abbreviation} {noun}!",
    "We need to {verb} the {adjective} {abbreviation} {noun}!",
    "Try to {verb} the {abbreviation} {noun}, maybe it will {verb} the {adjective} {noun}!",
    "You can't {verb} the {noun} without {ingverb} the {adjective} {abbreviation} {noun}!",
    "The {abbreviation} {noun} is down, {verb} the {adjective} {noun} so we can {verb} the {abbreviation} {noun}!",
    "I'll {verb} the {adjective} {abbreviation} {noun}, that should {verb} the {abbreviation} {noun}!",
];

/// Random placeholder titles for `todos` and `projects`.
#[derive(Debug)]
pub struct PlaceholderTitles {
    rng: RefCell<StdRng>,
}

impl Default for PlaceholderTitles {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceholderTitles {
    /// Entropy-seeded generator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: RefCell::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for tests and replays.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn phrase(&self) -> String {
        let mut rng = self.rng.borrow_mut();
        let template = pick(&mut rng, TEMPLATES);
        let mut out = String::with_capacity(template.len() + 32);
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let Some(len) = rest[start..].find('}') else {
                rest = &rest[start..];
                break;
            };
            let word = match &rest[start + 1..start + len] {
                "abbreviation" => pick(&mut rng, ABBREVIATIONS),
                "adjective" => pick(&mut rng, ADJECTIVES),
                "noun" => pick(&mut rng, NOUNS),
                "verb" => pick(&mut rng, VERBS),
                "ingverb" => pick(&mut rng, ING_VERBS),
                _ => "",
            };
            out.push_str(word);
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);
        capitalize(&out)
    }

    fn project_name(&self) -> String {
        let mut rng = self.rng.borrow_mut();
        format!("{} {}", pick(&mut rng, ING_VERBS), pick(&mut rng, NOUNS))
    }
}

impl FieldDefaults for PlaceholderTitles {
    fn placeholder_title(&self, collection: &str) -> Option<String> {
        match collection {
            "todos" => Some(self.phrase()),
            "projects" => Some(self.project_name()),
            _ => None,
        }
    }
}

fn pick(rng: &mut StdRng, words: &[&'static str]) -> &'static str {
    words.choose(rng).copied().unwrap_or_default()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> DocData {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn blank_title_is_filled_for_known_collections() {
        let defaults = PlaceholderTitles::seeded(7);
        for collection in ["todos", "projects"] {
            let mut data = doc(json!({"title": "  "}));
            defaults.fill(collection, &mut data);
            let title = data["title"].as_str().unwrap();
            assert!(!title.trim().is_empty(), "{collection}: {title:?}");
        }
    }

    #[test]
    fn unknown_collections_and_present_titles_are_untouched() {
        let defaults = PlaceholderTitles::seeded(7);

        let mut data = doc(json!({"title": ""}));
        defaults.fill("notes", &mut data);
        assert_eq!(data["title"], json!(""));

        let mut data = doc(json!({"title": "Buy milk"}));
        defaults.fill("todos", &mut data);
        assert_eq!(data["title"], json!("Buy milk"));

        let mut data = doc(json!({"done": false}));
        defaults.fill("todos", &mut data);
        assert!(!data.contains_key("title"));
    }

    #[test]
    fn no_defaults_leaves_blank_titles() {
        let mut data = doc(json!({"title": ""}));
        NoDefaults.fill("todos", &mut data);
        assert_eq!(data["title"], json!(""));
    }

    #[test]
    fn seeded_generators_repeat() {
        let a = PlaceholderTitles::seeded(42);
        let b = PlaceholderTitles::seeded(42);
        for _ in 0..5 {
            assert_eq!(a.placeholder_title("todos"), b.placeholder_title("todos"));
        }
    }

    #[test]
    fn phrases_have_no_unexpanded_slots() {
        let defaults = PlaceholderTitles::seeded(1);
        for _ in 0..50 {
            let phrase = defaults.placeholder_title("todos").unwrap();
            assert!(!phrase.contains('{') && !phrase.contains('}'), "{phrase}");
            assert!(phrase.chars().next().unwrap().is_uppercase(), "{phrase}");
        }
    }

    #[test]
    fn project_names_are_two_part() {
        let name = PlaceholderTitles::seeded(3)
            .placeholder_title("projects")
            .unwrap();
        assert!(ING_VERBS.iter().any(|verb| name.starts_with(verb)), "{name}");
    }
}
