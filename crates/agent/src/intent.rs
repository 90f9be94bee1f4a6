//! Offline keyword heuristics for intent classification.
//!
//! Used as the default reasoning engine and as a deterministic stand-in for a model during tests
//! and local runs. Follow-up questions ("what about Paris?") and bare answers to a clarification
//! ("Paris") are resolved against the conversation context: the last delegated city and capability
//! first, then the raw history.

use async_trait::async_trait;
use stratus_core::{Capability, ConversationContext, Turn};

use crate::reasoning::{Classification, Intent, ReasoningEngine, ReasoningError};

const MAX_CITY_WORDS: usize = 4;

#[derive(Clone, Debug, Default)]
pub struct KeywordReasoner;

impl KeywordReasoner {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_text(
        &self,
        context: ConversationContext<'_>,
        message: &str,
        capabilities: &[Capability],
    ) -> Classification {
        let carried_intent = || {
            recent_intent(context.history)
                .or_else(|| context.last_capability.map(Intent::from))
                .unwrap_or(Intent::Unclear)
        };
        let normalized_text = normalize_text(message);
        let tokens = tokenize(&normalized_text);

        let mut city = extract_city(message);
        let intent = match weather_intent(&normalized_text, &tokens) {
            Some(intent) => intent,
            None if city.is_some() => carried_intent(),
            None if is_greeting(&normalized_text, &tokens) => Intent::Greet,
            None => match bare_city(message, &tokens) {
                Some(answer) => {
                    city = Some(answer);
                    carried_intent()
                }
                None => Intent::Unclear,
            },
        };

        let Some(capability) = intent.capability() else {
            return Classification::new(intent, None);
        };
        if !capabilities.contains(&capability) {
            return Classification::unclear();
        }

        let city = city
            .or_else(|| context.last_city.map(str::to_string))
            .or_else(|| history_city(context.history));
        Classification::new(intent, city)
    }
}

#[async_trait]
impl ReasoningEngine for KeywordReasoner {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn classify(
        &self,
        context: ConversationContext<'_>,
        message: &str,
        capabilities: &[Capability],
    ) -> Result<Classification, ReasoningError> {
        Ok(self.classify_text(context, message, capabilities))
    }
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || matches!(character, '\'' | '-') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

fn weather_intent(normalized_text: &str, tokens: &[String]) -> Option<Intent> {
    if mentions_forecast(normalized_text, tokens) {
        return Some(Intent::Forecast);
    }
    if tokens.iter().any(|token| is_current_word(token)) {
        return Some(Intent::CurrentWeather);
    }
    None
}

fn mentions_forecast(normalized_text: &str, tokens: &[String]) -> bool {
    let phrases = ["will it", "going to be", "3-day", "three day", "next few days", "this week"];
    if phrases.iter().any(|phrase| normalized_text.contains(phrase)) {
        return true;
    }

    tokens.iter().any(|token| {
        matches!(
            token.as_str(),
            "forecast"
                | "forecasts"
                | "tomorrow"
                | "tomorrow's"
                | "weekend"
                | "upcoming"
                | "outlook"
                | "later"
                | "days"
        )
    })
}

fn is_current_word(token: &str) -> bool {
    matches!(
        token,
        "weather"
            | "temperature"
            | "temp"
            | "now"
            | "today"
            | "currently"
            | "current"
            | "outside"
            | "raining"
            | "snowing"
            | "sunny"
            | "humid"
            | "humidity"
            | "hot"
            | "cold"
            | "warm"
            | "windy"
            | "conditions"
    )
}

fn is_greeting(normalized_text: &str, tokens: &[String]) -> bool {
    let opener = tokens.first().map(String::as_str).unwrap_or_default();
    if matches!(opener, "hi" | "hello" | "hey" | "hiya" | "howdy" | "greetings" | "yo") {
        return true;
    }

    ["good morning", "good afternoon", "good evening"]
        .iter()
        .any(|phrase| normalized_text.starts_with(phrase))
}

/// Intent carried over from the previous turn, either the capability it was served by or the
/// weather words of a question that still lacked a city.
fn recent_intent(history: &[Turn]) -> Option<Intent> {
    let last = history.last()?;
    match last.capability {
        Some(Capability::CurrentWeather) => Some(Intent::CurrentWeather),
        Some(Capability::Forecast) => Some(Intent::Forecast),
        None => {
            let normalized_text = normalize_text(&last.user);
            weather_intent(&normalized_text, &tokenize(&normalized_text))
        }
    }
}

fn history_city(history: &[Turn]) -> Option<String> {
    history.iter().rev().find_map(|turn| extract_city(&turn.user))
}

fn extract_city(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();

    for (index, word) in words.iter().enumerate() {
        if !matches!(clean_word(word).to_lowercase().as_str(), "in" | "for" | "at" | "about") {
            continue;
        }

        let mut city_words = Vec::new();
        for candidate in &words[index + 1..] {
            let cleaned = clean_word(candidate);
            if cleaned.is_empty() || is_city_stop_word(&cleaned.to_lowercase()) {
                break;
            }
            if cleaned.chars().next().map(|ch| ch.is_ascii_digit()).unwrap_or(true) {
                break;
            }
            city_words.push(cleaned);
            if ends_clause(candidate) || city_words.len() == MAX_CITY_WORDS {
                break;
            }
        }

        if !city_words.is_empty() {
            return Some(title_case(&city_words));
        }
    }

    None
}

fn bare_city(text: &str, tokens: &[String]) -> Option<String> {
    if tokens.is_empty() || tokens.len() > 3 {
        return None;
    }
    if tokens.iter().any(|token| is_filler_word(token) || is_city_stop_word(token)) {
        return None;
    }

    let words: Vec<&str> = text.split_whitespace().map(clean_word).collect();
    let alphabetic = words.iter().all(|word| {
        !word.is_empty() && word.chars().all(|ch| ch.is_alphabetic() || matches!(ch, '-' | '\'' | '.'))
    });
    alphabetic.then(|| title_case(&words))
}

fn clean_word(word: &str) -> &str {
    word.trim_matches(|ch: char| matches!(ch, '?' | '!' | '.' | ',' | ';' | ':' | '"' | '(' | ')'))
}

fn ends_clause(word: &str) -> bool {
    word.ends_with(|ch: char| matches!(ch, '?' | '!' | '.' | ',' | ';' | ':'))
}

fn is_city_stop_word(word: &str) -> bool {
    matches!(
        word,
        "today"
            | "tomorrow"
            | "tonight"
            | "now"
            | "right"
            | "this"
            | "next"
            | "the"
            | "please"
            | "like"
            | "then"
            | "on"
            | "over"
            | "during"
            | "weather"
            | "forecast"
            | "currently"
            | "a"
            | "me"
    )
}

fn is_filler_word(word: &str) -> bool {
    matches!(
        word,
        "what"
            | "how"
            | "is"
            | "it"
            | "thanks"
            | "thank"
            | "you"
            | "ok"
            | "okay"
            | "yes"
            | "no"
            | "bye"
            | "help"
            | "why"
            | "who"
    ) || is_current_word(word)
}

fn title_case(words: &[&str]) -> String {
    let already_cased = words.iter().any(|word| word.chars().any(char::is_uppercase));
    if already_cased {
        return words.join(" ");
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
