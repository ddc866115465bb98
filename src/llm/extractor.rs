

use std::collections::BTreeSet;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::providers::base::{strip_code_fences, LlmProvider};
use crate::core::error::Result;
use crate::session::{FactUpdate, SessionField};
use crate::utils::normalize_name;

lazy_static! {
    static ref EMAIL: Regex =
        Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}").unwrap();
    static ref EMAIL_EXACT: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").unwrap();
    static ref KEYED: Regex =
        Regex::new(r"(?i)^\s*(dish|dish_name|recipe|pantry|pantry_items|have|email|user_email)\s*[:=]\s*(.*)$").unwrap();
    static ref DISH_PREFIX: Regex = Regex::new(
        r"(?i)^\s*(?:i(?:'d| would)? (?:like|want) to (?:cook|make)|let'?s (?:cook|make)|(?:please )?(?:cook|make)|dish is)\s+"
    )
    .unwrap();
    static ref PANTRY_PREFIX: Regex =
        Regex::new(r"(?i)^\s*(?:i (?:already )?have(?: got)?|i've got|we have|got)\s*:?\s*").unwrap();
    static ref LIST_SEPARATOR: Regex = Regex::new(r"(?i),|;|\band\b|&").unwrap();
    static ref NOTHING: Regex =
        Regex::new(r"(?i)^\s*(?:none|nothing|no(?:thing)? ingredients|empty|n/a)\s*[.!]?\s*$").unwrap();
    static ref NON_ANSWER: Regex = Regex::new(
        r"(?i)\?\s*$|\b(?:not sure|unsure|don'?t know|do not know|dunno|no idea|idk|let me (?:check|think|see)|hmm+|maybe later)\b"
    )
    .unwrap();
    static ref TRAILING_PLEASE: Regex = Regex::new(r"(?i)[\s,]+please\s*$").unwrap();
}


/// Turns one raw utterance into structured field updates.
///
/// `expected` lists the fields worth looking for, most wanted first. An
/// implementation must only return values actually present in the utterance.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    async fn extract(&self, utterance: &str, expected: &[SessionField]) -> Result<FactUpdate>;

    fn name(&self) -> &str;
}

pub fn is_valid_email(candidate: &str) -> bool {
    EMAIL_EXACT.is_match(candidate.trim())
}

/// Splits "eggs, guanciale and salt" into items. "none" is an empty pantry.
pub fn parse_item_list(text: &str) -> BTreeSet<String> {
    let text = PANTRY_PREFIX.replace(text, "");
    if NOTHING.is_match(&text) {
        return BTreeSet::new();
    }
    LIST_SEPARATOR
        .split(&text)
        .map(|item| item.trim().trim_end_matches(['.', '!']).trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// True for "I have nothing" style answers: the pantry is known to be empty.
pub fn says_nothing(text: &str) -> bool {
    NOTHING.is_match(&PANTRY_PREFIX.replace(text, ""))
}

/// Hedges and counter-questions answer nothing.
fn is_non_answer(text: &str) -> bool {
    NON_ANSWER.is_match(text)
}

fn parse_dish(text: &str) -> Option<String> {
    let dish = DISH_PREFIX.replace(text, "");
    let dish = dish.trim().trim_end_matches(['.', '!', '?']).trim();
    let dish = TRAILING_PLEASE.replace(dish, "");
    let dish = dish.trim();
    (!dish.is_empty()).then(|| dish.to_string())
}

/// The utterance minus any clause that carries an email address.
fn without_email_clauses(text: &str) -> String {
    text.split([',', ';', '\n'])
        .map(str::trim)
        .filter(|clause| !clause.is_empty() && !EMAIL.is_match(clause))
        .collect::<Vec<_>>()
        .join(", ")
}


/// Deterministic extractor: `key: value` segments, literal emails, bare answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleFactExtractor;

impl RuleFactExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_sync(&self, utterance: &str, expected: &[SessionField]) -> FactUpdate {
        let mut update = FactUpdate::default();
        let mut keyed = false;

        for segment in utterance.split(['\n', ';']) {
            let Some(caps) = KEYED.captures(segment) else {
                continue;
            };
            keyed = true;
            let value = caps.get(2).map_or("", |m| m.as_str());
            match caps[1].to_lowercase().as_str() {
                "dish" | "dish_name" | "recipe" => update.dish_name = parse_dish(value),
                "pantry" | "pantry_items" | "have" => update.pantry_items = Some(parse_item_list(value)),
                _ => {
                    update.user_email = EMAIL.find(value).map(|m| m.as_str().to_string());
                }
            }
        }

        if update.user_email.is_none() {
            update.user_email = EMAIL.find(utterance).map(|m| m.as_str().to_string());
        }

        if !keyed {
            let answer = if update.user_email.is_some() {
                without_email_clauses(utterance)
            } else {
                utterance.trim().to_string()
            };

            if answer.is_empty() || is_non_answer(&answer) {
                debug!("No usable answer in '{}'", crate::safe_truncate(utterance, 60));
                return update;
            }

            match expected.first() {
                Some(SessionField::DishName) => {
                    let first_clause = answer.split(',').next().unwrap_or_default();
                    update.dish_name = parse_dish(first_clause);
                }
                Some(SessionField::PantryItems) => {
                    let items = parse_item_list(&answer);
                    if !items.is_empty() || says_nothing(&answer) {
                        update.pantry_items = Some(items);
                    }
                }
                _ => {}
            }
        }

        update
    }
}

#[async_trait]
impl FactExtractor for RuleFactExtractor {
    async fn extract(&self, utterance: &str, expected: &[SessionField]) -> Result<FactUpdate> {
        let update = self.extract_sync(utterance, expected);
        debug!(
            "Rule extraction from '{}': {:?}",
            crate::safe_truncate(utterance, 60),
            update.fields()
        );
        Ok(update)
    }

    fn name(&self) -> &str {
        "rules"
    }
}


#[derive(Debug, Default, Deserialize)]
struct ExtractedFacts {
    #[serde(default)]
    dish_name: Option<String>,
    #[serde(default)]
    pantry_items: Option<Vec<String>>,
    #[serde(default)]
    user_email: Option<String>,
}

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract facts for a cooking assistant from ONE user message.

Return a single JSON object with exactly these keys:
{
  "dish_name": "dish the user wants to cook, or null",
  "pantry_items": ["ingredients the user says they already have"] or null,
  "user_email": "email address for order confirmations, or null"
}

Rules:
- Only fill a key when the message itself states it. Never guess or invent values.
- If the user says they have no ingredients, pantry_items is [].
- Keep ingredient names as the user wrote them, one item per entry.
- Output JSON only."#;


pub struct LlmFactExtractor<P: LlmProvider> {
    provider: P,
}

impl<P: LlmProvider> LlmFactExtractor<P> {

    #[must_use]
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn build_user_prompt(utterance: &str, expected: &[SessionField]) -> String {
        let fields: Vec<&'static str> = expected.iter().map(|field| <&'static str>::from(*field)).collect();
        let focus = fields.first().copied().unwrap_or("none");
        format!(
            "The assistant just asked for: {focus}\nStill unknown: {}\n\nUser message:\n{utterance}",
            if fields.is_empty() { "nothing".to_string() } else { fields.join(", ") }
        )
    }

    /// Drops anything blank, malformed, or not grounded in the utterance.
    fn sanitize(utterance: &str, facts: ExtractedFacts) -> FactUpdate {
        let said = normalize_name(utterance);

        let dish_name = facts
            .dish_name
            .map(|dish| dish.trim().to_string())
            .filter(|dish| !dish.is_empty())
            .filter(|dish| {
                let grounded = said.contains(&normalize_name(dish));
                if !grounded {
                    warn!("Dropping dish '{}' not present in the utterance", dish);
                }
                grounded
            });

        let pantry_items = facts.pantry_items.and_then(|items| {
            let grounded: BTreeSet<String> = items
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .filter(|item| {
                    let grounded = said.contains(&normalize_name(item));
                    if !grounded {
                        warn!("Dropping pantry item '{}' not present in the utterance", item);
                    }
                    grounded
                })
                .collect();
            if !grounded.is_empty() || says_nothing(utterance) {
                Some(grounded)
            } else {
                None
            }
        });

        let user_email = facts
            .user_email
            .map(|email| email.trim().to_string())
            .filter(|email| is_valid_email(email) && utterance.contains(email.as_str()));

        FactUpdate {
            dish_name,
            pantry_items,
            user_email,
        }
    }
}

#[async_trait]
impl<P: LlmProvider> FactExtractor for LlmFactExtractor<P> {
    async fn extract(&self, utterance: &str, expected: &[SessionField]) -> Result<FactUpdate> {
        info!(
            "Extracting facts via {}: {}",
            self.provider.provider_name(),
            crate::safe_truncate_ellipsis(utterance, 50)
        );

        let user_prompt = Self::build_user_prompt(utterance, expected);
        let (response, _metadata) = self
            .provider
            .generate(EXTRACTION_SYSTEM_PROMPT, &user_prompt, true)
            .await?;

        match serde_json::from_str::<ExtractedFacts>(strip_code_fences(&response)) {
            Ok(facts) => {
                let update = Self::sanitize(utterance, facts);
                debug!("Extracted fields: {:?}", update.fields());
                Ok(update)
            }
            Err(e) => {
                warn!("Failed to parse extraction result: {}", e);
                warn!("Response was: {}", crate::safe_truncate(&response, 200));
                Ok(FactUpdate::default())
            }
        }
    }

    fn name(&self) -> &str {
        self.provider.provider_name()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::base::testing::ScriptedProvider;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn rules(utterance: &str, expected: &[SessionField]) -> FactUpdate {
        RuleFactExtractor::new().extract(utterance, expected).await.unwrap()
    }

    #[tokio::test]
    async fn test_bare_answer_fills_first_expected_field() {
        let update = rules("I want to cook Chicken Curry!", &[SessionField::DishName]).await;
        assert_eq!(update.dish_name.as_deref(), Some("Chicken Curry"));
        assert!(update.pantry_items.is_none());

        let update = rules(
            "I have chicken, onions and ginger.",
            &[SessionField::PantryItems, SessionField::UserEmail],
        )
        .await;
        assert_eq!(update.pantry_items, Some(set(&["chicken", "onions", "ginger"])));
        assert!(update.dish_name.is_none());
    }

    #[tokio::test]
    async fn test_nothing_is_an_empty_pantry() {
        let update = rules("nothing", &[SessionField::PantryItems]).await;
        assert_eq!(update.pantry_items, Some(BTreeSet::new()));
    }

    #[tokio::test]
    async fn test_keyed_segments_fill_several_fields() {
        let update = rules(
            "dish: pasta carbonara; pantry: eggs, salt; email: cook@example.com",
            &[SessionField::DishName],
        )
        .await;
        assert_eq!(update.dish_name.as_deref(), Some("pasta carbonara"));
        assert_eq!(update.pantry_items, Some(set(&["eggs", "salt"])));
        assert_eq!(update.user_email.as_deref(), Some("cook@example.com"));
    }

    #[tokio::test]
    async fn test_email_picked_up_anywhere() {
        let update = rules("sure, send it to me@cooking.io thanks", &[SessionField::UserEmail]).await;
        assert_eq!(update.user_email.as_deref(), Some("me@cooking.io"));
        assert!(update.dish_name.is_none());
    }

    #[tokio::test]
    async fn test_hedges_are_not_answers() {
        let update = rules("hmm, not sure?", &[SessionField::PantryItems]).await;
        assert!(update.is_empty());

        let update = rules("let me check the fridge", &[SessionField::PantryItems]).await;
        assert!(update.pantry_items.is_none());

        let update = rules("what can I make?", &[SessionField::DishName]).await;
        assert!(update.dish_name.is_none());
    }

    #[tokio::test]
    async fn test_dish_and_email_in_one_answer() {
        let update = rules(
            "chicken curry please, confirm to cook@example.com",
            &[SessionField::DishName, SessionField::PantryItems, SessionField::UserEmail],
        )
        .await;
        assert_eq!(update.dish_name.as_deref(), Some("chicken curry"));
        assert_eq!(update.user_email.as_deref(), Some("cook@example.com"));
        assert!(update.pantry_items.is_none());

        let update = rules(
            "eggs and salt; mail me at cook@example.com",
            &[SessionField::PantryItems, SessionField::UserEmail],
        )
        .await;
        assert_eq!(update.pantry_items, Some(set(&["eggs", "salt"])));
        assert_eq!(update.user_email.as_deref(), Some("cook@example.com"));
    }

    #[tokio::test]
    async fn test_unparseable_email_answer_is_no_update() {
        let update = rules("my email is on my card", &[SessionField::UserEmail]).await;
        assert!(update.is_empty());
    }

    #[tokio::test]
    async fn test_nothing_expected_and_nothing_keyed() {
        let update = rules("hello there", &[]).await;
        assert!(update.is_empty());
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("cook@example.com"));
        assert!(is_valid_email(" first.last+tag@mail.co.uk "));
        assert!(!is_valid_email("cook@example"));
        assert!(!is_valid_email("not an email"));
    }

    #[tokio::test]
    async fn test_llm_extractor_parses_and_sanitizes() {
        let provider = ScriptedProvider::replying(
            r#"```json
            {"dish_name": "pasta carbonara", "pantry_items": ["eggs", " "], "user_email": "made-up@example.com"}
            ```"#,
        );
        let extractor = LlmFactExtractor::new(provider);

        let update = extractor
            .extract("Pasta carbonara please, I only have eggs", &[SessionField::DishName])
            .await
            .unwrap();
        assert_eq!(update.dish_name.as_deref(), Some("pasta carbonara"));
        assert_eq!(update.pantry_items, Some(set(&["eggs"])));
        assert!(update.user_email.is_none());
    }

    #[tokio::test]
    async fn test_llm_extractor_drops_ungrounded_dish() {
        let provider = ScriptedProvider::replying(r#"{"dish_name": "beef stew", "pantry_items": null}"#);
        let extractor = LlmFactExtractor::new(provider);
        let update = extractor
            .extract("something warm maybe", &[SessionField::DishName])
            .await
            .unwrap();
        assert!(update.is_empty());
    }

    #[tokio::test]
    async fn test_llm_extractor_drops_ungrounded_pantry() {
        let provider = ScriptedProvider::replying(r#"{"dish_name": "chicken curry", "pantry_items": []}"#);
        let extractor = LlmFactExtractor::new(provider);
        let update = extractor
            .extract("chicken curry", &[SessionField::DishName, SessionField::PantryItems])
            .await
            .unwrap();
        assert_eq!(update.dish_name.as_deref(), Some("chicken curry"));
        assert!(update.pantry_items.is_none());

        let provider = ScriptedProvider::replying(r#"{"pantry_items": ["rice", "saffron"]}"#);
        let extractor = LlmFactExtractor::new(provider);
        let update = extractor
            .extract("hmm let me check", &[SessionField::PantryItems])
            .await
            .unwrap();
        assert!(update.is_empty());

        let provider = ScriptedProvider::replying(r#"{"pantry_items": ["rice", "saffron"]}"#);
        let extractor = LlmFactExtractor::new(provider);
        let update = extractor
            .extract("just rice", &[SessionField::PantryItems])
            .await
            .unwrap();
        assert_eq!(update.pantry_items, Some(set(&["rice"])));
    }

    #[tokio::test]
    async fn test_llm_extractor_keeps_stated_empty_pantry() {
        let provider = ScriptedProvider::replying(r#"{"pantry_items": []}"#);
        let extractor = LlmFactExtractor::new(provider);
        let update = extractor
            .extract("I have nothing", &[SessionField::PantryItems])
            .await
            .unwrap();
        assert_eq!(update.pantry_items, Some(BTreeSet::new()));
    }

    #[tokio::test]
    async fn test_llm_extractor_bad_json_is_empty_update() {
        let extractor = LlmFactExtractor::new(ScriptedProvider::replying("I think you want curry"));
        let update = extractor.extract("curry", &[SessionField::DishName]).await.unwrap();
        assert!(update.is_empty());
    }

    #[tokio::test]
    async fn test_llm_extractor_provider_error_propagates() {
        let extractor = LlmFactExtractor::new(ScriptedProvider::new(vec![Err("timeout")]));
        assert!(extractor.extract("curry", &[SessionField::DishName]).await.is_err());
    }

    #[tokio::test]
    async fn test_llm_prompt_names_expected_fields() {
        let provider = ScriptedProvider::replying("{}");
        let extractor = LlmFactExtractor::new(provider);
        extractor
            .extract("eggs", &[SessionField::PantryItems, SessionField::UserEmail])
            .await
            .unwrap();
        let prompts = extractor.provider.prompts.lock();
        assert!(prompts[0].contains("asked for: pantry_items"));
        assert!(prompts[0].contains("pantry_items, user_email"));
    }
}
