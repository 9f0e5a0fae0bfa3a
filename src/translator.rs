use crate::direction::{Direction, Language};
use crate::glossary::GlossaryStore;
use crate::llm::TextGenerator;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?").expect("code fence pattern is valid"));

#[derive(Debug, Error)]
pub enum TranslateError {
    /// The glossary could not be read
    #[error("glossary storage error: {0:#}")]
    Storage(#[source] anyhow::Error),

    #[error("{0:#}")]
    Service(#[source] anyhow::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    #[error("response JSON has no string 'translation' field")]
    MissingTranslation,
}

impl TranslateError {
    /// Errors recovered at the display boundary instead of aborting
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TranslateError::Storage(_))
    }
}

/// Build the single instruction sent to the text-generation service
pub fn build_translation_prompt(glossary_fragment: &str, target: Language, text: &str) -> String {
    format!(
        r#"You are a translator specialized in mine-action terminology for Laos.
Use these exact terms (never change them):
{glossary}

Translate ONLY this text to {target}.
Return ONLY this JSON: {{"translation": "your_translation_here"}}

Text: {text}"#,
        glossary = glossary_fragment,
        target = target.name(),
        text = text,
    )
}

/// Remove Markdown code-fence markers the model may wrap its JSON in
pub fn strip_code_fences(reply: &str) -> String {
    CODE_FENCE.replace_all(reply.trim(), "").trim().to_string()
}

/// Extract the `translation` field from a (possibly fenced) JSON reply
pub fn parse_translation_reply(reply: &str) -> Result<String, TranslateError> {
    let cleaned = strip_code_fences(reply);
    let value: serde_json::Value = serde_json::from_str(&cleaned)?;

    value
        .get("translation")
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or(TranslateError::MissingTranslation)
}

/// Render a recovered failure the way the user sees it
pub fn render_error(error: &TranslateError) -> String {
    format!("[Error: {}]", error)
}

/// Glossary-constrained translator.
///
/// The glossary is injected into the prompt as context only; nothing checks
/// that the model actually used the mandated terms.
pub struct Translator<G> {
    store: GlossaryStore,
    generator: G,
}

impl<G: TextGenerator> Translator<G> {
    pub fn new(store: GlossaryStore, generator: G) -> Self {
        Self { store, generator }
    }

    pub fn store(&self) -> &GlossaryStore {
        &self.store
    }

    /// Translate `text` in `direction`. Blank input yields `""` without
    /// contacting the service.
    pub async fn translate(&self, text: &str, direction: Direction) -> Result<String, TranslateError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let glossary = self
            .store
            .render_as_prompt_fragment()
            .map_err(TranslateError::Storage)?;
        let prompt = build_translation_prompt(&glossary, direction.target_language(), text);

        debug!("Translating {} chars ({})", text.len(), direction.code());

        let reply = self
            .generator
            .generate(&prompt)
            .await
            .map_err(TranslateError::Service)?;

        parse_translation_reply(&reply)
    }

    /// Like [`Translator::translate`], but service and response failures come
    /// back as `[Error: ...]` text. Storage failures still propagate.
    pub async fn translate_for_display(
        &self,
        text: &str,
        direction: Direction,
    ) -> anyhow::Result<String> {
        match self.translate(text, direction).await {
            Ok(translation) => Ok(translation),
            Err(e) if e.is_recoverable() => {
                warn!("Translation failed ({}): {}", direction.code(), e);
                Ok(render_error(&e))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Translate each fragment separately, returning results in the same order.
    /// Whitespace-only fragments are passed through untouched. Leading and
    /// trailing whitespace of a fragment is kept around its translation, since
    /// adjacent runs rely on it for word spacing.
    pub async fn translate_fragments(
        &self,
        fragments: &[String],
        direction: Direction,
    ) -> Vec<Result<String, TranslateError>> {
        let mut results = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            if fragment.trim().is_empty() {
                results.push(Ok(fragment.clone()));
                continue;
            }
            let (lead, core, trail) = split_padding(fragment);
            let result = self
                .translate(core, direction)
                .await
                .map(|translated| format!("{}{}{}", lead, translated.trim(), trail));
            results.push(result);
        }
        results
    }
}

/// Split into leading whitespace, content and trailing whitespace
fn split_padding(s: &str) -> (&str, &str, &str) {
    let start = s.len() - s.trim_start().len();
    let end = s.trim_end().len();
    if start >= end {
        return (s, "", "");
    }
    (&s[..start], &s[start..end], &s[end..])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Mutex;

    // ==================== Test Doubles ====================

    /// Generator that returns a canned reply and records every prompt
    pub(crate) struct CannedGenerator {
        reply: Result<String, String>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl CannedGenerator {
        pub(crate) fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl TextGenerator for CannedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(message) => Err(anyhow::anyhow!(message.clone())),
            }
        }
    }

    /// Generator that must never be reached
    struct UnreachableGenerator;

    impl TextGenerator for UnreachableGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            panic!("text-generation service must not be called");
        }
    }

    fn seeded_store() -> GlossaryStore {
        let store = GlossaryStore::open_in_memory().unwrap();
        store.insert("uxo", "ລບຕ").unwrap();
        store
    }

    // ==================== Prompt Tests ====================

    #[test]
    fn test_prompt_contains_all_parts() {
        let prompt = build_translation_prompt("• Uxo → ລບຕ", Language::Lao, "There is a UXO here.");

        assert!(prompt.contains("mine-action terminology for Laos"));
        assert!(prompt.contains("Use these exact terms"));
        assert!(prompt.contains("• Uxo → ລບຕ"));
        assert!(prompt.contains("to Lao."));
        assert!(prompt.contains(r#"{"translation": "your_translation_here"}"#));
        assert!(prompt.ends_with("Text: There is a UXO here."));
    }

    #[test]
    fn test_prompt_targets_english() {
        let prompt = build_translation_prompt("No terms yet.", Language::English, "ສະບາຍດີ");
        assert!(prompt.contains("Translate ONLY this text to English."));
        assert!(prompt.contains("No terms yet."));
    }

    // ==================== Reply Parsing Tests ====================

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(
            strip_code_fences("```json\n{\"translation\": \"x\"}\n```"),
            "{\"translation\": \"x\"}"
        );
        assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }

    #[test]
    fn test_parse_plain_json() {
        assert_eq!(
            parse_translation_reply(r#"{"translation": "ສະບາຍດີ"}"#).unwrap(),
            "ສະບາຍດີ"
        );
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = "```json\n{\"translation\": \"hello\"}\n```";
        assert_eq!(parse_translation_reply(reply).unwrap(), "hello");
    }

    #[test]
    fn test_parse_not_json() {
        let err = parse_translation_reply("not json at all").unwrap_err();
        assert!(matches!(err, TranslateError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_missing_field() {
        let err = parse_translation_reply(r#"{"text": "hello"}"#).unwrap_err();
        assert!(matches!(err, TranslateError::MissingTranslation));

        let err = parse_translation_reply(r#"{"translation": 42}"#).unwrap_err();
        assert!(matches!(err, TranslateError::MissingTranslation));
    }

    #[test]
    fn test_render_error_is_bracketed() {
        let rendered = render_error(&TranslateError::MissingTranslation);
        assert!(rendered.starts_with("[Error:"));
        assert!(rendered.ends_with(']'));
    }

    // ==================== translate Tests ====================

    #[tokio::test]
    async fn test_empty_input_short_circuits() {
        let translator = Translator::new(seeded_store(), UnreachableGenerator);

        assert_eq!(translator.translate("", Direction::EnglishToLao).await.unwrap(), "");
        assert_eq!(translator.translate("   ", Direction::EnglishToLao).await.unwrap(), "");
        assert_eq!(
            translator
                .translate_for_display("\n\t", Direction::LaoToEnglish)
                .await
                .unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn test_end_to_end_with_glossary() {
        let generator = CannedGenerator::replying(r#"{"translation": "ມີ ລບຕ ຢູ່ບ່ອນນີ້."}"#);
        let translator = Translator::new(seeded_store(), generator);

        let result = translator
            .translate("There is a UXO here.", Direction::EnglishToLao)
            .await
            .unwrap();

        assert_eq!(result, "ມີ ລບຕ ຢູ່ບ່ອນນີ້.");
        let prompts = translator.generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("• Uxo → ລບຕ"));
        assert!(prompts[0].contains("to Lao."));
        assert!(prompts[0].contains("There is a UXO here."));
    }

    #[tokio::test]
    async fn test_prompt_reflects_newly_taught_terms() {
        let store = seeded_store();
        let translator = Translator::new(store.clone(), CannedGenerator::replying(r#"{"translation": "ok"}"#));

        store.insert("Deminer", "ນັກເກັບກູ້").unwrap();
        translator.translate("deminer", Direction::EnglishToLao).await.unwrap();

        let prompts = translator.generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("• Deminer → ນັກເກັບກູ້"));
    }

    #[tokio::test]
    async fn test_malformed_reply_degrades_to_error_string() {
        let translator = Translator::new(seeded_store(), CannedGenerator::replying("not json at all"));

        let shown = translator
            .translate_for_display("Hello", Direction::EnglishToLao)
            .await
            .expect("Should not propagate");

        assert!(shown.starts_with("[Error:"));
    }

    #[tokio::test]
    async fn test_service_failure_degrades_to_error_string() {
        let translator = Translator::new(seeded_store(), CannedGenerator::failing("connection refused"));

        let err = translator
            .translate("Hello", Direction::EnglishToLao)
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::Service(_)));

        let shown = translator
            .translate_for_display("Hello", Direction::EnglishToLao)
            .await
            .unwrap();
        assert_eq!(shown, "[Error: connection refused]");
    }

    #[tokio::test]
    async fn test_translate_fragments_is_parallel_sequence() {
        let translator = Translator::new(seeded_store(), CannedGenerator::replying(r#"{"translation": "T"}"#));
        let fragments = vec!["one".to_string(), "  ".to_string(), "two".to_string()];

        let results = translator
            .translate_fragments(&fragments, Direction::LaoToEnglish)
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_deref().unwrap(), "T");
        assert_eq!(results[1].as_deref().unwrap(), "  ");
        assert_eq!(results[2].as_deref().unwrap(), "T");
        assert_eq!(translator.generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_translate_fragments_keeps_run_padding() {
        let translator = Translator::new(seeded_store(), CannedGenerator::replying(r#"{"translation": " Word "}"#));
        let fragments = vec![
            "Mine ".to_string(),
            "clearance".to_string(),
            "\tsurvey\n".to_string(),
        ];

        let results = translator
            .translate_fragments(&fragments, Direction::EnglishToLao)
            .await;

        assert_eq!(results[0].as_deref().unwrap(), "Word ");
        assert_eq!(results[1].as_deref().unwrap(), "Word");
        assert_eq!(results[2].as_deref().unwrap(), "\tWord\n");

        // Only the content is sent for translation
        let prompts = translator.generator.prompts.lock().unwrap();
        assert!(prompts[0].ends_with("Text: Mine"));
        assert!(prompts[2].ends_with("Text: survey"));
    }

    #[test]
    fn test_split_padding() {
        assert_eq!(split_padding("  a b "), ("  ", "a b", " "));
        assert_eq!(split_padding("word"), ("", "word", ""));
        assert_eq!(split_padding("   "), ("   ", "", ""));
        assert_eq!(split_padding(""), ("", "", ""));
    }

    // ==================== Storage Failure Tests ====================

    /// Store whose table has been dropped behind its back
    fn broken_store(temp_dir: &tempfile::TempDir) -> GlossaryStore {
        let path = temp_dir.path().join("glossary.db");
        let path = path.to_str().unwrap();
        let store = GlossaryStore::open(path).unwrap();
        rusqlite::Connection::open(path)
            .unwrap()
            .execute("DROP TABLE glossary", [])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_storage_failure_propagates_from_display() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let translator = Translator::new(broken_store(&temp_dir), UnreachableGenerator);

        let err = translator
            .translate("Hello", Direction::EnglishToLao)
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::Storage(_)));

        let result = translator
            .translate_for_display("Hello", Direction::EnglishToLao)
            .await;
        assert!(result.is_err(), "Storage failure must not be rendered inline");
    }

    #[test]
    fn test_storage_is_not_recoverable() {
        assert!(!TranslateError::Storage(anyhow::anyhow!("disk full")).is_recoverable());
        assert!(TranslateError::MissingTranslation.is_recoverable());
    }
}
