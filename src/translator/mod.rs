//! Translator: groups committed tokens by sentence boundary (or a
//! time-bounded window when no boundary arrives in time) and calls the
//! external translation model once per group.

use tracing::warn;

use crate::error::Result;
use crate::external::translator::Translator as TranslatorModel;
use crate::model::{Token, Translation};

/// Upper bound on how long an in-flight group waits for a sentence
/// terminator before it is translated anyway.
const MAX_GROUP_SECS: f64 = 5.0;

pub struct Translator {
    model: Box<dyn TranslatorModel>,
    source_lang: String,
    target_lang: String,

    pending: Vec<Token>,
    pending_start: f64,
    buffer: String,
    degraded: bool,
}

impl Translator {
    pub fn new(model: Box<dyn TranslatorModel>, source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            model,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            pending: Vec::new(),
            pending_start: 0.0,
            buffer: String::new(),
            degraded: false,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// The tentative translation text for the in-flight group.
    pub fn translation_buffer(&self) -> &str {
        &self.buffer
    }

    fn group_ready(&self, now: f64) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        if self.pending.last().unwrap().ends_sentence() {
            return true;
        }
        now - self.pending_start >= MAX_GROUP_SECS
    }

    /// Feed newly committed tokens and advance the grouping state;
    /// returns any `Translation`s finalized on this call.
    pub fn feed(&mut self, new_tokens: &[Token], now: f64) -> Result<Vec<Translation>> {
        if self.degraded {
            return Ok(vec![]);
        }

        for token in new_tokens {
            if token.is_silence_marker() {
                continue;
            }
            if self.pending.is_empty() {
                self.pending_start = token.start;
            }
            self.pending.push(token.clone());
        }

        let mut produced = Vec::new();
        while self.group_ready(now) {
            let group = std::mem::take(&mut self.pending);
            let start = group.first().unwrap().start;
            let end = group.last().unwrap().end;
            let text = group
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join("")
                .trim()
                .to_string();

            match self.model.translate(&self.source_lang, &self.target_lang, &text) {
                Ok(translated) => {
                    self.buffer.clear();
                    produced.push(Translation {
                        start,
                        end,
                        text: translated,
                    });
                }
                Err(e) => {
                    warn!("translation failed, skipping group: {e}");
                }
            }
        }
        if !self.pending.is_empty() {
            self.buffer = self
                .pending
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join("")
                .trim()
                .to_string();
        }
        Ok(produced)
    }

    /// Mark this translator degraded after a model-level fatal condition,
    /// per `TranslatorFailure`'s recovery policy (translation disabled for
    /// the rest of the session, not the session itself).
    pub fn degrade(&mut self) {
        self.degraded = true;
        self.pending.clear();
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as CrateResult;

    struct EchoModel;
    impl TranslatorModel for EchoModel {
        fn translate(&mut self, _source: &str, target: &str, text: &str) -> CrateResult<String> {
            Ok(format!("[{target}] {text}"))
        }
    }

    fn token(start: f64, end: f64, text: &str) -> Token {
        Token::new(start, end, text)
    }

    #[test]
    fn sentence_terminal_token_closes_the_group() {
        let mut t = Translator::new(Box::new(EchoModel), "en", "fr");
        let out = t
            .feed(&[token(0.0, 0.5, "Hello "), token(0.5, 1.0, "world.")], 1.0)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "[fr] Hello world.");
    }

    #[test]
    fn group_without_terminator_waits_then_flushes_on_timeout() {
        let mut t = Translator::new(Box::new(EchoModel), "en", "fr");
        let out = t.feed(&[token(0.0, 0.5, "Hello")], 1.0).unwrap();
        assert!(out.is_empty());
        assert_eq!(t.translation_buffer(), "Hello");

        let out = t.feed(&[], 6.0).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn failed_translation_skips_the_group_without_retry() {
        struct FailingModel;
        impl TranslatorModel for FailingModel {
            fn translate(&mut self, _source: &str, _target: &str, _text: &str) -> CrateResult<String> {
                Err(crate::error::Error::TranslatorFailure("boom".into()))
            }
        }
        let mut t = Translator::new(Box::new(FailingModel), "en", "fr");
        let out = t.feed(&[token(0.0, 0.5, "Hello.")], 1.0).unwrap();
        assert!(out.is_empty());
        assert_eq!(t.translation_buffer(), "");
    }
}
