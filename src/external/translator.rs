//! Translation capability interface.

use crate::error::Result;

pub trait Translator: Send {
    fn translate(&mut self, source_lang: &str, target_lang: &str, text: &str) -> Result<String>;
}
