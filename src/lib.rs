//! Glossary-constrained English/Lao translation for mine-action documents.
//!
//! The [`glossary::GlossaryStore`] holds the mandated term translations, the
//! [`translator::Translator`] injects them into every prompt sent to a
//! [`llm::TextGenerator`], and [`document`] applies the translator to office
//! files run by run.

pub mod config;
pub mod direction;
pub mod document;
pub mod glossary;
pub mod llm;
pub mod server;
pub mod translator;
