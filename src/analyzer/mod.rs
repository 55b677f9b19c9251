pub mod languages;
pub mod syntax;

pub use languages::{LanguageConfig, LanguageFamily, family_for_path};
pub use syntax::{Analysis, CallSite, Definition, SyntaxAnalyzer};
