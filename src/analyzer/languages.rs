use tree_sitter::Language;

/// Source language family, used by the regex heuristics that sit beside the AST pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageFamily {
    Script,
    Python,
}

pub struct LanguageConfig {
    pub name: &'static str,
    pub family: LanguageFamily,
    pub language: Language,
    pub extensions: &'static [&'static str],
    pub definition_query: &'static str,
    pub call_query: &'static str,
}

impl LanguageConfig {
    pub fn get_all() -> Vec<LanguageConfig> {
        vec![
            python_config(),
            typescript_config(),
            tsx_config(),
            javascript_config(),
        ]
    }

    pub fn get_by_extension(ext: &str) -> Option<LanguageConfig> {
        let ext = ext.to_ascii_lowercase();
        Self::get_all()
            .into_iter()
            .find(|c| c.extensions.contains(&ext.as_str()))
    }

    /// Resolve a (forward-slash) file path to its language config.
    pub fn for_path(file_path: &str) -> Option<LanguageConfig> {
        let file_name = file_path.rsplit('/').next().unwrap_or(file_path);
        let (_, ext) = file_name.rsplit_once('.')?;
        Self::get_by_extension(ext)
    }
}

/// Language family of a path, `None` for languages without a grammar here.
pub fn family_for_path(file_path: &str) -> Option<LanguageFamily> {
    LanguageConfig::for_path(file_path).map(|c| c.family)
}

fn python_config() -> LanguageConfig {
    LanguageConfig {
        name: "python",
        family: LanguageFamily::Python,
        language: tree_sitter_python::LANGUAGE.into(),
        extensions: &["py", "pyi"],
        definition_query: r#"
(function_definition
  name: (identifier) @name) @function

(class_definition
  name: (identifier) @name) @class
"#,
        call_query: r#"
(call
  function: (_) @callee) @call
"#,
    }
}

const TS_DEFINITIONS: &str = r#"
(function_declaration
  name: (identifier) @name) @function

(generator_function_declaration
  name: (identifier) @name) @function

(variable_declarator
  name: (identifier) @name
  value: [(arrow_function) (function_expression)]) @function

(class_declaration
  name: (type_identifier) @name) @class

(abstract_class_declaration
  name: (type_identifier) @name) @class

(method_definition
  name: (property_identifier) @name) @method

(interface_declaration
  name: (type_identifier) @name) @interface

(type_alias_declaration
  name: (type_identifier) @name) @type

(enum_declaration
  name: (identifier) @name) @enum
"#;

const SCRIPT_CALLS: &str = r#"
(call_expression
  function: (_) @callee) @call

(new_expression
  constructor: (_) @callee) @call
"#;

fn typescript_config() -> LanguageConfig {
    LanguageConfig {
        name: "typescript",
        family: LanguageFamily::Script,
        language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        extensions: &["ts", "mts", "cts"],
        definition_query: TS_DEFINITIONS,
        call_query: SCRIPT_CALLS,
    }
}

fn tsx_config() -> LanguageConfig {
    LanguageConfig {
        name: "tsx",
        family: LanguageFamily::Script,
        language: tree_sitter_typescript::LANGUAGE_TSX.into(),
        extensions: &["tsx"],
        definition_query: TS_DEFINITIONS,
        call_query: SCRIPT_CALLS,
    }
}

fn javascript_config() -> LanguageConfig {
    LanguageConfig {
        name: "javascript",
        family: LanguageFamily::Script,
        language: tree_sitter_javascript::LANGUAGE.into(),
        extensions: &["js", "jsx", "mjs", "cjs"],
        definition_query: r#"
(function_declaration
  name: (identifier) @name) @function

(generator_function_declaration
  name: (identifier) @name) @function

(variable_declarator
  name: (identifier) @name
  value: [(arrow_function) (function_expression)]) @function

(class_declaration
  name: (identifier) @name) @class

(method_definition
  name: (property_identifier) @name) @method
"#,
        call_query: SCRIPT_CALLS,
    }
}
