pub mod ast;
pub mod capabilities;
pub mod diagnostic;
pub mod emitter;
pub mod grammar;
pub mod lexer;
pub mod parser;

pub use diagnostic::Diagnostic;
pub use emitter::{generate, GeneratorOptions};
pub use parser::{parse, parse_with, ParseOptions};

/// `true` when `input` parses without error.
pub fn validate(input: &str) -> bool {
    parse(input).is_ok()
}

/// The diagnostic `parse` would return, if any.
pub fn get_error(input: &str) -> Option<Diagnostic> {
    parse(input).err()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_agrees_with_parse() {
        for src in ["", "keep;", "if true { stop; }", "keep", "if allof () {}", "\"x\";"] {
            assert_eq!(validate(src), parse(src).is_ok(), "{src:?}");
            assert_eq!(get_error(src).is_none(), validate(src), "{src:?}");
        }
    }
}
