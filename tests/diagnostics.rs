use sieveform::{get_error, parse, validate, DiagnosticKind, Expected};

const SCRIPT: &str = "require \"fileinto\";
if header :is \"X\" \"y\" {
    fileinto \"A\";
    stop;
}
keep;
";

#[test]
fn missing_semicolon_after_stop() {
    assert!(validate(SCRIPT));
    let broken = SCRIPT.replacen("stop;", "stop", 1);
    let diag = parse(&broken).unwrap_err();
    assert_eq!(diag.kind, DiagnosticKind::Syntax);
    assert_eq!((diag.line(), diag.column()), (5, 1));
    assert_eq!(diag.found.as_deref(), Some("}"));
    assert_eq!(diag.expected, [Expected::literal(";")]);
    assert_eq!(diag.message, "Expected \";\" but \"}\" found.");
}

#[test]
fn missing_closing_brace_at_end_of_input() {
    let broken = SCRIPT.replacen("}\n", "\n", 1);
    let diag = parse(&broken).unwrap_err();
    assert_eq!(diag.found, None);
    assert_eq!(diag.line(), 7);
    assert_eq!(diag.column(), 1);
    assert!(diag.expected.contains(&Expected::literal("}")));
}

#[test]
fn missing_opening_brace() {
    let broken = SCRIPT.replacen(" {", "", 1);
    let diag = parse(&broken).unwrap_err();
    assert_eq!((diag.line(), diag.column()), (3, 5));
    assert_eq!(diag.found.as_deref(), Some("fileinto"));
    assert!(diag.expected.contains(&Expected::literal("{")));
}

#[test]
fn lexical_errors() {
    let diag = parse("reject \"bad \\n escape\";").unwrap_err();
    assert_eq!(diag.kind, DiagnosticKind::Lexical);
    assert_eq!(diag.column(), 13);

    let diag = parse("reject text:\nno terminator\n").unwrap_err();
    assert_eq!(diag.kind, DiagnosticKind::Lexical);
    assert_eq!(diag.message, "Unterminated multi-line string");

    let diag = parse("keep; /* open").unwrap_err();
    assert_eq!(diag.kind, DiagnosticKind::Lexical);
    assert_eq!(diag.column(), 7);
}

#[test]
fn empty_combinators_are_syntax_errors() {
    for src in ["if allof () { }", "if anyof () { }", "if not { }"] {
        let diag = parse(src).unwrap_err();
        assert_eq!(diag.kind, DiagnosticKind::Syntax, "{src}");
        assert!(diag.expected.contains(&Expected::class("identifier")), "{src}");
    }
}

#[test]
fn columns_count_characters_not_bytes() {
    let diag = parse("reject \"héllo\" keep;").unwrap_err();
    assert_eq!(diag.column(), 16);
    assert_eq!(diag.location.start.offset, 16);
}

#[test]
fn validate_and_get_error_follow_parse() {
    assert!(validate("if true { keep; }"));
    assert!(get_error("if true { keep; }").is_none());
    assert!(!validate("if true keep;"));
    let diag = get_error("if true keep;").unwrap();
    assert_eq!(diag.found.as_deref(), Some("keep"));
}

#[test]
fn display_includes_position() {
    let diag = parse("stop").unwrap_err();
    assert_eq!(diag.to_string(), "Expected \";\" but end of input found at line 1, column 5");
}

#[test]
fn render_draws_caret() {
    let src = "keep;\nfileinto 42;";
    let diag = parse(src).unwrap_err();
    let out = diag.render(src, "rules.sieve");
    assert!(out.starts_with("error: Expected"));
    assert!(out.contains("--> rules.sieve:2:10"));
    assert!(out.contains("2 | fileinto 42;"));
    assert!(out.ends_with("  |          ^^"));
}
