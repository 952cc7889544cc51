use sieveform::ast::*;
use sieveform::{generate, parse, parse_with, GeneratorOptions, ParseOptions};

const CORPUS: &[&str] = &[
    "",
    "keep;",
    r#"require ["fileinto", "imap4flags", "variables", "relational", "comparator-i;ascii-numeric"];
# Filter: Move spam
if header :contains "Subject" "SPAM" {
    fileinto :flags "\\Seen" "Junk";
    stop;
}
if anyof (address :is :domain "From" ["example.com", "example.org"], exists "X-Mailing-List") {
  fileinto :copy :create "Lists";
} elsif header :value "ge" :comparator "i;ascii-numeric" "X-Spam-Score" "7" {
  discard;
} else { keep :flags ["\\Flagged", "$Work"]; }
"#,
    r#"require ["vacation", "vacation-seconds"];
vacation :seconds 3600 :subject "Out" :from "me@example.com"
    :addresses ["me@example.com", "alias@example.com"] :mime :handle "ooo"
text:
I am away.
..and this line starts with a dot.
.
;
"#,
    r#"require ["body", "date", "duplicate", "enotify", "ihave", "envelope", "subaddress"];
if allof (body :content ["text/plain", "text/html"] :matches "*unsubscribe*",
          date :originalzone :value "lt" "received" "hour" "08",
          currentdate :zone "+0200" :is "weekday" ["0", "6"],
          envelope :detail :is "to" "lists",
          not duplicate :handle "h" :uniqueid "${id}" :seconds 1M :last) {
    notify :from "bot@example.com" :importance "3" :options ["a", "b"] :message "hi"
        "mailto:me@example.com";
}
if ihave "regex" { set :lower :length "len" "${1}"; }
"#,
    r#"if string :regex "${subject}" "^\\[(.*)\\]" {
    setflag "flags" ["\\Answered", "\\Draft"]; removeflag "\\Draft";
}
if hasflag :count "gt" ["flags", "more"] "2" { redirect :copy "archive@example.com"; }
if size :under 100K { reject "too small"; }
if header :is "x" "y" { } else { }"#,
    r#"require ["editheader", "mime", "foreverypart"];
foreverypart :name "outer" {
    if mime :anychild :contenttype "Content-Type" "text/calendar" {
        addheader :last "X-Calendar" "yes";
        break :name "outer";
    }
}
deleteheader :index 1 :comparator "i;octet" "X-Spam" ["a", "b"];
if mytest :flag 2G (true, false) { customaction; }
"#,
];

fn bare(src: &str) -> Script {
    parse_with(src, &ParseOptions { locations: false, ..Default::default() })
        .unwrap_or_else(|e| panic!("{e}\n{src}"))
}

fn canonical(src: &str) -> String {
    generate(&bare(src), &GeneratorOptions::default())
}

#[test]
fn corpus_round_trips_to_equal_ast() {
    for src in CORPUS {
        let ast = bare(src);
        let regenerated = generate(&ast, &GeneratorOptions::default());
        assert_eq!(bare(&regenerated), ast, "regenerated:\n{regenerated}");
    }
}

#[test]
fn generation_reaches_fixed_point() {
    for src in CORPUS {
        let once = canonical(src);
        assert_eq!(canonical(&once), once);
    }
}

#[test]
fn round_trip_with_custom_layout() {
    let opts = GeneratorOptions { indent: "\t".to_string(), newline: "\r\n".to_string() };
    for src in CORPUS {
        let ast = bare(src);
        assert_eq!(bare(&generate(&ast, &opts)), ast);
    }
}

#[test]
fn unknown_command_regenerates_byte_for_byte() {
    let src = r#"customaction :opt "x";"#;
    let script = bare(src);
    let Command::Generic(cmd) = &script.commands[0] else {
        panic!("Expected GenericCommand");
    };
    assert_eq!(cmd.name, "customaction");
    assert_eq!(
        cmd.arguments,
        [
            Argument::Tag { name: "opt".to_string(), location: None },
            Argument::String(SieveString::new("x")),
        ]
    );
    assert_eq!(canonical(src), src);
}

#[test]
fn quantifier_round_trip() {
    let script = bare("if size :over 10K { }");
    let Command::If(cmd) = &script.commands[0] else {
        panic!("Expected If");
    };
    assert_eq!(
        cmd.test,
        Test::Size(SizeTest {
            over: true,
            size: Number { value: 10240, quantifier: Some(Quantifier::K), location: None },
            location: None,
        })
    );
    assert_eq!(canonical("if size :over 10K { }"), "if size :over 10K {}");
    // At top level `size` is not a command keyword, so it is kept as a generic command.
    assert_eq!(canonical("size :over 10K;"), "size :over 10K;");
}

#[test]
fn hand_built_odd_quantifier_falls_back_to_plain_integer() {
    let script = Script::new(vec![Command::If(IfCommand {
        test: Test::Size(SizeTest {
            over: false,
            size: Number { value: 1536, quantifier: Some(Quantifier::K), location: None },
            location: None,
        }),
        consequent: Block::default(),
        alternate: None,
        location: None,
    })]);
    let text = generate(&script, &GeneratorOptions::default());
    assert_eq!(text, "if size :under 1536 {}");
    let Command::If(reparsed) = &bare(&text).commands[0] else {
        panic!("Expected If");
    };
    assert!(matches!(
        &reparsed.test,
        Test::Size(s) if s.size.value == 1536 && s.size.quantifier.is_none()
    ));
}

#[test]
fn nested_combinators_keep_their_shape() {
    let src = "if anyof (true, allof(false, not true)) { keep; }";
    let script = bare(src);
    let expected = Test::any_of(vec![
        Test::True { location: None },
        Test::all_of(vec![
            Test::False { location: None },
            Test::not(Test::True { location: None }),
        ])
        .unwrap(),
    ])
    .unwrap();
    let Command::If(cmd) = &script.commands[0] else {
        panic!("Expected If");
    };
    assert_eq!(cmd.test, expected);
    assert_eq!(
        generate(&script, &GeneratorOptions::default()),
        "if anyof (true, allof (false, not true)) {\n    keep;\n}"
    );
}

#[test]
fn singleton_bracket_list_is_normalized() {
    assert_eq!(canonical(r#"require ["fileinto"];"#), r#"require "fileinto";"#);
    // Generic arguments lose the bracket too and re-parse as a plain string.
    let out = canonical(r#"addheader ["X"] "y";"#);
    assert_eq!(out, r#"addheader "X" "y";"#);
    assert!(matches!(
        &bare(&out).commands[0],
        Command::Generic(g) if matches!(g.arguments[0], Argument::String(_))
    ));
}

#[test]
fn locations_cover_source() {
    let src = "keep;\n  stop;";
    let script = parse(src).unwrap();
    let loc = script.commands[1].location().unwrap();
    assert_eq!((loc.start.line, loc.start.column, loc.start.offset), (2, 3, 8));
    assert_eq!((loc.end.line, loc.end.column, loc.end.offset), (2, 8, 13));
    assert_eq!(script.location.unwrap().end.offset, src.len());
}

#[test]
fn parallel_parses_are_independent() {
    let handles: Vec<_> = CORPUS
        .iter()
        .map(|src| std::thread::spawn(move || canonical(src)))
        .collect();
    let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let sequential: Vec<String> = CORPUS.iter().map(|src| canonical(src)).collect();
    assert_eq!(results, sequential);
}
