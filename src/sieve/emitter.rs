/// Emit SIEVE script text from AST nodes.
///
/// Output is canonical: single spaces between tokens, tags in a fixed order,
/// one command per line, nested blocks indented. Parsing the output yields
/// the same tree up to locations, singleton list brackets and quantifiers
/// that do not divide the value evenly.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sieve::ast::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorOptions {
    /// One nesting level.
    pub indent: String,
    /// Line terminator between commands and around `text:` bodies.
    pub newline: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self { indent: "    ".to_string(), newline: "\n".to_string() }
    }
}

/// Render a script. Commands are joined by the newline; there is no trailing
/// newline after the last one.
pub fn generate(script: &Script, options: &GeneratorOptions) -> String {
    tracing::debug!(commands = script.commands.len(), "generating sieve source");
    let mut out = String::new();
    emit_commands(&mut out, &script.commands, 0, options);
    out
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&generate(self, &GeneratorOptions::default()))
    }
}

impl fmt::Display for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        emit_test(&mut out, self, &GeneratorOptions::default());
        f.write_str(&out)
    }
}

fn emit_commands(out: &mut String, commands: &[Command], depth: usize, opts: &GeneratorOptions) {
    for (i, cmd) in commands.iter().enumerate() {
        if i > 0 {
            out.push_str(&opts.newline);
        }
        emit_command(out, cmd, depth, opts);
    }
}

fn emit_block(out: &mut String, block: &Block, depth: usize, opts: &GeneratorOptions) {
    if block.commands.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push('{');
    out.push_str(&opts.newline);
    emit_commands(out, &block.commands, depth + 1, opts);
    out.push_str(&opts.newline);
    push_indent(out, depth, opts);
    out.push('}');
}

fn push_indent(out: &mut String, depth: usize, opts: &GeneratorOptions) {
    for _ in 0..depth {
        out.push_str(&opts.indent);
    }
}

fn emit_command(out: &mut String, cmd: &Command, depth: usize, opts: &GeneratorOptions) {
    push_indent(out, depth, opts);
    match cmd {
        Command::Require(req) => {
            out.push_str("require ");
            emit_quoted_list(out, &req.capabilities);
        }
        Command::If(cmd) => {
            out.push_str("if ");
            emit_test(out, &cmd.test, opts);
            out.push(' ');
            emit_block(out, &cmd.consequent, depth, opts);
            let mut alternate = cmd.alternate.as_deref();
            while let Some(alt) = alternate {
                match alt {
                    Alternate::ElsIf(elsif) => {
                        out.push_str(" elsif ");
                        emit_test(out, &elsif.test, opts);
                        out.push(' ');
                        emit_block(out, &elsif.consequent, depth, opts);
                        alternate = elsif.alternate.as_deref();
                    }
                    Alternate::Else(els) => {
                        out.push_str(" else ");
                        emit_block(out, &els.consequent, depth, opts);
                        alternate = None;
                    }
                }
            }
            return;
        }
        Command::Stop { .. } => out.push_str("stop"),
        Command::Discard { .. } => out.push_str("discard"),
        Command::Keep(keep) => {
            out.push_str("keep");
            if let Some(flags) = &keep.flags {
                out.push_str(" :flags ");
                emit_string_or_list(out, flags, opts);
            }
        }
        Command::Fileinto(cmd) => {
            out.push_str("fileinto");
            if cmd.copy {
                out.push_str(" :copy");
            }
            if cmd.create {
                out.push_str(" :create");
            }
            if let Some(flags) = &cmd.flags {
                out.push_str(" :flags ");
                emit_string_or_list(out, flags, opts);
            }
            out.push(' ');
            emit_string(out, &cmd.mailbox, opts);
        }
        Command::Redirect(cmd) => {
            out.push_str("redirect");
            if cmd.copy {
                out.push_str(" :copy");
            }
            out.push(' ');
            emit_string(out, &cmd.address, opts);
        }
        Command::Reject(cmd) => {
            out.push_str("reject ");
            emit_string(out, &cmd.reason, opts);
        }
        Command::Set(cmd) => {
            out.push_str("set");
            for modifier in &cmd.modifiers {
                out.push_str(" :");
                out.push_str(modifier.as_sieve());
            }
            out.push(' ');
            emit_string(out, &cmd.name, opts);
            out.push(' ');
            emit_string(out, &cmd.value, opts);
        }
        Command::Vacation(cmd) => emit_vacation(out, cmd, opts),
        Command::Flag(cmd) => {
            out.push_str(cmd.action.as_sieve());
            if let Some(var) = &cmd.variable_name {
                out.push(' ');
                emit_string(out, var, opts);
            }
            out.push(' ');
            emit_string_or_list(out, &cmd.flags, opts);
        }
        Command::Notify(cmd) => emit_notify(out, cmd, opts),
        Command::Generic(cmd) => {
            out.push_str(&cmd.name);
            emit_arguments(out, &cmd.arguments, opts);
            if let Some(block) = &cmd.block {
                out.push(' ');
                emit_block(out, block, depth, opts);
                return;
            }
        }
    }
    out.push(';');
}

fn emit_vacation(out: &mut String, cmd: &VacationCommand, opts: &GeneratorOptions) {
    out.push_str("vacation");
    if let Some(days) = &cmd.days {
        out.push_str(" :days ");
        emit_number(out, days);
    }
    if let Some(seconds) = &cmd.seconds {
        out.push_str(" :seconds ");
        emit_number(out, seconds);
    }
    emit_tagged_string(out, "subject", cmd.subject.as_ref(), opts);
    emit_tagged_string(out, "from", cmd.from.as_ref(), opts);
    if let Some(addresses) = &cmd.addresses {
        out.push_str(" :addresses ");
        emit_string_or_list(out, addresses, opts);
    }
    if cmd.mime {
        out.push_str(" :mime");
    }
    emit_tagged_string(out, "handle", cmd.handle.as_ref(), opts);
    out.push(' ');
    emit_string(out, &cmd.reason, opts);
}

fn emit_notify(out: &mut String, cmd: &NotifyCommand, opts: &GeneratorOptions) {
    out.push_str("notify");
    emit_tagged_string(out, "from", cmd.from.as_ref(), opts);
    if let Some(importance) = cmd.importance {
        out.push_str(" :importance \"");
        out.push_str(importance.as_sieve());
        out.push('"');
    }
    if let Some(options) = &cmd.options {
        out.push_str(" :options ");
        emit_string_or_list(out, options, opts);
    }
    emit_tagged_string(out, "message", cmd.message.as_ref(), opts);
    out.push(' ');
    emit_string(out, &cmd.method, opts);
}

fn emit_tagged_string(
    out: &mut String,
    tag: &str,
    value: Option<&SieveString>,
    opts: &GeneratorOptions,
) {
    if let Some(value) = value {
        out.push_str(" :");
        out.push_str(tag);
        out.push(' ');
        emit_string(out, value, opts);
    }
}

fn emit_test(out: &mut String, test: &Test, opts: &GeneratorOptions) {
    match test {
        Test::True { .. } => out.push_str("true"),
        Test::False { .. } => out.push_str("false"),
        Test::Not { test, .. } => {
            out.push_str("not ");
            emit_test(out, test, opts);
        }
        Test::AllOf { tests, .. } => {
            out.push_str("allof ");
            emit_test_list(out, tests, opts);
        }
        Test::AnyOf { tests, .. } => {
            out.push_str("anyof ");
            emit_test_list(out, tests, opts);
        }
        Test::Address(t) => {
            out.push_str("address");
            emit_match_options(out, t.address_part, &t.options, opts);
            out.push(' ');
            emit_string_or_list(out, &t.headers, opts);
            out.push(' ');
            emit_string_or_list(out, &t.keys, opts);
        }
        Test::Envelope(t) => {
            out.push_str("envelope");
            emit_match_options(out, t.address_part, &t.options, opts);
            out.push(' ');
            emit_string_or_list(out, &t.envelope_parts, opts);
            out.push(' ');
            emit_string_or_list(out, &t.keys, opts);
        }
        Test::Header(t) => {
            out.push_str("header");
            emit_match_options(out, None, &t.options, opts);
            out.push(' ');
            emit_string_or_list(out, &t.headers, opts);
            out.push(' ');
            emit_string_or_list(out, &t.keys, opts);
        }
        Test::Exists { headers, .. } => {
            out.push_str("exists ");
            emit_string_or_list(out, headers, opts);
        }
        Test::Size(t) => {
            out.push_str(if t.over { "size :over " } else { "size :under " });
            emit_number(out, &t.size);
        }
        Test::Body(t) => {
            out.push_str("body");
            match &t.transform {
                Some(BodyTransform::Raw) => out.push_str(" :raw"),
                Some(BodyTransform::Text) => out.push_str(" :text"),
                Some(BodyTransform::Content(types)) => {
                    out.push_str(" :content ");
                    emit_string_or_list(out, types, opts);
                }
                None => {}
            }
            emit_match_options(out, None, &t.options, opts);
            out.push(' ');
            emit_string_or_list(out, &t.keys, opts);
        }
        Test::Date(t) => {
            out.push_str("date");
            emit_tagged_string(out, "zone", t.zone.as_ref(), opts);
            if t.original_zone {
                out.push_str(" :originalzone");
            }
            emit_match_options(out, None, &t.options, opts);
            out.push(' ');
            emit_string(out, &t.header, opts);
            out.push(' ');
            emit_string(out, &t.date_part, opts);
            out.push(' ');
            emit_string_or_list(out, &t.keys, opts);
        }
        Test::CurrentDate(t) => {
            out.push_str("currentdate");
            emit_tagged_string(out, "zone", t.zone.as_ref(), opts);
            emit_match_options(out, None, &t.options, opts);
            out.push(' ');
            emit_string(out, &t.date_part, opts);
            out.push(' ');
            emit_string_or_list(out, &t.keys, opts);
        }
        Test::HasFlag(t) => {
            out.push_str("hasflag");
            emit_match_options(out, None, &t.options, opts);
            if let Some(vars) = &t.variable_names {
                out.push(' ');
                emit_string_or_list(out, vars, opts);
            }
            out.push(' ');
            emit_string_or_list(out, &t.flags, opts);
        }
        Test::String(t) => {
            out.push_str("string");
            emit_match_options(out, None, &t.options, opts);
            out.push(' ');
            emit_string_or_list(out, &t.source, opts);
            out.push(' ');
            emit_string_or_list(out, &t.keys, opts);
        }
        Test::Ihave { capabilities, .. } => {
            out.push_str("ihave ");
            emit_string_or_list(out, capabilities, opts);
        }
        Test::Duplicate(t) => {
            out.push_str("duplicate");
            emit_tagged_string(out, "handle", t.handle.as_ref(), opts);
            emit_tagged_string(out, "header", t.header.as_ref(), opts);
            emit_tagged_string(out, "uniqueid", t.unique_id.as_ref(), opts);
            if let Some(seconds) = &t.seconds {
                out.push_str(" :seconds ");
                emit_number(out, seconds);
            }
            if t.last {
                out.push_str(" :last");
            }
        }
        Test::Generic(t) => {
            out.push_str(&t.name);
            emit_arguments(out, &t.arguments, opts);
        }
    }
}

fn emit_test_list(out: &mut String, tests: &[Test], opts: &GeneratorOptions) {
    out.push('(');
    for (i, test) in tests.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        emit_test(out, test, opts);
    }
    out.push(')');
}

/// Address part, match type or relational, then comparator.
fn emit_match_options(
    out: &mut String,
    part: Option<AddressPart>,
    options: &MatchOptions,
    opts: &GeneratorOptions,
) {
    if let Some(part) = part {
        out.push_str(" :");
        out.push_str(part.as_sieve());
    }
    if let Some(match_type) = options.match_type {
        out.push_str(" :");
        out.push_str(match_type.as_sieve());
    }
    if let Some(rel) = options.relational {
        out.push_str(&format!(" :{} \"{}\"", rel.kind.as_sieve(), rel.op.as_sieve()));
    }
    emit_tagged_string(out, "comparator", options.comparator.as_ref(), opts);
}

fn emit_arguments(out: &mut String, arguments: &[Argument], opts: &GeneratorOptions) {
    for arg in arguments {
        out.push(' ');
        match arg {
            Argument::Tag { name, .. } => {
                out.push(':');
                out.push_str(name);
            }
            Argument::Number(n) => emit_number(out, n),
            Argument::String(s) => emit_string(out, s, opts),
            Argument::StringList(list) => emit_string_or_list(out, list, opts),
            Argument::TestList { tests, .. } => emit_test_list(out, tests, opts),
        }
    }
}

fn emit_number(out: &mut String, n: &Number) {
    match n.quantifier {
        Some(q) if n.value % q.multiplier() == 0 => {
            out.push_str(&format!("{}{q}", n.value / q.multiplier()));
        }
        _ => out.push_str(&n.value.to_string()),
    }
}

fn emit_string_or_list(out: &mut String, list: &StringList, opts: &GeneratorOptions) {
    if let [only] = list.values.as_slice() {
        emit_string(out, only, opts);
        return;
    }
    out.push('[');
    for (i, item) in list.values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        emit_string(out, item, opts);
    }
    out.push(']');
}

fn emit_quoted_list(out: &mut String, items: &[String]) {
    if let [only] = items {
        out.push_str(&format!("\"{}\"", escape_sieve_string(only)));
        return;
    }
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("\"{}\"", escape_sieve_string(item)));
    }
    out.push(']');
}

fn emit_string(out: &mut String, s: &SieveString, opts: &GeneratorOptions) {
    if !s.multiline {
        out.push_str(&format!("\"{}\"", escape_sieve_string(&s.value)));
        return;
    }
    out.push_str("text:");
    out.push_str(&opts.newline);
    for (i, line) in s.value.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }
    out.push_str(&opts.newline);
    out.push('.');
    out.push_str(&opts.newline);
}

fn escape_sieve_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sieve::parser::{parse_with, ParseOptions};

    fn reparse(src: &str) -> Script {
        parse_with(src, &ParseOptions { locations: false, ..Default::default() }).unwrap()
    }

    fn canon(src: &str) -> String {
        generate(&reparse(src), &GeneratorOptions::default())
    }

    #[test]
    fn test_emit_simple_if() {
        let script = Script::new(vec![
            Command::Require(RequireCommand::new(vec!["fileinto".into()]).unwrap()),
            Command::If(IfCommand {
                test: Test::Header(HeaderTest {
                    options: MatchOptions {
                        match_type: Some(MatchType::Contains),
                        ..Default::default()
                    },
                    headers: StringList::single("Subject"),
                    keys: StringList::single("SPAM"),
                    location: None,
                }),
                consequent: Block::new(vec![
                    Command::Fileinto(FileintoCommand {
                        mailbox: "Junk".into(),
                        copy: false,
                        create: false,
                        flags: None,
                        location: None,
                    }),
                    Command::Stop { location: None },
                ]),
                alternate: None,
                location: None,
            }),
        ]);
        let expected = "require \"fileinto\";\n\
                        if header :contains \"Subject\" \"SPAM\" {\n    \
                        fileinto \"Junk\";\n    stop;\n}";
        assert_eq!(generate(&script, &GeneratorOptions::default()), expected);
    }

    #[test]
    fn test_multiline_trailing_carriage_return_round_trips() {
        let script = Script::new(vec![Command::Reject(RejectCommand {
            reason: SieveString::multiline("a\r"),
            location: None,
        })]);
        let crlf = GeneratorOptions { newline: "\r\n".to_string(), ..Default::default() };
        for opts in [GeneratorOptions::default(), crlf] {
            let text = generate(&script, &opts);
            assert_eq!(reparse(&text), script, "{text:?}");
        }
        let source = "reject text:\na\r\r\n.\n;";
        assert_eq!(reparse(&canon(source)), reparse(source));
    }

    #[test]
    fn test_emit_escapes() {
        let script = Script::new(vec![Command::Reject(RejectCommand {
            reason: SieveString::new(r#"say "hi" \o/"#),
            location: None,
        })]);
        assert_eq!(script.to_string(), r#"reject "say \"hi\" \\o/";"#);
    }

    #[test]
    fn test_canonical_spacing_and_tag_order() {
        assert_eq!(
            canon("fileinto   :flags \"\\\\Seen\"\n:create :copy\t\"A\" ;"),
            "fileinto :copy :create :flags \"\\\\Seen\" \"A\";"
        );
        assert_eq!(
            canon(r#"if address :comparator "i;octet" :domain :is "from" "x" {}"#),
            r#"if address :domain :is :comparator "i;octet" "from" "x" {}"#
        );
    }

    #[test]
    fn test_emit_elsif_chain() {
        assert_eq!(
            canon("if true{keep;}elsif false{discard;}else{stop;}"),
            "if true {\n    keep;\n} elsif false {\n    discard;\n} else {\n    stop;\n}"
        );
    }

    #[test]
    fn test_singleton_list_collapses() {
        assert_eq!(canon(r#"if exists ["X-Spam"] { }"#), r#"if exists "X-Spam" {}"#);
        assert_eq!(canon(r#"require ["a", "b"];"#), r#"require ["a", "b"];"#);
    }

    #[test]
    fn test_quantifiers() {
        assert_eq!(canon("if size :over 1m { }"), "if size :over 1M {}");
        assert_eq!(canon("if size :under 2048K { }"), "if size :under 2048K {}");
        let odd = Number { value: 1500, quantifier: Some(Quantifier::K), location: None };
        let mut out = String::new();
        emit_number(&mut out, &odd);
        assert_eq!(out, "1500");
    }

    #[test]
    fn test_multiline_round_trip_with_dot_stuffing() {
        let src = "reject text:\nline one\n..dotted\n.\n;";
        let script = reparse(src);
        let Command::Reject(r) = &script.commands[0] else {
            panic!("Expected Reject");
        };
        assert_eq!(r.reason.value, "line one\n.dotted");
        assert!(r.reason.multiline);
        let out = generate(&script, &GeneratorOptions::default());
        assert_eq!(out, src);
        assert_eq!(reparse(&out), script);
    }

    #[test]
    fn test_generic_nodes_replay_arguments() {
        assert_eq!(
            canon(r#"addheader   :last "X-Tag"  "v" ;"#),
            r#"addheader :last "X-Tag" "v";"#
        );
        assert_eq!(
            canon("if mytest 5 true { }"),
            "if mytest 5 (true) {}"
        );
        assert_eq!(
            canon(r#"foreverypart { keep; }"#),
            "foreverypart {\n    keep;\n}"
        );
    }

    #[test]
    fn test_custom_indent_and_newline() {
        let opts = GeneratorOptions { indent: "\t".to_string(), newline: "\r\n".to_string() };
        let out = generate(&reparse("if true { if false { stop; } }"), &opts);
        assert_eq!(out, "if true {\r\n\tif false {\r\n\t\tstop;\r\n\t}\r\n}");
    }

    #[test]
    fn test_test_display() {
        let test = Test::any_of(vec![
            Test::True { location: None },
            Test::not(Test::Exists { headers: StringList::single("X"), location: None }),
        ])
        .unwrap();
        assert_eq!(test.to_string(), r#"anyof (true, not exists "X")"#);
    }
}
