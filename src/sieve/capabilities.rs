/// Which `require` capabilities a script uses versus declares.
use std::collections::BTreeSet;

use crate::sieve::ast::*;

/// Capabilities the script's commands, tests and tags depend on, sorted.
pub fn required_capabilities(script: &Script) -> Vec<String> {
    let mut requires = BTreeSet::new();
    collect_commands(&script.commands, &mut requires);
    requires.into_iter().map(str::to_string).collect()
}

/// Capabilities named by top-level `require` commands, sorted and deduplicated.
pub fn declared_capabilities(script: &Script) -> Vec<String> {
    let declared: BTreeSet<&str> = script
        .commands
        .iter()
        .filter_map(|cmd| match cmd {
            Command::Require(req) => Some(req.capabilities.iter().map(String::as_str)),
            _ => None,
        })
        .flatten()
        .collect();
    declared.into_iter().map(str::to_string).collect()
}

/// Required but not declared. `ihave` blocks are not treated specially, so a
/// capability only used under `if ihave "x"` is still reported.
pub fn missing_capabilities(script: &Script) -> Vec<String> {
    let declared = declared_capabilities(script);
    required_capabilities(script)
        .into_iter()
        .filter(|cap| !declared.contains(cap))
        .collect()
}

fn collect_commands(commands: &[Command], requires: &mut BTreeSet<&'static str>) {
    for cmd in commands {
        collect_command(cmd, requires);
    }
}

fn collect_command(cmd: &Command, requires: &mut BTreeSet<&'static str>) {
    match cmd {
        Command::If(cmd) => {
            collect_test(&cmd.test, requires);
            collect_commands(&cmd.consequent.commands, requires);
            let mut alternate = cmd.alternate.as_deref();
            while let Some(alt) = alternate {
                match alt {
                    Alternate::ElsIf(elsif) => {
                        collect_test(&elsif.test, requires);
                        collect_commands(&elsif.consequent.commands, requires);
                        alternate = elsif.alternate.as_deref();
                    }
                    Alternate::Else(els) => {
                        collect_commands(&els.consequent.commands, requires);
                        alternate = None;
                    }
                }
            }
        }
        Command::Keep(keep) => {
            if keep.flags.is_some() {
                requires.insert("imap4flags");
            }
        }
        Command::Fileinto(cmd) => {
            requires.insert("fileinto");
            if cmd.copy {
                requires.insert("copy");
            }
            if cmd.create {
                requires.insert("mailbox");
            }
            if cmd.flags.is_some() {
                requires.insert("imap4flags");
            }
        }
        Command::Redirect(cmd) => {
            if cmd.copy {
                requires.insert("copy");
            }
        }
        Command::Reject(_) => {
            requires.insert("reject");
        }
        Command::Set(_) => {
            requires.insert("variables");
        }
        Command::Vacation(cmd) => {
            requires.insert("vacation");
            if cmd.seconds.is_some() {
                requires.insert("vacation-seconds");
            }
        }
        Command::Flag(_) => {
            requires.insert("imap4flags");
        }
        Command::Notify(_) => {
            requires.insert("enotify");
        }
        Command::Generic(cmd) => {
            match cmd.name.as_str() {
                "ereject" => {
                    requires.insert("reject");
                }
                "addheader" | "deleteheader" => {
                    requires.insert("editheader");
                }
                "foreverypart" | "break" | "replace" | "enclose" | "extracttext" => {
                    requires.insert("mime");
                }
                "include" | "return" | "global" => {
                    requires.insert("include");
                }
                _ => {}
            }
            collect_arguments(&cmd.arguments, requires);
            if let Some(block) = &cmd.block {
                collect_commands(&block.commands, requires);
            }
        }
        Command::Require(_) | Command::Stop { .. } | Command::Discard { .. } => {}
    }
}

fn collect_test(test: &Test, requires: &mut BTreeSet<&'static str>) {
    match test {
        Test::Not { test, .. } => collect_test(test, requires),
        Test::AllOf { tests, .. } | Test::AnyOf { tests, .. } => {
            for t in tests {
                collect_test(t, requires);
            }
        }
        Test::Address(t) => {
            collect_address_part(t.address_part, requires);
            collect_match(&t.options, requires);
        }
        Test::Envelope(t) => {
            requires.insert("envelope");
            collect_address_part(t.address_part, requires);
            collect_match(&t.options, requires);
        }
        Test::Header(t) => collect_match(&t.options, requires),
        Test::Body(t) => {
            requires.insert("body");
            collect_match(&t.options, requires);
        }
        Test::Date(t) => {
            requires.insert("date");
            collect_match(&t.options, requires);
        }
        Test::CurrentDate(t) => {
            requires.insert("date");
            collect_match(&t.options, requires);
        }
        Test::HasFlag(t) => {
            requires.insert("imap4flags");
            collect_match(&t.options, requires);
        }
        Test::String(t) => {
            requires.insert("variables");
            collect_match(&t.options, requires);
        }
        Test::Ihave { .. } => {
            requires.insert("ihave");
        }
        Test::Duplicate(_) => {
            requires.insert("duplicate");
        }
        Test::Generic(t) => collect_arguments(&t.arguments, requires),
        Test::True { .. } | Test::False { .. } | Test::Exists { .. } | Test::Size(_) => {}
    }
}

fn collect_address_part(part: Option<AddressPart>, requires: &mut BTreeSet<&'static str>) {
    if matches!(part, Some(AddressPart::User | AddressPart::Detail)) {
        requires.insert("subaddress");
    }
}

fn collect_match(options: &MatchOptions, requires: &mut BTreeSet<&'static str>) {
    if options.match_type == Some(MatchType::Regex) {
        requires.insert("regex");
    }
    if options.relational.is_some() {
        requires.insert("relational");
    }
    if let Some(comparator) = &options.comparator {
        if comparator.value == "i;ascii-numeric" {
            requires.insert("comparator-i;ascii-numeric");
        }
    }
}

fn collect_arguments(arguments: &[Argument], requires: &mut BTreeSet<&'static str>) {
    for arg in arguments {
        if let Argument::TestList { tests, .. } = arg {
            for t in tests {
                collect_test(t, requires);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sieve::parser::parse;

    #[test]
    fn test_required_from_nested_blocks() {
        let script = parse(
            r#"if envelope :detail "to" "x" {
                fileinto :copy :create "Lists";
            } elsif header :regex "subject" "^a" {
                addflag "\\Seen";
            } else {
                vacation :seconds 60 "away";
            }"#,
        )
        .unwrap();
        assert_eq!(
            required_capabilities(&script),
            [
                "copy",
                "envelope",
                "fileinto",
                "imap4flags",
                "mailbox",
                "regex",
                "subaddress",
                "vacation",
                "vacation-seconds",
            ]
        );
    }

    #[test]
    fn test_declared_and_missing() {
        let script = parse(
            r#"require ["fileinto", "fileinto"];
            require "body";
            if body :contains "x" { fileinto "A"; reject "no"; }"#,
        )
        .unwrap();
        assert_eq!(declared_capabilities(&script), ["body", "fileinto"]);
        assert_eq!(missing_capabilities(&script), ["reject"]);
    }

    #[test]
    fn test_generic_extensions() {
        let script = parse(concat!(
            r#"if string :value "gt" :comparator "i;ascii-numeric" "${n}" "3" "#,
            r#"{ addheader "X" "y"; }"#,
        ))
        .unwrap();
        assert_eq!(
            required_capabilities(&script),
            ["comparator-i;ascii-numeric", "editheader", "relational", "variables"]
        );
    }
}
