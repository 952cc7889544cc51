/// Keyword dispatch tables for the parser.
///
/// Built once per process on first use and never torn down. Every parser
/// shares the same `&'static Grammar`; nothing in it is mutable.
use std::collections::HashMap;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKeyword {
    Require,
    If,
    Elsif,
    Else,
    Stop,
    Keep,
    Fileinto,
    Redirect,
    Discard,
    Reject,
    Set,
    Vacation,
    Setflag,
    Addflag,
    Removeflag,
    Notify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKeyword {
    True,
    False,
    Not,
    AllOf,
    AnyOf,
    Address,
    Header,
    Envelope,
    Exists,
    Size,
    Body,
    Date,
    CurrentDate,
    HasFlag,
    String,
    Ihave,
    Duplicate,
}

#[derive(Debug)]
pub struct Grammar {
    commands: HashMap<&'static str, CommandKeyword>,
    tests: HashMap<&'static str, TestKeyword>,
}

impl Grammar {
    fn build() -> Self {
        tracing::trace!("initialising sieve keyword tables");
        let commands = HashMap::from([
            ("require", CommandKeyword::Require),
            ("if", CommandKeyword::If),
            ("elsif", CommandKeyword::Elsif),
            ("else", CommandKeyword::Else),
            ("stop", CommandKeyword::Stop),
            ("keep", CommandKeyword::Keep),
            ("fileinto", CommandKeyword::Fileinto),
            ("redirect", CommandKeyword::Redirect),
            ("discard", CommandKeyword::Discard),
            ("reject", CommandKeyword::Reject),
            ("set", CommandKeyword::Set),
            ("vacation", CommandKeyword::Vacation),
            ("setflag", CommandKeyword::Setflag),
            ("addflag", CommandKeyword::Addflag),
            ("removeflag", CommandKeyword::Removeflag),
            ("notify", CommandKeyword::Notify),
        ]);
        let tests = HashMap::from([
            ("true", TestKeyword::True),
            ("false", TestKeyword::False),
            ("not", TestKeyword::Not),
            ("allof", TestKeyword::AllOf),
            ("anyof", TestKeyword::AnyOf),
            ("address", TestKeyword::Address),
            ("header", TestKeyword::Header),
            ("envelope", TestKeyword::Envelope),
            ("exists", TestKeyword::Exists),
            ("size", TestKeyword::Size),
            ("body", TestKeyword::Body),
            ("date", TestKeyword::Date),
            ("currentdate", TestKeyword::CurrentDate),
            ("hasflag", TestKeyword::HasFlag),
            ("string", TestKeyword::String),
            ("ihave", TestKeyword::Ihave),
            ("duplicate", TestKeyword::Duplicate),
        ]);
        Self { commands, tests }
    }

    /// Case-sensitive lookup; anything else is a generic command.
    pub fn command(&self, ident: &str) -> Option<CommandKeyword> {
        self.commands.get(ident).copied()
    }

    pub fn test(&self, ident: &str) -> Option<TestKeyword> {
        self.tests.get(ident).copied()
    }
}

static GRAMMAR: LazyLock<Grammar> = LazyLock::new(Grammar::build);

pub fn grammar() -> &'static Grammar {
    &GRAMMAR
}
