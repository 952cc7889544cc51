/// Recursive descent SIEVE parser.
///
/// Pulls tokens from the lexer one at a time and builds the AST. Keyword
/// commands and tests get typed nodes; any other identifier becomes a
/// `Generic` node carrying its raw argument list. The first failure stops
/// the parse and is reported with every alternative that was tried at the
/// failing position.
use serde::{Deserialize, Serialize};

use crate::sieve::ast::*;
use crate::sieve::diagnostic::{Diagnostic, Expected};
use crate::sieve::grammar::{grammar, CommandKeyword, Grammar, TestKeyword};
use crate::sieve::lexer::{Lexer, Span, Token};

pub const DEFAULT_MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Record source locations on every node.
    pub locations: bool,
    /// Deepest allowed nesting of blocks and tests.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { locations: true, max_depth: DEFAULT_MAX_DEPTH }
    }
}

pub fn parse(input: &str) -> Result<Script, Diagnostic> {
    parse_with(input, &ParseOptions::default())
}

pub fn parse_with(input: &str, options: &ParseOptions) -> Result<Script, Diagnostic> {
    tracing::debug!(bytes = input.len(), "parsing sieve script");
    let result = Parser::new(input, options).and_then(Parser::parse_script);
    match &result {
        Ok(script) => tracing::debug!(commands = script.commands.len(), "parsed sieve script"),
        Err(diag) => tracing::debug!(%diag, "sieve script rejected"),
    }
    result
}

type PResult<T> = Result<T, Diagnostic>;

const MATCH_TAGS: [&str; 7] =
    ["comparator", "is", "contains", "matches", "regex", "value", "count"];
const ADDRESS_PARTS: [&str; 5] = ["all", "localpart", "domain", "user", "detail"];

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Span,
    last_end: Position,
    expected: Vec<Expected>,
    expected_at: usize,
    depth: usize,
    options: ParseOptions,
    grammar: &'static Grammar,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str, options: &ParseOptions) -> PResult<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            last_end: Position::start(),
            expected: Vec::new(),
            expected_at: 0,
            depth: 0,
            options: *options,
            grammar: grammar(),
        })
    }

    pub fn parse_script(mut self) -> PResult<Script> {
        let mut commands = Vec::new();
        loop {
            self.note(Expected::end());
            if self.current.token == Token::Eof {
                break;
            }
            commands.push(self.parse_command()?);
        }
        let end = self.current.end;
        Ok(Script {
            commands,
            location: self.options.locations.then_some(Location { start: Position::start(), end }),
        })
    }

    // ---- token plumbing ----

    fn advance(&mut self) -> PResult<Span> {
        let next = self.lexer.next_token()?;
        let prev = std::mem::replace(&mut self.current, next);
        self.last_end = prev.end;
        Ok(prev)
    }

    /// Location from `start` to the end of the last consumed token.
    fn loc(&self, start: Position) -> Option<Location> {
        self.options.locations.then_some(Location { start, end: self.last_end })
    }

    fn span_loc(&self, span: &Span) -> Option<Location> {
        self.options.locations.then_some(Location { start: span.start, end: span.end })
    }

    fn text(&self, span: &Span) -> String {
        self.lexer.source()[span.start.offset..span.end.offset].to_string()
    }

    /// Record an alternative that was acceptable at the current token.
    fn note(&mut self, expected: Expected) {
        let at = self.current.start.offset;
        if at > self.expected_at {
            self.expected.clear();
            self.expected_at = at;
        }
        if at == self.expected_at && !self.expected.contains(&expected) {
            self.expected.push(expected);
        }
    }

    /// Failure at the current token, listing everything noted there.
    fn fail(&self) -> Diagnostic {
        let span = &self.current;
        let found = (span.token != Token::Eof).then(|| self.text(span));
        let location = Location { start: span.start, end: span.end };
        Diagnostic::unexpected(location, found, self.expected.clone())
    }

    fn check(&mut self, token: &Token) -> bool {
        self.note(Expected::literal(token.describe()));
        self.current.token == *token
    }

    fn eat(&mut self, token: &Token) -> PResult<bool> {
        if self.check(token) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, token: &Token) -> PResult<Span> {
        if self.check(token) {
            self.advance()
        } else {
            Err(self.fail())
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> PResult<bool> {
        self.note(Expected::literal(keyword));
        if matches!(&self.current.token, Token::Identifier(s) if s == keyword) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// One level deeper. Blocks, tests and `elsif`/`else` links all count.
    fn enter(&mut self, start: Position, end: Position) -> PResult<()> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            let found = self.lexer.source()[start.offset..end.offset].to_string();
            return Err(Diagnostic::syntax(
                format!("Maximum nesting depth of {} exceeded", self.options.max_depth),
                Location { start, end },
                Some(found),
            ));
        }
        Ok(())
    }

    /// The next `:tag`, if the current token is one.
    fn next_tag(&mut self) -> PResult<Option<(String, Span)>> {
        self.note(Expected::class("tag"));
        let Token::Tag(name) = &self.current.token else {
            return Ok(None);
        };
        let name = name.clone();
        let span = self.advance()?;
        Ok(Some((name, span)))
    }

    fn tag_error(&self, message: String, tag: &Span) -> Diagnostic {
        let location = Location { start: tag.start, end: tag.end };
        Diagnostic::syntax(message, location, Some(self.text(tag)))
    }

    fn unexpected_tag(&self, name: &str, tag: &Span, allowed: &[&str]) -> Diagnostic {
        let expected = allowed.iter().map(|t| Expected::literal(&format!(":{t}"))).collect();
        self.tag_error(format!("Unexpected tag ':{name}'"), tag).with_expected(expected)
    }

    fn duplicate_tag(&self, name: &str, tag: &Span) -> Diagnostic {
        self.tag_error(format!("Duplicate or conflicting tag ':{name}'"), tag)
    }

    fn set_once<T>(&self, slot: &mut Option<T>, value: T, name: &str, tag: &Span) -> PResult<()> {
        if slot.is_some() {
            return Err(self.duplicate_tag(name, tag));
        }
        *slot = Some(value);
        Ok(())
    }

    fn flag_once(&self, slot: &mut bool, name: &str, tag: &Span) -> PResult<()> {
        if *slot {
            return Err(self.duplicate_tag(name, tag));
        }
        *slot = true;
        Ok(())
    }

    // ---- values ----

    fn parse_string_spanned(&mut self) -> PResult<(SieveString, Location)> {
        self.note(Expected::class("string"));
        let (value, multiline) = match &self.current.token {
            Token::QuotedString(s) => (s.clone(), false),
            Token::MultiLineString(s) => (s.clone(), true),
            _ => return Err(self.fail()),
        };
        let span = self.advance()?;
        let location = self.span_loc(&span);
        let at = Location { start: span.start, end: span.end };
        Ok((SieveString { value, multiline, location }, at))
    }

    fn parse_string(&mut self) -> PResult<SieveString> {
        Ok(self.parse_string_spanned()?.0)
    }

    /// A bare string or `[ "a", "b" ]`; both yield a non-empty list.
    fn parse_string_list(&mut self) -> PResult<StringList> {
        let start = self.current.start;
        if self.eat(&Token::LBracket)? {
            let mut values = vec![self.parse_string()?];
            while self.eat(&Token::Comma)? {
                values.push(self.parse_string()?);
            }
            self.expect(&Token::RBracket)?;
            return Ok(StringList { values, location: self.loc(start) });
        }
        let value = self.parse_string()?;
        Ok(StringList { values: vec![value], location: self.loc(start) })
    }

    fn at_string_list(&mut self) -> bool {
        self.note(Expected::literal("["));
        self.note(Expected::class("string"));
        matches!(
            self.current.token,
            Token::LBracket | Token::QuotedString(_) | Token::MultiLineString(_)
        )
    }

    fn parse_number(&mut self) -> PResult<Number> {
        self.note(Expected::class("number"));
        let &Token::Number { value, quantifier } = &self.current.token else {
            return Err(self.fail());
        };
        let span = self.advance()?;
        Ok(Number { value, quantifier, location: self.span_loc(&span) })
    }

    /// Handles match-type, relational and comparator tags. Returns `false`
    /// when `name` is none of them.
    fn match_option(
        &mut self,
        name: &str,
        tag: &Span,
        options: &mut MatchOptions,
    ) -> PResult<bool> {
        let taken = options.match_type.is_some() || options.relational.is_some();
        if let Some(match_type) = MatchType::from_sieve(name) {
            if taken {
                return Err(self.duplicate_tag(name, tag));
            }
            options.match_type = Some(match_type);
        } else if name == "value" || name == "count" {
            if taken {
                return Err(self.duplicate_tag(name, tag));
            }
            let kind = if name == "value" { RelationalKind::Value } else { RelationalKind::Count };
            let (op, at) = self.parse_string_spanned()?;
            let Some(op) = RelationalOp::from_sieve(&op.value) else {
                return Err(Diagnostic::syntax(
                    format!("Invalid relational operator \"{}\"", op.value),
                    at,
                    Some(op.value),
                )
                .with_expected(
                    ["gt", "ge", "lt", "le", "eq", "ne"]
                        .iter()
                        .map(|o| Expected::literal(o))
                        .collect(),
                ));
            };
            options.relational = Some(Relational { kind, op });
        } else if name == "comparator" {
            let comparator = self.parse_string()?;
            self.set_once(&mut options.comparator, comparator, name, tag)?;
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    /// Tags shared by tests that only take match options.
    fn parse_match_tags(&mut self) -> PResult<MatchOptions> {
        let mut options = MatchOptions::default();
        while let Some((name, tag)) = self.next_tag()? {
            if !self.match_option(&name, &tag, &mut options)? {
                return Err(self.unexpected_tag(&name, &tag, &MATCH_TAGS));
            }
        }
        Ok(options)
    }

    // ---- commands ----

    fn parse_block(&mut self) -> PResult<Block> {
        let open = self.expect(&Token::LBrace)?;
        self.enter(open.start, open.end)?;
        let mut commands = Vec::new();
        while !self.eat(&Token::RBrace)? {
            commands.push(self.parse_command()?);
        }
        self.depth -= 1;
        Ok(Block { commands, location: self.loc(open.start) })
    }

    fn parse_command(&mut self) -> PResult<Command> {
        self.note(Expected::class("identifier"));
        let Token::Identifier(name) = &self.current.token else {
            return Err(self.fail());
        };
        let name = name.clone();
        let keyword = self.grammar.command(&name);
        let ident = self.advance()?;
        let start = ident.start;

        let Some(keyword) = keyword else {
            return self.parse_generic_command(name, start);
        };
        // Every arm hands its result straight back; this frame sits on the
        // block recursion path and must stay small.
        match keyword {
            CommandKeyword::Require => self.parse_require(start),
            CommandKeyword::If => self.parse_if(start),
            CommandKeyword::Elsif | CommandKeyword::Else => Err(Diagnostic::syntax(
                format!("'{name}' without a preceding 'if'"),
                Location { start: ident.start, end: ident.end },
                Some(name),
            )),
            CommandKeyword::Stop => self.parse_bare(start, |location| Command::Stop { location }),
            CommandKeyword::Discard => {
                self.parse_bare(start, |location| Command::Discard { location })
            }
            CommandKeyword::Keep => self.parse_keep(start),
            CommandKeyword::Fileinto => self.parse_fileinto(start),
            CommandKeyword::Redirect => self.parse_redirect(start),
            CommandKeyword::Reject => self.parse_reject(start),
            CommandKeyword::Set => self.parse_set(start),
            CommandKeyword::Vacation => self.parse_vacation(start),
            CommandKeyword::Setflag => self.parse_flag(FlagAction::Setflag, start),
            CommandKeyword::Addflag => self.parse_flag(FlagAction::Addflag, start),
            CommandKeyword::Removeflag => self.parse_flag(FlagAction::Removeflag, start),
            CommandKeyword::Notify => self.parse_notify(start),
        }
    }

    fn parse_require(&mut self, start: Position) -> PResult<Command> {
        let capabilities = self.parse_string_list()?;
        self.expect(&Token::Semicolon)?;
        Ok(Command::Require(RequireCommand {
            capabilities: capabilities.values.into_iter().map(|s| s.value).collect(),
            location: self.loc(start),
        }))
    }

    /// Commands without arguments: `stop;` and `discard;`.
    fn parse_bare(
        &mut self,
        start: Position,
        make: fn(Option<Location>) -> Command,
    ) -> PResult<Command> {
        self.expect(&Token::Semicolon)?;
        Ok(make(self.loc(start)))
    }

    fn parse_reject(&mut self, start: Position) -> PResult<Command> {
        let reason = self.parse_string()?;
        self.expect(&Token::Semicolon)?;
        Ok(Command::Reject(RejectCommand { reason, location: self.loc(start) }))
    }

    fn parse_if(&mut self, start: Position) -> PResult<Command> {
        let test = self.parse_test()?;
        let consequent = self.parse_block()?;
        let alternate = self.parse_alternates()?;
        Ok(Command::If(IfCommand { test, consequent, alternate, location: self.loc(start) }))
    }

    /// Greedy `elsif`/`else` chain, parsed in a loop. Each link nests one
    /// level deeper in the tree, so each one counts toward the depth limit.
    fn parse_alternates(&mut self) -> PResult<Option<Box<Alternate>>> {
        let mut elsifs = Vec::new();
        let mut tail = None;
        let depth = self.depth;
        loop {
            let (start, end) = (self.current.start, self.current.end);
            if self.eat_keyword("elsif")? {
                self.enter(start, end)?;
                let test = self.parse_test()?;
                let consequent = self.parse_block()?;
                elsifs.push((start, test, consequent));
            } else if self.eat_keyword("else")? {
                self.enter(start, end)?;
                let consequent = self.parse_block()?;
                tail = Some(Box::new(Alternate::Else(ElseCommand {
                    consequent,
                    location: self.loc(start),
                })));
                break;
            } else {
                break;
            }
        }
        self.depth = depth;
        for (start, test, consequent) in elsifs.into_iter().rev() {
            tail = Some(Box::new(Alternate::ElsIf(ElsIfCommand {
                test,
                consequent,
                alternate: tail,
                location: self.loc(start),
            })));
        }
        Ok(tail)
    }

    fn parse_keep(&mut self, start: Position) -> PResult<Command> {
        let mut flags = None;
        while let Some((name, tag)) = self.next_tag()? {
            match name.as_str() {
                "flags" => {
                    let list = self.parse_string_list()?;
                    self.set_once(&mut flags, list, &name, &tag)?;
                }
                _ => return Err(self.unexpected_tag(&name, &tag, &["flags"])),
            }
        }
        self.expect(&Token::Semicolon)?;
        Ok(Command::Keep(KeepCommand { flags, location: self.loc(start) }))
    }

    fn parse_fileinto(&mut self, start: Position) -> PResult<Command> {
        let (mut copy, mut create, mut flags) = (false, false, None);
        while let Some((name, tag)) = self.next_tag()? {
            match name.as_str() {
                "copy" => self.flag_once(&mut copy, &name, &tag)?,
                "create" => self.flag_once(&mut create, &name, &tag)?,
                "flags" => {
                    let list = self.parse_string_list()?;
                    self.set_once(&mut flags, list, &name, &tag)?;
                }
                _ => {
                    return Err(self.unexpected_tag(&name, &tag, &["copy", "create", "flags"]));
                }
            }
        }
        let mailbox = self.parse_string()?;
        self.expect(&Token::Semicolon)?;
        Ok(Command::Fileinto(FileintoCommand {
            mailbox,
            copy,
            create,
            flags,
            location: self.loc(start),
        }))
    }

    fn parse_redirect(&mut self, start: Position) -> PResult<Command> {
        let mut copy = false;
        while let Some((name, tag)) = self.next_tag()? {
            match name.as_str() {
                "copy" => self.flag_once(&mut copy, &name, &tag)?,
                _ => return Err(self.unexpected_tag(&name, &tag, &["copy"])),
            }
        }
        let address = self.parse_string()?;
        self.expect(&Token::Semicolon)?;
        Ok(Command::Redirect(RedirectCommand { address, copy, location: self.loc(start) }))
    }

    fn parse_set(&mut self, start: Position) -> PResult<Command> {
        let mut modifiers = Vec::new();
        while let Some((name, tag)) = self.next_tag()? {
            match SetModifier::from_sieve(&name) {
                Some(modifier) => modifiers.push(modifier),
                None => {
                    let allowed = [
                        "lower",
                        "upper",
                        "lowerfirst",
                        "upperfirst",
                        "quotewildcard",
                        "length",
                        "encodeurl",
                    ];
                    return Err(self.unexpected_tag(&name, &tag, &allowed));
                }
            }
        }
        let name = self.parse_string()?;
        let value = self.parse_string()?;
        self.expect(&Token::Semicolon)?;
        Ok(Command::Set(SetCommand { modifiers, name, value, location: self.loc(start) }))
    }

    fn parse_vacation(&mut self, start: Position) -> PResult<Command> {
        let (mut days, mut seconds, mut subject, mut from) = (None, None, None, None);
        let (mut addresses, mut mime, mut handle) = (None, false, None);
        while let Some((name, tag)) = self.next_tag()? {
            match name.as_str() {
                "days" | "seconds" => {
                    let n = self.parse_number()?;
                    if days.is_some() || seconds.is_some() {
                        return Err(self.duplicate_tag(&name, &tag));
                    }
                    if name == "days" {
                        days = Some(n);
                    } else {
                        seconds = Some(n);
                    }
                }
                "subject" => {
                    let s = self.parse_string()?;
                    self.set_once(&mut subject, s, &name, &tag)?;
                }
                "from" => {
                    let s = self.parse_string()?;
                    self.set_once(&mut from, s, &name, &tag)?;
                }
                "addresses" => {
                    let list = self.parse_string_list()?;
                    self.set_once(&mut addresses, list, &name, &tag)?;
                }
                "mime" => self.flag_once(&mut mime, &name, &tag)?,
                "handle" => {
                    let s = self.parse_string()?;
                    self.set_once(&mut handle, s, &name, &tag)?;
                }
                _ => {
                    return Err(self.unexpected_tag(
                        &name,
                        &tag,
                        &["days", "seconds", "subject", "from", "addresses", "mime", "handle"],
                    ));
                }
            }
        }
        let reason = self.parse_string()?;
        self.expect(&Token::Semicolon)?;
        Ok(Command::Vacation(VacationCommand {
            reason,
            days,
            seconds,
            subject,
            from,
            addresses,
            mime,
            handle,
            location: self.loc(start),
        }))
    }

    /// `addflag [<variablename>] <flags>`: with two positional arguments the
    /// first one names the variable.
    fn parse_flag(&mut self, action: FlagAction, start: Position) -> PResult<Command> {
        self.note(Expected::literal("["));
        let (variable_name, flags) = if matches!(
            self.current.token,
            Token::QuotedString(_) | Token::MultiLineString(_)
        ) {
            let first = self.parse_string()?;
            if self.at_string_list() {
                (Some(first), self.parse_string_list()?)
            } else {
                let location = first.location;
                (None, StringList { values: vec![first], location })
            }
        } else {
            (None, self.parse_string_list()?)
        };
        self.expect(&Token::Semicolon)?;
        Ok(Command::Flag(FlagCommand { action, variable_name, flags, location: self.loc(start) }))
    }

    fn parse_notify(&mut self, start: Position) -> PResult<Command> {
        let (mut from, mut importance, mut options, mut message) = (None, None, None, None);
        while let Some((name, tag)) = self.next_tag()? {
            match name.as_str() {
                "from" => {
                    let s = self.parse_string()?;
                    self.set_once(&mut from, s, &name, &tag)?;
                }
                "importance" => {
                    let (s, at) = self.parse_string_spanned()?;
                    let Some(level) = Importance::from_sieve(&s.value) else {
                        return Err(Diagnostic::syntax(
                            format!("Invalid importance \"{}\"", s.value),
                            at,
                            Some(s.value),
                        )
                        .with_expected(vec![
                            Expected::literal("1"),
                            Expected::literal("2"),
                            Expected::literal("3"),
                        ]));
                    };
                    self.set_once(&mut importance, level, &name, &tag)?;
                }
                "options" => {
                    let list = self.parse_string_list()?;
                    self.set_once(&mut options, list, &name, &tag)?;
                }
                "message" => {
                    let s = self.parse_string()?;
                    self.set_once(&mut message, s, &name, &tag)?;
                }
                _ => {
                    let allowed = ["from", "importance", "options", "message"];
                    return Err(self.unexpected_tag(&name, &tag, &allowed));
                }
            }
        }
        let method = self.parse_string()?;
        self.expect(&Token::Semicolon)?;
        Ok(Command::Notify(NotifyCommand {
            method,
            from,
            importance,
            options,
            message,
            location: self.loc(start),
        }))
    }

    fn parse_generic_command(&mut self, name: String, start: Position) -> PResult<Command> {
        let arguments = self.parse_arguments()?;
        let block = if self.check(&Token::LBrace) {
            Some(self.parse_block()?)
        } else {
            self.expect(&Token::Semicolon)?;
            None
        };
        Ok(Command::Generic(GenericCommand { name, arguments, block, location: self.loc(start) }))
    }

    /// `*argument [test / test-list]`, kept in source order.
    fn parse_arguments(&mut self) -> PResult<Vec<Argument>> {
        let mut arguments = Vec::new();
        while let Some(argument) = self.parse_argument()? {
            let trailing = matches!(argument, Argument::TestList { .. });
            arguments.push(argument);
            if trailing {
                break;
            }
        }
        Ok(arguments)
    }

    fn parse_argument(&mut self) -> PResult<Option<Argument>> {
        for class in ["tag", "number", "string", "identifier"] {
            self.note(Expected::class(class));
        }
        self.note(Expected::literal("["));
        self.note(Expected::literal("("));
        let start = self.current.start;
        let argument = match &self.current.token {
            Token::Tag(name) => {
                let name = name.clone();
                let span = self.advance()?;
                Argument::Tag { name, location: self.span_loc(&span) }
            }
            Token::Number { .. } => Argument::Number(self.parse_number()?),
            Token::QuotedString(_) | Token::MultiLineString(_) => {
                Argument::String(self.parse_string()?)
            }
            Token::LBracket => Argument::StringList(self.parse_string_list()?),
            Token::LParen => {
                let tests = self.parse_test_list()?;
                Argument::TestList { tests, location: self.loc(start) }
            }
            Token::Identifier(_) => {
                let tests = vec![self.parse_test()?];
                Argument::TestList { tests, location: self.loc(start) }
            }
            _ => return Ok(None),
        };
        Ok(Some(argument))
    }

    // ---- tests ----

    fn parse_test(&mut self) -> PResult<Test> {
        self.enter(self.current.start, self.current.end)?;
        let test = self.parse_test_inner();
        self.depth -= 1;
        test
    }

    /// Dispatches on the test keyword. As with commands, every arm returns
    /// its result directly so nested tests only pay for the small frames.
    fn parse_test_inner(&mut self) -> PResult<Test> {
        if self.check(&Token::LParen) {
            return self.parse_parenthesized_test();
        }
        self.note(Expected::class("identifier"));
        let Token::Identifier(name) = &self.current.token else {
            return Err(self.fail());
        };
        let name = name.clone();
        let keyword = self.grammar.test(&name);
        let start = self.advance()?.start;

        let Some(keyword) = keyword else {
            return self.parse_generic_test(name, start);
        };
        match keyword {
            TestKeyword::True => Ok(Test::True { location: self.loc(start) }),
            TestKeyword::False => Ok(Test::False { location: self.loc(start) }),
            TestKeyword::Not => self.parse_not(start),
            TestKeyword::AllOf => {
                self.parse_combinator(start, |tests, location| Test::AllOf { tests, location })
            }
            TestKeyword::AnyOf => {
                self.parse_combinator(start, |tests, location| Test::AnyOf { tests, location })
            }
            TestKeyword::Address => self.parse_address(start),
            TestKeyword::Envelope => self.parse_envelope(start),
            TestKeyword::Header => self.parse_header(start),
            TestKeyword::Exists => self.parse_exists(start),
            TestKeyword::Size => self.parse_size(start),
            TestKeyword::Body => self.parse_body(start),
            TestKeyword::Date => self.parse_date(start),
            TestKeyword::CurrentDate => self.parse_current_date(start),
            TestKeyword::HasFlag => self.parse_has_flag(start),
            TestKeyword::String => self.parse_string_test(start),
            TestKeyword::Ihave => self.parse_ihave(start),
            TestKeyword::Duplicate => self.parse_duplicate(start),
        }
    }

    /// `( test )` where a single test is expected.
    fn parse_parenthesized_test(&mut self) -> PResult<Test> {
        self.advance()?;
        let test = self.parse_test()?;
        self.expect(&Token::RParen)?;
        Ok(test)
    }

    fn parse_generic_test(&mut self, name: String, start: Position) -> PResult<Test> {
        let arguments = self.parse_arguments()?;
        Ok(Test::Generic(GenericTest { name, arguments, location: self.loc(start) }))
    }

    fn parse_not(&mut self, start: Position) -> PResult<Test> {
        let test = self.parse_test()?;
        Ok(Test::Not { test: Box::new(test), location: self.loc(start) })
    }

    fn parse_combinator(
        &mut self,
        start: Position,
        make: fn(Vec<Test>, Option<Location>) -> Test,
    ) -> PResult<Test> {
        let tests = self.parse_test_list()?;
        Ok(make(tests, self.loc(start)))
    }

    fn parse_address(&mut self, start: Position) -> PResult<Test> {
        let (address_part, options) = self.parse_address_tags()?;
        let headers = self.parse_string_list()?;
        let keys = self.parse_string_list()?;
        Ok(Test::Address(AddressTest {
            address_part,
            options,
            headers,
            keys,
            location: self.loc(start),
        }))
    }

    fn parse_envelope(&mut self, start: Position) -> PResult<Test> {
        let (address_part, options) = self.parse_address_tags()?;
        let envelope_parts = self.parse_string_list()?;
        let keys = self.parse_string_list()?;
        Ok(Test::Envelope(EnvelopeTest {
            address_part,
            options,
            envelope_parts,
            keys,
            location: self.loc(start),
        }))
    }

    fn parse_header(&mut self, start: Position) -> PResult<Test> {
        let options = self.parse_match_tags()?;
        let headers = self.parse_string_list()?;
        let keys = self.parse_string_list()?;
        Ok(Test::Header(HeaderTest { options, headers, keys, location: self.loc(start) }))
    }

    fn parse_exists(&mut self, start: Position) -> PResult<Test> {
        let headers = self.parse_string_list()?;
        Ok(Test::Exists { headers, location: self.loc(start) })
    }

    /// `hasflag [<variable-list>] <list-of-flags>`, like the flag commands.
    fn parse_has_flag(&mut self, start: Position) -> PResult<Test> {
        let options = self.parse_match_tags()?;
        let first = self.parse_string_list()?;
        let (variable_names, flags) = if self.at_string_list() {
            (Some(first), self.parse_string_list()?)
        } else {
            (None, first)
        };
        Ok(Test::HasFlag(HasFlagTest { options, variable_names, flags, location: self.loc(start) }))
    }

    fn parse_string_test(&mut self, start: Position) -> PResult<Test> {
        let options = self.parse_match_tags()?;
        let source = self.parse_string_list()?;
        let keys = self.parse_string_list()?;
        Ok(Test::String(StringTest { options, source, keys, location: self.loc(start) }))
    }

    fn parse_ihave(&mut self, start: Position) -> PResult<Test> {
        let capabilities = self.parse_string_list()?;
        Ok(Test::Ihave { capabilities, location: self.loc(start) })
    }

    /// `( test *("," test) )`, never empty.
    fn parse_test_list(&mut self) -> PResult<Vec<Test>> {
        self.expect(&Token::LParen)?;
        let mut tests = vec![self.parse_test()?];
        while self.eat(&Token::Comma)? {
            tests.push(self.parse_test()?);
        }
        self.expect(&Token::RParen)?;
        Ok(tests)
    }

    fn parse_address_tags(&mut self) -> PResult<(Option<AddressPart>, MatchOptions)> {
        let mut part = None;
        let mut options = MatchOptions::default();
        while let Some((name, tag)) = self.next_tag()? {
            if let Some(p) = AddressPart::from_sieve(&name) {
                self.set_once(&mut part, p, &name, &tag)?;
            } else if !self.match_option(&name, &tag, &mut options)? {
                let allowed: Vec<&str> =
                    MATCH_TAGS.iter().chain(ADDRESS_PARTS.iter()).copied().collect();
                return Err(self.unexpected_tag(&name, &tag, &allowed));
            }
        }
        Ok((part, options))
    }

    fn parse_size(&mut self, start: Position) -> PResult<Test> {
        let mut over = None;
        while let Some((name, tag)) = self.next_tag()? {
            let value = match name.as_str() {
                "over" => true,
                "under" => false,
                _ => return Err(self.unexpected_tag(&name, &tag, &["over", "under"])),
            };
            self.set_once(&mut over, value, &name, &tag)?;
        }
        let Some(over) = over else {
            self.note(Expected::literal(":over"));
            self.note(Expected::literal(":under"));
            return Err(self.fail());
        };
        let size = self.parse_number()?;
        Ok(Test::Size(SizeTest { over, size, location: self.loc(start) }))
    }

    fn parse_body(&mut self, start: Position) -> PResult<Test> {
        let mut transform = None;
        let mut options = MatchOptions::default();
        while let Some((name, tag)) = self.next_tag()? {
            match name.as_str() {
                "raw" => self.set_once(&mut transform, BodyTransform::Raw, &name, &tag)?,
                "text" => self.set_once(&mut transform, BodyTransform::Text, &name, &tag)?,
                "content" => {
                    let types = self.parse_string_list()?;
                    self.set_once(&mut transform, BodyTransform::Content(types), &name, &tag)?;
                }
                other => {
                    if !self.match_option(other, &tag, &mut options)? {
                        let allowed: Vec<&str> =
                            MATCH_TAGS.iter().copied().chain(["raw", "text", "content"]).collect();
                        return Err(self.unexpected_tag(other, &tag, &allowed));
                    }
                }
            }
        }
        let keys = self.parse_string_list()?;
        Ok(Test::Body(BodyTest { transform, options, keys, location: self.loc(start) }))
    }

    fn parse_date(&mut self, start: Position) -> PResult<Test> {
        let mut zone = None;
        let mut original_zone = false;
        let mut options = MatchOptions::default();
        while let Some((name, tag)) = self.next_tag()? {
            match name.as_str() {
                "zone" => {
                    let z = self.parse_string()?;
                    if original_zone {
                        return Err(self.duplicate_tag(&name, &tag));
                    }
                    self.set_once(&mut zone, z, &name, &tag)?;
                }
                "originalzone" => {
                    if zone.is_some() {
                        return Err(self.duplicate_tag(&name, &tag));
                    }
                    self.flag_once(&mut original_zone, &name, &tag)?;
                }
                other => {
                    if !self.match_option(other, &tag, &mut options)? {
                        let allowed: Vec<&str> =
                            MATCH_TAGS.iter().copied().chain(["zone", "originalzone"]).collect();
                        return Err(self.unexpected_tag(other, &tag, &allowed));
                    }
                }
            }
        }
        let header = self.parse_string()?;
        let date_part = self.parse_string()?;
        let keys = self.parse_string_list()?;
        Ok(Test::Date(DateTest {
            zone,
            original_zone,
            options,
            header,
            date_part,
            keys,
            location: self.loc(start),
        }))
    }

    fn parse_current_date(&mut self, start: Position) -> PResult<Test> {
        let mut zone = None;
        let mut options = MatchOptions::default();
        while let Some((name, tag)) = self.next_tag()? {
            if name == "zone" {
                let z = self.parse_string()?;
                self.set_once(&mut zone, z, &name, &tag)?;
            } else if !self.match_option(&name, &tag, &mut options)? {
                let allowed: Vec<&str> = MATCH_TAGS.iter().copied().chain(["zone"]).collect();
                return Err(self.unexpected_tag(&name, &tag, &allowed));
            }
        }
        let date_part = self.parse_string()?;
        let keys = self.parse_string_list()?;
        Ok(Test::CurrentDate(CurrentDateTest {
            zone,
            options,
            date_part,
            keys,
            location: self.loc(start),
        }))
    }

    fn parse_duplicate(&mut self, start: Position) -> PResult<Test> {
        let mut test = DuplicateTest::default();
        while let Some((name, tag)) = self.next_tag()? {
            match name.as_str() {
                "handle" => {
                    let s = self.parse_string()?;
                    self.set_once(&mut test.handle, s, &name, &tag)?;
                }
                "header" | "uniqueid" => {
                    let s = self.parse_string()?;
                    if test.header.is_some() || test.unique_id.is_some() {
                        return Err(self.duplicate_tag(&name, &tag));
                    }
                    if name == "header" {
                        test.header = Some(s);
                    } else {
                        test.unique_id = Some(s);
                    }
                }
                "seconds" => {
                    let n = self.parse_number()?;
                    self.set_once(&mut test.seconds, n, &name, &tag)?;
                }
                "last" => self.flag_once(&mut test.last, &name, &tag)?,
                _ => {
                    return Err(self.unexpected_tag(
                        &name,
                        &tag,
                        &["handle", "header", "uniqueid", "seconds", "last"],
                    ));
                }
            }
        }
        test.location = self.loc(start);
        Ok(Test::Duplicate(test))
    }
}
