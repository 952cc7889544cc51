/// AST node types for SIEVE scripts (RFC 5228 plus extensions).
///
/// Every node carries an optional [`Location`]. Trees built by hand may leave
/// it as `None`; the emitter never looks at it.
///
/// Deserialization goes through the same checks as the constructors, so a
/// tree read from JSON always regenerates into source that parses.
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sieve::grammar::grammar;

/// A point in the source text. `line` and `column` are 1-based, `offset` is
/// a byte offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const fn start() -> Self {
        Self { offset: 0, line: 1, column: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

/// Precondition violations caught by the smart constructors below.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AstError {
    #[error("string list must contain at least one string")]
    EmptyStringList,
    #[error("{0} requires at least one test")]
    EmptyTestList(&'static str),
    #[error("require needs at least one capability")]
    EmptyRequire,
    #[error("'{0}' is not a valid identifier")]
    InvalidIdentifier(String),
    #[error("'{0}' is a keyword and cannot name a generic node")]
    ReservedName(String),
    #[error("{value}{quantifier} does not fit in 64 bits")]
    NumberOverflow { value: u64, quantifier: Quantifier },
}

/// A complete SIEVE script is a list of commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Script {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands, location: None }
    }
}

/// `{ ... }`, always braced in source form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Block {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands, location: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// `require ["ext1", "ext2"];`
    Require(RequireCommand),
    /// `if <test> { ... }` with optional elsif/else chain
    If(IfCommand),
    Stop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    Keep(KeepCommand),
    Fileinto(FileintoCommand),
    Redirect(RedirectCommand),
    Discard {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    Reject(RejectCommand),
    Set(SetCommand),
    Vacation(VacationCommand),
    /// `setflag` / `addflag` / `removeflag`
    Flag(FlagCommand),
    Notify(NotifyCommand),
    /// Any command the grammar does not model, arguments kept in source order.
    Generic(GenericCommand),
}

impl Command {
    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Stop { location } | Self::Discard { location } => *location,
            Self::Require(c) => c.location,
            Self::If(c) => c.location,
            Self::Keep(c) => c.location,
            Self::Fileinto(c) => c.location,
            Self::Redirect(c) => c.location,
            Self::Reject(c) => c.location,
            Self::Set(c) => c.location,
            Self::Vacation(c) => c.location,
            Self::Flag(c) => c.location,
            Self::Notify(c) => c.location,
            Self::Generic(c) => c.location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequireCommand {
    #[serde(deserialize_with = "de_capabilities")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl RequireCommand {
    pub fn new(capabilities: Vec<String>) -> Result<Self, AstError> {
        Ok(Self { capabilities: capabilities_checked(capabilities)?, location: None })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfCommand {
    pub test: Test,
    pub consequent: Block,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate: Option<Box<Alternate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// The tail of an `if` chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Alternate {
    ElsIf(ElsIfCommand),
    Else(ElseCommand),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElsIfCommand {
    pub test: Test,
    pub consequent: Block,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate: Option<Box<Alternate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

// Dropping a chain unlinks it one box at a time instead of recursing
// through every `elsif`.
impl Drop for IfCommand {
    fn drop(&mut self) {
        unlink_chain(self.alternate.take());
    }
}

impl Drop for ElsIfCommand {
    fn drop(&mut self) {
        unlink_chain(self.alternate.take());
    }
}

fn unlink_chain(mut next: Option<Box<Alternate>>) {
    while let Some(mut alternate) = next {
        next = match alternate.as_mut() {
            Alternate::ElsIf(elsif) => elsif.alternate.take(),
            Alternate::Else(_) => None,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElseCommand {
    pub consequent: Block,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeepCommand {
    /// imap4flags `:flags`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<StringList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileintoCommand {
    pub mailbox: SieveString,
    #[serde(default)]
    pub copy: bool,
    /// mailbox extension `:create`
    #[serde(default)]
    pub create: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<StringList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectCommand {
    pub address: SieveString,
    #[serde(default)]
    pub copy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectCommand {
    pub reason: SieveString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// RFC 5229 `set [MODIFIER...] <name> <value>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetCommand {
    #[serde(default)]
    pub modifiers: Vec<SetModifier>,
    pub name: SieveString,
    pub value: SieveString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetModifier {
    Lower,
    Upper,
    Lowerfirst,
    Upperfirst,
    Quotewildcard,
    Length,
    Encodeurl,
}

impl SetModifier {
    pub fn as_sieve(&self) -> &'static str {
        match self {
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Lowerfirst => "lowerfirst",
            Self::Upperfirst => "upperfirst",
            Self::Quotewildcard => "quotewildcard",
            Self::Length => "length",
            Self::Encodeurl => "encodeurl",
        }
    }

    pub fn from_sieve(s: &str) -> Option<Self> {
        match s {
            "lower" => Some(Self::Lower),
            "upper" => Some(Self::Upper),
            "lowerfirst" => Some(Self::Lowerfirst),
            "upperfirst" => Some(Self::Upperfirst),
            "quotewildcard" => Some(Self::Quotewildcard),
            "length" => Some(Self::Length),
            "encodeurl" => Some(Self::Encodeurl),
            _ => None,
        }
    }
}

/// RFC 5230 vacation, with the RFC 6131 `:seconds` variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VacationCommand {
    pub reason: SieveString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<SieveString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<SieveString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<StringList>,
    #[serde(default)]
    pub mime: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<SieveString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagAction {
    Setflag,
    Addflag,
    Removeflag,
}

impl FlagAction {
    pub fn as_sieve(&self) -> &'static str {
        match self {
            Self::Setflag => "setflag",
            Self::Addflag => "addflag",
            Self::Removeflag => "removeflag",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagCommand {
    pub action: FlagAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_name: Option<SieveString>,
    pub flags: StringList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// RFC 5435 notification importance, `"1"` (high) to `"3"` (low).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Normal,
    Low,
}

impl Importance {
    pub fn as_sieve(&self) -> &'static str {
        match self {
            Self::High => "1",
            Self::Normal => "2",
            Self::Low => "3",
        }
    }

    pub fn from_sieve(s: &str) -> Option<Self> {
        match s {
            "1" => Some(Self::High),
            "2" => Some(Self::Normal),
            "3" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyCommand {
    pub method: SieveString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<SieveString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<StringList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<SieveString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericCommand {
    #[serde(deserialize_with = "de_command_name")]
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<Argument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl GenericCommand {
    pub fn new(
        name: impl Into<String>,
        arguments: Vec<Argument>,
        block: Option<Block>,
    ) -> Result<Self, AstError> {
        let name = command_name(name.into())?;
        Ok(Self { name, arguments, block, location: None })
    }
}

/// A test expression in an if/elsif condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Test {
    True {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    False {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    Not {
        test: Box<Test>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    /// Never empty; see [`Test::all_of`].
    AllOf {
        #[serde(deserialize_with = "de_all_of")]
        tests: Vec<Test>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    AnyOf {
        #[serde(deserialize_with = "de_any_of")]
        tests: Vec<Test>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    Address(AddressTest),
    Header(HeaderTest),
    Envelope(EnvelopeTest),
    Exists {
        headers: StringList,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    Size(SizeTest),
    Body(BodyTest),
    Date(DateTest),
    CurrentDate(CurrentDateTest),
    HasFlag(HasFlagTest),
    String(StringTest),
    Ihave {
        capabilities: StringList,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    Duplicate(DuplicateTest),
    Generic(GenericTest),
}

impl Test {
    pub fn all_of(tests: Vec<Test>) -> Result<Self, AstError> {
        Ok(Self::AllOf { tests: tests_checked(tests, "allof")?, location: None })
    }

    pub fn any_of(tests: Vec<Test>) -> Result<Self, AstError> {
        Ok(Self::AnyOf { tests: tests_checked(tests, "anyof")?, location: None })
    }

    pub fn not(test: Test) -> Self {
        Self::Not { test: Box::new(test), location: None }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            Self::True { location }
            | Self::False { location }
            | Self::Not { location, .. }
            | Self::AllOf { location, .. }
            | Self::AnyOf { location, .. }
            | Self::Exists { location, .. }
            | Self::Ihave { location, .. } => *location,
            Self::Address(t) => t.location,
            Self::Header(t) => t.location,
            Self::Envelope(t) => t.location,
            Self::Size(t) => t.location,
            Self::Body(t) => t.location,
            Self::Date(t) => t.location,
            Self::CurrentDate(t) => t.location,
            Self::HasFlag(t) => t.location,
            Self::String(t) => t.location,
            Self::Duplicate(t) => t.location,
            Self::Generic(t) => t.location,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Is,
    Contains,
    Matches,
    Regex,
}

impl MatchType {
    pub fn as_sieve(&self) -> &'static str {
        match self {
            Self::Is => "is",
            Self::Contains => "contains",
            Self::Matches => "matches",
            Self::Regex => "regex",
        }
    }

    pub fn from_sieve(s: &str) -> Option<Self> {
        match s {
            "is" => Some(Self::Is),
            "contains" => Some(Self::Contains),
            "matches" => Some(Self::Matches),
            "regex" => Some(Self::Regex),
            _ => None,
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sieve())
    }
}

/// RFC 5231 `:value` / `:count` match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relational {
    pub kind: RelationalKind,
    pub op: RelationalOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationalKind {
    Value,
    Count,
}

impl RelationalKind {
    pub fn as_sieve(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Count => "count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationalOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl RelationalOp {
    pub fn as_sieve(&self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Eq => "eq",
            Self::Ne => "ne",
        }
    }

    pub fn from_sieve(s: &str) -> Option<Self> {
        match s {
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            _ => None,
        }
    }
}

/// Match type, relational match and comparator shared by most tests.
///
/// Absent tags stay `None`: the RFC default of `:is` is never written into
/// the tree, so the emitter reproduces exactly what the source had.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relational: Option<Relational>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparator: Option<SieveString>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressPart {
    All,
    Localpart,
    Domain,
    /// subaddress extension
    User,
    Detail,
}

impl AddressPart {
    pub fn as_sieve(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Localpart => "localpart",
            Self::Domain => "domain",
            Self::User => "user",
            Self::Detail => "detail",
        }
    }

    pub fn from_sieve(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "localpart" => Some(Self::Localpart),
            "domain" => Some(Self::Domain),
            "user" => Some(Self::User),
            "detail" => Some(Self::Detail),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressTest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_part: Option<AddressPart>,
    #[serde(default)]
    pub options: MatchOptions,
    pub headers: StringList,
    pub keys: StringList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeTest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_part: Option<AddressPart>,
    #[serde(default)]
    pub options: MatchOptions,
    pub envelope_parts: StringList,
    pub keys: StringList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderTest {
    #[serde(default)]
    pub options: MatchOptions,
    pub headers: StringList,
    pub keys: StringList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeTest {
    /// `true` for `:over`, `false` for `:under`
    pub over: bool,
    pub size: Number,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// RFC 5173 body transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content_types", rename_all = "lowercase")]
pub enum BodyTransform {
    Raw,
    Text,
    Content(StringList),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyTest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<BodyTransform>,
    #[serde(default)]
    pub options: MatchOptions,
    pub keys: StringList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// RFC 5260 `date`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<SieveString>,
    #[serde(default)]
    pub original_zone: bool,
    #[serde(default)]
    pub options: MatchOptions,
    pub header: SieveString,
    pub date_part: SieveString,
    pub keys: StringList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentDateTest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<SieveString>,
    #[serde(default)]
    pub options: MatchOptions,
    pub date_part: SieveString,
    pub keys: StringList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// imap4flags `hasflag`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HasFlagTest {
    #[serde(default)]
    pub options: MatchOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_names: Option<StringList>,
    pub flags: StringList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// variables `string`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringTest {
    #[serde(default)]
    pub options: MatchOptions,
    pub source: StringList,
    pub keys: StringList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// RFC 7352 `duplicate`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateTest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<SieveString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<SieveString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<SieveString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<Number>,
    #[serde(default)]
    pub last: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericTest {
    #[serde(deserialize_with = "de_test_name")]
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<Argument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl GenericTest {
    pub fn new(name: impl Into<String>, arguments: Vec<Argument>) -> Result<Self, AstError> {
        let name = test_name(name.into())?;
        Ok(Self { name, arguments, location: None })
    }
}

/// Argument of a generic command or test, in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Argument {
    /// `:name`, stored without the colon
    Tag {
        #[serde(deserialize_with = "de_identifier")]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    Number(Number),
    String(SieveString),
    StringList(StringList),
    TestList {
        #[serde(deserialize_with = "de_test_list")]
        tests: Vec<Test>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
}

impl Argument {
    pub fn tag(name: impl Into<String>) -> Result<Self, AstError> {
        Ok(Self::Tag { name: identifier(name.into())?, location: None })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantifier {
    K,
    M,
    G,
}

impl Quantifier {
    pub fn multiplier(&self) -> u64 {
        match self {
            Self::K => 1 << 10,
            Self::M => 1 << 20,
            Self::G => 1 << 30,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::K => 'K',
            Self::M => 'M',
            Self::G => 'G',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'K' | 'k' => Some(Self::K),
            'M' | 'm' => Some(Self::M),
            'G' | 'g' => Some(Self::G),
            _ => None,
        }
    }
}

impl fmt::Display for Quantifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A number; `value` is already multiplied out by the quantifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Number {
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantifier: Option<Quantifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Number {
    pub fn new(value: u64) -> Self {
        Self { value, quantifier: None, location: None }
    }

    /// `Number::quantified(10, Quantifier::K)` is the literal `10K`.
    pub fn quantified(value: u64, quantifier: Quantifier) -> Result<Self, AstError> {
        let bytes = value
            .checked_mul(quantifier.multiplier())
            .ok_or(AstError::NumberOverflow { value, quantifier })?;
        Ok(Self { value: bytes, quantifier: Some(quantifier), location: None })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SieveString {
    pub value: String,
    /// Written as a `text:` literal
    #[serde(default)]
    pub multiline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl SieveString {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into(), multiline: false, location: None }
    }

    pub fn multiline(value: impl Into<String>) -> Self {
        Self { value: value.into(), multiline: true, location: None }
    }
}

impl From<&str> for SieveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Never empty when built through [`StringList::new`], the parser or serde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedStringList")]
pub struct StringList {
    pub values: Vec<SieveString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Deserialize)]
struct UncheckedStringList {
    values: Vec<SieveString>,
    #[serde(default)]
    location: Option<Location>,
}

impl TryFrom<UncheckedStringList> for StringList {
    type Error = AstError;

    fn try_from(list: UncheckedStringList) -> Result<Self, AstError> {
        let mut checked = Self::new(list.values)?;
        checked.location = list.location;
        Ok(checked)
    }
}

impl StringList {
    pub fn new(values: Vec<SieveString>) -> Result<Self, AstError> {
        if values.is_empty() {
            return Err(AstError::EmptyStringList);
        }
        Ok(Self { values, location: None })
    }

    pub fn single(value: impl Into<SieveString>) -> Self {
        Self { values: vec![value.into()], location: None }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|s| s.value.as_str())
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn identifier(name: String) -> Result<String, AstError> {
    if is_identifier(&name) {
        Ok(name)
    } else {
        Err(AstError::InvalidIdentifier(name))
    }
}

/// A generic command named after a keyword would reparse as the keyword.
fn command_name(name: String) -> Result<String, AstError> {
    let name = identifier(name)?;
    match grammar().command(&name) {
        Some(_) => Err(AstError::ReservedName(name)),
        None => Ok(name),
    }
}

fn test_name(name: String) -> Result<String, AstError> {
    let name = identifier(name)?;
    match grammar().test(&name) {
        Some(_) => Err(AstError::ReservedName(name)),
        None => Ok(name),
    }
}

fn capabilities_checked(capabilities: Vec<String>) -> Result<Vec<String>, AstError> {
    if capabilities.is_empty() {
        return Err(AstError::EmptyRequire);
    }
    Ok(capabilities)
}

fn tests_checked(tests: Vec<Test>, what: &'static str) -> Result<Vec<Test>, AstError> {
    if tests.is_empty() {
        return Err(AstError::EmptyTestList(what));
    }
    Ok(tests)
}

// ---- checked deserialization ----

fn de_identifier<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    identifier(String::deserialize(deserializer)?).map_err(de::Error::custom)
}

fn de_command_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    command_name(String::deserialize(deserializer)?).map_err(de::Error::custom)
}

fn de_test_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    test_name(String::deserialize(deserializer)?).map_err(de::Error::custom)
}

fn de_capabilities<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    capabilities_checked(Vec::deserialize(deserializer)?).map_err(de::Error::custom)
}

fn de_all_of<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Test>, D::Error> {
    tests_checked(Vec::deserialize(deserializer)?, "allof").map_err(de::Error::custom)
}

fn de_any_of<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Test>, D::Error> {
    tests_checked(Vec::deserialize(deserializer)?, "anyof").map_err(de::Error::custom)
}

fn de_test_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Test>, D::Error> {
    tests_checked(Vec::deserialize(deserializer)?, "a test list").map_err(de::Error::custom)
}
