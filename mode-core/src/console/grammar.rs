#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the scheduler console.
//!
//! The lexer uses `regal` to produce a bounded token stream; the argument
//! parsers are `winnow` combinators over those tokens. Commands are short, so
//! everything fits in fixed-size buffers and works without the standard
//! library.

use core::fmt;
use core::ops::Range;
use core::time::Duration;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
use winnow::combinator::{alt, opt, preceded};
use winnow::error::{ContextError, ErrMode};
use winnow::{ModalResult, Parser};

/// Maximum number of tokens produced per console line.
pub const MAX_TOKENS: usize = 16;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Lexical token kinds recognized by the console grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Duration literal ending in `ms` or `s`.
    #[regex(r"[0-9]+(?:ms|s)", priority = 2)]
    Duration,
    /// Unsuffixed integer literal.
    #[regex(r"[0-9]+")]
    Integer,
    /// Keyword or mode name (case-insensitive match performed later).
    #[regex(r"[A-Za-z][A-Za-z0-9_-]*")]
    Ident,
    /// Inline whitespace is ignored.
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// End-of-line token (`\r`, `\n`, or `\r\n`).
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Pseudo variant used when the lexer encounters unsupported input.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token emitted by the lexer with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

/// Bounded token buffer.
pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Lexer errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Input produced more tokens than the static buffer allows.
    TooManyTokens { processed: usize },
    /// Underlying lexer reported an unrecoverable error.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "token buffer exhausted after {processed} items")
            }
            LexError::Engine => write!(f, "lexer engine error"),
        }
    }
}

/// Grammar errors emitted by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarError<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: &'a str,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    InvalidToken {
        lexeme: &'a str,
        span: Range<usize>,
    },
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        match token {
            Some(token) if token.kind != TokenKind::Eol => GrammarError::UnexpectedToken {
                expected,
                found: token.lexeme,
                span: token.span.clone(),
            },
            _ => GrammarError::UnexpectedEnd { expected },
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError::InvalidToken {
            lexeme: token.lexeme,
            span: token.span.clone(),
        }
    }
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found `{found}` at {span:?}"),
            GrammarError::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarError::InvalidToken { lexeme, span } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Mode addressed by a command, by raw id or by name.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Target<'a> {
    Id(u32),
    Name(&'a str),
}

impl fmt::Display for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Id(id) => write!(f, "{id}"),
            Target::Name(name) => f.write_str(name),
        }
    }
}

/// `tick [count] [every <duration>]`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TickCommand {
    pub count: Option<u32>,
    pub every: Option<Duration>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Begin(Target<'a>),
    Stop(Target<'a>),
    Only(Target<'a>),
    StopAll,
    Pause,
    Resume,
    Exit,
    Reset,
    Reboot,
    Tick(TickCommand),
    Status,
    Help(HelpCommand<'a>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Verb {
    Begin,
    Stop,
    Only,
    StopAll,
    Pause,
    Resume,
    Exit,
    Reset,
    Reboot,
    Tick,
    Status,
    Help,
}

impl Verb {
    const ALL: [(&'static str, Verb); 12] = [
        ("begin", Verb::Begin),
        ("stop", Verb::Stop),
        ("only", Verb::Only),
        ("stop-all", Verb::StopAll),
        ("pause", Verb::Pause),
        ("resume", Verb::Resume),
        ("exit", Verb::Exit),
        ("reset", Verb::Reset),
        ("reboot", Verb::Reboot),
        ("tick", Verb::Tick),
        ("status", Verb::Status),
        ("help", Verb::Help),
    ];

    fn from_keyword(word: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(keyword, _)| keyword.eq_ignore_ascii_case(word))
            .map(|(_, verb)| *verb)
    }

    fn expects(self) -> &'static str {
        match self {
            Verb::Begin | Verb::Stop | Verb::Only => "mode name or id",
            Verb::Tick => "tick count or `every <duration>`",
            Verb::Help => "help topic",
            _ => "end of command",
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

/// Tokenize the provided line.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        push_token(
            &mut buffer,
            Token {
                kind: record.token,
                lexeme,
                span,
            },
        )?;
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let span = start..start + partial.fragment.len();
        push_token(
            &mut buffer,
            Token {
                kind: TokenKind::Error,
                lexeme: partial.fragment,
                span,
            },
        )?;
    }

    Ok(buffer)
}

fn push_token<'a>(buffer: &mut TokenBuffer<'a>, token: Token<'a>) -> Result<(), LexError> {
    let processed = buffer.len() + 1;
    buffer
        .push(token)
        .map_err(|_| LexError::TooManyTokens { processed })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse a console command from the provided line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
    }

    let mut input = tokens.as_slice();
    let command = command(&mut input).map_err(ParseError::Grammar)?;

    match input.iter().find(|token| token.kind != TokenKind::Eol) {
        Some(token) => Err(ParseError::Grammar(GrammarError::unexpected(
            "end of command",
            Some(token),
        ))),
        None => Ok(command),
    }
}

fn command<'src>(input: &mut Input<'src, '_>) -> Result<Command<'src>, GrammarError<'src>> {
    let verb = match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Ident => {
            let verb = Verb::from_keyword(token.lexeme)
                .ok_or_else(|| GrammarError::unexpected("command keyword", Some(token)))?;
            *input = rest;
            verb
        }
        other => {
            return Err(GrammarError::unexpected(
                "command keyword",
                other.map(|(token, _)| token),
            ));
        }
    };

    let parsed = match verb {
        Verb::Begin => target.map(Command::Begin).parse_next(input),
        Verb::Stop => target.map(Command::Stop).parse_next(input),
        Verb::Only => target.map(Command::Only).parse_next(input),
        Verb::StopAll => Ok(Command::StopAll),
        Verb::Pause => Ok(Command::Pause),
        Verb::Resume => Ok(Command::Resume),
        Verb::Exit => Ok(Command::Exit),
        Verb::Reset => Ok(Command::Reset),
        Verb::Reboot => Ok(Command::Reboot),
        Verb::Tick => tick_args.map(Command::Tick).parse_next(input),
        Verb::Status => Ok(Command::Status),
        Verb::Help => opt(kind(TokenKind::Ident))
            .map(|topic| {
                Command::Help(HelpCommand {
                    topic: topic.map(|token| token.lexeme),
                })
            })
            .parse_next(input),
    };

    // Token parsers leave the input untouched on failure, so the first
    // remaining token is the offending one.
    parsed.map_err(|_| GrammarError::unexpected(verb.expects(), input.first()))
}

fn target<'src>(input: &mut Input<'src, '_>) -> ModalResult<Target<'src>> {
    alt((
        kind(TokenKind::Integer)
            .verify_map(|token: Token<'src>| token.lexeme.parse::<u32>().ok().map(Target::Id)),
        kind(TokenKind::Ident).map(|token: Token<'src>| Target::Name(token.lexeme)),
    ))
    .parse_next(input)
}

fn tick_args(input: &mut Input<'_, '_>) -> ModalResult<TickCommand> {
    (
        opt(kind(TokenKind::Integer)
            .verify_map(|token| token.lexeme.parse::<u32>().ok())),
        opt(preceded(
            keyword("every"),
            kind(TokenKind::Duration).verify_map(|token| parse_duration(token.lexeme)),
        )),
    )
        .map(|(count, every)| TickCommand { count, every })
        .parse_next(input)
}

fn kind<'src, 'slice>(
    expected: TokenKind,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, ErrMode<ContextError>> {
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == expected => {
            *input = rest;
            Ok(token.clone())
        }
        _ => Err(ErrMode::Backtrack(ContextError::new())),
    }
}

fn keyword<'src, 'slice>(
    word: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, ErrMode<ContextError>> {
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest))
            if token.kind == TokenKind::Ident && token.lexeme.eq_ignore_ascii_case(word) =>
        {
            *input = rest;
            Ok(token.clone())
        }
        _ => Err(ErrMode::Backtrack(ContextError::new())),
    }
}

/// Parses `150ms` or `2s`.
pub fn parse_duration(text: &str) -> Option<Duration> {
    if let Some(millis) = text.strip_suffix("ms") {
        millis.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(seconds) = text.strip_suffix('s') {
        seconds.parse::<u64>().ok().map(Duration::from_secs)
    } else {
        None
    }
}
