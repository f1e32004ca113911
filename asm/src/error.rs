use thiserror::Error;

/// Failures while decoding escape sequences inside string literals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscapeError {
    #[error("string ends in a backslash with no escape sequence")]
    DanglingBackslash,

    #[error("unescaped quote inside a string literal")]
    UnescapedQuote,

    #[error("Unicode escape sequence is missing hexadecimal digits")]
    IncompleteUnicodeEscape,

    #[error("0x{0:X} is not a valid Unicode code point")]
    InvalidCodePoint(u32),

    #[error("unrecognized escape sequence \\{0}")]
    UnknownEscape(char),
}

/// Failures while normalizing surface syntax into canonical form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("the hexadecimal literal `{0}` could not be parsed")]
    InvalidHexLiteral(String),

    #[error("register offset {0} is outside the signed 32-bit range")]
    OffsetOutOfRange(i64),

    #[error("the floating point literal `{0}` is not valid")]
    InvalidFloatLiteral(String),

    #[error("a {literal}-precision literal requires {required} size, not {declared}")]
    SizeMismatch {
        literal: &'static str,
        required: &'static str,
        declared: String,
    },

    #[error("a string literal is not properly terminated: {0}")]
    UnterminatedStringLiteral(String),

    #[error(transparent)]
    InvalidEscapeSequence(#[from] EscapeError),
}

/// Structural failures while parsing canonical text. Every error carries
/// the 1-based line number it originated from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} (line {line})")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("the program must begin with a `globals: <byte-count>` declaration")]
    MissingGlobalsDeclaration,

    #[error("the globals size `{0}` is not a valid byte count")]
    InvalidGlobalsSize(String),

    #[error("expected a label before the first instruction")]
    ExpectedLabel,

    #[error("the label `{0}` is defined multiple times")]
    DuplicateLabel(String),

    #[error("the program has multiple strings tables")]
    DuplicateStringsTable,

    #[error("the block labelled `{0}` has no instructions")]
    EmptyBlock(String),

    #[error("there is no instruction with the mnemonic `{0}`")]
    UnknownMnemonic(String),

    #[error("the `{0}` instruction requires a size operand")]
    MissingSizeOperand(String),

    #[error("the size `{0}` is invalid")]
    InvalidSize(String),

    #[error("the `{mnemonic}` instruction requires {expected} operand(s), it has {found}")]
    OperandCountMismatch {
        mnemonic: String,
        expected: u8,
        found: usize,
    },

    #[error("a strings table entry must take the form `0: \"some text\"`")]
    MalformedStringEntry,

    #[error("a string in the table has the wrong index; expected {expected} but got {found}")]
    StringIndexMismatch { expected: usize, found: usize },

    #[error("the strings table has no entries")]
    EmptyStringsTable,

    #[error(transparent)]
    InvalidEscapeSequence(#[from] EscapeError),
}

impl ParseError {
    pub fn new(line: usize, kind: ParseErrorKind) -> Self {
        ParseError { line, kind }
    }
}

/// Operand typing and encoding failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error("there is no instruction with the mnemonic `{0}`")]
    UnknownMnemonic(String),

    #[error("the operand `{0}` could not have its type determined")]
    UnrecognizedOperand(String),

    #[error("no memory address may be 0x8000000000000000 or above, got 0x{0:016X}")]
    AddressOutOfRange(u64),

    #[error("the numeric literal `{0}` does not fit in 64 bits")]
    LiteralOutOfRange(String),

    #[error("the `{0}` instruction cannot take a label operand")]
    LabelNotAllowed(String),

    #[error("the `{mnemonic}` instruction requires an address, label, or string operand, got `{operand}`")]
    OperandMustBeAddress { mnemonic: String, operand: String },

    #[error("a numeric literal requires a declared operand size")]
    MissingOperandSize,
}

/// Unresolved symbolic references discovered while laying out the image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("the label `{0}` does not name any block")]
    UnresolvedLabel(String),

    #[error("the string table has no entry at index {0}")]
    UnresolvedStringIndex(u32),
}

/// Failures while reading a binary image. The disassembler is deliberately
/// tolerant: unknown opcodes and too-new versions produce diagnostic text,
/// not errors; only a non-image or a truncated buffer fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisasmError {
    #[error("not an IronArc program")]
    NotAnImage,

    #[error("unexpected end of image at byte {0}")]
    UnexpectedEof(usize),
}

/// Umbrella error for the whole pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Disasm(#[from] DisasmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize the address map: {0}")]
    Map(#[from] serde_yaml::Error),
}
