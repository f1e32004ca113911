pub mod assemble;
pub mod disasm;
pub mod error;
pub mod link;
pub mod parse;
pub mod strings;
pub mod translate;

pub use assemble::{
    assemble_block, assemble_file, assemble_instruction, AssembledBlock, AssembledFile,
    AssembledInstruction, Operand, PendingRef, RefTarget, LABEL_SENTINELS,
    MAX_INSTRUCTION_LENGTH, STRING_PLACEHOLDER_TAG,
};
pub use disasm::{decode_one, disassemble_program, ILLEGAL_INSTRUCTION};
pub use error::{
    AssembleError, DisasmError, Error, EscapeError, LinkError, ParseError, ParseErrorKind,
    TranslateError,
};
pub use link::{
    compute_layout, link_file, Layout, ASSEMBLER_VERSION, HEADER_SIZE, MAGIC, SPEC_VERSION,
};
pub use parse::{
    parse_file, ParsedBlock, ParsedFile, ParsedInstruction, ParsedStringTable,
};
pub use translate::translate;
