use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Syntax Error: {0}")]
    PestError(#[from] Box<pest::error::Error<crate::parser::Rule>>),

    #[error("Structural Error on line {line}: {reason}")]
    StructuralError { line: usize, reason: String },

    #[error("Semantic Error on line {line}: {reason}")]
    SemanticError { line: usize, reason: String },

    #[error("Semantic Error: {reason}")]
    SemanticErrorNoLine { reason: String },

    #[error("line {line}: invalid number literal '{text}'")]
    InvalidNumber { line: usize, text: String },

    #[error("line {line}: '{op}' expects {expected} operand(s), got {found}")]
    ArityMismatch {
        line: usize,
        op: String,
        expected: usize,
        found: usize,
    },

    #[error("undefined symbol '{name}'")]
    UndefinedSymbol { name: String },

    #[error("line {line}: symbol '{name}' already defined")]
    MultiplyDefined { line: usize, name: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MacroError {
    #[error("MEND without matching MACRO")]
    MendWithoutMacro,

    #[error("macro '{name}' invoked with {found} argument(s), expected {expected}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Error, Debug)]
pub enum DulfError {
    #[error("bad magic number")]
    BadMagic,

    #[error("truncated object file")]
    Truncated,

    #[error("bad offset or index in object file")]
    BadOffset,
}

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("undefined external symbol '{0}'")]
    UndefinedExternal(String),

    #[error("symbol '{0}' is defined in more than one object")]
    MultiplyDefined(String),

    #[error("object has no .text section")]
    MissingTextSection,

    #[error("relocation type is not supported by the linker")]
    UnsupportedRelocation,
}

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("program of {needed} word(s) does not fit in {available} word(s) of memory")]
    ProgramTooLarge { needed: u64, available: u64 },

    #[error("sections overlap in the target memory image")]
    SectionOverlap,
}
