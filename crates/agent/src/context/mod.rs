//! Deterministic context assembly.

pub mod assembler;
pub mod token;

pub use assembler::{
    AssembledPrompt, AssemblyInput, ContextAssembler, PromptSection, SectionKind,
};
