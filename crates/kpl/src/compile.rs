//! Batch compilation drivers.

use std::fs;
use std::path::Path;

use crate::bytecode::CodeBlock;
use crate::error::Result;
use crate::parser::Parser;
use crate::symtab::SymTab;

/// Compiles KPL source text to a code block.
pub fn compile(source: &str) -> Result<CodeBlock> {
    let (code, _) = compile_with_symtab(source)?;
    Ok(code)
}

/// Compiles source text, also returning the symbol table for inspection.
pub fn compile_with_symtab(source: &str) -> Result<(CodeBlock, SymTab)> {
    let mut parser = Parser::new(source)?;
    parser.compile_program()?;
    Ok(parser.into_parts())
}

/// Compiles a source file and writes the bytecode image.
pub fn compile_file(input: &Path, output: &Path) -> Result<()> {
    let source = fs::read_to_string(input)?;
    let code = compile(&source)?;
    let mut sink = fs::File::create(output)?;
    code.serialize(&mut sink)?;
    Ok(())
}
