//! Emission helpers over the code buffer.
//!
//! Thin wrappers that turn symbol-table facts into instructions: nesting
//! distance along the static chain, addressing of variables, parameters
//! and function return slots, call protocol, predefined I/O dispatch, and
//! jump emission with backpatching. The parser drives these while walking
//! the grammar.

use crate::error::{CompileError, ErrorKind, Result};
use crate::symtab::{ObjectAttrs, ObjectId, ScopeId, SymTab};

use super::code::{CodeBlock, CodeOverflow, DC, InstrHandle};
use super::op::Opcode;

impl From<CodeOverflow> for CompileError {
    fn from(_: CodeOverflow) -> Self {
        Self::new(ErrorKind::CodeOverflow, 0, 0)
    }
}

/// Code generator: owns the buffer being filled for one compilation.
#[derive(Debug, Default)]
pub struct CodeGen {
    code: CodeBlock,
}

impl CodeGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(&self) -> &CodeBlock {
        &self.code
    }

    pub fn into_code(self) -> CodeBlock {
        self.code
    }

    /// Address the next instruction will occupy.
    pub fn current_address(&self) -> i32 {
        self.code.current_address()
    }

    /// Number of static-link hops from the current scope to `target`.
    ///
    /// # Panics
    ///
    /// Panics if `target` is not on the current scope chain; resolution
    /// only ever hands the generator scopes found by walking that chain.
    fn nested_level(&self, symtab: &SymTab, target: ScopeId) -> i32 {
        let mut level = 0;
        let mut walk = symtab.current_scope();
        while let Some(scope) = walk {
            if scope == target {
                return level;
            }
            level += 1;
            walk = symtab.scope(scope).outer;
        }
        panic!("target scope is not on the current scope chain")
    }

    fn variable_slot(symtab: &SymTab, var: ObjectId) -> (ScopeId, i32) {
        match &symtab.object(var).attrs {
            ObjectAttrs::Variable { scope, offset, .. } | ObjectAttrs::Parameter { scope, offset, .. } => {
                (scope.expect("declared entity has a scope"), *offset)
            }
            _ => panic!("address of a non-storage entity"),
        }
    }

    // ========================================================================
    // Loads and stores
    // ========================================================================

    /// `LA level,offset` for a variable's storage.
    pub fn variable_address(&mut self, symtab: &SymTab, var: ObjectId) -> Result<()> {
        let (scope, offset) = Self::variable_slot(symtab, var);
        let level = self.nested_level(symtab, scope);
        self.code.append(Opcode::La, level, offset)?;
        Ok(())
    }

    /// `LV level,offset` for a variable's value.
    pub fn variable_value(&mut self, symtab: &SymTab, var: ObjectId) -> Result<()> {
        let (scope, offset) = Self::variable_slot(symtab, var);
        let level = self.nested_level(symtab, scope);
        self.code.append(Opcode::Lv, level, offset)?;
        Ok(())
    }

    /// Parameters live in the frame like locals; the same addressing applies.
    pub fn parameter_address(&mut self, symtab: &SymTab, param: ObjectId) -> Result<()> {
        self.variable_address(symtab, param)
    }

    pub fn parameter_value(&mut self, symtab: &SymTab, param: ObjectId) -> Result<()> {
        self.variable_value(symtab, param)
    }

    /// `LA level,0`: address of a function's return-value slot.
    pub fn return_value_address(&mut self, symtab: &SymTab, func: ObjectId) -> Result<()> {
        let level = self.nested_level(symtab, symtab.owned_scope(func));
        self.code.append(Opcode::La, level, 0)?;
        Ok(())
    }

    /// `LV level,0`: value of a function's return-value slot.
    pub fn return_value_value(&mut self, symtab: &SymTab, func: ObjectId) -> Result<()> {
        let level = self.nested_level(symtab, symtab.owned_scope(func));
        self.code.append(Opcode::Lv, level, 0)?;
        Ok(())
    }

    pub fn load_constant(&mut self, value: i32) -> Result<()> {
        self.code.append(Opcode::Lc, DC, value)?;
        Ok(())
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// `CALL level,target` for a user procedure or function.
    ///
    /// The callee's static link must point at the frame of the scope the
    /// callee was declared in, so the level operand is the distance to that
    /// declaring scope plus one; the VM follows `level - 1` links.
    pub fn call(&mut self, symtab: &SymTab, callee: ObjectId) -> Result<()> {
        let declaring = symtab
            .scope(symtab.owned_scope(callee))
            .outer
            .expect("user callees are declared inside a scope");
        let level = self.nested_level(symtab, declaring) + 1;
        self.code.append(Opcode::Call, level, symtab.code_address(callee))?;
        Ok(())
    }

    /// Emits the opcode a predefined procedure stands for.
    pub fn predefined_procedure_call(&mut self, symtab: &SymTab, callee: ObjectId) -> Result<()> {
        let builtins = symtab.builtins();
        let op = if callee == builtins.writei {
            Opcode::Wri
        } else if callee == builtins.writec {
            Opcode::Wrc
        } else if callee == builtins.writeln {
            Opcode::Wln
        } else {
            panic!("not a predefined procedure")
        };
        self.code.append(op, DC, DC)?;
        Ok(())
    }

    /// Emits the opcode a predefined function stands for.
    pub fn predefined_function_call(&mut self, symtab: &SymTab, callee: ObjectId) -> Result<()> {
        let builtins = symtab.builtins();
        let op = if callee == builtins.readi {
            Opcode::Ri
        } else if callee == builtins.readc {
            Opcode::Rc
        } else {
            panic!("not a predefined function")
        };
        self.code.append(op, DC, DC)?;
        Ok(())
    }

    // ========================================================================
    // Jumps
    // ========================================================================

    /// Emits `J` with a placeholder target; patch through the handle.
    pub fn jump(&mut self) -> Result<InstrHandle> {
        Ok(self.code.append(Opcode::J, DC, DC)?)
    }

    /// Emits `FJ` with a placeholder target; patch through the handle.
    pub fn false_jump(&mut self) -> Result<InstrHandle> {
        Ok(self.code.append(Opcode::Fj, DC, DC)?)
    }

    /// Emits `J` to a known address.
    pub fn jump_to(&mut self, target: i32) -> Result<()> {
        self.code.append(Opcode::J, DC, target)?;
        Ok(())
    }

    /// Resolves a pending jump to `target`.
    pub fn patch_jump(&mut self, handle: InstrHandle, target: i32) {
        self.code.patch(handle, target);
    }

    // ========================================================================
    // Plain emitters
    // ========================================================================

    pub fn emit(&mut self, op: Opcode) -> Result<()> {
        self.code.append(op, DC, DC)?;
        Ok(())
    }

    /// `INT q`: advance the stack top, allocating frame space.
    pub fn stack_alloc(&mut self, words: i32) -> Result<()> {
        self.code.append(Opcode::Int, DC, words)?;
        Ok(())
    }

    /// `DCT q`: retract the stack top.
    pub fn stack_free(&mut self, words: i32) -> Result<()> {
        self.code.append(Opcode::Dct, DC, words)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::{ParamKind, Type};

    fn program_symtab() -> SymTab {
        let mut symtab = SymTab::new();
        let program = symtab.new_program("P");
        let scope = match symtab.object(program).attrs {
            ObjectAttrs::Program { scope, .. } => scope,
            _ => unreachable!(),
        };
        symtab.enter_block(scope);
        symtab
    }

    fn ops(emitter: &CodeGen) -> Vec<(Opcode, i32, i32)> {
        emitter.code().instructions().iter().map(|i| (i.op, i.p, i.q)).collect()
    }

    #[test]
    fn test_variable_addressing_levels() {
        let mut symtab = program_symtab();
        let x = symtab.new_variable("X", Type::Int);
        symtab.declare(x);

        let p = symtab.new_procedure("P2");
        symtab.declare(p);
        symtab.enter_block(symtab.owned_scope(p));
        let y = symtab.new_variable("Y", Type::Int);
        symtab.declare(y);

        let mut emitter = CodeGen::new();
        emitter.variable_address(&symtab, x).unwrap();
        emitter.variable_value(&symtab, y).unwrap();
        assert_eq!(ops(&emitter), vec![(Opcode::La, 1, 4), (Opcode::Lv, 0, 4)]);
    }

    #[test]
    fn test_reference_parameter_slot_addressing() {
        let mut symtab = program_symtab();
        let p = symtab.new_procedure("P2");
        symtab.declare(p);
        symtab.enter_block(symtab.owned_scope(p));
        let r = symtab.new_parameter("R", ParamKind::Reference, Type::Int);
        symtab.declare(r);

        let mut emitter = CodeGen::new();
        emitter.parameter_value(&symtab, r).unwrap();
        assert_eq!(ops(&emitter), vec![(Opcode::Lv, 0, 4)]);
    }

    #[test]
    fn test_call_level_is_distance_plus_one() {
        let mut symtab = program_symtab();
        let p = symtab.new_procedure("P2");
        symtab.declare(p);

        // Call from the program body: declared right here, one link.
        let mut emitter = CodeGen::new();
        symtab.set_code_address(p, 7);
        emitter.call(&symtab, p).unwrap();
        assert_eq!(ops(&emitter), vec![(Opcode::Call, 1, 7)]);

        // Call from inside the procedure itself (recursion): two links.
        symtab.enter_block(symtab.owned_scope(p));
        let mut emitter = CodeGen::new();
        emitter.call(&symtab, p).unwrap();
        assert_eq!(ops(&emitter), vec![(Opcode::Call, 2, 7)]);
    }

    #[test]
    fn test_return_value_slot() {
        let mut symtab = program_symtab();
        let f = symtab.new_function("F");
        symtab.declare(f);
        symtab.set_return_type(f, Type::Int);
        symtab.enter_block(symtab.owned_scope(f));

        let mut emitter = CodeGen::new();
        emitter.return_value_address(&symtab, f).unwrap();
        emitter.return_value_value(&symtab, f).unwrap();
        assert_eq!(ops(&emitter), vec![(Opcode::La, 0, 0), (Opcode::Lv, 0, 0)]);
    }

    #[test]
    fn test_predefined_dispatch() {
        let symtab = SymTab::new();
        let mut emitter = CodeGen::new();
        emitter.predefined_procedure_call(&symtab, symtab.builtins().writei).unwrap();
        emitter.predefined_procedure_call(&symtab, symtab.builtins().writeln).unwrap();
        emitter.predefined_function_call(&symtab, symtab.builtins().readc).unwrap();
        assert_eq!(
            ops(&emitter),
            vec![(Opcode::Wri, DC, DC), (Opcode::Wln, DC, DC), (Opcode::Rc, DC, DC)]
        );
    }

    #[test]
    fn test_jump_patching() {
        let mut emitter = CodeGen::new();
        let fj = emitter.false_jump().unwrap();
        emitter.load_constant(1).unwrap();
        emitter.patch_jump(fj, emitter.current_address());
        assert_eq!(ops(&emitter), vec![(Opcode::Fj, DC, 3), (Opcode::Lc, DC, 1)]);
    }
}
