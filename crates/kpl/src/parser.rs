//! Recursive-descent parser driving the single compilation pass.
//!
//! One function per nonterminal. Each production validates its tokens,
//! resolves and declares names in the symbol table, type-checks as it
//! goes, and appends instructions through [`CodeGen`] — there is no AST.
//! Forward branches are emitted with placeholder targets and patched the
//! moment their target address is known.
//!
//! The parser keeps a one-token lookahead: `eat` consumes the lookahead
//! when it matches the expected kind and reports a missing-token error
//! otherwise.

use crate::bytecode::{CodeBlock, CodeGen, Opcode};
use crate::error::{CompileError, ErrorKind, Result};
use crate::scanner::Scanner;
use crate::semantics::{
    check_array_type, check_basic_type, check_declared_constant, check_declared_ident, check_declared_lvalue_ident,
    check_declared_procedure, check_declared_type, check_declared_variable, check_fresh_ident, check_int_type,
    check_type_equality,
};
use crate::symtab::{ConstantValue, ObjectId, ObjectKind, ParamKind, RESERVED_WORDS, SymTab, Type};
use crate::token::{Token, TokenKind};

/// The compiler's driver: parses one program while emitting its bytecode.
pub struct Parser {
    scanner: Scanner,
    /// Most recently consumed token.
    current: Token,
    /// One-token lookahead buffer.
    look_ahead: Token,
    symtab: SymTab,
    emitter: CodeGen,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self> {
        let mut scanner = Scanner::new(source);
        let look_ahead = scanner.next_valid_token()?;
        Ok(Self {
            scanner,
            current: Token::new(TokenKind::Eof, 0, 0),
            look_ahead,
            symtab: SymTab::new(),
            emitter: CodeGen::new(),
        })
    }

    /// The generated code and symbol table, for inspection after a compile.
    pub fn into_parts(self) -> (CodeBlock, SymTab) {
        (self.emitter.into_code(), self.symtab)
    }

    fn scan(&mut self) -> Result<()> {
        let next = self.scanner.next_valid_token()?;
        self.current = std::mem::replace(&mut self.look_ahead, next);
        Ok(())
    }

    /// Consumes the lookahead iff it has the expected kind.
    fn eat(&mut self, kind: TokenKind) -> Result<()> {
        if self.look_ahead.kind == kind {
            self.scan()
        } else {
            Err(self.err_ahead(ErrorKind::MissingToken(kind)))
        }
    }

    fn err_ahead(&self, kind: ErrorKind) -> CompileError {
        CompileError::new(kind, self.look_ahead.line, self.look_ahead.col)
    }

    fn err_current(&self, kind: ErrorKind) -> CompileError {
        CompileError::new(kind, self.current.line, self.current.col)
    }

    // ========================================================================
    // Program and blocks
    // ========================================================================

    /// `Program = "PROGRAM" ident ";" Block "."`
    pub fn compile_program(&mut self) -> Result<()> {
        self.eat(TokenKind::Program)?;
        self.eat(TokenKind::Ident)?;
        let program = self.symtab.new_program(&self.current.lexeme.clone());
        self.symtab.set_code_address(program, self.emitter.current_address());
        self.eat(TokenKind::Semicolon)?;

        self.symtab.enter_block(self.symtab.owned_scope(program));
        self.compile_block()?;
        self.emitter.emit(Opcode::Hl)?;
        self.symtab.exit_block();

        self.eat(TokenKind::Period)?;
        Ok(())
    }

    /// Declarations, then the frame allocation, then the compound statement.
    ///
    /// The leading `J` skips the bodies of nested subroutines; its target
    /// is this block's `INT`, which reserves the frame (header plus
    /// declared locals and parameters) on entry.
    fn compile_block(&mut self) -> Result<()> {
        let skip = self.emitter.jump()?;
        self.compile_const_decls()?;
        self.compile_type_decls()?;
        self.compile_var_decls()?;
        self.compile_sub_decls()?;
        self.emitter.patch_jump(skip, self.emitter.current_address());

        let scope = self.symtab.current_scope().expect("block is parsed inside a scope");
        let frame_size = self.symtab.scope(scope).frame_size;
        self.emitter.stack_alloc(frame_size)?;

        self.eat(TokenKind::Begin)?;
        self.compile_statements()?;
        self.eat(TokenKind::End)?;
        Ok(())
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// `ConstDecl = "CONST" (ident "=" Constant ";")+`
    fn compile_const_decls(&mut self) -> Result<()> {
        if self.look_ahead.kind != TokenKind::Const {
            return Ok(());
        }
        self.eat(TokenKind::Const)?;
        loop {
            self.eat(TokenKind::Ident)?;
            check_fresh_ident(&self.symtab, &self.current)?;
            let name = self.current.lexeme.clone();
            self.eat(TokenKind::Eq)?;
            let value = self.compile_constant()?;
            let constant = self.symtab.new_constant(&name, value);
            self.symtab.declare(constant);
            self.eat(TokenKind::Semicolon)?;
            if self.look_ahead.kind != TokenKind::Ident {
                return Ok(());
            }
        }
    }

    /// `Constant = ["+"|"-"] (number | ident-of-int-const) | char-literal`
    fn compile_constant(&mut self) -> Result<ConstantValue> {
        match self.look_ahead.kind {
            TokenKind::Plus => {
                self.eat(TokenKind::Plus)?;
                Ok(ConstantValue::Int(self.compile_int_constant()?))
            }
            TokenKind::Minus => {
                self.eat(TokenKind::Minus)?;
                Ok(ConstantValue::Int(-self.compile_int_constant()?))
            }
            TokenKind::CharLiteral => {
                self.eat(TokenKind::CharLiteral)?;
                Ok(ConstantValue::Char(self.current.value as u8))
            }
            _ => Ok(ConstantValue::Int(self.compile_int_constant()?)),
        }
    }

    /// An unsigned integer constant: a number or the name of one.
    fn compile_int_constant(&mut self) -> Result<i32> {
        match self.look_ahead.kind {
            TokenKind::Number => {
                self.eat(TokenKind::Number)?;
                Ok(self.current.value)
            }
            TokenKind::Ident => {
                self.eat(TokenKind::Ident)?;
                let id = check_declared_constant(&self.symtab, &self.current)?;
                match self.symtab.constant_value(id) {
                    ConstantValue::Int(value) => Ok(value),
                    ConstantValue::Char(_) => Err(self.err_current(ErrorKind::UndeclaredIntConstant)),
                }
            }
            _ => Err(self.err_ahead(ErrorKind::InvalidConstant)),
        }
    }

    /// `TypeDecl = "TYPE" (ident "=" Type ";")+`
    fn compile_type_decls(&mut self) -> Result<()> {
        if self.look_ahead.kind != TokenKind::Type {
            return Ok(());
        }
        self.eat(TokenKind::Type)?;
        loop {
            self.eat(TokenKind::Ident)?;
            check_fresh_ident(&self.symtab, &self.current)?;
            let name = self.current.lexeme.clone();
            self.eat(TokenKind::Eq)?;
            let ty = self.compile_type()?;
            let alias = self.symtab.new_type_alias(&name, ty);
            self.symtab.declare(alias);
            self.eat(TokenKind::Semicolon)?;
            if self.look_ahead.kind != TokenKind::Ident {
                return Ok(());
            }
        }
    }

    /// `Type = "INTEGER" | "CHAR" | "ARRAY" "[" number "]" "OF" Type | ident`
    fn compile_type(&mut self) -> Result<Type> {
        match self.look_ahead.kind {
            TokenKind::Integer => {
                self.eat(TokenKind::Integer)?;
                Ok(Type::Int)
            }
            TokenKind::Char => {
                self.eat(TokenKind::Char)?;
                Ok(Type::Char)
            }
            TokenKind::Array => {
                self.eat(TokenKind::Array)?;
                self.eat(TokenKind::LSel)?;
                self.eat(TokenKind::Number)?;
                let size = self.current.value;
                self.eat(TokenKind::RSel)?;
                self.eat(TokenKind::Of)?;
                let element = self.compile_type()?;
                Ok(Type::array(size, element))
            }
            TokenKind::Ident => {
                self.eat(TokenKind::Ident)?;
                let id = check_declared_type(&self.symtab, &self.current)?;
                Ok(self.symtab.alias_type(id).clone())
            }
            _ => Err(self.err_ahead(ErrorKind::InvalidType)),
        }
    }

    /// `BasicType = "INTEGER" | "CHAR"`
    fn compile_basic_type(&mut self) -> Result<Type> {
        match self.look_ahead.kind {
            TokenKind::Integer => {
                self.eat(TokenKind::Integer)?;
                Ok(Type::Int)
            }
            TokenKind::Char => {
                self.eat(TokenKind::Char)?;
                Ok(Type::Char)
            }
            _ => Err(self.err_ahead(ErrorKind::InvalidBasicType)),
        }
    }

    /// `VarDecl = "VAR" (ident ("," ident)* ":" Type ";")+`
    fn compile_var_decls(&mut self) -> Result<()> {
        if self.look_ahead.kind != TokenKind::Var {
            return Ok(());
        }
        self.eat(TokenKind::Var)?;
        loop {
            let mut names: Vec<Token> = Vec::new();
            loop {
                self.eat(TokenKind::Ident)?;
                check_fresh_ident(&self.symtab, &self.current)?;
                if names.iter().any(|t| t.lexeme == self.current.lexeme) {
                    return Err(self.err_current(ErrorKind::DuplicateIdent));
                }
                names.push(self.current.clone());
                if self.look_ahead.kind != TokenKind::Comma {
                    break;
                }
                self.eat(TokenKind::Comma)?;
            }
            self.eat(TokenKind::Colon)?;
            let ty = self.compile_type()?;
            for name in &names {
                let var = self.symtab.new_variable(&name.lexeme, ty.clone());
                self.symtab.declare(var);
            }
            self.eat(TokenKind::Semicolon)?;
            if self.look_ahead.kind != TokenKind::Ident {
                return Ok(());
            }
        }
    }

    /// `SubDecl = FuncDecl | ProcDecl`, repeated.
    fn compile_sub_decls(&mut self) -> Result<()> {
        loop {
            match self.look_ahead.kind {
                TokenKind::Function => self.compile_func_decl()?,
                TokenKind::Procedure => self.compile_proc_decl()?,
                _ => return Ok(()),
            }
        }
    }

    /// `FuncDecl = "FUNCTION" ident Params ":" BasicType ";" Block ";"`
    fn compile_func_decl(&mut self) -> Result<()> {
        self.eat(TokenKind::Function)?;
        self.eat(TokenKind::Ident)?;
        check_fresh_ident(&self.symtab, &self.current)?;
        let func = self.symtab.new_function(&self.current.lexeme.clone());
        self.symtab.declare(func);

        self.symtab.enter_block(self.symtab.owned_scope(func));
        self.compile_params()?;
        self.eat(TokenKind::Colon)?;
        let return_type = self.compile_basic_type()?;
        self.symtab.set_return_type(func, return_type);
        self.eat(TokenKind::Semicolon)?;

        self.symtab.set_code_address(func, self.emitter.current_address());
        self.compile_block()?;
        self.emitter.emit(Opcode::Ef)?;
        self.symtab.exit_block();
        self.eat(TokenKind::Semicolon)?;
        Ok(())
    }

    /// `ProcDecl = "PROCEDURE" ident Params ";" Block ";"`
    fn compile_proc_decl(&mut self) -> Result<()> {
        self.eat(TokenKind::Procedure)?;
        self.eat(TokenKind::Ident)?;
        check_fresh_ident(&self.symtab, &self.current)?;
        let proc = self.symtab.new_procedure(&self.current.lexeme.clone());
        self.symtab.declare(proc);

        self.symtab.enter_block(self.symtab.owned_scope(proc));
        self.compile_params()?;
        self.eat(TokenKind::Semicolon)?;

        self.symtab.set_code_address(proc, self.emitter.current_address());
        self.compile_block()?;
        self.emitter.emit(Opcode::Ep)?;
        self.symtab.exit_block();
        self.eat(TokenKind::Semicolon)?;
        Ok(())
    }

    /// `Params = ε | "(" Param (";" Param)* ")"`
    fn compile_params(&mut self) -> Result<()> {
        if self.look_ahead.kind != TokenKind::LPar {
            return Ok(());
        }
        self.eat(TokenKind::LPar)?;
        self.compile_param()?;
        while self.look_ahead.kind == TokenKind::Semicolon {
            self.eat(TokenKind::Semicolon)?;
            self.compile_param()?;
        }
        self.eat(TokenKind::RPar)?;
        Ok(())
    }

    /// `Param = ["VAR"] ident ":" BasicType`
    fn compile_param(&mut self) -> Result<()> {
        let kind = if self.look_ahead.kind == TokenKind::Var {
            self.eat(TokenKind::Var)?;
            ParamKind::Reference
        } else {
            ParamKind::Value
        };
        self.eat(TokenKind::Ident)?;
        check_fresh_ident(&self.symtab, &self.current)?;
        let name = self.current.lexeme.clone();
        self.eat(TokenKind::Colon)?;
        let ty = self.compile_basic_type()?;
        let param = self.symtab.new_parameter(&name, kind, ty);
        self.symtab.declare(param);
        Ok(())
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn compile_statements(&mut self) -> Result<()> {
        self.compile_statement()?;
        while self.look_ahead.kind == TokenKind::Semicolon {
            self.eat(TokenKind::Semicolon)?;
            self.compile_statement()?;
        }
        Ok(())
    }

    fn compile_statement(&mut self) -> Result<()> {
        match self.look_ahead.kind {
            TokenKind::Ident => self.compile_assign_st(),
            TokenKind::Call => self.compile_call_st(),
            TokenKind::Begin => self.compile_group_st(),
            TokenKind::If => self.compile_if_st(),
            TokenKind::While => self.compile_while_st(),
            TokenKind::For => self.compile_for_st(),
            // Statement followers admit the empty statement.
            TokenKind::Semicolon | TokenKind::End | TokenKind::Else => Ok(()),
            _ => Err(self.err_ahead(ErrorKind::InvalidStatement)),
        }
    }

    /// `AssignSt = LValue ("," LValue)* ":=" Expr ("," Expr)*`
    ///
    /// Targets and right-hand sides are paired left to right and the
    /// emission interleaves them: addressᵢ then valueᵢ. The trailing run
    /// of `ST`s then resolves the pairs last-in first, so every right-hand
    /// side is computed before any target is written — `x, y := y, x`
    /// swaps. Only the first target may be an indexed array element, and
    /// only while the statement stays a single assignment; later targets
    /// are plain variables, parameters or the enclosing function's name,
    /// so their address emission can be deferred to its paired position.
    fn compile_assign_st(&mut self) -> Result<()> {
        let (first_ty, first_indexed) = self.compile_lvalue()?;
        let mut target_types = vec![first_ty];
        let mut deferred = Vec::new();

        while self.look_ahead.kind == TokenKind::Comma {
            if first_indexed {
                return Err(self.err_ahead(ErrorKind::InvalidLValue));
            }
            self.eat(TokenKind::Comma)?;
            self.eat(TokenKind::Ident)?;
            let id = check_declared_lvalue_ident(&self.symtab, &self.current)?;
            let ty = self.simple_lvalue_type(id)?;
            target_types.push(ty);
            deferred.push(id);
        }

        self.eat(TokenKind::Assign)?;

        let ty = self.compile_expression()?;
        check_type_equality(&ty, &target_types[0], &self.current)?;
        for (index, &id) in deferred.iter().enumerate() {
            self.eat(TokenKind::Comma)?;
            self.emit_simple_lvalue_address(id)?;
            let ty = self.compile_expression()?;
            check_type_equality(&ty, &target_types[index + 1], &self.current)?;
        }

        for _ in 0..target_types.len() {
            self.emitter.emit(Opcode::St)?;
        }
        Ok(())
    }

    /// Type of a multi-assignment target, which must be basic-typed
    /// storage (arrays are not first-class values).
    fn simple_lvalue_type(&self, id: ObjectId) -> Result<Type> {
        let ty = match self.symtab.object(id).kind() {
            ObjectKind::Variable | ObjectKind::Parameter => self.symtab.storage_type(id).clone(),
            ObjectKind::Function => self.symtab.return_type(id).clone(),
            _ => return Err(self.err_current(ErrorKind::InvalidLValue)),
        };
        if !ty.is_basic() {
            return Err(self.err_current(ErrorKind::InvalidLValue));
        }
        Ok(ty)
    }

    /// Address emission for a resolved non-indexed target.
    fn emit_simple_lvalue_address(&mut self, id: ObjectId) -> Result<()> {
        match self.symtab.object(id).kind() {
            ObjectKind::Variable => self.emitter.variable_address(&self.symtab, id),
            ObjectKind::Parameter => match self.symtab.param_kind(id) {
                ParamKind::Value => self.emitter.parameter_address(&self.symtab, id),
                // The slot already holds the target address.
                ParamKind::Reference => self.emitter.parameter_value(&self.symtab, id),
            },
            ObjectKind::Function => self.emitter.return_value_address(&self.symtab, id),
            _ => Err(self.err_current(ErrorKind::InvalidLValue)),
        }
    }

    /// `LValue = ident ("[" Expr "]")*`
    ///
    /// Emits code leaving the target's address on the stack and returns
    /// its type plus whether array indexing was involved.
    fn compile_lvalue(&mut self) -> Result<(Type, bool)> {
        self.eat(TokenKind::Ident)?;
        let id = check_declared_lvalue_ident(&self.symtab, &self.current)?;
        match self.symtab.object(id).kind() {
            ObjectKind::Variable => {
                let ty = self.symtab.storage_type(id).clone();
                self.emitter.variable_address(&self.symtab, id)?;
                if matches!(ty, Type::Array { .. }) {
                    let element = self.compile_indexes(ty)?;
                    Ok((element, true))
                } else {
                    Ok((ty, false))
                }
            }
            ObjectKind::Parameter => {
                self.emit_simple_lvalue_address(id)?;
                Ok((self.symtab.storage_type(id).clone(), false))
            }
            ObjectKind::Function => {
                self.emitter.return_value_address(&self.symtab, id)?;
                Ok((self.symtab.return_type(id).clone(), false))
            }
            _ => Err(self.err_current(ErrorKind::InvalidLValue)),
        }
    }

    /// Index chain over a base address already on the stack.
    ///
    /// Each step scales the index by the element size and adds it to the
    /// address; the type narrows one array layer per step and must come
    /// out basic.
    fn compile_indexes(&mut self, mut ty: Type) -> Result<Type> {
        while self.look_ahead.kind == TokenKind::LSel {
            self.eat(TokenKind::LSel)?;
            let index_ty = self.compile_expression()?;
            check_int_type(&index_ty, &self.current)?;
            check_array_type(&ty, &self.current)?;
            let Type::Array { element, .. } = ty else {
                unreachable!("just checked to be an array");
            };
            self.emitter.load_constant(element.size())?;
            self.emitter.emit(Opcode::Ml)?;
            self.emitter.emit(Opcode::Ad)?;
            self.eat(TokenKind::RSel)?;
            ty = *element;
        }
        check_basic_type(&ty, &self.current)?;
        Ok(ty)
    }

    /// `CallSt = "CALL" ident Arguments`
    ///
    /// User procedures get the full frame protocol: reserve the header,
    /// evaluate arguments into the parameter area, retract past it, and
    /// let `CALL` re-establish the frame. Predefined procedures take their
    /// arguments straight off the stack.
    fn compile_call_st(&mut self) -> Result<()> {
        self.eat(TokenKind::Call)?;
        self.eat(TokenKind::Ident)?;
        let proc = check_declared_procedure(&self.symtab, &self.current)?;
        if self.symtab.is_predefined(proc) {
            self.compile_arguments(proc)?;
            self.emitter.predefined_procedure_call(&self.symtab, proc)?;
        } else {
            self.emitter.stack_alloc(RESERVED_WORDS)?;
            self.compile_arguments(proc)?;
            let param_count = self.symtab.params(proc).len() as i32;
            self.emitter.stack_free(RESERVED_WORDS + param_count)?;
            self.emitter.call(&self.symtab, proc)?;
        }
        Ok(())
    }

    /// `Arguments = ε | "(" Expr-or-LValue ("," ...)* ")"`
    ///
    /// The formal parameter list drives the parse: by-value formals take
    /// expressions (a value on the stack), by-reference formals take
    /// L-values (an address on the stack). Each actual is type-checked
    /// against its formal and the counts must agree.
    fn compile_arguments(&mut self, callee: ObjectId) -> Result<()> {
        let params = self.symtab.params(callee).to_vec();
        if self.look_ahead.kind != TokenKind::LPar {
            if params.is_empty() {
                return Ok(());
            }
            return Err(self.err_ahead(ErrorKind::ArgumentCountMismatch));
        }
        self.eat(TokenKind::LPar)?;
        if params.is_empty() {
            return Err(self.err_ahead(ErrorKind::ArgumentCountMismatch));
        }
        self.compile_argument(params[0])?;
        let mut bound = 1;
        while self.look_ahead.kind == TokenKind::Comma {
            self.eat(TokenKind::Comma)?;
            if bound == params.len() {
                return Err(self.err_ahead(ErrorKind::ArgumentCountMismatch));
            }
            self.compile_argument(params[bound])?;
            bound += 1;
        }
        if bound < params.len() {
            return Err(self.err_ahead(ErrorKind::ArgumentCountMismatch));
        }
        self.eat(TokenKind::RPar)?;
        Ok(())
    }

    fn compile_argument(&mut self, formal: ObjectId) -> Result<()> {
        let formal_ty = self.symtab.storage_type(formal).clone();
        match self.symtab.param_kind(formal) {
            ParamKind::Value => {
                let ty = self.compile_expression()?;
                check_type_equality(&ty, &formal_ty, &self.current)?;
            }
            ParamKind::Reference => {
                let (ty, _) = self.compile_lvalue()?;
                check_type_equality(&ty, &formal_ty, &self.current)?;
            }
        }
        Ok(())
    }

    /// `GroupSt = "BEGIN" Statements "END"`
    fn compile_group_st(&mut self) -> Result<()> {
        self.eat(TokenKind::Begin)?;
        self.compile_statements()?;
        self.eat(TokenKind::End)?;
        Ok(())
    }

    /// `IfSt = "IF" Cond "THEN" Stmt ["ELSE" Stmt]`
    fn compile_if_st(&mut self) -> Result<()> {
        self.eat(TokenKind::If)?;
        self.compile_condition()?;
        self.eat(TokenKind::Then)?;
        let false_jump = self.emitter.false_jump()?;
        self.compile_statement()?;
        if self.look_ahead.kind == TokenKind::Else {
            self.eat(TokenKind::Else)?;
            let end_jump = self.emitter.jump()?;
            self.emitter.patch_jump(false_jump, self.emitter.current_address());
            self.compile_statement()?;
            self.emitter.patch_jump(end_jump, self.emitter.current_address());
        } else {
            self.emitter.patch_jump(false_jump, self.emitter.current_address());
        }
        Ok(())
    }

    /// `WhileSt = "WHILE" Cond "DO" Stmt`
    fn compile_while_st(&mut self) -> Result<()> {
        self.eat(TokenKind::While)?;
        let start = self.emitter.current_address();
        self.compile_condition()?;
        self.eat(TokenKind::Do)?;
        let exit_jump = self.emitter.false_jump()?;
        self.compile_statement()?;
        self.emitter.jump_to(start)?;
        self.emitter.patch_jump(exit_jump, self.emitter.current_address());
        Ok(())
    }

    /// `ForSt = "FOR" ident ":=" Expr "TO" Expr "DO" Stmt`
    ///
    /// The loop variable's address is kept on the stack for the whole
    /// loop; `CV`/`LI` refresh its current value for each bound check, and
    /// the trailing `DCT 1` drops the address on exit. The end bound is
    /// re-evaluated every iteration.
    fn compile_for_st(&mut self) -> Result<()> {
        self.eat(TokenKind::For)?;
        self.eat(TokenKind::Ident)?;
        let var = check_declared_variable(&self.symtab, &self.current)?;
        check_int_type(&self.symtab.storage_type(var).clone(), &self.current)?;

        self.emitter.variable_address(&self.symtab, var)?;
        self.emitter.emit(Opcode::Cv)?;
        self.eat(TokenKind::Assign)?;
        let start_ty = self.compile_expression()?;
        check_int_type(&start_ty, &self.current)?;
        self.emitter.emit(Opcode::St)?;

        self.emitter.emit(Opcode::Cv)?;
        self.emitter.emit(Opcode::Li)?;
        let test = self.emitter.current_address();
        self.eat(TokenKind::To)?;
        let end_ty = self.compile_expression()?;
        check_int_type(&end_ty, &self.current)?;
        self.emitter.emit(Opcode::Le)?;
        let exit_jump = self.emitter.false_jump()?;

        self.eat(TokenKind::Do)?;
        self.compile_statement()?;

        // i := i + 1, then refresh the value for the next bound check.
        self.emitter.emit(Opcode::Cv)?;
        self.emitter.emit(Opcode::Cv)?;
        self.emitter.emit(Opcode::Li)?;
        self.emitter.load_constant(1)?;
        self.emitter.emit(Opcode::Ad)?;
        self.emitter.emit(Opcode::St)?;
        self.emitter.emit(Opcode::Cv)?;
        self.emitter.emit(Opcode::Li)?;
        self.emitter.jump_to(test)?;
        self.emitter.patch_jump(exit_jump, self.emitter.current_address());
        self.emitter.stack_free(1)?;
        Ok(())
    }

    // ========================================================================
    // Conditions and expressions
    // ========================================================================

    /// `Cond = Expr relop Expr`
    fn compile_condition(&mut self) -> Result<()> {
        let left = self.compile_expression()?;
        check_basic_type(&left, &self.current)?;
        let op = match self.look_ahead.kind {
            TokenKind::Eq => Opcode::Eq,
            TokenKind::Ne => Opcode::Ne,
            TokenKind::Le => Opcode::Le,
            TokenKind::Lt => Opcode::Lt,
            TokenKind::Ge => Opcode::Ge,
            TokenKind::Gt => Opcode::Gt,
            _ => return Err(self.err_ahead(ErrorKind::InvalidComparator)),
        };
        self.scan()?;
        let right = self.compile_expression()?;
        check_type_equality(&right, &left, &self.current)?;
        self.emitter.emit(op)?;
        Ok(())
    }

    /// `Expr = ["+"|"-"] Expr2`
    fn compile_expression(&mut self) -> Result<Type> {
        match self.look_ahead.kind {
            TokenKind::Plus => {
                self.eat(TokenKind::Plus)?;
                let ty = self.compile_expression2()?;
                check_int_type(&ty, &self.current)?;
                Ok(ty)
            }
            TokenKind::Minus => {
                self.eat(TokenKind::Minus)?;
                let ty = self.compile_expression2()?;
                check_int_type(&ty, &self.current)?;
                self.emitter.emit(Opcode::Neg)?;
                Ok(ty)
            }
            _ => self.compile_expression2(),
        }
    }

    /// `Expr2 = Term {("+"|"-") Term}`
    fn compile_expression2(&mut self) -> Result<Type> {
        let mut ty = self.compile_term()?;
        loop {
            let op = match self.look_ahead.kind {
                TokenKind::Plus => Opcode::Ad,
                TokenKind::Minus => Opcode::Sb,
                _ => return Ok(ty),
            };
            check_int_type(&ty, &self.look_ahead)?;
            self.scan()?;
            let right = self.compile_term()?;
            check_int_type(&right, &self.current)?;
            self.emitter.emit(op)?;
            ty = Type::Int;
        }
    }

    /// `Term = Factor {("*"|"/") Factor}`
    fn compile_term(&mut self) -> Result<Type> {
        let mut ty = self.compile_factor()?;
        loop {
            let op = match self.look_ahead.kind {
                TokenKind::Times => Opcode::Ml,
                TokenKind::Slash => Opcode::Dv,
                _ => return Ok(ty),
            };
            check_int_type(&ty, &self.look_ahead)?;
            self.scan()?;
            let right = self.compile_factor()?;
            check_int_type(&right, &self.current)?;
            self.emitter.emit(op)?;
            ty = Type::Int;
        }
    }

    /// `Factor = number | char-literal | ident [Arguments] | "(" Expr ")"
    ///         | "IF" Cond "RETURN" Expr "ELSE" "RETURN" Expr`
    fn compile_factor(&mut self) -> Result<Type> {
        match self.look_ahead.kind {
            TokenKind::Number => {
                self.eat(TokenKind::Number)?;
                self.emitter.load_constant(self.current.value)?;
                Ok(Type::Int)
            }
            TokenKind::CharLiteral => {
                self.eat(TokenKind::CharLiteral)?;
                self.emitter.load_constant(self.current.value)?;
                Ok(Type::Char)
            }
            TokenKind::LPar => {
                self.eat(TokenKind::LPar)?;
                let ty = self.compile_expression()?;
                self.eat(TokenKind::RPar)?;
                Ok(ty)
            }
            TokenKind::If => self.compile_conditional_expression(),
            TokenKind::Ident => {
                self.eat(TokenKind::Ident)?;
                let id = check_declared_ident(&self.symtab, &self.current)?;
                self.compile_ident_factor(id)
            }
            _ => Err(self.err_ahead(ErrorKind::InvalidFactor)),
        }
    }

    /// A factor starting with a resolved identifier, dispatched on kind.
    fn compile_ident_factor(&mut self, id: ObjectId) -> Result<Type> {
        match self.symtab.object(id).kind() {
            ObjectKind::Constant => {
                let value = self.symtab.constant_value(id);
                self.emitter.load_constant(value.as_word())?;
                Ok(value.ty())
            }
            ObjectKind::Variable => {
                let ty = self.symtab.storage_type(id).clone();
                if matches!(ty, Type::Array { .. }) {
                    // Element access: address, index arithmetic, then load.
                    self.emitter.variable_address(&self.symtab, id)?;
                    let element = self.compile_indexes(ty)?;
                    self.emitter.emit(Opcode::Li)?;
                    Ok(element)
                } else {
                    self.emitter.variable_value(&self.symtab, id)?;
                    Ok(ty)
                }
            }
            ObjectKind::Parameter => {
                let ty = self.symtab.storage_type(id).clone();
                self.emitter.parameter_value(&self.symtab, id)?;
                if self.symtab.param_kind(id) == ParamKind::Reference {
                    // The slot holds an address; one more load for the value.
                    self.emitter.emit(Opcode::Li)?;
                }
                Ok(ty)
            }
            ObjectKind::Function => {
                if self.symtab.is_predefined(id) {
                    self.compile_arguments(id)?;
                    self.emitter.predefined_function_call(&self.symtab, id)?;
                } else {
                    self.emitter.stack_alloc(RESERVED_WORDS)?;
                    self.compile_arguments(id)?;
                    let param_count = self.symtab.params(id).len() as i32;
                    self.emitter.stack_free(RESERVED_WORDS + param_count)?;
                    self.emitter.call(&self.symtab, id)?;
                }
                Ok(self.symtab.return_type(id).clone())
            }
            _ => Err(self.err_current(ErrorKind::InvalidFactor)),
        }
    }

    /// `"IF" Cond "RETURN" Expr "ELSE" "RETURN" Expr`
    ///
    /// Same diamond as an IF statement, but both arms leave a value and
    /// must agree on its type.
    fn compile_conditional_expression(&mut self) -> Result<Type> {
        self.eat(TokenKind::If)?;
        self.compile_condition()?;
        self.eat(TokenKind::Return)?;
        let false_jump = self.emitter.false_jump()?;
        let then_ty = self.compile_expression()?;
        let end_jump = self.emitter.jump()?;
        self.emitter.patch_jump(false_jump, self.emitter.current_address());
        self.eat(TokenKind::Else)?;
        self.eat(TokenKind::Return)?;
        let else_ty = self.compile_expression()?;
        self.emitter.patch_jump(end_jump, self.emitter.current_address());
        check_type_equality(&else_ty, &then_ty, &self.current)?;
        Ok(then_ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (CodeBlock, SymTab) {
        let mut parser = Parser::new(source).expect("scanner primes");
        parser.compile_program().expect("program compiles");
        parser.into_parts()
    }

    #[test]
    fn test_empty_statements_are_accepted() {
        let (code, _) = parse("PROGRAM p; BEGIN ;; END.");
        assert_eq!(code.len(), 3);
    }

    #[test]
    fn test_group_statements_nest() {
        let (code, _) = parse("PROGRAM p; VAR x: INTEGER; BEGIN BEGIN x := 1 END; x := 2 END.");
        // Two assignments, each LA/LC/ST.
        let stores = code.instructions().iter().filter(|ins| ins.op == Opcode::St).count();
        assert_eq!(stores, 2);
    }

    #[test]
    fn test_conditional_expression_diamond() {
        let (code, _) = parse("PROGRAM p; VAR x, y: INTEGER; BEGIN y := IF x = 0 RETURN 1 ELSE RETURN 2 END.");
        let fj = code.at(7).expect("FJ after the condition");
        assert_eq!(fj.op, Opcode::Fj);
        assert_eq!(fj.q, 10);
        let jump = code.at(9).expect("J over the else arm");
        assert_eq!(jump.op, Opcode::J);
        assert_eq!(jump.q, 11);
    }

    #[test]
    fn test_subroutine_bodies_are_skipped() {
        let (code, symtab) = parse(
            "PROGRAM p;
             PROCEDURE noop;
             BEGIN END;
             BEGIN END.",
        );
        // The program's leading jump lands past the procedure body, on the
        // program's own INT.
        let skip = code.at(1).expect("program skip jump");
        assert_eq!(skip.op, Opcode::J);
        assert_eq!(code.at(skip.q).expect("skip target").op, Opcode::Int);

        let noop = symtab
            .objects()
            .iter()
            .find(|object| object.name == "NOOP")
            .expect("declared procedure");
        match noop.attrs {
            crate::symtab::ObjectAttrs::Procedure { code_address, .. } => assert_eq!(code_address, 2),
            _ => panic!("NOOP should be a procedure"),
        }
    }
}
