//! Symbol table: stack-linked scopes over entity and scope arenas.
//!
//! The table owns every entity and scope created during a compile. Scopes
//! form a tree through `outer` links; the `current` register tracks the
//! scope whose block is being parsed. Declarations all pass through
//! [`SymTab::declare`], which performs the per-kind bookkeeping: frame
//! offsets for variables and parameters, parameter-list views for callees,
//! and outer-link wiring for nested subroutines.

pub mod object;
pub mod types;

pub use object::{Object, ObjectAttrs, ObjectId, ObjectKind, ParamKind, ScopeId};
pub use types::{ConstantValue, Type};

/// Words reserved at the base of every frame: return value, dynamic link,
/// return address, static link.
pub const RESERVED_WORDS: i32 = 4;

/// One lexical scope.
#[derive(Debug)]
pub struct Scope {
    /// Entities declared here, in declaration order.
    pub objects: Vec<ObjectId>,
    /// The program, function, or procedure this scope belongs to.
    pub owner: ObjectId,
    /// Enclosing scope; `None` for the program scope and the built-ins.
    pub outer: Option<ScopeId>,
    /// Frame size so far: reserved header plus declared locals/parameters.
    pub frame_size: i32,
}

/// The predefined entities, recognized by identity rather than name.
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub readi: ObjectId,
    pub readc: ObjectId,
    pub writei: ObjectId,
    pub writec: ObjectId,
    pub writeln: ObjectId,
}

/// Symbol table for one compilation.
#[derive(Debug)]
pub struct SymTab {
    objects: Vec<Object>,
    scopes: Vec<Scope>,
    globals: Vec<ObjectId>,
    program: Option<ObjectId>,
    current: Option<ScopeId>,
    builtins: Builtins,
}

impl SymTab {
    /// Creates a table pre-populated with the I/O built-ins.
    pub fn new() -> Self {
        let mut symtab = Self {
            objects: Vec::new(),
            scopes: Vec::new(),
            globals: Vec::new(),
            program: None,
            current: None,
            // Placeholder ids, overwritten below before anyone reads them.
            builtins: Builtins {
                readi: ObjectId::new(0),
                readc: ObjectId::new(0),
                writei: ObjectId::new(0),
                writec: ObjectId::new(0),
                writeln: ObjectId::new(0),
            },
        };

        let readc = symtab.new_function("READC");
        symtab.declare(readc);
        symtab.set_return_type(readc, Type::Char);

        let readi = symtab.new_function("READI");
        symtab.declare(readi);
        symtab.set_return_type(readi, Type::Int);

        let writei = symtab.new_procedure("WRITEI");
        symtab.declare(writei);
        symtab.enter_block(symtab.owned_scope(writei));
        let param = symtab.new_parameter("I", ParamKind::Value, Type::Int);
        symtab.declare(param);
        symtab.exit_block();

        let writec = symtab.new_procedure("WRITEC");
        symtab.declare(writec);
        symtab.enter_block(symtab.owned_scope(writec));
        let param = symtab.new_parameter("CH", ParamKind::Value, Type::Char);
        symtab.declare(param);
        symtab.exit_block();

        let writeln = symtab.new_procedure("WRITELN");
        symtab.declare(writeln);

        symtab.builtins = Builtins {
            readi,
            readc,
            writei,
            writec,
            writeln,
        };
        symtab
    }

    // ========================================================================
    // Entity construction
    // ========================================================================

    fn alloc(&mut self, name: &str, attrs: ObjectAttrs) -> ObjectId {
        let id = ObjectId::new(self.objects.len());
        self.objects.push(Object {
            name: name.to_owned(),
            attrs,
        });
        id
    }

    fn alloc_scope(&mut self, owner: ObjectId) -> ScopeId {
        let id = ScopeId::new(self.scopes.len());
        self.scopes.push(Scope {
            objects: Vec::new(),
            owner,
            outer: None,
            frame_size: RESERVED_WORDS,
        });
        id
    }

    /// Creates the program entity and records it as the table's root.
    pub fn new_program(&mut self, name: &str) -> ObjectId {
        let id = self.alloc(
            name,
            ObjectAttrs::Program {
                scope: ScopeId::new(0), // patched right below
                code_address: 0,
            },
        );
        let scope = self.alloc_scope(id);
        if let ObjectAttrs::Program { scope: slot, .. } = &mut self.objects[id.index()].attrs {
            *slot = scope;
        }
        self.program = Some(id);
        id
    }

    pub fn new_constant(&mut self, name: &str, value: ConstantValue) -> ObjectId {
        self.alloc(name, ObjectAttrs::Constant { value })
    }

    pub fn new_type_alias(&mut self, name: &str, ty: Type) -> ObjectId {
        self.alloc(name, ObjectAttrs::TypeAlias { ty })
    }

    pub fn new_variable(&mut self, name: &str, ty: Type) -> ObjectId {
        self.alloc(
            name,
            ObjectAttrs::Variable {
                ty,
                scope: None,
                offset: 0,
            },
        )
    }

    pub fn new_parameter(&mut self, name: &str, kind: ParamKind, ty: Type) -> ObjectId {
        self.alloc(
            name,
            ObjectAttrs::Parameter {
                kind,
                ty,
                scope: None,
                offset: 0,
            },
        )
    }

    pub fn new_function(&mut self, name: &str) -> ObjectId {
        let id = self.alloc(
            name,
            ObjectAttrs::Function {
                params: Vec::new(),
                return_type: None,
                scope: ScopeId::new(0), // patched right below
                code_address: 0,
            },
        );
        let scope = self.alloc_scope(id);
        if let ObjectAttrs::Function { scope: slot, .. } = &mut self.objects[id.index()].attrs {
            *slot = scope;
        }
        id
    }

    pub fn new_procedure(&mut self, name: &str) -> ObjectId {
        let id = self.alloc(
            name,
            ObjectAttrs::Procedure {
                params: Vec::new(),
                scope: ScopeId::new(0), // patched right below
                code_address: 0,
            },
        );
        let scope = self.alloc_scope(id);
        if let ObjectAttrs::Procedure { scope: slot, .. } = &mut self.objects[id.index()].attrs {
            *slot = scope;
        }
        id
    }

    // ========================================================================
    // Declaration and scope movement
    // ========================================================================

    /// Declares an entity in the current scope (or globally when no scope
    /// is open), performing the per-kind bookkeeping.
    pub fn declare(&mut self, id: ObjectId) {
        let Some(current) = self.current else {
            self.globals.push(id);
            return;
        };
        match &mut self.objects[id.index()].attrs {
            ObjectAttrs::Variable { ty, scope, offset } => {
                let size = ty.size();
                *scope = Some(current);
                *offset = self.scopes[current.index()].frame_size;
                self.scopes[current.index()].frame_size += size;
            }
            ObjectAttrs::Parameter { scope, offset, .. } => {
                *scope = Some(current);
                *offset = self.scopes[current.index()].frame_size;
                self.scopes[current.index()].frame_size += 1;
                let owner = self.scopes[current.index()].owner;
                match &mut self.objects[owner.index()].attrs {
                    ObjectAttrs::Function { params, .. } | ObjectAttrs::Procedure { params, .. } => {
                        params.push(id);
                    }
                    _ => {}
                }
            }
            ObjectAttrs::Function { scope, .. } | ObjectAttrs::Procedure { scope, .. } => {
                let owned_scope = *scope;
                self.scopes[owned_scope.index()].outer = Some(current);
            }
            ObjectAttrs::Program { .. } | ObjectAttrs::Constant { .. } | ObjectAttrs::TypeAlias { .. } => {}
        }
        self.scopes[current.index()].objects.push(id);
    }

    /// Makes `scope` the current scope.
    pub fn enter_block(&mut self, scope: ScopeId) {
        self.current = Some(scope);
    }

    /// Returns to the enclosing scope.
    pub fn exit_block(&mut self) {
        let current = self.current.expect("exit_block with no open scope");
        self.current = self.scopes[current.index()].outer;
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Resolves `name` walking from the current scope outward, then through
    /// the global built-ins. Names are already upper-folded by the scanner,
    /// so comparison is exact.
    pub fn lookup(&self, name: &str) -> Option<ObjectId> {
        let mut scope = self.current;
        while let Some(id) = scope {
            let found = self.find_in(&self.scopes[id.index()].objects, name);
            if found.is_some() {
                return found;
            }
            scope = self.scopes[id.index()].outer;
        }
        self.find_in(&self.globals, name)
    }

    /// Searches only the current scope (the global list when none is open).
    pub fn lookup_current_scope(&self, name: &str) -> Option<ObjectId> {
        match self.current {
            Some(id) => self.find_in(&self.scopes[id.index()].objects, name),
            None => self.find_in(&self.globals, name),
        }
    }

    fn find_in(&self, list: &[ObjectId], name: &str) -> Option<ObjectId> {
        list.iter().copied().find(|id| self.objects[id.index()].name == name)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.index()]
    }

    /// Every entity created so far, in creation order.
    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    /// Every scope created so far, in creation order.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn current_scope(&self) -> Option<ScopeId> {
        self.current
    }

    pub fn program(&self) -> Option<ObjectId> {
        self.program
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// True for the five predefined I/O entities (identity comparison).
    pub fn is_predefined(&self, id: ObjectId) -> bool {
        let b = &self.builtins;
        id == b.readi || id == b.readc || id == b.writei || id == b.writec || id == b.writeln
    }

    /// The block scope owned by a program, function, or procedure.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not own a scope; callers hold an id they just
    /// created or kind-checked.
    pub fn owned_scope(&self, id: ObjectId) -> ScopeId {
        match &self.objects[id.index()].attrs {
            ObjectAttrs::Program { scope, .. }
            | ObjectAttrs::Function { scope, .. }
            | ObjectAttrs::Procedure { scope, .. } => *scope,
            _ => panic!("owned_scope on an entity without a block"),
        }
    }

    /// Declared type of a variable or parameter.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a variable or parameter.
    pub fn storage_type(&self, id: ObjectId) -> &Type {
        match &self.objects[id.index()].attrs {
            ObjectAttrs::Variable { ty, .. } | ObjectAttrs::Parameter { ty, .. } => ty,
            _ => panic!("storage_type on an entity without storage"),
        }
    }

    /// Pass mode of a parameter.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a parameter.
    pub fn param_kind(&self, id: ObjectId) -> ParamKind {
        match &self.objects[id.index()].attrs {
            ObjectAttrs::Parameter { kind, .. } => *kind,
            _ => panic!("param_kind on a non-parameter entity"),
        }
    }

    /// Value of a declared constant.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a constant.
    pub fn constant_value(&self, id: ObjectId) -> ConstantValue {
        match &self.objects[id.index()].attrs {
            ObjectAttrs::Constant { value } => *value,
            _ => panic!("constant_value on a non-constant entity"),
        }
    }

    /// The type a type alias stands for.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a type alias.
    pub fn alias_type(&self, id: ObjectId) -> &Type {
        match &self.objects[id.index()].attrs {
            ObjectAttrs::TypeAlias { ty } => ty,
            _ => panic!("alias_type on a non-alias entity"),
        }
    }

    /// Parameter list view of a function or procedure.
    pub fn params(&self, id: ObjectId) -> &[ObjectId] {
        match &self.objects[id.index()].attrs {
            ObjectAttrs::Function { params, .. } | ObjectAttrs::Procedure { params, .. } => params,
            _ => &[],
        }
    }

    pub fn set_return_type(&mut self, id: ObjectId, ty: Type) {
        if let ObjectAttrs::Function { return_type, .. } = &mut self.objects[id.index()].attrs {
            *return_type = Some(ty);
        }
    }

    /// Declared result type of a function.
    pub fn return_type(&self, id: ObjectId) -> &Type {
        match &self.objects[id.index()].attrs {
            ObjectAttrs::Function { return_type, .. } => {
                return_type.as_ref().expect("function declaration sets its return type")
            }
            _ => panic!("return_type on a non-function entity"),
        }
    }

    pub fn set_code_address(&mut self, id: ObjectId, address: i32) {
        match &mut self.objects[id.index()].attrs {
            ObjectAttrs::Program { code_address, .. }
            | ObjectAttrs::Function { code_address, .. }
            | ObjectAttrs::Procedure { code_address, .. } => *code_address = address,
            _ => {}
        }
    }

    pub fn code_address(&self, id: ObjectId) -> i32 {
        match &self.objects[id.index()].attrs {
            ObjectAttrs::Program { code_address, .. }
            | ObjectAttrs::Function { code_address, .. }
            | ObjectAttrs::Procedure { code_address, .. } => *code_address,
            _ => 0,
        }
    }
}

impl Default for SymTab {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Opens a program scope and returns its id.
    fn open_program(symtab: &mut SymTab) -> ScopeId {
        let program = symtab.new_program("P");
        let scope = match symtab.object(program).attrs {
            ObjectAttrs::Program { scope, .. } => scope,
            _ => unreachable!(),
        };
        symtab.enter_block(scope);
        scope
    }

    #[test]
    fn test_builtins_present_and_predefined() {
        let symtab = SymTab::new();
        let readi = symtab.lookup("READI").unwrap();
        assert_eq!(readi, symtab.builtins().readi);
        assert!(symtab.is_predefined(readi));
        assert_eq!(symtab.return_type(readi), &Type::Int);
        assert_eq!(symtab.return_type(symtab.builtins().readc), &Type::Char);
        assert_eq!(symtab.params(symtab.builtins().writei).len(), 1);
        assert_eq!(symtab.params(symtab.builtins().writeln).len(), 0);
    }

    #[test]
    fn test_variable_offsets_accumulate() {
        let mut symtab = SymTab::new();
        let scope = open_program(&mut symtab);

        let x = symtab.new_variable("X", Type::Int);
        symtab.declare(x);
        let a = symtab.new_variable("A", Type::array(10, Type::Int));
        symtab.declare(a);
        let y = symtab.new_variable("Y", Type::Char);
        symtab.declare(y);

        let offset = |id: ObjectId| match symtab.object(id).attrs {
            ObjectAttrs::Variable { offset, .. } => offset,
            _ => unreachable!(),
        };
        assert_eq!(offset(x), 4);
        assert_eq!(offset(a), 5);
        assert_eq!(offset(y), 15);
        assert_eq!(symtab.scope(scope).frame_size, 16);
    }

    #[test]
    fn test_parameters_take_one_word_and_join_the_view() {
        let mut symtab = SymTab::new();
        open_program(&mut symtab);

        let f = symtab.new_function("F");
        symtab.declare(f);
        symtab.enter_block(symtab.owned_scope(f));
        let a = symtab.new_parameter("A", ParamKind::Value, Type::Int);
        symtab.declare(a);
        let b = symtab.new_parameter("B", ParamKind::Reference, Type::Char);
        symtab.declare(b);
        symtab.exit_block();

        assert_eq!(symtab.params(f), &[a, b]);
        assert_eq!(symtab.scope(symtab.owned_scope(f)).frame_size, 6);
        match symtab.object(b).attrs {
            ObjectAttrs::Parameter { offset, .. } => assert_eq!(offset, 5),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_nested_scope_outer_links() {
        let mut symtab = SymTab::new();
        let program_scope = open_program(&mut symtab);

        let p = symtab.new_procedure("OUTER");
        symtab.declare(p);
        assert_eq!(symtab.scope(symtab.owned_scope(p)).outer, Some(program_scope));

        symtab.enter_block(symtab.owned_scope(p));
        let q = symtab.new_procedure("INNER");
        symtab.declare(q);
        assert_eq!(symtab.scope(symtab.owned_scope(q)).outer, Some(symtab.owned_scope(p)));
        symtab.exit_block();
        assert_eq!(symtab.current_scope(), Some(program_scope));
    }

    #[test]
    fn test_lookup_walks_outward_and_shadows() {
        let mut symtab = SymTab::new();
        open_program(&mut symtab);

        let outer_x = symtab.new_variable("X", Type::Int);
        symtab.declare(outer_x);

        let p = symtab.new_procedure("P");
        symtab.declare(p);
        symtab.enter_block(symtab.owned_scope(p));

        // Inherited before shadowing.
        assert_eq!(symtab.lookup("X"), Some(outer_x));
        assert_eq!(symtab.lookup_current_scope("X"), None);

        let inner_x = symtab.new_variable("X", Type::Char);
        symtab.declare(inner_x);
        assert_eq!(symtab.lookup("X"), Some(inner_x));

        symtab.exit_block();
        assert_eq!(symtab.lookup("X"), Some(outer_x));
    }
}
