//! Error reporting: every rejection carries the right kind and position.

use kpl::{ErrorKind, TokenKind, compile};

fn kind_of(source: &str) -> ErrorKind {
    compile(source).expect_err("program should be rejected").kind
}

#[test]
fn test_missing_semicolon_position() {
    let err = compile("PROGRAM p BEGIN END.").unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingToken(TokenKind::Semicolon));
    assert_eq!((err.line, err.col), (1, 11));
}

#[test]
fn test_duplicate_identifier() {
    assert_eq!(
        kind_of("PROGRAM p; VAR x: INTEGER; x: CHAR; BEGIN END."),
        ErrorKind::DuplicateIdent
    );
    assert_eq!(
        kind_of("PROGRAM p; CONST c = 1; VAR c: INTEGER; BEGIN END."),
        ErrorKind::DuplicateIdent
    );
    assert_eq!(
        kind_of("PROGRAM p; VAR x, x: INTEGER; BEGIN END."),
        ErrorKind::DuplicateIdent
    );
}

#[test]
fn test_shadowing_is_legal() {
    let source = "\
PROGRAM p;
VAR x: INTEGER;
PROCEDURE q;
  VAR x: CHAR;
BEGIN x := 'a' END;
BEGIN x := 1 END.";
    compile(source).unwrap();
}

#[test]
fn test_undeclared_names() {
    assert_eq!(kind_of("PROGRAM p; BEGIN x := 1 END."), ErrorKind::UndeclaredIdent);
    assert_eq!(kind_of("PROGRAM p; BEGIN CALL nope END."), ErrorKind::UndeclaredProcedure);
    assert_eq!(
        kind_of("PROGRAM p; VAR a: nosuch; BEGIN END."),
        ErrorKind::UndeclaredType
    );
    assert_eq!(
        kind_of("PROGRAM p; CONST c = other; BEGIN END."),
        ErrorKind::UndeclaredConstant
    );
}

#[test]
fn test_wrong_kind_names() {
    // A variable where a procedure is required.
    assert_eq!(
        kind_of("PROGRAM p; VAR x: INTEGER; BEGIN CALL x END."),
        ErrorKind::InvalidProcedure
    );
    // A constant as an assignment target.
    assert_eq!(
        kind_of("PROGRAM p; CONST c = 1; BEGIN c := 2 END."),
        ErrorKind::InvalidIdent
    );
    // A type name inside an expression.
    assert_eq!(
        kind_of("PROGRAM p; TYPE t = INTEGER; VAR x: INTEGER; BEGIN x := t END."),
        ErrorKind::InvalidFactor
    );
}

#[test]
fn test_char_constant_is_not_an_int_constant() {
    assert_eq!(
        kind_of("PROGRAM p; CONST a = 'x'; b = -a; BEGIN END."),
        ErrorKind::UndeclaredIntConstant
    );
}

#[test]
fn test_function_name_lvalue_rule() {
    // Assigning the return value inside the body is the KPL idiom.
    let source = "\
PROGRAM p;
VAR x: INTEGER;
FUNCTION one: INTEGER;
BEGIN one := 1 END;
BEGIN x := one END.";
    compile(source).unwrap();

    // Outside the body the function name is not storage.
    assert_eq!(
        kind_of(
            "PROGRAM p;
             FUNCTION one: INTEGER;
             BEGIN one := 1 END;
             BEGIN one := 2 END."
        ),
        ErrorKind::InvalidIdent
    );
}

#[test]
fn test_type_inconsistencies() {
    assert_eq!(
        kind_of("PROGRAM p; VAR x: INTEGER; c: CHAR; BEGIN x := c END."),
        ErrorKind::TypeInconsistency
    );
    assert_eq!(
        kind_of("PROGRAM p; VAR c: CHAR; BEGIN c := c + 1 END."),
        ErrorKind::TypeInconsistency
    );
    assert_eq!(
        kind_of("PROGRAM p; VAR x: INTEGER; c: CHAR; BEGIN IF x = c THEN x := 1 END."),
        ErrorKind::TypeInconsistency
    );
    assert_eq!(
        kind_of("PROGRAM p; VAR c: CHAR; BEGIN FOR c := 'a' TO 'z' DO CALL WRITEC(c) END."),
        ErrorKind::TypeInconsistency
    );
    assert_eq!(
        kind_of("PROGRAM p; VAR a: ARRAY [3] OF INTEGER; c: CHAR; BEGIN a[c] := 1 END."),
        ErrorKind::TypeInconsistency
    );
    // A whole array is not assignable.
    assert_eq!(
        kind_of("PROGRAM p; VAR a: ARRAY [3] OF INTEGER; b: ARRAY [3] OF INTEGER; BEGIN a := b END."),
        ErrorKind::TypeInconsistency
    );
    // Conditional expression arms must agree.
    assert_eq!(
        kind_of("PROGRAM p; VAR x: INTEGER; BEGIN x := IF x = 0 RETURN 1 ELSE RETURN 'a' END."),
        ErrorKind::TypeInconsistency
    );
}

#[test]
fn test_argument_checking() {
    assert_eq!(
        kind_of("PROGRAM p; BEGIN CALL WRITEI END."),
        ErrorKind::ArgumentCountMismatch
    );
    assert_eq!(
        kind_of("PROGRAM p; VAR x: INTEGER; BEGIN CALL WRITEI(x, x) END."),
        ErrorKind::ArgumentCountMismatch
    );
    assert_eq!(
        kind_of("PROGRAM p; VAR c: CHAR; BEGIN CALL WRITEI(c) END."),
        ErrorKind::TypeInconsistency
    );
    // A reference formal needs an L-value, not a constant expression.
    assert_eq!(
        kind_of(
            "PROGRAM p;
             PROCEDURE q(VAR v: INTEGER);
             BEGIN v := 0 END;
             BEGIN CALL q(3) END."
        ),
        ErrorKind::MissingToken(TokenKind::Ident)
    );
}

#[test]
fn test_multi_assignment_restrictions() {
    // Indexed first target rules out the multi form.
    assert_eq!(
        kind_of("PROGRAM p; VAR a: ARRAY [3] OF INTEGER; x: INTEGER; BEGIN a[0], x := 1, 2 END."),
        ErrorKind::InvalidLValue
    );
    // Array-typed later target is not first-class.
    assert_eq!(
        kind_of("PROGRAM p; VAR a: ARRAY [3] OF INTEGER; x: INTEGER; BEGIN x, a := 1, 2 END."),
        ErrorKind::InvalidLValue
    );
}

#[test]
fn test_invalid_statement_and_factor() {
    assert_eq!(kind_of("PROGRAM p; BEGIN THEN END."), ErrorKind::InvalidStatement);
    assert_eq!(
        kind_of("PROGRAM p; VAR x: INTEGER; BEGIN x := * END."),
        ErrorKind::InvalidFactor
    );
    assert_eq!(
        kind_of("PROGRAM p; VAR x: INTEGER; BEGIN IF x THEN x := 1 END."),
        ErrorKind::InvalidComparator
    );
}

#[test]
fn test_lexical_errors_surface_with_positions() {
    let err = compile("PROGRAM p; BEGIN ? END.").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidSymbol);
    assert_eq!((err.line, err.col), (1, 18));

    assert_eq!(kind_of("PROGRAM p; (* open BEGIN END."), ErrorKind::UnterminatedComment);
    assert_eq!(
        kind_of("PROGRAM verylongidentifiername; BEGIN END."),
        ErrorKind::IdentTooLong
    );
}
