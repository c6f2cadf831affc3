//! The virtual machine's opcode set.

use num_enum::TryFromPrimitive;

/// One VM opcode.
///
/// Instructions are fixed-shape triples `(opcode, p, q)`; [`Opcode::arity`]
/// says how many of the two operand slots an opcode actually uses (unused
/// slots hold 0). Discriminants are the wire encoding of the bytecode
/// image, so they are explicit and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, TryFromPrimitive)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(i32)]
pub enum Opcode {
    /// Push the address `frame(p) + q`.
    La = 0,
    /// Push the value at `frame(p) + q`.
    Lv = 1,
    /// Push the constant `q`.
    Lc = 2,
    /// Replace the address on top with the value it points at.
    Li = 3,
    /// Pop a value then an address and store.
    St = 4,
    /// Advance the stack top by `q` words.
    Int = 5,
    /// Retract the stack top by `q` words.
    Dct = 6,
    /// Jump to address `q`.
    J = 7,
    /// Pop; jump to `q` when the popped word is zero.
    Fj = 8,
    /// Halt.
    Hl = 9,
    /// Call the subroutine at `q`; `p` selects the static link.
    Call = 10,
    /// Return from a procedure.
    Ep = 11,
    /// Return from a function, keeping the result slot on top.
    Ef = 12,
    /// Read a character into the address on top.
    Rc = 13,
    /// Read an integer into the address on top.
    Ri = 14,
    /// Write the character popped from the top.
    Wrc = 15,
    /// Write the integer popped from the top.
    Wri = 16,
    /// Write a newline.
    Wln = 17,
    Ad = 18,
    Sb = 19,
    Ml = 20,
    Dv = 21,
    Neg = 22,
    /// Duplicate the top of the stack.
    Cv = 23,
    Eq = 24,
    Ne = 25,
    Gt = 26,
    Lt = 27,
    Ge = 28,
    Le = 29,
}

impl Opcode {
    /// Number of operand slots the opcode uses (0, 1 or 2).
    pub fn arity(self) -> usize {
        match self {
            Self::La | Self::Lv | Self::Call => 2,
            Self::Lc | Self::Int | Self::Dct | Self::J | Self::Fj => 1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonics() {
        assert_eq!(Opcode::La.to_string(), "LA");
        assert_eq!(Opcode::Call.to_string(), "CALL");
        assert_eq!(Opcode::Wln.to_string(), "WLN");
    }

    #[test]
    fn test_wire_roundtrip() {
        assert_eq!(Opcode::try_from(0).unwrap(), Opcode::La);
        assert_eq!(Opcode::try_from(29).unwrap(), Opcode::Le);
        assert!(Opcode::try_from(30).is_err());
        assert!(Opcode::try_from(-1).is_err());
    }

    #[test]
    fn test_arity() {
        assert_eq!(Opcode::La.arity(), 2);
        assert_eq!(Opcode::J.arity(), 1);
        assert_eq!(Opcode::Hl.arity(), 0);
    }
}
