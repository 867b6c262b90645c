//! Opcode definitions for the minibit instruction set.
//!
//! Each instruction occupies one u16 word: the low byte is the opcode, the
//! high byte is the "direct argument" (local index, arity, table index and
//! so on). Wider operands follow in the stream as whole words; jump targets
//! are 24 bits, split across the direct argument (high 8) and the following
//! word (low 16).

use crate::error::DecodeError;

/// Identifies the operation to perform.
///
/// The `#[repr(u8)]` attribute gives each variant a stable byte value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // Control
    /// No operation.
    Noop = 0x01,
    /// Return from a procedure. The stack must be exactly empty.
    Ret0 = 0x02,
    /// Return top of stack. The stack must be exactly one value deep.
    Ret1 = 0x03,

    // Constants
    /// Push the zero word.
    LdZero = 0x10,
    /// Push the 8-bit direct argument.
    LdConst8 = 0x11,
    /// Push the following word.
    LdConst16 = 0x12,
    /// Push a 32-bit constant: low word follows, then high word.
    LdConst32 = 0x13,
    /// Push a tagged code pointer for the 24-bit word offset.
    LdPtr = 0x14,
    /// Materialize a cached string literal. Direct argument is the string
    /// table index; the following word is the literal's word offset.
    LdStrRef = 0x15,

    // Arguments and locals
    /// Push argument `direct`.
    LdArg = 0x20,
    /// Push argument `direct`, incrementing its reference count.
    LdArgRef = 0x21,
    /// Push local `direct`.
    LdLoc = 0x22,
    /// Push local `direct`, incrementing its reference count.
    LdLocRef = 0x23,
    /// Pop into local `direct`.
    StLoc = 0x24,
    /// Pop into local `direct`, releasing the local's previous reference.
    StLocRef = 0x25,
    /// Null out local `direct`, releasing its reference. Scope-exit cleanup.
    ClrLocRef = 0x26,

    // Globals
    /// Push global `direct`.
    LdGlb = 0x28,
    /// Push global `direct`, incrementing its reference count.
    LdGlbRef = 0x29,
    /// Pop into global `direct`.
    StGlb = 0x2A,
    /// Pop into global `direct`, releasing the global's previous reference.
    StGlbRef = 0x2B,

    // Stack and unary
    /// Discard top of stack.
    Pop = 0x30,
    /// Discard top of stack, releasing its reference.
    PopRef = 0x31,
    /// Logical negation of top of stack (0 becomes 1, nonzero becomes 0).
    Not = 0x32,
    /// Release top of stack's reference, replace it with 1 if it was null.
    IsNull = 0x33,
    /// Arithmetic negation of top of stack.
    Neg = 0x34,

    // Record fields and closure captures
    /// Pop a record handle, push scalar field `direct`.
    LdFld = 0x38,
    /// Pop a record handle, push reference field `direct` (incremented).
    LdFldRef = 0x39,
    /// Pop value then record handle, store scalar field `direct`.
    StFld = 0x3A,
    /// Pop value then record handle, store reference field `direct`
    /// (releasing the old value).
    StFldRef = 0x3B,
    /// Pop a value, write captured slot `direct` of the action below it,
    /// leaving the action on the stack. Each slot may be written once.
    StClo = 0x3C,

    // Jumps (24-bit absolute word offsets)
    /// Unconditional jump.
    Jmp = 0x40,
    /// Pop; jump if the popped word is zero.
    Jmpz = 0x41,
    /// Pop; jump if the popped word is nonzero.
    Jmpnz = 0x42,

    // User-defined function calls. Direct argument is the argument count;
    // the following word is the callee's word offset. Checked variants
    // consume one more word: the reference mask for post-call cleanup.
    /// Flat call, no result.
    FlatUcallProc = 0x50,
    /// Flat call, push the result.
    FlatUcallFunc = 0x51,
    /// Checked call, no result.
    UcallProc = 0x52,
    /// Checked call, push the result.
    UcallFunc = 0x53,

    // Native calls through the dispatch tables. Direct argument is the
    // table index; arity is in the opcode. Checked variants consume a
    // trailing reference-mask word.
    /// Flat native procedure call, 0 arguments.
    FlatCall0Proc = 0x60,
    /// Flat native procedure call, 1 argument.
    FlatCall1Proc = 0x61,
    /// Flat native procedure call, 2 arguments.
    FlatCall2Proc = 0x62,
    /// Flat native procedure call, 3 arguments.
    FlatCall3Proc = 0x63,
    /// Flat native procedure call, 4 arguments.
    FlatCall4Proc = 0x64,
    /// Flat native function call, 0 arguments.
    FlatCall0Func = 0x65,
    /// Flat native function call, 1 argument.
    FlatCall1Func = 0x66,
    /// Flat native function call, 2 arguments.
    FlatCall2Func = 0x67,
    /// Flat native function call, 3 arguments.
    FlatCall3Func = 0x68,
    /// Flat native function call, 4 arguments.
    FlatCall4Func = 0x69,
    /// Checked native procedure call, 0 arguments.
    Call0Proc = 0x70,
    /// Checked native procedure call, 1 argument.
    Call1Proc = 0x71,
    /// Checked native procedure call, 2 arguments.
    Call2Proc = 0x72,
    /// Checked native procedure call, 3 arguments.
    Call3Proc = 0x73,
    /// Checked native procedure call, 4 arguments.
    Call4Proc = 0x74,
    /// Checked native function call, 0 arguments.
    Call0Func = 0x75,
    /// Checked native function call, 1 argument.
    Call1Func = 0x76,
    /// Checked native function call, 2 arguments.
    Call2Func = 0x77,
    /// Checked native function call, 3 arguments.
    Call3Func = 0x78,
    /// Checked native function call, 4 arguments.
    Call4Func = 0x79,
}

/// All valid opcodes, in definition order. Useful for exhaustive testing.
pub const ALL_OPS: [Op; 57] = [
    Op::Noop,
    Op::Ret0,
    Op::Ret1,
    Op::LdZero,
    Op::LdConst8,
    Op::LdConst16,
    Op::LdConst32,
    Op::LdPtr,
    Op::LdStrRef,
    Op::LdArg,
    Op::LdArgRef,
    Op::LdLoc,
    Op::LdLocRef,
    Op::StLoc,
    Op::StLocRef,
    Op::ClrLocRef,
    Op::LdGlb,
    Op::LdGlbRef,
    Op::StGlb,
    Op::StGlbRef,
    Op::Pop,
    Op::PopRef,
    Op::Not,
    Op::IsNull,
    Op::Neg,
    Op::LdFld,
    Op::LdFldRef,
    Op::StFld,
    Op::StFldRef,
    Op::StClo,
    Op::Jmp,
    Op::Jmpz,
    Op::Jmpnz,
    Op::FlatUcallProc,
    Op::FlatUcallFunc,
    Op::UcallProc,
    Op::UcallFunc,
    Op::FlatCall0Proc,
    Op::FlatCall1Proc,
    Op::FlatCall2Proc,
    Op::FlatCall3Proc,
    Op::FlatCall4Proc,
    Op::FlatCall0Func,
    Op::FlatCall1Func,
    Op::FlatCall2Func,
    Op::FlatCall3Func,
    Op::FlatCall4Func,
    Op::Call0Proc,
    Op::Call1Proc,
    Op::Call2Proc,
    Op::Call3Proc,
    Op::Call4Proc,
    Op::Call0Func,
    Op::Call1Func,
    Op::Call2Func,
    Op::Call3Func,
    Op::Call4Func,
];

impl TryFrom<u8> for Op {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Op::Noop),
            0x02 => Ok(Op::Ret0),
            0x03 => Ok(Op::Ret1),
            0x10 => Ok(Op::LdZero),
            0x11 => Ok(Op::LdConst8),
            0x12 => Ok(Op::LdConst16),
            0x13 => Ok(Op::LdConst32),
            0x14 => Ok(Op::LdPtr),
            0x15 => Ok(Op::LdStrRef),
            0x20 => Ok(Op::LdArg),
            0x21 => Ok(Op::LdArgRef),
            0x22 => Ok(Op::LdLoc),
            0x23 => Ok(Op::LdLocRef),
            0x24 => Ok(Op::StLoc),
            0x25 => Ok(Op::StLocRef),
            0x26 => Ok(Op::ClrLocRef),
            0x28 => Ok(Op::LdGlb),
            0x29 => Ok(Op::LdGlbRef),
            0x2A => Ok(Op::StGlb),
            0x2B => Ok(Op::StGlbRef),
            0x30 => Ok(Op::Pop),
            0x31 => Ok(Op::PopRef),
            0x32 => Ok(Op::Not),
            0x33 => Ok(Op::IsNull),
            0x34 => Ok(Op::Neg),
            0x38 => Ok(Op::LdFld),
            0x39 => Ok(Op::LdFldRef),
            0x3A => Ok(Op::StFld),
            0x3B => Ok(Op::StFldRef),
            0x3C => Ok(Op::StClo),
            0x40 => Ok(Op::Jmp),
            0x41 => Ok(Op::Jmpz),
            0x42 => Ok(Op::Jmpnz),
            0x50 => Ok(Op::FlatUcallProc),
            0x51 => Ok(Op::FlatUcallFunc),
            0x52 => Ok(Op::UcallProc),
            0x53 => Ok(Op::UcallFunc),
            0x60 => Ok(Op::FlatCall0Proc),
            0x61 => Ok(Op::FlatCall1Proc),
            0x62 => Ok(Op::FlatCall2Proc),
            0x63 => Ok(Op::FlatCall3Proc),
            0x64 => Ok(Op::FlatCall4Proc),
            0x65 => Ok(Op::FlatCall0Func),
            0x66 => Ok(Op::FlatCall1Func),
            0x67 => Ok(Op::FlatCall2Func),
            0x68 => Ok(Op::FlatCall3Func),
            0x69 => Ok(Op::FlatCall4Func),
            0x70 => Ok(Op::Call0Proc),
            0x71 => Ok(Op::Call1Proc),
            0x72 => Ok(Op::Call2Proc),
            0x73 => Ok(Op::Call3Proc),
            0x74 => Ok(Op::Call4Proc),
            0x75 => Ok(Op::Call0Func),
            0x76 => Ok(Op::Call1Func),
            0x77 => Ok(Op::Call2Func),
            0x78 => Ok(Op::Call3Func),
            0x79 => Ok(Op::Call4Func),
            other => Err(DecodeError::BadOpcode(other)),
        }
    }
}

impl Op {
    /// Returns the assembly mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Noop => "NOOP",
            Op::Ret0 => "RET0",
            Op::Ret1 => "RET1",
            Op::LdZero => "LDZERO",
            Op::LdConst8 => "LDCONST8",
            Op::LdConst16 => "LDCONST16",
            Op::LdConst32 => "LDCONST32",
            Op::LdPtr => "LDPTR",
            Op::LdStrRef => "LDSTRREF",
            Op::LdArg => "LDARG",
            Op::LdArgRef => "LDARGREF",
            Op::LdLoc => "LDLOC",
            Op::LdLocRef => "LDLOCREF",
            Op::StLoc => "STLOC",
            Op::StLocRef => "STLOCREF",
            Op::ClrLocRef => "CLRLOCREF",
            Op::LdGlb => "LDGLB",
            Op::LdGlbRef => "LDGLBREF",
            Op::StGlb => "STGLB",
            Op::StGlbRef => "STGLBREF",
            Op::Pop => "POP",
            Op::PopRef => "POPREF",
            Op::Not => "NOT",
            Op::IsNull => "ISNULL",
            Op::Neg => "NEG",
            Op::LdFld => "LDFLD",
            Op::LdFldRef => "LDFLDREF",
            Op::StFld => "STFLD",
            Op::StFldRef => "STFLDREF",
            Op::StClo => "STCLO",
            Op::Jmp => "JMP",
            Op::Jmpz => "JMPZ",
            Op::Jmpnz => "JMPNZ",
            Op::FlatUcallProc => "FLATUCALLPROC",
            Op::FlatUcallFunc => "FLATUCALLFUNC",
            Op::UcallProc => "UCALLPROC",
            Op::UcallFunc => "UCALLFUNC",
            Op::FlatCall0Proc => "FLATCALL0PROC",
            Op::FlatCall1Proc => "FLATCALL1PROC",
            Op::FlatCall2Proc => "FLATCALL2PROC",
            Op::FlatCall3Proc => "FLATCALL3PROC",
            Op::FlatCall4Proc => "FLATCALL4PROC",
            Op::FlatCall0Func => "FLATCALL0FUNC",
            Op::FlatCall1Func => "FLATCALL1FUNC",
            Op::FlatCall2Func => "FLATCALL2FUNC",
            Op::FlatCall3Func => "FLATCALL3FUNC",
            Op::FlatCall4Func => "FLATCALL4FUNC",
            Op::Call0Proc => "CALL0PROC",
            Op::Call1Proc => "CALL1PROC",
            Op::Call2Proc => "CALL2PROC",
            Op::Call3Proc => "CALL3PROC",
            Op::Call4Proc => "CALL4PROC",
            Op::Call0Func => "CALL0FUNC",
            Op::Call1Func => "CALL1FUNC",
            Op::Call2Func => "CALL2FUNC",
            Op::Call3Func => "CALL3FUNC",
            Op::Call4Func => "CALL4FUNC",
        }
    }

    /// Pack this opcode with an 8-bit direct argument into one code word.
    pub fn word(self, direct: u8) -> u16 {
        (self as u16) | ((direct as u16) << 8)
    }

    /// Number of operand words that follow this instruction's code word.
    pub fn operand_words(self) -> usize {
        match self {
            Op::LdConst32 | Op::UcallProc | Op::UcallFunc => 2,
            Op::LdConst16
            | Op::LdPtr
            | Op::LdStrRef
            | Op::Jmp
            | Op::Jmpz
            | Op::Jmpnz
            | Op::FlatUcallProc
            | Op::FlatUcallFunc
            | Op::Call0Proc
            | Op::Call1Proc
            | Op::Call2Proc
            | Op::Call3Proc
            | Op::Call4Proc
            | Op::Call0Func
            | Op::Call1Func
            | Op::Call2Func
            | Op::Call3Func
            | Op::Call4Func => 1,
            _ => 0,
        }
    }
}

/// Split a code word into its opcode byte and direct argument.
pub fn split_word(w: u16) -> (u8, u8) {
    ((w & 0xFF) as u8, (w >> 8) as u8)
}
