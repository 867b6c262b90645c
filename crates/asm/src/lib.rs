//! minibit image builder and disassembler.
//!
//! [`ImageBuilder`] assembles versioned binary images programmatically:
//! functions are emitted through [`FunctionBuilder`] with symbolic labels
//! for jump targets and interned string literals, and every cross-function
//! and cross-pool offset is resolved in [`ImageBuilder::finish`]. The
//! [`disassemble`] function renders an image back as readable text.
//!
//! ```
//! use minibit_asm::{FunctionBuilder, ImageBuilder};
//! use minibit_common::Op;
//!
//! let mut image = ImageBuilder::new(0);
//! let mut f = FunctionBuilder::new(0, 2);
//! f.ld_const(3);
//! f.ld_const(4);
//! f.op_d(Op::FlatCall2Func, 0); // native func2 table, slot 0
//! f.op(Op::Ret1);
//! image.function(f);
//! let image = image.finish().unwrap();
//! assert_eq!(image.version(), minibit_common::BINARY_V1);
//! ```

pub mod error;

mod disassembler;

pub use disassembler::disassemble;
pub use error::BuildError;

use minibit_common::{Image, Op, BINARY_V1, ENTRY_OFFSET, FUNCTION_V1};
use std::collections::HashMap;

/// Handle for an interned string literal. Doubles as the literal's
/// cache index in the built image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrId(usize);

/// Handle for a declared function. The first function is the entry
/// function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncId(usize);

/// Emits one function body: code words plus fixups to resolve later.
#[derive(Debug, Default)]
pub struct FunctionBuilder {
    num_locals: u16,
    stack_size: u16,
    code: Vec<u16>,
    labels: HashMap<String, usize>,
    // Fixups hold code-relative word indices.
    jumps: Vec<(usize, String)>, // opcode word; lo16 operand follows
    calls: Vec<(usize, FuncId)>, // 16-bit target operand word
    ptrs: Vec<(usize, FuncId)>,  // opcode word; 24-bit split
    strs: Vec<(usize, StrId)>,   // literal-offset operand word
}

impl FunctionBuilder {
    pub fn new(num_locals: u16, stack_size: u16) -> Self {
        Self {
            num_locals,
            stack_size,
            ..Self::default()
        }
    }

    /// Emit a one-word instruction with a zero direct argument.
    pub fn op(&mut self, op: Op) {
        self.code.push(op.word(0));
    }

    /// Emit a one-word instruction with the given direct argument.
    pub fn op_d(&mut self, op: Op, direct: u8) {
        self.code.push(op.word(direct));
    }

    /// Emit an instruction followed by a raw reference-mask word, for the
    /// checked native-call opcodes.
    pub fn op_masked(&mut self, op: Op, direct: u8, refmask: u8) {
        self.code.push(op.word(direct));
        self.code.push(refmask as u16);
    }

    /// Emit a raw operand word.
    pub fn raw(&mut self, w: u16) {
        self.code.push(w);
    }

    /// Push a constant with the narrowest encoding that holds it.
    pub fn ld_const(&mut self, v: i32) {
        if v == 0 {
            self.op(Op::LdZero);
        } else if (0..=0xFF).contains(&v) {
            self.op_d(Op::LdConst8, v as u8);
        } else if (0..=0xFFFF).contains(&v) {
            self.op(Op::LdConst16);
            self.raw(v as u16);
        } else {
            self.op(Op::LdConst32);
            self.raw((v as u32 & 0xFFFF) as u16);
            self.raw((v as u32 >> 16) as u16);
        }
    }

    /// Bind `name` to the current position.
    pub fn label(&mut self, name: &str) -> Result<(), BuildError> {
        if self.labels.insert(name.to_string(), self.code.len()).is_some() {
            return Err(BuildError::DuplicateLabel {
                label: name.to_string(),
            });
        }
        Ok(())
    }

    fn jump(&mut self, op: Op, name: &str) {
        self.jumps.push((self.code.len(), name.to_string()));
        self.code.push(op.word(0));
        self.code.push(0);
    }

    pub fn jmp(&mut self, name: &str) {
        self.jump(Op::Jmp, name);
    }

    pub fn jmpz(&mut self, name: &str) {
        self.jump(Op::Jmpz, name);
    }

    pub fn jmpnz(&mut self, name: &str) {
        self.jump(Op::Jmpnz, name);
    }

    /// Push an interned string literal.
    pub fn ld_str(&mut self, s: StrId) {
        self.code.push(Op::LdStrRef.word(s.0 as u8));
        self.strs.push((self.code.len(), s));
        self.code.push(0);
    }

    /// Push a tagged code pointer to a function.
    pub fn ld_ptr(&mut self, f: FuncId) {
        self.ptrs.push((self.code.len(), f));
        self.code.push(Op::LdPtr.word(0));
        self.code.push(0);
    }

    fn ucall(&mut self, op: Op, f: FuncId, argc: u8, refmask: Option<u8>) {
        self.code.push(op.word(argc));
        self.calls.push((self.code.len(), f));
        self.code.push(0);
        if let Some(mask) = refmask {
            self.code.push(mask as u16);
        }
    }

    /// Call a user procedure, no post-call cleanup.
    pub fn ucall_proc(&mut self, f: FuncId, argc: u8) {
        self.ucall(Op::FlatUcallProc, f, argc, None);
    }

    /// Call a user function, no post-call cleanup.
    pub fn ucall_func(&mut self, f: FuncId, argc: u8) {
        self.ucall(Op::FlatUcallFunc, f, argc, None);
    }

    /// Call a user procedure, releasing the arguments the mask flags.
    pub fn ucall_proc_checked(&mut self, f: FuncId, argc: u8, refmask: u8) {
        self.ucall(Op::UcallProc, f, argc, Some(refmask));
    }

    /// Call a user function, releasing the arguments the mask flags.
    pub fn ucall_func_checked(&mut self, f: FuncId, argc: u8, refmask: u8) {
        self.ucall(Op::UcallFunc, f, argc, Some(refmask));
    }

    /// Words this body will occupy, header included.
    fn len(&self) -> usize {
        3 + self.code.len()
    }
}

/// Assembles a whole image: header, function bodies, literal pool.
#[derive(Debug, Default)]
pub struct ImageBuilder {
    num_globals: u16,
    strings: Vec<Vec<u8>>,
    funcs: Vec<Option<FunctionBuilder>>,
}

impl ImageBuilder {
    pub fn new(num_globals: u16) -> Self {
        Self {
            num_globals,
            ..Self::default()
        }
    }

    /// Intern a string literal, deduplicating byte-identical entries.
    pub fn intern(&mut self, bytes: &[u8]) -> Result<StrId, BuildError> {
        if let Some(i) = self.strings.iter().position(|s| s == bytes) {
            return Ok(StrId(i));
        }
        if self.strings.len() >= 256 {
            return Err(BuildError::TooManyStrings {
                count: self.strings.len() + 1,
            });
        }
        self.strings.push(bytes.to_vec());
        Ok(StrId(self.strings.len() - 1))
    }

    /// Reserve a function id without a body, for forward references.
    pub fn declare(&mut self) -> FuncId {
        self.funcs.push(None);
        FuncId(self.funcs.len() - 1)
    }

    /// Supply the body of a declared function.
    pub fn define(&mut self, id: FuncId, f: FunctionBuilder) {
        self.funcs[id.0] = Some(f);
    }

    /// Declare and define in one step.
    pub fn function(&mut self, f: FunctionBuilder) -> FuncId {
        let id = self.declare();
        self.define(id, f);
        id
    }

    /// Resolve every fixup and produce the image.
    pub fn finish(self) -> Result<Image, BuildError> {
        // Function offsets, in declaration order.
        let mut offsets = Vec::with_capacity(self.funcs.len());
        let mut bodies = Vec::with_capacity(self.funcs.len());
        let mut off = ENTRY_OFFSET;
        for (id, f) in self.funcs.iter().enumerate() {
            let f = f.as_ref().ok_or(BuildError::UndefinedFunction { id })?;
            offsets.push(off);
            off += f.len();
            bodies.push(f);
        }

        // Literal pool offsets. Each literal packs bytes plus a NUL
        // terminator two per word.
        let mut lit_offsets = Vec::with_capacity(self.strings.len());
        for s in &self.strings {
            lit_offsets.push(off);
            off += s.len() / 2 + 1;
        }

        let mut words = vec![
            BINARY_V1,
            self.num_globals,
            self.strings.len() as u16,
            0,
            0,
            0,
        ];

        for (&f, &func_off) in bodies.iter().zip(&offsets) {
            let mut code = f.code.clone();
            let code_base = func_off + 3;

            for (at, label) in &f.jumps {
                let pos = f
                    .labels
                    .get(label)
                    .ok_or_else(|| BuildError::UnboundLabel {
                        label: label.clone(),
                    })?;
                let target = code_base + pos;
                if target > 0xFF_FFFF {
                    return Err(BuildError::JumpTooFar {
                        label: label.clone(),
                        target,
                    });
                }
                code[*at] |= ((target >> 16) as u16) << 8;
                code[at + 1] = target as u16;
            }
            for (at, fid) in &f.calls {
                let target = offsets[fid.0];
                if target > 0xFFFF {
                    return Err(BuildError::CallTooFar { offset: target });
                }
                code[*at] = target as u16;
            }
            for (at, fid) in &f.ptrs {
                let target = offsets[fid.0];
                if target > 0xFF_FFFF {
                    return Err(BuildError::JumpTooFar {
                        label: format!("fn#{}", fid.0),
                        target,
                    });
                }
                code[*at] |= ((target >> 16) as u16) << 8;
                code[at + 1] = target as u16;
            }
            for (at, sid) in &f.strs {
                let target = lit_offsets[sid.0];
                if target > 0xFFFF {
                    return Err(BuildError::CallTooFar { offset: target });
                }
                code[*at] = target as u16;
            }

            words.push(FUNCTION_V1);
            words.push(f.num_locals);
            words.push(f.stack_size);
            words.extend_from_slice(&code);
        }

        for s in &self.strings {
            let mut bytes = s.clone();
            bytes.push(0);
            if bytes.len() % 2 != 0 {
                bytes.push(0);
            }
            for pair in bytes.chunks_exact(2) {
                words.push(u16::from_le_bytes([pair[0], pair[1]]));
            }
        }

        Ok(Image::new(words)?)
    }
}
