//! The bytecode interpreter: one call frame per user function, executed
//! recursively on the host stack.

use crate::error::{subcode, VmError};
use crate::machine::Vm;
use minibit_common::opcode::split_word;
use minibit_common::word::{self, Word};
use minibit_common::{Op, FUNCTION_V1};

/// Per-call state: locals, operand stack and the declared stack limit.
struct Frame {
    locals: Vec<Word>,
    stack: Vec<Word>,
    limit: usize,
}

impl Frame {
    fn new(num_locals: usize, stack_size: usize) -> Self {
        Self {
            locals: vec![0; num_locals],
            stack: Vec::with_capacity(stack_size),
            limit: stack_size,
        }
    }

    fn push(&mut self, w: Word) -> Result<(), VmError> {
        if self.stack.len() >= self.limit {
            return Err(VmError::StackOverflow { limit: self.limit });
        }
        self.stack.push(w);
        Ok(())
    }

    fn pop(&mut self) -> Result<Word, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn top(&self) -> Result<Word, VmError> {
        self.stack.last().copied().ok_or(VmError::StackUnderflow)
    }

    fn local(&self, idx: u8) -> Result<Word, VmError> {
        self.locals
            .get(idx as usize)
            .copied()
            .ok_or(VmError::OutOfBounds {
                subcode: subcode::LOCAL,
                index: idx as i64,
            })
    }

    fn set_local(&mut self, idx: u8, v: Word) -> Result<Word, VmError> {
        match self.locals.get_mut(idx as usize) {
            Some(slot) => {
                let old = *slot;
                *slot = v;
                Ok(old)
            }
            None => Err(VmError::OutOfBounds {
                subcode: subcode::LOCAL,
                index: idx as i64,
            }),
        }
    }
}

fn arg(args: &[Word], idx: u8) -> Result<Word, VmError> {
    args.get(idx as usize).copied().ok_or(VmError::OutOfBounds {
        subcode: subcode::ARGUMENT,
        index: idx as i64,
    })
}

/// Pop `n` call arguments, restoring left-to-right order.
fn pop_args(frame: &mut Frame, n: usize) -> Result<[Word; 4], VmError> {
    let mut a = [0; 4];
    for i in (0..n).rev() {
        a[i] = frame.pop()?;
    }
    Ok(a)
}

impl Vm {
    /// Execute the function whose body starts at word `offset`, with the
    /// given arguments. Returns the value a RET1 produced, or `None` for
    /// RET0.
    pub(crate) fn exec_function(
        &mut self,
        offset: usize,
        args: &[Word],
    ) -> Result<Option<Word>, VmError> {
        let marker = self.image().word(offset)?;
        if marker != FUNCTION_V1 {
            return Err(VmError::BadFunctionHeader {
                offset,
                found: marker,
            });
        }
        let num_locals = self.image().word(offset + 1)? as usize;
        let stack_size = self.image().word(offset + 2)? as usize;
        let mut frame = Frame::new(num_locals, stack_size);
        let mut pc = offset + 3;

        loop {
            let at = pc;
            let w = self.image().word(pc)?;
            pc += 1;
            let (byte, direct) = split_word(w);
            let op = Op::try_from(byte).map_err(|_| VmError::BadOpcode { byte, offset: at })?;
            log::trace!("{at:5}  {}", op.mnemonic());

            match op {
                Op::Noop => {}
                Op::Ret0 => {
                    if !frame.stack.is_empty() {
                        return Err(VmError::StackOnReturn {
                            depth: frame.stack.len(),
                            expected: 0,
                        });
                    }
                    return Ok(None);
                }
                Op::Ret1 => {
                    if frame.stack.len() != 1 {
                        return Err(VmError::StackOnReturn {
                            depth: frame.stack.len(),
                            expected: 1,
                        });
                    }
                    return Ok(Some(frame.pop()?));
                }

                Op::LdZero => frame.push(0)?,
                Op::LdConst8 => frame.push(direct as Word)?,
                Op::LdConst16 => {
                    let v = self.image().word(pc)?;
                    pc += 1;
                    frame.push(v as Word)?;
                }
                Op::LdConst32 => {
                    let lo = self.image().word(pc)?;
                    let hi = self.image().word(pc + 1)?;
                    pc += 2;
                    frame.push((lo as Word) | ((hi as Word) << 16))?;
                }
                Op::LdPtr => {
                    let lo = self.image().word(pc)?;
                    pc += 1;
                    let target = ((direct as u32) << 16) | lo as u32;
                    frame.push(word::code_ptr(target))?;
                }
                Op::LdStrRef => {
                    let lit = self.image().word(pc)?;
                    pc += 1;
                    let w = self.ld_str(direct, lit as usize)?;
                    frame.push(w)?;
                }

                Op::LdArg => frame.push(arg(args, direct)?)?,
                Op::LdArgRef => {
                    let v = arg(args, direct)?;
                    self.heap.incr(v)?;
                    frame.push(v)?;
                }
                Op::LdLoc => {
                    let v = frame.local(direct)?;
                    frame.push(v)?;
                }
                Op::LdLocRef => {
                    let v = frame.local(direct)?;
                    self.heap.incr(v)?;
                    frame.push(v)?;
                }
                Op::StLoc => {
                    let v = frame.pop()?;
                    frame.set_local(direct, v)?;
                }
                Op::StLocRef => {
                    let v = frame.pop()?;
                    let old = frame.set_local(direct, v)?;
                    self.heap.decr(old)?;
                }
                Op::ClrLocRef => {
                    let old = frame.set_local(direct, 0)?;
                    self.heap.decr(old)?;
                }

                Op::LdGlb => frame.push(self.glb_ld(direct)?)?,
                Op::LdGlbRef => {
                    let v = self.glb_ldref(direct)?;
                    frame.push(v)?;
                }
                Op::StGlb => {
                    let v = frame.pop()?;
                    self.glb_st(direct, v)?;
                }
                Op::StGlbRef => {
                    let v = frame.pop()?;
                    self.glb_stref(direct, v)?;
                }

                Op::Pop => {
                    frame.pop()?;
                }
                Op::PopRef => {
                    let v = frame.pop()?;
                    self.heap.decr(v)?;
                }
                Op::Not => {
                    let v = frame.pop()?;
                    frame.push(if v == 0 { 1 } else { 0 })?;
                }
                Op::IsNull => {
                    let v = frame.pop()?;
                    self.heap.decr(v)?;
                    frame.push(if v == 0 { 1 } else { 0 })?;
                }
                Op::Neg => {
                    let v = frame.pop()?;
                    frame.push((v as i32).wrapping_neg() as Word)?;
                }

                Op::LdFld => {
                    let r = frame.pop()?;
                    frame.push(self.heap.record_ld(r, direct)?)?;
                }
                Op::LdFldRef => {
                    let r = frame.pop()?;
                    let v = self.heap.record_ldref(r, direct)?;
                    frame.push(v)?;
                }
                Op::StFld => {
                    let v = frame.pop()?;
                    let r = frame.pop()?;
                    self.heap.record_st(r, direct, v)?;
                }
                Op::StFldRef => {
                    let v = frame.pop()?;
                    let r = frame.pop()?;
                    self.heap.record_stref(r, direct, v)?;
                }
                Op::StClo => {
                    // The action stays on the stack for further captures.
                    let v = frame.pop()?;
                    let action = frame.top()?;
                    self.heap.action_st(action, direct, v)?;
                }

                Op::Jmp => {
                    let lo = self.image().word(pc)?;
                    pc = ((direct as usize) << 16) | lo as usize;
                }
                Op::Jmpz => {
                    let lo = self.image().word(pc)?;
                    pc += 1;
                    if frame.pop()? == 0 {
                        pc = ((direct as usize) << 16) | lo as usize;
                    }
                }
                Op::Jmpnz => {
                    let lo = self.image().word(pc)?;
                    pc += 1;
                    if frame.pop()? != 0 {
                        pc = ((direct as usize) << 16) | lo as usize;
                    }
                }

                Op::FlatUcallProc | Op::FlatUcallFunc | Op::UcallProc | Op::UcallFunc => {
                    let target = self.image().word(pc)? as usize;
                    pc += 1;
                    let checked = matches!(op, Op::UcallProc | Op::UcallFunc);
                    let mask = if checked {
                        let m = self.image().word(pc)?;
                        pc += 1;
                        m
                    } else {
                        0
                    };
                    let argc = direct as usize;
                    let mut call_args = vec![0; argc];
                    for i in (0..argc).rev() {
                        call_args[i] = frame.pop()?;
                    }
                    let result = self.exec_function(target, &call_args)?;
                    if checked {
                        self.release_masked(mask, &call_args)?;
                    }
                    if matches!(op, Op::FlatUcallFunc | Op::UcallFunc) {
                        match result {
                            Some(v) => frame.push(v)?,
                            None => {
                                return Err(VmError::StackOnReturn {
                                    depth: 0,
                                    expected: 1,
                                })
                            }
                        }
                    }
                }

                Op::FlatCall0Proc => {
                    let f = self.tables.proc0(direct)?;
                    f(self)?;
                }
                Op::FlatCall1Proc => {
                    let a = pop_args(&mut frame, 1)?;
                    let f = self.tables.proc1(direct)?;
                    f(self, a[0])?;
                }
                Op::FlatCall2Proc => {
                    let a = pop_args(&mut frame, 2)?;
                    let f = self.tables.proc2(direct)?;
                    f(self, a[0], a[1])?;
                }
                Op::FlatCall3Proc => {
                    let a = pop_args(&mut frame, 3)?;
                    let f = self.tables.proc3(direct)?;
                    f(self, a[0], a[1], a[2])?;
                }
                Op::FlatCall4Proc => {
                    let a = pop_args(&mut frame, 4)?;
                    let f = self.tables.proc4(direct)?;
                    f(self, a[0], a[1], a[2], a[3])?;
                }
                Op::FlatCall0Func => {
                    let f = self.tables.func0(direct)?;
                    let r = f(self)?;
                    frame.push(r)?;
                }
                Op::FlatCall1Func => {
                    let a = pop_args(&mut frame, 1)?;
                    let f = self.tables.func1(direct)?;
                    let r = f(self, a[0])?;
                    frame.push(r)?;
                }
                Op::FlatCall2Func => {
                    let a = pop_args(&mut frame, 2)?;
                    let f = self.tables.func2(direct)?;
                    let r = f(self, a[0], a[1])?;
                    frame.push(r)?;
                }
                Op::FlatCall3Func => {
                    let a = pop_args(&mut frame, 3)?;
                    let f = self.tables.func3(direct)?;
                    let r = f(self, a[0], a[1], a[2])?;
                    frame.push(r)?;
                }
                Op::FlatCall4Func => {
                    let a = pop_args(&mut frame, 4)?;
                    let f = self.tables.func4(direct)?;
                    let r = f(self, a[0], a[1], a[2], a[3])?;
                    frame.push(r)?;
                }

                Op::Call0Proc => {
                    let mask = self.image().word(pc)?;
                    pc += 1;
                    let f = self.tables.proc0(direct)?;
                    f(self)?;
                    self.release_masked(mask, &[])?;
                }
                Op::Call1Proc => {
                    let mask = self.image().word(pc)?;
                    pc += 1;
                    let a = pop_args(&mut frame, 1)?;
                    let f = self.tables.proc1(direct)?;
                    f(self, a[0])?;
                    self.release_masked(mask, &a[..1])?;
                }
                Op::Call2Proc => {
                    let mask = self.image().word(pc)?;
                    pc += 1;
                    let a = pop_args(&mut frame, 2)?;
                    let f = self.tables.proc2(direct)?;
                    f(self, a[0], a[1])?;
                    self.release_masked(mask, &a[..2])?;
                }
                Op::Call3Proc => {
                    let mask = self.image().word(pc)?;
                    pc += 1;
                    let a = pop_args(&mut frame, 3)?;
                    let f = self.tables.proc3(direct)?;
                    f(self, a[0], a[1], a[2])?;
                    self.release_masked(mask, &a[..3])?;
                }
                Op::Call4Proc => {
                    let mask = self.image().word(pc)?;
                    pc += 1;
                    let a = pop_args(&mut frame, 4)?;
                    let f = self.tables.proc4(direct)?;
                    f(self, a[0], a[1], a[2], a[3])?;
                    self.release_masked(mask, &a[..4])?;
                }
                Op::Call0Func => {
                    let mask = self.image().word(pc)?;
                    pc += 1;
                    let f = self.tables.func0(direct)?;
                    let r = f(self)?;
                    self.release_masked(mask, &[])?;
                    frame.push(r)?;
                }
                Op::Call1Func => {
                    let mask = self.image().word(pc)?;
                    pc += 1;
                    let a = pop_args(&mut frame, 1)?;
                    let f = self.tables.func1(direct)?;
                    let r = f(self, a[0])?;
                    self.release_masked(mask, &a[..1])?;
                    frame.push(r)?;
                }
                Op::Call2Func => {
                    let mask = self.image().word(pc)?;
                    pc += 1;
                    let a = pop_args(&mut frame, 2)?;
                    let f = self.tables.func2(direct)?;
                    let r = f(self, a[0], a[1])?;
                    self.release_masked(mask, &a[..2])?;
                    frame.push(r)?;
                }
                Op::Call3Func => {
                    let mask = self.image().word(pc)?;
                    pc += 1;
                    let a = pop_args(&mut frame, 3)?;
                    let f = self.tables.func3(direct)?;
                    let r = f(self, a[0], a[1], a[2])?;
                    self.release_masked(mask, &a[..3])?;
                    frame.push(r)?;
                }
                Op::Call4Func => {
                    let mask = self.image().word(pc)?;
                    pc += 1;
                    let a = pop_args(&mut frame, 4)?;
                    let f = self.tables.func4(direct)?;
                    let r = f(self, a[0], a[1], a[2], a[3])?;
                    self.release_masked(mask, &a[..4])?;
                    frame.push(r)?;
                }
            }
        }
    }

    /// Post-call cleanup: release the reference-typed arguments a checked
    /// call consumed. The low 8 bits of `mask` flag which argument slots
    /// hold references; a flagged slot the call never passed is fatal.
    fn release_masked(&mut self, mask: u16, args: &[Word]) -> Result<(), VmError> {
        let mask = mask & 0xFF;
        for bit in 0..8 {
            if mask & (1 << bit) == 0 {
                continue;
            }
            match args.get(bit as usize) {
                Some(&w) => self.heap.decr(w)?,
                None => {
                    return Err(VmError::OutOfBounds {
                        subcode: subcode::REFMASK,
                        index: bit as i64,
                    })
                }
            }
        }
        Ok(())
    }
}
