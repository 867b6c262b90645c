//! Arity-segmented native dispatch tables.
//!
//! Bytecode reaches host functionality through ten flat tables, one per
//! (kind, arity) pair: procedures take 0 to 4 words and return nothing,
//! functions take 0 to 4 words and return one. The instruction's direct
//! argument indexes the table; an index past the registered entries is a
//! checked runtime error, never undefined dispatch.

use crate::error::VmError;
use crate::machine::Vm;
use minibit_common::Word;

pub type Proc0 = fn(&mut Vm) -> Result<(), VmError>;
pub type Proc1 = fn(&mut Vm, Word) -> Result<(), VmError>;
pub type Proc2 = fn(&mut Vm, Word, Word) -> Result<(), VmError>;
pub type Proc3 = fn(&mut Vm, Word, Word, Word) -> Result<(), VmError>;
pub type Proc4 = fn(&mut Vm, Word, Word, Word, Word) -> Result<(), VmError>;

pub type Func0 = fn(&mut Vm) -> Result<Word, VmError>;
pub type Func1 = fn(&mut Vm, Word) -> Result<Word, VmError>;
pub type Func2 = fn(&mut Vm, Word, Word) -> Result<Word, VmError>;
pub type Func3 = fn(&mut Vm, Word, Word, Word) -> Result<Word, VmError>;
pub type Func4 = fn(&mut Vm, Word, Word, Word, Word) -> Result<Word, VmError>;

/// The ten dispatch tables. Indices are assigned in registration order
/// and are part of an image's contract with its host.
#[derive(Debug, Default)]
pub struct NativeTables {
    proc0: Vec<Proc0>,
    proc1: Vec<Proc1>,
    proc2: Vec<Proc2>,
    proc3: Vec<Proc3>,
    proc4: Vec<Proc4>,
    func0: Vec<Func0>,
    func1: Vec<Func1>,
    func2: Vec<Func2>,
    func3: Vec<Func3>,
    func4: Vec<Func4>,
}

fn push<T>(table: &mut Vec<T>, f: T) -> u8 {
    let idx = table.len() as u8;
    table.push(f);
    idx
}

fn lookup<T: Copy>(table: &[T], name: &'static str, index: u8) -> Result<T, VmError> {
    table
        .get(index as usize)
        .copied()
        .ok_or(VmError::NativeIndex {
            table: name,
            index,
            len: table.len(),
        })
}

impl NativeTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_proc0(&mut self, f: Proc0) -> u8 {
        push(&mut self.proc0, f)
    }
    pub fn push_proc1(&mut self, f: Proc1) -> u8 {
        push(&mut self.proc1, f)
    }
    pub fn push_proc2(&mut self, f: Proc2) -> u8 {
        push(&mut self.proc2, f)
    }
    pub fn push_proc3(&mut self, f: Proc3) -> u8 {
        push(&mut self.proc3, f)
    }
    pub fn push_proc4(&mut self, f: Proc4) -> u8 {
        push(&mut self.proc4, f)
    }

    pub fn push_func0(&mut self, f: Func0) -> u8 {
        push(&mut self.func0, f)
    }
    pub fn push_func1(&mut self, f: Func1) -> u8 {
        push(&mut self.func1, f)
    }
    pub fn push_func2(&mut self, f: Func2) -> u8 {
        push(&mut self.func2, f)
    }
    pub fn push_func3(&mut self, f: Func3) -> u8 {
        push(&mut self.func3, f)
    }
    pub fn push_func4(&mut self, f: Func4) -> u8 {
        push(&mut self.func4, f)
    }

    pub fn proc0(&self, index: u8) -> Result<Proc0, VmError> {
        lookup(&self.proc0, "proc0", index)
    }
    pub fn proc1(&self, index: u8) -> Result<Proc1, VmError> {
        lookup(&self.proc1, "proc1", index)
    }
    pub fn proc2(&self, index: u8) -> Result<Proc2, VmError> {
        lookup(&self.proc2, "proc2", index)
    }
    pub fn proc3(&self, index: u8) -> Result<Proc3, VmError> {
        lookup(&self.proc3, "proc3", index)
    }
    pub fn proc4(&self, index: u8) -> Result<Proc4, VmError> {
        lookup(&self.proc4, "proc4", index)
    }

    pub fn func0(&self, index: u8) -> Result<Func0, VmError> {
        lookup(&self.func0, "func0", index)
    }
    pub fn func1(&self, index: u8) -> Result<Func1, VmError> {
        lookup(&self.func1, "func1", index)
    }
    pub fn func2(&self, index: u8) -> Result<Func2, VmError> {
        lookup(&self.func2, "func2", index)
    }
    pub fn func3(&self, index: u8) -> Result<Func3, VmError> {
        lookup(&self.func3, "func3", index)
    }
    pub fn func4(&self, index: u8) -> Result<Func4, VmError> {
        lookup(&self.func4, "func4", index)
    }
}
