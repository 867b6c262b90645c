//! The minibit virtual machine.
//!
//! Executes versioned binary images of tagged-word bytecode: a slab heap
//! of manually reference-counted objects, arity-segmented native dispatch
//! tables, and a cooperative scheduler for background actions and event
//! handlers. Every invariant violation is a fatal [`VmError`]; nothing is
//! caught and resumed.
//!
//! The quickest way in is [`run`]:
//!
//! ```
//! use minibit_common::{Image, Op, BINARY_V1, FUNCTION_V1};
//! use minibit_vm::builtins::idx;
//!
//! let words = vec![
//!     BINARY_V1, 0, 0, 0, 0, 0,
//!     FUNCTION_V1, 0, 2,
//!     Op::LdConst8.word(3),
//!     Op::LdConst8.word(4),
//!     Op::FlatCall2Func.word(idx::func2::ADD),
//!     Op::Ret1.word(0),
//! ];
//! let outcome = minibit_vm::run(Image::new(words).unwrap()).unwrap();
//! assert_eq!(outcome.result, Some(7));
//! ```

pub mod builtins;
pub mod error;
mod execute;
pub mod heap;
pub mod machine;
pub mod natives;
pub mod scheduler;

pub use builtins::standard_tables;
pub use error::{subcode, VmError};
pub use heap::{Heap, ObjBody};
pub use machine::Vm;
pub use natives::NativeTables;
pub use scheduler::Scheduler;

use minibit_common::{Image, Word};

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Value the entry function returned, if it used RET1.
    pub result: Option<Word>,
    /// Lines emitted by the post natives, in order.
    pub posted: Vec<String>,
    /// Heap objects still live after the run. Zero for a program whose
    /// reference bookkeeping balances.
    pub leaked: usize,
}

/// Load `image` with the standard native tables and run it to completion,
/// including any background actions it queued.
pub fn run(image: Image) -> Result<RunOutcome, VmError> {
    let mut vm = Vm::load(image, standard_tables())?;
    let result = vm.run()?;
    Ok(RunOutcome {
        result,
        posted: std::mem::take(&mut vm.posted),
        leaked: vm.heap.live(),
    })
}
