//! The VM execution context: image, globals, string cache, heap, native
//! tables and scheduler.

use crate::error::{subcode, VmError};
use crate::heap::Heap;
use crate::natives::NativeTables;
use crate::scheduler::Scheduler;
use minibit_common::word::{self, Word, WordRef};
use minibit_common::{Image, BINARY_V1, ENTRY_OFFSET};

/// A loaded program together with all of its mutable runtime state.
#[derive(Debug)]
pub struct Vm {
    image: Image,
    globals: Vec<Word>,
    strings: Vec<Word>,
    pub heap: Heap,
    pub(crate) tables: NativeTables,
    pub scheduler: Scheduler,
    /// Lines emitted by the `post` natives, in order. The host decides
    /// what to do with them (the CLI prints them).
    pub posted: Vec<String>,
}

impl Vm {
    /// Load an image, checking its version tag before any runtime state
    /// is allocated. A rejected image costs nothing.
    pub fn load(image: Image, tables: NativeTables) -> Result<Self, VmError> {
        let version = image.version();
        if version != BINARY_V1 {
            return Err(VmError::BadVersion {
                found: version,
                expected: BINARY_V1,
            });
        }
        let globals = vec![0; image.num_globals() as usize];
        let strings = vec![0; image.num_strings() as usize];
        log::debug!(
            "loaded image: {} words, {} globals, {} string slots",
            image.len(),
            globals.len(),
            strings.len()
        );
        Ok(Self {
            image,
            globals,
            strings,
            heap: Heap::new(),
            tables,
            scheduler: Scheduler::new(),
            posted: Vec::new(),
        })
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Execute the entry function, then drain the background queue.
    pub fn run(&mut self) -> Result<Option<Word>, VmError> {
        let result = self.exec_function(ENTRY_OFFSET, &[])?;
        self.pump()?;
        Ok(result)
    }

    /// Invoke an action word with `extra` trailing arguments.
    ///
    /// A heap action supplies its captured fields as the leading
    /// arguments and is kept alive across the call; a bare code pointer
    /// calls the function directly; the null word is a no-op.
    pub fn run_action(&mut self, action: Word, extra: &[Word]) -> Result<Option<Word>, VmError> {
        match word::classify(action) {
            WordRef::Null => Ok(None),
            WordRef::Code(entry) => self.exec_function(entry as usize, extra),
            WordRef::Object(_) => {
                self.heap.incr(action)?;
                let entry = self.heap.action_entry(action)?;
                let mut args = self.heap.action_fields(action)?;
                args.extend_from_slice(extra);
                let result = self.exec_function(entry as usize, &args);
                self.heap.decr(action)?;
                result
            }
        }
    }

    /// Run queued background actions to completion, FIFO order. Each
    /// dequeued action gives up the reference the queue held.
    pub fn pump(&mut self) -> Result<(), VmError> {
        while let Some(action) = self.scheduler.dequeue() {
            self.run_action(action, &[])?;
            self.heap.decr(action)?;
        }
        Ok(())
    }

    /// Queue an action for background execution; the queue takes a
    /// reference of its own.
    pub fn run_in_background(&mut self, action: Word) -> Result<(), VmError> {
        self.heap.incr(action)?;
        self.scheduler.enqueue(action);
        Ok(())
    }

    /// Bind `action` as the handler for `event`, replacing (and
    /// releasing) any previous binding.
    pub fn on_event(&mut self, event: i32, action: Word) -> Result<(), VmError> {
        self.heap.incr(action)?;
        if let Some(old) = self.scheduler.set_handler(event, action) {
            self.heap.decr(old)?;
        }
        Ok(())
    }

    /// Dispatch `event` to its bound handler, if any, passing `value`.
    /// The handler is protected against rebinding during its own run.
    pub fn raise_event(&mut self, event: i32, value: Word) -> Result<(), VmError> {
        if let Some(handler) = self.scheduler.handler(event) {
            self.heap.incr(handler)?;
            let result = self.run_action(handler, &[value]);
            self.heap.decr(handler)?;
            result?;
        }
        Ok(())
    }

    // ---- Globals ----

    pub fn glb_ld(&self, idx: u8) -> Result<Word, VmError> {
        self.globals
            .get(idx as usize)
            .copied()
            .ok_or(VmError::OutOfBounds {
                subcode: subcode::GLOBAL,
                index: idx as i64,
            })
    }

    /// Load a reference global, taking a reference for the stack.
    pub fn glb_ldref(&mut self, idx: u8) -> Result<Word, VmError> {
        let v = self.glb_ld(idx)?;
        self.heap.incr(v)?;
        Ok(v)
    }

    pub fn glb_st(&mut self, idx: u8, v: Word) -> Result<(), VmError> {
        match self.globals.get_mut(idx as usize) {
            Some(slot) => {
                *slot = v;
                Ok(())
            }
            None => Err(VmError::OutOfBounds {
                subcode: subcode::GLOBAL,
                index: idx as i64,
            }),
        }
    }

    /// Store into a reference global, releasing the previous value.
    pub fn glb_stref(&mut self, idx: u8, v: Word) -> Result<(), VmError> {
        let old = self.glb_ld(idx)?;
        self.glb_st(idx, v)?;
        self.heap.decr(old)
    }

    // ---- String literals ----

    /// Materialize the string literal in cache slot `idx`, whose bytes
    /// live at word `offset` in the image. The first use allocates and
    /// pins the string; later uses return the same pinned handle.
    pub fn ld_str(&mut self, idx: u8, offset: usize) -> Result<Word, VmError> {
        let cached = self
            .strings
            .get(idx as usize)
            .copied()
            .ok_or(VmError::OutOfBounds {
                subcode: subcode::STRING_TABLE,
                index: idx as i64,
            })?;
        if cached != 0 {
            return Ok(cached);
        }
        let bytes = self.image.literal(offset)?;
        let w = self.heap.mk_str(&bytes);
        self.heap.pin(w)?;
        self.strings[idx as usize] = w;
        Ok(w)
    }

    /// Record a line of program output.
    pub fn post(&mut self, line: String) {
        log::info!("post: {line}");
        self.posted.push(line);
    }
}
