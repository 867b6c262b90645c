//! Reference-counted heap objects and the allocator primitives.
//!
//! The heap is a slab of boxes indexed by slot. A handle word encodes the
//! slot (see `minibit_common::word`); bare code pointers and the null word
//! never touch the heap and are inert under [`Heap::incr`]/[`Heap::decr`].
//!
//! The reference-count discipline is manual and synchronous: every box
//! starts at count 1 (the creator holds the first owning reference), and
//! the count reaching zero destroys the object immediately, releasing any
//! owned children. Decrementing a dead handle is fatal. Pinned boxes
//! (string literals from the image) are excluded from bookkeeping and are
//! never destroyed.

use crate::error::{subcode, VmError};
use minibit_common::word::{self, Word, WordRef};

/// The heap object families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjBody {
    /// Immutable byte string.
    Str(Vec<u8>),
    /// Fixed-layout tuple: the leading `reflen` fields are owned
    /// references, the rest are unboxed scalars.
    Record { reflen: u8, fields: Vec<Word> },
    /// Closure: a code entry offset plus captured fields. Each of the
    /// leading `reflen` fields is an owned reference, capturable once.
    Action {
        reflen: u8,
        entry: u32,
        fields: Vec<Word>,
    },
    /// Dynamically sized sequence. When `owns` is set the elements are
    /// owned references.
    Collection { owns: bool, items: Vec<Word> },
}

#[derive(Debug)]
struct Boxed {
    refcnt: u32,
    pinned: bool,
    body: ObjBody,
}

/// Slab of reference-counted objects with a free list.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<Boxed>>,
    free: Vec<u32>,
    live: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live, non-pinned objects. The leak-tracking harness:
    /// after a closed sequence of operations that nets to zero
    /// outstanding references this must return to its starting value.
    pub fn live(&self) -> usize {
        self.live
    }

    fn alloc(&mut self, body: ObjBody) -> Word {
        self.live += 1;
        let boxed = Boxed {
            refcnt: 1,
            pinned: false,
            body,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(boxed);
                slot
            }
            None => {
                self.slots.push(Some(boxed));
                (self.slots.len() - 1) as u32
            }
        };
        word::from_slot(slot)
    }

    fn boxed(&self, slot: u32) -> Result<&Boxed, VmError> {
        self.slots
            .get(slot as usize)
            .and_then(|s| s.as_ref())
            .ok_or(VmError::RefDeleted { slot })
    }

    fn boxed_mut(&mut self, slot: u32) -> Result<&mut Boxed, VmError> {
        self.slots
            .get_mut(slot as usize)
            .and_then(|s| s.as_mut())
            .ok_or(VmError::RefDeleted { slot })
    }

    fn expect_object(w: Word) -> Result<u32, VmError> {
        match word::classify(w) {
            WordRef::Object(slot) => Ok(slot),
            _ => Err(VmError::OutOfBounds {
                subcode: subcode::KIND,
                index: w as i64,
            }),
        }
    }

    /// Mark an object as pinned: excluded from liveness tracking and
    /// inert under incr/decr. Used for cached string literals.
    pub fn pin(&mut self, w: Word) -> Result<(), VmError> {
        let slot = Self::expect_object(w)?;
        let b = self.boxed_mut(slot)?;
        if !b.pinned {
            b.pinned = true;
            self.live -= 1;
        }
        Ok(())
    }

    /// Increment the reference count of the object `w` designates.
    /// No-op for the null word and for bare code pointers.
    pub fn incr(&mut self, w: Word) -> Result<(), VmError> {
        match word::classify(w) {
            WordRef::Null | WordRef::Code(_) => Ok(()),
            WordRef::Object(slot) => {
                let b = self.boxed_mut(slot)?;
                if !b.pinned {
                    b.refcnt += 1;
                }
                Ok(())
            }
        }
    }

    /// Decrement the reference count, destroying the object synchronously
    /// when it reaches zero. Owned children are released with an explicit
    /// worklist so deeply nested graphs cannot overflow the host stack.
    /// No-op for the null word and for bare code pointers; fatal for a
    /// handle whose object was already destroyed.
    pub fn decr(&mut self, w: Word) -> Result<(), VmError> {
        let mut work = vec![w];
        while let Some(w) = work.pop() {
            let slot = match word::classify(w) {
                WordRef::Null | WordRef::Code(_) => continue,
                WordRef::Object(slot) => slot,
            };
            let b = self.boxed_mut(slot)?;
            if b.pinned {
                continue;
            }
            b.refcnt -= 1;
            if b.refcnt > 0 {
                continue;
            }
            // Count hit zero: free the slot and release owned children.
            let body = match self.slots[slot as usize].take() {
                Some(boxed) => boxed.body,
                None => return Err(VmError::RefDeleted { slot }),
            };
            self.live -= 1;
            self.free.push(slot);
            match body {
                ObjBody::Str(_) => {}
                ObjBody::Record { reflen, fields }
                | ObjBody::Action { reflen, fields, .. } => {
                    work.extend_from_slice(&fields[..reflen as usize]);
                }
                ObjBody::Collection { owns: true, items } => {
                    work.extend_from_slice(&items);
                }
                ObjBody::Collection { owns: false, .. } => {}
            }
        }
        Ok(())
    }

    /// Virtual equality: byte-content comparison when both sides are
    /// strings, identity otherwise.
    pub fn equals(&self, a: Word, b: Word) -> Result<bool, VmError> {
        if a == b {
            return Ok(true);
        }
        if let (WordRef::Object(sa), WordRef::Object(sb)) =
            (word::classify(a), word::classify(b))
        {
            if let (ObjBody::Str(ba), ObjBody::Str(bb)) =
                (&self.boxed(sa)?.body, &self.boxed(sb)?.body)
            {
                return Ok(ba == bb);
            }
        }
        Ok(false)
    }

    // ---- Strings ----

    /// Allocate a fresh string from `bytes`.
    pub fn mk_str(&mut self, bytes: &[u8]) -> Word {
        self.alloc(ObjBody::Str(bytes.to_vec()))
    }

    pub fn str_bytes(&self, w: Word) -> Result<&[u8], VmError> {
        let slot = Self::expect_object(w)?;
        match &self.boxed(slot)?.body {
            ObjBody::Str(bytes) => Ok(bytes),
            _ => Err(VmError::OutOfBounds {
                subcode: subcode::KIND,
                index: w as i64,
            }),
        }
    }

    pub fn str_len(&self, w: Word) -> Result<usize, VmError> {
        Ok(self.str_bytes(w)?.len())
    }

    /// Concatenation allocates a fresh string; inputs are never mutated
    /// or aliased.
    pub fn str_concat(&mut self, a: Word, b: Word) -> Result<Word, VmError> {
        let mut bytes = self.str_bytes(a)?.to_vec();
        bytes.extend_from_slice(self.str_bytes(b)?);
        Ok(self.mk_str(&bytes))
    }

    /// Substring of `count` bytes starting at `start`. A start past the
    /// end yields the empty string; the count is clamped to what remains.
    pub fn str_substring(&mut self, s: Word, start: i32, count: i32) -> Result<Word, VmError> {
        let bytes = self.str_bytes(s)?;
        let len = bytes.len() as i32;
        if start < 0 || start >= len || count <= 0 {
            return Ok(self.mk_str(b""));
        }
        let count = count.min(len - start) as usize;
        let start = start as usize;
        let piece = bytes[start..start + count].to_vec();
        Ok(self.mk_str(&piece))
    }

    /// Byte value at `index`, or a bounds error.
    pub fn str_code_at(&self, s: Word, index: i32) -> Result<u8, VmError> {
        let bytes = self.str_bytes(s)?;
        if index < 0 || index as usize >= bytes.len() {
            return Err(VmError::OutOfBounds {
                subcode: subcode::STRING,
                index: index as i64,
            });
        }
        Ok(bytes[index as usize])
    }

    /// One-character string at `index` (fresh allocation).
    pub fn str_at(&mut self, s: Word, index: i32) -> Result<Word, VmError> {
        let b = self.str_code_at(s, index)?;
        Ok(self.mk_str(&[b]))
    }

    pub fn str_eq(&self, a: Word, b: Word) -> Result<bool, VmError> {
        Ok(self.str_bytes(a)? == self.str_bytes(b)?)
    }

    // ---- Records ----

    /// Allocate a record with `reflen` leading reference fields out of
    /// `len` total, all zeroed. Requires `reflen <= len <= 255`.
    pub fn mk_record(&mut self, reflen: i32, len: i32) -> Result<Word, VmError> {
        check_sizes(reflen, len)?;
        Ok(self.alloc(ObjBody::Record {
            reflen: reflen as u8,
            fields: vec![0; len as usize],
        }))
    }

    fn record(&self, w: Word) -> Result<(u8, &Vec<Word>), VmError> {
        let slot = Self::expect_object(w)?;
        match &self.boxed(slot)?.body {
            ObjBody::Record { reflen, fields } => Ok((*reflen, fields)),
            _ => Err(VmError::OutOfBounds {
                subcode: subcode::KIND,
                index: w as i64,
            }),
        }
    }

    fn record_mut(&mut self, w: Word) -> Result<(u8, &mut Vec<Word>), VmError> {
        let slot = Self::expect_object(w)?;
        match &mut self.boxed_mut(slot)?.body {
            ObjBody::Record { reflen, fields } => Ok((*reflen, fields)),
            _ => Err(VmError::OutOfBounds {
                subcode: subcode::KIND,
                index: w as i64,
            }),
        }
    }

    /// Scalar field load: valid only for `reflen <= idx < len`.
    pub fn record_ld(&self, w: Word, idx: u8) -> Result<Word, VmError> {
        let (reflen, fields) = self.record(w)?;
        if idx < reflen || idx as usize >= fields.len() {
            return Err(VmError::OutOfBounds {
                subcode: subcode::RECORD_LD,
                index: idx as i64,
            });
        }
        Ok(fields[idx as usize])
    }

    /// Reference field load: valid only for `idx < reflen`; the returned
    /// value is incremented (its presence on the stack counts as a
    /// reference).
    pub fn record_ldref(&mut self, w: Word, idx: u8) -> Result<Word, VmError> {
        let (reflen, fields) = self.record(w)?;
        if idx >= reflen {
            return Err(VmError::OutOfBounds {
                subcode: subcode::RECORD_LDREF,
                index: idx as i64,
            });
        }
        let v = fields[idx as usize];
        self.incr(v)?;
        Ok(v)
    }

    /// Scalar field store: valid only for `reflen <= idx < len`.
    pub fn record_st(&mut self, w: Word, idx: u8, v: Word) -> Result<(), VmError> {
        let (reflen, fields) = self.record_mut(w)?;
        if idx < reflen || idx as usize >= fields.len() {
            return Err(VmError::OutOfBounds {
                subcode: subcode::RECORD_ST,
                index: idx as i64,
            });
        }
        fields[idx as usize] = v;
        Ok(())
    }

    /// Reference field store: valid only for `idx < reflen`; the old
    /// value is released first.
    pub fn record_stref(&mut self, w: Word, idx: u8, v: Word) -> Result<(), VmError> {
        let (reflen, fields) = self.record_mut(w)?;
        if idx >= reflen {
            return Err(VmError::OutOfBounds {
                subcode: subcode::RECORD_STREF,
                index: idx as i64,
            });
        }
        let old = fields[idx as usize];
        fields[idx as usize] = v;
        self.decr(old)?;
        Ok(())
    }

    // ---- Actions ----

    /// Allocate an action (closure) for the function at word offset
    /// `entry`. A capture-free action (`len == 0`) allocates nothing and
    /// returns a bare tagged code pointer; the caller must have validated
    /// the entry's function marker beforehand.
    pub fn mk_action(&mut self, reflen: i32, len: i32, entry: u32) -> Result<Word, VmError> {
        check_sizes(reflen, len)?;
        if len == 0 {
            return Ok(word::code_ptr(entry));
        }
        Ok(self.alloc(ObjBody::Action {
            reflen: reflen as u8,
            entry,
            fields: vec![0; len as usize],
        }))
    }

    fn action(&self, w: Word) -> Result<(u8, u32, &Vec<Word>), VmError> {
        let slot = Self::expect_object(w)?;
        match &self.boxed(slot)?.body {
            ObjBody::Action {
                reflen,
                entry,
                fields,
            } => Ok((*reflen, *entry, fields)),
            _ => Err(VmError::OutOfBounds {
                subcode: subcode::KIND,
                index: w as i64,
            }),
        }
    }

    /// Write one captured slot. Each slot may be written exactly once:
    /// a second write to a nonzero slot is fatal.
    pub fn action_st(&mut self, w: Word, idx: u8, v: Word) -> Result<(), VmError> {
        let slot = Self::expect_object(w)?;
        let fields = match &mut self.boxed_mut(slot)?.body {
            ObjBody::Action { fields, .. } => fields,
            _ => {
                return Err(VmError::OutOfBounds {
                    subcode: subcode::KIND,
                    index: w as i64,
                })
            }
        };
        if idx as usize >= fields.len() {
            return Err(VmError::OutOfBounds {
                subcode: subcode::ACTION_ST,
                index: idx as i64,
            });
        }
        if fields[idx as usize] != 0 {
            return Err(VmError::OutOfBounds {
                subcode: subcode::ACTION_REASSIGN,
                index: idx as i64,
            });
        }
        fields[idx as usize] = v;
        Ok(())
    }

    /// The action's entry offset.
    pub fn action_entry(&self, w: Word) -> Result<u32, VmError> {
        Ok(self.action(w)?.1)
    }

    /// Snapshot of the captured fields (passed as leading call arguments).
    pub fn action_fields(&self, w: Word) -> Result<Vec<Word>, VmError> {
        Ok(self.action(w)?.2.clone())
    }

    // ---- Collections ----

    /// Allocate an empty collection. `owns` makes the elements owned
    /// references.
    pub fn mk_collection(&mut self, owns: bool) -> Word {
        self.alloc(ObjBody::Collection {
            owns,
            items: Vec::new(),
        })
    }

    fn collection(&self, w: Word) -> Result<(bool, &Vec<Word>), VmError> {
        let slot = Self::expect_object(w)?;
        match &self.boxed(slot)?.body {
            ObjBody::Collection { owns, items } => Ok((*owns, items)),
            _ => Err(VmError::OutOfBounds {
                subcode: subcode::KIND,
                index: w as i64,
            }),
        }
    }

    fn collection_mut(&mut self, w: Word) -> Result<(bool, &mut Vec<Word>), VmError> {
        let slot = Self::expect_object(w)?;
        match &mut self.boxed_mut(slot)?.body {
            ObjBody::Collection { owns, items } => Ok((*owns, items)),
            _ => Err(VmError::OutOfBounds {
                subcode: subcode::KIND,
                index: w as i64,
            }),
        }
    }

    pub fn coll_count(&self, w: Word) -> Result<usize, VmError> {
        Ok(self.collection(w)?.1.len())
    }

    /// Append, taking a reference to the value first when owning.
    pub fn coll_add(&mut self, w: Word, v: Word) -> Result<(), VmError> {
        let (owns, _) = self.collection(w)?;
        if owns {
            self.incr(v)?;
        }
        let (_, items) = self.collection_mut(w)?;
        items.push(v);
        Ok(())
    }

    /// Element at `index`; raises the bounds error when out of range.
    /// Owning collections hand out an extra reference.
    pub fn coll_at(&mut self, w: Word, index: i32) -> Result<Word, VmError> {
        let (owns, items) = self.collection(w)?;
        if index < 0 || index as usize >= items.len() {
            return Err(VmError::OutOfBounds {
                subcode: subcode::COLLECTION,
                index: index as i64,
            });
        }
        let v = items[index as usize];
        if owns {
            self.incr(v)?;
        }
        Ok(v)
    }

    /// Remove at `index`; silently ignores an out-of-range index.
    pub fn coll_remove_at(&mut self, w: Word, index: i32) -> Result<(), VmError> {
        let (owns, items) = self.collection_mut(w)?;
        if index < 0 || index as usize >= items.len() {
            return Ok(());
        }
        let old = items.remove(index as usize);
        if owns {
            self.decr(old)?;
        }
        Ok(())
    }

    /// Overwrite at `index`; silently ignores an out-of-range index.
    /// Owning collections release the replaced value.
    pub fn coll_set_at(&mut self, w: Word, index: i32, v: Word) -> Result<(), VmError> {
        let (owns, items) = self.collection_mut(w)?;
        if index < 0 || index as usize >= items.len() {
            return Ok(());
        }
        let old = items[index as usize];
        items[index as usize] = v;
        if owns {
            self.incr(v)?;
            self.decr(old)?;
        }
        Ok(())
    }

    /// First index `>= start` whose element equals `x` under virtual
    /// equality, or -1. An out-of-range start yields -1.
    pub fn coll_index_of(&self, w: Word, x: Word, start: i32) -> Result<i32, VmError> {
        let (_, items) = self.collection(w)?;
        if start < 0 || start as usize >= items.len() {
            return Ok(-1);
        }
        for (i, &item) in items.iter().enumerate().skip(start as usize) {
            if self.equals(item, x)? {
                return Ok(i as i32);
            }
        }
        Ok(-1)
    }

    /// Remove the first element equal to `x`; returns 1 if one was
    /// removed, 0 otherwise.
    pub fn coll_remove(&mut self, w: Word, x: Word) -> Result<i32, VmError> {
        let idx = self.coll_index_of(w, x, 0)?;
        if idx >= 0 {
            self.coll_remove_at(w, idx)?;
            Ok(1)
        } else {
            Ok(0)
        }
    }
}

fn check_sizes(reflen: i32, len: i32) -> Result<(), VmError> {
    if !(0 <= reflen && reflen <= len) {
        return Err(VmError::SizeInvalid { subcode: 1 });
    }
    if len > 255 {
        return Err(VmError::SizeInvalid { subcode: 2 });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refcount_lifecycle() {
        let mut heap = Heap::new();
        let s = heap.mk_str(b"abc");
        assert_eq!(heap.live(), 1);
        heap.incr(s).unwrap();
        heap.decr(s).unwrap();
        assert_eq!(heap.live(), 1);
        heap.decr(s).unwrap();
        assert_eq!(heap.live(), 0);
        // The handle is now dead; touching it again is fatal.
        assert!(matches!(heap.decr(s), Err(VmError::RefDeleted { .. })));
        assert!(matches!(heap.incr(s), Err(VmError::RefDeleted { .. })));
    }

    #[test]
    fn null_and_code_ptrs_are_inert() {
        let mut heap = Heap::new();
        heap.incr(0).unwrap();
        heap.decr(0).unwrap();
        let cp = word::code_ptr(6);
        heap.incr(cp).unwrap();
        heap.decr(cp).unwrap();
        assert_eq!(heap.live(), 0);
    }

    #[test]
    fn destroying_a_record_releases_owned_fields() {
        let mut heap = Heap::new();
        let s = heap.mk_str(b"x");
        let r = heap.mk_record(1, 2).unwrap();
        // Transfer the string into the record (no extra incr: move).
        heap.record_stref(r, 0, s).unwrap();
        heap.record_st(r, 1, 42).unwrap();
        assert_eq!(heap.live(), 2);
        heap.decr(r).unwrap();
        assert_eq!(heap.live(), 0);
    }

    #[test]
    fn nested_destruction_uses_worklist() {
        // A chain of records each owning the next; one decr frees all.
        let mut heap = Heap::new();
        let mut inner = heap.mk_str(b"leaf");
        for _ in 0..500 {
            let r = heap.mk_record(1, 1).unwrap();
            heap.record_stref(r, 0, inner).unwrap();
            inner = r;
        }
        assert_eq!(heap.live(), 501);
        heap.decr(inner).unwrap();
        assert_eq!(heap.live(), 0);
    }

    #[test]
    fn record_field_typing() {
        let mut heap = Heap::new();
        let r = heap.mk_record(2, 4).unwrap();
        // Scalar accessors on scalar fields.
        heap.record_st(r, 2, 7).unwrap();
        assert_eq!(heap.record_ld(r, 2).unwrap(), 7);
        // Scalar accessors on reference fields are misclassified.
        assert_eq!(
            heap.record_ld(r, 0),
            Err(VmError::OutOfBounds {
                subcode: subcode::RECORD_LD,
                index: 0
            })
        );
        assert_eq!(
            heap.record_st(r, 1, 0),
            Err(VmError::OutOfBounds {
                subcode: subcode::RECORD_ST,
                index: 1
            })
        );
        // Reference accessors on scalar fields are misclassified.
        assert_eq!(
            heap.record_ldref(r, 2),
            Err(VmError::OutOfBounds {
                subcode: subcode::RECORD_LDREF,
                index: 2
            })
        );
        // Past the end.
        assert_eq!(
            heap.record_ld(r, 4),
            Err(VmError::OutOfBounds {
                subcode: subcode::RECORD_LD,
                index: 4
            })
        );
        heap.decr(r).unwrap();
        assert_eq!(heap.live(), 0);
    }

    #[test]
    fn record_size_invariants() {
        let mut heap = Heap::new();
        assert_eq!(
            heap.mk_record(3, 2),
            Err(VmError::SizeInvalid { subcode: 1 })
        );
        assert_eq!(
            heap.mk_record(-1, 2),
            Err(VmError::SizeInvalid { subcode: 1 })
        );
        assert_eq!(
            heap.mk_record(0, 256),
            Err(VmError::SizeInvalid { subcode: 2 })
        );
        assert!(heap.mk_record(0, 255).is_ok());
        assert!(heap.mk_record(0, 0).is_ok());
    }

    #[test]
    fn record_stref_releases_old_value() {
        let mut heap = Heap::new();
        let a = heap.mk_str(b"a");
        let b = heap.mk_str(b"b");
        let r = heap.mk_record(1, 1).unwrap();
        heap.record_stref(r, 0, a).unwrap();
        heap.record_stref(r, 0, b).unwrap();
        // `a` lost its only reference when overwritten.
        assert!(matches!(heap.incr(a), Err(VmError::RefDeleted { .. })));
        heap.decr(r).unwrap();
        assert_eq!(heap.live(), 0);
    }

    #[test]
    fn action_capture_is_single_assignment() {
        let mut heap = Heap::new();
        let a = heap.mk_action(1, 2, 6).unwrap();
        heap.action_st(a, 0, 10).unwrap();
        assert_eq!(
            heap.action_st(a, 0, 12),
            Err(VmError::OutOfBounds {
                subcode: subcode::ACTION_REASSIGN,
                index: 0
            })
        );
        assert_eq!(
            heap.action_st(a, 2, 1),
            Err(VmError::OutOfBounds {
                subcode: subcode::ACTION_ST,
                index: 2
            })
        );
    }

    #[test]
    fn capture_free_action_is_a_code_pointer() {
        let mut heap = Heap::new();
        let a = heap.mk_action(0, 0, 48).unwrap();
        assert_eq!(word::classify(a), WordRef::Code(48));
        assert_eq!(heap.live(), 0);
    }

    #[test]
    fn string_ops_allocate_fresh() {
        let mut heap = Heap::new();
        let a = heap.mk_str(b"foo");
        let b = heap.mk_str(b"bar");
        let ab1 = heap.str_concat(a, b).unwrap();
        let ab2 = heap.str_concat(a, b).unwrap();
        assert_ne!(ab1, ab2);
        assert!(heap.str_eq(ab1, ab2).unwrap());
        assert_eq!(heap.str_bytes(ab1).unwrap(), b"foobar");
        // Inputs untouched.
        assert_eq!(heap.str_bytes(a).unwrap(), b"foo");
        assert_eq!(heap.str_bytes(b).unwrap(), b"bar");
    }

    #[test]
    fn substring_roundtrip_and_clamping() {
        let mut heap = Heap::new();
        let s = heap.mk_str(b"hello");
        let len = heap.str_len(s).unwrap() as i32;
        let whole = heap.str_substring(s, 0, len).unwrap();
        assert!(heap.str_eq(s, whole).unwrap());
        let tail = heap.str_substring(s, 3, 99).unwrap();
        assert_eq!(heap.str_bytes(tail).unwrap(), b"lo");
        let empty = heap.str_substring(s, 9, 2).unwrap();
        assert_eq!(heap.str_bytes(empty).unwrap(), b"");
    }

    #[test]
    fn string_index_bounds() {
        let mut heap = Heap::new();
        let s = heap.mk_str(b"hi");
        assert_eq!(heap.str_code_at(s, 1).unwrap(), b'i');
        assert_eq!(
            heap.str_code_at(s, 2),
            Err(VmError::OutOfBounds {
                subcode: subcode::STRING,
                index: 2
            })
        );
        assert_eq!(
            heap.str_code_at(s, -1),
            Err(VmError::OutOfBounds {
                subcode: subcode::STRING,
                index: -1
            })
        );
    }

    #[test]
    fn owning_collection_refcounts_elements() {
        let mut heap = Heap::new();
        let c = heap.mk_collection(true);
        let s = heap.mk_str(b"elem");
        heap.coll_add(c, s).unwrap();
        // Give up our own reference; the collection keeps the string alive.
        heap.decr(s).unwrap();
        assert_eq!(heap.live(), 2);
        // `at` hands out a fresh reference.
        let got = heap.coll_at(c, 0).unwrap();
        assert_eq!(got, s);
        heap.decr(got).unwrap();
        heap.decr(c).unwrap();
        assert_eq!(heap.live(), 0);
    }

    #[test]
    fn collection_silent_and_raising_bounds() {
        let mut heap = Heap::new();
        let c = heap.mk_collection(false);
        heap.coll_add(c, 1).unwrap();
        // remove_at / set_at ignore out-of-range.
        heap.coll_remove_at(c, 5).unwrap();
        heap.coll_set_at(c, -1, 9).unwrap();
        assert_eq!(heap.coll_count(c).unwrap(), 1);
        // at raises.
        assert_eq!(
            heap.coll_at(c, 1),
            Err(VmError::OutOfBounds {
                subcode: subcode::COLLECTION,
                index: 1
            })
        );
    }

    #[test]
    fn index_of_uses_string_content_equality() {
        let mut heap = Heap::new();
        let c = heap.mk_collection(true);
        let a = heap.mk_str(b"aa");
        heap.coll_add(c, a).unwrap();
        let needle = heap.mk_str(b"aa");
        assert_eq!(heap.coll_index_of(c, needle, 0).unwrap(), 0);
        assert_eq!(heap.coll_index_of(c, needle, 1).unwrap(), -1);
        let other = heap.mk_str(b"bb");
        assert_eq!(heap.coll_index_of(c, other, 0).unwrap(), -1);
        assert_eq!(heap.coll_remove(c, needle).unwrap(), 1);
        assert_eq!(heap.coll_remove(c, needle).unwrap(), 0);
    }

    #[test]
    fn pinned_objects_never_die() {
        let mut heap = Heap::new();
        let s = heap.mk_str(b"literal");
        heap.pin(s).unwrap();
        assert_eq!(heap.live(), 0);
        for _ in 0..10 {
            heap.decr(s).unwrap();
        }
        assert_eq!(heap.str_bytes(s).unwrap(), b"literal");
    }
}
