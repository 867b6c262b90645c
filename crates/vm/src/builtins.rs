//! The standard native library and its fixed table layout.
//!
//! [`standard_tables`] registers every builtin in a deterministic order,
//! so the indices in [`idx`] are a stable contract between compiled
//! images and this host. Arithmetic is 32-bit signed with wrapping
//! overflow; division and modulo by zero yield zero rather than halting.

use crate::error::{subcode, VmError};
use crate::machine::Vm;
use crate::natives::NativeTables;
use minibit_common::word::{self, Word, WordRef};
use minibit_common::FUNCTION_V1;

/// Table indices of the standard natives, grouped per dispatch table.
pub mod idx {
    pub mod proc1 {
        pub const POST_NUM: u8 = 0;
        pub const POST_STR: u8 = 1;
        pub const RUN0: u8 = 2;
        pub const INCR: u8 = 3;
        pub const DECR: u8 = 4;
        pub const RUN_IN_BACKGROUND: u8 = 5;
        pub const PAUSE: u8 = 6;
    }
    pub mod proc2 {
        pub const ASSERT: u8 = 0;
        pub const COLL_ADD: u8 = 1;
        pub const COLL_REMOVE_AT: u8 = 2;
        pub const ON_EVENT: u8 = 3;
        pub const RUN1: u8 = 4;
        pub const RAISE_EVENT: u8 = 5;
    }
    pub mod proc3 {
        pub const COLL_SET_AT: u8 = 0;
    }
    pub mod func0 {
        pub const STR_EMPTY: u8 = 0;
    }
    pub mod func1 {
        pub const NOT: u8 = 0;
        pub const IS_INVALID: u8 = 1;
        pub const NUM_TO_STR: u8 = 2;
        pub const NUM_TO_CHAR: u8 = 3;
        pub const BOOL_TO_STR: u8 = 4;
        pub const STR_COUNT: u8 = 5;
        pub const STR_TO_NUM: u8 = 6;
        pub const COLL_MK: u8 = 7;
        pub const COLL_COUNT: u8 = 8;
        pub const ABS: u8 = 9;
        pub const SIGN: u8 = 10;
        pub const SQRT: u8 = 11;
    }
    pub mod func2 {
        pub const ADD: u8 = 0;
        pub const SUB: u8 = 1;
        pub const MUL: u8 = 2;
        pub const DIV: u8 = 3;
        pub const MOD: u8 = 4;
        pub const LT: u8 = 5;
        pub const LE: u8 = 6;
        pub const GT: u8 = 7;
        pub const GE: u8 = 8;
        pub const EQ: u8 = 9;
        pub const NE: u8 = 10;
        pub const AND: u8 = 11;
        pub const OR: u8 = 12;
        pub const MIN: u8 = 13;
        pub const MAX: u8 = 14;
        pub const POW: u8 = 15;
        pub const STR_CONCAT: u8 = 16;
        pub const STR_EQ: u8 = 17;
        pub const STR_AT: u8 = 18;
        pub const STR_CODE_AT: u8 = 19;
        pub const COLL_AT: u8 = 20;
        pub const COLL_REMOVE: u8 = 21;
        pub const EQUALS: u8 = 22;
        pub const RECORD_MK: u8 = 23;
    }
    pub mod func3 {
        pub const STR_SUBSTRING: u8 = 0;
        pub const COLL_INDEX_OF: u8 = 1;
        pub const ACTION_MK: u8 = 2;
        pub const CLAMP: u8 = 3;
    }
}

fn num(w: Word) -> i32 {
    w as i32
}

fn boolean(v: bool) -> Word {
    v as Word
}

// ---- proc1 ----

fn post_num(vm: &mut Vm, v: Word) -> Result<(), VmError> {
    vm.post(num(v).to_string());
    Ok(())
}

fn post_str(vm: &mut Vm, s: Word) -> Result<(), VmError> {
    let line = String::from_utf8_lossy(vm.heap.str_bytes(s)?).into_owned();
    vm.post(line);
    Ok(())
}

fn run0(vm: &mut Vm, action: Word) -> Result<(), VmError> {
    vm.run_action(action, &[])?;
    Ok(())
}

fn incr(vm: &mut Vm, w: Word) -> Result<(), VmError> {
    vm.heap.incr(w)
}

fn decr(vm: &mut Vm, w: Word) -> Result<(), VmError> {
    vm.heap.decr(w)
}

fn run_in_background(vm: &mut Vm, action: Word) -> Result<(), VmError> {
    vm.run_in_background(action)
}

/// Cooperative yield: run everything queued so far. The millisecond
/// argument is honored as ordering only, not wall-clock time.
fn pause(vm: &mut Vm, _ms: Word) -> Result<(), VmError> {
    vm.pump()
}

// ---- proc2 ----

fn assert_that(vm: &mut Vm, cond: Word, msg: Word) -> Result<(), VmError> {
    if cond != 0 {
        return Ok(());
    }
    let message = String::from_utf8_lossy(vm.heap.str_bytes(msg)?).into_owned();
    Err(VmError::AssertionFailed { message })
}

fn coll_add(vm: &mut Vm, c: Word, v: Word) -> Result<(), VmError> {
    vm.heap.coll_add(c, v)
}

fn coll_remove_at(vm: &mut Vm, c: Word, i: Word) -> Result<(), VmError> {
    vm.heap.coll_remove_at(c, num(i))
}

fn on_event(vm: &mut Vm, event: Word, action: Word) -> Result<(), VmError> {
    vm.on_event(num(event), action)
}

fn run1(vm: &mut Vm, action: Word, arg: Word) -> Result<(), VmError> {
    vm.run_action(action, &[arg])?;
    Ok(())
}

fn raise_event(vm: &mut Vm, event: Word, value: Word) -> Result<(), VmError> {
    vm.raise_event(num(event), value)
}

// ---- proc3 ----

fn coll_set_at(vm: &mut Vm, c: Word, i: Word, v: Word) -> Result<(), VmError> {
    vm.heap.coll_set_at(c, num(i), v)
}

// ---- func0 ----

fn str_empty(vm: &mut Vm) -> Result<Word, VmError> {
    Ok(vm.heap.mk_str(b""))
}

// ---- func1 ----

fn not(_vm: &mut Vm, v: Word) -> Result<Word, VmError> {
    Ok(boolean(v == 0))
}

fn is_invalid(_vm: &mut Vm, v: Word) -> Result<Word, VmError> {
    Ok(boolean(v == 0))
}

fn num_to_str(vm: &mut Vm, v: Word) -> Result<Word, VmError> {
    Ok(vm.heap.mk_str(num(v).to_string().as_bytes()))
}

fn num_to_char(vm: &mut Vm, v: Word) -> Result<Word, VmError> {
    Ok(vm.heap.mk_str(&[num(v) as u8]))
}

fn bool_to_str(vm: &mut Vm, v: Word) -> Result<Word, VmError> {
    Ok(vm.heap.mk_str(if v != 0 { b"true" } else { b"false" }))
}

fn str_count(vm: &mut Vm, s: Word) -> Result<Word, VmError> {
    Ok(vm.heap.str_len(s)? as Word)
}

/// Leading-integer parse; anything unparsable is zero.
fn str_to_num(vm: &mut Vm, s: Word) -> Result<Word, VmError> {
    let bytes = vm.heap.str_bytes(s)?;
    let text = String::from_utf8_lossy(bytes);
    Ok(text.trim().parse::<i32>().unwrap_or(0) as Word)
}

fn coll_mk(vm: &mut Vm, owns: Word) -> Result<Word, VmError> {
    Ok(vm.heap.mk_collection(owns != 0))
}

fn coll_count(vm: &mut Vm, c: Word) -> Result<Word, VmError> {
    Ok(vm.heap.coll_count(c)? as Word)
}

fn abs(_vm: &mut Vm, v: Word) -> Result<Word, VmError> {
    Ok(num(v).wrapping_abs() as Word)
}

fn sign(_vm: &mut Vm, v: Word) -> Result<Word, VmError> {
    Ok(num(v).signum() as Word)
}

fn sqrt(_vm: &mut Vm, v: Word) -> Result<Word, VmError> {
    let v = num(v);
    if v <= 0 {
        return Ok(0);
    }
    Ok((v as f64).sqrt() as i32 as Word)
}

// ---- func2 ----

macro_rules! arith {
    ($name:ident, |$a:ident, $b:ident| $body:expr) => {
        fn $name(_vm: &mut Vm, a: Word, b: Word) -> Result<Word, VmError> {
            let $a = num(a);
            let $b = num(b);
            Ok(($body) as Word)
        }
    };
}

arith!(add, |a, b| a.wrapping_add(b));
arith!(sub, |a, b| a.wrapping_sub(b));
arith!(mul, |a, b| a.wrapping_mul(b));
arith!(div, |a, b| if b == 0 { 0 } else { a.wrapping_div(b) });
arith!(modulo, |a, b| if b == 0 { 0 } else { a.wrapping_rem(b) });
arith!(lt, |a, b| (a < b) as i32);
arith!(le, |a, b| (a <= b) as i32);
arith!(gt, |a, b| (a > b) as i32);
arith!(ge, |a, b| (a >= b) as i32);
arith!(eq, |a, b| (a == b) as i32);
arith!(ne, |a, b| (a != b) as i32);
arith!(and, |a, b| (a != 0 && b != 0) as i32);
arith!(or, |a, b| (a != 0 || b != 0) as i32);
arith!(min, |a, b| a.min(b));
arith!(max, |a, b| a.max(b));
arith!(pow, |a, b| if b < 0 {
    0
} else {
    a.wrapping_pow(b as u32)
});

fn str_concat(vm: &mut Vm, a: Word, b: Word) -> Result<Word, VmError> {
    vm.heap.str_concat(a, b)
}

fn str_eq(vm: &mut Vm, a: Word, b: Word) -> Result<Word, VmError> {
    Ok(boolean(vm.heap.str_eq(a, b)?))
}

fn str_at(vm: &mut Vm, s: Word, i: Word) -> Result<Word, VmError> {
    vm.heap.str_at(s, num(i))
}

fn str_code_at(vm: &mut Vm, s: Word, i: Word) -> Result<Word, VmError> {
    Ok(vm.heap.str_code_at(s, num(i))? as Word)
}

fn coll_at(vm: &mut Vm, c: Word, i: Word) -> Result<Word, VmError> {
    vm.heap.coll_at(c, num(i))
}

fn coll_remove(vm: &mut Vm, c: Word, x: Word) -> Result<Word, VmError> {
    Ok(vm.heap.coll_remove(c, x)? as Word)
}

fn equals(vm: &mut Vm, a: Word, b: Word) -> Result<Word, VmError> {
    Ok(boolean(vm.heap.equals(a, b)?))
}

fn record_mk(vm: &mut Vm, reflen: Word, len: Word) -> Result<Word, VmError> {
    vm.heap.mk_record(num(reflen), num(len))
}

// ---- func3 ----

fn str_substring(vm: &mut Vm, s: Word, start: Word, count: Word) -> Result<Word, VmError> {
    vm.heap.str_substring(s, num(start), num(count))
}

fn coll_index_of(vm: &mut Vm, c: Word, x: Word, start: Word) -> Result<Word, VmError> {
    Ok(vm.heap.coll_index_of(c, x, num(start))? as Word)
}

/// Build an action from a code pointer. The target must open with the
/// function marker; that is checked here, once, so later invocations can
/// trust the entry.
fn action_mk(vm: &mut Vm, ptr: Word, reflen: Word, len: Word) -> Result<Word, VmError> {
    let entry = match word::classify(ptr) {
        WordRef::Code(off) => off,
        _ => {
            return Err(VmError::OutOfBounds {
                subcode: subcode::KIND,
                index: ptr as i64,
            })
        }
    };
    let marker = vm.image().word(entry as usize)?;
    if marker != FUNCTION_V1 {
        return Err(VmError::BadFunctionHeader {
            offset: entry as usize,
            found: marker,
        });
    }
    vm.heap.mk_action(num(reflen), num(len), entry)
}

fn clamp(_vm: &mut Vm, lo: Word, hi: Word, v: Word) -> Result<Word, VmError> {
    let (lo, hi, v) = (num(lo), num(hi), num(v));
    Ok(v.max(lo).min(hi) as Word)
}

/// Build the standard dispatch tables. Registration order here defines
/// the indices in [`idx`].
pub fn standard_tables() -> NativeTables {
    let mut t = NativeTables::new();

    t.push_proc1(post_num);
    t.push_proc1(post_str);
    t.push_proc1(run0);
    t.push_proc1(incr);
    t.push_proc1(decr);
    t.push_proc1(run_in_background);
    t.push_proc1(pause);

    t.push_proc2(assert_that);
    t.push_proc2(coll_add);
    t.push_proc2(coll_remove_at);
    t.push_proc2(on_event);
    t.push_proc2(run1);
    t.push_proc2(raise_event);

    t.push_proc3(coll_set_at);

    t.push_func0(str_empty);

    t.push_func1(not);
    t.push_func1(is_invalid);
    t.push_func1(num_to_str);
    t.push_func1(num_to_char);
    t.push_func1(bool_to_str);
    t.push_func1(str_count);
    t.push_func1(str_to_num);
    t.push_func1(coll_mk);
    t.push_func1(coll_count);
    t.push_func1(abs);
    t.push_func1(sign);
    t.push_func1(sqrt);

    t.push_func2(add);
    t.push_func2(sub);
    t.push_func2(mul);
    t.push_func2(div);
    t.push_func2(modulo);
    t.push_func2(lt);
    t.push_func2(le);
    t.push_func2(gt);
    t.push_func2(ge);
    t.push_func2(eq);
    t.push_func2(ne);
    t.push_func2(and);
    t.push_func2(or);
    t.push_func2(min);
    t.push_func2(max);
    t.push_func2(pow);
    t.push_func2(str_concat);
    t.push_func2(str_eq);
    t.push_func2(str_at);
    t.push_func2(str_code_at);
    t.push_func2(coll_at);
    t.push_func2(coll_remove);
    t.push_func2(equals);
    t.push_func2(record_mk);

    t.push_func3(str_substring);
    t.push_func3(coll_index_of);
    t.push_func3(action_mk);
    t.push_func3(clamp);

    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use minibit_common::{Image, BINARY_V1, ENTRY_OFFSET, HEADER_WORDS};

    fn vm() -> Vm {
        let words = vec![BINARY_V1, 0, 0, 0, 0, 0, FUNCTION_V1, 0, 0, 0x02];
        Vm::load(Image::new(words).unwrap(), standard_tables()).unwrap()
    }

    #[test]
    fn table_layout_matches_index_constants() {
        let t = standard_tables();
        assert_eq!(t.proc1(idx::proc1::PAUSE).unwrap() as usize, pause as usize);
        assert_eq!(
            t.proc2(idx::proc2::ASSERT).unwrap() as usize,
            assert_that as usize
        );
        assert_eq!(
            t.func1(idx::func1::SQRT).unwrap() as usize,
            sqrt as usize
        );
        assert_eq!(t.func2(idx::func2::ADD).unwrap() as usize, add as usize);
        assert_eq!(
            t.func2(idx::func2::RECORD_MK).unwrap() as usize,
            record_mk as usize
        );
        assert_eq!(
            t.func3(idx::func3::CLAMP).unwrap() as usize,
            clamp as usize
        );
        // One past the end of each table is a checked error.
        assert!(t.proc1(7).is_err());
        assert!(t.func2(24).is_err());
    }

    #[test]
    fn arithmetic_edge_cases() {
        let mut vm = vm();
        assert_eq!(div(&mut vm, 7, 0).unwrap(), 0);
        assert_eq!(modulo(&mut vm, 7, 0).unwrap(), 0);
        assert_eq!(div(&mut vm, (-7i32) as Word, 2).unwrap(), (-3i32) as Word);
        assert_eq!(
            add(&mut vm, i32::MAX as Word, 1).unwrap(),
            i32::MIN as Word
        );
        assert_eq!(abs(&mut vm, (-5i32) as Word).unwrap(), 5);
        assert_eq!(
            abs(&mut vm, i32::MIN as Word).unwrap(),
            i32::MIN as Word
        );
        assert_eq!(pow(&mut vm, 2, 10).unwrap(), 1024);
        assert_eq!(pow(&mut vm, 2, (-1i32) as Word).unwrap(), 0);
        assert_eq!(sqrt(&mut vm, 17).unwrap(), 4);
        assert_eq!(sqrt(&mut vm, (-4i32) as Word).unwrap(), 0);
        assert_eq!(sign(&mut vm, (-9i32) as Word).unwrap(), (-1i32) as Word);
        assert_eq!(clamp(&mut vm, 0, 10, 99).unwrap(), 10);
        assert_eq!(clamp(&mut vm, 0, 10, (-3i32) as Word).unwrap(), 0);
    }

    #[test]
    fn string_conversions() {
        let mut vm = vm();
        let s = num_to_str(&mut vm, (-42i32) as Word).unwrap();
        assert_eq!(vm.heap.str_bytes(s).unwrap(), b"-42");
        let n = str_to_num(&mut vm, s).unwrap();
        assert_eq!(num(n), -42);
        let t = bool_to_str(&mut vm, 1).unwrap();
        assert_eq!(vm.heap.str_bytes(t).unwrap(), b"true");
        let junk = vm.heap.mk_str(b"pony");
        assert_eq!(str_to_num(&mut vm, junk).unwrap(), 0);
        let c = num_to_char(&mut vm, b'A' as Word).unwrap();
        assert_eq!(vm.heap.str_bytes(c).unwrap(), b"A");
    }

    #[test]
    fn assert_failure_carries_the_message() {
        let mut vm = vm();
        let msg = vm.heap.mk_str(b"boom");
        assert_that(&mut vm, 1, msg).unwrap();
        let err = assert_that(&mut vm, 0, msg).unwrap_err();
        assert_eq!(
            err,
            VmError::AssertionFailed {
                message: "boom".into()
            }
        );
        assert_eq!(err.code(), (1, 0));
    }

    #[test]
    fn posting_records_output_in_order() {
        let mut vm = vm();
        post_num(&mut vm, 7).unwrap();
        let s = vm.heap.mk_str(b"hello");
        post_str(&mut vm, s).unwrap();
        assert_eq!(vm.posted, vec!["7".to_string(), "hello".to_string()]);
    }

    #[test]
    fn action_mk_validates_the_entry_marker() {
        let mut vm = vm();
        // ENTRY_OFFSET holds a valid function; HEADER_WORDS + 1 does not.
        let good = word::code_ptr(ENTRY_OFFSET as u32);
        let a = action_mk(&mut vm, good, 0, 0).unwrap();
        assert_eq!(word::classify(a), WordRef::Code(ENTRY_OFFSET as u32));
        let bad = word::code_ptr((HEADER_WORDS + 1) as u32);
        assert!(matches!(
            action_mk(&mut vm, bad, 0, 1),
            Err(VmError::BadFunctionHeader { .. })
        ));
        // A non-pointer word is a kind error.
        assert!(matches!(
            action_mk(&mut vm, 0, 0, 1),
            Err(VmError::OutOfBounds {
                subcode: subcode::KIND,
                ..
            })
        ));
    }

    #[test]
    fn background_queue_runs_fifo_on_pause() {
        let mut vm = vm();
        // Two capture-free actions over the entry function (a bare RET0).
        let a = word::code_ptr(ENTRY_OFFSET as u32);
        run_in_background(&mut vm, a).unwrap();
        run_in_background(&mut vm, a).unwrap();
        assert_eq!(vm.scheduler.queued(), 2);
        pause(&mut vm, 0).unwrap();
        assert_eq!(vm.scheduler.queued(), 0);
    }
}
