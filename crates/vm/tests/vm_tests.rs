//! Behavioral tests for whole programs: reference-count balance, object
//! typing, error codes, and scheduler ordering, all driven through built
//! images.

use minibit_asm::{FunctionBuilder, ImageBuilder};
use minibit_common::Op;
use minibit_vm::builtins::idx;
use minibit_vm::{standard_tables, Vm, VmError};

fn run_image(b: ImageBuilder) -> Result<minibit_vm::RunOutcome, VmError> {
    minibit_vm::run(b.finish().unwrap())
}

#[test]
fn string_equality_is_content_not_identity() {
    let mut b = ImageBuilder::new(0);
    let ab = b.intern(b"ab").unwrap();
    let c = b.intern(b"c").unwrap();
    let abc = b.intern(b"abc").unwrap();

    // local 0 = "ab" + "c" (fresh), local 1 = the "abc" literal
    let mut f = FunctionBuilder::new(2, 2);
    f.ld_str(ab);
    f.ld_str(c);
    f.op_d(Op::FlatCall2Func, idx::func2::STR_CONCAT);
    f.op_d(Op::StLoc, 0);
    f.ld_str(abc);
    f.op_d(Op::StLoc, 1);
    // Identity: different objects.
    f.op_d(Op::LdLoc, 0);
    f.op_d(Op::LdLoc, 1);
    f.op_d(Op::FlatCall2Func, idx::func2::EQ);
    f.op_d(Op::FlatCall1Proc, idx::proc1::POST_NUM);
    // Content: equal bytes.
    f.op_d(Op::LdLoc, 0);
    f.op_d(Op::LdLoc, 1);
    f.op_d(Op::FlatCall2Func, idx::func2::STR_EQ);
    f.op_d(Op::FlatCall1Proc, idx::proc1::POST_NUM);
    f.op_d(Op::ClrLocRef, 0);
    f.op(Op::Ret0);
    b.function(f);

    let outcome = run_image(b).unwrap();
    assert_eq!(outcome.posted, vec!["0".to_string(), "1".to_string()]);
    assert_eq!(outcome.leaked, 0);
}

#[test]
fn substring_of_full_length_round_trips() {
    let mut b = ImageBuilder::new(0);
    let s = b.intern(b"minibit").unwrap();

    let mut f = FunctionBuilder::new(1, 4);
    // local 0 = substring(s, 0, count(s))
    f.ld_str(s);
    f.ld_const(0);
    f.ld_str(s);
    f.op_d(Op::FlatCall1Func, idx::func1::STR_COUNT);
    f.op_d(Op::FlatCall3Func, idx::func3::STR_SUBSTRING);
    f.op_d(Op::StLoc, 0);
    // Content-equal to the original.
    f.op_d(Op::LdLoc, 0);
    f.ld_str(s);
    f.op_d(Op::FlatCall2Func, idx::func2::STR_EQ);
    f.op_d(Op::FlatCall1Proc, idx::proc1::POST_NUM);
    f.op_d(Op::ClrLocRef, 0);
    f.op(Op::Ret0);
    b.function(f);

    let outcome = run_image(b).unwrap();
    assert_eq!(outcome.posted, vec!["1".to_string()]);
    assert_eq!(outcome.leaked, 0);
}

#[test]
fn owning_collection_balances_its_references() {
    let mut b = ImageBuilder::new(0);
    let a = b.intern(b"a").unwrap();
    let x = b.intern(b"x").unwrap();

    // local 0 = owning collection
    let mut f = FunctionBuilder::new(1, 3);
    f.ld_const(1);
    f.op_d(Op::FlatCall1Func, idx::func1::COLL_MK);
    f.op_d(Op::StLoc, 0);
    // Add a fresh concat; the checked call releases our reference, the
    // collection keeps its own.
    f.op_d(Op::LdLoc, 0);
    f.ld_str(a);
    f.ld_str(x);
    f.op_d(Op::FlatCall2Func, idx::func2::STR_CONCAT);
    f.op_masked(Op::Call2Proc, idx::proc2::COLL_ADD, 0b0000_0010);
    // Count is observable.
    f.op_d(Op::LdLoc, 0);
    f.op_d(Op::FlatCall1Func, idx::func1::COLL_COUNT);
    f.op_d(Op::FlatCall1Proc, idx::proc1::POST_NUM);
    // Dropping the collection releases the element too.
    f.op_d(Op::ClrLocRef, 0);
    f.op(Op::Ret0);
    b.function(f);

    let outcome = run_image(b).unwrap();
    assert_eq!(outcome.posted, vec!["1".to_string()]);
    assert_eq!(outcome.leaked, 0);
}

#[test]
fn record_field_typing_is_enforced_at_runtime() {
    // A record with one reference field and one scalar field; a scalar
    // load of the reference field is a typed bounds failure.
    let mut b = ImageBuilder::new(0);
    let mut f = FunctionBuilder::new(0, 2);
    f.ld_const(1); // reflen
    f.ld_const(2); // len
    f.op_d(Op::FlatCall2Func, idx::func2::RECORD_MK);
    f.op_d(Op::LdFld, 0);
    f.op(Op::Ret1);
    b.function(f);

    let err = run_image(b).unwrap_err();
    assert_eq!(err.code(), (8, 1));
}

#[test]
fn action_capture_slots_are_write_once() {
    let mut b = ImageBuilder::new(0);
    let target = b.declare();

    let mut entry = FunctionBuilder::new(0, 3);
    entry.ld_ptr(target);
    entry.ld_const(0);
    entry.ld_const(1);
    entry.op_d(Op::FlatCall3Func, idx::func3::ACTION_MK);
    entry.ld_const(7);
    entry.op_d(Op::StClo, 0);
    entry.ld_const(8);
    entry.op_d(Op::StClo, 0); // second write to the same slot
    entry.op(Op::Ret0);
    b.function(entry);

    let mut f = FunctionBuilder::new(0, 0);
    f.op(Op::Ret0);
    b.define(target, f);

    let err = run_image(b).unwrap_err();
    assert_eq!(err.code(), (8, 11));
}

#[test]
fn globals_persist_across_user_calls() {
    let mut b = ImageBuilder::new(1);
    let reader = b.declare();

    let mut entry = FunctionBuilder::new(0, 1);
    entry.ld_const(123);
    entry.op_d(Op::StGlb, 0);
    entry.ucall_proc(reader, 0);
    entry.op(Op::Ret0);
    b.function(entry);

    let mut f = FunctionBuilder::new(0, 1);
    f.op_d(Op::LdGlb, 0);
    f.op_d(Op::FlatCall1Proc, idx::proc1::POST_NUM);
    f.op(Op::Ret0);
    b.define(reader, f);

    let outcome = run_image(b).unwrap();
    assert_eq!(outcome.posted, vec!["123".to_string()]);
}

#[test]
fn failed_assertion_reports_code_one_with_message() {
    let mut b = ImageBuilder::new(0);
    let msg = b.intern(b"wanted truth").unwrap();
    let mut f = FunctionBuilder::new(0, 2);
    f.ld_const(0);
    f.ld_str(msg);
    f.op_d(Op::FlatCall2Proc, idx::proc2::ASSERT);
    f.op(Op::Ret0);
    b.function(f);

    let err = run_image(b).unwrap_err();
    assert_eq!(
        err,
        VmError::AssertionFailed {
            message: "wanted truth".to_string()
        }
    );
    assert_eq!(err.code(), (1, 0));
}

#[test]
fn undecodable_instruction_reports_code_three() {
    let mut b = ImageBuilder::new(0);
    let mut f = FunctionBuilder::new(0, 1);
    f.raw(0x00FF);
    b.function(f);

    let err = run_image(b).unwrap_err();
    assert!(matches!(err, VmError::BadOpcode { byte: 0xFF, .. }));
    assert_eq!(err.code(), (3, 0));
}

#[test]
fn output_posted_before_a_failure_is_retained() {
    let mut b = ImageBuilder::new(0);
    let mut f = FunctionBuilder::new(0, 1);
    f.ld_const(1);
    f.op_d(Op::FlatCall1Proc, idx::proc1::POST_NUM);
    f.op(Op::Pop); // underflow
    b.function(f);

    let mut vm = Vm::load(b.finish().unwrap(), standard_tables()).unwrap();
    assert_eq!(vm.run(), Err(VmError::StackUnderflow));
    assert_eq!(vm.posted, vec!["1".to_string()]);
}

#[test]
fn pause_drains_the_queue_mid_function() {
    let mut b = ImageBuilder::new(0);
    let task = b.declare();

    let mut entry = FunctionBuilder::new(0, 1);
    entry.ld_ptr(task);
    entry.op_d(Op::FlatCall1Proc, idx::proc1::RUN_IN_BACKGROUND);
    entry.ld_const(0);
    entry.op_d(Op::FlatCall1Proc, idx::proc1::PAUSE);
    // By here the task already ran.
    entry.ld_const(2);
    entry.op_d(Op::FlatCall1Proc, idx::proc1::POST_NUM);
    entry.op(Op::Ret0);
    b.function(entry);

    let mut f = FunctionBuilder::new(0, 1);
    f.ld_const(1);
    f.op_d(Op::FlatCall1Proc, idx::proc1::POST_NUM);
    f.op(Op::Ret0);
    b.define(task, f);

    let outcome = run_image(b).unwrap();
    assert_eq!(outcome.posted, vec!["1".to_string(), "2".to_string()]);
}

#[test]
fn event_handlers_can_be_rebound_without_leaking() {
    let mut b = ImageBuilder::new(0);
    let first = b.declare();
    let second = b.declare();

    let mut entry = FunctionBuilder::new(0, 4);
    // Bind a capturing handler, then replace it; the first handler's
    // action must be destroyed by the rebind.
    for handler in [first, second] {
        entry.ld_const(5); // event id
        entry.ld_ptr(handler);
        entry.ld_const(0);
        entry.ld_const(1);
        entry.op_d(Op::FlatCall3Func, idx::func3::ACTION_MK);
        entry.ld_const(40);
        entry.op_d(Op::StClo, 0);
        entry.op_masked(Op::Call2Proc, idx::proc2::ON_EVENT, 0b0000_0010);
    }
    entry.ld_const(5);
    entry.ld_const(2);
    entry.op_d(Op::FlatCall2Proc, idx::proc2::RAISE_EVENT);
    entry.op(Op::Ret0);
    b.function(entry);

    // Both handlers post captured + value; only the second may run.
    for (id, bump) in [(first, 1000), (second, 0)] {
        let mut f = FunctionBuilder::new(0, 3);
        f.op_d(Op::LdArg, 0);
        f.op_d(Op::LdArg, 1);
        f.op_d(Op::FlatCall2Func, idx::func2::ADD);
        f.ld_const(bump);
        f.op_d(Op::FlatCall2Func, idx::func2::ADD);
        f.op_d(Op::FlatCall1Proc, idx::proc1::POST_NUM);
        f.op(Op::Ret0);
        b.define(id, f);
    }

    let mut vm = Vm::load(b.finish().unwrap(), standard_tables()).unwrap();
    vm.run().unwrap();
    assert_eq!(vm.posted, vec!["42".to_string()]);
    // The second handler is still registered and owns its action.
    assert_eq!(vm.heap.live(), 1);
}

#[test]
fn deep_record_chain_releases_in_one_clear() {
    // Build a 301-deep chain of single-field records, then free the whole
    // thing with one ClrLocRef. Local 0 is the chain head, local 1 the
    // record under construction, global 0 the loop counter.
    let mut b = ImageBuilder::new(1);
    let mut f = FunctionBuilder::new(2, 3);
    f.ld_const(1);
    f.ld_const(1);
    f.op_d(Op::FlatCall2Func, idx::func2::RECORD_MK);
    f.op_d(Op::StLoc, 0);
    f.ld_const(300);
    f.op_d(Op::StGlb, 0);
    f.label("loop").unwrap();
    // new record wraps the current head; the head's reference moves into
    // the field, then the new record becomes the head.
    f.ld_const(1);
    f.ld_const(1);
    f.op_d(Op::FlatCall2Func, idx::func2::RECORD_MK);
    f.op_d(Op::StLoc, 1);
    f.op_d(Op::LdLoc, 1);
    f.op_d(Op::LdLoc, 0);
    f.op_d(Op::StFldRef, 0);
    f.op_d(Op::LdLoc, 1);
    f.op_d(Op::StLoc, 0);
    // counter -= 1, loop while nonzero
    f.op_d(Op::LdGlb, 0);
    f.ld_const(1);
    f.op_d(Op::FlatCall2Func, idx::func2::SUB);
    f.op_d(Op::StGlb, 0);
    f.op_d(Op::LdGlb, 0);
    f.jmpnz("loop");
    f.op_d(Op::ClrLocRef, 0);
    f.op(Op::Ret0);
    b.function(f);

    let outcome = run_image(b).unwrap();
    assert_eq!(outcome.leaked, 0);
}
