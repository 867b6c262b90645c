//! Disassembler: binary image → readable listing.
//!
//! Output is a flat listing, one instruction per line, prefixed with the
//! word offset. A word equal to the function marker starts a new function
//! block; once a word fails to decode as an instruction the rest of the
//! image is dumped as data (the literal pool lands there).

use minibit_common::{split_word, Image, Op, ENTRY_OFFSET, FUNCTION_V1};
use std::fmt::Write;

/// Render `image` as a listing.
pub fn disassemble(image: &Image) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "image: {} words, version {:#06x}, {} globals, {} strings",
        image.len(),
        image.version(),
        image.num_globals(),
        image.num_strings()
    );

    let mut pc = ENTRY_OFFSET;
    while pc < image.len() {
        let w = match image.word(pc) {
            Ok(w) => w,
            Err(_) => break,
        };

        // Function boundary. Real code never encodes this word (it would
        // be LDZERO with a meaningless direct argument).
        if w == FUNCTION_V1 && pc + 2 < image.len() {
            let locals = image.word(pc + 1).unwrap_or(0);
            let stack = image.word(pc + 2).unwrap_or(0);
            let _ = writeln!(out, "{pc:5}  FUNC locals={locals} stack={stack}");
            pc += 3;
            continue;
        }

        let (byte, direct) = split_word(w);
        let op = match Op::try_from(byte) {
            Ok(op) => op,
            Err(_) => {
                dump_data(&mut out, image, pc);
                return out;
            }
        };
        if pc + op.operand_words() >= image.len() {
            dump_data(&mut out, image, pc);
            return out;
        }
        let next = image.word(pc + 1).unwrap_or(0);

        let line = match op {
            Op::Jmp | Op::Jmpz | Op::Jmpnz => {
                let target = ((direct as u32) << 16) | next as u32;
                format!("{} -> {}", op.mnemonic(), target)
            }
            Op::LdPtr => {
                let target = ((direct as u32) << 16) | next as u32;
                format!("{} -> {}", op.mnemonic(), target)
            }
            Op::LdConst16 => format!("{} {}", op.mnemonic(), next),
            Op::LdConst32 => {
                let hi = image.word(pc + 2).unwrap_or(0);
                let v = (next as u32) | ((hi as u32) << 16);
                format!("{} {}", op.mnemonic(), v as i32)
            }
            Op::LdStrRef => match image.literal(next as usize) {
                Ok(bytes) => format!(
                    "{} {} @{} \"{}\"",
                    op.mnemonic(),
                    direct,
                    next,
                    String::from_utf8_lossy(&bytes)
                ),
                Err(_) => format!("{} {} @{}", op.mnemonic(), direct, next),
            },
            Op::FlatUcallProc | Op::FlatUcallFunc => {
                format!("{} argc={} -> {}", op.mnemonic(), direct, next)
            }
            Op::UcallProc | Op::UcallFunc => {
                let mask = image.word(pc + 2).unwrap_or(0);
                format!(
                    "{} argc={} -> {} mask={:#04x}",
                    op.mnemonic(),
                    direct,
                    next,
                    mask
                )
            }
            Op::Call0Proc
            | Op::Call1Proc
            | Op::Call2Proc
            | Op::Call3Proc
            | Op::Call4Proc
            | Op::Call0Func
            | Op::Call1Func
            | Op::Call2Func
            | Op::Call3Func
            | Op::Call4Func => {
                format!("{} {} mask={:#04x}", op.mnemonic(), direct, next)
            }
            // Direct argument is meaningless for these.
            Op::Noop
            | Op::Ret0
            | Op::Ret1
            | Op::LdZero
            | Op::Pop
            | Op::PopRef
            | Op::Not
            | Op::IsNull
            | Op::Neg => op.mnemonic().to_string(),
            _ => format!("{} {}", op.mnemonic(), direct),
        };

        let _ = writeln!(out, "{pc:5}  {line}");
        pc += 1 + op.operand_words();
    }

    out
}

fn dump_data(out: &mut String, image: &Image, from: usize) {
    for pc in from..image.len() {
        if let Ok(w) = image.word(pc) {
            let _ = writeln!(out, "{pc:5}  .data {w:#06x}");
        }
    }
}
