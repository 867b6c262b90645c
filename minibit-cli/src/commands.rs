//! CLI command implementations.

use minibit_asm::{error::BuildError, FunctionBuilder, ImageBuilder};
use minibit_common::{Image, Op, BINARY_V1};
use minibit_vm::builtins::idx;
use minibit_vm::{standard_tables, Vm};
use std::fs;

/// Write a small demo image that exercises strings, natives and
/// arithmetic. Handy for trying `info`, `disasm` and `run`.
pub fn demo(args: &[String]) -> Result<(), i32> {
    let output = if args.len() >= 2 && args[0] == "-o" {
        args[1].clone()
    } else {
        "demo.mb".to_string()
    };

    let image = build_demo().map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;
    let bytes = image.to_bytes();
    log::debug!("assembled demo image: {} words", image.len());
    fs::write(&output, &bytes).map_err(|e| {
        eprintln!("error: cannot write '{output}': {e}");
        1
    })?;

    eprintln!("wrote {} words ({} bytes) -> {output}", image.len(), bytes.len());
    Ok(())
}

fn build_demo() -> Result<Image, BuildError> {
    let mut b = ImageBuilder::new(0);
    let greeting = b.intern(b"hello from minibit")?;

    let mut f = FunctionBuilder::new(0, 2);
    f.ld_str(greeting);
    f.op_d(Op::FlatCall1Proc, idx::proc1::POST_STR);
    f.ld_const(3);
    f.ld_const(4);
    f.op_d(Op::FlatCall2Func, idx::func2::ADD);
    f.op_d(Op::FlatCall1Proc, idx::proc1::POST_NUM);
    f.op(Op::Ret0);
    b.function(f);

    b.finish()
}

/// Print the image header summary.
pub fn info(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: info requires an input file");
        eprintln!("Usage: minibit info <image.mb>");
        return Err(1);
    }

    let input = &args[0];
    let image = read_image(input)?;

    let note = if image.version() == BINARY_V1 {
        ""
    } else {
        " (unsupported)"
    };
    println!("{input}: {} words ({} bytes)", image.len(), image.len() * 2);
    println!("version: {:#06x}{note}", image.version());
    println!("globals: {}", image.num_globals());
    println!("strings: {}", image.num_strings());
    Ok(())
}

/// Disassemble an image to stdout.
pub fn disasm(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: disasm requires an input file");
        eprintln!("Usage: minibit disasm <image.mb>");
        return Err(1);
    }

    let input = &args[0];
    let image = read_image(input)?;
    print!("{}", minibit_asm::disassemble(&image));
    Ok(())
}

/// Execute an image with the standard native tables.
pub fn run(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: run requires an input file");
        eprintln!("Usage: minibit run <image.mb>");
        return Err(1);
    }

    let input = &args[0];
    let image = read_image(input)?;

    let mut vm = Vm::load(image, standard_tables()).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;

    match vm.run() {
        Ok(result) => {
            for line in &vm.posted {
                println!("{line}");
            }
            if let Some(v) = result {
                println!("= {}", v as i32);
            }
            if vm.heap.live() > 0 {
                eprintln!("warning: {} heap objects leaked", vm.heap.live());
            }
            Ok(())
        }
        Err(e) => {
            // Output posted before the failure still matters.
            for line in &vm.posted {
                println!("{line}");
            }
            let (code, subcode) = e.code();
            eprintln!("runtime error: {e} (code {code}, subcode {subcode})");
            Err(3)
        }
    }
}

// --- Helpers ---

/// Read and decode a binary image file.
fn read_image(path: &str) -> Result<Image, i32> {
    let bytes = fs::read(path).map_err(|e| {
        eprintln!("error: cannot read '{path}': {e}");
        1
    })?;
    log::debug!("read {} bytes from '{path}'", bytes.len());

    Image::from_bytes(&bytes).map_err(|e| {
        eprintln!("error: invalid image: {e}");
        1
    })
}
