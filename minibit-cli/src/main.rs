//! minibit CLI — build, inspect, and execute binary images.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Input/decode/load error
//! - 3: Runtime error

mod commands;

use std::process;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "demo" => commands::demo(&args[2..]),
        "info" => commands::info(&args[2..]),
        "disasm" => commands::disasm(&args[2..]),
        "run" => commands::run(&args[2..]),
        "--help" | "-h" | "help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            eprintln!("error: unknown command '{other}'");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

fn print_usage() {
    eprintln!("Usage: minibit <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  demo [-o output.mb]    Write a small demo image");
    eprintln!("  info <image.mb>        Print the image header summary");
    eprintln!("  disasm <image.mb>      Disassemble an image");
    eprintln!("  run <image.mb>         Execute an image");
}
