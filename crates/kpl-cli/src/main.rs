use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use kpl::{StdIo, Vm, compile};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut disassemble = false;
    let mut run = false;
    let mut paths: Vec<&str> = Vec::new();
    for arg in &args {
        match arg.as_str() {
            "--dis" => disassemble = true,
            "--run" => run = true,
            "--help" | "-h" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            flag if flag.starts_with('-') => {
                eprintln!("unknown option: {flag}");
                print_usage();
                return ExitCode::FAILURE;
            }
            path => paths.push(path),
        }
    }

    let Some(input) = paths.first().copied() else {
        print_usage();
        return ExitCode::FAILURE;
    };
    if paths.len() > 2 {
        eprintln!("too many arguments");
        print_usage();
        return ExitCode::FAILURE;
    }

    let source = match fs::read_to_string(input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {input}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let code = match compile(&source) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{input}:{err}");
            return ExitCode::FAILURE;
        }
    };

    if disassemble {
        print!("{code}");
        return ExitCode::SUCCESS;
    }

    if run {
        return match Vm::new(&code).run(&mut StdIo) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("runtime error: {err}");
                ExitCode::FAILURE
            }
        };
    }

    let output = match paths.get(1) {
        Some(path) => PathBuf::from(path),
        None => Path::new(input).with_extension("kpc"),
    };
    let result = fs::File::create(&output).and_then(|mut sink| code.serialize(&mut sink));
    if let Err(err) = result {
        eprintln!("error writing {}: {err}", output.display());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn print_usage() {
    eprintln!("usage: kplc [--dis | --run] <input.kpl> [output.kpc]");
}
