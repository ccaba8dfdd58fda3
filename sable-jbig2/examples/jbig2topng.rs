//! Convert the first page of a JBIG2 file into a PNG.

use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.len() != 3 {
        eprintln!("Usage: {} <input.jb2> <output.png>", args[0]);

        return ExitCode::FAILURE;
    }

    let data = match std::fs::read(&args[1]) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("Failed to read input file: {err}");

            return ExitCode::FAILURE;
        }
    };

    let bitmap = match sable_jbig2::decode(&data) {
        Ok(bitmap) => bitmap,
        Err(err) => {
            eprintln!("Failed to decode JBIG2: {err}");

            return ExitCode::FAILURE;
        }
    };

    println!("Decoded: {}x{} page", bitmap.width(), bitmap.height());

    if let Err(err) = bitmap.to_gray_image().save(&args[2]) {
        eprintln!("Failed to save PNG: {err}");

        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
