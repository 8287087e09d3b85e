//! Decoding of the defmt frames an example writes to semihosting.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use defmt_decoder::{DecodeError, Frame, Locations, Table};

/// Decodes `raw_output` into one line per frame, using the defmt table in `elf_path`.
pub fn decode_output(elf_path: &Path, raw_output: &[u8]) -> Result<String> {
    if raw_output.is_empty() {
        return Ok(String::new());
    }

    let elf_data = fs::read(elf_path).context("Failed to read ELF file")?;
    let table = Table::parse(&elf_data)
        .context("Failed to parse defmt table from ELF")?
        .ok_or_else(|| anyhow!("No defmt data found in ELF"))?;
    let locs = table.get_locations(&elf_data).ok();

    let mut decoder = table.new_stream_decoder();
    decoder.received(raw_output);

    let mut output = String::new();
    loop {
        match decoder.decode() {
            Ok(frame) => {
                output.push_str(&format_frame(&frame, locs.as_ref()));
                output.push('\n');
            }
            Err(DecodeError::UnexpectedEof) => break,
            Err(DecodeError::Malformed) => bail!("Malformed defmt frame after:\n{output}"),
        }
    }

    Ok(output)
}

fn format_frame(frame: &Frame, locs: Option<&Locations>) -> String {
    let level = frame
        .level()
        .map_or("print", |l| l.as_str())
        .to_uppercase();

    match locs.and_then(|locs| locs.get(&frame.index())) {
        Some(loc) => {
            let file = loc
                .file
                .file_name()
                .map_or_else(|| loc.file.display().to_string(), |f| f.to_string_lossy().into_owned());
            format!("[{level:<5}] {file}:{}: {}", loc.line, frame.display_message())
        }
        None => format!("[{level:<5}] {}", frame.display_message()),
    }
}
