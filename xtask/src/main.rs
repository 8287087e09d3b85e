mod defmt;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tempfile::NamedTempFile;

const TARGET: &str = "thumbv7m-none-eabi";

#[derive(Parser)]
#[command(name = "xtask", about = "Build and test tasks for pl011-irq")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an example in QEMU and show its UART output and logs
    Qemu {
        /// Name of the example to run
        example: String,

        /// Run in release mode
        #[arg(long)]
        release: bool,
    },

    /// Run all examples and compare their UART output against expected
    Test {
        /// Only run examples whose name contains this
        filter: Option<String>,

        /// Update expected output files instead of comparing
        #[arg(long)]
        bless: bool,
    },
}

fn project_root() -> PathBuf {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap());

    // If we're in xtask/, go up one level
    if manifest_dir.ends_with("xtask") {
        manifest_dir.parent().unwrap().to_path_buf()
    } else {
        manifest_dir
    }
}

fn testsuite_dir() -> PathBuf {
    project_root().join("testsuite")
}

fn build_example(example: &str, release: bool) -> Result<PathBuf> {
    let mut cmd = Command::new("cargo");
    cmd.current_dir(testsuite_dir())
        .env("DEFMT_LOG", "trace")
        .stderr(Stdio::null())
        .arg("build")
        .arg("--example")
        .arg(example)
        .arg("--target")
        .arg(TARGET);

    if release {
        cmd.arg("--release");
    }

    let status = cmd.status().context("Failed to run cargo build")?;

    if !status.success() {
        bail!("cargo build failed");
    }

    let profile = if release { "release" } else { "debug" };
    Ok(project_root()
        .join("target")
        .join(TARGET)
        .join(profile)
        .join("examples")
        .join(example))
}

/// Output from running QEMU
struct QemuOutput {
    /// defmt frames from semihosting (stdout)
    semihosting: Vec<u8>,
    /// Bytes the example sent on UART0
    uart: Vec<u8>,
}

/// Runs `elf_path`, feeding `input` (if any) to UART0.
fn run_qemu(elf_path: &Path, input: Option<&Path>) -> Result<QemuOutput> {
    let uart_file = NamedTempFile::new().context("Failed to create temp file for UART")?;
    let uart_path = uart_file.path();

    let mut chardev = format!("file,id=uart0,path={}", uart_path.display());
    if let Some(input) = input {
        chardev.push_str(&format!(",input-path={}", input.display()));
    }

    let output = Command::new("qemu-system-arm")
        .arg("-cpu")
        .arg("cortex-m3")
        .arg("-machine")
        .arg("lm3s6965evb")
        .arg("-nographic")
        .arg("-monitor")
        .arg("none")
        .arg("-semihosting-config")
        .arg("enable=on,target=native")
        .arg("-chardev")
        .arg(chardev)
        .arg("-serial")
        .arg("chardev:uart0")
        .arg("-kernel")
        .arg(elf_path)
        .stdin(Stdio::null())
        .output()
        .context("Failed to run QEMU")?;

    let uart = fs::read(uart_path).unwrap_or_default();

    if !output.status.success() {
        let logs = defmt::decode_output(elf_path, &output.stdout).unwrap_or_default();
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "QEMU exited with error: {:?}\n{stderr}--- logs ---\n{logs}--- uart ---\n{}",
            output.status.code(),
            String::from_utf8_lossy(&uart),
        );
    }

    Ok(QemuOutput {
        semihosting: output.stdout,
        uart,
    })
}

/// Input file for `example`, if it reads from the UART.
fn input_for(example: &str) -> Option<PathBuf> {
    let path = testsuite_dir()
        .join("input")
        .join(format!("{example}.in"));
    path.exists().then_some(path)
}

fn discover_examples() -> Result<Vec<String>> {
    let examples_dir = testsuite_dir().join("examples");

    let mut examples = Vec::new();
    for entry in fs::read_dir(&examples_dir).context("Failed to read examples directory")? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "rs") {
            if let Some(stem) = path.file_stem() {
                examples.push(stem.to_string_lossy().into_owned());
            }
        }
    }
    examples.sort();
    Ok(examples)
}

/// Shows control characters, so `\n\r` and `\r\n` can be told apart in a diff.
fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string().replace("\\n", "\\n\n")
}

fn run_test(example: &str, bless: bool) -> Result<bool> {
    let expected_path = testsuite_dir()
        .join("expected")
        .join(format!("{example}.expected"));

    println!("Building '{example}'...");
    let elf_path = build_example(example, false)?;

    println!("Running in QEMU...");
    let output = run_qemu(&elf_path, input_for(example).as_deref())?;
    let logs = defmt::decode_output(&elf_path, &output.semihosting)?;

    if bless {
        let filename = expected_path.file_name().unwrap().to_string_lossy();
        let status = if expected_path.exists() {
            if fs::read(&expected_path)? == output.uart {
                "No change"
            } else {
                fs::write(&expected_path, &output.uart)?;
                "Updated"
            }
        } else {
            fs::create_dir_all(expected_path.parent().unwrap())?;
            fs::write(&expected_path, &output.uart)?;
            "Created"
        };
        println!("  {filename}: {status} ");
        Ok(true)
    } else if expected_path.exists() {
        let expected = fs::read(&expected_path)?;
        if output.uart == expected {
            println!("  PASS");

            Ok(true)
        } else {
            println!("  FAIL: UART output differs from expected");
            println!("--- expected ---");
            println!("{}", escape(&expected));
            println!("--- actual ---");
            println!("{}", escape(&output.uart));
            println!("--- logs ---");
            print!("{logs}");

            Ok(false)
        }
    } else {
        println!("  No expected output file, run with --bless to create");
        println!("--- output ---");
        println!("{}", escape(&output.uart));

        Ok(false)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Qemu { example, release } => {
            println!("Building example '{example}'...");
            let elf_path = build_example(&example, release)?;
            println!("Running in QEMU...");
            let output = run_qemu(&elf_path, input_for(&example).as_deref())?;

            print!("{}", defmt::decode_output(&elf_path, &output.semihosting)?);
            println!("--- QEMU run end ---");
            if !output.uart.is_empty() {
                println!("--- uart ---");
                println!("{}", escape(&output.uart));
            }
        }

        Commands::Test { filter, bless } => {
            let examples = discover_examples()?;
            let examples: Vec<_> = if let Some(ref f) = filter {
                examples.into_iter().filter(|e| e.contains(f)).collect()
            } else {
                examples
            };

            if examples.is_empty() {
                bail!("No tests found");
            }

            let mut passed = 0;
            let mut failed = 0;

            for example in &examples {
                println!("\n=== Test: {example} ===");
                match run_test(example, bless) {
                    Ok(true) => passed += 1,
                    Ok(false) => failed += 1,
                    Err(e) => {
                        println!("  ERROR: {e}");
                        failed += 1;
                    }
                }
            }

            println!("\n=== Summary ===");
            println!("{passed} passed, {failed} failed");

            if failed > 0 {
                bail!("{failed} test(s) failed");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn escape_keeps_line_endings_distinguishable() {
        assert_eq!(escape(b"a\r\nb\n\r"), "a\\r\\n\nb\\n\n\\r");
    }

    #[test]
    fn every_input_has_an_example() {
        let examples = discover_examples().unwrap();
        for entry in fs::read_dir(testsuite_dir().join("input")).unwrap() {
            let path = entry.unwrap().path();
            let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
            assert!(examples.contains(&stem), "{} has no example", path.display());
        }
    }
}
