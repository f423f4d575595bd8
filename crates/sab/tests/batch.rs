use std::{fs, path::PathBuf};

use miette::{IntoDiagnostic, Result};
use pretty_assertions::assert_eq;
use sab::commands::{collect_inputs, run_batch, OutputArgs};
use sab_core::OutputSink;
use tempfile::tempdir;

#[test]
fn walks_directories_with_patterns() -> Result<()> {
    let dir = tempdir().into_diagnostic()?;
    let root = dir.path();
    fs::create_dir_all(root.join("Global/sub")).into_diagnostic()?;
    for name in [
        "Global/Mega0.megapack",
        "Global/sub/Dynamic0.megaPack",
        "Global/loosefiles_BE.pack",
        "readme.txt",
    ] {
        fs::write(root.join(name), b"").into_diagnostic()?;
    }

    let inputs = collect_inputs(
        &[root.to_path_buf(), root.join("readme.txt"), root.join("Global")],
        &["*.megapack", "*.megaPack"],
    )?;
    assert_eq!(
        inputs,
        vec![
            root.join("Global/Mega0.megapack"),
            root.join("Global/sub/Dynamic0.megaPack"),
            root.join("readme.txt"),
        ]
    );
    Ok(())
}

#[test]
fn rejects_bad_patterns() {
    assert!(collect_inputs(&[PathBuf::from(".")], &["*.[pack"]).is_err());
}

#[test]
fn batch_continues_after_failures() -> Result<()> {
    let dir = tempdir().into_diagnostic()?;
    let output = OutputArgs {
        output: dir.path().join("out"),
        overwrite: false,
    };
    let inputs = vec![PathBuf::from("a.luap"), PathBuf::from("b.luap")];

    let mut seen = Vec::new();
    let result = run_batch(&inputs, &output, |path, sink| {
        seen.push(path.to_path_buf());
        if path.ends_with("a.luap") {
            return Err(miette::miette!("broken"));
        }
        sink.write_file("scripts/main.lua", b"\x1BLua")?;
        Ok(())
    });

    assert!(result.is_err());
    assert_eq!(seen, inputs);
    assert_eq!(
        fs::read(dir.path().join("out/b/scripts/main.lua")).into_diagnostic()?,
        b"\x1BLua"
    );
    assert!(!dir.path().join("out/a").exists());
    Ok(())
}

#[test]
fn empty_batch_fails() {
    let output = OutputArgs {
        output: PathBuf::from("unused"),
        overwrite: false,
    };
    assert!(run_batch(&[], &output, |_, _| Ok(())).is_err());
}
