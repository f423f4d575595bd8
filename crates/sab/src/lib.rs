//! Batch driver behind the `sab` command line tool.
//!
//! Every subcommand takes files or folders, walks the folders for the file names its
//! extractor understands and writes the results under `<output>/<input stem>/`.

pub mod commands;
pub mod output;
