use clap::Args;
use miette::Result;
use sab_core::hash_string;

#[derive(Args)]
pub struct HashArgs {
    /// Strings to hash
    #[arg(required = true, value_name = "STRING")]
    strings: Vec<String>,
}

impl HashArgs {
    pub fn handle(&self) -> Result<()> {
        for line in self.lines() {
            println!("{line}");
        }
        Ok(())
    }

    fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.strings
            .iter()
            .map(|s| format!("{:08X}  {}", hash_string(s), s))
    }
}
