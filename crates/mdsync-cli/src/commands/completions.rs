use std::io::{self, Write};
use std::path::Path;

use clap::CommandFactory;
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};

use crate::cli::{Cli, CompletionShell};
use crate::error::CliError;

pub fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let script = render_completions(shell);
    match output_path {
        Some(path) => {
            std::fs::write(path, &script)?;
            println!("{}", path.display());
        }
        None => io::stdout().write_all(&script)?,
    }
    Ok(())
}

pub fn render_completions(shell: CompletionShell) -> Vec<u8> {
    let mut buffer = Vec::new();
    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut buffer),
    }
    buffer
}

fn generate_for_shell<G: Generator>(generator: G, buffer: &mut Vec<u8>) {
    let mut command = Cli::command();
    generate(generator, &mut command, "mdsync", buffer);
}
