// Man pages and completion scripts for packagers, written to
// $OUT_DIR/{man,completions}.

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::Shell;

#[path = "src/cli.rs"]
mod cli;

const BIN: &str = "ezsync";

fn main() -> io::Result<()> {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from(
        std::env::var_os("OUT_DIR").ok_or_else(|| io::Error::other("OUT_DIR is not set"))?,
    );

    write_man_pages(&out_dir.join("man"))?;
    write_completions(&out_dir.join("completions"))
}

/// One page per visible command, named `ezsync-config-set.1` and so on.
fn write_man_pages(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;

    let mut pending = vec![cli::Cli::command().name(BIN)];
    while let Some(cmd) = pending.pop() {
        let page_name = cmd.get_name().to_owned();
        pending.extend(
            cmd.get_subcommands()
                .filter(|sub| !sub.is_hide_set())
                .map(|sub| {
                    let full = format!("{page_name}-{}", sub.get_name());
                    sub.clone().name(full)
                }),
        );

        let mut page = Vec::new();
        clap_mangen::Man::new(cmd).render(&mut page)?;
        std::fs::write(dir.join(format!("{page_name}.1")), page)?;
    }
    Ok(())
}

fn write_completions(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;

    let mut cmd = cli::Cli::command();
    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::PowerShell] {
        clap_complete::generate_to(shell, &mut cmd, BIN, dir)?;
    }
    Ok(())
}
