mod cli;
mod command;
mod session;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use clap::Parser;
use mia_fs::MountTable;

pub use self::{
    cli::Cli,
    command::{Command, Context, execute},
};

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut ctx = Context::new(MountTable::new(cli.operator_id));

    match &cli.script {
        Some(script) => {
            log::info!("running script {script:?}");
            let reader = BufReader::new(File::open(script)?);
            for line in reader.lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    println!("> {}", line.trim());
                }
                run(&mut ctx, &line);
            }
        }
        None => {
            let stdin = io::stdin();
            let mut lines = stdin.lock().lines();
            loop {
                print!("mia> ");
                io::stdout().flush()?;
                let Some(line) = lines.next().transpose()? else {
                    println!();
                    break;
                };
                if matches!(line.trim(), "exit" | "quit") {
                    break;
                }
                run(&mut ctx, &line);
            }
        }
    }

    Ok(())
}

/// 错误只打印，不中断后续命令
fn run(ctx: &mut Context, line: &str) {
    let result = Command::parse(line)
        .map_err(Into::into)
        .and_then(|command| match command {
            Some(command) => execute(ctx, command).map(Some),
            None => Ok(None),
        });

    match result {
        Ok(Some(message)) => println!("{message}"),
        Ok(None) => {}
        Err(err) => {
            log::debug!("{line:?} failed: {err:?}");
            eprintln!("error: {err}");
        }
    }
}
