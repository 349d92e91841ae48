use std::collections::HashMap;
use std::fs;
use std::io;

use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::{
    config::pythonect_config,
    env::Env,
    runtime::Runtime,
    spawn,
};

#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Command>,

    #[clap(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serves one `&` node request read from stdin
    #[clap(hide = true)]
    Worker,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// The program file to be evaluated
    #[clap(value_parser)]
    file: Option<Utf8PathBuf>,

    /// Program passed in as a string
    #[clap(short = 'c', long = "code", value_parser, conflicts_with = "file")]
    code: Option<String>,

    /// Size of the thread pool for each fan-out step
    #[clap(long, value_parser)]
    threads: Option<usize>,

    /// Config file, containing the lowest precedence parameters
    #[clap(long, value_parser)]
    config: Option<Utf8PathBuf>,

    /// Prints the final value
    #[clap(long)]
    result: bool,
}

impl RunArgs {
    fn settings_map(&self) -> HashMap<&'static str, String> {
        let mut map = HashMap::new();
        if let Some(threads) = self.threads {
            map.insert("max_threads_per_flow", threads.to_string());
        }
        map
    }

    fn source(&self) -> Result<String> {
        match (&self.code, &self.file) {
            (Some(code), _) => Ok(code.clone()),
            (None, Some(file)) => {
                fs::read_to_string(file).with_context(|| format!("reading program file {file}"))
            }
            (None, None) => bail!("nothing to evaluate: pass a program file or -c CODE"),
        }
    }

    fn run(&self) -> Result<()> {
        let settings = pythonect_config(self.config.as_ref(), Some(&self.settings_map()));
        let source = self.source()?;
        let runtime = Runtime::with_settings(settings.clone());
        let mut env = Env::new();
        let result = runtime
            .evaluate(source.as_str(), &mut env)
            .context("evaluation failed")?;
        info!(result = %result.repr(), "done");
        if self.result {
            println!("{}", result.repr());
        }
        Ok(())
    }
}

/// Parses CLI arguments and continues the program flow accordingly
pub fn parse_and_run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Worker) => {
            let settings = pythonect_config(cli.run.config.as_ref(), None);
            spawn::serve(io::stdin().lock(), io::stdout().lock(), settings.clone())
                .context("serving worker request")
        }
        None => cli.run.run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_shape() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn code_takes_precedence() {
        let cli = Cli::try_parse_from(["pythonect", "-c", "1 -> 2", "--threads", "3"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.source().unwrap(), "1 -> 2");
        assert_eq!(cli.run.settings_map().get("max_threads_per_flow").unwrap(), "3");

        let cli = Cli::try_parse_from(["pythonect"]).unwrap();
        assert!(cli.run.source().is_err());
    }

    #[test]
    fn worker_subcommand_is_hidden() {
        let cli = Cli::try_parse_from(["pythonect", "worker"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Worker)));
        use clap::CommandFactory;
        let help = Cli::command().render_help().to_string();
        assert!(!help.contains("worker"));
    }
}
