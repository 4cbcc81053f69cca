use std::path::PathBuf;

use arena_roll::RunOptions;

const HELP: &str = "arena-roll - Browse an Are.na channel as a camera roll from the terminal.

Usage: arena-roll [--channel SLUG] [--config PATH]

  --channel SLUG       Channel to browse (overrides feed.channel)
  --config PATH        Read configuration from PATH
  --version, -V        Show version and exit
  --help,    -h        Show this help message";

enum Cli {
    Run(RunOptions),
    Exit,
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Cli::Run(options)) => options,
        Ok(Cli::Exit) => return,
        Err(message) => {
            eprintln!("error: {message}");
            std::process::exit(1);
        }
    };

    if let Err(err) = arena_roll::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Cli, String> {
    let mut options = RunOptions::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("arena-roll {}", arena_roll::VERSION);
                return Ok(Cli::Exit);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(Cli::Exit);
            }
            "--channel" => {
                let value = args.next().ok_or("--channel needs a channel slug")?;
                options.channel = Some(value);
            }
            "--config" => {
                let value = args.next().ok_or("--config needs a path")?;
                options.config_file = Some(PathBuf::from(value));
            }
            other => {
                if let Some(value) = other.strip_prefix("--channel=") {
                    options.channel = Some(value.to_string());
                } else if let Some(value) = other.strip_prefix("--config=") {
                    options.config_file = Some(PathBuf::from(value));
                } else {
                    return Err(format!("unknown argument {other}; see --help"));
                }
            }
        }
    }
    Ok(Cli::Run(options))
}
