use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use scenarist::{Template, Value};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// YAML document providing the execution context.
    #[arg(short, long)]
    data: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a template file and print the result.
    Run {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let data = load_data(cli.data.as_deref()).unwrap_or_else(|err| {
        println!("{err:#}");
        std::process::exit(1);
    });

    match cli.command {
        Some(Commands::Run { path }) => {
            execute_file(&path, &data).unwrap_or_else(|err| {
                println!("{err:#}");
                std::process::exit(1);
            });
        }
        None => {
            start_repl(&data);
        }
    }
}

fn load_data(path: Option<&Path>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(Value::Null);
    };
    let input = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&input).context(format!("Failed to parse {}", path.display()))?;
    scenarist::from_yaml(yaml)
}

fn execute_file(path: &Path, data: &Value) -> Result<()> {
    let input = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    let template = Template::new(input.trim_end_matches('\n'))?;
    let result = template.execute(data)?;
    println!("{}", result);
    Ok(())
}

fn start_repl(data: &Value) {
    loop {
        print!(">>");
        io::stdout().flush().unwrap();

        let mut input = String::new();

        io::stdin()
            .read_line(&mut input)
            .expect("Failed to read line");

        let input = input.trim_end_matches('\n');
        if input.is_empty() {
            continue;
        }

        match Template::new(input).and_then(|template| template.execute(data)) {
            Ok(result) => println!("{}", result),
            Err(err) => {
                println!("{err:#}");
                continue;
            }
        }
    }
}
