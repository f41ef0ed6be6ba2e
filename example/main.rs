use std::io::{self, BufRead, Write};
use std::process::exit;

use clap::Parser;

use alder::{display, dump_ast, eval, parse_toplevel, read_all, SourceResult, Task};

/// Raw command line arguments.
#[derive(Parser)]
#[command(about)]
pub struct Args {
    /// Print the AST to the console
    #[arg(long, default_value_t = false)]
    pub print_ast: bool,

    /// Print each form as it is read
    #[arg(long, default_value_t = false)]
    pub print_forms: bool,

    /// Source files to run; a REPL starts when none are given
    pub files: Vec<String>,
}

fn run_source(task: &mut Task, args: &Args, source: &str, print_results: bool) -> SourceResult<()> {
    for form in read_all(task, source)? {
        if args.print_forms {
            println!("{}", display(form));
        }
        let node = parse_toplevel(task, form)?;
        if args.print_ast {
            print!("{}", dump_ast(&node));
        }
        let value = eval(task, &node)?;
        if print_results {
            println!("{}", display(value));
        }
    }
    // Definitions and read forms stay rooted through the module; everything
    // else from this batch is garbage now.
    task.collect();
    Ok(())
}

fn repl(task: &mut Task, args: &Args) {
    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return,
            Ok(_) => {}
            Err(err) => {
                eprintln!("{err}");
                return;
            }
        }
        if let Err(err) = run_source(task, args, &line, true) {
            eprintln!("{err}");
        }
    }
}

fn main() {
    let args = Args::parse();
    let mut task = Task::new();

    if args.files.is_empty() {
        repl(&mut task, &args);
        return;
    }

    for file in &args.files {
        let source = match std::fs::read_to_string(file) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("{file}: {err}");
                exit(1);
            }
        };
        if let Err(err) = run_source(&mut task, &args, &source, false) {
            eprintln!("{file}: {err}");
            exit(1);
        }
    }
}
