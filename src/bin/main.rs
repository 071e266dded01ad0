extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate log;

use std::cell::Cell;
use std::collections::HashSet;
use std::io::{self, BufRead, BufWriter, IsTerminal, Write};

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tokio::task::LocalSet;

use checklist_filter::prelude::*;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Fuzzy-filter a list of labels read from stdin, one per line
#[derive(Parser, Debug)]
#[command(name = "checklist-filter", version, about)]
struct Cli {
    /// Search term. Without one, every label is printed in input order
    #[arg(short, long, default_value = "")]
    query: String,

    /// Labels to mark as checked (comma-separated). Checked labels always match
    #[arg(short, long, value_delimiter = ',')]
    checked: Vec<String>,

    /// Print the score in front of each label
    #[arg(long)]
    print_score: bool,

    /// Print the labels separated by NUL instead of newline
    #[arg(long)]
    print0: bool,

    #[command(flatten)]
    filter: FilterOptions,
}

/// A stdin line, seen as a list entry
struct LineEntry {
    text: String,
    checked: Cell<bool>,
}

impl LabelSource for LineEntry {
    fn element_text(&self) -> Option<String> {
        Some(self.text.clone())
    }
}

impl ItemHandle for LineEntry {
    fn is_checked(&self) -> bool {
        self.checked.get()
    }

    fn set_checked(&self, checked: bool) {
        self.checked.set(checked);
    }

    fn show(&self) {}

    fn hide(&self) {}
}

//------------------------------------------------------------------------------
fn main() {
    env_logger::builder().format_timestamp_nanos().init();

    if let Err(err) = color_eyre::install() {
        warn!("failed to install the error report handler: {err}");
    }

    match real_main() {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(err) => {
            // downstream pipe closed, exit silently
            if err
                .downcast_ref::<io::Error>()
                .is_some_and(|err| err.kind() == io::ErrorKind::BrokenPipe)
            {
                std::process::exit(0)
            }
            eprintln!("{err:?}");
            std::process::exit(2)
        }
    }
}

fn real_main() -> Result<i32> {
    let cli = Cli::parse();

    if io::stdin().is_terminal() {
        warn!("reading labels from a terminal, end the input with Ctrl-D");
    }
    let checked: HashSet<&str> = cli.checked.iter().map(|label| label.trim()).collect();
    let mut entries: Vec<Rc<LineEntry>> = Vec::new();
    for line in io::stdin().lock().lines() {
        let text = line.wrap_err("failed to read stdin")?;
        entries.push(Rc::new(LineEntry {
            checked: Cell::new(checked.contains(text.trim())),
            text,
        }));
    }
    debug!("read {} line(s)", entries.len());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .wrap_err("failed to start the runtime")?;
    let local = LocalSet::new();
    let results = local.block_on(&runtime, run(&cli, &entries))?;

    //------------------------------------------------------------------------------
    // output
    let ending = if cli.print0 { "\0" } else { "\n" };
    let mut stdout = BufWriter::new(io::stdout().lock());
    for entry in &results {
        match (cli.print_score, entry.score) {
            (true, Some(score)) => write!(stdout, "{score:.3}\t{}{ending}", entry.label)?,
            (true, None) => write!(stdout, "-\t{}{ending}", entry.label)?,
            (false, _) => write!(stdout, "{}{ending}", entry.label)?,
        }
    }
    stdout.flush()?;

    Ok(if results.is_empty() { 1 } else { 0 })
}

async fn run(cli: &Cli, entries: &[Rc<LineEntry>]) -> Result<Vec<GroupEntry>> {
    const GROUP: &str = "stdin";

    let controller = FilterController::new(cli.filter.clone())?;
    let handles = entries.iter().map(|entry| entry.clone() as Rc<dyn ItemHandle>);
    let registered = controller.register_group(GROUP, handles)?;
    debug!("{registered} distinct label(s) registered");

    match controller.filter(GROUP, &cli.query).await? {
        FilterOutcome::Applied { visible } => debug!("{visible} label(s) matched {:?}", cli.query),
        FilterOutcome::Superseded => warn!("search {:?} was superseded", cli.query),
    }
    Ok(controller.results(GROUP)?)
}
