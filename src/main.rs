use std::{error::Error, io, path::PathBuf, process::exit};

use clap::Parser;
use log::info;
use vm_simulator::{
    repl::REPL,
    traffic::{self, TrafficOptions},
    Mode, SimulationConfig, Simulator,
};

#[derive(Parser)]
#[command(name = "vm_simulator")]
#[command(about = "Demand-paging virtual memory simulator")]
struct Args {
    /// Input file: mode, policy, page size, memory and swap sizes, then commands
    input: PathBuf,

    /// Overrides the mode given in the input file (sequential or random)
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Reads further commands from stdin after the file's commands
    #[arg(short, long)]
    interactive: bool,

    /// Seed for the random policy and the random traffic
    #[arg(long)]
    seed: Option<u64>,

    /// Random mode: generate this many processes instead of the file's
    #[arg(short, long)]
    processes: Option<usize>,

    /// Random mode: operations per process
    #[arg(short, long, default_value_t = 100)]
    accesses: usize,

    /// Prints outcomes only, no occupancy maps or dumps
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Rejects flags that have no meaning in `mode`.
    fn check(&self, mode: Mode) -> Result<(), String> {
        if self.interactive && mode == Mode::Random {
            return Err("--interactive is only available in sequential mode".to_string());
        }
        Ok(())
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = SimulationConfig::from_file(&args.input)?;
    let mode = args.mode.unwrap_or(config.mode);
    args.check(mode)?;
    let mut manager = config.build_manager(args.seed)?;
    info!("running {} in {} mode", args.input.display(), mode);

    match mode {
        Mode::Sequential => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let mut simulator = Simulator::new(manager).quiet(args.quiet);
            simulator.run(&config.commands, &mut out)?;
            if args.interactive {
                let stdin = io::stdin();
                REPL::default().run(&mut simulator, &mut stdin.lock(), &mut out)?;
            }
        }
        Mode::Random => {
            if !args.quiet {
                manager.on_fault(|dump| println!("{}", dump));
            }
            let workload = match args.processes {
                Some(count) => traffic::generate_workload(
                    count,
                    config.geometry.page_size,
                    config.geometry.memory_size,
                    args.seed,
                ),
                None => config.workload(),
            };
            let options = TrafficOptions {
                accesses: args.accesses,
                seed: args.seed,
            };
            // workers print dumps themselves, so stdout stays unlocked here
            let report = traffic::run(manager, workload, options)?;
            println!("{}", report);
        }
    }
    Ok(())
}
