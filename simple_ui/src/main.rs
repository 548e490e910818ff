use std::{cmp::Ordering, path::PathBuf, process::exit};

use clap::Parser;
use cursive::{
    view::{Nameable, Resizable, Scrollable},
    views::{Button, Dialog, DummyView, LinearLayout, Panel, TextView},
    Cursive,
};
use cursive_table_view::{TableView, TableViewItem};
use log::info;
use memory::{FrameId, FramePool};
use memory_manager::{Command, Location, PageTable};
use vm_simulator::{SimulationConfig, Simulator};

#[derive(Parser)]
#[command(name = "simple_ui")]
#[command(about = "Steps through a simulation input file")]
struct Args {
    /// Input file in the simulator's format
    #[arg(default_value = "demos/input.txt")]
    input: PathBuf,

    /// Seed for the random replacement policy
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
enum FrameColumn {
    Frame,
    Owner,
    Page,
    Used,
}

#[derive(Debug, Clone)]
struct FrameRow {
    frame: FrameId,
    owner: Option<String>,
    page: Option<usize>,
    used: usize,
}

impl TableViewItem<FrameColumn> for FrameRow {
    fn to_column(&self, column: FrameColumn) -> String {
        match column {
            FrameColumn::Frame => self.frame.to_string(),
            FrameColumn::Owner => self.owner.clone().unwrap_or_else(|| "--".to_string()),
            FrameColumn::Page => self.page.map(|p| p.to_string()).unwrap_or_default(),
            FrameColumn::Used => self.used.to_string(),
        }
    }

    fn cmp(&self, other: &Self, column: FrameColumn) -> Ordering
    where
        Self: Sized,
    {
        match column {
            FrameColumn::Frame => self.frame.cmp(&other.frame),
            FrameColumn::Owner => self.owner.cmp(&other.owner),
            FrameColumn::Page => self.page.cmp(&other.page),
            FrameColumn::Used => self.used.cmp(&other.used),
        }
    }
}

fn frame_rows(
    pool: &FramePool,
    table: &PageTable,
    location: fn(FrameId) -> Location,
) -> Vec<FrameRow> {
    (0..pool.capacity())
        .map(|frame| FrameRow {
            frame,
            owner: pool.owner(frame).map(str::to_string),
            page: table.owner_of(location(frame)).map(|(_, page)| page),
            used: pool.frame(frame).map_or(0, |f| f.used_bytes()),
        })
        .collect()
}

fn make_table() -> TableView<FrameRow, FrameColumn> {
    TableView::<FrameRow, FrameColumn>::new()
        .column(FrameColumn::Frame, "Frame", |c| c.width(6))
        .column(FrameColumn::Owner, "Owner", |c| c)
        .column(FrameColumn::Page, "Page", |c| c.width(6))
        .column(FrameColumn::Used, "Bytes", |c| c.width(6))
}

struct App {
    simulator: Simulator,
    commands: Vec<Command>,
    next: usize,
}

impl App {
    /// Runs the next command, returning the text the simulator printed.
    fn step(&mut self) -> Option<String> {
        let command = self.commands.get(self.next)?;
        self.next += 1;
        let mut out = Vec::new();
        if let Err(e) = self.simulator.step(command, &mut out) {
            return Some(format!("{}: {}\n", command, e));
        }
        Some(String::from_utf8_lossy(&out).into_owned())
    }
}

fn refresh(s: &mut Cursive) {
    let state = s.with_user_data(|app: &mut App| {
        let manager = app.simulator.manager();
        (
            frame_rows(manager.ram(), manager.page_table(), Location::Resident),
            frame_rows(manager.swap(), manager.page_table(), Location::Swapped),
            format!(
                "{} of {} commands | {}",
                app.next,
                app.commands.len(),
                manager.stats()
            ),
        )
    });
    if let Some((ram, swap, status)) = state {
        s.call_on_name("ram", |t: &mut TableView<FrameRow, FrameColumn>| {
            t.set_items(ram)
        });
        s.call_on_name("swap", |t: &mut TableView<FrameRow, FrameColumn>| {
            t.set_items(swap)
        });
        s.call_on_name("status", |v: &mut TextView| v.set_content(status));
    }
}

fn append_log(s: &mut Cursive, text: String) {
    s.call_on_name("log", |v: &mut TextView| v.append(text));
}

fn on_step(s: &mut Cursive) {
    match s.with_user_data(|app: &mut App| app.step()).flatten() {
        Some(text) => append_log(s, text),
        None => s.add_layer(Dialog::info("No commands left")),
    }
    refresh(s);
}

fn on_run(s: &mut Cursive) {
    while let Some(text) = s.with_user_data(|app: &mut App| app.step()).flatten() {
        append_log(s, text);
    }
    refresh(s);
}

fn main() {
    let args = Args::parse();
    let config = match SimulationConfig::from_file(&args.input) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            exit(1);
        }
    };
    let manager = match config.build_manager(args.seed) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("error: {}", e);
            exit(1);
        }
    };

    let mut siv = cursive::default();
    cursive::logger::init();
    log::set_max_level(log::LevelFilter::Info);
    info!("loaded {} commands", config.commands.len());

    siv.add_global_callback('q', |s| s.quit());
    siv.add_global_callback('s', on_step);
    siv.add_global_callback('~', |s| s.toggle_debug_console());

    let title = format!("{} ({} policy)", args.input.display(), config.policy);
    siv.set_user_data(App {
        simulator: Simulator::new(manager),
        commands: config.commands,
        next: 0,
    });

    let tables = LinearLayout::horizontal()
        .child(Panel::new(make_table().with_name("ram").min_size((32, 12))).title("RAM"))
        .child(DummyView)
        .child(Panel::new(make_table().with_name("swap").min_size((32, 12))).title("Swap"));
    let buttons = LinearLayout::horizontal()
        .child(Button::new("Step", on_step))
        .child(DummyView)
        .child(Button::new("Run", on_run))
        .child(DummyView)
        .child(Button::new("Quit", |s| s.quit()));
    let log = TextView::new("")
        .with_name("log")
        .scrollable()
        .fixed_height(12);

    siv.add_layer(
        Dialog::around(
            LinearLayout::vertical()
                .child(tables)
                .child(TextView::new("").with_name("status"))
                .child(Panel::new(log).title("Events"))
                .child(buttons),
        )
        .title(title),
    );
    refresh(&mut siv);
    siv.run();
}
