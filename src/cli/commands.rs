use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::cell::Flag;

#[derive(Parser)]
#[command(name = "sg", about = concat!("sg v", env!("CARGO_PKG_VERSION"), " - clinic schedule grid"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different schedule directory
    #[arg(short = 'C', long = "schedule-dir", global = true)]
    pub schedule_dir: Option<String>,

    /// Treat this date (YYYY-MM-DD) as today
    #[arg(long, global = true, value_name = "DATE")]
    pub today: Option<String>,
}

/// One line of `sg batch` input
#[derive(Parser)]
#[command(name = "sg", no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct BatchLine {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new schedule in the current directory
    Init(InitArgs),
    /// Print the whole grid
    Show,
    /// Show one cell in detail
    Cell(CellArgs),
    /// Show a cell's change history
    History(CellArgs),
    /// Write text into a cell or part
    Set(SetArgs),
    /// Empty a cell or part
    Clear(ClearArgs),
    /// Move a booking to another cell or part
    Mv(MvArgs),
    /// Split a whole cell into two parts
    Split(CellArgs),
    /// Merge a split cell back into a whole cell
    Merge(CellArgs),
    /// Toggle a cell between break and empty
    Break(CellArgs),
    /// Toggle a style flag
    Flag(FlagArgs),
    /// Edit a treatment window
    Treatment(TreatmentArgs),
    /// Compute a treatment end date
    EndDate(EndDateArgs),
    /// Validate the stored document
    Check,
    /// Run several commands in one session (one per line)
    Batch(BatchArgs),
    /// Undo the last change made in this session
    Undo,
    /// Follow the document and print changes made by other writers
    Watch(WatchArgs),
}

// ---------------------------------------------------------------------------
// Init args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct InitArgs {
    /// Schedule name (default: inferred from directory name)
    #[arg(long)]
    pub name: Option<String>,
    /// Add an employee column: --employee <id> "name" (repeatable)
    #[arg(long, num_args = 2, value_names = ["ID", "NAME"], action = clap::ArgAction::Append)]
    pub employee: Vec<String>,
    /// Time-slot rows in display order, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub slots: Vec<String>,
    /// Author recorded in cell history
    #[arg(long)]
    pub author: Option<String>,
}

// ---------------------------------------------------------------------------
// Cell command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct CellArgs {
    /// Time slot (row label)
    pub time: String,
    /// Employee id or name
    pub employee: String,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DuplicatePolicy {
    /// Move the existing booking here
    Move,
    /// Keep both bookings
    Add,
    /// Leave the cell unchanged
    Cancel,
}

#[derive(Args)]
pub struct SetArgs {
    pub time: String,
    pub employee: String,
    /// New text (empty clears)
    pub text: String,
    /// Part of a split cell (1 or 2)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub part: Option<u8>,
    /// What to do when the text is already booked elsewhere
    #[arg(long, value_enum)]
    pub on_duplicate: Option<DuplicatePolicy>,
}

#[derive(Args)]
pub struct ClearArgs {
    pub time: String,
    pub employee: String,
    /// Part of a split cell (1 or 2)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub part: Option<u8>,
}

#[derive(Args)]
pub struct MvArgs {
    pub from_time: String,
    pub from_employee: String,
    pub to_time: String,
    pub to_employee: String,
    /// Source part, when the source is split
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub from_part: Option<u8>,
    /// Target part, when the target is split
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub to_part: Option<u8>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FlagName {
    Massage,
    Pnf,
    /// Every other day
    Eod,
}

impl From<FlagName> for Flag {
    fn from(name: FlagName) -> Flag {
        match name {
            FlagName::Massage => Flag::Massage,
            FlagName::Pnf => Flag::Pnf,
            FlagName::Eod => Flag::EveryOtherDay,
        }
    }
}

#[derive(Args)]
pub struct FlagArgs {
    pub time: String,
    pub employee: String,
    #[arg(value_enum)]
    pub flag: FlagName,
    /// Part of a split cell (1 or 2)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub part: Option<u8>,
}

#[derive(Args)]
pub struct TreatmentArgs {
    pub time: String,
    pub employee: String,
    /// Part of a split cell (1 or 2)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub part: Option<u8>,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,
    /// Extra business days beyond the base course (0-365)
    #[arg(long)]
    pub extend: Option<u32>,
    /// Free-text note shown with the treatment
    #[arg(long)]
    pub info: Option<String>,
}

#[derive(Args)]
pub struct EndDateArgs {
    /// Start date (YYYY-MM-DD)
    pub start: String,
    /// Extra business days beyond the base course
    #[arg(long, default_value_t = 0)]
    pub extend: u32,
}

// ---------------------------------------------------------------------------
// Session args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct BatchArgs {
    /// File with one command per line (default: stdin)
    pub file: Option<String>,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Stop after this many seconds (default: run until interrupted)
    #[arg(long = "for", value_name = "SECS")]
    pub duration: Option<u64>,
}
