mod init;
pub use init::cmd_init;

use std::error::Error;
use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use clap::Parser;

/// Global override for the schedule directory (set by -C flag)
static SCHEDULE_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::cli::render;
use crate::io::document_io::{self, DocumentError, DocumentStore, FileDocumentStore};
use crate::io::recovery::read_recovery_entries;
use crate::io::watcher::{DocumentEvent, DocumentWatcher};
use crate::model::cell::Part;
use crate::model::document::ScheduleDocument;
use crate::model::grid::CellRef;
use crate::model::schedule::Schedule;
use crate::ops::cell_ops::{self, TreatmentUpdate};
use crate::ops::check::{self, CheckError, CheckResult, CheckWarning};
use crate::ops::dates::{calculate_end_date, format_date, parse_date};
use crate::ops::duplicate::{self, DuplicateChoice, DuplicateMatch, EditOutcome};
use crate::ops::move_ops::{self, Endpoint, MoveOutcome};
use crate::store::{CellStore, SaveStatus, StoreOptions, WorkerSaveChannel};
use crate::util::args::split_command_line;
use crate::util::clock::{Clock, FixedClock, SystemClock};

type CmdResult = Result<(), Box<dyn Error>>;

const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;

    // Store -C override for load_schedule_cwd()
    if let Some(ref dir) = cli.schedule_dir {
        let abs = std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?;
        SCHEDULE_DIR_OVERRIDE
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(abs);
    }

    let today = match cli.today.as_deref() {
        Some(s) => Some(parse_date(s).ok_or_else(|| format!("invalid --today date '{}'", s))?),
        None => None,
    };

    match cli.command {
        // Init and end-date don't need an existing schedule
        Commands::Init(args) => cmd_init(args),
        Commands::EndDate(args) => cmd_end_date(args, json),

        Commands::Check => cmd_check(json),
        Commands::Batch(args) => cmd_batch(args, json, today),
        Commands::Watch(args) => cmd_watch(args, json, today),

        cmd => {
            let mut session = Session::open(today, json, std::io::stdin().is_terminal())?;
            let result = session.execute(cmd);
            session.finish()?;
            result
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The directory commands run against: the -C override or the cwd
fn working_dir() -> std::io::Result<PathBuf> {
    match SCHEDULE_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        Some(dir) => Ok(dir.clone()),
        None => std::env::current_dir(),
    }
}

fn load_schedule_cwd() -> Result<Schedule, DocumentError> {
    let start = working_dir()?;
    let root = document_io::discover_schedule(&start)?;
    document_io::load_schedule(&root)
}

fn part_arg(part: Option<u8>) -> Option<Part> {
    part.and_then(Part::from_index)
}

fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A loaded schedule with a live cell store. Batch runs every line through
/// one session, so undo reaches back across lines.
struct Session {
    schedule: Schedule,
    store: CellStore,
    json: bool,
    /// Whether a duplicate booking may be resolved by asking on the terminal
    interactive: bool,
}

impl Session {
    fn open(today: Option<NaiveDate>, json: bool, interactive: bool) -> Result<Session, Box<dyn Error>> {
        let schedule = load_schedule_cwd()?;
        let mut file_store = FileDocumentStore::new(&schedule);
        let document = file_store
            .load()?
            .unwrap_or_else(|| ScheduleDocument::empty(schedule.config.schedule.document_id.clone()));
        log::debug!(
            "loaded {} ({} cells)",
            file_store.path().display(),
            document.schedule_cells.cell_count()
        );

        let clock: Box<dyn Clock> = match today {
            Some(date) => Box::new(FixedClock::on(date)),
            None => Box::new(SystemClock),
        };
        let mut store = CellStore::new(
            document,
            Box::new(WorkerSaveChannel::spawn(file_store)),
            clock,
            StoreOptions::from_config(&schedule.config),
        );
        store.subscribe(|event| log::debug!("store event: {:?}", event));

        Ok(Session {
            schedule,
            store,
            json,
            interactive,
        })
    }

    /// Wait for pending writes and surface a failed save as an error.
    fn finish(mut self) -> CmdResult {
        self.store.flush();
        if let SaveStatus::Error(message) = self.store.app_state().save_status {
            return Err(format!("save failed: {}", message).into());
        }
        Ok(())
    }

    fn cell_ref(&self, time: &str, employee: &str) -> Result<CellRef, String> {
        let config = &self.schedule.config;
        if !config.has_time_slot(time) {
            return Err(format!("unknown time slot \"{}\"", time));
        }
        if config.grid.employees.is_empty() {
            return Ok(CellRef::new(time, employee));
        }
        match config.resolve_employee(employee) {
            Some(e) => Ok(CellRef::new(time, e.id.clone())),
            None => Err(format!("unknown employee \"{}\"", employee)),
        }
    }

    fn execute(&mut self, cmd: Commands) -> CmdResult {
        match cmd {
            Commands::Show => self.show(),
            Commands::Cell(args) => self.cell(args),
            Commands::History(args) => self.history(args),
            Commands::Set(args) => self.set(args),
            Commands::Clear(args) => self.clear(args),
            Commands::Mv(args) => self.mv(args),
            Commands::Split(args) => {
                let cell = self.cell_ref(&args.time, &args.employee)?;
                self.store
                    .try_update_cell_state(&cell.time, &cell.employee, cell_ops::split)?;
                self.report("split", format!("split {}", cell), &[cell])
            }
            Commands::Merge(args) => {
                let cell = self.cell_ref(&args.time, &args.employee)?;
                self.store
                    .try_update_cell_state(&cell.time, &cell.employee, cell_ops::merge)?;
                self.report("merge", format!("merged {}", cell), &[cell])
            }
            Commands::Break(args) => {
                let cell = self.cell_ref(&args.time, &args.employee)?;
                self.store
                    .try_update_cell_state(&cell.time, &cell.employee, cell_ops::toggle_break)?;
                let message = if self.store.get_cell_state(&cell.time, &cell.employee).body.is_break() {
                    format!("{} is now a break", cell)
                } else {
                    format!("{} is no longer a break", cell)
                };
                self.report("break", message, &[cell])
            }
            Commands::Flag(args) => self.flag(args),
            Commands::Treatment(args) => self.treatment(args),
            Commands::EndDate(args) => cmd_end_date(args, self.json),
            Commands::Undo => {
                self.store.undo()?;
                self.report("undo", "undone".to_string(), &[])
            }
            Commands::Init(_) | Commands::Check | Commands::Batch(_) | Commands::Watch(_) => {
                Err("command cannot run inside a session".into())
            }
        }
    }

    /// Print the result of a write command
    fn report(&self, action: &str, message: String, cells: &[CellRef]) -> CmdResult {
        if self.json {
            let today = self.store.today();
            let cells = cells
                .iter()
                .map(|c| {
                    let cell = self.store.get_cell_state(&c.time, &c.employee);
                    cell_to_json(&cell, c, &self.schedule.config, today)
                })
                .collect();
            print_json(&ChangeJson {
                action: action.to_string(),
                message,
                cells,
            })
        } else {
            println!("{}", message);
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Read commands
    // -----------------------------------------------------------------------

    fn show(&self) -> CmdResult {
        let config = &self.schedule.config;
        let today = self.store.today();
        if self.json {
            let mut grid = grid_to_json(self.store.grid(), config, today);
            grid.status = Some(self.store.app_state());
            print_json(&grid)
        } else {
            print!("{}", render::render_grid(self.store.grid(), config, today));
            Ok(())
        }
    }

    fn cell(&self, args: CellArgs) -> CmdResult {
        let cell_ref = self.cell_ref(&args.time, &args.employee)?;
        let cell = self.store.get_cell_state(&cell_ref.time, &cell_ref.employee);
        let config = &self.schedule.config;
        let today = self.store.today();
        if self.json {
            print_json(&cell_to_json(&cell, &cell_ref, config, today))
        } else {
            print!("{}", render::render_cell(&cell, &cell_ref, config, today));
            Ok(())
        }
    }

    fn history(&self, args: CellArgs) -> CmdResult {
        let cell_ref = self.cell_ref(&args.time, &args.employee)?;
        let cell = self.store.get_cell_state(&cell_ref.time, &cell_ref.employee);
        if self.json {
            print_json(&history_to_json(&cell, &cell_ref))
        } else {
            print!("{}", render::render_history(&cell, &cell_ref, &self.schedule.config));
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Write commands
    // -----------------------------------------------------------------------

    fn set(&mut self, args: SetArgs) -> CmdResult {
        let cell = self.cell_ref(&args.time, &args.employee)?;
        let target = Endpoint {
            cell: cell.clone(),
            part: part_arg(args.part),
        };
        let policy = args.on_duplicate;
        let interactive = self.interactive && !self.json;
        let mut first_match: Option<Endpoint> = None;
        let outcome = duplicate::commit_text_edit(&mut self.store, &target, &args.text, |matches| {
            first_match = matches.first().map(|m| m.endpoint.clone());
            resolve_duplicate(matches, &args.text, policy, interactive)
        })?;

        match outcome {
            EditOutcome::Saved => self.report("set", format!("set {}", target), &[cell]),
            EditOutcome::Cleared => self.report("clear", format!("cleared {}", target), &[cell]),
            EditOutcome::Moved { from } => {
                let message = format!("moved {} to {}", from, target);
                self.report("move", message, &[from.cell, cell])
            }
            EditOutcome::AddedAnyway => {
                let message = match first_match {
                    Some(m) => format!("set {} (also booked at {})", target, m),
                    None => format!("set {}", target),
                };
                self.report("set", message, &[cell])
            }
            EditOutcome::Cancelled => {
                let message = match first_match {
                    Some(m) => format!(
                        "unchanged: \"{}\" is already booked at {} (use --on-duplicate move|add)",
                        args.text.trim(),
                        m
                    ),
                    None => "unchanged".to_string(),
                };
                self.report("cancel", message, &[])
            }
        }
    }

    fn clear(&mut self, args: ClearArgs) -> CmdResult {
        let cell = self.cell_ref(&args.time, &args.employee)?;
        let part = part_arg(args.part);
        let current = self.store.get_cell_state(&cell.time, &cell.employee);
        if current.body.is_split() && part.is_none() {
            return Err(cell_ops::CellOpError::PartNotChosen.into());
        }
        self.store
            .update_cell_state(&cell.time, &cell.employee, move |body| cell_ops::clear(body, part));
        let target = Endpoint { cell: cell.clone(), part };
        self.report("clear", format!("cleared {}", target), &[cell])
    }

    fn mv(&mut self, args: MvArgs) -> CmdResult {
        let source = Endpoint {
            cell: self.cell_ref(&args.from_time, &args.from_employee)?,
            part: part_arg(args.from_part),
        };
        let target = Endpoint {
            cell: self.cell_ref(&args.to_time, &args.to_employee)?,
            part: part_arg(args.to_part),
        };
        match move_ops::move_assignment(&mut self.store, &source, &target)? {
            MoveOutcome::Nothing => self.report("move", "nothing to move".to_string(), &[]),
            MoveOutcome::Moved {
                auto_split,
                source_merged,
            } => {
                let mut message = format!("moved {} to {}", source, target);
                if auto_split {
                    message.push_str(" (target split)");
                }
                if source_merged {
                    message.push_str(" (source merged)");
                }
                let mut cells = vec![source.cell.clone()];
                if target.cell != source.cell {
                    cells.push(target.cell.clone());
                }
                self.report("move", message, &cells)
            }
        }
    }

    fn flag(&mut self, args: FlagArgs) -> CmdResult {
        let cell = self.cell_ref(&args.time, &args.employee)?;
        let part = part_arg(args.part);
        let flag = args.flag.into();
        self.store
            .try_update_cell_state(&cell.time, &cell.employee, move |body| {
                cell_ops::toggle_flag(body, part, flag)
            })?;
        let target = Endpoint { cell: cell.clone(), part };
        self.report("flag", format!("toggled {:?} on {}", flag, target), &[cell])
    }

    fn treatment(&mut self, args: TreatmentArgs) -> CmdResult {
        let cell = self.cell_ref(&args.time, &args.employee)?;
        let part = part_arg(args.part);
        let start_date = match args.start.as_deref() {
            Some(s) => Some(parse_date(s).ok_or_else(|| format!("invalid date '{}'", s))?),
            None => None,
        };
        let update = TreatmentUpdate {
            start_date,
            extension_days: args.extend,
            additional_info: args.info,
        };
        let today = self.store.today();
        self.store
            .try_update_cell_state(&cell.time, &cell.employee, move |body| {
                cell_ops::set_treatment(body, part, update.clone(), today)
            })?;

        let stored = self.store.get_cell_state(&cell.time, &cell.employee);
        let end = cell_ops::target(&stored.body, part)
            .ok()
            .and_then(|a| a.treatment.as_ref())
            .map(|t| format_date(t.end_date))
            .unwrap_or_default();
        let target = Endpoint { cell: cell.clone(), part };
        self.report("treatment", format!("treatment for {} ends {}", target, end), &[cell])
    }
}

/// Decide what to do with text that is already booked elsewhere.
fn resolve_duplicate(
    matches: &[DuplicateMatch],
    text: &str,
    policy: Option<DuplicatePolicy>,
    interactive: bool,
) -> DuplicateChoice {
    match policy {
        Some(DuplicatePolicy::Move) => DuplicateChoice::Move,
        Some(DuplicatePolicy::Add) => DuplicateChoice::AddAnyway,
        Some(DuplicatePolicy::Cancel) => DuplicateChoice::Cancel,
        None if interactive => prompt_duplicate(matches, text),
        None => DuplicateChoice::Cancel,
    }
}

fn prompt_duplicate(matches: &[DuplicateMatch], text: &str) -> DuplicateChoice {
    let places: Vec<String> = matches.iter().map(|m| m.endpoint.to_string()).collect();
    eprintln!("\"{}\" is already booked at {}", text.trim(), places.join(", "));
    eprint!("[m]ove it here, [a]dd anyway, [c]ancel? ");
    let _ = std::io::stderr().flush();
    let mut input = String::new();
    if std::io::stdin().read_line(&mut input).is_err() {
        return DuplicateChoice::Cancel;
    }
    match input.trim().to_lowercase().as_str() {
        "m" | "move" => DuplicateChoice::Move,
        "a" | "add" => DuplicateChoice::AddAnyway,
        _ => DuplicateChoice::Cancel,
    }
}

// ---------------------------------------------------------------------------
// Standalone commands
// ---------------------------------------------------------------------------

fn cmd_end_date(args: EndDateArgs, json: bool) -> CmdResult {
    let start = parse_date(&args.start).ok_or_else(|| format!("invalid date '{}'", args.start))?;
    let end = calculate_end_date(start, args.extend);
    if json {
        print_json(&EndDateJson {
            start_date: start,
            extension_days: args.extend,
            end_date: end,
        })
    } else {
        println!("{}", format_date(end));
        Ok(())
    }
}

fn cmd_check(json: bool) -> CmdResult {
    let schedule = load_schedule_cwd()?;
    let result = match document_io::load_raw_document(&schedule.document_path()) {
        Ok(raw) => check::check_document(raw.as_ref(), &schedule.config),
        Err(DocumentError::ParseError { source, .. }) => CheckResult {
            errors: vec![CheckError::MalformedDocument {
                reason: source.to_string(),
            }],
            ..Default::default()
        },
        Err(e) => return Err(e.into()),
    };
    let recovery = read_recovery_entries(&schedule.schedule_dir);

    if json {
        return print_json(&result);
    }

    if !result.errors.is_empty() {
        println!("Errors:");
        for err in &result.errors {
            match err {
                CheckError::MalformedDocument { reason } => {
                    println!("  document is malformed: {}", reason);
                }
                CheckError::MalformedRow { time } => {
                    println!("  [{}] row is not an object", time);
                }
                CheckError::InvalidCell {
                    time,
                    employee,
                    problems,
                } => {
                    for problem in problems {
                        println!("  [{} {}] {}", time, employee, problem);
                    }
                }
            }
        }
    }
    if !result.warnings.is_empty() {
        if !result.errors.is_empty() {
            println!();
        }
        println!("Warnings:");
        for warn in &result.warnings {
            match warn {
                CheckWarning::NoDocument => println!("  no document saved yet"),
                CheckWarning::UnknownTimeSlot { time } => {
                    println!("  [{}] time slot not in schedule.toml", time);
                }
                CheckWarning::UnknownEmployee { time, employee } => {
                    println!("  [{} {}] employee not in schedule.toml", time, employee);
                }
                CheckWarning::DuplicateContent { content, places } => {
                    println!("  \"{}\" is booked {} times: {}", content, places.len(), places.join(", "));
                }
                CheckWarning::DocumentIdMismatch { expected, found } => {
                    println!("  document id is \"{}\", expected \"{}\"", found, expected);
                }
            }
        }
    }
    if !recovery.is_empty() {
        println!(
            "Note: {} entries in the recovery log (newest {})",
            recovery.len(),
            recovery[0].timestamp.format("%Y-%m-%d %H:%M")
        );
    }
    if result.valid {
        println!("✓ schedule is valid ({} cells)", result.cells_checked);
    } else {
        println!("✗ schedule has errors");
    }
    Ok(())
}

fn cmd_batch(args: BatchArgs, json: bool, today: Option<NaiveDate>) -> CmdResult {
    let input = match args.file {
        Some(path) => std::fs::read_to_string(&path).map_err(|e| format!("cannot read '{}': {}", path, e))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    // stdin may be the batch itself, so duplicates are never prompted for
    let mut session = Session::open(today, json, false)?;
    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let lineno = index + 1;
        let outcome = parse_batch_line(line).and_then(|cmd| session.execute(cmd));
        if let Err(e) = outcome {
            session.finish()?;
            return Err(format!("line {}: {}", lineno, e).into());
        }
    }
    session.finish()
}

fn parse_batch_line(line: &str) -> Result<Commands, Box<dyn Error>> {
    let words = split_command_line(line)?;
    let parsed = BatchLine::try_parse_from(words).map_err(|e| {
        e.to_string()
            .lines()
            .next()
            .unwrap_or_default()
            .trim_start_matches("error: ")
            .to_string()
    })?;
    match parsed.command {
        Commands::Init(_) => Err("init cannot run inside batch".into()),
        Commands::Check => Err("check cannot run inside batch".into()),
        Commands::Batch(_) => Err("batch cannot run inside batch".into()),
        Commands::Watch(_) => Err("watch cannot run inside batch".into()),
        cmd => Ok(cmd),
    }
}

fn cmd_watch(args: WatchArgs, json: bool, today: Option<NaiveDate>) -> CmdResult {
    let mut session = Session::open(today, json, false)?;
    let path = session.schedule.document_path();
    let watcher = DocumentWatcher::start(&path)?;
    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    if !json {
        eprintln!("watching {} (Ctrl-C to stop)", path.display());
    }

    loop {
        let timeout = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                (deadline - now).min(WATCH_POLL_INTERVAL)
            }
            None => WATCH_POLL_INTERVAL,
        };
        for event in watcher.wait(timeout) {
            match event {
                DocumentEvent::Changed(changed) => {
                    let mut file_store = FileDocumentStore::new(&session.schedule);
                    let applied = match file_store.load() {
                        Ok(Some(doc)) => session.store.apply_remote(doc),
                        Ok(None) => false,
                        Err(e) => {
                            log::warn!("could not read changed document: {}", e);
                            false
                        }
                    };
                    if json {
                        print_json(&WatchEventJson {
                            event: "changed".to_string(),
                            path: changed.display().to_string(),
                            applied,
                        })?;
                    } else if applied {
                        println!("-- document changed");
                        print!(
                            "{}",
                            render::render_grid(
                                session.store.grid(),
                                &session.schedule.config,
                                session.store.today()
                            )
                        );
                    }
                }
                DocumentEvent::Removed(removed) => {
                    if json {
                        print_json(&WatchEventJson {
                            event: "removed".to_string(),
                            path: removed.display().to_string(),
                            applied: false,
                        })?;
                    } else {
                        println!("-- document removed");
                    }
                }
            }
        }
    }
    session.finish()
}
