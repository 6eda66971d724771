use std::collections::HashSet;

use crate::cli::commands::InitArgs;
use crate::io::config_io::{CONFIG_FILE, create_schedule};
use crate::io::document_io::{SCHEDULE_DIR, discover_schedule};
use crate::model::config::{EmployeeConfig, ScheduleConfig};

/// Validate that an employee id is a single word usable on the command line.
fn validate_employee_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("employee id cannot be empty".to_string());
    }
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(format!(
            "invalid employee id \"{}\": use letters, digits, '-' or '_'",
            id
        ));
    }
    Ok(())
}

/// Infer a schedule name from a directory name: replace hyphens with spaces, title-case.
fn infer_name(dir_name: &str) -> String {
    dir_name
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => {
                    let upper: String = c.to_uppercase().collect();
                    upper + chars.as_str()
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse --employee pairs from the flat Vec<String> produced by clap.
/// Each pair is (id, name).
fn parse_employee_pairs(args: &[String]) -> Vec<(&str, &str)> {
    args.chunks(2)
        .filter_map(|chunk| match chunk {
            [id, name] => Some((id.as_str(), name.as_str())),
            _ => None,
        })
        .collect()
}

/// Trim slot labels, dropping blanks; a label may appear once.
fn parse_slots(args: &[String]) -> Result<Vec<String>, String> {
    let mut seen = HashSet::new();
    let mut slots = Vec::new();
    for slot in args.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if !seen.insert(slot) {
            return Err(format!("duplicate time slot \"{}\"", slot));
        }
        slots.push(slot.to_string());
    }
    Ok(slots)
}

pub fn cmd_init(args: InitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cwd = super::working_dir()?;
    let schedule_dir = cwd.join(SCHEDULE_DIR);

    // Check if already initialized
    if schedule_dir.join(CONFIG_FILE).is_file() {
        return Err("schedule already exists in ./schedule/".into());
    }

    // Check for parent schedule and warn
    if let Some(parent) = cwd.parent()
        && let Ok(parent_root) = discover_schedule(parent)
    {
        eprintln!(
            "Note: parent schedule found at {}/",
            parent_root.join(SCHEDULE_DIR).display()
        );
        eprintln!("Creating new schedule in ./schedule/");
    }

    let employee_pairs = parse_employee_pairs(&args.employee);
    let mut seen_ids = HashSet::new();
    for (id, _) in &employee_pairs {
        validate_employee_id(id)?;
        if !seen_ids.insert(*id) {
            return Err(format!("duplicate employee id \"{}\"", id).into());
        }
    }
    let slots = parse_slots(&args.slots)?;

    let name = args.name.unwrap_or_else(|| {
        cwd.file_name()
            .and_then(|n| n.to_str())
            .map(infer_name)
            .unwrap_or_else(|| "Untitled".to_string())
    });

    let mut config = ScheduleConfig::named(name.clone());
    config.grid.time_slots = slots;
    config.grid.employees = employee_pairs
        .iter()
        .map(|(id, ename)| EmployeeConfig {
            id: id.to_string(),
            name: ename.to_string(),
        })
        .collect();
    if let Some(author) = args.author {
        config.schedule.author_id = author;
    }
    create_schedule(&cwd, &config)?;

    // Print summary
    println!("Initialized schedule: {}", name);
    for employee in &config.grid.employees {
        println!("  employee: {} ({})", employee.name, employee.id);
    }
    if !config.grid.time_slots.is_empty() {
        println!("  time slots: {}", config.grid.time_slots.join(", "));
    }

    Ok(())
}
