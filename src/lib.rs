pub mod model;

use chrono::Utc;
use rand::prelude::*;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{ClusteringReport, DepartmentCluster, Event, Guest, Table};

/// Minimum number of same-department guests at one table for the pairing to
/// count as a cluster.
pub const CLUSTERING_THRESHOLD: usize = 3;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested table size is not a positive integer. Fatal to the
    /// call; no partial output is produced.
    #[error("table size must be positive, got {table_size}")]
    InvalidConfiguration { table_size: i32 },
    /// A check-in token matched no guest at this event.
    #[error("no guest matches the provided check-in token")]
    UnknownToken,
}

/// Source of opaque check-in tokens. The engine draws one token per table
/// and one per guest on every assignment run; the only requirement is that
/// tokens from a single source never collide within a run.
pub trait TokenSource {
    fn next_token(&mut self) -> String;
}

/// Production token source backed by random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidTokens;

impl TokenSource for UuidTokens {
    fn next_token(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Returns a new vector with the same elements in a uniformly random
/// permutation, leaving the input untouched. Shuffle order decides which
/// guests win contested table slots downstream, so the permutation must be
/// unbiased (Fisher-Yates, as implemented by `rand`).
pub fn shuffle<T: Clone, R: Rng + ?Sized>(rng: &mut R, items: &[T]) -> Vec<T> {
    let mut shuffled = items.to_vec();
    shuffled.shuffle(rng);
    shuffled
}

/// Buckets guests by normalized department, shuffling within each bucket,
/// and returns the buckets ordered largest first along with the shuffled
/// list of guests that have no department.
///
/// Shuffling inside each bucket avoids the bias where guests entered first
/// (say, the first rows of an import) always land on table 1. Largest
/// department first gives the allocator the most freedom while all tables
/// are still empty; ties between equal-sized departments fall back to the
/// department key so a seeded run reproduces exactly.
pub fn group_by_department<R: Rng + ?Sized>(
    rng: &mut R,
    guests: &[Guest],
) -> (Vec<(String, Vec<Guest>)>, Vec<Guest>) {
    // BTreeMap keeps bucket iteration order independent of insertion order,
    // which keeps RNG consumption reproducible for a fixed seed.
    let mut by_department: BTreeMap<String, Vec<Guest>> = BTreeMap::new();
    let mut no_department: Vec<Guest> = Vec::new();
    for guest in guests {
        match guest.normalized_department() {
            Some(department) => by_department
                .entry(department.to_string())
                .or_default()
                .push(guest.clone()),
            None => no_department.push(guest.clone()),
        }
    }

    let mut groups: Vec<(String, Vec<Guest>)> = by_department
        .into_iter()
        .map(|(department, members)| {
            let members = shuffle(rng, &members);
            (department, members)
        })
        .collect();
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));

    let no_department = shuffle(rng, &no_department);

    (groups, no_department)
}

/// Number of guests at `table` whose normalized department equals
/// `department`.
fn department_count(table: &Table, department: &str) -> usize {
    table
        .guests
        .iter()
        .filter(|guest| guest.normalized_department() == Some(department))
        .count()
}

/// Stamps the guest with the table's number and a fresh check-in token, and
/// seats them at the table.
fn seat_guest<T: TokenSource + ?Sized>(table: &mut Table, mut guest: Guest, tokens: &mut T) {
    guest.table_number = Some(table.table_number);
    guest.check_in_id = Some(tokens.next_token());
    table.guests.push(guest);
}

/// Greedily places guests into `ceil(total / table_size)` tables, spreading
/// each department as thinly as possible.
///
/// `ordered_groups` must already be shuffled within each group and ordered
/// largest department first (see [`group_by_department`]); `no_department`
/// guests are placed last, ranked purely by table occupancy. Tables that end
/// up empty are dropped from the result without renumbering the rest.
///
/// Returns the flattened, fully annotated guest list alongside the kept
/// tables. Fails with [`EngineError::InvalidConfiguration`] when
/// `table_size` is not positive; an empty guest list is not an error and
/// yields empty outputs.
pub fn allocate<T: TokenSource + ?Sized>(
    tokens: &mut T,
    ordered_groups: Vec<(String, Vec<Guest>)>,
    no_department: Vec<Guest>,
    table_size: i32,
) -> Result<(Vec<Guest>, Vec<Table>), EngineError> {
    if table_size <= 0 {
        return Err(EngineError::InvalidConfiguration { table_size });
    }

    let total: usize = ordered_groups
        .iter()
        .map(|(_, members)| members.len())
        .sum::<usize>()
        + no_department.len();
    if total == 0 {
        return Ok((Vec::new(), Vec::new()));
    }

    let size = table_size as usize;
    let table_count = total.div_ceil(size);
    let mut tables: Vec<Table> = (1..=table_count as u32)
        .map(|table_number| Table {
            table_number,
            check_in_id: tokens.next_token(),
            guests: Vec::new(),
        })
        .collect();

    // Department guests first. Rank available tables by how many guests from
    // this department they already hold, then by total occupancy, then by
    // table number so ties resolve deterministically.
    for (department, members) in ordered_groups {
        for guest in members {
            let slot = tables
                .iter_mut()
                .filter(|table| table.guests.len() < size)
                .min_by_key(|table| {
                    (
                        department_count(table, &department),
                        table.guests.len(),
                        table.table_number,
                    )
                });
            match slot {
                Some(table) => seat_guest(table, guest, tokens),
                None => {
                    // Unreachable when table_count covers every guest; never
                    // drop a guest without a trace.
                    tracing::error!(
                        guest_id = guest.id,
                        "no table with free capacity, guest left unassigned"
                    );
                    debug_assert!(false, "table count should cover every guest");
                }
            }
        }
    }

    // No-department guests fill remaining seats, ranked by occupancy alone.
    for guest in no_department {
        let slot = tables
            .iter_mut()
            .filter(|table| table.guests.len() < size)
            .min_by_key(|table| (table.guests.len(), table.table_number));
        match slot {
            Some(table) => seat_guest(table, guest, tokens),
            None => {
                tracing::error!(
                    guest_id = guest.id,
                    "no table with free capacity, guest left unassigned"
                );
                debug_assert!(false, "table count should cover every guest");
            }
        }
    }

    // Drop any table that stayed empty, keeping the numbers the survivors
    // were assigned. Downstream consumers rely on table numbers being
    // stable, so the kept set is never renumbered.
    tables.retain(|table| !table.guests.is_empty());

    let assigned: Vec<Guest> = tables
        .iter()
        .flat_map(|table| table.guests.iter().cloned())
        .collect();

    Ok((assigned, tables))
}

/// Runs a full assignment: shuffle and bucket the guests, then allocate
/// them into tables of up to `table_size`. Each call produces a fresh
/// random partition; re-running is how an organizer asks for a reshuffle.
pub fn assign_tables<R: Rng + ?Sized, T: TokenSource + ?Sized>(
    rng: &mut R,
    tokens: &mut T,
    guests: &[Guest],
    table_size: i32,
) -> Result<(Vec<Guest>, Vec<Table>), EngineError> {
    let (groups, no_department) = group_by_department(rng, guests);
    allocate(tokens, groups, no_department, table_size)
}

/// Assigns tables for the whole event in place, using the thread RNG and
/// UUID check-in tokens. Convenience entry point for production callers;
/// tests should drive [`assign_tables`] with a seeded RNG instead.
pub fn assign_event(event: &mut Event, table_size: i32) -> Result<(), EngineError> {
    let mut rng = rand::rng();
    let (guests, tables) = assign_tables(&mut rng, &mut UuidTokens, &event.guests, table_size)?;
    tracing::debug!(
        guests = guests.len(),
        tables = tables.len(),
        table_size,
        "assigned tables"
    );
    event.guests = guests;
    event.tables = tables;
    event.is_assigned = true;
    Ok(())
}

/// Checks a single table for department clustering: any normalized
/// department with [`CLUSTERING_THRESHOLD`] or more guests at the table is
/// reported. Guests without a department never cluster. Read-only and
/// advisory; the assignment itself is never blocked or changed.
pub fn detect_clustering(table: &Table) -> ClusteringReport {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for guest in &table.guests {
        if let Some(department) = guest.normalized_department() {
            *counts.entry(department).or_insert(0) += 1;
        }
    }

    let clusters: Vec<DepartmentCluster> = counts
        .into_iter()
        .filter(|&(_, count)| count >= CLUSTERING_THRESHOLD)
        .map(|(department, count)| DepartmentCluster {
            department: department.to_string(),
            count,
        })
        .collect();

    ClusteringReport {
        has_clustering: !clusters.is_empty(),
        clusters,
    }
}

/// Returns a copy of the event with every seating assignment stripped:
/// guests lose `table_number` and `check_in_id`, the table list is emptied,
/// and `is_assigned` is cleared. Check-in state (`checked_in`,
/// `checked_in_at`) is owned by the check-in workflow and survives a reset.
/// Idempotent.
pub fn reset_assignments(event: &Event) -> Event {
    let guests = event
        .guests
        .iter()
        .map(|guest| {
            let mut guest = guest.clone();
            guest.table_number = None;
            guest.check_in_id = None;
            guest
        })
        .collect();

    Event {
        guests,
        tables: Vec::new(),
        is_assigned: false,
    }
}

/// Finds the guest holding the given check-in token, if any.
pub fn find_guest_by_token<'a>(event: &'a Event, token: &str) -> Option<&'a Guest> {
    event
        .guests
        .iter()
        .find(|guest| guest.check_in_id.as_deref() == Some(token))
}

/// Finds the table holding the given check-in token, if any.
pub fn find_table_by_token<'a>(event: &'a Event, token: &str) -> Option<&'a Table> {
    event
        .tables
        .iter()
        .find(|table| table.check_in_id == token)
}

/// Marks the guest holding the given check-in token as checked in, stamping
/// the check-in time. The guest's copy seated at a table is updated to
/// match. Errors with [`EngineError::UnknownToken`] if no guest holds the
/// token.
pub fn check_in_guest<'a>(event: &'a mut Event, token: &str) -> Result<&'a Guest, EngineError> {
    // Resolve the guest in the flat list before touching anything, so an
    // unknown token leaves both views of the event unchanged.
    let position = event
        .guests
        .iter()
        .position(|guest| guest.check_in_id.as_deref() == Some(token))
        .ok_or(EngineError::UnknownToken)?;
    let now = Utc::now().naive_utc();

    // Update the seated copy so both views of the guest agree.
    for table in &mut event.tables {
        if let Some(seated) = table
            .guests
            .iter_mut()
            .find(|guest| guest.check_in_id.as_deref() == Some(token))
        {
            seated.checked_in = true;
            seated.checked_in_at = Some(now);
        }
    }

    let guest = &mut event.guests[position];
    guest.checked_in = true;
    guest.checked_in_at = Some(now);
    Ok(guest)
}
