use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::RngExt;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::ClientError;

/// Fixed assignment order for staff colors.
pub const PALETTE: [&str; 20] = [
    "#4E79A7", "#F28E2B", "#E15759", "#76B7B2", "#59A14F", "#EDC948", "#B07AA1", "#FF9DA7",
    "#9C755F", "#BAB0AC", "#1F77B4", "#FF7F0E", "#2CA02C", "#D62728", "#9467BD", "#8C564B",
    "#E377C2", "#17BECF", "#BCBD22", "#7F7F7F",
];

/// Staff id → color map, persisted in the local store.
///
/// Ids get the next unused palette entry on first sight; once the palette is
/// exhausted a random entry is reused. Assignments are never evicted.
pub struct StaffColorMap {
    store: Arc<Mutex<Connection>>,
    assigned: Mutex<HashMap<String, String>>,
}

impl StaffColorMap {
    pub fn load(store: Arc<Mutex<Connection>>) -> Result<Self, ClientError> {
        let existing = {
            let conn = store.lock().unwrap_or_else(|e| e.into_inner());
            queries::list_staff_colors(&conn)?
        };
        Ok(Self {
            store,
            assigned: Mutex::new(existing.into_iter().collect()),
        })
    }

    pub fn color_for(&self, staff_id: &str) -> String {
        let mut assigned = self.assigned.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(color) = assigned.get(staff_id) {
            return color.clone();
        }

        let color = next_color(assigned.values().map(String::as_str));
        assigned.insert(staff_id.to_string(), color.clone());

        let conn = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = queries::insert_staff_color(&conn, staff_id, &color) {
            tracing::warn!(error = %e, staff_id, "failed to persist staff color");
        }
        color
    }

    pub fn len(&self) -> usize {
        self.assigned.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every assignment, in memory and in the store.
    pub fn reset(&self) -> Result<(), ClientError> {
        let mut assigned = self.assigned.lock().unwrap_or_else(|e| e.into_inner());
        let conn = self.store.lock().unwrap_or_else(|e| e.into_inner());
        queries::clear_staff_colors(&conn)?;
        assigned.clear();
        Ok(())
    }
}

fn next_color<'a>(used: impl Iterator<Item = &'a str>) -> String {
    let used: Vec<&str> = used.collect();
    match PALETTE.iter().find(|c| !used.contains(*c)) {
        Some(color) => color.to_string(),
        None => {
            let mut rng = rand::rng();
            PALETTE[rng.random_range(0..PALETTE.len())].to_string()
        }
    }
}
