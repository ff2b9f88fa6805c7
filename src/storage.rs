//! Saved connections and the last session, kept as pretty JSON files in the
//! data directory.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::models::SavedConnection;

const CONNECTIONS_FILE: &str = "connections.json";
const SESSION_FILE: &str = "session.json";

/// Where the operator left off: restored on the next start.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Session {
    pub last_saved_connection_id: Option<String>,
    pub last_table: Option<String>,
    pub page_size: Option<u64>,
    pub search_term: Option<String>,
}

/// `Ok(None)` when the file does not exist yet.
fn read_file(data_dir: &Path, name: &str) -> Result<Option<String>, String> {
    let path = data_dir.join(name);
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(&path)
        .map(Some)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))
}

fn write_json<T: Serialize + ?Sized>(data_dir: &Path, name: &str, value: &T) -> Result<(), String> {
    fs::create_dir_all(data_dir).map_err(|e| e.to_string())?;
    let content = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    let path = data_dir.join(name);
    fs::write(&path, content).map_err(|e| format!("cannot write {}: {}", path.display(), e))
}

fn parse<T: DeserializeOwned>(name: &str, content: &str) -> Result<T, String> {
    serde_json::from_str(content).map_err(|e| format!("{} is not valid: {}", name, e))
}

pub fn load_connections(data_dir: &Path) -> Result<Vec<SavedConnection>, String> {
    match read_file(data_dir, CONNECTIONS_FILE)? {
        Some(content) => parse(CONNECTIONS_FILE, &content),
        None => Ok(Vec::new()),
    }
}

/// Stores `connection`, overwriting an entry with the same id in place.
pub fn add_connection(data_dir: &Path, connection: SavedConnection) -> Result<(), String> {
    let mut connections = load_connections(data_dir)?;
    match connections.iter_mut().find(|c| c.id == connection.id) {
        Some(existing) => *existing = connection,
        None => connections.push(connection),
    }
    write_json(data_dir, CONNECTIONS_FILE, &connections)
}

/// Removes the connection and forgets it as the last used one.
pub fn delete_connection(data_dir: &Path, id: &str) -> Result<(), String> {
    let mut connections = load_connections(data_dir)?;
    connections.retain(|c| c.id != id);
    write_json(data_dir, CONNECTIONS_FILE, &connections)?;

    let mut session = load_session(data_dir)?;
    if session.last_saved_connection_id.as_deref() == Some(id) {
        session.last_saved_connection_id = None;
        save_session(data_dir, &session)?;
    }
    Ok(())
}

/// An unreadable session file is logged and replaced by an empty session.
pub fn load_session(data_dir: &Path) -> Result<Session, String> {
    let Some(content) = read_file(data_dir, SESSION_FILE)? else {
        return Ok(Session::default());
    };
    Ok(parse(SESSION_FILE, &content).unwrap_or_else(|e: String| {
        tracing::warn!(error = %e, "ignoring saved session");
        Session::default()
    }))
}

pub fn save_session(data_dir: &Path, session: &Session) -> Result<(), String> {
    write_json(data_dir, SESSION_FILE, session)
}
