use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Placeholder rendered into the prompt when the glossary is empty
pub const EMPTY_GLOSSARY_FRAGMENT: &str = "No terms yet.";

/// Built-in mine-action terminology seeded at startup
pub const DEFAULT_TERMS: &[(&str, &str)] = &[
    ("Unexploded Ordnance", "ລະເບີດທີ່ຍັງບໍ່ທັນແຕກ"),
    ("UXO", "ລບຕ"),
    ("Cluster Munition", "ລະເບີດລູກຫວ່ານ"),
    ("Bombies", "ບອມບີ"),
    ("Explosive Remnants of War", "ລະເບີດຕົກຄ້າງຈາກປາງສົງຄາມ"),
    ("ERW", "ລະເບີດຕົກຄ້າງຈາກປາງສົງຄາມ"),
    ("Non-Technical Survey", "ການສຳຫຼວດນອກຫຼັກວິຊາການ"),
    ("Technical Survey", "ການສຳຫຼວດຕາມຫຼັກວິຊາການ"),
    ("Clearance", "ການກວດກູ້"),
    ("Battle Area Clearance", "ການກວດກູ້ພື້ນທີ່"),
    ("Victim Assistance", "ການຊ່ວຍເຫຼືອຜູ້ເຄາະຮ້າຍ"),
    ("Risk Education", "ການໂຄສະນາສຶກສາຄວາມສ່ຽງໄພ"),
    ("Mine Risk Education", "ການໂຄສະນາສຶກສາຄວາມສ່ຽງໄພຈາກລະເບີດ"),
    ("MRE", "ການໂຄສະນາສຶກສາຄວາມສ່ຽງໄພຈາກລະເບີດ"),
    ("Deminer", "ນັກເກັບກູ້"),
    ("EOD", "ການທຳລາຍລະເບີດ"),
    ("Explosive Ordnance Disposal", "ການທຳລາຍລະເບີດ"),
    ("Land Release", "ການປົດປ່ອຍພື້ນທີ່"),
    ("Quality Assurance", "ການຮັບປະກັນຄຸນນະພາບ"),
    ("QA", "ການຮັບປະກັນຄຸນນະພາບ"),
    ("Quality Control", "ການຄວບຄຸມຄຸນນະພາບ"),
    ("QC", "ການຄວບຄຸມຄຸນນະພາບ"),
    ("Confirmed Hazardous Area", "ພື້ນທີ່ຢັ້ງຢືນວ່າເປັນອັນຕະລາຍ"),
    ("CHA", "ພື້ນທີ່ຢັ້ງຢືນວ່າເປັນອັນຕະລາຍ"),
    ("Suspected Hazardous Area", "ພື້ນທີ່ສົງໃສວ່າເປັນອັນຕະລາຍ"),
    ("SHA", "ພື້ນທີ່ສົງໃສວ່າເປັນອັນຕະລາຍ"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub english: String,
    pub lao: String,
}

/// Durable English → Lao term mapping backed by SQLite.
///
/// Clones share the same connection. Every operation is a single statement
/// in autocommit mode, so a write is on disk before the call returns.
#[derive(Clone)]
pub struct GlossaryStore {
    conn: Arc<Mutex<Connection>>,
}

impl GlossaryStore {
    /// Open (or create) the glossary database at `database_path`
    pub fn open(database_path: &str) -> Result<Self> {
        let conn = Connection::open(database_path)
            .context(format!("Failed to open glossary database at {}", database_path))?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory glossary
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory glossary")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS glossary (
                english TEXT NOT NULL,
                lao TEXT NOT NULL,
                PRIMARY KEY (english, lao)
            )",
            [],
        )
        .context("Failed to create glossary table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Glossary connection lock poisoned"))
    }

    /// Insert every default pair that is not already stored.
    /// Returns how many rows were newly added.
    pub fn seed(&self, defaults: &[(&str, &str)]) -> Result<usize> {
        let mut added = 0;
        for (english, lao) in defaults {
            if self.insert(english, lao)? {
                added += 1;
            }
        }
        info!(
            "Glossary seeded: {} new of {} default terms",
            added,
            defaults.len()
        );
        Ok(added)
    }

    /// Teach a term. Returns `true` if a new row was stored, `false` if the
    /// input was blank or the exact pair already exists.
    ///
    /// The English side is trimmed and lower-cased; the Lao side is only trimmed.
    /// A new translation for an already-known English term is appended next to
    /// the existing one(s) rather than replacing them.
    pub fn insert(&self, english: &str, lao: &str) -> Result<bool> {
        let english = normalize_english(english);
        let lao = lao.trim();
        if english.is_empty() || lao.is_empty() {
            debug!("Ignoring glossary insert with blank term");
            return Ok(false);
        }

        let conn = self.conn()?;
        let rows_affected = conn
            .execute(
                "INSERT OR IGNORE INTO glossary (english, lao) VALUES (?1, ?2)",
                params![english, lao],
            )
            .context("Failed to insert glossary term")?;

        if rows_affected == 0 {
            return Ok(false);
        }

        let others = Self::lookup_with(&conn, &english)?
            .into_iter()
            .filter(|existing| existing != lao)
            .collect::<Vec<_>>();
        if !others.is_empty() {
            warn!(
                "Glossary term '{}' now has conflicting translations: '{}' and {:?}",
                english, lao, others
            );
        }

        Ok(true)
    }

    /// All stored entries, ordered alphabetically by English term then Lao
    pub fn list_all(&self) -> Result<Vec<GlossaryEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT english, lao FROM glossary ORDER BY english, lao")?;

        let entries = stmt
            .query_map([], |row| {
                Ok(GlossaryEntry {
                    english: row.get(0)?,
                    lao: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read glossary")?;

        Ok(entries)
    }

    /// Number of distinct (english, lao) pairs
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM glossary", [], |row| row.get(0))
            .context("Failed to count glossary terms")?;
        Ok(count as usize)
    }

    /// Every Lao rendering stored for `english` (case-insensitive)
    pub fn lookup(&self, english: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        Self::lookup_with(&conn, &normalize_english(english))
    }

    fn lookup_with(conn: &Connection, english: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT lao FROM glossary WHERE english = ?1 ORDER BY lao")?;
        let translations = stmt
            .query_map(params![english], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to look up glossary term")?;
        Ok(translations)
    }

    /// Render the glossary as the bullet list injected into translation prompts
    pub fn render_as_prompt_fragment(&self) -> Result<String> {
        Ok(render_entries(&self.list_all()?))
    }
}

fn normalize_english(english: &str) -> String {
    english.trim().to_lowercase()
}

/// `• <Capitalized english> → <lao>` per entry, or the empty placeholder
pub fn render_entries(entries: &[GlossaryEntry]) -> String {
    if entries.is_empty() {
        return EMPTY_GLOSSARY_FRAGMENT.to_string();
    }

    entries
        .iter()
        .map(|e| format!("• {} → {}", capitalize(&e.english), e.lao))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First character upper-cased, the rest lower-cased
fn capitalize(term: &str) -> String {
    let mut chars = term.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
