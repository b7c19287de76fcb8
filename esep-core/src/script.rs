//! The experiment script: phases of numbered lines, loaded once at startup.
//!
//! Input is a delimited table with the columns
//! `Phase;Phase description;Line;Script;Motion`. Rows may arrive in any
//! order; phases and lines are sorted by number on load. Motion is a
//! non-negative gesture code or blank.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use esep_io::Cue;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::ScriptError;

pub const COL_PHASE: &str = "Phase";
pub const COL_DESCRIPTION: &str = "Phase description";
pub const COL_LINE: &str = "Line";
pub const COL_SCRIPT: &str = "Script";
pub const COL_MOTION: &str = "Motion";

pub const REQUIRED_COLUMNS: [&str; 5] =
    [COL_PHASE, COL_DESCRIPTION, COL_LINE, COL_SCRIPT, COL_MOTION];

// ════════════════════════════════════════════════════════════════════
// Data types
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: i64,
    pub text: String,
    pub motion: Option<u32>,
}

impl Line {
    pub fn new(number: i64, text: &str, motion: Option<u32>) -> Self {
        Self {
            number,
            text: text.to_string(),
            motion,
        }
    }

    pub fn cue(&self) -> Cue<'_> {
        Cue::new(&self.text, self.motion)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub number: i64,
    pub description: String,
    pub lines: Vec<Line>,
}

impl Phase {
    pub fn new(number: i64, description: &str, lines: Vec<Line>) -> Self {
        Self {
            number,
            description: description.to_string(),
            lines,
        }
    }
}

/// Index pair into a `Script`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    pub phase: usize,
    pub line: usize,
}

impl Position {
    pub const START: Position = Position { phase: 0, line: 0 };

    pub fn new(phase: usize, line: usize) -> Self {
        Self { phase, line }
    }
}

/// An ordered, non-empty list of phases, each with at least one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    phases: Vec<Phase>,
}

impl Script {
    pub fn new(phases: Vec<Phase>) -> Result<Self, ScriptError> {
        if phases.is_empty() || phases.iter().any(|p| p.lines.is_empty()) {
            return Err(ScriptError::Empty);
        }
        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phase_numbers(&self) -> Vec<i64> {
        self.phases.iter().map(|p| p.number).collect()
    }

    pub fn total_lines(&self) -> usize {
        self.phases.iter().map(|p| p.lines.len()).sum()
    }

    pub fn get(&self, pos: Position) -> Option<(&Phase, &Line)> {
        let phase = self.phases.get(pos.phase)?;
        let line = phase.lines.get(pos.line)?;
        Some((phase, line))
    }

    // ────────────────────────────────────────────────────────────────
    // Navigation
    // ────────────────────────────────────────────────────────────────

    /// The position after `pos`, crossing into the next phase when needed.
    /// `None` once the last line of the last phase has been passed.
    pub fn next_position(&self, pos: Position) -> Option<Position> {
        let phase = self.phases.get(pos.phase)?;
        if pos.line + 1 < phase.lines.len() {
            return Some(Position::new(pos.phase, pos.line + 1));
        }
        if pos.phase + 1 < self.phases.len() {
            return Some(Position::new(pos.phase + 1, 0));
        }
        None
    }

    /// The position before `pos`, falling back to the last line of the
    /// previous phase. `None` at the very start.
    pub fn prev_position(&self, pos: Position) -> Option<Position> {
        if pos.line > 0 {
            return Some(Position::new(pos.phase, pos.line - 1));
        }
        if pos.phase == 0 {
            return None;
        }
        let prev = pos.phase - 1;
        let last = self.phases.get(prev)?.lines.len().checked_sub(1)?;
        Some(Position::new(prev, last))
    }

    // ────────────────────────────────────────────────────────────────
    // Randomization
    // ────────────────────────────────────────────────────────────────

    /// Shuffle every phase except the first and the last.
    pub fn randomize_middle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let n = self.phases.len();
        if n <= 2 {
            return;
        }
        self.phases[1..n - 1].shuffle(rng);
        tracing::info!("Phase order randomized: {:?}", self.phase_numbers());
    }
}

// ════════════════════════════════════════════════════════════════════
// Loading
// ════════════════════════════════════════════════════════════════════

/// Load and validate a script file.
pub fn load_script<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Script, ScriptError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let script = parse_script(file, delimiter)?;
    tracing::info!(
        "Loaded script {}: {} phases, {} lines",
        path.display(),
        script.phases.len(),
        script.total_lines()
    );
    Ok(script)
}

/// Parse a script from any reader.
pub fn parse_script<R: Read>(reader: R, delimiter: u8) -> Result<Script, ScriptError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|&&name| column(name).is_none())
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ScriptError::MissingColumns(missing));
    }

    let idx = |name: &str| column(name).unwrap_or_default();
    let (i_phase, i_desc, i_line, i_text, i_motion) = (
        idx(COL_PHASE),
        idx(COL_DESCRIPTION),
        idx(COL_LINE),
        idx(COL_SCRIPT),
        idx(COL_MOTION),
    );

    let mut phases: BTreeMap<i64, Phase> = BTreeMap::new();

    for record in rdr.records() {
        let record = record?;
        let row = record.position().map(|p| p.line() as usize).unwrap_or(0);

        if record.iter().all(|f| f.trim().is_empty()) {
            tracing::debug!("Skipping blank script row {}", row);
            continue;
        }

        let field = |i: usize| record.get(i).unwrap_or("");
        let phase_no = parse_int(field(i_phase), row, COL_PHASE)?;
        let line_no = parse_int(field(i_line), row, COL_LINE)?;
        let motion = parse_motion(field(i_motion), row);

        let phase = phases
            .entry(phase_no)
            .or_insert_with(|| Phase::new(phase_no, field(i_desc), Vec::new()));
        phase.lines.push(Line::new(line_no, field(i_text), motion));
    }

    let mut ordered = Vec::with_capacity(phases.len());
    for (number, mut phase) in phases {
        phase.lines.sort_by_key(|l| l.number);
        if let Some(w) = phase.lines.windows(2).find(|w| w[0].number == w[1].number) {
            return Err(ScriptError::DuplicateLine {
                phase: number,
                line: w[0].number,
            });
        }
        ordered.push(phase);
    }

    Script::new(ordered)
}

fn parse_int(value: &str, row: usize, column: &'static str) -> Result<i64, ScriptError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| ScriptError::InvalidNumber {
            row,
            column,
            value: value.to_string(),
        })
}

/// Digits only; anything else means "no motion".
fn parse_motion(value: &str, row: usize) -> Option<u32> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit())
        && let Ok(code) = trimmed.parse::<u32>()
    {
        return Some(code);
    }
    tracing::warn!("Row {}: ignoring motion value {:?}", row, value);
    None
}
