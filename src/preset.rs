//! Named effect presets.
//!
//! A preset bundles the four user controls so they can be applied in one
//! step. The table is plain data: lookups never touch the engine.

use serde::{Deserialize, Serialize};

// ── Preset ──────────────────────────────────────────────────

/// One immutable bundle of control values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    /// Playback rate (1.0 = original speed).
    #[serde(alias = "speed")]
    pub rate: f64,
    #[serde(alias = "reverb")]
    pub reverb_percent: f64,
    #[serde(alias = "rain", alias = "ambience")]
    pub ambience_percent: f64,
    #[serde(alias = "volume")]
    pub volume_percent: f64,
}

impl Preset {
    pub const fn new(rate: f64, reverb: f64, ambience: f64, volume: f64) -> Self {
        Preset {
            rate,
            reverb_percent: reverb,
            ambience_percent: ambience,
            volume_percent: volume,
        }
    }
}

const BUILTIN: [(&str, Preset); 5] = [
    ("chill", Preset::new(0.85, 35.0, 25.0, 60.0)),
    ("study", Preset::new(0.7, 50.0, 40.0, 45.0)),
    ("sleep", Preset::new(0.6, 70.0, 60.0, 30.0)),
    ("dramatic", Preset::new(0.5, 85.0, 80.0, 75.0)),
    ("reset", Preset::new(1.0, 0.0, 0.0, 70.0)),
];

// ── Preset Table ────────────────────────────────────────────

/// Name to preset lookup, keeping insertion order for listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetTable {
    entries: Vec<(String, Preset)>,
}

impl PresetTable {
    /// An empty table.
    pub fn new() -> Self {
        PresetTable {
            entries: Vec::new(),
        }
    }

    /// The shipped presets: chill, study, sleep, dramatic and reset.
    pub fn builtin() -> Self {
        PresetTable {
            entries: BUILTIN
                .iter()
                .map(|(name, preset)| (name.to_string(), *preset))
                .collect(),
        }
    }

    /// Parse a JSON object of `name -> preset`.
    ///
    /// Both the camelCase field names and the short `speed`/`reverb`/`rain`/
    /// `volume` spelling are accepted.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut table = PresetTable::new();
        for (name, value) in map {
            table.insert(name, serde_json::from_value(value)?);
        }
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, preset)| preset)
    }

    /// Add or replace a preset. Replacing keeps its listing position.
    pub fn insert(&mut self, name: impl Into<String>, preset: Preset) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = preset,
            None => self.entries.push((name, preset)),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PresetTable {
    fn default() -> Self {
        Self::builtin()
    }
}
