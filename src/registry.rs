use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

pub type TeamId = u32;
pub type PlayerId = u32;
pub type CoachId = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamEntry {
    pub id: TeamId,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Canonical team-name resolution. Built once from explicit configuration and
/// immutable afterwards: the alias -> id mapping is a total, deterministic
/// function over the known aliases, and an unknown alias is a hard error. A
/// silent new id for a misspelled club would split one team's history in two
/// and corrupt every rolling aggregate downstream.
#[derive(Debug, Clone)]
pub struct TeamDirectory {
    by_alias: HashMap<String, TeamId>,
    names: HashMap<TeamId, String>,
}

impl TeamDirectory {
    pub fn new(entries: Vec<TeamEntry>) -> Result<Self, PipelineError> {
        let mut by_alias = HashMap::new();
        let mut names = HashMap::new();
        for entry in &entries {
            if names.insert(entry.id, entry.name.clone()).is_some() {
                return Err(PipelineError::input(format!(
                    "duplicate team id {} in directory",
                    entry.id
                )));
            }
            for raw in std::iter::once(&entry.name).chain(entry.aliases.iter()) {
                let key = normalize_key(raw);
                if key.is_empty() {
                    return Err(PipelineError::input(format!(
                        "empty alias for team id {}",
                        entry.id
                    )));
                }
                if let Some(prev) = by_alias.insert(key.clone(), entry.id)
                    && prev != entry.id
                {
                    return Err(PipelineError::input(format!(
                        "alias '{raw}' maps to both team {prev} and team {}",
                        entry.id
                    )));
                }
            }
        }
        if by_alias.is_empty() {
            return Err(PipelineError::input("team directory is empty"));
        }
        Ok(Self { by_alias, names })
    }

    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        let entries: Vec<TeamEntry> = serde_json::from_str(raw)
            .map_err(|e| PipelineError::input(format!("invalid team directory json: {e}")))?;
        Self::new(entries)
    }

    pub fn resolve(&self, raw_name: &str) -> Result<TeamId, PipelineError> {
        let key = normalize_key(raw_name);
        self.by_alias.get(&key).copied().ok_or_else(|| {
            PipelineError::input(format!("unknown team alias '{raw_name}' (key '{key}')"))
        })
    }

    pub fn name(&self, id: TeamId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub id: PlayerId,
    pub name: String,
    pub position: String,
}

#[derive(Debug, Clone)]
pub struct PlayerDirectory {
    by_name: HashMap<String, PlayerId>,
    entries: HashMap<PlayerId, PlayerEntry>,
}

impl PlayerDirectory {
    pub fn new(entries: Vec<PlayerEntry>) -> Result<Self, PipelineError> {
        let mut by_name = HashMap::new();
        let mut map = HashMap::new();
        for entry in entries {
            let key = normalize_key(&entry.name);
            if let Some(prev) = by_name.insert(key, entry.id)
                && prev != entry.id
            {
                return Err(PipelineError::input(format!(
                    "player name '{}' maps to both {prev} and {}",
                    entry.name, entry.id
                )));
            }
            map.insert(entry.id, entry);
        }
        Ok(Self {
            by_name,
            entries: map,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        let entries: Vec<PlayerEntry> = serde_json::from_str(raw)
            .map_err(|e| PipelineError::input(format!("invalid player directory json: {e}")))?;
        Self::new(entries)
    }

    pub fn resolve(&self, raw_name: &str) -> Result<PlayerId, PipelineError> {
        let key = normalize_key(raw_name);
        self.by_name
            .get(&key)
            .copied()
            .ok_or_else(|| PipelineError::input(format!("unknown player '{raw_name}'")))
    }

    pub fn position(&self, id: PlayerId) -> Option<&str> {
        self.entries.get(&id).map(|e| e.position.as_str())
    }

    /// Ids of every other player listed at the given position.
    pub fn position_mates(&self, position: &str, exclude: PlayerId) -> Vec<PlayerId> {
        let mut out: Vec<PlayerId> = self
            .entries
            .values()
            .filter(|e| e.position == position && e.id != exclude)
            .map(|e| e.id)
            .collect();
        out.sort_unstable();
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachSpell {
    pub coach_id: CoachId,
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Coach tenures for the focal team, ordered and non-overlapping.
#[derive(Debug, Clone)]
pub struct CoachBook {
    spells: Vec<CoachSpell>,
}

impl CoachBook {
    pub fn new(mut spells: Vec<CoachSpell>) -> Result<Self, PipelineError> {
        spells.sort_by_key(|s| s.start);
        for pair in spells.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(PipelineError::input(format!(
                    "coach spells overlap: {} and {}",
                    pair[0].name, pair[1].name
                )));
            }
        }
        Ok(Self { spells })
    }

    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        let spells: Vec<CoachSpell> = serde_json::from_str(raw)
            .map_err(|e| PipelineError::input(format!("invalid coach book json: {e}")))?;
        Self::new(spells)
    }

    pub fn coach_on(&self, date: NaiveDate) -> Option<&CoachSpell> {
        self.spells
            .iter()
            .find(|s| s.start <= date && date <= s.end)
    }

    pub fn spells(&self) -> &[CoachSpell] {
        &self.spells
    }
}

/// Collapses a raw name to a stable lookup key: trimmed, lowercased, Latin
/// diacritics folded to ASCII, runs of non-alphanumerics joined by a single
/// underscore. " Real Madrid CF " and "real madrid cf" share one key.
pub fn normalize_key(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut prev_us = false;
    for ch in lower.chars() {
        let mapped = match fold_diacritic(ch) {
            Some(c) => Some(c),
            None if ch.is_ascii_alphanumeric() => Some(ch),
            None => None,
        };
        if let Some(c) = mapped {
            out.push(c);
            prev_us = false;
        } else if !prev_us && !out.is_empty() {
            out.push('_');
            prev_us = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

fn fold_diacritic(ch: char) -> Option<char> {
    let folded = match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ā' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'ę' | 'ě' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' | 'ń' => 'n',
        'ç' | 'ć' | 'č' => 'c',
        'š' | 'ś' => 's',
        'ž' | 'ź' | 'ż' => 'z',
        'ł' => 'l',
        'ý' => 'y',
        _ => return None,
    };
    Some(folded)
}
