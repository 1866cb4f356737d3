use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};

use crate::assembler::{FeatureRow, TeamBlock};
use crate::errors::PipelineError;
use crate::players::SQUAD_SLOTS;

/// One serialized cell. Integers and text keep their own shapes so ids and
/// season tags do not pick up a trailing `.0` in the CSV.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Int(i64),
    Num(f64),
    Text(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Int(v) => write!(f, "{v}"),
            CellValue::Num(v) => write!(f, "{v}"),
            CellValue::Text(v) => write!(f, "{v}"),
        }
    }
}

const SLOT_SUFFIXES: [&str; 10] = [
    "FSQ", "RT", "POS", "RT_M", "RT_PS", "FORM5", "WINR", "G90", "A90", "KP90",
];
const SIDE_COLUMNS: [&str; 12] = [
    "G_SCO_L5",
    "G_CON_L5",
    "GDIF_L5",
    "PPM_L5",
    "OPP_PPM_L5",
    "PPM_SEA",
    "GPM_VS_TOP",
    "GPM_VS_MID",
    "GPM_VS_LOW",
    "PPM_VS_TOP",
    "PPM_VS_MID",
    "PPM_VS_LOW",
];

/// The full column catalog, in committed order. `flatten` emits cells in
/// exactly this order; a unit test pins the two to the same length.
pub fn headers() -> Vec<String> {
    let mut out = vec![
        "MATCH_ID".to_string(),
        "MATCH_DATE".to_string(),
        "MATCH_SEA".to_string(),
        "MATCH_HOME".to_string(),
        "MATCH_OPP_ID".to_string(),
        "MATCH_ROUND".to_string(),
    ];
    for n in 1..=SQUAD_SLOTS {
        out.push(format!("RM_PX_{n}"));
        for suffix in SLOT_SUFFIXES {
            out.push(format!("RM_PX_{n}_{suffix}"));
        }
    }
    out.extend(
        ["RM_C_ID", "RM_C_RT_PS", "RM_C_FORM5"]
            .map(str::to_string),
    );
    for col in SIDE_COLUMNS {
        out.push(format!("RM_{col}"));
    }
    for col in SIDE_COLUMNS {
        out.push(format!("OP_{col}"));
    }
    out.extend(
        [
            "OP_G_SCO_ALL",
            "OP_G_CON_ALL",
            "OP_SCO_CON_RAT",
            "OP_ODD_W_L5",
            "OP_ODD_L_L5",
            "H2H_EXISTS",
            "H2H_W_L5",
            "H2H_GDIF_L5",
            "H2H_PPM_L5",
            "H2H_PPM",
            "RM_ODD_W",
        ]
        .map(str::to_string),
    );
    out
}

struct Emitter {
    match_id: u32,
    cells: Vec<CellValue>,
}

impl Emitter {
    fn num(&mut self, column: &str, value: Option<f64>) -> Result<(), PipelineError> {
        match value {
            Some(v) => {
                self.cells.push(CellValue::Num(v));
                Ok(())
            }
            None => Err(PipelineError::Completeness {
                match_id: self.match_id,
                column: column.to_string(),
            }),
        }
    }

    fn side(&mut self, prefix: &str, block: &TeamBlock) -> Result<(), PipelineError> {
        let pairs = [
            (0, block.g_sco_l5),
            (1, block.g_con_l5),
            (2, block.gdif_l5),
            (3, block.ppm_l5),
            (4, block.opp_ppm_l5),
            (5, block.ppm_sea),
            (6, block.gpm_vs_top),
            (7, block.gpm_vs_mid),
            (8, block.gpm_vs_low),
            (9, block.ppm_vs_top),
            (10, block.ppm_vs_mid),
            (11, block.ppm_vs_low),
        ];
        for (i, value) in pairs {
            self.num(&format!("{prefix}_{}", SIDE_COLUMNS[i]), value)?;
        }
        Ok(())
    }
}

/// The VALIDATED gate: turns a typed row into the flat cell sequence, failing
/// with the first still-undefined column.
pub fn flatten(row: &FeatureRow) -> Result<Vec<CellValue>, PipelineError> {
    let mut e = Emitter {
        match_id: row.block.match_id,
        cells: Vec::with_capacity(headers().len()),
    };

    e.cells.push(CellValue::Int(row.block.match_id as i64));
    e.cells.push(CellValue::Text(row.block.date.to_string()));
    e.cells.push(CellValue::Text(row.block.season.clone()));
    e.cells
        .push(CellValue::Int(if row.block.is_home { 1 } else { 0 }));
    e.cells.push(CellValue::Int(row.block.opponent_id as i64));
    match row.block.round {
        Some(r) => e.cells.push(CellValue::Int(r)),
        None => {
            return Err(PipelineError::Completeness {
                match_id: row.block.match_id,
                column: "MATCH_ROUND".to_string(),
            });
        }
    }

    for (n, slot) in row.squad.iter().enumerate() {
        let n = n + 1;
        match slot.player_id {
            Some(id) => e.cells.push(CellValue::Int(id as i64)),
            None => {
                return Err(PipelineError::Completeness {
                    match_id: row.block.match_id,
                    column: format!("RM_PX_{n}"),
                });
            }
        }
        e.num(&format!("RM_PX_{n}_FSQ"), slot.first_squad)?;
        e.num(&format!("RM_PX_{n}_RT"), slot.rated)?;
        match &slot.position {
            Some(pos) => e.cells.push(CellValue::Text(pos.clone())),
            None => {
                return Err(PipelineError::Completeness {
                    match_id: row.block.match_id,
                    column: format!("RM_PX_{n}_POS"),
                });
            }
        }
        e.num(&format!("RM_PX_{n}_RT_M"), slot.last_rating)?;
        e.num(&format!("RM_PX_{n}_RT_PS"), slot.prior_season_rating)?;
        e.num(&format!("RM_PX_{n}_FORM5"), slot.form5)?;
        e.num(&format!("RM_PX_{n}_WINR"), slot.win_rate)?;
        e.num(&format!("RM_PX_{n}_G90"), slot.goals_per90)?;
        e.num(&format!("RM_PX_{n}_A90"), slot.assists_per90)?;
        e.num(&format!("RM_PX_{n}_KP90"), slot.key_passes_per90)?;
    }

    match row.coach.coach_id {
        Some(id) => e.cells.push(CellValue::Int(id as i64)),
        None => {
            return Err(PipelineError::Completeness {
                match_id: row.block.match_id,
                column: "RM_C_ID".to_string(),
            });
        }
    }
    e.num("RM_C_RT_PS", row.coach.prior_season_rating)?;
    e.num("RM_C_FORM5", row.coach.form5)?;

    e.side("RM", &row.focal)?;
    e.side("OP", &row.opponent)?;

    e.num("OP_G_SCO_ALL", row.opp_extras.g_sco_all)?;
    e.num("OP_G_CON_ALL", row.opp_extras.g_con_all)?;
    e.num("OP_SCO_CON_RAT", row.opp_extras.sco_con_rat)?;
    e.num("OP_ODD_W_L5", row.opp_extras.odd_w_l5)?;
    e.num("OP_ODD_L_L5", row.opp_extras.odd_l_l5)?;

    e.cells
        .push(CellValue::Int(if row.h2h.exists { 1 } else { 0 }));
    e.num("H2H_W_L5", row.h2h.win_l5)?;
    e.num("H2H_GDIF_L5", row.h2h.gdif_l5)?;
    e.num("H2H_PPM_L5", row.h2h.ppm_l5)?;
    e.num("H2H_PPM", row.h2h.ppm_all)?;

    e.num("RM_ODD_W", row.target_odds)?;

    Ok(e.cells)
}

/// The committed table: header row plus one cell row per focal match.
#[derive(Debug, Default)]
pub struct Table {
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cells: Vec<CellValue>) {
        self.rows.push(cells);
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("create output csv {}", path.display()))?;
        writer.write_record(headers()).context("write csv header")?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|c| c.to_string()))
                .context("write csv row")?;
        }
        writer.flush().context("flush output csv")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{H2hBlock, MatchBlock, OppExtras};
    use crate::players::{CoachFeatures, SlotFeatures};
    use chrono::NaiveDate;

    fn dense_slot() -> SlotFeatures {
        SlotFeatures {
            player_id: Some(1),
            first_squad: Some(1.0),
            rated: Some(1.0),
            position: Some("FW".into()),
            last_rating: Some(7.0),
            prior_season_rating: Some(7.0),
            form5: Some(7.0),
            win_rate: Some(0.5),
            goals_per90: Some(0.4),
            assists_per90: Some(0.2),
            key_passes_per90: Some(1.1),
        }
    }

    fn dense_block() -> TeamBlock {
        TeamBlock {
            g_sco_l5: Some(1.0),
            g_con_l5: Some(1.0),
            gdif_l5: Some(0.0),
            ppm_l5: Some(1.5),
            opp_ppm_l5: Some(1.4),
            ppm_sea: Some(1.6),
            gpm_vs_top: Some(0.9),
            gpm_vs_mid: Some(1.2),
            gpm_vs_low: Some(2.1),
            ppm_vs_top: Some(1.0),
            ppm_vs_mid: Some(1.8),
            ppm_vs_low: Some(2.6),
        }
    }

    fn dense_row() -> FeatureRow {
        FeatureRow {
            block: MatchBlock {
                match_id: 7,
                date: NaiveDate::from_ymd_opt(2023, 9, 1).unwrap(),
                season: "2023-2024".into(),
                is_home: true,
                opponent_id: 3,
                round: Some(4),
            },
            squad: vec![dense_slot(); SQUAD_SLOTS],
            coach: CoachFeatures {
                coach_id: Some(2),
                prior_season_rating: Some(7.1),
                form5: Some(7.2),
            },
            focal: dense_block(),
            opponent: dense_block(),
            opp_extras: OppExtras {
                g_sco_all: Some(1.3),
                g_con_all: Some(1.1),
                sco_con_rat: Some(1.3 / 1.1),
                odd_w_l5: Some(2.4),
                odd_l_l5: Some(3.1),
            },
            h2h: H2hBlock {
                exists: true,
                win_l5: Some(0.6),
                gdif_l5: Some(3.0),
                ppm_l5: Some(2.0),
                ppm_all: Some(1.9),
            },
            target_odds: Some(1.55),
        }
    }

    #[test]
    fn flatten_matches_header_width() {
        let cells = flatten(&dense_row()).unwrap();
        assert_eq!(cells.len(), headers().len());
    }

    #[test]
    fn undefined_cell_names_its_column() {
        let mut row = dense_row();
        row.opponent.ppm_vs_low = None;
        match flatten(&row) {
            Err(PipelineError::Completeness { match_id, column }) => {
                assert_eq!(match_id, 7);
                assert_eq!(column, "OP_PPM_VS_LOW");
            }
            other => panic!("expected completeness error, got {other:?}"),
        }
        let mut row = dense_row();
        row.target_odds = None;
        match flatten(&row) {
            Err(PipelineError::Completeness { column, .. }) => {
                assert_eq!(column, "RM_ODD_W");
            }
            other => panic!("expected completeness error, got {other:?}"),
        }
    }

    #[test]
    fn ids_and_flags_serialize_as_integers() {
        let cells = flatten(&dense_row()).unwrap();
        let headers = headers();
        let idx = |name: &str| headers.iter().position(|h| h == name).unwrap();
        assert_eq!(cells[idx("MATCH_ID")], CellValue::Int(7));
        assert_eq!(cells[idx("MATCH_HOME")], CellValue::Int(1));
        assert_eq!(cells[idx("H2H_EXISTS")], CellValue::Int(1));
        assert_eq!(cells[idx("RM_PX_1_POS")], CellValue::Text("FW".into()));
        assert_eq!(cells[idx("RM_ODD_W")], CellValue::Num(1.55));
    }

    #[test]
    fn headers_are_unique() {
        let headers = headers();
        let mut seen = std::collections::HashSet::new();
        for h in &headers {
            assert!(seen.insert(h.clone()), "duplicate column {h}");
        }
        assert_eq!(headers.len(), 220);
    }
}
