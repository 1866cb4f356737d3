use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use rm_features::assembler::{PipelineConfig, build_dataset};
use rm_features::observability;
use rm_features::registry::{CoachBook, PlayerDirectory, TeamDirectory, TeamId};
use rm_features::seasons::SeasonTable;
use rm_features::store::{
    self, Snapshot, ingest_appearances_csv, ingest_matches_csv, load_appearances, load_matches,
};

#[derive(Parser)]
#[command(name = "rm_features")]
#[command(about = "Leakage-free match feature matrix builder")]
struct Cli {
    /// Directory holding teams.json, players.json, coaches.json and
    /// optionally seasons.json.
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Sqlite database path.
    #[arg(long, default_value = "data/matches.db")]
    db: PathBuf,

    /// Focal team id as declared in teams.json.
    #[arg(long, default_value = "1")]
    focal_team: TeamId,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the raw match and appearance tables into the store
    Ingest {
        /// League-wide match results CSV.
        #[arg(long)]
        matches: PathBuf,

        /// Per-player appearance CSV for focal matches.
        #[arg(long)]
        appearances: Option<PathBuf>,
    },
    /// Assemble the feature matrix from the stored matches
    Build {
        /// Output CSV path.
        #[arg(long, default_value = "data/features.csv")]
        out: PathBuf,
    },
}

struct Directories {
    teams: TeamDirectory,
    players: PlayerDirectory,
    coaches: CoachBook,
    seasons: SeasonTable,
}

fn read_json(dir: &Path, name: &str) -> Result<Option<String>> {
    let path = dir.join(name);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    Ok(Some(raw))
}

fn load_directories(dir: &Path) -> Result<Directories> {
    let teams_raw = read_json(dir, "teams.json")?
        .with_context(|| format!("missing {}/teams.json", dir.display()))?;
    let teams = TeamDirectory::from_json(&teams_raw)?;

    let players = match read_json(dir, "players.json")? {
        Some(raw) => PlayerDirectory::from_json(&raw)?,
        None => PlayerDirectory::new(vec![])?,
    };
    let coaches = match read_json(dir, "coaches.json")? {
        Some(raw) => CoachBook::from_json(&raw)?,
        None => CoachBook::new(vec![])?,
    };
    let seasons = match read_json(dir, "seasons.json")? {
        Some(raw) => SeasonTable::from_json(&raw)?,
        None => SeasonTable::tracked_la_liga(),
    };

    Ok(Directories {
        teams,
        players,
        coaches,
        seasons,
    })
}

fn main() -> Result<()> {
    let logging = observability::logging_config_from_env();
    observability::init_logging(&logging).context("initialize logging")?;

    let cli = Cli::parse();
    let dirs = load_directories(&cli.config_dir)?;

    match cli.command {
        Commands::Ingest {
            matches,
            appearances,
        } => {
            let mut conn = store::open_db(&cli.db)?;
            let summary = ingest_matches_csv(
                &mut conn,
                &matches,
                &dirs.teams,
                &dirs.seasons,
                cli.focal_team,
            )?;
            info!(
                matches = summary.matches,
                focal = summary.focal_matches,
                "match table ingested"
            );
            if let Some(path) = appearances {
                let count = ingest_appearances_csv(&mut conn, &path, &dirs.teams, &dirs.players)?;
                info!(appearances = count, "appearance table ingested");
            }
        }
        Commands::Build { out } => {
            let conn = store::open_db(&cli.db)?;
            let matches = load_matches(&conn)?;
            let appearances = load_appearances(&conn)?;
            let snapshot = Snapshot::new(
                matches,
                appearances,
                dirs.seasons,
                dirs.teams,
                dirs.players,
                cli.focal_team,
            )?;
            let config = PipelineConfig::new(cli.focal_team);
            let table = build_dataset(&snapshot, &dirs.coaches, &config)?;
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).ok();
            }
            table.write_csv(&out)?;
            info!(rows = table.rows().len(), out = %out.display(), "feature matrix written");
        }
    }

    Ok(())
}
