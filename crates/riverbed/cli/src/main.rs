// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Riverbed CLI Tool
//!
//! Compiles a query document with the access-path optimizer and prints the plan.

use anyhow::Context;
use clap::{Parser, Subcommand};
use riverbed_common::{RseNode, get_plan};
use riverbed_core::{CollectingDiagnostics, CompilerScratch, DiagnosticEntry, HeuristicCostModel, OptimizerConfig, OptimizerEnv, StaticCatalog, StreamDefinition, compile};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "riverbed")]
#[command(about = "Riverbed - access path optimizer CLI")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query document and print its plan
    Explain {
        /// JSON document with `streams`, `catalog`, `query` and optional `config`
        file: PathBuf,
        /// Print one operator per line instead of the PLAN form
        #[arg(long)]
        detailed: bool,
        /// Print the candidates and decisions the optimizer recorded
        #[arg(long)]
        trace: bool,
        /// Optimizer configuration file, replacing the document's `config`
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
    /// Print the default optimizer configuration
    Config,
}

/// Everything needed to compile one query expression.
#[derive(Deserialize)]
struct QueryDocument {
    streams: Vec<StreamDefinition>,
    #[serde(default)]
    catalog: StaticCatalog,
    query: RseNode,
    #[serde(default)]
    config: Option<OptimizerConfig>,
}

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Explain { file, detailed, trace, config } => handle_explain(&file, detailed, trace, config.as_deref()),
        Commands::Config => handle_config(),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        process::exit(1);
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn handle_explain(file: &Path, detailed: bool, trace: bool, config_path: Option<&Path>) -> anyhow::Result<()> {
    let document: QueryDocument = read_json(file)?;
    let config = match config_path {
        Some(path) => read_json(path)?,
        None => document.config.unwrap_or_default(),
    };

    let mut csb = CompilerScratch::new(document.streams);
    let mut query = document.query;
    let cost_model = HeuristicCostModel::new();
    let diagnostics = CollectingDiagnostics::new();
    let env = OptimizerEnv { cost_model: &cost_model, metadata: &document.catalog, diagnostics: &diagnostics, config: &config };

    let plan = compile(env, &mut csb, &mut query)?;
    println!("{}", get_plan(&[&plan], detailed).trim_start());

    if trace {
        println!();
        for entry in diagnostics.entries() {
            match entry {
                DiagnosticEntry::Candidate { stream, description, cost } => println!("  candidate #{stream}: {description} (cost {cost:.2})"),
                DiagnosticEntry::Decision { phase, description } => println!("  {phase}: {description}"),
            }
        }
    }

    info!("Compiled plan for {}", file.display());
    Ok(())
}

fn handle_config() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&OptimizerConfig::default())?);
    Ok(())
}
